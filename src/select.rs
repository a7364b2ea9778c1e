use crate::schema::{FieldDecl, FieldType, SheetSchema};

/// Fields of `schema` that should be cast, in schema order.
///
/// With an allow-list only the listed keys are eligible, whatever their type.
/// Without one, every field not declared as `string` is eligible.
pub fn select_fields<'a>(schema: &'a SheetSchema, allow: Option<&[String]>) -> Vec<&'a FieldDecl> {
    schema
        .fields
        .iter()
        .filter(|field| match allow {
            Some(keys) => keys.iter().any(|key| key == &field.key),
            None => field.field_type != FieldType::String,
        })
        .collect()
}

/// Parses repeated/comma-separated field keys into an allow-list.
pub fn parse_field_filter(values: &[String]) -> Option<Vec<String>> {
    let keys = values
        .iter()
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .collect::<Vec<_>>();
    if keys.is_empty() { None } else { Some(keys) }
}

/// Allow-list keys that the schema does not declare.
pub fn unknown_keys<'a>(schema: &SheetSchema, allow: &'a [String]) -> Vec<&'a str> {
    allow
        .iter()
        .filter(|key| schema.field(key).is_none())
        .map(String::as_str)
        .collect()
}
