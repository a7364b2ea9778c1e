//! Plain-text tables for terminal output.

use std::fmt::Write as _;

use crate::{
    csv_store::MessageRow,
    schema::{FieldDecl, SheetSchema},
    select::select_fields,
};

pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(flatten(cell).chars().count());
        }
    }

    let mut output = String::new();
    push_line(&mut output, headers.iter().map(|h| h.to_string()), &widths);
    push_line(
        &mut output,
        widths.iter().map(|w| "-".repeat((*w).max(3))),
        &widths,
    );
    for row in rows {
        push_line(&mut output, row.iter().map(|cell| flatten(cell)), &widths);
    }
    output
}

fn push_line(output: &mut String, cells: impl Iterator<Item = String>, widths: &[usize]) {
    let mut line = String::new();
    for (idx, (cell, &width)) in cells.zip(widths).enumerate() {
        if idx > 0 {
            line.push_str("  ");
        }
        let _ = write!(line, "{cell:<width$}");
    }
    let _ = writeln!(output, "{}", line.trim_end());
}

fn flatten(cell: &str) -> String {
    cell.replace(['\n', '\r', '\t'], " ")
}

/// One row per declared field: position, key, type and whether it is cast.
pub fn fields_table(schema: &SheetSchema, allow: Option<&[String]>) -> String {
    let eligible: Vec<&FieldDecl> = select_fields(schema, allow);
    let rows = schema
        .fields
        .iter()
        .enumerate()
        .map(|(idx, field)| {
            let cast = if field.field_type.cast_target().is_none() {
                "no (no caster)"
            } else if eligible.iter().any(|e| e.key == field.key) {
                "yes"
            } else {
                "no"
            };
            vec![
                (idx + 1).to_string(),
                field.key.clone(),
                field.field_type.to_string(),
                cast.to_string(),
            ]
        })
        .collect::<Vec<_>>();
    render_table(&["#", "key", "type", "cast"], &rows)
}

pub fn messages_table(messages: &[MessageRow], limit: usize) -> String {
    let rows = messages
        .iter()
        .take(limit)
        .map(|message| {
            vec![
                message.record.to_string(),
                message.field.clone(),
                message.severity.to_string(),
                message.text.clone(),
            ]
        })
        .collect::<Vec<_>>();
    let mut rendered = render_table(&["record", "field", "severity", "message"], &rows);
    if messages.len() > limit {
        let _ = writeln!(rendered, "... {} more message(s)", messages.len() - limit);
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        record::RecordId,
        schema::{FieldDecl, FieldType},
        value::Severity,
    };

    #[test]
    fn render_table_pads_columns() {
        let rendered = render_table(
            &["key", "type"],
            &[
                vec!["age".into(), "number".into()],
                vec!["firstName".into(), "string".into()],
            ],
        );
        assert_eq!(
            rendered,
            "key        type\n---------  ------\nage        number\nfirstName  string\n"
        );
    }

    #[test]
    fn fields_table_marks_eligibility() {
        let schema = SheetSchema::new(
            "people",
            vec![
                FieldDecl::new("firstName", FieldType::String),
                FieldDecl::new("age", FieldType::Number),
                FieldDecl::new("category", FieldType::Enum),
            ],
        );
        let rendered = fields_table(&schema, None);
        let lines: Vec<&str> = rendered.lines().collect();
        assert!(lines[2].ends_with("string  no"));
        assert!(lines[3].ends_with("number  yes"));
        assert!(lines[4].ends_with("no (no caster)"));
    }

    #[test]
    fn messages_table_truncates() {
        let messages = (1..=3)
            .map(|id| MessageRow {
                record: RecordId(id),
                field: "age".into(),
                severity: Severity::Error,
                text: "Invalid number".into(),
            })
            .collect::<Vec<_>>();
        let rendered = messages_table(&messages, 2);
        assert_eq!(rendered.lines().count(), 5);
        assert!(rendered.ends_with("... 1 more message(s)\n"));
    }
}
