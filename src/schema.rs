//! Sheet schema model and YAML persistence.
//!
//! A [`SheetSchema`] is the snapshot of field declarations a batch is cast
//! against. Field types are parsed from lower-case tokens; only the closed set
//! of [`CastTarget`]s can be coerced, everything else is carried verbatim so a
//! schema round-trips without loss.

use std::{fmt, fs::File, io::BufReader, path::Path, str::FromStr};

use anyhow::{Context, Result, anyhow, ensure};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

/// Types a value can be coerced into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastTarget {
    String,
    Number,
    Boolean,
    Date,
}

impl CastTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            CastTarget::String => "string",
            CastTarget::Number => "number",
            CastTarget::Boolean => "boolean",
            CastTarget::Date => "date",
        }
    }
}

impl fmt::Display for CastTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    Enum,
    Reference,
    Other(String),
}

impl FieldType {
    pub fn as_str(&self) -> &str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Enum => "enum",
            FieldType::Reference => "reference",
            FieldType::Other(token) => token,
        }
    }

    pub fn cast_target(&self) -> Option<CastTarget> {
        match self {
            FieldType::String => Some(CastTarget::String),
            FieldType::Number => Some(CastTarget::Number),
            FieldType::Boolean => Some(CastTarget::Boolean),
            FieldType::Date => Some(CastTarget::Date),
            FieldType::Enum | FieldType::Reference | FieldType::Other(_) => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        let parsed = match normalized.as_str() {
            "" => return Err(anyhow!("Field type cannot be empty")),
            "string" | "text" => FieldType::String,
            "number" | "numeric" => FieldType::Number,
            "boolean" | "bool" => FieldType::Boolean,
            "date" => FieldType::Date,
            "enum" => FieldType::Enum,
            "reference" => FieldType::Reference,
            other => FieldType::Other(other.to_string()),
        };
        Ok(parsed)
    }
}

impl Serialize for FieldType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        FieldType::from_str(&raw).map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldDecl {
    pub key: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl FieldDecl {
    pub fn new(key: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            key: key.into(),
            field_type,
            label: None,
        }
    }

    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.key)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SheetSchema {
    pub slug: String,
    pub fields: Vec<FieldDecl>,
}

impl SheetSchema {
    pub fn new(slug: impl Into<String>, fields: Vec<FieldDecl>) -> Self {
        Self {
            slug: slug.into(),
            fields,
        }
    }

    pub fn field(&self, key: &str) -> Option<&FieldDecl> {
        self.fields.iter().find(|field| field.key == key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.fields.iter().map(|field| field.key.clone()).collect()
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.slug.trim().is_empty(), "Sheet slug cannot be empty");
        for (idx, field) in self.fields.iter().enumerate() {
            ensure!(
                !field.key.trim().is_empty(),
                "Field at position {} has an empty key",
                idx + 1
            );
            if let Some(earlier) = self.fields[..idx].iter().position(|f| f.key == field.key) {
                return Err(anyhow!(
                    "Duplicate field key '{}' at positions {} and {}",
                    field.key,
                    earlier + 1,
                    idx + 1
                ));
            }
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening schema file {path:?}"))?;
        let reader = BufReader::new(file);
        let schema: SheetSchema =
            serde_yaml::from_reader(reader).context("Parsing sheet schema YAML")?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn from_yaml_str(input: &str) -> Result<Self> {
        let schema: SheetSchema =
            serde_yaml::from_str(input).context("Parsing sheet schema YAML")?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let file = File::create(path).with_context(|| format!("Creating schema file {path:?}"))?;
        serde_yaml::to_writer(file, self).context("Writing sheet schema YAML")
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Serializing sheet schema to YAML string")
    }
}
