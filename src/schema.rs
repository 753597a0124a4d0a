//! Schema model: the user-declared output columns that drive extraction.
//!
//! A [`Schema`] is an ordered list of [`SchemaField`]s. Order matters twice:
//! the prompt lists fields in schema order, and the CSV exporter writes
//! columns in schema order.
//!
//! The declared [`FieldType`] is a hint for the model and for display only.
//! Extracted values are never coerced against it.

use crate::error::ExtractError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Declared type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    #[serde(alias = "string")]
    Text,
    #[serde(alias = "numeric")]
    Number,
    Date,
    #[serde(alias = "bool")]
    Boolean,
}

impl FieldType {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Number => "number",
            FieldType::Date => "date",
            FieldType::Boolean => "boolean",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "string" => Ok(FieldType::Text),
            "number" | "numeric" => Ok(FieldType::Number),
            "date" => Ok(FieldType::Date),
            "boolean" | "bool" => Ok(FieldType::Boolean),
            other => Err(ExtractError::InvalidSchema(format!(
                "unknown field type '{other}' (expected text, number, date or boolean)"
            ))),
        }
    }
}

/// One output column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    /// Unique identifier within the schema. Assigned when omitted.
    #[serde(default)]
    pub id: String,
    /// Column name; also the key the model must use in each row object.
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    #[serde(default)]
    pub description: String,
}

impl SchemaField {
    pub fn new(
        name: impl Into<String>,
        field_type: FieldType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            field_type,
            description: description.into(),
        }
    }

    /// Parse a compact `name[:type[:description]]` field spec.
    ///
    /// The description may itself contain `:`.
    pub fn parse_spec(spec: &str) -> Result<Self, ExtractError> {
        let mut parts = spec.splitn(3, ':');
        let name = parts.next().unwrap_or("").trim();
        if name.is_empty() {
            return Err(ExtractError::InvalidSchema(format!(
                "field spec '{spec}' has an empty name"
            )));
        }
        let field_type = match parts.next() {
            Some(t) if !t.trim().is_empty() => t.parse()?,
            _ => FieldType::Text,
        };
        let description = parts.next().unwrap_or("").trim();
        Ok(Self::new(name, field_type, description))
    }

    /// Line used in the prompt: `name (type): description`.
    pub fn prompt_line(&self) -> String {
        format!("{} ({}): {}", self.name, self.field_type, self.description)
    }
}

/// Ordered collection of fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<SchemaField>", into = "Vec<SchemaField>")]
pub struct Schema {
    fields: Vec<SchemaField>,
}

impl Schema {
    /// Build a schema, assigning `field_{n}` ids to fields without one.
    pub fn new(fields: Vec<SchemaField>) -> Self {
        let mut schema = Self { fields };
        schema.assign_missing_ids();
        schema
    }

    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Column names in schema order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Parse a schema from a JSON array of fields.
    pub fn from_json(json: &str) -> Result<Self, ExtractError> {
        let fields: Vec<SchemaField> = serde_json::from_str(json)
            .map_err(|e| ExtractError::InvalidSchema(format!("schema is not valid JSON: {e}")))?;
        Ok(Self::new(fields))
    }

    /// Check the schema can drive an extraction.
    ///
    /// Rejected: an empty schema, blank names, duplicate names (they would
    /// collide as row keys and CSV columns) and duplicate ids.
    pub fn validate(&self) -> Result<(), ExtractError> {
        if self.fields.is_empty() {
            return Err(ExtractError::MissingInput);
        }

        let mut names = HashSet::with_capacity(self.fields.len());
        let mut ids = HashSet::with_capacity(self.fields.len());
        for (pos, field) in self.fields.iter().enumerate() {
            let name = field.name.trim();
            if name.is_empty() {
                return Err(ExtractError::InvalidSchema(format!(
                    "field {} has an empty name",
                    pos + 1
                )));
            }
            if name == "confidence" {
                return Err(ExtractError::InvalidSchema(
                    "'confidence' is reserved for the per-row confidence score".into(),
                ));
            }
            if !names.insert(name) {
                return Err(ExtractError::InvalidSchema(format!(
                    "duplicate field name '{name}'"
                )));
            }
            if !ids.insert(field.id.as_str()) {
                return Err(ExtractError::InvalidSchema(format!(
                    "duplicate field id '{}'",
                    field.id
                )));
            }
        }
        Ok(())
    }

    /// Generated ids are `field_{position}`, skipping any id a field
    /// already carries.
    fn assign_missing_ids(&mut self) {
        let mut taken: HashSet<String> = self
            .fields
            .iter()
            .filter(|f| !f.id.trim().is_empty())
            .map(|f| f.id.clone())
            .collect();
        for (pos, field) in self.fields.iter_mut().enumerate() {
            if !field.id.trim().is_empty() {
                continue;
            }
            let mut n = pos + 1;
            let mut id = format!("field_{n}");
            while taken.contains(&id) {
                n += 1;
                id = format!("field_{n}");
            }
            taken.insert(id.clone());
            field.id = id;
        }
    }
}

impl From<Vec<SchemaField>> for Schema {
    fn from(fields: Vec<SchemaField>) -> Self {
        Self::new(fields)
    }
}

impl From<Schema> for Vec<SchemaField> {
    fn from(schema: Schema) -> Self {
        schema.fields
    }
}

impl FromIterator<SchemaField> for Schema {
    fn from_iter<I: IntoIterator<Item = SchemaField>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
