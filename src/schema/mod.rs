//! Structural validation of model output.
//!
//! A [`Shape`] declares the fields a model reply must carry. Validation only
//! checks presence, primitive kind and enum membership; it says nothing about
//! whether generated code is any good.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::SchemaViolation;
use crate::wire::Category;

#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    String,
    Enum(&'static [&'static str]),
    /// Array whose elements are objects with the given fields.
    ArrayOf(&'static [Field]),
}

#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

impl Field {
    const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind, required: true }
    }

    const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind, required: false }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Shape {
    pub name: &'static str,
    pub fields: &'static [Field],
}

pub const CLASSIFICATION: Shape = Shape {
    name: "classification",
    fields: &[
        Field::required("category", FieldKind::Enum(Category::WIRE_NAMES)),
        Field::optional("prompt", FieldKind::String),
        Field::optional("response", FieldKind::String),
    ],
};

pub const DOCUMENT: Shape = Shape {
    name: "document",
    fields: &[Field::required("html", FieldKind::String)],
};

const SOURCE_FILE_FIELDS: &[Field] = &[
    Field::required("name", FieldKind::String),
    Field::optional("language", FieldKind::String),
    Field::required("content", FieldKind::String),
];

pub const FILE_SET: Shape = Shape {
    name: "file_set",
    fields: &[Field::required("files", FieldKind::ArrayOf(SOURCE_FILE_FIELDS))],
};

pub const DIAGNOSIS: Shape = Shape {
    name: "diagnosis",
    fields: &[Field::required("response", FieldKind::String)],
};

impl Shape {
    /// Compact, prompt-friendly description of the shape.
    pub fn describe(&self) -> String {
        describe_fields(self.fields)
    }

    fn violation(&self, field: impl Into<String>, reason: impl Into<String>) -> SchemaViolation {
        SchemaViolation {
            shape: self.name,
            field: field.into(),
            reason: reason.into(),
        }
    }
}

fn describe_fields(fields: &[Field]) -> String {
    let parts: Vec<String> = fields
        .iter()
        .map(|f| {
            let ty = match f.kind {
                FieldKind::String => "string".to_string(),
                FieldKind::Enum(values) => values
                    .iter()
                    .map(|v| format!("\"{v}\""))
                    .collect::<Vec<_>>()
                    .join(" | "),
                FieldKind::ArrayOf(inner) => format!("[{}]", describe_fields(inner)),
            };
            let opt = if f.required { "" } else { "?" };
            format!("\"{}\"{opt}: {ty}", f.name)
        })
        .collect();
    format!("{{ {} }}", parts.join(", "))
}

/// Check `value` against `shape`, reporting the first offending field.
pub fn check(shape: &Shape, value: &Value) -> Result<(), SchemaViolation> {
    check_object(shape, shape.fields, value, "")
}

fn check_object(shape: &Shape, fields: &[Field], value: &Value, prefix: &str) -> Result<(), SchemaViolation> {
    let obj = value.as_object().ok_or_else(|| {
        let at = if prefix.is_empty() { "$" } else { prefix };
        shape.violation(at, format!("expected object, found {}", kind_name(value)))
    })?;

    for field in fields {
        let path = if prefix.is_empty() {
            field.name.to_string()
        } else {
            format!("{prefix}.{}", field.name)
        };
        let v = match obj.get(field.name) {
            None | Some(Value::Null) if field.required => {
                return Err(shape.violation(path, "is required"));
            }
            None | Some(Value::Null) => continue,
            Some(v) => v,
        };
        match field.kind {
            FieldKind::String => {
                if !v.is_string() {
                    return Err(shape.violation(path, format!("expected string, found {}", kind_name(v))));
                }
            }
            FieldKind::Enum(allowed) => {
                let s = v
                    .as_str()
                    .ok_or_else(|| shape.violation(&path, format!("expected string, found {}", kind_name(v))))?;
                if !allowed.contains(&s) {
                    return Err(shape.violation(path, format!("has unexpected value {s:?}")));
                }
            }
            FieldKind::ArrayOf(inner) => {
                let items = v
                    .as_array()
                    .ok_or_else(|| shape.violation(&path, format!("expected array, found {}", kind_name(v))))?;
                for (i, item) in items.iter().enumerate() {
                    check_object(shape, inner, item, &format!("{path}[{i}]"))?;
                }
            }
        }
    }
    Ok(())
}

/// Validate, then type the value.
pub fn validate<T: DeserializeOwned>(shape: &Shape, value: Value) -> Result<T, SchemaViolation> {
    check(shape, &value)?;
    serde_json::from_value(value).map_err(|e| shape.violation("$", e.to_string()))
}

fn kind_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
