//! Row mapper: storage rows and untrusted input objects → [`Record`].

use serde_json::{Number, Value};

use crate::error::{ValidationError, ValidationErrors};
use crate::record::{Record, Row};
use crate::schema::{ColumnDef, ColumnType, EntitySchema};

/// Copy a storage row into a record, trusting the driver's decoding.
///
/// Each declared column is read by its storage name; a column missing from the
/// row maps to `null` rather than an error.
#[must_use]
pub fn from_row(schema: &EntitySchema, row: &Row) -> Record {
    schema
        .columns()
        .iter()
        .map(|c| (c.property, row.get(c.def.name).cloned().unwrap_or(Value::Null)))
        .collect()
}

/// Validate a loosely-typed object against the schema and copy it into a
/// fresh record.
///
/// Rules per declared property:
/// - absent or `null` on a non-nullable column is an error, except for the
///   primary key (objects that have not been inserted yet carry no id);
/// - a present value on a non-nullable column must pass the column's type
///   check. `Number` takes anything that coerces to a finite number: numbers,
///   numeric or blank strings, `true`/`false`. `Boolean` takes only
///   `true`/`false`. `String` takes anything;
/// - nullable columns are not type checked.
///
/// Accepted values are normalized to the column type where a conversion
/// exists (`"17"` → `17`, `true` → `1`, `42` → `"42"`); anything else is
/// copied unchanged. Properties not declared in the schema are ignored.
///
/// # Errors
/// Returns every per-column failure at once; no record is produced.
pub fn from_validated_object(
    schema: &EntitySchema,
    obj: &Value,
) -> Result<Record, ValidationErrors> {
    let Value::Object(fields) = obj else {
        return Err(ValidationError::new(
            "$",
            format!("expected an object, got {}", kind(obj)),
        )
        .into());
    };

    let mut record = Record::new();
    let mut errors = ValidationErrors::default();

    for column in schema.columns() {
        let def = &column.def;
        match fields.get(column.property) {
            None | Some(Value::Null) if def.nullable || def.primary_key => {
                if fields.contains_key(column.property) {
                    record.set(column.property, Value::Null);
                }
            }
            None => errors.push(ValidationError::new(column.property, "is required")),
            Some(Value::Null) => {
                errors.push(ValidationError::new(column.property, "must not be null"));
            }
            Some(value) => match coerce(def, value) {
                Some(v) => record.set(column.property, v),
                None if def.nullable => record.set(column.property, value.clone()),
                None => errors.push(ValidationError::new(
                    column.property,
                    format!("expected {}, got {}", def.ty, kind(value)),
                )),
            },
        }
    }

    if errors.is_empty() {
        Ok(record)
    } else {
        Err(errors)
    }
}

fn coerce(def: &ColumnDef, value: &Value) -> Option<Value> {
    match (def.ty, value) {
        (ColumnType::Number, Value::Number(_))
        | (ColumnType::Boolean, Value::Bool(_))
        | (ColumnType::String, Value::String(_)) => Some(value.clone()),
        (ColumnType::Number, Value::String(s)) => parse_number(s),
        (ColumnType::Number, Value::Bool(b)) => Some(Value::from(u8::from(*b))),
        (ColumnType::String, other) => Some(Value::String(other.to_string())),
        _ => None,
    }
}

/// Numeric coercion of text: surrounding whitespace is ignored and a blank
/// string counts as zero.
fn parse_number(s: &str) -> Option<Value> {
    let s = s.trim();
    if s.is_empty() {
        return Some(Value::from(0));
    }
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::from(i));
    }
    let f = s.parse::<f64>().ok().filter(|f| f.is_finite())?;
    Number::from_f64(f).map(Value::Number)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
