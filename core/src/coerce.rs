//! Attribute value coercion.
//!
//! Query-string values arrive as text and write values as JSON; both are
//! normalised here against the attribute's declared type before they reach a
//! plan or a payload. Errors are returned as a bare detail message so the
//! caller can attach the parameter name or JSON pointer.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Number, Value};

use crate::error::quoted_list;
use crate::schema::{Attribute, AttributeType, IdType, Schema};

/// Parses an RFC 3339 timestamp, a naive `YYYY-MM-DDTHH:MM:SS` or a bare date,
/// returning it as RFC 3339 in UTC with millisecond precision.
pub fn normalize_datetime(raw: &str) -> Option<String> {
    let utc = if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        dt.with_timezone(&Utc)
    } else if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        naive.and_utc()
    } else {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()?
            .and_hms_opt(0, 0, 0)?
            .and_utc()
    };
    Some(utc.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn type_error(name: &str, ty: &AttributeType) -> String {
    match ty {
        AttributeType::Enum(values) => format!(
            "'{name}' must be one of {}.",
            quoted_list(values.iter().map(String::as_str))
        ),
        AttributeType::Integer => format!("'{name}' must be an integer."),
        AttributeType::Datetime => format!("'{name}' must be a valid date."),
        AttributeType::Uuid => format!("'{name}' must be a valid UUID."),
        other => format!("'{name}' must be a {}.", other.name()),
    }
}

fn float(raw: f64) -> Option<Value> {
    Number::from_f64(raw).map(Value::Number)
}

/// Coerces a single query-string value for `field` (an attribute or the primary key).
pub fn coerce_text(schema: &Schema, field: &str, raw: &str) -> Result<Value, String> {
    if field == schema.id_field {
        return schema
            .parse_id(raw)
            .map_err(|_| type_error(field, &id_attribute_type(schema.id_type)));
    }
    let Some(attribute) = schema.attribute_named(field) else {
        return Err(format!("'{field}' is not an attribute of '{}'.", schema.name));
    };

    let ty = &attribute.ty;
    let parsed = match ty {
        AttributeType::String | AttributeType::Text => Some(Value::String(raw.to_string())),
        AttributeType::Integer => raw.parse::<i64>().ok().map(Value::from),
        AttributeType::Float => raw.parse::<f64>().ok().and_then(float),
        AttributeType::Boolean => match raw {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        AttributeType::Datetime => normalize_datetime(raw).map(Value::String),
        AttributeType::Uuid => uuid::Uuid::parse_str(raw)
            .ok()
            .map(|_| Value::String(raw.to_string())),
        AttributeType::Enum(values) => values
            .iter()
            .any(|v| v == raw)
            .then(|| Value::String(raw.to_string())),
    };
    parsed.ok_or_else(|| type_error(field, ty))
}

/// Coerces a non-null JSON value for a write, enforcing type, range, length and enum membership.
pub fn coerce_json(attribute: &Attribute, value: &Value) -> Result<Value, String> {
    let name = attribute.name.as_str();
    let ty = &attribute.ty;

    let coerced = match (ty, value) {
        (AttributeType::String | AttributeType::Text, Value::String(s)) => {
            check_range(attribute, s.chars().count() as f64, "length")?;
            Value::String(s.clone())
        }
        (AttributeType::Integer, Value::Number(n)) => {
            let int = n
                .as_i64()
                .or_else(|| {
                    // `i64::MAX as f64` rounds up to 2^63, hence the half-open range
                    n.as_f64()
                        .filter(|f| f.fract() == 0.0 && (i64::MIN as f64..i64::MAX as f64).contains(f))
                        .map(|f| f as i64)
                })
                .ok_or_else(|| type_error(name, ty))?;
            check_range(attribute, int as f64, "value")?;
            Value::from(int)
        }
        (AttributeType::Float, Value::Number(n)) => {
            let f = n.as_f64().ok_or_else(|| type_error(name, ty))?;
            check_range(attribute, f, "value")?;
            float(f).ok_or_else(|| type_error(name, ty))?
        }
        (AttributeType::Boolean, Value::Bool(b)) => Value::Bool(*b),
        (AttributeType::Datetime, Value::String(s)) => {
            Value::String(normalize_datetime(s).ok_or_else(|| type_error(name, ty))?)
        }
        (AttributeType::Uuid, Value::String(s)) if uuid::Uuid::parse_str(s).is_ok() => {
            Value::String(s.clone())
        }
        (AttributeType::Enum(values), Value::String(s)) if values.contains(s) => {
            Value::String(s.clone())
        }
        _ => return Err(type_error(name, ty)),
    };
    Ok(coerced)
}

/// Coerces a client-supplied primary key from a write document.
pub fn coerce_id(schema: &Schema, value: &Value) -> Result<Value, String> {
    let ty = id_attribute_type(schema.id_type);
    match (schema.id_type, value) {
        (IdType::Uuid, Value::String(s)) if uuid::Uuid::parse_str(s).is_ok() => Ok(value.clone()),
        (IdType::Integer, Value::Number(n)) if n.is_i64() => Ok(value.clone()),
        (_, Value::String(s)) => schema
            .parse_id(s)
            .map_err(|_| type_error(&schema.id_field, &ty)),
        _ => Err(type_error(&schema.id_field, &ty)),
    }
}

fn id_attribute_type(id_type: IdType) -> AttributeType {
    match id_type {
        IdType::Uuid => AttributeType::Uuid,
        IdType::Integer => AttributeType::Integer,
    }
}

fn check_range(attribute: &Attribute, measured: f64, what: &str) -> Result<(), String> {
    let name = &attribute.name;
    if let Some(min) = attribute.min
        && measured < min
    {
        return Err(format!("'{name}' {what} must be greater than or equal to {min}."));
    }
    if let Some(max) = attribute.max
        && measured > max
    {
        return Err(format!("'{name}' {what} must be less than or equal to {max}."));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn todo() -> Schema {
        Schema::new("Todo")
            .attribute(Attribute::string("name").min(1.0).max(5.0))
            .attribute(Attribute::integer("importance").min(0.0).max(10.0))
            .attribute(Attribute::float("ratio"))
            .attribute(Attribute::boolean("complete"))
            .attribute(Attribute::datetime("dueDate"))
            .attribute(Attribute::enumeration("status", ["open", "done"]))
    }

    #[test]
    fn datetimes_normalise_to_utc() {
        assert_eq!(
            normalize_datetime("2024-03-01T10:00:00+02:00").as_deref(),
            Some("2024-03-01T08:00:00.000Z")
        );
        assert_eq!(
            normalize_datetime("2024-03-01").as_deref(),
            Some("2024-03-01T00:00:00.000Z")
        );
        assert_eq!(normalize_datetime("yesterday"), None);
    }

    #[test]
    fn text_values_follow_attribute_type() {
        let schema = todo();
        assert_eq!(coerce_text(&schema, "importance", "7").unwrap(), json!(7));
        assert_eq!(coerce_text(&schema, "ratio", "0.5").unwrap(), json!(0.5));
        assert_eq!(coerce_text(&schema, "complete", "true").unwrap(), json!(true));
        assert_eq!(coerce_text(&schema, "status", "open").unwrap(), json!("open"));

        assert!(coerce_text(&schema, "importance", "seven").is_err());
        assert!(coerce_text(&schema, "complete", "yes").is_err());
        let err = coerce_text(&schema, "status", "later").unwrap_err();
        assert_eq!(err, "'status' must be one of 'open', 'done'.");
        assert!(coerce_text(&schema, "id", "nope").is_err());
    }

    #[test]
    fn json_values_respect_bounds() {
        let schema = todo();
        let importance = schema.attribute_named("importance").unwrap();
        let name = schema.attribute_named("name").unwrap();

        assert_eq!(coerce_json(importance, &json!(3.0)).unwrap(), json!(3));
        assert!(coerce_json(importance, &json!(11)).is_err());
        assert!(coerce_json(importance, &json!(1.5)).is_err());
        assert!(coerce_json(importance, &json!("3")).is_err());

        let unbounded = Attribute::integer("importance");
        let err = coerce_json(&unbounded, &json!(1e300)).unwrap_err();
        assert_eq!(err, type_error("importance", &AttributeType::Integer));
        assert!(coerce_json(&unbounded, &json!(9.223372036854775807e18)).is_err());
        assert!(coerce_json(&unbounded, &json!(u64::MAX)).is_err());
        assert_eq!(coerce_json(&unbounded, &json!(-4e3)).unwrap(), json!(-4000));
        assert!(coerce_json(name, &json!("")).is_err());
        assert!(coerce_json(name, &json!("toolong")).is_err());
        assert_eq!(coerce_json(name, &json!("walk")).unwrap(), json!("walk"));
    }

    #[test]
    fn ids_follow_id_type() {
        let uuid_schema = Schema::new("Todo");
        assert!(coerce_id(&uuid_schema, &json!("6b0c1a3e-5b7f-4a55-9d3c-0d6b5a1f2e3d")).is_ok());
        assert!(coerce_id(&uuid_schema, &json!(1)).is_err());

        let int_schema = Schema::new("Counter").id("id", IdType::Integer);
        assert_eq!(coerce_id(&int_schema, &json!("5")).unwrap(), json!(5));
        assert_eq!(coerce_id(&int_schema, &json!(5)).unwrap(), json!(5));
    }
}
