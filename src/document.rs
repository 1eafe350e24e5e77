//! Dynamically typed document values.
//!
//! A document is a tree of [`Value`] nodes: scalar leaves (integers, floats,
//! booleans, strings and the three temporal kinds), arrays, and tables keyed
//! by strings. Tables keep their insertion order, so traversal over a decoded
//! document is deterministic.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone};
use indexmap::IndexMap;
use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};

use crate::error::{QueryError, QueryResult};

/// A single node of a document.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(DateTime<FixedOffset>),
    Array(Vec<Value>),
    Map(IndexMap<String, Value>),
}

impl Value {
    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    pub fn is_map(&self) -> bool {
        matches!(self, Value::Map(_))
    }

    /// A scalar is any leaf node, everything that is neither array nor map.
    pub fn is_scalar(&self) -> bool {
        !self.is_array() && !self.is_map()
    }

    /// Uniform truthiness: numbers are truthy when nonzero, strings and
    /// containers when non-empty, temporal values when not zero-valued.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Int(v) => *v != 0,
            Value::Float(v) => *v != 0.0,
            Value::Bool(v) => *v,
            Value::String(v) => !v.is_empty(),
            Value::Date(v) => *v != zero_date(),
            Value::Time(v) => *v != zero_time(),
            Value::DateTime(v) => v.naive_utc() != zero_date().and_time(zero_time()),
            Value::Array(v) => !v.is_empty(),
            Value::Map(v) => !v.is_empty(),
        }
    }

    /// Tag name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Bool(_) => "boolean",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::DateTime(_) => "datetime",
            Value::Array(_) => "array",
            Value::Map(_) => "table",
        }
    }
}

fn zero_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1, 1, 1).unwrap_or_default()
}

fn zero_time() -> NaiveTime {
    NaiveTime::from_hms_opt(0, 0, 0).unwrap_or_default()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v}"),
            Value::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            Value::Time(v) => write!(f, "{}", v.format("%H:%M:%S%.f")),
            Value::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key} = {value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ValueVisitor;

        impl<'de> Visitor<'de> for ValueVisitor {
            type Value = Value;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a document value")
            }

            fn visit_bool<E>(self, v: bool) -> Result<Value, E>
            where
                E: de::Error,
            {
                Ok(Value::Bool(v))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Value, E>
            where
                E: de::Error,
            {
                Ok(Value::Int(v))
            }

            fn visit_u64<E>(self, v: u64) -> Result<Value, E>
            where
                E: de::Error,
            {
                match i64::try_from(v) {
                    Ok(v) => Ok(Value::Int(v)),
                    Err(_) => Ok(Value::Float(v as f64)),
                }
            }

            fn visit_f64<E>(self, v: f64) -> Result<Value, E>
            where
                E: de::Error,
            {
                Ok(Value::Float(v))
            }

            fn visit_str<E>(self, v: &str) -> Result<Value, E>
            where
                E: de::Error,
            {
                Ok(Value::String(v.to_string()))
            }

            fn visit_string<E>(self, v: String) -> Result<Value, E>
            where
                E: de::Error,
            {
                Ok(Value::String(v))
            }

            fn visit_unit<E>(self) -> Result<Value, E>
            where
                E: de::Error,
            {
                Err(E::custom("null is not a supported document value"))
            }

            fn visit_none<E>(self) -> Result<Value, E>
            where
                E: de::Error,
            {
                Err(E::custom("null is not a supported document value"))
            }

            fn visit_some<D>(self, deserializer: D) -> Result<Value, D::Error>
            where
                D: Deserializer<'de>,
            {
                Deserialize::deserialize(deserializer)
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let mut items = Vec::new();
                while let Some(item) = seq.next_element()? {
                    items.push(item);
                }
                Ok(Value::Array(items))
            }

            fn visit_map<A>(self, mut access: A) -> Result<Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut map = IndexMap::new();
                while let Some((key, value)) = access.next_entry::<String, Value>()? {
                    map.insert(key, value);
                }
                Ok(Value::Map(map))
            }
        }

        deserializer.deserialize_any(ValueVisitor)
    }
}

impl TryFrom<toml::Value> for Value {
    type Error = QueryError;

    fn try_from(value: toml::Value) -> QueryResult<Value> {
        let converted = match value {
            toml::Value::String(v) => Value::String(v),
            toml::Value::Integer(v) => Value::Int(v),
            toml::Value::Float(v) => Value::Float(v),
            toml::Value::Boolean(v) => Value::Bool(v),
            toml::Value::Datetime(v) => convert_datetime(v)?,
            toml::Value::Array(items) => {
                let items: QueryResult<Vec<Value>> =
                    items.into_iter().map(Value::try_from).collect();
                Value::Array(items?)
            }
            toml::Value::Table(table) => {
                let mut map = IndexMap::with_capacity(table.len());
                for (key, value) in table {
                    map.insert(key, Value::try_from(value)?);
                }
                Value::Map(map)
            }
        };
        Ok(converted)
    }
}

/// TOML datetimes carry optional date, time and offset components; the three
/// combinations map onto the three temporal tags.
fn convert_datetime(value: toml::value::Datetime) -> QueryResult<Value> {
    let cast = || QueryError::Cast {
        value: value.to_string(),
        kind: "datetime",
    };
    let date = match value.date {
        Some(d) => {
            let converted = NaiveDate::from_ymd_opt(d.year.into(), d.month.into(), d.day.into());
            Some(converted.ok_or_else(cast)?)
        }
        None => None,
    };
    let time = match value.time {
        Some(t) => {
            let converted = NaiveTime::from_hms_nano_opt(
                t.hour.into(),
                t.minute.into(),
                t.second.into(),
                t.nanosecond,
            );
            Some(converted.ok_or_else(cast)?)
        }
        None => None,
    };
    match (date, time) {
        (Some(date), Some(time)) => {
            let minutes = match value.offset {
                Some(toml::value::Offset::Custom { minutes }) => minutes,
                _ => 0,
            };
            let offset =
                FixedOffset::east_opt(i32::from(minutes) * 60).ok_or_else(cast)?;
            let local = offset
                .from_local_datetime(&date.and_time(time))
                .single()
                .ok_or_else(cast)?;
            Ok(Value::DateTime(local))
        }
        (Some(date), None) => Ok(Value::Date(date)),
        (None, Some(time)) => Ok(Value::Time(time)),
        (None, None) => Err(cast()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Offset;

    #[test]
    fn test_json_scalars() {
        let doc: Value = serde_json::from_str(r#"{"a": 1, "b": 2.5, "c": true, "d": "x"}"#).unwrap();
        let Value::Map(map) = doc else { panic!("expected a table") };
        assert_eq!(map["a"], Value::Int(1));
        assert_eq!(map["b"], Value::Float(2.5));
        assert_eq!(map["c"], Value::Bool(true));
        assert_eq!(map["d"], Value::String("x".to_string()));
    }

    #[test]
    fn test_json_keeps_insertion_order() {
        let doc: Value = serde_json::from_str(r#"{"z": 1, "a": 2, "m": 3}"#).unwrap();
        let Value::Map(map) = doc else { panic!("expected a table") };
        let keys: Vec<&String> = map.keys().collect();
        assert_eq!(keys, ["z", "a", "m"]);
    }

    #[test]
    fn test_json_null_rejected() {
        let result: Result<Value, _> = serde_json::from_str(r#"{"a": null}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_json_large_unsigned_becomes_float() {
        let doc: Value = serde_json::from_str("18446744073709551615").unwrap();
        assert!(matches!(doc, Value::Float(_)));
    }

    #[test]
    fn test_toml_datetime_tags() {
        let raw: toml::Value = toml::from_str(
            "full = 2020-10-12T14:00:00Z\nday = 2020-10-12\nclock = 07:30:00\n",
        )
        .unwrap();
        let doc = Value::try_from(raw).unwrap();
        let Value::Map(map) = doc else { panic!("expected a table") };
        match &map["full"] {
            Value::DateTime(dt) => {
                assert_eq!(dt.offset().fix(), FixedOffset::east_opt(0).unwrap());
            }
            other => panic!("expected datetime, got {other}"),
        }
        assert!(matches!(map["day"], Value::Date(_)));
        assert!(matches!(map["clock"], Value::Time(_)));
    }

    #[test]
    fn test_truthiness() {
        assert!(Value::Int(1).is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::Float(0.0).is_truthy());
        assert!(Value::String("x".to_string()).is_truthy());
        assert!(!Value::String(String::new()).is_truthy());
        assert!(!Value::Array(Vec::new()).is_truthy());
        assert!(Value::Array(vec![Value::Int(0)]).is_truthy());
        assert!(!Value::Map(IndexMap::new()).is_truthy());
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Int(42).to_string(), "42");
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
        assert_eq!(Value::Bool(false).to_string(), "false");
        assert_eq!(
            Value::Array(vec![Value::Int(1), Value::Int(2)]).to_string(),
            "[1, 2]"
        );
    }
}
