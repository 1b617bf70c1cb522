//! Rows of synchronized tables.

use crate::error::{ProtocolError, ProtocolResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A row in a synchronized table.
///
/// Every row carries an `id` and an `updatedAt` timestamp; all other columns
/// are kept as an open JSON object and flattened on the wire. `updated_at` is
/// the only signal used to arbitrate conflicts.
///
/// Numeric ids are held in their decimal string form so rows can be keyed
/// uniformly, but the record remembers that the id arrived as a number and
/// writes it back as one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireRecord", into = "Value")]
pub struct Record {
    /// Primary key.
    pub id: String,
    /// Last modification time, advanced by the owning store on every write.
    pub updated_at: DateTime<Utc>,
    /// Every other column.
    pub fields: Map<String, Value>,
    numeric_id: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRecord {
    id: Value,
    updated_at: DateTime<Utc>,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl TryFrom<WireRecord> for Record {
    type Error = String;

    fn try_from(wire: WireRecord) -> Result<Self, Self::Error> {
        let (id, numeric_id) = match wire.id {
            Value::String(id) => (id, false),
            Value::Number(n) => (n.to_string(), true),
            other => return Err(format!("id must be a string or number, got {other}")),
        };
        Ok(Self {
            id,
            updated_at: wire.updated_at,
            fields: wire.fields,
            numeric_id,
        })
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        record.to_value()
    }
}

impl Record {
    /// Creates a record with no columns besides `id` and `updatedAt`.
    pub fn new(id: impl Into<String>, updated_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            updated_at,
            fields: Map::new(),
            numeric_id: false,
        }
    }

    /// Creates a record whose id is written as a JSON number.
    pub fn with_numeric_id(id: u64, updated_at: DateTime<Utc>) -> Self {
        Self {
            numeric_id: true,
            ..Self::new(id.to_string(), updated_at)
        }
    }

    /// Returns the id in its original JSON form.
    pub fn id_value(&self) -> Value {
        if self.numeric_id {
            if let Ok(n) = self.id.parse::<serde_json::Number>() {
                return Value::Number(n);
            }
        }
        Value::String(self.id.clone())
    }

    /// Sets a column.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Returns a column value.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Returns true if both records hold the same content, ignoring `updatedAt`.
    pub fn same_content(&self, other: &Record) -> bool {
        self.id == other.id && self.fields == other.fields
    }

    /// Parses a record from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidRecord`] if `id` or `updatedAt` is
    /// missing or malformed.
    pub fn from_value(value: Value) -> ProtocolResult<Self> {
        serde_json::from_value(value).map_err(|e| ProtocolError::InvalidRecord(e.to_string()))
    }

    /// Converts the record into its flattened JSON form.
    pub fn to_value(&self) -> Value {
        let mut map = self.fields.clone();
        map.insert("id".into(), self.id_value());
        map.insert(
            "updatedAt".into(),
            Value::String(self.updated_at.to_rfc3339()),
        );
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn flattened_wire_form() {
        let record = Record::new("1", t0()).with_field("name", "Espresso");
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["id"], "1");
        assert_eq!(value["name"], "Espresso");
        assert!(value.get("fields").is_none());

        let parsed = Record::from_value(value).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn numeric_ids_become_strings() {
        let record = Record::from_value(json!({
            "id": 7,
            "updatedAt": "2024-03-01T09:00:00Z",
            "price": 350
        }))
        .unwrap();
        assert_eq!(record.id, "7");
        assert_eq!(record.field("price"), Some(&json!(350)));
    }

    #[test]
    fn numeric_ids_are_written_back_as_numbers() {
        let record = Record::from_value(json!({
            "id": 7,
            "updatedAt": "2024-03-01T09:00:00Z"
        }))
        .unwrap();
        assert_eq!(record.to_value()["id"], json!(7));
        assert_eq!(serde_json::to_value(&record).unwrap()["id"], json!(7));

        let text = Record::new("7", t0());
        assert_eq!(text.to_value()["id"], json!("7"));
        assert!(text.same_content(&record));
        assert_eq!(Record::with_numeric_id(7, t0()), record);
    }

    #[test]
    fn non_scalar_id_is_invalid() {
        let result = Record::from_value(json!({"id": [1], "updatedAt": "2024-03-01T09:00:00Z"}));
        assert!(matches!(result, Err(ProtocolError::InvalidRecord(_))));
    }

    #[test]
    fn missing_timestamp_is_invalid() {
        let result = Record::from_value(json!({"id": "1", "name": "x"}));
        assert!(matches!(result, Err(ProtocolError::InvalidRecord(_))));
    }

    #[test]
    fn content_comparison_ignores_timestamp() {
        let a = Record::new("1", t0()).with_field("name", "Latte");
        let b = Record::new("1", t0() + Duration::hours(1)).with_field("name", "Latte");
        let c = b.clone().with_field("name", "Mocha");

        assert!(a.same_content(&b));
        assert!(!a.same_content(&c));
    }

    #[test]
    fn to_value_matches_serde() {
        let record = Record::new("9", t0()).with_field("qty", 3);
        let manual = record.to_value();
        assert_eq!(Record::from_value(manual).unwrap(), record);
    }
}
