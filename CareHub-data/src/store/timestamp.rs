//! Timestamp conversion between stored documents and native dates.
//!
//! Documents written by CareHub carry RFC 3339 strings. Documents written by
//! other clients of the same store carry `{ "seconds", "nanos" }` objects.
//! Both forms are read back as `DateTime<Utc>`.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Timestamp object as written by document-store client SDKs
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StoredTimestamp {
    /// Whole seconds since the Unix epoch
    pub seconds: i64,
    /// Nanosecond fraction
    #[serde(default, alias = "nanoseconds")]
    pub nanos: u32,
}

impl StoredTimestamp {
    /// Convert to a native date, `None` when out of range
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.seconds, self.nanos).single()
    }
}

impl From<DateTime<Utc>> for StoredTimestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self {
            seconds: value.timestamp(),
            nanos: value.timestamp_subsec_nanos(),
        }
    }
}

/// Encode a date the way CareHub writes it into documents
pub fn timestamp_value(value: DateTime<Utc>) -> Value {
    Value::String(value.to_rfc3339_opts(SecondsFormat::Micros, true))
}

/// Decode a stored timestamp in either object or string form
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Object(map) if map.contains_key("seconds") => {
            serde_json::from_value::<StoredTimestamp>(value.clone())
                .ok()
                .and_then(StoredTimestamp::to_datetime)
        }
        _ => None,
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TimestampRepr {
    Object(StoredTimestamp),
    Text(String),
}

impl TimestampRepr {
    fn into_datetime<E: serde::de::Error>(self) -> Result<DateTime<Utc>, E> {
        match self {
            TimestampRepr::Object(ts) => ts
                .to_datetime()
                .ok_or_else(|| E::custom(format!("timestamp out of range: {}s", ts.seconds))),
            TimestampRepr::Text(s) => DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| E::custom(format!("invalid timestamp '{}': {}", s, e))),
        }
    }
}

/// Serde adapter for required timestamp fields
pub mod as_timestamp {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Micros, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        TimestampRepr::deserialize(deserializer)?.into_datetime()
    }
}

/// Serde adapter for optional timestamp fields
pub mod as_timestamp_opt {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(dt) => serializer.serialize_some(&dt.to_rfc3339_opts(SecondsFormat::Micros, true)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<TimestampRepr>::deserialize(deserializer)? {
            Some(repr) => repr.into_datetime().map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize)]
    struct Stamped {
        #[serde(with = "as_timestamp")]
        at: DateTime<Utc>,
        #[serde(default, with = "as_timestamp_opt")]
        until: Option<DateTime<Utc>>,
    }

    #[test]
    fn test_reads_object_form() {
        let stamped: Stamped = serde_json::from_value(json!({
            "at": { "seconds": 1_700_000_000, "nanoseconds": 500 },
        }))
        .unwrap();
        assert_eq!(stamped.at.timestamp(), 1_700_000_000);
        assert_eq!(stamped.at.timestamp_subsec_nanos(), 500);
        assert!(stamped.until.is_none());
    }

    #[test]
    fn test_reads_string_form() {
        let stamped: Stamped = serde_json::from_value(json!({
            "at": "2024-03-01T09:30:00Z",
            "until": "2024-03-02T09:30:00+02:00",
        }))
        .unwrap();
        assert_eq!(stamped.at, Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap());
        assert_eq!(stamped.until, Some(Utc.with_ymd_and_hms(2024, 3, 2, 7, 30, 0).unwrap()));
    }

    #[test]
    fn test_rejects_garbage() {
        let result = serde_json::from_value::<Stamped>(json!({ "at": "yesterday" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_timestamp_both_forms_agree() {
        let dt = Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap();
        let object = serde_json::to_value(StoredTimestamp::from(dt)).unwrap();
        assert_eq!(parse_timestamp(&object), Some(dt));
        assert_eq!(parse_timestamp(&timestamp_value(dt)), Some(dt));
        assert_eq!(parse_timestamp(&json!(42)), None);
    }
}
