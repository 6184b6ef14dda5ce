use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

/// Instant carried by every wire payload.
///
/// The auction backend emits zone-less local date-times
/// (`2025-03-08T14:30:00.123456`); those are read as UTC. Offset-qualified
/// RFC 3339 values are accepted as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub DateTime<Utc>);

impl Timestamp {
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Parses either an RFC 3339 value or a zone-less ISO-8601 date-time.
    ///
    /// # Errors
    /// Returns a [`chrono::ParseError`] if neither form matches.
    pub fn parse(value: &str) -> Result<Self, chrono::ParseError> {
        match DateTime::parse_from_rfc3339(value) {
            Ok(parsed) => Ok(Self(parsed.with_timezone(&Utc))),
            Err(_) => NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                // Whole minutes are rendered without seconds.
                .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M"))
                .map(|naive| Self(naive.and_utc())),
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S"))
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true))
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(|err| de::Error::custom(format!("invalid timestamp {raw:?}: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_serialization() {
        let dt = Utc.with_ymd_and_hms(2025, 3, 8, 14, 30, 0).unwrap();
        let serialized = serde_json::to_string(&Timestamp(dt)).unwrap();

        assert_eq!(serialized, "\"2025-03-08T14:30:00Z\"");
    }

    #[test]
    fn test_timestamp_deserialization_rfc3339() {
        let deserialized: Timestamp = serde_json::from_str("\"2025-03-08T16:30:00+02:00\"").unwrap();

        let expected = Utc.with_ymd_and_hms(2025, 3, 8, 14, 30, 0).unwrap();
        assert_eq!(deserialized.0, expected);
    }

    #[test]
    fn test_timestamp_deserialization_local_date_time() {
        let deserialized: Timestamp = serde_json::from_str("\"2025-03-08T14:30:00.250\"").unwrap();

        assert_eq!(deserialized.0.timestamp_millis() % 1000, 250);
        assert_eq!(deserialized.to_string(), "2025-03-08 14:30:00");
    }

    #[test]
    fn test_timestamp_without_seconds() {
        let parsed = Timestamp::parse("2025-03-08T14:30").unwrap();

        assert_eq!(parsed, Timestamp::parse("2025-03-08T14:30:00").unwrap());
    }

    #[test]
    fn test_timestamp_rejects_garbage() {
        assert!(serde_json::from_str::<Timestamp>("\"yesterday\"").is_err());
    }

    #[test]
    fn test_timestamp_ordering() {
        let earlier = Timestamp::parse("2025-03-08T14:30:00").unwrap();
        let later = Timestamp::parse("2025-03-08T14:30:01").unwrap();

        assert!(earlier < later);
    }
}
