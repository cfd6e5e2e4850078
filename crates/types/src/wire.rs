//! Serde helpers for the Kinesis JSON wire encoding.
//!
//! Blobs travel as base64 strings, 128-bit hash keys as decimal strings and
//! timestamps as fractional epoch seconds.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serializer, de::Error};

/// Base64 (standard alphabet, padded) byte payloads.
pub mod blob {
    use base64::{Engine, engine::general_purpose::STANDARD};

    use super::*;

    pub fn serialize<T, S>(data: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: AsRef<[u8]>,
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(data.as_ref()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| D::Error::custom(format!("Base64 decoding failed: {}", e)))
    }
}

/// Unsigned 128-bit integers rendered as decimal strings.
pub mod decimal {
    use super::*;

    pub fn serialize<S>(value: &u128, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u128, D::Error>
    where
        D: Deserializer<'de>,
    {
        let digits = String::deserialize(deserializer)?;
        digits.parse().map_err(D::Error::custom)
    }
}

/// Timestamps as epoch seconds with millisecond precision.
pub mod epoch_seconds {
    use super::*;

    pub fn serialize<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(ts.timestamp_millis() as f64 / 1000.0)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        from_secs(secs).ok_or_else(|| D::Error::custom(format!("Timestamp out of range: {}", secs)))
    }

    pub(crate) fn from_secs(secs: f64) -> Option<DateTime<Utc>> {
        if !secs.is_finite() {
            return None;
        }
        Utc.timestamp_millis_opt((secs * 1000.0).round() as i64).single()
    }

    pub mod option {
        use super::*;

        pub fn serialize<S>(ts: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match ts {
                Some(ts) => super::serialize(ts, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
        where
            D: Deserializer<'de>,
        {
            match Option::<f64>::deserialize(deserializer)? {
                Some(secs) => from_secs(secs).map(Some).ok_or_else(|| {
                    D::Error::custom(format!("Timestamp out of range: {}", secs))
                }),
                None => Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        #[serde(with = "blob")]
        data: Vec<u8>,
        #[serde(with = "decimal")]
        key: u128,
        #[serde(with = "epoch_seconds")]
        at: DateTime<Utc>,
    }

    #[test]
    fn test_wire_encoding() {
        let sample = Sample {
            data: b"hello".to_vec(),
            key: u128::MAX,
            at: Utc.timestamp_millis_opt(1_430_000_000_250).unwrap(),
        };
        let json = serde_json::to_value(&sample).unwrap();
        assert_eq!(json["data"], "aGVsbG8=");
        assert_eq!(json["key"], "340282366920938463463374607431768211455");
        assert_eq!(json["at"], 1_430_000_000.25);

        let back: Sample = serde_json::from_value(json).unwrap();
        assert_eq!(back, sample);
    }

    #[test]
    fn test_invalid_blob_rejected() {
        let json = serde_json::json!({"data": "!!!", "key": "1", "at": 0});
        let err = serde_json::from_value::<Sample>(json).unwrap_err();
        assert!(err.to_string().contains("Base64"));
    }
}
