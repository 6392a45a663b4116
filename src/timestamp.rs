use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::ops::Add;
use std::time::SystemTime;

/// A Unix timestamp represented as a `u64`, used for challenge expiry and
/// proof construction times.
///
/// Serialized as a stringified integer to avoid loss of precision in JSON,
/// e.g. `1699999999` becomes `"1699999999"` in the wire format. Servers are
/// not consistent about this, so deserialization accepts either a bare JSON
/// number or a stringified one.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Ord, Eq)]
pub struct UnixTimestamp(u64);

impl Serialize for UnixTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for UnixTimestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct TimestampVisitor;

        impl serde::de::Visitor<'_> for TimestampVisitor {
            type Value = UnixTimestamp;

            fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
                formatter.write_str("a Unix timestamp as an integer or a stringified integer")
            }

            fn visit_u64<E: serde::de::Error>(self, value: u64) -> Result<Self::Value, E> {
                Ok(UnixTimestamp(value))
            }

            fn visit_i64<E: serde::de::Error>(self, value: i64) -> Result<Self::Value, E> {
                u64::try_from(value)
                    .map(UnixTimestamp)
                    .map_err(|_| E::custom("timestamp must be non-negative"))
            }

            fn visit_str<E: serde::de::Error>(self, value: &str) -> Result<Self::Value, E> {
                value
                    .parse::<u64>()
                    .map(UnixTimestamp)
                    .map_err(|_| E::custom("timestamp must be a non-negative integer"))
            }
        }

        deserializer.deserialize_any(TimestampVisitor)
    }
}

impl Display for UnixTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add<u64> for UnixTimestamp {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        UnixTimestamp(self.0 + rhs)
    }
}

impl UnixTimestamp {
    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    pub fn now() -> Self {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .expect("SystemTime before UNIX epoch?!?")
            .as_secs();
        Self(now)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    /// Seconds elapsed since `earlier`, saturating at zero.
    pub fn seconds_since(&self, earlier: UnixTimestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_string() {
        let ts = UnixTimestamp::from_secs(1699999999);
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "\"1699999999\"");
    }

    #[test]
    fn deserializes_from_number_and_string() {
        let from_number: UnixTimestamp = serde_json::from_str("1699999999").unwrap();
        let from_string: UnixTimestamp = serde_json::from_str("\"1699999999\"").unwrap();
        assert_eq!(from_number, from_string);
        assert_eq!(from_number.as_secs(), 1699999999);
    }

    #[test]
    fn rejects_negative() {
        assert!(serde_json::from_str::<UnixTimestamp>("-5").is_err());
    }

    #[test]
    fn seconds_since_saturates() {
        let earlier = UnixTimestamp::from_secs(100);
        let later = UnixTimestamp::from_secs(160);
        assert_eq!(later.seconds_since(earlier), 60);
        assert_eq!(earlier.seconds_since(later), 0);
    }
}
