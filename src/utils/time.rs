use serde::{Deserialize, Deserializer, Serializer};
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

/// The instant `days` from now, or `None` for an entry that never expires.
pub fn expiry_after_days(days: Option<u32>) -> Option<OffsetDateTime> {
    days.map(|days| OffsetDateTime::now_utc() + Duration::days(i64::from(days)))
}

/// Serialize an optional expiry as an RFC 3339 string or null.
pub fn serialize<S>(expires: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match expires {
        Some(at) => {
            let s = at.format(&Rfc3339).map_err(serde::ser::Error::custom)?;
            serializer.serialize_some(&s)
        }
        None => serializer.serialize_none(),
    }
}

/// Deserialize an optional RFC 3339 expiry; null or absent means never.
pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(s) => OffsetDateTime::parse(&s, &Rfc3339)
            .map(Some)
            .map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}
