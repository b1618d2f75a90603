//! Common type definitions.
//!
//! # ID Types
//!
//! Entity IDs are database-assigned integers wrapped in type aliases:
//!
//! - [`VisitorId`]: Visit request identifier (used in approval links and guard lookups)
//! - [`ResidentId`]: Resident directory entry identifier

use serde::{Deserialize, Deserializer, de};

// Type aliases for IDs
pub type VisitorId = i64;
pub type ResidentId = i64;

/// Accept an ID as either a JSON number or a numeric string.
///
/// Browser forms tend to post ids as strings (`"42"`) while API clients send numbers.
pub fn deserialize_flexible_id<'de, D>(deserializer: D) -> Result<VisitorId, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(VisitorId),
        String(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(id) => Ok(id),
        NumberOrString::String(s) => s
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("invalid visitor id: {s:?}"))),
    }
}

/// Accept a verification code as either a JSON string or number, normalized to a string.
pub fn deserialize_code<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(u64),
        String(String),
    }

    Ok(match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => n.to_string(),
        NumberOrString::String(s) => s,
    })
}
