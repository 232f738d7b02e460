use serde::{Deserialize, Serialize};

/// User record as persisted in the store.
///
/// `password` is plaintext by inherited contract; it never leaves the process
/// because responses go through [`crate::users::dto::PublicUser`]. Fields the
/// store has no schema for are kept verbatim in `extra` so registration
/// payloads round-trip untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub password: String,
    pub email: String,
    pub dob: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<i64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
