use serde::{Deserialize, Serialize};

use crate::users::record::UserRecord;

/// Request body for registration. The core fields are optional at the serde
/// level so missing ones report as a validation error rather than a decode
/// rejection; anything else in the payload lands in `extra` and is stored
/// verbatim.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub email: Option<String>,
    pub dob: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// The part of a user record returned to clients: everything except the
/// password.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub dob: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<i64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl From<UserRecord> for PublicUser {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.id,
            username: record.username,
            email: record.email,
            dob: record.dob,
            age: record.age,
            extra: record.extra,
        }
    }
}

/// Response of the bulk age backfill.
#[derive(Debug, Serialize)]
pub struct BackfillResponse {
    pub message: String,
    #[serde(rename = "usersCount")]
    pub users_count: usize,
}
