use std::sync::Arc;

use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime};
use tracing::{info, warn};

use crate::error::ApiError;
use crate::store::RecordStore;
use crate::users::dto::{LoginRequest, PublicUser, RegisterRequest};
use crate::users::record::UserRecord;

const DOB_FORMAT: &[BorrowedFormatItem<'_>] = format_description!("[year]-[month]-[day]");

/// Compares a supplied password against the stored credential.
///
/// The production binding is plaintext equality, inherited from the original
/// store format. The trait exists so a hashing verifier can slot in without
/// touching the service.
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, supplied: &str, stored: &str) -> bool;
}

pub struct PlaintextVerifier;

impl CredentialVerifier for PlaintextVerifier {
    fn verify(&self, supplied: &str, stored: &str) -> bool {
        supplied == stored
    }
}

/// Age in whole years at `today`, from a `YYYY-MM-DD` date of birth.
///
/// Subtracts one when the birthday has not yet occurred this year. Shared by
/// registration, the login response, and the bulk backfill so the three paths
/// cannot diverge.
pub fn compute_age(dob: &str, today: Date) -> Result<i64, ApiError> {
    let birth = Date::parse(dob, DOB_FORMAT)
        .map_err(|_| ApiError::Validation(format!("Invalid date of birth: {dob}")))?;
    let mut age = i64::from(today.year() - birth.year());
    if (u8::from(today.month()), today.day()) < (u8::from(birth.month()), birth.day()) {
        age -= 1;
    }
    Ok(age)
}

/// New record id: current Unix time in milliseconds. Monotonic-ish; two
/// registrations in the same millisecond could collide, which the store
/// format accepts.
fn next_id() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

fn required(value: Option<String>, field: &'static str) -> Result<String, ApiError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ApiError::Validation(format!("{field} is required"))),
    }
}

/// Business rules over the record store: registration, login, lookups, and
/// the age backfill. Reads the whole set, works on it in memory, writes the
/// whole set back on mutation.
#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn RecordStore>,
    verifier: Arc<dyn CredentialVerifier>,
}

impl AccountService {
    pub fn new(store: Arc<dyn RecordStore>, verifier: Arc<dyn CredentialVerifier>) -> Self {
        Self { store, verifier }
    }

    pub async fn register(&self, payload: RegisterRequest) -> Result<PublicUser, ApiError> {
        let username = required(payload.username, "username")?;
        let password = required(payload.password, "password")?;
        let email = required(payload.email, "email")?;
        let dob = required(payload.dob, "dob")?;

        let age = compute_age(&dob, OffsetDateTime::now_utc().date())?;

        let mut records = self.store.load().await;
        if records.iter().any(|r| r.username == username) {
            warn!(%username, "registration rejected, username taken");
            return Err(ApiError::DuplicateUsername);
        }

        let record = UserRecord {
            id: next_id(),
            username,
            password,
            email,
            dob,
            age: Some(age),
            extra: payload.extra,
        };
        records.push(record.clone());
        self.store
            .save(&records)
            .await
            .map_err(|e| ApiError::storage("Failed to register user", e))?;

        info!(user_id = record.id, username = %record.username, "user registered");
        Ok(record.into())
    }

    pub async fn login(&self, req: LoginRequest) -> Result<PublicUser, ApiError> {
        let records = self.store.load().await;
        let mut user = records
            .into_iter()
            .find(|r| r.username == req.username && self.verifier.verify(&req.password, &r.password))
            .ok_or_else(|| {
                warn!(username = %req.username, "login failed");
                ApiError::InvalidCredentials
            })?;

        // Derived for the response only. The stored record keeps its missing
        // age until the next registration-time write or a bulk backfill.
        if user.age.is_none() && !user.dob.is_empty() {
            user.age = compute_age(&user.dob, OffsetDateTime::now_utc().date()).ok();
        }

        info!(user_id = user.id, username = %user.username, "user logged in");
        Ok(user.into())
    }

    /// Fills in `age` for every record that has a dob but no stored age, then
    /// writes the set back. The write happens even when nothing changed.
    pub async fn backfill_ages(&self) -> Result<(usize, usize), ApiError> {
        let today = OffsetDateTime::now_utc().date();
        let mut records = self.store.load().await;

        let mut updated = 0;
        for record in records.iter_mut() {
            if record.age.is_none() && !record.dob.is_empty() {
                match compute_age(&record.dob, today) {
                    Ok(age) => {
                        record.age = Some(age);
                        updated += 1;
                    }
                    Err(_) => {
                        warn!(user_id = record.id, dob = %record.dob, "skipping unparseable dob")
                    }
                }
            }
        }

        let total = records.len();
        self.store
            .save(&records)
            .await
            .map_err(|e| ApiError::storage("Failed to update ages", e))?;

        info!(updated, total, "age backfill complete");
        Ok((updated, total))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<PublicUser, ApiError> {
        self.store
            .load()
            .await
            .into_iter()
            .find(|r| r.id == id)
            .map(PublicUser::from)
            .ok_or(ApiError::NotFound)
    }

    pub async fn list_all(&self) -> Vec<PublicUser> {
        self.store
            .load()
            .await
            .into_iter()
            .map(PublicUser::from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use time::macros::date;

    fn service_with(store: Arc<MemoryStore>) -> AccountService {
        AccountService::new(store, Arc::new(PlaintextVerifier))
    }

    fn register_payload(username: &str) -> RegisterRequest {
        RegisterRequest {
            username: Some(username.into()),
            password: Some("hunter2".into()),
            email: Some(format!("{username}@example.com")),
            dob: Some("2000-06-15".into()),
            extra: serde_json::Map::new(),
        }
    }

    fn stored_record(id: i64, username: &str, age: Option<i64>) -> UserRecord {
        UserRecord {
            id,
            username: username.into(),
            password: "hunter2".into(),
            email: format!("{username}@example.com"),
            dob: "2000-06-15".into(),
            age,
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn age_boundary_around_birthday() {
        assert_eq!(compute_age("2000-06-15", date!(2023 - 06 - 14)).unwrap(), 22);
        assert_eq!(compute_age("2000-06-15", date!(2023 - 06 - 15)).unwrap(), 23);
        assert_eq!(compute_age("2000-06-15", date!(2023 - 06 - 16)).unwrap(), 23);
        assert_eq!(compute_age("2000-06-15", date!(2023 - 12 - 31)).unwrap(), 23);
    }

    #[test]
    fn age_rejects_malformed_dob() {
        let err = compute_age("15/06/2000", date!(2023 - 06 - 15)).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn plaintext_verifier_is_exact_and_case_sensitive() {
        let v = PlaintextVerifier;
        assert!(v.verify("hunter2", "hunter2"));
        assert!(!v.verify("Hunter2", "hunter2"));
        assert!(!v.verify("hunter2 ", "hunter2"));
    }

    #[tokio::test]
    async fn register_then_list_contains_exactly_one_match() {
        let svc = service_with(Arc::new(MemoryStore::default()));

        let created = svc.register(register_payload("ada")).await.unwrap();
        assert_eq!(created.username, "ada");
        assert!(created.age.is_some());

        let listed = svc.list_all().await;
        assert_eq!(
            listed.iter().filter(|u| u.username == "ada").count(),
            1
        );
        let json = serde_json::to_string(&listed).unwrap();
        assert!(!json.contains("password"));
    }

    #[tokio::test]
    async fn register_persists_extra_fields_verbatim() {
        let store = Arc::new(MemoryStore::default());
        let svc = service_with(store.clone());

        let mut payload = register_payload("ada");
        payload
            .extra
            .insert("fullName".into(), serde_json::json!("Ada Lovelace"));
        svc.register(payload).await.unwrap();

        let records = store.snapshot();
        assert_eq!(records[0].extra["fullName"], "Ada Lovelace");
    }

    #[tokio::test]
    async fn duplicate_username_rejected_and_store_unchanged() {
        let store = Arc::new(MemoryStore::default());
        let svc = service_with(store.clone());

        svc.register(register_payload("ada")).await.unwrap();
        let count_before = store.snapshot().len();
        let saves_before = store.save_count();

        let err = svc.register(register_payload("ada")).await.unwrap_err();
        assert!(matches!(err, ApiError::DuplicateUsername));
        assert_eq!(store.snapshot().len(), count_before);
        assert_eq!(store.save_count(), saves_before);
    }

    #[tokio::test]
    async fn register_requires_core_fields() {
        let svc = service_with(Arc::new(MemoryStore::default()));
        let mut payload = register_payload("ada");
        payload.dob = None;
        let err = svc.register(payload).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn login_matches_stored_credentials() {
        let svc = service_with(Arc::new(MemoryStore::default()));
        let created = svc.register(register_payload("ada")).await.unwrap();

        let user = svc
            .login(LoginRequest {
                username: "ada".into(),
                password: "hunter2".into(),
            })
            .await
            .unwrap();
        assert_eq!(user.id, created.id);
        assert_eq!(user.email, created.email);
    }

    #[tokio::test]
    async fn login_rejects_bad_password_and_unknown_username() {
        let svc = service_with(Arc::new(MemoryStore::default()));
        svc.register(register_payload("ada")).await.unwrap();

        for (username, password) in [("ada", "wrong"), ("nobody", "hunter2")] {
            let err = svc
                .login(LoginRequest {
                    username: username.into(),
                    password: password.into(),
                })
                .await
                .unwrap_err();
            assert!(matches!(err, ApiError::InvalidCredentials));
        }
    }

    #[tokio::test]
    async fn login_computes_age_but_does_not_persist_it() {
        let store = Arc::new(MemoryStore::with_records(vec![stored_record(
            1, "ada", None,
        )]));
        let svc = service_with(store.clone());

        let user = svc
            .login(LoginRequest {
                username: "ada".into(),
                password: "hunter2".into(),
            })
            .await
            .unwrap();
        assert!(user.age.is_some());

        // read-mostly path: nothing written, stored record still lacks age
        assert_eq!(store.save_count(), 0);
        assert!(store.snapshot()[0].age.is_none());
    }

    #[tokio::test]
    async fn backfill_updates_missing_ages_and_is_idempotent() {
        let store = Arc::new(MemoryStore::with_records(vec![
            stored_record(1, "ada", None),
            stored_record(2, "brian", Some(40)),
        ]));
        let svc = service_with(store.clone());

        let (updated, total) = svc.backfill_ages().await.unwrap();
        assert_eq!((updated, total), (1, 2));
        assert!(store.snapshot()[0].age.is_some());
        // stored age untouched even if stale
        assert_eq!(store.snapshot()[1].age, Some(40));

        let (updated, total) = svc.backfill_ages().await.unwrap();
        assert_eq!((updated, total), (0, 2));
        // the second run still writes the document back
        assert_eq!(store.save_count(), 2);
    }

    #[tokio::test]
    async fn backfill_skips_unparseable_dob() {
        let mut bad = stored_record(1, "ada", None);
        bad.dob = "not-a-date".into();
        let store = Arc::new(MemoryStore::with_records(vec![bad]));
        let svc = service_with(store.clone());

        let (updated, total) = svc.backfill_ages().await.unwrap();
        assert_eq!((updated, total), (0, 1));
        assert!(store.snapshot()[0].age.is_none());
    }

    #[tokio::test]
    async fn get_by_id_hit_and_miss() {
        let svc = service_with(Arc::new(MemoryStore::with_records(vec![stored_record(
            42,
            "ada",
            Some(23),
        )])));

        let user = svc.get_by_id(42).await.unwrap();
        assert_eq!(user.username, "ada");

        let err = svc.get_by_id(7).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound));
    }
}
