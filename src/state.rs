use std::sync::Arc;

use crate::config::AppConfig;
use crate::store::{JsonFileStore, RecordStore};
use crate::users::service::{AccountService, CredentialVerifier, PlaintextVerifier};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub verifier: Arc<dyn CredentialVerifier>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let store = Arc::new(JsonFileStore::new(&config.users_file)) as Arc<dyn RecordStore>;
        Ok(Self {
            store,
            verifier: Arc::new(PlaintextVerifier),
            config,
        })
    }

    pub fn accounts(&self) -> AccountService {
        AccountService::new(self.store.clone(), self.verifier.clone())
    }
}
