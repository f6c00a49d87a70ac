use std::sync::Arc;

use async_trait::async_trait;

use crate::conversation::UserState;
use crate::model::{
    BotConfig, ConfigField, Profile, Service, ServiceSubmenu, SocialField, SocialLink, Stats,
    SubmenuField, User,
};
use crate::{Config, StoreConfig};

mod d1;
mod memory;
mod schema;
mod sqlite;

pub(crate) use d1::D1Store;
pub(crate) use memory::MemoryStore;
pub(crate) use sqlite::SqliteStore;

#[derive(Debug, thiserror::Error)]
pub(crate) enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("remote store request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("remote store rejected query: {0}")]
    Remote(String),
    #[error("malformed row: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("config row is missing")]
    MissingConfigRow,
    #[error("store lock poisoned")]
    Poisoned,
}

pub(crate) type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub(crate) trait Store: Send + Sync {
    async fn get_config(&self) -> StoreResult<BotConfig>;
    async fn update_config(&self, field: ConfigField, value: &str) -> StoreResult<()>;

    async fn get_user(&self, user_id: i64) -> StoreResult<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    /// Inserts or refreshes the profile. `is_admin` only applies to new rows.
    async fn upsert_user(&self, profile: &Profile, is_admin: bool) -> StoreResult<User>;
    async fn all_users(&self) -> StoreResult<Vec<User>>;
    async fn admins(&self) -> StoreResult<Vec<User>>;
    async fn set_admin(&self, user_id: i64, is_admin: bool) -> StoreResult<bool>;

    async fn social_links(&self) -> StoreResult<Vec<SocialLink>>;
    async fn social_link(&self, id: i64) -> StoreResult<Option<SocialLink>>;
    async fn add_social_link(&self, name: &str, emoji: &str, url: &str) -> StoreResult<SocialLink>;
    async fn update_social_link(&self, id: i64, field: SocialField, value: &str) -> StoreResult<bool>;
    async fn delete_social_link(&self, id: i64) -> StoreResult<bool>;

    async fn submenus(&self, service: Service) -> StoreResult<Vec<ServiceSubmenu>>;
    async fn submenu(&self, id: i64) -> StoreResult<Option<ServiceSubmenu>>;
    async fn add_submenu(
        &self,
        service: Service,
        name: &str,
        text: &str,
        image: Option<&str>,
    ) -> StoreResult<ServiceSubmenu>;
    async fn update_submenu(&self, id: i64, field: SubmenuField, value: &str) -> StoreResult<bool>;
    async fn delete_submenu(&self, id: i64) -> StoreResult<bool>;

    async fn log_event(&self, event_type: &str, user_id: i64, data: Option<serde_json::Value>) -> StoreResult<()>;
    async fn stats(&self) -> StoreResult<Stats>;
}

#[async_trait]
pub(crate) trait StateStore: Send + Sync {
    async fn user_state(&self, user_id: i64) -> StoreResult<Option<UserState>>;
    async fn set_user_state(&self, user_id: i64, state: &UserState) -> StoreResult<()>;
    async fn delete_user_state(&self, user_id: i64) -> StoreResult<bool>;
}

pub(super) struct StateColumns {
    pub(super) state: Option<String>,
    pub(super) data: Option<String>,
    pub(super) message_id: Option<i64>,
}

impl StateColumns {
    pub(super) fn encode(state: &UserState) -> StoreResult<Self> {
        let pending = state.pending.as_ref().map(serde_json::to_string).transpose()?;
        let draft = if state.draft.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&state.draft)?)
        };
        Ok(StateColumns {
            state: pending,
            data: draft,
            message_id: state.last_message_id.map(i64::from),
        })
    }

    pub(super) fn decode(self) -> StoreResult<UserState> {
        let pending = self.state.as_deref().map(serde_json::from_str).transpose()?;
        let draft = self
            .data
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?
            .unwrap_or_default();
        Ok(UserState {
            pending,
            draft,
            last_message_id: self.message_id.and_then(|id| i32::try_from(id).ok()),
        })
    }
}

pub(crate) struct Stores {
    pub(crate) content: Arc<dyn Store>,
    pub(crate) states: Arc<dyn StateStore>,
}

impl Stores {
    pub(crate) fn shared<S>(backend: Arc<S>) -> Self
    where
        S: Store + StateStore + 'static,
    {
        Stores {
            content: backend.clone(),
            states: backend,
        }
    }
}

pub(crate) async fn open(config: &Config) -> anyhow::Result<Stores> {
    let seed = config.features.seed_defaults;
    let stores = match &config.store {
        StoreConfig::Memory => {
            log::info!("using in-memory store; data is lost on restart");
            Stores::shared(Arc::new(MemoryStore::new(seed)))
        }
        StoreConfig::Sqlite { path } => {
            log::info!("using sqlite store at {}", path.display());
            Stores::shared(Arc::new(SqliteStore::open(path, seed)?))
        }
        StoreConfig::D1(d1) => {
            log::info!("using D1 store {}", d1.database_id);
            Stores::shared(Arc::new(D1Store::connect(d1, seed).await?))
        }
    };
    Ok(stores)
}
