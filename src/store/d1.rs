use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::schema::Tables;
use super::{StateColumns, StateStore, Store, StoreError, StoreResult};
use crate::conversation::UserState;
use crate::model::{
    BotConfig, ConfigField, ConfigRow, Profile, Service, ServiceSubmenu, SocialField, SocialLink,
    Stats, SubmenuField, User, CONFIG_COLUMNS, DEFAULT_SOCIALS, DEFAULT_SUBMENUS,
};
use crate::D1Config;

pub(crate) struct D1Store {
    client: reqwest::Client,
    endpoint: String,
    api_token: String,
    tables: Tables,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    #[serde(default)]
    result: Vec<QueryResult>,
}

#[derive(Deserialize)]
struct ApiMessage {
    message: String,
}

#[derive(Deserialize, Debug, Default)]
struct QueryResult {
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    meta: Meta,
}

#[derive(Deserialize, Debug, Default)]
struct Meta {
    last_row_id: Option<i64>,
    #[serde(default)]
    changes: i64,
}

fn parse_response(body: &str) -> StoreResult<QueryResult> {
    let envelope: Envelope = serde_json::from_str(body)?;
    if !envelope.success {
        let messages: Vec<_> = envelope.errors.into_iter().map(|e| e.message).collect();
        let message = if messages.is_empty() {
            "unknown error".to_string()
        } else {
            messages.join("; ")
        };
        return Err(StoreError::Remote(message));
    }
    envelope
        .result
        .into_iter()
        .next()
        .ok_or_else(|| StoreError::Remote("response carried no result".to_string()))
}

fn decode_rows<T: DeserializeOwned>(result: QueryResult) -> StoreResult<Vec<T>> {
    result
        .results
        .into_iter()
        .map(|row| serde_json::from_value(row).map_err(StoreError::from))
        .collect()
}

#[derive(Deserialize)]
struct UserRow {
    user_id: i64,
    username: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    #[serde(default)]
    is_admin: i64,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            user_id: row.user_id,
            username: row.username,
            first_name: row.first_name,
            last_name: row.last_name,
            is_admin: row.is_admin != 0,
        }
    }
}

#[derive(Deserialize)]
struct SocialRow {
    id: i64,
    name: String,
    emoji: String,
    url: String,
    #[serde(default)]
    position: i64,
    #[serde(default)]
    is_active: i64,
}

impl From<SocialRow> for SocialLink {
    fn from(row: SocialRow) -> Self {
        SocialLink {
            id: row.id,
            name: row.name,
            emoji: row.emoji,
            url: row.url,
            position: row.position,
            is_active: row.is_active != 0,
        }
    }
}

#[derive(Deserialize)]
struct SubmenuRow {
    id: i64,
    service_type: String,
    name: String,
    text: Option<String>,
    image: Option<String>,
    #[serde(default)]
    position: i64,
    #[serde(default)]
    is_active: i64,
}

impl TryFrom<SubmenuRow> for ServiceSubmenu {
    type Error = StoreError;

    fn try_from(row: SubmenuRow) -> StoreResult<Self> {
        let service = Service::parse(&row.service_type)
            .ok_or_else(|| StoreError::Remote(format!("unknown service {:?}", row.service_type)))?;
        Ok(ServiceSubmenu {
            id: row.id,
            service,
            name: row.name,
            text: row.text,
            image: row.image,
            position: row.position,
            is_active: row.is_active != 0,
        })
    }
}

#[derive(Deserialize)]
struct StatsRow {
    total_users: i64,
    total_starts: i64,
    total_admins: i64,
    starts_today: i64,
    starts_this_week: i64,
}

#[derive(Deserialize)]
struct StateRow {
    state: Option<String>,
    data: Option<String>,
    message_id: Option<i64>,
}

#[derive(Deserialize)]
struct CountRow {
    count: i64,
}

impl D1Store {
    pub(crate) async fn connect(config: &D1Config, seed: bool) -> StoreResult<Self> {
        let endpoint = format!(
            "{}/accounts/{}/d1/database/{}/query",
            config.api_base.trim_end_matches('/'),
            config.account_id,
            config.database_id
        );
        let store = D1Store {
            client: reqwest::Client::new(),
            endpoint,
            api_token: config.api_token.clone(),
            tables: Tables::new("bot_"),
        };
        for statement in store.tables.statements() {
            store.query(&statement, Vec::new()).await?;
        }
        if seed {
            store.seed_defaults().await?;
        }
        Ok(store)
    }

    async fn query(&self, sql: &str, params: Vec<Value>) -> StoreResult<QueryResult> {
        let body = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_token)
            .json(&json!({ "sql": sql, "params": params }))
            .send()
            .await?
            .text()
            .await?;
        parse_response(&body)
    }

    async fn rows<T: DeserializeOwned>(&self, sql: &str, params: Vec<Value>) -> StoreResult<Vec<T>> {
        decode_rows(self.query(sql, params).await?)
    }

    async fn first<T: DeserializeOwned>(&self, sql: &str, params: Vec<Value>) -> StoreResult<Option<T>> {
        Ok(self.rows(sql, params).await?.into_iter().next())
    }

    async fn changes(&self, sql: &str, params: Vec<Value>) -> StoreResult<i64> {
        Ok(self.query(sql, params).await?.meta.changes)
    }

    async fn count(&self, table: &str) -> StoreResult<i64> {
        let sql = format!("SELECT COUNT(*) AS count FROM {table}");
        let row: Option<CountRow> = self.first(&sql, Vec::new()).await?;
        Ok(row.map(|row| row.count).unwrap_or_default())
    }

    async fn seed_defaults(&self) -> StoreResult<()> {
        if self.count(&self.tables.socials).await? == 0 {
            let sql = format!(
                "INSERT INTO {} (name, emoji, url, position) VALUES (?, ?, ?, ?)",
                self.tables.socials
            );
            for (position, social) in (1i64..).zip(DEFAULT_SOCIALS.iter()) {
                self.query(&sql, vec![json!(social.name), json!(social.emoji), json!(social.url), json!(position)])
                    .await?;
            }
        }
        if self.count(&self.tables.submenus).await? == 0 {
            let sql = format!(
                "INSERT INTO {} (service_type, name, text, position) VALUES (?, ?, ?, ?)",
                self.tables.submenus
            );
            for service in Service::ALL {
                let entries = DEFAULT_SUBMENUS.iter().filter(|(s, _, _)| *s == service);
                for (position, (_, name, text)) in (1i64..).zip(entries) {
                    self.query(&sql, vec![json!(service.key()), json!(name), json!(text), json!(position)])
                        .await?;
                }
            }
        }
        Ok(())
    }

    fn inserted_id(result: &QueryResult) -> StoreResult<i64> {
        result
            .meta
            .last_row_id
            .ok_or_else(|| StoreError::Remote("insert did not report a row id".to_string()))
    }
}

#[async_trait]
impl Store for D1Store {
    async fn get_config(&self) -> StoreResult<BotConfig> {
        let sql = format!("SELECT {CONFIG_COLUMNS} FROM {} WHERE id = 1", self.tables.config);
        let row: Option<ConfigRow> = self.first(&sql, Vec::new()).await?;
        row.map(BotConfig::from).ok_or(StoreError::MissingConfigRow)
    }

    async fn update_config(&self, field: ConfigField, value: &str) -> StoreResult<()> {
        let sql = format!(
            "UPDATE {} SET {} = ?, updated_at = CURRENT_TIMESTAMP WHERE id = 1",
            self.tables.config,
            field.column()
        );
        if self.changes(&sql, vec![json!(value)]).await? == 0 {
            return Err(StoreError::MissingConfigRow);
        }
        Ok(())
    }

    async fn get_user(&self, user_id: i64) -> StoreResult<Option<User>> {
        let sql = format!("SELECT * FROM {} WHERE user_id = ?", self.tables.users);
        let row: Option<UserRow> = self.first(&sql, vec![json!(user_id)]).await?;
        Ok(row.map(User::from))
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT * FROM {} WHERE username = ? LIMIT 1", self.tables.users);
        let row: Option<UserRow> = self.first(&sql, vec![json!(username)]).await?;
        Ok(row.map(User::from))
    }

    async fn upsert_user(&self, profile: &Profile, is_admin: bool) -> StoreResult<User> {
        let sql = format!(
            "INSERT INTO {} (user_id, username, first_name, last_name, is_admin)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                username = excluded.username,
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                last_seen = CURRENT_TIMESTAMP",
            self.tables.users
        );
        self.query(
            &sql,
            vec![
                json!(profile.user_id),
                json!(profile.username),
                json!(profile.first_name),
                json!(profile.last_name),
                json!(i64::from(is_admin)),
            ],
        )
        .await?;
        self.get_user(profile.user_id)
            .await?
            .ok_or_else(|| StoreError::Remote(format!("user {} vanished after upsert", profile.user_id)))
    }

    async fn all_users(&self) -> StoreResult<Vec<User>> {
        let sql = format!("SELECT * FROM {} ORDER BY created_at DESC", self.tables.users);
        let rows: Vec<UserRow> = self.rows(&sql, Vec::new()).await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn admins(&self) -> StoreResult<Vec<User>> {
        let sql = format!("SELECT * FROM {} WHERE is_admin = 1 ORDER BY user_id", self.tables.users);
        let rows: Vec<UserRow> = self.rows(&sql, Vec::new()).await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn set_admin(&self, user_id: i64, is_admin: bool) -> StoreResult<bool> {
        let sql = format!("UPDATE {} SET is_admin = ? WHERE user_id = ?", self.tables.users);
        let changed = self
            .changes(&sql, vec![json!(i64::from(is_admin)), json!(user_id)])
            .await?;
        Ok(changed > 0)
    }

    async fn social_links(&self) -> StoreResult<Vec<SocialLink>> {
        let sql = format!(
            "SELECT * FROM {} WHERE is_active = 1 ORDER BY position, id",
            self.tables.socials
        );
        let rows: Vec<SocialRow> = self.rows(&sql, Vec::new()).await?;
        Ok(rows.into_iter().map(SocialLink::from).collect())
    }

    async fn social_link(&self, id: i64) -> StoreResult<Option<SocialLink>> {
        let sql = format!("SELECT * FROM {} WHERE id = ?", self.tables.socials);
        let row: Option<SocialRow> = self.first(&sql, vec![json!(id)]).await?;
        Ok(row.map(SocialLink::from))
    }

    async fn add_social_link(&self, name: &str, emoji: &str, url: &str) -> StoreResult<SocialLink> {
        let table = &self.tables.socials;
        let sql = format!(
            "INSERT INTO {table} (name, emoji, url, position)
             VALUES (?, ?, ?, (SELECT COALESCE(MAX(position), 0) + 1 FROM {table}))"
        );
        let result = self
            .query(&sql, vec![json!(name), json!(emoji), json!(url)])
            .await?;
        let id = Self::inserted_id(&result)?;
        self.social_link(id)
            .await?
            .ok_or_else(|| StoreError::Remote(format!("social link {id} vanished after insert")))
    }

    async fn update_social_link(&self, id: i64, field: SocialField, value: &str) -> StoreResult<bool> {
        let sql = format!("UPDATE {} SET {} = ? WHERE id = ?", self.tables.socials, field.column());
        Ok(self.changes(&sql, vec![json!(value), json!(id)]).await? > 0)
    }

    async fn delete_social_link(&self, id: i64) -> StoreResult<bool> {
        let sql = format!("DELETE FROM {} WHERE id = ?", self.tables.socials);
        Ok(self.changes(&sql, vec![json!(id)]).await? > 0)
    }

    async fn submenus(&self, service: Service) -> StoreResult<Vec<ServiceSubmenu>> {
        let sql = format!(
            "SELECT * FROM {} WHERE service_type = ? AND is_active = 1 ORDER BY position, id",
            self.tables.submenus
        );
        let rows: Vec<SubmenuRow> = self.rows(&sql, vec![json!(service.key())]).await?;
        rows.into_iter().map(ServiceSubmenu::try_from).collect()
    }

    async fn submenu(&self, id: i64) -> StoreResult<Option<ServiceSubmenu>> {
        let sql = format!("SELECT * FROM {} WHERE id = ?", self.tables.submenus);
        let row: Option<SubmenuRow> = self.first(&sql, vec![json!(id)]).await?;
        row.map(ServiceSubmenu::try_from).transpose()
    }

    async fn add_submenu(
        &self,
        service: Service,
        name: &str,
        text: &str,
        image: Option<&str>,
    ) -> StoreResult<ServiceSubmenu> {
        let table = &self.tables.submenus;
        let sql = format!(
            "INSERT INTO {table} (service_type, name, text, image, position)
             VALUES (?1, ?2, ?3, ?4,
                (SELECT COALESCE(MAX(position), 0) + 1 FROM {table} WHERE service_type = ?1))"
        );
        let result = self
            .query(&sql, vec![json!(service.key()), json!(name), json!(text), json!(image)])
            .await?;
        let id = Self::inserted_id(&result)?;
        self.submenu(id)
            .await?
            .ok_or_else(|| StoreError::Remote(format!("submenu {id} vanished after insert")))
    }

    async fn update_submenu(&self, id: i64, field: SubmenuField, value: &str) -> StoreResult<bool> {
        let sql = format!("UPDATE {} SET {} = ? WHERE id = ?", self.tables.submenus, field.column());
        Ok(self.changes(&sql, vec![json!(value), json!(id)]).await? > 0)
    }

    async fn delete_submenu(&self, id: i64) -> StoreResult<bool> {
        let sql = format!("DELETE FROM {} WHERE id = ?", self.tables.submenus);
        Ok(self.changes(&sql, vec![json!(id)]).await? > 0)
    }

    async fn log_event(&self, event_type: &str, user_id: i64, data: Option<Value>) -> StoreResult<()> {
        let sql = format!(
            "INSERT INTO {} (event_type, user_id, data) VALUES (?, ?, ?)",
            self.tables.stats
        );
        let data = data.map(|value| value.to_string());
        self.query(&sql, vec![json!(event_type), json!(user_id), json!(data)])
            .await?;
        Ok(())
    }

    async fn stats(&self) -> StoreResult<Stats> {
        let Tables { users, stats, .. } = &self.tables;
        let sql = format!(
            "SELECT
                (SELECT COUNT(*) FROM {users}) AS total_users,
                (SELECT COUNT(*) FROM {stats} WHERE event_type = 'start') AS total_starts,
                (SELECT COUNT(*) FROM {users} WHERE is_admin = 1) AS total_admins,
                (SELECT COUNT(*) FROM {stats} WHERE event_type = 'start'
                    AND date(created_at) = date('now')) AS starts_today,
                (SELECT COUNT(*) FROM {stats} WHERE event_type = 'start'
                    AND date(created_at) >= date('now', '-7 days')) AS starts_this_week"
        );
        let row: Option<StatsRow> = self.first(&sql, Vec::new()).await?;
        Ok(row
            .map(|row| Stats {
                total_users: row.total_users,
                total_starts: row.total_starts,
                total_admins: row.total_admins,
                starts_today: row.starts_today,
                starts_this_week: row.starts_this_week,
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl StateStore for D1Store {
    async fn user_state(&self, user_id: i64) -> StoreResult<Option<UserState>> {
        let sql = format!(
            "SELECT state, data, message_id FROM {} WHERE user_id = ?",
            self.tables.states
        );
        let row: Option<StateRow> = self.first(&sql, vec![json!(user_id)]).await?;
        row.map(|row| {
            StateColumns {
                state: row.state,
                data: row.data,
                message_id: row.message_id,
            }
            .decode()
        })
        .transpose()
    }

    async fn set_user_state(&self, user_id: i64, state: &UserState) -> StoreResult<()> {
        let columns = StateColumns::encode(state)?;
        let sql = format!(
            "INSERT INTO {} (user_id, state, data, message_id, updated_at)
             VALUES (?, ?, ?, ?, CURRENT_TIMESTAMP)
             ON CONFLICT(user_id) DO UPDATE SET
                state = excluded.state,
                data = excluded.data,
                message_id = excluded.message_id,
                updated_at = CURRENT_TIMESTAMP",
            self.tables.states
        );
        self.query(
            &sql,
            vec![
                json!(user_id),
                json!(columns.state),
                json!(columns.data),
                json!(columns.message_id),
            ],
        )
        .await?;
        Ok(())
    }

    async fn delete_user_state(&self, user_id: i64) -> StoreResult<bool> {
        let sql = format!("DELETE FROM {} WHERE user_id = ?", self.tables.states);
        Ok(self.changes(&sql, vec![json!(user_id)]).await? > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_response_yields_first_result() {
        let body = r#"{
            "success": true,
            "errors": [],
            "result": [{
                "success": true,
                "results": [{"user_id": 1, "username": "bob", "first_name": "Bob", "last_name": null, "is_admin": 1}],
                "meta": {"changes": 0, "last_row_id": 0, "duration": 0.2}
            }]
        }"#;
        let result = parse_response(body).unwrap();
        let users: Vec<UserRow> = decode_rows(result).unwrap();
        let user = User::from(users.into_iter().next().unwrap());
        assert_eq!(user.username.as_deref(), Some("bob"));
        assert!(user.is_admin);
    }

    #[test]
    fn failed_response_reports_api_messages() {
        let body = r#"{
            "success": false,
            "errors": [{"code": 7500, "message": "no such table: bot_users"}],
            "result": []
        }"#;
        match parse_response(body) {
            Err(StoreError::Remote(message)) => assert_eq!(message, "no such table: bot_users"),
            other => panic!("expected remote error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn insert_meta_carries_row_id() {
        let body = r#"{"success": true, "errors": [], "result": [{"results": [], "meta": {"changes": 1, "last_row_id": 12}}]}"#;
        let result = parse_response(body).unwrap();
        assert_eq!(result.meta.changes, 1);
        assert_eq!(D1Store::inserted_id(&result).unwrap(), 12);
    }

    #[test]
    fn submenu_rows_reject_unknown_services() {
        let row: SubmenuRow = serde_json::from_value(json!({
            "id": 3,
            "service_type": "catalogue",
            "name": "Old",
            "text": null,
            "image": null,
            "position": 1,
            "is_active": 1
        }))
        .unwrap();
        assert!(ServiceSubmenu::try_from(row).is_err());
    }

    #[test]
    fn garbage_body_is_a_decode_error() {
        assert!(matches!(parse_response("<html>"), Err(StoreError::Decode(_))));
    }
}
