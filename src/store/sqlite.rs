use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::schema::Tables;
use super::{StateColumns, StateStore, Store, StoreError, StoreResult};
use crate::conversation::UserState;
use crate::model::{
    BotConfig, ConfigField, ConfigRow, Profile, Service, ServiceSubmenu, SocialField, SocialLink,
    Stats, SubmenuField, User, CONFIG_COLUMNS, DEFAULT_SOCIALS, DEFAULT_SUBMENUS,
};

pub(crate) struct SqliteStore {
    conn: Mutex<Connection>,
    tables: Tables,
}

impl SqliteStore {
    pub(crate) fn open(path: &Path, seed: bool) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn, seed)
    }

    pub(crate) fn open_in_memory(seed: bool) -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?, seed)
    }

    fn init(conn: Connection, seed: bool) -> StoreResult<Self> {
        let tables = Tables::new("");
        for statement in tables.statements() {
            conn.execute(&statement, [])?;
        }
        if seed {
            seed_defaults(&conn, &tables)?;
        }
        Ok(SqliteStore {
            conn: Mutex::new(conn),
            tables,
        })
    }

    pub(crate) fn with_conn<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T>,
    {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        f(&conn)
    }

    fn socials_query(&self, filter: &str) -> String {
        format!(
            "SELECT id, name, emoji, url, position, is_active FROM {} {filter}",
            self.tables.socials
        )
    }

    fn submenus_query(&self, filter: &str) -> String {
        format!(
            "SELECT id, service_type, name, text, image, position, is_active FROM {} {filter}",
            self.tables.submenus
        )
    }

    fn users_query(&self, filter: &str) -> String {
        format!(
            "SELECT user_id, username, first_name, last_name, is_admin FROM {} {filter}",
            self.tables.users
        )
    }
}

fn seed_defaults(conn: &Connection, tables: &Tables) -> StoreResult<()> {
    let socials: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", tables.socials), [], |row| {
        row.get(0)
    })?;
    if socials == 0 {
        let sql = format!(
            "INSERT INTO {} (name, emoji, url, position) VALUES (?1, ?2, ?3, ?4)",
            tables.socials
        );
        for (position, social) in (1i64..).zip(DEFAULT_SOCIALS.iter()) {
            conn.execute(&sql, params![social.name, social.emoji, social.url, position])?;
        }
    }

    let submenus: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", tables.submenus), [], |row| {
        row.get(0)
    })?;
    if submenus == 0 {
        let sql = format!(
            "INSERT INTO {} (service_type, name, text, position) VALUES (?1, ?2, ?3, ?4)",
            tables.submenus
        );
        for service in Service::ALL {
            let entries = DEFAULT_SUBMENUS.iter().filter(|(s, _, _)| *s == service);
            for (position, (_, name, text)) in (1i64..).zip(entries) {
                conn.execute(&sql, params![service.key(), name, text, position])?;
            }
        }
    }
    Ok(())
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        user_id: row.get(0)?,
        username: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        is_admin: row.get(4)?,
    })
}

fn social_from_row(row: &Row<'_>) -> rusqlite::Result<SocialLink> {
    Ok(SocialLink {
        id: row.get(0)?,
        name: row.get(1)?,
        emoji: row.get(2)?,
        url: row.get(3)?,
        position: row.get(4)?,
        is_active: row.get(5)?,
    })
}

fn submenu_from_row(row: &Row<'_>) -> rusqlite::Result<ServiceSubmenu> {
    let key: String = row.get(1)?;
    let service = Service::parse(&key).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            format!("unknown service {key:?}").into(),
        )
    })?;
    Ok(ServiceSubmenu {
        id: row.get(0)?,
        service,
        name: row.get(2)?,
        text: row.get(3)?,
        image: row.get(4)?,
        position: row.get(5)?,
        is_active: row.get(6)?,
    })
}

fn config_from_row(row: &Row<'_>) -> rusqlite::Result<ConfigRow> {
    Ok(ConfigRow {
        welcome_message: row.get(0)?,
        welcome_image: row.get(1)?,
        mini_app_url: row.get(2)?,
        mini_app_text: row.get(3)?,
        delivery_text: row.get(4)?,
        delivery_image: row.get(5)?,
        postal_text: row.get(6)?,
        postal_image: row.get(7)?,
        meetup_text: row.get(8)?,
        meetup_image: row.get(9)?,
        social_buttons_per_row: row.get(10)?,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn get_config(&self) -> StoreResult<BotConfig> {
        let sql = format!("SELECT {CONFIG_COLUMNS} FROM {} WHERE id = 1", self.tables.config);
        let row = self.with_conn(|conn| Ok(conn.query_row(&sql, [], config_from_row).optional()?))?;
        row.map(BotConfig::from).ok_or(StoreError::MissingConfigRow)
    }

    async fn update_config(&self, field: ConfigField, value: &str) -> StoreResult<()> {
        let sql = format!(
            "UPDATE {} SET {} = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = 1",
            self.tables.config,
            field.column()
        );
        let changed = self.with_conn(|conn| Ok(conn.execute(&sql, [value])?))?;
        if changed == 0 {
            return Err(StoreError::MissingConfigRow);
        }
        Ok(())
    }

    async fn get_user(&self, user_id: i64) -> StoreResult<Option<User>> {
        let sql = self.users_query("WHERE user_id = ?1");
        self.with_conn(|conn| Ok(conn.query_row(&sql, [user_id], user_from_row).optional()?))
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let sql = self.users_query("WHERE username = ?1 LIMIT 1");
        self.with_conn(|conn| Ok(conn.query_row(&sql, [username], user_from_row).optional()?))
    }

    async fn upsert_user(&self, profile: &Profile, is_admin: bool) -> StoreResult<User> {
        let upsert = format!(
            "INSERT INTO {} (user_id, username, first_name, last_name, is_admin)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id) DO UPDATE SET
                username = excluded.username,
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                last_seen = CURRENT_TIMESTAMP",
            self.tables.users
        );
        let select = self.users_query("WHERE user_id = ?1");
        self.with_conn(|conn| {
            conn.execute(
                &upsert,
                params![
                    profile.user_id,
                    profile.username,
                    profile.first_name,
                    profile.last_name,
                    is_admin
                ],
            )?;
            Ok(conn.query_row(&select, [profile.user_id], user_from_row)?)
        })
    }

    async fn all_users(&self) -> StoreResult<Vec<User>> {
        let sql = self.users_query("ORDER BY created_at DESC");
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let users = stmt.query_map([], user_from_row)?.collect::<Result<_, _>>()?;
            Ok(users)
        })
    }

    async fn admins(&self) -> StoreResult<Vec<User>> {
        let sql = self.users_query("WHERE is_admin = 1 ORDER BY user_id");
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let users = stmt.query_map([], user_from_row)?.collect::<Result<_, _>>()?;
            Ok(users)
        })
    }

    async fn set_admin(&self, user_id: i64, is_admin: bool) -> StoreResult<bool> {
        let sql = format!("UPDATE {} SET is_admin = ?1 WHERE user_id = ?2", self.tables.users);
        let changed = self.with_conn(|conn| Ok(conn.execute(&sql, params![is_admin, user_id])?))?;
        Ok(changed > 0)
    }

    async fn social_links(&self) -> StoreResult<Vec<SocialLink>> {
        let sql = self.socials_query("WHERE is_active = 1 ORDER BY position, id");
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let links = stmt.query_map([], social_from_row)?.collect::<Result<_, _>>()?;
            Ok(links)
        })
    }

    async fn social_link(&self, id: i64) -> StoreResult<Option<SocialLink>> {
        let sql = self.socials_query("WHERE id = ?1");
        self.with_conn(|conn| Ok(conn.query_row(&sql, [id], social_from_row).optional()?))
    }

    async fn add_social_link(&self, name: &str, emoji: &str, url: &str) -> StoreResult<SocialLink> {
        let table = &self.tables.socials;
        let insert = format!(
            "INSERT INTO {table} (name, emoji, url, position)
             VALUES (?1, ?2, ?3, (SELECT COALESCE(MAX(position), 0) + 1 FROM {table}))"
        );
        let select = self.socials_query("WHERE id = ?1");
        self.with_conn(|conn| {
            conn.execute(&insert, params![name, emoji, url])?;
            let id = conn.last_insert_rowid();
            Ok(conn.query_row(&select, [id], social_from_row)?)
        })
    }

    async fn update_social_link(&self, id: i64, field: SocialField, value: &str) -> StoreResult<bool> {
        let sql = format!("UPDATE {} SET {} = ?1 WHERE id = ?2", self.tables.socials, field.column());
        let changed = self.with_conn(|conn| Ok(conn.execute(&sql, params![value, id])?))?;
        Ok(changed > 0)
    }

    async fn delete_social_link(&self, id: i64) -> StoreResult<bool> {
        let sql = format!("DELETE FROM {} WHERE id = ?1", self.tables.socials);
        let changed = self.with_conn(|conn| Ok(conn.execute(&sql, [id])?))?;
        Ok(changed > 0)
    }

    async fn submenus(&self, service: Service) -> StoreResult<Vec<ServiceSubmenu>> {
        let sql = self.submenus_query("WHERE service_type = ?1 AND is_active = 1 ORDER BY position, id");
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let submenus = stmt
                .query_map([service.key()], submenu_from_row)?
                .collect::<Result<_, _>>()?;
            Ok(submenus)
        })
    }

    async fn submenu(&self, id: i64) -> StoreResult<Option<ServiceSubmenu>> {
        let sql = self.submenus_query("WHERE id = ?1");
        self.with_conn(|conn| Ok(conn.query_row(&sql, [id], submenu_from_row).optional()?))
    }

    async fn add_submenu(
        &self,
        service: Service,
        name: &str,
        text: &str,
        image: Option<&str>,
    ) -> StoreResult<ServiceSubmenu> {
        let table = &self.tables.submenus;
        let insert = format!(
            "INSERT INTO {table} (service_type, name, text, image, position)
             VALUES (?1, ?2, ?3, ?4,
                (SELECT COALESCE(MAX(position), 0) + 1 FROM {table} WHERE service_type = ?1))"
        );
        let select = self.submenus_query("WHERE id = ?1");
        self.with_conn(|conn| {
            conn.execute(&insert, params![service.key(), name, text, image])?;
            let id = conn.last_insert_rowid();
            Ok(conn.query_row(&select, [id], submenu_from_row)?)
        })
    }

    async fn update_submenu(&self, id: i64, field: SubmenuField, value: &str) -> StoreResult<bool> {
        let sql = format!("UPDATE {} SET {} = ?1 WHERE id = ?2", self.tables.submenus, field.column());
        let changed = self.with_conn(|conn| Ok(conn.execute(&sql, params![value, id])?))?;
        Ok(changed > 0)
    }

    async fn delete_submenu(&self, id: i64) -> StoreResult<bool> {
        let sql = format!("DELETE FROM {} WHERE id = ?1", self.tables.submenus);
        let changed = self.with_conn(|conn| Ok(conn.execute(&sql, [id])?))?;
        Ok(changed > 0)
    }

    async fn log_event(&self, event_type: &str, user_id: i64, data: Option<serde_json::Value>) -> StoreResult<()> {
        let data = data.map(|value| value.to_string());
        let sql = format!(
            "INSERT INTO {} (event_type, user_id, data) VALUES (?1, ?2, ?3)",
            self.tables.stats
        );
        self.with_conn(|conn| {
            conn.execute(&sql, params![event_type, user_id, data])?;
            Ok(())
        })
    }

    async fn stats(&self) -> StoreResult<Stats> {
        let Tables { users, stats, .. } = &self.tables;
        let sql = format!(
            "SELECT
                (SELECT COUNT(*) FROM {users}),
                (SELECT COUNT(*) FROM {stats} WHERE event_type = 'start'),
                (SELECT COUNT(*) FROM {users} WHERE is_admin = 1),
                (SELECT COUNT(*) FROM {stats} WHERE event_type = 'start'
                    AND date(created_at) = date('now')),
                (SELECT COUNT(*) FROM {stats} WHERE event_type = 'start'
                    AND date(created_at) >= date('now', '-7 days'))"
        );
        self.with_conn(|conn| {
            Ok(conn.query_row(&sql, [], |row| {
                Ok(Stats {
                    total_users: row.get(0)?,
                    total_starts: row.get(1)?,
                    total_admins: row.get(2)?,
                    starts_today: row.get(3)?,
                    starts_this_week: row.get(4)?,
                })
            })?)
        })
    }
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn user_state(&self, user_id: i64) -> StoreResult<Option<UserState>> {
        let sql = format!(
            "SELECT state, data, message_id FROM {} WHERE user_id = ?1",
            self.tables.states
        );
        let columns = self.with_conn(|conn| {
            Ok(conn
                .query_row(&sql, [user_id], |row| {
                    Ok(StateColumns {
                        state: row.get(0)?,
                        data: row.get(1)?,
                        message_id: row.get(2)?,
                    })
                })
                .optional()?)
        })?;
        columns.map(StateColumns::decode).transpose()
    }

    async fn set_user_state(&self, user_id: i64, state: &UserState) -> StoreResult<()> {
        let columns = StateColumns::encode(state)?;
        let sql = format!(
            "INSERT INTO {} (user_id, state, data, message_id, updated_at)
             VALUES (?1, ?2, ?3, ?4, CURRENT_TIMESTAMP)
             ON CONFLICT(user_id) DO UPDATE SET
                state = excluded.state,
                data = excluded.data,
                message_id = excluded.message_id,
                updated_at = CURRENT_TIMESTAMP",
            self.tables.states
        );
        self.with_conn(|conn| {
            conn.execute(
                &sql,
                params![user_id, columns.state, columns.data, columns.message_id],
            )?;
            Ok(())
        })
    }

    async fn delete_user_state(&self, user_id: i64) -> StoreResult<bool> {
        let sql = format!("DELETE FROM {} WHERE user_id = ?1", self.tables.states);
        let changed = self.with_conn(|conn| Ok(conn.execute(&sql, [user_id])?))?;
        Ok(changed > 0)
    }
}
