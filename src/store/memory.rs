use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use super::{StateStore, Store, StoreResult};
use crate::conversation::UserState;
use crate::model::{
    BotConfig, ConfigField, Profile, Service, ServiceSubmenu, SocialField, SocialLink, Stats,
    SubmenuField, User, DEFAULT_SOCIALS, DEFAULT_SUBMENUS,
};

struct Event {
    event_type: String,
    created_at: DateTime<Utc>,
}

#[derive(Default)]
struct Tables {
    config: BotConfig,
    users: BTreeMap<i64, User>,
    socials: Vec<SocialLink>,
    submenus: Vec<ServiceSubmenu>,
    events: Vec<Event>,
    states: HashMap<i64, UserState>,
    next_social_id: i64,
    next_submenu_id: i64,
}

impl Tables {
    fn insert_social(&mut self, name: &str, emoji: &str, url: &str) -> SocialLink {
        self.next_social_id += 1;
        let position = self.socials.iter().map(|s| s.position).max().unwrap_or(0) + 1;
        let link = SocialLink {
            id: self.next_social_id,
            name: name.to_string(),
            emoji: emoji.to_string(),
            url: url.to_string(),
            position,
            is_active: true,
        };
        self.socials.push(link.clone());
        link
    }

    fn insert_submenu(&mut self, service: Service, name: &str, text: &str, image: Option<&str>) -> ServiceSubmenu {
        self.next_submenu_id += 1;
        let position = self
            .submenus
            .iter()
            .filter(|s| s.service == service)
            .map(|s| s.position)
            .max()
            .unwrap_or(0)
            + 1;
        let submenu = ServiceSubmenu {
            id: self.next_submenu_id,
            service,
            name: name.to_string(),
            text: Some(text.to_string()),
            image: image.map(str::to_string),
            position,
            is_active: true,
        };
        self.submenus.push(submenu.clone());
        submenu
    }
}

pub(crate) struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub(crate) fn new(seed: bool) -> Self {
        let mut tables = Tables::default();
        if seed {
            for social in &DEFAULT_SOCIALS {
                tables.insert_social(social.name, social.emoji, social.url);
            }
            for (service, name, text) in DEFAULT_SUBMENUS {
                tables.insert_submenu(service, name, text, None);
            }
        }
        MemoryStore {
            tables: Mutex::new(tables),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_config(&self) -> StoreResult<BotConfig> {
        Ok(self.tables.lock().await.config.clone())
    }

    async fn update_config(&self, field: ConfigField, value: &str) -> StoreResult<()> {
        self.tables.lock().await.config.set(field, value);
        Ok(())
    }

    async fn get_user(&self, user_id: i64) -> StoreResult<Option<User>> {
        Ok(self.tables.lock().await.users.get(&user_id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .values()
            .find(|user| user.username.as_deref() == Some(username))
            .cloned())
    }

    async fn upsert_user(&self, profile: &Profile, is_admin: bool) -> StoreResult<User> {
        let mut tables = self.tables.lock().await;
        let user = tables.users.entry(profile.user_id).or_insert_with(|| User {
            user_id: profile.user_id,
            username: None,
            first_name: None,
            last_name: None,
            is_admin,
        });
        user.username = profile.username.clone();
        user.first_name = profile.first_name.clone();
        user.last_name = profile.last_name.clone();
        Ok(user.clone())
    }

    async fn all_users(&self) -> StoreResult<Vec<User>> {
        Ok(self.tables.lock().await.users.values().cloned().collect())
    }

    async fn admins(&self) -> StoreResult<Vec<User>> {
        let tables = self.tables.lock().await;
        Ok(tables.users.values().filter(|u| u.is_admin).cloned().collect())
    }

    async fn set_admin(&self, user_id: i64, is_admin: bool) -> StoreResult<bool> {
        let mut tables = self.tables.lock().await;
        match tables.users.get_mut(&user_id) {
            Some(user) => {
                user.is_admin = is_admin;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn social_links(&self) -> StoreResult<Vec<SocialLink>> {
        let tables = self.tables.lock().await;
        let mut links: Vec<_> = tables.socials.iter().filter(|s| s.is_active).cloned().collect();
        links.sort_by_key(|s| (s.position, s.id));
        Ok(links)
    }

    async fn social_link(&self, id: i64) -> StoreResult<Option<SocialLink>> {
        let tables = self.tables.lock().await;
        Ok(tables.socials.iter().find(|s| s.id == id).cloned())
    }

    async fn add_social_link(&self, name: &str, emoji: &str, url: &str) -> StoreResult<SocialLink> {
        Ok(self.tables.lock().await.insert_social(name, emoji, url))
    }

    async fn update_social_link(&self, id: i64, field: SocialField, value: &str) -> StoreResult<bool> {
        let mut tables = self.tables.lock().await;
        let Some(link) = tables.socials.iter_mut().find(|s| s.id == id) else {
            return Ok(false);
        };
        let value = value.to_string();
        match field {
            SocialField::Name => link.name = value,
            SocialField::Emoji => link.emoji = value,
            SocialField::Url => link.url = value,
        }
        Ok(true)
    }

    async fn delete_social_link(&self, id: i64) -> StoreResult<bool> {
        let mut tables = self.tables.lock().await;
        let before = tables.socials.len();
        tables.socials.retain(|s| s.id != id);
        Ok(tables.socials.len() != before)
    }

    async fn submenus(&self, service: Service) -> StoreResult<Vec<ServiceSubmenu>> {
        let tables = self.tables.lock().await;
        let mut submenus: Vec<_> = tables
            .submenus
            .iter()
            .filter(|s| s.service == service && s.is_active)
            .cloned()
            .collect();
        submenus.sort_by_key(|s| (s.position, s.id));
        Ok(submenus)
    }

    async fn submenu(&self, id: i64) -> StoreResult<Option<ServiceSubmenu>> {
        let tables = self.tables.lock().await;
        Ok(tables.submenus.iter().find(|s| s.id == id).cloned())
    }

    async fn add_submenu(
        &self,
        service: Service,
        name: &str,
        text: &str,
        image: Option<&str>,
    ) -> StoreResult<ServiceSubmenu> {
        Ok(self.tables.lock().await.insert_submenu(service, name, text, image))
    }

    async fn update_submenu(&self, id: i64, field: SubmenuField, value: &str) -> StoreResult<bool> {
        let mut tables = self.tables.lock().await;
        let Some(submenu) = tables.submenus.iter_mut().find(|s| s.id == id) else {
            return Ok(false);
        };
        let value = value.to_string();
        match field {
            SubmenuField::Name => submenu.name = value,
            SubmenuField::Text => submenu.text = Some(value),
            SubmenuField::Image => submenu.image = Some(value),
        }
        Ok(true)
    }

    async fn delete_submenu(&self, id: i64) -> StoreResult<bool> {
        let mut tables = self.tables.lock().await;
        let before = tables.submenus.len();
        tables.submenus.retain(|s| s.id != id);
        Ok(tables.submenus.len() != before)
    }

    async fn log_event(&self, event_type: &str, _user_id: i64, _data: Option<serde_json::Value>) -> StoreResult<()> {
        self.tables.lock().await.events.push(Event {
            event_type: event_type.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn stats(&self) -> StoreResult<Stats> {
        let tables = self.tables.lock().await;
        let today = Utc::now().date_naive();
        let week_start = today - Duration::days(7);
        let starts = || tables.events.iter().filter(|e| e.event_type == "start");
        Ok(Stats {
            total_users: tables.users.len() as i64,
            total_starts: starts().count() as i64,
            total_admins: tables.users.values().filter(|u| u.is_admin).count() as i64,
            starts_today: starts().filter(|e| e.created_at.date_naive() == today).count() as i64,
            starts_this_week: starts()
                .filter(|e| e.created_at.date_naive() >= week_start)
                .count() as i64,
        })
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn user_state(&self, user_id: i64) -> StoreResult<Option<UserState>> {
        Ok(self.tables.lock().await.states.get(&user_id).cloned())
    }

    async fn set_user_state(&self, user_id: i64, state: &UserState) -> StoreResult<()> {
        self.tables.lock().await.states.insert(user_id, state.clone());
        Ok(())
    }

    async fn delete_user_state(&self, user_id: i64) -> StoreResult<bool> {
        Ok(self.tables.lock().await.states.remove(&user_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeded_links_are_ordered_by_position() {
        let store = MemoryStore::new(true);
        let links = store.social_links().await.unwrap();
        let names: Vec<_> = links.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["Instagram", "Telegram", "WhatsApp"]);
        assert_eq!(links.iter().map(|l| l.position).collect::<Vec<_>>(), [1, 2, 3]);
        assert_eq!(store.submenus(Service::Postal).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn new_link_goes_after_the_last_position() {
        let store = MemoryStore::new(false);
        store.add_social_link("A", "🅰️", "https://a.example").await.unwrap();
        let b = store.add_social_link("B", "🅱️", "https://b.example").await.unwrap();
        assert_eq!(b.position, 2);
        assert!(store.delete_social_link(b.id).await.unwrap());
        assert!(!store.delete_social_link(b.id).await.unwrap());
    }

    #[tokio::test]
    async fn upsert_keeps_existing_admin_flag() {
        let store = MemoryStore::new(false);
        let profile = Profile {
            user_id: 7,
            username: Some("bob".to_string()),
            first_name: Some("Bob".to_string()),
            last_name: None,
        };
        store.upsert_user(&profile, false).await.unwrap();
        assert!(store.set_admin(7, true).await.unwrap());
        let user = store.upsert_user(&profile, false).await.unwrap();
        assert!(user.is_admin);
        assert_eq!(store.find_user_by_username("bob").await.unwrap(), Some(user));
    }

    #[tokio::test]
    async fn stats_count_start_events() {
        let store = MemoryStore::new(false);
        store.log_event("start", 1, None).await.unwrap();
        store.log_event("start", 2, None).await.unwrap();
        store.log_event("admin", 1, None).await.unwrap();
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_starts, 2);
        assert_eq!(stats.starts_today, 2);
        assert_eq!(stats.starts_this_week, 2);
    }
}
