pub(super) struct Tables {
    pub(super) config: String,
    pub(super) users: String,
    pub(super) socials: String,
    pub(super) submenus: String,
    pub(super) stats: String,
    pub(super) states: String,
}

impl Tables {
    pub(super) fn new(prefix: &str) -> Self {
        Tables {
            config: format!("{prefix}config"),
            users: format!("{prefix}users"),
            socials: format!("{prefix}social_networks"),
            submenus: format!("{prefix}service_submenus"),
            stats: format!("{prefix}stats"),
            states: format!("{prefix}user_states"),
        }
    }

    pub(super) fn statements(&self) -> Vec<String> {
        let Tables {
            config,
            users,
            socials,
            submenus,
            stats,
            states,
        } = self;
        vec![
            format!(
                "CREATE TABLE IF NOT EXISTS {config} (
                    id INTEGER PRIMARY KEY CHECK (id = 1),
                    welcome_message TEXT,
                    welcome_image TEXT,
                    mini_app_url TEXT,
                    mini_app_text TEXT,
                    delivery_text TEXT,
                    delivery_image TEXT,
                    postal_text TEXT,
                    postal_image TEXT,
                    meetup_text TEXT,
                    meetup_image TEXT,
                    social_buttons_per_row INTEGER DEFAULT 2,
                    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
                )"
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {users} (
                    user_id INTEGER PRIMARY KEY,
                    username TEXT,
                    first_name TEXT,
                    last_name TEXT,
                    is_admin INTEGER NOT NULL DEFAULT 0,
                    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                    last_seen TIMESTAMP DEFAULT CURRENT_TIMESTAMP
                )"
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {socials} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    emoji TEXT NOT NULL,
                    url TEXT NOT NULL,
                    position INTEGER NOT NULL DEFAULT 0,
                    is_active INTEGER NOT NULL DEFAULT 1,
                    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
                )"
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {submenus} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    service_type TEXT NOT NULL,
                    name TEXT NOT NULL,
                    text TEXT,
                    image TEXT,
                    position INTEGER NOT NULL DEFAULT 0,
                    is_active INTEGER NOT NULL DEFAULT 1,
                    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
                )"
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {stats} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    event_type TEXT NOT NULL,
                    user_id INTEGER,
                    data TEXT,
                    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
                )"
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {states} (
                    user_id INTEGER PRIMARY KEY,
                    state TEXT,
                    data TEXT,
                    message_id INTEGER,
                    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
                )"
            ),
            format!("CREATE INDEX IF NOT EXISTS idx_{users}_username ON {users}(username)"),
            format!("CREATE INDEX IF NOT EXISTS idx_{stats}_event ON {stats}(event_type, created_at)"),
            format!("INSERT OR IGNORE INTO {config} (id) VALUES (1)"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_applies_to_every_table() {
        let tables = Tables::new("bot_");
        for statement in tables.statements() {
            assert!(statement.contains("bot_"), "unprefixed statement: {statement}");
        }
    }
}
