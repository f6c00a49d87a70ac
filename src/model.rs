use serde::{Deserialize, Serialize};

pub(super) const DEFAULT_WELCOME_MESSAGE: &str = "🤖 Welcome {firstname}!";
pub(super) const DEFAULT_MINI_APP_TEXT: &str = "🎮 Open the app";
pub(super) const DEFAULT_SOCIAL_BUTTONS_PER_ROW: i64 = 2;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub(super) enum Service {
    Delivery,
    Postal,
    Meetup,
}

impl Service {
    pub(super) const ALL: [Service; 3] = [Service::Delivery, Service::Postal, Service::Meetup];

    pub(super) fn key(self) -> &'static str {
        match self {
            Service::Delivery => "delivery",
            Service::Postal => "postal",
            Service::Meetup => "meetup",
        }
    }

    pub(super) fn parse(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|service| service.key() == key)
    }

    pub(super) fn label(self) -> &'static str {
        match self {
            Service::Delivery => "🚚 Delivery",
            Service::Postal => "📮 Postal",
            Service::Meetup => "📍 Meet Up",
        }
    }

    pub(super) fn default_text(self) -> &'static str {
        match self {
            Service::Delivery => "🚚 DELIVERY SERVICE\n\nContact us for your deliveries",
            Service::Postal => "📮 POSTAL SERVICE\n\nParcels and letters shipping",
            Service::Meetup => "📍 MEET UP SERVICE\n\nArrange a meeting with us",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) struct BotConfig {
    pub(super) welcome_message: String,
    pub(super) welcome_image: Option<String>,
    pub(super) mini_app_url: Option<String>,
    pub(super) mini_app_text: Option<String>,
    pub(super) delivery_text: String,
    pub(super) delivery_image: Option<String>,
    pub(super) postal_text: String,
    pub(super) postal_image: Option<String>,
    pub(super) meetup_text: String,
    pub(super) meetup_image: Option<String>,
    pub(super) social_buttons_per_row: i64,
}

impl Default for BotConfig {
    fn default() -> Self {
        BotConfig {
            welcome_message: DEFAULT_WELCOME_MESSAGE.to_string(),
            welcome_image: None,
            mini_app_url: None,
            mini_app_text: Some(DEFAULT_MINI_APP_TEXT.to_string()),
            delivery_text: Service::Delivery.default_text().to_string(),
            delivery_image: None,
            postal_text: Service::Postal.default_text().to_string(),
            postal_image: None,
            meetup_text: Service::Meetup.default_text().to_string(),
            meetup_image: None,
            social_buttons_per_row: DEFAULT_SOCIAL_BUTTONS_PER_ROW,
        }
    }
}

impl BotConfig {
    pub(super) fn service_text(&self, service: Service) -> &str {
        match service {
            Service::Delivery => &self.delivery_text,
            Service::Postal => &self.postal_text,
            Service::Meetup => &self.meetup_text,
        }
    }

    pub(super) fn service_image(&self, service: Service) -> Option<&str> {
        match service {
            Service::Delivery => self.delivery_image.as_deref(),
            Service::Postal => self.postal_image.as_deref(),
            Service::Meetup => self.meetup_image.as_deref(),
        }
    }

    pub(super) fn mini_app(&self) -> Option<&str> {
        self.mini_app_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    pub(super) fn mini_app_label(&self) -> &str {
        self.mini_app_text
            .as_deref()
            .filter(|text| !text.trim().is_empty())
            .unwrap_or(DEFAULT_MINI_APP_TEXT)
    }

    pub(super) fn welcome_text(&self, first_name: &str) -> String {
        self.welcome_message.replace("{firstname}", first_name)
    }

    pub(super) fn set(&mut self, field: ConfigField, value: &str) {
        let value = value.to_string();
        match field {
            ConfigField::WelcomeMessage => self.welcome_message = value,
            ConfigField::WelcomeImage => self.welcome_image = Some(value),
            ConfigField::MiniAppUrl => self.mini_app_url = Some(value),
            ConfigField::MiniAppText => self.mini_app_text = Some(value),
            ConfigField::ServiceText(Service::Delivery) => self.delivery_text = value,
            ConfigField::ServiceText(Service::Postal) => self.postal_text = value,
            ConfigField::ServiceText(Service::Meetup) => self.meetup_text = value,
            ConfigField::ServiceImage(Service::Delivery) => self.delivery_image = Some(value),
            ConfigField::ServiceImage(Service::Postal) => self.postal_image = Some(value),
            ConfigField::ServiceImage(Service::Meetup) => self.meetup_image = Some(value),
        }
    }
}

#[derive(Deserialize, Clone, Debug, Default)]
pub(super) struct ConfigRow {
    pub(super) welcome_message: Option<String>,
    pub(super) welcome_image: Option<String>,
    pub(super) mini_app_url: Option<String>,
    pub(super) mini_app_text: Option<String>,
    pub(super) delivery_text: Option<String>,
    pub(super) delivery_image: Option<String>,
    pub(super) postal_text: Option<String>,
    pub(super) postal_image: Option<String>,
    pub(super) meetup_text: Option<String>,
    pub(super) meetup_image: Option<String>,
    pub(super) social_buttons_per_row: Option<i64>,
}

impl From<ConfigRow> for BotConfig {
    fn from(row: ConfigRow) -> Self {
        let defaults = BotConfig::default();
        BotConfig {
            welcome_message: row.welcome_message.unwrap_or(defaults.welcome_message),
            welcome_image: row.welcome_image,
            mini_app_url: row.mini_app_url,
            mini_app_text: row.mini_app_text.or(defaults.mini_app_text),
            delivery_text: row.delivery_text.unwrap_or(defaults.delivery_text),
            delivery_image: row.delivery_image,
            postal_text: row.postal_text.unwrap_or(defaults.postal_text),
            postal_image: row.postal_image,
            meetup_text: row.meetup_text.unwrap_or(defaults.meetup_text),
            meetup_image: row.meetup_image,
            social_buttons_per_row: row
                .social_buttons_per_row
                .filter(|n| *n > 0)
                .unwrap_or(defaults.social_buttons_per_row),
        }
    }
}

pub(super) const CONFIG_COLUMNS: &str = "welcome_message, welcome_image, mini_app_url, \
     mini_app_text, delivery_text, delivery_image, postal_text, postal_image, meetup_text, \
     meetup_image, social_buttons_per_row";

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum ConfigField {
    WelcomeMessage,
    WelcomeImage,
    MiniAppUrl,
    MiniAppText,
    ServiceText(Service),
    ServiceImage(Service),
}

impl ConfigField {
    pub(super) fn column(self) -> &'static str {
        match self {
            ConfigField::WelcomeMessage => "welcome_message",
            ConfigField::WelcomeImage => "welcome_image",
            ConfigField::MiniAppUrl => "mini_app_url",
            ConfigField::MiniAppText => "mini_app_text",
            ConfigField::ServiceText(Service::Delivery) => "delivery_text",
            ConfigField::ServiceText(Service::Postal) => "postal_text",
            ConfigField::ServiceText(Service::Meetup) => "meetup_text",
            ConfigField::ServiceImage(Service::Delivery) => "delivery_image",
            ConfigField::ServiceImage(Service::Postal) => "postal_image",
            ConfigField::ServiceImage(Service::Meetup) => "meetup_image",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) struct User {
    pub(super) user_id: i64,
    pub(super) username: Option<String>,
    pub(super) first_name: Option<String>,
    pub(super) last_name: Option<String>,
    pub(super) is_admin: bool,
}

impl User {
    pub(super) fn display_name(&self) -> &str {
        self.first_name.as_deref().unwrap_or("Admin")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) struct Profile {
    pub(super) user_id: i64,
    pub(super) username: Option<String>,
    pub(super) first_name: Option<String>,
    pub(super) last_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) struct SocialLink {
    pub(super) id: i64,
    pub(super) name: String,
    pub(super) emoji: String,
    pub(super) url: String,
    pub(super) position: i64,
    pub(super) is_active: bool,
}

impl SocialLink {
    pub(super) fn label(&self) -> String {
        format!("{} {}", self.emoji, self.name)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub(super) enum SocialField {
    Name,
    Emoji,
    Url,
}

impl SocialField {
    pub(super) fn column(self) -> &'static str {
        match self {
            SocialField::Name => "name",
            SocialField::Emoji => "emoji",
            SocialField::Url => "url",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) struct ServiceSubmenu {
    pub(super) id: i64,
    pub(super) service: Service,
    pub(super) name: String,
    pub(super) text: Option<String>,
    pub(super) image: Option<String>,
    pub(super) position: i64,
    pub(super) is_active: bool,
}

impl ServiceSubmenu {
    /// HTML body: the stored text, or the escaped name when no text is set.
    pub(super) fn body(&self) -> String {
        self.text
            .as_deref()
            .filter(|text| !text.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| crate::helpers::escape_html(&self.name))
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub(super) enum SubmenuField {
    Name,
    Text,
    Image,
}

impl SubmenuField {
    pub(super) fn column(self) -> &'static str {
        match self {
            SubmenuField::Name => "name",
            SubmenuField::Text => "text",
            SubmenuField::Image => "image",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(super) struct Stats {
    pub(super) total_users: i64,
    pub(super) total_starts: i64,
    pub(super) total_admins: i64,
    pub(super) starts_today: i64,
    pub(super) starts_this_week: i64,
}

pub(super) struct SeedSocial {
    pub(super) name: &'static str,
    pub(super) emoji: &'static str,
    pub(super) url: &'static str,
}

pub(super) const DEFAULT_SOCIALS: [SeedSocial; 3] = [
    SeedSocial {
        name: "Instagram",
        emoji: "📷",
        url: "https://instagram.com",
    },
    SeedSocial {
        name: "Telegram",
        emoji: "📢",
        url: "https://t.me/channel",
    },
    SeedSocial {
        name: "WhatsApp",
        emoji: "💬",
        url: "https://wa.me/1234567890",
    },
];

pub(super) const DEFAULT_SUBMENUS: [(Service, &str, &str); 6] = [
    (Service::Delivery, "Express delivery", "🚚 Delivered within 24h"),
    (Service::Delivery, "Standard delivery", "📦 Delivered in 3-5 days"),
    (Service::Postal, "Domestic shipping", "📮 Shipping across the country"),
    (Service::Postal, "International shipping", "🌍 Shipping abroad"),
    (Service::Meetup, "Coffee meetup", "☕ Meet in a coffee shop"),
    (Service::Meetup, "Office meetup", "🏢 Meet at the office"),
];
