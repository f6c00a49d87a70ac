use super::*;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) enum Button {
    Callback { text: String, data: String },
    Url { text: String, url: String },
    WebApp { text: String, url: String },
}

impl Button {
    pub(super) fn action(text: impl Into<String>, action: Action) -> Self {
        Button::Callback {
            text: text.into(),
            data: action.encode(),
        }
    }

    #[cfg(test)]
    pub(super) fn text(&self) -> &str {
        match self {
            Button::Callback { text, .. } | Button::Url { text, .. } | Button::WebApp { text, .. } => text,
        }
    }
}

pub(super) type Keyboard = Vec<Vec<Button>>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) struct Screen {
    pub(super) text: String,
    pub(super) photo: Option<String>,
    pub(super) keyboard: Keyboard,
}

impl Screen {
    pub(super) fn new(text: impl Into<String>, keyboard: Keyboard) -> Self {
        Screen {
            text: text.into(),
            photo: None,
            keyboard,
        }
    }

    pub(super) fn with_photo(mut self, photo: Option<&str>) -> Self {
        self.photo = photo.filter(|p| !p.is_empty()).map(str::to_string);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum Action {
    Start,
    Service(Service),
    Submenu(i64),
    AdminPanel,
    EditWelcome,
    EditWelcomePhoto,
    MiniApp,
    EditMiniAppUrl,
    EditMiniAppText,
    Socials,
    SocialDetail(i64),
    AddSocial,
    EditSocial(i64, SocialField),
    DeleteSocial(i64),
    Services,
    ServiceEdit(Service),
    EditServiceText(Service),
    EditServicePhoto(Service),
    Submenus(Service),
    AddSubmenu(Service),
    SubmenuDetail(i64),
    EditSubmenu(i64, SubmenuField),
    DeleteSubmenu(i64),
    Stats,
    Admins,
    AddAdmin,
    RemoveAdminList,
    RemoveAdmin(i64),
    Broadcast,
}

impl Action {
    pub(super) fn encode(self) -> String {
        match self {
            Action::Start => "start".to_string(),
            Action::Service(service) => format!("svc:{}", service.key()),
            Action::Submenu(id) => format!("sub:{}", id),
            Action::AdminPanel => "adm".to_string(),
            Action::EditWelcome => "adm:welcome".to_string(),
            Action::EditWelcomePhoto => "adm:photo".to_string(),
            Action::MiniApp => "adm:miniapp".to_string(),
            Action::EditMiniAppUrl => "adm:miniapp:url".to_string(),
            Action::EditMiniAppText => "adm:miniapp:text".to_string(),
            Action::Socials => "adm:social".to_string(),
            Action::SocialDetail(id) => format!("adm:social:{}", id),
            Action::AddSocial => "adm:social:add".to_string(),
            Action::EditSocial(id, field) => format!("adm:social:{}:{}", id, field.column()),
            Action::DeleteSocial(id) => format!("adm:social:{}:del", id),
            Action::Services => "adm:svc".to_string(),
            Action::ServiceEdit(service) => format!("adm:svc:{}", service.key()),
            Action::EditServiceText(service) => format!("adm:svc:{}:text", service.key()),
            Action::EditServicePhoto(service) => format!("adm:svc:{}:photo", service.key()),
            Action::Submenus(service) => format!("adm:svc:{}:subs", service.key()),
            Action::AddSubmenu(service) => format!("adm:svc:{}:subs:add", service.key()),
            Action::SubmenuDetail(id) => format!("adm:sub:{}", id),
            Action::EditSubmenu(id, field) => format!("adm:sub:{}:{}", id, field.column()),
            Action::DeleteSubmenu(id) => format!("adm:sub:{}:del", id),
            Action::Stats => "adm:stats".to_string(),
            Action::Admins => "adm:admins".to_string(),
            Action::AddAdmin => "adm:admins:add".to_string(),
            Action::RemoveAdminList => "adm:admins:rm".to_string(),
            Action::RemoveAdmin(user_id) => format!("adm:admins:rm:{}", user_id),
            Action::Broadcast => "adm:broadcast".to_string(),
        }
    }

    pub(super) fn parse(data: &str) -> Option<Self> {
        let parts: Vec<&str> = data.split(':').collect();
        let action = match parts.as_slice() {
            ["start"] => Action::Start,
            ["svc", service] => Action::Service(Service::parse(service)?),
            ["sub", id] => Action::Submenu(id.parse().ok()?),
            ["adm"] => Action::AdminPanel,
            ["adm", "welcome"] => Action::EditWelcome,
            ["adm", "photo"] => Action::EditWelcomePhoto,
            ["adm", "miniapp"] => Action::MiniApp,
            ["adm", "miniapp", "url"] => Action::EditMiniAppUrl,
            ["adm", "miniapp", "text"] => Action::EditMiniAppText,
            ["adm", "social"] => Action::Socials,
            ["adm", "social", "add"] => Action::AddSocial,
            ["adm", "social", id] => Action::SocialDetail(id.parse().ok()?),
            ["adm", "social", id, "del"] => Action::DeleteSocial(id.parse().ok()?),
            ["adm", "social", id, field] => {
                Action::EditSocial(id.parse().ok()?, parse_social_field(field)?)
            }
            ["adm", "svc"] => Action::Services,
            ["adm", "svc", service] => Action::ServiceEdit(Service::parse(service)?),
            ["adm", "svc", service, "text"] => Action::EditServiceText(Service::parse(service)?),
            ["adm", "svc", service, "photo"] => Action::EditServicePhoto(Service::parse(service)?),
            ["adm", "svc", service, "subs"] => Action::Submenus(Service::parse(service)?),
            ["adm", "svc", service, "subs", "add"] => Action::AddSubmenu(Service::parse(service)?),
            ["adm", "sub", id] => Action::SubmenuDetail(id.parse().ok()?),
            ["adm", "sub", id, "del"] => Action::DeleteSubmenu(id.parse().ok()?),
            ["adm", "sub", id, field] => {
                Action::EditSubmenu(id.parse().ok()?, parse_submenu_field(field)?)
            }
            ["adm", "stats"] => Action::Stats,
            ["adm", "admins"] => Action::Admins,
            ["adm", "admins", "add"] => Action::AddAdmin,
            ["adm", "admins", "rm"] => Action::RemoveAdminList,
            ["adm", "admins", "rm", user_id] => Action::RemoveAdmin(user_id.parse().ok()?),
            ["adm", "broadcast"] => Action::Broadcast,
            _ => return None,
        };
        Some(action)
    }

    pub(super) fn requires_admin(self) -> bool {
        !matches!(self, Action::Start | Action::Service(_) | Action::Submenu(_))
    }

    pub(super) fn enabled(self, features: &Features) -> bool {
        match self {
            Action::Service(_)
            | Action::Services
            | Action::ServiceEdit(_)
            | Action::EditServiceText(_)
            | Action::EditServicePhoto(_) => features.services,
            Action::Submenu(_)
            | Action::Submenus(_)
            | Action::AddSubmenu(_)
            | Action::SubmenuDetail(_)
            | Action::EditSubmenu(..)
            | Action::DeleteSubmenu(_) => features.submenus_enabled(),
            Action::Broadcast => features.broadcast,
            _ => true,
        }
    }
}

fn parse_social_field(raw: &str) -> Option<SocialField> {
    [SocialField::Name, SocialField::Emoji, SocialField::Url]
        .into_iter()
        .find(|field| field.column() == raw)
}

fn parse_submenu_field(raw: &str) -> Option<SubmenuField> {
    [SubmenuField::Name, SubmenuField::Text, SubmenuField::Image]
        .into_iter()
        .find(|field| field.column() == raw)
}

fn back(action: Action) -> Vec<Button> {
    vec![Button::action("🔙 Back", action)]
}

fn cancel(action: Action) -> Vec<Button> {
    vec![Button::action("❌ Cancel", action)]
}

pub(super) fn main_keyboard(config: &BotConfig, links: &[SocialLink], features: &Features) -> Keyboard {
    let mut rows: Keyboard = Vec::new();

    if let Some(url) = config.mini_app() {
        rows.push(vec![Button::WebApp {
            text: config.mini_app_label().to_string(),
            url: url.to_string(),
        }]);
    }

    if features.services {
        for service in Service::ALL {
            rows.push(vec![Button::action(service.label(), Action::Service(service))]);
        }
    }

    let mut active: Vec<&SocialLink> = links.iter().filter(|link| link.is_active).collect();
    active.sort_by_key(|link| (link.position, link.id));
    let per_row = if features.grouped_social_buttons {
        usize::try_from(config.social_buttons_per_row).unwrap_or(1).max(1)
    } else {
        1
    };
    for chunk in active.chunks(per_row) {
        rows.push(
            chunk
                .iter()
                .map(|link| Button::Url {
                    text: link.label(),
                    url: link.url.clone(),
                })
                .collect(),
        );
    }

    rows
}

pub(super) fn welcome_screen(
    config: &BotConfig,
    links: &[SocialLink],
    features: &Features,
    first_name: &str,
) -> Screen {
    let text = config.welcome_text(&escape_html(first_name));
    Screen::new(text, main_keyboard(config, links, features))
        .with_photo(config.welcome_image.as_deref())
}

pub(super) fn service_keyboard(submenus: &[ServiceSubmenu]) -> Keyboard {
    let mut active: Vec<&ServiceSubmenu> = submenus.iter().filter(|s| s.is_active).collect();
    active.sort_by_key(|s| (s.position, s.id));
    let mut rows: Keyboard = active
        .into_iter()
        .map(|submenu| vec![Button::action(submenu.name.clone(), Action::Submenu(submenu.id))])
        .collect();
    rows.push(vec![Button::action("🔙 Back to menu", Action::Start)]);
    rows
}

pub(super) fn service_screen(config: &BotConfig, service: Service, submenus: &[ServiceSubmenu]) -> Screen {
    Screen::new(config.service_text(service), service_keyboard(submenus))
        .with_photo(config.service_image(service))
}

pub(super) fn submenu_screen(submenu: &ServiceSubmenu) -> Screen {
    Screen::new(submenu.body(), vec![back(Action::Service(submenu.service))])
        .with_photo(submenu.image.as_deref())
}

pub(super) fn message_screen(text: impl Into<String>, back_to: Action) -> Screen {
    Screen::new(text, vec![back(back_to)])
}

pub(super) fn access_denied_text() -> &'static str {
    "❌ Access denied. This command is reserved for administrators."
}

pub(super) fn failure_text() -> &'static str {
    "⚠️ Something went wrong. Please try again."
}

pub(super) fn admin_panel(stats: &Stats, features: &Features) -> Screen {
    let mut rows = vec![
        vec![Button::action("✏️ Welcome message", Action::EditWelcome)],
        vec![Button::action("🖼️ Welcome photo", Action::EditWelcomePhoto)],
        vec![Button::action("📱 Mini app", Action::MiniApp)],
        vec![Button::action("🔗 Social links", Action::Socials)],
    ];
    if features.services {
        rows.push(vec![Button::action("🚚 Services", Action::Services)]);
    }
    rows.push(vec![Button::action("📊 Statistics", Action::Stats)]);
    rows.push(vec![Button::action("👥 Admins", Action::Admins)]);
    if features.broadcast {
        rows.push(vec![Button::action("📢 Broadcast", Action::Broadcast)]);
    }

    let text = format!(
        "🔧 <b>Admin panel</b>\n\n👥 Users: {}\n📊 Starts: {}\n👨‍💼 Admins: {}",
        stats.total_users, stats.total_starts, stats.total_admins
    );
    Screen::new(text, rows)
}

pub(super) fn stats_screen(stats: &Stats) -> Screen {
    let text = format!(
        "📊 <b>Detailed statistics</b>\n\n👥 Total users: {}\n🚀 Starts: {}\n👨‍💼 Admins: {}\n📅 Starts today: {}\n📈 Starts this week: {}",
        stats.total_users,
        stats.total_starts,
        stats.total_admins,
        stats.starts_today,
        stats.starts_this_week
    );
    message_screen(text, Action::AdminPanel)
}

pub(super) fn mini_app_screen(config: &BotConfig) -> Screen {
    let text = format!(
        "📱 <b>Mini app</b>\n\nCurrent URL: {}\nButton label: {}",
        escape_html(config.mini_app().unwrap_or("not set")),
        escape_html(config.mini_app_label())
    );
    Screen::new(
        text,
        vec![
            vec![Button::action("🔗 Change URL", Action::EditMiniAppUrl)],
            vec![Button::action("✏️ Change label", Action::EditMiniAppText)],
            back(Action::AdminPanel),
        ],
    )
}

pub(super) fn socials_screen(links: &[SocialLink]) -> Screen {
    let mut rows: Keyboard = links
        .iter()
        .map(|link| vec![Button::action(link.label(), Action::SocialDetail(link.id))])
        .collect();
    rows.push(vec![Button::action("➕ Add a link", Action::AddSocial)]);
    rows.push(back(Action::AdminPanel));
    Screen::new(
        "🔗 <b>Social links</b>\n\nPick a link to edit it, or add a new one.",
        rows,
    )
}

pub(super) fn social_detail_screen(link: &SocialLink) -> Screen {
    let text = format!(
        "{} <b>{}</b>\n\nURL: {}\nPosition: {}",
        escape_html(&link.emoji),
        escape_html(&link.name),
        escape_html(&link.url),
        link.position
    );
    Screen::new(
        text,
        vec![
            vec![Button::action("✏️ Change name", Action::EditSocial(link.id, SocialField::Name))],
            vec![Button::action("😀 Change emoji", Action::EditSocial(link.id, SocialField::Emoji))],
            vec![Button::action("🔗 Change URL", Action::EditSocial(link.id, SocialField::Url))],
            vec![Button::action("🗑️ Delete", Action::DeleteSocial(link.id))],
            back(Action::Socials),
        ],
    )
}

pub(super) fn services_screen() -> Screen {
    let mut rows: Keyboard = Service::ALL
        .into_iter()
        .map(|service| vec![Button::action(service.label(), Action::ServiceEdit(service))])
        .collect();
    rows.push(back(Action::AdminPanel));
    Screen::new("🚚 <b>Services</b>\n\nPick a service to configure:", rows)
}

pub(super) fn service_edit_screen(service: Service, features: &Features) -> Screen {
    let mut rows = vec![
        vec![Button::action("📝 Main text", Action::EditServiceText(service))],
        vec![Button::action("🖼️ Main photo", Action::EditServicePhoto(service))],
    ];
    if features.submenus_enabled() {
        rows.push(vec![Button::action("📋 Submenus", Action::Submenus(service))]);
    }
    rows.push(back(Action::Services));
    Screen::new(
        format!("✏️ <b>{}</b>\n\nWhat do you want to change?", service.label()),
        rows,
    )
}

pub(super) fn submenus_screen(service: Service, submenus: &[ServiceSubmenu]) -> Screen {
    let mut rows: Keyboard = submenus
        .iter()
        .map(|submenu| vec![Button::action(submenu.name.clone(), Action::SubmenuDetail(submenu.id))])
        .collect();
    rows.push(vec![Button::action("➕ Add a submenu", Action::AddSubmenu(service))]);
    rows.push(back(Action::ServiceEdit(service)));
    Screen::new(
        format!("📋 <b>{} submenus</b>\n\nPick a submenu to edit it.", service.label()),
        rows,
    )
}

pub(super) fn submenu_detail_screen(submenu: &ServiceSubmenu) -> Screen {
    let text = format!(
        "📋 <b>{}</b>\n\nService: {}\nPosition: {}",
        escape_html(&submenu.name),
        submenu.service.key(),
        submenu.position
    );
    let id = submenu.id;
    Screen::new(
        text,
        vec![
            vec![Button::action("✏️ Change name", Action::EditSubmenu(id, SubmenuField::Name))],
            vec![Button::action("📝 Change text", Action::EditSubmenu(id, SubmenuField::Text))],
            vec![Button::action("🖼️ Change photo", Action::EditSubmenu(id, SubmenuField::Image))],
            vec![Button::action("🗑️ Delete", Action::DeleteSubmenu(id))],
            back(Action::Submenus(submenu.service)),
        ],
    )
}

pub(super) fn admins_screen(admins: &[User], primary_admin: i64) -> Screen {
    let mut text = String::from("👥 <b>Administrators</b>\n\n");
    if admins.is_empty() {
        text.push_str("<i>No administrators found</i>\n");
    } else {
        text.push_str("<b>Current administrators:</b>\n");
        for admin in admins {
            text.push_str(&format!("• {} ", escape_html(admin.display_name())));
            match &admin.username {
                Some(username) => text.push_str(&format!("(@{})", escape_html(username))),
                None => text.push_str(&format!("(ID: {})", admin.user_id)),
            }
            if admin.user_id == primary_admin {
                text.push_str(" 👑");
            }
            text.push('\n');
        }
        text.push_str("\n<i>👑 = primary administrator (cannot be removed)</i>");
    }
    Screen::new(
        text,
        vec![
            vec![Button::action("➕ Add an admin", Action::AddAdmin)],
            vec![Button::action("❌ Remove an admin", Action::RemoveAdminList)],
            back(Action::AdminPanel),
        ],
    )
}

pub(super) fn remove_admin_screen(admins: &[User], primary_admin: i64) -> Screen {
    let mut rows: Keyboard = admins
        .iter()
        .filter(|admin| admin.user_id != primary_admin)
        .map(|admin| {
            let handle = admin
                .username
                .clone()
                .unwrap_or_else(|| admin.user_id.to_string());
            vec![Button::action(
                format!("❌ {} (@{})", admin.display_name(), handle),
                Action::RemoveAdmin(admin.user_id),
            )]
        })
        .collect();
    rows.push(back(Action::Admins));
    Screen::new("❌ <b>Remove an administrator</b>\n\nPick the admin to remove:", rows)
}

pub(super) fn return_target(pending: &PendingInput) -> Action {
    match pending {
        PendingInput::WelcomeMessage | PendingInput::WelcomePhoto | PendingInput::Broadcast => {
            Action::AdminPanel
        }
        PendingInput::MiniAppUrl | PendingInput::MiniAppText => Action::MiniApp,
        PendingInput::ServiceText { service } | PendingInput::ServicePhoto { service } => {
            Action::ServiceEdit(*service)
        }
        PendingInput::SocialName | PendingInput::SocialEmoji | PendingInput::SocialUrl => Action::Socials,
        PendingInput::SocialField { id, .. } => Action::SocialDetail(*id),
        PendingInput::SubmenuName { service } | PendingInput::SubmenuText { service } => {
            Action::Submenus(*service)
        }
        PendingInput::SubmenuField { id, .. } => Action::SubmenuDetail(*id),
        PendingInput::AdminId => Action::Admins,
    }
}

pub(super) fn input_prompt(pending: &PendingInput, draft: &Draft) -> Screen {
    let text = match pending {
        PendingInput::WelcomeMessage => "✏️ <b>Welcome message</b>\n\nSend the new message.\nUse {firstname} to include the user's first name.".to_string(),
        PendingInput::WelcomePhoto => "🖼️ <b>Welcome photo</b>\n\nSend the new photo.".to_string(),
        PendingInput::MiniAppUrl => "🔗 Send the new mini app URL:".to_string(),
        PendingInput::MiniAppText => "✏️ Send the new button label:".to_string(),
        PendingInput::ServiceText { .. } => "📝 Send the new text for this service:".to_string(),
        PendingInput::ServicePhoto { .. } => "🖼️ Send the new photo for this service:".to_string(),
        PendingInput::SocialName => "➕ <b>Add a social link</b>\n\nSend the network name (e.g. Instagram):".to_string(),
        PendingInput::SocialEmoji => format!(
            "📱 <b>{}</b>\n\nSend the emoji for this network (e.g. 📷):",
            escape_html(draft_name(draft))
        ),
        PendingInput::SocialUrl => format!(
            "{} <b>{}</b>\n\nSend the network URL:",
            escape_html(draft_emoji(draft)),
            escape_html(draft_name(draft))
        ),
        PendingInput::SocialField { field, .. } => match field {
            SocialField::Name => "✏️ Send the new name:".to_string(),
            SocialField::Emoji => "😀 Send the new emoji:".to_string(),
            SocialField::Url => "🔗 Send the new URL:".to_string(),
        },
        PendingInput::SubmenuName { .. } => "➕ <b>Add a submenu</b>\n\nSend the submenu name:".to_string(),
        PendingInput::SubmenuText { .. } => format!(
            "📋 <b>{}</b>\n\nSend the submenu text:",
            escape_html(draft_name(draft))
        ),
        PendingInput::SubmenuField { field, .. } => match field {
            SubmenuField::Name => "✏️ Send the new submenu name:".to_string(),
            SubmenuField::Text => "📝 Send the new submenu text:".to_string(),
            SubmenuField::Image => "🖼️ Send the new submenu photo:".to_string(),
        },
        PendingInput::AdminId => "➕ <b>Add an administrator</b>\n\nSend the user's Telegram ID or @username:".to_string(),
        PendingInput::Broadcast => "📢 <b>Message everyone</b>\n\nSend the message to broadcast to all users.".to_string(),
    };
    Screen::new(text, vec![cancel(return_target(pending))])
}
