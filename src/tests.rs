use super::*;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use store::{MemoryStore, SqliteStore};

const ADMIN: i64 = 1;
const VISITOR: i64 = 2;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Call {
    SendText { chat_id: i64, text: String },
    SendPhoto { chat_id: i64, photo: String },
    EditText { message_id: i32, text: String },
    EditMedia { message_id: i32, photo: String },
    Delete { message_id: i32 },
}

/// Records successful calls. Editing a photo message as text fails, as it
/// does on Telegram, and sends to `failing_chats` are refused.
struct MockTransport {
    next_id: AtomicI32,
    calls: StdMutex<Vec<Call>>,
    photo_messages: StdMutex<HashSet<i32>>,
    failing_chats: HashSet<i64>,
}

impl MockTransport {
    fn new() -> Self {
        Self::failing_for(&[])
    }

    fn failing_for(chats: &[i64]) -> Self {
        MockTransport {
            next_id: AtomicI32::new(100),
            calls: StdMutex::new(Vec::new()),
            photo_messages: StdMutex::new(HashSet::new()),
            failing_chats: chats.iter().copied().collect(),
        }
    }

    fn mark_photo(&self, message_id: i32) {
        self.photo_messages.lock().unwrap().insert(message_id);
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_chat(&self, chat_id: i64) -> Result<()> {
        if self.failing_chats.contains(&chat_id) {
            return Err(anyhow!("Forbidden: bot was blocked by the user"));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_text(&self, chat_id: i64, text: &str, _keyboard: Option<&Keyboard>) -> Result<i32> {
        self.check_chat(chat_id)?;
        self.record(Call::SendText {
            chat_id,
            text: text.to_string(),
        });
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        photo: &str,
        _caption: &str,
        _keyboard: Option<&Keyboard>,
    ) -> Result<i32> {
        self.check_chat(chat_id)?;
        self.record(Call::SendPhoto {
            chat_id,
            photo: photo.to_string(),
        });
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.mark_photo(id);
        Ok(id)
    }

    async fn edit_text(&self, chat_id: i64, message_id: i32, text: &str, _keyboard: &Keyboard) -> Result<()> {
        self.check_chat(chat_id)?;
        if self.photo_messages.lock().unwrap().contains(&message_id) {
            return Err(anyhow!("Bad Request: there is no text in the message to edit"));
        }
        self.record(Call::EditText {
            message_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn edit_media(
        &self,
        chat_id: i64,
        message_id: i32,
        photo: &str,
        _caption: &str,
        _keyboard: &Keyboard,
    ) -> Result<()> {
        self.check_chat(chat_id)?;
        self.mark_photo(message_id);
        self.record(Call::EditMedia {
            message_id,
            photo: photo.to_string(),
        });
        Ok(())
    }

    async fn delete_message(&self, _chat_id: i64, message_id: i32) -> Result<()> {
        self.record(Call::Delete { message_id });
        Ok(())
    }

    async fn answer_callback(&self, _callback_id: &str) -> Result<()> {
        Ok(())
    }
}

fn app<S>(backend: Arc<S>, transport: Arc<MockTransport>, features: Features) -> AppState
where
    S: Store + StateStore + 'static,
{
    AppState {
        config: Config {
            token: "token".to_string(),
            admin_id: ADMIN,
            store: StoreConfig::Memory,
            features,
        },
        store: backend.clone(),
        states: backend,
        transport,
    }
}

fn memory_app(transport: Arc<MockTransport>) -> AppState {
    app(Arc::new(MemoryStore::new(false)), transport, Features::default())
}

fn profile(user_id: i64) -> Profile {
    Profile {
        user_id,
        username: Some(format!("user{}", user_id)),
        first_name: Some("Ann".to_string()),
        last_name: None,
    }
}

fn text(user_id: i64, text: &str) -> IncomingMessage {
    IncomingMessage {
        chat_id: user_id,
        from: profile(user_id),
        text: Some(text.to_string()),
        entities: Vec::new(),
        photo: None,
    }
}

fn photo(user_id: i64, file_id: &str) -> IncomingMessage {
    IncomingMessage {
        chat_id: user_id,
        from: profile(user_id),
        text: None,
        entities: Vec::new(),
        photo: Some(file_id.to_string()),
    }
}

fn press(user_id: i64, message_id: i32, action: Action) -> IncomingCallback {
    IncomingCallback {
        id: "cb".to_string(),
        from: profile(user_id),
        message: Some((user_id, message_id)),
        data: Some(action.encode()),
    }
}

#[tokio::test]
async fn idle_user_text_and_photo_change_nothing() {
    let transport = Arc::new(MockTransport::new());
    let state = memory_app(transport.clone());
    let before = UserState {
        pending: None,
        draft: Draft::new(),
        last_message_id: Some(9),
    };
    state.states.set_user_state(ADMIN, &before).await.unwrap();

    on_message(&state, &text(ADMIN, "hello")).await.unwrap();
    on_message(&state, &photo(ADMIN, "AgADphoto")).await.unwrap();
    on_message(&state, &text(VISITOR, "hello")).await.unwrap();

    assert_eq!(state.states.user_state(ADMIN).await.unwrap(), Some(before));
    assert_eq!(state.states.user_state(VISITOR).await.unwrap(), None);
    assert_eq!(state.store.get_config().await.unwrap(), BotConfig::default());
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn social_wizard_creates_exactly_one_link() {
    let transport = Arc::new(MockTransport::new());
    let state = memory_app(transport.clone());

    on_callback(&state, &press(ADMIN, 50, Action::AddSocial)).await.unwrap();
    on_message(&state, &text(ADMIN, "Instagram")).await.unwrap();
    on_message(&state, &text(ADMIN, "📷")).await.unwrap();

    let midway = state.states.user_state(ADMIN).await.unwrap().unwrap();
    assert_eq!(midway.pending, Some(PendingInput::SocialUrl));
    assert_eq!(draft_name(&midway.draft), "Instagram");

    on_message(&state, &text(ADMIN, "https://instagram.com")).await.unwrap();

    let links = state.store.social_links().await.unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].name, "Instagram");
    assert_eq!(links[0].emoji, "📷");
    assert_eq!(links[0].url, "https://instagram.com");

    let after = state.states.user_state(ADMIN).await.unwrap().unwrap();
    assert_eq!(after.pending, None);
    assert!(after.draft.is_empty());
    assert_eq!(after.last_message_id, Some(50));

    let edits: Vec<_> = transport
        .calls()
        .into_iter()
        .filter(|call| matches!(call, Call::EditText { message_id: 50, .. }))
        .collect();
    assert_eq!(edits.len(), 4);
}

#[tokio::test]
async fn cancelling_mid_wizard_discards_the_draft() {
    let transport = Arc::new(MockTransport::new());
    let state = memory_app(transport);

    on_callback(&state, &press(ADMIN, 50, Action::AddSocial)).await.unwrap();
    on_message(&state, &text(ADMIN, "Instagram")).await.unwrap();
    on_message(&state, &text(ADMIN, "📷")).await.unwrap();
    on_callback(&state, &press(ADMIN, 50, Action::Socials)).await.unwrap();

    let after = state.states.user_state(ADMIN).await.unwrap().unwrap();
    assert_eq!(after.pending, None);
    assert!(after.draft.is_empty());

    on_message(&state, &text(ADMIN, "https://instagram.com")).await.unwrap();
    assert!(state.store.social_links().await.unwrap().is_empty());
}

#[tokio::test]
async fn text_screen_over_photo_message_is_resent_once() {
    let transport = MockTransport::new();
    transport.mark_photo(7);
    let screen = message_screen("✅ Done", Action::AdminPanel);

    let shown = display::show(&transport, ADMIN, &screen, Some(7)).await.unwrap();

    assert_eq!(shown, 100);
    assert_eq!(
        transport.calls(),
        vec![
            Call::Delete { message_id: 7 },
            Call::SendText {
                chat_id: ADMIN,
                text: "✅ Done".to_string(),
            },
        ]
    );
}

#[tokio::test]
async fn photo_screen_edits_media_in_place() {
    let transport = MockTransport::new();
    let screen = message_screen("caption", Action::Start).with_photo(Some("AgADnew"));

    let shown = display::show(&transport, ADMIN, &screen, Some(12)).await.unwrap();

    assert_eq!(shown, 12);
    assert_eq!(
        transport.calls(),
        vec![Call::EditMedia {
            message_id: 12,
            photo: "AgADnew".to_string(),
        }]
    );
}

#[tokio::test]
async fn broadcast_skips_failed_recipient() {
    let transport = MockTransport::failing_for(&[20]);

    let report = broadcast::broadcast(&transport, &[10, 20, 30], "news", Duration::ZERO).await;

    assert_eq!(report.to_string(), "2/3");
    let recipients: Vec<_> = transport
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            Call::SendText { chat_id, .. } => Some(chat_id),
            _ => None,
        })
        .collect();
    assert_eq!(recipients, vec![10, 30]);
}

#[tokio::test]
async fn broadcast_input_reports_to_admin() {
    let transport = Arc::new(MockTransport::failing_for(&[VISITOR]));
    let features = Features {
        broadcast_delay_ms: 0,
        ..Features::default()
    };
    let state = app(Arc::new(MemoryStore::new(false)), transport.clone(), features);
    on_message(&state, &text(ADMIN, "/start")).await.unwrap();
    on_message(&state, &text(VISITOR, "/start")).await.unwrap_err();

    on_callback(&state, &press(ADMIN, 100, Action::Broadcast)).await.unwrap();
    on_message(&state, &text(ADMIN, "Open today")).await.unwrap();

    let last = transport.calls().pop().unwrap();
    assert_eq!(
        last,
        Call::EditText {
            message_id: 100,
            text: "✅ Message sent to 1/2 users!".to_string(),
        }
    );
}

#[tokio::test]
async fn store_failure_keeps_pending_input() {
    let transport = Arc::new(MockTransport::new());
    let backend = Arc::new(SqliteStore::open_in_memory(false).unwrap());
    let state = app(backend.clone(), transport, Features::default());

    let mut pending = UserState::default();
    pending.begin(PendingInput::SocialUrl);
    pending.draft.insert("name".to_string(), "Instagram".to_string());
    pending.draft.insert("emoji".to_string(), "📷".to_string());
    pending.last_message_id = Some(50);
    state.states.set_user_state(ADMIN, &pending).await.unwrap();

    backend
        .with_conn(|conn| Ok(conn.execute_batch("DROP TABLE social_networks")?))
        .unwrap();

    assert!(on_message(&state, &text(ADMIN, "https://instagram.com")).await.is_err());
    assert_eq!(state.states.user_state(ADMIN).await.unwrap(), Some(pending));
}

#[tokio::test]
async fn failures_are_apologised_for() {
    let transport = Arc::new(MockTransport::new());
    let state = memory_app(transport.clone());

    report_failure(&state, ADMIN, &anyhow!("store unavailable")).await;

    assert_eq!(
        transport.calls(),
        vec![Call::SendText {
            chat_id: ADMIN,
            text: failure_text().to_string(),
        }]
    );
}

#[tokio::test]
async fn visitors_cannot_use_admin_callbacks() {
    let transport = Arc::new(MockTransport::new());
    let state = memory_app(transport.clone());

    on_callback(&state, &press(VISITOR, 40, Action::AdminPanel)).await.unwrap();
    on_callback(&state, &press(VISITOR, 40, Action::Broadcast)).await.unwrap();

    assert!(transport.calls().is_empty());
    assert_eq!(state.states.user_state(VISITOR).await.unwrap(), None);
}

#[tokio::test]
async fn admin_command_denies_visitors() {
    let transport = Arc::new(MockTransport::new());
    let state = memory_app(transport.clone());
    let menu = UserState {
        last_message_id: Some(8),
        ..UserState::default()
    };
    state.states.set_user_state(VISITOR, &menu).await.unwrap();

    on_message(&state, &text(VISITOR, "/admin")).await.unwrap();

    assert_eq!(state.states.user_state(VISITOR).await.unwrap(), Some(menu));

    assert_eq!(
        transport.calls(),
        vec![Call::SendText {
            chat_id: VISITOR,
            text: access_denied_text().to_string(),
        }]
    );
}

#[tokio::test]
async fn start_replaces_previous_menu() {
    let transport = Arc::new(MockTransport::new());
    let state = memory_app(transport.clone());
    let mut previous = UserState::default();
    previous.begin(PendingInput::WelcomeMessage);
    previous.last_message_id = Some(3);
    state.states.set_user_state(ADMIN, &previous).await.unwrap();

    on_message(&state, &text(ADMIN, "/start")).await.unwrap();

    assert_eq!(
        transport.calls(),
        vec![
            Call::Delete { message_id: 3 },
            Call::SendText {
                chat_id: ADMIN,
                text: "🤖 Welcome Ann!".to_string(),
            },
        ]
    );
    let after = state.states.user_state(ADMIN).await.unwrap().unwrap();
    assert_eq!(after.pending, None);
    assert_eq!(after.last_message_id, Some(100));

    let user = state.store.get_user(ADMIN).await.unwrap().unwrap();
    assert!(user.is_admin);
    assert_eq!(state.store.stats().await.unwrap().total_starts, 1);
}

#[tokio::test]
async fn welcome_photo_accepts_only_photos() {
    let transport = Arc::new(MockTransport::new());
    let state = memory_app(transport);

    on_callback(&state, &press(ADMIN, 50, Action::EditWelcomePhoto)).await.unwrap();
    on_message(&state, &text(ADMIN, "not a photo")).await.unwrap();
    assert_eq!(
        state.states.user_state(ADMIN).await.unwrap().unwrap().pending,
        Some(PendingInput::WelcomePhoto)
    );

    on_message(&state, &photo(ADMIN, "AgADwelcome")).await.unwrap();
    let config = state.store.get_config().await.unwrap();
    assert_eq!(config.welcome_image.as_deref(), Some("AgADwelcome"));
    assert_eq!(state.states.user_state(ADMIN).await.unwrap().unwrap().pending, None);
}

#[tokio::test]
async fn unknown_username_keeps_admin_prompt_open() {
    let transport = Arc::new(MockTransport::new());
    let state = memory_app(transport);

    on_callback(&state, &press(ADMIN, 50, Action::AddAdmin)).await.unwrap();
    on_message(&state, &text(ADMIN, "@nobody")).await.unwrap();

    let after = state.states.user_state(ADMIN).await.unwrap().unwrap();
    assert_eq!(after.pending, Some(PendingInput::AdminId));
    assert!(state.store.admins().await.unwrap().is_empty());
}

#[tokio::test]
async fn promoted_admin_can_open_panel_and_primary_stays() {
    let transport = Arc::new(MockTransport::new());
    let state = memory_app(transport);
    on_message(&state, &text(VISITOR, "/start")).await.unwrap();

    on_callback(&state, &press(ADMIN, 50, Action::AddAdmin)).await.unwrap();
    on_message(&state, &text(ADMIN, "@user2")).await.unwrap();
    assert!(is_admin(&state, VISITOR).await.unwrap());

    on_callback(&state, &press(VISITOR, 60, Action::RemoveAdmin(ADMIN))).await.unwrap();
    assert!(is_admin(&state, ADMIN).await.unwrap());

    on_callback(&state, &press(VISITOR, 60, Action::AddSocial)).await.unwrap();
    on_callback(&state, &press(ADMIN, 50, Action::RemoveAdmin(VISITOR))).await.unwrap();
    assert!(!is_admin(&state, VISITOR).await.unwrap());
    assert_eq!(state.states.user_state(VISITOR).await.unwrap(), None);
}

#[tokio::test]
async fn disabled_broadcast_is_not_routed() {
    let transport = Arc::new(MockTransport::new());
    let features = Features {
        broadcast: false,
        ..Features::default()
    };
    let state = app(Arc::new(MemoryStore::new(false)), transport.clone(), features);

    on_callback(&state, &press(ADMIN, 50, Action::Broadcast)).await.unwrap();

    assert!(transport.calls().is_empty());
    assert_eq!(state.states.user_state(ADMIN).await.unwrap(), None);
}

#[tokio::test]
async fn invalid_link_url_is_rejected() {
    let transport = Arc::new(MockTransport::new());
    let state = memory_app(transport);

    on_callback(&state, &press(ADMIN, 50, Action::AddSocial)).await.unwrap();
    on_message(&state, &text(ADMIN, "Site")).await.unwrap();
    on_message(&state, &text(ADMIN, "🌐")).await.unwrap();
    on_message(&state, &text(ADMIN, "example dot com")).await.unwrap();

    let after = state.states.user_state(ADMIN).await.unwrap().unwrap();
    assert_eq!(after.pending, Some(PendingInput::SocialUrl));
    assert_eq!(draft_emoji(&after.draft), "🌐");
    assert!(state.store.social_links().await.unwrap().is_empty());
}

#[tokio::test]
async fn welcome_message_markup_is_escaped_for_visitors() {
    let transport = Arc::new(MockTransport::new());
    let state = memory_app(transport.clone());

    on_callback(&state, &press(ADMIN, 50, Action::EditWelcome)).await.unwrap();
    on_message(&state, &text(ADMIN, "Prices <10€ & free shipping")).await.unwrap();
    on_message(&state, &text(VISITOR, "/start")).await.unwrap();

    let sent = transport.calls().into_iter().find_map(|call| match call {
        Call::SendText { chat_id: VISITOR, text } => Some(text),
        _ => None,
    });
    assert_eq!(sent.as_deref(), Some("Prices &lt;10€ &amp; free shipping"));
}

#[tokio::test]
async fn broadcast_keeps_admin_formatting() {
    let transport = Arc::new(MockTransport::new());
    let features = Features {
        broadcast_delay_ms: 0,
        ..Features::default()
    };
    let state = app(Arc::new(MemoryStore::new(false)), transport.clone(), features);
    on_message(&state, &text(VISITOR, "/start")).await.unwrap();

    on_callback(&state, &press(ADMIN, 50, Action::Broadcast)).await.unwrap();
    let mut news = text(ADMIN, "Sale today & tomorrow");
    news.entities = vec![MessageEntity {
        kind: MessageEntityKind::Bold,
        offset: 0,
        length: 4,
    }];
    on_message(&state, &news).await.unwrap();

    let delivered: Vec<_> = transport
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            Call::SendText { chat_id: VISITOR, text } if text.starts_with("<b>") => Some(text),
            _ => None,
        })
        .collect();
    assert_eq!(delivered, vec!["<b>Sale</b> today &amp; tomorrow".to_string()]);
}

#[tokio::test]
async fn link_names_are_stored_as_typed() {
    let transport = Arc::new(MockTransport::new());
    let state = memory_app(transport);

    on_callback(&state, &press(ADMIN, 50, Action::AddSocial)).await.unwrap();
    on_message(&state, &text(ADMIN, "Tom & Jerry")).await.unwrap();
    on_message(&state, &text(ADMIN, "🐭")).await.unwrap();
    on_message(&state, &text(ADMIN, "https://example.com")).await.unwrap();

    let links = state.store.social_links().await.unwrap();
    assert_eq!(links[0].name, "Tom & Jerry");
}
