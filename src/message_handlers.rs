use super::*;

#[derive(Clone, Debug)]
pub(super) struct IncomingMessage {
    pub(super) chat_id: i64,
    pub(super) from: Profile,
    pub(super) text: Option<String>,
    pub(super) entities: Vec<MessageEntity>,
    pub(super) photo: Option<String>,
}

enum Outcome {
    Done(String),
    Rejected(String),
}

pub(super) async fn handle_message(msg: Message, state: Arc<AppState>) -> Result<()> {
    let Some(from) = msg.from() else {
        return Ok(());
    };
    let incoming = IncomingMessage {
        chat_id: msg.chat.id.0,
        from: profile_of(from),
        text: msg.text().map(str::to_string),
        entities: msg.entities().map(<[MessageEntity]>::to_vec).unwrap_or_default(),
        photo: msg
            .photo()
            .and_then(|sizes| sizes.last())
            .map(|size| size.file.id.clone()),
    };

    if let Err(err) = on_message(&state, &incoming).await {
        report_failure(&state, incoming.chat_id, &err).await;
    }
    Ok(())
}

pub(super) async fn on_message(state: &AppState, incoming: &IncomingMessage) -> Result<()> {
    if let Some(text) = incoming.text.as_deref() {
        match parse_command(text) {
            Some("start") => return handle_start(state, incoming).await,
            Some("admin") => return handle_admin(state, incoming).await,
            _ => {}
        }
    }

    handle_input(state, incoming).await
}

async fn reset_menu(state: &AppState, chat_id: i64, user_id: i64) -> Result<UserState> {
    let mut user_state = load_user_state(state, user_id).await?;
    if let Some(message_id) = user_state.last_message_id.take() {
        if let Err(err) = state.transport.delete_message(chat_id, message_id).await {
            debug!("delete of menu {} in {} failed: {:#}", message_id, chat_id, err);
        }
    }
    user_state.clear_pending();
    Ok(user_state)
}

async fn handle_start(state: &AppState, incoming: &IncomingMessage) -> Result<()> {
    let user_id = incoming.from.user_id;
    let mut user_state = reset_menu(state, incoming.chat_id, user_id).await?;

    let is_primary = user_id == state.config.admin_id;
    state.store.upsert_user(&incoming.from, is_primary).await?;
    state.store.log_event("start", user_id, None).await?;

    let config = state.store.get_config().await?;
    let links = state.store.social_links().await?;
    let first_name = incoming.from.first_name.as_deref().unwrap_or_default();
    let screen = welcome_screen(&config, &links, &state.config.features, first_name);

    let message_id = display::send(state.transport.as_ref(), incoming.chat_id, &screen).await?;
    user_state.last_message_id = Some(message_id);
    state.states.set_user_state(user_id, &user_state).await?;
    Ok(())
}

async fn handle_admin(state: &AppState, incoming: &IncomingMessage) -> Result<()> {
    let user_id = incoming.from.user_id;
    if !is_admin(state, user_id).await? {
        state
            .transport
            .send_text(incoming.chat_id, access_denied_text(), None)
            .await?;
        return Ok(());
    }

    let mut user_state = reset_menu(state, incoming.chat_id, user_id).await?;

    state.store.log_event("admin", user_id, None).await?;
    let stats = state.store.stats().await?;
    let screen = admin_panel(&stats, &state.config.features);
    let message_id = display::send(state.transport.as_ref(), incoming.chat_id, &screen).await?;
    user_state.last_message_id = Some(message_id);
    state.states.set_user_state(user_id, &user_state).await?;
    Ok(())
}

async fn handle_input(state: &AppState, incoming: &IncomingMessage) -> Result<()> {
    let user_id = incoming.from.user_id;
    let Some(mut user_state) = state.states.user_state(user_id).await? else {
        return Ok(());
    };
    let Some(pending) = user_state.pending.clone() else {
        return Ok(());
    };

    let formatted = match incoming.text.as_deref() {
        Some(text) if pending.takes_formatting() => Some(entities_to_html(text, &incoming.entities)),
        _ => None,
    };
    let input = match (formatted.as_deref().or(incoming.text.as_deref()), incoming.photo.as_deref()) {
        (Some(text), _) => Input::Text(text),
        (None, Some(photo)) => Input::Photo(photo),
        (None, None) => return Ok(()),
    };

    let next = transition(Some(&pending), &user_state.draft, input);
    if next == Transition::Ignore || !is_admin(state, user_id).await? {
        return Ok(());
    }

    match next {
        Transition::Ignore => Ok(()),
        Transition::Advance { next, draft } => {
            let screen = input_prompt(&next, &draft);
            user_state.pending = Some(next);
            user_state.draft = draft;
            present(state, incoming.chat_id, user_id, &mut user_state, &screen).await
        }
        Transition::Commit(commit) => {
            let screen = match apply_commit(state, commit).await? {
                Outcome::Done(text) => {
                    user_state.clear_pending();
                    message_screen(text, return_target(&pending))
                }
                Outcome::Rejected(reason) => {
                    let prompt = input_prompt(&pending, &user_state.draft);
                    Screen {
                        text: format!("{}\n\n{}", reason, prompt.text),
                        ..prompt
                    }
                }
            };
            present(state, incoming.chat_id, user_id, &mut user_state, &screen).await
        }
    }
}

async fn apply_commit(state: &AppState, commit: Commit) -> Result<Outcome> {
    let store = state.store.as_ref();
    let outcome = match commit {
        Commit::Config { field, value } => {
            if field == ConfigField::MiniAppUrl && !is_web_url(&value) {
                return Ok(invalid_url());
            }
            store.update_config(field, &value).await?;
            Outcome::Done(config_updated_text(field).to_string())
        }
        Commit::AddSocial { name, emoji, url } => {
            if !is_web_url(&url) {
                return Ok(invalid_url());
            }
            let link = store.add_social_link(&name, &emoji, &url).await?;
            info!("social link {} added ({})", link.id, link.name);
            Outcome::Done(format!("✅ {} added!", escape_html(&link.label())))
        }
        Commit::UpdateSocial { id, field, value } => {
            if field == SocialField::Url && !is_web_url(&value) {
                return Ok(invalid_url());
            }
            if store.update_social_link(id, field, &value).await? {
                Outcome::Done("✅ Social link updated!".to_string())
            } else {
                Outcome::Done("❌ This link no longer exists.".to_string())
            }
        }
        Commit::AddSubmenu { service, name, text } => {
            let submenu = store.add_submenu(service, &name, &text, None).await?;
            Outcome::Done(format!("✅ Submenu {} added!", escape_html(&submenu.name)))
        }
        Commit::UpdateSubmenu { id, field, value } => {
            if store.update_submenu(id, field, &value).await? {
                Outcome::Done("✅ Submenu updated!".to_string())
            } else {
                Outcome::Done("❌ This submenu no longer exists.".to_string())
            }
        }
        Commit::PromoteAdmin(raw) => promote_admin(store, &raw).await?,
        Commit::Broadcast(text) => {
            let recipients: Vec<i64> = store
                .all_users()
                .await?
                .into_iter()
                .map(|user| user.user_id)
                .collect();
            let report = broadcast::broadcast(
                state.transport.as_ref(),
                &recipients,
                &text,
                state.config.features.broadcast_delay(),
            )
            .await;
            Outcome::Done(format!("✅ Message sent to {} users!", report))
        }
    };
    Ok(outcome)
}

async fn promote_admin(store: &dyn Store, raw: &str) -> Result<Outcome> {
    let raw = raw.trim();
    if let Ok(user_id) = raw.parse::<i64>() {
        if !store.set_admin(user_id, true).await? {
            let placeholder = Profile {
                user_id,
                username: None,
                first_name: None,
                last_name: None,
            };
            store.upsert_user(&placeholder, true).await?;
        }
        info!("user {} promoted to admin", user_id);
        return Ok(Outcome::Done(format!("✅ User {} is now an administrator.", user_id)));
    }

    let username = raw.trim_start_matches('@');
    if username.is_empty() {
        return Ok(Outcome::Rejected(
            "❌ Send a numeric ID or an @username.".to_string(),
        ));
    }
    match store.find_user_by_username(username).await? {
        Some(user) => {
            store.set_admin(user.user_id, true).await?;
            info!("user {} (@{}) promoted to admin", user.user_id, username);
            Ok(Outcome::Done(format!(
                "✅ @{} is now an administrator.",
                escape_html(username)
            )))
        }
        None => Ok(Outcome::Rejected(format!(
            "❌ User @{} not found. They must start the bot first.",
            escape_html(username)
        ))),
    }
}

fn is_web_url(raw: &str) -> bool {
    url::Url::parse(raw)
        .map(|url| matches!(url.scheme(), "http" | "https" | "tg"))
        .unwrap_or(false)
}

fn invalid_url() -> Outcome {
    Outcome::Rejected("❌ That does not look like a valid link (https://...).".to_string())
}

fn config_updated_text(field: ConfigField) -> &'static str {
    match field {
        ConfigField::WelcomeMessage => "✅ Welcome message updated!",
        ConfigField::WelcomeImage => "✅ Welcome photo updated!",
        ConfigField::MiniAppUrl => "✅ Mini app URL updated!",
        ConfigField::MiniAppText => "✅ Mini app label updated!",
        ConfigField::ServiceText(_) => "✅ Service text updated!",
        ConfigField::ServiceImage(_) => "✅ Service photo updated!",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn web_urls_need_a_link_scheme() {
        assert!(is_web_url("https://instagram.com"));
        assert!(is_web_url("tg://resolve?domain=menu"));
        assert!(!is_web_url("instagram.com"));
        assert!(!is_web_url("javascript:alert(1)"));
    }

    #[tokio::test]
    async fn promoting_unknown_username_is_rejected() {
        let store = store::MemoryStore::new(false);
        let outcome = promote_admin(&store, "@ghost").await.unwrap();
        assert!(matches!(outcome, Outcome::Rejected(_)));
        assert!(store.admins().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn promoting_numeric_id_creates_placeholder_admin() {
        let store = store::MemoryStore::new(false);
        let outcome = promote_admin(&store, "777").await.unwrap();
        assert!(matches!(outcome, Outcome::Done(_)));
        let user = store.get_user(777).await.unwrap().unwrap();
        assert!(user.is_admin);
    }
}
