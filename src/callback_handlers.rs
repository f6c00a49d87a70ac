use super::*;

#[derive(Clone, Debug)]
pub(super) struct IncomingCallback {
    pub(super) id: String,
    pub(super) from: Profile,
    pub(super) message: Option<(i64, i32)>,
    pub(super) data: Option<String>,
}

pub(super) async fn handle_callback(q: CallbackQuery, state: Arc<AppState>) -> Result<()> {
    let callback = IncomingCallback {
        id: q.id.clone(),
        from: profile_of(&q.from),
        message: q.message.as_ref().map(|msg| (msg.chat.id.0, msg.id.0)),
        data: q.data.clone(),
    };
    let chat_id = callback
        .message
        .map(|(chat_id, _)| chat_id)
        .unwrap_or(callback.from.user_id);

    if let Err(err) = on_callback(&state, &callback).await {
        report_failure(&state, chat_id, &err).await;
    }
    Ok(())
}

pub(super) async fn on_callback(state: &AppState, callback: &IncomingCallback) -> Result<()> {
    if let Err(err) = state.transport.answer_callback(&callback.id).await {
        debug!("answer callback {} failed: {:#}", callback.id, err);
    }

    let Some((chat_id, message_id)) = callback.message else {
        return Ok(());
    };
    let Some(action) = callback.data.as_deref().and_then(Action::parse) else {
        debug!("ignoring callback data {:?}", callback.data);
        return Ok(());
    };
    if !action.enabled(&state.config.features) {
        debug!("ignoring disabled action {:?}", action);
        return Ok(());
    }

    let user_id = callback.from.user_id;
    if action.requires_admin() && !is_admin(state, user_id).await? {
        return Ok(());
    }

    let mut user_state = load_user_state(state, user_id).await?;
    user_state.clear_pending();
    user_state.last_message_id = Some(message_id);

    let screen = render(state, &callback.from, &mut user_state, action).await?;
    present(state, chat_id, user_id, &mut user_state, &screen).await
}

fn prompt(user_state: &mut UserState, pending: PendingInput) -> Screen {
    let screen = input_prompt(&pending, &Draft::new());
    user_state.begin(pending);
    screen
}

async fn render(
    state: &AppState,
    from: &Profile,
    user_state: &mut UserState,
    action: Action,
) -> Result<Screen> {
    let store = state.store.as_ref();
    let features = &state.config.features;

    let screen = match action {
        Action::Start => {
            let config = store.get_config().await?;
            let links = store.social_links().await?;
            let first_name = from.first_name.as_deref().unwrap_or_default();
            welcome_screen(&config, &links, features, first_name)
        }
        Action::Service(service) => {
            let config = store.get_config().await?;
            let submenus = if features.submenus_enabled() {
                store.submenus(service).await?
            } else {
                Vec::new()
            };
            service_screen(&config, service, &submenus)
        }
        Action::Submenu(id) => match store.submenu(id).await? {
            Some(submenu) if submenu.is_active => submenu_screen(&submenu),
            _ => message_screen("❌ This submenu no longer exists.", Action::Start),
        },

        Action::AdminPanel => admin_panel(&store.stats().await?, features),
        Action::EditWelcome => prompt(user_state, PendingInput::WelcomeMessage),
        Action::EditWelcomePhoto => prompt(user_state, PendingInput::WelcomePhoto),
        Action::MiniApp => mini_app_screen(&store.get_config().await?),
        Action::EditMiniAppUrl => prompt(user_state, PendingInput::MiniAppUrl),
        Action::EditMiniAppText => prompt(user_state, PendingInput::MiniAppText),

        Action::Socials => socials_screen(&store.social_links().await?),
        Action::SocialDetail(id) => match store.social_link(id).await? {
            Some(link) => social_detail_screen(&link),
            None => message_screen("❌ This link no longer exists.", Action::Socials),
        },
        Action::AddSocial => prompt(user_state, PendingInput::SocialName),
        Action::EditSocial(id, field) => prompt(user_state, PendingInput::SocialField { id, field }),
        Action::DeleteSocial(id) => {
            let text = if store.delete_social_link(id).await? {
                info!("social link {} deleted", id);
                "✅ Social link deleted!"
            } else {
                "❌ This link no longer exists."
            };
            message_screen(text, Action::Socials)
        }

        Action::Services => services_screen(),
        Action::ServiceEdit(service) => service_edit_screen(service, features),
        Action::EditServiceText(service) => prompt(user_state, PendingInput::ServiceText { service }),
        Action::EditServicePhoto(service) => {
            prompt(user_state, PendingInput::ServicePhoto { service })
        }
        Action::Submenus(service) => submenus_screen(service, &store.submenus(service).await?),
        Action::AddSubmenu(service) => prompt(user_state, PendingInput::SubmenuName { service }),
        Action::SubmenuDetail(id) => match store.submenu(id).await? {
            Some(submenu) => submenu_detail_screen(&submenu),
            None => message_screen("❌ This submenu no longer exists.", Action::Services),
        },
        Action::EditSubmenu(id, field) => prompt(user_state, PendingInput::SubmenuField { id, field }),
        Action::DeleteSubmenu(id) => match store.submenu(id).await? {
            Some(submenu) => {
                store.delete_submenu(id).await?;
                info!("submenu {} deleted", id);
                message_screen("✅ Submenu deleted!", Action::Submenus(submenu.service))
            }
            None => message_screen("❌ This submenu no longer exists.", Action::Services),
        },

        Action::Stats => stats_screen(&store.stats().await?),
        Action::Admins => admins_screen(&store.admins().await?, state.config.admin_id),
        Action::AddAdmin => prompt(user_state, PendingInput::AdminId),
        Action::RemoveAdminList => {
            remove_admin_screen(&store.admins().await?, state.config.admin_id)
        }
        Action::RemoveAdmin(target) => {
            let text = if target == state.config.admin_id {
                "❌ The primary administrator cannot be removed."
            } else if store.set_admin(target, false).await? {
                // Drops any admin wizard the demoted user left half way.
                state.states.delete_user_state(target).await?;
                info!("user {} demoted by {}", target, from.user_id);
                "✅ Administrator removed."
            } else {
                "❌ User not found."
            };
            message_screen(text, Action::Admins)
        }
        Action::Broadcast => prompt(user_state, PendingInput::Broadcast),
    };
    Ok(screen)
}
