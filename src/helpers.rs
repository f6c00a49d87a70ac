use super::*;

#[derive(Debug, Deserialize)]
struct ConfigFile {
    token: SecretInput,
    admin_id: UserIdInput,
    #[serde(default)]
    store: StoreFile,
    #[serde(default)]
    features: Features,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SecretInput {
    Value(String),
    File { file: PathBuf },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UserIdInput {
    Number(i64),
    String(String),
    File { file: PathBuf },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum StoreFile {
    Memory,
    Sqlite {
        path: PathBuf,
    },
    D1 {
        account_id: String,
        database_id: String,
        api_token: SecretInput,
        api_base: Option<String>,
    },
}

impl Default for StoreFile {
    fn default() -> Self {
        StoreFile::Sqlite {
            path: PathBuf::from("menubot.db"),
        }
    }
}

pub(super) fn load_config(path: &Path) -> Result<Config> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    let config_dir = path.parent().unwrap_or_else(|| Path::new("."));
    parse_config(&contents, config_dir)
}

pub(super) fn parse_config(contents: &str, config_dir: &Path) -> Result<Config> {
    let config_file: ConfigFile = toml::from_str(contents).context("parse config")?;

    let token = resolve_secret(config_file.token, config_dir).context("resolve token")?;
    let admin_id = resolve_user_id(config_file.admin_id, config_dir)?;
    let store = match config_file.store {
        StoreFile::Memory => StoreConfig::Memory,
        StoreFile::Sqlite { path } => StoreConfig::Sqlite {
            path: resolve_path(&path, config_dir),
        },
        StoreFile::D1 {
            account_id,
            database_id,
            api_token,
            api_base,
        } => {
            if account_id.trim().is_empty() || database_id.trim().is_empty() {
                return Err(anyhow!("d1 store needs account_id and database_id"));
            }
            StoreConfig::D1(D1Config {
                account_id,
                database_id,
                api_token: resolve_secret(api_token, config_dir).context("resolve d1 api_token")?,
                api_base: api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            })
        }
    };

    Ok(Config {
        token,
        admin_id,
        store,
        features: config_file.features,
    })
}

fn resolve_secret(input: SecretInput, config_dir: &Path) -> Result<String> {
    let value = match input {
        SecretInput::Value(value) => value,
        SecretInput::File { file } => {
            let path = resolve_path(&file, config_dir);
            std::fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?
        }
    };
    let value = value.trim();
    if value.is_empty() {
        return Err(anyhow!("value is empty"));
    }
    Ok(value.to_string())
}

fn resolve_user_id(input: UserIdInput, config_dir: &Path) -> Result<i64> {
    match input {
        UserIdInput::Number(value) => Ok(value),
        UserIdInput::String(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Err(anyhow!("admin_id is empty"));
            }
            if trimmed.chars().all(|c| c.is_ascii_digit()) {
                return parse_user_id_value(trimmed);
            }
            read_user_id_file(&resolve_path(Path::new(trimmed), config_dir))
        }
        UserIdInput::File { file } => read_user_id_file(&resolve_path(&file, config_dir)),
    }
}

fn resolve_path(path: &Path, config_dir: &Path) -> PathBuf {
    if path.is_relative() {
        config_dir.join(path)
    } else {
        path.to_path_buf()
    }
}

fn read_user_id_file(path: &Path) -> Result<i64> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("read admin_id file {}", path.display()))?;
    parse_user_id_value(&contents).with_context(|| format!("parse admin_id from {}", path.display()))
}

fn parse_user_id_value(raw: &str) -> Result<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("admin_id is empty"));
    }
    trimmed.parse::<i64>().context("parse admin_id")
}

pub(super) fn parse_command(text: &str) -> Option<&str> {
    let first = text.split_whitespace().next()?;
    if !first.starts_with('/') {
        return None;
    }
    let cmd = first.trim_start_matches('/');
    Some(cmd.split('@').next().unwrap_or(cmd))
}

pub(super) fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        push_escaped(&mut out, c);
    }
    out
}

fn push_escaped(out: &mut String, c: char) {
    match c {
        '&' => out.push_str("&amp;"),
        '<' => out.push_str("&lt;"),
        '>' => out.push_str("&gt;"),
        _ => out.push(c),
    }
}

struct Span {
    start: usize,
    end: usize,
    open: String,
    close: &'static str,
}

/// Renders admin-typed text as Telegram HTML: plain text is escaped and
/// formatting entities become tags. Entity offsets count UTF-16 units.
pub(super) fn entities_to_html(text: &str, entities: &[MessageEntity]) -> String {
    let mut spans: Vec<Span> = entities
        .iter()
        .filter_map(|entity| {
            let (open, close) = entity_tags(&entity.kind)?;
            let start = utf16_to_byte(text, entity.offset);
            let end = utf16_to_byte(text, entity.offset + entity.length);
            (start < end).then_some(Span {
                start,
                end,
                open,
                close,
            })
        })
        .collect();
    spans.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));

    let mut out = String::with_capacity(text.len());
    let mut open: Vec<&Span> = Vec::new();
    let mut upcoming = spans.iter().peekable();
    let positions = text
        .char_indices()
        .map(|(pos, _)| pos)
        .chain(std::iter::once(text.len()));

    for pos in positions {
        // Overlapping spans are closed and reopened so tags stay nested.
        let mut reopen = Vec::new();
        while open.iter().any(|span| span.end <= pos) {
            let Some(span) = open.pop() else {
                break;
            };
            out.push_str(span.close);
            if span.end > pos {
                reopen.push(span);
            }
        }
        for span in reopen.into_iter().rev() {
            out.push_str(&span.open);
            open.push(span);
        }

        while let Some(span) = upcoming.next_if(|span| span.start == pos) {
            out.push_str(&span.open);
            open.push(span);
        }
        if let Some(c) = text[pos..].chars().next() {
            push_escaped(&mut out, c);
        }
    }
    out
}

fn entity_tags(kind: &MessageEntityKind) -> Option<(String, &'static str)> {
    let tags = match kind {
        MessageEntityKind::Bold => ("<b>".to_string(), "</b>"),
        MessageEntityKind::Italic => ("<i>".to_string(), "</i>"),
        MessageEntityKind::Underline => ("<u>".to_string(), "</u>"),
        MessageEntityKind::Strikethrough => ("<s>".to_string(), "</s>"),
        MessageEntityKind::Spoiler => ("<span class=\"tg-spoiler\">".to_string(), "</span>"),
        MessageEntityKind::Code => ("<code>".to_string(), "</code>"),
        MessageEntityKind::Pre { .. } => ("<pre>".to_string(), "</pre>"),
        MessageEntityKind::TextLink { url } => (
            format!("<a href=\"{}\">", escape_html(url.as_str()).replace('"', "&quot;")),
            "</a>",
        ),
        _ => return None,
    };
    Some(tags)
}

fn utf16_to_byte(text: &str, offset: usize) -> usize {
    let mut units = 0;
    for (pos, c) in text.char_indices() {
        if units >= offset {
            return pos;
        }
        units += c.len_utf16();
    }
    text.len()
}

pub(super) fn profile_of(user: &teloxide::types::User) -> Profile {
    Profile {
        user_id: user.id.0 as i64,
        username: user.username.clone(),
        first_name: Some(user.first_name.clone()).filter(|name| !name.is_empty()),
        last_name: user.last_name.clone(),
    }
}

pub(super) async fn is_admin(state: &AppState, user_id: i64) -> Result<bool> {
    if user_id == state.config.admin_id {
        return Ok(true);
    }
    let user = state.store.get_user(user_id).await?;
    Ok(user.map(|user| user.is_admin).unwrap_or(false))
}

pub(super) async fn load_user_state(state: &AppState, user_id: i64) -> Result<UserState> {
    Ok(state.states.user_state(user_id).await?.unwrap_or_default())
}

/// Shows `screen` in place of the user's tracked menu message and persists
/// `user_state` with the id of whatever is now on screen.
pub(super) async fn present(
    state: &AppState,
    chat_id: i64,
    user_id: i64,
    user_state: &mut UserState,
    screen: &Screen,
) -> Result<()> {
    let shown = display::show(
        state.transport.as_ref(),
        chat_id,
        screen,
        user_state.last_message_id,
    )
    .await;
    if let Ok(message_id) = shown {
        user_state.last_message_id = Some(message_id);
    }
    state.states.set_user_state(user_id, user_state).await?;
    shown.map(drop)
}

pub(super) async fn report_failure(state: &AppState, chat_id: i64, err: &anyhow::Error) {
    error!("update handling failed in chat {}: {:#}", chat_id, err);
    if let Err(err) = state.transport.send_text(chat_id, failure_text(), None).await {
        warn!("failed to send apology to {}: {:#}", chat_id, err);
    }
}
