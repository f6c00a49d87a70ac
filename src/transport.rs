use async_trait::async_trait;
use teloxide::types::{
    InlineKeyboardButton, InlineKeyboardMarkup, InputFile, InputMedia, InputMediaPhoto, ParseMode,
    WebAppInfo,
};
use url::Url;

use super::*;

#[async_trait]
pub(super) trait Transport: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str, keyboard: Option<&Keyboard>) -> Result<i32>;

    async fn send_photo(
        &self,
        chat_id: i64,
        photo: &str,
        caption: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<i32>;

    async fn edit_text(&self, chat_id: i64, message_id: i32, text: &str, keyboard: &Keyboard) -> Result<()>;

    async fn edit_media(
        &self,
        chat_id: i64,
        message_id: i32,
        photo: &str,
        caption: &str,
        keyboard: &Keyboard,
    ) -> Result<()>;

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<()>;

    async fn answer_callback(&self, callback_id: &str) -> Result<()>;
}

pub(super) struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub(super) fn new(bot: Bot) -> Self {
        TelegramTransport { bot }
    }
}

/// Converts rendered rows to Telegram markup. Link buttons whose URL does
/// not parse are dropped, along with rows left empty.
pub(super) fn to_markup(keyboard: &Keyboard) -> InlineKeyboardMarkup {
    let rows = keyboard
        .iter()
        .map(|row| row.iter().filter_map(to_button).collect::<Vec<_>>())
        .filter(|row| !row.is_empty())
        .collect::<Vec<_>>();
    InlineKeyboardMarkup::new(rows)
}

fn to_button(button: &Button) -> Option<InlineKeyboardButton> {
    match button {
        Button::Callback { text, data } => Some(InlineKeyboardButton::callback(text, data)),
        Button::Url { text, url } => match Url::parse(url) {
            Ok(url) => Some(InlineKeyboardButton::url(text, url)),
            Err(err) => {
                warn!("skipping link button {:?}: {}", text, err);
                None
            }
        },
        Button::WebApp { text, url } => match Url::parse(url) {
            Ok(url) => Some(InlineKeyboardButton::web_app(text, WebAppInfo { url })),
            Err(err) => {
                warn!("skipping mini app button {:?}: {}", text, err);
                None
            }
        },
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send_text(&self, chat_id: i64, text: &str, keyboard: Option<&Keyboard>) -> Result<i32> {
        let mut request = self
            .bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html);
        if let Some(keyboard) = keyboard {
            request = request.reply_markup(to_markup(keyboard));
        }
        let sent = request.await?;
        Ok(sent.id.0)
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        photo: &str,
        caption: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<i32> {
        let mut request = self
            .bot
            .send_photo(ChatId(chat_id), InputFile::file_id(photo))
            .caption(caption)
            .parse_mode(ParseMode::Html);
        if let Some(keyboard) = keyboard {
            request = request.reply_markup(to_markup(keyboard));
        }
        let sent = request.await?;
        Ok(sent.id.0)
    }

    async fn edit_text(&self, chat_id: i64, message_id: i32, text: &str, keyboard: &Keyboard) -> Result<()> {
        self.bot
            .edit_message_text(ChatId(chat_id), MessageId(message_id), text)
            .parse_mode(ParseMode::Html)
            .reply_markup(to_markup(keyboard))
            .await?;
        Ok(())
    }

    async fn edit_media(
        &self,
        chat_id: i64,
        message_id: i32,
        photo: &str,
        caption: &str,
        keyboard: &Keyboard,
    ) -> Result<()> {
        let media = InputMedia::Photo(
            InputMediaPhoto::new(InputFile::file_id(photo))
                .caption(caption)
                .parse_mode(ParseMode::Html),
        );
        self.bot
            .edit_message_media(ChatId(chat_id), MessageId(message_id), media)
            .reply_markup(to_markup(keyboard))
            .await?;
        Ok(())
    }

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<()> {
        self.bot
            .delete_message(ChatId(chat_id), MessageId(message_id))
            .await?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<()> {
        self.bot.answer_callback_query(callback_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markup_keeps_row_layout() {
        let keyboard = vec![
            vec![Button::WebApp {
                text: "App".to_string(),
                url: "https://app.example.com".to_string(),
            }],
            vec![
                Button::action("Delivery", Action::Service(Service::Delivery)),
                Button::Url {
                    text: "Site".to_string(),
                    url: "https://example.com".to_string(),
                },
            ],
        ];
        let markup = to_markup(&keyboard);
        assert_eq!(markup.inline_keyboard.len(), 2);
        assert_eq!(markup.inline_keyboard[1].len(), 2);
        assert_eq!(markup.inline_keyboard[1][0].text, "Delivery");
    }

    #[test]
    fn markup_drops_buttons_with_bad_urls() {
        let keyboard = vec![
            vec![Button::Url {
                text: "Broken".to_string(),
                url: "not a url".to_string(),
            }],
            vec![Button::action("Back", Action::Start)],
        ];
        let markup = to_markup(&keyboard);
        assert_eq!(markup.inline_keyboard.len(), 1);
        assert_eq!(markup.inline_keyboard[0][0].text, "Back");
    }
}
