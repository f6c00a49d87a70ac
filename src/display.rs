use super::*;

/// Edits `existing` in place, or replaces it with a fresh message. Returns
/// the id of the message now on screen.
pub(super) async fn show(
    transport: &dyn Transport,
    chat_id: i64,
    screen: &Screen,
    existing: Option<i32>,
) -> Result<i32> {
    if let Some(message_id) = existing {
        let edited = match &screen.photo {
            Some(photo) => {
                transport
                    .edit_media(chat_id, message_id, photo, &screen.text, &screen.keyboard)
                    .await
            }
            None => {
                transport
                    .edit_text(chat_id, message_id, &screen.text, &screen.keyboard)
                    .await
            }
        };
        match edited {
            Ok(()) => return Ok(message_id),
            Err(err) if is_message_not_modified_error(&err) => return Ok(message_id),
            Err(err) => {
                debug!("edit of message {} failed, resending: {:#}", message_id, err);
                if let Err(err) = transport.delete_message(chat_id, message_id).await {
                    debug!("delete of message {} failed: {:#}", message_id, err);
                }
            }
        }
    }

    send(transport, chat_id, screen).await
}

pub(super) async fn send(transport: &dyn Transport, chat_id: i64, screen: &Screen) -> Result<i32> {
    match &screen.photo {
        Some(photo) => {
            transport
                .send_photo(chat_id, photo, &screen.text, Some(&screen.keyboard))
                .await
        }
        None => {
            transport
                .send_text(chat_id, &screen.text, Some(&screen.keyboard))
                .await
        }
    }
}

fn is_message_not_modified_error(err: &anyhow::Error) -> bool {
    format!("{:#}", err)
        .to_ascii_lowercase()
        .contains("message is not modified")
}
