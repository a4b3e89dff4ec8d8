use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{FileId, MessageEntity, MessageEntityKind, MessageKind, PhotoSize};
use tracing::{error, info, warn};

use crate::classify::{ChatKind, Entity, EntityKind, IncomingMessage};
use crate::conversation::PhotoVariant;
use crate::handler::{HandlerInput, MessageHandler};
use crate::platform::ChatPlatform;

/// Telegram caps messages at 4096 chars, so long replies go out as a
/// sequence of chunks, split at a newline or space where one exists.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        // Back up to a char boundary before slicing
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        let actual_end = if end < text.len() {
            text[start..end]
                .rfind('\n')
                .or_else(|| text[start..end].rfind(' '))
                .map(|pos| start + pos + 1)
                .unwrap_or(end)
        } else {
            end
        };

        chunks.push(text[start..actual_end].to_string());
        start = actual_end;
    }

    chunks
}

/// Telegram Bot API side of the [`ChatPlatform`] contract.
pub struct TelegramPlatform {
    bot: Bot,
}

impl TelegramPlatform {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ChatPlatform for TelegramPlatform {
    async fn fetch_file_image(&self, photo: &PhotoVariant) -> Result<Vec<u8>> {
        let file = self
            .bot
            .get_file(FileId(photo.file_id.clone()))
            .await
            .context("Failed to resolve photo file path")?;

        let mut buf = Vec::new();
        self.bot
            .download_file(&file.path, &mut buf)
            .await
            .context("Failed to download photo")?;
        Ok(buf)
    }

    async fn deliver_reply(&self, chat_id: i64, text: &str) -> Result<()> {
        for chunk in split_message(text, 4000) {
            self.bot
                .send_message(ChatId(chat_id), chunk)
                .await
                .context("Failed to send reply")?;
        }
        Ok(())
    }
}

fn map_chat_kind(chat: &teloxide::types::Chat) -> Option<ChatKind> {
    if chat.is_private() {
        Some(ChatKind::Private)
    } else if chat.is_group() {
        Some(ChatKind::Group)
    } else if chat.is_supergroup() {
        Some(ChatKind::Supergroup)
    } else {
        // Channels and the like are not handled.
        None
    }
}

fn map_entities(entities: &[MessageEntity]) -> Vec<Entity> {
    entities
        .iter()
        .map(|entity| Entity {
            kind: match entity.kind {
                MessageEntityKind::BotCommand => EntityKind::Command,
                MessageEntityKind::Mention => EntityKind::Mention,
                _ => EntityKind::Other,
            },
            offset: entity.offset,
            length: entity.length,
        })
        .collect()
}

fn map_photo(sizes: &[PhotoSize]) -> Vec<PhotoVariant> {
    sizes
        .iter()
        .map(|photo| PhotoVariant {
            file_id: photo.file.id.0.clone(),
            width: photo.width,
            height: photo.height,
        })
        .collect()
}

fn map_message(msg: &Message) -> Option<IncomingMessage> {
    let chat_kind = map_chat_kind(&msg.chat)?;
    let from = msg.from.as_ref()?;

    let group_chat_created = matches!(msg.kind, MessageKind::GroupChatCreated(_));
    let text = msg.text().map(str::to_string);
    let caption = msg.caption().map(str::to_string);
    let photo = msg.photo().map(map_photo);

    // Stickers, voice notes, locations and other media the bot cannot
    // read are ignored. The group-created service message still goes
    // through so the bot can introduce itself.
    if text.is_none() && caption.is_none() && photo.is_none() && !group_chat_created {
        return None;
    }

    Some(IncomingMessage {
        chat_id: msg.chat.id.0,
        chat_kind,
        first_name: from.first_name.clone(),
        last_name: from.last_name.clone(),
        text,
        caption,
        photo,
        entities: msg.entities().map(map_entities).unwrap_or_default(),
        caption_entities: msg
            .caption_entities()
            .map(map_entities)
            .unwrap_or_default(),
        group_chat_created,
    })
}

/// Run the Telegram bot platform
pub async fn run(
    handler: Arc<MessageHandler>,
    platform: Arc<TelegramPlatform>,
    bot: Bot,
) -> Result<()> {
    info!("Starting Telegram platform...");

    let update_handler = Update::filter_message().endpoint(handle_update);

    Dispatcher::builder(bot, update_handler)
        .dependencies(dptree::deps![handler, platform])
        .default_handler(|upd| async move {
            warn!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_update(
    bot: Bot,
    msg: Message,
    handler: Arc<MessageHandler>,
    platform: Arc<TelegramPlatform>,
) -> ResponseResult<()> {
    let incoming = match map_message(&msg) {
        Some(incoming) => incoming,
        None => return Ok(()),
    };
    let chat_id = msg.chat.id.0;

    bot.send_chat_action(msg.chat.id, teloxide::types::ChatAction::Typing)
        .await
        .ok();

    match handler.handle(HandlerInput { message: incoming, chat_id }).await {
        Ok(reply) => {
            if reply.send && !reply.text.is_empty() {
                if let Err(e) = platform.deliver_reply(chat_id, &reply.text).await {
                    error!("Failed to deliver reply: {:#}", e);
                }
            }
        }
        Err(e) => {
            error!("Error handling message: {:#}", e);
            bot.send_message(msg.chat.id, format!("Error: {}", e))
                .await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message_from_json(json: serde_json::Value) -> Message {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn contentless_message_is_ignored() {
        // A location share: no text, no caption, no photo. Stickers and
        // voice notes take the same path.
        let msg = message_from_json(json!({
            "message_id": 1,
            "date": 1700000000,
            "chat": {"id": 42, "type": "private", "first_name": "Ada"},
            "from": {"id": 7, "is_bot": false, "first_name": "Ada"},
            "location": {"latitude": 0.0, "longitude": 0.0}
        }));
        assert!(map_message(&msg).is_none());
    }

    #[test]
    fn group_created_service_message_still_maps() {
        let msg = message_from_json(json!({
            "message_id": 2,
            "date": 1700000000,
            "chat": {"id": -42, "type": "group", "title": "friends"},
            "from": {"id": 7, "is_bot": false, "first_name": "Ada"},
            "group_chat_created": true
        }));
        let incoming = map_message(&msg).unwrap();
        assert!(incoming.group_chat_created);
        assert_eq!(incoming.chat_kind, ChatKind::Group);
    }

    #[test]
    fn text_message_maps_with_entities() {
        let msg = message_from_json(json!({
            "message_id": 3,
            "date": 1700000000,
            "chat": {"id": 42, "type": "private", "first_name": "Ada"},
            "from": {"id": 7, "is_bot": false, "first_name": "Ada", "last_name": "Lovelace"},
            "text": "/chat hello",
            "entities": [{"type": "bot_command", "offset": 0, "length": 5}]
        }));
        let incoming = map_message(&msg).unwrap();
        assert_eq!(incoming.text.as_deref(), Some("/chat hello"));
        assert_eq!(incoming.last_name.as_deref(), Some("Lovelace"));
        assert_eq!(incoming.entities.len(), 1);
        assert_eq!(incoming.entities[0].kind, EntityKind::Command);
        assert_eq!(incoming.entities[0].length, 5);
    }

    #[test]
    fn short_messages_are_not_split() {
        assert_eq!(split_message("hello", 4000), vec!["hello".to_string()]);
    }

    #[test]
    fn long_messages_split_on_whitespace_boundaries() {
        let text = "word ".repeat(100);
        let chunks = split_message(text.trim_end(), 32);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.len() <= 32));
        assert_eq!(chunks.concat(), text.trim_end());
    }

    #[test]
    fn split_respects_utf8_boundaries() {
        let text = "é".repeat(30);
        let chunks = split_message(&text, 7);
        assert_eq!(chunks.concat(), text);
    }
}
