//! Classification of incoming messages: decides whether the bot must
//! reply and what content is forwarded to the model.
//!
//! Telegram annotates message text with entities whose offsets and
//! lengths count UTF-16 code units. Everything here is pure; the
//! Telegram platform layer builds the [`IncomingMessage`] and the
//! handler consumes the [`ExtractedContent`].

use crate::conversation::PhotoVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Command,
    Mention,
    Other,
}

/// A platform-annotated span within message text.
/// `offset` and `length` are in UTF-16 code units.
#[derive(Debug, Clone)]
pub struct Entity {
    pub kind: EntityKind,
    pub offset: usize,
    pub length: usize,
}

/// Platform-agnostic view of one received message.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub chat_id: i64,
    pub chat_kind: ChatKind,
    pub first_name: String,
    pub last_name: Option<String>,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub photo: Option<Vec<PhotoVariant>>,
    pub entities: Vec<Entity>,
    pub caption_entities: Vec<Entity>,
    /// Set on the "group created" service message.
    pub group_chat_created: bool,
}

/// The closed set of textual commands the bot understands.
/// Produced once by the classifier; everything downstream switches on
/// the tag, never on raw string prefixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    Start,
    Help,
    Chat,
    Unsupported(String),
}

impl BotCommand {
    /// Parse a raw command substring such as `/chat `, `/start@relaybot`.
    fn parse(raw: &str) -> Self {
        let token = raw.trim();
        let token = token.split('@').next().unwrap_or(token);
        match token {
            "/start" => BotCommand::Start,
            "/help" => BotCommand::Help,
            "/chat" => BotCommand::Chat,
            other => BotCommand::Unsupported(other.to_string()),
        }
    }
}

/// What the classifier decided about one message. Immutable.
#[derive(Debug, Clone)]
pub struct ExtractedContent {
    pub command: Option<BotCommand>,
    pub forward_text: Option<String>,
    pub photo: Option<Vec<PhotoVariant>>,
    pub should_reply: bool,
}

/// Sender display name: first name, plus last name when present.
pub fn display_name(message: &IncomingMessage) -> String {
    match &message.last_name {
        Some(last) => format!("{} {}", message.first_name, last),
        None => message.first_name.clone(),
    }
}

/// Turn a raw incoming message into a normalized extraction.
///
/// Only the head entity is consulted. A malformed entity span (offset
/// or length outside the text, or splitting a surrogate pair) is never
/// fatal: classification falls back to forwarding the whole text the
/// way an entity-free message of the same chat kind would be handled.
pub fn classify(message: &IncomingMessage, bot_id: &str) -> ExtractedContent {
    let name = display_name(message);

    // A photo moves the text into the caption, entities included.
    let (text, entities) = if message.photo.is_some() {
        (message.caption.as_deref(), &message.caption_entities)
    } else {
        (message.text.as_deref(), &message.entities)
    };

    if let (Some(text), Some(entity)) = (text, entities.first()) {
        if let Some(extracted) = classify_entity(message, entity, text, &name, bot_id) {
            return extracted;
        }
    }

    match message.chat_kind {
        ChatKind::Private => ExtractedContent {
            command: None,
            forward_text: text.map(str::to_string),
            photo: message.photo.clone(),
            should_reply: true,
        },
        // Without an entity a plain group message is dropped entirely:
        // no forward text means no turn is ever appended.
        ChatKind::Group => ExtractedContent {
            command: None,
            forward_text: None,
            photo: None,
            should_reply: false,
        },
        // Recorded for context continuity, but not answered.
        ChatKind::Supergroup => ExtractedContent {
            command: None,
            forward_text: text.map(|t| format!("{name}: {t}")),
            photo: message.photo.clone(),
            should_reply: false,
        },
    }
}

/// Classify based on the head entity. Returns `None` when the entity
/// is of no interest or its span is malformed, letting the caller fall
/// through to the chat-kind dispatch.
fn classify_entity(
    message: &IncomingMessage,
    entity: &Entity,
    text: &str,
    name: &str,
    bot_id: &str,
) -> Option<ExtractedContent> {
    match entity.kind {
        EntityKind::Command => {
            let split = command_split(text, entity.length)?;
            let (raw, rest) = text.split_at(split);
            Some(ExtractedContent {
                command: Some(BotCommand::parse(raw)),
                forward_text: Some(format!("{name}: {rest}")),
                photo: message.photo.clone(),
                should_reply: true,
            })
        }
        EntityKind::Mention => {
            let (mention, stripped) = mention_span(text, entity.offset, entity.length)?;
            let identity = mention.strip_prefix('@').unwrap_or(mention);
            if identity == bot_id {
                Some(ExtractedContent {
                    command: None,
                    forward_text: Some(format!("{name}: {stripped}")),
                    photo: message.photo.clone(),
                    should_reply: true,
                })
            } else {
                // Someone else was mentioned: keep the message for
                // context, full text unchanged, but stay quiet.
                Some(ExtractedContent {
                    command: None,
                    forward_text: Some(format!("{name}: {text}")),
                    photo: message.photo.clone(),
                    should_reply: false,
                })
            }
        }
        EntityKind::Other => None,
    }
}

/// Byte index where the command substring ends: the first
/// `length + 1` UTF-16 units (command plus its trailing separator),
/// clamped to the end of the text.
fn command_split(text: &str, length: usize) -> Option<usize> {
    let target = length + 1;
    if target >= utf16_len(text) {
        return Some(text.len());
    }
    utf16_to_byte(text, target)
}

/// Resolve a mention entity: the `[offset, offset + length)` span in
/// UTF-16 units. Returns the mention text and the message with that
/// span removed (seam whitespace collapsed to a single space).
fn mention_span(text: &str, offset: usize, length: usize) -> Option<(&str, String)> {
    let start = utf16_to_byte(text, offset)?;
    let end = utf16_to_byte(text, offset + length)?;
    if start >= end {
        return None;
    }
    Some((&text[start..end], remove_span(text, start, end)))
}

fn remove_span(text: &str, start: usize, end: usize) -> String {
    let prefix = text[..start].trim_end();
    let suffix = text[end..].trim_start();
    if prefix.is_empty() {
        suffix.to_string()
    } else if suffix.is_empty() {
        prefix.to_string()
    } else {
        format!("{prefix} {suffix}")
    }
}

fn utf16_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Convert a UTF-16 code-unit index to a byte index. `None` when the
/// index is out of range or falls inside a surrogate pair.
fn utf16_to_byte(text: &str, target: usize) -> Option<usize> {
    let mut units = 0usize;
    for (i, ch) in text.char_indices() {
        if units == target {
            return Some(i);
        }
        if units > target {
            return None;
        }
        units += ch.len_utf16();
    }
    (units == target).then_some(text.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(chat_kind: ChatKind, text: &str) -> IncomingMessage {
        IncomingMessage {
            chat_id: 42,
            chat_kind,
            first_name: "Ada".to_string(),
            last_name: None,
            text: Some(text.to_string()),
            caption: None,
            photo: None,
            entities: Vec::new(),
            caption_entities: Vec::new(),
            group_chat_created: false,
        }
    }

    fn entity(kind: EntityKind, offset: usize, length: usize) -> Entity {
        Entity {
            kind,
            offset,
            length,
        }
    }

    #[test]
    fn private_text_forwarded_verbatim() {
        let extracted = classify(&message(ChatKind::Private, "Hello"), "relaybot");
        assert!(extracted.should_reply);
        assert_eq!(extracted.forward_text.as_deref(), Some("Hello"));
        assert!(extracted.command.is_none());
    }

    #[test]
    fn display_name_includes_last_name() {
        let mut msg = message(ChatKind::Private, "hi");
        msg.last_name = Some("Lovelace".to_string());
        assert_eq!(display_name(&msg), "Ada Lovelace");
    }

    #[test]
    fn command_substring_covers_length_plus_one() {
        let mut msg = message(ChatKind::Group, "/chat tell me a joke");
        msg.entities = vec![entity(EntityKind::Command, 0, 5)];
        let extracted = classify(&msg, "relaybot");
        assert_eq!(extracted.command, Some(BotCommand::Chat));
        // Forward text excludes the command and its trailing space.
        assert_eq!(
            extracted.forward_text.as_deref(),
            Some("Ada: tell me a joke")
        );
        assert!(extracted.should_reply);
    }

    #[test]
    fn bare_command_without_arguments() {
        let mut msg = message(ChatKind::Private, "/start");
        msg.entities = vec![entity(EntityKind::Command, 0, 6)];
        let extracted = classify(&msg, "relaybot");
        assert_eq!(extracted.command, Some(BotCommand::Start));
        assert_eq!(extracted.forward_text.as_deref(), Some("Ada: "));
    }

    #[test]
    fn command_with_bot_suffix_is_recognized() {
        let mut msg = message(ChatKind::Supergroup, "/help@relaybot");
        msg.entities = vec![entity(EntityKind::Command, 0, 14)];
        let extracted = classify(&msg, "relaybot");
        assert_eq!(extracted.command, Some(BotCommand::Help));
    }

    #[test]
    fn unknown_command_keeps_its_token() {
        let mut msg = message(ChatKind::Private, "/frobnicate now");
        msg.entities = vec![entity(EntityKind::Command, 0, 11)];
        let extracted = classify(&msg, "relaybot");
        assert_eq!(
            extracted.command,
            Some(BotCommand::Unsupported("/frobnicate".to_string()))
        );
    }

    #[test]
    fn mention_of_bot_strips_exact_span() {
        let mut msg = message(ChatKind::Supergroup, "@relaybot what time is it");
        msg.entities = vec![entity(EntityKind::Mention, 0, 9)];
        let extracted = classify(&msg, "relaybot");
        assert!(extracted.should_reply);
        assert_eq!(
            extracted.forward_text.as_deref(),
            Some("Ada: what time is it")
        );
    }

    #[test]
    fn mention_mid_text_collapses_seam_whitespace() {
        let mut msg = message(ChatKind::Supergroup, "hey @relaybot are you there");
        msg.entities = vec![entity(EntityKind::Mention, 4, 9)];
        let extracted = classify(&msg, "relaybot");
        assert_eq!(
            extracted.forward_text.as_deref(),
            Some("Ada: hey are you there")
        );
    }

    #[test]
    fn mention_after_multibyte_text_uses_utf16_offsets() {
        // "😀 " is 2 UTF-16 units for the emoji plus 1 for the space.
        let mut msg = message(ChatKind::Supergroup, "😀 @relaybot hi");
        msg.entities = vec![entity(EntityKind::Mention, 3, 9)];
        let extracted = classify(&msg, "relaybot");
        assert!(extracted.should_reply);
        assert_eq!(extracted.forward_text.as_deref(), Some("Ada: 😀 hi"));
    }

    #[test]
    fn mention_of_other_user_is_recorded_not_answered() {
        let mut msg = message(ChatKind::Supergroup, "@alice hello");
        msg.entities = vec![entity(EntityKind::Mention, 0, 6)];
        let extracted = classify(&msg, "relaybot");
        assert!(!extracted.should_reply);
        assert_eq!(extracted.forward_text.as_deref(), Some("Ada: @alice hello"));
    }

    #[test]
    fn malformed_entity_falls_back_to_whole_text() {
        let mut msg = message(ChatKind::Private, "hello");
        msg.entities = vec![entity(EntityKind::Mention, 90, 9)];
        let extracted = classify(&msg, "relaybot");
        assert!(extracted.should_reply);
        assert_eq!(extracted.forward_text.as_deref(), Some("hello"));
    }

    #[test]
    fn group_message_without_entity_is_dropped() {
        let extracted = classify(&message(ChatKind::Group, "chatter"), "relaybot");
        assert!(!extracted.should_reply);
        assert!(extracted.forward_text.is_none());
        assert!(extracted.photo.is_none());
    }

    #[test]
    fn supergroup_message_is_recorded_with_name_prefix() {
        let extracted = classify(&message(ChatKind::Supergroup, "morning all"), "relaybot");
        assert!(!extracted.should_reply);
        assert_eq!(extracted.forward_text.as_deref(), Some("Ada: morning all"));
    }

    #[test]
    fn photo_switches_to_caption_and_caption_entities() {
        let mut msg = message(ChatKind::Private, "ignored");
        msg.caption = Some("/chat describe this".to_string());
        msg.caption_entities = vec![entity(EntityKind::Command, 0, 5)];
        msg.photo = Some(vec![PhotoVariant {
            file_id: "f1".to_string(),
            width: 100,
            height: 100,
        }]);
        let extracted = classify(&msg, "relaybot");
        assert_eq!(extracted.command, Some(BotCommand::Chat));
        assert_eq!(extracted.forward_text.as_deref(), Some("Ada: describe this"));
        assert!(extracted.photo.is_some());
    }

    #[test]
    fn photo_without_caption_in_private_chat() {
        let mut msg = message(ChatKind::Private, "ignored");
        msg.text = None;
        msg.photo = Some(vec![PhotoVariant {
            file_id: "f1".to_string(),
            width: 100,
            height: 100,
        }]);
        let extracted = classify(&msg, "relaybot");
        assert!(extracted.should_reply);
        assert!(extracted.forward_text.is_none());
        assert!(extracted.photo.is_some());
    }

    #[test]
    fn utf16_to_byte_handles_astral_plane() {
        let text = "a😀b";
        assert_eq!(utf16_to_byte(text, 0), Some(0));
        assert_eq!(utf16_to_byte(text, 1), Some(1));
        // Index 2 would split the surrogate pair.
        assert_eq!(utf16_to_byte(text, 2), None);
        assert_eq!(utf16_to_byte(text, 3), Some(5));
        assert_eq!(utf16_to_byte(text, 4), Some(6));
        assert_eq!(utf16_to_byte(text, 5), None);
    }
}
