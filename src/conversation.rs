//! Conversation data model plus the aggregation, windowing and
//! redaction transforms applied to it.

use anyhow::{Context, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::history::HistoryStore;
use crate::observe::Observer;
use crate::platform::ChatPlatform;

/// Placeholder text substituted for image blocks on the cost-efficient
/// tier.
pub const IMAGE_REDACTED: &str = "image redacted";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSource {
    #[serde(rename = "type")]
    pub source_type: String,
    pub media_type: String,
    pub data: String,
}

impl ImageSource {
    pub fn base64_jpeg(data: String) -> Self {
        Self {
            source_type: "base64".to_string(),
            media_type: "image/jpeg".to_string(),
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
    Image { source: ImageSource },
}

/// Turn content is either a bare string or a block sequence; both
/// forms appear on the wire and in storage, so serde must round-trip
/// both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TurnContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// One message within a conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: TurnContent,
}

impl ConversationTurn {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: TurnContent::Text(text.into()),
        }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: TurnContent::Text(text.into()),
        }
    }
}

/// One size variant of a Telegram photo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoVariant {
    pub file_id: String,
    pub width: u32,
    pub height: u32,
}

/// Pick the variant to download (largest area wins) and return it
/// together with the remaining variants. Never mutates the input.
pub fn select_photo_variant(
    variants: &[PhotoVariant],
) -> Option<(PhotoVariant, Vec<PhotoVariant>)> {
    let (index, chosen) = variants
        .iter()
        .enumerate()
        .max_by_key(|(_, v)| u64::from(v.width) * u64::from(v.height))?;
    let remainder = variants
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != index)
        .map(|(_, v)| v.clone())
        .collect();
    Some((chosen.clone(), remainder))
}

/// Keep the most recent `max_turns` turns, order preserved. Idempotent:
/// limiting an already-limited sequence returns it unchanged.
pub fn limit_turns(turns: Vec<ConversationTurn>, max_turns: usize) -> Vec<ConversationTurn> {
    if turns.len() <= max_turns {
        return turns;
    }
    let skip = turns.len() - max_turns;
    turns.into_iter().skip(skip).collect()
}

/// Deep copy with every image block replaced by a text placeholder.
/// Turn count, order and roles are untouched; the input is not.
pub fn redact_images(turns: &[ConversationTurn]) -> Vec<ConversationTurn> {
    turns
        .iter()
        .map(|turn| ConversationTurn {
            role: turn.role,
            content: match &turn.content {
                TurnContent::Text(text) => TurnContent::Text(text.clone()),
                TurnContent::Blocks(blocks) => TurnContent::Blocks(
                    blocks
                        .iter()
                        .map(|block| match block {
                            ContentBlock::Image { .. } => ContentBlock::Text {
                                text: IMAGE_REDACTED.to_string(),
                            },
                            block => block.clone(),
                        })
                        .collect(),
                ),
            },
        })
        .collect()
}

/// Merge the classified content with stored history into a new user
/// turn: load the chat's history, download and encode the photo when
/// one is attached, and append exactly one turn. All-or-nothing: a
/// failed image fetch leaves nothing recorded.
///
/// An image turn carries one image block plus an optional trailing
/// text block, in that order. Never calls the inference service.
pub async fn aggregate_turn(
    history: &dyn HistoryStore,
    platform: &dyn ChatPlatform,
    observer: &dyn Observer,
    chat_id: i64,
    forward_text: Option<&str>,
    photo: Option<&[PhotoVariant]>,
    suffix: &str,
) -> Result<Vec<ConversationTurn>> {
    let mut turns = history.load(chat_id).await?;

    if let Some(variants) = photo {
        let (chosen, _remainder) =
            select_photo_variant(variants).context("photo message carried no size variants")?;
        let bytes = platform.fetch_file_image(&chosen).await?;
        observer.image_fetched(chat_id, bytes.len());
        let data = base64::engine::general_purpose::STANDARD.encode(&bytes);

        let mut blocks = vec![ContentBlock::Image {
            source: ImageSource::base64_jpeg(data),
        }];
        if let Some(text) = forward_text {
            blocks.push(ContentBlock::Text {
                text: format!("{text}{suffix}"),
            });
        }
        turns.push(ConversationTurn {
            role: Role::User,
            content: TurnContent::Blocks(blocks),
        });
    } else if let Some(text) = forward_text {
        turns.push(ConversationTurn::user_text(format!("{text}{suffix}")));
    } else {
        // Contentless updates are filtered out at the platform boundary
        // and dropped by the router; this is a last-resort guard.
        anyhow::bail!("nothing to aggregate: neither text nor photo");
    }

    Ok(turns)
}
