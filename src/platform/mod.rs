pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;

use crate::conversation::PhotoVariant;

/// Chat-platform side effects the handler depends on.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Download one photo variant and return its raw bytes.
    async fn fetch_file_image(&self, photo: &PhotoVariant) -> Result<Vec<u8>>;
    /// Deliver the final reply text to a chat.
    async fn deliver_reply(&self, chat_id: i64, text: &str) -> Result<()>;
}
