use tracing::info;

use crate::llm::Completion;

/// Reports the outcome of each external call. Kept behind a trait so
/// usage reporting never gets inlined into the pipeline's decision
/// logic.
pub trait Observer: Send + Sync {
    fn image_fetched(&self, chat_id: i64, bytes: usize);
    fn completion_finished(&self, chat_id: i64, completion: &Completion);
    fn history_saved(&self, chat_id: i64, turns: usize);
}

/// Default observer backed by `tracing`.
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn image_fetched(&self, chat_id: i64, bytes: usize) {
        info!(chat_id, bytes, "image downloaded");
    }

    fn completion_finished(&self, chat_id: i64, completion: &Completion) {
        info!(
            chat_id,
            input_tokens = completion.usage.as_ref().map(|u| u.input_tokens),
            output_tokens = completion.usage.as_ref().map(|u| u.output_tokens),
            stop_reason = completion.stop_reason.as_deref(),
            "completion finished"
        );
    }

    fn history_saved(&self, chat_id: i64, turns: usize) {
        info!(chat_id, turns, "history saved");
    }
}
