//! The per-message pipeline: classify, route, aggregate, limit,
//! redact, build the prompt, invoke the model, persist.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::debug;

use crate::classify::{classify, display_name, BotCommand, ExtractedContent, IncomingMessage};
use crate::config::Config;
use crate::conversation::{aggregate_turn, redact_images, ConversationTurn};
use crate::history::HistoryStore;
use crate::llm::{CompletionClient, ResponseTier};
use crate::observe::Observer;
use crate::platform::ChatPlatform;
use crate::prompt::{build_request, build_system_instructions};

pub const HELP_TEXT: &str = "The bot can be interacted with in 3 ways.\n\
    1. In a private chat, every message sent to the bot is answered.\n\
    2. In a group chat, only messages that start with /chat are sent to the bot and answered.\n\
    3. In a supergroup, every message is kept as chat context, but only messages that \
    start with /chat or mention the bot are answered.";

const INTRO_PROMPT: &str = "Present yourself in English";

pub struct HandlerInput {
    pub message: IncomingMessage,
    pub chat_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerReply {
    pub text: String,
    pub send: bool,
}

/// Where one classified message goes. Help and unsupported commands
/// short-circuit without touching any collaborator.
#[derive(Debug)]
enum Route {
    Help,
    Unsupported(String),
    Introduce,
    Respond { tier: ResponseTier, send: bool },
    Drop,
}

fn route(extracted: &ExtractedContent, group_chat_created: bool) -> Route {
    if group_chat_created {
        return Route::Introduce;
    }
    match &extracted.command {
        Some(BotCommand::Start) => Route::Introduce,
        Some(BotCommand::Help) => Route::Help,
        Some(BotCommand::Unsupported(raw)) => Route::Unsupported(raw.clone()),
        Some(BotCommand::Chat) => Route::Respond {
            tier: ResponseTier::Standard,
            send: true,
        },
        None => {
            if extracted.should_reply {
                Route::Respond {
                    tier: ResponseTier::Standard,
                    send: true,
                }
            } else if extracted.forward_text.is_none() && extracted.photo.is_none() {
                Route::Drop
            } else {
                // Recorded and answered into history, but the reply is
                // withheld from the chat.
                Route::Respond {
                    tier: ResponseTier::CostEfficient,
                    send: false,
                }
            }
        }
    }
}

pub struct MessageHandler {
    config: Config,
    platform: Arc<dyn ChatPlatform>,
    llm: Arc<dyn CompletionClient>,
    history: Arc<dyn HistoryStore>,
    observer: Arc<dyn Observer>,
}

impl MessageHandler {
    pub fn new(
        config: Config,
        platform: Arc<dyn ChatPlatform>,
        llm: Arc<dyn CompletionClient>,
        history: Arc<dyn HistoryStore>,
        observer: Arc<dyn Observer>,
    ) -> Self {
        Self {
            config,
            platform,
            llm,
            history,
            observer,
        }
    }

    /// Process one incoming message to a reply decision. Delivery is
    /// the platform layer's job; `send = false` means the reply (if
    /// any) was only recorded into history.
    pub async fn handle(&self, input: HandlerInput) -> Result<HandlerReply> {
        let extracted = classify(&input.message, &self.config.telegram.bot_id);
        debug!(chat_id = input.chat_id, ?extracted, "classified message");

        let (turns, tier, send) = match route(&extracted, input.message.group_chat_created) {
            Route::Help => {
                return Ok(HandlerReply {
                    text: HELP_TEXT.to_string(),
                    send: true,
                })
            }
            Route::Unsupported(command) => {
                return Ok(HandlerReply {
                    text: format!("Unsupported command: {command}"),
                    send: true,
                })
            }
            Route::Drop => {
                return Ok(HandlerReply {
                    text: String::new(),
                    send: false,
                })
            }
            // The introduction replaces whatever history the chat had.
            Route::Introduce => (
                vec![ConversationTurn::user_text(INTRO_PROMPT)],
                ResponseTier::CostEfficient,
                true,
            ),
            Route::Respond { tier, send } => {
                let turns = aggregate_turn(
                    self.history.as_ref(),
                    self.platform.as_ref(),
                    self.observer.as_ref(),
                    input.chat_id,
                    extracted.forward_text.as_deref(),
                    extracted.photo.as_deref(),
                    &self.config.chat.message_suffix,
                )
                .await?;
                (turns, tier, send)
            }
        };

        let limited = self.history.limit(turns.clone());
        let prompt_turns = match tier {
            ResponseTier::CostEfficient => redact_images(&limited),
            ResponseTier::Standard => limited,
        };

        let system = build_system_instructions(
            &self.config.llm.system_prompt,
            &display_name(&input.message),
            Utc::now(),
        );
        let max_tokens = match tier {
            ResponseTier::Standard => self.config.llm.standard.max_tokens,
            ResponseTier::CostEfficient => self.config.llm.cost_efficient.max_tokens,
        };
        let request = build_request(system, prompt_turns, max_tokens);

        let completion = self.llm.invoke(tier, &request).await?;
        self.observer
            .completion_finished(input.chat_id, &completion);

        // Persist exactly: loaded history + user turn + assistant turn.
        // Redaction above worked on a copy, so images survive here.
        let mut persisted = turns;
        persisted.push(ConversationTurn::assistant_text(completion.text.clone()));
        self.history.save(input.chat_id, &persisted).await?;
        self.observer.history_saved(input.chat_id, persisted.len());

        Ok(HandlerReply {
            text: completion.text,
            send,
        })
    }
}
