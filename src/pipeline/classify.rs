//! Classification: turn extracted text into a JSON object of labels.
//!
//! The conversation is the caller's instructions (plus a JSON-only
//! directive) as the system message and the document text as the user
//! message. A reply that does not parse as a JSON object triggers a repair
//! round: the invalid reply is quoted back in a new user message asking for
//! the object alone. At most `1 + max_json_retries` completions are made
//! per document, not counting transport retries inside
//! [`ResilientChatClient`].

use crate::error::DocumentError;
use crate::output::{ClassificationLabels, TokenUsage};
use crate::pipeline::llm::{ChatTurn, ResilientChatClient, ServiceUnavailable};
use crate::prompts::{repair_prompt, system_prompt};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// Longest reply excerpt written to the log.
const LOG_PREVIEW_CHARS: usize = 200;

/// Labels for one document and what it cost to get them.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub labels: ClassificationLabels,
    pub usage: TokenUsage,
    /// Completions made, including repair rounds.
    pub attempts: u32,
}

/// Why a document could not be classified.
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// The service never answered. Usage already spent on earlier repair
    /// rounds is discarded: an outage reports zero tokens.
    #[error("{0}")]
    Unavailable(ServiceUnavailable),

    /// Every reply was unparsable. Carries the tokens spent on all of them.
    #[error("no valid JSON object after {attempts} attempts")]
    Unparsable { attempts: u32, usage: TokenUsage },
}

impl ClassifyError {
    pub fn usage(&self) -> TokenUsage {
        match self {
            ClassifyError::Unavailable(_) => TokenUsage::default(),
            ClassifyError::Unparsable { usage, .. } => *usage,
        }
    }
}

impl From<ClassifyError> for DocumentError {
    fn from(e: ClassifyError) -> Self {
        match e {
            ClassifyError::Unavailable(source) => DocumentError::ServiceUnavailable {
                attempts: source.attempts,
                detail: source.last_error.to_string(),
            },
            ClassifyError::Unparsable { attempts, .. } => DocumentError::UnparsableOutput { attempts },
        }
    }
}

/// Drives the classification conversation for each document.
pub struct ClassificationEngine {
    client: ResilientChatClient,
    system_prompt: String,
    max_json_retries: u32,
}

impl ClassificationEngine {
    pub fn new(client: ResilientChatClient, instructions: &str, max_json_retries: u32) -> Self {
        Self {
            client,
            system_prompt: system_prompt(instructions),
            max_json_retries,
        }
    }

    /// Classify `text`. Empty text is sent as-is.
    pub async fn classify(&self, text: &str) -> Result<Classification, ClassifyError> {
        let max_calls = 1 + self.max_json_retries;
        let mut messages = vec![ChatTurn::system(self.system_prompt.clone()), ChatTurn::user(text)];
        let mut usage = TokenUsage::default();

        for call in 1..=max_calls {
            let reply = self
                .client
                .chat(&messages)
                .await
                .map_err(ClassifyError::Unavailable)?;
            usage += reply.usage;

            if let Some(labels) = parse_labels(&reply.content) {
                debug!("Classified after {} call(s): {} label(s)", call, labels.len());
                return Ok(Classification {
                    labels,
                    usage,
                    attempts: call,
                });
            }

            warn!(
                "Reply {}/{} is not a JSON object: {}",
                call,
                max_calls,
                preview(&reply.content)
            );
            if call < max_calls {
                messages.push(ChatTurn::user(repair_prompt(&reply.content)));
            }
        }

        Err(ClassifyError::Unparsable {
            attempts: max_calls,
            usage,
        })
    }
}

/// Parse a model reply into labels.
///
/// Tries the whole reply first, then the span from the first `{` to the
/// last `}` (which also strips Markdown fences and chatty preambles). Only
/// a JSON object is accepted.
pub fn parse_labels(raw: &str) -> Option<ClassificationLabels> {
    let trimmed = raw.trim();
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
        return Some(map);
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&trimmed[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn preview(s: &str) -> String {
    let mut out: String = s.chars().take(LOG_PREVIEW_CHARS).collect();
    if s.chars().count() > LOG_PREVIEW_CHARS {
        out.push('…');
    }
    out.replace('\n', " ")
}
