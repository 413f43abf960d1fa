use std::sync::Arc;

use tracing::{debug, info};

use crate::client::TextGenerator;
use crate::error::SynthesisError;
use crate::prompt::{message_prompt, MessageRequest};
use crate::retry::RetryPolicy;

/// Placeholder replaced with each customer's name at send time.
pub const NAME_PLACEHOLDER: &str = "{name}";

/// Suggests campaign message templates.
#[derive(Clone)]
pub struct MessageComposer {
    generator: Arc<dyn TextGenerator>,
    retry: RetryPolicy,
}

impl MessageComposer {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn compose(&self, request: &MessageRequest) -> Result<String, SynthesisError> {
        if request.objective.trim().is_empty() {
            return Err(SynthesisError::InvalidInput("Objective is required".into()));
        }

        let prompt = message_prompt(request);
        let raw = self
            .retry
            .run(|| self.generator.generate(&prompt))
            .await?;
        let message = raw.trim().to_string();
        if message.is_empty() {
            return Err(SynthesisError::Structure("generator returned an empty message".into()));
        }

        debug!(
            personalized = message.contains(NAME_PLACEHOLDER),
            "message suggestion generated"
        );
        info!(chars = message.chars().count(), "composed campaign message");
        Ok(message)
    }
}
