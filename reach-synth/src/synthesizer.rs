use std::sync::Arc;

use reach_rules::{RuleGroup, SynthesisSchema};
use tracing::{debug, info, warn};

use crate::client::TextGenerator;
use crate::error::SynthesisError;
use crate::extract::parse_generated_json;
use crate::prompt::rules_prompt;
use crate::retry::RetryPolicy;

/// Longest description accepted, in characters.
pub const MAX_DESCRIPTION_CHARS: usize = 2000;

/// Parses and validates raw generator output as a rule group.
pub fn parse_rules_response(raw: &str) -> Result<RuleGroup, SynthesisError> {
    let value = parse_generated_json(raw).map_err(|err| {
        warn!(error = %err, raw = %raw, "generator output is not JSON");
        err
    })?;
    SynthesisSchema.validate_value(&value).map_err(|violations| {
        warn!(
            paths = ?violations.paths(),
            %violations,
            "generator output failed schema validation"
        );
        SynthesisError::InvalidStructure(violations)
    })
}

/// Turns a natural-language audience description into a rule group.
#[derive(Clone)]
pub struct RuleSynthesizer {
    generator: Arc<dyn TextGenerator>,
    retry: RetryPolicy,
}

impl RuleSynthesizer {
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

    pub async fn synthesize(&self, description: &str) -> Result<RuleGroup, SynthesisError> {
        let description = validate_description(description)?;
        info!(chars = description.chars().count(), "synthesizing rules");

        let prompt = rules_prompt(description);
        let raw = self
            .retry
            .run(|| self.generator.generate(&prompt))
            .await?;
        debug!(raw = %raw, "generator returned rules");

        let tree = parse_rules_response(&raw)?;
        info!(
            conditions = tree.condition_count(),
            combinator = %tree.combinator,
            "rules synthesized"
        );
        Ok(tree)
    }
}

fn validate_description(description: &str) -> Result<&str, SynthesisError> {
    let trimmed = description.trim();
    if trimmed.is_empty() {
        return Err(SynthesisError::InvalidInput(
            "Description is required and must be a string".into(),
        ));
    }
    if trimmed.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(SynthesisError::InvalidInput(format!(
            "Description must be at most {MAX_DESCRIPTION_CHARS} characters"
        )));
    }
    Ok(trimmed)
}
