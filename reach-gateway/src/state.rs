use std::sync::Arc;

use anyhow::Context;
use reach_rules::{RuleGroup, TranslationMode};
use reach_synth::{
    GeminiClient, MessageComposer, RetryPolicy, RuleSynthesizer, SingleFlight, SynthesisError,
    TextGenerator,
};
use tracing::{info, warn};

use crate::config::GatewayConfig;
use crate::rate_limit::RateLimitState;
use crate::sessions::SessionRegistry;
use crate::store::{CrmStore, MemoryStore, PostgresStore, StoreAudience};

/// Generative features, present only when a generator is configured.
#[derive(Clone)]
pub struct AiServices {
    pub synthesizer: RuleSynthesizer,
    pub composer: MessageComposer,
    pub flight: Arc<SingleFlight<RuleGroup, SynthesisError>>,
}

impl AiServices {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            synthesizer: RuleSynthesizer::new(Arc::clone(&generator)),
            composer: MessageComposer::new(generator),
            flight: Arc::new(SingleFlight::new()),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.synthesizer = self.synthesizer.with_retry(retry);
        self.composer = self.composer.with_retry(retry);
        self
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CrmStore>,
    pub sample_size: usize,
    pub translation_mode: TranslationMode,
    pub ai: Option<AiServices>,
    pub ai_rate_limit: Arc<RateLimitState>,
    pub sessions: SessionRegistry,
}

impl AppState {
    pub fn new(store: Arc<dyn CrmStore>, config: &GatewayConfig) -> Self {
        let estimator = StoreAudience::new(Arc::clone(&store), config.sample_size);
        Self {
            sessions: SessionRegistry::new(Arc::new(estimator), config.translation_mode),
            store,
            sample_size: config.sample_size,
            translation_mode: config.translation_mode,
            ai: None,
            ai_rate_limit: Arc::new(RateLimitState::per_minute(config.ai_rate_limit_per_minute)),
        }
    }

    pub fn with_ai(mut self, ai: AiServices) -> Self {
        self.ai = Some(ai);
        self
    }

    /// Connects the configured store and generator.
    pub async fn from_config(config: &GatewayConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn CrmStore> = match config.database_url.as_deref() {
            Some(url) => Arc::new(
                PostgresStore::connect(url)
                    .await
                    .context("failed to connect to postgres")?,
            ),
            None if config.seed_demo => {
                warn!("DATABASE_URL not set, using the in-memory store with demo data");
                Arc::new(MemoryStore::demo())
            }
            None => {
                warn!("DATABASE_URL not set, using an empty in-memory store");
                Arc::new(MemoryStore::new())
            }
        };

        let mut state = Self::new(store, config);
        match &config.gemini {
            Some(gemini) => {
                let client = GeminiClient::new(gemini.client_config())
                    .context("failed to build the generative model client")?;
                info!(endpoint = %client.endpoint(), "AI routes enabled");
                state = state.with_ai(AiServices::new(Arc::new(client)));
            }
            None => warn!("GEMINI_API_KEY not set, AI routes will answer 503"),
        }
        Ok(state)
    }
}
