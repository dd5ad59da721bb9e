//! Entry point used by the presentation layer.
//!
//! A [`Chatbot`] first offers the input to the rule layer. Anything the rules
//! do not answer is decoded with the active [`ModelBundle`]. Selecting a
//! model swaps the bundle handle in one step; a decode that already cloned
//! the previous handle finishes with it.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::config::{AppConfig, ChatConfig};
use crate::decode::{decode, CancelToken};
use crate::error::{ChatError, ChatResult};
use crate::registry::{ModelBundle, ModelRegistry, ModelVariant};
use crate::rules::{Intent, RuleMatcher};
use crate::sampler::Temperature;

/// Which path produced a reply.
#[derive(Clone, Debug, PartialEq)]
pub enum ReplySource {
    Rule(Intent),
    Model {
        variant: ModelVariant,
        tokens: usize,
        rejected: usize,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Reply {
    pub text: String,
    pub source: ReplySource,
}

pub struct Chatbot {
    config: ChatConfig,
    registry: ModelRegistry,
    rules: RuleMatcher,
    active: RwLock<Option<Arc<ModelBundle>>>,
    rng: Mutex<StdRng>,
}

impl Chatbot {
    /// Chatbot with no model loaded yet.
    pub fn new(config: AppConfig) -> ChatResult<Self> {
        config.chat.validate()?;
        let rng = match config.chat.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            config: config.chat,
            registry: ModelRegistry::new(config.models),
            rules: RuleMatcher::default(),
            active: RwLock::new(None),
            rng: Mutex::new(rng),
        })
    }

    /// Replace the rule layer.
    pub fn with_rules(mut self, rules: RuleMatcher) -> Self {
        self.rules = rules;
        self
    }

    /// Install an already loaded bundle.
    pub fn with_bundle(self, bundle: ModelBundle) -> Self {
        *self.active.write() = Some(Arc::new(bundle));
        self
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn rules(&self) -> &RuleMatcher {
        &self.rules
    }

    /// Handle to the bundle subsequent decodes will use.
    pub fn active_model(&self) -> Option<Arc<ModelBundle>> {
        self.active.read().clone()
    }

    /// Load `name` and make it the active model. The previous model stays
    /// active if loading fails.
    pub fn select_model(&self, name: &str) -> ChatResult<ModelVariant> {
        let bundle = self.registry.load(name)?;
        let variant = bundle.variant();
        self.install(bundle);
        Ok(variant)
    }

    /// Swap in `bundle`, returning the one it replaced.
    pub fn install(&self, bundle: ModelBundle) -> Option<Arc<ModelBundle>> {
        let variant = bundle.variant();
        let previous = self.active.write().replace(Arc::new(bundle));
        info!(
            variant = %variant,
            previous = ?previous.as_ref().map(|b| b.variant()),
            "active model switched"
        );
        previous
    }

    /// Respond to `text` and return only the reply text.
    pub fn generate_response(&self, text: &str, temperature: f64) -> ChatResult<String> {
        self.respond(text, temperature).map(|reply| reply.text)
    }

    pub fn respond(&self, text: &str, temperature: f64) -> ChatResult<Reply> {
        let mut rng = self.rng.lock();
        self.respond_with(text, temperature, &mut *rng, &CancelToken::new())
    }

    /// Respond with a caller-supplied RNG and cancellation token.
    pub fn respond_with<R: Rng + ?Sized>(
        &self,
        text: &str,
        temperature: f64,
        rng: &mut R,
        cancel: &CancelToken,
    ) -> ChatResult<Reply> {
        let temperature = Temperature::new(temperature)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyInput);
        }

        if let Some((intent, reply)) = self.rules.respond(text, rng) {
            debug!(?intent, "answered by rule");
            return Ok(Reply {
                text: reply.to_string(),
                source: ReplySource::Rule(intent),
            });
        }

        let bundle = self.active_model().ok_or(ChatError::NoModelLoaded)?;
        let decoded = decode(&bundle, &self.config, text, temperature, rng, cancel)?;
        Ok(Reply {
            text: decoded.text,
            source: ReplySource::Model {
                variant: bundle.variant(),
                tokens: decoded.tokens.len(),
                rejected: decoded.rejected,
            },
        })
    }
}
