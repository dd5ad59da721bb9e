//! Named model variants and the bundles they load into.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::artifact;
use crate::config::RegistryConfig;
use crate::error::{ChatError, ChatResult};
use crate::model::Seq2Seq;
use crate::vocab::Vocabulary;

/// Selectable model variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelVariant {
    Basic,
    Advanced,
    Fast,
}

impl ModelVariant {
    pub const ALL: [ModelVariant; 3] = [Self::Basic, Self::Advanced, Self::Fast];

    pub fn name(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Advanced => "advanced",
            Self::Fast => "fast",
        }
    }

    /// Label shown in the model picker.
    pub fn label(self) -> &'static str {
        match self {
            Self::Basic => "기본 모델",
            Self::Advanced => "고급 모델",
            Self::Fast => "빠른 모델",
        }
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelVariant {
    type Err = ChatError;

    /// Accepts the English name or the picker label.
    fn from_str(s: &str) -> ChatResult<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|v| v.name().eq_ignore_ascii_case(s) || v.label() == s)
            .ok_or_else(|| ChatError::UnknownModel(s.to_string()))
    }
}

/// Vocabulary and weights that were trained together.
#[derive(Debug)]
pub struct ModelBundle {
    variant: ModelVariant,
    vocab: Vocabulary,
    model: Seq2Seq,
}

impl ModelBundle {
    /// Pair `vocab` with `model`, refusing ids the model cannot emit.
    pub fn new(variant: ModelVariant, vocab: Vocabulary, model: Seq2Seq) -> ChatResult<Self> {
        let vocab_size = model.args.vocab_size;
        if vocab.max_usable_id() >= vocab_size {
            return Err(ChatError::VocabularyMismatch {
                max_id: vocab.max_usable_id(),
                vocab_size,
            });
        }
        let reserved = [Some(vocab.start_id()), Some(vocab.end_id()), vocab.oov_id()];
        if let Some(id) = reserved.into_iter().flatten().find(|&id| id >= vocab_size) {
            return Err(ChatError::ReservedTokenOutOfRange {
                token: vocab.decode(id).to_string(),
                id,
                vocab_size,
            });
        }
        Ok(Self {
            variant,
            vocab,
            model,
        })
    }

    pub fn variant(&self) -> ModelVariant {
        self.variant
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn model(&self) -> &Seq2Seq {
        &self.model
    }
}

/// Resolves variant names to artifact paths.
#[derive(Clone, Debug)]
pub struct ModelRegistry {
    config: RegistryConfig,
}

impl ModelRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Variants that have a weight file configured.
    pub fn variants(&self) -> impl Iterator<Item = ModelVariant> + '_ {
        self.config.variants.iter().map(|f| f.variant)
    }

    pub fn tokenizer_path(&self) -> PathBuf {
        self.config.model_dir.join(&self.config.tokenizer)
    }

    pub fn weights_path(&self, variant: ModelVariant) -> ChatResult<PathBuf> {
        self.config
            .variants
            .iter()
            .find(|f| f.variant == variant)
            .map(|f| self.config.model_dir.join(&f.weights))
            .ok_or_else(|| ChatError::UnknownModel(variant.name().to_string()))
    }

    /// Load the tokenizer and weights for `name` into a validated bundle.
    pub fn load(&self, name: &str) -> ChatResult<ModelBundle> {
        let variant: ModelVariant = name.parse()?;
        let weights_path = self.weights_path(variant)?;
        let tokenizer_path = self.tokenizer_path();

        let vocab = Vocabulary::load(&tokenizer_path)?;
        let model = artifact::load_weights(&weights_path)?;
        let bundle = ModelBundle::new(variant, vocab, model)?;
        info!(
            variant = %variant,
            weights = %weights_path.display(),
            words = bundle.vocab().len(),
            hidden = bundle.model().args.hidden_dim,
            "loaded model bundle"
        );
        Ok(bundle)
    }
}
