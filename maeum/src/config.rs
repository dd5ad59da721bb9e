//! Runtime configuration for the decode loop and the model registry.
//!
//! Everything has a `Default` matching the shipped models, so a config file
//! only needs to name the values it changes.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ChatError, ChatResult};
use crate::registry::ModelVariant;

/// Which end of an over-long input is dropped when it is cut to
/// `max_input_len` tokens.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Truncation {
    /// Drop leading tokens, keep the end of the input.
    #[default]
    Leading,
    /// Drop trailing tokens, keep the start of the input.
    Trailing,
}

/// Limits and defaults for one response generation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Encoder input length; shorter inputs are padded.
    pub max_input_len: usize,
    /// Decode stops once this many words have been emitted.
    pub max_output_words: usize,
    /// Number of recently accepted tokens that may not be drawn again.
    pub history_window: usize,
    /// Rejected draws allowed per step before the decode is declared stalled.
    pub max_resample_attempts: usize,
    /// Temperature used when the caller does not pick one.
    pub default_temperature: f64,
    pub truncation: Truncation,
    /// Fixed RNG seed; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_input_len: 40,
            max_output_words: 58,
            history_window: 3,
            max_resample_attempts: 1000,
            default_temperature: 0.7,
            truncation: Truncation::Leading,
            seed: None,
        }
    }
}

impl ChatConfig {
    /// Reject values the decode loop cannot run with.
    pub fn validate(&self) -> ChatResult<()> {
        if self.max_input_len == 0 {
            return Err(ChatError::Config("max_input_len must be positive".into()));
        }
        if self.max_resample_attempts == 0 {
            return Err(ChatError::Config(
                "max_resample_attempts must be positive".into(),
            ));
        }
        if !(self.default_temperature > 0.0 && self.default_temperature <= 1.0) {
            return Err(ChatError::InvalidTemperature(self.default_temperature));
        }
        Ok(())
    }
}

/// Weight file for one model variant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VariantFile {
    pub variant: ModelVariant,
    pub weights: PathBuf,
}

/// Where the model artifacts live.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Directory the relative paths below are resolved against.
    pub model_dir: PathBuf,
    /// Tokenizer shared by all variants.
    pub tokenizer: PathBuf,
    pub variants: Vec<VariantFile>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            tokenizer: PathBuf::from("tokenizer.json"),
            variants: vec![
                VariantFile {
                    variant: ModelVariant::Basic,
                    weights: PathBuf::from("seq2seq_model_90000.bin"),
                },
                VariantFile {
                    variant: ModelVariant::Advanced,
                    weights: PathBuf::from("seq2seq_model_98000.bin"),
                },
                VariantFile {
                    variant: ModelVariant::Fast,
                    weights: PathBuf::from("seq2seq_model_50000.bin"),
                },
            ],
        }
    }
}

impl RegistryConfig {
    /// Default layout rooted at `model_dir`.
    pub fn in_dir(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
            ..Self::default()
        }
    }
}

/// Top-level config file: `{"chat": {...}, "models": {...}}`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub chat: ChatConfig,
    pub models: RegistryConfig,
}

impl AppConfig {
    /// Load a JSON config file. Missing keys fall back to defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> ChatResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ChatError::io(path, e))?;
        let config: Self = serde_json::from_str(&text)?;
        config.chat.validate()?;
        Ok(config)
    }
}
