//! Error types for the chatbot core.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for chatbot operations.
pub type ChatResult<T> = Result<T, ChatError>;

/// Errors raised while loading artifacts or producing a response.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Reading an artifact from disk failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Tokenizer or config JSON could not be parsed.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Weight file is malformed.
    #[error("malformed artifact {path}: {message}")]
    Artifact { path: PathBuf, message: String },

    /// A tensor does not have the shape its layer expects.
    #[error("shape mismatch for {tensor}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        tensor: String,
        expected: (usize, usize),
        got: (usize, usize),
    },

    /// Vocabulary ids address rows the weights do not have.
    #[error("vocabulary uses id {max_id} but the model only has {vocab_size} output rows")]
    VocabularyMismatch { max_id: usize, vocab_size: usize },

    /// A sentinel token has an id outside the model's output rows.
    #[error("`{token}` has id {id} but the model only has {vocab_size} output rows")]
    ReservedTokenOutOfRange {
        token: String,
        id: usize,
        vocab_size: usize,
    },

    /// The tokenizer lacks a sentinel the decode loop relies on.
    #[error("tokenizer has no `{0}` token")]
    MissingReservedToken(String),

    /// No model variant is registered under this name.
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// Model decode requested before any model was selected.
    #[error("no model loaded - call select_model() first")]
    NoModelLoaded,

    /// Temperature outside (0, 1].
    #[error("temperature must be in (0, 1], got {0}")]
    InvalidTemperature(f64),

    /// Nothing to respond to.
    #[error("input text is empty")]
    EmptyInput,

    /// Every redraw in a step was rejected.
    #[error("decode stalled after {attempts} rejected draws")]
    DecodeStalled { attempts: usize },

    /// The caller cancelled the decode between steps.
    #[error("decode cancelled")]
    Cancelled,

    /// The distribution cannot be sampled from.
    #[error("sampling failed: {0}")]
    Sampling(String),

    /// Invalid configuration value or rule pattern.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ChatError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn artifact(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Artifact {
            path: path.into(),
            message: message.into(),
        }
    }
}
