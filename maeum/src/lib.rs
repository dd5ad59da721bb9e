//! Core of the "마음" chatbot: a rule layer for small talk in front of a
//! GRU sequence-to-sequence model sampled with temperature.
//!
//! The presentation layer only needs [`Chatbot::generate_response`] and
//! [`Chatbot::select_model`]; the binaries and the `maeum-ffi` crate are thin
//! wrappers around those two calls.

pub mod artifact;
pub mod config;
pub mod decode;
pub mod error;
pub mod model;
pub mod registry;
pub mod rules;
pub mod sampler;
pub mod session;
pub mod vocab;

pub use config::{AppConfig, ChatConfig, RegistryConfig, Truncation};
pub use decode::CancelToken;
pub use error::{ChatError, ChatResult};
pub use registry::{ModelBundle, ModelRegistry, ModelVariant};
pub use rules::{Intent, RuleMatcher};
pub use session::{Chatbot, Reply, ReplySource};
