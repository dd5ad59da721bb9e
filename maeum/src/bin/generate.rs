//! One-shot reply generation.
//!
//! Prints the reply to a single message and exits; handy for scripting and
//! for checking a model directory.

use std::path::PathBuf;

use clap::Parser;
use maeum::{AppConfig, ChatResult, Chatbot, ReplySource};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Message to answer
    text: String,

    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the tokenizer and weight files
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Model variant
    #[arg(long, default_value = "basic")]
    model: String,

    /// Sampling temperature in (0, 1]
    #[arg(long)]
    temperature: Option<f64>,

    /// Fixed RNG seed for reproducible output
    #[arg(long)]
    seed: Option<u64>,
}

/// Application for generating a single reply.
pub struct GenerateApp {
    bot: Chatbot,
}

impl GenerateApp {
    pub fn new(bot: Chatbot) -> Self {
        Self { bot }
    }

    /// Answer `text`, loading `model` only when the rules do not match.
    pub fn generate(&self, text: &str, model: &str, temperature: f64) -> ChatResult<String> {
        if self.bot.rules().classify(text).is_none() {
            self.bot.select_model(model)?;
        }
        let reply = self.bot.respond(text, temperature)?;
        if let ReplySource::Model { variant, tokens, rejected } = reply.source {
            tracing::info!(%variant, tokens, rejected, "generated");
        }
        Ok(reply.text)
    }
}

fn main() -> ChatResult<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    if let Some(dir) = args.model_dir {
        config.models.model_dir = dir;
    }
    if args.seed.is_some() {
        config.chat.seed = args.seed;
    }
    let temperature = args.temperature.unwrap_or(config.chat.default_temperature);

    let app = GenerateApp::new(Chatbot::new(config)?);
    let out = app.generate(&args.text, &args.model, temperature)?;
    println!("{out}");
    Ok(())
}
