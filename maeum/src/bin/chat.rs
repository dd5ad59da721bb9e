//! Interactive terminal chat.
//!
//! Stands in for the desktop window: `!model` plays the role of the model
//! picker and `!temp` the temperature slider.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::Parser;
use maeum::{AppConfig, ChatError, ChatResult, Chatbot, ReplySource};
use tracing::{debug, warn};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON config file; defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the tokenizer and weight files
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Model to load at start-up
    #[arg(long, default_value = "basic")]
    model: String,

    /// Sampling temperature in [0.1, 1.0]
    #[arg(long)]
    temperature: Option<f64>,
}

/// Slider bounds of the desktop UI.
const MIN_TEMPERATURE: f64 = 0.1;
const MAX_TEMPERATURE: f64 = 1.0;

/// Application for interactive conversation.
pub struct ChatApp {
    bot: Chatbot,
    temperature: f64,
}

impl ChatApp {
    pub fn new(bot: Chatbot, temperature: f64) -> Self {
        Self { bot, temperature }
    }

    fn handle_command(&mut self, line: &str) -> bool {
        let (cmd, arg) = line.split_once(' ').unwrap_or((line, ""));
        let arg = arg.trim();
        match cmd {
            "!model" => match self.bot.select_model(arg) {
                Ok(variant) => println!("모델 선택: {} ({})", variant.label(), variant),
                Err(e) => println!("모델을 불러오지 못했습니다: {e}"),
            },
            "!models" => {
                for variant in self.bot.registry().variants() {
                    println!("  {} ({})", variant.label(), variant);
                }
            }
            "!temp" => match arg.parse::<f64>() {
                Ok(t) if (MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&t) => {
                    self.temperature = t;
                    println!("Temperature: {t:.2}");
                }
                _ => println!("temperature must be between {MIN_TEMPERATURE:.2} and {MAX_TEMPERATURE:.2}"),
            },
            "!stats" => self.show_stats(),
            _ => return false,
        }
        true
    }

    fn show_stats(&self) {
        println!("Temperature: {:.2}", self.temperature);
        match self.bot.active_model() {
            Some(bundle) => {
                let args = &bundle.model().args;
                println!(
                    "Model: {} - {} words, vocab {}, embed {}, hidden {}",
                    bundle.variant().label(),
                    bundle.vocab().len(),
                    args.vocab_size,
                    args.embed_dim,
                    args.hidden_dim
                );
            }
            None => println!("Model: (none loaded)"),
        }
    }

    /// Run the interactive chat loop.
    pub fn run(&mut self) -> io::Result<()> {
        println!("마음 chatbot");
        println!("Commands: 'quit' to exit, '!model <name>', '!models', '!temp <0.1-1.0>', '!stats'");
        println!();

        let stdin = io::stdin();
        let mut lines = stdin.lock().lines();
        loop {
            print!("You: ");
            io::stdout().flush()?;

            let Some(line) = lines.next() else { break };
            let line = line?;
            let input = line.trim();
            if input.is_empty() {
                continue;
            }
            if input.eq_ignore_ascii_case("quit") {
                println!("Goodbye!");
                break;
            }
            if input.starts_with('!') && self.handle_command(input) {
                continue;
            }

            match self.bot.respond(input, self.temperature) {
                Ok(reply) => {
                    if let ReplySource::Model { variant, rejected, .. } = reply.source {
                        debug!(%variant, rejected, "model reply");
                    }
                    println!("마음이: {}", reply.text);
                }
                Err(ChatError::NoModelLoaded) => {
                    println!("마음이: (모델이 없습니다. '!model basic' 으로 불러오세요)")
                }
                Err(e) => println!("마음이: (오류: {e})"),
            }
            println!();
        }
        Ok(())
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
    let temperature = args
        .temperature
        .unwrap_or(config.chat.default_temperature)
        .clamp(MIN_TEMPERATURE, MAX_TEMPERATURE);

    let bot = Chatbot::new(config)?;
    // Rules still answer when the model cannot be loaded.
    match bot.select_model(&args.model) {
        Ok(variant) => println!("모델 선택: {}", variant.label()),
        Err(e) => warn!(model = %args.model, error = %e, "starting without a model"),
    }

    let mut app = ChatApp::new(bot, temperature);
    app.run().map_err(|e| ChatError::Io {
        path: PathBuf::from("<stdin>"),
        source: e,
    })
}
