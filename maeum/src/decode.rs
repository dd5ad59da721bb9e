//! Autoregressive decode over one model bundle.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ndarray::Array1;
use rand::Rng;
use tracing::{debug, warn};

use crate::config::ChatConfig;
use crate::error::{ChatError, ChatResult};
use crate::registry::ModelBundle;
use crate::sampler::{Sampler, Temperature};

/// Cooperative cancellation flag, checked before every decoder step.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Finished decode.
#[derive(Clone, Debug, PartialEq)]
pub struct Decoded {
    pub text: String,
    /// Accepted token ids in order, end token included when it was drawn.
    pub tokens: Vec<usize>,
    /// Draws thrown away for being empty or recently used.
    pub rejected: usize,
}

/// State of one response generation.
pub struct DecodeSession<'a> {
    bundle: &'a ModelBundle,
    config: &'a ChatConfig,
    temperature: Temperature,
    hidden: Array1<f32>,
    last_token: usize,
    words: Vec<String>,
    tokens: Vec<usize>,
    recent: VecDeque<usize>,
    rejected: usize,
}

impl<'a> DecodeSession<'a> {
    /// Encode `text` and position the session on the start token.
    pub fn start(
        bundle: &'a ModelBundle,
        config: &'a ChatConfig,
        text: &str,
        temperature: Temperature,
    ) -> Self {
        let vocab = bundle.vocab();
        let ids = vocab.encode(text, config.max_input_len, config.truncation);
        let (_, hidden) = bundle.model().encoder().encode_sequence(&ids);
        Self {
            bundle,
            config,
            temperature,
            hidden,
            last_token: vocab.start_id(),
            words: Vec::new(),
            tokens: Vec::new(),
            recent: VecDeque::with_capacity(config.history_window + 1),
            rejected: 0,
        }
    }

    /// Draw until a token passes the empty-word and repetition checks.
    fn draw<R: Rng + ?Sized>(&mut self, sampler: &Sampler, rng: &mut R) -> ChatResult<usize> {
        let vocab = self.bundle.vocab();
        for _ in 0..self.config.max_resample_attempts {
            let id = sampler.draw(rng);
            if vocab.decode(id).is_empty() || self.recent.contains(&id) {
                self.rejected += 1;
                continue;
            }
            return Ok(id);
        }
        Err(ChatError::DecodeStalled {
            attempts: self.config.max_resample_attempts,
        })
    }

    /// Run one decoder step. Returns `false` once the session is finished.
    pub fn step<R: Rng + ?Sized>(&mut self, rng: &mut R) -> ChatResult<bool> {
        let (probs, hidden) = self
            .bundle
            .model()
            .decoder()
            .step(self.last_token, self.hidden.view());
        let probs = probs.to_vec();
        let sampler = Sampler::new(&probs, self.temperature)?;
        let id = self.draw(&sampler, rng)?;

        self.tokens.push(id);
        if self.config.history_window > 0 {
            self.recent.push_back(id);
            if self.recent.len() > self.config.history_window {
                self.recent.pop_front();
            }
        }

        let vocab = self.bundle.vocab();
        if id == vocab.end_id() || self.words.len() >= self.config.max_output_words {
            return Ok(false);
        }
        self.words.push(vocab.decode(id).to_string());
        self.last_token = id;
        self.hidden = hidden;
        Ok(true)
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn finish(self) -> Decoded {
        Decoded {
            text: self.words.join(" ").trim().to_string(),
            tokens: self.tokens,
            rejected: self.rejected,
        }
    }
}

/// Generate a full response for `text` with `bundle`.
pub fn decode<R: Rng + ?Sized>(
    bundle: &ModelBundle,
    config: &ChatConfig,
    text: &str,
    temperature: Temperature,
    rng: &mut R,
    cancel: &CancelToken,
) -> ChatResult<Decoded> {
    let mut session = DecodeSession::start(bundle, config, text, temperature);
    loop {
        if cancel.is_cancelled() {
            debug!(words = session.words().len(), "decode cancelled");
            return Err(ChatError::Cancelled);
        }
        match session.step(rng) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => {
                if let ChatError::DecodeStalled { attempts } = &e {
                    warn!(
                        variant = %bundle.variant(),
                        attempts,
                        words = session.words().len(),
                        "decode stalled"
                    );
                }
                return Err(e);
            }
        }
    }
    let decoded = session.finish();
    debug!(
        variant = %bundle.variant(),
        tokens = decoded.tokens.len(),
        rejected = decoded.rejected,
        "decode finished"
    );
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Decoder, Embedding, Encoder, Gru, Linear, Seq2Seq, Seq2SeqArgs};
    use crate::registry::ModelVariant;
    use crate::vocab::{Vocabulary, END_TOKEN, START_TOKEN};
    use ndarray::Array2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const WORDS: [&str; 8] = ["a", "b", "c", "d", "e", "f", "g", "h"];

    /// Network whose decoder ignores its input: the softmax head is a pure
    /// bias, so every step sees the same distribution.
    fn fixed_output(head_bias: Vec<f32>) -> Seq2Seq {
        let v = head_bias.len();
        let (e, h) = (2, 2);
        let zero_gru = || {
            Gru::from_parts(
                Linear::from_parts(Array2::zeros((3 * h, e)), Array1::zeros(3 * h)).unwrap(),
                Linear::from_parts(Array2::zeros((3 * h, h)), Array1::zeros(3 * h)).unwrap(),
            )
            .unwrap()
        };
        let encoder = Encoder::new(Embedding::from_weight(Array2::zeros((v, e))), zero_gru());
        let decoder = Decoder::new(
            Embedding::from_weight(Array2::zeros((v, e))),
            zero_gru(),
            Linear::from_parts(Array2::zeros((v, h)), Array1::from(head_bias)).unwrap(),
        );
        Seq2Seq::from_parts(
            Seq2SeqArgs {
                vocab_size: v,
                embed_dim: e,
                hidden_dim: h,
            },
            encoder,
            decoder,
        )
        .unwrap()
    }

    /// ids: 1 = <start>, 2 = <end>, 3.. = WORDS
    fn bundle(head_bias: Vec<f32>) -> ModelBundle {
        let words = [START_TOKEN, END_TOKEN].into_iter().chain(WORDS);
        let vocab = Vocabulary::from_words(words).unwrap();
        ModelBundle::new(ModelVariant::Basic, vocab, fixed_output(head_bias)).unwrap()
    }

    fn temp(t: f64) -> Temperature {
        Temperature::new(t).unwrap()
    }

    #[test]
    fn end_token_stops_without_output() {
        let mut bias = vec![-30.0; 11];
        bias[2] = 30.0;
        let b = bundle(bias);
        let out = decode(
            &b,
            &ChatConfig::default(),
            "hi",
            temp(0.7),
            &mut StdRng::seed_from_u64(1),
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(out.text, "");
        assert_eq!(out.tokens, vec![2]);
    }

    #[test]
    fn output_is_capped_and_never_repeats_within_window() {
        // Uniform over words, end token and padding effectively impossible.
        let mut bias = vec![0.0; 11];
        bias[0] = -40.0;
        bias[2] = -40.0;
        let b = bundle(bias);
        let config = ChatConfig::default();
        for seed in 0..5 {
            let out = decode(
                &b,
                &config,
                "hi",
                temp(1.0),
                &mut StdRng::seed_from_u64(seed),
                &CancelToken::new(),
            )
            .unwrap();
            let words: Vec<&str> = out.text.split(' ').collect();
            assert_eq!(words.len(), config.max_output_words);
            assert!(!out.text.contains(END_TOKEN));
            for window in out.tokens.windows(config.history_window + 1) {
                let last = window[config.history_window];
                assert!(!window[..config.history_window].contains(&last));
            }
        }
    }

    #[test]
    fn single_word_distribution_stalls() {
        let mut bias = vec![-40.0; 11];
        bias[3] = 40.0;
        let b = bundle(bias);
        let config = ChatConfig {
            max_resample_attempts: 50,
            ..ChatConfig::default()
        };
        let err = decode(
            &b,
            &config,
            "hi",
            temp(0.1),
            &mut StdRng::seed_from_u64(2),
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ChatError::DecodeStalled { attempts: 50 }));
    }

    #[test]
    fn cancelled_token_stops_before_first_step() {
        let b = bundle(vec![0.0; 11]);
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = decode(
            &b,
            &ChatConfig::default(),
            "hi",
            temp(0.5),
            &mut StdRng::seed_from_u64(3),
            &cancel,
        )
        .unwrap_err();
        assert!(matches!(err, ChatError::Cancelled));
    }

    #[test]
    fn padding_draws_are_rejected() {
        // Padding carries most of the mass but decodes to "", so it is redrawn.
        let mut bias = vec![-40.0; 11];
        bias[0] = 2.0;
        bias[2] = 0.0;
        let b = bundle(bias);
        let out = decode(
            &b,
            &ChatConfig::default(),
            "hi",
            temp(1.0),
            &mut StdRng::seed_from_u64(4),
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(out.tokens, vec![2]);
        assert_eq!(out.text, "");
    }

    #[test]
    fn same_seed_same_reply() {
        let b = bundle(vec![0.0; 11]);
        let config = ChatConfig::default();
        let run = |seed| {
            decode(
                &b,
                &config,
                "hello",
                temp(0.8),
                &mut StdRng::seed_from_u64(seed),
                &CancelToken::new(),
            )
            .unwrap()
        };
        assert_eq!(run(9), run(9));
    }
}
