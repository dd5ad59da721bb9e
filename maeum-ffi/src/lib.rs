//! C ABI for embedding the chatbot in a desktop or mobile front end, plus
//! helpers for producing a demo artifact set.

use std::path::Path;

use maeum::artifact;
use maeum::model::{Seq2Seq, Seq2SeqArgs};
use maeum::vocab::{Vocabulary, END_TOKEN, START_TOKEN};
use maeum::{ChatResult, RegistryConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

pub mod ffi;
pub use ffi::*;

/// Words of the demo tokenizer, after the start and end sentinels.
pub const DEMO_WORDS: &[&str] = &[
    "나", "너", "우리", "오늘", "내일", "날씨", "좋다", "싫어", "밥", "먹었어", "뭐", "해",
    "응", "아니", "그래", "고마워", "정말", "재밌다", "피곤해", "잘자",
];

/// Demo network dimensions; the hidden width matches the shipped models.
pub fn demo_args(vocab: &Vocabulary) -> Seq2SeqArgs {
    Seq2SeqArgs {
        vocab_size: vocab.max_id() + 1,
        embed_dim: 32,
        hidden_dim: 136,
    }
}

/// Write a tokenizer and a randomly initialised weight file for every
/// variant into `dir`, laid out the way [`RegistryConfig::in_dir`] expects.
pub fn write_demo_artifacts(dir: &Path, seed: u64) -> ChatResult<RegistryConfig> {
    std::fs::create_dir_all(dir).map_err(|e| maeum::ChatError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;
    let config = RegistryConfig::in_dir(dir);
    let vocab = Vocabulary::from_words(
        [START_TOKEN, END_TOKEN]
            .into_iter()
            .chain(DEMO_WORDS.iter().copied()),
    )?;
    vocab.save(dir.join(&config.tokenizer))?;

    let mut rng = StdRng::seed_from_u64(seed);
    for file in &config.variants {
        let model = Seq2Seq::random(demo_args(&vocab), &mut rng);
        let path = dir.join(&file.weights);
        artifact::save(&model, &path)?;
        info!(variant = %file.variant, path = %path.display(), "wrote demo weights");
    }
    Ok(config)
}
