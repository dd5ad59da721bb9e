use std::path::Path;

use maeum::artifact;
use maeum::model::{Seq2Seq, Seq2SeqArgs};
use maeum::registry::ModelVariant;
use maeum::vocab::{Vocabulary, END_TOKEN, START_TOKEN};
use maeum::RegistryConfig;
use rand::rngs::StdRng;
use rand::SeedableRng;

pub const WORDS: [&str; 10] = [
    "오늘", "날씨", "좋다", "나", "너", "밥", "먹었어", "응", "그래", "고마워",
];

pub fn vocab() -> Vocabulary {
    Vocabulary::from_words([START_TOKEN, END_TOKEN].into_iter().chain(WORDS)).unwrap()
}

/// Hidden width per variant, so bundles can be told apart after a swap.
pub fn hidden_dim(variant: ModelVariant) -> usize {
    match variant {
        ModelVariant::Basic => 8,
        ModelVariant::Advanced => 12,
        ModelVariant::Fast => 4,
    }
}

pub fn random_model(variant: ModelVariant, seed: u64) -> Seq2Seq {
    let args = Seq2SeqArgs {
        vocab_size: WORDS.len() + 3,
        embed_dim: 6,
        hidden_dim: hidden_dim(variant),
    };
    Seq2Seq::random(args, &mut StdRng::seed_from_u64(seed))
}

/// Write a tokenizer and one weight file per variant under `dir`.
pub fn write_artifacts(dir: &Path) -> RegistryConfig {
    let config = RegistryConfig::in_dir(dir);
    vocab().save(dir.join(&config.tokenizer)).unwrap();
    for (i, file) in config.variants.iter().enumerate() {
        let model = random_model(file.variant, i as u64);
        artifact::save(&model, dir.join(&file.weights)).unwrap();
    }
    config
}
