mod common;

use std::fs::OpenOptions;
use std::io::Write;

use maeum::artifact::{self, TENSOR_NAMES};
use maeum::registry::{ModelRegistry, ModelVariant};
use maeum::ChatError;
use tempfile::{tempdir, NamedTempFile};

#[test]
fn test_weights_survive_save_and_load() {
    let model = common::random_model(ModelVariant::Basic, 42);
    let file = NamedTempFile::new().unwrap();
    artifact::save(&model, file.path()).unwrap();

    for loaded in [
        artifact::load(file.path()).unwrap(),
        artifact::load_mmap(file.path()).unwrap(),
    ] {
        assert_eq!(loaded.args, model.args);
        let ids = [1, 3, 4, 5, 0, 0];
        let (_, expected) = model.encoder().encode_sequence(&ids);
        let (_, got) = loaded.encoder().encode_sequence(&ids);
        assert_eq!(expected, got);

        let (p_expected, _) = model.decoder().step(1, expected.view());
        let (p_got, _) = loaded.decoder().step(1, got.view());
        assert_eq!(p_expected, p_got);
    }
}

#[test]
fn test_truncated_file_is_rejected() {
    let model = common::random_model(ModelVariant::Fast, 1);
    let file = NamedTempFile::new().unwrap();
    artifact::save(&model, file.path()).unwrap();

    let bytes = std::fs::read(file.path()).unwrap();
    let cut = &bytes[..bytes.len() - 7];
    let err = artifact::from_bytes(file.path(), cut).unwrap_err();
    assert!(matches!(err, ChatError::Artifact { .. }), "{err}");
}

#[test]
fn test_trailing_bytes_are_rejected() {
    let model = common::random_model(ModelVariant::Fast, 1);
    let file = NamedTempFile::new().unwrap();
    artifact::save(&model, file.path()).unwrap();
    OpenOptions::new()
        .append(true)
        .open(file.path())
        .unwrap()
        .write_all(&[0u8; 3])
        .unwrap();
    let err = artifact::load_weights(file.path()).unwrap_err();
    assert!(matches!(err, ChatError::Artifact { .. }), "{err}");
}

#[test]
fn test_empty_file_falls_back_and_fails_cleanly() {
    let file = NamedTempFile::new().unwrap();
    let err = artifact::load_weights(file.path()).unwrap_err();
    assert!(matches!(err, ChatError::Artifact { .. }), "{err}");
}

#[test]
fn test_tensor_order_is_stable() {
    assert_eq!(TENSOR_NAMES.len(), 12);
    assert_eq!(TENSOR_NAMES[0], "encoder.embedding");
    assert_eq!(TENSOR_NAMES[11], "decoder.head.bias");
}

#[test]
fn test_registry_loads_each_variant() {
    let dir = tempdir().unwrap();
    let registry = ModelRegistry::new(common::write_artifacts(dir.path()));
    for variant in ModelVariant::ALL {
        let bundle = registry.load(variant.label()).unwrap();
        assert_eq!(bundle.variant(), variant);
        assert_eq!(bundle.model().args.hidden_dim, common::hidden_dim(variant));
        assert_eq!(bundle.vocab().len(), common::WORDS.len() + 2);
    }
}

#[test]
fn test_registry_refuses_mismatched_pair() {
    let dir = tempdir().unwrap();
    let config = common::write_artifacts(dir.path());
    // A tokenizer with more words than the model has output rows.
    let big = maeum::vocab::Vocabulary::from_words(
        ["<start>", "<end>"]
            .into_iter()
            .chain(common::WORDS)
            .chain(["추가", "단어"]),
    )
    .unwrap();
    big.save(dir.path().join(&config.tokenizer)).unwrap();

    let registry = ModelRegistry::new(config);
    let err = registry.load("basic").unwrap_err();
    assert!(matches!(err, ChatError::VocabularyMismatch { .. }), "{err}");
}
