//! Word-level vocabulary shared by encoder input and decoder output.
//!
//! Ids start at 1; id 0 is padding and never names a word. The tokenizer
//! artifact is JSON, either a plain object or the envelope written by
//! Keras' `Tokenizer.to_json()` (which stores `word_index` as an encoded
//! string).

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::Truncation;
use crate::error::{ChatError, ChatResult};

pub const PAD_ID: usize = 0;
pub const START_TOKEN: &str = "<start>";
pub const END_TOKEN: &str = "<end>";

/// Keras' default filter set without `<` and `>`. The sentinels are stored
/// as `<start>` and `<end>` in `word_index`, so the tokenizer that built it
/// kept the angle brackets. Tokenizers that filter them must say so in
/// their `filters` field.
const DEFAULT_FILTERS: &str = "!\"#$%&()*+,-./:;=?@[\\]^_`{|}~\t\n";

fn default_lower() -> bool {
    true
}

fn default_filters() -> String {
    DEFAULT_FILTERS.to_string()
}

fn default_split() -> String {
    " ".to_string()
}

/// On-disk tokenizer description.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VocabSpec {
    pub word_index: HashMap<String, usize>,
    #[serde(default)]
    pub oov_token: Option<String>,
    #[serde(default = "default_lower")]
    pub lower: bool,
    #[serde(default = "default_filters")]
    pub filters: String,
    #[serde(default = "default_split")]
    pub split: String,
    /// Only ids below this are produced by `encode`.
    #[serde(default)]
    pub num_words: Option<usize>,
}

#[derive(Deserialize)]
struct KerasConfig {
    word_index: String,
    #[serde(default)]
    oov_token: Option<String>,
    #[serde(default = "default_lower")]
    lower: bool,
    #[serde(default = "default_filters")]
    filters: String,
    #[serde(default = "default_split")]
    split: String,
    #[serde(default)]
    num_words: Option<usize>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TokenizerFile {
    Keras { config: KerasConfig },
    Plain(VocabSpec),
}

impl TokenizerFile {
    fn into_spec(self) -> ChatResult<VocabSpec> {
        match self {
            TokenizerFile::Plain(spec) => Ok(spec),
            TokenizerFile::Keras { config } => Ok(VocabSpec {
                word_index: serde_json::from_str(&config.word_index)?,
                oov_token: config.oov_token,
                lower: config.lower,
                filters: config.filters,
                split: config.split,
                num_words: config.num_words,
            }),
        }
    }
}

/// Immutable token <-> id mapping.
#[derive(Clone, Debug)]
pub struct Vocabulary {
    spec: VocabSpec,
    index_word: HashMap<usize, String>,
    start_id: usize,
    end_id: usize,
    oov_id: Option<usize>,
    max_id: usize,
}

impl Vocabulary {
    /// Validate `spec` and build the reverse index.
    pub fn from_spec(spec: VocabSpec) -> ChatResult<Self> {
        if spec.split.is_empty() {
            return Err(ChatError::Config("tokenizer split string is empty".into()));
        }
        if let Some((word, _)) = spec.word_index.iter().find(|(_, &id)| id == PAD_ID) {
            return Err(ChatError::Config(format!(
                "word `{word}` uses the reserved padding id 0"
            )));
        }
        let start_id = *spec
            .word_index
            .get(START_TOKEN)
            .ok_or_else(|| ChatError::MissingReservedToken(START_TOKEN.into()))?;
        let end_id = *spec
            .word_index
            .get(END_TOKEN)
            .ok_or_else(|| ChatError::MissingReservedToken(END_TOKEN.into()))?;
        let oov_id = match &spec.oov_token {
            Some(token) => Some(
                *spec
                    .word_index
                    .get(token)
                    .ok_or_else(|| ChatError::MissingReservedToken(token.clone()))?,
            ),
            None => None,
        };
        let index_word: HashMap<usize, String> = spec
            .word_index
            .iter()
            .map(|(word, &id)| (id, word.clone()))
            .collect();
        let max_id = index_word.keys().copied().max().unwrap_or(PAD_ID);
        Ok(Self {
            spec,
            index_word,
            start_id,
            end_id,
            oov_id,
            max_id,
        })
    }

    /// Build a vocabulary from words in id order, starting at id 1.
    pub fn from_words<I, S>(words: I) -> ChatResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let word_index = words
            .into_iter()
            .enumerate()
            .map(|(i, w)| (w.into(), i + 1))
            .collect();
        Self::from_spec(VocabSpec {
            word_index,
            oov_token: None,
            lower: true,
            filters: default_filters(),
            split: default_split(),
            num_words: None,
        })
    }

    pub fn from_json_str(text: &str) -> ChatResult<Self> {
        let file: TokenizerFile = serde_json::from_str(text)?;
        Self::from_spec(file.into_spec()?)
    }

    /// Load a tokenizer artifact from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> ChatResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ChatError::io(path, e))?;
        Self::from_json_str(&text)
    }

    /// Write the plain JSON form.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> ChatResult<()> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(&self.spec)?;
        std::fs::write(path, text).map_err(|e| ChatError::io(path, e))
    }

    /// Split `text` into words the way the tokenizer was fit.
    pub fn words(&self, text: &str) -> Vec<String> {
        let text = if self.spec.lower {
            text.to_lowercase()
        } else {
            text.to_string()
        };
        let cleaned: String = text
            .chars()
            .map(|c| {
                if self.spec.filters.contains(c) {
                    self.spec.split.clone()
                } else {
                    c.to_string()
                }
            })
            .collect();
        cleaned
            .split(self.spec.split.as_str())
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Ids for `text` without padding. Unknown words become the OOV id
    /// or are dropped when there is none.
    pub fn ids(&self, text: &str) -> Vec<usize> {
        self.words(text)
            .iter()
            .filter_map(|word| match self.spec.word_index.get(word) {
                Some(&id) if self.spec.num_words.map_or(true, |n| id < n) => Some(id),
                _ => self.oov_id,
            })
            .collect()
    }

    /// Ids for `text`, cut and right-padded to exactly `max_len`.
    pub fn encode(&self, text: &str, max_len: usize, truncation: Truncation) -> Vec<usize> {
        let mut ids = self.ids(text);
        if ids.len() > max_len {
            match truncation {
                Truncation::Leading => {
                    ids.drain(..ids.len() - max_len);
                }
                Truncation::Trailing => ids.truncate(max_len),
            }
        }
        ids.resize(max_len, PAD_ID);
        ids
    }

    /// Word for `id`, or `""` for padding and unknown ids.
    pub fn decode(&self, id: usize) -> &str {
        self.index_word.get(&id).map(String::as_str).unwrap_or("")
    }

    pub fn id_of(&self, word: &str) -> Option<usize> {
        self.spec.word_index.get(word).copied()
    }

    pub fn start_id(&self) -> usize {
        self.start_id
    }

    pub fn end_id(&self) -> usize {
        self.end_id
    }

    pub fn oov_id(&self) -> Option<usize> {
        self.oov_id
    }

    /// Largest id any word uses.
    pub fn max_id(&self) -> usize {
        self.max_id
    }

    /// Largest id `encode` can produce. With `num_words` set the index keeps
    /// every fitted word, but only ids below the cap reach the model.
    pub fn max_usable_id(&self) -> usize {
        match self.spec.num_words {
            Some(n) => self.max_id.min(n.saturating_sub(1)),
            None => self.max_id,
        }
    }

    /// Number of words, padding excluded.
    pub fn len(&self) -> usize {
        self.index_word.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index_word.is_empty()
    }
}
