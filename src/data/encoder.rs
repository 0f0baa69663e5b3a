// ============================================================
// Layer 4 - Tokenizer / Label Encoder Builder
// ============================================================
// Fits the two lookup tables the model is trained against:
//
//   Vocabulary   token → id, written out as a HuggingFace
//                WordLevel tokenizer.json so any `tokenizers`
//                runtime can load it back.
//   LabelEncoder label → class id, first-seen order.
//
// Vocabulary layout:
//   0      <PAD>   (padding, masked out of the pooled embedding)
//   1      <OOV>   (unknown words)
//   2..    observed words, most frequent first,
//          ties broken by first occurrence in the SampleSet
//
// The tokenizer.json is written by hand instead of trained with
// a `tokenizers` trainer: a word-level table is just a frequency
// count, and building the JSON keeps the output byte-stable.
//
// Labels are fitted before the vocabulary so a single-label
// dataset fails fast with InsufficientLabels.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokenizers::Tokenizer;

use crate::data::preprocessor::{NormalizationPolicy, Preprocessor};
use crate::domain::sample::SampleSet;
use crate::error::{PipelineError, Result};

pub const PAD_TOKEN: &str = "<PAD>";
pub const OOV_TOKEN: &str = "<OOV>";
pub const PAD_ID: u32 = 0;
pub const OOV_ID: u32 = 1;

/// Maximum number of observed words kept in the vocabulary.
pub const DEFAULT_MAX_VOCABULARY: usize = 10_000;

/// Upper bound on the padded sequence length.
pub const DEFAULT_MAX_SEQUENCE_LENGTH: usize = 64;

/// Settings for fitting the vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenizerOptions {
    /// Observed-word cap, `None` keeps every word
    #[serde(default = "default_max_vocabulary")]
    pub max_vocabulary: Option<usize>,

    /// Longest sequence the model will see
    #[serde(default = "default_max_sequence_length")]
    pub max_sequence_length: usize,

    /// Policy the sample texts were normalised with
    #[serde(default)]
    pub normalization: NormalizationPolicy,
}

fn default_max_vocabulary() -> Option<usize> {
    Some(DEFAULT_MAX_VOCABULARY)
}

fn default_max_sequence_length() -> usize {
    DEFAULT_MAX_SEQUENCE_LENGTH
}

impl Default for TokenizerOptions {
    fn default() -> Self {
        Self {
            max_vocabulary: default_max_vocabulary(),
            max_sequence_length: DEFAULT_MAX_SEQUENCE_LENGTH,
            normalization: NormalizationPolicy::default(),
        }
    }
}

impl TokenizerOptions {
    pub fn validate(&self) -> Result<()> {
        if self.max_vocabulary == Some(0) {
            return Err(PipelineError::InvalidConfig(
                "max_vocabulary must be at least 1".to_string(),
            ));
        }
        if self.max_sequence_length == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_sequence_length must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Fit the label encoder and the vocabulary on `samples`.
pub fn fit(samples: &SampleSet, options: &TokenizerOptions) -> Result<(Vocabulary, LabelEncoder)> {
    options.validate()?;
    let labels = LabelEncoder::fit(samples)?;
    let vocabulary = Vocabulary::fit(samples, options)?;
    Ok((vocabulary, labels))
}

// ─── Vocabulary ───────────────────────────────────────────────────────────────

/// Padded, fixed-length token ids for one text.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedText {
    pub input_ids: Vec<u32>,
    /// 1 = real token, 0 = padding
    pub attention_mask: Vec<u32>,
}

/// Word-level vocabulary backed by a `tokenizers::Tokenizer`.
#[derive(Clone)]
pub struct Vocabulary {
    tokens: Vec<String>,
    normalization: NormalizationPolicy,
    max_len: usize,
    tokenizer: Tokenizer,
}

impl Vocabulary {
    /// Count words over `samples` and build the id table.
    pub fn fit(samples: &SampleSet, options: &TokenizerOptions) -> Result<Self> {
        options.validate()?;

        // IndexMap keeps first-occurrence order, the stable sort below
        // then only reorders by count.
        let mut counts: IndexMap<&str, usize> = IndexMap::new();
        let mut longest = 0usize;
        for sample in samples {
            let mut n = 0usize;
            for word in sample.text.split_whitespace() {
                *counts.entry(word).or_insert(0) += 1;
                n += 1;
            }
            longest = longest.max(n);
        }

        let mut words: Vec<(&str, usize)> = counts
            .into_iter()
            .filter(|(w, _)| *w != PAD_TOKEN && *w != OOV_TOKEN)
            .collect();
        words.sort_by(|a, b| b.1.cmp(&a.1));
        if let Some(cap) = options.max_vocabulary {
            words.truncate(cap);
        }

        let mut tokens = vec![PAD_TOKEN.to_string(), OOV_TOKEN.to_string()];
        tokens.extend(words.into_iter().map(|(w, _)| w.to_string()));

        let max_len = longest.clamp(1, options.max_sequence_length);
        let tokenizer = build_tokenizer(&tokens, options.normalization)?;

        tracing::info!(
            "Vocabulary fitted: {} tokens, max_len={}",
            tokens.len(),
            max_len
        );

        Ok(Self {
            tokens,
            normalization: options.normalization,
            max_len,
            tokenizer,
        })
    }

    /// Rebuild a vocabulary from a published tokenizer.json.
    pub fn from_json_bytes(
        bytes: &[u8],
        normalization: NormalizationPolicy,
        max_len: usize,
    ) -> Result<Self> {
        let tokenizer = Tokenizer::from_bytes(bytes)
            .map_err(|e| PipelineError::Serialization(format!("cannot load tokenizer: {e}")))?;

        let mut by_id: Vec<(String, u32)> = tokenizer.get_vocab(false).into_iter().collect();
        by_id.sort_by_key(|(_, id)| *id);

        let contiguous = by_id.iter().enumerate().all(|(i, (_, id))| *id as usize == i);
        if !contiguous || by_id.len() < 2 || by_id[0].0 != PAD_TOKEN || by_id[1].0 != OOV_TOKEN {
            return Err(PipelineError::Serialization(
                "tokenizer vocabulary is not a <PAD>/<OOV> word table".to_string(),
            ));
        }

        Ok(Self {
            tokens: by_id.into_iter().map(|(t, _)| t).collect(),
            normalization,
            max_len: max_len.max(1),
            tokenizer,
        })
    }

    /// The tokenizer.json bytes. Identical for identical vocabularies.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        let json = tokenizer_json(&self.tokens, self.normalization);
        serde_json::to_vec_pretty(&json).map_err(|e| PipelineError::Serialization(e.to_string()))
    }

    /// Tokenise already-normalised text, then pad/truncate to `max_len`.
    pub fn encode(&self, text: &str) -> Result<EncodedText> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| PipelineError::Serialization(format!("tokenisation failed: {e}")))?;

        let mut input_ids: Vec<u32> = encoding.get_ids().iter().copied().take(self.max_len).collect();
        let mut attention_mask = vec![1u32; input_ids.len()];
        input_ids.resize(self.max_len, PAD_ID);
        attention_mask.resize(self.max_len, 0);

        Ok(EncodedText {
            input_ids,
            attention_mask,
        })
    }

    /// Normalise a raw query with the training policy, then encode it.
    pub fn encode_query(&self, raw: &str) -> Result<EncodedText> {
        let cleaned = Preprocessor::new(self.normalization).clean(raw);
        self.encode(&cleaned)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn normalization(&self) -> NormalizationPolicy {
        self.normalization
    }

    pub fn token_id(&self, token: &str) -> Option<u32> {
        self.tokenizer.token_to_id(token)
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }
}

impl fmt::Debug for Vocabulary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vocabulary")
            .field("size", &self.tokens.len())
            .field("max_len", &self.max_len)
            .field("normalization", &self.normalization)
            .finish()
    }
}

fn build_tokenizer(tokens: &[String], normalization: NormalizationPolicy) -> Result<Tokenizer> {
    let json = tokenizer_json(tokens, normalization);
    let bytes = serde_json::to_vec(&json).map_err(|e| PipelineError::Serialization(e.to_string()))?;
    Tokenizer::from_bytes(bytes)
        .map_err(|e| PipelineError::Serialization(format!("cannot build tokenizer: {e}")))
}

/// HuggingFace tokenizer.json for a WordLevel model over `tokens`.
fn tokenizer_json(tokens: &[String], normalization: NormalizationPolicy) -> serde_json::Value {
    let vocab: serde_json::Map<String, serde_json::Value> = tokens
        .iter()
        .enumerate()
        .map(|(id, token)| (token.clone(), serde_json::json!(id)))
        .collect();

    // Text is already cleaned by the Preprocessor; the normaliser only
    // repeats the casefold so external runtimes see the same tokens.
    let normalizer = if normalization.lowercase {
        serde_json::json!({ "type": "Lowercase" })
    } else {
        serde_json::Value::Null
    };

    serde_json::json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [
            {"id": PAD_ID, "content": PAD_TOKEN, "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
            {"id": OOV_ID, "content": OOV_TOKEN, "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true}
        ],
        "normalizer": normalizer,
        "pre_tokenizer": {
            "type": "WhitespaceSplit"
        },
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": vocab,
            "unk_token": OOV_TOKEN
        }
    })
}

// ─── LabelEncoder ─────────────────────────────────────────────────────────────

/// Bijective label ↔ class id mapping in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelEncoder {
    ids: IndexMap<String, u32>,
}

impl LabelEncoder {
    /// Assign ids in first-seen order. Needs at least two labels.
    pub fn fit(samples: &SampleSet) -> Result<Self> {
        let mut ids = IndexMap::new();
        for sample in samples {
            let next = ids.len() as u32;
            ids.entry(sample.label.clone()).or_insert(next);
        }
        if ids.len() < 2 {
            return Err(PipelineError::InsufficientLabels { found: ids.len() });
        }
        tracing::info!("Label encoder fitted: {} classes", ids.len());
        Ok(Self { ids })
    }

    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self> {
        let ids: IndexMap<String, u32> = serde_json::from_slice(bytes)
            .map_err(|e| PipelineError::Serialization(format!("label encoder: {e}")))?;
        let ordered = ids.values().enumerate().all(|(i, id)| *id as usize == i);
        if !ordered {
            return Err(PipelineError::Serialization(
                "label encoder ids are not 0..n in order".to_string(),
            ));
        }
        Ok(Self { ids })
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(&self.ids).map_err(|e| PipelineError::Serialization(e.to_string()))
    }

    pub fn id(&self, label: &str) -> Option<u32> {
        self.ids.get(label).copied()
    }

    pub fn label(&self, id: u32) -> Option<&str> {
        self.ids.get_index(id as usize).map(|(label, _)| label.as_str())
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.ids.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
