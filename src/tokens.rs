//! Token counting over rendered text.
//!
//! Counts are always taken on the text that would be sent downstream, never on raw sources, so
//! YAML punctuation and Markdown syntax are included in the totals.
//!
//! [`ModelTokenCounter`] is the default: exact BPE counts through `tiktoken-rs` for OpenAI models
//! and encodings, and per-family estimates from [`HeuristicTokenCounter`] for everything else.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};
use tiktoken_rs::CoreBPE;

use crate::{
    error::ContextNetworkError,
    properties::ContextNode,
    render::{ReferenceInliner, RenderMode},
};

pub trait TokenCounter {
    fn count_tokens(&self, text: &str, model: &str) -> Result<usize, ContextNetworkError>;

    /// Count the node's compact rendering in its own format. References stay as pointers, so a
    /// node shared by several parents contributes its own text once.
    fn count_tokens_for_node(
        &self,
        node: &ContextNode,
        model: &str,
    ) -> Result<usize, ContextNetworkError> {
        let rendered = ReferenceInliner::default().render_standalone(
            node,
            node.format(),
            RenderMode::FileFirst,
        )?;
        self.count_tokens(&rendered.into_string(node.format())?, model)
    }
}

impl<T: TokenCounter + ?Sized> TokenCounter for &T {
    fn count_tokens(&self, text: &str, model: &str) -> Result<usize, ContextNetworkError> {
        (**self).count_tokens(text, model)
    }
}

/// Characters-per-token ratios by model family. Longest matching prefix wins.
const MODEL_RATIOS: &[(&str, f64)] = &[
    ("gpt-4o", 4.2),
    ("gpt-4", 4.0),
    ("gpt-3.5", 4.0),
    ("o1", 4.2),
    ("o3", 4.2),
    ("claude", 3.5),
    ("llama", 3.8),
    ("mistral", 3.6),
    ("cl100k_base", 4.0),
    ("o200k_base", 4.2),
    ("p50k_base", 3.8),
    ("approx", 4.0),
];

/// Estimates tokens from character counts using per-model ratios.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeuristicTokenCounter;

impl HeuristicTokenCounter {
    /// Ratio for `model`, if the model family is known.
    pub fn ratio(model: &str) -> Option<f64> {
        let model = model.trim().to_lowercase();
        MODEL_RATIOS
            .iter()
            .filter(|(prefix, _)| model.starts_with(prefix))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, ratio)| *ratio)
    }

    pub fn supports(model: &str) -> bool {
        Self::ratio(model).is_some()
    }
}

impl TokenCounter for HeuristicTokenCounter {
    fn count_tokens(&self, text: &str, model: &str) -> Result<usize, ContextNetworkError> {
        let ratio = Self::ratio(model).ok_or_else(|| {
            ContextNetworkError::TokenCounting(format!("unsupported token model '{model}'"))
        })?;
        let chars = text.chars().count();
        Ok((chars as f64 / ratio).ceil() as usize)
    }
}

/// BPE encodings by model name prefix. Longest matching prefix wins.
const MODEL_ENCODINGS: &[(&str, &str)] = &[
    ("o200k_base", "o200k_base"),
    ("cl100k_base", "cl100k_base"),
    ("p50k_base", "p50k_base"),
    ("p50k_edit", "p50k_edit"),
    ("r50k_base", "r50k_base"),
    ("gpt-4o", "o200k_base"),
    ("chatgpt-4o", "o200k_base"),
    ("gpt-4.1", "o200k_base"),
    ("gpt-4.5", "o200k_base"),
    ("o1", "o200k_base"),
    ("o3", "o200k_base"),
    ("o4", "o200k_base"),
    ("gpt-4", "cl100k_base"),
    ("gpt-3.5", "cl100k_base"),
    ("text-embedding-3", "cl100k_base"),
    ("text-embedding-ada-002", "cl100k_base"),
];

static ENCODINGS: Lazy<RwLock<HashMap<&'static str, Arc<CoreBPE>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Exact token counts with the BPE encoding the model uses.
///
/// Encodings are loaded once per process and shared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TiktokenCounter;

impl TiktokenCounter {
    /// Encoding name for `model`, which may also be an encoding name itself.
    pub fn encoding_for(model: &str) -> Option<&'static str> {
        let model = model.trim().to_lowercase();
        MODEL_ENCODINGS
            .iter()
            .filter(|(prefix, _)| model.starts_with(prefix))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, encoding)| *encoding)
    }

    pub fn supports(model: &str) -> bool {
        Self::encoding_for(model).is_some()
    }

    fn encoding(name: &'static str) -> Result<Arc<CoreBPE>, ContextNetworkError> {
        if let Some(bpe) = ENCODINGS.read().get(name) {
            return Ok(bpe.clone());
        }
        tracing::debug!("Loading BPE encoding {name}");
        let bpe = match name {
            "o200k_base" => tiktoken_rs::o200k_base(),
            "cl100k_base" => tiktoken_rs::cl100k_base(),
            "p50k_base" => tiktoken_rs::p50k_base(),
            "p50k_edit" => tiktoken_rs::p50k_edit(),
            "r50k_base" => tiktoken_rs::r50k_base(),
            other => {
                return Err(ContextNetworkError::TokenCounting(format!(
                    "unknown encoding '{other}'"
                )))
            }
        }
        .map_err(|e| ContextNetworkError::TokenCounting(format!("loading {name}: {e}")))?;
        let bpe = Arc::new(bpe);
        ENCODINGS.write().insert(name, bpe.clone());
        Ok(bpe)
    }
}

impl TokenCounter for TiktokenCounter {
    fn count_tokens(&self, text: &str, model: &str) -> Result<usize, ContextNetworkError> {
        let name = Self::encoding_for(model).ok_or_else(|| {
            ContextNetworkError::TokenCounting(format!("no BPE encoding for model '{model}'"))
        })?;
        Ok(Self::encoding(name)?.encode_with_special_tokens(text).len())
    }
}

/// Default counter: [`TiktokenCounter`] where an encoding is known, otherwise
/// [`HeuristicTokenCounter`]. Models neither knows are a [`ContextNetworkError::TokenCounting`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModelTokenCounter;

impl TokenCounter for ModelTokenCounter {
    fn count_tokens(&self, text: &str, model: &str) -> Result<usize, ContextNetworkError> {
        if TiktokenCounter::supports(model) {
            TiktokenCounter.count_tokens(text, model)
        } else {
            HeuristicTokenCounter.count_tokens(text, model)
        }
    }
}
