//! Strategy routing: a static table from [`DocType`] to processing settings.

use crate::pipeline::classify::DocType;
use crate::prompts::PromptType;
use serde::{Deserialize, Serialize};

/// Bumped whenever the table below changes. Part of the cache key, so a new
/// table never serves results produced under the old one.
pub const STRATEGY_VERSION: u32 = 1;

/// Which vision model tier a strategy needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    None,
    Cheap,
    Standard,
}

impl ModelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTier::None => "none",
            ModelTier::Cheap => "cheap",
            ModelTier::Standard => "standard",
        }
    }
}

/// How a document of a given type is processed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStrategy {
    /// Whether pages go through the vision backend.
    pub use_extraction: bool,
    pub model_tier: ModelTier,
    pub dpi: u32,
    pub prompt_type: PromptType,
    pub max_tokens: u32,
    /// Maximum pages per chunk.
    pub chunk_pages: usize,
    /// Maximum encoded bytes per chunk, in MiB.
    pub max_chunk_mb: f64,
}

impl ProcessingStrategy {
    /// Local extraction, no model.
    pub const DIRECT: ProcessingStrategy = ProcessingStrategy {
        use_extraction: false,
        model_tier: ModelTier::None,
        dpi: 0,
        prompt_type: PromptType::Direct,
        max_tokens: 0,
        chunk_pages: 0,
        max_chunk_mb: 0.0,
    };

    /// Relative cost: 0 local, 1 cheap model, 2 standard model.
    pub fn cost_order(&self) -> u8 {
        match self.model_tier {
            ModelTier::None => 0,
            ModelTier::Cheap => 1,
            ModelTier::Standard => 2,
        }
    }

    /// Byte budget of one chunk.
    pub fn max_chunk_bytes(&self) -> usize {
        (self.max_chunk_mb * 1024.0 * 1024.0) as usize
    }
}

const fn vision(
    model_tier: ModelTier,
    dpi: u32,
    prompt_type: PromptType,
    max_tokens: u32,
    chunk_pages: usize,
    max_chunk_mb: f64,
) -> ProcessingStrategy {
    ProcessingStrategy {
        use_extraction: true,
        model_tier,
        dpi,
        prompt_type,
        max_tokens,
        chunk_pages,
        max_chunk_mb,
    }
}

/// Strategy for a document type.
pub fn get_strategy(doc_type: DocType) -> ProcessingStrategy {
    match doc_type {
        DocType::PureText | DocType::TextWithTables | DocType::SmallTable => {
            ProcessingStrategy::DIRECT
        }
        DocType::SimpleForm => vision(ModelTier::Cheap, 100, PromptType::Form, 4096, 4, 5.0),
        DocType::MixedRich => vision(ModelTier::Standard, 150, PromptType::General, 8192, 10, 15.0),
        DocType::ImageHeavy => {
            vision(ModelTier::Standard, 120, PromptType::ImageHeavy, 8192, 5, 10.0)
        }
        DocType::FullyScanned => {
            vision(ModelTier::Standard, 200, PromptType::LegalRegistry, 8192, 5, 15.0)
        }
    }
}
