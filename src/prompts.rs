//! System prompts for vision-model extraction.
//!
//! Every prompt template lives here, keyed by [`PromptType`], so the strategy
//! table in [`crate::pipeline::strategy`] refers to prompts by id and the
//! vision backend never embeds prompt text. Unit tests can inspect prompts
//! directly without a model.

use serde::{Deserialize, Serialize};

/// Identifier of a prompt template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptType {
    /// Local extraction, no model involved.
    Direct,
    /// Short forms and certificates.
    Form,
    /// Mixed text, tables and figures.
    General,
    /// Slide decks, brochures and other image-dominated pages.
    ImageHeavy,
    /// Scanned corporate registry extracts, contracts and other legal documents.
    LegalRegistry,
}

impl PromptType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptType::Direct => "direct",
            PromptType::Form => "form",
            PromptType::General => "general",
            PromptType::ImageHeavy => "image_heavy",
            PromptType::LegalRegistry => "legal_registry",
        }
    }
}

/// Rules shared by every vision prompt: output format and page labelling.
const OUTPUT_RULES: &str = r#"OUTPUT FORMAT
- Output ONLY Markdown. Do NOT wrap it in ```markdown fences. No commentary.
- Start every page with a marker line of the form <!-- page N --> where N is
  the page number given to you for that image.
- Convert every table to GFM pipe format with a header row. Keep numbers
  exactly as printed, including units (원, 백만원, 억), signs (△, -) and
  parentheses.
- Preserve the reading order a human would use. Skip page numbers and
  repeated headers/footers."#;

const FORM_PROMPT: &str = r#"You are transcribing a short business form or certificate.
Capture every labelled field as "Label: Value" on its own line. Company name,
representative, business registration number, corporate registration number,
establishment date and head office address must be reproduced verbatim when
present."#;

const GENERAL_PROMPT: &str = r#"You are an expert document converter for investment and financial documents.
Preserve ALL text. Use # / ## / ### for headings. Financial statements
(손익계산서, 재무상태표, 현금흐름표, 주주명부) must be transcribed as complete
tables: one column per fiscal year, one row per line item."#;

const IMAGE_HEAVY_PROMPT: &str = r#"You are converting an image-dominated document such as a pitch deck.
Transcribe all visible text, including text inside charts and diagrams.
Summarise each chart in one sentence after its title and transcribe any data
labels as a table."#;

const LEGAL_REGISTRY_PROMPT: &str = r#"You are performing OCR on scanned legal or corporate registry documents
(법인등기부등본, 사업자등록증, 주주명부, contracts). Accuracy is critical:
reproduce names, registration numbers, dates and amounts character for
character. Never guess an illegible character; write [illegible] instead."#;

/// Build the system prompt for a prompt id.
///
/// Returns `None` for [`PromptType::Direct`], which never reaches a model.
pub fn system_prompt(prompt: PromptType) -> Option<String> {
    let body = match prompt {
        PromptType::Direct => return None,
        PromptType::Form => FORM_PROMPT,
        PromptType::General => GENERAL_PROMPT,
        PromptType::ImageHeavy => IMAGE_HEAVY_PROMPT,
        PromptType::LegalRegistry => LEGAL_REGISTRY_PROMPT,
    };
    Some(format!("{body}\n\n{OUTPUT_RULES}"))
}

/// User-turn text telling the model which global page numbers the attached
/// images carry.
pub fn page_labels_instruction(first_page: usize, page_count: usize) -> String {
    if page_count == 1 {
        format!("The attached image is page {first_page}.")
    } else {
        format!(
            "The {page_count} attached images are pages {first_page} to {} in order.",
            first_page + page_count - 1
        )
    }
}
