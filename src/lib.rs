//! # docsift
//!
//! Resilient LLM-based document extraction: classify a document's text,
//! prompt a language model for structured fields, and survive everything the
//! model throws back.
//!
//! ## Why this crate?
//!
//! LLM extraction fails in mundane ways: the local model is down, the cloud
//! provider rate-limits, the completion arrives wrapped in markdown with a
//! trailing comma, amounts come back as `"1.234,56"`, and the total doesn't
//! match the line items. Each stage here assumes its input is imperfect —
//! backends fall back to each other, JSON is recovered through a repair
//! ladder, fields are normalized and cross-checked, and every record carries
//! a quality score so callers can decide what to trust.
//!
//! ## Pipeline Overview
//!
//! ```text
//! document text
//!  │
//!  ├─ 1. Classify   keyword + pattern scoring → invoice / resume / unknown
//!  ├─ 2. Prompt     type-specific system + user prompts, text truncated
//!  ├─ 3. Infer      gateway: primary backend w/ retry+backoff, then fallback
//!  ├─ 4. Recover    JSON from fences, prose, or repaired syntax
//!  ├─ 5. Normalize  ISO dates, plain amounts, pinned currency, line items
//!  ├─ 6. Score      field validators + weighted aggregate, validity gate
//!  └─ 7. Assemble   ExtractionRecord with confidence map and metadata
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docsift::{DocumentInput, ExtractionConfig, Extractor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Mode, hosts, and models resolve from DOCSIFT_* / OLLAMA_* env vars.
//!     let config = ExtractionConfig::from_env()?;
//!     let extractor = Extractor::new(config)?;
//!
//!     let doc = DocumentInput::new(std::fs::read_to_string("invoice.txt")?, "invoice.txt");
//!     let record = extractor.extract(&doc, None).await;
//!     println!("{}", serde_json::to_string_pretty(&record)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docsift` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! docsift = { version = "0.1", default-features = false }
//! ```
//!
//! ## Failure model
//!
//! [`Extractor::extract`] never returns an error: per-document failures
//! become failed [`ExtractionRecord`]s with a stable `error.code`
//! (`LLM_TIMEOUT`, `PARSE_FAILURE`, `VALIDATION_FAILURE`, …), and a batch of
//! N documents always produces N records in input order.

pub mod classify;
pub mod config;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod pipeline;
pub mod prompts;

pub use classify::{DetectionResult, DocumentType, TextClassifier};
pub use config::{ExtractionConfig, InferenceMode};
pub use error::{ExtractError, InferenceError};
pub use extract::{DocumentInput, ExtractionMetadata, ExtractionRecord, Extractor};
pub use gateway::{
    CloudBackend, CompletionBackend, GatewayHealth, InferenceGateway, InferenceRequest,
    InferenceResponse, OllamaBackend,
};
pub use pipeline::recover::{parse_completion, ParseResult};
pub use pipeline::score::{QualityScorer, Severity, ValidationSummary};
