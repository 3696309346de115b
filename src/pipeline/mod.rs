//! Post-inference pipeline stages.
//!
//! A raw model completion passes through three stages before it becomes part
//! of an [`crate::ExtractionRecord`]:
//!
//! 1. [`recover`] — pull a JSON object out of the completion, tolerating
//!    markdown fences, surrounding prose, and common syntax mistakes.
//! 2. [`normalize`] — canonicalise dates, amounts, currencies, and line
//!    items, and reconcile arithmetic (line totals, subtotal, grand total).
//! 3. [`score`] — validate field plausibility and aggregate a weighted
//!    quality score that decides whether the extraction is accepted.
//!
//! Each stage is a pure function over `serde_json` values, so the stages are
//! testable in isolation and the orchestrator in [`crate::extract`] stays a
//! thin sequencing layer.

pub mod normalize;
pub mod recover;
pub mod score;
