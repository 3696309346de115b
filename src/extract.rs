//! Extraction orchestrator: the pipeline from raw text to a scored record.
//!
//! Stages, in order: classify (or accept a forced type) → format the
//! type-specific prompt → infer through the gateway → recover a JSON object
//! → normalize fields → validate and score → assemble the record.
//!
//! Per-document failures never escape: [`Extractor::extract`] converts any
//! stage error into a failed [`ExtractionRecord`] carrying a stable error
//! code, so a batch of N inputs always yields N records and one poisoned
//! document cannot sink its batch.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::classify::{DetectionResult, DocumentType, TextClassifier};
use crate::config::ExtractionConfig;
use crate::error::{ExtractError, InferenceError};
use crate::gateway::{InferenceGateway, InferenceRequest};
use crate::pipeline::normalize::{normalize_generic, normalize_invoice, NormalizeOutcome};
use crate::pipeline::recover::{parse_completion, ParseResult};
use crate::pipeline::score::{required_fields_for, QualityScorer, ValidationSummary};
use crate::prompts::format_extraction_prompt;

const PREVIEW_LEN: usize = 500;

/// One document's text plus source metadata carried into the record.
#[derive(Debug, Clone)]
pub struct DocumentInput {
    pub text: String,
    pub file_name: String,
    pub page_count: u32,
    pub is_scanned: bool,
}

impl DocumentInput {
    pub fn new(text: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            file_name: file_name.into(),
            page_count: 1,
            is_scanned: false,
        }
    }

    pub fn with_pages(mut self, page_count: u32, is_scanned: bool) -> Self {
        self.page_count = page_count;
        self.is_scanned = is_scanned;
        self
    }
}

/// How the extraction ran, attached to every successful record.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionMetadata {
    pub file_name: String,
    pub pages_processed: u32,
    pub is_scanned: bool,
    pub processing_time_ms: f64,
    pub provider: String,
    pub model: String,
    pub document_type: DocumentType,
    pub detection_confidence: f64,
    pub llm_duration_ms: f64,
    pub tokens_per_second: f64,
    pub was_repaired: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorInfo {
    pub code: &'static str,
    pub message: String,
}

/// Terminal outcome for one document, success or not.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionRecord {
    pub success: bool,
    pub document_type: DocumentType,
    pub extracted_fields: Map<String, Value>,
    pub missing_fields: Vec<String>,
    pub confidence_scores: HashMap<String, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ExtractionMetadata>,
    pub raw_text_preview: String,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl ExtractionRecord {
    fn failed(doc_type: DocumentType, preview: String, err: &ExtractError) -> Self {
        Self {
            success: false,
            document_type: doc_type,
            extracted_fields: Map::new(),
            missing_fields: Vec::new(),
            confidence_scores: HashMap::new(),
            validation: None,
            metadata: None,
            raw_text_preview: preview,
            warnings: Vec::new(),
            error: Some(ErrorInfo {
                code: err.code(),
                message: err.to_string(),
            }),
        }
    }
}

/// Drives the full pipeline. One instance serves many documents; batches
/// run concurrently over the shared gateway.
pub struct Extractor {
    gateway: Arc<InferenceGateway>,
    classifier: TextClassifier,
    scorer: QualityScorer,
    config: ExtractionConfig,
}

impl Extractor {
    /// Build an extractor with backends derived from the configuration.
    pub fn new(config: ExtractionConfig) -> Result<Self, ExtractError> {
        config.validate()?;
        let gateway = Arc::new(InferenceGateway::from_config(&config)?);
        Ok(Self::with_gateway(config, gateway))
    }

    /// Build an extractor around a pre-assembled gateway. The test seam.
    pub fn with_gateway(config: ExtractionConfig, gateway: Arc<InferenceGateway>) -> Self {
        let classifier = TextClassifier::new(config.min_detection_confidence);
        let scorer = QualityScorer::new(config.min_validation_score, config.fail_on_critical);
        Self {
            gateway,
            classifier,
            scorer,
            config,
        }
    }

    /// Extract one document. Never errors: failures become a failed record.
    pub async fn extract(
        &self,
        doc: &DocumentInput,
        force_type: Option<DocumentType>,
    ) -> ExtractionRecord {
        let started = Instant::now();
        info!(file = doc.file_name.as_str(), "extraction pipeline started");

        let detection = if doc.text.trim().is_empty() {
            DetectionResult::forced(DocumentType::Unknown)
        } else {
            match force_type {
                Some(doc_type) => DetectionResult::forced(doc_type),
                None => self.classifier.classify(&doc.text),
            }
        };

        match self.run(doc, &detection, started).await {
            Ok(record) => record,
            Err(err) => {
                warn!(
                    file = doc.file_name.as_str(),
                    code = err.code(),
                    error = %err,
                    "extraction failed"
                );
                ExtractionRecord::failed(detection.document_type, preview(&doc.text), &err)
            }
        }
    }

    /// Blocking wrapper around [`extract`](Self::extract). Creates its own
    /// runtime; do not call from inside an async context.
    pub fn extract_sync(
        &self,
        doc: &DocumentInput,
        force_type: Option<DocumentType>,
    ) -> Result<ExtractionRecord, ExtractError> {
        let runtime = tokio::runtime::Runtime::new()
            .map_err(|e| ExtractError::InvalidConfig(format!("failed to create runtime: {e}")))?;
        Ok(runtime.block_on(self.extract(doc, force_type)))
    }

    /// Extract a batch concurrently. Output order matches input order and
    /// the result always has exactly one record per input.
    pub async fn extract_batch(
        &self,
        docs: &[DocumentInput],
        force_type: Option<DocumentType>,
    ) -> Vec<ExtractionRecord> {
        let concurrency = self.config.concurrency.max(1);
        info!(count = docs.len(), concurrency, "batch extraction started");

        let mut indexed: Vec<(usize, ExtractionRecord)> = stream::iter(docs.iter().enumerate())
            .map(|(i, doc)| async move { (i, self.extract(doc, force_type).await) })
            .buffer_unordered(concurrency)
            .collect()
            .await;
        indexed.sort_by_key(|(i, _)| *i);

        let records: Vec<ExtractionRecord> = indexed.into_iter().map(|(_, r)| r).collect();
        let succeeded = records.iter().filter(|r| r.success).count();
        info!(
            total = records.len(),
            succeeded,
            failed = records.len() - succeeded,
            "batch extraction finished"
        );
        records
    }

    async fn run(
        &self,
        doc: &DocumentInput,
        detection: &DetectionResult,
        started: Instant,
    ) -> Result<ExtractionRecord, ExtractError> {
        if doc.text.trim().is_empty() {
            return Err(ExtractError::EmptyDocument);
        }

        let doc_type = detection.document_type;
        debug!(
            doc_type = doc_type.as_str(),
            confidence = detection.confidence,
            "document classified"
        );

        let (system, user) =
            format_extraction_prompt(doc_type, &doc.text, self.config.max_text_length);
        let request = InferenceRequest::new(user)
            .with_system(system)
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens)
            .with_json_mode(true);

        let response = self.infer(&request).await?;
        let parsed = self.recover(&response.content)?;
        let was_repaired = parsed.was_repaired;
        let data = parsed.data.unwrap_or_default();

        let outcome = match doc_type {
            DocumentType::Invoice => {
                normalize_invoice(data, &doc.text, &self.config.default_currency)
            }
            _ => normalize_generic(data),
        };
        let NormalizeOutcome {
            data,
            mut warnings,
            corrections,
            adjustments,
        } = outcome;
        for correction in &corrections {
            debug!(correction = correction.as_str(), "field corrected");
        }

        let summary = self.scorer.validate(doc_type, &data);
        if !summary.is_valid {
            return Err(ExtractError::ValidationFailure {
                score: summary.overall_score,
                critical_issues: summary.critical_issues,
            });
        }

        let missing_fields: Vec<String> = required_fields_for(doc_type)
            .iter()
            .filter(|f| !matches!(data.get(**f), Some(v) if !v.is_null()))
            .map(|f| f.to_string())
            .collect();
        for field in &missing_fields {
            warnings.push(format!("Field '{field}' is missing"));
        }

        let confidence_scores = self.scorer.confidence_scores(
            &data,
            doc_type,
            &summary,
            detection.confidence,
            &adjustments,
        );

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        let metadata = ExtractionMetadata {
            file_name: doc.file_name.clone(),
            pages_processed: doc.page_count,
            is_scanned: doc.is_scanned,
            processing_time_ms: elapsed_ms,
            provider: response.provider.clone(),
            model: response.model.clone(),
            document_type: doc_type,
            detection_confidence: detection.confidence,
            llm_duration_ms: response.duration_ms,
            tokens_per_second: response.tokens_per_second(),
            was_repaired,
        };

        info!(
            file = doc.file_name.as_str(),
            doc_type = doc_type.as_str(),
            fields = data.len(),
            score = summary.overall_score,
            elapsed_ms,
            "extraction complete"
        );

        Ok(ExtractionRecord {
            success: true,
            document_type: doc_type,
            extracted_fields: data,
            missing_fields,
            confidence_scores,
            validation: Some(summary),
            metadata: Some(metadata),
            raw_text_preview: preview(&doc.text),
            warnings,
            error: None,
        })
    }

    /// Inference with pipeline-level attempts on top of the gateway's own
    /// retry/fallback protocol. A fresh attempt here means a fresh pass
    /// through primary and fallback both.
    async fn infer(
        &self,
        request: &InferenceRequest,
    ) -> Result<crate::gateway::InferenceResponse, ExtractError> {
        let attempts = self.config.extract_attempts.max(1);
        let mut last_err: Option<InferenceError> = None;

        for attempt in 0..attempts {
            match self.gateway.generate(request).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    warn!(attempt = attempt + 1, attempts, error = %e, "inference attempt failed");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err
            .unwrap_or(InferenceError::NotConfigured {
                provider: "none".into(),
                hint: "no inference attempt ran".into(),
            })
            .into())
    }

    fn recover(&self, content: &str) -> Result<ParseResult, ExtractError> {
        let parsed = parse_completion(content);
        if !parsed.success {
            return Err(ExtractError::ParseFailure {
                detail: parsed
                    .error
                    .unwrap_or_else(|| "unparseable completion".into()),
                snippet: parsed.raw_response,
            });
        }
        Ok(parsed)
    }

    /// Health snapshot of the underlying gateway.
    pub async fn health_check(&self) -> crate::gateway::GatewayHealth {
        self.gateway.health_check().await
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_LEN {
        let head: String = text.chars().take(PREVIEW_LEN).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_is_bounded() {
        let text = "a".repeat(600);
        let p = preview(&text);
        assert_eq!(p.chars().count(), 503);
        assert!(p.ends_with("..."));
        assert_eq!(preview("short"), "short");
    }

    #[test]
    fn document_input_builder() {
        let doc = DocumentInput::new("text", "scan.pdf").with_pages(4, true);
        assert_eq!(doc.page_count, 4);
        assert!(doc.is_scanned);
    }

    #[test]
    fn failed_record_shape() {
        let err = ExtractError::EmptyDocument;
        let record = ExtractionRecord::failed(DocumentType::Unknown, String::new(), &err);
        assert!(!record.success);
        assert!(record.extracted_fields.is_empty());
        let info = record.error.unwrap();
        assert_eq!(info.code, "EMPTY_DOCUMENT");
    }
}
