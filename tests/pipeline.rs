//! End-to-end pipeline tests with scripted completion backends.
//!
//! No network: fake backends implement `CompletionBackend` and return
//! canned completions keyed off the prompt, exercising the real classify →
//! prompt → infer → recover → normalize → score path.

use async_trait::async_trait;
use docsift::{
    CompletionBackend, DocumentInput, DocumentType, ExtractionConfig, Extractor, InferenceError,
    InferenceGateway, InferenceRequest, InferenceResponse,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

const INVOICE_TEXT: &str = "\
INVOICE #INV-2024-001
Invoice Date: 03/15/2024
Due Date: 04/14/2024

Bill To: Globex Inc
Payment Terms: Net 30

Description       Qty    Unit Price    Amount
Widget            3      $10.00        $30.00

Subtotal: $30.00
Tax: $3.00
Total Amount Due: $33.00";

const RESUME_TEXT: &str = "\
Jane Doe
jane.doe@example.com | +1 555 0100 | linkedin.com/in/janedoe

Professional Summary
Software engineer with 8 years of experience building backend services.

Work Experience
Senior Engineer, Initech (2019 - Present)

Education
B.S. Computer Science, State University, GPA 3.8

Technical Skills: Rust, Python, PostgreSQL";

const INVOICE_JSON: &str = r#"{
    "vendor_name": "Acme Corp",
    "invoice_number": "INV-2024-001",
    "invoice_date": "2024-03-15",
    "currency": "USD",
    "line_items": [
        {"description": "Widget", "quantity": 3, "unit_price": 10.0, "amount": 30.0}
    ],
    "subtotal": 30.0,
    "tax_amount": 3.0,
    "total_amount": 33.0
}"#;

const RESUME_JSON: &str = r#"{
    "candidate_name": "Jane Doe",
    "email": "jane.doe@example.com",
    "phone": "+1 555 0100",
    "skills": ["Rust", "Python", "PostgreSQL"]
}"#;

/// Backend that picks its completion by inspecting the prompt.
struct PromptKeyedBackend {
    provider: &'static str,
    calls: AtomicU32,
}

impl PromptKeyedBackend {
    fn new(provider: &'static str) -> Arc<Self> {
        Arc::new(Self {
            provider,
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl CompletionBackend for PromptKeyedBackend {
    fn provider(&self) -> &str {
        self.provider
    }

    fn model(&self) -> &str {
        "fake-model"
    }

    async fn generate(
        &self,
        request: &InferenceRequest,
    ) -> Result<InferenceResponse, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Keyed on the prompt template, so forced types get the matching
        // payload regardless of what the document text looks like.
        let content = if request.prompt.contains("POISON") {
            "I could not find any structured data, sorry.".to_string()
        } else if request.prompt.contains("resume data") {
            RESUME_JSON.to_string()
        } else {
            INVOICE_JSON.to_string()
        };
        Ok(InferenceResponse {
            content,
            provider: self.provider.to_string(),
            model: "fake-model".to_string(),
            duration_ms: 12.0,
            prompt_tokens: 100,
            completion_tokens: 50,
            total_tokens: 150,
        })
    }

    async fn health_check(&self) -> bool {
        true
    }
}

/// Backend that always fails the same way.
struct FailingBackend {
    calls: AtomicU32,
}

#[async_trait]
impl CompletionBackend for FailingBackend {
    fn provider(&self) -> &str {
        "broken"
    }

    fn model(&self) -> &str {
        "none"
    }

    async fn generate(
        &self,
        _request: &InferenceRequest,
    ) -> Result<InferenceResponse, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(InferenceError::Timeout {
            provider: "broken".to_string(),
            timeout_secs: 1,
            elapsed: Duration::from_secs(1),
        })
    }

    async fn health_check(&self) -> bool {
        false
    }
}

fn extractor_with(backend: Arc<dyn CompletionBackend>) -> Extractor {
    let gateway = Arc::new(InferenceGateway::new(backend, None, 1));
    Extractor::with_gateway(ExtractionConfig::default(), gateway)
}

#[tokio::test]
async fn invoice_text_yields_valid_record() {
    let extractor = extractor_with(PromptKeyedBackend::new("fake"));
    let doc = DocumentInput::new(INVOICE_TEXT, "invoice.txt");

    let record = extractor.extract(&doc, None).await;

    assert!(record.success, "error: {:?}", record.error);
    assert_eq!(record.document_type, DocumentType::Invoice);
    assert_eq!(record.extracted_fields["invoice_number"], "INV-2024-001");
    assert_eq!(record.extracted_fields["total_amount"], 33.0);

    let validation = record.validation.expect("validation present on success");
    assert!(validation.is_valid);
    assert_eq!(validation.critical_issues, 0);

    assert!(record.confidence_scores["overall"] >= 0.5);
    assert!(record.missing_fields.is_empty(), "missing: {:?}", record.missing_fields);

    let metadata = record.metadata.expect("metadata present on success");
    assert_eq!(metadata.provider, "fake");
    assert!(!metadata.was_repaired);
    assert!(metadata.detection_confidence > 0.5);
}

#[tokio::test]
async fn resume_text_is_classified_and_extracted() {
    let extractor = extractor_with(PromptKeyedBackend::new("fake"));
    let doc = DocumentInput::new(RESUME_TEXT, "cv.txt");

    let record = extractor.extract(&doc, None).await;

    assert!(record.success, "error: {:?}", record.error);
    assert_eq!(record.document_type, DocumentType::Resume);
    assert_eq!(record.extracted_fields["candidate_name"], "Jane Doe");
    assert!(record.validation.unwrap().is_valid);
}

#[tokio::test]
async fn force_type_skips_classification() {
    let extractor = extractor_with(PromptKeyedBackend::new("fake"));
    // Resume-looking text forced through the invoice path.
    let doc = DocumentInput::new(RESUME_TEXT, "cv.txt");

    let record = extractor.extract(&doc, Some(DocumentType::Invoice)).await;

    assert_eq!(record.document_type, DocumentType::Invoice);
    let metadata = record.metadata.expect("metadata present");
    assert_eq!(metadata.detection_confidence, 1.0);
}

#[tokio::test]
async fn batch_preserves_order_and_isolates_failures() {
    let extractor = extractor_with(PromptKeyedBackend::new("fake"));
    let docs = vec![
        DocumentInput::new(INVOICE_TEXT, "a.txt"),
        DocumentInput::new(format!("{INVOICE_TEXT}\nPOISON"), "b.txt"),
        DocumentInput::new(INVOICE_TEXT, "c.txt"),
    ];

    let records = extractor.extract_batch(&docs, None).await;

    assert_eq!(records.len(), 3, "one record per input, always");
    assert!(records[0].success);
    assert!(!records[1].success);
    assert!(records[2].success);
    assert_eq!(records[1].error.as_ref().map(|e| e.code), Some("PARSE_FAILURE"));
    assert_eq!(
        records[0].metadata.as_ref().map(|m| m.file_name.as_str()),
        Some("a.txt")
    );
    assert_eq!(
        records[2].metadata.as_ref().map(|m| m.file_name.as_str()),
        Some("c.txt")
    );
}

#[tokio::test]
async fn empty_document_fails_without_inference() {
    let backend = PromptKeyedBackend::new("fake");
    let extractor = extractor_with(backend.clone());
    let doc = DocumentInput::new("   \n\t", "empty.txt");

    let record = extractor.extract(&doc, None).await;

    assert!(!record.success);
    assert_eq!(record.error.as_ref().map(|e| e.code), Some("EMPTY_DOCUMENT"));
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0, "no model call for empty text");
}

#[tokio::test]
async fn fallback_backend_carries_the_extraction() {
    let primary = Arc::new(FailingBackend {
        calls: AtomicU32::new(0),
    });
    let fallback = PromptKeyedBackend::new("rescue");
    let gateway = Arc::new(InferenceGateway::new(primary.clone(), Some(fallback), 2));
    let extractor = Extractor::with_gateway(ExtractionConfig::default(), gateway);

    let record = extractor
        .extract(&DocumentInput::new(INVOICE_TEXT, "invoice.txt"), None)
        .await;

    assert!(record.success, "error: {:?}", record.error);
    assert_eq!(record.metadata.unwrap().provider, "rescue");
    assert!(primary.calls.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn total_backend_failure_yields_failed_record() {
    let primary = Arc::new(FailingBackend {
        calls: AtomicU32::new(0),
    });
    let gateway = Arc::new(InferenceGateway::new(primary, None, 1));
    let config = ExtractionConfig::builder()
        .extract_attempts(1)
        .build()
        .expect("valid config");
    let extractor = Extractor::with_gateway(config, gateway);

    let record = extractor
        .extract(&DocumentInput::new(INVOICE_TEXT, "invoice.txt"), None)
        .await;

    assert!(!record.success);
    assert_eq!(record.error.as_ref().map(|e| e.code), Some("LLM_TIMEOUT"));
    assert_eq!(record.document_type, DocumentType::Invoice, "detection still ran");
}

/// Backend that wraps its completion in a fenced block with a trailing
/// comma, forcing the recovery ladder through the repair path.
struct SloppyBackend;

#[async_trait]
impl CompletionBackend for SloppyBackend {
    fn provider(&self) -> &str {
        "sloppy"
    }

    fn model(&self) -> &str {
        "fake-model"
    }

    async fn generate(
        &self,
        _request: &InferenceRequest,
    ) -> Result<InferenceResponse, InferenceError> {
        let content = format!(
            "Here is the JSON you asked for:\n```json\n{}\n```",
            INVOICE_JSON.trim_end_matches('}').to_string() + ",}"
        );
        Ok(InferenceResponse {
            content,
            provider: "sloppy".to_string(),
            model: "fake-model".to_string(),
            duration_ms: 8.0,
            prompt_tokens: 80,
            completion_tokens: 40,
            total_tokens: 120,
        })
    }

    async fn health_check(&self) -> bool {
        true
    }
}

#[tokio::test]
async fn repaired_json_is_flagged_in_metadata() {
    let extractor = extractor_with(Arc::new(SloppyBackend));

    let record = extractor
        .extract(&DocumentInput::new(INVOICE_TEXT, "invoice.txt"), None)
        .await;

    assert!(record.success, "error: {:?}", record.error);
    assert!(record.metadata.unwrap().was_repaired);
    assert_eq!(record.extracted_fields["invoice_number"], "INV-2024-001");
}
