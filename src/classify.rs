//! Document type classification from extracted text.
//!
//! ## Why not ask the model?
//!
//! Classification decides which prompt template the orchestrator sends, so it
//! must run *before* any inference call. A deterministic weighted-scoring pass
//! over keyword and regex tables is free, instant, fully explainable (the
//! matched keywords and patterns are retained in the result), and — unlike a
//! model round trip — gives the same answer for the same text every time.
//!
//! ## Scoring
//!
//! Per type: keywords contribute `w + w·0.5·min(count−1, 3)` each (diminishing
//! returns after four occurrences), patterns contribute
//! `w·(1 + (min(matches, 5)−1)·0.3)` each. The totals combine 60/40
//! (keywords/patterns) and are normalised by [`SCORE_CEILING`] into a [0, 1]
//! confidence. The winner must reach the configured minimum; otherwise the
//! result is [`DocumentType::Unknown`].

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Supported document types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Invoice,
    Resume,
    Unknown,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Invoice => "invoice",
            DocumentType::Resume => "resume",
            DocumentType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of document type detection. Created once per call, never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionResult {
    pub document_type: DocumentType,
    /// Normalised confidence in [0, 1]. Not a calibrated probability.
    pub confidence: f64,
    /// Keywords that matched the winning type (≤ 10, table order).
    pub matched_keywords: Vec<String>,
    /// First match of each pattern that hit, truncated to 50 chars (≤ 5).
    pub matched_patterns: Vec<String>,
    /// Per-type normalised confidence, for explainability.
    pub scores: BTreeMap<&'static str, f64>,
}

impl DetectionResult {
    /// A synthetic result for a caller-forced type (detection skipped).
    pub fn forced(doc_type: DocumentType) -> Self {
        let mut scores = BTreeMap::new();
        scores.insert(doc_type.as_str(), 1.0);
        Self {
            document_type: doc_type,
            confidence: 1.0,
            matched_keywords: Vec::new(),
            matched_patterns: Vec::new(),
            scores,
        }
    }
}

// ── Detection tables ─────────────────────────────────────────────────────
//
// Weights are relative importance, not probabilities. Slices (not maps) so
// iteration order is fixed and classification stays deterministic.

const INVOICE_KEYWORDS: &[(&str, f64)] = &[
    // Highly invoice-specific
    ("invoice", 3.0),
    ("invoice number", 3.0),
    ("invoice #", 3.0),
    ("inv-", 2.5),
    ("invoice date", 2.5),
    ("due date", 2.0),
    ("payment terms", 2.0),
    ("bill to", 2.5),
    ("ship to", 1.5),
    ("purchase order", 2.0),
    ("po number", 2.0),
    ("po #", 2.0),
    // Money
    ("subtotal", 2.0),
    ("total amount", 2.0),
    ("grand total", 2.0),
    ("balance due", 2.5),
    ("amount due", 2.5),
    ("tax", 1.5),
    ("vat", 1.5),
    ("gst", 1.5),
    ("discount", 1.0),
    ("shipping", 1.0),
    // Common but not exclusive
    ("quantity", 1.0),
    ("qty", 1.0),
    ("unit price", 1.5),
    ("rate", 0.8),
    ("description", 0.5),
    ("item", 0.5),
    ("payment", 1.0),
    ("remit", 1.5),
    ("vendor", 1.5),
    ("supplier", 1.5),
];

const RESUME_KEYWORDS: &[(&str, f64)] = &[
    // Highly resume-specific
    ("resume", 3.5),
    ("curriculum vitae", 3.5),
    ("cv", 2.5),
    ("career objective", 3.0),
    ("professional summary", 3.0),
    ("work experience", 3.5),
    ("professional experience", 3.5),
    ("employment history", 3.0),
    ("work history", 3.0),
    // Sections
    ("education", 2.5),
    ("skills", 2.5),
    ("technical skills", 3.0),
    ("core competencies", 2.5),
    ("key skills", 2.5),
    ("certifications", 2.5),
    ("certificates", 2.0),
    ("qualifications", 2.0),
    ("references", 2.0),
    ("references available", 2.5),
    ("achievements", 2.0),
    ("accomplishments", 2.0),
    ("projects", 2.0),
    ("personal projects", 2.5),
    // Education
    ("bachelor", 2.0),
    ("master", 2.0),
    ("degree", 2.0),
    ("university", 1.5),
    ("college", 1.5),
    ("gpa", 2.0),
    ("cgpa", 2.0),
    ("graduated", 1.5),
    ("graduation", 1.5),
    // Experience phrasing
    ("proficient", 1.5),
    ("experienced in", 2.0),
    ("responsible for", 1.5),
    ("years of experience", 2.5),
    ("yrs experience", 2.5),
    // Contact
    ("linkedin", 2.5),
    ("github", 2.0),
    ("portfolio", 2.0),
    // Languages
    ("languages", 1.5),
    ("fluent", 1.5),
    ("native speaker", 2.0),
    // Job hunting
    ("seeking position", 2.5),
    ("looking for opportunities", 2.5),
    ("career goals", 2.0),
];

static INVOICE_PATTERNS: Lazy<Vec<(Regex, f64)>> = Lazy::new(|| {
    compile_patterns(&[
        // Invoice number
        (r"inv(?:oice)?[\s\-#:]*(?:no\.?|number)?[\s\-#:]*[A-Z0-9\-]+", 2.5),
        (r"#\s*\d{4,}", 1.0),
        // Dates in invoice context
        (r"(?:invoice|due|payment)\s*date\s*[:\-]?\s*\d", 2.0),
        // Currency amounts
        (r"\$[\d,]+\.?\d*", 1.5),
        (r"(?:USD|EUR|GBP|CAD)\s*[\d,]+\.?\d*", 1.5),
        // Line items (qty x price)
        (r"\d+\s*(?:x|@)\s*\$?[\d,]+\.?\d*", 1.5),
        // Totals
        (r"(?:sub)?total\s*[:\-]?\s*\$?[\d,]+\.?\d*", 2.0),
        // Tax
        (r"tax\s*\(?[\d.]+%?\)?", 1.5),
    ])
});

static RESUME_PATTERNS: Lazy<Vec<(Regex, f64)>> = Lazy::new(|| {
    compile_patterns(&[
        // Email
        (r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}", 1.5),
        // Phone
        (r"(?:\+\d{1,3}[\s\-]?)?\(?\d{3}\)?[\s\-]?\d{3}[\s\-]?\d{4}", 1.0),
        // Profile URLs
        (r"linkedin\.com/in/[\w\-]+", 2.0),
        (r"github\.com/[\w\-]+", 1.5),
        // Employment/education periods
        (r"(?:19|20)\d{2}\s*[-–]\s*(?:(?:19|20)\d{2}|present|current)", 2.0),
        // Degrees
        (r"(?:B\.?S\.?|B\.?A\.?|M\.?S\.?|M\.?A\.?|Ph\.?D\.?|MBA)", 2.0),
        // GPA
        (r"GPA\s*[:\-]?\s*[0-4]\.\d+", 2.0),
    ])
});

fn compile_patterns(raw: &[(&str, f64)]) -> Vec<(Regex, f64)> {
    raw.iter()
        .map(|(pat, w)| {
            let re = RegexBuilder::new(pat)
                .case_insensitive(true)
                .build()
                .unwrap_or_else(|e| panic!("invalid detection pattern '{pat}': {e}"));
            (re, *w)
        })
        .collect()
}

/// Empirical ceiling that maps combined weighted scores into [0, 1].
///
/// Not derived from a calibrated corpus — a keyword-dense document of either
/// type saturates at 1.0 well before exhausting the tables. Treat this as a
/// tunable, and validate any change against labelled samples.
pub const SCORE_CEILING: f64 = 15.0;

/// Deterministic keyword/pattern classifier.
#[derive(Debug, Clone)]
pub struct TextClassifier {
    min_confidence: f64,
}

impl Default for TextClassifier {
    fn default() -> Self {
        Self { min_confidence: 0.3 }
    }
}

impl TextClassifier {
    /// Create a classifier with a custom minimum confidence.
    pub fn new(min_confidence: f64) -> Self {
        Self {
            min_confidence: min_confidence.clamp(0.0, 1.0),
        }
    }

    /// Classify whitespace-normalised document text.
    pub fn classify(&self, text: &str) -> DetectionResult {
        let text_lower = text.to_lowercase();

        let (invoice_kw_score, invoice_keywords) = keyword_score(&text_lower, INVOICE_KEYWORDS);
        let (resume_kw_score, resume_keywords) = keyword_score(&text_lower, RESUME_KEYWORDS);

        let (invoice_pat_score, invoice_patterns) = pattern_score(text, &INVOICE_PATTERNS);
        let (resume_pat_score, resume_patterns) = pattern_score(text, &RESUME_PATTERNS);

        // Keywords 60%, patterns 40%
        let invoice_total = invoice_kw_score * 0.6 + invoice_pat_score * 0.4;
        let resume_total = resume_kw_score * 0.6 + resume_pat_score * 0.4;

        let invoice_conf = (invoice_total / SCORE_CEILING).clamp(0.0, 1.0);
        let resume_conf = (resume_total / SCORE_CEILING).clamp(0.0, 1.0);

        let mut scores = BTreeMap::new();
        scores.insert(DocumentType::Invoice.as_str(), invoice_conf);
        scores.insert(DocumentType::Resume.as_str(), resume_conf);

        // Ties favour the first-registered type (invoice).
        let (document_type, confidence, mut matched_keywords, mut matched_patterns) =
            if invoice_conf >= resume_conf && invoice_conf >= self.min_confidence {
                (DocumentType::Invoice, invoice_conf, invoice_keywords, invoice_patterns)
            } else if resume_conf > invoice_conf && resume_conf >= self.min_confidence {
                (DocumentType::Resume, resume_conf, resume_keywords, resume_patterns)
            } else {
                (
                    DocumentType::Unknown,
                    invoice_conf.max(resume_conf),
                    Vec::new(),
                    Vec::new(),
                )
            };

        matched_keywords.truncate(10);
        matched_patterns.truncate(5);

        tracing::debug!(
            doc_type = %document_type,
            confidence = format!("{confidence:.3}"),
            "document type detected"
        );

        DetectionResult {
            document_type,
            confidence,
            matched_keywords,
            matched_patterns,
            scores,
        }
    }

    /// Quick check whether text is likely an invoice.
    pub fn is_invoice(&self, text: &str) -> bool {
        let result = Self::new(0.0).classify(text);
        result.document_type == DocumentType::Invoice && result.confidence >= 0.5
    }

    /// Quick check whether text is likely a résumé.
    pub fn is_resume(&self, text: &str) -> bool {
        let result = Self::new(0.0).classify(text);
        result.document_type == DocumentType::Resume && result.confidence >= 0.5
    }
}

/// Sum weighted keyword hits over lowercased text.
///
/// The first occurrence earns the full weight; each further occurrence adds
/// half weight, capped after four total.
fn keyword_score(text_lower: &str, keywords: &[(&str, f64)]) -> (f64, Vec<String>) {
    let mut total = 0.0;
    let mut matched = Vec::new();

    for (keyword, weight) in keywords {
        let count = text_lower.matches(keyword).count();
        if count > 0 {
            total += weight + weight * 0.5 * (count as f64 - 1.0).min(3.0);
            matched.push((*keyword).to_string());
        }
    }

    (total, matched)
}

/// Sum weighted pattern hits over the original-case text.
///
/// Match count caps at 5; the first match of each pattern is kept (truncated)
/// as an explainability example.
fn pattern_score(text: &str, patterns: &[(Regex, f64)]) -> (f64, Vec<String>) {
    let mut total = 0.0;
    let mut matched = Vec::new();

    for (re, weight) in patterns {
        let mut count = 0usize;
        let mut example: Option<&str> = None;
        for m in re.find_iter(text) {
            if example.is_none() {
                example = Some(m.as_str());
            }
            count += 1;
            if count >= 5 {
                break;
            }
        }
        if count > 0 {
            total += weight * (1.0 + (count as f64 - 1.0) * 0.3);
            if let Some(ex) = example {
                matched.push(ex.chars().take(50).collect());
            }
        }
    }

    (total, matched)
}
