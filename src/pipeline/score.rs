//! Quality scoring for normalized extraction data.
//!
//! Runs after normalization, so amounts are numbers and dates are ISO
//! strings. Field-level validators produce plausibility scores and issues
//! at three severities; the aggregate is a weighted mean of field scores
//! minus a capped penalty per issue. Validity requires both a clean
//! critical count (unless configured otherwise) and an aggregate at or
//! above the threshold.

use chrono::{NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::classify::DocumentType;
use crate::pipeline::normalize::AMOUNT_TOLERANCE;

/// Issue severities, ordered by impact on the aggregate score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldConfidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationIssue {
    pub field_name: String,
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldScore {
    pub field_name: String,
    pub score: f64,
    pub confidence: FieldConfidence,
    pub extracted_value: String,
}

/// Full validation outcome for one document.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationSummary {
    pub is_valid: bool,
    pub overall_score: f64,
    pub field_scores: Vec<FieldScore>,
    pub issues: Vec<ValidationIssue>,
    pub critical_issues: usize,
    pub warning_issues: usize,
    pub fields_extracted: usize,
    pub fields_expected: usize,
}

static IDENTIFIER_CHARSET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9\-_/]+$").unwrap_or_else(|e| panic!("identifier regex: {e}"))
});

const COMMON_CURRENCIES: &[&str] = &["USD", "EUR", "GBP", "CAD", "AUD", "INR"];

/// Fields the invoice validator tracks for the extracted/expected ratio.
const TRACKED_INVOICE_FIELDS: &[&str] = &[
    "invoice_number",
    "total_amount",
    "invoice_date",
    "vendor_name",
    "subtotal",
    "tax_amount",
    "line_items",
];

/// Amounts above this get an "unusually large" flag.
const LARGE_AMOUNT: f64 = 10_000_000.0;

/// Fields whose absence fails a document outright, per type. The broader
/// required set used for confidence reporting lives in
/// [`required_fields_for`].
fn critical_fields_for(doc_type: DocumentType) -> &'static [&'static str] {
    match doc_type {
        DocumentType::Invoice => &["invoice_number", "total_amount"],
        DocumentType::Resume => &["candidate_name"],
        DocumentType::Unknown => &[],
    }
}

/// Required fields per document type, reported as `missing_fields` and
/// scored into the confidence map.
pub fn required_fields_for(doc_type: DocumentType) -> &'static [&'static str] {
    match doc_type {
        DocumentType::Invoice => &["vendor_name", "invoice_number", "invoice_date", "total_amount"],
        DocumentType::Resume => &["candidate_name", "email", "phone"],
        DocumentType::Unknown => &[],
    }
}

fn field_weight(name: &str) -> f64 {
    match name {
        "invoice_number" | "total_amount" => 1.0,
        "invoice_date" | "vendor_name" => 0.8,
        "subtotal" => 0.7,
        "tax_amount" => 0.6,
        "customer_name" | "line_items" => 0.5,
        "payment_terms" => 0.4,
        "notes" | "reference_number" => 0.2,
        _ => 0.5,
    }
}

fn present(data: &Map<String, Value>, field: &str) -> bool {
    match data.get(field) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(_) => true,
    }
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

fn title_case(field: &str) -> String {
    field
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Validates normalized extraction data and aggregates a quality score.
#[derive(Debug, Clone)]
pub struct QualityScorer {
    min_score: f64,
    fail_on_critical: bool,
}

impl Default for QualityScorer {
    fn default() -> Self {
        Self {
            min_score: 0.5,
            fail_on_critical: true,
        }
    }
}

impl QualityScorer {
    pub fn new(min_score: f64, fail_on_critical: bool) -> Self {
        Self {
            min_score: min_score.clamp(0.0, 1.0),
            fail_on_critical,
        }
    }

    /// Validate by document type; invoices get the full field-level pass,
    /// other types the presence-based one.
    pub fn validate(&self, doc_type: DocumentType, data: &Map<String, Value>) -> ValidationSummary {
        match doc_type {
            DocumentType::Invoice => self.validate_invoice(data),
            _ => self.validate_presence(doc_type, data),
        }
    }

    /// Field-level invoice validation: identifiers, dates, amounts, line
    /// items, currency, and arithmetic consistency.
    pub fn validate_invoice(&self, data: &Map<String, Value>) -> ValidationSummary {
        let mut issues: Vec<ValidationIssue> = Vec::new();
        let mut field_scores: Vec<FieldScore> = Vec::new();

        for field in critical_fields_for(DocumentType::Invoice) {
            if !present(data, field) {
                issues.push(ValidationIssue {
                    field_name: field.to_string(),
                    severity: Severity::Critical,
                    message: format!("Required field '{field}' is missing"),
                    suggestion: Some(format!(
                        "Ensure the document contains {}",
                        field.replace('_', " ")
                    )),
                });
            }
        }

        if let Some(number) = data.get("invoice_number").and_then(Value::as_str) {
            let (score, issue) = validate_identifier("invoice_number", number);
            field_scores.push(score);
            issues.extend(issue);
        }

        if let Some(date) = data.get("invoice_date").and_then(Value::as_str) {
            let (score, issue) = validate_date("invoice_date", date);
            field_scores.push(score);
            issues.extend(issue);
        }

        for field in ["total_amount", "subtotal", "tax_amount"] {
            if let Some(amount) = data.get(field).and_then(Value::as_f64) {
                let (score, issue) = validate_amount(field, amount);
                field_scores.push(score);
                issues.extend(issue);
            }
        }

        if let Some(items) = data.get("line_items").and_then(Value::as_array) {
            if !items.is_empty() {
                let (scores, item_issues) = validate_line_items(items);
                field_scores.extend(scores);
                issues.extend(item_issues);
            }
        }

        issues.extend(validate_totals_consistency(data));

        if data.get("vendor_name").and_then(Value::as_str).is_some_and(|s| !s.trim().is_empty()) {
            field_scores.push(FieldScore {
                field_name: "vendor_name".to_string(),
                score: 0.8,
                confidence: FieldConfidence::High,
                extracted_value: data["vendor_name"].as_str().unwrap_or_default().to_string(),
            });
        }

        if let Some(currency) = data.get("currency").and_then(Value::as_str) {
            let (score, issue) = validate_currency(currency);
            field_scores.push(score);
            issues.extend(issue);
        }

        let fields_extracted = TRACKED_INVOICE_FIELDS
            .iter()
            .filter(|f| present(data, f))
            .count();

        self.summarize(
            field_scores,
            issues,
            fields_extracted,
            TRACKED_INVOICE_FIELDS.len(),
        )
    }

    /// Presence-based validation for resumes and unknown documents: no
    /// arithmetic to reconcile, so only required-field coverage is scored.
    fn validate_presence(
        &self,
        doc_type: DocumentType,
        data: &Map<String, Value>,
    ) -> ValidationSummary {
        let required = required_fields_for(doc_type);
        let mut issues = Vec::new();
        let mut field_scores = Vec::new();
        let mut fields_extracted = 0;

        for field in required {
            if present(data, field) {
                fields_extracted += 1;
                field_scores.push(FieldScore {
                    field_name: field.to_string(),
                    score: 0.9,
                    confidence: FieldConfidence::High,
                    extracted_value: data[*field].to_string(),
                });
            } else {
                let severity = if critical_fields_for(doc_type).contains(field) {
                    Severity::Critical
                } else {
                    Severity::Warning
                };
                issues.push(ValidationIssue {
                    field_name: field.to_string(),
                    severity,
                    message: format!("Required field '{field}' is missing"),
                    suggestion: None,
                });
            }
        }

        // Unknown documents have nothing required; score on raw coverage.
        if required.is_empty() {
            let non_null = data.values().filter(|v| !v.is_null()).count();
            field_scores.push(FieldScore {
                field_name: "coverage".to_string(),
                score: if non_null > 0 { 0.7 } else { 0.0 },
                confidence: FieldConfidence::Medium,
                extracted_value: format!("{non_null} fields"),
            });
            fields_extracted = non_null;
        }

        let expected = required.len().max(1);
        self.summarize(field_scores, issues, fields_extracted, expected)
    }

    fn summarize(
        &self,
        field_scores: Vec<FieldScore>,
        issues: Vec<ValidationIssue>,
        fields_extracted: usize,
        fields_expected: usize,
    ) -> ValidationSummary {
        let overall_score = aggregate_score(&field_scores, &issues);
        let critical_issues = issues.iter().filter(|i| i.severity == Severity::Critical).count();
        let warning_issues = issues.iter().filter(|i| i.severity == Severity::Warning).count();

        let is_valid = (critical_issues == 0 || !self.fail_on_critical)
            && overall_score >= self.min_score;

        ValidationSummary {
            is_valid,
            overall_score,
            field_scores,
            issues,
            critical_issues,
            warning_issues,
            fields_extracted,
            fields_expected,
        }
    }

    /// Confidence map for the final record: per-required-field presence
    /// scores blended with field-level validation and detection confidence.
    pub fn confidence_scores(
        &self,
        data: &Map<String, Value>,
        doc_type: DocumentType,
        summary: &ValidationSummary,
        detection_confidence: f64,
        adjustments: &std::collections::BTreeMap<String, f64>,
    ) -> HashMap<String, f64> {
        let mut scores: HashMap<String, f64> = HashMap::new();

        for field in required_fields_for(doc_type) {
            let score = match data.get(*field) {
                Some(Value::String(s)) if s.trim().len() > 2 => 0.95,
                Some(Value::Number(n)) if n.as_f64().unwrap_or(0.0) > 0.0 => 0.95,
                Some(v) if !v.is_null() => 0.9,
                _ => 0.0,
            };
            scores.insert(field.to_string(), score);
        }

        // Field validators can only lower a presence score, never raise it.
        for fs in &summary.field_scores {
            scores
                .entry(fs.field_name.clone())
                .and_modify(|s| *s = s.min(fs.score))
                .or_insert(fs.score);
        }

        let field_avg = if scores.is_empty() {
            0.0
        } else {
            scores.values().sum::<f64>() / scores.len() as f64
        };

        let mut overall = if scores.is_empty() {
            detection_confidence * 0.5
        } else {
            field_avg * 0.7 + detection_confidence * 0.3
        };

        for (field, delta) in adjustments {
            if field == "overall" {
                overall += delta;
            } else if let Some(score) = scores.get_mut(field) {
                *score = (*score + delta).clamp(0.0, 1.0);
            }
        }

        scores.insert("overall".to_string(), round3(overall.clamp(0.0, 1.0)));
        scores
    }
}

fn validate_identifier(field: &str, value: &str) -> (FieldScore, Option<ValidationIssue>) {
    let (score, confidence, issue) = if value.len() < 2 {
        (
            0.3,
            FieldConfidence::Low,
            Some(ValidationIssue {
                field_name: field.to_string(),
                severity: Severity::Warning,
                message: format!("{} appears too short", title_case(field)),
                suggestion: Some("Verify the identifier was extracted correctly".into()),
            }),
        )
    } else if value.len() > 50 {
        (
            0.3,
            FieldConfidence::Low,
            Some(ValidationIssue {
                field_name: field.to_string(),
                severity: Severity::Warning,
                message: format!("{} appears too long", title_case(field)),
                suggestion: Some("May contain extra text".into()),
            }),
        )
    } else if !IDENTIFIER_CHARSET.is_match(value) {
        (
            0.6,
            FieldConfidence::Medium,
            Some(ValidationIssue {
                field_name: field.to_string(),
                severity: Severity::Info,
                message: format!("{} contains unusual characters", title_case(field)),
                suggestion: None,
            }),
        )
    } else {
        (1.0, FieldConfidence::High, None)
    };

    (
        FieldScore {
            field_name: field.to_string(),
            score,
            confidence,
            extracted_value: value.to_string(),
        },
        issue,
    )
}

fn validate_date(field: &str, value: &str) -> (FieldScore, Option<ValidationIssue>) {
    let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") else {
        return (
            FieldScore {
                field_name: field.to_string(),
                score: 0.6,
                confidence: FieldConfidence::Low,
                extracted_value: value.to_string(),
            },
            Some(ValidationIssue {
                field_name: field.to_string(),
                severity: Severity::Info,
                message: format!("{} is not a recognizable date", title_case(field)),
                suggestion: None,
            }),
        );
    };

    let today = Utc::now().date_naive();
    let (score, confidence, issue) = if date > today {
        (
            0.7,
            FieldConfidence::Medium,
            Some(ValidationIssue {
                field_name: field.to_string(),
                severity: Severity::Warning,
                message: format!("{} is in the future", title_case(field)),
                suggestion: Some("Verify the date is correct".into()),
            }),
        )
    } else if (today - date).num_days() > 5 * 365 {
        (
            0.6,
            FieldConfidence::Medium,
            Some(ValidationIssue {
                field_name: field.to_string(),
                severity: Severity::Info,
                message: format!("{} is over 5 years old", title_case(field)),
                suggestion: None,
            }),
        )
    } else {
        (1.0, FieldConfidence::High, None)
    };

    (
        FieldScore {
            field_name: field.to_string(),
            score,
            confidence,
            extracted_value: value.to_string(),
        },
        issue,
    )
}

fn validate_amount(field: &str, amount: f64) -> (FieldScore, Option<ValidationIssue>) {
    let (score, confidence, issue) = if amount < 0.0 {
        (
            0.3,
            FieldConfidence::Low,
            Some(ValidationIssue {
                field_name: field.to_string(),
                severity: Severity::Warning,
                message: format!("{} is negative", title_case(field)),
                suggestion: Some("Verify the amount sign".into()),
            }),
        )
    } else if amount == 0.0 {
        (
            0.5,
            FieldConfidence::Medium,
            Some(ValidationIssue {
                field_name: field.to_string(),
                severity: Severity::Info,
                message: format!("{} is zero", title_case(field)),
                suggestion: None,
            }),
        )
    } else if amount > LARGE_AMOUNT {
        (
            0.6,
            FieldConfidence::Medium,
            Some(ValidationIssue {
                field_name: field.to_string(),
                severity: Severity::Info,
                message: format!("{} is unusually large", title_case(field)),
                suggestion: Some("Verify the decimal placement".into()),
            }),
        )
    } else {
        (1.0, FieldConfidence::High, None)
    };

    (
        FieldScore {
            field_name: field.to_string(),
            score,
            confidence,
            extracted_value: amount.to_string(),
        },
        issue,
    )
}

fn validate_line_items(items: &[Value]) -> (Vec<FieldScore>, Vec<ValidationIssue>) {
    let mut issues = Vec::new();

    for (i, item) in items.iter().enumerate() {
        let Some(obj) = item.as_object() else { continue };
        let n = i + 1;

        if !present(obj, "description") {
            issues.push(ValidationIssue {
                field_name: format!("line_item_{i}_description"),
                severity: Severity::Warning,
                message: format!("Line item {n} missing description"),
                suggestion: None,
            });
        }

        let amount = obj.get("amount").and_then(Value::as_f64);
        if amount.is_none() {
            issues.push(ValidationIssue {
                field_name: format!("line_item_{i}_amount"),
                severity: Severity::Warning,
                message: format!("Line item {n} missing amount"),
                suggestion: None,
            });
        }

        if let (Some(qty), Some(price), Some(amount)) = (
            obj.get("quantity").and_then(Value::as_f64),
            obj.get("unit_price").and_then(Value::as_f64),
            amount,
        ) {
            let expected = qty * price;
            if (amount - expected).abs() > AMOUNT_TOLERANCE {
                issues.push(ValidationIssue {
                    field_name: format!("line_item_{i}_calculation"),
                    severity: Severity::Warning,
                    message: format!("Line item {n}: amount != qty × price"),
                    suggestion: Some(format!("Expected {expected:.2}, got {amount}")),
                });
            }
        }
    }

    let with_amounts = items
        .iter()
        .filter_map(Value::as_object)
        .filter(|obj| obj.get("amount").and_then(Value::as_f64).is_some())
        .count();
    let completeness = with_amounts as f64 / items.len() as f64;
    let confidence = if completeness > 0.8 {
        FieldConfidence::High
    } else if completeness > 0.5 {
        FieldConfidence::Medium
    } else {
        FieldConfidence::Low
    };

    let scores = vec![FieldScore {
        field_name: "line_items".to_string(),
        score: completeness,
        confidence,
        extracted_value: format!("{} items", items.len()),
    }];

    (scores, issues)
}

fn validate_totals_consistency(data: &Map<String, Value>) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let get = |field: &str| data.get(field).and_then(Value::as_f64);

    if let (Some(items), Some(subtotal)) = (data.get("line_items").and_then(Value::as_array), get("subtotal")) {
        let items_total: f64 = items
            .iter()
            .filter_map(Value::as_object)
            .filter_map(|obj| obj.get("amount").and_then(Value::as_f64))
            .sum();
        if items_total > 0.0 && (subtotal - items_total).abs() > AMOUNT_TOLERANCE {
            issues.push(ValidationIssue {
                field_name: "subtotal".to_string(),
                severity: Severity::Warning,
                message: "Subtotal doesn't match sum of line items".to_string(),
                suggestion: Some(format!("Items sum: {items_total:.2}, Subtotal: {subtotal}")),
            });
        }
    }

    if let (Some(subtotal), Some(total)) = (get("subtotal"), get("total_amount")) {
        let calculated = subtotal + get("tax_amount").unwrap_or(0.0)
            - get("discount_amount").unwrap_or(0.0)
            + get("shipping_amount").unwrap_or(0.0);
        if (total - calculated).abs() > AMOUNT_TOLERANCE {
            // Only meaningful when tax is known or no discount muddies it.
            if get("tax_amount").is_some() || get("discount_amount").is_none() {
                issues.push(ValidationIssue {
                    field_name: "total_amount".to_string(),
                    severity: Severity::Info,
                    message: "Total doesn't match calculated total".to_string(),
                    suggestion: Some(format!("Calculated: {calculated:.2}, Got: {total}")),
                });
            }
        }
    }

    issues
}

fn validate_currency(currency: &str) -> (FieldScore, Option<ValidationIssue>) {
    let known = COMMON_CURRENCIES.contains(&currency.to_uppercase().as_str());
    let (score, confidence, issue) = if known {
        (1.0, FieldConfidence::High, None)
    } else {
        (
            0.7,
            FieldConfidence::Medium,
            Some(ValidationIssue {
                field_name: "currency".to_string(),
                severity: Severity::Info,
                message: format!("Currency '{currency}' is not in common currencies list"),
                suggestion: None,
            }),
        )
    };

    (
        FieldScore {
            field_name: "currency".to_string(),
            score,
            confidence,
            extracted_value: currency.to_string(),
        },
        issue,
    )
}

fn aggregate_score(field_scores: &[FieldScore], issues: &[ValidationIssue]) -> f64 {
    if field_scores.is_empty() {
        return 0.0;
    }

    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;
    for fs in field_scores {
        let weight = field_weight(&fs.field_name);
        weighted_sum += fs.score * weight;
        total_weight += weight;
    }
    let base = if total_weight == 0.0 {
        0.5
    } else {
        weighted_sum / total_weight
    };

    let penalty: f64 = issues
        .iter()
        .map(|i| match i.severity {
            Severity::Critical => 0.3,
            Severity::Warning => 0.1,
            Severity::Info => 0.02,
        })
        .sum();

    round3((base - penalty.min(0.5)).max(0.0))
}
