//! Field normalization for recovered extraction data.
//!
//! Models return dates in whatever format the document used, amounts with
//! currency symbols and locale-dependent separators, and line items under a
//! handful of column-name aliases. This stage canonicalises all of that:
//! ISO dates, plain `f64` amounts, a single 3-letter currency code, and line
//! items with `description`/`quantity`/`unit_price`/`amount` reconciled
//! against each other. Every rewrite is recorded as a correction and
//! arithmetic mismatches become warnings plus per-field confidence
//! adjustments consumed by the scorer.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// Symbol-to-code table, ordered longest symbol first so compound symbols
/// ("R$", "Rs.") win over their prefixes ("$", "Rs" … "R" is not listed but
/// "$" is a suffix of "R$").
pub const CURRENCY_SYMBOLS: &[(&str, &str)] = &[
    ("CHF", "CHF"),
    ("PKR", "PKR"),
    ("Rs.", "PKR"),
    ("Rs", "PKR"),
    ("R$", "BRL"),
    ("C$", "CAD"),
    ("A$", "AUD"),
    ("zł", "PLN"),
    ("kr", "SEK"),
    ("$", "USD"),
    ("€", "EUR"),
    ("£", "GBP"),
    ("¥", "JPY"),
    ("₹", "INR"),
    ("₽", "RUB"),
    ("₩", "KRW"),
    ("₪", "ILS"),
    ("฿", "THB"),
    ("₱", "PHP"),
];

/// Currency codes worth looking for verbatim inside amount strings.
const INLINE_CURRENCY_CODES: &[&str] = &["PKR", "USD", "EUR", "GBP", "INR", "CAD", "AUD", "JPY"];

const AMOUNT_FIELDS: &[&str] = &[
    "total_amount",
    "subtotal",
    "tax_amount",
    "shipping_amount",
    "discount_amount",
    "amount_paid",
    "balance_due",
    "grand_total",
];

const DATE_FIELDS: &[&str] = &["invoice_date", "due_date"];

/// Rounding slack for amount arithmetic, in currency units.
pub const AMOUNT_TOLERANCE: f64 = 0.02;

static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap_or_else(|e| panic!("date regex: {e}")));
static YMD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4})-(\d{1,2})-(\d{1,2})").unwrap_or_else(|e| panic!("date regex: {e}"))
});
static US_SLASH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,2})/(\d{1,2})/(\d{4})").unwrap_or_else(|e| panic!("date regex: {e}"))
});
static US_SLASH_SHORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,2})/(\d{1,2})/(\d{2})").unwrap_or_else(|e| panic!("date regex: {e}"))
});
static EU_DOTTED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,2})\.(\d{1,2})\.(\d{4})").unwrap_or_else(|e| panic!("date regex: {e}"))
});
static EU_DASHED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,2})-(\d{1,2})-(\d{4})").unwrap_or_else(|e| panic!("date regex: {e}"))
});
static MONTH_FIRST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([A-Za-z]+)\s+(\d{1,2}),?\s+(\d{4})").unwrap_or_else(|e| panic!("date regex: {e}"))
});
static DAY_FIRST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,2})\s+([A-Za-z]+)\s+(\d{4})").unwrap_or_else(|e| panic!("date regex: {e}"))
});
static EU_GROUPED_AMOUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{1,3}(\.\d{3})+,\d{2}$").unwrap_or_else(|e| panic!("amount regex: {e}"))
});

/// Normalization output: rewritten data plus the audit trail.
#[derive(Debug, Clone, Default)]
pub struct NormalizeOutcome {
    pub data: Map<String, Value>,
    /// Inconsistencies found but not fixable (arithmetic mismatches etc.).
    pub warnings: Vec<String>,
    /// Rewrites that were applied ("Normalized invoice_date: …").
    pub corrections: Vec<String>,
    /// Per-field confidence deltas; key "overall" applies to the record.
    pub adjustments: BTreeMap<String, f64>,
}

fn month_number(name: &str) -> Option<u32> {
    let lower = name.to_lowercase();
    let key = if lower.len() >= 3 { &lower[..3] } else { return None };
    match key {
        "jan" => Some(1),
        "feb" => Some(2),
        "mar" => Some(3),
        "apr" => Some(4),
        "may" => Some(5),
        "jun" => Some(6),
        "jul" => Some(7),
        "aug" => Some(8),
        "sep" => Some(9),
        "oct" => Some(10),
        "nov" => Some(11),
        "dec" => Some(12),
        _ => None,
    }
}

fn iso(year: i32, month: u32, day: u32) -> Option<String> {
    NaiveDate::from_ymd_opt(year, month, day).map(|d| d.format("%Y-%m-%d").to_string())
}

fn capture_u32(caps: &regex::Captures<'_>, idx: usize) -> Option<u32> {
    caps.get(idx)?.as_str().parse().ok()
}

fn capture_i32(caps: &regex::Captures<'_>, idx: usize) -> Option<i32> {
    caps.get(idx)?.as_str().parse().ok()
}

/// Parse a date in any of the common document formats into `YYYY-MM-DD`.
///
/// Returns the input unchanged when nothing matches (a wrong-but-present
/// date is more useful downstream than a dropped one, and the scorer flags
/// implausible values anyway). `None` only for empty input.
pub fn parse_date(raw: &str) -> Option<String> {
    let date_str = raw.trim();
    if date_str.is_empty() {
        return None;
    }

    if ISO_DATE.is_match(date_str) {
        return Some(date_str.to_string());
    }

    if let Some(caps) = YMD.captures(date_str) {
        if let (Some(y), Some(m), Some(d)) =
            (capture_i32(&caps, 1), capture_u32(&caps, 2), capture_u32(&caps, 3))
        {
            if let Some(out) = iso(y, m, d) {
                return Some(out);
            }
        }
    }

    if let Some(caps) = US_SLASH.captures(date_str) {
        if let (Some(m), Some(d), Some(y)) =
            (capture_u32(&caps, 1), capture_u32(&caps, 2), capture_i32(&caps, 3))
        {
            if let Some(out) = iso(y, m, d) {
                return Some(out);
            }
        }
    }

    if let Some(caps) = US_SLASH_SHORT.captures(date_str) {
        if let (Some(m), Some(d), Some(y)) =
            (capture_u32(&caps, 1), capture_u32(&caps, 2), capture_i32(&caps, 3))
        {
            // Two-digit years pivot at 70, matching strptime's %y.
            let year = if y < 70 { 2000 + y } else { 1900 + y };
            if let Some(out) = iso(year, m, d) {
                return Some(out);
            }
        }
    }

    for pattern in [&EU_DOTTED, &EU_DASHED] {
        if let Some(caps) = pattern.captures(date_str) {
            if let (Some(d), Some(m), Some(y)) =
                (capture_u32(&caps, 1), capture_u32(&caps, 2), capture_i32(&caps, 3))
            {
                if let Some(out) = iso(y, m, d) {
                    return Some(out);
                }
            }
        }
    }

    if let Some(caps) = MONTH_FIRST.captures(date_str) {
        if let (Some(month), Some(d), Some(y)) = (
            caps.get(1).and_then(|m| month_number(m.as_str())),
            capture_u32(&caps, 2),
            capture_i32(&caps, 3),
        ) {
            if let Some(out) = iso(y, month, d) {
                return Some(out);
            }
        }
    }

    if let Some(caps) = DAY_FIRST.captures(date_str) {
        if let (Some(d), Some(month), Some(y)) = (
            capture_u32(&caps, 1),
            caps.get(2).and_then(|m| month_number(m.as_str())),
            capture_i32(&caps, 3),
        ) {
            if let Some(out) = iso(y, month, d) {
                return Some(out);
            }
        }
    }

    Some(date_str.to_string())
}

/// Parse an amount value (number, or string with currency symbols and
/// locale separators) into a plain `f64`.
pub fn parse_amount(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let mut cleaned = s.trim().to_string();
            for (symbol, _) in CURRENCY_SYMBOLS {
                cleaned = cleaned.replace(symbol, "");
            }
            let cleaned = cleaned.trim();

            let cleaned = if EU_GROUPED_AMOUNT.is_match(cleaned) {
                // European grouping: 1.234,56 → 1234.56
                cleaned.replace('.', "").replace(',', ".")
            } else {
                cleaned.replace(',', "")
            };

            let cleaned: String = cleaned
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            cleaned.parse().ok()
        }
        _ => None,
    }
}

fn symbol_code_in(text: &str) -> Option<&'static str> {
    CURRENCY_SYMBOLS
        .iter()
        .find(|(symbol, _)| text.contains(symbol))
        .map(|(_, code)| *code)
}

/// Detect the invoice currency: explicit `currency` field first, then
/// symbols in amount strings, then symbols in the document text, then the
/// configured default.
pub fn detect_currency(data: &Map<String, Value>, text: &str, default: &str) -> String {
    if let Some(Value::String(code)) = data.get("currency") {
        if code.len() == 3 {
            return code.to_uppercase();
        }
    }

    for field in ["total_amount", "subtotal", "tax_amount"] {
        if let Some(Value::String(s)) = data.get(field) {
            if let Some(code) = symbol_code_in(s) {
                return code.to_string();
            }
        }
    }

    if let Some(code) = symbol_code_in(text) {
        return code.to_string();
    }

    default.to_string()
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn nonzero(v: Option<f64>) -> Option<f64> {
    v.filter(|x| *x != 0.0)
}

/// Collapse the column-name aliases models use for line items into the
/// canonical `description`/`quantity`/`unit_price`/`amount` shape, deriving
/// whichever of the three numeric fields is missing from the other two.
pub fn normalize_line_items(items: &[Value]) -> Vec<Value> {
    let mut normalized = Vec::with_capacity(items.len());

    for item in items {
        let Some(obj) = item.as_object() else { continue };

        let description = obj
            .get("description")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| Value::String(s.to_string()))
            .unwrap_or(Value::Null);

        let quantity = obj
            .get("quantity")
            .filter(|v| !v.is_null())
            .or_else(|| obj.get("qty"))
            .and_then(parse_amount);

        let unit_price = ["unit_price", "rate", "price", "price_each"]
            .iter()
            .find_map(|k| obj.get(*k).and_then(parse_amount));

        let amount = ["amount", "total", "line_total"]
            .iter()
            .find_map(|k| obj.get(*k).and_then(parse_amount));

        let (mut quantity, mut unit_price, mut amount) =
            (nonzero(quantity), nonzero(unit_price), nonzero(amount));

        match (quantity, unit_price, amount) {
            (Some(q), Some(p), None) => amount = Some(round2(q * p)),
            (Some(q), None, Some(a)) => unit_price = Some(round2(a / q)),
            (None, Some(p), Some(a)) => {
                // Infer quantity only when it comes out whole.
                let q = a / p;
                if (q - q.round()).abs() < f64::EPSILON {
                    quantity = Some(q.round());
                }
            }
            _ => {}
        }

        normalized.push(json!({
            "description": description,
            "quantity": quantity,
            "unit_price": unit_price,
            "amount": amount,
            "sku": obj.get("sku").cloned().unwrap_or(Value::Null),
            "discount": obj.get("discount").and_then(parse_amount).unwrap_or(0.0),
        }));
    }

    normalized
}

/// Recursive cleanup applied to every recovered object regardless of type:
/// trim strings, turn empty strings into nulls, drop null/empty list
/// entries, recurse into nested objects.
pub fn clean_fields(data: &Map<String, Value>) -> Map<String, Value> {
    let mut cleaned = Map::with_capacity(data.len());

    for (key, value) in data {
        let v = match value {
            Value::Null => Value::Null,
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    Value::Null
                } else {
                    Value::String(trimmed.to_string())
                }
            }
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .filter(|item| !item.is_null() && item.as_str() != Some(""))
                    .map(|item| match item {
                        Value::Object(obj) => Value::Object(clean_fields(obj)),
                        other => other.clone(),
                    })
                    .collect(),
            ),
            Value::Object(obj) => Value::Object(clean_fields(obj)),
            other => other.clone(),
        };
        cleaned.insert(key.clone(), v);
    }

    cleaned
}

fn line_item_sum(items: &[Value]) -> f64 {
    items
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|obj| obj.get("amount").and_then(parse_amount))
        .sum()
}

/// Full invoice normalization pass.
///
/// Dates → ISO, currency detected and pinned, amounts → numbers, line items
/// canonicalised, then arithmetic consistency checks and the required-field
/// and completeness adjustments.
pub fn normalize_invoice(
    data: Map<String, Value>,
    original_text: &str,
    default_currency: &str,
) -> NormalizeOutcome {
    if data.is_empty() {
        return NormalizeOutcome {
            warnings: vec!["no data to normalize".to_string()],
            ..NormalizeOutcome::default()
        };
    }

    let mut out = NormalizeOutcome {
        data: clean_fields(&data),
        ..NormalizeOutcome::default()
    };

    for field in DATE_FIELDS {
        if let Some(Value::String(original)) = out.data.get(*field) {
            let original = original.clone();
            if let Some(parsed) = parse_date(&original) {
                if parsed != original {
                    out.corrections
                        .push(format!("Normalized {field}: {original} → {parsed}"));
                    out.data.insert(field.to_string(), Value::String(parsed));
                }
            }
        }
    }

    // Currency must be pinned before amounts lose their symbols.
    let mut currency: Option<String> = None;
    if let Some(Value::String(code)) = out.data.get("currency") {
        if code.len() == 3 {
            currency = Some(code.to_uppercase());
        }
    }
    if currency.is_none() {
        'fields: for field in ["total_amount", "subtotal", "grand_total"] {
            if let Some(Value::String(s)) = out.data.get(field) {
                let upper = s.to_uppercase();
                for code in INLINE_CURRENCY_CODES {
                    if upper.contains(code) {
                        currency = Some(code.to_string());
                        break 'fields;
                    }
                }
            }
        }
    }
    let currency =
        currency.unwrap_or_else(|| detect_currency(&out.data, original_text, default_currency));
    debug!(currency = currency.as_str(), "currency pinned");
    out.data
        .insert("currency".to_string(), Value::String(currency.clone()));

    for field in AMOUNT_FIELDS {
        let Some(original) = out.data.get(*field) else { continue };
        if original.is_null() {
            continue;
        }
        let original = original.clone();
        if let Some(parsed) = parse_amount(&original) {
            if original.as_f64() != Some(parsed) {
                out.corrections
                    .push(format!("Parsed {field}: {original} → {parsed}"));
            }
            out.data.insert(field.to_string(), json!(parsed));
        }
    }

    if let Some(Value::Array(items)) = out.data.get("line_items") {
        let had_string_amounts = items.iter().filter_map(Value::as_object).any(|obj| {
            ["unit_price", "amount"].iter().any(|k| {
                obj.get(*k)
                    .and_then(Value::as_str)
                    .and_then(symbol_code_in)
                    .is_some_and(|code| code != currency)
            })
        });
        let normalized = normalize_line_items(items);
        if had_string_amounts {
            out.corrections
                .push("Stripped mismatched currency symbols from line items".to_string());
        }
        out.data
            .insert("line_items".to_string(), Value::Array(normalized));
    }

    // Arithmetic consistency.
    let get = |field: &str| out.data.get(field).and_then(parse_amount);
    let subtotal = get("subtotal");
    let tax = get("tax_amount").unwrap_or(0.0);
    let shipping = get("shipping_amount").unwrap_or(0.0);
    let discount = get("discount_amount").unwrap_or(0.0);
    let total = get("total_amount");

    if let Some(Value::Array(items)) = out.data.get("line_items") {
        let line_sum = line_item_sum(items);
        if let Some(subtotal) = subtotal {
            if line_sum > 0.0 && (subtotal - line_sum).abs() > AMOUNT_TOLERANCE {
                out.warnings.push(format!(
                    "Subtotal ({subtotal}) doesn't match line items sum ({line_sum:.2})"
                ));
                out.adjustments.insert("subtotal".to_string(), -0.1);
            }
        }
    }

    if let (Some(total), Some(subtotal)) = (total, subtotal) {
        let expected = subtotal + tax + shipping - discount;
        if (total - expected).abs() > AMOUNT_TOLERANCE {
            out.warnings.push(format!(
                "Total ({total}) doesn't match calculated ({expected:.2})"
            ));
            out.adjustments.insert("total_amount".to_string(), -0.1);
        }
    }

    for field in ["invoice_number", "total_amount"] {
        let missing = !matches!(out.data.get(field), Some(v) if !v.is_null());
        if missing {
            out.warnings.push(format!("Missing required field: {field}"));
            out.adjustments.insert(field.to_string(), -0.2);
        }
    }

    if !out.data.is_empty() {
        let present = out.data.values().filter(|v| !v.is_null()).count();
        let completeness = present as f64 / out.data.len() as f64;
        if completeness > 0.7 {
            out.adjustments.insert("overall".to_string(), 0.1);
        }
    }

    debug!(
        corrections = out.corrections.len(),
        warnings = out.warnings.len(),
        "invoice normalization complete"
    );
    out
}

/// Normalization for non-invoice documents: the generic cleanup only, since
/// resume and unknown payloads have no fixed arithmetic to reconcile.
pub fn normalize_generic(data: Map<String, Value>) -> NormalizeOutcome {
    NormalizeOutcome {
        data: clean_fields(&data),
        ..NormalizeOutcome::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dates_in_common_formats() {
        assert_eq!(parse_date("2024-03-15").as_deref(), Some("2024-03-15"));
        assert_eq!(parse_date("03/15/2024").as_deref(), Some("2024-03-15"));
        assert_eq!(parse_date("3/5/24").as_deref(), Some("2024-03-05"));
        assert_eq!(parse_date("15.03.2024").as_deref(), Some("2024-03-15"));
        assert_eq!(parse_date("15-03-2024").as_deref(), Some("2024-03-15"));
        assert_eq!(parse_date("March 15, 2024").as_deref(), Some("2024-03-15"));
        assert_eq!(parse_date("15 Mar 2024").as_deref(), Some("2024-03-15"));
    }

    #[test]
    fn unparseable_date_passes_through() {
        assert_eq!(parse_date("next Tuesday").as_deref(), Some("next Tuesday"));
        assert_eq!(parse_date("  "), None);
    }

    #[test]
    fn invalid_calendar_date_falls_through() {
        // 99/99/2024 matches no valid calendar date; the raw string survives.
        assert_eq!(parse_date("99/99/2024").as_deref(), Some("99/99/2024"));
    }

    #[test]
    fn amounts_in_both_locales() {
        assert_eq!(parse_amount(&json!("1.234,56")), Some(1234.56));
        assert_eq!(parse_amount(&json!("1,234.56")), Some(1234.56));
        assert_eq!(parse_amount(&json!("$1,299.00")), Some(1299.0));
        assert_eq!(parse_amount(&json!("€ 42,50")), Some(4250.0)); // not EU-grouped: comma stripped
        assert_eq!(parse_amount(&json!(99.5)), Some(99.5));
        assert_eq!(parse_amount(&json!("PKR 15,000")), Some(15000.0));
        assert_eq!(parse_amount(&json!(null)), None);
        assert_eq!(parse_amount(&json!("n/a")), None);
    }

    #[test]
    fn currency_from_explicit_field() {
        let mut data = Map::new();
        data.insert("currency".into(), json!("eur"));
        assert_eq!(detect_currency(&data, "", "USD"), "EUR");
    }

    #[test]
    fn currency_from_amount_symbol() {
        let mut data = Map::new();
        data.insert("total_amount".into(), json!("£450.00"));
        assert_eq!(detect_currency(&data, "", "USD"), "GBP");
    }

    #[test]
    fn compound_symbols_beat_their_prefixes() {
        let mut data = Map::new();
        data.insert("total_amount".into(), json!("R$ 100,00"));
        assert_eq!(detect_currency(&data, "", "USD"), "BRL");

        let mut data = Map::new();
        data.insert("total_amount".into(), json!("Rs. 5000"));
        assert_eq!(detect_currency(&data, "", "USD"), "PKR");
    }

    #[test]
    fn currency_defaults_when_nothing_found() {
        assert_eq!(detect_currency(&Map::new(), "plain text", "USD"), "USD");
    }

    #[test]
    fn line_item_amount_is_derived() {
        let items = vec![json!({"description": "Widget", "qty": 3, "rate": "10.00"})];
        let normalized = normalize_line_items(&items);
        assert_eq!(normalized[0]["quantity"], json!(3.0));
        assert_eq!(normalized[0]["unit_price"], json!(10.0));
        assert_eq!(normalized[0]["amount"], json!(30.0));
    }

    #[test]
    fn line_item_quantity_inferred_only_when_whole() {
        let items = vec![
            json!({"description": "A", "unit_price": 10.0, "amount": 30.0}),
            json!({"description": "B", "unit_price": 10.0, "amount": 25.0}),
        ];
        let normalized = normalize_line_items(&items);
        assert_eq!(normalized[0]["quantity"], json!(3.0));
        assert_eq!(normalized[1]["quantity"], Value::Null);
    }

    #[test]
    fn non_object_line_items_are_dropped() {
        let items = vec![json!("stray string"), json!({"description": "ok"})];
        assert_eq!(normalize_line_items(&items).len(), 1);
    }

    #[test]
    fn clean_fields_trims_and_nulls() {
        let mut data = Map::new();
        data.insert("vendor_name".into(), json!("  Acme Corp  "));
        data.insert("notes".into(), json!("   "));
        data.insert("tags".into(), json!(["a", null, "", "b"]));
        let cleaned = clean_fields(&data);
        assert_eq!(cleaned["vendor_name"], json!("Acme Corp"));
        assert_eq!(cleaned["notes"], Value::Null);
        assert_eq!(cleaned["tags"], json!(["a", "b"]));
    }

    fn sample_invoice() -> Map<String, Value> {
        let Value::Object(map) = json!({
            "invoice_number": "INV-001",
            "invoice_date": "03/15/2024",
            "currency": null,
            "line_items": [
                {"description": "Widget", "quantity": 3, "unit_price": "$10.00"},
                {"description": "Gadget", "quantity": 1, "unit_price": 20.0, "amount": 20.0}
            ],
            "subtotal": "$50.00",
            "tax_amount": "$5.00",
            "total_amount": "$55.00"
        }) else {
            unreachable!()
        };
        map
    }

    #[test]
    fn consistent_invoice_normalizes_cleanly() {
        let out = normalize_invoice(sample_invoice(), "", "USD");
        assert_eq!(out.data["invoice_date"], json!("2024-03-15"));
        assert_eq!(out.data["currency"], json!("USD"));
        assert_eq!(out.data["total_amount"], json!(55.0));
        assert_eq!(out.data["line_items"][0]["amount"], json!(30.0));
        assert!(out.warnings.is_empty(), "warnings: {:?}", out.warnings);
        assert_eq!(out.adjustments.get("overall"), Some(&0.1));
    }

    #[test]
    fn total_mismatch_is_flagged() {
        let mut data = sample_invoice();
        data.insert("total_amount".into(), json!("$99.00"));
        let out = normalize_invoice(data, "", "USD");
        assert!(out.warnings.iter().any(|w| w.contains("doesn't match calculated")));
        assert_eq!(out.adjustments.get("total_amount"), Some(&-0.1));
    }

    #[test]
    fn subtotal_mismatch_is_flagged() {
        let mut data = sample_invoice();
        data.insert("subtotal".into(), json!("$10.00"));
        let out = normalize_invoice(data, "", "USD");
        assert!(out
            .warnings
            .iter()
            .any(|w| w.contains("doesn't match line items sum")));
        assert_eq!(out.adjustments.get("subtotal"), Some(&-0.1));
    }

    #[test]
    fn missing_required_fields_are_penalised() {
        let mut data = Map::new();
        data.insert("vendor_name".into(), json!("Acme"));
        let out = normalize_invoice(data, "", "USD");
        assert_eq!(out.adjustments.get("invoice_number"), Some(&-0.2));
        assert_eq!(out.adjustments.get("total_amount"), Some(&-0.2));
        assert_eq!(out.warnings.len(), 2);
    }

    #[test]
    fn empty_data_short_circuits() {
        let out = normalize_invoice(Map::new(), "", "USD");
        assert!(out.data.is_empty());
        assert_eq!(out.warnings, vec!["no data to normalize".to_string()]);
    }

    #[test]
    fn generic_normalization_only_cleans() {
        let mut data = Map::new();
        data.insert("candidate_name".into(), json!("  Jane Doe "));
        let out = normalize_generic(data);
        assert_eq!(out.data["candidate_name"], json!("Jane Doe"));
        assert!(out.adjustments.is_empty());
    }
}
