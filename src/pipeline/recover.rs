//! JSON recovery from imperfect model output.
//!
//! Completions rarely arrive as clean JSON: models wrap objects in markdown
//! fences, add prose before and after, drop trailing braces, or emit
//! Python-flavoured syntax (single quotes, bare keys). [`parse_completion`]
//! walks a fixed ladder of strategies, cheapest first:
//!
//! 1. direct parse of the whole response
//! 2. contents of a ```json fenced block (or any fenced block)
//! 3. the substring from the first `{` to the last `}`
//! 4. strategy 3's substring after [`repair_json`]
//! 5. the whole response after [`repair_json`]
//!
//! Only strategies 4 and 5 mark the result as repaired; recovery from
//! fences or surrounding prose is considered exact.

use crate::error::ExtractError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Bound on the raw-response copy kept in a failed result.
const RAW_SNIPPET_LEN: usize = 500;

/// Outcome of one recovery attempt.
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub success: bool,
    /// The recovered object; `None` when every strategy failed.
    pub data: Option<Map<String, Value>>,
    /// Bounded copy of the original completion, for diagnostics.
    pub raw_response: String,
    pub error: Option<String>,
    /// True only when [`repair_json`] rewrites were needed.
    pub was_repaired: bool,
}

impl ParseResult {
    fn parsed(data: Map<String, Value>, raw: &str, was_repaired: bool) -> Self {
        Self {
            success: true,
            data: Some(data),
            raw_response: snippet(raw),
            error: None,
            was_repaired,
        }
    }

    fn failed(raw: &str, error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            raw_response: snippet(raw),
            error: Some(error.into()),
            was_repaired: false,
        }
    }
}

static FENCED_JSON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)```json\s*([\s\S]*?)\s*```").unwrap_or_else(|e| panic!("fence regex: {e}"))
});
static FENCED_ANY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)```\s*([\s\S]*?)\s*```").unwrap_or_else(|e| panic!("fence regex: {e}"))
});

static TRAILING_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*([}\]])").unwrap_or_else(|e| panic!("repair regex: {e}")));
static SINGLE_QUOTED_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'(\w+)':").unwrap_or_else(|e| panic!("repair regex: {e}")));
static SINGLE_QUOTED_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":\s*'([^']*)'").unwrap_or_else(|e| panic!("repair regex: {e}")));
static BARE_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([{,])\s*([A-Za-z_]\w*)\s*:").unwrap_or_else(|e| panic!("repair regex: {e}"))
});

/// Recover a JSON object from a model completion.
///
/// Never errors; inspect [`ParseResult::success`]. Use
/// [`parse_completion_strict`] when a failure should propagate.
pub fn parse_completion(response: &str) -> ParseResult {
    let raw = response.trim();
    if raw.is_empty() {
        return ParseResult::failed(response, "empty completion");
    }

    // Strategy 1: the whole response is already JSON.
    if let Some(data) = try_object(raw) {
        debug!("completion parsed directly");
        return ParseResult::parsed(data, raw, false);
    }

    // Strategy 2: a fenced code block.
    for fence in [&FENCED_JSON, &FENCED_ANY] {
        if let Some(candidate) = fence.captures(raw).and_then(|c| c.get(1)) {
            if let Some(data) = try_object(candidate.as_str().trim()) {
                debug!("completion recovered from fenced block");
                return ParseResult::parsed(data, raw, false);
            }
        }
    }

    // Strategy 3: first '{' through last '}'.
    if let Some(candidate) = brace_span(raw) {
        if let Some(data) = try_object(candidate) {
            debug!("completion recovered from embedded object");
            return ParseResult::parsed(data, raw, false);
        }
        // Strategy 4: same span, repaired.
        if let Some(data) = try_object(&repair_json(candidate)) {
            debug!("completion recovered after repairing embedded object");
            return ParseResult::parsed(data, raw, true);
        }
    }

    // Strategy 5: repair the whole response.
    if let Some(data) = try_object(&repair_json(raw)) {
        debug!("completion recovered after repairing whole response");
        return ParseResult::parsed(data, raw, true);
    }

    let mut head_end = raw.len().min(200);
    while !raw.is_char_boundary(head_end) {
        head_end -= 1;
    }
    warn!(head = &raw[..head_end], "no strategy recovered a JSON object");
    ParseResult::failed(raw, "no JSON object recoverable from completion")
}

/// Like [`parse_completion`] but converts failure into
/// [`ExtractError::ParseFailure`].
pub fn parse_completion_strict(response: &str) -> Result<Map<String, Value>, ExtractError> {
    let result = parse_completion(response);
    match result.data {
        Some(data) => Ok(data),
        None => Err(ExtractError::ParseFailure {
            detail: result
                .error
                .unwrap_or_else(|| "unparseable completion".into()),
            snippet: result.raw_response,
        }),
    }
}

/// Rewrite the most common JSON syntax mistakes models make.
///
/// Fixes trailing commas, single-quoted keys/values, bare keys, and
/// unbalanced closing braces/brackets. Heuristic by nature: apostrophes
/// inside values and braces inside strings can defeat it, which is fine —
/// the output still has to survive a real parse before it is used.
pub fn repair_json(input: &str) -> String {
    let repaired = TRAILING_COMMA.replace_all(input, "$1");
    let repaired = SINGLE_QUOTED_KEY.replace_all(&repaired, "\"$1\":");
    let repaired = SINGLE_QUOTED_VALUE.replace_all(&repaired, ": \"$1\"");
    let mut repaired = BARE_KEY.replace_all(&repaired, "$1\"$2\":").into_owned();

    let open_braces = repaired.matches('{').count();
    let close_braces = repaired.matches('}').count();
    if open_braces > close_braces {
        repaired.extend(std::iter::repeat('}').take(open_braces - close_braces));
    }
    let open_brackets = repaired.matches('[').count();
    let close_brackets = repaired.matches(']').count();
    if open_brackets > close_brackets {
        repaired.extend(std::iter::repeat(']').take(open_brackets - close_brackets));
    }

    repaired
}

fn try_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn snippet(raw: &str) -> String {
    if raw.len() <= RAW_SNIPPET_LEN {
        raw.to_string()
    } else {
        let mut end = RAW_SNIPPET_LEN;
        while !raw.is_char_boundary(end) {
            end -= 1;
        }
        raw[..end].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_json_parses_without_repair() {
        let result = parse_completion(r#"{"invoice_number": "INV-1", "total_amount": 10.5}"#);
        assert!(result.success);
        assert!(!result.was_repaired);
        let data = result.data.unwrap();
        assert_eq!(data["invoice_number"], "INV-1");
    }

    #[test]
    fn fenced_block_with_prose() {
        let response = "Here is the extracted data:\n```json\n{\"vendor_name\": \"Acme\"}\n```\nLet me know if you need more.";
        let result = parse_completion(response);
        assert!(result.success);
        assert!(!result.was_repaired, "fence recovery is not a repair");
        assert_eq!(result.data.unwrap()["vendor_name"], "Acme");
    }

    #[test]
    fn bare_fence_without_language_tag() {
        let result = parse_completion("```\n{\"a\": 1}\n```");
        assert!(result.success);
        assert_eq!(result.data.unwrap()["a"], 1);
    }

    #[test]
    fn object_embedded_in_prose() {
        let result = parse_completion("Sure! {\"total_amount\": 99.99} Hope that helps.");
        assert!(result.success);
        assert!(!result.was_repaired);
    }

    #[test]
    fn trailing_comma_is_repaired() {
        let result = parse_completion(r#"{"a": 1, "b": 2,}"#);
        assert!(result.success);
        assert!(result.was_repaired);
        let data = result.data.unwrap();
        assert_eq!(data["a"], 1);
        assert_eq!(data["b"], 2);
    }

    #[test]
    fn single_quotes_and_bare_keys() {
        let result = parse_completion("{vendor: 'Acme Corp', 'total': '10.00'}");
        assert!(result.success, "got: {:?}", result.error);
        assert!(result.was_repaired);
        let data = result.data.unwrap();
        assert_eq!(data["vendor"], "Acme Corp");
        assert_eq!(data["total"], "10.00");
    }

    #[test]
    fn missing_closing_brace_is_balanced() {
        let result = parse_completion(r#"{"items": [{"a": 1}], "total": 5"#);
        assert!(result.success);
        assert!(result.was_repaired);
    }

    #[test]
    fn hopeless_input_fails_with_bounded_snippet() {
        let garbage = "no json here at all ".repeat(60);
        let result = parse_completion(&garbage);
        assert!(!result.success);
        assert!(result.data.is_none());
        assert!(result.raw_response.len() <= 500);
        assert!(result.error.is_some());
    }

    #[test]
    fn empty_completion_fails() {
        let result = parse_completion("   \n  ");
        assert!(!result.success);
    }

    #[test]
    fn top_level_array_is_not_an_object() {
        // An array completion offers no field map to extract from.
        let result = parse_completion(r#"[{"a": 1}]"#);
        assert!(result.success, "inner object is recoverable via brace span");
    }

    #[test]
    fn strict_variant_propagates_failure() {
        let err = parse_completion_strict("total garbage").unwrap_err();
        assert_eq!(err.code(), "PARSE_FAILURE");
    }

    #[test]
    fn repair_is_idempotent_on_valid_json() {
        let valid = r#"{"a": 1, "b": [2, 3]}"#;
        assert_eq!(repair_json(valid), valid);
    }
}
