//! Structured-output parser: decode raw LLM text into schema-validated records.
//!
//! Five strategies are attempted in order against each response; the first
//! strategy to produce a value that survives schema validation wins. Every
//! attempt, successful or not, is recorded in [`ParserStats`] so callers can
//! see which strategies are actually earning their keep in production.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use super::types::{FieldSpec, FieldType};
use super::validation::{validate_fields, ValidationError};

/// Ordered strategies the parser attempts. Order is part of the contract:
/// each later strategy exists to catch inputs the earlier ones reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Decode the whole response as JSON.
    Direct,
    /// Scan for the first balanced `[...]`, honoring quotes/escapes.
    ArrayExtraction,
    /// Split on newlines, decode each non-empty line, accumulate successes.
    LineByLine,
    /// Depth-counted scan for balanced `{...}` candidates.
    ObjectRegex,
    /// `score: <float>` / `comment: <text>` patterns for degraded responses.
    ScoreCommentRegex,
}

impl Strategy {
    const ALL: [Strategy; 5] = [
        Strategy::Direct,
        Strategy::ArrayExtraction,
        Strategy::LineByLine,
        Strategy::ObjectRegex,
        Strategy::ScoreCommentRegex,
    ];

    fn label(self) -> &'static str {
        match self {
            Strategy::Direct => "direct",
            Strategy::ArrayExtraction => "array_extraction",
            Strategy::LineByLine => "line_by_line",
            Strategy::ObjectRegex => "object_regex",
            Strategy::ScoreCommentRegex => "score_comment_regex",
        }
    }
}

/// Per-strategy attempt/success counters, safe to share across concurrent callers.
#[derive(Debug, Default)]
pub struct ParserStats {
    attempts: [AtomicU64; 5],
    successes: [AtomicU64; 5],
    clamped_numerics: AtomicU64,
    truncated_strings: AtomicU64,
}

impl ParserStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_attempt(&self, strategy: Strategy) {
        self.attempts[strategy as usize].fetch_add(1, Ordering::Relaxed);
    }

    fn record_success(&self, strategy: Strategy) {
        self.successes[strategy as usize].fetch_add(1, Ordering::Relaxed);
    }

    /// Attempts made for a given strategy so far.
    pub fn attempts(&self, strategy: Strategy) -> u64 {
        self.attempts[strategy as usize].load(Ordering::Relaxed)
    }

    /// Successes recorded for a given strategy so far.
    pub fn successes(&self, strategy: Strategy) -> u64 {
        self.successes[strategy as usize].load(Ordering::Relaxed)
    }

    /// Number of numeric fields clamped into range across all parses.
    pub fn clamped_numerics(&self) -> u64 {
        self.clamped_numerics.load(Ordering::Relaxed)
    }

    /// Number of strings truncated across all parses.
    pub fn truncated_strings(&self) -> u64 {
        self.truncated_strings.load(Ordering::Relaxed)
    }
}

/// Error raised once every strategy has been exhausted.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub kind: String,
    pub attempted_strategies: Vec<String>,
    pub last_error: String,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "parse error ({}): attempted {:?}, last error: {}",
            self.kind, self.attempted_strategies, self.last_error
        )
    }
}

impl std::error::Error for ParseError {}

/// Default maximum string length before truncation with an ellipsis.
const DEFAULT_MAX_STRING_LEN: usize = 4000;

/// Sentinel string inserted in place of a truncated tail.
const TRUNCATION_MARKER: &str = "...";

/// Stateless structured-output parser holding precompiled regex patterns
/// and shared telemetry. Construct once per process; `parse`/`parse_batch`
/// take `&self` so the same instance serves concurrent callers.
pub struct Parser {
    stats: ParserStats,
    max_string_len: usize,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Self {
            stats: ParserStats::new(),
            max_string_len: DEFAULT_MAX_STRING_LEN,
        }
    }

    pub fn with_max_string_len(mut self, max_string_len: usize) -> Self {
        self.max_string_len = max_string_len;
        self
    }

    pub fn stats(&self) -> &ParserStats {
        &self.stats
    }

    /// Decode `raw_text` into a single record matching `schema`.
    pub fn parse(&self, raw_text: &str, schema: &[FieldSpec]) -> Result<Value, ParseError> {
        let mut attempted = Vec::new();
        let mut last_error = String::new();

        for strategy in Strategy::ALL {
            self.stats.record_attempt(strategy);
            attempted.push(strategy.label().to_string());

            let candidates = match strategy {
                Strategy::Direct => direct(raw_text).into_iter().collect::<Vec<_>>(),
                Strategy::ArrayExtraction => array_extraction(raw_text)
                    .map(|v| vec![v])
                    .unwrap_or_default(),
                Strategy::LineByLine => line_by_line(raw_text),
                Strategy::ObjectRegex => object_regex(raw_text),
                Strategy::ScoreCommentRegex => score_comment_regex(raw_text)
                    .map(|v| vec![v])
                    .unwrap_or_default(),
            };

            for mut candidate in candidates {
                self.normalize_and_clamp(&mut candidate, schema);
                if validate_fields(&candidate, schema).is_ok() {
                    self.stats.record_success(strategy);
                    return Ok(candidate);
                }
                last_error = format!("{} did not validate against schema", strategy.label());
            }

            if last_error.is_empty() {
                last_error = format!("{} produced no candidates", strategy.label());
            }
        }

        Err(ParseError {
            kind: "single_record".to_string(),
            attempted_strategies: attempted,
            last_error,
        })
    }

    /// Decode `raw_text` into exactly `expected_count` records matching
    /// `item_schema`, padding with sentinel `{error, partial_text}` records
    /// on shortfall. A single malformed item never fails the whole batch.
    pub fn parse_batch(
        &self,
        raw_text: &str,
        item_schema: &[FieldSpec],
        expected_count: usize,
    ) -> Vec<Value> {
        let mut items = self.decode_batch_items(raw_text, item_schema);

        while items.len() < expected_count {
            items.push(serde_json::json!({
                "error": "parse_shortfall",
                "partial_text": truncate_for_sentinel(raw_text, self.max_string_len),
            }));
        }
        items.truncate(expected_count.max(items.len().min(expected_count)));
        items
    }

    fn decode_batch_items(&self, raw_text: &str, item_schema: &[FieldSpec]) -> Vec<Value> {
        // Array-extraction is the natural batch strategy; fall back to
        // line-by-line/object-regex for responses that never formed one.
        let mut out = Vec::new();

        if let Some(Value::Array(arr)) = array_extraction(raw_text) {
            self.stats.record_attempt(Strategy::ArrayExtraction);
            let mut any_valid = false;
            for mut v in arr {
                self.normalize_and_clamp(&mut v, item_schema);
                if validate_fields(&v, item_schema).is_ok() {
                    any_valid = true;
                    out.push(v);
                } else {
                    out.push(serde_json::json!({
                        "error": "item_validation_failed",
                        "partial_text": truncate_for_sentinel(&v.to_string(), self.max_string_len),
                    }));
                }
            }
            if any_valid {
                self.stats.record_success(Strategy::ArrayExtraction);
                return out;
            }
            out.clear();
        }

        for strategy in [Strategy::LineByLine, Strategy::ObjectRegex] {
            self.stats.record_attempt(strategy);
            let candidates = match strategy {
                Strategy::LineByLine => line_by_line(raw_text),
                Strategy::ObjectRegex => object_regex(raw_text),
                _ => unreachable!(),
            };
            let mut found = false;
            for mut candidate in candidates {
                self.normalize_and_clamp(&mut candidate, item_schema);
                if validate_fields(&candidate, item_schema).is_ok() {
                    found = true;
                    out.push(candidate);
                }
            }
            if found {
                self.stats.record_success(strategy);
                return out;
            }
        }

        out
    }

    /// Apply numeric clamping and string truncation to every field the
    /// schema knows about, mutating `value` in place.
    fn normalize_and_clamp(&self, value: &mut Value, schema: &[FieldSpec]) {
        let Some(obj) = value.as_object_mut() else {
            return;
        };
        for field in schema {
            if let Some(v) = obj.get_mut(&field.name) {
                self.normalize_field(v, &field.field_type);
            }
        }
    }

    fn normalize_field(&self, value: &mut Value, field_type: &FieldType) {
        match field_type {
            FieldType::Float => {
                if let Some(n) = value.as_f64() {
                    let normalized = normalize_score(n);
                    if (normalized - n).abs() > f64::EPSILON {
                        self.stats.clamped_numerics.fetch_add(1, Ordering::Relaxed);
                    }
                    *value = serde_json::json!(normalized);
                }
            }
            FieldType::Integer => {
                if let Some(n) = value.as_f64() {
                    let normalized = normalize_score(n).round() as i64;
                    if (normalized as f64 - n).abs() > f64::EPSILON {
                        self.stats.clamped_numerics.fetch_add(1, Ordering::Relaxed);
                    }
                    *value = serde_json::json!(normalized);
                }
            }
            FieldType::String => {
                if let Some(s) = value.as_str() {
                    if s.len() > self.max_string_len {
                        self.stats.truncated_strings.fetch_add(1, Ordering::Relaxed);
                        *value = Value::String(truncate_for_sentinel(s, self.max_string_len));
                    }
                }
            }
            FieldType::List(inner) => {
                if let Some(arr) = value.as_array_mut() {
                    for item in arr {
                        self.normalize_field(item, inner);
                    }
                }
            }
            FieldType::Object(fields) => {
                self.normalize_and_clamp(value, fields);
            }
            _ => {}
        }
    }
}

/// Clamp a decoded numeric score into `[0, 10]`, first dividing by 10 when
/// the model answered on a 0-100 scale (detected by `> 10`).
fn normalize_score(n: f64) -> f64 {
    let scaled = if n > 10.0 { n / 10.0 } else { n };
    scaled.clamp(0.0, 10.0)
}

/// Normalize a confidence value into `[0, 1]`.
pub fn normalize_confidence(n: f64) -> f64 {
    if n > 1.0 {
        (n / 100.0).clamp(0.0, 1.0)
    } else {
        n.clamp(0.0, 1.0)
    }
}

fn truncate_for_sentinel(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        let cut = s
            .char_indices()
            .take_while(|(i, _)| *i < max_len)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        format!("{}{}", &s[..cut], TRUNCATION_MARKER)
    }
}

/// Strategy 1: decode the entire response as JSON.
fn direct(raw_text: &str) -> Option<Value> {
    serde_json::from_str(raw_text.trim()).ok()
}

/// Strategy 2: scan for the first balanced `[...]`, honoring quotes/escapes, decode it.
fn array_extraction(raw_text: &str) -> Option<Value> {
    let bytes = raw_text.as_bytes();
    let start = raw_text.find('[')?;

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    let mut end = None;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        let c = b as char;
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    end = Some(i);
                    break;
                }
            }
            _ => {}
        }
    }

    let end = end?;
    serde_json::from_str(&raw_text[start..=end]).ok()
}

/// Strategy 3: split on newlines, decode each non-empty line, accumulate successes.
fn line_by_line(raw_text: &str) -> Vec<Value> {
    raw_text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .collect()
}

/// Strategy 4: depth-counted scan for balanced `{...}` candidates, decode each.
fn object_regex(raw_text: &str) -> Vec<Value> {
    let bytes = raw_text.as_bytes();
    let mut out = Vec::new();
    let mut i = 0usize;

    while i < bytes.len() {
        if bytes[i] as char == '{' {
            let mut depth = 0i32;
            let mut in_string = false;
            let mut escaped = false;
            let mut end = None;

            for (j, &b) in bytes.iter().enumerate().skip(i) {
                let c = b as char;
                if in_string {
                    if escaped {
                        escaped = false;
                    } else if c == '\\' {
                        escaped = true;
                    } else if c == '"' {
                        in_string = false;
                    }
                    continue;
                }
                match c {
                    '"' => in_string = true,
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            end = Some(j);
                            break;
                        }
                    }
                    _ => {}
                }
            }

            if let Some(end) = end {
                if let Ok(v) = serde_json::from_str::<Value>(&raw_text[i..=end]) {
                    out.push(v);
                }
                i = end + 1;
                continue;
            }
        }
        i += 1;
    }

    out
}

fn score_comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)score\s*[:=]\s*([0-9]+(?:\.[0-9]+)?)\s*[,;\n]?\s*comment\s*[:=]\s*(.+)")
            .expect("static regex is valid")
    })
}

/// Strategy 5: `score: <float>` / `comment: <text>` for degraded Critic responses.
fn score_comment_regex(raw_text: &str) -> Option<Value> {
    let caps = score_comment_re().captures(raw_text)?;
    let score: f64 = caps.get(1)?.as_str().parse().ok()?;
    let comment = caps.get(2)?.as_str().trim().trim_end_matches(['.', '"']).to_string();
    Some(serde_json::json!({ "score": score, "comment": comment }))
}
