//! Response parsing: raw model text to candidate issues.
//!
//! Model output is untrusted. It may wrap the JSON in prose or markdown fences,
//! leave trailing commas, use smart quotes, or contain no JSON at all. Nothing
//! here fails: every input ends as a [`ParseOutcome`].

use std::sync::OnceLock;

use quill_config::ReviewSettings;
use regex::Regex;
use serde_json::Value;

/// Candidate fragments tried before falling back to the greedy span.
const MAX_CANDIDATES: usize = 64;

/// An unvalidated finding as the model reported it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawIssue {
    /// 1-based, excerpt-relative. `None` when absent or not a number.
    pub line: Option<i64>,
    pub message: String,
    pub severity: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    Parsed,
    NoArray,
    Invalid,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// A JSON array was found; these are its usable elements, in order.
    Parsed(Vec<RawIssue>),
    /// The text contains no bracketed array at all.
    NoArray,
    /// Something array-shaped was present but would not parse.
    Invalid { error: String },
}

impl ParseOutcome {
    /// Issue list with "no array" and "unparseable" both read as no issues.
    #[must_use]
    pub fn into_issues(self) -> Vec<RawIssue> {
        match self {
            Self::Parsed(issues) => issues,
            Self::NoArray | Self::Invalid { .. } => Vec::new(),
        }
    }

    #[must_use]
    pub const fn status(&self) -> ParseStatus {
        match self {
            Self::Parsed(_) => ParseStatus::Parsed,
            Self::NoArray => ParseStatus::NoArray,
            Self::Invalid { .. } => ParseStatus::Invalid,
        }
    }
}

/// Balanced `[...]` fragment starting at `text[0]`, ignoring brackets inside strings.
fn balanced_array(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            _ if in_string => {}
            '[' => depth += 1,
            ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Repairs common model slips: trailing commas, smart quotes, stray control characters.
fn repair_json(json: &str) -> String {
    static TRAILING_COMMA: OnceLock<Regex> = OnceLock::new();
    let trailing_comma = TRAILING_COMMA
        .get_or_init(|| Regex::new(r",(\s*[\]}])").expect("trailing comma pattern is valid"));

    let normalized: String = json
        .chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' => '"',
            '\u{2018}' | '\u{2019}' => '\'',
            other => other,
        })
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t' | '\r'))
        .collect();
    trailing_comma.replace_all(&normalized, "$1").into_owned()
}

fn parse_array(fragment: &str) -> Result<Vec<Value>, String> {
    let first_error = match serde_json::from_str::<Value>(fragment) {
        Ok(Value::Array(items)) => return Ok(items),
        Ok(_) => return Err("fragment is not an array".to_string()),
        Err(e) => e.to_string(),
    };
    match serde_json::from_str::<Value>(&repair_json(fragment)) {
        Ok(Value::Array(items)) => Ok(items),
        _ => Err(first_error),
    }
}


fn line_number(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn raw_issue(value: &Value) -> Option<RawIssue> {
    let object = value.as_object()?;
    let message = object
        .get("message")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|m| !m.is_empty())?;
    Some(RawIssue {
        line: object.get("line").and_then(line_number),
        message: message.to_string(),
        severity: object
            .get("severity")
            .and_then(Value::as_str)
            .map(ToString::to_string),
    })
}

fn issues_from(items: &[Value]) -> Vec<RawIssue> {
    items.iter().filter_map(raw_issue).collect()
}

/// Extract the issue list from raw model text.
#[must_use]
pub fn parse_issues(text: &str) -> ParseOutcome {
    let Some(first_open) = text.find('[') else {
        return ParseOutcome::NoArray;
    };

    let candidates = text
        .char_indices()
        .filter(|(_, c)| *c == '[')
        .take(MAX_CANDIDATES)
        .filter_map(|(i, _)| balanced_array(&text[i..]));
    // `[1, 2]` in prose is not a finding list, and a bare `[]` only counts
    // when no later array holds objects.
    let mut saw_empty = false;
    for fragment in candidates {
        match parse_array(fragment) {
            Ok(items) if items.iter().any(Value::is_object) => {
                return ParseOutcome::Parsed(issues_from(&items));
            }
            Ok(items) if items.is_empty() => saw_empty = true,
            _ => {}
        }
    }
    if saw_empty {
        return ParseOutcome::Parsed(Vec::new());
    }

    let Some(last_close) = text.rfind(']').filter(|close| *close > first_open) else {
        return ParseOutcome::Invalid {
            error: "unterminated array".to_string(),
        };
    };
    match parse_array(&text[first_open..=last_close]) {
        Ok(items) => ParseOutcome::Parsed(issues_from(&items)),
        Err(error) => ParseOutcome::Invalid { error },
    }
}

/// First fenced code block's body, without the fence or its language tag.
#[must_use]
pub fn first_code_block(text: &str) -> Option<String> {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| {
        Regex::new(r"```[^\n`]*\r?\n([\s\S]*?)```").expect("code fence pattern is valid")
    });
    fence
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|body| body.as_str().trim_end_matches(['\n', '\r']).to_string())
}

/// Second line of defence on quick reviews: drops findings the model was told
/// to suppress but reported anyway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityFilter {
    min_message_chars: usize,
    low_value_keywords: Vec<String>,
}

impl QualityFilter {
    #[must_use]
    pub fn new(min_message_chars: usize, low_value_keywords: &[&str]) -> Self {
        Self {
            min_message_chars,
            low_value_keywords: low_value_keywords
                .iter()
                .map(|k| k.to_lowercase())
                .collect(),
        }
    }

    #[must_use]
    pub fn from_settings(settings: &ReviewSettings) -> Self {
        Self {
            min_message_chars: settings.min_message_chars,
            low_value_keywords: settings
                .low_value_keywords
                .iter()
                .map(|k| k.to_lowercase())
                .collect(),
        }
    }

    #[must_use]
    pub fn accepts(&self, issue: &RawIssue) -> bool {
        let message = issue.message.trim();
        if message.chars().count() < self.min_message_chars {
            return false;
        }
        let lowered = message.to_lowercase();
        !self
            .low_value_keywords
            .iter()
            .any(|keyword| lowered.contains(keyword.as_str()))
    }

    #[must_use]
    pub fn apply(&self, issues: Vec<RawIssue>) -> Vec<RawIssue> {
        issues.into_iter().filter(|i| self.accepts(i)).collect()
    }
}

impl Default for QualityFilter {
    fn default() -> Self {
        Self::from_settings(&ReviewSettings::default())
    }
}
