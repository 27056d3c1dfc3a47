//! Prompt construction.
//!
//! A pure mapping from a task and its inputs to prompt text plus generation
//! parameters. Model output is never inspected here.

use std::fmt::Write as _;

use quill_types::{GenerationParams, LineSpan, NonEmptyString};
use serde::{Deserialize, Serialize};

use crate::document::Document;

/// Chat requests run warmer than code tasks.
pub const CHAT_PARAMS: GenerationParams = GenerationParams::fixed(0.7, 2048);

pub const CHAT_SYSTEM_INSTRUCTION: &str = "You are Quill, a coding assistant embedded in a code \
editor. Answer programming questions precisely. Put code in fenced code blocks tagged with \
their language. When a question is ambiguous, say what you assumed.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Full-strength review returning a JSON issue list.
    Review,
    /// Stricter review of a selection; only definite problems.
    QuickReview,
    Explain,
    Fix,
    Refactor,
    GenerateTests,
    /// Scoped fix for one diagnostic, with surrounding context.
    FixDiagnostic,
}

impl TaskKind {
    #[must_use]
    pub const fn params(self) -> GenerationParams {
        match self {
            Self::Review => GenerationParams::fixed(0.0, 2048),
            Self::QuickReview => GenerationParams::fixed(0.0, 1024),
            Self::Explain | Self::Fix | Self::FixDiagnostic => GenerationParams::fixed(0.3, 2048),
            Self::Refactor | Self::GenerateTests => GenerationParams::fixed(0.3, 4096),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Review => "review",
            Self::QuickReview => "quick_review",
            Self::Explain => "explain",
            Self::Fix => "fix",
            Self::Refactor => "refactor",
            Self::GenerateTests => "generate_tests",
            Self::FixDiagnostic => "fix_diagnostic",
        }
    }

    /// Whether the reply must follow the JSON issue-list contract.
    #[must_use]
    pub const fn expects_issue_list(self) -> bool {
        matches!(self, Self::Review | Self::QuickReview)
    }
}

/// Lines surrounding a diagnostic, clamped to the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixContext {
    target_line: usize,
    span: LineSpan,
    lines: Vec<String>,
}

impl FixContext {
    /// `radius` lines on each side of `line`, clamped to `[0, line_count)`.
    #[must_use]
    pub fn around(document: &dyn Document, line: usize, radius: usize) -> Self {
        let last = document.line_count().max(1) - 1;
        let target_line = line.min(last);
        let span = LineSpan::new(
            target_line.saturating_sub(radius),
            target_line.saturating_add(radius).min(last),
        )
        .unwrap_or(LineSpan::single(target_line));
        let lines = (span.start()..=span.end())
            .map(|index| document.line_at(index).unwrap_or_default().to_string())
            .collect();
        Self {
            target_line,
            span,
            lines,
        }
    }

    #[must_use]
    pub const fn target_line(&self) -> usize {
        self.target_line
    }

    #[must_use]
    pub const fn span(&self) -> LineSpan {
        self.span
    }

    #[must_use]
    pub const fn start_line(&self) -> usize {
        self.span.start()
    }

    #[must_use]
    pub const fn end_line(&self) -> usize {
        self.span.end()
    }

    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    #[must_use]
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PromptRequest<'a> {
    pub task: TaskKind,
    pub code: &'a NonEmptyString,
    pub language: Option<&'a str>,
    /// Required context for [`TaskKind::FixDiagnostic`]; ignored otherwise.
    pub context: Option<&'a FixContext>,
    /// The finding a [`TaskKind::FixDiagnostic`] request should resolve.
    pub problem: Option<&'a str>,
}

impl<'a> PromptRequest<'a> {
    #[must_use]
    pub fn new(task: TaskKind, code: &'a NonEmptyString) -> Self {
        Self {
            task,
            code,
            language: None,
            context: None,
            problem: None,
        }
    }

    #[must_use]
    pub fn language(mut self, language: &'a str) -> Self {
        self.language = Some(language).filter(|l| !l.trim().is_empty());
        self
    }

    #[must_use]
    pub fn fix_context(mut self, context: &'a FixContext, problem: &'a str) -> Self {
        self.context = Some(context);
        self.problem = Some(problem);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub text: String,
    pub params: GenerationParams,
}

/// Prefix each line with its 1-based number so the model reports excerpt-relative lines.
#[must_use]
pub fn numbered_excerpt(code: &str) -> String {
    let mut out = String::with_capacity(code.len() + code.len() / 8);
    for (index, line) in code.lines().enumerate() {
        let _ = writeln!(out, "{}: {line}", index + 1);
    }
    out
}

const ISSUE_FORMAT: &str = "Respond with ONLY a JSON array. Each element must be an object \
{\"line\": <line number from the listing>, \"message\": \"<what is wrong and why>\", \
\"severity\": \"error\" | \"warning\" | \"info\"}.\n\
Do not wrap the array in markdown code fences and do not add any text before or after it.\n\
Do not report purely stylistic preferences.\n\
If the code has no issues, respond with [].";

fn fence(language: Option<&str>, code: &str) -> String {
    format!("```{}\n{code}\n```", language.unwrap_or_default())
}

fn language_phrase(language: Option<&str>) -> String {
    language.map_or_else(|| "the following".to_string(), |l| format!("the following {l}"))
}

#[must_use]
pub fn build(request: &PromptRequest<'_>) -> Prompt {
    let code = request.code.as_str();
    let lang = request.language;
    let subject = language_phrase(lang);

    let text = match request.task {
        TaskKind::Review => format!(
            "You are an expert code reviewer. Review {subject} code for bugs, security \
             vulnerabilities, performance problems, and missing error handling.\n\
             Lines are numbered starting at 1.\n\n{ISSUE_FORMAT}\n\nCode:\n{}",
            numbered_excerpt(code)
        ),
        TaskKind::QuickReview => format!(
            "You are a strict code reviewer. Check {subject} code and report only definite \
             bugs or security problems. Ignore comments, naming, formatting, and style \
             entirely. Keep each message to one sentence.\n\
             Lines are numbered starting at 1.\n\n{ISSUE_FORMAT}\n\nCode:\n{}",
            numbered_excerpt(code)
        ),
        TaskKind::Explain => format!(
            "Explain what {subject} code does. Start with a one-paragraph summary, then walk \
             through the important parts and point out anything surprising.\n\n{}",
            fence(lang, code)
        ),
        TaskKind::Fix => format!(
            "Find and fix the bugs in {subject} code. Briefly list what was wrong, then give \
             the complete corrected code in a single fenced code block.\n\n{}",
            fence(lang, code)
        ),
        TaskKind::Refactor => format!(
            "Refactor {subject} code for readability and maintainability without changing \
             its behavior. Give the refactored code in a single fenced code block, then \
             summarize the changes.\n\n{}",
            fence(lang, code)
        ),
        TaskKind::GenerateTests => format!(
            "Write unit tests for {subject} code using the idiomatic test framework for the \
             language. Cover normal cases, edge cases, and error paths. Give the tests in a \
             single fenced code block.\n\n{}",
            fence(lang, code)
        ),
        TaskKind::FixDiagnostic => build_fix_diagnostic(request, &subject),
    };

    Prompt {
        text,
        params: request.task.params(),
    }
}

fn build_fix_diagnostic(request: &PromptRequest<'_>, subject: &str) -> String {
    let problem = request.problem.unwrap_or("the reported problem");
    let snippet = request
        .context
        .map_or_else(|| request.code.as_str().to_string(), FixContext::text);
    let target = request.context.map_or(1, |ctx| {
        ctx.target_line() - ctx.start_line() + 1
    });

    format!(
        "Fix this problem in {subject} snippet: {problem}\n\
         The problem is on line {target} of the snippet.\n\
         Return the corrected snippet, all of its lines and nothing else, in a single fenced \
         code block. Keep the indentation and every line that does not need to change. Do \
         not add explanations.\n\n{}",
        fence(request.language, &snippet)
    )
}
