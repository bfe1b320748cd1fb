//! Compiles subject/action/resource templates into the expressions stored
//! next to them.
//!
//! A template is either a plain literal (`"admin"`) or mixes literal text with
//! regular-expression segments wrapped in delimiters (`"file:user:<.*>"`).
//! Literals are stored as-is and matched by equality; delimited templates are
//! turned into a single anchored expression (`^file:user:(.*)$`) so the
//! database can only ever produce full-string matches.

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const TEMPLATE_MAX_LEN: usize = 511;
pub const COMPILED_MAX_LEN: usize = 511;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("template is empty after trimming whitespace")]
    EmptyTemplate,

    #[error("unbalanced `{start}`/`{end}` delimiters in `{template}`")]
    UnbalancedDelimiters {
        template: String,
        start: char,
        end: char,
    },

    #[error("segment `{segment}` is not a valid regular expression: {message}")]
    InvalidSegment { segment: String, message: String },

    #[error("compiled expression `{expression}` is invalid: {message}")]
    InvalidExpression { expression: String, message: String },

    #[error("{field} is {len} bytes long, the limit is {max}")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("delimiters must be two distinct ASCII characters, got `{start}` and `{end}`")]
    InvalidDelimiters { start: char, end: char },
}

/// Start/end markers around regular-expression segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delimiters {
    pub start: char,
    pub end: char,
}

impl Delimiters {
    pub fn new(start: char, end: char) -> Result<Self, TemplateError> {
        if !start.is_ascii() || !end.is_ascii() || start == end {
            return Err(TemplateError::InvalidDelimiters { start, end });
        }
        Ok(Self { start, end })
    }
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            start: '<',
            end: '>',
        }
    }
}

/// Result of compiling one template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledTemplate {
    /// The sanitized template, as stored and returned to callers.
    pub template: String,
    /// Anchored regex. Literal text is escaped, so a literal never compiles
    /// to the same expression as a pattern.
    pub compiled: String,
    /// True iff the template contains the start delimiter.
    pub is_pattern: bool,
}

/// Trims surrounding whitespace; an empty remainder is rejected.
pub fn sanitize(raw: &str) -> Result<&str, TemplateError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(TemplateError::EmptyTemplate);
    }
    Ok(trimmed)
}

pub fn compile(raw: &str, delimiters: Delimiters) -> Result<CompiledTemplate, TemplateError> {
    let template = sanitize(raw)?;
    if template.len() > TEMPLATE_MAX_LEN {
        return Err(TemplateError::TooLong {
            field: "template",
            len: template.len(),
            max: TEMPLATE_MAX_LEN,
        });
    }

    let segments = delimited_segments(template, delimiters)?;
    let is_pattern = template.contains(delimiters.start);

    let compiled = anchored_expression(template, &segments)?;

    if compiled.len() > COMPILED_MAX_LEN {
        return Err(TemplateError::TooLong {
            field: "compiled expression",
            len: compiled.len(),
            max: COMPILED_MAX_LEN,
        });
    }

    Ok(CompiledTemplate {
        template: template.to_string(),
        compiled,
        is_pattern,
    })
}

/// Byte ranges of the outermost delimited segments, delimiters included.
/// Nested delimiters belong to the enclosing segment.
fn delimited_segments(
    template: &str,
    delimiters: Delimiters,
) -> Result<Vec<(usize, usize)>, TemplateError> {
    let unbalanced = || TemplateError::UnbalancedDelimiters {
        template: template.to_string(),
        start: delimiters.start,
        end: delimiters.end,
    };

    let mut segments = Vec::new();
    let mut level = 0usize;
    let mut open = 0usize;

    for (idx, ch) in template.char_indices() {
        if ch == delimiters.start {
            if level == 0 {
                open = idx;
            }
            level += 1;
        } else if ch == delimiters.end {
            level = level.checked_sub(1).ok_or_else(unbalanced)?;
            if level == 0 {
                segments.push((open, idx + ch.len_utf8()));
            }
        }
    }

    if level != 0 {
        return Err(unbalanced());
    }
    Ok(segments)
}

fn anchored_expression(
    template: &str,
    segments: &[(usize, usize)],
) -> Result<String, TemplateError> {
    let mut expression = String::with_capacity(template.len() + 2 * segments.len() + 2);
    expression.push('^');

    let mut literal_start = 0;
    for &(open, close) in segments {
        // Delimiters are ASCII, so the inner range is always on char boundaries
        let segment = &template[open + 1..close - 1];
        Regex::new(segment).map_err(|e| TemplateError::InvalidSegment {
            segment: segment.to_string(),
            message: e.to_string(),
        })?;

        expression.push_str(&regex::escape(&template[literal_start..open]));
        expression.push('(');
        expression.push_str(segment);
        expression.push(')');
        literal_start = close;
    }
    expression.push_str(&regex::escape(&template[literal_start..]));
    expression.push('$');

    Regex::new(&expression).map_err(|e| TemplateError::InvalidExpression {
        expression: expression.clone(),
        message: e.to_string(),
    })?;

    Ok(expression)
}
