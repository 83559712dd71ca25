//! Python well-formedness check
//!
//! Generated modules are parsed with `rustpython-parser`, so anything the
//! Python grammar rejects is reported with the line it failed on. Leftover
//! markdown fences get their own message since they are the most common way
//! a generation breaks.

use crate::error::VerificationError;
use rustpython_parser::{parse, Mode};

fn syntax_error(line: usize, message: impl Into<String>) -> VerificationError {
    VerificationError::SyntaxError {
        line,
        message: message.into(),
    }
}

/// 1-based line of a byte offset, clamped to the end of `source`
fn line_of(source: &str, offset: usize) -> usize {
    let end = offset.min(source.len());
    let prefix = source.get(..end).unwrap_or(source);
    prefix.matches('\n').count() + 1
}

/// Check that `source` parses as a Python module
pub fn check_python(source: &str) -> Result<(), VerificationError> {
    if let Some(idx) = source
        .lines()
        .position(|line| line.trim_start().starts_with("```"))
    {
        return Err(syntax_error(idx + 1, "leftover markdown code fence"));
    }

    parse(source, Mode::Module, "<generated>")
        .map(|_| ())
        .map_err(|e| {
            let offset = u32::from(e.offset) as usize;
            syntax_error(line_of(source, offset), e.error.to_string())
        })
}
