//! Constraint source text and diagnostic quoting.
//!
//! The external loader stores the constraint text verbatim, together with
//! the file position where it begins, so violation messages can quote the
//! offending subexpression exactly as the author wrote it, indentation
//! included.

use std::fmt::Write;

use crate::ast::SourceSpan;

/// Position in the enclosing file where a constraint's text begins.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConstraintLocation {
    pub file_path: String,
    /// 1-based line of the first constraint character.
    pub line: u32,
    /// 1-based column of the first constraint character.
    pub column: u32,
}

/// Verbatim constraint text plus its anchor in the enclosing file.
///
/// Expression spans are relative to `constraint_string`; the location lifts
/// them back to file coordinates for the quote header.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConstraintSource {
    pub constraint_string: String,
    pub constraint_location: ConstraintLocation,
}

impl ConstraintSource {
    /// Quote the text under `span` with a `file:line:column:` header and a
    /// caret underline for single-line spans.
    ///
    /// Returns `None` when the span falls outside the stored text, which
    /// callers treat as an internal error: spans come from the same
    /// compiler run that produced the text.
    pub fn quote_span(&self, span: &SourceSpan) -> Option<String> {
        let lines: Vec<&str> = self.constraint_string.lines().collect();
        let start = span.start;
        let end = span.end;
        if start.line == 0 || start.column == 0 || end.line < start.line {
            return None;
        }
        if end.line as usize > lines.len() {
            return None;
        }
        if start.line == end.line && end.column < start.column {
            return None;
        }

        // Lift the relative start position to file coordinates. Columns
        // shift only on the constraint's first line.
        let file_line = self.constraint_location.line + start.line - 1;
        let file_column = if start.line == 1 {
            self.constraint_location.column + start.column - 1
        } else {
            start.column
        };

        let mut out = String::new();
        writeln!(
            out,
            "{}:{}:{}:",
            self.constraint_location.file_path, file_line, file_column
        )
        .ok()?;
        for line_no in start.line..=end.line {
            let text = lines[(line_no - 1) as usize];
            writeln!(out, "  | {}", text).ok()?;
        }
        if start.line == end.line {
            let text = lines[(start.line - 1) as usize];
            if (end.column - 1) as usize > text.chars().count() {
                return None;
            }
            let pad = " ".repeat((start.column - 1) as usize);
            let width = (end.column - start.column).max(1) as usize;
            writeln!(out, "  | {}{}", pad, "^".repeat(width)).ok()?;
        }
        Some(out)
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
