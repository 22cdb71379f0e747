//! Checker error type.
//!
//! Every failure is one of two kinds. *Invalid argument* means the caller's
//! data (an entry, an action invocation, or the interchange metadata) is
//! inconsistent with the pipeline description. *Internal* means a
//! well-typed expression produced a mis-typed intermediate result at
//! runtime, which indicates a bug in the external type checker or loader,
//! never in the caller. Internal variants carry a source quote where one
//! could be produced.

use std::fmt;

/// Failure class, used by callers to decide who is at fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// Entry references a table id the pipeline does not declare.
    UnknownTable { table_id: u32 },
    /// Entry references an action id the pipeline does not declare.
    UnknownAction { action_id: u32 },
    /// Match field id not declared for this table.
    UnknownKey { table: String, field_id: u32 },
    /// Action parameter id not declared for this action.
    UnknownParam { action: String, param_id: u32 },
    /// The same match field appears twice in one entry.
    DuplicateKey { table: String, field_id: u32 },
    /// The same parameter appears twice in one invocation.
    DuplicateParam { action: String, param_id: u32 },
    /// Exact keys are mandatory; the entry omitted one.
    MissingExactKey { table: String, key: String },
    /// Declared parameter absent from the invocation.
    MissingParam { action: String, param: String },
    /// Wire payload kind disagrees with the key's declared match kind.
    MatchKindMismatch {
        key: String,
        expected: String,
        got: String,
    },
    /// Decoded wire integer does not fit the declared bit-width.
    ValueOutOfRange {
        context: String,
        value: String,
        bitwidth: u32,
    },
    /// LPM prefix length outside `[0, bitwidth]`.
    InvalidPrefixLength {
        key: String,
        prefix_length: u32,
        bitwidth: u32,
    },
    /// Range endpoints with `low > high`.
    InvertedRange { key: String, low: String, high: String },
    /// Malformed interchange metadata.
    DeserializeError { message: String },

    /// Evaluated value disagrees with the node's declared type.
    TypeMismatch {
        expected: String,
        got: String,
        quote: String,
    },
    /// Variable not bound in the environment.
    UnboundName { name: String, quote: String },
    /// Field projection the value does not support.
    IllegalFieldAccess {
        field: String,
        value_type: String,
        quote: String,
    },
    /// Cast between types the language does not relate.
    IllegalCast {
        from: String,
        to: String,
        quote: String,
    },
    /// Checked cast whose operand is outside the target range.
    CastOutOfRange {
        value: String,
        target: String,
        quote: String,
    },
    /// AST shape the evaluator cannot process.
    MalformedExpression { message: String, quote: String },
    /// Explanation search walked into a non-boolean node.
    NonBooleanExplanation { quote: String },
}

impl EvalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EvalError::UnknownTable { .. }
            | EvalError::UnknownAction { .. }
            | EvalError::UnknownKey { .. }
            | EvalError::UnknownParam { .. }
            | EvalError::DuplicateKey { .. }
            | EvalError::DuplicateParam { .. }
            | EvalError::MissingExactKey { .. }
            | EvalError::MissingParam { .. }
            | EvalError::MatchKindMismatch { .. }
            | EvalError::ValueOutOfRange { .. }
            | EvalError::InvalidPrefixLength { .. }
            | EvalError::InvertedRange { .. }
            | EvalError::DeserializeError { .. } => ErrorKind::InvalidArgument,

            EvalError::TypeMismatch { .. }
            | EvalError::UnboundName { .. }
            | EvalError::IllegalFieldAccess { .. }
            | EvalError::IllegalCast { .. }
            | EvalError::CastOutOfRange { .. }
            | EvalError::MalformedExpression { .. }
            | EvalError::NonBooleanExplanation { .. } => ErrorKind::Internal,
        }
    }
}

/// Appends a source quote on its own lines when one is available.
fn with_quote(f: &mut fmt::Formatter<'_>, quote: &str) -> fmt::Result {
    if quote.is_empty() {
        Ok(())
    } else {
        write!(f, "\n{}", quote)
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::UnknownTable { table_id } => {
                write!(f, "table with id {} not declared in pipeline", table_id)
            }
            EvalError::UnknownAction { action_id } => {
                write!(f, "action with id {} not declared in pipeline", action_id)
            }
            EvalError::UnknownKey { table, field_id } => {
                write!(
                    f,
                    "match field with id {} not declared for table '{}'",
                    field_id, table
                )
            }
            EvalError::UnknownParam { action, param_id } => {
                write!(
                    f,
                    "parameter with id {} not declared for action '{}'",
                    param_id, action
                )
            }
            EvalError::DuplicateKey { table, field_id } => {
                write!(
                    f,
                    "match field with id {} given twice for table '{}'",
                    field_id, table
                )
            }
            EvalError::DuplicateParam { action, param_id } => {
                write!(
                    f,
                    "parameter with id {} given twice for action '{}'",
                    param_id, action
                )
            }
            EvalError::MissingExactKey { table, key } => {
                write!(
                    f,
                    "exact key '{}' of table '{}' must be present in entry",
                    key, table
                )
            }
            EvalError::MissingParam { action, param } => {
                write!(
                    f,
                    "parameter '{}' of action '{}' missing from invocation",
                    param, action
                )
            }
            EvalError::MatchKindMismatch { key, expected, got } => {
                write!(
                    f,
                    "match field '{}' declared {} but entry carries a {} payload",
                    key, expected, got
                )
            }
            EvalError::ValueOutOfRange {
                context,
                value,
                bitwidth,
            } => {
                write!(
                    f,
                    "{}: value {} does not fit in {} bits",
                    context, value, bitwidth
                )
            }
            EvalError::InvalidPrefixLength {
                key,
                prefix_length,
                bitwidth,
            } => {
                write!(
                    f,
                    "LPM key '{}': prefix length {} outside [0, {}]",
                    key, prefix_length, bitwidth
                )
            }
            EvalError::InvertedRange { key, low, high } => {
                write!(f, "range key '{}': low {} exceeds high {}", key, low, high)
            }
            EvalError::DeserializeError { message } => {
                write!(f, "malformed constraint metadata: {}", message)
            }
            EvalError::TypeMismatch {
                expected,
                got,
                quote,
            } => {
                write!(f, "expected value of type {}, got {}", expected, got)?;
                with_quote(f, quote)
            }
            EvalError::UnboundName { name, quote } => {
                write!(f, "name '{}' not bound in environment", name)?;
                with_quote(f, quote)
            }
            EvalError::IllegalFieldAccess {
                field,
                value_type,
                quote,
            } => {
                write!(f, "value of type {} has no field '{}'", value_type, field)?;
                with_quote(f, quote)
            }
            EvalError::IllegalCast { from, to, quote } => {
                write!(f, "cannot cast {} to {}", from, to)?;
                with_quote(f, quote)
            }
            EvalError::CastOutOfRange {
                value,
                target,
                quote,
            } => {
                write!(f, "value {} out of range for cast to {}", value, target)?;
                with_quote(f, quote)
            }
            EvalError::MalformedExpression { message, quote } => {
                write!(f, "malformed expression: {}", message)?;
                with_quote(f, quote)
            }
            EvalError::NonBooleanExplanation { quote } => {
                write!(f, "explanation search reached a non-boolean node")?;
                with_quote(f, quote)
            }
        }
    }
}

impl std::error::Error for EvalError {}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
