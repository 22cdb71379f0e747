#![allow(clippy::result_large_err)]
//! pipegate-eval: checks table entries and action invocations against the
//! constraints a pipeline description attaches to its tables and actions.
//!
//! The checker consumes a pre-built [`ConstraintInfo`] (directly
//! constructed or decoded from the loader's interchange JSON), validates
//! the raw instance into a total binding environment, evaluates the
//! constraint, and -- when it does not hold -- quotes a smallest
//! subexpression that decided the result.
//!
//! # Public API
//!
//! - [`reason_entry_violates_constraint()`] -- the one-call surface:
//!   empty string when satisfied, a quoted diagnostic when not, a typed
//!   [`EvalError`] when the instance is inconsistent with the metadata
//! - [`ConstraintInfo::from_interchange()`] -- decode loader metadata
//! - [`parse_table_entry()`] / [`parse_action()`], [`eval()`],
//!   [`minimal_subexpression()`] -- the individual stages, exposed for
//!   callers that drive them separately

pub mod entry;
pub mod error;
pub mod explain;
pub mod info;
pub mod interpret;
pub mod numeric;
pub mod value;

pub use entry::{
    parse_action, parse_table_entry, ActionCall, ConstraintContext, EvaluationContext, FieldMatch,
    FieldValue, ParamValue, ParsedAction, ParsedEntry, TableEntry,
};
pub use error::{ErrorKind, EvalError};
pub use explain::minimal_subexpression;
pub use info::{
    attribute_info, ActionInfo, AttributeInfo, ConstraintInfo, KeyInfo, ParamInfo, TableInfo,
};
pub use interpret::{eval, eval_to_bool, EvaluationCache};
pub use value::{Integer, Value};

use pipegate_core::{Expression, SizeCache};

/// Checks `entry` against the constraints of its table and, when the entry
/// references an action, of that action.
///
/// Returns the empty string when every applicable constraint is satisfied
/// (or none exists), a human-readable diagnostic quoting a minimal
/// offending subexpression when one is not, and an error when the entry is
/// inconsistent with the pipeline metadata.
pub fn reason_entry_violates_constraint(
    entry: &TableEntry,
    info: &ConstraintInfo,
) -> Result<String, EvalError> {
    let table = info
        .table(entry.table_id)
        .ok_or(EvalError::UnknownTable {
            table_id: entry.table_id,
        })?;

    let mut reason = String::new();
    if let Some(constraint) = &table.constraint {
        let ctx = parse_table_entry(entry, table)?;
        if let Some(quote) = check_constraint(constraint, &ctx)? {
            reason.push_str("All entries must satisfy:\n\n");
            reason.push_str(&quote);
            reason.push_str("\nBut your entry does not.\n");
        }
    }

    if let Some(call) = &entry.action {
        let action = info
            .action(call.action_id)
            .ok_or(EvalError::UnknownAction {
                action_id: call.action_id,
            })?;
        if let Some(constraint) = &action.constraint {
            let ctx = parse_action(call, action)?;
            if let Some(quote) = check_constraint(constraint, &ctx)? {
                if !reason.is_empty() {
                    reason.push('\n');
                }
                reason.push_str("All actions must satisfy:\n\n");
                reason.push_str(&quote);
                reason.push_str("\nBut your entry does not.\n");
            }
        }
    }

    Ok(reason)
}

/// Evaluates one constraint under its environment; returns the quoted
/// minimal witness when it does not hold.
fn check_constraint(
    constraint: &Expression,
    ctx: &EvaluationContext,
) -> Result<Option<String>, EvalError> {
    let mut eval_cache = EvaluationCache::new();
    if eval_to_bool(constraint, ctx, Some(&mut eval_cache))? {
        return Ok(None);
    }
    let mut size_cache = SizeCache::new();
    let witness = minimal_subexpression(constraint, ctx, &mut eval_cache, &mut size_cache)?;
    let quote = ctx
        .source
        .quote_span(&witness.span)
        .ok_or_else(|| EvalError::MalformedExpression {
            message: "witness span falls outside the constraint source".to_string(),
            quote: String::new(),
        })?;
    Ok(Some(quote))
}

// ──────────────────────────────────────────────
// Integration tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod integration_tests {
    use super::*;

    /// End-to-end over interchange metadata: one ternary key whose mask
    /// must be zero, satisfied by the omitted-key wildcard.
    #[test]
    fn satisfied_constraint_yields_empty_string() {
        let doc = serde_json::json!({
            "tables": [{
                "id": 1,
                "name": "acl",
                "keys": [
                    { "id": 1, "name": "dst", "match": "ternary", "bitwidth": 16 }
                ],
                "constraint": {
                    "source": "dst.mask == 0",
                    "location": { "file": "acl.p4", "line": 3, "column": 7 },
                    "expression": {
                        "type": { "kind": "bool" },
                        "start": [1, 1], "end": [1, 14],
                        "binary": {
                            "op": "==",
                            "left": {
                                "type": { "kind": "int" },
                                "start": [1, 1], "end": [1, 9],
                                "field_access": {
                                    "base": {
                                        "type": { "kind": "ternary", "bitwidth": 16 },
                                        "start": [1, 1], "end": [1, 4],
                                        "variable": "dst"
                                    },
                                    "field": "mask"
                                }
                            },
                            "right": {
                                "type": { "kind": "int" },
                                "start": [1, 13], "end": [1, 14],
                                "int_literal": 0
                            }
                        }
                    }
                }
            }]
        });
        let info = ConstraintInfo::from_interchange(&doc).unwrap();
        // The omitted ternary key parses to the wildcard, whose mask is 0.
        let entry = TableEntry {
            table_id: 1,
            match_fields: vec![],
            priority: 0,
            action: None,
        };
        assert_eq!(reason_entry_violates_constraint(&entry, &info).unwrap(), "");
    }

    #[test]
    fn unknown_table_is_invalid_argument() {
        let info = ConstraintInfo::default();
        let entry = TableEntry {
            table_id: 9,
            match_fields: vec![],
            priority: 0,
            action: None,
        };
        let err = reason_entry_violates_constraint(&entry, &info).unwrap_err();
        assert_eq!(err, EvalError::UnknownTable { table_id: 9 });
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn unconstrained_table_accepts_anything() {
        let doc = serde_json::json!({
            "tables": [{ "id": 1, "name": "plain", "keys": [] }]
        });
        let info = ConstraintInfo::from_interchange(&doc).unwrap();
        let entry = TableEntry {
            table_id: 1,
            match_fields: vec![],
            priority: -5,
            action: None,
        };
        assert_eq!(reason_entry_violates_constraint(&entry, &info).unwrap(), "");
    }
}
