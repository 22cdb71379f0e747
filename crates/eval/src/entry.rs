//! Wire-level entry/action instances and the environment builder.
//!
//! [`parse_table_entry`] and [`parse_action`] turn a raw instance plus its
//! metadata into the binding environment the interpreter evaluates under.
//! The environment is total: every declared key is bound, with omitted
//! non-exact keys bound to their canonical wildcard. Anything inconsistent
//! with the metadata is rejected here, so the interpreter can treat the
//! environment as trusted.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use pipegate_core::{ConstraintSource, Type};

use crate::error::EvalError;
use crate::info::{ActionInfo, TableInfo};
use crate::numeric;
use crate::value::{Integer, Value};

// ──────────────────────────────────────────────
// Wire-level instances
// ──────────────────────────────────────────────

/// A table entry as received from the data plane, prior to validation.
/// Match fields may be sparse; integer payloads are big-endian byte
/// strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableEntry {
    pub table_id: u32,
    #[serde(default)]
    pub match_fields: Vec<FieldMatch>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionCall>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMatch {
    pub field_id: u32,
    pub value: FieldValue,
}

/// Match-kind-specific wire payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    Exact { value: Vec<u8> },
    Ternary { value: Vec<u8>, mask: Vec<u8> },
    Lpm { value: Vec<u8>, prefix_length: u32 },
    Range { low: Vec<u8>, high: Vec<u8> },
    Optional { value: Vec<u8> },
}

impl FieldValue {
    fn kind_name(&self) -> &'static str {
        match self {
            FieldValue::Exact { .. } => "exact",
            FieldValue::Ternary { .. } => "ternary",
            FieldValue::Lpm { .. } => "lpm",
            FieldValue::Range { .. } => "range",
            FieldValue::Optional { .. } => "optional",
        }
    }
}

/// An action invocation as received from the data plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionCall {
    pub action_id: u32,
    #[serde(default)]
    pub params: Vec<ParamValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamValue {
    pub param_id: u32,
    pub value: Vec<u8>,
}

// ──────────────────────────────────────────────
// Binding environment
// ──────────────────────────────────────────────

/// A validated table entry: a total map from declared key names to values,
/// plus the reserved attributes read from the instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEntry {
    pub table_name: String,
    pub priority: Integer,
    pub keys: HashMap<String, Value>,
}

/// A validated action invocation: every declared parameter bound once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAction {
    pub action_name: String,
    pub params: HashMap<String, Integer>,
}

/// What a constraint expression closes over: a table entry for entry
/// restrictions, an action invocation for action restrictions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintContext {
    Entry(ParsedEntry),
    Action(ParsedAction),
}

/// Environment for one evaluation: the bound instance plus the constraint
/// source used for diagnostic quoting. Built per call; outlives nothing.
#[derive(Debug, Clone)]
pub struct EvaluationContext<'a> {
    pub context: ConstraintContext,
    pub source: &'a ConstraintSource,
}

// ──────────────────────────────────────────────
// Entry parsing
// ──────────────────────────────────────────────

fn decode_checked(bytes: &[u8], bitwidth: u32, context: &str) -> Result<Integer, EvalError> {
    let v = numeric::decode_bytes(bytes);
    if !numeric::fits_unsigned(&v, bitwidth) {
        return Err(EvalError::ValueOutOfRange {
            context: context.to_string(),
            value: v.to_string(),
            bitwidth,
        });
    }
    Ok(v)
}

/// Converts one wire payload to a runtime value of the key's declared
/// type, normalising ternary values into their mask and LPM values onto
/// their prefix.
fn key_value(key_name: &str, ty: &Type, wire: &FieldValue) -> Result<Value, EvalError> {
    let mismatch = |got: &FieldValue| EvalError::MatchKindMismatch {
        key: key_name.to_string(),
        expected: ty.to_string(),
        got: got.kind_name().to_string(),
    };
    match (ty, wire) {
        (Type::Exact { bitwidth }, FieldValue::Exact { value }) => Ok(Value::Exact {
            value: decode_checked(value, *bitwidth, key_name)?,
        }),
        (Type::Ternary { bitwidth }, FieldValue::Ternary { value, mask }) => {
            let value = decode_checked(value, *bitwidth, key_name)?;
            let mask = decode_checked(mask, *bitwidth, key_name)?;
            Ok(Value::Ternary {
                value: value & &mask,
                mask,
            })
        }
        (Type::Lpm { bitwidth }, FieldValue::Lpm {
            value,
            prefix_length,
        }) => {
            if *prefix_length > *bitwidth {
                return Err(EvalError::InvalidPrefixLength {
                    key: key_name.to_string(),
                    prefix_length: *prefix_length,
                    bitwidth: *bitwidth,
                });
            }
            let value = decode_checked(value, *bitwidth, key_name)?;
            Ok(Value::Lpm {
                value: numeric::zero_low_bits(&value, bitwidth - prefix_length),
                prefix_length: Integer::from(*prefix_length),
            })
        }
        (Type::Range { bitwidth }, FieldValue::Range { low, high }) => {
            let low = decode_checked(low, *bitwidth, key_name)?;
            let high = decode_checked(high, *bitwidth, key_name)?;
            if low > high {
                return Err(EvalError::InvertedRange {
                    key: key_name.to_string(),
                    low: low.to_string(),
                    high: high.to_string(),
                });
            }
            Ok(Value::Range { low, high })
        }
        // A present optional key is an exact match: ternary with an
        // all-ones mask.
        (Type::Optional { bitwidth }, FieldValue::Optional { value }) => Ok(Value::Ternary {
            value: decode_checked(value, *bitwidth, key_name)?,
            mask: numeric::mask_of_width(*bitwidth),
        }),
        (_, got) => Err(mismatch(got)),
    }
}

/// The canonical matches-everything value for a non-exact match kind.
fn wildcard(ty: &Type) -> Option<Value> {
    match ty {
        Type::Ternary { .. } | Type::Optional { .. } => Some(Value::Ternary {
            value: Integer::from(0),
            mask: Integer::from(0),
        }),
        Type::Lpm { .. } => Some(Value::Lpm {
            value: Integer::from(0),
            prefix_length: Integer::from(0),
        }),
        Type::Range { bitwidth } => Some(Value::Range {
            low: Integer::from(0),
            high: numeric::mask_of_width(*bitwidth),
        }),
        _ => None,
    }
}

/// Validates `entry` against `table` and builds the evaluation
/// environment. The result binds every declared key: present fields are
/// decoded, absent non-exact keys become wildcards, and an absent exact
/// key is an invalid-argument failure.
pub fn parse_table_entry<'a>(
    entry: &TableEntry,
    table: &'a TableInfo,
) -> Result<EvaluationContext<'a>, EvalError> {
    let mut keys = HashMap::new();
    for field in &entry.match_fields {
        let key = table
            .keys_by_id
            .get(&field.field_id)
            .ok_or_else(|| EvalError::UnknownKey {
                table: table.name.clone(),
                field_id: field.field_id,
            })?;
        let value = key_value(&key.name, &key.ty, &field.value)?;
        if keys.insert(key.name.clone(), value).is_some() {
            return Err(EvalError::DuplicateKey {
                table: table.name.clone(),
                field_id: field.field_id,
            });
        }
    }
    for key in table.keys_by_name.values() {
        if keys.contains_key(&key.name) {
            continue;
        }
        match wildcard(&key.ty) {
            Some(value) => {
                keys.insert(key.name.clone(), value);
            }
            None => {
                return Err(EvalError::MissingExactKey {
                    table: table.name.clone(),
                    key: key.name.clone(),
                })
            }
        }
    }
    Ok(EvaluationContext {
        context: ConstraintContext::Entry(ParsedEntry {
            table_name: table.name.clone(),
            priority: Integer::from(entry.priority),
            keys,
        }),
        source: &table.constraint_source,
    })
}

/// Validates `call` against `info` and builds the evaluation environment,
/// binding every declared parameter exactly once. Signed parameters are
/// reinterpreted from their width-W two's-complement wire pattern.
pub fn parse_action<'a>(
    call: &ActionCall,
    info: &'a ActionInfo,
) -> Result<EvaluationContext<'a>, EvalError> {
    let mut params = HashMap::new();
    for pv in &call.params {
        let param = info
            .params_by_id
            .get(&pv.param_id)
            .ok_or_else(|| EvalError::UnknownParam {
                action: info.name.clone(),
                param_id: pv.param_id,
            })?;
        let value = match param.ty {
            Type::FixedUnsigned { bitwidth } => decode_checked(&pv.value, bitwidth, &param.name)?,
            Type::FixedSigned { bitwidth } => {
                let raw = decode_checked(&pv.value, bitwidth, &param.name)?;
                numeric::to_signed(raw, bitwidth)
            }
            ref other => {
                return Err(EvalError::DeserializeError {
                    message: format!(
                        "param '{}' of action '{}' has non-integer type {}",
                        param.name, info.name, other
                    ),
                })
            }
        };
        if params.insert(param.name.clone(), value).is_some() {
            return Err(EvalError::DuplicateParam {
                action: info.name.clone(),
                param_id: pv.param_id,
            });
        }
    }
    for param in info.params_by_name.values() {
        if !params.contains_key(&param.name) {
            return Err(EvalError::MissingParam {
                action: info.name.clone(),
                param: param.name.clone(),
            });
        }
    }
    Ok(EvaluationContext {
        context: ConstraintContext::Action(ParsedAction {
            action_name: info.name.clone(),
            params,
        }),
        source: &info.constraint_source,
    })
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
