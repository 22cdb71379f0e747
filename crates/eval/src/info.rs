//! Pipeline metadata consumed by the checker.
//!
//! `ConstraintInfo` is built once by the external loader and immutable
//! afterwards. It can be constructed directly, or decoded from the loader's
//! interchange JSON via [`ConstraintInfo::from_interchange`]: tables and
//! actions with their keys/params, plus each constraint's verbatim source
//! text, file anchor, and fully type-annotated expression tree.

use std::collections::HashMap;

use num_bigint::BigInt;
use serde_json::Value as Json;

use pipegate_core::{
    BinaryOp, ConstraintLocation, ConstraintSource, ExprKind, Expression, SourceSpan, Type, UnaryOp,
};

use crate::error::EvalError;

// ──────────────────────────────────────────────
// Metadata records
// ──────────────────────────────────────────────

/// One table match key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    pub id: u32,
    pub name: String,
    /// Match-kind type with bit-width, e.g. `Ternary<16>`.
    pub ty: Type,
}

/// One action parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamInfo {
    pub id: u32,
    pub name: String,
    /// Fixed-width integer type.
    pub ty: Type,
}

/// A table, its keys, and its optional entry restriction.
#[derive(Debug, Clone)]
pub struct TableInfo {
    pub id: u32,
    pub name: String,
    pub constraint: Option<Expression>,
    /// Captures the constraint's source when `constraint` is present;
    /// arbitrary otherwise.
    pub constraint_source: ConstraintSource,
    pub keys_by_id: HashMap<u32, KeyInfo>,
    pub keys_by_name: HashMap<String, KeyInfo>,
}

/// An action, its parameters, and its optional action restriction.
#[derive(Debug, Clone)]
pub struct ActionInfo {
    pub id: u32,
    pub name: String,
    pub constraint: Option<Expression>,
    pub constraint_source: ConstraintSource,
    pub params_by_id: HashMap<u32, ParamInfo>,
    pub params_by_name: HashMap<String, ParamInfo>,
}

/// Everything required for constraint checking, indexed by id.
#[derive(Debug, Clone, Default)]
pub struct ConstraintInfo {
    pub tables_by_id: HashMap<u32, TableInfo>,
    pub actions_by_id: HashMap<u32, ActionInfo>,
}

impl ConstraintInfo {
    pub fn table(&self, table_id: u32) -> Option<&TableInfo> {
        self.tables_by_id.get(&table_id)
    }

    pub fn action(&self, action_id: u32) -> Option<&ActionInfo> {
        self.actions_by_id.get(&action_id)
    }

    /// Decode the loader's interchange JSON.
    ///
    /// The top-level object carries `tables` and `actions` arrays; each
    /// element declares its keys/params and, when constrained, a
    /// `constraint` object holding the verbatim source text, its file
    /// anchor, and the typed expression tree. Malformed input is an
    /// invalid-argument failure.
    pub fn from_interchange(v: &Json) -> Result<ConstraintInfo, EvalError> {
        let o = obj(v, "interchange root")?;
        let mut info = ConstraintInfo::default();
        if let Some(tables) = o.get("tables") {
            for t in arr(tables, "tables")? {
                let table = table_from_json(t)?;
                if info.tables_by_id.contains_key(&table.id) {
                    return Err(de(format!("duplicate table id {}", table.id)));
                }
                info.tables_by_id.insert(table.id, table);
            }
        }
        if let Some(actions) = o.get("actions") {
            for a in arr(actions, "actions")? {
                let action = action_from_json(a)?;
                if info.actions_by_id.contains_key(&action.id) {
                    return Err(de(format!("duplicate action id {}", action.id)));
                }
                info.actions_by_id.insert(action.id, action);
            }
        }
        Ok(info)
    }
}

// ──────────────────────────────────────────────
// Reserved entry attributes
// ──────────────────────────────────────────────

/// An entry attribute readable inside table constraints, e.g. priority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeInfo {
    pub name: &'static str,
    pub ty: Type,
}

/// Returns the fixed attribute table entry for `name`, `None` for unknown
/// attributes. Attribute values come from the entry instance, never from
/// the pipeline metadata.
pub fn attribute_info(name: &str) -> Option<AttributeInfo> {
    match name {
        "priority" => Some(AttributeInfo {
            name: "priority",
            ty: Type::ArbitraryInt,
        }),
        _ => None,
    }
}

// ──────────────────────────────────────────────
// Interchange decoding
// ──────────────────────────────────────────────

fn de(message: impl Into<String>) -> EvalError {
    EvalError::DeserializeError {
        message: message.into(),
    }
}

fn obj<'a>(v: &'a Json, what: &str) -> Result<&'a serde_json::Map<String, Json>, EvalError> {
    v.as_object()
        .ok_or_else(|| de(format!("{} must be a JSON object", what)))
}

fn arr<'a>(v: &'a Json, what: &str) -> Result<&'a Vec<Json>, EvalError> {
    v.as_array()
        .ok_or_else(|| de(format!("{} must be a JSON array", what)))
}

fn str_field<'a>(
    o: &'a serde_json::Map<String, Json>,
    key: &str,
    what: &str,
) -> Result<&'a str, EvalError> {
    o.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| de(format!("{} missing string field '{}'", what, key)))
}

fn u32_field(o: &serde_json::Map<String, Json>, key: &str, what: &str) -> Result<u32, EvalError> {
    o.get(key)
        .and_then(|v| v.as_u64())
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| de(format!("{} missing u32 field '{}'", what, key)))
}

fn bitwidth_field(o: &serde_json::Map<String, Json>, what: &str) -> Result<u32, EvalError> {
    let w = u32_field(o, "bitwidth", what)?;
    if w == 0 {
        return Err(de(format!("{}: bitwidth must be >= 1", what)));
    }
    Ok(w)
}

fn type_from_json(v: &Json) -> Result<Type, EvalError> {
    let o = obj(v, "type")?;
    let kind = str_field(o, "kind", "type")?;
    let ty = match kind {
        "bool" => Type::Boolean,
        "int" => Type::ArbitraryInt,
        "bit" => Type::FixedUnsigned {
            bitwidth: bitwidth_field(o, "bit type")?,
        },
        "signed" => Type::FixedSigned {
            bitwidth: bitwidth_field(o, "signed type")?,
        },
        "exact" => Type::Exact {
            bitwidth: bitwidth_field(o, "exact type")?,
        },
        "ternary" => Type::Ternary {
            bitwidth: bitwidth_field(o, "ternary type")?,
        },
        "lpm" => Type::Lpm {
            bitwidth: bitwidth_field(o, "lpm type")?,
        },
        "range" => Type::Range {
            bitwidth: bitwidth_field(o, "range type")?,
        },
        "optional" => Type::Optional {
            bitwidth: bitwidth_field(o, "optional type")?,
        },
        other => return Err(de(format!("unknown type kind '{}'", other))),
    };
    Ok(ty)
}

fn position_from_json(v: &Json, what: &str) -> Result<(u32, u32), EvalError> {
    let pair = arr(v, what)?;
    if pair.len() != 2 {
        return Err(de(format!("{} must be a [line, column] pair", what)));
    }
    let line = pair[0]
        .as_u64()
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| de(format!("{}: bad line", what)))?;
    let column = pair[1]
        .as_u64()
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| de(format!("{}: bad column", what)))?;
    Ok((line, column))
}

fn span_from_json(o: &serde_json::Map<String, Json>) -> Result<SourceSpan, EvalError> {
    let start = o
        .get("start")
        .ok_or_else(|| de("expression node missing 'start'"))?;
    let end = o
        .get("end")
        .ok_or_else(|| de("expression node missing 'end'"))?;
    let (sl, sc) = position_from_json(start, "start position")?;
    let (el, ec) = position_from_json(end, "end position")?;
    Ok(SourceSpan::new(sl, sc, el, ec))
}

fn unary_op_from_str(s: &str) -> Result<UnaryOp, EvalError> {
    match s {
        "!" => Ok(UnaryOp::Not),
        "-" => Ok(UnaryOp::Neg),
        other => Err(de(format!("unknown unary operator '{}'", other))),
    }
}

fn binary_op_from_str(s: &str) -> Result<BinaryOp, EvalError> {
    let op = match s {
        "==" => BinaryOp::Eq,
        "!=" => BinaryOp::Ne,
        ">" => BinaryOp::Gt,
        ">=" => BinaryOp::Ge,
        "<" => BinaryOp::Lt,
        "<=" => BinaryOp::Le,
        "&&" => BinaryOp::And,
        "||" => BinaryOp::Or,
        "->" => BinaryOp::Implies,
        "+" => BinaryOp::Add,
        "-" => BinaryOp::Sub,
        "*" => BinaryOp::Mul,
        "::" => BinaryOp::Concat,
        other => return Err(de(format!("unknown binary operator '{}'", other))),
    };
    Ok(op)
}

fn int_literal_from_json(v: &Json) -> Result<BigInt, EvalError> {
    // Decimal string is canonical (arbitrary precision); small literals may
    // also arrive as JSON numbers.
    if let Some(s) = v.as_str() {
        return s
            .parse::<BigInt>()
            .map_err(|_| de(format!("bad integer literal '{}'", s)));
    }
    if let Some(i) = v.as_i64() {
        return Ok(BigInt::from(i));
    }
    Err(de("integer literal must be a decimal string or number"))
}

fn expr_from_json(v: &Json) -> Result<Expression, EvalError> {
    let o = obj(v, "expression node")?;
    let ty = type_from_json(
        o.get("type")
            .ok_or_else(|| de("expression node missing 'type'"))?,
    )?;
    let span = span_from_json(o)?;

    let kind = if let Some(b) = o.get("bool_literal") {
        ExprKind::BoolLit(
            b.as_bool()
                .ok_or_else(|| de("bool_literal must be a boolean"))?,
        )
    } else if let Some(i) = o.get("int_literal") {
        ExprKind::IntLit(int_literal_from_json(i)?)
    } else if let Some(s) = o.get("string_literal") {
        ExprKind::StringLit(
            s.as_str()
                .ok_or_else(|| de("string_literal must be a string"))?
                .to_string(),
        )
    } else if let Some(name) = o.get("variable") {
        ExprKind::Variable(
            name.as_str()
                .ok_or_else(|| de("variable must be a string"))?
                .to_string(),
        )
    } else if let Some(name) = o.get("attribute") {
        ExprKind::AttributeAccess(
            name.as_str()
                .ok_or_else(|| de("attribute must be a string"))?
                .to_string(),
        )
    } else if let Some(fa) = o.get("field_access") {
        let fo = obj(fa, "field_access")?;
        let base = fo
            .get("base")
            .ok_or_else(|| de("field_access missing 'base'"))?;
        ExprKind::FieldAccess {
            base: Box::new(expr_from_json(base)?),
            field: str_field(fo, "field", "field_access")?.to_string(),
        }
    } else if let Some(un) = o.get("unary") {
        let uo = obj(un, "unary")?;
        let operand = uo
            .get("operand")
            .ok_or_else(|| de("unary missing 'operand'"))?;
        ExprKind::Unary {
            op: unary_op_from_str(str_field(uo, "op", "unary")?)?,
            operand: Box::new(expr_from_json(operand)?),
        }
    } else if let Some(bin) = o.get("binary") {
        let bo = obj(bin, "binary")?;
        let left = bo.get("left").ok_or_else(|| de("binary missing 'left'"))?;
        let right = bo
            .get("right")
            .ok_or_else(|| de("binary missing 'right'"))?;
        ExprKind::Binary {
            op: binary_op_from_str(str_field(bo, "op", "binary")?)?,
            left: Box::new(expr_from_json(left)?),
            right: Box::new(expr_from_json(right)?),
        }
    } else if let Some(c) = o.get("cast") {
        ExprKind::TypeCast(Box::new(expr_from_json(c)?))
    } else {
        return Err(de("expression node carries no recognised kind"));
    };

    Ok(Expression::new(ty, span, kind))
}

fn constraint_from_json(
    o: &serde_json::Map<String, Json>,
    what: &str,
) -> Result<(Option<Expression>, ConstraintSource), EvalError> {
    let c = match o.get("constraint") {
        None => return Ok((None, ConstraintSource::default())),
        Some(c) => obj(c, "constraint")?,
    };
    let text = str_field(c, "source", "constraint")?;
    let loc = obj(
        c.get("location")
            .ok_or_else(|| de(format!("{} constraint missing 'location'", what)))?,
        "constraint location",
    )?;
    let source = ConstraintSource {
        constraint_string: text.to_string(),
        constraint_location: ConstraintLocation {
            file_path: str_field(loc, "file", "constraint location")?.to_string(),
            line: u32_field(loc, "line", "constraint location")?,
            column: u32_field(loc, "column", "constraint location")?,
        },
    };
    let expression = expr_from_json(
        c.get("expression")
            .ok_or_else(|| de(format!("{} constraint missing 'expression'", what)))?,
    )?;
    Ok((Some(expression), source))
}

fn key_from_json(v: &Json) -> Result<KeyInfo, EvalError> {
    let o = obj(v, "key")?;
    let name = str_field(o, "name", "key")?.to_string();
    let kind = str_field(o, "match", "key")?;
    let bitwidth = bitwidth_field(o, &format!("key '{}'", name))?;
    let ty = match kind {
        "exact" => Type::Exact { bitwidth },
        "ternary" => Type::Ternary { bitwidth },
        "lpm" => Type::Lpm { bitwidth },
        "range" => Type::Range { bitwidth },
        "optional" => Type::Optional { bitwidth },
        other => return Err(de(format!("key '{}': unknown match kind '{}'", name, other))),
    };
    Ok(KeyInfo {
        id: u32_field(o, "id", "key")?,
        name,
        ty,
    })
}

fn param_from_json(v: &Json) -> Result<ParamInfo, EvalError> {
    let o = obj(v, "param")?;
    let name = str_field(o, "name", "param")?.to_string();
    let kind = str_field(o, "type", "param")?;
    let bitwidth = bitwidth_field(o, &format!("param '{}'", name))?;
    let ty = match kind {
        "bit" => Type::FixedUnsigned { bitwidth },
        "signed" => Type::FixedSigned { bitwidth },
        other => {
            return Err(de(format!(
                "param '{}': unknown param type '{}'",
                name, other
            )))
        }
    };
    Ok(ParamInfo {
        id: u32_field(o, "id", "param")?,
        name,
        ty,
    })
}

fn table_from_json(v: &Json) -> Result<TableInfo, EvalError> {
    let o = obj(v, "table")?;
    let name = str_field(o, "name", "table")?.to_string();
    let mut keys_by_id = HashMap::new();
    let mut keys_by_name = HashMap::new();
    if let Some(keys) = o.get("keys") {
        for k in arr(keys, "keys")? {
            let key = key_from_json(k)?;
            if keys_by_id.contains_key(&key.id) {
                return Err(de(format!(
                    "table '{}': duplicate key id {}",
                    name, key.id
                )));
            }
            if keys_by_name.contains_key(&key.name) {
                return Err(de(format!(
                    "table '{}': duplicate key name '{}'",
                    name, key.name
                )));
            }
            keys_by_id.insert(key.id, key.clone());
            keys_by_name.insert(key.name.clone(), key);
        }
    }
    let (constraint, constraint_source) = constraint_from_json(o, "table")?;
    Ok(TableInfo {
        id: u32_field(o, "id", "table")?,
        name,
        constraint,
        constraint_source,
        keys_by_id,
        keys_by_name,
    })
}

fn action_from_json(v: &Json) -> Result<ActionInfo, EvalError> {
    let o = obj(v, "action")?;
    let name = str_field(o, "name", "action")?.to_string();
    let mut params_by_id = HashMap::new();
    let mut params_by_name = HashMap::new();
    if let Some(params) = o.get("params") {
        for p in arr(params, "params")? {
            let param = param_from_json(p)?;
            if params_by_id.contains_key(&param.id) {
                return Err(de(format!(
                    "action '{}': duplicate param id {}",
                    name, param.id
                )));
            }
            if params_by_name.contains_key(&param.name) {
                return Err(de(format!(
                    "action '{}': duplicate param name '{}'",
                    name, param.name
                )));
            }
            params_by_id.insert(param.id, param.clone());
            params_by_name.insert(param.name.clone(), param);
        }
    }
    let (constraint, constraint_source) = constraint_from_json(o, "action")?;
    Ok(ActionInfo {
        id: u32_field(o, "id", "action")?,
        name,
        constraint,
        constraint_source,
        params_by_id,
        params_by_name,
    })
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
