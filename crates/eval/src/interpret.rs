//! Constraint expression interpreter.
//!
//! Evaluates a type-annotated expression under a binding environment to a
//! [`Value`]. The AST is assumed well-typed; the interpreter still checks
//! every produced value against its node's declared type and fails with an
//! internal error on disagreement, so a type-checker bug surfaces as a
//! quoted diagnostic instead of a wrong verdict.
//!
//! Logical connectives short-circuit: `&&` evaluates its right side only
//! when the left is true, `||` only when it is false, and `->` behaves as
//! `!lhs || rhs`. Boolean subresults are memoised in an optional
//! [`EvaluationCache`] so the explanation search can re-ask without
//! re-computing.

use std::collections::HashMap;

use pipegate_core::{BinaryOp, ExprKind, Expression, NodeId, SourceSpan, Type, UnaryOp};

use crate::entry::{ConstraintContext, EvaluationContext, ParsedEntry};
use crate::error::EvalError;
use crate::info::attribute_info;
use crate::numeric;
use crate::value::{Integer, Value};

/// Memoised boolean results, keyed by node identity. Shared between the
/// interpreter and the explanation search; per call, never across calls.
pub type EvaluationCache = HashMap<NodeId, bool>;

/// Evaluates `expr` under `ctx`. `cache` may be `None` to disable
/// memoisation; enabling it never changes the produced value.
pub fn eval(
    expr: &Expression,
    ctx: &EvaluationContext,
    cache: Option<&mut EvaluationCache>,
) -> Result<Value, EvalError> {
    let mut cache = cache;
    eval_inner(expr, ctx, &mut cache)
}

/// Same as [`eval`] but forces a boolean result.
pub fn eval_to_bool(
    expr: &Expression,
    ctx: &EvaluationContext,
    cache: Option<&mut EvaluationCache>,
) -> Result<bool, EvalError> {
    let mut cache = cache;
    eval_to_bool_inner(expr, ctx, &mut cache)
}

type CacheSlot<'c> = Option<&'c mut EvaluationCache>;

fn quote(ctx: &EvaluationContext, span: &SourceSpan) -> String {
    ctx.source.quote_span(span).unwrap_or_default()
}

fn type_mismatch(expected: &str, got: &Value, ctx: &EvaluationContext, span: &SourceSpan) -> EvalError {
    EvalError::TypeMismatch {
        expected: expected.to_string(),
        got: got.type_name().to_string(),
        quote: quote(ctx, span),
    }
}

fn expect_int(
    value: Value,
    ctx: &EvaluationContext,
    span: &SourceSpan,
) -> Result<Integer, EvalError> {
    match value {
        Value::Int(i) => Ok(i),
        other => Err(type_mismatch("int", &other, ctx, span)),
    }
}

fn eval_to_bool_inner(
    expr: &Expression,
    ctx: &EvaluationContext,
    cache: &mut CacheSlot,
) -> Result<bool, EvalError> {
    match eval_inner(expr, ctx, cache)? {
        Value::Bool(b) => Ok(b),
        other => Err(type_mismatch("bool", &other, ctx, &expr.span)),
    }
}

/// Reads a reserved attribute out of the entry instance.
fn attribute_value(name: &str, entry: &ParsedEntry) -> Option<Value> {
    match attribute_info(name)?.name {
        "priority" => Some(Value::Int(entry.priority.clone())),
        _ => None,
    }
}

fn eval_inner(
    expr: &Expression,
    ctx: &EvaluationContext,
    cache: &mut CacheSlot,
) -> Result<Value, EvalError> {
    if expr.ty == Type::Boolean {
        if let Some(c) = cache.as_deref() {
            if let Some(&b) = c.get(&NodeId::of(expr)) {
                return Ok(Value::Bool(b));
            }
        }
    }

    let value = match &expr.kind {
        ExprKind::BoolLit(b) => Value::Bool(*b),
        ExprKind::IntLit(i) => Value::Int(i.clone()),
        ExprKind::StringLit(_) => {
            return Err(EvalError::MalformedExpression {
                message: "string literal outside a field selector position".to_string(),
                quote: quote(ctx, &expr.span),
            })
        }

        ExprKind::Variable(name) => match &ctx.context {
            ConstraintContext::Entry(entry) => {
                if let Some(v) = entry.keys.get(name) {
                    v.clone()
                } else if let Some(v) = attribute_value(name, entry) {
                    v
                } else {
                    return Err(EvalError::UnboundName {
                        name: name.clone(),
                        quote: quote(ctx, &expr.span),
                    });
                }
            }
            ConstraintContext::Action(action) => match action.params.get(name) {
                Some(i) => Value::Int(i.clone()),
                None => {
                    return Err(EvalError::UnboundName {
                        name: name.clone(),
                        quote: quote(ctx, &expr.span),
                    })
                }
            },
        },

        ExprKind::AttributeAccess(name) => match &ctx.context {
            ConstraintContext::Entry(entry) => match attribute_value(name, entry) {
                Some(v) => v,
                None => {
                    return Err(EvalError::UnboundName {
                        name: name.clone(),
                        quote: quote(ctx, &expr.span),
                    })
                }
            },
            ConstraintContext::Action(_) => {
                return Err(EvalError::UnboundName {
                    name: name.clone(),
                    quote: quote(ctx, &expr.span),
                })
            }
        },

        ExprKind::FieldAccess { base, field } => {
            let base_value = eval_inner(base, ctx, cache)?;
            match (base_value, field.as_str()) {
                (Value::Exact { value }, "value") => Value::Int(value),
                (Value::Ternary { value, .. }, "value") => Value::Int(value),
                (Value::Ternary { mask, .. }, "mask") => Value::Int(mask),
                (Value::Lpm { value, .. }, "value") => Value::Int(value),
                (Value::Lpm { prefix_length, .. }, "prefix_length") => Value::Int(prefix_length),
                (Value::Range { low, .. }, "low") => Value::Int(low),
                (Value::Range { high, .. }, "high") => Value::Int(high),
                (other, _) => {
                    return Err(EvalError::IllegalFieldAccess {
                        field: field.clone(),
                        value_type: other.type_name().to_string(),
                        quote: quote(ctx, &expr.span),
                    })
                }
            }
        }

        ExprKind::Unary { op, operand } => match op {
            UnaryOp::Not => Value::Bool(!eval_to_bool_inner(operand, ctx, cache)?),
            // Negation is mathematical even when the operand's type is a
            // fixed-width unsigned; narrowing happens in a later cast.
            UnaryOp::Neg => {
                let i = expect_int(eval_inner(operand, ctx, cache)?, ctx, &operand.span)?;
                Value::Int(-i)
            }
        },

        ExprKind::Binary { op, left, right } => match op {
            BinaryOp::And => {
                let l = eval_to_bool_inner(left, ctx, cache)?;
                Value::Bool(if l {
                    eval_to_bool_inner(right, ctx, cache)?
                } else {
                    false
                })
            }
            BinaryOp::Or => {
                let l = eval_to_bool_inner(left, ctx, cache)?;
                Value::Bool(if l {
                    true
                } else {
                    eval_to_bool_inner(right, ctx, cache)?
                })
            }
            BinaryOp::Implies => {
                let l = eval_to_bool_inner(left, ctx, cache)?;
                Value::Bool(if l {
                    eval_to_bool_inner(right, ctx, cache)?
                } else {
                    true
                })
            }
            BinaryOp::Eq | BinaryOp::Ne => {
                let l = eval_inner(left, ctx, cache)?;
                let r = eval_inner(right, ctx, cache)?;
                let equal = values_equal(&l, &r).ok_or_else(|| EvalError::TypeMismatch {
                    expected: l.type_name().to_string(),
                    got: r.type_name().to_string(),
                    quote: quote(ctx, &expr.span),
                })?;
                Value::Bool(if *op == BinaryOp::Eq { equal } else { !equal })
            }
            BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Lt | BinaryOp::Le => {
                let l = expect_int(eval_inner(left, ctx, cache)?, ctx, &left.span)?;
                let r = expect_int(eval_inner(right, ctx, cache)?, ctx, &right.span)?;
                Value::Bool(match op {
                    BinaryOp::Gt => l > r,
                    BinaryOp::Ge => l >= r,
                    BinaryOp::Lt => l < r,
                    BinaryOp::Le => l <= r,
                    _ => unreachable!(),
                })
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul => {
                let l = expect_int(eval_inner(left, ctx, cache)?, ctx, &left.span)?;
                let r = expect_int(eval_inner(right, ctx, cache)?, ctx, &right.span)?;
                Value::Int(match op {
                    BinaryOp::Add => l + r,
                    BinaryOp::Sub => l - r,
                    BinaryOp::Mul => l * r,
                    _ => unreachable!(),
                })
            }
            BinaryOp::Concat => {
                let right_width =
                    right
                        .ty
                        .bitwidth()
                        .ok_or_else(|| EvalError::MalformedExpression {
                            message: format!(
                                "concat operand of type {} has no bit-width",
                                right.ty
                            ),
                            quote: quote(ctx, &right.span),
                        })?;
                let l = expect_int(eval_inner(left, ctx, cache)?, ctx, &left.span)?;
                let r = expect_int(eval_inner(right, ctx, cache)?, ctx, &right.span)?;
                Value::Int(numeric::concat(&l, &r, right_width))
            }
        },

        ExprKind::TypeCast(operand) => eval_cast(expr, operand, ctx, cache)?,
    };

    // Dynamic type check: the value's runtime shape must agree with the
    // node's declared type. A disagreement is a type-checker bug.
    if !value.has_type(&expr.ty) {
        return Err(EvalError::TypeMismatch {
            expected: expr.ty.to_string(),
            got: value.type_name().to_string(),
            quote: quote(ctx, &expr.span),
        });
    }

    if expr.ty == Type::Boolean {
        if let (Some(c), Value::Bool(b)) = (cache.as_deref_mut(), &value) {
            c.insert(NodeId::of(expr), *b);
        }
    }
    Ok(value)
}

/// Structural equality across same-shape values; `None` when the shapes
/// disagree, which a well-typed AST never produces.
fn values_equal(l: &Value, r: &Value) -> Option<bool> {
    match (l, r) {
        (Value::Bool(_), Value::Bool(_))
        | (Value::Int(_), Value::Int(_))
        | (Value::Exact { .. }, Value::Exact { .. })
        | (Value::Ternary { .. }, Value::Ternary { .. })
        | (Value::Lpm { .. }, Value::Lpm { .. })
        | (Value::Range { .. }, Value::Range { .. }) => Some(l == r),
        _ => None,
    }
}

/// Casts between the integer family and the match-key constructors. The
/// target type is the cast node's own type; anything not listed here was
/// supposed to be rejected by the type checker.
fn eval_cast(
    expr: &Expression,
    operand: &Expression,
    ctx: &EvaluationContext,
    cache: &mut CacheSlot,
) -> Result<Value, EvalError> {
    let illegal = || EvalError::IllegalCast {
        from: operand.ty.to_string(),
        to: expr.ty.to_string(),
        quote: quote(ctx, &expr.span),
    };
    let out_of_range = |v: &Integer| EvalError::CastOutOfRange {
        value: v.to_string(),
        target: expr.ty.to_string(),
        quote: quote(ctx, &expr.span),
    };

    let value = eval_inner(operand, ctx, cache)?;
    match (&operand.ty, &expr.ty) {
        // Checked narrowing from the unbounded domain.
        (Type::ArbitraryInt, Type::FixedUnsigned { bitwidth }) => {
            let i = expect_int(value, ctx, &operand.span)?;
            if !numeric::fits_unsigned(&i, *bitwidth) {
                return Err(out_of_range(&i));
            }
            Ok(Value::Int(i))
        }
        (Type::ArbitraryInt, Type::FixedSigned { bitwidth }) => {
            let i = expect_int(value, ctx, &operand.span)?;
            if !numeric::fits_signed(&i, *bitwidth) {
                return Err(out_of_range(&i));
            }
            Ok(Value::Int(i))
        }
        // Lift a fixed-width unsigned into a match-key value.
        (Type::FixedUnsigned { bitwidth }, Type::Exact { bitwidth: w }) if bitwidth == w => {
            Ok(Value::Exact {
                value: expect_int(value, ctx, &operand.span)?,
            })
        }
        (Type::FixedUnsigned { bitwidth }, Type::Ternary { bitwidth: w }) if bitwidth == w => {
            Ok(Value::Ternary {
                value: expect_int(value, ctx, &operand.span)?,
                mask: numeric::mask_of_width(*w),
            })
        }
        // Exact-as-ternary straight from the unbounded domain, range
        // checked so the mask invariant holds.
        (Type::ArbitraryInt, Type::Ternary { bitwidth }) => {
            let i = expect_int(value, ctx, &operand.span)?;
            if !numeric::fits_unsigned(&i, *bitwidth) {
                return Err(out_of_range(&i));
            }
            Ok(Value::Ternary {
                value: i,
                mask: numeric::mask_of_width(*bitwidth),
            })
        }
        _ => Err(illegal()),
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    use pipegate_core::{ConstraintSource, SourceSpan};

    use crate::entry::ParsedAction;
    use crate::value::Integer;

    fn sp() -> SourceSpan {
        SourceSpan::new(1, 1, 1, 2)
    }

    fn e(ty: Type, kind: ExprKind) -> Expression {
        Expression::new(ty, sp(), kind)
    }

    fn int_lit(v: i64) -> Expression {
        e(Type::ArbitraryInt, ExprKind::IntLit(Integer::from(v)))
    }

    fn bool_lit(b: bool) -> Expression {
        e(Type::Boolean, ExprKind::BoolLit(b))
    }

    fn binary(op: BinaryOp, ty: Type, l: Expression, r: Expression) -> Expression {
        e(
            ty,
            ExprKind::Binary {
                op,
                left: Box::new(l),
                right: Box::new(r),
            },
        )
    }

    fn entry_ctx<'a>(
        source: &'a ConstraintSource,
        keys: Vec<(&str, Value)>,
        priority: i64,
    ) -> EvaluationContext<'a> {
        EvaluationContext {
            context: ConstraintContext::Entry(ParsedEntry {
                table_name: "acl".to_string(),
                priority: Integer::from(priority),
                keys: keys
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect(),
            }),
            source,
        }
    }

    #[test]
    fn variables_resolve_keys_then_attributes() {
        let src = ConstraintSource::default();
        let ctx = entry_ctx(
            &src,
            vec![(
                "port",
                Value::Exact {
                    value: Integer::from(42),
                },
            )],
            20,
        );
        let port = e(
            Type::Exact { bitwidth: 9 },
            ExprKind::Variable("port".to_string()),
        );
        assert_eq!(
            eval(&port, &ctx, None).unwrap(),
            Value::Exact {
                value: Integer::from(42)
            }
        );
        let priority = e(
            Type::ArbitraryInt,
            ExprKind::Variable("priority".to_string()),
        );
        assert_eq!(
            eval(&priority, &ctx, None).unwrap(),
            Value::Int(Integer::from(20))
        );
        let attr = e(
            Type::ArbitraryInt,
            ExprKind::AttributeAccess("priority".to_string()),
        );
        assert_eq!(
            eval(&attr, &ctx, None).unwrap(),
            Value::Int(Integer::from(20))
        );
    }

    #[test]
    fn unbound_variable_is_internal() {
        let src = ConstraintSource::default();
        let ctx = entry_ctx(&src, vec![], 0);
        let missing = e(Type::ArbitraryInt, ExprKind::Variable("ghost".to_string()));
        let err = eval(&missing, &ctx, None).unwrap_err();
        assert!(matches!(err, EvalError::UnboundName { .. }));
        assert_eq!(err.kind(), crate::error::ErrorKind::Internal);
    }

    #[test]
    fn action_params_resolve_as_ints() {
        let src = ConstraintSource::default();
        let mut params = Map::new();
        params.insert("ttl".to_string(), Integer::from(-3));
        let ctx = EvaluationContext {
            context: ConstraintContext::Action(ParsedAction {
                action_name: "set_ttl".to_string(),
                params,
            }),
            source: &src,
        };
        let p = e(
            Type::FixedSigned { bitwidth: 8 },
            ExprKind::Variable("ttl".to_string()),
        );
        assert_eq!(eval(&p, &ctx, None).unwrap(), Value::Int(Integer::from(-3)));
    }

    #[test]
    fn field_access_projects_aggregates() {
        let src = ConstraintSource::default();
        let ctx = entry_ctx(
            &src,
            vec![(
                "dst",
                Value::Lpm {
                    value: Integer::from(0xC0A80100u32),
                    prefix_length: Integer::from(24),
                },
            )],
            0,
        );
        let access = e(
            Type::ArbitraryInt,
            ExprKind::FieldAccess {
                base: Box::new(e(
                    Type::Lpm { bitwidth: 32 },
                    ExprKind::Variable("dst".to_string()),
                )),
                field: "prefix_length".to_string(),
            },
        );
        assert_eq!(
            eval(&access, &ctx, None).unwrap(),
            Value::Int(Integer::from(24))
        );
        let bad = e(
            Type::ArbitraryInt,
            ExprKind::FieldAccess {
                base: Box::new(e(
                    Type::Lpm { bitwidth: 32 },
                    ExprKind::Variable("dst".to_string()),
                )),
                field: "mask".to_string(),
            },
        );
        assert!(matches!(
            eval(&bad, &ctx, None).unwrap_err(),
            EvalError::IllegalFieldAccess { .. }
        ));
    }

    #[test]
    fn arithmetic_is_arbitrary_precision() {
        let src = ConstraintSource::default();
        let ctx = entry_ctx(&src, vec![], 0);
        let big = e(
            Type::ArbitraryInt,
            ExprKind::IntLit("340282366920938463463374607431768211455".parse().unwrap()),
        );
        let sum = binary(BinaryOp::Add, Type::ArbitraryInt, big, int_lit(1));
        assert_eq!(
            eval(&sum, &ctx, None).unwrap(),
            Value::Int("340282366920938463463374607431768211456".parse().unwrap())
        );
        let neg = e(
            Type::ArbitraryInt,
            ExprKind::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(int_lit(7)),
            },
        );
        assert_eq!(
            eval(&neg, &ctx, None).unwrap(),
            Value::Int(Integer::from(-7))
        );
    }

    #[test]
    fn concat_places_left_high() {
        let src = ConstraintSource::default();
        let ctx = entry_ctx(&src, vec![], 0);
        let l = e(
            Type::FixedUnsigned { bitwidth: 8 },
            ExprKind::IntLit(Integer::from(0xAB)),
        );
        let r = e(
            Type::FixedUnsigned { bitwidth: 8 },
            ExprKind::IntLit(Integer::from(0xCD)),
        );
        let cat = binary(
            BinaryOp::Concat,
            Type::FixedUnsigned { bitwidth: 16 },
            l,
            r,
        );
        assert_eq!(
            eval(&cat, &ctx, None).unwrap(),
            Value::Int(Integer::from(0xABCD))
        );
    }

    #[test]
    fn equality_covers_aggregates_ordering_does_not() {
        let src = ConstraintSource::default();
        let wildcard = Value::Ternary {
            value: Integer::from(0),
            mask: Integer::from(0),
        };
        let ctx = entry_ctx(&src, vec![("t", wildcard.clone())], 0);
        let var = || {
            e(
                Type::Ternary { bitwidth: 16 },
                ExprKind::Variable("t".to_string()),
            )
        };
        let eq = binary(BinaryOp::Eq, Type::Boolean, var(), var());
        assert_eq!(eval(&eq, &ctx, None).unwrap(), Value::Bool(true));
        // Ordered comparison is integer-only; on aggregates it is a
        // type-checker bug and fails internally.
        let lt = binary(BinaryOp::Lt, Type::Boolean, var(), var());
        assert!(matches!(
            eval(&lt, &ctx, None).unwrap_err(),
            EvalError::TypeMismatch { .. }
        ));
    }

    #[test]
    fn short_circuit_skips_a_poisoned_right_side() {
        let src = ConstraintSource::default();
        let ctx = entry_ctx(&src, vec![], 0);
        // Right side would fail with UnboundName if evaluated.
        let poisoned = e(Type::Boolean, ExprKind::Variable("ghost".to_string()));
        let and = binary(BinaryOp::And, Type::Boolean, bool_lit(false), poisoned.clone());
        assert_eq!(eval(&and, &ctx, None).unwrap(), Value::Bool(false));
        let or = binary(BinaryOp::Or, Type::Boolean, bool_lit(true), poisoned.clone());
        assert_eq!(eval(&or, &ctx, None).unwrap(), Value::Bool(true));
        let implies = binary(BinaryOp::Implies, Type::Boolean, bool_lit(false), poisoned);
        assert_eq!(eval(&implies, &ctx, None).unwrap(), Value::Bool(true));
    }

    #[test]
    fn checked_casts_narrow_and_lift() {
        let src = ConstraintSource::default();
        let ctx = entry_ctx(&src, vec![], 0);
        let to_bit8 = e(
            Type::FixedUnsigned { bitwidth: 8 },
            ExprKind::TypeCast(Box::new(int_lit(255))),
        );
        assert_eq!(
            eval(&to_bit8, &ctx, None).unwrap(),
            Value::Int(Integer::from(255))
        );
        let overflow = e(
            Type::FixedUnsigned { bitwidth: 8 },
            ExprKind::TypeCast(Box::new(int_lit(256))),
        );
        assert!(matches!(
            eval(&overflow, &ctx, None).unwrap_err(),
            EvalError::CastOutOfRange { .. }
        ));
        let to_ternary = e(
            Type::Ternary { bitwidth: 8 },
            ExprKind::TypeCast(Box::new(e(
                Type::FixedUnsigned { bitwidth: 8 },
                ExprKind::TypeCast(Box::new(int_lit(5))),
            ))),
        );
        assert_eq!(
            eval(&to_ternary, &ctx, None).unwrap(),
            Value::Ternary {
                value: Integer::from(5),
                mask: Integer::from(255),
            }
        );
        let negative_signed = e(
            Type::FixedSigned { bitwidth: 4 },
            ExprKind::TypeCast(Box::new(int_lit(-8))),
        );
        assert_eq!(
            eval(&negative_signed, &ctx, None).unwrap(),
            Value::Int(Integer::from(-8))
        );
        let illegal = e(
            Type::Lpm { bitwidth: 8 },
            ExprKind::TypeCast(Box::new(int_lit(1))),
        );
        assert!(matches!(
            eval(&illegal, &ctx, None).unwrap_err(),
            EvalError::IllegalCast { .. }
        ));
    }

    #[test]
    fn dynamic_type_check_catches_lying_annotations() {
        let src = ConstraintSource::default();
        let ctx = entry_ctx(&src, vec![], 0);
        // An int literal annotated as boolean: the checker would never
        // produce this, so evaluation must fail internally.
        let lying = e(Type::Boolean, ExprKind::IntLit(Integer::from(1)));
        let err = eval(&lying, &ctx, None).unwrap_err();
        assert!(matches!(err, EvalError::TypeMismatch { .. }));
        assert_eq!(err.kind(), crate::error::ErrorKind::Internal);
    }

    #[test]
    fn cache_is_populated_and_does_not_change_results() {
        let src = ConstraintSource::default();
        let ctx = entry_ctx(&src, vec![], 5);
        let gt = binary(
            BinaryOp::Gt,
            Type::Boolean,
            e(
                Type::ArbitraryInt,
                ExprKind::Variable("priority".to_string()),
            ),
            int_lit(3),
        );
        let mut cache = EvaluationCache::new();
        let cached = eval(&gt, &ctx, Some(&mut cache)).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cached, eval(&gt, &ctx, None).unwrap());
        // Second evaluation answers straight from the cache.
        assert_eq!(eval(&gt, &ctx, Some(&mut cache)).unwrap(), cached);
    }

    #[test]
    fn string_literals_do_not_evaluate() {
        let src = ConstraintSource::default();
        let ctx = entry_ctx(&src, vec![], 0);
        let s = e(Type::Unknown, ExprKind::StringLit("mask".to_string()));
        assert!(matches!(
            eval(&s, &ctx, None).unwrap_err(),
            EvalError::MalformedExpression { .. }
        ));
    }
}
