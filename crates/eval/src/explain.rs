//! Minimal-explanation search.
//!
//! Given a boolean constraint and the entry it evaluated under, finds a
//! smallest subexpression whose value alone determines the whole result,
//! so the violation message can quote one failing conjunct instead of the
//! entire constraint. Runs in linear time: boolean results come out of the
//! evaluation cache populated by the main evaluation, node counts out of
//! the size cache.

use pipegate_core::{size, BinaryOp, ExprKind, Expression, SizeCache, Type, UnaryOp};

use crate::entry::EvaluationContext;
use crate::error::EvalError;
use crate::interpret::{eval_to_bool, EvaluationCache};

/// Finds a smallest subexpression of `expr` that determines its value
/// under `ctx`.
///
/// At each connective, a side that decides the result by itself wins; when
/// both sides are needed, the larger (by node count) of the two minimal
/// explanations is chosen so the user sees the more informative witness,
/// with ties going to the left side. Only boolean nodes are traversed;
/// reaching a non-boolean node is an internal error.
pub fn minimal_subexpression<'a>(
    expr: &'a Expression,
    ctx: &EvaluationContext,
    eval_cache: &mut EvaluationCache,
    size_cache: &mut SizeCache,
) -> Result<&'a Expression, EvalError> {
    if expr.ty != Type::Boolean {
        return Err(EvalError::NonBooleanExplanation {
            quote: ctx.source.quote_span(&expr.span).unwrap_or_default(),
        });
    }
    match &expr.kind {
        ExprKind::Unary {
            op: UnaryOp::Not,
            operand,
        } => minimal_subexpression(operand, ctx, eval_cache, size_cache),

        ExprKind::Binary { op, left, right } if op.is_connective() => {
            let l = eval_to_bool(left, ctx, Some(eval_cache))?;
            match op {
                BinaryOp::And => {
                    if !l {
                        minimal_subexpression(left, ctx, eval_cache, size_cache)
                    } else if !eval_to_bool(right, ctx, Some(eval_cache))? {
                        minimal_subexpression(right, ctx, eval_cache, size_cache)
                    } else {
                        // Both sides true: neither determines the result
                        // alone, so quote the weightier witness.
                        larger_of(left, right, ctx, eval_cache, size_cache)
                    }
                }
                BinaryOp::Or => {
                    if l {
                        minimal_subexpression(left, ctx, eval_cache, size_cache)
                    } else if eval_to_bool(right, ctx, Some(eval_cache))? {
                        minimal_subexpression(right, ctx, eval_cache, size_cache)
                    } else {
                        larger_of(left, right, ctx, eval_cache, size_cache)
                    }
                }
                // `lhs -> rhs` behaves as `!lhs || rhs`.
                BinaryOp::Implies => {
                    if !l {
                        minimal_subexpression(left, ctx, eval_cache, size_cache)
                    } else if eval_to_bool(right, ctx, Some(eval_cache))? {
                        minimal_subexpression(right, ctx, eval_cache, size_cache)
                    } else {
                        larger_of(left, right, ctx, eval_cache, size_cache)
                    }
                }
                _ => unreachable!("is_connective covers exactly these"),
            }
        }

        // Comparisons, boolean variables, and literals explain themselves.
        _ => Ok(expr),
    }
}

fn larger_of<'a>(
    left: &'a Expression,
    right: &'a Expression,
    ctx: &EvaluationContext,
    eval_cache: &mut EvaluationCache,
    size_cache: &mut SizeCache,
) -> Result<&'a Expression, EvalError> {
    let el = minimal_subexpression(left, ctx, eval_cache, size_cache)?;
    let er = minimal_subexpression(right, ctx, eval_cache, size_cache)?;
    if size(el, size_cache) >= size(er, size_cache) {
        Ok(el)
    } else {
        Ok(er)
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pipegate_core::{ConstraintSource, SourceSpan};

    use crate::entry::{ConstraintContext, ParsedEntry};
    use crate::interpret::eval;
    use crate::value::Integer;

    fn sp(tag: u32) -> SourceSpan {
        // Distinct spans let assertions identify which node was chosen.
        SourceSpan::new(tag, 1, tag, 2)
    }

    fn e(ty: Type, tag: u32, kind: ExprKind) -> Expression {
        Expression::new(ty, sp(tag), kind)
    }

    fn int_lit(tag: u32, v: i64) -> Expression {
        e(Type::ArbitraryInt, tag, ExprKind::IntLit(Integer::from(v)))
    }

    /// `priority <op> n` -- a three-node boolean leaf for the search.
    fn priority_cmp(tag: u32, op: BinaryOp, n: i64) -> Expression {
        e(
            Type::Boolean,
            tag,
            ExprKind::Binary {
                op,
                left: Box::new(e(
                    Type::ArbitraryInt,
                    tag,
                    ExprKind::Variable("priority".to_string()),
                )),
                right: Box::new(int_lit(tag, n)),
            },
        )
    }

    fn connective(tag: u32, op: BinaryOp, l: Expression, r: Expression) -> Expression {
        e(
            Type::Boolean,
            tag,
            ExprKind::Binary {
                op,
                left: Box::new(l),
                right: Box::new(r),
            },
        )
    }

    fn ctx(source: &ConstraintSource, priority: i64) -> EvaluationContext<'_> {
        EvaluationContext {
            context: ConstraintContext::Entry(ParsedEntry {
                table_name: "acl".to_string(),
                priority: Integer::from(priority),
                keys: Default::default(),
            }),
            source,
        }
    }

    fn explain<'a>(expr: &'a Expression, ctx: &EvaluationContext) -> &'a Expression {
        let mut eval_cache = EvaluationCache::new();
        let mut size_cache = SizeCache::new();
        eval(expr, ctx, Some(&mut eval_cache)).unwrap();
        minimal_subexpression(expr, ctx, &mut eval_cache, &mut size_cache).unwrap()
    }

    #[test]
    fn failing_conjunct_wins_over_the_conjunction() {
        // priority > 10 && priority < 15, with priority = 20: only the
        // right conjunct fails, so it alone is the explanation.
        let src = ConstraintSource::default();
        let c = ctx(&src, 20);
        let expr = connective(
            1,
            BinaryOp::And,
            priority_cmp(2, BinaryOp::Gt, 10),
            priority_cmp(3, BinaryOp::Lt, 15),
        );
        let witness = explain(&expr, &c);
        assert_eq!(witness.span, sp(3));
    }

    #[test]
    fn explanation_evaluates_like_the_whole_expression() {
        let src = ConstraintSource::default();
        let c = ctx(&src, 20);
        let expr = connective(
            1,
            BinaryOp::And,
            priority_cmp(2, BinaryOp::Gt, 10),
            priority_cmp(3, BinaryOp::Lt, 15),
        );
        let mut cache = EvaluationCache::new();
        let whole = eval(&expr, &c, Some(&mut cache)).unwrap();
        let mut size_cache = SizeCache::new();
        let witness = minimal_subexpression(&expr, &c, &mut cache, &mut size_cache).unwrap();
        assert_eq!(eval(witness, &c, None).unwrap(), whole);
    }

    #[test]
    fn both_sides_needed_picks_the_larger_witness() {
        // false || false: the left side is a bare comparison (3 nodes),
        // the right compares an arithmetic term (5 nodes).
        let src = ConstraintSource::default();
        let c = ctx(&src, 0);
        let bigger = e(
            Type::Boolean,
            3,
            ExprKind::Binary {
                op: BinaryOp::Gt,
                left: Box::new(e(
                    Type::ArbitraryInt,
                    3,
                    ExprKind::Binary {
                        op: BinaryOp::Add,
                        left: Box::new(e(
                            Type::ArbitraryInt,
                            3,
                            ExprKind::Variable("priority".to_string()),
                        )),
                        right: Box::new(int_lit(3, 1)),
                    },
                )),
                right: Box::new(int_lit(3, 10)),
            },
        );
        let expr = connective(1, BinaryOp::Or, priority_cmp(2, BinaryOp::Gt, 10), bigger);
        let witness = explain(&expr, &c);
        assert_eq!(witness.span, sp(3));
    }

    #[test]
    fn equal_sizes_prefer_the_left_side() {
        let src = ConstraintSource::default();
        let c = ctx(&src, 50);
        // Both conjuncts true and the same size.
        let expr = connective(
            1,
            BinaryOp::And,
            priority_cmp(2, BinaryOp::Gt, 10),
            priority_cmp(3, BinaryOp::Gt, 20),
        );
        let witness = explain(&expr, &c);
        assert_eq!(witness.span, sp(2));
    }

    #[test]
    fn implies_explains_its_false_premise() {
        let src = ConstraintSource::default();
        let c = ctx(&src, 5);
        // priority > 10 -> priority > 100, premise false: vacuously true,
        // explained by the premise.
        let expr = connective(
            1,
            BinaryOp::Implies,
            priority_cmp(2, BinaryOp::Gt, 10),
            priority_cmp(3, BinaryOp::Gt, 100),
        );
        let witness = explain(&expr, &c);
        assert_eq!(witness.span, sp(2));
    }

    #[test]
    fn negation_is_transparent() {
        let src = ConstraintSource::default();
        let c = ctx(&src, 20);
        let expr = e(
            Type::Boolean,
            1,
            ExprKind::Unary {
                op: UnaryOp::Not,
                operand: Box::new(priority_cmp(2, BinaryOp::Gt, 10)),
            },
        );
        let witness = explain(&expr, &c);
        assert_eq!(witness.span, sp(2));
    }

    #[test]
    fn non_boolean_nodes_are_not_traversed() {
        let src = ConstraintSource::default();
        let c = ctx(&src, 0);
        let expr = int_lit(1, 4);
        let mut eval_cache = EvaluationCache::new();
        let mut size_cache = SizeCache::new();
        let err = minimal_subexpression(&expr, &c, &mut eval_cache, &mut size_cache).unwrap_err();
        assert!(matches!(err, EvalError::NonBooleanExplanation { .. }));
    }
}
