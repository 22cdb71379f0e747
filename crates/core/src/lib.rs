//! pipegate-core: constraint-language AST and source handling.
//!
//! Holds the types shared between the external constraint compiler and the
//! runtime checker in `pipegate-eval`:
//!
//! - [`Expression`] / [`ExprKind`] -- type-annotated constraint AST
//! - [`Type`] -- the static type grammar
//! - [`SourceSpan`] / [`ConstraintSource`] -- positions and diagnostic
//!   quoting
//! - [`NodeId`] / [`SizeCache`] / [`size()`] -- node-identity caches used
//!   by the evaluator and the explainer

pub mod ast;
pub mod source;

pub use ast::{
    size, BinaryOp, ExprKind, Expression, NodeId, SizeCache, SourcePosition, SourceSpan, Type,
    UnaryOp,
};
pub use source::{ConstraintLocation, ConstraintSource};
