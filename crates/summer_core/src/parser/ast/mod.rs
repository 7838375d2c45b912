//! Tagged-union AST. Each source-language construct is a plain variant
//! rather than a subclass, per the redesign note in DESIGN NOTES: a single
//! `codegen` function (see `crate::codegen`) pattern-matches over these
//! instead of dispatching through a virtual `emit`.

pub mod expression;
pub mod prototype;

pub use expression::{Expr, VarBinding};
pub use prototype::{Function, Param, Prototype, TopLevel};
