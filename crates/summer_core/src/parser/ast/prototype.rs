use crate::error::Position;
use crate::lexer::TypeName;

use super::Expr;

/// The reserved name an anonymous top-level expression compiles to.
pub const ANONYMOUS_FUNCTION_NAME: &str = "anno_func";

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub param_type: TypeName,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prototype {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: TypeName,
    pub is_operator: bool,
    /// User-declared precedence for `binary` prototypes (`-1` when absent,
    /// e.g. for `unary` prototypes or ordinary functions).
    pub precedence: i32,
    pub position: Position,
}

impl Prototype {
    pub fn anonymous(position: Position) -> Prototype {
        Prototype {
            name: String::new(),
            params: Vec::new(),
            return_type: TypeName::Void,
            is_operator: false,
            precedence: -1,
            position,
        }
    }

    /// The mangled name an empty source name compiles to.
    pub fn mangled_name(&self) -> &str {
        if self.name.is_empty() {
            ANONYMOUS_FUNCTION_NAME
        } else {
            &self.name
        }
    }

    /// The operator spelling this prototype defines, if it is a `unary`/
    /// `binary` prototype, derived from its `"unary"+spelling`/
    /// `"binary"+spelling` name per §3.
    pub fn operator_spelling(&self) -> Option<&str> {
        if !self.is_operator {
            return None;
        }
        self.name
            .strip_prefix("unary")
            .or_else(|| self.name.strip_prefix("binary"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub prototype: Prototype,
    pub body: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TopLevel {
    Extern(Prototype),
    Function(Function),
}
