//! # Parser Module
//!
//! Recursive-descent parser with operator-precedence climbing, consuming a
//! [`Lexer`] one [`Token`] at a time and building [`ast::TopLevel`] forms
//! one at a time for the driver to feed straight into codegen.
//!
//! ## Architecture Overview
//!
//! The parser is organized in three layers, from widest to narrowest grain:
//!
//! - **Top level** (`next_top_level`): dispatches on the current token to
//!   one of `extern`, `function`, or a bare expression wrapped in an
//!   anonymous prototype — this is the only entry point the driver calls.
//! - **Statement-shaped forms** (`parse_if`, `parse_for`, `parse_var`,
//!   `parse_return`, `parse_block`): each owns exactly one keyword-led
//!   grammar production and recurses back into `parse_expr` for its
//!   sub-expressions.
//! - **Expressions** (`parse_expr` → `parse_bin_op_rhs` → `parse_unary` →
//!   `parse_primary`): classic precedence climbing, described below.
//!
//! A small set of `expect_*` helpers (`expect_operator`, `expect_keyword`,
//! `expect_identifier`, `expect_any_operator`) are the only places that
//! advance past a token that's known to be consumed correctly — every
//! other function either calls one of these or inspects `self.current`
//! without advancing, so there is exactly one lookahead token live at any
//! point in the parser.
//!
//! ## Precedence Climbing
//!
//! `parse_bin_op_rhs` is the textbook precedence-climbing loop: it holds a
//! `min_precedence` floor, and as long as the next operator's precedence
//! is at or above that floor, it consumes the operator, parses the next
//! unary operand, and — if what follows *that* operand binds tighter than
//! the operator just consumed — recurses with a raised floor to absorb it
//! before folding the current operator's node. This is what gives `+`/`*`
//! their relative binding strength and every user-defined `binary`
//! operator its declared precedence, out of one unified code path.
//!
//! ## A Shared, Mutable Precedence Table
//!
//! The precedence table ([`PrecedenceTable`], an `Rc<RefCell<_>>`) is
//! shared with the code generator rather than owned outright by the
//! parser: a `binary` prototype's declared precedence only takes effect
//! for source text that is parsed *after* its own definition has been
//! `codegen`'d, not merely after it has been parsed (§5) — so the
//! generator, not the parser, is what inserts a new operator into the
//! table, once it has successfully emitted that operator's body.

pub mod ast;

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Read;
use std::rc::Rc;

use crate::error::{Position, SyntaxError};
use crate::lexer::{token::TokenKind, Keyword, Lexer, OperatorKind, Token};

pub use ast::{Expr, Function, Param, Prototype, TopLevel, VarBinding};

pub type PrecedenceTable = Rc<RefCell<HashMap<String, i32>>>;

/// The operator table seeded at startup, per §4.2.
pub fn seed_precedence() -> HashMap<String, i32> {
    let mut table = HashMap::new();
    table.insert("=".to_string(), 2);
    for spelling in ["<", ">", "<=", ">=", "==", "<>"] {
        table.insert(spelling.to_string(), 10);
    }
    table.insert("+".to_string(), 20);
    table.insert("-".to_string(), 20);
    table.insert("*".to_string(), 40);
    table.insert("/".to_string(), 40);
    table
}

/// Default precedence for a `binary` prototype that omits its optional
/// precedence literal (the grammar's `'binary' OP NUMBER? params`). Not
/// specified by the spec; chosen to sit between comparisons and additive
/// operators, matching the classic "loosest user-defined default" choice.
const DEFAULT_BINARY_PRECEDENCE: i32 = 30;

pub struct Parser<R: Read> {
    lexer: Lexer<R>,
    current: Token,
    precedence: PrecedenceTable,
}

impl<R: Read> Parser<R> {
    pub fn new(mut lexer: Lexer<R>, precedence: PrecedenceTable) -> Result<Self, SyntaxError> {
        let current = lexer
            .next_token()
            .map_err(|e| SyntaxError { message: e.message, position: e.position })?;
        Ok(Parser { lexer, current, precedence })
    }

    pub fn precedence_table(&self) -> PrecedenceTable {
        self.precedence.clone()
    }

    fn advance(&mut self) -> Result<(), SyntaxError> {
        self.current = self
            .lexer
            .next_token()
            .map_err(|e| SyntaxError { message: e.message, position: e.position })?;
        Ok(())
    }

    /// Discards the current token so the caller (the driver's top-level
    /// loop) can resume after a `SyntaxError`/`CompileError`, per §7's
    /// coarse resynchronization policy. A lexical error hit while
    /// resynchronizing just jumps straight to `End` rather than cascading.
    pub fn resync(&mut self) {
        self.current = self.lexer.next_token().unwrap_or(Token {
            kind: TokenKind::End,
            position: Position::UNKNOWN,
        });
    }

    pub fn is_at_end(&self) -> bool {
        self.current.is_end()
    }

    fn err(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError { message: message.into(), position: self.current.position }
    }

    fn precedence_of(&self, spelling: &str) -> i32 {
        self.precedence.borrow().get(spelling).copied().unwrap_or(-1)
    }

    fn expect_operator(&mut self, want: OperatorKind, desc: &str) -> Result<String, SyntaxError> {
        match self.current.as_operator() {
            Some((kind, spelling)) if kind == want => {
                let spelling = spelling.to_string();
                self.advance()?;
                Ok(spelling)
            }
            _ => Err(self.err(format!("expected '{desc}'"))),
        }
    }

    fn expect_any_operator(&mut self) -> Result<String, SyntaxError> {
        match self.current.as_operator() {
            Some((_, spelling)) => {
                let spelling = spelling.to_string();
                self.advance()?;
                Ok(spelling)
            }
            _ => Err(self.err("expected an operator")),
        }
    }

    fn expect_keyword(&mut self, want: Keyword, desc: &str) -> Result<(), SyntaxError> {
        match self.current.as_keyword() {
            Some(kw) if kw == want => {
                self.advance()?;
                Ok(())
            }
            _ => Err(self.err(format!("expected '{desc}'"))),
        }
    }

    fn expect_identifier(&mut self) -> Result<String, SyntaxError> {
        match self.current.as_identifier() {
            Some(s) => {
                let s = s.to_string();
                self.advance()?;
                Ok(s)
            }
            _ => Err(self.err("expected an identifier")),
        }
    }

    fn parse_type(&mut self) -> Result<crate::lexer::TypeName, SyntaxError> {
        match self.current.as_type() {
            Some(t) => {
                self.advance()?;
                Ok(t)
            }
            None => Err(self.err("expected a type name")),
        }
    }

    /// Returns the next top-level form, or `None` at EOF.
    ///
    /// ## Dispatch
    ///
    /// - `extern ...` → [`Self::parse_extern`], a prototype with no body.
    /// - `function ...` → [`Self::parse_function`], a prototype with a
    ///   `begin...end` body.
    /// - anything else → the token stream is parsed as a single expression
    ///   and wrapped in [`Prototype::anonymous`], so a bare top-level
    ///   expression is just sugar for a nameless, argument-less,
    ///   `void`-returning function — the code generator never needs to
    ///   know the difference (§4.1/§8).
    ///
    /// This is the only parser method the driver calls directly; every
    /// other method here is reached transitively from it.
    pub fn next_top_level(&mut self) -> Result<Option<TopLevel>, SyntaxError> {
        if self.current.is_end() {
            return Ok(None);
        }
        match self.current.as_keyword() {
            Some(Keyword::Extern) => Ok(Some(TopLevel::Extern(self.parse_extern()?))),
            Some(Keyword::Function) => Ok(Some(TopLevel::Function(self.parse_function()?))),
            _ => {
                let position = self.current.position;
                let expr = self.parse_expr(0)?;
                let prototype = Prototype::anonymous(position);
                Ok(Some(TopLevel::Function(Function { prototype, body: expr })))
            }
        }
    }

    fn parse_extern(&mut self) -> Result<Prototype, SyntaxError> {
        self.expect_keyword(Keyword::Extern, "extern")?;
        self.parse_prototype()
    }

    fn parse_function(&mut self) -> Result<Function, SyntaxError> {
        self.expect_keyword(Keyword::Function, "function")?;
        let prototype = self.parse_prototype()?;
        let body = self.parse_block()?;
        Ok(Function { prototype, body })
    }

    /// Parses the shared `NAME '(' (IDENT ':' TYPE (',' IDENT ':' TYPE)*)?
    /// ')' '->' TYPE` shape that backs `extern`, `function`, and operator
    /// declarations alike — only the name production differs between the
    /// three: a plain identifier, or `unary`/`binary` followed by an
    /// operator spelling (and, for `binary`, an optional precedence
    /// literal). Operator prototypes are arity-checked here (exactly one
    /// parameter for `unary`, exactly two for `binary`) since the grammar
    /// itself doesn't constrain `parse_params`'s parameter count.
    fn parse_prototype(&mut self) -> Result<Prototype, SyntaxError> {
        let position = self.current.position;
        match self.current.as_keyword() {
            Some(Keyword::Unary) => {
                self.advance()?;
                let spelling = self.expect_any_operator()?;
                let (params, return_type) = self.parse_params()?;
                if params.len() != 1 {
                    return Err(SyntaxError {
                        message: "unary operator prototype must declare exactly one parameter"
                            .to_string(),
                        position,
                    });
                }
                Ok(Prototype {
                    name: format!("unary{spelling}"),
                    params,
                    return_type,
                    is_operator: true,
                    precedence: -1,
                    position,
                })
            }
            Some(Keyword::Binary) => {
                self.advance()?;
                let spelling = self.expect_any_operator()?;
                let mut precedence = DEFAULT_BINARY_PRECEDENCE;
                if let TokenKind::NumberLit(n) = self.current.kind {
                    precedence = n as i32;
                    self.advance()?;
                }
                let (params, return_type) = self.parse_params()?;
                if params.len() != 2 {
                    return Err(SyntaxError {
                        message: "binary operator prototype must declare exactly two parameters"
                            .to_string(),
                        position,
                    });
                }
                Ok(Prototype {
                    name: format!("binary{spelling}"),
                    params,
                    return_type,
                    is_operator: true,
                    precedence,
                    position,
                })
            }
            _ => {
                let name = self.expect_identifier()?;
                let (params, return_type) = self.parse_params()?;
                Ok(Prototype {
                    name,
                    params,
                    return_type,
                    is_operator: false,
                    precedence: -1,
                    position,
                })
            }
        }
    }

    fn parse_params(&mut self) -> Result<(Vec<Param>, crate::lexer::TypeName), SyntaxError> {
        self.expect_operator(OperatorKind::LParen, "(")?;
        let mut params = Vec::new();
        if self.current.as_operator().map(|(k, _)| k) != Some(OperatorKind::RParen) {
            loop {
                let name = self.expect_identifier()?;
                self.expect_operator(OperatorKind::Colon, ":")?;
                let param_type = self.parse_type()?;
                params.push(Param { name, param_type });
                if self.current.as_operator().map(|(k, _)| k) == Some(OperatorKind::Comma) {
                    self.advance()?;
                    continue;
                }
                break;
            }
        }
        self.expect_operator(OperatorKind::RParen, ")")?;
        self.expect_operator(OperatorKind::Arrow, "->")?;
        let return_type = self.parse_type()?;
        Ok((params, return_type))
    }

    fn parse_block(&mut self) -> Result<Expr, SyntaxError> {
        let position = self.current.position;
        self.expect_keyword(Keyword::Begin, "begin")?;
        let mut exprs = Vec::new();
        while self.current.as_keyword() != Some(Keyword::End) {
            if self.current.is_end() {
                return Err(self.err("unexpected end of file inside block"));
            }
            exprs.push(self.parse_expr(0)?);
        }
        self.expect_keyword(Keyword::End, "end")?;
        Ok(Expr::Block(exprs, position))
    }

    fn parse_if(&mut self) -> Result<Expr, SyntaxError> {
        let position = self.current.position;
        self.expect_keyword(Keyword::If, "if")?;
        let condition = self.parse_expr(0)?;
        self.expect_keyword(Keyword::Then, "then")?;
        let then_block = self.parse_block()?;
        self.expect_keyword(Keyword::Else, "else")?;
        let else_block = self.parse_block()?;
        Ok(Expr::If {
            condition: Box::new(condition),
            then_block: Box::new(then_block),
            else_block: Box::new(else_block),
            position,
        })
    }

    fn parse_for(&mut self) -> Result<Expr, SyntaxError> {
        let position = self.current.position;
        self.expect_keyword(Keyword::For, "for")?;
        let var_name = self.expect_identifier()?;
        self.expect_operator(OperatorKind::Colon, ":")?;
        let var_type = self.parse_type()?;
        self.expect_operator(OperatorKind::Assign, "=")?;
        let start = self.parse_expr(0)?;
        self.expect_operator(OperatorKind::Comma, ",")?;
        let end = self.parse_expr(0)?;
        let step = if self.current.as_operator().map(|(k, _)| k) == Some(OperatorKind::Comma) {
            self.advance()?;
            self.parse_expr(0)?
        } else {
            Expr::Number(1.0, position)
        };
        self.expect_keyword(Keyword::In, "in")?;
        let body = self.parse_block()?;
        Ok(Expr::For {
            var_name,
            var_type,
            start: Box::new(start),
            end: Box::new(end),
            step: Box::new(step),
            body: Box::new(body),
            position,
        })
    }

    fn parse_var(&mut self) -> Result<Expr, SyntaxError> {
        let position = self.current.position;
        self.expect_keyword(Keyword::Var, "var")?;
        let mut bindings = Vec::new();
        loop {
            let name = self.expect_identifier()?;
            self.expect_operator(OperatorKind::Colon, ":")?;
            let var_type = self.parse_type()?;
            self.expect_operator(OperatorKind::Assign, "=")?;
            let init = self.parse_expr(0)?;
            bindings.push(VarBinding { name, var_type, init });
            if self.current.as_operator().map(|(k, _)| k) == Some(OperatorKind::Comma) {
                self.advance()?;
                continue;
            }
            break;
        }
        self.expect_keyword(Keyword::In, "in")?;
        let body = self.parse_block()?;
        Ok(Expr::Var { bindings, body: Box::new(body), position })
    }

    fn parse_return(&mut self) -> Result<Expr, SyntaxError> {
        let position = self.current.position;
        self.expect_keyword(Keyword::Return, "return")?;
        let value = self.parse_expr(0)?;
        Ok(Expr::Return(Box::new(value), position))
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, SyntaxError> {
        let mut args = Vec::new();
        if self.current.as_operator().map(|(k, _)| k) != Some(OperatorKind::RParen) {
            loop {
                args.push(self.parse_expr(0)?);
                if self.current.as_operator().map(|(k, _)| k) == Some(OperatorKind::Comma) {
                    self.advance()?;
                    continue;
                }
                break;
            }
        }
        self.expect_operator(OperatorKind::RParen, ")")?;
        Ok(args)
    }

    /// `primary := NUMBER | STRING | IDENT ('(' args ')')? | '(' expr ')'
    /// | ';' | if | for | var | return`
    ///
    /// The lowest-level production in the expression grammar: parenthesized
    /// groups recurse back into `parse_expr(0)`, resetting the precedence
    /// floor for whatever's inside, while a bare identifier is
    /// disambiguated into a call or a variable reference purely by
    /// lookahead on the following token.
    fn parse_primary(&mut self) -> Result<Expr, SyntaxError> {
        let position = self.current.position;
        match self.current.kind.clone() {
            TokenKind::NumberLit(d) => {
                self.advance()?;
                Ok(Expr::Number(d, position))
            }
            TokenKind::StringLit(s) => {
                self.advance()?;
                Ok(Expr::Str(s, position))
            }
            TokenKind::Identifier(name) => {
                self.advance()?;
                if self.current.as_operator().map(|(k, _)| k) == Some(OperatorKind::LParen) {
                    self.advance()?;
                    let args = self.parse_args()?;
                    Ok(Expr::Call { callee: name, args, position })
                } else {
                    Ok(Expr::Variable(name, position))
                }
            }
            TokenKind::Operator(OperatorKind::LParen, _) => {
                self.advance()?;
                let expr = self.parse_expr(0)?;
                self.expect_operator(OperatorKind::RParen, ")")?;
                Ok(expr)
            }
            TokenKind::Operator(OperatorKind::Semi, _) => {
                self.advance()?;
                Ok(Expr::Empty(position))
            }
            TokenKind::Keyword(Keyword::If) => self.parse_if(),
            TokenKind::Keyword(Keyword::For) => self.parse_for(),
            TokenKind::Keyword(Keyword::Var) => self.parse_var(),
            TokenKind::Keyword(Keyword::Return) => self.parse_return(),
            _ => Err(self.err("expected an expression")),
        }
    }

    /// `unary := USER_DEF_OP unary | primary` — only operators in the
    /// catch-all `UserDefined` tag can be applied prefix; the fixed
    /// arithmetic/comparison spellings never are.
    fn parse_unary(&mut self) -> Result<Expr, SyntaxError> {
        if let Some((OperatorKind::UserDefined, spelling)) = self.current.as_operator() {
            let spelling = spelling.to_string();
            let position = self.current.position;
            self.advance()?;
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary { spelling, operand: Box::new(operand), position });
        }
        self.parse_primary()
    }

    /// Precedence-climbing entry point.
    pub fn parse_expr(&mut self, min_precedence: i32) -> Result<Expr, SyntaxError> {
        let left = self.parse_unary()?;
        self.parse_bin_op_rhs(min_precedence, left)
    }

    fn parse_bin_op_rhs(&mut self, min_precedence: i32, mut left: Expr) -> Result<Expr, SyntaxError> {
        loop {
            let Some((kind, spelling)) = self.current.as_operator() else {
                return Ok(left);
            };
            let spelling = spelling.to_string();
            let precedence = self.precedence_of(&spelling);
            if precedence < min_precedence {
                return Ok(left);
            }
            let position = self.current.position;
            self.advance()?;
            let mut right = self.parse_unary()?;
            if let Some((_, next_spelling)) = self.current.as_operator() {
                if self.precedence_of(next_spelling) > precedence {
                    right = self.parse_bin_op_rhs(precedence + 1, right)?;
                }
            }
            left = Expr::Binary {
                spelling,
                kind,
                left: Box::new(left),
                right: Box::new(right),
                position,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::{CharSource, Lexer};

    fn parse_one(src: &str) -> TopLevel {
        let precedence = Rc::new(RefCell::new(seed_precedence()));
        let lexer = Lexer::new(CharSource::new(src.as_bytes()));
        let mut parser = Parser::new(lexer, precedence).unwrap();
        parser.next_top_level().unwrap().unwrap()
    }

    fn expr_of(top: TopLevel) -> Expr {
        match top {
            TopLevel::Function(f) => f.body,
            TopLevel::Extern(_) => panic!("expected a function"),
        }
    }

    #[test]
    fn additive_and_multiplicative_precedence() {
        let expr = expr_of(parse_one("1+2*3"));
        match expr {
            Expr::Binary { spelling, left, right, .. } => {
                assert_eq!(spelling, "+");
                assert!(matches!(*left, Expr::Number(n, _) if n == 1.0));
                match *right {
                    Expr::Binary { spelling, .. } => assert_eq!(spelling, "*"),
                    other => panic!("expected nested '*', got {other:?}"),
                }
            }
            other => panic!("expected '+' at the top, got {other:?}"),
        }

        let expr = expr_of(parse_one("1*2+3"));
        match expr {
            Expr::Binary { spelling, left, .. } => {
                assert_eq!(spelling, "+");
                match *left {
                    Expr::Binary { spelling, .. } => assert_eq!(spelling, "*"),
                    other => panic!("expected nested '*', got {other:?}"),
                }
            }
            other => panic!("expected '+' at the top, got {other:?}"),
        }
    }

    #[test]
    fn reparse_is_deep_equal_up_to_positions() {
        let src = "function fib(n:number) -> number begin if n<2 then begin return n end else begin return fib(n-1)+fib(n-2) end end";
        let first = parse_one(src);
        let second = parse_one(src);
        assert_eq!(first, second);
    }

    #[test]
    fn user_defined_operator_is_left_associative_once_registered() {
        let precedence = Rc::new(RefCell::new(seed_precedence()));
        precedence.borrow_mut().insert("|".to_string(), 5);
        let lexer = Lexer::new(CharSource::new("x|y|z".as_bytes()));
        let mut parser = Parser::new(lexer, precedence).unwrap();
        let expr = parser.parse_expr(0).unwrap();
        match expr {
            Expr::Binary { spelling, left, .. } => {
                assert_eq!(spelling, "|");
                match *left {
                    Expr::Binary { spelling, .. } => assert_eq!(spelling, "|"),
                    other => panic!("expected (x|y) on the left, got {other:?}"),
                }
            }
            other => panic!("expected top-level '|', got {other:?}"),
        }
    }

    #[test]
    fn unary_prototype_rejects_wrong_arity() {
        let precedence = Rc::new(RefCell::new(seed_precedence()));
        let lexer = Lexer::new(CharSource::new(
            "function unary! (a:number, b:number) -> number begin return a end".as_bytes(),
        ));
        let mut parser = Parser::new(lexer, precedence).unwrap();
        assert!(parser.next_top_level().is_err());
    }
}
