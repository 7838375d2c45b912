//! Typed error values for the lexer, parser and code generator.
//!
//! The three recoverable error kinds (`LexicalError`, `SyntaxError`,
//! `CompileError`) each carry just their own payload and independently
//! implement [`std::fmt::Display`] / [`std::error::Error`], following the
//! same per-variant-struct layout used for type errors in the surrounding
//! toolchain. [`CompilerError`] wraps all three so the driver loop can
//! handle them uniformly with `?`. [`LinkError`] is deliberately kept out
//! of that enum: it is fatal, and folding it in would make it too easy to
//! accidentally treat a link failure as recoverable.

use std::fmt;

use colored::Colorize;

/// A 1-based source line number. `0` means "synthetic/unknown".
#[derive(Debug, Clone, Copy, Default, Eq, Ord, PartialOrd)]
pub struct Position(pub u32);

impl Position {
    pub const UNKNOWN: Position = Position(0);

    pub fn line(self) -> u32 {
        self.0
    }
}

// AST deep-equality is defined "up to positions" (see the parser testable
// properties): two positions are always considered equal so `#[derive(PartialEq)]`
// on AST nodes ignores where they came from.
impl PartialEq for Position {
    fn eq(&self, _other: &Position) -> bool {
        true
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}", self.0)
    }
}

/// Renders `message`, highlighting the offending line of `source` if it can
/// be located. Falls back to a bare "message (line N)" when the line is out
/// of range (e.g. synthetic positions, or diagnostics raised past EOF).
pub fn render(source: &str, position: Position, message: &str) -> String {
    let line_no = position.line();
    let lines: Vec<&str> = source.lines().collect();
    let Some(offending) = line_no.checked_sub(1).and_then(|i| lines.get(i as usize)) else {
        return format!("{message} ({position})");
    };
    format!(
        "{pos} | {line}\n{pad} | {caret} {message}",
        pos = line_no,
        line = offending,
        pad = " ".repeat(line_no.to_string().len()),
        caret = "^--".red(),
    )
}

#[derive(Debug, Clone)]
pub struct LexicalError {
    pub message: String,
    pub position: Position,
}

impl fmt::Display for LexicalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lexical error: {} ({})", self.message, self.position)
    }
}

impl std::error::Error for LexicalError {}

#[derive(Debug, Clone)]
pub struct SyntaxError {
    pub message: String,
    pub position: Position,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "syntax error: {} ({})", self.message, self.position)
    }
}

impl std::error::Error for SyntaxError {}

#[derive(Debug, Clone)]
pub struct CompileError {
    pub message: String,
    pub position: Position,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "compile error: {} ({})", self.message, self.position)
    }
}

impl std::error::Error for CompileError {}

/// JIT symbol resolution failure. Fatal: the engine that needed the symbol
/// has already been handed to LLVM and cannot be rolled back.
#[derive(Debug, Clone)]
pub struct LinkError {
    pub name: String,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "link error: could not resolve symbol '{}'",
            self.name
        )
    }
}

impl std::error::Error for LinkError {}

/// Any recoverable error surfaced while processing a single top-level form.
#[derive(Debug, Clone)]
pub enum CompilerError {
    Lexical(LexicalError),
    Syntax(SyntaxError),
    Compile(CompileError),
}

impl fmt::Display for CompilerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompilerError::Lexical(e) => e.fmt(f),
            CompilerError::Syntax(e) => e.fmt(f),
            CompilerError::Compile(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for CompilerError {}

impl From<LexicalError> for CompilerError {
    fn from(e: LexicalError) -> Self {
        CompilerError::Lexical(e)
    }
}

impl From<SyntaxError> for CompilerError {
    fn from(e: SyntaxError) -> Self {
        CompilerError::Syntax(e)
    }
}

impl From<CompileError> for CompilerError {
    fn from(e: CompileError) -> Self {
        CompilerError::Compile(e)
    }
}

impl CompilerError {
    pub fn position(&self) -> Position {
        match self {
            CompilerError::Lexical(e) => e.position,
            CompilerError::Syntax(e) => e.position,
            CompilerError::Compile(e) => e.position,
        }
    }
}
