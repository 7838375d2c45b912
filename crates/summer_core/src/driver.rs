//! Top-level read-parse-codegen-run loop (§4.4, §6, §7).
//!
//! Each recognized top-level form is parsed and emitted independently; a
//! recoverable error aborts only that form (the parser resynchronizes and
//! the loop continues), while a link failure is fatal and ends the run.

use std::cell::RefCell;
use std::io::Read;
use std::rc::Rc;

use inkwell::context::Context;

use crate::codegen::Engine;
use crate::error::{render, CompilerError, LinkError, Position};
use crate::lexer::{CharSource, Lexer};
use crate::parser::ast::{Prototype, TopLevel};
use crate::parser::{seed_precedence, Parser, PrecedenceTable};

/// Runs `source_text` to completion. `source_text` is also kept around
/// verbatim so diagnostics can highlight the offending line; `reader` is
/// lexed independently of it (the lexer consumes bytes, not the string).
pub fn run<R: Read>(source_text: &str, reader: R) -> Result<(), LinkError> {
    let context = Context::create();
    let engine = Engine::new(&context);
    let precedence: PrecedenceTable = Rc::new(RefCell::new(seed_precedence()));

    let lexer = Lexer::new(CharSource::new(reader));
    let mut parser = match Parser::new(lexer, Rc::clone(&precedence)) {
        Ok(parser) => parser,
        Err(e) => {
            log::warn!("{}", render(source_text, e.position, &e.message));
            return Ok(());
        }
    };

    loop {
        match parser.next_top_level() {
            Ok(None) => return Ok(()),
            Ok(Some(top_level)) => {
                let is_anonymous = is_anonymous_expression(&top_level);
                match codegen_top_level(&engine, &top_level, &precedence) {
                    Ok(()) => {
                        if is_anonymous {
                            if let Err(link_error) = invoke_anonymous(&engine) {
                                log::error!("{link_error}");
                                return Err(link_error);
                            }
                        }
                    }
                    Err(error) => {
                        log::warn!(
                            "{}",
                            render(source_text, error.position(), &error.to_string())
                        );
                        parser.resync();
                    }
                }
            }
            Err(error) => {
                log::warn!("{}", render(source_text, error.position, &error.message));
                parser.resync();
            }
        }
    }
}

fn codegen_top_level(
    engine: &Engine,
    top_level: &TopLevel,
    precedence: &PrecedenceTable,
) -> Result<(), CompilerError> {
    match top_level {
        TopLevel::Extern(proto) => {
            log::debug!("declaring extern '{}'", proto.mangled_name());
            engine.codegen_prototype(proto)?;
        }
        TopLevel::Function(func) => {
            log::debug!("compiling function '{}'", func.prototype.mangled_name());
            engine.codegen_function(func, precedence)?;
        }
    }
    Ok(())
}

fn is_anonymous_expression(top_level: &TopLevel) -> bool {
    matches!(top_level, TopLevel::Function(f) if f.prototype.name.is_empty())
}

fn invoke_anonymous(engine: &Engine) -> Result<(), LinkError> {
    let name = Prototype::anonymous(Position::UNKNOWN).mangled_name().to_string();
    log::debug!("sealing module to invoke anonymous top-level expression");
    let address = engine.pointer_to_function(&name)?;
    let function: extern "C" fn() = unsafe { std::mem::transmute(address) };
    function();
    Ok(())
}
