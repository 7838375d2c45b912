//! # Prototype and Function Code Generation
//!
//! This module covers the two top-level declaration forms: `extern`
//! prototypes, which only declare a callable signature, and `function`
//! definitions, which declare a signature *and* emit a body for it (§4.3).
//!
//! ## Redefinition Checking
//!
//! A prototype may be declared any number of times as long as at most one
//! of those declarations carries a body — an `extern` may be repeated
//! freely, and a `function` may follow a matching `extern`, but a second
//! `function` with the same name is rejected. This check must run against
//! the *original* `FunctionValue`, found anywhere across every module
//! (sealed or open): a name that was already sealed into an earlier module
//! is invisible to a literal `Module::get_function` call against the
//! *current* open module, and the cross-module call machinery in
//! `crate::codegen::Engine::lookup_function` papers over exactly that gap
//! by fabricating a fresh, permanently body-less stub in the open module —
//! a stub that must never be consulted for "does this already have a
//! body", since by construction it never does.
//!
//! ## Failure Recovery
//!
//! `codegen_function` only appends basic blocks to `function` after
//! `codegen_prototype` has already succeeded, so a body that fails partway
//! through always leaves that one function's own blocks as the only stray
//! LLIR — `unsafe { function.delete() }` removes exactly that, and nothing
//! else in the open module is touched (§7's recovery invariant).

use inkwell::values::FunctionValue;

use crate::error::CompileError;
use crate::lexer::TypeName;
use crate::parser::ast::{Function, Prototype};
use crate::parser::PrecedenceTable;

use super::Engine;

impl<'ctx> Engine<'ctx> {
    /// Declares `proto` in the open module, or adopts a matching declaration
    /// already visible from an earlier module. Arity mismatches and
    /// attempts to redeclare a function that already has a body are
    /// rejected here, before any new LLIR is created.
    pub fn codegen_prototype(&self, proto: &Prototype) -> Result<FunctionValue<'ctx>, CompileError> {
        let name = proto.mangled_name();
        // `find_function_definition` (not `lookup_function`) on purpose: once a
        // seal has happened between two definitions of the same name,
        // `lookup_function` would hand back a freshly synthesized, permanently
        // body-less stub for the cross-module call path, and checking *that*
        // stub's block count can never observe the original body — the
        // redefinition would silently slip through. The original definition,
        // wherever it actually lives, is what `has_body` must be read from.
        if let Some(original) = self.find_function_definition(name) {
            if original.count_params() as usize != proto.params.len() {
                return Err(CompileError {
                    message: format!(
                        "redefinition of '{name}' with a different number of arguments"
                    ),
                    position: proto.position,
                });
            }
            if original.count_basic_blocks() > 0 {
                return Err(CompileError {
                    message: format!("redefinition of already-defined function '{name}'"),
                    position: proto.position,
                });
            }
            return Ok(self
                .lookup_function(name)
                .expect("a definition was just found by find_function_definition"));
        }
        let fn_type = self.llvm_fn_type(&proto.params, proto.return_type);
        let function = self.with_open_module(|module| module.add_function(name, fn_type, None));
        for (param, llvm_param) in proto.params.iter().zip(function.get_param_iter()) {
            llvm_param.set_name(&param.name);
        }
        Ok(function)
    }

    /// Emits a full function body. On failure, the partially emitted
    /// function is deleted so no stray LLIR remains in the open module
    /// (§7's recovery invariant).
    pub fn codegen_function(
        &self,
        func: &Function,
        precedence: &PrecedenceTable,
    ) -> Result<FunctionValue<'ctx>, CompileError> {
        self.clear_scopes();
        let function = self.codegen_prototype(&func.prototype)?;

        let entry = self.context.append_basic_block(function, "entry");
        self.builder.position_at_end(entry);

        for (index, param) in func.prototype.params.iter().enumerate() {
            let llvm_param = function
                .get_nth_param(index as u32)
                .expect("prototype and function value agree on arity");
            let ty = self.llvm_basic_type(param.param_type);
            let alloca = self.build_entry_alloca(function, &param.name, ty);
            self.builder.build_store(alloca, llvm_param).unwrap();
            self.store_variable(&param.name, alloca, param.param_type);
        }

        if let Some(spelling) = func.prototype.operator_spelling() {
            if func.prototype.name.starts_with("binary") {
                precedence
                    .borrow_mut()
                    .insert(spelling.to_string(), func.prototype.precedence);
            }
        }

        match self.codegen_expr(&func.body) {
            Ok(value) => {
                let current_bb = self.builder.get_insert_block().unwrap();
                if current_bb.get_terminator().is_none() {
                    if func.prototype.return_type == TypeName::Void {
                        self.builder.build_return(None).unwrap();
                    } else {
                        self.builder.build_return(Some(&value)).unwrap();
                    }
                }
                Ok(function)
            }
            Err(error) => {
                unsafe { function.delete() };
                Err(error)
            }
        }
    }
}
