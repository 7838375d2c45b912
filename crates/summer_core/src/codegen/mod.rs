//! # Code Generator and JIT Driver
//!
//! This module implements the LLVM-backed compilation core: translating a
//! parsed `Prototype`/`Function`/`Expr` tree into LLVM IR and then running
//! that IR natively through MCJIT, one top-level form at a time. The two
//! halves — "code generator" and "JIT driver" — are modeled as a single
//! [`Engine`] rather than two cooperating structs.
//!
//! ## Why One Struct, Not Two
//!
//! Codegen always emits into "whichever module is currently open", and
//! `inkwell::module::Module` cannot be cloned out to a second owner safely.
//! Splitting "the thing that emits IR" from "the thing that owns the open
//! module" would require sharing a `Module` reference across both halves —
//! either through unsound aliasing or through a second layer of `RefCell`
//! indirection that buys nothing, since every caller already needs both
//! halves together (codegen a function, immediately call it if it's an
//! anonymous top-level expression). `Engine` owns:
//!
//! - the LLVM context handle and a single shared `Builder`
//! - the lexical scope stack (`RefCell<Vec<Scope<'ctx>>>`)
//! - every module ever created, in creation order (`modules`)
//! - every sealed execution engine, index-aligned with the sealed prefix of
//!   `modules` (`engines`)
//!
//! ## Open Module / Sealed Engines
//!
//! Each top-level form is emitted into the single currently-open module.
//! When a form must actually run (an anonymous top-level expression), the
//! open module is *sealed*: handed to a freshly created `ExecutionEngine`,
//! optimized, and scanned for any still-unresolved external declarations,
//! which are resolved eagerly against the host runtime or an earlier sealed
//! engine. A new module is then opened immediately so later top-level forms
//! have somewhere to go. This keeps the invariant "the last element of
//! `modules` is always open" true without a separate boolean flag, and
//! mirrors the open-module/sealed-engines protocol in the original
//! `MCJIT_helper.h`/`.cpp`, which this module is grounded on for anything
//! JIT-specific — the teacher's own codegen is AOT-only and never seals a
//! module into an execution engine at all.
//!
//! ## Cross-Module Calls
//!
//! A function body emitted into the open module can call a function that
//! was defined in an *earlier, already-sealed* module. LLVM cannot emit a
//! call instruction against a `FunctionValue` owned by a different module,
//! so [`Engine::lookup_function`] re-declares a body-less stub of the
//! target into the open module on demand; [`Engine::resolve_externals`]
//! later maps that stub to the real compiled address once the open module
//! is itself sealed. See [`Engine::find_function_definition`] for why this
//! stub must never be mistaken for the original definition.

pub mod declarations;
pub mod expressions;

use std::cell::RefCell;
use std::collections::HashMap;

use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::execution_engine::ExecutionEngine;
use inkwell::module::Module;
use inkwell::types::{BasicMetadataTypeEnum, BasicType, BasicTypeEnum, FunctionType};
use inkwell::values::{FunctionValue, PointerValue};
use inkwell::{AddressSpace, OptimizationLevel};

use crate::error::LinkError;
use crate::lexer::TypeName;
use crate::parser::ast::Param;

/// One lexical scope frame: a `Var`/`For`/function-entry binding set.
/// Searched top-down so an inner binding shadows an outer one of the same
/// name, and popping a frame restores whatever was visible before it.
type Scope<'ctx> = HashMap<String, (PointerValue<'ctx>, TypeName)>;

pub struct Engine<'ctx> {
    pub context: &'ctx Context,
    builder: Builder<'ctx>,
    scopes: RefCell<Vec<Scope<'ctx>>>,
    /// Every LLIR module ever created, in creation order. The last element
    /// is always the open module; every earlier element has already been
    /// sealed and has a corresponding entry at the same index in `engines`.
    modules: RefCell<Vec<Module<'ctx>>>,
    engines: RefCell<Vec<ExecutionEngine<'ctx>>>,
}

static NATIVE_TARGET_INIT: std::sync::Once = std::sync::Once::new();

impl<'ctx> Engine<'ctx> {
    /// Builds a fresh engine with one open, empty module and no sealed
    /// engines.
    ///
    /// ## Native Target Initialization
    ///
    /// `inkwell::targets::Target::initialize_native` must run exactly once
    /// per process before `create_jit_execution_engine` can succeed — LLVM's
    /// MCJIT backend needs the host target registered with the global
    /// target registry first. This is guarded by a process-wide
    /// [`std::sync::Once`] rather than a per-engine check, since a second
    /// `Engine::new` in the same process (as happens across independent
    /// `#[test]` functions) must not attempt to re-initialize the already
    /// -registered target.
    ///
    /// # Panics
    ///
    /// Panics if native target initialization fails — this indicates a
    /// broken LLVM installation, not a recoverable compile error.
    pub fn new(context: &'ctx Context) -> Engine<'ctx> {
        NATIVE_TARGET_INIT.call_once(|| {
            inkwell::targets::Target::initialize_native(&inkwell::targets::InitializationConfig::default())
                .expect("failed to initialize the native target for the JIT");
        });
        let module = Self::create_module(context, 0);
        Engine {
            context,
            builder: context.create_builder(),
            scopes: RefCell::new(vec![HashMap::new()]),
            modules: RefCell::new(vec![module]),
            engines: RefCell::new(Vec::new()),
        }
    }

    /// `index` only feeds the module's debug name (`summer_module_N`); it
    /// carries no semantic weight and is never parsed back out.
    fn create_module(context: &'ctx Context, index: usize) -> Module<'ctx> {
        context.create_module(&format!("summer_module_{index}"))
    }

    // ---- scope stack -----------------------------------------------------
    //
    // One frame per lexical binding site: function entry, each `Var`, each
    // `For`, each `If` branch. `find_variable` walks the stack from the top
    // so an inner frame's binding shadows an outer one of the same name;
    // `enter_scope`/`exit_scope` push and pop in exact pairs around the
    // construct that introduces the frame, so a binding is visible for
    // precisely the span of source it lexically covers.

    fn enter_scope(&self) {
        self.scopes.borrow_mut().push(HashMap::new());
    }

    fn exit_scope(&self) {
        self.scopes.borrow_mut().pop();
    }

    /// Clears every scope and leaves a single empty frame, matching "between
    /// functions the [symbol] table is cleared" (§3 invariants).
    fn clear_scopes(&self) {
        let mut scopes = self.scopes.borrow_mut();
        scopes.clear();
        scopes.push(HashMap::new());
    }

    /// Binds `name` to `ptr` in the innermost scope frame. Always inserts
    /// into the *current* top frame, so a binding introduced inside a
    /// nested `Var`/`For`/`If` branch never leaks into the frame it was
    /// opened from.
    fn store_variable(&self, name: &str, ptr: PointerValue<'ctx>, ty: TypeName) {
        self.scopes
            .borrow_mut()
            .last_mut()
            .expect("at least one scope frame is always present")
            .insert(name.to_string(), (ptr, ty));
    }

    /// Looks `name` up from the innermost frame outward, returning the
    /// first (i.e. most deeply nested) match. Returns `None` for a
    /// reference to an unbound name, which [`crate::codegen::expressions`]
    /// turns into the `CompileError` required by the "unbound variable"
    /// invariant (§8).
    fn find_variable(&self, name: &str) -> Option<(PointerValue<'ctx>, TypeName)> {
        self.scopes
            .borrow()
            .iter()
            .rev()
            .find_map(|frame| frame.get(name).copied())
    }

    // ---- type conversion ---------------------------------------------------
    //
    // The source language has exactly three type names (§3's DATA MODEL);
    // `number` maps to a 64-bit float and `string` to an `i8*`, matching
    // how every string literal and every `str_cat` result is represented
    // at the C ABI boundary with the host runtime (`crate::runtime`).
    // `void` has no value representation and only ever appears as a
    // function's return type, never as a parameter or a local's type.

    fn llvm_basic_type(&self, ty: TypeName) -> BasicTypeEnum<'ctx> {
        match ty {
            TypeName::Number => self.context.f64_type().into(),
            TypeName::String => self.context.i8_type().ptr_type(AddressSpace::default()).into(),
            TypeName::Void => unreachable!("void has no value representation"),
        }
    }

    fn llvm_fn_type(&self, params: &[Param], return_type: TypeName) -> FunctionType<'ctx> {
        let param_types: Vec<BasicMetadataTypeEnum> = params
            .iter()
            .map(|p| self.llvm_basic_type(p.param_type).into())
            .collect();
        match return_type {
            TypeName::Void => self.context.void_type().fn_type(&param_types, false),
            other => self.llvm_basic_type(other).fn_type(&param_types, false),
        }
    }

    /// `false` once the current basic block already ends in a terminator
    /// (typically a `return` reached through a non-tail sub-expression).
    /// Every remaining sibling expression in that block is dead code and
    /// must not emit further instructions into it.
    fn block_open(&self) -> bool {
        match self.builder.get_insert_block() {
            Some(block) => block.get_terminator().is_none(),
            None => false,
        }
    }

    /// The function currently being emitted into, derived from wherever
    /// the shared builder happens to be positioned.
    ///
    /// # Panics
    ///
    /// Panics if called outside of `codegen_function`'s body — every other
    /// `Engine` method that needs "the current function" (entry-block
    /// allocas, `if`/`for` basic block creation) only runs while a function
    /// body is being emitted, so this is a programming-error panic, not a
    /// user-facing one.
    fn current_function(&self) -> FunctionValue<'ctx> {
        self.builder
            .get_insert_block()
            .expect("codegen only runs while positioned inside a function")
            .get_parent()
            .expect("every basic block belongs to a function")
    }

    /// Allocates `ty` in the entry block of `function` rather than at the
    /// builder's current position.
    ///
    /// ## Why the Entry Block
    ///
    /// LLVM's `mem2reg` pass — run over every sealed module in
    /// [`Engine::run_optimizations`] — only promotes `alloca`s it finds in
    /// a function's entry block back into SSA registers. An `alloca` built
    /// anywhere else (e.g. inside a `for` loop body, once per iteration)
    /// would allocate a fresh stack slot on every pass through the block
    /// instead of reusing one slot for the lifetime of the function, and
    /// `mem2reg` would leave it alone. Every mutable local this crate
    /// generates — function parameters, `var` bindings, `for` induction
    /// variables — goes through this method for exactly that reason.
    ///
    /// ## Mechanism
    ///
    /// A second, throwaway `Builder` is positioned at the start of the
    /// entry block (before its first instruction, or at the block's own
    /// end if it has none yet) so the allocation can be inserted there
    /// without disturbing the *shared* builder's current position, which
    /// the caller still needs pointed at wherever it actually is in the
    /// function body.
    fn build_entry_alloca(
        &self,
        function: FunctionValue<'ctx>,
        name: &str,
        ty: BasicTypeEnum<'ctx>,
    ) -> PointerValue<'ctx> {
        let entry = function
            .get_first_basic_block()
            .expect("function has an entry block by the time locals are allocated");
        let entry_builder = self.context.create_builder();
        match entry.get_first_instruction() {
            Some(first) => entry_builder.position_before(&first),
            None => entry_builder.position_at_end(entry),
        }
        entry_builder
            .build_alloca(ty, name)
            .expect("stack allocation does not fail for a valid type")
    }

    fn with_open_module<T>(&self, f: impl FnOnce(&Module<'ctx>) -> T) -> T {
        let modules = self.modules.borrow();
        f(modules.last().expect("the open module always exists"))
    }

    // ---- JIT driver ---------------------------------------------------------

    /// Searches every module — sealed and open, in creation order — for a
    /// function named `name` and returns the *original* definition exactly
    /// as found, without synthesizing anything. This is the primitive both
    /// [`Engine::lookup_function`] and [`Engine::codegen_prototype`] build on:
    /// the former re-declares the result into the open module for calling,
    /// the latter inspects it directly to decide whether a redefinition is
    /// legal, and those two uses must not be conflated (see below).
    fn find_function_definition(&self, name: &str) -> Option<FunctionValue<'ctx>> {
        let modules = self.modules.borrow();
        modules.iter().find_map(|module| module.get_function(name))
    }

    /// Walks every module (sealed and open) for a function named `name`. A
    /// match found in a sealed module is re-declared (external linkage, no
    /// body) into the open module so the function currently being emitted
    /// can call it; a match already in the open module is returned as-is.
    ///
    /// The value this returns is only safe to use for *calling* `name` — a
    /// cross-module match comes back as a freshly synthesized, permanently
    /// body-less stub, not the original `FunctionValue`. Callers that need
    /// to know whether `name` already has a body (redefinition checks) must
    /// go through [`Engine::find_function_definition`] instead, or they will
    /// inspect the stub's own (always-empty) block count rather than the
    /// original's.
    fn lookup_function(&self, name: &str) -> Option<FunctionValue<'ctx>> {
        let found = self.find_function_definition(name)?;
        let modules = self.modules.borrow();
        let open = modules.last().expect("the open module always exists");
        if open.get_function(name).is_some() {
            return open.get_function(name);
        }
        Some(open.add_function(name, found.get_type(), None))
    }

    /// Linear search across every *sealed* engine, oldest first, for a
    /// compiled symbol named `name` (§4.4's `symbol_address`). The open
    /// module is never searched here — nothing in it has been compiled to
    /// native code yet, only declared as LLVM IR.
    fn symbol_address(&self, name: &str) -> Option<usize> {
        self.engines
            .borrow()
            .iter()
            .find_map(|engine| engine.get_function_address(name).ok())
            .filter(|addr| *addr != 0)
    }

    /// Returns a callable native pointer for `name`, sealing the open
    /// module first if no sealed engine has already compiled it.
    ///
    /// This is the only path that forces a seal outside of the driver's own
    /// "this top-level form was an anonymous expression" check — sealing is
    /// otherwise deferred for as long as possible so later top-level forms
    /// can still freely reference names declared earlier in the same
    /// module.
    pub fn pointer_to_function(&self, name: &str) -> Result<usize, LinkError> {
        if let Some(addr) = self.symbol_address(name) {
            return Ok(addr);
        }
        self.seal_open_module()?;
        self.symbol_address(name).ok_or_else(|| LinkError { name: name.to_string() })
    }

    /// Seals the open module into a new execution engine.
    ///
    /// ## Steps
    ///
    /// 1. Hand the open module to a fresh `ExecutionEngine` via
    ///    `create_jit_execution_engine` — inkwell tracks module ownership
    ///    internally, so the `Module` handle kept in `self.modules` stays
    ///    valid for later `get_function`/`lookup_function` calls even after
    ///    this.
    /// 2. Run the optimization pipeline (`run_optimizations`) over it.
    /// 3. Resolve every still-external (body-less) declaration left in it
    ///    (`resolve_externals`) — this must happen *before* the engine is
    ///    pushed into `self.engines`, so a module's own cross-module
    ///    declarations are never satisfied by looking at itself.
    /// 4. Push the engine and open a fresh, empty module for whatever
    ///    top-level form comes next.
    fn seal_open_module(&self) -> Result<(), LinkError> {
        let index = self.modules.borrow().len() - 1;
        let engine = {
            let modules = self.modules.borrow();
            modules[index]
                .create_jit_execution_engine(OptimizationLevel::Default)
                .expect("failed to create a JIT execution engine for the sealed module")
        };
        self.run_optimizations(index);
        self.resolve_externals(index, &engine)?;
        self.engines.borrow_mut().push(engine);
        let next = Self::create_module(self.context, self.modules.borrow().len());
        self.modules.borrow_mut().push(next);
        Ok(())
    }

    /// Runs a fixed function-pass pipeline — basic alias analysis,
    /// `mem2reg`, instruction combining, reassociation, GVN, and CFG
    /// simplification — over every function in the module at `index`.
    /// `mem2reg` is the load-bearing one: it is what turns the
    /// entry-block `alloca`/`load`/`store` pattern `build_entry_alloca`
    /// relies on back into ordinary SSA registers.
    fn run_optimizations(&self, index: usize) {
        use inkwell::passes::PassManager;
        let modules = self.modules.borrow();
        let module = &modules[index];
        let fpm = PassManager::create(module);
        fpm.add_basic_alias_analysis_pass();
        fpm.add_promote_memory_to_register_pass();
        fpm.add_instruction_combining_pass();
        fpm.add_reassociate_pass();
        fpm.add_gvn_pass();
        fpm.add_cfg_simplification_pass();
        fpm.initialize();
        let mut maybe_function = module.get_first_function();
        while let Some(function) = maybe_function {
            fpm.run_on(&function);
            maybe_function = function.get_next_function();
        }
    }

    /// The inkwell-idiomatic substitute for the original's custom memory
    /// manager: rather than intercepting unresolved-symbol lookups lazily
    /// at call time, every body-less function left in the freshly sealed
    /// module is resolved eagerly, in the same order the original's
    /// resolver used — host runtime first, then earlier sealed engines —
    /// and mapped directly via `add_global_mapping`.
    fn resolve_externals(
        &self,
        index: usize,
        engine: &ExecutionEngine<'ctx>,
    ) -> Result<(), LinkError> {
        let modules = self.modules.borrow();
        let module = &modules[index];
        let mut maybe_function = module.get_first_function();
        while let Some(function) = maybe_function {
            if function.count_basic_blocks() == 0 {
                let name = function
                    .get_name()
                    .to_str()
                    .expect("function names are ASCII identifiers")
                    .to_string();
                let address = crate::runtime::host_symbol_address(&name)
                    .or_else(|| self.symbol_address(&name));
                match address {
                    Some(addr) => engine.add_global_mapping(&function, addr),
                    None => return Err(LinkError { name }),
                }
            }
            maybe_function = function.get_next_function();
        }
        Ok(())
    }
}

