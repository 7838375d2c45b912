//! # Expression Code Generation
//!
//! One LLVM-emitting function per `Expr` variant (§4.3). Every expression
//! yields an `f64`-valued `BasicValueEnum`: Summer has a single numeric
//! type, so there is never a second value representation to reconcile, and
//! control-flow constructs that don't naturally produce a value (`for`,
//! `Block`) simply yield a dummy `0.0` rather than inventing a unit type.
//!
//! ## Dead Code After a Terminator
//!
//! `return` is an ordinary primary expression, not a statement restricted
//! to tail position — it can appear as a call argument, inside a binary
//! operand, anywhere an expression is legal. Once it runs, the current
//! basic block has a terminator, and LLVM rejects a second terminator or
//! any instruction after one. Every codegen function re-checks
//! `Engine::block_open` after evaluating a sub-expression that might itself
//! contain a `return`, and short-circuits to the dummy `0.0` instead of
//! emitting into a block that's already closed — this is what lets
//! `1 + return 2` or `f(return 1, return 2)` compile to valid (if useless)
//! IR instead of panicking deep inside `inkwell`.
//!
//! ## Control Flow: `if` and `for`
//!
//! `codegen_if` and `codegen_for` both follow the same three-block shape —
//! a condition block, one or more body blocks, and a block the control
//! flow rejoins at — and both must account for a body that terminates
//! itself (via `return`) before falling through to the rejoin block. `if`
//! additionally has to reconcile the two branches' values into one, which
//! it does with a `phi` node when both branches fall through, or by taking
//! whichever branch's value survived when the other one returned.

use inkwell::values::BasicValueEnum;
use inkwell::FloatPredicate;

use crate::error::{CompileError, Position};
use crate::lexer::OperatorKind;
use crate::parser::ast::Expr;

use super::Engine;

impl<'ctx> Engine<'ctx> {
    pub fn codegen_expr(&self, expr: &Expr) -> Result<BasicValueEnum<'ctx>, CompileError> {
        // `return` is an ordinary primary expression and can appear in a
        // non-tail position (e.g. as a call argument); anything sequenced
        // after the basic block it terminates is dead and must not emit.
        if !self.block_open() {
            return Ok(self.context.f64_type().const_float(0.0).into());
        }
        match expr {
            Expr::Number(value, _) => Ok(self.context.f64_type().const_float(*value).into()),
            Expr::Str(bytes, _) => Ok(self.codegen_string(bytes).into()),
            Expr::Variable(name, position) => self.codegen_variable(name, *position),
            Expr::Empty(_) => Ok(self.context.f64_type().const_float(0.0).into()),
            Expr::Binary {
                spelling,
                kind,
                left,
                right,
                position,
            } => self.codegen_binary(spelling, *kind, left, right, *position),
            Expr::Unary {
                spelling,
                operand,
                position,
            } => {
                let value = self.codegen_expr(operand)?;
                self.codegen_call_by_name(&format!("unary{spelling}"), &[value], *position)
            }
            Expr::Call {
                callee,
                args,
                position,
            } => {
                let values = args
                    .iter()
                    .map(|a| self.codegen_expr(a))
                    .collect::<Result<Vec<_>, _>>()?;
                self.codegen_call_by_name(callee, &values, *position)
            }
            Expr::If {
                condition,
                then_block,
                else_block,
                position: _,
            } => self.codegen_if(condition, then_block, else_block),
            Expr::For {
                var_name,
                var_type,
                start,
                end,
                step,
                body,
                position: _,
            } => self.codegen_for(var_name, *var_type, start, end, step, body),
            Expr::Var {
                bindings,
                body,
                position: _,
            } => self.codegen_var(bindings, body),
            Expr::Block(exprs, _) => {
                for e in exprs {
                    self.codegen_expr(e)?;
                }
                Ok(self.context.f64_type().const_float(0.0).into())
            }
            Expr::Return(value, _) => {
                let v = self.codegen_expr(value)?;
                // An anonymous top-level expression's prototype is always
                // `-> void` (`Prototype::anonymous`), yet its body can still
                // contain a literal `return <expr>` (§8 scenario 5 is exactly
                // this). Building `ret <value>` against a void-returning
                // function produces invalid IR, so the enclosing function's
                // own declared return type — not the value's presence —
                // decides which `ret` form is emitted; the value is still
                // computed for any side effects it has.
                let is_void = self
                    .current_function()
                    .get_type()
                    .get_return_type()
                    .is_none();
                if is_void {
                    self.builder
                        .build_return(None)
                        .expect("entry block is always open for a return");
                } else {
                    self.builder
                        .build_return(Some(&v))
                        .expect("entry block is always open for a return");
                }
                Ok(v)
            }
        }
    }

    fn codegen_string(&self, bytes: &[u8]) -> inkwell::values::PointerValue<'ctx> {
        let text = String::from_utf8_lossy(bytes);
        self.builder
            .build_global_string_ptr(&text, "str")
            .expect("global string constants always succeed")
            .as_pointer_value()
    }

    fn codegen_variable(
        &self,
        name: &str,
        position: Position,
    ) -> Result<BasicValueEnum<'ctx>, CompileError> {
        let (ptr, _ty) = self.find_variable(name).ok_or_else(|| CompileError {
            message: format!("undefined variable '{name}'"),
            position,
        })?;
        Ok(self
            .builder
            .build_load(ptr, name)
            .expect("loading a previously allocated slot never fails"))
    }

    /// Built-in arithmetic and comparison operators compile directly to
    /// `inkwell` float instructions; anything else — including every
    /// user-defined operator — falls through to a call to `binary<spelling>`.
    fn codegen_binary(
        &self,
        spelling: &str,
        kind: OperatorKind,
        left: &Expr,
        right: &Expr,
        position: Position,
    ) -> Result<BasicValueEnum<'ctx>, CompileError> {
        if kind == OperatorKind::Assign {
            return self.codegen_assign(left, right, position);
        }
        let l = self.codegen_expr(left)?.into_float_value();
        let r = self.codegen_expr(right)?.into_float_value();
        if !self.block_open() {
            return Ok(self.context.f64_type().const_float(0.0).into());
        }
        let builder = &self.builder;
        let value = match kind {
            OperatorKind::Add => builder.build_float_add(l, r, "addtmp"),
            OperatorKind::Sub => builder.build_float_sub(l, r, "subtmp"),
            OperatorKind::Mul => builder.build_float_mul(l, r, "multmp"),
            OperatorKind::Div => builder.build_float_div(l, r, "divtmp"),
            OperatorKind::Lt
            | OperatorKind::Le
            | OperatorKind::Gt
            | OperatorKind::Ge
            | OperatorKind::Eq
            | OperatorKind::Neq => {
                let predicate = match kind {
                    OperatorKind::Lt => FloatPredicate::ULT,
                    OperatorKind::Le => FloatPredicate::ULE,
                    OperatorKind::Gt => FloatPredicate::UGT,
                    OperatorKind::Ge => FloatPredicate::UGE,
                    OperatorKind::Eq => FloatPredicate::UEQ,
                    OperatorKind::Neq => FloatPredicate::UNE,
                    _ => unreachable!(),
                };
                let cmp = builder
                    .build_float_compare(predicate, l, r, "cmptmp")
                    .expect("float comparisons never fail to build");
                return Ok(builder
                    .build_unsigned_int_to_float(cmp, self.context.f64_type(), "booltmp")
                    .expect("bool-to-number conversion never fails to build")
                    .into());
            }
            _ => {
                // A user-defined (or otherwise unrecognized) binary operator
                // compiles to a call to `binary<spelling>`, per §3/§4.3.
                return self.codegen_call_by_name(
                    &format!("binary{spelling}"),
                    &[l.into(), r.into()],
                    position,
                );
            }
        };
        Ok(value.expect("arithmetic instructions never fail to build").into())
    }

    /// `=` requires a bare variable on the left; anything else is a
    /// compile error rather than a panic, since it's reachable from
    /// ordinary (if invalid) source text.
    fn codegen_assign(
        &self,
        left: &Expr,
        right: &Expr,
        position: Position,
    ) -> Result<BasicValueEnum<'ctx>, CompileError> {
        let Expr::Variable(name, _) = left else {
            return Err(CompileError {
                message: "assignment target must be a variable".to_string(),
                position,
            });
        };
        let value = self.codegen_expr(right)?;
        if !self.block_open() {
            return Ok(value);
        }
        let (ptr, _) = self.find_variable(name).ok_or_else(|| CompileError {
            message: format!("undefined variable '{name}'"),
            position,
        })?;
        self.builder
            .build_store(ptr, value)
            .expect("storing into a previously allocated slot never fails");
        Ok(value)
    }

    /// Resolves `name` via [`Engine::lookup_function`] (which crosses
    /// module boundaries as needed) and emits a `call`. Arity is checked
    /// here, against the resolved function's actual parameter count,
    /// because a cross-module lookup returns a stub whose arity still
    /// matches the original — only a body is missing, never a parameter.
    ///
    /// A call to a `void`-returning function produces no LLVM value; that
    /// case is papered over with the same dummy `0.0` used everywhere else
    /// a `void` needs to stand in for Summer's single numeric type.
    fn codegen_call_by_name(
        &self,
        name: &str,
        args: &[BasicValueEnum<'ctx>],
        position: Position,
    ) -> Result<BasicValueEnum<'ctx>, CompileError> {
        if !self.block_open() {
            return Ok(self.context.f64_type().const_float(0.0).into());
        }
        let function = self.lookup_function(name).ok_or_else(|| CompileError {
            message: format!("call to unknown function '{name}'"),
            position,
        })?;
        if function.count_params() as usize != args.len() {
            return Err(CompileError {
                message: format!(
                    "'{name}' expects {} argument(s), got {}",
                    function.count_params(),
                    args.len()
                ),
                position,
            });
        }
        let call_args: Vec<inkwell::values::BasicMetadataValueEnum> =
            args.iter().map(|v| (*v).into()).collect();
        let call = self
            .builder
            .build_call(function, &call_args, "calltmp")
            .expect("call instructions never fail to build");
        match call.try_as_basic_value().left() {
            Some(value) => Ok(value),
            None => Ok(self.context.f64_type().const_float(0.0).into()),
        }
    }

    /// Emits `then`/`else`/merge blocks for an `if` expression.
    ///
    /// ## Implementation Steps
    ///
    /// 1. Evaluate the condition and compare it against `0.0` with
    ///    `ONE` (ordered-not-equal) — Summer has no boolean type, so
    ///    "truthy" means "not exactly zero".
    /// 2. Append `then`, `else`, and `ifcont` blocks on the current
    ///    function and branch to `then`/`else` on the comparison.
    /// 3. Emit each branch under its own scope (`enter_scope`/
    ///    `exit_scope`), so a `var` binding introduced inside one branch
    ///    never leaks into the other or past the `if`.
    /// 4. A branch that falls through (its block has no terminator after
    ///    codegen) gets an unconditional branch to `ifcont`; a branch that
    ///    already ended in `return` is left alone.
    /// 5. Position the builder at `ifcont` and reconcile the two branch
    ///    values: a `phi` node if both fell through, the surviving
    ///    branch's value if only one did, or the dummy `0.0` if both
    ///    returned (in which case `ifcont` is unreachable, but must still
    ///    exist so later codegen has somewhere to position the builder).
    ///
    /// # Panics
    ///
    /// Panics if the condition does not evaluate to a float — the parser
    /// only ever builds numeric comparison expressions here, so this
    /// would indicate an internal AST-construction bug, not user error.
    fn codegen_if(
        &self,
        condition: &Expr,
        then_block: &Expr,
        else_block: &Expr,
    ) -> Result<BasicValueEnum<'ctx>, CompileError> {
        let cond_value = self.codegen_expr(condition)?.into_float_value();
        let zero = self.context.f64_type().const_float(0.0);
        let cond_bool = self
            .builder
            .build_float_compare(FloatPredicate::ONE, cond_value, zero, "ifcond")
            .expect("float comparisons never fail to build");

        let function = self.current_function();
        let then_bb = self.context.append_basic_block(function, "then");
        let else_bb = self.context.append_basic_block(function, "else");
        let merge_bb = self.context.append_basic_block(function, "ifcont");
        self.builder
            .build_conditional_branch(cond_bool, then_bb, else_bb)
            .expect("conditional branches never fail to build");

        self.builder.position_at_end(then_bb);
        self.enter_scope();
        let then_value = self.codegen_expr(then_block)?;
        self.exit_scope();
        let then_end = self.builder.get_insert_block().unwrap();
        if then_end.get_terminator().is_none() {
            self.builder.build_unconditional_branch(merge_bb).unwrap();
        }

        self.builder.position_at_end(else_bb);
        self.enter_scope();
        let else_value = self.codegen_expr(else_block)?;
        self.exit_scope();
        let else_end = self.builder.get_insert_block().unwrap();
        if else_end.get_terminator().is_none() {
            self.builder.build_unconditional_branch(merge_bb).unwrap();
        }

        self.builder.position_at_end(merge_bb);
        let result = match (
            then_end.get_terminator().is_none(),
            else_end.get_terminator().is_none(),
        ) {
            (true, true) => {
                let phi = self
                    .builder
                    .build_phi(self.context.f64_type(), "iftmp")
                    .expect("phi nodes never fail to build");
                phi.add_incoming(&[(&then_value, then_end), (&else_value, else_end)]);
                phi.as_basic_value()
            }
            (true, false) => then_value,
            (false, true) => else_value,
            (false, false) => self.context.f64_type().const_float(0.0).into(),
        };
        Ok(result)
    }

    /// Emits a counted loop: `cond`/`body`/`after` blocks, with the
    /// induction variable allocated in the function's entry block (so it
    /// can be mutated in place via `store`/`load`, as any other local).
    ///
    /// ## Implementation Steps
    ///
    /// 1. Allocate the induction variable, store `start` into it, and
    ///    enter a new scope binding its name to that slot (§4.2's for-loop
    ///    variable is scoped to the loop body only).
    /// 2. Branch into a `loopcond` block that re-evaluates `end` on every
    ///    pass — `end` may itself reference the induction variable (e.g.
    ///    `i<=5`), so it cannot be hoisted out of the loop.
    /// 3. Branch on the condition to `forbody` or `afterloop`.
    /// 4. Emit the body; if it falls through (no `return` inside it),
    ///    compute `current + step` and store it back before branching to
    ///    `loopcond` again. A body that returned is left alone — stepping
    ///    and looping again would run code downstream of a terminator.
    /// 5. Position the builder at `afterloop` and exit the loop's scope.
    ///
    /// Always yields the dummy `0.0` — `for` is evaluated for effect, and
    /// Summer has no notion of the last iteration's value escaping the
    /// loop.
    fn codegen_for(
        &self,
        var_name: &str,
        var_type: crate::lexer::TypeName,
        start: &Expr,
        end: &Expr,
        step: &Expr,
        body: &Expr,
    ) -> Result<BasicValueEnum<'ctx>, CompileError> {
        let function = self.current_function();
        let llvm_var_type = self.llvm_basic_type(var_type);
        let alloca = self.build_entry_alloca(function, var_name, llvm_var_type);
        let start_value = self.codegen_expr(start)?;
        self.builder.build_store(alloca, start_value).unwrap();

        self.enter_scope();
        self.store_variable(var_name, alloca, var_type);

        let loop_bb = self.context.append_basic_block(function, "loopcond");
        self.builder.build_unconditional_branch(loop_bb).unwrap();
        self.builder.position_at_end(loop_bb);

        // `end` is itself a boolean-valued expression (e.g. `i<4`) that may
        // reference the induction variable; re-evaluated on every pass.
        let cond_value = self.codegen_expr(end)?.into_float_value();
        let zero = self.context.f64_type().const_float(0.0);
        let cond_bool = self
            .builder
            .build_float_compare(FloatPredicate::ONE, cond_value, zero, "loopcond")
            .unwrap();

        let body_bb = self.context.append_basic_block(function, "forbody");
        let after_bb = self.context.append_basic_block(function, "afterloop");
        self.builder
            .build_conditional_branch(cond_bool, body_bb, after_bb)
            .unwrap();

        self.builder.position_at_end(body_bb);
        self.codegen_expr(body)?;
        if self.builder.get_insert_block().unwrap().get_terminator().is_none() {
            let step_value = self.codegen_expr(step)?.into_float_value();
            let current = self
                .builder
                .build_load(alloca, var_name)
                .unwrap()
                .into_float_value();
            let next = self.builder.build_float_add(current, step_value, "nextvar").unwrap();
            self.builder.build_store(alloca, next).unwrap();
            self.builder.build_unconditional_branch(loop_bb).unwrap();
        }

        self.builder.position_at_end(after_bb);
        self.exit_scope();
        Ok(self.context.f64_type().const_float(0.0).into())
    }

    /// Emits a `var ... in ...` expression: each binding's initializer is
    /// evaluated and stored in its own entry-block alloca, in the order
    /// written, so a later binding's initializer can reference an earlier
    /// one — then `body` is evaluated under that scope, and the scope is
    /// torn down before returning (the bindings are not visible past the
    /// `var`).
    ///
    /// An initializer containing a `return` closes the block before the
    /// `store` for that binding would run; `block_open` guards against
    /// storing into a slot with no open block to build the instruction in,
    /// while still registering the (unwritten) slot so the remaining
    /// bindings and the body can be emitted without an invalid variable
    /// lookup — `codegen_expr`'s own block-open short-circuit takes care
    /// of making sure that dead code never runs in practice.
    fn codegen_var(
        &self,
        bindings: &[crate::parser::ast::VarBinding],
        body: &Expr,
    ) -> Result<BasicValueEnum<'ctx>, CompileError> {
        self.enter_scope();
        for binding in bindings {
            let value = self.codegen_expr(&binding.init)?;
            let function = self.current_function();
            let llvm_ty = self.llvm_basic_type(binding.var_type);
            let alloca = self.build_entry_alloca(function, &binding.name, llvm_ty);
            if self.block_open() {
                self.builder.build_store(alloca, value).unwrap();
            }
            self.store_variable(&binding.name, alloca, binding.var_type);
        }
        let result = self.codegen_expr(body);
        self.exit_scope();
        result
    }
}

