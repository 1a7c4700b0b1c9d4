//! Function lowering
//!
//! Pure and impure functions become ordinary C functions. Coroutines become
//! switch-based resumable functions: the whole body sits inside a single
//! `switch (coro_susp_point)`, every suspension site gets a unique small
//! integer and a `case n:;` label, and locals live in the receiver struct so
//! no jump can bypass an initialization. I/O buffer pointers are
//! materialized into `iop_`/`io0_`/`io1_`/`io2_` locals on entry and written
//! back to the buffer's meta fields on every exit and around callee
//! coroutine calls.

use crate::ast::{
    ChooseStmt, ElseBranch, Expr, ExprKind, FuncDef, FuncEffect, IfStmt, IterateStmt, Stmt,
    WhileStmt,
};
use crate::token::{bid_of, Bid, Id};
use crate::types::{MType, StatusKind};
use std::collections::HashSet;

use super::error::CodeGenError;
use super::state::{collect_locals, CGen, FuncCtx};

impl CGen<'_> {
    pub(super) fn emit_func(&mut self, func: &FuncDef) -> Result<(), CodeGenError> {
        let is_choosy = func
            .receiver
            .is_some_and(|r| self.choosy.contains(&(r, func.name)));

        self.begin_func(func)?;
        let sig = self.c_signature(func, is_choosy)?;
        self.blank()?;
        self.open(&format!("{} {{", sig))?;
        if func.effect == FuncEffect::Coroutine {
            self.emit_coroutine_body(func)?;
        } else {
            self.emit_plain_body(func)?;
        }
        self.close("}")?;
        self.cur = None;

        if is_choosy {
            self.emit_choosy_dispatcher(func)?;
        }
        Ok(())
    }

    fn begin_func(&mut self, func: &FuncDef) -> Result<(), CodeGenError> {
        let resolver = self.resolver();
        let locals = collect_locals(&resolver, func)?;
        let mut readers = Vec::new();
        let mut writers = Vec::new();
        let mut args = HashSet::new();
        for arg in &func.args {
            args.insert(arg.name);
            let ty = resolver.resolve_type(&arg.ty)?;
            if ty.is_io_reader() {
                readers.push(arg.name);
            } else if ty.is_io_writer() {
                writers.push(arg.name);
            }
        }
        self.cur = Some(FuncCtx {
            receiver: func.receiver,
            name: func.name,
            coroutine: func.effect == FuncEffect::Coroutine,
            args,
            locals: locals.iter().map(|(n, _)| *n).collect(),
            readers,
            writers,
            iter_vars: HashSet::new(),
        });
        self.susp_point = 0;
        Ok(())
    }

    /// The C signature. `choosy` renames the definition to the
    /// `__choosy_default` implementation behind the dispatcher.
    pub(super) fn c_signature(
        &self,
        func: &FuncDef,
        choosy: bool,
    ) -> Result<String, CodeGenError> {
        let resolver = self.resolver();
        let ret = match func.effect {
            FuncEffect::Coroutine => "sift_base__status".to_string(),
            _ => match &func.ret {
                Some(t) => self.c_type(&resolver.resolve_type(t)?)?,
                None => "void".to_string(),
            },
        };
        let mut name = self.mangle(&self.pkg.clone(), func.receiver, func.name);
        if choosy {
            name.push_str("__choosy_default");
        }
        let mut params = Vec::new();
        if let Some(recv) = func.receiver {
            params.push(format!("{}* self", self.struct_c_name(&self.pkg, recv)));
        }
        for arg in &func.args {
            let ty = resolver.resolve_type(&arg.ty)?;
            params.push(self.c_decl(&ty, &format!("a_{}", self.str_of(arg.name)))?);
        }
        if params.is_empty() {
            params.push("void".to_string());
        }
        let linkage = if func.public && !choosy { "" } else { "static " };
        Ok(format!("{}{} {}({})", linkage, ret, name, params.join(", ")))
    }

    fn emit_choosy_dispatcher(&mut self, func: &FuncDef) -> Result<(), CodeGenError> {
        let resolver = self.resolver();
        let ret = match &func.ret {
            Some(t) => self.c_type(&resolver.resolve_type(t)?)?,
            None => "void".to_string(),
        };
        let recv = func.receiver.ok_or_else(|| {
            CodeGenError::Internal("choosy function without a receiver".into())
        })?;
        let name = self.mangle(&self.pkg.clone(), Some(recv), func.name);
        let mut params = vec![format!("{}* self", self.struct_c_name(&self.pkg, recv))];
        let mut fwd = vec!["self".to_string()];
        for arg in &func.args {
            let ty = resolver.resolve_type(&arg.ty)?;
            let a = format!("a_{}", self.str_of(arg.name));
            params.push(self.c_decl(&ty, &a)?);
            fwd.push(a);
        }
        let linkage = if func.public { "" } else { "static " };
        self.blank()?;
        self.open(&format!(
            "{}{} {}({}) {{",
            linkage,
            ret,
            name,
            params.join(", ")
        ))?;
        let call = format!(
            "(*self->private_impl.choosy_{})({})",
            self.str_of(func.name),
            fwd.join(", ")
        );
        if ret == "void" {
            self.line(&format!("{};", call))?;
        } else {
            self.line(&format!("return {};", call))?;
        }
        self.close("}")?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Bodies
    // ------------------------------------------------------------------

    fn emit_plain_body(&mut self, func: &FuncDef) -> Result<(), CodeGenError> {
        self.emit_stmts(&func.body)?;
        Ok(())
    }

    fn emit_coroutine_body(&mut self, func: &FuncDef) -> Result<(), CodeGenError> {
        let fn_name = self.str_of(func.name).to_string();

        // Receiver contract checks.
        self.open("if (!self) {")?;
        self.line("return sift_base__error__bad_receiver;")?;
        self.close("}")?;
        self.open("if (self->private_impl.magic != SIFT_BASE__MAGIC) {")?;
        self.line("return (self->private_impl.magic == SIFT_BASE__DISABLED)")?;
        self.line("    ? sift_base__error__disabled_by_previous_error")?;
        self.line("    : sift_base__error__initialize_not_called;")?;
        self.close("}")?;
        self.line("sift_base__status status = sift_base__ok;")?;
        self.blank()?;

        // Materialize I/O pointers.
        let (readers, writers) = {
            let ctx = self.cur.as_ref().expect("function context");
            (ctx.readers.clone(), ctx.writers.clone())
        };
        for r in &readers {
            let a = format!("a_{}", self.str_of(*r));
            self.line(&format!("const uint8_t* iop_{} = NULL;", a))?;
            self.line(&format!("const uint8_t* io0_{} = NULL;", a))?;
            self.line(&format!("const uint8_t* io1_{} = NULL;", a))?;
            self.line(&format!("const uint8_t* io2_{} = NULL;", a))?;
            self.open(&format!("if ({}) {{", a))?;
            self.line(&format!("io0_{} = {}->data.ptr;", a, a))?;
            self.line(&format!("iop_{} = io0_{} + {}->meta.ri;", a, a, a))?;
            self.line(&format!(
                "io1_{} = io0_{} + self->private_data.s_{}.m_{};",
                a, a, fn_name, a
            ))?;
            self.line(&format!("io2_{} = io0_{} + {}->meta.wi;", a, a, a))?;
            self.close("}")?;
            self.line(&format!("(void)(io0_{});", a))?;
            self.line(&format!("(void)(io1_{});", a))?;
        }
        for w in &writers {
            let a = format!("a_{}", self.str_of(*w));
            self.line(&format!("uint8_t* iop_{} = NULL;", a))?;
            self.line(&format!("uint8_t* io0_{} = NULL;", a))?;
            self.line(&format!("uint8_t* io1_{} = NULL;", a))?;
            self.line(&format!("uint8_t* io2_{} = NULL;", a))?;
            self.open(&format!("if ({}) {{", a))?;
            self.line(&format!("io0_{} = {}->data.ptr;", a, a))?;
            self.line(&format!("iop_{} = io0_{} + {}->meta.wi;", a, a, a))?;
            self.line(&format!(
                "io1_{} = io0_{} + self->private_data.s_{}.m_{};",
                a, a, fn_name, a
            ))?;
            self.line(&format!("io2_{} = io0_{} + {}->data.len;", a, a, a))?;
            self.close("}")?;
            self.line(&format!("(void)(io0_{});", a))?;
            self.line(&format!("(void)(io1_{});", a))?;
        }
        self.blank()?;

        self.line(&format!(
            "uint32_t coro_susp_point = self->private_impl.p_{};",
            fn_name
        ))?;
        self.open("switch (coro_susp_point) {")?;
        self.line("SIFT_BASE__COROUTINE_SUSPENSION_POINT_0;")?;
        self.blank()?;

        self.emit_stmts(&func.body)?;

        self.blank()?;
        self.line("goto ok;")?;
        self.line("ok:")?;
        self.line(&format!("self->private_impl.p_{} = 0;", fn_name))?;
        self.line("goto exit;")?;
        self.close("}")?;
        self.blank()?;
        self.line("goto suspend;")?;
        self.line("suspend:")?;
        self.line(&format!(
            "self->private_impl.p_{} = coro_susp_point;",
            fn_name
        ))?;
        self.line("self->private_impl.active_coroutine = 1;")?;
        self.line("goto exit;")?;
        self.blank()?;
        self.line("exit:")?;
        // Write the I/O positions back; they become visible to the caller
        // exactly at this return.
        for r in &readers {
            let a = format!("a_{}", self.str_of(*r));
            self.open(&format!("if ({}) {{", a))?;
            self.line(&format!(
                "{}->meta.ri = ((uint64_t)(iop_{} - {}->data.ptr));",
                a, a, a
            ))?;
            self.close("}")?;
        }
        for w in &writers {
            let a = format!("a_{}", self.str_of(*w));
            self.open(&format!("if ({}) {{", a))?;
            self.line(&format!(
                "{}->meta.wi = ((uint64_t)(iop_{} - {}->data.ptr));",
                a, a, a
            ))?;
            self.close("}")?;
        }
        self.open("if (sift_base__status__is_error(status)) {")?;
        self.line("self->private_impl.magic = SIFT_BASE__DISABLED;")?;
        self.close("}")?;
        self.line("return status;")?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn emit_stmts(&mut self, stmts: &[Stmt]) -> Result<(), CodeGenError> {
        for stmt in stmts {
            self.emit_stmt(stmt)?;
        }
        Ok(())
    }

    fn emit_stmt(&mut self, stmt: &Stmt) -> Result<(), CodeGenError> {
        match stmt {
            Stmt::Var { name, ty, init, .. } => self.emit_var(*name, ty, init.as_ref()),
            Stmt::Assign { op, lhs, rhs, .. } => self.emit_assign(*op, lhs, rhs),
            // Assertions are proof artifacts; nothing remains at runtime.
            Stmt::Assert(_) => Ok(()),
            Stmt::If(i) => self.emit_if(i),
            Stmt::While(w) => self.emit_while(w),
            Stmt::Break { label, .. } => match label {
                Some(l) => self.line(&format!("goto label__{}__break;", self.str_of(*l))),
                None => self.line("break;"),
            },
            Stmt::Continue { label, .. } => match label {
                Some(l) => {
                    self.line(&format!("goto label__{}__continue;", self.str_of(*l)))
                }
                None => self.line("continue;"),
            },
            Stmt::Return { value, .. } => self.emit_return(value.as_ref()),
            Stmt::Yield { status, .. } => self.emit_yield(status),
            Stmt::Iterate(it) => self.emit_iterate(it),
            Stmt::Choose(c) => self.emit_choose(c),
            Stmt::CallStmt { call, .. } => self.emit_call_stmt(call),
        }
    }

    fn emit_var(
        &mut self,
        name: Id,
        ty: &crate::ast::TypeExpr,
        init: Option<&Expr>,
    ) -> Result<(), CodeGenError> {
        let resolver = self.resolver();
        let mtype = resolver.resolve_type(ty)?;
        let coroutine = self.cur.as_ref().is_some_and(|c| c.coroutine);

        if let Some(init) = init {
            if is_coroutine_call(init) {
                // Declare (or re-zero) first, then run the suspendable read.
                if !coroutine {
                    return Err(CodeGenError::Internal(
                        "suspension point outside a coroutine".into(),
                    ));
                }
                let target = self.local_ref(name)?;
                self.emit_coro_call(Some(&target), init)?;
                return Ok(());
            }
        }
        if coroutine {
            let target = self.local_ref(name)?;
            match init {
                Some(init) => {
                    let value = self.emit_expr(init)?;
                    self.line(&format!("{} = {};", target, value))?;
                }
                None => match mtype {
                    MType::Array { .. }
                    | MType::Slice(_)
                    | MType::Table(_)
                    | MType::Struct(_) => {
                        self.line(&format!(
                            "memset(&{}, 0, sizeof({}));",
                            target, target
                        ))?;
                    }
                    _ => {
                        self.line(&format!("{} = {};", target, zero_of(&mtype)))?;
                    }
                },
            }
            Ok(())
        } else {
            let decl = self.c_decl(&mtype, &format!("v_{}", self.str_of(name)))?;
            match init {
                Some(init) => {
                    let value = self.emit_expr(init)?;
                    self.line(&format!("{} = {};", decl, value))
                }
                None => match mtype {
                    MType::Array { .. } => self.line(&format!("{} = {{0}};", decl)),
                    _ => self.line(&format!("{} = {};", decl, zero_of(&mtype))),
                },
            }
        }
    }

    fn local_ref(&self, name: Id) -> Result<String, CodeGenError> {
        let ctx = self
            .cur
            .as_ref()
            .ok_or_else(|| CodeGenError::Internal("local outside a function".into()))?;
        if ctx.coroutine {
            Ok(format!(
                "self->private_data.s_{}.v_{}",
                self.str_of(ctx.name),
                self.str_of(name)
            ))
        } else {
            Ok(format!("v_{}", self.str_of(name)))
        }
    }

    fn emit_assign(&mut self, op: Id, lhs: &Expr, rhs: &Expr) -> Result<(), CodeGenError> {
        if op.is(Bid::Eq) && is_coroutine_call(rhs) {
            let target = self.emit_expr(lhs)?;
            return self.emit_coro_call(Some(&target), rhs);
        }
        let l = self.emit_expr(lhs)?;
        let r = self.emit_expr(rhs)?;
        let base = lhs.mtype.as_ref().and_then(|t| t.num_base());
        let bid = bid_of(op)
            .ok_or_else(|| CodeGenError::Internal("bad assignment operator".into()))?;
        let text = match bid {
            Bid::Eq => format!("{} = {};", l, r),
            Bid::TildeSatPlusEq | Bid::TildeSatMinusEq => {
                let base = base.ok_or_else(|| {
                    CodeGenError::Internal("tilde assignment on non-numeric".into())
                })?;
                let helper = if bid == Bid::TildeSatPlusEq {
                    "sat_add"
                } else {
                    "sat_sub"
                };
                format!(
                    "{} = sift_base__{}__{}({}, {});",
                    l,
                    base.name(),
                    helper,
                    l,
                    r
                )
            }
            Bid::TildeModPlusEq | Bid::TildeModMinusEq => {
                let base = base.ok_or_else(|| {
                    CodeGenError::Internal("tilde assignment on non-numeric".into())
                })?;
                let op = if bid == Bid::TildeModPlusEq { "+" } else { "-" };
                format!("{} = (({})({} {} {}));", l, base.c_name(), l, op, r)
            }
            _ => {
                let base = base.ok_or_else(|| {
                    CodeGenError::Internal("compound assignment on non-numeric".into())
                })?;
                let c = match bid {
                    Bid::PlusEq => "+",
                    Bid::MinusEq => "-",
                    Bid::StarEq => "*",
                    Bid::SlashEq => "/",
                    Bid::PercentEq => "%",
                    Bid::AmpEq => "&",
                    Bid::PipeEq => "|",
                    Bid::CaretEq => "^",
                    Bid::ShlEq => "<<",
                    Bid::ShrEq => ">>",
                    _ => {
                        return Err(CodeGenError::Internal(
                            "unhandled assignment operator".into(),
                        ));
                    }
                };
                format!("{} = (({})({} {} {}));", l, base.c_name(), l, c, r)
            }
        };
        self.line(&text)
    }

    fn emit_if(&mut self, i: &IfStmt) -> Result<(), CodeGenError> {
        let cond = self.emit_expr(&i.cond)?;
        self.open(&format!("if ({}) {{", cond))?;
        self.emit_stmts(&i.then_block)?;
        match &i.else_branch {
            None => self.close("}"),
            Some(ElseBranch::Block(b)) => {
                self.close("} else {")?;
                self.indent += 1;
                self.emit_stmts(b)?;
                self.close("}")
            }
            Some(ElseBranch::If(nested)) => {
                self.close("} else {")?;
                self.indent += 1;
                self.emit_if(nested)?;
                self.close("}")
            }
        }
    }

    fn emit_while(&mut self, w: &WhileStmt) -> Result<(), CodeGenError> {
        if let Some(l) = w.label {
            self.line(&format!("label__{}__continue:;", self.str_of(l)))?;
        }
        let cond = self.emit_expr(&w.cond)?;
        self.open(&format!("while ({}) {{", cond))?;
        self.emit_stmts(&w.body)?;
        self.close("}")?;
        if let Some(l) = w.label {
            self.line(&format!("label__{}__break:;", self.str_of(l)))?;
        }
        Ok(())
    }

    fn emit_return(&mut self, value: Option<&Expr>) -> Result<(), CodeGenError> {
        let coroutine = self.cur.as_ref().is_some_and(|c| c.coroutine);
        if !coroutine {
            return match value {
                Some(v) => {
                    let text = self.emit_expr(v)?;
                    self.line(&format!("return {};", text))
                }
                None => self.line("return;"),
            };
        }
        match value {
            None => {
                self.line("status = sift_base__ok;")?;
                self.line("goto ok;")
            }
            Some(v) => {
                let text = self.emit_expr(v)?;
                self.line(&format!("status = {};", text))?;
                let is_error = matches!(
                    &v.kind,
                    ExprKind::StatusLit(msg)
                        if StatusKind::from_message(msg) == Some(StatusKind::Error)
                );
                if is_error {
                    self.line("goto exit;")
                } else {
                    // Notes and other statuses end the coroutine normally.
                    self.line("goto ok;")
                }
            }
        }
    }

    fn emit_yield(&mut self, status: &Expr) -> Result<(), CodeGenError> {
        let sym = self.emit_expr(status)?;
        self.susp_point += 1;
        let n = self.susp_point;
        self.line(&format!("status = {};", sym))?;
        self.line(&format!("coro_susp_point = {};", n))?;
        self.line("goto suspend;")?;
        self.line(&format!("case {}:;", n))?;
        self.line("status = sift_base__ok;")?;
        Ok(())
    }

    fn emit_call_stmt(&mut self, call: &Expr) -> Result<(), CodeGenError> {
        if is_coroutine_call(call) {
            return self.emit_coro_call(None, call);
        }
        // mark!() manipulates the materialized pointers directly.
        if let ExprKind::Call { recv, name, .. } = &call.kind {
            if name.is(Bid::Mark) {
                let r = recv.as_deref().ok_or_else(|| {
                    CodeGenError::Internal("mark without a receiver".into())
                })?;
                let a = self.io_locals(r).ok_or_else(|| {
                    CodeGenError::Internal(
                        "mark outside a coroutine with materialized I/O".into(),
                    )
                })?;
                let fn_name = self
                    .cur
                    .as_ref()
                    .map(|c| self.str_of(c.name).to_string())
                    .unwrap_or_default();
                self.line(&format!("io1_{} = iop_{};", a, a))?;
                self.line(&format!(
                    "self->private_data.s_{}.m_{} = ((uint64_t)(iop_{} - io0_{}));",
                    fn_name, a, a, a
                ))?;
                return Ok(());
            }
        }
        let text = self.emit_expr(call)?;
        self.line(&format!("{};", text))
    }

    /// Lower a coroutine call: built-in reads/writes inline against the
    /// materialized pointers; user coroutines get a save/call/restore
    /// sequence. Every site is a suspension point with its own number.
    fn emit_coro_call(
        &mut self,
        target: Option<&str>,
        call: &Expr,
    ) -> Result<(), CodeGenError> {
        let ExprKind::Call {
            recv, name, args, ..
        } = &call.kind
        else {
            return Err(CodeGenError::Internal("emit_coro_call on non-call".into()));
        };
        self.susp_point += 1;
        let n = self.susp_point;

        // Built-in I/O coroutines.
        if let Some(r) = recv.as_deref() {
            if let Some(a) = self.io_locals(r) {
                match bid_of(*name) {
                    Some(Bid::ReadU8) => {
                        self.line(&format!(
                            "SIFT_BASE__COROUTINE_SUSPENSION_POINT({});",
                            n
                        ))?;
                        self.open(&format!("if (iop_{} == io2_{}) {{", a, a))?;
                        self.line("status = sift_base__suspension__short_read;")?;
                        self.line("goto suspend;")?;
                        self.close("}")?;
                        match target {
                            Some(t) => self.line(&format!("{} = *iop_{}++;", t, a))?,
                            None => self.line(&format!("iop_{}++;", a))?,
                        }
                        return Ok(());
                    }
                    Some(Bid::Skip) => {
                        let count = self.emit_expr(&args[0].value)?;
                        self.line(&format!(
                            "SIFT_BASE__COROUTINE_SUSPENSION_POINT({});",
                            n
                        ))?;
                        self.open(&format!(
                            "if (((uint64_t)(io2_{} - iop_{})) < ((uint64_t)({}))) {{",
                            a, a, count
                        ))?;
                        self.line("status = sift_base__suspension__short_read;")?;
                        self.line("goto suspend;")?;
                        self.close("}")?;
                        self.line(&format!("iop_{} += {};", a, count))?;
                        return Ok(());
                    }
                    Some(Bid::WriteU8) => {
                        let value = self.emit_expr(&args[0].value)?;
                        self.line(&format!(
                            "SIFT_BASE__COROUTINE_SUSPENSION_POINT({});",
                            n
                        ))?;
                        self.open(&format!("if (iop_{} == io2_{}) {{", a, a))?;
                        self.line("status = sift_base__suspension__short_write;")?;
                        self.line("goto suspend;")?;
                        self.close("}")?;
                        self.line(&format!("*iop_{}++ = {};", a, value))?;
                        return Ok(());
                    }
                    _ => {}
                }
            }
        }

        // User coroutine: save I/O positions, call, restore, dispatch on the
        // returned status.
        if target.is_some() {
            return Err(CodeGenError::Internal(
                "user coroutines have no value results".into(),
            ));
        }
        let (readers, writers) = {
            let ctx = self.cur.as_ref().expect("function context");
            (ctx.readers.clone(), ctx.writers.clone())
        };
        self.line(&format!("SIFT_BASE__COROUTINE_SUSPENSION_POINT({});", n))?;
        for r in &readers {
            let a = format!("a_{}", self.str_of(*r));
            self.open(&format!("if ({}) {{", a))?;
            self.line(&format!(
                "{}->meta.ri = ((uint64_t)(iop_{} - {}->data.ptr));",
                a, a, a
            ))?;
            self.close("}")?;
        }
        for w in &writers {
            let a = format!("a_{}", self.str_of(*w));
            self.open(&format!("if ({}) {{", a))?;
            self.line(&format!(
                "{}->meta.wi = ((uint64_t)(iop_{} - {}->data.ptr));",
                a, a, a
            ))?;
            self.close("}")?;
        }
        let text = self.emit_expr(call)?;
        self.line(&format!("status = {};", text))?;
        for r in &readers {
            let a = format!("a_{}", self.str_of(*r));
            self.open(&format!("if ({}) {{", a))?;
            self.line(&format!("iop_{} = {}->data.ptr + {}->meta.ri;", a, a, a))?;
            self.line(&format!("io2_{} = {}->data.ptr + {}->meta.wi;", a, a, a))?;
            self.close("}")?;
        }
        for w in &writers {
            let a = format!("a_{}", self.str_of(*w));
            self.open(&format!("if ({}) {{", a))?;
            self.line(&format!("iop_{} = {}->data.ptr + {}->meta.wi;", a, a, a))?;
            self.close("}")?;
        }
        self.open("if (status) {")?;
        self.open("if (sift_base__status__is_suspension(status)) {")?;
        self.line("goto suspend;")?;
        self.close("}")?;
        self.line("goto exit;")?;
        self.close("}")?;
        Ok(())
    }

    fn emit_iterate(&mut self, it: &IterateStmt) -> Result<(), CodeGenError> {
        self.open("{")?;
        // Snapshot the bound slices and set up cursor pointers.
        let mut vars = Vec::new();
        for (name, slice) in &it.vars {
            let elem = slice
                .mtype
                .as_ref()
                .and_then(|t| t.elem())
                .and_then(|t| t.num_base())
                .ok_or_else(|| {
                    CodeGenError::Internal("iterate over a non-numeric slice".into())
                })?;
            let slice_ty = format!("sift_base__slice_{}", elem.name());
            let n = self.str_of(*name).to_string();
            let src = self.emit_expr(slice)?;
            self.line(&format!("{} i_{}__src = {};", slice_ty, n, src))?;
            self.line(&format!(
                "{}* p_{} = i_{}__src.ptr;",
                elem.c_name(),
                n,
                n
            ))?;
            self.line(&format!(
                "{}* q_{} = i_{}__src.ptr + i_{}__src.len;",
                elem.c_name(),
                n,
                n,
                n
            ))?;
            self.line(&format!("{} i_{} = {{0}};", slice_ty, n))?;
            vars.push(n);
        }
        {
            let ctx = self
                .cur
                .as_mut()
                .ok_or_else(|| CodeGenError::Internal("iterate outside a function".into()))?;
            for (name, _) in &it.vars {
                ctx.iter_vars.insert(*name);
            }
        }

        for part in &it.parts {
            // One trip consumes advance per unrolled copy and needs length
            // elements visible for the last copy.
            let need = part.advance * (part.unroll - 1) + part.length;
            let cond: Vec<String> = vars
                .iter()
                .map(|n| format!("(((uint64_t)(q_{} - p_{})) >= {})", n, n, need))
                .collect();
            self.open(&format!("while ({}) {{", cond.join(" && ")))?;
            for _ in 0..part.unroll {
                for n in &vars {
                    self.line(&format!("i_{}.ptr = p_{};", n, n))?;
                    self.line(&format!("i_{}.len = {};", n, part.length))?;
                }
                self.emit_stmts(&part.body)?;
                for n in &vars {
                    self.line(&format!("p_{} += {};", n, part.advance))?;
                }
            }
            self.close("}")?;
        }
        {
            let ctx = self
                .cur
                .as_mut()
                .ok_or_else(|| CodeGenError::Internal("iterate outside a function".into()))?;
            for (name, _) in &it.vars {
                ctx.iter_vars.remove(name);
            }
        }
        self.close("}")?;
        Ok(())
    }

    /// `choose` assigns the method's function pointer. Candidates whose
    /// names carry a recognized CPU-arch suffix are guarded by the matching
    /// compile-time feature test; others assign unconditionally.
    fn emit_choose(&mut self, c: &ChooseStmt) -> Result<(), CodeGenError> {
        let recv = self
            .cur
            .as_ref()
            .and_then(|ctx| ctx.receiver)
            .ok_or_else(|| CodeGenError::Internal("choose outside a method".into()))?;
        for cand in &c.candidates {
            let symbol = self.mangle(&self.pkg.clone(), Some(recv), *cand);
            let assign = format!(
                "self->private_impl.choosy_{} = &{};",
                self.str_of(c.field),
                symbol
            );
            match arch_guard(self.str_of(*cand)) {
                Some(guard) => {
                    self.raw(&format!("#if defined({})\n", guard))?;
                    self.line(&assign)?;
                    self.raw("#endif\n")?;
                }
                None => self.line(&assign)?,
            }
        }
        Ok(())
    }
}

/// True when the expression is a call with coroutine effect.
pub(super) fn is_coroutine_call(e: &Expr) -> bool {
    matches!(
        &e.kind,
        ExprKind::Call {
            effect: FuncEffect::Coroutine,
            ..
        }
    )
}

/// The compile-time feature macro for a recognized candidate name suffix.
fn arch_guard(name: &str) -> Option<&'static str> {
    if name.ends_with("_x86_sse42") {
        Some("__SSE4_2__")
    } else if name.ends_with("_x86_avx2") {
        Some("__AVX2__")
    } else if name.ends_with("_arm_neon") {
        Some("__ARM_NEON")
    } else if name.ends_with("_arm_crc32") {
        Some("__ARM_FEATURE_CRC32")
    } else {
        None
    }
}

fn zero_of(ty: &MType) -> &'static str {
    match ty {
        MType::Bool => "false",
        MType::Status => "sift_base__ok",
        MType::Slice(_) | MType::Table(_) | MType::Struct(_) | MType::Array { .. } => "{0}",
        _ => "0",
    }
}
