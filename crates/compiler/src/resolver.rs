//! Name resolution and expression typing
//!
//! Walks the AST top-down, resolving identifiers to declarations and
//! computing an [`MType`] on every expression (setting the node's "typed"
//! state). Constructor-specific typing rules live here; proof obligations
//! (bounds, overflow, refinement fit) are recorded as types and intervals
//! and discharged later by the checker.

use crate::ast::{
    Arg, ConstValue, ElseBranch, Expr, ExprKind, FuncDef, FuncEffect, IfStmt, Module, Stmt,
    StructDef, TypeExpr, TypeExprKind,
};
use crate::builtins::method_signature;
use crate::interval::Interval;
use crate::token::{bid_of, Bid, Id, IdMap, QQId};
use crate::types::{MType, NumBase};
use std::collections::HashMap;

/// Resolved struct declaration.
#[derive(Debug, Clone)]
pub struct StructInfo {
    pub name: Id,
    pub public: bool,
    pub suspendible: bool,
    pub fields: Vec<(Id, MType)>,
    pub package: Id,
}

impl StructInfo {
    pub fn field_type(&self, name: Id) -> Option<&MType> {
        self.fields.iter().find(|(n, _)| *n == name).map(|(_, t)| t)
    }
}

/// Resolved function signature.
#[derive(Debug, Clone)]
pub struct FuncSig {
    pub receiver: Option<Id>,
    pub name: Id,
    pub public: bool,
    pub effect: FuncEffect,
    pub args: Vec<(Id, MType)>,
    pub ret: Option<MType>,
    /// Precondition expressions over the argument names (structural form;
    /// the checker substitutes actual arguments before discharging).
    pub pre: Vec<Expr>,
    pub post: Vec<Expr>,
    pub package: Id,
}

#[derive(Debug, Clone)]
pub struct ConstInfo {
    pub ty: MType,
    pub value: ConstValue,
}

/// The resolved top-level environment of a package, plus its dependencies.
#[derive(Debug, Clone, Default)]
pub struct Globals {
    pub package: Id,
    pub structs: HashMap<Id, StructInfo>,
    pub funcs: Vec<FuncSig>,
    pub consts: HashMap<Id, ConstInfo>,
    /// Status messages in declaration order (order matters for emission).
    pub statuses: Vec<(bool, String)>,
    /// Used packages, by package name id.
    pub deps: HashMap<Id, Globals>,
}

impl Globals {
    pub fn find_func(&self, receiver: Option<Id>, name: Id) -> Option<&FuncSig> {
        self.funcs
            .iter()
            .find(|f| f.receiver == receiver && f.name == name)
    }

    /// Collect declarations from the package's modules. Constants resolve
    /// first (in declaration order), then structs, then function signatures.
    pub fn collect(
        modules: &[Module],
        idmap: &IdMap,
        package: Id,
        deps: HashMap<Id, Globals>,
    ) -> Result<Globals, String> {
        let mut globals = Globals {
            package,
            deps,
            ..Globals::default()
        };
        for module in modules {
            for c in &module.consts {
                let (ty, value) = {
                    let r = Resolver {
                        idmap,
                        globals: &globals,
                    };
                    (r.resolve_type(&c.ty)?, r.fold_const_value(&c.value)?)
                };
                if let (Some(env), ConstValue::Int(v)) = (ty.envelope(), value) {
                    if !env.contains(v) {
                        return Err(format!(
                            "{}: type: constant value {} outside declared type",
                            c.span, v
                        ));
                    }
                }
                if globals.consts.insert(c.name, ConstInfo { ty, value }).is_some() {
                    return Err(format!(
                        "{}: type: duplicate constant '{}'",
                        c.span,
                        idmap.str(c.name)
                    ));
                }
            }
        }
        for module in modules {
            for s in &module.structs {
                let info = {
                    let r = Resolver {
                        idmap,
                        globals: &globals,
                    };
                    r.resolve_struct(s, package)?
                };
                if globals.structs.insert(s.name, info).is_some() {
                    return Err(format!(
                        "{}: type: duplicate struct '{}'",
                        s.span,
                        idmap.str(s.name)
                    ));
                }
            }
            for st in &module.statuses {
                globals.statuses.push((st.public, st.message.clone()));
            }
        }
        for module in modules {
            for f in &module.funcs {
                let sig = {
                    let r = Resolver {
                        idmap,
                        globals: &globals,
                    };
                    r.resolve_signature(f, package)?
                };
                if globals
                    .funcs
                    .iter()
                    .any(|g| g.receiver == sig.receiver && g.name == sig.name)
                {
                    return Err(format!(
                        "{}: type: duplicate function '{}'",
                        f.span,
                        idmap.str(f.name)
                    ));
                }
                globals.funcs.push(sig);
            }
        }
        Ok(globals)
    }
}

/// What kind of binding a scope entry is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VarKind {
    Arg,
    Local,
    /// Iterate binding; assignable through subscripts but not rebindable.
    IterVar,
}

struct Scope {
    vars: HashMap<Id, (MType, VarKind)>,
}

impl Scope {
    fn child(&self) -> Scope {
        Scope {
            vars: self.vars.clone(),
        }
    }
}

struct FuncCtx {
    effect: FuncEffect,
    receiver: Option<MType>,
    ret: Option<MType>,
    loop_labels: Vec<Option<Id>>,
    /// Every name declared anywhere in the function. Locals are
    /// function-scoped (coroutine locals become receiver-struct slots), so
    /// sibling-scope reuse is rejected.
    declared: std::collections::HashSet<Id>,
}

pub struct Resolver<'a> {
    pub idmap: &'a IdMap,
    pub globals: &'a Globals,
}

impl<'a> Resolver<'a> {
    pub fn new(idmap: &'a IdMap, globals: &'a Globals) -> Self {
        Resolver { idmap, globals }
    }

    /// Resolve every function body in the module. Returns one diagnostic per
    /// failing function; later functions are still resolved.
    pub fn resolve_module(&self, module: &mut Module) -> Vec<String> {
        let mut errors = Vec::new();
        for func in &mut module.funcs {
            if let Err(e) = self.resolve_func(func) {
                errors.push(e);
            }
        }
        errors
    }

    pub fn resolve_func(&self, func: &mut FuncDef) -> Result<(), String> {
        let mut scope = Scope {
            vars: HashMap::new(),
        };
        let receiver = match func.receiver {
            Some(name) => {
                let info = self.globals.structs.get(&name).ok_or_else(|| {
                    format!(
                        "{}: type: unknown receiver struct '{}'",
                        func.span,
                        self.idmap.str(name)
                    )
                })?;
                Some(MType::Struct(QQId::new(
                    info.package,
                    Bid::Base.into(),
                    name,
                )))
            }
            None => None,
        };
        for arg in &func.args {
            let ty = self.resolve_type(&arg.ty)?;
            if scope.vars.insert(arg.name, (ty, VarKind::Arg)).is_some() {
                return Err(format!(
                    "{}: type: duplicate argument '{}'",
                    arg.span,
                    self.idmap.str(arg.name)
                ));
            }
        }
        let ret = match &func.ret {
            Some(t) => {
                if func.effect == FuncEffect::Coroutine {
                    return Err(format!(
                        "{}: type: coroutine functions return a status and cannot \
                         declare a value type",
                        func.span
                    ));
                }
                Some(self.resolve_type(t)?)
            }
            None => None,
        };
        let mut ctx = FuncCtx {
            effect: func.effect,
            receiver,
            ret,
            loop_labels: Vec::new(),
            declared: scope.vars.keys().copied().collect(),
        };
        for cond in func.pre.iter_mut().chain(func.post.iter_mut()) {
            self.resolve_expr(cond, &scope, &ctx, false)?;
            self.require_bool_fact(cond, "pre/post condition")?;
        }
        self.resolve_block(&mut func.body, &mut scope, &mut ctx)?;
        Ok(())
    }

    fn resolve_block(
        &self,
        stmts: &mut [Stmt],
        scope: &mut Scope,
        ctx: &mut FuncCtx,
    ) -> Result<(), String> {
        for stmt in stmts {
            self.resolve_stmt(stmt, scope, ctx)?;
        }
        Ok(())
    }

    fn resolve_stmt(
        &self,
        stmt: &mut Stmt,
        scope: &mut Scope,
        ctx: &mut FuncCtx,
    ) -> Result<(), String> {
        match stmt {
            Stmt::Var {
                name,
                ty,
                init,
                span,
            } => {
                let mtype = self.resolve_type(ty)?;
                if mtype.is_io_reader() || mtype.is_io_writer() {
                    return Err(format!(
                        "{}: type: io buffers are only passed as arguments",
                        span
                    ));
                }
                if let Some(init) = init {
                    self.resolve_expr(init, scope, ctx, true)?;
                    self.check_base_assignable(&mtype, init, *span)?;
                }
                if !ctx.declared.insert(*name) {
                    return Err(format!(
                        "{}: type: duplicate variable '{}' (locals are \
                         function-scoped)",
                        span,
                        self.idmap.str(*name)
                    ));
                }
                scope.vars.insert(*name, (mtype, VarKind::Local));
                Ok(())
            }
            Stmt::Assign { op, lhs, rhs, span } => {
                self.resolve_expr(lhs, scope, ctx, false)?;
                self.check_lvalue(lhs, scope, *span)?;
                self.resolve_expr(rhs, scope, ctx, op.is(Bid::Eq))?;
                let lt = expr_type(lhs)?;
                if op.is(Bid::Eq) {
                    self.check_base_assignable(lt, rhs, *span)?;
                } else {
                    // Compound assignment: both sides numeric.
                    if !lt.is_numeric() || !expr_type(rhs)?.is_numeric() {
                        return Err(format!(
                            "{}: type: compound assignment needs numeric operands",
                            span
                        ));
                    }
                }
                Ok(())
            }
            Stmt::Assert(a) => {
                self.resolve_expr(&mut a.cond, scope, ctx, false)?;
                self.require_bool_fact(&a.cond, "assertion")?;
                if let Some(via) = &mut a.via {
                    for arg in &mut via.args {
                        self.resolve_expr(&mut arg.value, scope, ctx, false)?;
                    }
                }
                Ok(())
            }
            Stmt::If(if_stmt) => self.resolve_if(if_stmt, scope, ctx),
            Stmt::While(w) => {
                self.resolve_expr(&mut w.cond, scope, ctx, false)?;
                if expr_type(&w.cond)? != &MType::Bool {
                    return Err(format!("{}: type: loop condition must be bool", w.span));
                }
                for a in &mut w.asserts {
                    self.resolve_expr(&mut a.cond, scope, ctx, false)?;
                    self.require_bool_fact(&a.cond, "loop annotation")?;
                }
                ctx.loop_labels.push(w.label);
                let mut inner = scope.child();
                let result = self.resolve_block(&mut w.body, &mut inner, ctx);
                ctx.loop_labels.pop();
                result
            }
            Stmt::Break { label, span } | Stmt::Continue { label, span } => {
                if ctx.loop_labels.is_empty() {
                    return Err(format!("{}: type: 'break'/'continue' outside a loop", span));
                }
                if let Some(l) = label {
                    let l = *l;
                    if !ctx.loop_labels.iter().any(|x| *x == Some(l)) {
                        return Err(format!(
                            "{}: type: unknown loop label '{}'",
                            span,
                            self.idmap.str(l)
                        ));
                    }
                }
                Ok(())
            }
            Stmt::Return { value, span } => match (&ctx.ret, value) {
                (Some(ret), Some(v)) => {
                    self.resolve_expr(v, scope, ctx, false)?;
                    let rt = ret.clone();
                    self.check_base_assignable(&rt, v, *span)
                }
                (Some(_), None) => Err(format!("{}: type: missing return value", span)),
                (None, Some(v)) => {
                    self.resolve_expr(v, scope, ctx, false)?;
                    if expr_type(v)? == &MType::Status {
                        if ctx.effect != FuncEffect::Coroutine {
                            return Err(format!(
                                "{}: type: only coroutines return statuses",
                                span
                            ));
                        }
                        Ok(())
                    } else {
                        Err(format!(
                            "{}: type: function declares no return value",
                            span
                        ))
                    }
                }
                (None, None) => Ok(()),
            },
            Stmt::Yield { status, span } => {
                if ctx.effect != FuncEffect::Coroutine {
                    return Err(format!(
                        "{}: effect: 'yield' is only legal in a coroutine",
                        span
                    ));
                }
                self.resolve_expr(status, scope, ctx, false)?;
                if expr_type(status)? != &MType::Status {
                    return Err(format!("{}: type: 'yield' needs a status", span));
                }
                Ok(())
            }
            Stmt::Iterate(it) => {
                let mut inner = scope.child();
                for (name, slice) in &mut it.vars {
                    self.resolve_expr(slice, scope, ctx, false)?;
                    let st = expr_type(slice)?.clone();
                    if !matches!(st, MType::Slice(_)) {
                        return Err(format!(
                            "{}: type: iterate variables must bind slices",
                            it.span
                        ));
                    }
                    if !ctx.declared.insert(*name) {
                        return Err(format!(
                            "{}: type: duplicate variable '{}' (locals are \
                             function-scoped)",
                            it.span,
                            self.idmap.str(*name)
                        ));
                    }
                    inner.vars.insert(*name, (st, VarKind::IterVar));
                }
                for part in &mut it.parts {
                    let mut part_scope = inner.child();
                    self.resolve_block(&mut part.body, &mut part_scope, ctx)?;
                }
                Ok(())
            }
            Stmt::Choose(c) => {
                if ctx.receiver.is_none() {
                    return Err(format!(
                        "{}: type: 'choose' is only legal inside a method",
                        c.span
                    ));
                }
                Ok(())
            }
            Stmt::CallStmt { call, span } => {
                self.resolve_expr(call, scope, ctx, true)?;
                if !matches!(call.kind, ExprKind::Call { .. }) {
                    return Err(format!("{}: type: expected a call statement", span));
                }
                Ok(())
            }
        }
    }

    fn resolve_if(
        &self,
        if_stmt: &mut IfStmt,
        scope: &mut Scope,
        ctx: &mut FuncCtx,
    ) -> Result<(), String> {
        self.resolve_expr(&mut if_stmt.cond, scope, ctx, false)?;
        if expr_type(&if_stmt.cond)? != &MType::Bool {
            return Err(format!("{}: type: 'if' condition must be bool", if_stmt.span));
        }
        let mut then_scope = scope.child();
        self.resolve_block(&mut if_stmt.then_block, &mut then_scope, ctx)?;
        match &mut if_stmt.else_branch {
            Some(ElseBranch::If(nested)) => self.resolve_if(nested, scope, ctx),
            Some(ElseBranch::Block(block)) => {
                let mut else_scope = scope.child();
                self.resolve_block(block, &mut else_scope, ctx)
            }
            None => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// Resolve an expression. `allow_coro` is true only in statement
    /// positions where a coroutine call may appear (its suspension needs a
    /// statement boundary to lower to).
    fn resolve_expr(
        &self,
        e: &mut Expr,
        scope: &Scope,
        ctx: &FuncCtx,
        allow_coro: bool,
    ) -> Result<(), String> {
        match &mut e.kind {
            ExprKind::IntLit(v) => {
                let v = *v;
                let base = smallest_base(v).ok_or_else(|| {
                    format!("{}: type: integer literal out of range", e.span)
                })?;
                e.mtype = Some(MType::refined(base, Interval::point(v)));
                e.cval = Some(ConstValue::Int(v));
            }
            ExprKind::BoolLit(v) => {
                e.cval = Some(ConstValue::Bool(*v));
                e.mtype = Some(MType::Bool);
            }
            ExprKind::StatusLit(_) => {
                e.mtype = Some(MType::Status);
            }
            ExprKind::Ident(id) => {
                let id = *id;
                if id.is(Bid::This) {
                    let recv = ctx.receiver.clone().ok_or_else(|| {
                        format!("{}: type: 'this' outside a method", e.span)
                    })?;
                    e.mtype = Some(recv);
                } else if let Some((ty, _)) = scope.vars.get(&id) {
                    e.mtype = Some(ty.clone());
                } else if let Some(c) = self.globals.consts.get(&id) {
                    e.mtype = Some(c.ty.clone());
                    e.cval = Some(c.value);
                } else {
                    return Err(format!(
                        "{}: type: undefined name '{}'",
                        e.span,
                        self.idmap.str(id)
                    ));
                }
            }
            ExprKind::Field { obj, field } => {
                self.resolve_expr(obj, scope, ctx, false)?;
                let field = *field;
                let obj_ty = expr_type(obj)?.clone();
                let MType::Struct(q) = &obj_ty else {
                    return Err(format!(
                        "{}: type: field access on non-struct value",
                        e.span
                    ));
                };
                let info = self.lookup_struct(q).ok_or_else(|| {
                    format!(
                        "{}: type: unknown struct '{}'",
                        e.span,
                        self.idmap.str(q.leaf)
                    )
                })?;
                let ft = info.field_type(field).ok_or_else(|| {
                    format!(
                        "{}: type: struct '{}' has no field '{}'",
                        e.span,
                        self.idmap.str(q.leaf),
                        self.idmap.str(field)
                    )
                })?;
                e.mtype = Some(ft.clone());
            }
            ExprKind::Index { obj, index } => {
                self.resolve_expr(obj, scope, ctx, false)?;
                self.resolve_expr(index, scope, ctx, false)?;
                let obj_ty = expr_type(obj)?;
                let elem = obj_ty.elem().cloned().ok_or_else(|| {
                    format!("{}: type: subscript on non-indexable value", e.span)
                })?;
                if !expr_type(index)?.is_numeric() {
                    return Err(format!("{}: type: subscript index must be numeric", e.span));
                }
                e.mtype = Some(elem);
            }
            ExprKind::Binary { op, lhs, rhs } => {
                self.resolve_expr(lhs, scope, ctx, false)?;
                self.resolve_expr(rhs, scope, ctx, false)?;
                let (mtype, cval) = self.type_binary(*op, lhs, rhs, e.span)?;
                e.mtype = Some(mtype);
                e.cval = cval;
            }
            ExprKind::Unary { op, operand } => {
                self.resolve_expr(operand, scope, ctx, false)?;
                if op.is(Bid::Not) {
                    if expr_type(operand)? != &MType::Bool {
                        return Err(format!("{}: type: 'not' needs a bool operand", e.span));
                    }
                    e.cval = match operand.cval {
                        Some(ConstValue::Bool(b)) => Some(ConstValue::Bool(!b)),
                        _ => None,
                    };
                    e.mtype = Some(MType::Bool);
                } else {
                    let base = expr_type(operand)?.num_base().ok_or_else(|| {
                        format!("{}: type: unary '-' needs a numeric operand", e.span)
                    })?;
                    if !base.is_signed() && operand.cval.is_none() {
                        return Err(format!(
                            "{}: type: unary '-' on an unsigned non-constant",
                            e.span
                        ));
                    }
                    match operand.cval {
                        Some(ConstValue::Int(v)) => {
                            let neg = -v;
                            let nb = smallest_base(neg).ok_or_else(|| {
                                format!("{}: type: negated literal out of range", e.span)
                            })?;
                            e.mtype = Some(MType::refined(nb, Interval::point(neg)));
                            e.cval = Some(ConstValue::Int(neg));
                        }
                        _ => {
                            e.mtype = Some(MType::numeric(base));
                        }
                    }
                }
            }
            ExprKind::As { operand, ty } => {
                self.resolve_expr(operand, scope, ctx, false)?;
                if !expr_type(operand)?.is_numeric() {
                    return Err(format!("{}: type: 'as' needs a numeric operand", e.span));
                }
                let target = self.resolve_type(ty)?;
                if !target.is_numeric() {
                    return Err(format!("{}: type: 'as' target must be numeric", e.span));
                }
                e.cval = operand.cval;
                e.mtype = Some(target);
            }
            ExprKind::Call { .. } => {
                self.resolve_call(e, scope, ctx, allow_coro)?;
            }
        }
        Ok(())
    }

    fn resolve_call(
        &self,
        e: &mut Expr,
        scope: &Scope,
        ctx: &FuncCtx,
        allow_coro: bool,
    ) -> Result<(), String> {
        let span = e.span;
        let ExprKind::Call {
            recv,
            name,
            args,
            effect,
            resolved,
        } = &mut e.kind
        else {
            return Err(format!("{}: internal: resolve_call on a non-call", span));
        };
        let name = *name;
        let call_effect = *effect;

        // A call through a used package: `pkg.f(...)` parses as a method
        // call on the identifier `pkg`.
        if let Some(r) = recv.as_deref() {
            if let ExprKind::Ident(pkg) = &r.kind {
                let pkg = *pkg;
                if !scope.vars.contains_key(&pkg) && self.globals.deps.contains_key(&pkg) {
                    let dep = &self.globals.deps[&pkg];
                    let sig = dep.find_func(None, name).ok_or_else(|| {
                        format!(
                            "{}: type: package '{}' has no function '{}'",
                            span,
                            self.idmap.str(pkg),
                            self.idmap.str(name)
                        )
                    })?;
                    if !sig.public {
                        return Err(format!(
                            "{}: visibility: function '{}' is private to package '{}'",
                            span,
                            self.idmap.str(name),
                            self.idmap.str(pkg)
                        ));
                    }
                    self.check_user_call_args(sig, args, scope, ctx, span)?;
                    self.check_effect_marker(call_effect, sig.effect, allow_coro, span)?;
                    *resolved = Some(QQId::new(pkg, Bid::Base.into(), name));
                    e.mtype = Some(sig.ret.clone().unwrap_or(MType::EmptyStruct));
                    return Ok(());
                }
            }
        }

        match recv {
            Some(r) => {
                self.resolve_expr(r, scope, ctx, false)?;
                let recv_ty = expr_type(r)?.clone();
                // Built-in methods first (io buffers, slice length).
                if let Some(sig) = method_signature(&recv_ty, name) {
                    // The mark bookkeeping lives in coroutine state.
                    if matches!(bid_of(name), Some(Bid::Mark | Bid::SinceMark))
                        && ctx.effect != FuncEffect::Coroutine
                    {
                        return Err(format!(
                            "{}: effect: '{}' is only available inside a coroutine",
                            span,
                            self.idmap.str(name)
                        ));
                    }
                    self.check_builtin_call_args(&sig.args, args, scope, ctx, span)?;
                    self.check_effect_marker(call_effect, sig.effect, allow_coro, span)?;
                    *resolved = Some(QQId::new(Bid::Base.into(), Bid::Base.into(), name));
                    e.mtype = Some(sig.ret.unwrap_or(MType::EmptyStruct));
                    return Ok(());
                }
                let MType::Struct(q) = &recv_ty else {
                    return Err(format!(
                        "{}: type: no method '{}' on {}",
                        span,
                        self.idmap.str(name),
                        recv_ty.display(self.idmap)
                    ));
                };
                let (globals, package) = if q.package == self.globals.package
                    || q.package == Id::NONE
                {
                    (self.globals, self.globals.package)
                } else {
                    match self.globals.deps.get(&q.package) {
                        Some(dep) => (dep, q.package),
                        None => {
                            return Err(format!(
                                "{}: type: unknown package '{}'",
                                span,
                                self.idmap.str(q.package)
                            ));
                        }
                    }
                };
                let sig = globals.find_func(Some(q.leaf), name).ok_or_else(|| {
                    format!(
                        "{}: type: struct '{}' has no method '{}'",
                        span,
                        self.idmap.str(q.leaf),
                        self.idmap.str(name)
                    )
                })?;
                if package != self.globals.package && !sig.public {
                    return Err(format!(
                        "{}: visibility: method '{}' is private",
                        span,
                        self.idmap.str(name)
                    ));
                }
                self.check_user_call_args(sig, args, scope, ctx, span)?;
                self.check_effect_marker(call_effect, sig.effect, allow_coro, span)?;
                *resolved = Some(QQId::new(package, q.leaf, name));
                e.mtype = Some(sig.ret.clone().unwrap_or(MType::EmptyStruct));
                Ok(())
            }
            None => {
                let sig = self.globals.find_func(None, name).ok_or_else(|| {
                    format!(
                        "{}: type: undefined function '{}'",
                        span,
                        self.idmap.str(name)
                    )
                })?;
                self.check_user_call_args(sig, args, scope, ctx, span)?;
                self.check_effect_marker(call_effect, sig.effect, allow_coro, span)?;
                *resolved = Some(QQId::new(self.globals.package, Bid::Base.into(), name));
                e.mtype = Some(sig.ret.clone().unwrap_or(MType::EmptyStruct));
                Ok(())
            }
        }
    }

    fn check_effect_marker(
        &self,
        call_effect: FuncEffect,
        callee_effect: FuncEffect,
        allow_coro: bool,
        span: crate::ast::Span,
    ) -> Result<(), String> {
        if call_effect != callee_effect {
            return Err(format!(
                "{}: effect: call marker '{}' does not match callee effect '{}'",
                span,
                call_effect.suffix(),
                callee_effect.suffix()
            ));
        }
        if callee_effect == FuncEffect::Coroutine && !allow_coro {
            return Err(format!(
                "{}: effect: a coroutine call must stand alone as a statement \
                 or initializer",
                span
            ));
        }
        Ok(())
    }

    fn check_user_call_args(
        &self,
        sig: &FuncSig,
        args: &mut [Arg],
        scope: &Scope,
        ctx: &FuncCtx,
        span: crate::ast::Span,
    ) -> Result<(), String> {
        if args.len() != sig.args.len() {
            return Err(format!(
                "{}: type: call passes {} arguments, function takes {}",
                span,
                args.len(),
                sig.args.len()
            ));
        }
        for (arg, (want_name, want_ty)) in args.iter_mut().zip(sig.args.iter()) {
            if arg.name != *want_name {
                return Err(format!(
                    "{}: type: argument must be passed by name: expected '{}', got '{}'",
                    span,
                    self.idmap.str(*want_name),
                    self.idmap.str(arg.name)
                ));
            }
            self.resolve_expr(&mut arg.value, scope, ctx, false)?;
            self.check_base_assignable(want_ty, &arg.value, span)?;
        }
        Ok(())
    }

    fn check_builtin_call_args(
        &self,
        want: &[(&'static str, MType)],
        args: &mut [Arg],
        scope: &Scope,
        ctx: &FuncCtx,
        span: crate::ast::Span,
    ) -> Result<(), String> {
        if args.len() != want.len() {
            return Err(format!(
                "{}: type: call passes {} arguments, method takes {}",
                span,
                args.len(),
                want.len()
            ));
        }
        for (arg, (want_name, want_ty)) in args.iter_mut().zip(want.iter()) {
            if self.idmap.str(arg.name) != *want_name {
                return Err(format!(
                    "{}: type: argument must be passed by name: expected '{}'",
                    span, want_name
                ));
            }
            self.resolve_expr(&mut arg.value, scope, ctx, false)?;
            self.check_base_assignable(want_ty, &arg.value, span)?;
        }
        Ok(())
    }

    fn type_binary(
        &self,
        op: Id,
        lhs: &Expr,
        rhs: &Expr,
        span: crate::ast::Span,
    ) -> Result<(MType, Option<ConstValue>), String> {
        let lt = expr_type(lhs)?;
        let rt = expr_type(rhs)?;
        let bid = bid_of(op).ok_or_else(|| format!("{}: internal: bad operator id", span))?;
        match bid {
            Bid::And | Bid::Or => {
                if lt != &MType::Bool || rt != &MType::Bool {
                    return Err(format!(
                        "{}: type: '{}' needs bool operands",
                        span,
                        self.idmap.str(op)
                    ));
                }
                let cval = match (lhs.cval, rhs.cval) {
                    (Some(ConstValue::Bool(a)), Some(ConstValue::Bool(b))) => {
                        Some(ConstValue::Bool(if bid == Bid::And { a && b } else { a || b }))
                    }
                    _ => None,
                };
                Ok((MType::Bool, cval))
            }
            Bid::EqEq | Bid::NotEq | Bid::Lt | Bid::LtEq | Bid::Gt | Bid::GtEq => {
                let comparable = (lt.is_numeric() && rt.is_numeric())
                    || (matches!(bid, Bid::EqEq | Bid::NotEq)
                        && (lt == rt));
                if !comparable {
                    return Err(format!(
                        "{}: type: cannot compare {} with {}",
                        span,
                        lt.display(self.idmap),
                        rt.display(self.idmap)
                    ));
                }
                let cval = match (lhs.cval, rhs.cval) {
                    (Some(ConstValue::Int(a)), Some(ConstValue::Int(b))) => {
                        let v = match bid {
                            Bid::EqEq => a == b,
                            Bid::NotEq => a != b,
                            Bid::Lt => a < b,
                            Bid::LtEq => a <= b,
                            Bid::Gt => a > b,
                            _ => a >= b,
                        };
                        Some(ConstValue::Bool(v))
                    }
                    _ => None,
                };
                Ok((MType::Bool, cval))
            }
            Bid::TildeModPlus | Bid::TildeModMinus | Bid::TildeSatPlus | Bid::TildeSatMinus => {
                let base = lt.num_base().ok_or_else(|| {
                    format!("{}: type: tilde operators need numeric operands", span)
                })?;
                if !rt.is_numeric() {
                    return Err(format!(
                        "{}: type: tilde operators need numeric operands",
                        span
                    ));
                }
                let image = lt
                    .envelope()
                    .zip(rt.envelope())
                    .map(|(a, b)| match bid {
                        Bid::TildeModPlus | Bid::TildeSatPlus => a.add(&b),
                        _ => a.sub(&b),
                    });
                let mtype = match bid {
                    // Modular results span the base's whole natural range.
                    Bid::TildeModPlus | Bid::TildeModMinus => MType::numeric(base),
                    // Saturating results are clipped into the base range.
                    _ => match image {
                        Some(iv) => MType::refined(base, clamp_to(iv, base)),
                        None => MType::numeric(base),
                    },
                };
                Ok((mtype, None))
            }
            Bid::Plus
            | Bid::Minus
            | Bid::Star
            | Bid::SlashOp
            | Bid::Percent
            | Bid::Amp
            | Bid::Pipe
            | Bid::Caret
            | Bid::Shl
            | Bid::Shr => {
                let base = self.combine_bases(lhs, rhs, span)?;
                let image = lt.envelope().zip(rt.envelope()).map(|(a, b)| match bid {
                    Bid::Plus => a.add(&b),
                    Bid::Minus => a.sub(&b),
                    Bid::Star => a.mul(&b),
                    Bid::SlashOp => a.div(&b),
                    Bid::Percent => a.rem(&b),
                    Bid::Amp => a.bitand(&b),
                    Bid::Pipe => a.bitor(&b),
                    Bid::Caret => a.bitxor(&b),
                    Bid::Shl => a.shl(&b),
                    _ => a.shr(&b),
                });
                let cval = match (lhs.cval, rhs.cval) {
                    (Some(ConstValue::Int(a)), Some(ConstValue::Int(b))) => {
                        Some(ConstValue::Int(fold_int_op(bid, a, b, span)?))
                    }
                    _ => None,
                };
                // Keep the image as the refinement only when it respects the
                // result base's natural range; otherwise the checker decides
                // with facts in hand.
                let mtype = match image {
                    Some(iv) if !iv.is_empty() && iv.is_subset_of(&base.range()) => {
                        MType::refined(base, iv)
                    }
                    _ => MType::numeric(base),
                };
                Ok((mtype, cval))
            }
            _ => Err(format!(
                "{}: internal: unhandled binary operator '{}'",
                span,
                self.idmap.str(op)
            )),
        }
    }

    /// Result base of a binary arithmetic op: the wider of the two bases,
    /// with compile-time constants adopting the other side's base when their
    /// value fits.
    fn combine_bases(&self, lhs: &Expr, rhs: &Expr, span: crate::ast::Span) -> Result<NumBase, String> {
        let lb = expr_type(lhs)?.num_base();
        let rb = expr_type(rhs)?.num_base();
        let (Some(lb), Some(rb)) = (lb, rb) else {
            return Err(format!("{}: type: arithmetic needs numeric operands", span));
        };
        if lb == rb {
            return Ok(lb);
        }
        if let Some(w) = lb.widest(rb) {
            return Ok(w);
        }
        if let Some(ConstValue::Int(v)) = rhs.cval {
            if lb.range().contains(v) {
                return Ok(lb);
            }
        }
        if let Some(ConstValue::Int(v)) = lhs.cval {
            if rb.range().contains(v) {
                return Ok(rb);
            }
        }
        Err(format!(
            "{}: type: mixed signedness in arithmetic ({} vs {})",
            span,
            lb.name(),
            rb.name()
        ))
    }

    // ------------------------------------------------------------------
    // Types and constants
    // ------------------------------------------------------------------

    pub fn resolve_type(&self, t: &TypeExpr) -> Result<MType, String> {
        match &t.kind {
            TypeExprKind::Bool => Ok(MType::Bool),
            TypeExprKind::Status => Ok(MType::Status),
            TypeExprKind::Numeric {
                base_name,
                refinement,
            } => {
                let base = NumBase::from_id(*base_name)
                    .ok_or_else(|| format!("{}: type: unknown numeric base", t.span))?;
                match refinement {
                    None => Ok(MType::numeric(base)),
                    Some(r) => {
                        let lo = match &r.lo {
                            Some(e) => self.fold_const_int(e)?,
                            None => base.min_value(),
                        };
                        let hi = match &r.hi {
                            Some(e) => {
                                let v = self.fold_const_int(e)?;
                                if r.inclusive {
                                    v
                                } else {
                                    v - 1
                                }
                            }
                            None => base.max_value(),
                        };
                        let iv = Interval::closed(lo, hi);
                        if iv.is_empty() {
                            return Err(format!(
                                "{}: type: empty refinement range [{} .. {}]",
                                t.span, lo, hi
                            ));
                        }
                        if !iv.is_subset_of(&base.range()) {
                            return Err(format!(
                                "{}: type: refinement exceeds base.{} range",
                                t.span,
                                base.name()
                            ));
                        }
                        Ok(MType::refined(base, iv))
                    }
                }
            }
            TypeExprKind::Array { len, elem } => {
                let n = self.fold_const_int(len)?;
                if n < 0 {
                    return Err(format!("{}: type: negative array length", t.span));
                }
                if n > u32::MAX as i128 {
                    return Err(format!("{}: type: array length too large", t.span));
                }
                Ok(MType::Array {
                    len: n as u64,
                    elem: Box::new(self.resolve_type(elem)?),
                })
            }
            TypeExprKind::Slice(elem) => Ok(MType::Slice(Box::new(self.resolve_type(elem)?))),
            TypeExprKind::Table(elem) => Ok(MType::Table(Box::new(self.resolve_type(elem)?))),
            TypeExprKind::Ptr(inner) => Ok(MType::Ptr(Box::new(self.resolve_type(inner)?))),
            TypeExprKind::Nptr(inner) => Ok(MType::Nptr(Box::new(self.resolve_type(inner)?))),
            TypeExprKind::Named(q) => {
                if q.package.is(Bid::Base) {
                    match bid_of(q.leaf) {
                        Some(Bid::IoReader | Bid::IoWriter) => {
                            return Ok(MType::Struct(*q));
                        }
                        Some(Bid::EmptyStruct) => return Ok(MType::EmptyStruct),
                        _ => {
                            return Err(format!(
                                "{}: type: unknown base type '{}'",
                                t.span,
                                self.idmap.str(q.leaf)
                            ));
                        }
                    }
                }
                if q.package == Id::NONE {
                    if self.globals.structs.contains_key(&q.leaf) {
                        return Ok(MType::Struct(QQId::new(
                            self.globals.package,
                            Bid::Base.into(),
                            q.leaf,
                        )));
                    }
                    return Err(format!(
                        "{}: type: unknown type '{}'",
                        t.span,
                        self.idmap.str(q.leaf)
                    ));
                }
                let dep = self.globals.deps.get(&q.package).ok_or_else(|| {
                    format!(
                        "{}: type: unknown package '{}'",
                        t.span,
                        self.idmap.str(q.package)
                    )
                })?;
                let info = dep.structs.get(&q.leaf).ok_or_else(|| {
                    format!(
                        "{}: type: package '{}' has no type '{}'",
                        t.span,
                        self.idmap.str(q.package),
                        self.idmap.str(q.leaf)
                    )
                })?;
                if !info.public {
                    return Err(format!(
                        "{}: visibility: type '{}' is private to package '{}'",
                        t.span,
                        self.idmap.str(q.leaf),
                        self.idmap.str(q.package)
                    ));
                }
                Ok(MType::Struct(QQId::new(q.package, Bid::Base.into(), q.leaf)))
            }
        }
    }

    fn resolve_struct(&self, s: &StructDef, package: Id) -> Result<StructInfo, String> {
        let mut fields = Vec::new();
        for f in &s.fields {
            let ty = self.resolve_type(&f.ty)?;
            if ty.is_io_reader() || ty.is_io_writer() {
                return Err(format!(
                    "{}: type: io buffers are only passed as arguments",
                    f.span
                ));
            }
            if fields.iter().any(|(n, _)| *n == f.name) {
                return Err(format!(
                    "{}: type: duplicate field '{}'",
                    f.span,
                    self.idmap.str(f.name)
                ));
            }
            fields.push((f.name, ty));
        }
        Ok(StructInfo {
            name: s.name,
            public: s.public,
            suspendible: s.suspendible,
            fields,
            package,
        })
    }

    fn resolve_signature(&self, f: &FuncDef, package: Id) -> Result<FuncSig, String> {
        let mut args = Vec::new();
        for a in &f.args {
            args.push((a.name, self.resolve_type(&a.ty)?));
        }
        let ret = match &f.ret {
            Some(t) => Some(self.resolve_type(t)?),
            None => None,
        };
        if let Some(recv) = f.receiver {
            let Some(info) = self.globals.structs.get(&recv) else {
                return Err(format!(
                    "{}: type: unknown receiver struct '{}'",
                    f.span,
                    self.idmap.str(recv)
                ));
            };
            if f.effect == FuncEffect::Coroutine && !info.suspendible {
                return Err(format!(
                    "{}: type: coroutine method on struct '{}' requires the struct \
                     be declared suspendible ('struct {}?')",
                    f.span,
                    self.idmap.str(recv),
                    self.idmap.str(recv)
                ));
            }
        } else if f.effect == FuncEffect::Coroutine {
            return Err(format!(
                "{}: type: coroutines must be methods (their state lives in the \
                 receiver)",
                f.span
            ));
        }
        Ok(FuncSig {
            receiver: f.receiver,
            name: f.name,
            public: f.public,
            effect: f.effect,
            args,
            ret,
            pre: f.pre.clone(),
            post: f.post.clone(),
            package,
        })
    }

    /// Fold a constant expression to its integer value. Used for refinement
    /// bounds, array lengths and const initializers.
    pub fn fold_const_int(&self, e: &Expr) -> Result<i128, String> {
        match self.fold_const_value(e)? {
            ConstValue::Int(v) => Ok(v),
            ConstValue::Bool(_) => Err(format!(
                "{}: type: expected an integer constant",
                e.span
            )),
        }
    }

    pub fn fold_const_value(&self, e: &Expr) -> Result<ConstValue, String> {
        match &e.kind {
            ExprKind::IntLit(v) => Ok(ConstValue::Int(*v)),
            ExprKind::BoolLit(b) => Ok(ConstValue::Bool(*b)),
            ExprKind::Ident(id) => self
                .globals
                .consts
                .get(id)
                .map(|c| c.value)
                .ok_or_else(|| {
                    format!(
                        "{}: type: '{}' is not a constant",
                        e.span,
                        self.idmap.str(*id)
                    )
                }),
            ExprKind::Unary { op, operand } if op.is(Bid::Minus) => {
                match self.fold_const_value(operand)? {
                    ConstValue::Int(v) => Ok(ConstValue::Int(-v)),
                    ConstValue::Bool(_) => {
                        Err(format!("{}: type: cannot negate a bool", e.span))
                    }
                }
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let a = self.fold_const_int(lhs)?;
                let b = self.fold_const_int(rhs)?;
                let bid = bid_of(*op)
                    .ok_or_else(|| format!("{}: internal: bad operator id", e.span))?;
                Ok(ConstValue::Int(fold_int_op(bid, a, b, e.span)?))
            }
            _ => Err(format!("{}: type: expression is not a constant", e.span)),
        }
    }

    // ------------------------------------------------------------------
    // Small checks
    // ------------------------------------------------------------------

    fn require_bool_fact(&self, e: &Expr, what: &str) -> Result<(), String> {
        if expr_type(e)? != &MType::Bool {
            return Err(format!("{}: type: {} must be bool", e.span, what));
        }
        if !e.is_pure() {
            return Err(format!("{}: type: {} must be a pure expression", e.span, what));
        }
        Ok(())
    }

    /// Base-level assignability; interval fit is the checker's duty.
    fn check_base_assignable(
        &self,
        dst: &MType,
        src: &Expr,
        span: crate::ast::Span,
    ) -> Result<(), String> {
        let st = expr_type(src)?;
        let compatible = match (dst, st) {
            (MType::Numeric { .. }, MType::Numeric { .. }) => true,
            (MType::Bool, MType::Bool) => true,
            (MType::Status, MType::Status) => true,
            (MType::EmptyStruct, MType::EmptyStruct) => true,
            (MType::Slice(a), MType::Slice(b)) => a == b,
            (MType::Table(a), MType::Table(b)) => a == b,
            (MType::Array { len: la, elem: ea }, MType::Array { len: lb, elem: eb }) => {
                la == lb && ea == eb
            }
            (MType::Struct(a), MType::Struct(b)) => a.leaf == b.leaf && a.package == b.package,
            (MType::Ptr(a), MType::Ptr(b)) => a == b,
            (MType::Nptr(a), MType::Nptr(b) | MType::Ptr(b)) => a == b,
            _ => false,
        };
        if !compatible {
            return Err(format!(
                "{}: type: cannot assign {} to {}",
                span,
                st.display(self.idmap),
                dst.display(self.idmap)
            ));
        }
        Ok(())
    }

    fn check_lvalue(
        &self,
        e: &Expr,
        scope: &Scope,
        span: crate::ast::Span,
    ) -> Result<(), String> {
        match &e.kind {
            ExprKind::Ident(id) => {
                if id.is(Bid::This) {
                    return Err(format!("{}: type: cannot assign to 'this'", span));
                }
                match scope.vars.get(id) {
                    Some((_, VarKind::Local)) => Ok(()),
                    Some((_, VarKind::Arg)) => Err(format!(
                        "{}: type: arguments are read-only ('{}')",
                        span,
                        self.idmap.str(*id)
                    )),
                    Some((_, VarKind::IterVar)) => Err(format!(
                        "{}: type: iterate variables cannot be rebound",
                        span
                    )),
                    None => Err(format!(
                        "{}: type: assignment to undefined name '{}'",
                        span,
                        self.idmap.str(*id)
                    )),
                }
            }
            ExprKind::Field { obj, .. } => match &obj.kind {
                ExprKind::Ident(id) if id.is(Bid::This) => Ok(()),
                _ => Err(format!(
                    "{}: type: only 'this' fields are assignable",
                    span
                )),
            },
            ExprKind::Index { obj, .. } => self.check_index_lvalue(obj, scope, span),
            _ => Err(format!("{}: type: expression is not assignable", span)),
        }
    }

    fn check_index_lvalue(
        &self,
        obj: &Expr,
        scope: &Scope,
        span: crate::ast::Span,
    ) -> Result<(), String> {
        match &obj.kind {
            ExprKind::Ident(_) => Ok(()),
            ExprKind::Field { obj: inner, .. } => match &inner.kind {
                ExprKind::Ident(id) if id.is(Bid::This) => Ok(()),
                _ => Err(format!(
                    "{}: type: only 'this' fields are assignable",
                    span
                )),
            },
            ExprKind::Index { obj: inner, .. } => self.check_index_lvalue(inner, scope, span),
            _ => Err(format!("{}: type: subscript target is not assignable", span)),
        }
    }

    fn lookup_struct(&self, q: &QQId) -> Option<&StructInfo> {
        if q.package == self.globals.package || q.package == Id::NONE {
            self.globals.structs.get(&q.leaf)
        } else {
            self.globals.deps.get(&q.package)?.structs.get(&q.leaf)
        }
    }
}

/// The resolved type of an expression; absence after resolution is a
/// compiler bug surfaced as an internal error.
pub fn expr_type(e: &Expr) -> Result<&MType, String> {
    e.mtype
        .as_ref()
        .ok_or_else(|| format!("{}: internal: expression has no resolved type", e.span))
}

/// Smallest base whose natural range contains `v`: unsigned widths for
/// nonnegative values, signed widths for negative ones.
pub fn smallest_base(v: i128) -> Option<NumBase> {
    if v >= 0 {
        [NumBase::U8, NumBase::U16, NumBase::U32, NumBase::U64]
            .into_iter()
            .find(|b| b.range().contains(v))
    } else {
        [NumBase::I8, NumBase::I16, NumBase::I32, NumBase::I64]
            .into_iter()
            .find(|b| b.range().contains(v))
    }
}

/// Clamp an interval into a base's natural range (saturating semantics).
fn clamp_to(iv: Interval, base: NumBase) -> Interval {
    let clamp = |v: Option<i128>, default: i128| -> i128 {
        match v {
            Some(v) => v.clamp(base.min_value(), base.max_value()),
            None => default,
        }
    };
    match iv {
        Interval::Empty => base.range(),
        _ => Interval::closed(
            clamp(iv.min_value(), base.min_value()),
            clamp(iv.max_value(), base.max_value()),
        ),
    }
}

fn fold_int_op(bid: Bid, a: i128, b: i128, span: crate::ast::Span) -> Result<i128, String> {
    let out = match bid {
        Bid::Plus => a.checked_add(b),
        Bid::Minus => a.checked_sub(b),
        Bid::Star => a.checked_mul(b),
        Bid::SlashOp => {
            if b == 0 {
                return Err(format!("{}: type: constant division by zero", span));
            }
            a.checked_div(b)
        }
        Bid::Percent => {
            if b == 0 {
                return Err(format!("{}: type: constant modulus by zero", span));
            }
            a.checked_rem(b)
        }
        Bid::Amp => Some(a & b),
        Bid::Pipe => Some(a | b),
        Bid::Caret => Some(a ^ b),
        Bid::Shl => {
            if !(0..127).contains(&b) {
                return Err(format!("{}: type: constant shift out of range", span));
            }
            a.checked_shl(b as u32)
        }
        Bid::Shr => {
            if !(0..127).contains(&b) {
                return Err(format!("{}: type: constant shift out of range", span));
            }
            Some(a >> b)
        }
        _ => {
            return Err(format!(
                "{}: internal: non-arithmetic operator in constant fold",
                span
            ));
        }
    };
    out.ok_or_else(|| format!("{}: type: constant arithmetic overflow", span))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;
    use std::path::PathBuf;

    fn resolve(src: &str) -> Result<(Module, Globals, IdMap), String> {
        let mut idmap = IdMap::new();
        let pkg = idmap.intern("test");
        let mut module = parse_source(src, &mut idmap, PathBuf::from("test.sift"), pkg)?;
        let globals =
            Globals::collect(std::slice::from_ref(&module), &idmap, pkg, HashMap::new())?;
        let resolver = Resolver::new(&idmap, &globals);
        let errors = resolver.resolve_module(&mut module);
        if let Some(e) = errors.into_iter().next() {
            return Err(e);
        }
        Ok((module, globals, idmap))
    }

    #[test]
    fn test_literal_typing() {
        let (module, _, _) =
            resolve("pub func f(x: base.u32) base.u32 {\n return x + 10\n}\n").unwrap();
        let Stmt::Return { value: Some(v), .. } = &module.funcs[0].body[0] else {
            panic!("expected return");
        };
        // x + 10: combined base is u32; the image [10, 2^32-1+10] exceeds
        // u32 so the refinement is dropped.
        assert_eq!(v.mtype.as_ref().unwrap().num_base(), Some(NumBase::U32));
        let ExprKind::Binary { rhs, .. } = &v.kind else {
            panic!("expected binary");
        };
        assert_eq!(rhs.cval, Some(ConstValue::Int(10)));
        assert_eq!(rhs.mtype.as_ref().unwrap().num_base(), Some(NumBase::U8));
    }

    #[test]
    fn test_refined_arg_gives_tight_image() {
        let (module, _, _) =
            resolve("pub func f(x: base.u32[..= 100]) base.u32 {\n return x + 10\n}\n")
                .unwrap();
        let Stmt::Return { value: Some(v), .. } = &module.funcs[0].body[0] else {
            panic!("expected return");
        };
        assert_eq!(
            v.mtype.as_ref().unwrap().envelope(),
            Some(Interval::closed(10, 110))
        );
    }

    #[test]
    fn test_undefined_name() {
        let err = resolve("pub func f(x: base.u32) base.u32 {\n return y\n}\n").unwrap_err();
        assert!(err.contains("undefined name 'y'"), "got: {}", err);
    }

    #[test]
    fn test_args_are_read_only() {
        let err = resolve("pub func f!(x: base.u32) {\n x = 1\n}\n").unwrap_err();
        assert!(err.contains("read-only"), "got: {}", err);
    }

    #[test]
    fn test_effect_marker_mismatch() {
        let err = resolve(
            "pri struct d?(s: base.u32)\n\
             pub func d.step?(src: base.io_reader) {\n\
             \tvar c: base.u8 = src.read_u8()\n\
             }\n",
        )
        .unwrap_err();
        assert!(err.contains("marker"), "got: {}", err);
    }

    #[test]
    fn test_coroutine_call_needs_statement_position() {
        let err = resolve(
            "pri struct d?(s: base.u32)\n\
             pub func d.step?(src: base.io_reader) {\n\
             \tvar c: base.u32 = (src.read_u8?() as base.u32) + 1\n\
             }\n",
        )
        .unwrap_err();
        assert!(err.contains("stand alone"), "got: {}", err);
    }

    #[test]
    fn test_const_fold_in_refinement() {
        let (_, globals, idmap) = resolve(
            "pub const size: base.u32 = 0x10\n\
             pub func f(x: base.u32[.. size]) base.u32 {\n return x\n}\n",
        )
        .unwrap();
        let id = idmap.get("size").unwrap();
        assert_eq!(
            globals.consts.get(&id).unwrap().value,
            ConstValue::Int(16)
        );
    }

    #[test]
    fn test_struct_field_access() {
        let (module, _, _) = resolve(
            "pri struct d?(count: base.u32)\n\
             pub func d.bump!() {\n\
             \tthis.count ~mod+= 1\n\
             }\n",
        )
        .unwrap();
        let Stmt::Assign { lhs, .. } = &module.funcs[0].body[0] else {
            panic!("expected assign");
        };
        assert_eq!(lhs.mtype.as_ref().unwrap().num_base(), Some(NumBase::U32));
    }

    #[test]
    fn test_slice_length_call() {
        let (module, _, _) = resolve(
            "pub func f(s: slice base.u8) base.u64 {\n return s.length()\n}\n",
        )
        .unwrap();
        let Stmt::Return { value: Some(v), .. } = &module.funcs[0].body[0] else {
            panic!("expected return");
        };
        assert_eq!(v.mtype.as_ref().unwrap(), &MType::u64());
    }

    #[test]
    fn test_status_return_needs_effect() {
        let err = resolve(
            "pub status \"?bad\"\n\
             pub func f(x: base.u32) {\n return \"?bad\"\n}\n",
        )
        .unwrap_err();
        assert!(err.contains("only coroutines return statuses"), "got: {}", err);
    }

    #[test]
    fn test_mixed_signedness_rejected() {
        let err = resolve(
            "pub func f(x: base.u32, y: base.i32) base.u32 {\n return x + y\n}\n",
        )
        .unwrap_err();
        assert!(err.contains("mixed signedness"), "got: {}", err);
    }
}
