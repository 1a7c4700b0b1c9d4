//! Abstract Syntax Tree for Sift
//!
//! Node kinds: expressions, types, statements, functions, structs, consts,
//! statuses, use declarations, iterate parts and choose statements. Every
//! node carries a source span. Expressions additionally carry their resolved
//! [`MType`], which is `None` until the resolver runs; presence of the type
//! is the "typed" flag. Where known, a constant-folded [`ConstValue`] rides
//! along.

use crate::token::{Bid, Id, IdMap, QQId};
use crate::types::MType;
use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;

/// Source position for error reporting and tooling (0-indexed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub line: u32,
    pub col: u32,
}

impl Span {
    pub fn new(line: u32, col: u32) -> Self {
        Span { line, col }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line + 1, self.col + 1)
    }
}

/// A compile-time constant value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstValue {
    Int(i128),
    Bool(bool),
}

/// Function effect. Governs what callers may invoke a function from and
/// which facts survive across the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuncEffect {
    /// No observable side effects; callable from anywhere.
    Pure,
    /// `!` suffix: mutates state; callable from impure and coroutine code.
    Impure,
    /// `?` suffix: may suspend; each call site is a suspension point.
    Coroutine,
}

impl FuncEffect {
    pub fn suffix(self) -> &'static str {
        match self {
            FuncEffect::Pure => "",
            FuncEffect::Impure => "!",
            FuncEffect::Coroutine => "?",
        }
    }
}

/// A named call argument, e.g. `src: args.src`.
#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    pub name: Id,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    IntLit(i128),
    BoolLit(bool),
    /// Status literal; the message includes the kind prefix character.
    StatusLit(String),
    /// Local variable, argument or constant.
    Ident(Id),
    /// Field selection `obj.field` (including `this.field`).
    Field { obj: Box<Expr>, field: Id },
    /// Subscript `obj[index]`.
    Index { obj: Box<Expr>, index: Box<Expr> },
    /// Call `recv.name(args)` with the effect spelled at the call site
    /// (`name?()` / `name!()` / `name()`). `resolved` is filled in by the
    /// resolver with the callee's qualified name.
    Call {
        recv: Option<Box<Expr>>,
        name: Id,
        args: Vec<Arg>,
        effect: FuncEffect,
        resolved: Option<QQId>,
    },
    Binary {
        op: Id,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Unary `-` or `not`.
    Unary { op: Id, operand: Box<Expr> },
    /// `operand as T`.
    As {
        operand: Box<Expr>,
        ty: Box<TypeExpr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    /// The resolved type; `Some` is the node's "typed" flag.
    pub mtype: Option<MType>,
    /// Constant-folded value, when the expression is a compile-time constant.
    pub cval: Option<ConstValue>,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Expr {
            kind,
            span,
            mtype: None,
            cval: None,
        }
    }

    /// Structural equality, ignoring spans and resolution state. This is
    /// the equality under which facts are deduplicated.
    pub fn same(&self, other: &Expr) -> bool {
        self.cmp_structure(other) == Ordering::Equal
    }

    /// Total structural ordering; used to canonicalize commutative operands.
    pub fn cmp_structure(&self, other: &Expr) -> Ordering {
        fn rank(k: &ExprKind) -> u8 {
            match k {
                ExprKind::IntLit(_) => 0,
                ExprKind::BoolLit(_) => 1,
                ExprKind::StatusLit(_) => 2,
                ExprKind::Ident(_) => 3,
                ExprKind::Field { .. } => 4,
                ExprKind::Index { .. } => 5,
                ExprKind::Call { .. } => 6,
                ExprKind::Binary { .. } => 7,
                ExprKind::Unary { .. } => 8,
                ExprKind::As { .. } => 9,
            }
        }
        let r = rank(&self.kind).cmp(&rank(&other.kind));
        if r != Ordering::Equal {
            return r;
        }
        match (&self.kind, &other.kind) {
            (ExprKind::IntLit(a), ExprKind::IntLit(b)) => a.cmp(b),
            (ExprKind::BoolLit(a), ExprKind::BoolLit(b)) => a.cmp(b),
            (ExprKind::StatusLit(a), ExprKind::StatusLit(b)) => a.cmp(b),
            (ExprKind::Ident(a), ExprKind::Ident(b)) => a.cmp(b),
            (
                ExprKind::Field { obj: a, field: fa },
                ExprKind::Field { obj: b, field: fb },
            ) => a.cmp_structure(b).then(fa.cmp(fb)),
            (
                ExprKind::Index { obj: a, index: ia },
                ExprKind::Index { obj: b, index: ib },
            ) => a.cmp_structure(b).then_with(|| ia.cmp_structure(ib)),
            (
                ExprKind::Call {
                    recv: ra,
                    name: na,
                    args: aa,
                    ..
                },
                ExprKind::Call {
                    recv: rb,
                    name: nb,
                    args: ab,
                    ..
                },
            ) => {
                let r = na.cmp(nb).then_with(|| match (ra, rb) {
                    (None, None) => Ordering::Equal,
                    (None, Some(_)) => Ordering::Less,
                    (Some(_), None) => Ordering::Greater,
                    (Some(x), Some(y)) => x.cmp_structure(y),
                });
                r.then_with(|| {
                    aa.len().cmp(&ab.len()).then_with(|| {
                        for (x, y) in aa.iter().zip(ab.iter()) {
                            let c = x.name.cmp(&y.name).then_with(|| x.value.cmp_structure(&y.value));
                            if c != Ordering::Equal {
                                return c;
                            }
                        }
                        Ordering::Equal
                    })
                })
            }
            (
                ExprKind::Binary {
                    op: oa,
                    lhs: la,
                    rhs: ra,
                },
                ExprKind::Binary {
                    op: ob,
                    lhs: lb,
                    rhs: rb,
                },
            ) => oa
                .cmp(ob)
                .then_with(|| la.cmp_structure(lb))
                .then_with(|| ra.cmp_structure(rb)),
            (
                ExprKind::Unary { op: oa, operand: a },
                ExprKind::Unary { op: ob, operand: b },
            ) => oa.cmp(ob).then_with(|| a.cmp_structure(b)),
            (
                ExprKind::As { operand: a, .. },
                ExprKind::As { operand: b, .. },
            ) => a.cmp_structure(b),
            _ => Ordering::Equal,
        }
    }

    /// True if the expression mentions the given identifier anywhere.
    pub fn mentions(&self, id: Id) -> bool {
        match &self.kind {
            ExprKind::IntLit(_) | ExprKind::BoolLit(_) | ExprKind::StatusLit(_) => false,
            ExprKind::Ident(x) => *x == id,
            ExprKind::Field { obj, .. } => obj.mentions(id),
            ExprKind::Index { obj, index } => obj.mentions(id) || index.mentions(id),
            ExprKind::Call { recv, args, .. } => {
                recv.as_ref().is_some_and(|r| r.mentions(id))
                    || args.iter().any(|a| a.value.mentions(id))
            }
            ExprKind::Binary { lhs, rhs, .. } => lhs.mentions(id) || rhs.mentions(id),
            ExprKind::Unary { operand, .. } => operand.mentions(id),
            ExprKind::As { operand, .. } => operand.mentions(id),
        }
    }

    /// True if the expression reads any non-local state: a field access or
    /// any call (even a pure one observes state the callee can see).
    pub fn mentions_non_local(&self) -> bool {
        match &self.kind {
            ExprKind::IntLit(_) | ExprKind::BoolLit(_) | ExprKind::StatusLit(_) => false,
            ExprKind::Ident(_) => false,
            ExprKind::Field { .. } | ExprKind::Call { .. } => true,
            ExprKind::Index { obj, index } => {
                obj.mentions_non_local() || index.mentions_non_local()
            }
            ExprKind::Binary { lhs, rhs, .. } => {
                lhs.mentions_non_local() || rhs.mentions_non_local()
            }
            ExprKind::Unary { operand, .. } => operand.mentions_non_local(),
            ExprKind::As { operand, .. } => operand.mentions_non_local(),
        }
    }

    /// True if evaluating the expression has no side effects: literals,
    /// reads and pure calls only.
    pub fn is_pure(&self) -> bool {
        match &self.kind {
            ExprKind::IntLit(_) | ExprKind::BoolLit(_) | ExprKind::StatusLit(_) => true,
            ExprKind::Ident(_) => true,
            ExprKind::Field { obj, .. } => obj.is_pure(),
            ExprKind::Index { obj, index } => obj.is_pure() && index.is_pure(),
            ExprKind::Call { recv, args, effect, .. } => {
                *effect == FuncEffect::Pure
                    && recv.as_ref().is_none_or(|r| r.is_pure())
                    && args.iter().all(|a| a.value.is_pure())
            }
            ExprKind::Binary { lhs, rhs, .. } => lhs.is_pure() && rhs.is_pure(),
            ExprKind::Unary { operand, .. } => operand.is_pure(),
            ExprKind::As { operand, .. } => operand.is_pure(),
        }
    }

    /// Render for diagnostics; sub-expressions of binaries are
    /// parenthesized the way the grammar requires them written.
    pub fn display<'a>(&'a self, idmap: &'a IdMap) -> ExprDisplay<'a> {
        ExprDisplay { expr: self, idmap }
    }
}

pub struct ExprDisplay<'a> {
    expr: &'a Expr,
    idmap: &'a IdMap,
}

impl ExprDisplay<'_> {
    fn fmt_inner(&self, f: &mut fmt::Formatter<'_>, e: &Expr, parens: bool) -> fmt::Result {
        match &e.kind {
            ExprKind::IntLit(v) => write!(f, "{}", v),
            ExprKind::BoolLit(v) => write!(f, "{}", v),
            ExprKind::StatusLit(s) => write!(f, "\"{}\"", s),
            ExprKind::Ident(id) => write!(f, "{}", self.idmap.str(*id)),
            ExprKind::Field { obj, field } => {
                self.fmt_inner(f, obj, true)?;
                write!(f, ".{}", self.idmap.str(*field))
            }
            ExprKind::Index { obj, index } => {
                self.fmt_inner(f, obj, true)?;
                write!(f, "[")?;
                self.fmt_inner(f, index, false)?;
                write!(f, "]")
            }
            ExprKind::Call {
                recv,
                name,
                args,
                effect,
                ..
            } => {
                if let Some(r) = recv {
                    self.fmt_inner(f, r, true)?;
                    write!(f, ".")?;
                }
                write!(f, "{}{}(", self.idmap.str(*name), effect.suffix())?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: ", self.idmap.str(a.name))?;
                    self.fmt_inner(f, &a.value, false)?;
                }
                write!(f, ")")
            }
            ExprKind::Binary { op, lhs, rhs } => {
                if parens {
                    write!(f, "(")?;
                }
                self.fmt_inner(f, lhs, true)?;
                write!(f, " {} ", self.idmap.str(*op))?;
                self.fmt_inner(f, rhs, true)?;
                if parens {
                    write!(f, ")")?;
                }
                Ok(())
            }
            ExprKind::Unary { op, operand } => {
                if op.is(Bid::Not) {
                    write!(f, "not ")?;
                } else {
                    write!(f, "{}", self.idmap.str(*op))?;
                }
                self.fmt_inner(f, operand, true)
            }
            ExprKind::As { operand, ty } => {
                self.fmt_inner(f, operand, true)?;
                write!(f, " as {}", ty.display(self.idmap))
            }
        }
    }
}

impl fmt::Display for ExprDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_inner(f, self.expr, false)
    }
}

/// A refinement bracket `[lo .. hi]` / `[lo ..= hi]`; either bound may be
/// absent (the base's natural bound applies).
#[derive(Debug, Clone, PartialEq)]
pub struct Refinement {
    pub lo: Option<Expr>,
    pub hi: Option<Expr>,
    /// True for `..=` (the upper bound is inclusive).
    pub inclusive: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeExprKind {
    /// `base.u32` etc., optionally refined.
    Numeric {
        base_name: Id,
        refinement: Option<Refinement>,
    },
    Bool,
    Status,
    /// `[N] T`.
    Array { len: Box<Expr>, elem: Box<TypeExpr> },
    /// `slice T`.
    Slice(Box<TypeExpr>),
    /// `table T`.
    Table(Box<TypeExpr>),
    /// `ptr T`.
    Ptr(Box<TypeExpr>),
    /// `nptr T`.
    Nptr(Box<TypeExpr>),
    /// A named struct type: `foo` or `base.io_reader` or `pkg.foo`.
    Named(QQId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeExpr {
    pub kind: TypeExprKind,
    pub span: Span,
}

impl TypeExpr {
    pub fn new(kind: TypeExprKind, span: Span) -> Self {
        TypeExpr { kind, span }
    }

    pub fn display<'a>(&'a self, idmap: &'a IdMap) -> TypeExprDisplay<'a> {
        TypeExprDisplay { ty: self, idmap }
    }
}

pub struct TypeExprDisplay<'a> {
    ty: &'a TypeExpr,
    idmap: &'a IdMap,
}

impl fmt::Display for TypeExprDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ty.kind {
            TypeExprKind::Numeric { base_name, .. } => {
                write!(f, "base.{}", self.idmap.str(*base_name))
            }
            TypeExprKind::Bool => write!(f, "base.bool"),
            TypeExprKind::Status => write!(f, "base.status"),
            TypeExprKind::Array { elem, .. } => {
                write!(f, "[..] {}", elem.display(self.idmap))
            }
            TypeExprKind::Slice(t) => write!(f, "slice {}", t.display(self.idmap)),
            TypeExprKind::Table(t) => write!(f, "table {}", t.display(self.idmap)),
            TypeExprKind::Ptr(t) => write!(f, "ptr {}", t.display(self.idmap)),
            TypeExprKind::Nptr(t) => write!(f, "nptr {}", t.display(self.idmap)),
            TypeExprKind::Named(q) => write!(f, "{}", self.idmap.str(q.leaf)),
        }
    }
}

/// A `via` rule invocation attached to an assertion.
#[derive(Debug, Clone, PartialEq)]
pub struct ViaRule {
    /// The rule's name string, e.g. `"a < b: a < c; c <= b"`.
    pub name: String,
    /// Named rule parameters, e.g. `(c: s.length())`.
    pub args: Vec<Arg>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssertStmt {
    pub cond: Expr,
    pub via: Option<ViaRule>,
    pub span: Span,
}

/// Which loop annotation a condition belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAssertKind {
    Pre,
    Inv,
    Post,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoopAssert {
    pub kind: LoopAssertKind,
    pub cond: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfStmt {
    pub cond: Expr,
    pub then_block: Vec<Stmt>,
    pub else_branch: Option<ElseBranch>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElseBranch {
    If(Box<IfStmt>),
    Block(Vec<Stmt>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhileStmt {
    pub label: Option<Id>,
    pub cond: Expr,
    pub asserts: Vec<LoopAssert>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

impl WhileStmt {
    pub fn conds(&self, kind: LoopAssertKind) -> impl Iterator<Item = &Expr> {
        self.asserts
            .iter()
            .filter(move |a| a.kind == kind)
            .map(|a| &a.cond)
    }
}

/// One stanza of an `iterate` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct IteratePart {
    /// Elements visible to the body per iteration.
    pub length: u64,
    /// Elements consumed per iteration.
    pub advance: u64,
    /// Bodies emitted per loop trip.
    pub unroll: u64,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IterateStmt {
    /// Iteration variables, each bound to a slice expression.
    pub vars: Vec<(Id, Expr)>,
    /// Stanzas in declared order; lengths strictly decrease.
    pub parts: Vec<IteratePart>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChooseStmt {
    /// The method slot being chosen.
    pub field: Id,
    /// Candidate function names in declaration order.
    pub candidates: Vec<Id>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Var {
        name: Id,
        ty: TypeExpr,
        init: Option<Expr>,
        span: Span,
    },
    /// `lhs op rhs` where op is `=` or a compound/tilde assignment.
    Assign {
        op: Id,
        lhs: Expr,
        rhs: Expr,
        span: Span,
    },
    Assert(AssertStmt),
    If(IfStmt),
    While(WhileStmt),
    Break {
        label: Option<Id>,
        span: Span,
    },
    Continue {
        label: Option<Id>,
        span: Span,
    },
    Return {
        value: Option<Expr>,
        span: Span,
    },
    /// `yield? "$…"`: suspend with the given status.
    Yield {
        status: Expr,
        span: Span,
    },
    Iterate(IterateStmt),
    Choose(ChooseStmt),
    /// A call in statement position (the only expression statement).
    CallStmt {
        call: Expr,
        span: Span,
    },
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Var { span, .. }
            | Stmt::Assign { span, .. }
            | Stmt::Break { span, .. }
            | Stmt::Continue { span, .. }
            | Stmt::Return { span, .. }
            | Stmt::Yield { span, .. }
            | Stmt::CallStmt { span, .. } => *span,
            Stmt::Assert(a) => a.span,
            Stmt::If(i) => i.span,
            Stmt::While(w) => w.span,
            Stmt::Iterate(i) => i.span,
            Stmt::Choose(c) => c.span,
        }
    }
}

/// A typed name: struct field or function argument.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: Id,
    pub ty: TypeExpr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncDef {
    pub public: bool,
    /// Receiver struct name for methods.
    pub receiver: Option<Id>,
    pub name: Id,
    pub effect: FuncEffect,
    pub args: Vec<Field>,
    pub ret: Option<TypeExpr>,
    pub pre: Vec<Expr>,
    pub post: Vec<Expr>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

impl FuncDef {
    pub fn qqid(&self, package: Id) -> QQId {
        QQId {
            package,
            receiver: self.receiver.unwrap_or_else(|| Bid::Base.into()),
            leaf: self.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
    pub public: bool,
    pub name: Id,
    /// `?` on the struct: it holds coroutine state.
    pub suspendible: bool,
    pub fields: Vec<Field>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusDef {
    pub public: bool,
    /// Message including the kind prefix character.
    pub message: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstDef {
    pub public: bool,
    pub name: Id,
    pub ty: TypeExpr,
    pub value: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UseDecl {
    /// The quoted package path, e.g. `"std/crc32"`.
    pub path: String,
    pub span: Span,
}

/// One parsed source file set (a package).
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub path: PathBuf,
    /// Package name id (from the driver, usually the directory name).
    pub package: Id,
    pub uses: Vec<UseDecl>,
    pub statuses: Vec<StatusDef>,
    pub consts: Vec<ConstDef>,
    pub structs: Vec<StructDef>,
    pub funcs: Vec<FuncDef>,
}

impl Module {
    pub fn new(path: PathBuf, package: Id) -> Self {
        Module {
            path,
            package,
            uses: Vec::new(),
            statuses: Vec::new(),
            consts: Vec::new(),
            structs: Vec::new(),
            funcs: Vec::new(),
        }
    }

    pub fn find_struct(&self, name: Id) -> Option<&StructDef> {
        self.structs.iter().find(|s| s.name == name)
    }

    pub fn find_func(&self, receiver: Option<Id>, name: Id) -> Option<&FuncDef> {
        self.funcs
            .iter()
            .find(|f| f.receiver == receiver && f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::IdMap;

    fn ident(idmap: &mut IdMap, name: &str) -> Expr {
        let id = idmap.intern(name);
        Expr::new(ExprKind::Ident(id), Span::default())
    }

    fn binary(op: Bid, lhs: Expr, rhs: Expr) -> Expr {
        Expr::new(
            ExprKind::Binary {
                op: op.into(),
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            Span::default(),
        )
    }

    fn int(v: i128) -> Expr {
        Expr::new(ExprKind::IntLit(v), Span::default())
    }

    #[test]
    fn test_structural_equality_ignores_spans() {
        let mut idmap = IdMap::new();
        let a = binary(Bid::Lt, ident(&mut idmap, "x"), int(10));
        let mut b = binary(Bid::Lt, ident(&mut idmap, "x"), int(10));
        b.span = Span::new(99, 3);
        assert!(a.same(&b));
    }

    #[test]
    fn test_structural_inequality() {
        let mut idmap = IdMap::new();
        let a = binary(Bid::Lt, ident(&mut idmap, "x"), int(10));
        let b = binary(Bid::Lt, ident(&mut idmap, "x"), int(11));
        let c = binary(Bid::LtEq, ident(&mut idmap, "x"), int(10));
        assert!(!a.same(&b));
        assert!(!a.same(&c));
    }

    #[test]
    fn test_mentions() {
        let mut idmap = IdMap::new();
        let x = idmap.intern("x");
        let y = idmap.intern("y");
        let e = binary(Bid::Plus, ident(&mut idmap, "x"), int(1));
        assert!(e.mentions(x));
        assert!(!e.mentions(y));
    }

    #[test]
    fn test_display_parenthesizes_nested_binaries() {
        let mut idmap = IdMap::new();
        let inner = binary(Bid::Plus, ident(&mut idmap, "x"), int(1));
        let outer = binary(Bid::Lt, inner, ident(&mut idmap, "y"));
        assert_eq!(format!("{}", outer.display(&idmap)), "(x + 1) < y");
    }

    #[test]
    fn test_purity() {
        let mut idmap = IdMap::new();
        let pure_call = Expr::new(
            ExprKind::Call {
                recv: Some(Box::new(ident(&mut idmap, "s"))),
                name: Bid::Length.into(),
                args: vec![],
                effect: FuncEffect::Pure,
                resolved: None,
            },
            Span::default(),
        );
        assert!(pure_call.is_pure());
        assert!(pure_call.mentions_non_local());

        let coro_call = Expr::new(
            ExprKind::Call {
                recv: Some(Box::new(ident(&mut idmap, "src"))),
                name: Bid::ReadU8.into(),
                args: vec![],
                effect: FuncEffect::Coroutine,
                resolved: None,
            },
            Span::default(),
        );
        assert!(!coro_call.is_pure());
    }
}
