//! The fact engine
//!
//! An ordered, duplicate-free set of boolean expressions known to hold at a
//! program point. Facts are stored in canonical form and compared
//! structurally; the engine is deliberately syntactic. Order is preserved
//! for deterministic diagnostics and emission.

use crate::ast::{Expr, ExprKind};
use crate::token::{bid_of, Bid, Id, IdMap};

/// Comparison shape of a canonical fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    LtEq,
    Eq,
    NotEq,
}

/// Rewrite an expression into canonical form: commutative operands sorted,
/// `>` / `>=` flipped into `<` / `<=`. Spans of rebuilt nodes are kept from
/// the original; resolution state is preserved.
pub fn canonicalize(e: &Expr) -> Expr {
    let mut out = e.clone();
    canonicalize_in_place(&mut out);
    out
}

fn canonicalize_in_place(e: &mut Expr) {
    match &mut e.kind {
        ExprKind::Binary { op, lhs, rhs } => {
            canonicalize_in_place(lhs);
            canonicalize_in_place(rhs);
            match bid_of(*op) {
                Some(Bid::Gt) => {
                    *op = Bid::Lt.into();
                    std::mem::swap(lhs, rhs);
                }
                Some(Bid::GtEq) => {
                    *op = Bid::LtEq.into();
                    std::mem::swap(lhs, rhs);
                }
                Some(
                    Bid::Plus
                    | Bid::Star
                    | Bid::Amp
                    | Bid::Pipe
                    | Bid::Caret
                    | Bid::EqEq
                    | Bid::NotEq
                    | Bid::And
                    | Bid::Or,
                ) => {
                    if lhs.cmp_structure(rhs) == std::cmp::Ordering::Greater {
                        std::mem::swap(lhs, rhs);
                    }
                }
                _ => {}
            }
        }
        ExprKind::Unary { operand, .. } => canonicalize_in_place(operand),
        ExprKind::Index { obj, index } => {
            canonicalize_in_place(obj);
            canonicalize_in_place(index);
        }
        ExprKind::Field { obj, .. } => canonicalize_in_place(obj),
        ExprKind::Call { recv, args, .. } => {
            if let Some(r) = recv {
                canonicalize_in_place(r);
            }
            for a in args {
                canonicalize_in_place(&mut a.value);
            }
        }
        ExprKind::As { operand, .. } => canonicalize_in_place(operand),
        _ => {}
    }
}

/// Canonical negation: comparisons flip, `not` cancels, everything else is
/// wrapped in `not`.
pub fn negate(e: &Expr) -> Expr {
    let c = canonicalize(e);
    match &c.kind {
        ExprKind::BoolLit(b) => Expr {
            kind: ExprKind::BoolLit(!b),
            ..c.clone()
        },
        ExprKind::Unary { op, operand } if op.is(Bid::Not) => (**operand).clone(),
        ExprKind::Binary { op, lhs, rhs } => match bid_of(*op) {
            Some(Bid::Lt) => rebuild_cmp(Bid::LtEq, rhs, lhs, &c),
            Some(Bid::LtEq) => rebuild_cmp(Bid::Lt, rhs, lhs, &c),
            Some(Bid::EqEq) => rebuild_cmp(Bid::NotEq, lhs, rhs, &c),
            Some(Bid::NotEq) => rebuild_cmp(Bid::EqEq, lhs, rhs, &c),
            _ => wrap_not(c),
        },
        _ => wrap_not(c),
    }
}

fn rebuild_cmp(op: Bid, lhs: &Expr, rhs: &Expr, template: &Expr) -> Expr {
    canonicalize(&Expr {
        kind: ExprKind::Binary {
            op: op.into(),
            lhs: Box::new(lhs.clone()),
            rhs: Box::new(rhs.clone()),
        },
        span: template.span,
        mtype: template.mtype.clone(),
        cval: None,
    })
}

fn wrap_not(c: Expr) -> Expr {
    let span = c.span;
    let mtype = c.mtype.clone();
    Expr {
        kind: ExprKind::Unary {
            op: Bid::Not.into(),
            operand: Box::new(c),
        },
        span,
        mtype,
        cval: None,
    }
}

/// Rebuild a shifted comparison fact: the constant side takes the new
/// value, the other side is kept as-is.
fn rebuild_shifted(f: &Expr, const_on_rhs: bool, k2: i128) -> Expr {
    let ExprKind::Binary { op, lhs, rhs } = &f.kind else {
        return f.clone();
    };
    let mut lit = Expr::new(ExprKind::IntLit(k2), f.span);
    lit.cval = Some(crate::ast::ConstValue::Int(k2));
    let (new_lhs, new_rhs) = if const_on_rhs {
        ((**lhs).clone(), lit)
    } else {
        (lit, (**rhs).clone())
    };
    Expr {
        kind: ExprKind::Binary {
            op: *op,
            lhs: Box::new(new_lhs),
            rhs: Box::new(new_rhs),
        },
        span: f.span,
        mtype: f.mtype.clone(),
        cval: None,
    }
}

/// Split an `and` chain into its conjuncts, in source order.
pub fn conjuncts(e: &Expr) -> Vec<&Expr> {
    let mut out = Vec::new();
    collect_conjuncts(e, &mut out);
    out
}

fn collect_conjuncts<'a>(e: &'a Expr, out: &mut Vec<&'a Expr>) {
    match &e.kind {
        ExprKind::Binary { op, lhs, rhs } if op.is(Bid::And) => {
            collect_conjuncts(lhs, out);
            collect_conjuncts(rhs, out);
        }
        _ => out.push(e),
    }
}

/// View a canonical fact as a comparison, if it is one.
pub fn as_cmp(e: &Expr) -> Option<(CmpOp, &Expr, &Expr)> {
    let ExprKind::Binary { op, lhs, rhs } = &e.kind else {
        return None;
    };
    let cmp = match bid_of(*op)? {
        Bid::Lt => CmpOp::Lt,
        Bid::LtEq => CmpOp::LtEq,
        Bid::EqEq => CmpOp::Eq,
        Bid::NotEq => CmpOp::NotEq,
        _ => return None,
    };
    Some((cmp, lhs, rhs))
}

/// The ordered fact set.
#[derive(Debug, Clone, Default)]
pub struct FactSet {
    facts: Vec<Expr>,
}

impl FactSet {
    pub fn new() -> Self {
        FactSet { facts: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Expr> {
        self.facts.iter()
    }

    /// Insert a fact, canonicalizing first. No-op if already present.
    pub fn add(&mut self, e: &Expr) {
        let c = canonicalize(e);
        if !self.facts.iter().any(|f| f.same(&c)) {
            self.facts.push(c);
        }
    }

    /// True iff the canonical form of `e` is present.
    pub fn ask(&self, e: &Expr) -> bool {
        let c = canonicalize(e);
        self.facts.iter().any(|f| f.same(&c))
    }

    /// Remove every fact that mentions the variable `v`.
    pub fn drop_touching(&mut self, v: Id) {
        self.facts.retain(|f| !f.mentions(v));
    }

    /// Remove every fact that reads non-local state (field accesses and
    /// calls). Applied when an impure call returns: anything the callee can
    /// see may have changed.
    pub fn drop_non_local(&mut self) {
        self.facts.retain(|f| !f.mentions_non_local());
    }

    /// Remove every fact containing a subscript read. Applied when an
    /// element is stored through a slice or array; length facts survive.
    pub fn drop_element_reads(&mut self) {
        fn has_index(e: &Expr) -> bool {
            match &e.kind {
                ExprKind::Index { .. } => true,
                ExprKind::Binary { lhs, rhs, .. } => has_index(lhs) || has_index(rhs),
                ExprKind::Unary { operand, .. } => has_index(operand),
                ExprKind::Field { obj, .. } => has_index(obj),
                ExprKind::Call { recv, args, .. } => {
                    recv.as_ref().is_some_and(|r| has_index(r))
                        || args.iter().any(|a| has_index(&a.value))
                }
                ExprKind::As { operand, .. } => has_index(operand),
                _ => false,
            }
        }
        self.facts.retain(|f| !has_index(f));
    }

    /// Rewrite facts for an exact update `v = v + delta` (the checker has
    /// already proven the arithmetic does not wrap). A comparison between
    /// `v` and a constant shifts by `delta`; any other fact mentioning `v`
    /// is dropped.
    pub fn shift_var(&mut self, v: Id, delta: i128) {
        let mut kept = Vec::with_capacity(self.facts.len());
        'facts: for f in self.facts.drain(..) {
            if !f.mentions(v) {
                kept.push(f);
                continue;
            }
            if let ExprKind::Binary { op, lhs, rhs } = &f.kind {
                if matches!(bid_of(*op), Some(Bid::Lt | Bid::LtEq | Bid::EqEq)) {
                    let shifted: Option<Expr> = match (&lhs.kind, &rhs.kind) {
                        (ExprKind::Ident(x), ExprKind::IntLit(k)) if *x == v => k
                            .checked_add(delta)
                            .map(|k2| rebuild_shifted(&f, true, k2)),
                        (ExprKind::IntLit(k), ExprKind::Ident(x)) if *x == v => k
                            .checked_add(delta)
                            .map(|k2| rebuild_shifted(&f, false, k2)),
                        _ => None,
                    };
                    if let Some(new_fact) = shifted {
                        kept.push(canonicalize(&new_fact));
                        continue 'facts;
                    }
                }
            }
            // Dropped: the fact mentions v in a shape we cannot shift.
        }
        self.facts = kept;
        self.dedupe();
    }

    fn dedupe(&mut self) {
        let mut seen: Vec<Expr> = Vec::with_capacity(self.facts.len());
        for f in self.facts.drain(..) {
            if !seen.iter().any(|g| g.same(&f)) {
                seen.push(f);
            }
        }
        self.facts = seen;
    }

    /// Keep only facts present in both sets (merge point of two paths).
    pub fn intersect(&mut self, other: &FactSet) {
        self.facts.retain(|f| other.facts.iter().any(|g| g.same(f)));
    }

    /// Discard everything and reseed.
    pub fn reset<I>(&mut self, seed: I)
    where
        I: IntoIterator<Item = Expr>,
    {
        self.facts.clear();
        for e in seed {
            self.add(&e);
        }
    }

    /// Render the set for diagnostics: `facts: a, b, c` or `facts: (none)`.
    pub fn dump(&self, idmap: &IdMap) -> String {
        if self.facts.is_empty() {
            return "facts: (none)".to_string();
        }
        let rendered: Vec<String> = self
            .facts
            .iter()
            .map(|f| format!("{}", f.display(idmap)))
            .collect();
        format!("facts: {}", rendered.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Span;
    use crate::token::IdMap;

    fn ident(idmap: &mut IdMap, name: &str) -> Expr {
        Expr::new(ExprKind::Ident(idmap.intern(name)), Span::default())
    }

    fn int(v: i128) -> Expr {
        Expr::new(ExprKind::IntLit(v), Span::default())
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

    #[test]
    fn test_gt_canonicalizes_to_lt() {
        let mut idmap = IdMap::new();
        let gt = binary(Bid::Gt, int(10), ident(&mut idmap, "x"));
        let lt = binary(Bid::Lt, ident(&mut idmap, "x"), int(10));
        assert!(canonicalize(&gt).same(&canonicalize(&lt)));
    }

    #[test]
    fn test_commutative_operands_sorted() {
        let mut idmap = IdMap::new();
        let a = binary(Bid::Plus, ident(&mut idmap, "x"), int(1));
        let b = binary(Bid::Plus, int(1), ident(&mut idmap, "x"));
        assert!(canonicalize(&a).same(&canonicalize(&b)));
    }

    #[test]
    fn test_negate_comparisons() {
        let mut idmap = IdMap::new();
        let lt = binary(Bid::Lt, ident(&mut idmap, "x"), int(10));
        // not (x < 10) == 10 <= x
        let expected = binary(Bid::LtEq, int(10), ident(&mut idmap, "x"));
        assert!(negate(&lt).same(&canonicalize(&expected)));
        // Double negation restores the original.
        assert!(negate(&negate(&lt)).same(&canonicalize(&lt)));
    }

    #[test]
    fn test_add_dedupes() {
        let mut idmap = IdMap::new();
        let mut facts = FactSet::new();
        facts.add(&binary(Bid::Lt, ident(&mut idmap, "x"), int(10)));
        facts.add(&binary(Bid::Gt, int(10), ident(&mut idmap, "x")));
        assert_eq!(facts.len(), 1);
    }

    #[test]
    fn test_ask_matches_canonical_form() {
        let mut idmap = IdMap::new();
        let mut facts = FactSet::new();
        facts.add(&binary(Bid::Lt, ident(&mut idmap, "x"), int(10)));
        assert!(facts.ask(&binary(Bid::Gt, int(10), ident(&mut idmap, "x"))));
        assert!(!facts.ask(&binary(Bid::Lt, ident(&mut idmap, "x"), int(11))));
    }

    #[test]
    fn test_drop_touching() {
        let mut idmap = IdMap::new();
        let x = idmap.intern("x");
        let mut facts = FactSet::new();
        facts.add(&binary(Bid::Lt, ident(&mut idmap, "x"), int(10)));
        facts.add(&binary(Bid::Lt, ident(&mut idmap, "y"), int(20)));
        facts.drop_touching(x);
        assert_eq!(facts.len(), 1);
        assert!(facts.ask(&binary(Bid::Lt, ident(&mut idmap, "y"), int(20))));
    }

    #[test]
    fn test_intersect() {
        let mut idmap = IdMap::new();
        let f1 = binary(Bid::Lt, ident(&mut idmap, "x"), int(10));
        let f2 = binary(Bid::Lt, ident(&mut idmap, "y"), int(20));
        let f3 = binary(Bid::LtEq, int(0), ident(&mut idmap, "x"));
        let mut a = FactSet::new();
        a.add(&f1);
        a.add(&f2);
        let mut b = FactSet::new();
        b.add(&f2);
        b.add(&f3);
        a.intersect(&b);
        assert_eq!(a.len(), 1);
        assert!(a.ask(&f2));
    }

    #[test]
    fn test_reset() {
        let mut idmap = IdMap::new();
        let f1 = binary(Bid::Lt, ident(&mut idmap, "x"), int(10));
        let f2 = binary(Bid::Lt, ident(&mut idmap, "y"), int(20));
        let mut facts = FactSet::new();
        facts.add(&f1);
        facts.reset([f2.clone()]);
        assert_eq!(facts.len(), 1);
        assert!(facts.ask(&f2));
        assert!(!facts.ask(&f1));
    }

    #[test]
    fn test_shift_var() {
        let mut idmap = IdMap::new();
        let x = idmap.intern("x");
        let mut facts = FactSet::new();
        facts.add(&binary(Bid::LtEq, ident(&mut idmap, "x"), int(10)));
        facts.add(&binary(Bid::Lt, ident(&mut idmap, "x"), int(10)));
        // A fact with x in an unshiftable shape is dropped.
        facts.add(&binary(
            Bid::Lt,
            binary(Bid::Plus, ident(&mut idmap, "x"), int(1)),
            int(50),
        ));
        facts.shift_var(x, 1);
        assert_eq!(facts.len(), 2);
        assert!(facts.ask(&binary(Bid::LtEq, ident(&mut idmap, "x"), int(11))));
        assert!(facts.ask(&binary(Bid::Lt, ident(&mut idmap, "x"), int(11))));
    }

    #[test]
    fn test_conjuncts() {
        let mut idmap = IdMap::new();
        let a = binary(Bid::Lt, ident(&mut idmap, "x"), int(10));
        let b = binary(Bid::LtEq, int(0), ident(&mut idmap, "x"));
        let both = binary(Bid::And, a.clone(), b.clone());
        let parts = conjuncts(&both);
        assert_eq!(parts.len(), 2);
    }

    #[test]
    fn test_dump() {
        let mut idmap = IdMap::new();
        let mut facts = FactSet::new();
        assert_eq!(facts.dump(&idmap), "facts: (none)");
        facts.add(&binary(Bid::Lt, ident(&mut idmap, "x"), int(10)));
        assert_eq!(facts.dump(&idmap), "facts: x < 10");
    }
}
