//! Expression lowering
//!
//! Pure and impure expressions render to C text strings. Arithmetic the
//! checker proved non-overflowing is emitted as ordinary C operators (cast
//! back to the result base, which is exact for proven-in-range values);
//! subscripts the checker discharged are raw pointer arithmetic with no
//! runtime test. Coroutine calls never reach this module; they are lowered
//! statement-wise in `funcs.rs`.

use crate::ast::{ConstValue, Expr, ExprKind};
use crate::token::{bid_of, Bid, Id};
use crate::types::{MType, NumBase};

use super::error::CodeGenError;
use super::state::CGen;

impl CGen<'_> {
    pub(super) fn emit_expr(&mut self, e: &Expr) -> Result<String, CodeGenError> {
        // Constants fold to literals regardless of shape.
        if let Some(cv) = e.cval {
            if let Some(base) = e.mtype.as_ref().and_then(|t| t.num_base()) {
                if let ConstValue::Int(v) = cv {
                    return Ok(int_literal(v, base));
                }
            }
            if let ConstValue::Bool(b) = cv {
                return Ok(if b { "true" } else { "false" }.to_string());
            }
        }
        match &e.kind {
            ExprKind::IntLit(v) => {
                let base = e
                    .mtype
                    .as_ref()
                    .and_then(|t| t.num_base())
                    .unwrap_or(NumBase::I64);
                Ok(int_literal(*v, base))
            }
            ExprKind::BoolLit(b) => Ok(if *b { "true" } else { "false" }.to_string()),
            ExprKind::StatusLit(msg) => self.status_symbol(msg),
            ExprKind::Ident(id) => self.emit_ident(*id),
            ExprKind::Field { obj, field } => self.emit_field(obj, *field),
            ExprKind::Index { obj, index } => {
                let obj_ty = obj
                    .mtype
                    .clone()
                    .ok_or_else(|| CodeGenError::Internal("untyped subscript base".into()))?;
                let obj_c = self.emit_expr(obj)?;
                let idx_c = self.emit_expr(index)?;
                match obj_ty {
                    MType::Slice(_) => Ok(format!("{}.ptr[{}]", obj_c, idx_c)),
                    MType::Array { .. } => Ok(format!("{}[{}]", obj_c, idx_c)),
                    _ => Err(CodeGenError::Internal(
                        "subscript on a non-indexable value".into(),
                    )),
                }
            }
            ExprKind::Binary { op, lhs, rhs } => self.emit_binary(*op, lhs, rhs, e),
            ExprKind::Unary { op, operand } => {
                let inner = self.emit_expr(operand)?;
                if op.is(Bid::Not) {
                    Ok(format!("(!({}))", inner))
                } else {
                    let base = e
                        .mtype
                        .as_ref()
                        .and_then(|t| t.num_base())
                        .ok_or_else(|| {
                            CodeGenError::Internal("untyped unary minus".into())
                        })?;
                    Ok(format!("(({})(-({})))", base.c_name(), inner))
                }
            }
            ExprKind::As { operand, .. } => {
                let inner = self.emit_expr(operand)?;
                let ty = e
                    .mtype
                    .as_ref()
                    .ok_or_else(|| CodeGenError::Internal("untyped cast".into()))?;
                Ok(format!("(({})({}))", self.c_type(ty)?, inner))
            }
            ExprKind::Call { .. } => self.emit_call_expr(e),
        }
    }

    fn emit_ident(&mut self, id: Id) -> Result<String, CodeGenError> {
        if id.is(Bid::This) {
            return Ok("self".to_string());
        }
        let ctx = self
            .cur
            .as_ref()
            .ok_or_else(|| CodeGenError::Internal("identifier outside a function".into()))?;
        if ctx.iter_vars.contains(&id) {
            return Ok(format!("i_{}", self.str_of(id)));
        }
        if ctx.args.contains(&id) {
            return Ok(format!("a_{}", self.str_of(id)));
        }
        if ctx.locals.contains(&id) {
            if ctx.coroutine {
                return Ok(format!(
                    "self->private_data.s_{}.v_{}",
                    self.str_of(ctx.name),
                    self.str_of(id)
                ));
            }
            return Ok(format!("v_{}", self.str_of(id)));
        }
        if self.globals.consts.contains_key(&id) {
            return Ok(self.const_macro(id));
        }
        Err(CodeGenError::Internal(format!(
            "unresolved identifier '{}'",
            self.str_of(id)
        )))
    }

    pub(super) fn const_macro(&self, id: Id) -> String {
        format!(
            "SIFT_{}__{}",
            self.pkg.to_ascii_uppercase(),
            self.str_of(id).to_ascii_uppercase()
        )
    }

    fn emit_field(&mut self, obj: &Expr, field: Id) -> Result<String, CodeGenError> {
        let MType::Struct(q) = obj
            .mtype
            .as_ref()
            .ok_or_else(|| CodeGenError::Internal("untyped field base".into()))?
        else {
            return Err(CodeGenError::Internal("field access on non-struct".into()));
        };
        let in_data = self
            .globals
            .structs
            .get(&q.leaf)
            .and_then(|info| info.field_type(field))
            .map(field_lives_in_private_data)
            .unwrap_or(false);
        let region = if in_data { "private_data" } else { "private_impl" };
        let obj_c = self.emit_expr(obj)?;
        if obj_c == "self" {
            Ok(format!("self->{}.f_{}", region, self.str_of(field)))
        } else {
            Ok(format!("{}.{}.f_{}", obj_c, region, self.str_of(field)))
        }
    }

    fn emit_binary(
        &mut self,
        op: Id,
        lhs: &Expr,
        rhs: &Expr,
        e: &Expr,
    ) -> Result<String, CodeGenError> {
        let l = self.emit_expr(lhs)?;
        let r = self.emit_expr(rhs)?;
        let bid = bid_of(op)
            .ok_or_else(|| CodeGenError::Internal("bad operator id".into()))?;
        let result_base = || -> Result<NumBase, CodeGenError> {
            e.mtype.as_ref().and_then(|t| t.num_base()).ok_or_else(|| {
                CodeGenError::Internal("arithmetic without a numeric type".into())
            })
        };
        Ok(match bid {
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
                // Proven non-overflowing: plain C operators, cast back to
                // the result base (exact for in-range values).
                let base = result_base()?;
                format!("(({})({} {} {}))", base.c_name(), l, c_op(bid), r)
            }
            Bid::TildeModPlus | Bid::TildeModMinus => {
                let base = result_base()?;
                let op = if bid == Bid::TildeModPlus { "+" } else { "-" };
                format!("(({})({} {} {}))", base.c_name(), l, op, r)
            }
            Bid::TildeSatPlus | Bid::TildeSatMinus => {
                let base = result_base()?;
                let helper = if bid == Bid::TildeSatPlus {
                    "sat_add"
                } else {
                    "sat_sub"
                };
                format!(
                    "sift_base__{}__{}({}, {})",
                    base.name(),
                    helper,
                    l,
                    r
                )
            }
            Bid::EqEq => format!("({} == {})", l, r),
            Bid::NotEq => format!("({} != {})", l, r),
            Bid::Lt => format!("({} < {})", l, r),
            Bid::LtEq => format!("({} <= {})", l, r),
            Bid::Gt => format!("({} > {})", l, r),
            Bid::GtEq => format!("({} >= {})", l, r),
            Bid::And => format!("({} && {})", l, r),
            Bid::Or => format!("({} || {})", l, r),
            _ => {
                return Err(CodeGenError::Internal(format!(
                    "unhandled binary operator '{}'",
                    self.str_of(op)
                )));
            }
        })
    }

    /// Pure or impure calls in expression position: built-in accessors and
    /// user functions.
    fn emit_call_expr(&mut self, e: &Expr) -> Result<String, CodeGenError> {
        let ExprKind::Call {
            recv,
            name,
            args,
            resolved,
            ..
        } = &e.kind
        else {
            return Err(CodeGenError::Internal("emit_call_expr on non-call".into()));
        };
        // Built-in accessors.
        if let Some(r) = recv.as_deref() {
            if let Some(recv_ty) = r.mtype.clone() {
                match (bid_of(*name), &recv_ty) {
                    (Some(Bid::Length), MType::Slice(_)) => {
                        let obj = self.emit_expr(r)?;
                        return Ok(format!("((uint64_t)({}.len))", obj));
                    }
                    (Some(Bid::Length), MType::Array { len, .. }) => {
                        let len = *len;
                        return Ok(format!("((uint64_t){})", len));
                    }
                    (Some(Bid::Available), _) if recv_ty.is_io_reader() => {
                        return self.io_available(r, true);
                    }
                    (Some(Bid::Available), _) if recv_ty.is_io_writer() => {
                        return self.io_available(r, false);
                    }
                    (Some(Bid::PeekU8), _) if recv_ty.is_io_reader() => {
                        return self.io_peek(r);
                    }
                    (Some(Bid::SinceMark), _) => {
                        return self.io_since_mark(r);
                    }
                    _ => {}
                }
            }
        }
        // User function call.
        let q = resolved.ok_or_else(|| {
            CodeGenError::Internal(format!(
                "unresolved call to '{}'",
                self.str_of(*name)
            ))
        })?;
        let pkg = if q.package == self.globals.package || q.package == Id::NONE {
            self.pkg.clone()
        } else {
            self.str_of(q.package).to_string()
        };
        let receiver = if q.receiver.is(Bid::Base) {
            None
        } else {
            Some(q.receiver)
        };
        let symbol = self.mangle(&pkg, receiver, q.leaf);
        let mut rendered = Vec::new();
        if receiver.is_some() {
            let r = recv.as_deref().ok_or_else(|| {
                CodeGenError::Internal("method call without a receiver".into())
            })?;
            let obj = self.emit_expr(r)?;
            rendered.push(if obj == "self" {
                obj
            } else {
                format!("&{}", obj)
            });
        }
        for arg in args {
            rendered.push(self.emit_expr(&arg.value)?);
        }
        Ok(format!("{}({})", symbol, rendered.join(", ")))
    }

    // ------------------------------------------------------------------
    // I/O accessors
    // ------------------------------------------------------------------

    /// The io pointer local names for an argument, when the current
    /// function materialized them (coroutines only).
    pub(super) fn io_locals(&self, r: &Expr) -> Option<String> {
        let ctx = self.cur.as_ref()?;
        if !ctx.coroutine {
            return None;
        }
        let ExprKind::Ident(id) = &r.kind else {
            return None;
        };
        let id = *id;
        if ctx.readers.contains(&id) || ctx.writers.contains(&id) {
            Some(format!("a_{}", self.str_of(id)))
        } else {
            None
        }
    }

    fn io_available(&mut self, r: &Expr, reader: bool) -> Result<String, CodeGenError> {
        if let Some(name) = self.io_locals(r) {
            return Ok(format!("((uint64_t)(io2_{} - iop_{}))", name, name));
        }
        let obj = self.emit_expr(r)?;
        Ok(format!(
            "sift_base__io_buffer__{}_available({})",
            if reader { "reader" } else { "writer" },
            obj
        ))
    }

    fn io_peek(&mut self, r: &Expr) -> Result<String, CodeGenError> {
        if let Some(name) = self.io_locals(r) {
            return Ok(format!("(*iop_{})", name));
        }
        let obj = self.emit_expr(r)?;
        Ok(format!("({}->data.ptr[{}->meta.ri])", obj, obj))
    }

    fn io_since_mark(&mut self, r: &Expr) -> Result<String, CodeGenError> {
        let name = self.io_locals(r).ok_or_else(|| {
            CodeGenError::Internal(
                "since_mark outside a coroutine with materialized I/O".into(),
            )
        })?;
        Ok(format!(
            "((sift_base__slice_u8){{.ptr = (uint8_t*)(io1_{}), .len = (size_t)(iop_{} - io1_{})}})",
            name, name, name
        ))
    }
}

fn field_lives_in_private_data(ty: &MType) -> bool {
    matches!(ty, MType::Array { .. } | MType::Struct(_))
}

fn c_op(bid: Bid) -> &'static str {
    match bid {
        Bid::Plus => "+",
        Bid::Minus => "-",
        Bid::Star => "*",
        Bid::SlashOp => "/",
        Bid::Percent => "%",
        Bid::Amp => "&",
        Bid::Pipe => "|",
        Bid::Caret => "^",
        Bid::Shl => "<<",
        Bid::Shr => ">>",
        _ => "?",
    }
}

pub(super) fn int_literal(v: i128, base: NumBase) -> String {
    match base {
        NumBase::U64 => format!("UINT64_C({})", v),
        NumBase::I64 => format!("INT64_C({})", v),
        NumBase::U8 | NumBase::U16 | NumBase::U32 => format!("{}u", v),
        NumBase::I8 | NumBase::I16 | NumBase::I32 => format!("{}", v),
    }
}
