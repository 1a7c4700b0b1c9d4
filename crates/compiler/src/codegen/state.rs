//! Generator state and core types
//!
//! The [`CGen`] struct owns the emission buffer and all per-run state. C
//! text is appended through small helpers so indentation stays consistent;
//! all iteration is in declaration order, so two runs over the same input
//! produce byte-identical output.

use crate::ast::{FuncDef, Stmt};
use crate::checker::CheckInfo;
use crate::resolver::{Globals, Resolver};
use crate::token::{Id, IdMap};
use crate::types::{MType, StatusKind};
use std::collections::HashSet;
use std::fmt::Write;

use super::error::CodeGenError;

/// Magic word stored by `initialize`; any other value in the magic slot
/// makes every method return `bad_receiver` (or the sticky error).
pub const MAGIC: u32 = 0x3CCB_6C71;

/// Magic word for a receiver disabled by a previous `?` error.
pub const DISABLED: u32 = 0x01DC_DCD1;

/// Per-function context while emitting a body.
pub(super) struct FuncCtx {
    /// `Some` for methods; the receiver struct name.
    pub receiver: Option<Id>,
    pub name: Id,
    /// True when the function is a coroutine: locals live in the receiver
    /// struct and suspension machinery is emitted.
    pub coroutine: bool,
    /// Argument names (rendered `a_<name>`).
    pub args: HashSet<Id>,
    /// Local names (rendered `v_<name>`, possibly behind `self->...`).
    pub locals: HashSet<Id>,
    /// io_reader arguments, in declaration order.
    pub readers: Vec<Id>,
    /// io_writer arguments, in declaration order.
    pub writers: Vec<Id>,
    /// Names bound by the enclosing `iterate` (rendered `i_<name>`, plain C
    /// block locals).
    pub iter_vars: HashSet<Id>,
}

pub struct CGen<'a> {
    pub(super) idmap: &'a IdMap,
    pub(super) globals: &'a Globals,
    #[allow(dead_code)] // consistency-checked against recounted points
    pub(super) info: &'a CheckInfo,
    /// Package name, lower case, as used in mangled symbols.
    pub(super) pkg: String,
    pub(super) out: String,
    pub(super) indent: usize,
    /// Suspension point counter for the function being emitted.
    pub(super) susp_point: u32,
    /// Status literals that have no declaration, in first-appearance order.
    pub(super) adhoc_statuses: Vec<String>,
    /// `(receiver, method)` pairs that appear as `choose` targets.
    pub(super) choosy: Vec<(Id, Id)>,
    pub(super) cur: Option<FuncCtx>,
}

impl<'a> CGen<'a> {
    pub fn new(
        idmap: &'a IdMap,
        globals: &'a Globals,
        info: &'a CheckInfo,
        pkg: &str,
    ) -> Self {
        CGen {
            idmap,
            globals,
            info,
            pkg: pkg.to_string(),
            out: String::new(),
            indent: 0,
            susp_point: 0,
            adhoc_statuses: Vec::new(),
            choosy: Vec::new(),
            cur: None,
        }
    }

    pub(super) fn resolver(&self) -> Resolver<'a> {
        Resolver::new(self.idmap, self.globals)
    }

    // ------------------------------------------------------------------
    // Buffer helpers
    // ------------------------------------------------------------------

    pub(super) fn line(&mut self, text: &str) -> Result<(), CodeGenError> {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
        writeln!(self.out, "{}", text)?;
        Ok(())
    }

    pub(super) fn raw(&mut self, text: &str) -> Result<(), CodeGenError> {
        write!(self.out, "{}", text)?;
        Ok(())
    }

    pub(super) fn blank(&mut self) -> Result<(), CodeGenError> {
        self.out.push('\n');
        Ok(())
    }

    pub(super) fn open(&mut self, text: &str) -> Result<(), CodeGenError> {
        self.line(text)?;
        self.indent += 1;
        Ok(())
    }

    pub(super) fn close(&mut self, text: &str) -> Result<(), CodeGenError> {
        if self.indent == 0 {
            return Err(CodeGenError::Internal(
                "unbalanced indentation in emission".to_string(),
            ));
        }
        self.indent -= 1;
        self.line(text)
    }

    // ------------------------------------------------------------------
    // Name mangling
    // ------------------------------------------------------------------

    pub(super) fn str_of(&self, id: Id) -> &str {
        self.idmap.str(id)
    }

    /// `sift_<pkg>__<receiver>__<leaf>` (receiver omitted for free
    /// functions).
    pub(super) fn mangle(&self, pkg: &str, receiver: Option<Id>, leaf: Id) -> String {
        match receiver {
            Some(r) => format!(
                "sift_{}__{}__{}",
                pkg,
                self.str_of(r),
                self.str_of(leaf)
            ),
            None => format!("sift_{}__{}", pkg, self.str_of(leaf)),
        }
    }

    pub(super) fn struct_c_name(&self, pkg: &str, name: Id) -> String {
        format!("sift_{}__{}", pkg, self.str_of(name))
    }

    /// The C symbol of a status message in this package, e.g.
    /// `sift_gif__error__bad_magic`.
    pub(super) fn status_symbol(&self, message: &str) -> Result<String, CodeGenError> {
        let kind = StatusKind::from_message(message).ok_or_else(|| {
            CodeGenError::Internal(format!("status without a kind prefix: {:?}", message))
        })?;
        let kind_str = match kind {
            StatusKind::Suspension => "suspension",
            StatusKind::Error => "error",
            StatusKind::Note => "note",
            StatusKind::Other => "other",
        };
        Ok(format!(
            "sift_{}__{}__{}",
            self.pkg,
            kind_str,
            sanitize(&message[1..])
        ))
    }

    /// The C string literal of a status: the kind prefix, then the package,
    /// then the declared text.
    pub(super) fn status_text(&self, message: &str) -> String {
        let (prefix, rest) = message.split_at(1);
        format!("{}{}: {}", prefix, self.pkg, rest)
    }

    // ------------------------------------------------------------------
    // C type rendering
    // ------------------------------------------------------------------

    /// A declaration `<type> <name>` (arrays need the declarator split).
    pub(super) fn c_decl(&self, ty: &MType, name: &str) -> Result<String, CodeGenError> {
        match ty {
            MType::Array { len, elem } => {
                Ok(format!("{} {}[{}]", self.c_type(elem)?, name, len))
            }
            _ => Ok(format!("{} {}", self.c_type(ty)?, name)),
        }
    }

    pub(super) fn c_type(&self, ty: &MType) -> Result<String, CodeGenError> {
        Ok(match ty {
            MType::Numeric { base, .. } => base.c_name().to_string(),
            MType::Bool => "bool".to_string(),
            MType::Status => "sift_base__status".to_string(),
            MType::EmptyStruct => "void".to_string(),
            MType::Slice(elem) | MType::Table(elem) => {
                let base = elem.num_base().ok_or_else(|| {
                    CodeGenError::Internal("non-numeric slice element".to_string())
                })?;
                let family = match ty {
                    MType::Table(_) => "table",
                    _ => "slice",
                };
                format!("sift_base__{}_{}", family, base.name())
            }
            MType::Ptr(inner) | MType::Nptr(inner) => {
                format!("{}*", self.c_type(inner)?)
            }
            MType::Struct(q) => {
                if q.leaf.is(crate::token::Bid::IoReader)
                    || q.leaf.is(crate::token::Bid::IoWriter)
                {
                    "sift_base__io_buffer*".to_string()
                } else {
                    let pkg = if q.package == Id::NONE || q.package == self.globals.package
                    {
                        self.pkg.clone()
                    } else {
                        self.str_of(q.package).to_string()
                    };
                    self.struct_c_name(&pkg, q.leaf)
                }
            }
            MType::Array { .. } => {
                return Err(CodeGenError::Internal(
                    "array type outside a declarator".to_string(),
                ));
            }
            MType::Func(_) => {
                return Err(CodeGenError::Internal(
                    "bare function type outside a choose slot".to_string(),
                ));
            }
        })
    }
}

/// Lowercase a status message into a C identifier fragment.
pub(super) fn sanitize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.trim().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}

/// Collect the `var` declarations of a function body, in declaration order.
/// For coroutines these become receiver-struct slots.
pub(super) fn collect_locals(
    resolver: &Resolver,
    func: &FuncDef,
) -> Result<Vec<(Id, MType)>, CodeGenError> {
    let mut out = Vec::new();
    collect_locals_in(resolver, &func.body, &mut out)?;
    Ok(out)
}

fn collect_locals_in(
    resolver: &Resolver,
    stmts: &[Stmt],
    out: &mut Vec<(Id, MType)>,
) -> Result<(), CodeGenError> {
    for stmt in stmts {
        match stmt {
            Stmt::Var { name, ty, .. } => {
                let mtype = resolver.resolve_type(ty)?;
                if out.iter().any(|(n, t)| n == name && *t != mtype) {
                    return Err(CodeGenError::Internal(
                        "conflicting local declarations survived the resolver".to_string(),
                    ));
                }
                if !out.iter().any(|(n, _)| n == name) {
                    out.push((*name, mtype));
                }
            }
            Stmt::If(i) => {
                collect_locals_in(resolver, &i.then_block, out)?;
                let mut cursor = &i.else_branch;
                while let Some(branch) = cursor {
                    match branch {
                        crate::ast::ElseBranch::Block(b) => {
                            collect_locals_in(resolver, b, out)?;
                            break;
                        }
                        crate::ast::ElseBranch::If(nested) => {
                            collect_locals_in(resolver, &nested.then_block, out)?;
                            cursor = &nested.else_branch;
                        }
                    }
                }
            }
            Stmt::While(w) => collect_locals_in(resolver, &w.body, out)?,
            Stmt::Iterate(it) => {
                for part in &it.parts {
                    collect_locals_in(resolver, &part.body, out)?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("bad magic"), "bad_magic");
        assert_eq!(sanitize("  short read!"), "short_read");
        assert_eq!(sanitize("I/O problem"), "i_o_problem");
    }
}
