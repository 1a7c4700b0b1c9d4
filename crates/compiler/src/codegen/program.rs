//! Whole-program emission
//!
//! One emission per package, partitioned into three marked regions: public
//! header, private header and implementation. The driver may write the text
//! as a single file (the implementation guarded by `SIFT_IMPLEMENTATION`) or
//! split it on the markers into an `.h`/`.c` pair.

use crate::ast::{Expr, ExprKind, Module, Stmt};
use crate::types::MType;

use super::error::CodeGenError;
use super::runtime::{BASE_IMPL, BASE_PUBLIC, COROUTINE_MACROS};
use super::state::{collect_locals, CGen};

pub const MARKER_PUBLIC_BEGIN: &str = "// ---------------- BEGIN PUBLIC HEADER";
pub const MARKER_PUBLIC_END: &str = "// ---------------- END PUBLIC HEADER";
pub const MARKER_PRIVATE_BEGIN: &str = "// ---------------- BEGIN PRIVATE HEADER";
pub const MARKER_IMPL_BEGIN: &str = "// ---------------- BEGIN IMPLEMENTATION";
pub const MARKER_IMPL_END: &str = "// ---------------- END IMPLEMENTATION";

impl CGen<'_> {
    pub(super) fn emit_program(&mut self, modules: &[Module]) -> Result<(), CodeGenError> {
        self.scan(modules);
        let guard = format!("SIFT_INCLUDE_GUARD__{}", self.pkg.to_ascii_uppercase());

        self.raw(&format!("#ifndef {}\n#define {}\n\n", guard, guard))?;
        self.raw("// Code generated by siftc. DO NOT EDIT.\n\n")?;

        // Used packages contribute their own artifacts; pull in their
        // public headers so cross-package calls and types resolve.
        let mut deps_seen: Vec<String> = Vec::new();
        for module in modules {
            for use_decl in &module.uses {
                if let Some(dep) = use_decl.path.rsplit('/').next() {
                    if !dep.is_empty() && !deps_seen.contains(&dep.to_string()) {
                        deps_seen.push(dep.to_string());
                    }
                }
            }
        }
        for dep in &deps_seen {
            self.raw(&format!("#include \"{}.h\"\n", dep))?;
        }
        if !deps_seen.is_empty() {
            self.blank()?;
        }

        // ---- public header ----
        self.raw(MARKER_PUBLIC_BEGIN)?;
        self.blank()?;
        self.blank()?;
        self.raw("#include <stdbool.h>\n#include <stddef.h>\n#include <stdint.h>\n#include <string.h>\n\n")?;
        self.raw("#ifdef __cplusplus\nextern \"C\" {\n#endif\n\n")?;
        self.raw(BASE_PUBLIC)?;
        self.blank()?;
        self.emit_consts(modules)?;
        self.emit_public_status_decls(modules)?;
        self.emit_structs(modules)?;
        self.emit_public_prototypes(modules)?;
        self.raw("#ifdef __cplusplus\n}\n#endif\n\n")?;
        self.raw(MARKER_PUBLIC_END)?;
        self.blank()?;
        self.blank()?;

        self.raw("#if defined(SIFT_IMPLEMENTATION)\n\n")?;

        // ---- private header ----
        self.raw(MARKER_PRIVATE_BEGIN)?;
        self.blank()?;
        self.blank()?;
        self.raw(COROUTINE_MACROS)?;
        self.blank()?;
        self.emit_private_prototypes(modules)?;
        self.blank()?;

        // ---- implementation ----
        self.raw(MARKER_IMPL_BEGIN)?;
        self.blank()?;
        self.blank()?;
        self.raw(BASE_IMPL)?;
        self.blank()?;
        self.emit_status_defs(modules)?;
        self.emit_initializers(modules)?;
        for module in modules {
            for func in &module.funcs {
                self.emit_func(func)?;
            }
        }
        self.blank()?;
        self.raw(MARKER_IMPL_END)?;
        self.blank()?;
        self.blank()?;
        self.raw("#endif  // SIFT_IMPLEMENTATION\n\n")?;
        self.raw(&format!("#endif  // {}\n", guard))?;
        Ok(())
    }

    /// Pre-pass: collect `choose` targets and undeclared status literals, in
    /// declaration order so the emission is deterministic.
    fn scan(&mut self, modules: &[Module]) {
        let declared: Vec<String> = modules
            .iter()
            .flat_map(|m| m.statuses.iter().map(|s| s.message.clone()))
            .collect();
        for module in modules {
            for func in &module.funcs {
                if let Some(recv) = func.receiver {
                    scan_choose(&func.body, recv, &mut self.choosy);
                }
                scan_status_literals(&func.body, &declared, &mut self.adhoc_statuses);
            }
        }
    }

    fn emit_consts(&mut self, modules: &[Module]) -> Result<(), CodeGenError> {
        let mut any = false;
        for module in modules {
            for c in &module.consts {
                let info = self.globals.consts.get(&c.name).ok_or_else(|| {
                    CodeGenError::Internal("constant missing from globals".into())
                })?;
                let text = match (info.value, info.ty.num_base()) {
                    (crate::ast::ConstValue::Int(v), Some(base)) => {
                        super::expr::int_literal(v, base)
                    }
                    (crate::ast::ConstValue::Bool(b), _) => {
                        if b { "true" } else { "false" }.to_string()
                    }
                    (crate::ast::ConstValue::Int(v), None) => format!("{}", v),
                };
                let name = self.const_macro(c.name);
                self.raw(&format!("#define {} ({})\n", name, text))?;
                any = true;
            }
        }
        if any {
            self.blank()?;
        }
        Ok(())
    }

    fn emit_public_status_decls(&mut self, modules: &[Module]) -> Result<(), CodeGenError> {
        let mut any = false;
        for module in modules {
            for s in &module.statuses {
                if !s.public {
                    continue;
                }
                let sym = self.status_symbol(&s.message)?;
                self.raw(&format!("extern const char {}[];\n", sym))?;
                any = true;
            }
        }
        if any {
            self.blank()?;
        }
        Ok(())
    }

    fn emit_status_defs(&mut self, modules: &[Module]) -> Result<(), CodeGenError> {
        let mut emitted: Vec<String> = Vec::new();
        for module in modules {
            for s in &module.statuses {
                let sym = self.status_symbol(&s.message)?;
                if emitted.contains(&sym) {
                    continue;
                }
                let linkage = if s.public { "" } else { "static " };
                let text = self.status_text(&s.message);
                self.raw(&format!("{}const char {}[] = \"{}\";\n", linkage, sym, text))?;
                emitted.push(sym);
            }
        }
        let adhoc = self.adhoc_statuses.clone();
        for message in &adhoc {
            let sym = self.status_symbol(message)?;
            if emitted.contains(&sym) {
                continue;
            }
            let text = self.status_text(message);
            self.raw(&format!("static const char {}[] = \"{}\";\n", sym, text))?;
            emitted.push(sym);
        }
        self.blank()?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Structs
    // ------------------------------------------------------------------

    fn emit_structs(&mut self, modules: &[Module]) -> Result<(), CodeGenError> {
        for module in modules {
            for s in &module.structs {
                self.emit_struct(modules, s.name)?;
            }
        }
        Ok(())
    }

    fn emit_struct(
        &mut self,
        modules: &[Module],
        name: crate::token::Id,
    ) -> Result<(), CodeGenError> {
        let info = self
            .globals
            .structs
            .get(&name)
            .cloned()
            .ok_or_else(|| CodeGenError::Internal("struct missing from globals".into()))?;
        let c_name = self.struct_c_name(&self.pkg.clone(), name);
        let tag = format!("{}__struct", c_name);

        self.raw(&format!("typedef struct {} {{\n", tag))?;
        self.raw("  struct {\n")?;
        self.raw("    uint32_t magic;\n")?;
        self.raw("    uint32_t active_coroutine;\n")?;
        for (fname, fty) in &info.fields {
            if field_in_impl(fty) {
                let decl = self.c_decl(fty, &format!("f_{}", self.str_of(*fname)))?;
                self.raw(&format!("    {};\n", decl))?;
            }
        }
        // Choose slots.
        let choosy = self.choosy.clone();
        for (recv, field) in &choosy {
            if *recv != name {
                continue;
            }
            let sig = self
                .globals
                .find_func(Some(*recv), *field)
                .cloned()
                .ok_or_else(|| {
                    CodeGenError::Internal("choose slot missing from globals".into())
                })?;
            let ret = match &sig.ret {
                Some(t) => self.c_type(t)?,
                None => "void".to_string(),
            };
            let mut params = vec![format!("struct {}* self", tag)];
            for (aname, aty) in &sig.args {
                params.push(self.c_decl(aty, &format!("a_{}", self.str_of(*aname)))?);
            }
            self.raw(&format!(
                "    {} (*choosy_{})({});\n",
                ret,
                self.str_of(*field),
                params.join(", ")
            ))?;
        }
        // One program counter per coroutine method.
        let methods = coroutine_methods(modules, name);
        for func in &methods {
            self.raw(&format!("    uint32_t p_{};\n", self.str_of(func.name)))?;
        }
        self.raw("  } private_impl;\n\n")?;

        // Gather the private_data content first; an empty struct is not
        // valid C, so the block is only emitted when something lives there.
        let mut data_lines: Vec<String> = Vec::new();
        for (fname, fty) in &info.fields {
            if !field_in_impl(fty) {
                let decl = self.c_decl(fty, &format!("f_{}", self.str_of(*fname)))?;
                data_lines.push(format!("    {};", decl));
            }
        }
        // Saved-across-suspend locals, one block per coroutine method.
        let resolver = self.resolver();
        for func in &methods {
            let mut lines = Vec::new();
            for (lname, lty) in collect_locals(&resolver, func)? {
                lines.push(format!(
                    "      {};",
                    self.c_decl(&lty, &format!("v_{}", self.str_of(lname)))?
                ));
            }
            for arg in &func.args {
                let ty = resolver.resolve_type(&arg.ty)?;
                if ty.is_io_reader() || ty.is_io_writer() {
                    lines.push(format!(
                        "      uint64_t m_a_{};",
                        self.str_of(arg.name)
                    ));
                }
            }
            if !lines.is_empty() {
                data_lines.push("    struct {".to_string());
                data_lines.extend(lines);
                data_lines.push(format!("    }} s_{};", self.str_of(func.name)));
            }
        }
        if !data_lines.is_empty() {
            self.raw("  struct {\n")?;
            for l in data_lines {
                self.raw(&l)?;
                self.blank()?;
            }
            self.raw("  } private_data;\n")?;
        }
        self.raw(&format!("}} {};\n\n", c_name))?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Prototypes and initializers
    // ------------------------------------------------------------------

    fn emit_public_prototypes(&mut self, modules: &[Module]) -> Result<(), CodeGenError> {
        for module in modules {
            for s in &module.structs {
                if !s.public {
                    continue;
                }
                self.raw(&format!("{};\n", self.initialize_signature(s.name)))?;
            }
        }
        for module in modules {
            for func in &module.funcs {
                if !func.public {
                    continue;
                }
                // For choose targets the public symbol is the dispatcher;
                // its prototype has the same shape as the plain signature.
                let proto = self.c_signature(func, false)?;
                self.raw(&format!("{};\n", proto))?;
            }
        }
        self.blank()?;
        Ok(())
    }

    fn emit_private_prototypes(&mut self, modules: &[Module]) -> Result<(), CodeGenError> {
        for module in modules {
            for s in &module.structs {
                if s.public {
                    continue;
                }
                self.raw(&format!("static {};\n", self.initialize_signature(s.name)))?;
            }
        }
        for module in modules {
            for func in &module.funcs {
                let is_choosy = func
                    .receiver
                    .is_some_and(|r| self.choosy.contains(&(r, func.name)));
                if is_choosy {
                    // The default implementation is always internal.
                    let proto = self.c_signature(func, true)?;
                    self.raw(&format!("{};\n", proto))?;
                    if !func.public {
                        let disp = self.c_signature(func, false)?;
                        self.raw(&format!("{};\n", disp))?;
                    }
                } else if !func.public {
                    let proto = self.c_signature(func, false)?;
                    self.raw(&format!("{};\n", proto))?;
                }
            }
        }
        Ok(())
    }

    fn initialize_signature(&self, name: crate::token::Id) -> String {
        let c_name = self.struct_c_name(&self.pkg, name);
        format!(
            "sift_base__status {}__initialize({}* self, size_t sizeof_star_self, \
             uint64_t sift_version, uint32_t options)",
            c_name, c_name
        )
    }

    fn emit_initializers(&mut self, modules: &[Module]) -> Result<(), CodeGenError> {
        for module in modules {
            for s in &module.structs {
                let linkage = if s.public { "" } else { "static " };
                let sig = self.initialize_signature(s.name);
                self.blank()?;
                self.open(&format!("{}{} {{", linkage, sig))?;
                self.open("if (!self) {")?;
                self.line("return sift_base__error__bad_receiver;")?;
                self.close("}")?;
                self.open("if (sizeof(*self) != sizeof_star_self) {")?;
                self.line("return sift_base__error__bad_sizeof_receiver;")?;
                self.close("}")?;
                self.open("if ((sift_version >> 32) != (SIFT_VERSION >> 32)) {")?;
                self.line("return sift_base__error__bad_version;")?;
                self.close("}")?;
                self.open("if ((options & SIFT_INITIALIZE__ALREADY_ZEROED) == 0) {")?;
                self.line("memset(self, 0, sizeof(*self));")?;
                self.close("}")?;
                self.line("self->private_impl.magic = SIFT_BASE__MAGIC;")?;
                let choosy = self.choosy.clone();
                for (recv, field) in &choosy {
                    if *recv != s.name {
                        continue;
                    }
                    let default =
                        self.mangle(&self.pkg.clone(), Some(*recv), *field);
                    self.line(&format!(
                        "self->private_impl.choosy_{} = &{}__choosy_default;",
                        self.str_of(*field),
                        default
                    ))?;
                }
                self.line("return sift_base__ok;")?;
                self.close("}")?;
            }
        }
        Ok(())
    }
}

fn field_in_impl(ty: &MType) -> bool {
    !matches!(ty, MType::Array { .. } | MType::Struct(_))
}

fn coroutine_methods<'m>(
    modules: &'m [Module],
    name: crate::token::Id,
) -> Vec<&'m crate::ast::FuncDef> {
    modules
        .iter()
        .flat_map(|m| m.funcs.iter())
        .filter(|f| f.receiver == Some(name) && f.effect == crate::ast::FuncEffect::Coroutine)
        .collect()
}

fn scan_choose(
    stmts: &[Stmt],
    recv: crate::token::Id,
    out: &mut Vec<(crate::token::Id, crate::token::Id)>,
) {
    for stmt in stmts {
        match stmt {
            Stmt::Choose(c) => {
                if !out.contains(&(recv, c.field)) {
                    out.push((recv, c.field));
                }
            }
            Stmt::If(i) => {
                scan_choose(&i.then_block, recv, out);
                let mut cursor = &i.else_branch;
                while let Some(b) = cursor {
                    match b {
                        crate::ast::ElseBranch::Block(blk) => {
                            scan_choose(blk, recv, out);
                            break;
                        }
                        crate::ast::ElseBranch::If(nested) => {
                            scan_choose(&nested.then_block, recv, out);
                            cursor = &nested.else_branch;
                        }
                    }
                }
            }
            Stmt::While(w) => scan_choose(&w.body, recv, out),
            Stmt::Iterate(it) => {
                for part in &it.parts {
                    scan_choose(&part.body, recv, out);
                }
            }
            _ => {}
        }
    }
}

fn scan_status_literals(stmts: &[Stmt], declared: &[String], out: &mut Vec<String>) {
    let visit_expr = |e: &Expr, out: &mut Vec<String>| {
        collect_status_literals(e, declared, out);
    };
    for stmt in stmts {
        match stmt {
            Stmt::Var { init: Some(e), .. } => visit_expr(e, out),
            Stmt::Assign { lhs, rhs, .. } => {
                visit_expr(lhs, out);
                visit_expr(rhs, out);
            }
            Stmt::Assert(a) => visit_expr(&a.cond, out),
            Stmt::Return { value: Some(e), .. } => visit_expr(e, out),
            Stmt::Yield { status, .. } => visit_expr(status, out),
            Stmt::CallStmt { call, .. } => visit_expr(call, out),
            Stmt::If(i) => {
                visit_expr(&i.cond, out);
                scan_status_literals(&i.then_block, declared, out);
                let mut cursor = &i.else_branch;
                while let Some(b) = cursor {
                    match b {
                        crate::ast::ElseBranch::Block(blk) => {
                            scan_status_literals(blk, declared, out);
                            break;
                        }
                        crate::ast::ElseBranch::If(nested) => {
                            visit_expr(&nested.cond, out);
                            scan_status_literals(&nested.then_block, declared, out);
                            cursor = &nested.else_branch;
                        }
                    }
                }
            }
            Stmt::While(w) => {
                visit_expr(&w.cond, out);
                scan_status_literals(&w.body, declared, out);
            }
            Stmt::Iterate(it) => {
                for (_, slice) in &it.vars {
                    visit_expr(slice, out);
                }
                for part in &it.parts {
                    scan_status_literals(&part.body, declared, out);
                }
            }
            _ => {}
        }
    }
}

fn collect_status_literals(e: &Expr, declared: &[String], out: &mut Vec<String>) {
    match &e.kind {
        ExprKind::StatusLit(msg) => {
            if !declared.contains(msg) && !out.contains(msg) {
                out.push(msg.clone());
            }
        }
        ExprKind::Field { obj, .. } => collect_status_literals(obj, declared, out),
        ExprKind::Index { obj, index } => {
            collect_status_literals(obj, declared, out);
            collect_status_literals(index, declared, out);
        }
        ExprKind::Call { recv, args, .. } => {
            if let Some(r) = recv {
                collect_status_literals(r, declared, out);
            }
            for a in args {
                collect_status_literals(&a.value, declared, out);
            }
        }
        ExprKind::Binary { lhs, rhs, .. } => {
            collect_status_literals(lhs, declared, out);
            collect_status_literals(rhs, declared, out);
        }
        ExprKind::Unary { operand, .. } => collect_status_literals(operand, declared, out),
        ExprKind::As { operand, .. } => collect_status_literals(operand, declared, out),
        _ => {}
    }
}
