//! C99 code generation
//!
//! Lowers the checked AST to portable C text. The checker has already
//! discharged every bounds and overflow obligation, so the emission contains
//! no runtime safety checks on proved sites: subscripts are raw pointer
//! arithmetic and arithmetic is plain C operators. Anything that goes wrong
//! in here indicates a checker bug, never a user error.
//!
//! # Key Concepts
//!
//! ## Coroutine lowering
//!
//! A coroutine body is wrapped in a single `switch (coro_susp_point)`.
//! Every suspension site gets a unique small integer `n`; passing it sets
//! the counter and drops a `case n:;` label, and suspending stores the
//! counter into the receiver and returns a `$` status. The next call
//! switches straight back to the pending site. Coroutine locals live in the
//! receiver's `private_data`, so no jump can bypass an initialization.
//!
//! ## I/O bindings
//!
//! Readers and writers materialize `iop_`/`io0_`/`io1_`/`io2_` pointer
//! locals on entry. Fast-path code works on those raw pointers; the
//! buffer's `meta.ri`/`meta.wi` are written back on every exit and around
//! callee coroutine calls, so positions are visible to the caller exactly
//! at suspension returns.
//!
//! ## Emission regions
//!
//! One emission per package, partitioned by marker lines into public
//! header, private header and implementation. The implementation is guarded
//! by `SIFT_IMPLEMENTATION`, so the text works both as a single-file header
//! library and split into an `.h`/`.c` pair.
//!
//! # Module Structure
//!
//! - `state.rs`: the generator struct, emission buffer, name mangling
//! - `program.rs`: region layout, struct layouts, statuses, initializers
//! - `funcs.rs`: function bodies, coroutine machinery, statements
//! - `expr.rs`: expression rendering
//! - `runtime.rs`: the constant C base fragments
//! - `error.rs`: error types

mod error;
mod expr;
mod funcs;
mod program;
mod runtime;
mod state;

pub use error::CodeGenError;
pub use program::{
    MARKER_IMPL_BEGIN, MARKER_IMPL_END, MARKER_PRIVATE_BEGIN, MARKER_PUBLIC_BEGIN,
    MARKER_PUBLIC_END,
};
pub use state::{CGen, DISABLED, MAGIC};

use crate::ast::Module;
use crate::checker::CheckInfo;
use crate::resolver::Globals;
use crate::token::IdMap;

/// Generate the C emission for a checked package. Deterministic: the same
/// input produces byte-identical output.
pub fn generate(
    idmap: &IdMap,
    globals: &Globals,
    info: &CheckInfo,
    modules: &[Module],
    pkg: &str,
) -> Result<String, CodeGenError> {
    let mut g = CGen::new(idmap, globals, info, pkg);
    g.emit_program(modules)?;
    Ok(g.out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::Checker;
    use crate::parser::parse_source;
    use crate::resolver::Resolver;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn gen(src: &str) -> String {
        let mut idmap = IdMap::new();
        let pkg = idmap.intern("test");
        let mut module =
            parse_source(src, &mut idmap, PathBuf::from("test.sift"), pkg).expect("parse");
        let globals = Globals::collect(
            std::slice::from_ref(&module),
            &idmap,
            pkg,
            HashMap::new(),
        )
        .expect("collect");
        let resolver = Resolver::new(&idmap, &globals);
        let errors = resolver.resolve_module(&mut module);
        assert!(errors.is_empty(), "resolve errors: {:?}", errors);
        let checker = Checker::new(&idmap, &globals);
        let (info, errors) = checker.check_module(&module);
        assert!(errors.is_empty(), "check errors: {:?}", errors);
        generate(&idmap, &globals, &info, std::slice::from_ref(&module), "test")
            .expect("generate")
    }

    const COUNTER: &str = "pri struct counter?(total: base.u32)\n\
        pub func counter.accumulate?(src: base.io_reader) {\n\
        \tvar c: base.u8 = src.read_u8?()\n\
        \tthis.total ~mod+= (c as base.u32)\n\
        }\n";

    #[test]
    fn test_simple_function_has_no_checks() {
        let c = gen("pub func f(x: base.u32[..= 100]) base.u32 {\n return x + 10\n}\n");
        assert!(c.contains("uint32_t sift_test__f(uint32_t a_x)"), "{}", c);
        // Proven arithmetic is a plain C operator with no guard around it.
        assert!(c.contains("return ((uint32_t)(a_x + 10u));"), "{}", c);
    }

    #[test]
    fn test_proved_subscript_is_raw_pointer_access() {
        let c = gen(
            "pub func f(s: slice base.u8, i: base.u32, n: base.u32)\n\
             \tpre i < n\n\
             \tpre n == s.length()\n\
             base.u8 {\n\
             assert i < s.length() via \"a < b: a < c; c == b\"(c: n)\n\
             return s[i]\n\
             }\n",
        );
        assert!(c.contains("return a_s.ptr[a_i];"), "{}", c);
        // No runtime bounds test was emitted for the subscript.
        assert!(!c.contains("a_i < a_s.len"), "{}", c);
        assert!(!c.contains("bounds"), "{}", c);
    }

    #[test]
    fn test_coroutine_switch_structure() {
        let c = gen(COUNTER);
        assert!(
            c.contains("uint32_t coro_susp_point = self->private_impl.p_accumulate;"),
            "{}",
            c
        );
        assert!(c.contains("switch (coro_susp_point) {"), "{}", c);
        assert!(c.contains("SIFT_BASE__COROUTINE_SUSPENSION_POINT(1);"), "{}", c);
        assert!(c.contains("status = sift_base__suspension__short_read;"), "{}", c);
        // Locals live in the receiver so resumption sees the same values.
        assert!(c.contains("self->private_data.s_accumulate.v_c"), "{}", c);
    }

    #[test]
    fn test_coroutine_writes_back_io_meta_on_exit() {
        let c = gen(COUNTER);
        assert!(
            c.contains("a_src->meta.ri = ((uint64_t)(iop_a_src - a_src->data.ptr));"),
            "{}",
            c
        );
    }

    #[test]
    fn test_struct_layout() {
        let c = gen(COUNTER);
        assert!(c.contains("typedef struct sift_test__counter__struct {"), "{}", c);
        assert!(c.contains("uint32_t magic;"), "{}", c);
        assert!(c.contains("uint32_t f_total;"), "{}", c);
        assert!(c.contains("uint32_t p_accumulate;"), "{}", c);
        assert!(c.contains("} private_impl;"), "{}", c);
        assert!(c.contains("} private_data;"), "{}", c);
    }

    #[test]
    fn test_initialize_contract() {
        let c = gen(COUNTER);
        assert!(c.contains("__initialize("), "{}", c);
        assert!(c.contains("self->private_impl.magic = SIFT_BASE__MAGIC;"), "{}", c);
        assert!(c.contains("return sift_base__error__bad_sizeof_receiver;"), "{}", c);
    }

    #[test]
    fn test_magic_word_value() {
        let c = gen(COUNTER);
        assert!(c.contains("0x3CCB6C71"), "{}", c);
        assert_eq!(MAGIC, 0x3CCB6C71);
        assert_ne!(MAGIC, DISABLED);
    }

    #[test]
    fn test_status_kind_encoding() {
        let c = gen(
            "pub status \"?bad magic\"\n\
             pri status \"#trailing data\"\n\
             pub func f(x: base.u32) base.u32 {\n return x\n}\n",
        );
        assert!(
            c.contains("const char sift_test__error__bad_magic[] = \"?test: bad magic\";"),
            "{}",
            c
        );
        assert!(
            c.contains(
                "static const char sift_test__note__trailing_data[] = \"#test: trailing data\";"
            ),
            "{}",
            c
        );
    }

    #[test]
    fn test_emission_regions() {
        let c = gen(COUNTER);
        let pub_begin = c.find(MARKER_PUBLIC_BEGIN).expect("public begin");
        let pub_end = c.find(MARKER_PUBLIC_END).expect("public end");
        let impl_begin = c.find(MARKER_IMPL_BEGIN).expect("impl begin");
        let impl_end = c.find(MARKER_IMPL_END).expect("impl end");
        assert!(pub_begin < pub_end && pub_end < impl_begin && impl_begin < impl_end);
        assert!(c.contains("#if defined(SIFT_IMPLEMENTATION)"), "{}", c);
        assert!(c.contains("extern \"C\""), "{}", c);
    }

    #[test]
    fn test_generation_is_deterministic() {
        let a = gen(COUNTER);
        let b = gen(COUNTER);
        assert_eq!(a, b);
    }

    #[test]
    fn test_tilde_ops_lowering() {
        let c = gen(
            "pub func f(x: base.u32, y: base.u32) base.u32 {\n\
             var a: base.u32 = x ~sat+ y\n\
             var b: base.u32 = x ~mod+ y\n\
             return a ~sat- b\n\
             }\n",
        );
        assert!(c.contains("sift_base__u32__sat_add(a_x, a_y)"), "{}", c);
        assert!(c.contains("((uint32_t)(a_x + a_y))"), "{}", c);
        assert!(c.contains("sift_base__u32__sat_sub("), "{}", c);
    }

    #[test]
    fn test_yield_lowering() {
        let c = gen(
            "pri struct d?(s: base.u32)\n\
             pub func d.step?(src: base.io_reader) {\n\
             \tyield? \"$more input\"\n\
             }\n",
        );
        assert!(c.contains("status = sift_test__suspension__more_input;"), "{}", c);
        assert!(c.contains("coro_susp_point = 1;"), "{}", c);
        assert!(c.contains("case 1:;"), "{}", c);
    }

    #[test]
    fn test_choose_lowering() {
        let c = gen(
            "pri struct lut(t: base.u32)\n\
             pub func lut.up!(n: base.u32) {\n\
             choose up = [up_arm_neon, up_other]\n\
             }\n\
             pri func lut.up_arm_neon!(n: base.u32) {\n\
             }\n\
             pri func lut.up_other!(n: base.u32) {\n\
             }\n",
        );
        assert!(c.contains("(*choosy_up)"), "{}", c);
        assert!(c.contains("#if defined(__ARM_NEON)"), "{}", c);
        assert!(
            c.contains("self->private_impl.choosy_up = &sift_test__lut__up_arm_neon;"),
            "{}",
            c
        );
        assert!(c.contains("sift_test__lut__up__choosy_default"), "{}", c);
    }

    #[test]
    fn test_iterate_lowering() {
        let c = gen(
            "pub func f!(s: slice base.u8) {\n\
             iterate (x = s) (length: 4, advance: 4, unroll: 1) {\n\
             \tx[0] = 1\n\
             } else (length: 1, advance: 1, unroll: 1) {\n\
             \tx[0] = 1\n\
             }\n\
             }\n",
        );
        assert!(c.contains("while ((((uint64_t)(q_x - p_x)) >= 4))"), "{}", c);
        assert!(c.contains("while ((((uint64_t)(q_x - p_x)) >= 1))"), "{}", c);
        assert!(c.contains("i_x.ptr = p_x;"), "{}", c);
        assert!(c.contains("p_x += 4;"), "{}", c);
    }

    #[test]
    fn test_public_and_private_linkage() {
        let c = gen(
            "pub func f(x: base.u32) base.u32 {\n return x\n}\n\
             pri func g(x: base.u32) base.u32 {\n return x\n}\n",
        );
        assert!(c.contains("uint32_t sift_test__f(uint32_t a_x);"), "{}", c);
        assert!(c.contains("static uint32_t sift_test__g(uint32_t a_x);"), "{}", c);
    }
}
