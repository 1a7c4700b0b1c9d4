//! Sift Compiler Library
//!
//! Compiles `.sift` packages to portable C99. The pipeline is: parse,
//! resolve (types on every expression), check (discharge every bounds,
//! overflow and invariant obligation at compile time), then generate C with
//! no runtime safety checks on proved sites.
//!
//! The compiler is single-threaded per package; the identifier table is
//! built during parsing and read-only afterwards. Diagnostics are one per
//! line, `path:line:col: kind: message`, stable enough for editor
//! integration.

pub mod ast;
pub mod builtins;
pub mod cc;
pub mod checker;
pub mod codegen;
pub mod config;
pub mod facts;
pub mod interval;
pub mod lexer;
pub mod parser;
pub mod resolver;
pub mod token;
pub mod types;

pub use checker::{CheckInfo, Checker};
pub use codegen::CodeGenError;
pub use config::ToolConfig;
pub use interval::{Bound, Interval};
pub use parser::Parser;
pub use resolver::{Globals, Resolver};
pub use token::{Id, IdMap, QQId};
pub use types::{MType, NumBase, StatusKind};

use ast::Module;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// A fully parsed, resolved and checked package, ready for generation.
#[derive(Debug)]
pub struct CheckedPackage {
    pub idmap: IdMap,
    pub package: Id,
    pub pkg_name: String,
    pub modules: Vec<Module>,
    pub globals: Globals,
    pub info: CheckInfo,
}

/// Parse, resolve and check one package from in-memory sources. Returns
/// every diagnostic found; the pipeline continues past per-function errors
/// so one run surfaces many of them.
pub fn check_sources(
    sources: &[(PathBuf, String)],
    pkg_name: &str,
    pkg_path: Option<&Path>,
) -> Result<CheckedPackage, Vec<String>> {
    let mut idmap = IdMap::new();
    let package = idmap.intern(pkg_name);

    let span = tracing::debug_span!("check", pkg = pkg_name);
    let _guard = span.enter();

    // Parse.
    let mut modules = Vec::new();
    let mut errors = Vec::new();
    for (path, source) in sources {
        match parser::parse_source(source, &mut idmap, path.clone(), package) {
            Ok(module) => modules.push(module),
            Err(e) => errors.push(format!("{}:{}", path.display(), e)),
        }
    }
    if !errors.is_empty() {
        return Err(errors);
    }
    tracing::debug!(files = modules.len(), "parsed");

    // Resolve used packages (signatures only; their own code is generated
    // separately).
    let mut deps = HashMap::new();
    let mut loading: Vec<String> = Vec::new();
    for module in &modules {
        for use_decl in &module.uses {
            if let Err(e) = load_dep(
                &use_decl.path,
                pkg_path,
                &mut idmap,
                &mut deps,
                &mut loading,
            ) {
                errors.push(format!("{}:{}", module.path.display(), e));
            }
        }
    }
    if !errors.is_empty() {
        return Err(errors);
    }

    // Collect the top-level environment, then type every function body.
    let globals = match Globals::collect(&modules, &idmap, package, deps) {
        Ok(g) => g,
        Err(e) => return Err(vec![prefix_path(&modules, &e)]),
    };
    let resolver = Resolver::new(&idmap, &globals);
    for module in &mut modules {
        let path = module.path.clone();
        for e in resolver.resolve_module(module) {
            errors.push(format!("{}:{}", path.display(), e));
        }
    }
    if !errors.is_empty() {
        return Err(errors);
    }
    tracing::debug!("resolved");

    // Discharge the proof obligations.
    let checker = Checker::new(&idmap, &globals);
    let mut info = CheckInfo::default();
    for module in &modules {
        let (module_info, module_errors) = checker.check_module(module);
        info.coro_points.extend(module_info.coro_points);
        for e in module_errors {
            errors.push(format!("{}:{}", module.path.display(), e));
        }
    }
    if !errors.is_empty() {
        return Err(errors);
    }
    tracing::debug!("checked");

    Ok(CheckedPackage {
        idmap,
        package,
        pkg_name: pkg_name.to_string(),
        modules,
        globals,
        info,
    })
}

fn prefix_path(modules: &[Module], e: &str) -> String {
    match modules.first() {
        Some(m) => format!("{}:{}", m.path.display(), e),
        None => e.to_string(),
    }
}

/// Load a used package's public signatures from the package search path.
fn load_dep(
    use_path: &str,
    pkg_path: Option<&Path>,
    idmap: &mut IdMap,
    deps: &mut HashMap<Id, Globals>,
    loading: &mut Vec<String>,
) -> Result<(), String> {
    let dep_name = use_path
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("1:1: use: empty package path {:?}", use_path))?
        .to_string();
    let dep_id = idmap.intern(&dep_name);
    if deps.contains_key(&dep_id) {
        return Ok(());
    }
    if loading.contains(&dep_name) {
        return Err(format!("1:1: use: package cycle through {:?}", dep_name));
    }
    let root = pkg_path
        .ok_or_else(|| format!("1:1: use: {:?} needs --pkg-path", use_path))?;
    let dir = root.join(use_path);
    if !dir.is_dir() {
        return Err(format!(
            "1:1: use: package directory {} not found",
            dir.display()
        ));
    }
    let mut files: Vec<PathBuf> = fs::read_dir(&dir)
        .map_err(|e| format!("1:1: use: cannot read {}: {}", dir.display(), e))?
        .flatten()
        .map(|entry| entry.path())
        .filter(|p| p.extension().is_some_and(|e| e == "sift"))
        .collect();
    files.sort();
    if files.is_empty() {
        return Err(format!("1:1: use: no .sift sources in {}", dir.display()));
    }
    loading.push(dep_name.clone());
    let mut modules = Vec::new();
    let mut nested: HashMap<Id, Globals> = HashMap::new();
    for path in files {
        let source = fs::read_to_string(&path)
            .map_err(|e| format!("1:1: use: cannot read {}: {}", path.display(), e))?;
        let module = parser::parse_source(&source, idmap, path.clone(), dep_id)
            .map_err(|e| format!("{}:{}", path.display(), e))?;
        for nested_use in &module.uses {
            load_dep(&nested_use.path, pkg_path, idmap, &mut nested, loading)?;
        }
        modules.push(module);
    }
    let globals = Globals::collect(&modules, idmap, dep_id, nested)
        .map_err(|e| format!("in package {:?}: {}", dep_name, e))?;
    loading.pop();
    deps.insert(dep_id, globals);
    Ok(())
}

/// Generate the C emission for a checked package.
pub fn generate_c(pkg: &CheckedPackage) -> Result<String, String> {
    let span = tracing::debug_span!("codegen", pkg = pkg.pkg_name.as_str());
    let _guard = span.enter();
    codegen::generate(
        &pkg.idmap,
        &pkg.globals,
        &pkg.info,
        &pkg.modules,
        &pkg.pkg_name,
    )
    .map_err(|e| e.to_string())
}

/// Derive the package name: an explicit flag wins, then the parent
/// directory of the first input, then the file stem.
pub fn package_name(inputs: &[PathBuf], explicit: Option<&str>) -> Result<String, String> {
    if let Some(name) = explicit {
        return Ok(name.to_string());
    }
    let first = inputs
        .first()
        .ok_or_else(|| "no input files".to_string())?;
    let from_dir = first
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty() && *n != "." && *n != "..");
    if let Some(dir) = from_dir {
        return Ok(sanitize_pkg(dir));
    }
    first
        .file_stem()
        .and_then(|s| s.to_str())
        .map(sanitize_pkg)
        .ok_or_else(|| format!("cannot derive a package name from {}", first.display()))
}

fn sanitize_pkg(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c.to_ascii_lowercase());
        } else {
            out.push('_');
        }
    }
    out
}

/// Read, check and generate one package, writing the artifact(s). Returns
/// the written paths.
pub fn gen_file(
    inputs: &[PathBuf],
    output: Option<&Path>,
    pkg_name: Option<&str>,
    pkg_path: Option<&Path>,
    split: bool,
) -> Result<Vec<PathBuf>, Vec<String>> {
    let mut sources = Vec::new();
    for path in inputs {
        let source = fs::read_to_string(path)
            .map_err(|e| vec![format!("{}: read: {}", path.display(), e)])?;
        sources.push((path.clone(), source));
    }
    let pkg = package_name(inputs, pkg_name).map_err(|e| vec![e])?;
    let checked = check_sources(&sources, &pkg, pkg_path)?;
    let text = generate_c(&checked).map_err(|e| vec![e])?;

    let c_path = match output {
        Some(p) => p.to_path_buf(),
        None => PathBuf::from(format!("{}.c", pkg)),
    };
    let mut written = Vec::new();
    if split {
        // Drop-in pair: the header is the full self-guarded emission, the
        // source defines SIFT_IMPLEMENTATION and includes it.
        let h_path = c_path.with_extension("h");
        let h_name = h_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("out.h")
            .to_string();
        fs::write(&h_path, &text)
            .map_err(|e| vec![format!("{}: write: {}", h_path.display(), e)])?;
        let c_src = format!("#define SIFT_IMPLEMENTATION\n#include \"{}\"\n", h_name);
        fs::write(&c_path, c_src)
            .map_err(|e| vec![format!("{}: write: {}", c_path.display(), e)])?;
        written.push(h_path);
        written.push(c_path);
    } else {
        fs::write(&c_path, &text)
            .map_err(|e| vec![format!("{}: write: {}", c_path.display(), e)])?;
        written.push(c_path);
    }
    Ok(written)
}

/// Outcome of a `test` or `bench` run.
pub struct HarnessReport {
    /// Human-readable lines, printed by the CLI.
    pub lines: Vec<String>,
}

/// Generate, compile and (when a harness is present) run a package's
/// `test.c`/`bench.c` harness with the configured C compiler.
pub fn run_harness(
    inputs: &[PathBuf],
    config: &ToolConfig,
    bench: bool,
    focus: Option<&str>,
    pkg_name: Option<&str>,
    pkg_path: Option<&Path>,
) -> Result<HarnessReport, Vec<String>> {
    let mut sources = Vec::new();
    for path in inputs {
        let source = fs::read_to_string(path)
            .map_err(|e| vec![format!("{}: read: {}", path.display(), e)])?;
        sources.push((path.clone(), source));
    }
    let pkg = package_name(inputs, pkg_name).map_err(|e| vec![e])?;
    let checked = check_sources(&sources, &pkg, pkg_path)?;
    let text = generate_c(&checked).map_err(|e| vec![e])?;

    let work_dir = std::env::temp_dir().join(format!("siftc-{}-{}", pkg, std::process::id()));
    fs::create_dir_all(&work_dir)
        .map_err(|e| vec![format!("{}: mkdir: {}", work_dir.display(), e)])?;
    let c_path = work_dir.join(format!("{}.c", pkg));
    fs::write(&c_path, &text)
        .map_err(|e| vec![format!("{}: write: {}", c_path.display(), e)])?;

    let compiler = cc::find_cc(&config.ccompilers).map_err(|e| vec![e])?;
    let mut lines = Vec::new();

    // The artifact must always compile standalone.
    let obj_path = work_dir.join(format!("{}.o", pkg));
    cc::compile_object(&compiler, &c_path, &obj_path).map_err(|e| vec![e])?;
    lines.push(format!("{}: generated C compiles ({})", pkg, compiler));

    let source_dir = inputs
        .first()
        .and_then(|p| p.parent())
        .unwrap_or_else(|| Path::new("."));
    match cc::find_harness(source_dir, bench) {
        Some(harness) => {
            let bin_path = work_dir.join(format!("{}-harness", pkg));
            cc::compile_harness(&compiler, &harness, &work_dir, &bin_path)
                .map_err(|e| vec![e])?;
            let mut flags = Vec::new();
            if bench {
                flags.push("-bench".to_string());
                flags.push(format!("-reps={}", config.reps));
            }
            if let Some(f) = focus {
                flags.push(format!("-focus={}", f));
            }
            let stdout = cc::run_harness(&bin_path, &flags).map_err(|e| vec![e])?;
            for line in stdout.lines() {
                lines.push(line.to_string());
            }
            lines.push(format!("{}: harness passed", pkg));
        }
        None => {
            lines.push(format!(
                "{}: no {} found next to sources; compile-only check passed",
                pkg,
                if bench { "bench.c" } else { "test.c" }
            ));
        }
    }
    if config.mimic {
        lines.push(format!("{}: mimic comparison skipped (not configured)", pkg));
    }
    Ok(HarnessReport { lines })
}

/// Generate, compile and archive a package into a static library.
pub fn gen_lib(
    inputs: &[PathBuf],
    out_dir: &Path,
    config: &ToolConfig,
    pkg_name: Option<&str>,
    pkg_path: Option<&Path>,
) -> Result<PathBuf, Vec<String>> {
    let pkg = package_name(inputs, pkg_name).map_err(|e| vec![e])?;
    let c_path = out_dir.join(format!("{}.c", pkg));
    gen_file(inputs, Some(&c_path), Some(&pkg), pkg_path, false)?;
    let compiler = cc::find_cc(&config.ccompilers).map_err(|e| vec![e])?;
    let obj_path = c_path.with_extension("o");
    cc::compile_object(&compiler, &c_path, &obj_path).map_err(|e| vec![e])?;
    let lib_path = c_path.with_extension("a");
    cc::archive(&obj_path, &lib_path).map_err(|e| vec![e])?;
    Ok(lib_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn src(path: &str, text: &str) -> (PathBuf, String) {
        (PathBuf::from(path), text.to_string())
    }

    #[test]
    fn test_check_sources_accepts_refined_add() {
        let sources = vec![src(
            "demo.sift",
            "pub func f(x: base.u32[..= 100]) base.u32 {\n return x + 10\n}\n",
        )];
        let checked = check_sources(&sources, "demo", None).expect("accepted");
        assert_eq!(checked.pkg_name, "demo");
        let c = generate_c(&checked).expect("generated");
        assert!(c.contains("sift_demo__f"));
    }

    #[test]
    fn test_check_sources_reports_path_in_diagnostics() {
        let sources = vec![src(
            "demo.sift",
            "pub func f(x: base.u32) base.u32 {\n return x + 10\n}\n",
        )];
        let errors = check_sources(&sources, "demo", None).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("demo.sift:2:"), "got: {}", errors[0]);
        assert!(errors[0].contains("overflow"), "got: {}", errors[0]);
    }

    #[test]
    fn test_diagnostics_continue_past_failing_function() {
        let sources = vec![src(
            "demo.sift",
            "pub func f(x: base.u32) base.u32 {\n return x + 10\n}\n\
             pub func g(y: base.u32) base.u32 {\n return y * 3\n}\n",
        )];
        let errors = check_sources(&sources, "demo", None).unwrap_err();
        // Both functions fail independently and both are reported.
        assert_eq!(errors.len(), 2, "got: {:?}", errors);
    }

    #[test]
    fn test_package_name_from_dir() {
        let name = package_name(&[PathBuf::from("codecs/gif/decode.sift")], None).unwrap();
        assert_eq!(name, "gif");
    }

    #[test]
    fn test_package_name_explicit_wins() {
        let name =
            package_name(&[PathBuf::from("codecs/gif/decode.sift")], Some("mygif")).unwrap();
        assert_eq!(name, "mygif");
    }

    #[test]
    fn test_gen_file_writes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("demo.sift");
        std::fs::write(
            &input,
            "pub func f(x: base.u32[..= 100]) base.u32 {\n return x + 10\n}\n",
        )
        .unwrap();
        let out = dir.path().join("demo.c");
        let written = gen_file(&[input], Some(&out), Some("demo"), None, false).expect("gen");
        assert_eq!(written, vec![out.clone()]);
        let text = std::fs::read_to_string(&out).unwrap();
        assert!(text.contains("SIFT_IMPLEMENTATION"));
    }

    #[test]
    fn test_gen_file_split_writes_pair() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("demo.sift");
        std::fs::write(
            &input,
            "pub func f(x: base.u32[..= 100]) base.u32 {\n return x + 10\n}\n",
        )
        .unwrap();
        let out = dir.path().join("demo.c");
        let written = gen_file(&[input], Some(&out), Some("demo"), None, true).expect("gen");
        assert_eq!(written.len(), 2);
        let c_text = std::fs::read_to_string(&written[1]).unwrap();
        assert!(c_text.contains("#define SIFT_IMPLEMENTATION"));
        assert!(c_text.contains("#include \"demo.h\""));
    }

    #[test]
    fn test_gen_twice_is_byte_identical() {
        let sources = vec![src(
            "demo.sift",
            "pri struct counter?(total: base.u32)\n\
             pub func counter.accumulate?(src: base.io_reader) {\n\
             \tvar c: base.u8 = src.read_u8?()\n\
             \tthis.total ~mod+= (c as base.u32)\n\
             }\n",
        )];
        let a = generate_c(&check_sources(&sources, "demo", None).unwrap()).unwrap();
        let b = generate_c(&check_sources(&sources, "demo", None).unwrap()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rle_demo_checks_and_generates() {
        let source = include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/../../demos/rle/rle.sift"
        ));
        let sources = vec![src("rle.sift", source)];
        let checked = check_sources(&sources, "rle", None).expect("accepted");
        let c = generate_c(&checked).expect("generated");
        assert!(c.contains("sift_rle__decoder__transform"), "{}", c);
        assert!(c.contains("sift_rle__decoder__initialize"), "{}", c);
        // Three suspension points: two reads and the in-loop write.
        assert!(c.contains("SIFT_BASE__COROUTINE_SUSPENSION_POINT(3);"), "{}", c);
        assert!(!c.contains("SIFT_BASE__COROUTINE_SUSPENSION_POINT(4);"), "{}", c);
    }

    #[test]
    fn test_use_requires_pkg_path() {
        let sources = vec![src(
            "demo.sift",
            "use \"std/crc32\"\npub func f(x: base.u32) base.u32 {\n return x\n}\n",
        )];
        let errors = check_sources(&sources, "demo", None).unwrap_err();
        assert!(errors[0].contains("--pkg-path"), "got: {}", errors[0]);
    }

    #[test]
    fn test_use_loads_dep_signatures() {
        let dir = tempfile::tempdir().unwrap();
        let dep_dir = dir.path().join("util/sum");
        std::fs::create_dir_all(&dep_dir).unwrap();
        std::fs::write(
            dep_dir.join("sum.sift"),
            "pub func clamp_add(x: base.u32[..= 1000], y: base.u32[..= 1000]) base.u32 {\n\
             return x + y\n\
             }\n",
        )
        .unwrap();
        let sources = vec![src(
            "demo.sift",
            "use \"util/sum\"\n\
             pub func f(x: base.u32[..= 100]) base.u32 {\n\
             return sum.clamp_add(x: x, y: x)\n\
             }\n",
        )];
        let checked = check_sources(&sources, "demo", Some(dir.path())).expect("accepted");
        let c = generate_c(&checked).unwrap();
        assert!(c.contains("sift_sum__clamp_add("), "{}", c);
    }
}
