//! C compiler harness
//!
//! `gen` only writes text, but `test`, `bench` and `genlib` need a working
//! C99 compiler. The harness probes the configured candidates once per
//! process, compiles the generated artifact (plus an optional harness
//! source) and runs the resulting binary.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

/// Cache for the compiler probe. Stores Ok(path) on success or Err(message)
/// on failure; probing runs once per process.
static CC_PROBED: OnceLock<Result<String, String>> = OnceLock::new();

/// Find a usable C compiler among `candidates` (first match wins). The
/// `SIFT_CC` environment variable, when set, is tried first.
pub fn find_cc(candidates: &[String]) -> Result<String, String> {
    CC_PROBED
        .get_or_init(|| {
            let mut list: Vec<String> = Vec::new();
            if let Ok(env_cc) = std::env::var("SIFT_CC") {
                if !env_cc.is_empty() {
                    list.push(env_cc);
                }
            }
            list.extend(candidates.iter().cloned());
            for cand in &list {
                let probe = Command::new(cand).arg("--version").output();
                if let Ok(output) = probe {
                    if output.status.success() {
                        return Ok(cand.clone());
                    }
                }
            }
            Err(format!(
                "no C compiler found; tried {}. \
                 Set SIFT_CC or pass --ccompilers.",
                list.join(", ")
            ))
        })
        .clone()
}

/// Compile the generated C file to an object file (compile-only smoke
/// test). Defines `SIFT_IMPLEMENTATION` so the whole artifact is built.
pub fn compile_object(cc: &str, c_path: &Path, out_path: &Path) -> Result<(), String> {
    let output = Command::new(cc)
        .arg("-std=c99")
        .arg("-DSIFT_IMPLEMENTATION")
        .arg("-c")
        .arg(c_path)
        .arg("-o")
        .arg(out_path)
        .output()
        .map_err(|e| format!("failed to run {}: {}", cc, e))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("{} failed:\n{}", cc, stderr));
    }
    Ok(())
}

/// Compile the generated C together with a harness source into a binary.
/// The harness includes the artifact itself, so only the harness is a
/// translation unit here.
pub fn compile_harness(
    cc: &str,
    harness_path: &Path,
    include_dir: &Path,
    out_path: &Path,
) -> Result<(), String> {
    let output = Command::new(cc)
        .arg("-std=c99")
        .arg("-I")
        .arg(include_dir)
        .arg(harness_path)
        .arg("-o")
        .arg(out_path)
        .output()
        .map_err(|e| format!("failed to run {}: {}", cc, e))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("{} failed:\n{}", cc, stderr));
    }
    Ok(())
}

/// Run a compiled harness binary with the given flags, returning its
/// stdout. A non-zero exit is an error carrying the binary's stderr.
pub fn run_harness(binary: &Path, flags: &[String]) -> Result<String, String> {
    let output = Command::new(binary)
        .args(flags)
        .output()
        .map_err(|e| format!("failed to run {}: {}", binary.display(), e))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!(
            "{} exited with {:?}:\n{}",
            binary.display(),
            output.status.code(),
            stderr
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Archive an object file into a static library with `ar`.
pub fn archive(object: &Path, out_path: &Path) -> Result<(), String> {
    let output = Command::new("ar")
        .arg("rcs")
        .arg(out_path)
        .arg(object)
        .output()
        .map_err(|e| format!("failed to run ar: {}", e))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("ar failed:\n{}", stderr));
    }
    Ok(())
}

/// The harness source expected next to the package sources: `test.c` for
/// `test`, `bench.c` for `bench` (falling back to `test.c`).
pub fn find_harness(source_dir: &Path, bench: bool) -> Option<PathBuf> {
    if bench {
        let b = source_dir.join("bench.c");
        if b.exists() {
            return Some(b);
        }
    }
    let t = source_dir.join("test.c");
    t.exists().then_some(t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_harness_prefers_bench() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("test.c"), "int main(void){return 0;}").unwrap();
        std::fs::write(dir.path().join("bench.c"), "int main(void){return 0;}").unwrap();
        let found = find_harness(dir.path(), true).unwrap();
        assert!(found.ends_with("bench.c"));
        let found = find_harness(dir.path(), false).unwrap();
        assert!(found.ends_with("test.c"));
    }

    #[test]
    fn test_find_harness_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_harness(dir.path(), false).is_none());
    }
}
