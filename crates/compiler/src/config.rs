//! Tool configuration
//!
//! Settings the subcommands share: the C compiler candidate list and the
//! bench repetition count. Defaults can be overridden by a `siftc.toml`
//! next to the sources and by command-line flags, in that order.

use serde::Deserialize;
use std::path::Path;

/// Resolved tool configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolConfig {
    /// C compiler candidates, tried in order.
    pub ccompilers: Vec<String>,
    /// Bench harness repetitions.
    pub reps: u32,
    /// Accepted for compatibility; mimic libraries are not wired in, so
    /// `test`/`bench` report the comparison as skipped.
    pub mimic: bool,
    /// Skip regenerating used packages that already have artifacts.
    pub skipgendeps: bool,
}

impl Default for ToolConfig {
    fn default() -> Self {
        ToolConfig {
            ccompilers: vec!["cc".to_string(), "gcc".to_string(), "clang".to_string()],
            reps: 1000,
            mimic: false,
            skipgendeps: false,
        }
    }
}

/// The on-disk shape of `siftc.toml`. Every field is optional; missing
/// fields keep their defaults.
#[derive(Debug, Clone, Default, Deserialize)]
struct ToolConfigFile {
    build: Option<BuildSection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct BuildSection {
    ccompilers: Option<Vec<String>>,
    reps: Option<u32>,
}

impl ToolConfig {
    /// Parse a TOML config and merge it over the defaults.
    pub fn from_toml(content: &str) -> Result<ToolConfig, String> {
        let file: ToolConfigFile =
            toml::from_str(content).map_err(|e| format!("invalid siftc.toml: {}", e))?;
        let mut config = ToolConfig::default();
        if let Some(build) = file.build {
            if let Some(cc) = build.ccompilers {
                if !cc.is_empty() {
                    config.ccompilers = cc;
                }
            }
            if let Some(reps) = build.reps {
                config.reps = reps;
            }
        }
        Ok(config)
    }

    /// Load `siftc.toml` from the given directory, if present.
    pub fn load(dir: &Path) -> Result<ToolConfig, String> {
        let path = dir.join("siftc.toml");
        if !path.exists() {
            return Ok(ToolConfig::default());
        }
        let content = std::fs::read_to_string(&path)
            .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
        ToolConfig::from_toml(&content)
    }

    /// Apply command-line overrides on top of the loaded configuration.
    pub fn with_overrides(
        mut self,
        ccompilers: Option<&str>,
        reps: Option<u32>,
        mimic: bool,
        skipgendeps: bool,
    ) -> ToolConfig {
        if let Some(list) = ccompilers {
            let parsed: Vec<String> = list
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !parsed.is_empty() {
                self.ccompilers = parsed;
            }
        }
        if let Some(reps) = reps {
            self.reps = reps;
        }
        self.mimic = mimic;
        self.skipgendeps = skipgendeps;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = ToolConfig::default();
        assert_eq!(c.ccompilers, vec!["cc", "gcc", "clang"]);
        assert_eq!(c.reps, 1000);
        assert!(!c.mimic);
    }

    #[test]
    fn test_from_toml_merges_over_defaults() {
        let c = ToolConfig::from_toml(
            "[build]\nccompilers = [\"tcc\"]\n",
        )
        .unwrap();
        assert_eq!(c.ccompilers, vec!["tcc"]);
        assert_eq!(c.reps, 1000);
    }

    #[test]
    fn test_from_toml_rejects_garbage() {
        assert!(ToolConfig::from_toml("not toml [").is_err());
    }

    #[test]
    fn test_overrides() {
        let c = ToolConfig::default().with_overrides(
            Some("clang, gcc"),
            Some(50),
            true,
            false,
        );
        assert_eq!(c.ccompilers, vec!["clang", "gcc"]);
        assert_eq!(c.reps, 50);
        assert!(c.mimic);
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let c = ToolConfig::load(dir.path()).unwrap();
        assert_eq!(c, ToolConfig::default());
    }
}
