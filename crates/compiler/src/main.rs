//! Sift Compiler CLI
//!
//! Command-line interface for transpiling .sift packages to C, running
//! their test and bench harnesses, and building static libraries.

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(ClapParser)]
#[command(name = "siftc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Sift compiler - transpile .sift packages to C99", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate C from a .sift package
    Gen {
        /// Input .sift source files (one package)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output path (defaults to <package>.c)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Package name (defaults to the sources' directory name)
        #[arg(long)]
        package: Option<String>,

        /// Search path for `use`d packages
        #[arg(long)]
        pkg_path: Option<PathBuf>,

        /// Write a .h/.c pair instead of a single file
        #[arg(long)]
        split: bool,
    },

    /// Generate, compile with a C compiler, and run the package's test harness
    Test {
        /// Input .sift source files (one package)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Only run harness cases containing this substring
        #[arg(long)]
        focus: Option<String>,

        /// Comma-separated C compiler candidates
        #[arg(long)]
        ccompilers: Option<String>,

        /// Also compare against mimic libraries (accepted; reported as
        /// skipped when no mimic library is configured)
        #[arg(long)]
        mimic: bool,

        /// Skip regenerating `use`d packages
        #[arg(long)]
        skipgendeps: bool,

        /// Package name (defaults to the sources' directory name)
        #[arg(long)]
        package: Option<String>,

        /// Search path for `use`d packages
        #[arg(long)]
        pkg_path: Option<PathBuf>,
    },

    /// Generate, compile, and run the package's bench harness
    Bench {
        /// Input .sift source files (one package)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Bench repetitions
        #[arg(long)]
        reps: Option<u32>,

        /// Only run harness cases containing this substring
        #[arg(long)]
        focus: Option<String>,

        /// Comma-separated C compiler candidates
        #[arg(long)]
        ccompilers: Option<String>,

        /// Also compare against mimic libraries (accepted; reported as
        /// skipped when no mimic library is configured)
        #[arg(long)]
        mimic: bool,

        /// Skip regenerating `use`d packages
        #[arg(long)]
        skipgendeps: bool,

        /// Package name (defaults to the sources' directory name)
        #[arg(long)]
        package: Option<String>,

        /// Search path for `use`d packages
        #[arg(long)]
        pkg_path: Option<PathBuf>,
    },

    /// Generate C and archive it into a static library
    Genlib {
        /// Input .sift source files (one package)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output directory for the .c/.o/.a artifacts
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,

        /// Comma-separated C compiler candidates
        #[arg(long)]
        ccompilers: Option<String>,

        /// Package name (defaults to the sources' directory name)
        #[arg(long)]
        package: Option<String>,

        /// Search path for `use`d packages
        #[arg(long)]
        pkg_path: Option<PathBuf>,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Gen {
            files,
            output,
            package,
            pkg_path,
            split,
        } => run_gen(&files, output.as_deref(), package.as_deref(), pkg_path.as_deref(), split),
        Commands::Test {
            files,
            focus,
            ccompilers,
            mimic,
            skipgendeps,
            package,
            pkg_path,
        } => run_harness(
            &files,
            false,
            None,
            focus.as_deref(),
            ccompilers.as_deref(),
            mimic,
            skipgendeps,
            package.as_deref(),
            pkg_path.as_deref(),
        ),
        Commands::Bench {
            files,
            reps,
            focus,
            ccompilers,
            mimic,
            skipgendeps,
            package,
            pkg_path,
        } => run_harness(
            &files,
            true,
            reps,
            focus.as_deref(),
            ccompilers.as_deref(),
            mimic,
            skipgendeps,
            package.as_deref(),
            pkg_path.as_deref(),
        ),
        Commands::Genlib {
            files,
            out_dir,
            ccompilers,
            package,
            pkg_path,
        } => run_genlib(
            &files,
            &out_dir,
            ccompilers.as_deref(),
            package.as_deref(),
            pkg_path.as_deref(),
        ),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "siftc", &mut io::stdout());
        }
    }
}

fn report_errors(errors: Vec<String>) -> ! {
    for e in errors {
        eprintln!("{}", e);
    }
    process::exit(1);
}

fn load_config(
    files: &[PathBuf],
    ccompilers: Option<&str>,
    reps: Option<u32>,
    mimic: bool,
    skipgendeps: bool,
) -> siftc::ToolConfig {
    let dir = files
        .first()
        .and_then(|p| p.parent())
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));
    let config = match siftc::ToolConfig::load(&dir) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };
    config.with_overrides(ccompilers, reps, mimic, skipgendeps)
}

fn run_gen(
    files: &[PathBuf],
    output: Option<&std::path::Path>,
    package: Option<&str>,
    pkg_path: Option<&std::path::Path>,
    split: bool,
) {
    match siftc::gen_file(files, output, package, pkg_path, split) {
        Ok(written) => {
            for path in written {
                println!("wrote {}", path.display());
            }
        }
        Err(errors) => report_errors(errors),
    }
}

#[allow(clippy::too_many_arguments)]
fn run_harness(
    files: &[PathBuf],
    bench: bool,
    reps: Option<u32>,
    focus: Option<&str>,
    ccompilers: Option<&str>,
    mimic: bool,
    skipgendeps: bool,
    package: Option<&str>,
    pkg_path: Option<&std::path::Path>,
) {
    let config = load_config(files, ccompilers, reps, mimic, skipgendeps);
    match siftc::run_harness(files, &config, bench, focus, package, pkg_path) {
        Ok(report) => {
            for line in report.lines {
                println!("{}", line);
            }
        }
        Err(errors) => report_errors(errors),
    }
}

fn run_genlib(
    files: &[PathBuf],
    out_dir: &std::path::Path,
    ccompilers: Option<&str>,
    package: Option<&str>,
    pkg_path: Option<&std::path::Path>,
) {
    let config = load_config(files, ccompilers, None, false, false);
    match siftc::gen_lib(files, out_dir, &config, package, pkg_path) {
        Ok(lib) => println!("wrote {}", lib.display()),
        Err(errors) => report_errors(errors),
    }
}
