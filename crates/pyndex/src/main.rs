//! Binary entry point for the pyndex CLI.
//!
//! Indexes one Python source file: invokes the upstream parser, runs the
//! semantic post-processor, and writes Kythe facts as newline-delimited
//! JSON on stdout. Diagnostics go to stderr so the fact stream stays
//! machine-readable.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};

use pyndex_python::analyzer::{index_file, IndexOptions};

// ============================================================================
// CLI Structure
// ============================================================================

/// Python cross-reference indexer emitting Kythe facts.
#[derive(Parser, Debug)]
#[command(name = "pyndex", version, about = "Python cross-reference indexer emitting Kythe facts")]
struct Cli {
    /// Source file to index.
    src: PathBuf,

    /// Command invoking the upstream parser.
    #[arg(long)]
    parsecmd: String,

    /// Corpus field in emitted VNames.
    #[arg(long, default_value = "")]
    kythe_corpus: String,

    /// Root field in emitted VNames.
    #[arg(long, default_value = "")]
    kythe_root: String,

    /// Import search roots, `:`-separated.
    #[arg(long, value_delimiter = ':', default_value = "")]
    pythonpath: Vec<PathBuf>,

    /// Prefixes canonicalizing absolute paths, `:`-separated.
    #[arg(long, value_delimiter = ':', default_value = "")]
    rootpath: Vec<PathBuf>,

    /// Python major version passed to the parser.
    #[arg(long = "python_version", default_value_t = 3, value_parser = clap::value_parser!(u8).range(2..=3))]
    python_version: u8,

    /// Log level for tracing output.
    #[arg(long, value_enum, default_value = "warn")]
    log_level: LogLevel,
}

/// Log level for tracing output.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_level);

    let options = IndexOptions {
        parsecmd: cli.parsecmd,
        kythe_corpus: cli.kythe_corpus,
        kythe_root: cli.kythe_root,
        pythonpath: drop_empty(cli.pythonpath),
        rootpath: drop_empty(cli.rootpath),
        python_version: cli.python_version,
    };

    let mut stdout = io::stdout().lock();
    match index_file(&cli.src, &options, &mut stdout) {
        Ok(()) => {
            let _ = stdout.flush();
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("pyndex: {}", err);
            ExitCode::from(err.exit_status().code())
        }
    }
}

/// Initialize the tracing subscriber, writing to stderr.
fn init_tracing(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_tracing_level().to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// A `--flag ""` default parses as one empty path; treat it as no paths.
fn drop_empty(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    paths
        .into_iter()
        .filter(|p| !p.as_os_str().is_empty())
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod cli_parsing {
        use super::*;

        #[test]
        fn minimal_invocation_parses() {
            let cli = Cli::try_parse_from([
                "pyndex",
                "pkg/mod.py",
                "--parsecmd",
                "parse_py",
            ])
            .unwrap();
            assert_eq!(cli.src, PathBuf::from("pkg/mod.py"));
            assert_eq!(cli.parsecmd, "parse_py");
            assert_eq!(cli.kythe_corpus, "");
            assert_eq!(cli.python_version, 3);
        }

        #[test]
        fn path_lists_split_on_colons() {
            let cli = Cli::try_parse_from([
                "pyndex",
                "mod.py",
                "--parsecmd",
                "parse_py",
                "--rootpath",
                "/a:/b",
                "--pythonpath",
                "/lib",
            ])
            .unwrap();
            assert_eq!(
                drop_empty(cli.rootpath),
                vec![PathBuf::from("/a"), PathBuf::from("/b")]
            );
            assert_eq!(drop_empty(cli.pythonpath), vec![PathBuf::from("/lib")]);
        }

        #[test]
        fn python_version_must_be_2_or_3() {
            let err = Cli::try_parse_from([
                "pyndex",
                "mod.py",
                "--parsecmd",
                "parse_py",
                "--python_version",
                "4",
            ])
            .unwrap_err();
            assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        }

        #[test]
        fn missing_positional_is_an_error() {
            let err =
                Cli::try_parse_from(["pyndex", "--parsecmd", "parse_py"]).unwrap_err();
            assert_eq!(
                err.kind(),
                clap::error::ErrorKind::MissingRequiredArgument
            );
        }

        #[test]
        fn empty_path_defaults_drop_out() {
            let cli =
                Cli::try_parse_from(["pyndex", "mod.py", "--parsecmd", "parse_py"]).unwrap();
            assert!(drop_empty(cli.rootpath).is_empty());
            assert!(drop_empty(cli.pythonpath).is_empty());
        }
    }
}
