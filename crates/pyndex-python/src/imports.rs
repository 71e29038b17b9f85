//! Import normalization and module path resolution.
//!
//! From-imports are normalized to `(path, fqn)` pairs before deferral:
//! leading relative dots are replaced by the importing file's directory
//! segment plus `/..` per additional dot, non-relative imports get the
//! literal `$PYTHONPATH/` prefix, and `from M import *` records a single
//! `*` target without expansion.
//!
//! Dotted module names resolve to files by probing `X.py`, `X.pyi`,
//! `X/__init__.py`, `X/__init__.pyi` under each search root; `.pyi` wins
//! over `.py` when both exist. Probing goes through the `ModuleProbe`
//! trait so tests run without a file system.

use std::path::{Path, PathBuf};

/// Literal prefix marking paths resolved against the import search roots.
pub const PYTHONPATH_PREFIX: &str = "$PYTHONPATH";

// ============================================================================
// From-import normalization
// ============================================================================

/// The base path of a `from <dots><name> import ...` statement.
///
/// `file_dir` is the directory segment of the importing file's
/// canonicalized path (e.g. `pkg/sub` for `pkg/sub/mod.py`).
pub fn from_import_base(file_dir: &str, from_dots: usize, from_name: &[String]) -> String {
    let base = if from_dots == 0 {
        format!("{}/{}", PYTHONPATH_PREFIX, from_name.join("."))
    } else {
        let mut relative = file_dir.to_string();
        for _ in 1..from_dots {
            relative.push_str("/..");
        }
        if !from_name.is_empty() {
            relative.push('/');
            relative.push_str(&from_name.join("."));
        }
        relative
    };
    normalize_dotdot(&base)
}

/// The resolved path of one imported member under a base path.
pub fn member_path(base: &str, name: &str) -> String {
    format!("{}/{}", base, name)
}

/// Lexically resolve `..` segments (`pkg/sub/..` becomes `pkg`).
///
/// Leading `..` segments that cannot be popped are kept.
fn normalize_dotdot(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        if segment == ".." {
            match segments.last() {
                Some(&last) if last != ".." && !last.is_empty() => {
                    segments.pop();
                }
                _ => segments.push(segment),
            }
        } else {
            segments.push(segment);
        }
    }
    segments.join("/")
}

// ============================================================================
// Module FQN <-> file path
// ============================================================================

/// Derive a module FQN from a canonicalized relative file path.
pub fn module_fqn_for_path(rel_path: &str) -> String {
    let stem = rel_path
        .strip_suffix(".pyi")
        .or_else(|| rel_path.strip_suffix(".py"))
        .unwrap_or(rel_path);
    stem.replace('/', ".")
}

/// Convert a module FQN back to its canonical relative file path.
pub fn path_for_module_fqn(fqn: &str) -> String {
    format!("{}.py", fqn.replace('.', "/"))
}

// ============================================================================
// Module resolution
// ============================================================================

/// Existence probing seam for module resolution.
pub trait ModuleProbe {
    fn exists(&self, path: &Path) -> bool;
}

/// Probe against the real file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsProbe;

impl ModuleProbe for FsProbe {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// Resolve a dotted module name to a file under the search roots.
///
/// Each root is tried in order; under a root, a type-stub `.pyi` is
/// preferred over the matching `.py`, and plain modules are preferred
/// over packages (`__init__` files).
pub fn resolve_module_path(
    roots: &[PathBuf],
    dotted: &str,
    probe: &impl ModuleProbe,
) -> Option<PathBuf> {
    let rel: PathBuf = dotted.split('.').collect();
    for root in roots {
        let base = root.join(&rel);
        let module_stub = base.with_extension("pyi");
        if probe.exists(&module_stub) {
            return Some(module_stub);
        }
        let module = base.with_extension("py");
        if probe.exists(&module) {
            return Some(module);
        }
        let package_stub = base.join("__init__.pyi");
        if probe.exists(&package_stub) {
            return Some(package_stub);
        }
        let package = base.join("__init__.py");
        if probe.exists(&package) {
            return Some(package);
        }
    }
    None
}

// ============================================================================
// Tests
// ============================================================================
