//! End-to-end pipeline orchestration for one source file.
//!
//! `index_file` drives the whole run: canonicalize the source path under
//! the root paths, invoke the upstream parser, then hand the parsed
//! output to `index_parsed`, which runs the simplifier, the anchor
//! extractor, the fixpoint, and assembles the final fact stream (file
//! facts first, then Pass 1 facts, then the final pass's facts, then the
//! symbol-table snapshot).

use std::io::Write;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::Value;
use tracing::{debug, info};

use pyndex_core::error::{IndexError, IndexResult};
use pyndex_core::kythe::{FactStore, VNameFactory};

use crate::ast;
use crate::extract::Extractor;
use crate::fixpoint;
use crate::imports;
use crate::parser::{Meta, ParserInvocation};
use crate::symtab::SymbolTable;

// ============================================================================
// Options
// ============================================================================

/// Options for one indexing run, mirroring the CLI surface.
#[derive(Debug, Clone)]
pub struct IndexOptions {
    /// Command invoking the upstream parser.
    pub parsecmd: String,
    /// Corpus field in emitted VNames.
    pub kythe_corpus: String,
    /// Root field in emitted VNames.
    pub kythe_root: String,
    /// Import search roots (exposed to module resolution consumers).
    pub pythonpath: Vec<PathBuf>,
    /// Prefixes canonicalizing absolute paths into repository paths.
    pub rootpath: Vec<PathBuf>,
    /// Python major version handed to the parser.
    pub python_version: u8,
}

// ============================================================================
// Path canonicalization
// ============================================================================

/// Make a path absolute against the current directory.
fn absolutize(path: &Path) -> IndexResult<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Strip the first matching root-path prefix, yielding the canonical
/// repository-relative path with `/` separators.
///
/// A path reachable under no root is an invariant violation.
pub fn canonical_relative_path(path: &str, rootpaths: &[PathBuf]) -> IndexResult<String> {
    let path = Path::new(path);
    for root in rootpaths {
        if let Ok(rel) = path.strip_prefix(root) {
            let parts: Vec<String> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            return Ok(parts.join("/"));
        }
    }
    Err(IndexError::PathNotUnderRoot {
        path: path.display().to_string(),
    })
}

// ============================================================================
// Pipeline
// ============================================================================

/// Index one source file end to end, writing NDJSON entries to `out`.
pub fn index_file(src: &Path, options: &IndexOptions, out: &mut impl Write) -> IndexResult<()> {
    let src = absolutize(src)?;
    let roots = options
        .rootpath
        .iter()
        .map(|root| absolutize(root))
        .collect::<IndexResult<Vec<_>>>()?;
    let rel_path = canonical_relative_path(&src.to_string_lossy(), &roots)?;
    let module = imports::module_fqn_for_path(&rel_path);
    info!(%rel_path, %module, "indexing");
    debug!(pythonpath = ?options.pythonpath, "import search roots");

    let invocation = ParserInvocation {
        parsecmd: options.parsecmd.clone(),
        kythe_corpus: options.kythe_corpus.clone(),
        kythe_root: options.kythe_root.clone(),
        python_version: options.python_version,
    };
    let output = invocation.run(&src, &module)?;

    let store = index_parsed(&output.meta, &output.ast, &roots, Some(&module))?;
    store.write_ndjson(out)?;
    Ok(())
}

/// Run the semantic pipeline over already-parsed output.
///
/// `expected_module` is the module FQN the parser was asked for; a
/// disagreement with the FQN derived from `meta.path` is fatal.
pub fn index_parsed(
    meta: &Meta,
    ast: &Value,
    rootpaths: &[PathBuf],
    expected_module: Option<&str>,
) -> IndexResult<FactStore> {
    let rel_path = canonical_relative_path(&meta.path, rootpaths)?;
    let module = imports::module_fqn_for_path(&rel_path);
    if let Some(expected) = expected_module {
        if module != expected {
            return Err(IndexError::ModuleMismatch {
                derived: module,
                requested: expected.to_string(),
            });
        }
    }

    let contents = BASE64
        .decode(&meta.contents_b64)
        .map_err(|err| IndexError::malformed_ast(format!("contents_b64: {}", err)))?;

    let vnames = VNameFactory::new(
        meta.kythe_corpus.clone(),
        meta.kythe_root.clone(),
        rel_path.clone(),
        meta.language.clone(),
    );

    let mut store = FactStore::new();
    let file_vname = vnames.file_vname();
    store.add_fact(file_vname.clone(), "node/kind", b"file");
    store.add_fact(file_vname.clone(), "text", &contents);
    let numlines = contents.iter().filter(|&&b| b == b'\n').count();
    store.add_fact(
        file_vname.clone(),
        "x-numlines",
        numlines.to_string().as_bytes(),
    );

    let root_node = ast::simplify(ast)?;
    let file_dir = rel_path
        .rsplit_once('/')
        .map(|(dir, _)| dir)
        .unwrap_or("")
        .to_string();
    let extraction = Extractor::new(&vnames, file_dir).extract(&root_node)?;
    debug!(
        facts = extraction.facts.len(),
        deferred = extraction.deferred.len(),
        "extraction complete"
    );

    let mut symtab = SymbolTable::with_builtins();
    let outcome = fixpoint::run(&vnames, &mut symtab, &extraction.deferred)?;
    debug!(
        passes = outcome.passes,
        converged = outcome.converged,
        symbols = symtab.len(),
        "fixpoint complete"
    );

    store.merge(extraction.facts)?;
    store.merge(outcome.facts)?;
    store.add_fact(file_vname, "x-symtab", symtab.pretty().as_bytes());
    Ok(store)
}

// ============================================================================
// Tests
// ============================================================================
