//! The FQN symbol table and the reject-channel registration rules.
//!
//! The table maps fully-qualified names to union types. It is seeded with
//! the built-in classes, mutated only through `register` (inserts for
//! absent names, rejects for conflicting ones), and merged at pass
//! boundaries so it grows monotonically across fixpoint passes.

use std::collections::BTreeMap;

use tracing::debug;

use crate::types::{TypeTerm, UnionType};

// ============================================================================
// Builtins
// ============================================================================

/// Names seeded into every symbol table with empty unions.
///
/// References to these resolve to anchors and ref edges with no type
/// information; only `str` and `Number` carry class types below.
const BUILTIN_NAMES: &[&str] = &[
    "bool",
    "bytes",
    "dict",
    "float",
    "frozenset",
    "getattr",
    "hasattr",
    "id",
    "input",
    "int",
    "isinstance",
    "issubclass",
    "iter",
    "len",
    "list",
    "next",
    "object",
    "open",
    "print",
    "range",
    "repr",
    "set",
    "setattr",
    "super",
    "tuple",
    "type",
    "ArithmeticError",
    "AttributeError",
    "Exception",
    "IndexError",
    "KeyError",
    "RuntimeError",
    "StopIteration",
    "TypeError",
    "ValueError",
];

/// FQN of the built-in string class.
pub const BUILTIN_STR: &str = "builtin.str";

/// FQN of the built-in number class.
pub const BUILTIN_NUMBER: &str = "builtin.Number";

// ============================================================================
// Rejects
// ============================================================================

/// A registration that conflicted with the current table entry and was
/// deferred to the next pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reject {
    pub fqn: String,
    pub ty: UnionType,
}

/// Outcome of one registration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registered {
    /// The name was absent and has been inserted.
    Inserted,
    /// The attempt agreed with (or was subsumed by) the current entry.
    Unchanged,
    /// The attempt conflicted and went to the reject list.
    Rejected,
}

// ============================================================================
// Symbol Table
// ============================================================================

/// Mapping FQN -> union type, in canonical FQN order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTable {
    entries: BTreeMap<String, UnionType>,
}

impl SymbolTable {
    /// Create an empty table (tests only; normal runs seed builtins).
    pub fn new() -> Self {
        SymbolTable::default()
    }

    /// Create a table seeded with the built-in names.
    pub fn with_builtins() -> Self {
        let mut table = SymbolTable::new();
        table
            .entries
            .insert(BUILTIN_STR.to_string(), UnionType::single(TypeTerm::class0(BUILTIN_STR)));
        table.entries.insert(
            BUILTIN_NUMBER.to_string(),
            UnionType::single(TypeTerm::class0(BUILTIN_NUMBER)),
        );
        for name in BUILTIN_NAMES {
            table
                .entries
                .insert(format!("builtin.{}", name), UnionType::empty());
        }
        table
    }

    /// Look up an FQN.
    pub fn get(&self, fqn: &str) -> Option<&UnionType> {
        self.entries.get(fqn)
    }

    /// Whether the table has an entry for this FQN.
    pub fn contains(&self, fqn: &str) -> bool {
        self.entries.contains_key(fqn)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries in canonical FQN order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &UnionType)> {
        self.entries.iter()
    }

    /// Attempt to register `fqn -> ty`.
    ///
    /// - absent: insert and return `Inserted`
    /// - equal or subset of the current entry: return `Unchanged`
    /// - otherwise: push onto `rejects`, leave the table untouched
    pub fn register(&mut self, fqn: &str, ty: UnionType, rejects: &mut Vec<Reject>) -> Registered {
        match self.entries.get(fqn) {
            None => {
                self.entries.insert(fqn.to_string(), ty);
                Registered::Inserted
            }
            Some(current) if ty == *current || ty.is_subset_of(current) => Registered::Unchanged,
            Some(_) => {
                rejects.push(Reject {
                    fqn: fqn.to_string(),
                    ty,
                });
                Registered::Rejected
            }
        }
    }

    /// Merge one reject into the table by union.
    pub fn merge(&mut self, fqn: &str, ty: &UnionType) {
        self.entries
            .entry(fqn.to_string())
            .or_default()
            .union_with(ty);
    }

    /// Merge a whole reject list at a pass boundary.
    pub fn merge_rejects(&mut self, rejects: &[Reject]) {
        debug!(count = rejects.len(), "merging rejects into symbol table");
        for reject in rejects {
            self.merge(&reject.fqn, &reject.ty);
        }
    }

    /// Pretty-print the table for the `/kythe/x-symtab` snapshot fact.
    ///
    /// One line per entry, in canonical FQN order.
    pub fn pretty(&self) -> String {
        let mut out = String::new();
        for (fqn, ty) in &self.entries {
            out.push_str(fqn);
            out.push_str(": ");
            out.push_str(&ty.to_string());
            out.push('\n');
        }
        out
    }
}

// ============================================================================
// Tests
// ============================================================================
