//! Kythe fact model: VNames, fact/edge entries, and the de-duplicating store.
//!
//! This module provides the output-side data model of the indexer:
//! - `VName`: a Kythe node identifier tuple (corpus, root, path, language,
//!   signature), serialized with empty fields omitted
//! - `Entry`: a single fact or edge record in the Kythe storage format
//! - `FactStore`: in-memory accumulator with exact de-duplication and
//!   deterministic (insertion-order) iteration
//!
//! De-duplication discipline: facts are first-write-wins on
//! `(source, fact_name)`; edges must be unique on `(source, kind, target)`
//! and a duplicate edge is an invariant violation.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{self, Write};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{IndexError, IndexResult};

// ============================================================================
// VName
// ============================================================================

/// A Kythe node identifier.
///
/// See <https://kythe.io/docs/schema/#_vname_conventions>. Fields that are
/// empty are omitted from the JSON encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VName {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub corpus: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub root: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub language: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub signature: String,
}

impl VName {
    /// VName of the file itself: path but no language or signature.
    pub fn file(corpus: &str, root: &str, path: &str) -> Self {
        VName {
            corpus: corpus.to_string(),
            root: root.to_string(),
            path: path.to_string(),
            ..VName::default()
        }
    }

    /// VName of an anchor: `@start:end` signature plus the file path.
    pub fn anchor(corpus: &str, root: &str, path: &str, start: usize, end: usize) -> Self {
        VName {
            corpus: corpus.to_string(),
            root: root.to_string(),
            path: path.to_string(),
            signature: format!("@{}:{}", start, end),
            ..VName::default()
        }
    }

    /// VName of a semantic node: FQN signature plus language, no path.
    pub fn semantic(corpus: &str, root: &str, language: &str, signature: &str) -> Self {
        VName {
            corpus: corpus.to_string(),
            root: root.to_string(),
            language: language.to_string(),
            signature: signature.to_string(),
            ..VName::default()
        }
    }
}

impl std::fmt::Display for VName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.signature.is_empty() {
            write!(f, "{}", self.path)
        } else {
            write!(f, "{}", self.signature)
        }
    }
}

/// Stamps VNames with the process-scoped corpus/root/path/language fields.
///
/// One factory exists per indexed file; every emitted VName goes through it.
#[derive(Debug, Clone)]
pub struct VNameFactory {
    corpus: String,
    root: String,
    path: String,
    language: String,
}

impl VNameFactory {
    /// Create a factory for one source file.
    pub fn new(
        corpus: impl Into<String>,
        root: impl Into<String>,
        path: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        VNameFactory {
            corpus: corpus.into(),
            root: root.into(),
            path: path.into(),
            language: language.into(),
        }
    }

    /// The file's own VName.
    pub fn file_vname(&self) -> VName {
        VName::file(&self.corpus, &self.root, &self.path)
    }

    /// An anchor VName for a byte span in the file.
    pub fn anchor_vname(&self, start: usize, end: usize) -> VName {
        VName::anchor(&self.corpus, &self.root, &self.path, start, end)
    }

    /// A semantic VName for an FQN.
    pub fn semantic_vname(&self, fqn: &str) -> VName {
        VName::semantic(&self.corpus, &self.root, &self.language, fqn)
    }
}

// ============================================================================
// Entries
// ============================================================================

/// A single fact: `(source, fact_name) -> fact_value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    pub source: VName,
    pub fact_name: String,
    /// Base64-encoded fact value.
    pub fact_value: String,
}

/// A single edge: `source --edge_kind--> target`.
///
/// Per the Kythe storage format an edge record carries `fact_name: "/"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source: VName,
    pub edge_kind: String,
    pub target: VName,
    pub fact_name: String,
}

/// A fact or edge record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Entry {
    Edge(Edge),
    Fact(Fact),
}

/// Unique identifier of an entry within a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct EntryId(u32);

// ============================================================================
// FactStore
// ============================================================================

/// In-memory accumulator for Kythe facts and edges.
///
/// Provides:
/// - exact de-duplication (facts first-write-wins, edges strict-unique)
/// - deterministic iteration in insertion order
/// - merging of a later store into an earlier one at pass boundaries
#[derive(Debug, Default)]
pub struct FactStore {
    entries: BTreeMap<EntryId, Entry>,
    /// (source, fact_name) -> entry, for first-write-wins facts.
    fact_index: HashMap<(VName, String), EntryId>,
    /// (source, edge_kind, target), for strict edge uniqueness.
    edge_index: HashSet<(VName, String, VName)>,
    next_id: u32,
}

impl FactStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        FactStore::default()
    }

    fn next_entry_id(&mut self) -> EntryId {
        let id = EntryId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Add a fact. The short `fact_name` gets the `/kythe/` prefix.
    ///
    /// First write wins: returns `true` if the fact was inserted, `false`
    /// if a fact with the same `(source, fact_name)` already exists.
    pub fn add_fact(&mut self, source: VName, fact_name: &str, fact_value: &[u8]) -> bool {
        let full_name = format!("/kythe/{}", fact_name);
        let key = (source.clone(), full_name.clone());
        if self.fact_index.contains_key(&key) {
            return false;
        }
        let id = self.next_entry_id();
        self.fact_index.insert(key, id);
        self.entries.insert(
            id,
            Entry::Fact(Fact {
                source,
                fact_name: full_name,
                fact_value: BASE64.encode(fact_value),
            }),
        );
        true
    }

    /// Add an edge. The short `edge_kind` gets the `/kythe/edge/` prefix.
    ///
    /// A duplicate `(source, kind, target)` is an invariant violation: it
    /// means a caller is double-walking the tree or the pass accounting is
    /// wrong.
    pub fn add_edge(&mut self, source: VName, edge_kind: &str, target: VName) -> IndexResult<()> {
        let full_kind = format!("/kythe/edge/{}", edge_kind);
        let key = (source.clone(), full_kind.clone(), target.clone());
        if self.edge_index.contains(&key) {
            return Err(IndexError::DuplicateEdge {
                source_node: source.to_string(),
                edge_kind: full_kind,
                target: target.to_string(),
            });
        }
        self.edge_index.insert(key);
        let id = self.next_entry_id();
        self.entries.insert(
            id,
            Entry::Edge(Edge {
                source,
                edge_kind: full_kind,
                target,
                fact_name: "/".to_string(),
            }),
        );
        Ok(())
    }

    /// Whether a fact with this `(source, short fact_name)` exists.
    pub fn has_fact(&self, source: &VName, fact_name: &str) -> bool {
        let full_name = format!("/kythe/{}", fact_name);
        self.fact_index
            .contains_key(&(source.clone(), full_name))
    }

    /// Whether an edge with this `(source, short edge_kind, target)` exists.
    pub fn has_edge(&self, source: &VName, edge_kind: &str, target: &VName) -> bool {
        let full_kind = format!("/kythe/edge/{}", edge_kind);
        self.edge_index
            .contains(&(source.clone(), full_kind, target.clone()))
    }

    /// Merge `other` into `self` at a pass boundary.
    ///
    /// Facts keep first-write-wins semantics across the merge; an edge
    /// already present in `self` is an invariant violation as usual.
    pub fn merge(&mut self, other: FactStore) -> IndexResult<()> {
        for (_, entry) in other.entries {
            match entry {
                Entry::Fact(fact) => {
                    let key = (fact.source.clone(), fact.fact_name.clone());
                    if !self.fact_index.contains_key(&key) {
                        let id = self.next_entry_id();
                        self.fact_index.insert(key, id);
                        self.entries.insert(id, Entry::Fact(fact));
                    }
                }
                Entry::Edge(edge) => {
                    let key = (
                        edge.source.clone(),
                        edge.edge_kind.clone(),
                        edge.target.clone(),
                    );
                    if self.edge_index.contains(&key) {
                        return Err(IndexError::DuplicateEdge {
                            source_node: edge.source.to_string(),
                            edge_kind: edge.edge_kind,
                            target: edge.target.to_string(),
                        });
                    }
                    self.edge_index.insert(key);
                    let id = self.next_entry_id();
                    self.entries.insert(id, Entry::Edge(edge));
                }
            }
        }
        Ok(())
    }

    /// Iterate over entries in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    /// Number of fact entries.
    pub fn fact_count(&self) -> usize {
        self.fact_index.len()
    }

    /// Number of edge entries.
    pub fn edge_count(&self) -> usize {
        self.edge_index.len()
    }

    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write all entries as newline-delimited JSON, one object per line.
    pub fn write_ndjson(&self, out: &mut impl Write) -> io::Result<()> {
        for entry in self.entries.values() {
            serde_json::to_writer(&mut *out, entry)?;
            out.write_all(b"\n")?;
        }
        Ok(())
    }
}

/// Decode a base64 fact value (used by tests and debugging tools).
pub fn decode_fact_value(encoded: &str) -> Option<Vec<u8>> {
    BASE64.decode(encoded).ok()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn factory() -> VNameFactory {
        VNameFactory::new("corpus", "root", "pkg/mod.py", "python")
    }

    mod vname_tests {
        use super::*;

        #[test]
        fn file_vname_has_no_language_or_signature() {
            let v = factory().file_vname();
            assert_eq!(v.path, "pkg/mod.py");
            assert!(v.language.is_empty());
            assert!(v.signature.is_empty());
        }

        #[test]
        fn anchor_vname_uses_span_signature() {
            let v = factory().anchor_vname(10, 14);
            assert_eq!(v.signature, "@10:14");
            assert_eq!(v.path, "pkg/mod.py");
            assert!(v.language.is_empty());
        }

        #[test]
        fn semantic_vname_has_language_but_no_path() {
            let v = factory().semantic_vname("pkg.mod.C.x");
            assert_eq!(v.signature, "pkg.mod.C.x");
            assert_eq!(v.language, "python");
            assert!(v.path.is_empty());
        }

        #[test]
        fn empty_fields_are_omitted_from_json() {
            let v = VName::semantic("", "", "python", "m.x");
            let json = serde_json::to_string(&v).unwrap();
            assert_eq!(json, "{\"language\":\"python\",\"signature\":\"m.x\"}");
        }
    }

    mod fact_tests {
        use super::*;

        #[test]
        fn fact_value_is_base64() {
            let mut store = FactStore::new();
            store.add_fact(factory().file_vname(), "node/kind", b"file");
            let entry = store.entries().next().unwrap();
            match entry {
                Entry::Fact(fact) => {
                    assert_eq!(fact.fact_name, "/kythe/node/kind");
                    assert_eq!(decode_fact_value(&fact.fact_value).unwrap(), b"file");
                }
                Entry::Edge(_) => panic!("expected fact"),
            }
        }

        #[test]
        fn first_write_wins() {
            let mut store = FactStore::new();
            let v = factory().semantic_vname("m.C");
            assert!(store.add_fact(v.clone(), "node/kind", b"record"));
            assert!(!store.add_fact(v.clone(), "node/kind", b"variable"));
            assert_eq!(store.fact_count(), 1);
            let entry = store.entries().next().unwrap();
            match entry {
                Entry::Fact(fact) => {
                    assert_eq!(decode_fact_value(&fact.fact_value).unwrap(), b"record");
                }
                Entry::Edge(_) => panic!("expected fact"),
            }
        }

        #[test]
        fn distinct_fact_names_coexist() {
            let mut store = FactStore::new();
            let v = factory().anchor_vname(0, 3);
            assert!(store.add_fact(v.clone(), "node/kind", b"anchor"));
            assert!(store.add_fact(v.clone(), "loc/start", b"0"));
            assert!(store.add_fact(v, "loc/end", b"3"));
            assert_eq!(store.fact_count(), 3);
        }
    }

    mod edge_tests {
        use super::*;

        #[test]
        fn edge_records_have_slash_fact_name() {
            let mut store = FactStore::new();
            let anchor = factory().anchor_vname(0, 3);
            let target = factory().semantic_vname("m.x");
            store.add_edge(anchor, "defines/binding", target).unwrap();
            let entry = store.entries().next().unwrap();
            match entry {
                Entry::Edge(edge) => {
                    assert_eq!(edge.edge_kind, "/kythe/edge/defines/binding");
                    assert_eq!(edge.fact_name, "/");
                }
                Entry::Fact(_) => panic!("expected edge"),
            }
        }

        #[test]
        fn duplicate_edge_is_an_error() {
            let mut store = FactStore::new();
            let anchor = factory().anchor_vname(0, 3);
            let target = factory().semantic_vname("m.x");
            store
                .add_edge(anchor.clone(), "ref", target.clone())
                .unwrap();
            let err = store.add_edge(anchor, "ref", target).unwrap_err();
            assert!(matches!(err, IndexError::DuplicateEdge { .. }));
        }

        #[test]
        fn same_source_different_targets_are_distinct() {
            let mut store = FactStore::new();
            let anchor = factory().anchor_vname(0, 3);
            store
                .add_edge(anchor.clone(), "ref", factory().semantic_vname("m.C.x"))
                .unwrap();
            store
                .add_edge(anchor, "ref", factory().semantic_vname("m.D.x"))
                .unwrap();
            assert_eq!(store.edge_count(), 2);
        }
    }

    mod merge_tests {
        use super::*;

        #[test]
        fn merge_keeps_first_fact() {
            let mut first = FactStore::new();
            let v = factory().semantic_vname("m.C");
            first.add_fact(v.clone(), "node/kind", b"record");

            let mut second = FactStore::new();
            second.add_fact(v.clone(), "node/kind", b"variable");
            second.add_fact(v, "subkind", b"class");

            first.merge(second).unwrap();
            assert_eq!(first.fact_count(), 2);
            let values: Vec<_> = first
                .entries()
                .filter_map(|e| match e {
                    Entry::Fact(f) => decode_fact_value(&f.fact_value),
                    Entry::Edge(_) => None,
                })
                .collect();
            assert_eq!(values, vec![b"record".to_vec(), b"class".to_vec()]);
        }

        #[test]
        fn merge_rejects_duplicate_edge() {
            let anchor = factory().anchor_vname(5, 8);
            let target = factory().semantic_vname("m.y");

            let mut first = FactStore::new();
            first
                .add_edge(anchor.clone(), "ref", target.clone())
                .unwrap();

            let mut second = FactStore::new();
            second.add_edge(anchor, "ref", target).unwrap();

            assert!(first.merge(second).is_err());
        }

        #[test]
        fn merge_preserves_insertion_order() {
            let mut first = FactStore::new();
            first.add_fact(factory().file_vname(), "node/kind", b"file");

            let mut second = FactStore::new();
            second.add_fact(factory().semantic_vname("m.x"), "node/kind", b"variable");

            first.merge(second).unwrap();
            let names: Vec<_> = first
                .entries()
                .filter_map(|e| match e {
                    Entry::Fact(f) => Some(f.source.to_string()),
                    Entry::Edge(_) => None,
                })
                .collect();
            assert_eq!(names, vec!["pkg/mod.py".to_string(), "m.x".to_string()]);
        }
    }

    mod ndjson_tests {
        use super::*;

        #[test]
        fn writes_one_object_per_line() {
            let mut store = FactStore::new();
            store.add_fact(factory().file_vname(), "node/kind", b"file");
            store
                .add_edge(
                    factory().anchor_vname(0, 1),
                    "ref",
                    factory().semantic_vname("m.x"),
                )
                .unwrap();

            let mut buf = Vec::new();
            store.write_ndjson(&mut buf).unwrap();
            let text = String::from_utf8(buf).unwrap();
            let lines: Vec<_> = text.lines().collect();
            assert_eq!(lines.len(), 2);
            for line in lines {
                serde_json::from_str::<serde_json::Value>(line).unwrap();
            }
        }

        #[test]
        fn fact_line_field_order() {
            let mut store = FactStore::new();
            store.add_fact(factory().file_vname(), "text", b"x = 1\n");
            let mut buf = Vec::new();
            store.write_ndjson(&mut buf).unwrap();
            let text = String::from_utf8(buf).unwrap();
            assert!(text.starts_with("{\"source\":"));
            let fact_pos = text.find("\"fact_name\"").unwrap();
            let value_pos = text.find("\"fact_value\"").unwrap();
            assert!(fact_pos < value_pos);
        }
    }
}
