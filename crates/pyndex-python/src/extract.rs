//! Pass 1: anchor extraction and deferred-expression accumulation.
//!
//! A structural recursion over the node IR. Each node yields the union
//! type describing its value; along the way the extractor emits anchor
//! and binding/ref facts for name sites and pushes deferred expressions
//! (assignments, bare expressions, declarations) for the evaluator.
//!
//! Statements yield the empty union; their meaning lives entirely in the
//! deferred stream.

use pyndex_core::error::IndexResult;
use pyndex_core::kythe::{FactStore, VName, VNameFactory};
use tracing::trace;

use crate::ast::{ImportAsName, Node};
use crate::imports;
use crate::types::{Astn, Deferred, EdgeKind, TypeTerm, UnionType};

// ============================================================================
// Anchor emission
// ============================================================================

/// Emit the anchor facts for a token span and return the anchor VName.
///
/// Anchor facts are first-write-wins, so a second site at the same span
/// re-uses the VName and adds nothing. Shared by both passes.
pub(crate) fn anchor_facts(facts: &mut FactStore, vnames: &VNameFactory, astn: &Astn) -> VName {
    let anchor = vnames.anchor_vname(astn.start, astn.end);
    facts.add_fact(anchor.clone(), "node/kind", b"anchor");
    facts.add_fact(anchor.clone(), "loc/start", astn.start.to_string().as_bytes());
    facts.add_fact(anchor.clone(), "loc/end", astn.end.to_string().as_bytes());
    anchor
}

// ============================================================================
// Extraction result
// ============================================================================

/// Everything Pass 1 produces for one file.
#[derive(Debug)]
pub struct Extraction {
    /// Anchor, binding and node-kind facts.
    pub facts: FactStore,
    /// Deferred expression obligations, in source order.
    pub deferred: Vec<Deferred>,
}

// ============================================================================
// Extractor
// ============================================================================

/// The Pass 1 walker.
pub struct Extractor<'a> {
    vnames: &'a VNameFactory,
    /// Directory segment of the file being indexed (for relative imports).
    file_dir: String,
    facts: FactStore,
    deferred: Vec<Deferred>,
}

impl<'a> Extractor<'a> {
    /// Create an extractor for one file.
    pub fn new(vnames: &'a VNameFactory, file_dir: impl Into<String>) -> Self {
        Extractor {
            vnames,
            file_dir: file_dir.into(),
            facts: FactStore::new(),
            deferred: Vec::new(),
        }
    }

    /// Walk the tree and return the accumulated facts and obligations.
    pub fn extract(mut self, root: &Node) -> IndexResult<Extraction> {
        let _ = self.walk(root)?;
        Ok(Extraction {
            facts: self.facts,
            deferred: self.deferred,
        })
    }

    // ========================================================================
    // Fact emission
    // ========================================================================

    /// Emit the anchor facts for a token span, re-using the span's VName.
    fn emit_anchor(&mut self, astn: &Astn) -> VName {
        anchor_facts(&mut self.facts, self.vnames, astn)
    }

    /// Emit an anchor plus its edge to a semantic node, with optional
    /// node-kind facts on the target.
    ///
    /// A second site with the same span, edge kind and target is a no-op,
    /// so a token the cooked tree reaches twice emits one anchor and one
    /// edge.
    fn emit_name(
        &mut self,
        astn: &Astn,
        fqn: &str,
        edge: EdgeKind,
        node_kind: Option<&[u8]>,
        subkind: Option<&[u8]>,
    ) -> IndexResult<()> {
        let anchor = self.emit_anchor(astn);
        let target = self.vnames.semantic_vname(fqn);
        if let Some(kind) = node_kind {
            self.facts.add_fact(target.clone(), "node/kind", kind);
        }
        if let Some(subkind) = subkind {
            self.facts.add_fact(target.clone(), "subkind", subkind);
        }
        if !self.facts.has_edge(&anchor, edge.kythe_name(), &target) {
            self.facts.add_edge(anchor, edge.kythe_name(), target)?;
        }
        Ok(())
    }

    // ========================================================================
    // The walk
    // ========================================================================

    fn walk(&mut self, node: &Node) -> IndexResult<UnionType> {
        trace!(?node, "extract");
        match node {
            Node::NameBindsFqn { fqn, astn } => {
                self.emit_name(astn, fqn, EdgeKind::Binding, Some(b"variable"), None)?;
                Ok(UnionType::single(TypeTerm::fqn(fqn.clone())))
            }
            Node::NameRefFqn { fqn, astn } => {
                self.emit_name(astn, fqn, EdgeKind::Ref, None, None)?;
                Ok(UnionType::single(TypeTerm::fqn(fqn.clone())))
            }
            Node::ClassDefStmt { fqn, astn, bases } => {
                self.emit_name(
                    astn,
                    fqn,
                    EdgeKind::Binding,
                    Some(b"record"),
                    Some(b"class"),
                )?;
                let base_types = bases
                    .iter()
                    .map(|base| self.walk(base))
                    .collect::<IndexResult<Vec<_>>>()?;
                self.deferred.push(Deferred::ClassDecl {
                    fqn: fqn.clone(),
                    bases: base_types.clone(),
                });
                Ok(UnionType::single(TypeTerm::Class {
                    fqn: fqn.clone(),
                    bases: base_types,
                }))
            }
            Node::FuncDefStmt {
                fqn,
                astn,
                return_type,
            } => {
                self.emit_name(astn, fqn, EdgeKind::Binding, Some(b"function"), None)?;
                let ret = self.walk(return_type)?;
                self.deferred.push(Deferred::FuncDecl {
                    fqn: fqn.clone(),
                    ret: ret.clone(),
                });
                Ok(UnionType::single(TypeTerm::Func {
                    fqn: fqn.clone(),
                    ret,
                }))
            }
            Node::AtomDotNode {
                atom,
                attr_astn,
                binds,
            } => {
                let atom_type = self.walk(atom)?;
                Ok(UnionType::single(TypeTerm::Dot {
                    atom: atom_type,
                    attr: attr_astn.clone(),
                    edge: EdgeKind::from_binds(*binds),
                }))
            }
            Node::AtomCallNode { atom, args } => {
                let atom_type = self.walk(atom)?;
                let arg_types = args
                    .iter()
                    .map(|arg| self.walk(arg))
                    .collect::<IndexResult<Vec<_>>>()?;
                Ok(UnionType::single(TypeTerm::Call {
                    atom: atom_type,
                    args: arg_types,
                }))
            }
            Node::NumberNode { .. } => Ok(UnionType::single(TypeTerm::class0(
                crate::symtab::BUILTIN_NUMBER,
            ))),
            Node::StringNode { .. } => Ok(UnionType::single(TypeTerm::class0(
                crate::symtab::BUILTIN_STR,
            ))),
            Node::OpNode { op_astns, args } => {
                let arg_types = args
                    .iter()
                    .map(|arg| self.walk(arg))
                    .collect::<IndexResult<Vec<_>>>()?;
                Ok(UnionType::single(TypeTerm::CallOp {
                    ops: op_astns.clone(),
                    args: arg_types,
                }))
            }
            Node::StarNode { .. } => Ok(UnionType::single(TypeTerm::Star)),
            Node::EllipsisNode => Ok(UnionType::single(TypeTerm::Ellipsis)),
            Node::OmittedNode => Ok(UnionType::single(TypeTerm::Omitted)),
            Node::AssignExprStmt { lhs, rhs } => {
                let lhs_type = self.walk(lhs)?;
                let rhs_type = self.walk(rhs)?;
                self.defer_assign(lhs_type, rhs_type);
                Ok(UnionType::empty())
            }
            Node::ExprStmt { expr } => {
                let expr_type = self.walk(expr)?;
                self.deferred.push(Deferred::Expr(expr_type));
                Ok(UnionType::empty())
            }
            Node::ImportFromStmt {
                from_dots,
                from_name,
                names,
                star,
            } => {
                self.walk_import_from(*from_dots, from_name, names, star.as_ref())?;
                Ok(UnionType::empty())
            }
            Node::PassStmt | Node::BreakStmt | Node::ContinueStmt => Ok(UnionType::empty()),
            Node::Todo { kind, items } => {
                trace!(kind = %kind, "walking unanalyzed construct");
                for item in items {
                    let _ = self.walk(item)?;
                }
                Ok(UnionType::empty())
            }
        }
    }

    /// Assignment normalization: an omitted target discards the
    /// assignment; an omitted or ellipsis source binds the empty union.
    fn defer_assign(&mut self, lhs: UnionType, rhs: UnionType) {
        if lhs == UnionType::single(TypeTerm::Omitted) {
            return;
        }
        let rhs = if rhs == UnionType::single(TypeTerm::Omitted)
            || rhs == UnionType::single(TypeTerm::Ellipsis)
        {
            UnionType::empty()
        } else {
            rhs
        };
        self.deferred.push(Deferred::Assign { lhs, rhs });
    }

    /// `from <dots><name> import ...`: bind each alias and defer its
    /// resolved path; a star import records an unexpanded `*` target.
    fn walk_import_from(
        &mut self,
        from_dots: usize,
        from_name: &[String],
        names: &[ImportAsName],
        star: Option<&Astn>,
    ) -> IndexResult<()> {
        let base = imports::from_import_base(&self.file_dir, from_dots, from_name);
        if let Some(star_astn) = star {
            // The `*` target is recorded but never expanded.
            let target = self.vnames.semantic_vname(&imports::member_path(&base, "*"));
            let anchor = self.emit_anchor(star_astn);
            if !self.facts.has_edge(&anchor, EdgeKind::Ref.kythe_name(), &target) {
                self.facts
                    .add_edge(anchor, EdgeKind::Ref.kythe_name(), target)?;
            }
            return Ok(());
        }
        for alias in names {
            self.emit_name(
                &alias.astn,
                &alias.fqn,
                EdgeKind::Binding,
                Some(b"variable"),
                None,
            )?;
            self.deferred.push(Deferred::ImportFrom {
                path: imports::member_path(&base, &alias.name),
                fqn: alias.fqn.clone(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
