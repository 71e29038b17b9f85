//! Pass 2: symbolic evaluation of deferred expressions.
//!
//! The evaluator interprets each deferred expression against the symbol
//! table, producing attribute and import edges plus new symbol bindings.
//! FQN resolution has two modes: `Resolve` consults the table (references
//! resolve to their learned types), `Preserve` leaves FQNs symbolic so
//! assignment targets stay bindable. Dot atoms always resolve, whichever
//! mode the surrounding evaluation is in.
//!
//! The evaluator never fails on semantic ambiguity: conflicting bindings
//! go through the reject channel and the fixpoint driver decides.

use std::collections::BTreeSet;

use pyndex_core::error::IndexResult;
use pyndex_core::kythe::{FactStore, VNameFactory};
use tracing::trace;

use crate::extract::anchor_facts;
use crate::symtab::{Reject, SymbolTable};
use crate::types::{Astn, Deferred, EdgeKind, TypeTerm, UnionType};

// ============================================================================
// Lookup mode
// ============================================================================

/// Whether FQN terms are resolved against the symbol table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Resolve FQNs to their current table entries (reference positions).
    Resolve,
    /// Keep FQNs symbolic (binding positions on an assignment target).
    Preserve,
}

// ============================================================================
// Evaluator
// ============================================================================

/// Interprets deferred expressions against the symbol table.
pub struct Evaluator<'a> {
    vnames: &'a VNameFactory,
    symtab: &'a mut SymbolTable,
    rejects: &'a mut Vec<Reject>,
    facts: &'a mut FactStore,
}

impl<'a> Evaluator<'a> {
    /// Create an evaluator writing into the given accumulators.
    pub fn new(
        vnames: &'a VNameFactory,
        symtab: &'a mut SymbolTable,
        rejects: &'a mut Vec<Reject>,
        facts: &'a mut FactStore,
    ) -> Self {
        Evaluator {
            vnames,
            symtab,
            rejects,
            facts,
        }
    }

    /// Evaluate one deferred expression.
    pub fn eval_deferred(&mut self, item: &Deferred) -> IndexResult<()> {
        trace!(?item, "evaluate");
        match item {
            Deferred::Assign { lhs, rhs } => {
                // Rhs first, with lookup, so all fqns resolve; then Lhs
                // without lookup, so binding names stay symbolic.
                let rhs_value = self.eval_union(rhs, Lookup::Resolve)?;
                let lhs_value = self.eval_union(lhs, Lookup::Preserve)?;
                if let Some(fqn) = lhs_value.as_single_fqn() {
                    let fqn = fqn.to_string();
                    self.register(&fqn, rhs_value);
                }
                Ok(())
            }
            Deferred::Expr(value) => {
                let _ = self.eval_union(value, Lookup::Resolve)?;
                Ok(())
            }
            Deferred::ClassDecl { fqn, bases } => {
                self.register(
                    fqn,
                    UnionType::single(TypeTerm::Class {
                        fqn: fqn.clone(),
                        bases: bases.clone(),
                    }),
                );
                Ok(())
            }
            Deferred::FuncDecl { fqn, ret } => {
                self.register(
                    fqn,
                    UnionType::single(TypeTerm::Func {
                        fqn: fqn.clone(),
                        ret: ret.clone(),
                    }),
                );
                Ok(())
            }
            Deferred::ImportFrom { path, fqn } => {
                self.register(
                    fqn,
                    UnionType::single(TypeTerm::Import {
                        fqn: fqn.clone(),
                        path: path.clone(),
                    }),
                );
                Ok(())
            }
        }
    }

    /// Evaluate every term of a union and merge the results.
    pub fn eval_union(&mut self, value: &UnionType, lookup: Lookup) -> IndexResult<UnionType> {
        let mut result = UnionType::empty();
        for term in value.iter() {
            let evaluated = self.eval_term(term, lookup)?;
            result.union_with(&evaluated);
        }
        Ok(result)
    }

    fn eval_term(&mut self, term: &TypeTerm, lookup: Lookup) -> IndexResult<UnionType> {
        match term {
            TypeTerm::Fqn(fqn) => Ok(self.eval_fqn(fqn, lookup)),
            TypeTerm::Dot { atom, attr, edge } => self.eval_dot(atom, attr, *edge, lookup),
            TypeTerm::Call { atom, args } => self.eval_call(atom, args, lookup),
            TypeTerm::Class { fqn, bases } => {
                let bases = bases
                    .iter()
                    .map(|base| self.eval_union(base, lookup))
                    .collect::<IndexResult<Vec<_>>>()?;
                Ok(UnionType::single(TypeTerm::Class {
                    fqn: fqn.clone(),
                    bases,
                }))
            }
            TypeTerm::Func { fqn, ret } => {
                let ret = self.eval_union(ret, lookup)?;
                Ok(UnionType::single(TypeTerm::Func {
                    fqn: fqn.clone(),
                    ret,
                }))
            }
            TypeTerm::Import { .. } | TypeTerm::Var { .. } | TypeTerm::Apply { .. } => {
                Ok(UnionType::single(term.clone()))
            }
            // Operator applications keep their astns verbatim in the term
            // but contribute no type information.
            TypeTerm::CallOp { .. }
            | TypeTerm::Ellipsis
            | TypeTerm::Omitted
            | TypeTerm::Star
            | TypeTerm::Todo(_) => Ok(UnionType::empty()),
        }
    }

    /// Resolve one FQN per the lookup mode.
    ///
    /// In `Resolve` mode an absent name is registered with the provisional
    /// empty union, so every referenced FQN ends up in the table.
    fn eval_fqn(&mut self, fqn: &str, lookup: Lookup) -> UnionType {
        match lookup {
            Lookup::Preserve => UnionType::single(TypeTerm::fqn(fqn)),
            Lookup::Resolve => match self.symtab.get(fqn) {
                Some(value) => value.clone(),
                None => {
                    self.register(fqn, UnionType::empty());
                    UnionType::empty()
                }
            },
        }
    }

    /// Resolve an attribute access against the atom's types.
    ///
    /// Class atoms contribute `C.attr` FQNs and an edge per distinct
    /// target; import atoms contribute only an edge to `path::attr`.
    /// Targets are collected into ordered sets per site, so two class
    /// terms sharing an FQN emit one edge.
    fn eval_dot(
        &mut self,
        atom: &UnionType,
        attr: &Astn,
        edge: EdgeKind,
        lookup: Lookup,
    ) -> IndexResult<UnionType> {
        let atom_value = self.eval_union(atom, Lookup::Resolve)?;

        let mut class_targets: BTreeSet<String> = BTreeSet::new();
        let mut import_targets: BTreeSet<String> = BTreeSet::new();
        for term in atom_value.iter() {
            match term {
                TypeTerm::Class { fqn, .. } => {
                    class_targets.insert(format!("{}.{}", fqn, attr.value));
                }
                TypeTerm::Import { path, .. } => {
                    import_targets.insert(format!("{}::{}", path, attr.value));
                }
                _ => {}
            }
        }

        if class_targets.is_empty() && import_targets.is_empty() {
            return Ok(UnionType::empty());
        }

        let anchor = anchor_facts(self.facts, self.vnames, attr);
        let mut result = UnionType::empty();
        for target in &class_targets {
            self.facts.add_edge(
                anchor.clone(),
                edge.kythe_name(),
                self.vnames.semantic_vname(target),
            )?;
            result.union_with(&self.eval_fqn(target, lookup));
        }
        for target in &import_targets {
            self.facts.add_edge(
                anchor.clone(),
                edge.kythe_name(),
                self.vnames.semantic_vname(target),
            )?;
        }
        Ok(result)
    }

    /// Resolve a call against the atom's types.
    ///
    /// Constructing a class yields the class type; calling a function
    /// yields its return union; anything else becomes an opaque
    /// application.
    fn eval_call(
        &mut self,
        atom: &UnionType,
        args: &[UnionType],
        lookup: Lookup,
    ) -> IndexResult<UnionType> {
        let atom_value = self.eval_union(atom, Lookup::Resolve)?;
        let arg_values = args
            .iter()
            .map(|arg| self.eval_union(arg, Lookup::Resolve))
            .collect::<IndexResult<Vec<_>>>()?;

        let mut result = UnionType::empty();
        for term in atom_value.iter() {
            match term {
                TypeTerm::Class { .. } => result.insert(term.clone()),
                TypeTerm::Func { ret, .. } => {
                    let ret_value = self.eval_union(&ret.clone(), lookup)?;
                    result.union_with(&ret_value);
                }
                other => result.insert(TypeTerm::Apply {
                    callee: Box::new(other.clone()),
                    args: arg_values.clone(),
                }),
            }
        }
        Ok(result)
    }

    fn register(&mut self, fqn: &str, ty: UnionType) {
        let outcome = self.symtab.register(fqn, ty, self.rejects);
        trace!(fqn, ?outcome, "register");
    }
}

// ============================================================================
// Tests
// ============================================================================
