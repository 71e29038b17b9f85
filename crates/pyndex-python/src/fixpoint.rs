//! The bounded monotone fixpoint driver.
//!
//! Each pass re-evaluates the deferred obligations (plus obligations
//! synthesized from the current symbol table, which is what turns learned
//! types into further edge emission) against a stable table, with a fresh
//! fact accumulator. Conflicting registrations collect in the reject list
//! and merge into the table at the pass boundary, so the table only grows.
//!
//! The pass budget is a safety backstop for pathological inputs, not a
//! correctness condition: the union lattice is finite, so the fixpoint
//! terminates on its own.

use std::collections::BTreeSet;

use pyndex_core::error::IndexResult;
use pyndex_core::kythe::{FactStore, VNameFactory};
use tracing::debug;

use crate::eval::Evaluator;
use crate::symtab::SymbolTable;
use crate::types::Deferred;

/// Upper bound on evaluation passes.
pub const PASS_LIMIT: usize = 5;

// ============================================================================
// Outcome
// ============================================================================

/// What a fixpoint run produced.
#[derive(Debug)]
pub struct FixpointOutcome {
    /// The last pass's facts (earlier passes' facts are discarded).
    pub facts: FactStore,
    /// Number of passes run.
    pub passes: usize,
    /// Whether the reject set drained before the pass budget ran out.
    pub converged: bool,
}

// ============================================================================
// Driver
// ============================================================================

/// Run the evaluator to fixpoint over the deferred obligations.
pub fn run(
    vnames: &VNameFactory,
    symtab: &mut SymbolTable,
    deferred: &[Deferred],
) -> IndexResult<FixpointOutcome> {
    let mut last_facts = FactStore::new();
    for pass in 1..=PASS_LIMIT {
        let obligations = obligations_for_pass(symtab, deferred);
        let mut facts = FactStore::new();
        let mut rejects = Vec::new();
        {
            let mut evaluator = Evaluator::new(vnames, symtab, &mut rejects, &mut facts);
            for item in &obligations {
                evaluator.eval_deferred(item)?;
            }
        }
        debug!(
            pass,
            obligations = obligations.len(),
            rejects = rejects.len(),
            "fixpoint pass complete"
        );
        last_facts = facts;
        if rejects.is_empty() {
            return Ok(FixpointOutcome {
                facts: last_facts,
                passes: pass,
                converged: true,
            });
        }
        symtab.merge_rejects(&rejects);
    }
    // Budget exhausted: leftover rejects were folded in above, but no
    // further re-evaluation happens.
    Ok(FixpointOutcome {
        facts: last_facts,
        passes: PASS_LIMIT,
        converged: false,
    })
}

/// The obligations for one pass: the original deferred list in source
/// order, then one synthesized `Expr` per non-empty symbol-table entry in
/// canonical FQN order, de-duplicated keeping first occurrences.
fn obligations_for_pass(symtab: &SymbolTable, deferred: &[Deferred]) -> Vec<Deferred> {
    let mut combined: Vec<Deferred> = deferred.to_vec();
    for (_, value) in symtab.iter() {
        if !value.is_empty() {
            combined.push(Deferred::Expr(value.clone()));
        }
    }
    let mut seen = BTreeSet::new();
    combined.retain(|item| seen.insert(item.clone()));
    combined
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symtab::BUILTIN_STR;
    use crate::types::{Astn, EdgeKind, TypeTerm, UnionType};
    use pyndex_core::kythe::Entry;

    fn factory() -> VNameFactory {
        VNameFactory::new("", "", "pkg/mod.py", "python")
    }

    fn fqn_union(fqn: &str) -> UnionType {
        UnionType::single(TypeTerm::fqn(fqn))
    }

    mod convergence_tests {
        use super::*;

        #[test]
        fn declarations_in_source_order_converge_in_one_pass() {
            let vnames = factory();
            let mut symtab = SymbolTable::with_builtins();
            let deferred = vec![
                Deferred::ClassDecl {
                    fqn: "pkg.mod.C".to_string(),
                    bases: vec![],
                },
                Deferred::Assign {
                    lhs: fqn_union("pkg.mod.c"),
                    rhs: UnionType::single(TypeTerm::Call {
                        atom: fqn_union("pkg.mod.C"),
                        args: vec![],
                    }),
                },
            ];
            let outcome = run(&vnames, &mut symtab, &deferred).unwrap();
            assert!(outcome.converged);
            assert_eq!(outcome.passes, 1);
            assert_eq!(
                symtab.get("pkg.mod.c"),
                Some(&UnionType::single(TypeTerm::class0("pkg.mod.C")))
            );
        }

        #[test]
        fn use_before_definition_needs_extra_passes() {
            let vnames = factory();
            let mut symtab = SymbolTable::with_builtins();
            // The assignment precedes the class declaration, so the first
            // pass registers a provisional empty entry, the declaration is
            // rejected against it, and later passes re-resolve.
            let deferred = vec![
                Deferred::Assign {
                    lhs: fqn_union("pkg.mod.c"),
                    rhs: UnionType::single(TypeTerm::Call {
                        atom: fqn_union("pkg.mod.C"),
                        args: vec![],
                    }),
                },
                Deferred::ClassDecl {
                    fqn: "pkg.mod.C".to_string(),
                    bases: vec![],
                },
            ];
            let outcome = run(&vnames, &mut symtab, &deferred).unwrap();
            assert!(outcome.converged);
            assert!(outcome.passes > 1);
            assert_eq!(
                symtab.get("pkg.mod.c").map(|u| u.contains(&TypeTerm::class0("pkg.mod.C"))),
                Some(true)
            );
        }

        #[test]
        fn pass_budget_bounds_the_run() {
            let vnames = factory();
            let mut symtab = SymbolTable::with_builtins();
            let outcome = run(&vnames, &mut symtab, &[]).unwrap();
            assert!(outcome.converged);
            assert!(outcome.passes <= PASS_LIMIT);
        }
    }

    mod monotonicity_tests {
        use super::*;

        #[test]
        fn table_entries_only_grow() {
            let vnames = factory();
            let mut symtab = SymbolTable::with_builtins();
            let deferred = vec![
                Deferred::Assign {
                    lhs: fqn_union("pkg.mod.x"),
                    rhs: fqn_union("pkg.mod.C"),
                },
                Deferred::ClassDecl {
                    fqn: "pkg.mod.C".to_string(),
                    bases: vec![],
                },
            ];
            let before = symtab.clone();
            run(&vnames, &mut symtab, &deferred).unwrap();
            for (fqn, value) in before.iter() {
                let after = symtab.get(fqn).expect("entry must survive");
                assert!(value.is_subset_of(after), "entry shrank: {}", fqn);
            }
        }

        #[test]
        fn final_unions_are_canonical() {
            let vnames = factory();
            let mut symtab = SymbolTable::with_builtins();
            let deferred = vec![
                Deferred::ClassDecl {
                    fqn: "pkg.mod.C".to_string(),
                    bases: vec![],
                },
                Deferred::Assign {
                    lhs: fqn_union("pkg.mod.x"),
                    rhs: UnionType::from_terms(vec![
                        TypeTerm::fqn("pkg.mod.C"),
                        TypeTerm::class0(BUILTIN_STR),
                    ]),
                },
            ];
            run(&vnames, &mut symtab, &deferred).unwrap();
            for (_, value) in symtab.iter() {
                assert!(value.is_canonical());
            }
        }
    }

    mod emission_tests {
        use super::*;

        fn edges(facts: &FactStore) -> Vec<(String, String)> {
            facts
                .entries()
                .filter_map(|entry| match entry {
                    Entry::Edge(edge) => {
                        Some((edge.edge_kind.clone(), edge.target.signature.clone()))
                    }
                    Entry::Fact(_) => None,
                })
                .collect()
        }

        #[test]
        fn learned_types_produce_edges_in_the_final_pass() {
            let vnames = factory();
            let mut symtab = SymbolTable::with_builtins();
            // y = c.x with c's class learned only via an earlier binding.
            let deferred = vec![
                Deferred::ClassDecl {
                    fqn: "pkg.mod.C".to_string(),
                    bases: vec![],
                },
                Deferred::Assign {
                    lhs: fqn_union("pkg.mod.c"),
                    rhs: UnionType::single(TypeTerm::Call {
                        atom: fqn_union("pkg.mod.C"),
                        args: vec![],
                    }),
                },
                Deferred::Assign {
                    lhs: fqn_union("pkg.mod.y"),
                    rhs: UnionType::single(TypeTerm::Dot {
                        atom: fqn_union("pkg.mod.c"),
                        attr: Astn::new(30, 31, "x"),
                        edge: EdgeKind::Ref,
                    }),
                },
            ];
            let outcome = run(&vnames, &mut symtab, &deferred).unwrap();
            assert_eq!(
                edges(&outcome.facts),
                vec![("/kythe/edge/ref".to_string(), "pkg.mod.C.x".to_string())]
            );
        }

        #[test]
        fn repeated_runs_are_deterministic() {
            let build = || {
                let vnames = factory();
                let mut symtab = SymbolTable::with_builtins();
                let deferred = vec![
                    Deferred::ClassDecl {
                        fqn: "pkg.mod.C".to_string(),
                        bases: vec![],
                    },
                    Deferred::Assign {
                        lhs: fqn_union("pkg.mod.c"),
                        rhs: UnionType::single(TypeTerm::Call {
                            atom: fqn_union("pkg.mod.C"),
                            args: vec![],
                        }),
                    },
                ];
                let outcome = run(&vnames, &mut symtab, &deferred).unwrap();
                let mut buf = Vec::new();
                outcome.facts.write_ndjson(&mut buf).unwrap();
                (String::from_utf8(buf).unwrap(), symtab.pretty())
            };
            assert_eq!(build(), build());
        }
    }
}
