//! The type-term lattice shared by both analysis passes.
//!
//! A `TypeTerm` is the symbolic value of an expression; a `UnionType` is an
//! ordered, duplicate-free set of terms meaning "any of these". Canonical
//! order is part of the public contract (the symbol-table snapshot is
//! observable output), so unions are sorted vectors with structural
//! comparison, never hash sets.

use std::fmt;

// ============================================================================
// Source positions
// ============================================================================

/// A source token: byte offsets into the file plus the literal text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Astn {
    pub start: usize,
    pub end: usize,
    pub value: String,
}

impl Astn {
    /// Create a new token position.
    pub fn new(start: usize, end: usize, value: impl Into<String>) -> Self {
        Astn {
            start,
            end,
            value: value.into(),
        }
    }
}

impl fmt::Display for Astn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "astn({}, {}, {:?})", self.start, self.end, self.value)
    }
}

// ============================================================================
// Edge kinds
// ============================================================================

/// The two anchor edge kinds emitted by the indexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EdgeKind {
    /// `/kythe/edge/defines/binding` (a binding site).
    Binding,
    /// `/kythe/edge/ref` (a reference site).
    Ref,
}

impl EdgeKind {
    /// The short Kythe edge name (the store adds the `/kythe/edge/` prefix).
    pub fn kythe_name(&self) -> &'static str {
        match self {
            EdgeKind::Binding => "defines/binding",
            EdgeKind::Ref => "ref",
        }
    }

    /// Edge kind for a name in a binding (`true`) or reference position.
    pub fn from_binds(binds: bool) -> Self {
        if binds {
            EdgeKind::Binding
        } else {
            EdgeKind::Ref
        }
    }
}

// ============================================================================
// Type terms
// ============================================================================

/// A single symbolic type term.
///
/// The derived `Ord` gives the canonical order used inside unions and in
/// the symbol-table snapshot.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum TypeTerm {
    /// An unresolved reference to the symbol named by this FQN.
    Fqn(String),
    /// A class with its base-class unions.
    Class { fqn: String, bases: Vec<UnionType> },
    /// A function with its return union.
    Func { fqn: String, ret: UnionType },
    /// An imported binding resolving to a module path.
    Import { fqn: String, path: String },
    /// A plain variable binding.
    Var { fqn: String },
    /// Attribute access still to be resolved against the atom's types.
    Dot {
        atom: UnionType,
        attr: Astn,
        edge: EdgeKind,
    },
    /// A call still to be resolved against the atom's types.
    Call { atom: UnionType, args: Vec<UnionType> },
    /// An application of a callee that is neither a class nor a function.
    Apply {
        callee: Box<TypeTerm>,
        args: Vec<UnionType>,
    },
    /// An operator application; the operator astns are preserved verbatim.
    CallOp { ops: Vec<Astn>, args: Vec<UnionType> },
    /// The `...` literal.
    Ellipsis,
    /// An omitted (absent) sub-expression.
    Omitted,
    /// The `*` in a star import.
    Star,
    /// A construct not yet analyzed; evaluates to the empty union.
    Todo(String),
}

impl TypeTerm {
    /// Shorthand for a class term with no bases.
    pub fn class0(fqn: impl Into<String>) -> Self {
        TypeTerm::Class {
            fqn: fqn.into(),
            bases: Vec::new(),
        }
    }

    /// Shorthand for an fqn term.
    pub fn fqn(fqn: impl Into<String>) -> Self {
        TypeTerm::Fqn(fqn.into())
    }
}

impl fmt::Display for TypeTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTerm::Fqn(fqn) => write!(f, "fqn({})", fqn),
            TypeTerm::Class { fqn, bases } => {
                write!(f, "class({}, ", fqn)?;
                fmt_union_list(f, bases)?;
                write!(f, ")")
            }
            TypeTerm::Func { fqn, ret } => write!(f, "func({}, {})", fqn, ret),
            TypeTerm::Import { fqn, path } => write!(f, "import({}, {:?})", fqn, path),
            TypeTerm::Var { fqn } => write!(f, "var({})", fqn),
            TypeTerm::Dot { atom, attr, edge } => {
                let kind = match edge {
                    EdgeKind::Binding => "binding",
                    EdgeKind::Ref => "ref",
                };
                write!(f, "dot({}, {}, {})", atom, attr, kind)
            }
            TypeTerm::Call { atom, args } => {
                write!(f, "call({}, ", atom)?;
                fmt_union_list(f, args)?;
                write!(f, ")")
            }
            TypeTerm::Apply { callee, args } => {
                write!(f, "apply({}, ", callee)?;
                fmt_union_list(f, args)?;
                write!(f, ")")
            }
            TypeTerm::CallOp { ops, args } => {
                write!(f, "call_op([")?;
                for (i, op) in ops.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", op)?;
                }
                write!(f, "], ")?;
                fmt_union_list(f, args)?;
                write!(f, ")")
            }
            TypeTerm::Ellipsis => write!(f, "ellipsis"),
            TypeTerm::Omitted => write!(f, "omitted"),
            TypeTerm::Star => write!(f, "star"),
            TypeTerm::Todo(kind) => write!(f, "todo({})", kind),
        }
    }
}

fn fmt_union_list(f: &mut fmt::Formatter<'_>, unions: &[UnionType]) -> fmt::Result {
    write!(f, "[")?;
    for (i, u) in unions.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", u)?;
    }
    write!(f, "]")
}

// ============================================================================
// Union types
// ============================================================================

/// An ordered, duplicate-free set of type terms.
///
/// The empty union means "no information"; it never contradicts another
/// type during propagation.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct UnionType(Vec<TypeTerm>);

impl UnionType {
    /// The empty union.
    pub fn empty() -> Self {
        UnionType(Vec::new())
    }

    /// A union of exactly one term.
    pub fn single(term: TypeTerm) -> Self {
        UnionType(vec![term])
    }

    /// Build a union from arbitrary terms, sorting and de-duplicating.
    pub fn from_terms(terms: impl IntoIterator<Item = TypeTerm>) -> Self {
        let mut items: Vec<TypeTerm> = terms.into_iter().collect();
        items.sort();
        items.dedup();
        UnionType(items)
    }

    /// Insert one term, preserving canonical order.
    pub fn insert(&mut self, term: TypeTerm) {
        if let Err(pos) = self.0.binary_search(&term) {
            self.0.insert(pos, term);
        }
    }

    /// Merge another union into this one.
    pub fn union_with(&mut self, other: &UnionType) {
        for term in &other.0 {
            self.insert(term.clone());
        }
    }

    /// Whether this union carries no information.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of terms.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over terms in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = &TypeTerm> {
        self.0.iter()
    }

    /// Membership test.
    pub fn contains(&self, term: &TypeTerm) -> bool {
        self.0.binary_search(term).is_ok()
    }

    /// Whether every term of `self` is in `other`.
    pub fn is_subset_of(&self, other: &UnionType) -> bool {
        self.0.iter().all(|t| other.contains(t))
    }

    /// If this union is exactly one `fqn(F)`, return `F`.
    pub fn as_single_fqn(&self) -> Option<&str> {
        match self.0.as_slice() {
            [TypeTerm::Fqn(fqn)] => Some(fqn),
            _ => None,
        }
    }

    /// Whether the terms are sorted and duplicate-free (test support).
    pub fn is_canonical(&self) -> bool {
        self.0.windows(2).all(|w| w[0] < w[1])
    }
}

impl fmt::Display for UnionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, term) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", term)?;
        }
        write!(f, "]")
    }
}

impl FromIterator<TypeTerm> for UnionType {
    fn from_iter<I: IntoIterator<Item = TypeTerm>>(iter: I) -> Self {
        UnionType::from_terms(iter)
    }
}

// ============================================================================
// Deferred expressions
// ============================================================================

/// An obligation accumulated in Pass 1 and interpreted by the evaluator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Deferred {
    /// Bind the left-hand side to the evaluated right-hand side.
    Assign { lhs: UnionType, rhs: UnionType },
    /// Evaluate for side effects (anchor and edge emission).
    Expr(UnionType),
    /// A class declaration seeding the symbol table.
    ClassDecl { fqn: String, bases: Vec<UnionType> },
    /// A function declaration seeding the symbol table.
    FuncDecl { fqn: String, ret: UnionType },
    /// A from-import alias seeding the symbol table.
    ImportFrom { path: String, fqn: String },
}

// ============================================================================
// Tests
// ============================================================================
