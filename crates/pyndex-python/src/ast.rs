//! AST simplifier: tagged-JSON trees to the closed node IR.
//!
//! The upstream parser emits a tree of JSON objects in which leaf objects
//! carry a `kind` discriminator (`"str"`, `"int"`, `"bool"`, `"None"`,
//! `"dict"`) and container objects carry `kind` plus `slots`, a map of
//! named children. This module converts that tree into the `Node` enum,
//! purely structurally: no semantic interpretation happens here, and the
//! source order of list slots is preserved.
//!
//! Container kinds without a dedicated variant become `Node::Todo`, which
//! keeps its child nodes so the anchor extractor can still walk into
//! unanalyzed constructs.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::types::Astn;

// ============================================================================
// Error Types
// ============================================================================

/// Errors from decoding the parser's JSON tree.
#[derive(Debug, Error)]
pub enum SimplifyError {
    /// A node object is missing its `kind` discriminator.
    #[error("node object has no string `kind` field")]
    MissingKind,

    /// A container is missing a required slot.
    #[error("node `{kind}` is missing slot `{slot}`")]
    MissingSlot { kind: String, slot: &'static str },

    /// A slot holds a value of the wrong shape.
    #[error("node `{kind}` slot `{slot}` has unexpected shape")]
    BadSlot { kind: String, slot: &'static str },

    /// The tree root is not an object.
    #[error("AST root is not a JSON object")]
    BadRoot,
}

type SimplifyResult<T> = Result<T, SimplifyError>;

impl From<SimplifyError> for pyndex_core::error::IndexError {
    fn from(err: SimplifyError) -> Self {
        pyndex_core::error::IndexError::malformed_ast(err.to_string())
    }
}

// ============================================================================
// Node IR
// ============================================================================

/// One alias of a from-import: the imported name and the bound name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportAsName {
    /// The name inside the imported module (`x` in `import x as y`).
    pub name: String,
    /// The FQN bound in the current module (`y`'s FQN).
    pub fqn: String,
    /// The token of the bound name.
    pub astn: Astn,
}

/// The closed IR of cooked AST nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// A name in a binding position, annotated with its FQN.
    NameBindsFqn { fqn: String, astn: Astn },
    /// A name in a reference position, annotated with its FQN.
    NameRefFqn { fqn: String, astn: Astn },
    /// A class definition with its base-class expressions.
    ClassDefStmt {
        fqn: String,
        astn: Astn,
        bases: Vec<Node>,
    },
    /// A function definition with its return-type expression.
    FuncDefStmt {
        fqn: String,
        astn: Astn,
        return_type: Box<Node>,
    },
    /// Attribute access `atom.attr`; `binds` marks a binding position.
    AtomDotNode {
        atom: Box<Node>,
        attr_astn: Astn,
        binds: bool,
    },
    /// A call `atom(args...)`.
    AtomCallNode { atom: Box<Node>, args: Vec<Node> },
    /// A numeric literal.
    NumberNode { astn: Astn },
    /// A string literal.
    StringNode { astn: Astn },
    /// An operator application over sub-expressions.
    OpNode { op_astns: Vec<Astn>, args: Vec<Node> },
    /// The `*` of a star import.
    StarNode { astn: Astn },
    /// The `...` literal.
    EllipsisNode,
    /// An omitted (absent) sub-expression.
    OmittedNode,
    /// `lhs = rhs` (one target; chained targets arrive as separate nodes).
    AssignExprStmt { lhs: Box<Node>, rhs: Box<Node> },
    /// An expression evaluated for side effects.
    ExprStmt { expr: Box<Node> },
    /// `from <dots><name> import aliases` or `from <name> import *`.
    ImportFromStmt {
        /// Number of leading dots (0 for absolute imports).
        from_dots: usize,
        /// Dotted module name components (may be empty for `from . import x`).
        from_name: Vec<String>,
        /// Imported aliases; empty when `star` is set.
        names: Vec<ImportAsName>,
        /// The `*` token of `from M import *`, when present.
        star: Option<Astn>,
    },
    /// `pass`.
    PassStmt,
    /// `break`.
    BreakStmt,
    /// `continue`.
    ContinueStmt,
    /// Any container kind without a dedicated variant. Children are kept
    /// in slot order so the extractor can walk into them.
    Todo { kind: String, items: Vec<Node> },
}

// ============================================================================
// Simplifier
// ============================================================================

/// Convert a tagged-JSON tree into the node IR.
pub fn simplify(value: &Value) -> SimplifyResult<Node> {
    let obj = value.as_object().ok_or(SimplifyError::BadRoot)?;
    let kind = obj
        .get("kind")
        .and_then(Value::as_str)
        .ok_or(SimplifyError::MissingKind)?;
    let slots = obj.get("slots").and_then(Value::as_object);

    match kind {
        "NameBindsFqn" | "NameRefFqn" => {
            let slots = require_slots(kind, slots)?;
            let fqn = str_slot(kind, slots, "fqn")?;
            let astn = astn_slot(kind, slots, "astn")?;
            Ok(if kind == "NameBindsFqn" {
                Node::NameBindsFqn { fqn, astn }
            } else {
                Node::NameRefFqn { fqn, astn }
            })
        }
        "ClassDefStmt" => {
            let slots = require_slots(kind, slots)?;
            Ok(Node::ClassDefStmt {
                fqn: str_slot(kind, slots, "fqn")?,
                astn: astn_slot(kind, slots, "astn")?,
                bases: node_list_slot(kind, slots, "bases")?,
            })
        }
        "FuncDefStmt" => {
            let slots = require_slots(kind, slots)?;
            Ok(Node::FuncDefStmt {
                fqn: str_slot(kind, slots, "fqn")?,
                astn: astn_slot(kind, slots, "astn")?,
                return_type: Box::new(node_slot(kind, slots, "return_type")?),
            })
        }
        "AtomDotNode" => {
            let slots = require_slots(kind, slots)?;
            Ok(Node::AtomDotNode {
                atom: Box::new(node_slot(kind, slots, "atom")?),
                attr_astn: astn_slot(kind, slots, "attr_astn")?,
                binds: bool_slot(kind, slots, "binds")?,
            })
        }
        "AtomCallNode" => {
            let slots = require_slots(kind, slots)?;
            Ok(Node::AtomCallNode {
                atom: Box::new(node_slot(kind, slots, "atom")?),
                args: node_list_slot(kind, slots, "args")?,
            })
        }
        "NumberNode" => {
            let slots = require_slots(kind, slots)?;
            Ok(Node::NumberNode {
                astn: astn_slot(kind, slots, "astn")?,
            })
        }
        "StringNode" => {
            let slots = require_slots(kind, slots)?;
            Ok(Node::StringNode {
                astn: astn_slot(kind, slots, "astn")?,
            })
        }
        "OpNode" => {
            let slots = require_slots(kind, slots)?;
            Ok(Node::OpNode {
                op_astns: astn_list_slot(kind, slots, "op_astns")?,
                args: node_list_slot(kind, slots, "args")?,
            })
        }
        "StarNode" => {
            let slots = require_slots(kind, slots)?;
            Ok(Node::StarNode {
                astn: astn_slot(kind, slots, "astn")?,
            })
        }
        "EllipsisNode" => Ok(Node::EllipsisNode),
        "OmittedNode" => Ok(Node::OmittedNode),
        "AssignExprStmt" => {
            let slots = require_slots(kind, slots)?;
            Ok(Node::AssignExprStmt {
                lhs: Box::new(node_slot(kind, slots, "lhs")?),
                rhs: Box::new(node_slot(kind, slots, "rhs")?),
            })
        }
        "ExprStmt" => {
            let slots = require_slots(kind, slots)?;
            Ok(Node::ExprStmt {
                expr: Box::new(node_slot(kind, slots, "expr")?),
            })
        }
        "ImportFromStmt" => {
            let slots = require_slots(kind, slots)?;
            let star = if bool_slot(kind, slots, "star")? {
                Some(astn_slot(kind, slots, "star_astn")?)
            } else {
                None
            };
            Ok(Node::ImportFromStmt {
                from_dots: int_slot(kind, slots, "from_dots")? as usize,
                from_name: str_list_slot(kind, slots, "from_name")?,
                names: as_name_list_slot(kind, slots, "names")?,
                star,
            })
        }
        "PassStmt" => Ok(Node::PassStmt),
        "BreakStmt" => Ok(Node::BreakStmt),
        "ContinueStmt" => Ok(Node::ContinueStmt),
        _ => Ok(Node::Todo {
            kind: kind.to_string(),
            items: child_nodes(slots),
        }),
    }
}

// ============================================================================
// Slot decoding helpers
// ============================================================================

fn require_slots<'a>(
    kind: &str,
    slots: Option<&'a Map<String, Value>>,
) -> SimplifyResult<&'a Map<String, Value>> {
    slots.ok_or_else(|| SimplifyError::MissingSlot {
        kind: kind.to_string(),
        slot: "slots",
    })
}

fn get_slot<'a>(
    kind: &str,
    slots: &'a Map<String, Value>,
    name: &'static str,
) -> SimplifyResult<&'a Value> {
    slots.get(name).ok_or_else(|| SimplifyError::MissingSlot {
        kind: kind.to_string(),
        slot: name,
    })
}

fn bad_slot(kind: &str, slot: &'static str) -> SimplifyError {
    SimplifyError::BadSlot {
        kind: kind.to_string(),
        slot,
    }
}

/// Decode a leaf object `{kind: "str", value: ...}`.
fn leaf_str(value: &Value) -> Option<&str> {
    let obj = value.as_object()?;
    if obj.get("kind")?.as_str()? != "str" {
        return None;
    }
    obj.get("value")?.as_str()
}

/// Decode a leaf object `{kind: "int", value: ...}`.
fn leaf_int(value: &Value) -> Option<i64> {
    let obj = value.as_object()?;
    if obj.get("kind")?.as_str()? != "int" {
        return None;
    }
    obj.get("value")?.as_i64()
}

/// Decode a leaf object `{kind: "bool", value: ...}`.
fn leaf_bool(value: &Value) -> Option<bool> {
    let obj = value.as_object()?;
    if obj.get("kind")?.as_str()? != "bool" {
        return None;
    }
    obj.get("value")?.as_bool()
}

fn str_slot(kind: &str, slots: &Map<String, Value>, name: &'static str) -> SimplifyResult<String> {
    let value = get_slot(kind, slots, name)?;
    leaf_str(value)
        .map(str::to_string)
        .ok_or_else(|| bad_slot(kind, name))
}

fn int_slot(kind: &str, slots: &Map<String, Value>, name: &'static str) -> SimplifyResult<i64> {
    let value = get_slot(kind, slots, name)?;
    leaf_int(value).ok_or_else(|| bad_slot(kind, name))
}

fn bool_slot(kind: &str, slots: &Map<String, Value>, name: &'static str) -> SimplifyResult<bool> {
    let value = get_slot(kind, slots, name)?;
    leaf_bool(value).ok_or_else(|| bad_slot(kind, name))
}

/// Decode an `Astn` container: `{kind: "Astn", slots: {value, start, end}}`.
fn decode_astn(value: &Value) -> Option<Astn> {
    let obj = value.as_object()?;
    if obj.get("kind")?.as_str()? != "Astn" {
        return None;
    }
    let slots = obj.get("slots")?.as_object()?;
    Some(Astn::new(
        leaf_int(slots.get("start")?)? as usize,
        leaf_int(slots.get("end")?)? as usize,
        leaf_str(slots.get("value")?)?,
    ))
}

fn astn_slot(kind: &str, slots: &Map<String, Value>, name: &'static str) -> SimplifyResult<Astn> {
    let value = get_slot(kind, slots, name)?;
    decode_astn(value).ok_or_else(|| bad_slot(kind, name))
}

fn astn_list_slot(
    kind: &str,
    slots: &Map<String, Value>,
    name: &'static str,
) -> SimplifyResult<Vec<Astn>> {
    let value = get_slot(kind, slots, name)?;
    let list = value.as_array().ok_or_else(|| bad_slot(kind, name))?;
    list.iter()
        .map(|item| decode_astn(item).ok_or_else(|| bad_slot(kind, name)))
        .collect()
}

fn node_slot(kind: &str, slots: &Map<String, Value>, name: &'static str) -> SimplifyResult<Node> {
    simplify(get_slot(kind, slots, name)?)
}

fn node_list_slot(
    kind: &str,
    slots: &Map<String, Value>,
    name: &'static str,
) -> SimplifyResult<Vec<Node>> {
    let value = get_slot(kind, slots, name)?;
    let list = value.as_array().ok_or_else(|| bad_slot(kind, name))?;
    list.iter().map(simplify).collect()
}

fn str_list_slot(
    kind: &str,
    slots: &Map<String, Value>,
    name: &'static str,
) -> SimplifyResult<Vec<String>> {
    let value = get_slot(kind, slots, name)?;
    let list = value.as_array().ok_or_else(|| bad_slot(kind, name))?;
    list.iter()
        .map(|item| {
            leaf_str(item)
                .map(str::to_string)
                .ok_or_else(|| bad_slot(kind, name))
        })
        .collect()
}

fn as_name_list_slot(
    kind: &str,
    slots: &Map<String, Value>,
    name: &'static str,
) -> SimplifyResult<Vec<ImportAsName>> {
    let value = get_slot(kind, slots, name)?;
    let list = value.as_array().ok_or_else(|| bad_slot(kind, name))?;
    list.iter()
        .map(|item| {
            let obj = item.as_object().ok_or_else(|| bad_slot(kind, name))?;
            if obj.get("kind").and_then(Value::as_str) != Some("AsNameNode") {
                return Err(bad_slot(kind, name));
            }
            let inner = obj
                .get("slots")
                .and_then(Value::as_object)
                .ok_or_else(|| bad_slot(kind, name))?;
            Ok(ImportAsName {
                name: str_slot("AsNameNode", inner, "name")?,
                fqn: str_slot("AsNameNode", inner, "fqn")?,
                astn: astn_slot("AsNameNode", inner, "astn")?,
            })
        })
        .collect()
}

/// Collect every child node reachable from a container's slots, in slot
/// order, for the `Todo` catch-all. Leaf and `Astn` slots carry no nodes.
fn child_nodes(slots: Option<&Map<String, Value>>) -> Vec<Node> {
    let mut items = Vec::new();
    let Some(slots) = slots else {
        return items;
    };
    for value in slots.values() {
        collect_nodes(value, &mut items);
    }
    items
}

fn collect_nodes(value: &Value, items: &mut Vec<Node>) {
    match value {
        Value::Array(list) => {
            for item in list {
                collect_nodes(item, items);
            }
        }
        Value::Object(obj) => {
            let Some(kind) = obj.get("kind").and_then(Value::as_str) else {
                return;
            };
            if matches!(kind, "str" | "int" | "bool" | "None" | "dict" | "Astn") {
                return;
            }
            if let Ok(node) = simplify(value) {
                items.push(node);
            }
        }
        _ => {}
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Build an `Astn` container value.
    fn astn_json(start: usize, end: usize, value: &str) -> Value {
        json!({
            "kind": "Astn",
            "slots": {
                "value": {"kind": "str", "value": value},
                "start": {"kind": "int", "value": start},
                "end": {"kind": "int", "value": end},
            }
        })
    }

    mod leaf_tests {
        use super::*;

        #[test]
        fn name_binding() {
            let value = json!({
                "kind": "NameBindsFqn",
                "slots": {
                    "fqn": {"kind": "str", "value": "m.x"},
                    "astn": astn_json(0, 1, "x"),
                }
            });
            let node = simplify(&value).unwrap();
            assert_eq!(
                node,
                Node::NameBindsFqn {
                    fqn: "m.x".to_string(),
                    astn: Astn::new(0, 1, "x"),
                }
            );
        }

        #[test]
        fn ellipsis_and_omitted() {
            assert_eq!(
                simplify(&json!({"kind": "EllipsisNode"})).unwrap(),
                Node::EllipsisNode
            );
            assert_eq!(
                simplify(&json!({"kind": "OmittedNode"})).unwrap(),
                Node::OmittedNode
            );
        }

        #[test]
        fn statement_tags_are_distinct() {
            assert_eq!(simplify(&json!({"kind": "PassStmt"})).unwrap(), Node::PassStmt);
            assert_eq!(
                simplify(&json!({"kind": "BreakStmt"})).unwrap(),
                Node::BreakStmt
            );
            assert_ne!(
                simplify(&json!({"kind": "PassStmt"})).unwrap(),
                simplify(&json!({"kind": "BreakStmt"})).unwrap()
            );
        }
    }

    mod container_tests {
        use super::*;

        #[test]
        fn dot_node() {
            let value = json!({
                "kind": "AtomDotNode",
                "slots": {
                    "atom": {
                        "kind": "NameRefFqn",
                        "slots": {
                            "fqn": {"kind": "str", "value": "m.c"},
                            "astn": astn_json(10, 11, "c"),
                        }
                    },
                    "attr_astn": astn_json(12, 13, "x"),
                    "binds": {"kind": "bool", "value": false},
                }
            });
            match simplify(&value).unwrap() {
                Node::AtomDotNode {
                    atom,
                    attr_astn,
                    binds,
                } => {
                    assert!(!binds);
                    assert_eq!(attr_astn.value, "x");
                    assert!(matches!(*atom, Node::NameRefFqn { .. }));
                }
                other => panic!("unexpected node: {:?}", other),
            }
        }

        #[test]
        fn import_from() {
            let value = json!({
                "kind": "ImportFromStmt",
                "slots": {
                    "from_dots": {"kind": "int", "value": 0},
                    "from_name": [
                        {"kind": "str", "value": "a"},
                        {"kind": "str", "value": "b"},
                    ],
                    "names": [{
                        "kind": "AsNameNode",
                        "slots": {
                            "name": {"kind": "str", "value": "f"},
                            "fqn": {"kind": "str", "value": "m.g"},
                            "astn": astn_json(20, 21, "g"),
                        }
                    }],
                    "star": {"kind": "bool", "value": false},
                }
            });
            match simplify(&value).unwrap() {
                Node::ImportFromStmt {
                    from_dots,
                    from_name,
                    names,
                    star,
                } => {
                    assert_eq!(from_dots, 0);
                    assert_eq!(from_name, vec!["a".to_string(), "b".to_string()]);
                    assert_eq!(names.len(), 1);
                    assert_eq!(names[0].name, "f");
                    assert_eq!(names[0].fqn, "m.g");
                    assert!(star.is_none());
                }
                other => panic!("unexpected node: {:?}", other),
            }
        }

        #[test]
        fn missing_slot_is_an_error() {
            let value = json!({
                "kind": "ExprStmt",
                "slots": {}
            });
            let err = simplify(&value).unwrap_err();
            assert!(matches!(err, SimplifyError::MissingSlot { .. }));
        }
    }

    mod todo_tests {
        use super::*;

        #[test]
        fn unknown_kind_becomes_todo_with_children() {
            let value = json!({
                "kind": "ForStmt",
                "slots": {
                    "target": {
                        "kind": "NameBindsFqn",
                        "slots": {
                            "fqn": {"kind": "str", "value": "m.i"},
                            "astn": astn_json(4, 5, "i"),
                        }
                    },
                    "body": [
                        {"kind": "PassStmt"},
                    ],
                    "label": {"kind": "str", "value": "ignored"},
                }
            });
            match simplify(&value).unwrap() {
                Node::Todo { kind, items } => {
                    assert_eq!(kind, "ForStmt");
                    assert_eq!(items.len(), 2);
                    assert!(matches!(items[0], Node::NameBindsFqn { .. }));
                    assert_eq!(items[1], Node::PassStmt);
                }
                other => panic!("unexpected node: {:?}", other),
            }
        }

        #[test]
        fn todo_with_no_slots() {
            let value = json!({"kind": "GlobalStmt"});
            match simplify(&value).unwrap() {
                Node::Todo { kind, items } => {
                    assert_eq!(kind, "GlobalStmt");
                    assert!(items.is_empty());
                }
                other => panic!("unexpected node: {:?}", other),
            }
        }
    }
}
