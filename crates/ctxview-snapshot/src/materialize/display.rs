use std::fmt::Write as _;

use crate::materialize::json::circular_marker;
use crate::snapshot::Snapshot;
use crate::tree::{NodeValue, TreeNode};

/// A node of the interactive tree view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplayNode {
    pub text: String,
    pub children: Vec<DisplayNode>,
}

impl DisplayNode {
    pub fn leaf(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            children: Vec::new(),
        }
    }

    /// Draw the tree as indented text, one node per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        let _ = writeln!(out, "{:indent$}{}", "", self.text, indent = depth * 2);
        for child in &self.children {
            child.render_into(out, depth + 1);
        }
    }
}

/// Build the tree view of a snapshot.
///
/// Object members become nodes named after their label. Array elements are
/// spliced directly into the enclosing node, scalars become leaves holding
/// their text, and nulls are not shown at all.
pub fn display_tree(snapshot: &Snapshot) -> DisplayNode {
    let mut root = DisplayNode::leaf(snapshot.label.clone());
    append(&snapshot.root, &mut root);
    root
}

fn append(node: &TreeNode, parent: &mut DisplayNode) {
    match &node.value {
        NodeValue::Null => {}
        NodeValue::Scalar(scalar) => parent.children.push(DisplayNode::leaf(scalar.to_string())),
        NodeValue::Circular { object_id } => {
            parent.children.push(DisplayNode::leaf(circular_marker(*object_id)))
        }
        NodeValue::Diagnostic(message) => parent.children.push(DisplayNode::leaf(message.clone())),
        NodeValue::Array(children) => {
            for child in children {
                append(child, parent);
            }
        }
        NodeValue::Object(children) => {
            for child in children {
                let mut member = DisplayNode::leaf(child.label.clone().unwrap_or_default());
                append(child, &mut member);
                parent.children.push(member);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Scalar;
    use pretty_assertions::assert_eq;

    fn sample() -> Snapshot {
        Snapshot {
            label: "_context".to_string(),
            root: TreeNode::labeled(
                "_context",
                NodeValue::Object(vec![
                    TreeNode::labeled("a", NodeValue::Scalar(Scalar::Int(1))),
                    TreeNode::labeled(
                        "b",
                        NodeValue::Array(vec![
                            TreeNode::new(NodeValue::Scalar(Scalar::Boolean(true))),
                            TreeNode::new(NodeValue::Null),
                        ]),
                    ),
                    TreeNode::labeled("c", NodeValue::Null),
                ]),
            ),
        }
    }

    #[test]
    fn arrays_splice_into_their_parent_and_nulls_vanish() {
        let tree = display_tree(&sample());
        assert_eq!(
            tree,
            DisplayNode {
                text: "_context".to_string(),
                children: vec![
                    DisplayNode {
                        text: "a".to_string(),
                        children: vec![DisplayNode::leaf("1")],
                    },
                    DisplayNode {
                        text: "b".to_string(),
                        children: vec![DisplayNode::leaf("true")],
                    },
                    DisplayNode::leaf("c"),
                ],
            }
        );
    }

    #[test]
    fn render_indents_by_depth() {
        assert_eq!(
            display_tree(&sample()).render(),
            "_context\n  a\n    1\n  b\n    true\n  c\n"
        );
    }
}
