use std::fmt;

use ctxview_jdwp::ObjectId;

/// A primitive or string value copied out of the target VM.
#[derive(Clone, Debug, PartialEq)]
pub enum Scalar {
    Boolean(bool),
    Char(char),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
}

impl fmt::Display for Scalar {
    /// Renders the value the way the JVM's `String.valueOf` would.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Boolean(v) => write!(f, "{v}"),
            Scalar::Char(v) => write!(f, "{v}"),
            Scalar::Byte(v) => write!(f, "{v}"),
            Scalar::Short(v) => write!(f, "{v}"),
            Scalar::Int(v) => write!(f, "{v}"),
            Scalar::Long(v) => write!(f, "{v}"),
            Scalar::Float(v) => f.write_str(&java_float(*v, f64::from(*v))),
            Scalar::Double(v) => f.write_str(&java_float(*v, *v)),
            Scalar::String(v) => f.write_str(v),
        }
    }
}

fn java_float<T>(value: T, magnitude: f64) -> String
where
    T: fmt::Display + fmt::LowerExp,
{
    if magnitude.is_nan() {
        return "NaN".to_string();
    }
    if magnitude.is_infinite() {
        return if magnitude > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    let abs = magnitude.abs();
    if abs != 0.0 && !(1e-3..1e7).contains(&abs) {
        let text = format!("{value:e}");
        let (mantissa, exponent) = text.split_once('e').unwrap_or((text.as_str(), "0"));
        return if mantissa.contains('.') {
            format!("{mantissa}E{exponent}")
        } else {
            format!("{mantissa}.0E{exponent}")
        };
    }
    let text = value.to_string();
    if text.contains('.') {
        text
    } else {
        format!("{text}.0")
    }
}

/// Classification tag of a [`TreeNode`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Null,
    Scalar,
    Array,
    Object,
    Circular,
    Diagnostic,
}

#[derive(Clone, Debug, PartialEq)]
pub enum NodeValue {
    Null,
    Scalar(Scalar),
    /// Array, collection or iterator elements; children are unlabeled.
    Array(Vec<TreeNode>),
    /// Object fields or map entries; children are labeled.
    Object(Vec<TreeNode>),
    /// Re-entry into an object already being expanded on the current path.
    Circular { object_id: ObjectId },
    /// A walk that failed, rendered in place of the value.
    Diagnostic(String),
}

/// One position of a snapshot. Holds no handles into the target VM.
#[derive(Clone, Debug, PartialEq)]
pub struct TreeNode {
    pub label: Option<String>,
    pub value: NodeValue,
}

impl TreeNode {
    pub fn new(value: NodeValue) -> Self {
        Self { label: None, value }
    }

    pub fn labeled(label: impl Into<String>, value: NodeValue) -> Self {
        Self {
            label: Some(label.into()),
            value,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn kind(&self) -> NodeKind {
        match &self.value {
            NodeValue::Null => NodeKind::Null,
            NodeValue::Scalar(_) => NodeKind::Scalar,
            NodeValue::Array(_) => NodeKind::Array,
            NodeValue::Object(_) => NodeKind::Object,
            NodeValue::Circular { .. } => NodeKind::Circular,
            NodeValue::Diagnostic(_) => NodeKind::Diagnostic,
        }
    }

    pub fn children(&self) -> &[TreeNode] {
        match &self.value {
            NodeValue::Array(children) | NodeValue::Object(children) => children,
            _ => &[],
        }
    }

    /// Labeled child lookup, for object-shaped nodes.
    pub fn get(&self, label: &str) -> Option<&TreeNode> {
        match &self.value {
            NodeValue::Object(children) => children
                .iter()
                .find(|child| child.label.as_deref() == Some(label)),
            _ => None,
        }
    }

    pub fn scalar(&self) -> Option<&Scalar> {
        match &self.value {
            NodeValue::Scalar(scalar) => Some(scalar),
            _ => None,
        }
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn node_count(&self) -> usize {
        1 + self.children().iter().map(TreeNode::node_count).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floats_render_like_the_jvm() {
        assert_eq!(Scalar::Double(1.0).to_string(), "1.0");
        assert_eq!(Scalar::Double(2.5).to_string(), "2.5");
        assert_eq!(Scalar::Float(-3.0).to_string(), "-3.0");
        assert_eq!(Scalar::Double(f64::NAN).to_string(), "NaN");
        assert_eq!(Scalar::Float(f32::NEG_INFINITY).to_string(), "-Infinity");
        assert_eq!(Scalar::Float(0.1).to_string(), "0.1");
        assert_eq!(Scalar::Double(1e10).to_string(), "1.0E10");
        assert_eq!(Scalar::Double(2.5e-5).to_string(), "2.5E-5");
    }

    #[test]
    fn integral_and_text_scalars_render_verbatim() {
        assert_eq!(Scalar::Int(-7).to_string(), "-7");
        assert_eq!(Scalar::Long(1 << 40).to_string(), "1099511627776");
        assert_eq!(Scalar::Char('x').to_string(), "x");
        assert_eq!(Scalar::Boolean(false).to_string(), "false");
        assert_eq!(Scalar::String("a b".into()).to_string(), "a b");
    }

    #[test]
    fn children_and_lookup() {
        let node = TreeNode::new(NodeValue::Object(vec![
            TreeNode::labeled("x", NodeValue::Scalar(Scalar::Int(5))),
            TreeNode::labeled(
                "items",
                NodeValue::Array(vec![TreeNode::new(NodeValue::Null)]),
            ),
        ]));

        assert_eq!(node.kind(), NodeKind::Object);
        assert_eq!(node.children().len(), 2);
        assert_eq!(node.get("x").and_then(TreeNode::scalar), Some(&Scalar::Int(5)));
        assert_eq!(node.get("items").map(TreeNode::kind), Some(NodeKind::Array));
        assert!(node.get("missing").is_none());
        assert_eq!(node.node_count(), 4);
    }
}
