use serde_json::{Map, Number, Value};

use crate::tree::{NodeValue, Scalar, TreeNode};

/// Text standing in for a value already being expanded higher up the tree.
pub fn circular_marker(object_id: u64) -> String {
    format!("<<CIRCULAR_REFERENCE_TO_ID:{object_id}>>")
}

/// Convert a tree to JSON, keeping child order.
pub fn to_json(node: &TreeNode) -> Value {
    match &node.value {
        NodeValue::Null => Value::Null,
        NodeValue::Scalar(scalar) => scalar_to_json(scalar),
        NodeValue::Array(children) => Value::Array(children.iter().map(to_json).collect()),
        NodeValue::Object(children) => {
            let mut map = Map::new();
            for child in children {
                let key = child.label.clone().unwrap_or_default();
                map.insert(key, to_json(child));
            }
            Value::Object(map)
        }
        NodeValue::Circular { object_id } => Value::String(circular_marker(*object_id)),
        NodeValue::Diagnostic(message) => Value::String(message.clone()),
    }
}

pub fn to_pretty_json(node: &TreeNode) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&to_json(node))
}

fn scalar_to_json(scalar: &Scalar) -> Value {
    match scalar {
        Scalar::Boolean(v) => Value::Bool(*v),
        Scalar::Byte(v) => Value::from(*v),
        Scalar::Short(v) => Value::from(*v),
        Scalar::Int(v) => Value::from(*v),
        Scalar::Long(v) => Value::from(*v),
        // JSON has no NaN or infinities; those fall back to their text.
        Scalar::Float(v) => Number::from_f64(f64::from(*v))
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(scalar.to_string())),
        Scalar::Double(v) => Number::from_f64(*v)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(scalar.to_string())),
        Scalar::Char(_) | Scalar::String(_) => Value::String(scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn objects_keep_insertion_order() {
        let tree = TreeNode::new(NodeValue::Object(vec![
            TreeNode::labeled("zeta", NodeValue::Scalar(Scalar::Int(1))),
            TreeNode::labeled(
                "alpha",
                NodeValue::Array(vec![
                    TreeNode::new(NodeValue::Scalar(Scalar::Boolean(true))),
                    TreeNode::new(NodeValue::Null),
                ]),
            ),
            TreeNode::labeled("self", NodeValue::Circular { object_id: 42 }),
        ]));

        let value = to_json(&tree);
        assert_eq!(
            value,
            json!({"zeta": 1, "alpha": [true, null], "self": "<<CIRCULAR_REFERENCE_TO_ID:42>>"})
        );
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, ["zeta", "alpha", "self"]);
    }

    #[test]
    fn scalars_map_to_json_types() {
        let scalar = |s: Scalar| to_json(&TreeNode::new(NodeValue::Scalar(s)));
        assert_eq!(scalar(Scalar::Char('c')), json!("c"));
        assert_eq!(scalar(Scalar::Long(-5)), json!(-5));
        assert_eq!(scalar(Scalar::Double(0.5)), json!(0.5));
        assert_eq!(scalar(Scalar::Double(f64::NAN)), json!("NaN"));
    }

    #[test]
    fn pretty_output() {
        let tree = TreeNode::new(NodeValue::Object(vec![TreeNode::labeled(
            "a",
            NodeValue::Scalar(Scalar::String("x".into())),
        )]));
        assert_eq!(to_pretty_json(&tree).unwrap(), "{\n  \"a\": \"x\"\n}");
    }
}
