use crate::error::PathError;
use crate::snapshot::Snapshot;

/// The dotted path of the node reached by following `selection` child
/// indices from the root.
///
/// The root label and every labeled node on the way are joined with `.`;
/// array elements carry no label and are left out.
pub fn dotted_path(snapshot: &Snapshot, selection: &[usize]) -> Result<String, PathError> {
    let mut segments = vec![snapshot.label.as_str()];
    let mut node = &snapshot.root;
    for (depth, &index) in selection.iter().enumerate() {
        let children = node.children();
        node = children.get(index).ok_or(PathError::OutOfRange {
            depth,
            index,
            len: children.len(),
        })?;
        if let Some(label) = &node.label {
            segments.push(label);
        }
    }
    Ok(segments.join("."))
}

/// Parse `1.0.3` into child indices. An empty string selects the root.
pub fn parse_selection(text: &str) -> Result<Vec<usize>, PathError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }
    text.split('.')
        .map(|part| {
            part.trim()
                .parse::<usize>()
                .map_err(|_| PathError::InvalidSelection(text.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{NodeValue, Scalar, TreeNode};
    use pretty_assertions::assert_eq;

    fn sample() -> Snapshot {
        let item = TreeNode::new(NodeValue::Object(vec![TreeNode::labeled(
            "sku",
            NodeValue::Scalar(Scalar::String("A-1".into())),
        )]));
        Snapshot {
            label: "_context".to_string(),
            root: TreeNode::labeled(
                "_context",
                NodeValue::Object(vec![
                    TreeNode::labeled("id", NodeValue::Scalar(Scalar::Long(3))),
                    TreeNode::labeled("items", NodeValue::Array(vec![item])),
                ]),
            ),
        }
    }

    #[test]
    fn array_segments_are_omitted() {
        let snap = sample();
        assert_eq!(dotted_path(&snap, &[]).unwrap(), "_context");
        assert_eq!(dotted_path(&snap, &[0]).unwrap(), "_context.id");
        assert_eq!(dotted_path(&snap, &[1, 0, 0]).unwrap(), "_context.items.sku");
    }

    #[test]
    fn out_of_range_selection() {
        let err = dotted_path(&sample(), &[1, 4]).unwrap_err();
        assert_eq!(
            err,
            PathError::OutOfRange {
                depth: 1,
                index: 4,
                len: 1
            }
        );
        assert!(dotted_path(&sample(), &[0, 0]).is_err());
    }

    #[test]
    fn parses_selections() {
        assert_eq!(parse_selection("").unwrap(), Vec::<usize>::new());
        assert_eq!(parse_selection("1.0.2").unwrap(), [1, 0, 2]);
        assert_eq!(
            parse_selection("1.x"),
            Err(PathError::InvalidSelection("1.x".to_string()))
        );
    }
}
