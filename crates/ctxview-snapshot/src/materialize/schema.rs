//! Groovy value-holder classes inferred from the shape of a snapshot.

use std::sync::OnceLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::tree::{NodeValue, Scalar, TreeNode};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchemaOptions {
    /// `package` line of the generated file; omitted when empty.
    pub package: String,
    /// Class generated for the snapshot root.
    pub root_class: String,
}

impl Default for SchemaOptions {
    fn default() -> Self {
        Self {
            package: "ctxview.generated".to_string(),
            root_class: "ContextRoot".to_string(),
        }
    }
}

/// Collects one class per distinct object shape, in first-encounter order.
///
/// Objects that map to the same class name merge their properties; a
/// property seen again keeps its position and takes the latest inferred type.
#[derive(Debug, Default)]
pub struct SchemaGenerator {
    options: SchemaOptions,
    classes: IndexMap<String, IndexMap<String, String>>,
}

impl SchemaGenerator {
    pub fn new(options: SchemaOptions) -> Self {
        Self {
            options,
            classes: IndexMap::new(),
        }
    }

    /// Generate the Groovy source for `root` in one step.
    pub fn generate(options: SchemaOptions, root: &TreeNode) -> String {
        let mut generator = Self::new(options);
        generator.add_root(root);
        generator.render()
    }

    pub fn add_root(&mut self, root: &TreeNode) {
        let class = sanitize_class_name(&self.options.root_class);
        self.collect(root, &class);
    }

    /// Class name to `(property, type)` pairs collected so far.
    pub fn classes(&self) -> &IndexMap<String, IndexMap<String, String>> {
        &self.classes
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        if !self.options.package.is_empty() {
            out.push_str(&format!("package {}\n\n", self.options.package));
        }
        out.push_str("import groovy.transform.Canonical\n\n");
        for (class, properties) in &self.classes {
            out.push_str("@Canonical\n");
            out.push_str(&format!("class {class} {{\n"));
            for (name, ty) in properties {
                out.push_str(&format!("    {ty} {name}\n"));
            }
            out.push_str("}\n\n");
        }
        out
    }

    fn collect(&mut self, node: &TreeNode, class: &str) {
        match &node.value {
            NodeValue::Object(children) => {
                self.classes.entry(class.to_string()).or_default();
                for child in children {
                    let name = sanitize_property_name(child.label.as_deref().unwrap_or_default());
                    let ty = self.infer_type(child, &capitalize(&name));
                    if let Some(properties) = self.classes.get_mut(class) {
                        properties.insert(name, ty);
                    }
                }
            }
            NodeValue::Array(children) => {
                for child in children {
                    self.collect(child, class);
                }
            }
            _ => {}
        }
    }

    fn infer_type(&mut self, node: &TreeNode, class_hint: &str) -> String {
        match &node.value {
            NodeValue::Scalar(scalar) => scalar_type(scalar).to_string(),
            NodeValue::Array(children) => {
                match children.iter().find(|child| child.value != NodeValue::Null) {
                    Some(first) => {
                        let element = self.infer_type(first, &singularize(class_hint));
                        format!("List<{element}>")
                    }
                    None => "List<Object>".to_string(),
                }
            }
            NodeValue::Object(_) => {
                let nested = sanitize_class_name(class_hint);
                self.collect(node, &nested);
                nested
            }
            NodeValue::Null | NodeValue::Circular { .. } | NodeValue::Diagnostic(_) => {
                "Object".to_string()
            }
        }
    }
}

fn scalar_type(scalar: &Scalar) -> &'static str {
    match scalar {
        Scalar::Boolean(_) => "boolean",
        Scalar::Byte(_) | Scalar::Short(_) | Scalar::Int(_) => "int",
        Scalar::Long(_) => "long",
        Scalar::Float(_) | Scalar::Double(_) => "double",
        Scalar::Char(_) | Scalar::String(_) => "String",
    }
}

fn non_identifier_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9_]").expect("identifier regex should compile"))
}

fn sanitize_class_name(name: &str) -> String {
    let clean = non_identifier_chars().replace_all(name, "");
    if clean.is_empty() {
        return "ClassName".to_string();
    }
    capitalize(&clean)
}

fn sanitize_property_name(name: &str) -> String {
    let clean = non_identifier_chars().replace_all(name, "_").into_owned();
    match clean.chars().next() {
        None => "_".to_string(),
        Some(first) if first.is_ascii_digit() => format!("_{clean}"),
        Some(_) => clean,
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn singularize(name: &str) -> String {
    if let Some(stem) = name.strip_suffix("ies") {
        return format!("{stem}y");
    }
    match name.strip_suffix('s') {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn scalar(value: Scalar) -> NodeValue {
        NodeValue::Scalar(value)
    }

    fn order() -> TreeNode {
        let line = |sku: &str, qty: i32| {
            TreeNode::new(NodeValue::Object(vec![
                TreeNode::labeled("sku", scalar(Scalar::String(sku.into()))),
                TreeNode::labeled("qty", scalar(Scalar::Int(qty))),
            ]))
        };
        TreeNode::new(NodeValue::Object(vec![
            TreeNode::labeled("id", scalar(Scalar::Long(1))),
            TreeNode::labeled("paid", scalar(Scalar::Boolean(true))),
            TreeNode::labeled("total", scalar(Scalar::Double(9.5))),
            TreeNode::labeled(
                "entries",
                NodeValue::Array(vec![TreeNode::new(NodeValue::Null), line("A", 1), line("B", 2)]),
            ),
            TreeNode::labeled(
                "categories",
                NodeValue::Array(vec![TreeNode::new(NodeValue::Object(vec![
                    TreeNode::labeled("name", scalar(Scalar::String("x".into()))),
                ]))]),
            ),
            TreeNode::labeled("billing-address", NodeValue::Object(Vec::new())),
            TreeNode::labeled("tags", NodeValue::Array(Vec::new())),
            TreeNode::labeled("1st", NodeValue::Null),
        ]))
    }

    #[test]
    fn generates_one_class_per_shape() {
        let source = SchemaGenerator::generate(SchemaOptions::default(), &order());
        assert_eq!(
            source,
            "package ctxview.generated

import groovy.transform.Canonical

@Canonical
class ContextRoot {
    long id
    boolean paid
    double total
    List<Entry> entries
    List<Category> categories
    Billing_address billing_address
    List<Object> tags
    Object _1st
}

@Canonical
class Entry {
    String sku
    int qty
}

@Canonical
class Category {
    String name
}

@Canonical
class Billing_address {
}

"
        );
    }

    #[test]
    fn repeated_shapes_are_emitted_once() {
        let child = |n: i32| {
            TreeNode::labeled(
                format!("child{n}"),
                NodeValue::Object(vec![TreeNode::labeled("v", scalar(Scalar::Int(n)))]),
            )
        };
        let root = TreeNode::new(NodeValue::Array(vec![
            TreeNode::new(NodeValue::Object(vec![TreeNode::labeled(
                "item",
                NodeValue::Object(vec![TreeNode::labeled("a", scalar(Scalar::Int(1)))]),
            )])),
            TreeNode::new(NodeValue::Object(vec![
                TreeNode::labeled(
                    "item",
                    NodeValue::Object(vec![TreeNode::labeled("b", scalar(Scalar::Char('c')))]),
                ),
                child(2),
            ])),
        ]));

        let mut generator = SchemaGenerator::new(SchemaOptions {
            package: String::new(),
            root_class: "root".to_string(),
        });
        generator.add_root(&root);

        let classes: Vec<_> = generator.classes().keys().cloned().collect();
        assert_eq!(classes, ["Root", "Item", "Child2"]);
        let item: Vec<_> = generator.classes()["Item"].iter().collect();
        assert_eq!(
            item,
            [
                (&"a".to_string(), &"int".to_string()),
                (&"b".to_string(), &"String".to_string())
            ]
        );
        assert!(generator.render().starts_with("import groovy.transform.Canonical\n\n"));
    }

    #[test]
    fn naming_helpers() {
        assert_eq!(singularize("Categories"), "Category");
        assert_eq!(singularize("Items"), "Item");
        assert_eq!(singularize("S"), "S");
        assert_eq!(sanitize_class_name("--"), "ClassName");
        assert_eq!(sanitize_class_name("my-type"), "Mytype");
        assert_eq!(sanitize_property_name("9lives"), "_9lives");
        assert_eq!(sanitize_property_name("a.b"), "a_b");
    }
}
