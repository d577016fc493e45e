//! Category trees: recursive, selectable nodes replaced wholesale.
//!
//! Producers emit the whole tree on every change, in one of two shapes:
//! a nested root node (`tree`) or a flat list of top-level nodes keyed by
//! kind (`people_tree` / `place_tree`). Both land in [`CategoryTree`]; the
//! flat shape is wrapped in a synthetic root that carries no selection.
//!
//! Depth is bounded to three levels by producer contract only. Nothing here
//! rejects deeper or shallower trees.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Levels a well-behaved producer emits below the root: top, child, grandchild.
pub const CONTRACT_DEPTH: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeKind {
    People,
    Place,
    Generic,
}

impl TreeKind {
    /// Parse a tree kind from either its short name or its event type.
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value.trim().to_ascii_lowercase().as_str() {
            "people" | "people_tree" => Self::People,
            "place" | "place_tree" => Self::Place,
            "generic" | "tree" => Self::Generic,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::People => "people",
            Self::Place => "place",
            Self::Generic => "generic",
        }
    }

    /// Wire discriminant of the event that carries this tree kind.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::People => "people_tree",
            Self::Place => "place_tree",
            Self::Generic => "tree",
        }
    }
}

/// One node of a category tree.
///
/// Child order is significant and preserved exactly as received.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    #[serde(default)]
    pub emoji: String,
    #[serde(default)]
    pub label: String,
    #[serde(default, deserialize_with = "deserialize_truthy")]
    pub selected: bool,
    #[serde(default, deserialize_with = "deserialize_children")]
    pub children: Vec<Category>,
}

impl Category {
    pub fn new(emoji: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            emoji: emoji.into(),
            label: label.into(),
            selected: false,
            children: Vec::new(),
        }
    }

    pub fn selected(mut self, selected: bool) -> Self {
        self.selected = selected;
        self
    }

    pub fn with_child(mut self, child: Category) -> Self {
        self.children.push(child);
        self
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of levels in this subtree, counting this node. A leaf is 1.
    pub fn depth(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(Category::depth)
            .max()
            .unwrap_or(0)
    }

    /// Number of nodes in this subtree, counting this node.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Category::node_count).sum::<usize>()
    }

    /// Pre-order traversal yielding `(level, node)`, this node at level 0.
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            stack: vec![(0, self)],
        }
    }

    /// Copy of this subtree where every node with a selected descendant is
    /// itself selected.
    pub fn with_propagated_selection(&self) -> Category {
        let children: Vec<Category> = self
            .children
            .iter()
            .map(Category::with_propagated_selection)
            .collect();
        let selected = self.selected || children.iter().any(|child| child.selected);
        Category {
            emoji: self.emoji.clone(),
            label: self.label.clone(),
            selected,
            children,
        }
    }
}

/// Pre-order iterator over a category subtree.
pub struct Walk<'a> {
    stack: Vec<(usize, &'a Category)>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = (usize, &'a Category);

    fn next(&mut self) -> Option<Self::Item> {
        let (level, node) = self.stack.pop()?;
        self.stack
            .extend(node.children.iter().rev().map(|child| (level + 1, child)));
        Some((level, node))
    }
}

/// A complete tree snapshot of one kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTree {
    pub kind: TreeKind,
    pub root: Category,
    /// True when `root` was synthesized around a flat top-level node list.
    #[serde(default)]
    pub synthetic_root: bool,
}

impl CategoryTree {
    /// Tree from a nested payload whose root node is meaningful.
    pub fn nested(kind: TreeKind, root: Category) -> Self {
        Self {
            kind,
            root,
            synthetic_root: false,
        }
    }

    /// Tree from a flat list of top-level nodes.
    pub fn from_top_level(kind: TreeKind, nodes: Vec<Category>) -> Self {
        Self {
            kind,
            root: Category {
                children: nodes,
                ..Category::default()
            },
            synthetic_root: true,
        }
    }

    /// The nodes the producer considers "top level".
    pub fn top_level(&self) -> &[Category] {
        if self.synthetic_root {
            &self.root.children
        } else {
            std::slice::from_ref(&self.root)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.top_level().is_empty()
    }

    /// Levels of real nodes, not counting a synthetic root.
    pub fn levels(&self) -> usize {
        self.top_level()
            .iter()
            .map(Category::depth)
            .max()
            .unwrap_or(0)
    }

    /// Label paths of every selected node, in traversal order.
    pub fn selected_paths(&self) -> Vec<Vec<String>> {
        let mut out = Vec::new();
        let mut path = Vec::new();
        for node in self.top_level() {
            collect_selected(node, &mut path, &mut out);
        }
        out
    }

    /// Copy with selection propagated upward, ready to submit back.
    pub fn with_propagated_selection(&self) -> CategoryTree {
        let mut root = self.root.with_propagated_selection();
        if self.synthetic_root {
            root.selected = false;
        }
        CategoryTree {
            kind: self.kind,
            root,
            synthetic_root: self.synthetic_root,
        }
    }
}

fn collect_selected(node: &Category, path: &mut Vec<String>, out: &mut Vec<Vec<String>>) {
    path.push(node.label.clone());
    if node.selected {
        out.push(path.clone());
    }
    for child in &node.children {
        collect_selected(child, path, out);
    }
    path.pop();
}

/// Latest tree snapshot per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TreeSet {
    trees: BTreeMap<TreeKind, CategoryTree>,
}

impl TreeSet {
    /// Replace the snapshot for `tree.kind` wholesale, returning the old one.
    pub fn replace(&mut self, tree: CategoryTree) -> Option<CategoryTree> {
        self.trees.insert(tree.kind, tree)
    }

    pub fn get(&self, kind: TreeKind) -> Option<&CategoryTree> {
        self.trees.get(&kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CategoryTree> {
        self.trees.values()
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }
}

/// Interpret a JSON value under the "truthy" selection convention.
///
/// Booleans as-is, numbers when non-zero, strings `"true"`/`"1"`
/// case-insensitively. Everything else is false.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => {
            let text = text.trim();
            text.eq_ignore_ascii_case("true") || text == "1"
        }
        _ => false,
    }
}

fn deserialize_truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().is_some_and(is_truthy))
}

fn deserialize_children<'de, D>(deserializer: D) -> Result<Vec<Category>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Category>>::deserialize(deserializer)?.unwrap_or_default())
}
