//! Element and element tree types.
//!
//! The tree is stored and serialized flat: every element names its parent
//! through `parent_id`, and sibling order is insertion order. Consumers that
//! need nesting rebuild it with [`ElementTree::nest`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Flat key/value map of style variables.
pub type ThemeVariables = BTreeMap<String, String>;

/// The closed set of element kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Text,
    Button,
    Container,
}

impl ElementKind {
    /// Prefix used for store-generated ids.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            ElementKind::Text => "text",
            ElementKind::Button => "button",
            ElementKind::Container => "container",
        }
    }

    pub fn can_have_children(&self) -> bool {
        matches!(self, ElementKind::Container)
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id_prefix())
    }
}

/// A single UI element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ElementKind,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl Element {
    pub fn new(id: impl Into<String>, kind: ElementKind) -> Self {
        Self {
            id: id.into(),
            kind,
            properties: Map::new(),
            layout: None,
            parent_id: None,
        }
    }

    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    pub fn with_layout(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.layout
            .get_or_insert_with(Map::new)
            .insert(key.to_string(), value.into());
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// String property lookup.
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    /// Callback identifier of a button, if any.
    pub fn callback_id(&self) -> Option<&str> {
        match self.kind {
            ElementKind::Button => self.property_str("callback_id"),
            _ => None,
        }
    }
}

/// Serializable UI state: the flat element list plus an optional theme.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementTree {
    pub elements: Vec<Element>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<ThemeVariables>,
}

/// A nested view of one element and its children.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub element: Element,
    pub children: Vec<TreeNode>,
}

impl ElementTree {
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn get(&self, id: &str) -> Option<&Element> {
        self.elements.iter().find(|e| e.id == id)
    }

    /// Children of `parent` (or the roots for `None`) in render order.
    pub fn children_of<'a>(&'a self, parent: Option<&'a str>) -> impl Iterator<Item = &'a Element> {
        self.elements
            .iter()
            .filter(move |e| e.parent_id.as_deref() == parent)
    }

    /// Whether any button in the tree carries `callback_id`.
    pub fn has_callback(&self, callback_id: &str) -> bool {
        self.elements
            .iter()
            .any(|e| e.callback_id() == Some(callback_id))
    }

    /// Rebuild the nested structure from `parent_id` links.
    ///
    /// Elements whose parent is missing from the tree are returned as roots.
    pub fn nest(&self) -> Vec<TreeNode> {
        self.elements
            .iter()
            .filter(|e| match &e.parent_id {
                None => true,
                Some(parent) => self.get(parent).is_none(),
            })
            .map(|root| self.nest_from(root))
            .collect()
    }

    fn nest_from(&self, element: &Element) -> TreeNode {
        TreeNode {
            element: element.clone(),
            children: self
                .children_of(Some(&element.id))
                .map(|child| self.nest_from(child))
                .collect(),
        }
    }
}
