//! Element tree store
//!
//! Owns the authoritative UI tree of one session. Every mutation is checked
//! against the tree invariants before it touches the tree, so a failed
//! mutation leaves the store exactly as it was.

use crate::element::{Element, ElementKind, ElementTree, ThemeVariables};
use crate::errors::{TreeError, TreeResult};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

/// An element to be inserted; the store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewElement {
    pub kind: ElementKind,
    pub properties: Map<String, Value>,
    pub layout: Option<Map<String, Value>>,
    pub parent_id: Option<String>,
}

impl NewElement {
    pub fn new(kind: ElementKind) -> Self {
        Self {
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

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }
}

/// A single tree mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Add(NewElement),
    /// Merge the given keys into the element's properties and layout.
    Update {
        id: String,
        properties: Map<String, Value>,
        layout: Map<String, Value>,
    },
    /// Remove an element and its whole subtree.
    Remove { id: String },
    ReplaceAll(Vec<Element>),
    SetTheme(Option<ThemeVariables>),
}

/// What a successful mutation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    Added { id: String },
    Updated { id: String },
    Removed { ids: Vec<String> },
    Replaced { count: usize },
    ThemeSet,
}

/// Store for one session's element tree.
#[derive(Debug, Default)]
pub struct ElementStore {
    elements: Vec<Element>,
    theme: Option<ThemeVariables>,
    next_id: u64,
}

impl ElementStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one mutation, or fail without changing anything.
    pub fn apply(&mut self, mutation: Mutation) -> TreeResult<Applied> {
        match mutation {
            Mutation::Add(new) => self.add(new),
            Mutation::Update {
                id,
                properties,
                layout,
            } => self.update(id, properties, layout),
            Mutation::Remove { id } => self.remove(&id),
            Mutation::ReplaceAll(elements) => self.replace_all(elements),
            Mutation::SetTheme(theme) => {
                self.theme = theme;
                Ok(Applied::ThemeSet)
            }
        }
    }

    /// Immutable copy of the current tree.
    pub fn snapshot(&self) -> ElementTree {
        ElementTree {
            elements: self.elements.clone(),
            theme: self.theme.clone(),
        }
    }

    /// Drop every element and the theme.
    pub fn clear(&mut self) {
        self.elements.clear();
        self.theme = None;
    }

    pub fn get(&self, id: &str) -> Option<&Element> {
        self.elements.iter().find(|e| e.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Whether a button in the current tree carries `callback_id`.
    pub fn has_callback(&self, callback_id: &str) -> bool {
        self.elements
            .iter()
            .any(|e| e.callback_id() == Some(callback_id))
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    fn add(&mut self, new: NewElement) -> TreeResult<Applied> {
        if let Some(parent_id) = &new.parent_id {
            self.check_parent(parent_id)?;
        }

        let id = self.generate_id(new.kind);

        self.elements.push(Element {
            id: id.clone(),
            kind: new.kind,
            properties: new.properties,
            layout: new.layout,
            parent_id: new.parent_id,
        });
        Ok(Applied::Added { id })
    }

    fn update(
        &mut self,
        id: String,
        properties: Map<String, Value>,
        layout: Map<String, Value>,
    ) -> TreeResult<Applied> {
        let element = self
            .elements
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| TreeError::UnknownReference(id.clone()))?;

        element.properties.extend(properties);
        if !layout.is_empty() {
            element.layout.get_or_insert_with(Map::new).extend(layout);
        }
        Ok(Applied::Updated { id })
    }

    fn remove(&mut self, id: &str) -> TreeResult<Applied> {
        if !self.contains(id) {
            return Err(TreeError::UnknownReference(id.to_string()));
        }

        let mut doomed: HashSet<String> = HashSet::from([id.to_string()]);
        loop {
            let before = doomed.len();
            for element in &self.elements {
                if let Some(parent) = &element.parent_id {
                    if doomed.contains(parent) {
                        doomed.insert(element.id.clone());
                    }
                }
            }
            if doomed.len() == before {
                break;
            }
        }

        let ids = self
            .elements
            .iter()
            .filter(|e| doomed.contains(&e.id))
            .map(|e| e.id.clone())
            .collect();
        self.elements.retain(|e| !doomed.contains(&e.id));
        Ok(Applied::Removed { ids })
    }

    fn replace_all(&mut self, elements: Vec<Element>) -> TreeResult<Applied> {
        let mut kinds: HashMap<&str, ElementKind> = HashMap::new();
        for element in &elements {
            if kinds.insert(element.id.as_str(), element.kind).is_some() {
                return Err(TreeError::DuplicateId(element.id.clone()));
            }
        }

        let parents: HashMap<&str, &str> = elements
            .iter()
            .filter_map(|e| e.parent_id.as_deref().map(|p| (e.id.as_str(), p)))
            .collect();

        for (child, parent) in &parents {
            match kinds.get(parent) {
                None => return Err(TreeError::UnknownReference(parent.to_string())),
                Some(kind) if !kind.can_have_children() => {
                    return Err(TreeError::InvalidParent {
                        parent_id: parent.to_string(),
                        kind: kind.to_string(),
                    })
                }
                Some(_) => {}
            }

            // Walking up must reach a root within `len` steps.
            let mut cursor = *parent;
            let mut steps = 0;
            while let Some(next) = parents.get(cursor) {
                if cursor == *child || steps > elements.len() {
                    return Err(TreeError::Cycle(child.to_string()));
                }
                cursor = *next;
                steps += 1;
            }
            if cursor == *child {
                return Err(TreeError::Cycle(child.to_string()));
            }
        }

        let count = elements.len();
        self.elements = elements;
        Ok(Applied::Replaced { count })
    }

    fn check_parent(&self, parent_id: &str) -> TreeResult<()> {
        let parent = self
            .get(parent_id)
            .ok_or_else(|| TreeError::UnknownReference(parent_id.to_string()))?;
        if !parent.kind.can_have_children() {
            return Err(TreeError::InvalidParent {
                parent_id: parent_id.to_string(),
                kind: parent.kind.to_string(),
            });
        }
        Ok(())
    }

    fn generate_id(&mut self, kind: ElementKind) -> String {
        loop {
            let id = format!("{}-{}", kind.id_prefix(), self.next_id);
            self.next_id += 1;
            if !self.contains(&id) {
                return id;
            }
        }
    }
}
