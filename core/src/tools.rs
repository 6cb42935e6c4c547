//! Tool validation and application
//!
//! Each tool call from the Architect is decoded into a typed argument struct
//! (unknown keys and wrong primitive types are rejected), checked against the
//! current tree, and turned into at most one store mutation. Calls are
//! independent: a rejected call is reported and the next one still runs.

use crate::element::{ElementKind, ThemeVariables};
use crate::errors::{ToolError, ToolResult, TreeError};
use crate::store::{Applied, ElementStore, Mutation, NewElement};
use crate::themes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// A tool call emitted by the Architect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Result of executing one tool call, reported back to the Architect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub call_id: String,
    pub tool_name: String,
    pub ok: bool,
    pub detail: String,
    /// Element created, updated or deleted by the call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_id: Option<String>,
}

/// The fixed set of tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    DisplayText,
    CreateButton,
    CreateContainer,
    UpdateElement,
    DeleteElement,
    ApplyTheme,
    ClearUi,
}

impl ToolName {
    pub const ALL: [ToolName; 7] = [
        ToolName::DisplayText,
        ToolName::CreateButton,
        ToolName::CreateContainer,
        ToolName::UpdateElement,
        ToolName::DeleteElement,
        ToolName::ApplyTheme,
        ToolName::ClearUi,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::DisplayText => "display_text",
            ToolName::CreateButton => "create_button",
            ToolName::CreateContainer => "create_container",
            ToolName::UpdateElement => "update_element",
            ToolName::DeleteElement => "delete_element",
            ToolName::ApplyTheme => "apply_theme",
            ToolName::ClearUi => "clear_ui",
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolName::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ToolError::UnknownTool(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum FlexDirection {
    Row,
    Column,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum JustifyContent {
    FlexStart,
    Center,
    FlexEnd,
    SpaceBetween,
    SpaceAround,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DisplayTextArgs {
    content: String,
    key: Option<String>,
    parent_id: Option<String>,
    flex_grow: Option<f64>,
    width: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CreateButtonArgs {
    label: String,
    callback_id: Option<String>,
    key: Option<String>,
    parent_id: Option<String>,
    flex_grow: Option<f64>,
    width: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CreateContainerArgs {
    key: Option<String>,
    parent_id: Option<String>,
    flex_direction: Option<FlexDirection>,
    justify_content: Option<JustifyContent>,
    gap: Option<String>,
    rows: Option<u32>,
    cols: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UpdateElementArgs {
    id: String,
    content: Option<String>,
    label: Option<String>,
    callback_id: Option<String>,
    flex_grow: Option<f64>,
    width: Option<String>,
    flex_direction: Option<FlexDirection>,
    justify_content: Option<JustifyContent>,
    gap: Option<String>,
    rows: Option<u32>,
    cols: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeleteElementArgs {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ApplyThemeArgs {
    theme_name: String,
    custom_overrides: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ClearUiArgs {}

/// Where an updatable field lives on the element.
enum Slot {
    Property,
    Layout,
}

/// Which fields `update_element` may change for each kind.
fn mutable_slot(kind: ElementKind, field: &str) -> Option<Slot> {
    match (kind, field) {
        (ElementKind::Text, "content") => Some(Slot::Property),
        (ElementKind::Button, "label" | "callback_id") => Some(Slot::Property),
        (ElementKind::Text | ElementKind::Button, "flex_grow" | "width") => Some(Slot::Layout),
        (
            ElementKind::Container,
            "flex_direction" | "justify_content" | "gap" | "rows" | "cols",
        ) => Some(Slot::Layout),
        _ => None,
    }
}

/// Turn-local aliases from Architect-chosen keys to generated ids.
#[derive(Debug, Default)]
pub struct TurnScope {
    keys: HashMap<String, String>,
}

impl TurnScope {
    /// Resolve a reference that may be a key bound earlier in this turn.
    pub fn resolve(&self, reference: &str) -> String {
        self.keys
            .get(reference)
            .cloned()
            .unwrap_or_else(|| reference.to_string())
    }

    fn bind(&mut self, key: String, id: String) {
        self.keys.insert(key, id);
    }

    fn is_bound(&self, key: &str) -> bool {
        self.keys.contains_key(key)
    }
}

/// Applies one turn's tool calls to a store.
pub struct ToolApplier<'a> {
    store: &'a mut ElementStore,
    scope: TurnScope,
    touched: Option<String>,
}

impl<'a> ToolApplier<'a> {
    pub fn new(store: &'a mut ElementStore) -> Self {
        Self {
            store,
            scope: TurnScope::default(),
            touched: None,
        }
    }

    /// Execute a single call and report the outcome.
    pub fn execute(&mut self, call: &ToolCall) -> ToolOutcome {
        self.touched = None;
        let result = self.try_execute(call);
        match result {
            Ok(detail) => {
                debug!(tool = %call.name, call_id = %call.id, "{}", detail);
                ToolOutcome {
                    call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    ok: true,
                    detail,
                    element_id: self.touched.take(),
                }
            }
            Err(e) => {
                warn!(tool = %call.name, call_id = %call.id, "Rejected tool call: {}", e);
                ToolOutcome {
                    call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    ok: false,
                    detail: format!("Error: {}", e),
                    element_id: None,
                }
            }
        }
    }

    fn try_execute(&mut self, call: &ToolCall) -> ToolResult<String> {
        let tool: ToolName = call.name.parse()?;
        match tool {
            ToolName::DisplayText => {
                let args: DisplayTextArgs = decode(tool, &call.arguments)?;
                require_non_empty(tool, "content", &args.content)?;
                let mut new =
                    NewElement::new(ElementKind::Text).with_property("content", args.content);
                new.layout = item_layout(tool, args.flex_grow, args.width)?;
                self.create(tool, new, args.key, args.parent_id)
            }
            ToolName::CreateButton => {
                let args: CreateButtonArgs = decode(tool, &call.arguments)?;
                require_non_empty(tool, "label", &args.label)?;
                let mut new =
                    NewElement::new(ElementKind::Button).with_property("label", args.label);
                if let Some(callback_id) = args.callback_id {
                    require_non_empty(tool, "callback_id", &callback_id)?;
                    new = new.with_property("callback_id", callback_id);
                }
                new.layout = item_layout(tool, args.flex_grow, args.width)?;
                self.create(tool, new, args.key, args.parent_id)
            }
            ToolName::CreateContainer => {
                let args: CreateContainerArgs = decode(tool, &call.arguments)?;
                let mut layout = Map::new();
                if let Some(direction) = args.flex_direction {
                    layout.insert("flex_direction".to_string(), to_value(direction));
                }
                if let Some(justify) = args.justify_content {
                    layout.insert("justify_content".to_string(), to_value(justify));
                }
                if let Some(gap) = args.gap {
                    layout.insert("gap".to_string(), Value::from(gap));
                }
                for (field, value) in [("rows", args.rows), ("cols", args.cols)] {
                    if let Some(n) = value {
                        require_positive(tool, field, n)?;
                        layout.insert(field.to_string(), Value::from(n));
                    }
                }
                let mut new = NewElement::new(ElementKind::Container);
                new.layout = (!layout.is_empty()).then_some(layout);
                self.create(tool, new, args.key, args.parent_id)
            }
            ToolName::UpdateElement => {
                let args: UpdateElementArgs = decode(tool, &call.arguments)?;
                self.update(tool, args)
            }
            ToolName::DeleteElement => {
                let args: DeleteElementArgs = decode(tool, &call.arguments)?;
                let id = self.scope.resolve(&args.id);
                let applied = self.store.apply(Mutation::Remove { id: id.clone() })?;
                self.touched = Some(id.clone());
                match applied {
                    Applied::Removed { ids } => Ok(format!(
                        "Deleted {} ({} element(s) removed: {})",
                        id,
                        ids.len(),
                        ids.join(", ")
                    )),
                    _ => Ok(format!("Deleted {}", id)),
                }
            }
            ToolName::ApplyTheme => {
                let args: ApplyThemeArgs = decode(tool, &call.arguments)?;
                let theme = themes::get(&args.theme_name)
                    .ok_or_else(|| ToolError::UnknownTheme(args.theme_name.clone()))?;
                let variables: ThemeVariables =
                    themes::merge(&theme.variables(), args.custom_overrides.as_ref());
                self.store.apply(Mutation::SetTheme(Some(variables)))?;
                Ok(format!("Theme '{}' applied", theme.name))
            }
            ToolName::ClearUi => {
                if !call.arguments.is_null() {
                    let _: ClearUiArgs = decode(tool, &call.arguments)?;
                }
                self.store.apply(Mutation::ReplaceAll(Vec::new()))?;
                Ok("UI cleared".to_string())
            }
        }
    }

    fn create(
        &mut self,
        tool: ToolName,
        mut new: NewElement,
        key: Option<String>,
        parent_id: Option<String>,
    ) -> ToolResult<String> {
        if let Some(key) = &key {
            require_non_empty(tool, "key", key)?;
            if self.scope.is_bound(key) {
                return Err(ToolError::InvalidArguments {
                    tool: tool.to_string(),
                    reason: format!("key '{}' is already used in this turn", key),
                });
            }
        }
        new.parent_id = parent_id.map(|p| self.scope.resolve(&p));
        let kind = new.kind;

        let Applied::Added { id } = self.store.apply(Mutation::Add(new))? else {
            return Err(ToolError::InvalidArguments {
                tool: tool.to_string(),
                reason: "element was not created".to_string(),
            });
        };

        self.touched = Some(id.clone());
        match key {
            Some(key) => {
                self.scope.bind(key.clone(), id.clone());
                Ok(format!("Created {} {} (key '{}')", kind, id, key))
            }
            None => Ok(format!("Created {} {}", kind, id)),
        }
    }

    fn update(&mut self, tool: ToolName, args: UpdateElementArgs) -> ToolResult<String> {
        let id = self.scope.resolve(&args.id);
        let kind = self
            .store
            .get(&id)
            .map(|e| e.kind)
            .ok_or_else(|| TreeError::UnknownReference(id.clone()))?;

        if let Some(flex_grow) = args.flex_grow {
            require_flex_grow(tool, flex_grow)?;
        }
        for (field, value) in [("rows", args.rows), ("cols", args.cols)] {
            if let Some(n) = value {
                require_positive(tool, field, n)?;
            }
        }
        for (field, value) in [("label", &args.label), ("callback_id", &args.callback_id)] {
            if let Some(value) = value {
                require_non_empty(tool, field, value)?;
            }
        }

        let fields: Vec<(&str, Option<Value>)> = vec![
            ("content", args.content.map(Value::from)),
            ("label", args.label.map(Value::from)),
            ("callback_id", args.callback_id.map(Value::from)),
            ("flex_grow", args.flex_grow.map(Value::from)),
            ("width", args.width.map(Value::from)),
            ("flex_direction", args.flex_direction.map(to_value)),
            ("justify_content", args.justify_content.map(to_value)),
            ("gap", args.gap.map(Value::from)),
            ("rows", args.rows.map(Value::from)),
            ("cols", args.cols.map(Value::from)),
        ];

        let mut properties = Map::new();
        let mut layout = Map::new();
        for (field, value) in fields {
            let Some(value) = value else { continue };
            match mutable_slot(kind, field) {
                Some(Slot::Property) => properties.insert(field.to_string(), value),
                Some(Slot::Layout) => layout.insert(field.to_string(), value),
                None => {
                    return Err(ToolError::ImmutableProperty {
                        field: field.to_string(),
                        kind: kind.to_string(),
                    })
                }
            };
        }

        if properties.is_empty() && layout.is_empty() {
            return Ok(format!("Nothing to update on {}", id));
        }

        self.store.apply(Mutation::Update {
            id: id.clone(),
            properties,
            layout,
        })?;
        self.touched = Some(id.clone());
        Ok(format!("Updated {}", id))
    }
}

/// Apply a whole turn's calls in order, collecting every outcome.
pub fn apply_all(store: &mut ElementStore, calls: &[ToolCall]) -> Vec<ToolOutcome> {
    let mut applier = ToolApplier::new(store);
    calls.iter().map(|call| applier.execute(call)).collect()
}

fn decode<T: DeserializeOwned>(tool: ToolName, arguments: &Value) -> ToolResult<T> {
    serde_json::from_value(arguments.clone()).map_err(|e| ToolError::InvalidArguments {
        tool: tool.to_string(),
        reason: e.to_string(),
    })
}

fn to_value<T: Serialize>(value: T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn require_non_empty(tool: ToolName, field: &str, value: &str) -> ToolResult<()> {
    if value.trim().is_empty() {
        return Err(ToolError::InvalidArguments {
            tool: tool.to_string(),
            reason: format!("'{}' must not be empty", field),
        });
    }
    Ok(())
}

fn require_positive(tool: ToolName, field: &str, value: u32) -> ToolResult<()> {
    if value == 0 {
        return Err(ToolError::InvalidArguments {
            tool: tool.to_string(),
            reason: format!("'{}' must be at least 1", field),
        });
    }
    Ok(())
}

fn require_flex_grow(tool: ToolName, value: f64) -> ToolResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(ToolError::InvalidArguments {
            tool: tool.to_string(),
            reason: "'flex_grow' must be a non-negative number".to_string(),
        });
    }
    Ok(())
}

fn item_layout(
    tool: ToolName,
    flex_grow: Option<f64>,
    width: Option<String>,
) -> ToolResult<Option<Map<String, Value>>> {
    let mut layout = Map::new();
    if let Some(flex_grow) = flex_grow {
        require_flex_grow(tool, flex_grow)?;
        layout.insert("flex_grow".to_string(), Value::from(flex_grow));
    }
    if let Some(width) = width {
        layout.insert("width".to_string(), Value::from(width));
    }
    Ok((!layout.is_empty()).then_some(layout))
}

/// Tool definition advertised to model-backed Architects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Definitions for every tool in [`ToolName::ALL`].
pub fn tool_definitions() -> Vec<ToolDefinition> {
    let key = json!({
        "type": "string",
        "description": "Optional label for this element, usable as parent_id or id \
                        by later calls in the same turn"
    });
    let parent_id = json!({
        "type": "string",
        "description": "Id of an existing container, or a key from this turn, to nest under"
    });
    let flex_grow = json!({"type": "number", "description": "CSS flex-grow (0 or more)"});
    let width = json!({"type": "string", "description": "CSS width (e.g. '100%', '200px')"});
    let flex_direction = json!({"type": "string", "enum": ["row", "column"]});
    let justify_content = json!({
        "type": "string",
        "enum": ["flex-start", "center", "flex-end", "space-between", "space-around"]
    });

    ToolName::ALL
        .into_iter()
        .map(|tool| {
            let (description, input_schema) = match tool {
                ToolName::DisplayText => (
                    "Display text content on the UI.",
                    json!({
                        "type": "object",
                        "properties": {
                            "content": {"type": "string", "description": "The text to display"},
                            "key": key, "parent_id": parent_id,
                            "flex_grow": flex_grow, "width": width
                        },
                        "required": ["content"]
                    }),
                ),
                ToolName::CreateButton => (
                    "Create a clickable button. Clicking it sends the callback_id back to you.",
                    json!({
                        "type": "object",
                        "properties": {
                            "label": {"type": "string", "description": "Button text"},
                            "callback_id": {
                                "type": "string",
                                "description": "Identifier reported when clicked"
                            },
                            "key": key, "parent_id": parent_id,
                            "flex_grow": flex_grow, "width": width
                        },
                        "required": ["label"]
                    }),
                ),
                ToolName::CreateContainer => (
                    "Create a container that groups elements with flexbox or grid layout.",
                    json!({
                        "type": "object",
                        "properties": {
                            "key": key, "parent_id": parent_id,
                            "flex_direction": flex_direction,
                            "justify_content": justify_content,
                            "gap": {
                                "type": "string",
                                "description": "Space between items (e.g. '10px')"
                            },
                            "rows": {"type": "integer", "minimum": 1},
                            "cols": {"type": "integer", "minimum": 1}
                        }
                    }),
                ),
                ToolName::UpdateElement => (
                    "Change mutable fields of an existing element. \
                     Text: content, flex_grow, width. \
                     Button: label, callback_id, flex_grow, width. \
                     Container: flex_direction, justify_content, gap, rows, cols.",
                    json!({
                        "type": "object",
                        "properties": {
                            "id": {"type": "string"},
                            "content": {"type": "string"},
                            "label": {"type": "string"},
                            "callback_id": {"type": "string"},
                            "flex_grow": flex_grow, "width": width,
                            "flex_direction": flex_direction,
                            "justify_content": justify_content,
                            "gap": {"type": "string"},
                            "rows": {"type": "integer", "minimum": 1},
                            "cols": {"type": "integer", "minimum": 1}
                        },
                        "required": ["id"]
                    }),
                ),
                ToolName::DeleteElement => (
                    "Delete an element. Deleting a container deletes everything inside it.",
                    json!({
                        "type": "object",
                        "properties": {"id": {"type": "string"}},
                        "required": ["id"]
                    }),
                ),
                ToolName::ApplyTheme => (
                    "Apply a named theme to the whole UI, optionally overriding variables.",
                    json!({
                        "type": "object",
                        "properties": {
                            "theme_name": {"type": "string", "enum": themes::available()},
                            "custom_overrides": {
                                "type": "object",
                                "additionalProperties": {"type": "string"}
                            }
                        },
                        "required": ["theme_name"]
                    }),
                ),
                ToolName::ClearUi => (
                    "Remove every element from the UI.",
                    json!({"type": "object", "properties": {}}),
                ),
            };
            ToolDefinition {
                name: tool.to_string(),
                description: description.to_string(),
                input_schema,
            }
        })
        .collect()
}
