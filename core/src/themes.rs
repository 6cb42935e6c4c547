//! Built-in theme catalogue used by the `apply_theme` tool.

use crate::element::ThemeVariables;
use std::collections::BTreeMap;

/// A named theme definition.
#[derive(Debug)]
pub struct Theme {
    pub name: &'static str,
    pub description: &'static str,
    variables: &'static [(&'static str, &'static str)],
}

impl Theme {
    pub fn variables(&self) -> ThemeVariables {
        self.variables
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

pub static THEMES: &[Theme] = &[
    Theme {
        name: "minimal",
        description: "Clean, minimal design with light colors and sans-serif fonts",
        variables: &[
            ("primary_color", "#0066cc"),
            ("secondary_color", "#666666"),
            ("accent_color", "#0066cc"),
            ("bg_primary", "#ffffff"),
            ("bg_secondary", "#f9f9f9"),
            ("text_primary", "#333333"),
            ("text_secondary", "#666666"),
            ("border_color", "#dddddd"),
            ("border_radius", "4px"),
            ("font_family", "'Segoe UI', Roboto, sans-serif"),
            ("spacing_unit", "8px"),
            ("button_bg", "#0066cc"),
            ("button_text", "#ffffff"),
            ("button_hover_bg", "#0052a3"),
        ],
    },
    Theme {
        name: "pirate",
        description: "Browns, golds and maritime colors",
        variables: &[
            ("primary_color", "#8B4513"),
            ("secondary_color", "#DAA520"),
            ("accent_color", "#FFD700"),
            ("bg_primary", "#1a1410"),
            ("bg_secondary", "#2d2419"),
            ("text_primary", "#F5DEB3"),
            ("text_secondary", "#D2B48C"),
            ("border_color", "#654321"),
            ("border_radius", "2px"),
            ("font_family", "Georgia, serif"),
            ("spacing_unit", "10px"),
            ("button_bg", "#8B4513"),
            ("button_text", "#F5DEB3"),
            ("button_hover_bg", "#A0522D"),
        ],
    },
    Theme {
        name: "halloween",
        description: "Oranges, purples and blacks",
        variables: &[
            ("primary_color", "#ff6600"),
            ("secondary_color", "#9933ff"),
            ("accent_color", "#ff3300"),
            ("bg_primary", "#1a0f2e"),
            ("bg_secondary", "#2d1b4e"),
            ("text_primary", "#ffd700"),
            ("text_secondary", "#ff9999"),
            ("border_color", "#9933ff"),
            ("border_radius", "8px"),
            ("font_family", "'Georgia', 'serif'"),
            ("spacing_unit", "8px"),
            ("button_bg", "#ff6600"),
            ("button_text", "#ffffff"),
            ("button_hover_bg", "#ff8533"),
        ],
    },
    Theme {
        name: "cyberpunk",
        description: "Neon cyans and pinks on dark backgrounds",
        variables: &[
            ("primary_color", "#00ffff"),
            ("secondary_color", "#ff0080"),
            ("accent_color", "#ffff00"),
            ("bg_primary", "#0a0e27"),
            ("bg_secondary", "#16213e"),
            ("text_primary", "#00ffff"),
            ("text_secondary", "#ff0080"),
            ("border_color", "#00ffff"),
            ("border_radius", "0px"),
            ("font_family", "'Courier New', monospace"),
            ("spacing_unit", "8px"),
            ("button_bg", "#00ffff"),
            ("button_text", "#0a0e27"),
            ("button_hover_bg", "#00cccc"),
        ],
    },
    Theme {
        name: "retro",
        description: "Bright 80s colors and chunky borders",
        variables: &[
            ("primary_color", "#ff006e"),
            ("secondary_color", "#00f5ff"),
            ("accent_color", "#ffbe0b"),
            ("bg_primary", "#ffffff"),
            ("bg_secondary", "#f0f0f0"),
            ("text_primary", "#ff006e"),
            ("text_secondary", "#00f5ff"),
            ("border_color", "#ffbe0b"),
            ("border_radius", "12px"),
            ("font_family", "'Arial Black', sans-serif"),
            ("spacing_unit", "10px"),
            ("button_bg", "#ff006e"),
            ("button_text", "#ffffff"),
            ("button_hover_bg", "#ffb3d9"),
        ],
    },
    Theme {
        name: "forest",
        description: "Greens, browns and earth tones",
        variables: &[
            ("primary_color", "#2d5016"),
            ("secondary_color", "#6b4423"),
            ("accent_color", "#a8d73d"),
            ("bg_primary", "#f5f9f2"),
            ("bg_secondary", "#e8f0e0"),
            ("text_primary", "#1a2e0a"),
            ("text_secondary", "#4a7c2c"),
            ("border_color", "#6b4423"),
            ("border_radius", "6px"),
            ("font_family", "'Trebuchet MS', sans-serif"),
            ("spacing_unit", "8px"),
            ("button_bg", "#2d5016"),
            ("button_text", "#f5f9f2"),
            ("button_hover_bg", "#4a7c2c"),
        ],
    },
];

/// Case-insensitive theme lookup.
pub fn get(name: &str) -> Option<&'static Theme> {
    THEMES.iter().find(|t| t.name.eq_ignore_ascii_case(name))
}

/// Names of every built-in theme.
pub fn available() -> Vec<&'static str> {
    THEMES.iter().map(|t| t.name).collect()
}

/// Overlay `overrides` on `base`; the base map is left untouched.
pub fn merge(
    base: &ThemeVariables,
    overrides: Option<&BTreeMap<String, String>>,
) -> ThemeVariables {
    let mut merged = base.clone();
    if let Some(overrides) = overrides {
        merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    merged
}
