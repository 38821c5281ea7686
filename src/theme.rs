use ratatui::style::Color;
use serde::{Deserialize, Serialize};
use std::fmt;
use syntect::highlighting::{Theme, ThemeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    #[default]
    Light,
    Dark,
}

impl ThemeMode {
    pub fn toggled(self) -> Self {
        match self {
            ThemeMode::Light => ThemeMode::Dark,
            ThemeMode::Dark => ThemeMode::Light,
        }
    }
}

impl fmt::Display for ThemeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThemeMode::Light => f.write_str("light"),
            ThemeMode::Dark => f.write_str("dark"),
        }
    }
}

pub struct ThemeManager {
    theme_set: ThemeSet,
    empty: Theme,
}

#[derive(Debug, Clone, Copy)]
pub struct UiPalette {
    pub base_fg: Color,
    pub base_bg: Option<Color>,
    pub accent: Color,
    pub muted: Color,
    pub border: Color,
}

impl Default for ThemeManager {
    fn default() -> Self {
        Self::load()
    }
}

impl ThemeManager {
    pub fn load() -> Self {
        Self {
            theme_set: ThemeSet::load_defaults(),
            empty: Theme::default(),
        }
    }

    pub fn has_theme(&self, name: &str) -> bool {
        self.theme_set.themes.contains_key(name)
    }

    /// The named theme, or any bundled theme when the name is unknown.
    pub fn get(&self, name: &str) -> &Theme {
        self.theme_set
            .themes
            .get(name)
            .or_else(|| self.theme_set.themes.values().next())
            .unwrap_or(&self.empty)
    }

    pub fn ui_palette(&self, name: &str) -> UiPalette {
        palette_from_theme(self.get(name))
    }
}

fn palette_from_theme(theme: &Theme) -> UiPalette {
    let settings = &theme.settings;
    let base_fg = settings
        .foreground
        .map(to_ratatui)
        .unwrap_or(Color::Gray);
    let base_bg = settings.background.map(to_ratatui);
    let accent = settings
        .selection_foreground
        .or(settings.caret)
        .or(settings.foreground)
        .map(to_ratatui)
        .unwrap_or(Color::Cyan);
    let muted = settings
        .gutter_foreground
        .or(settings.foreground)
        .map(to_ratatui)
        .unwrap_or(Color::DarkGray);

    UiPalette {
        base_fg,
        base_bg,
        accent,
        muted,
        border: muted,
    }
}

fn to_ratatui(color: syntect::highlighting::Color) -> Color {
    Color::Rgb(color.r, color.g, color.b)
}
