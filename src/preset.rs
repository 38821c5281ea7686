use crate::rules::RulesConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

pub const PRESET_FILE_NAME: &str = "preset.json";
pub const DEFAULT_PRESET_ID: &str = "default";
pub const DEFAULT_PAGE_TITLE: &str = "Page";

const BUILTIN_PRESET_JSON: &str = include_str!("../presets/basic/preset.json");
const BUILTIN_TEMPLATE: &str = include_str!("../presets/basic/template.html");

#[derive(Debug, Error)]
pub enum PresetError {
    #[error("Failed to read preset at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse preset at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to read template {path}: {source}")]
    Template {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// One line of a preset's reference sheet.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReferenceItem {
    #[serde(default)]
    pub syntax: String,
    #[serde(default)]
    pub meaning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PresetFile {
    id: Option<String>,
    name: Option<String>,
    #[serde(default = "default_template_name")]
    template: String,
    #[serde(default)]
    rules: RulesConfig,
    #[serde(default)]
    reference: Vec<ReferenceItem>,
    default_title: Option<String>,
    default_content: Option<String>,
}

fn default_template_name() -> String {
    "template.html".to_string()
}

#[derive(Debug, Clone)]
pub struct Preset {
    pub id: String,
    pub name: Option<String>,
    /// `preset.json` this preset was loaded from; `None` for the built-in one.
    pub path: Option<PathBuf>,
    pub template: String,
    pub rules: RulesConfig,
    pub reference: Vec<ReferenceItem>,
    pub default_title: Option<String>,
    pub default_content: Option<String>,
}

impl Preset {
    pub fn load(path: &Path) -> Result<Self, PresetError> {
        let raw = fs::read_to_string(path).map_err(|source| PresetError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: PresetFile = serde_json::from_str(&raw).map_err(|source| PresetError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let template_path = base_dir.join(&file.template);
        let template =
            fs::read_to_string(&template_path).map_err(|source| PresetError::Template {
                path: template_path.clone(),
                source,
            })?;

        log::debug!("loaded preset from {}", path.display());
        Ok(Self::from_file(file, template, Some(path.to_path_buf())))
    }

    pub fn builtin() -> Result<Self, PresetError> {
        let file: PresetFile =
            serde_json::from_str(BUILTIN_PRESET_JSON).map_err(|source| PresetError::Parse {
                path: PathBuf::from("<builtin>"),
                source,
            })?;
        Ok(Self::from_file(file, BUILTIN_TEMPLATE.to_string(), None))
    }

    fn from_file(file: PresetFile, template: String, path: Option<PathBuf>) -> Self {
        Self {
            id: file.id.unwrap_or_else(|| DEFAULT_PRESET_ID.to_string()),
            name: file.name,
            path,
            template,
            rules: file.rules,
            reference: file.reference,
            default_title: file.default_title,
            default_content: file.default_content,
        }
    }

    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        if !self.id.is_empty() {
            return self.id.clone();
        }
        self.path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| DEFAULT_PRESET_ID.to_string())
    }

    pub fn default_title(&self) -> &str {
        self.default_title.as_deref().unwrap_or(DEFAULT_PAGE_TITLE)
    }

    pub fn default_content(&self) -> &str {
        self.default_content.as_deref().unwrap_or_default()
    }

    /// The reference items to show, generated from the marker keys when the
    /// preset does not define any.
    pub fn reference_sheet(&self) -> Vec<ReferenceItem> {
        if !self.reference.is_empty() {
            return self.reference.clone();
        }
        self.rules
            .marker_keys()
            .into_iter()
            .map(|key| ReferenceItem {
                syntax: format!("{{{key}:...}}"),
                meaning: if key == "arabic" {
                    "Arabic text".to_string()
                } else {
                    format!("{key} marker")
                },
                key: Some(key.to_string()),
            })
            .collect()
    }

    /// Marker key to meaning, for hints next to completion items.
    pub fn marker_meanings(&self) -> HashMap<String, String> {
        let mut meanings = HashMap::new();
        for item in &self.reference {
            let key = item
                .key
                .clone()
                .or_else(|| marker_key_from_syntax(&item.syntax).map(str::to_string));
            if let Some(key) = key {
                meanings.insert(key, item.meaning.clone());
            }
        }
        meanings
    }
}

/// `{key:...}` -> `key`
fn marker_key_from_syntax(syntax: &str) -> Option<&str> {
    let rest = syntax.strip_prefix('{')?;
    let colon = rest.find(':')?;
    let key = &rest[..colon];
    if key.is_empty() {
        return None;
    }
    Some(key)
}

/// All presets available to the app: the built-in one plus every
/// `preset.json` found under the presets directory.
#[derive(Debug, Clone, Default)]
pub struct PresetCatalog {
    presets: Vec<Preset>,
}

impl PresetCatalog {
    pub fn load(dir: Option<&Path>) -> Result<Self, PresetError> {
        let mut catalog = Self {
            presets: vec![Preset::builtin()?],
        };
        if let Some(dir) = dir {
            for preset in discover_presets(dir) {
                catalog.insert(preset);
            }
        }
        catalog
            .presets
            .sort_by_key(|p| p.display_name().to_lowercase());
        Ok(catalog)
    }

    /// Adds a preset, replacing any existing preset with the same id.
    pub fn insert(&mut self, preset: Preset) {
        match self.presets.iter_mut().find(|p| p.id == preset.id) {
            Some(existing) => *existing = preset,
            None => self.presets.push(preset),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Preset> {
        self.presets.iter().find(|p| p.id == id)
    }

    /// The preset with `id` when given and known, otherwise the first one.
    pub fn select(&self, id: Option<&str>) -> Option<&Preset> {
        id.and_then(|id| self.get(id))
            .or_else(|| self.presets.first())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Preset> {
        self.presets.iter()
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }
}

/// Loads every `preset.json` below `dir`. Broken presets are logged and skipped.
pub fn discover_presets(dir: &Path) -> Vec<Preset> {
    if !dir.exists() {
        return Vec::new();
    }
    let mut presets = Vec::new();
    for entry in WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() || entry.file_name() != PRESET_FILE_NAME {
            continue;
        }
        match Preset::load(entry.path()) {
            Ok(preset) => presets.push(preset),
            Err(err) => log::warn!("skipping preset: {err}"),
        }
    }
    presets
}

#[cfg(test)]
mod tests {
    use super::{discover_presets, marker_key_from_syntax, Preset, PresetCatalog, PresetError};
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_preset(root: &Path, dir: &str, json: &str, template: Option<&str>) {
        let dir = root.join(dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("preset.json"), json).unwrap();
        if let Some(template) = template {
            fs::write(dir.join("template.html"), template).unwrap();
        }
    }

    #[test]
    fn builtin_preset_parses() {
        let preset = Preset::builtin().expect("builtin preset");
        assert_eq!(preset.id, "basic");
        assert!(preset.template.contains("{{content}}"));
        assert!(preset.rules.marker_keys().contains(&"b"));
        assert!(preset.path.is_none());
    }

    #[test]
    fn load_resolves_template_next_to_preset() {
        let tmp = TempDir::new().unwrap();
        write_preset(
            tmp.path(),
            "essay",
            r#"{ "id": "essay", "name": "Essay", "template": "template.html", "defaultTitle": "Essay" }"#,
            Some("<h1>{{title}}</h1>{{content}}"),
        );
        let preset = Preset::load(&tmp.path().join("essay/preset.json")).unwrap();
        assert_eq!(preset.template, "<h1>{{title}}</h1>{{content}}");
        assert_eq!(preset.default_title(), "Essay");
        assert_eq!(preset.default_content(), "");
        assert!(preset.rules.headings);
    }

    #[test]
    fn load_reports_missing_template() {
        let tmp = TempDir::new().unwrap();
        write_preset(tmp.path(), "broken", r#"{ "id": "broken" }"#, None);
        let err = Preset::load(&tmp.path().join("broken/preset.json")).unwrap_err();
        assert!(matches!(err, PresetError::Template { .. }));
    }

    #[test]
    fn display_name_falls_back_to_id() {
        let mut preset = Preset::builtin().unwrap();
        preset.name = None;
        assert_eq!(preset.display_name(), "basic");
        preset.id.clear();
        assert_eq!(preset.display_name(), "default");
    }

    #[test]
    fn reference_sheet_is_generated_from_markers() {
        let mut preset = Preset::builtin().unwrap();
        preset.reference.clear();
        preset.rules = crate::rules::RulesConfig::from_value(&serde_json::json!({
            "markers": { "arabic": { "class": "ar" }, "b": { "tag": "strong" } }
        }));
        let sheet = preset.reference_sheet();
        assert_eq!(sheet.len(), 2);
        assert_eq!(sheet[0].syntax, "{arabic:...}");
        assert_eq!(sheet[0].meaning, "Arabic text");
        assert_eq!(sheet[1].syntax, "{b:...}");
        assert_eq!(sheet[1].meaning, "b marker");
    }

    #[test]
    fn marker_meanings_use_key_or_syntax() {
        let preset = Preset::builtin().unwrap();
        let meanings = preset.marker_meanings();
        assert_eq!(meanings.get("b").map(String::as_str), Some("Bold text"));
        assert_eq!(meanings.get("note").map(String::as_str), Some("Side note"));
        assert!(!meanings.contains_key("# Heading"));
    }

    #[test]
    fn marker_key_from_syntax_requires_brace_and_colon() {
        assert_eq!(marker_key_from_syntax("{ar:...}"), Some("ar"));
        assert_eq!(marker_key_from_syntax("ar:..."), None);
        assert_eq!(marker_key_from_syntax("{ar}"), None);
        assert_eq!(marker_key_from_syntax("{:x}"), None);
    }

    #[test]
    fn discovery_skips_broken_presets() {
        let tmp = TempDir::new().unwrap();
        write_preset(tmp.path(), "good", r#"{ "id": "good" }"#, Some("{{content}}"));
        write_preset(tmp.path(), "bad", "{ not json", Some("{{content}}"));
        let presets = discover_presets(tmp.path());
        assert_eq!(presets.len(), 1);
        assert_eq!(presets[0].id, "good");
    }

    #[test]
    fn catalog_lets_discovered_presets_replace_builtin() {
        let tmp = TempDir::new().unwrap();
        write_preset(
            tmp.path(),
            "basic",
            r#"{ "id": "basic", "name": "Custom basic" }"#,
            Some("{{content}}"),
        );
        write_preset(tmp.path(), "zine", r#"{ "id": "zine", "name": "Zine" }"#, Some("{{content}}"));
        let catalog = PresetCatalog::load(Some(tmp.path())).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("basic").unwrap().display_name(), "Custom basic");
        assert_eq!(catalog.select(Some("zine")).unwrap().id, "zine");
        assert_eq!(catalog.select(Some("missing")).unwrap().id, "basic");
    }
}
