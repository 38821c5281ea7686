//! Named drafts, stored per preset as JSON files.
//!
//! ```text
//! <root>/<preset>/index.json        order + per-draft name/updatedAt
//! <root>/<preset>/drafts/<id>.json  one document per draft
//! <root>/<preset>/active.json       id of the last opened draft
//! ```

use crate::preset::Preset;
use crate::store::{load_json, remove_file, save_json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

const STARTER_DRAFT_NAME: &str = "Draft 1";

#[derive(Debug, Error)]
pub enum DraftError {
    #[error("You must keep at least one draft")]
    LastDraft,

    #[error("Draft name cannot be empty")]
    EmptyName,

    #[error("No draft with id {0}")]
    NotFound(String),

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftDoc {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftMeta {
    pub name: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftsIndex {
    /// Most recently created first.
    #[serde(default)]
    pub order: Vec<String>,
    #[serde(default)]
    pub meta: HashMap<String, DraftMeta>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftSummary {
    pub id: String,
    pub name: String,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Editable fields of a draft.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DraftContent {
    pub title: String,
    pub filename: String,
    pub source: String,
}

impl From<&DraftDoc> for DraftContent {
    fn from(doc: &DraftDoc) -> Self {
        Self {
            title: doc.title.clone(),
            filename: doc.filename.clone(),
            source: doc.source.clone(),
        }
    }
}

pub struct DraftStore {
    dir: PathBuf,
    preset_id: String,
    defaults: DraftContent,
}

impl DraftStore {
    /// Opens the drafts of `preset`, creating the index and a starter draft
    /// when there are none yet.
    pub fn open(root: &Path, preset: &Preset) -> Result<Self, DraftError> {
        let store = Self {
            dir: root.join(sanitize_component(&preset.id)),
            preset_id: preset.id.clone(),
            defaults: DraftContent {
                title: preset.default_title().to_string(),
                filename: format!("{}-page.html", preset.id),
                source: preset.default_content().to_string(),
            },
        };

        let index_path = store.index_path();
        if !index_path.exists() {
            store.save_index(&DraftsIndex::default())?;
        }
        let index = store.index();
        if index.order.is_empty() {
            let starter = store.insert_new(STARTER_DRAFT_NAME, store.defaults.clone())?;
            store.set_active(&starter.id)?;
            log::info!(
                "created starter draft {} for preset {}",
                starter.id,
                store.preset_id
            );
        }
        Ok(store)
    }

    pub fn preset_id(&self) -> &str {
        &self.preset_id
    }

    pub fn index(&self) -> DraftsIndex {
        load_json(&self.index_path(), DraftsIndex::default())
    }

    pub fn list(&self) -> Vec<DraftSummary> {
        let index = self.index();
        index
            .order
            .iter()
            .map(|id| {
                let meta = index.meta.get(id);
                DraftSummary {
                    id: id.clone(),
                    name: meta.map(|m| m.name.clone()).unwrap_or_else(|| id.clone()),
                    updated_at: meta.map(|m| m.updated_at),
                }
            })
            .collect()
    }

    pub fn active_id(&self) -> Option<String> {
        let first = self.index().order.first().cloned();
        match first {
            Some(first) => Some(load_json(&self.active_path(), first)),
            None => load_json(&self.active_path(), None),
        }
    }

    pub fn get(&self, id: &str) -> Option<DraftDoc> {
        load_json(&self.doc_path(id), None)
    }

    /// Loads a draft and marks it active. A missing or unreadable draft falls
    /// back to the first readable one in the index.
    pub fn load(&self, id: &str) -> Result<DraftDoc, DraftError> {
        let doc = match self.get(id) {
            Some(doc) => doc,
            None => self.recover(id)?,
        };
        self.set_active(&doc.id)?;
        Ok(doc)
    }

    /// Drops index entries whose document cannot be read and returns the
    /// first remaining draft, or a fresh starter draft when none is left.
    fn recover(&self, id: &str) -> Result<DraftDoc, DraftError> {
        let mut index = self.index();
        let mut first = None;
        let mut dead = Vec::new();
        for candidate in &index.order {
            match self.get(candidate) {
                Some(doc) => {
                    if first.is_none() {
                        first = Some(doc);
                    }
                }
                None => dead.push(candidate.clone()),
            }
        }

        if !dead.is_empty() {
            log::warn!("dropping unreadable drafts from the index: {}", dead.join(", "));
            index.order.retain(|d| !dead.contains(d));
            for d in &dead {
                index.meta.remove(d);
            }
            self.save_index(&index)?;
        }

        match first {
            Some(doc) => {
                log::warn!("draft {id} is missing, opening {} instead", doc.id);
                Ok(doc)
            }
            None => {
                let starter = self.insert_new(STARTER_DRAFT_NAME, self.defaults.clone())?;
                log::warn!("no readable drafts left, created starter draft {}", starter.id);
                Ok(starter)
            }
        }
    }

    pub fn load_active(&self) -> Result<DraftDoc, DraftError> {
        let id = self.active_id().unwrap_or_default();
        self.load(&id)
    }

    /// New draft from the preset defaults.
    pub fn create(&self, name: &str) -> Result<DraftDoc, DraftError> {
        let doc = self.insert_new(name, self.defaults.clone())?;
        self.set_active(&doc.id)?;
        Ok(doc)
    }

    /// New draft holding a copy of `content`.
    pub fn save_as(&self, name: &str, content: DraftContent) -> Result<DraftDoc, DraftError> {
        let doc = self.insert_new(name, content)?;
        self.set_active(&doc.id)?;
        Ok(doc)
    }

    /// Deletes a draft and returns the id of the draft that replaces it.
    pub fn delete(&self, id: &str) -> Result<String, DraftError> {
        let mut index = self.index();
        if index.order.len() <= 1 {
            return Err(DraftError::LastDraft);
        }
        if !index.order.iter().any(|d| d == id) {
            return Err(DraftError::NotFound(id.to_string()));
        }

        let path = self.doc_path(id);
        remove_file(&path).map_err(|source| DraftError::Write { path, source })?;
        index.order.retain(|d| d != id);
        index.meta.remove(id);
        self.save_index(&index)?;

        let next = index.order[0].clone();
        self.set_active(&next)?;
        log::info!("deleted draft {id}");
        Ok(next)
    }

    /// Writes the editable fields of an existing draft. Returns `None` when
    /// the draft no longer exists.
    pub fn autosave(&self, id: &str, content: &DraftContent) -> Result<Option<DraftDoc>, DraftError> {
        let Some(mut doc) = self.get(id) else {
            return Ok(None);
        };
        doc.title = content.title.clone();
        doc.filename = content.filename.clone();
        doc.source = content.source.clone();
        doc.updated_at = Utc::now();
        self.write_doc(&doc)?;

        let mut index = self.index();
        index
            .meta
            .entry(id.to_string())
            .and_modify(|meta| meta.updated_at = doc.updated_at)
            .or_insert_with(|| DraftMeta {
                name: doc.name.clone(),
                updated_at: doc.updated_at,
            });
        self.save_index(&index)?;
        log::debug!("autosaved draft {id}");
        Ok(Some(doc))
    }

    fn insert_new(&self, name: &str, content: DraftContent) -> Result<DraftDoc, DraftError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DraftError::EmptyName);
        }
        let now = Utc::now();
        let doc = DraftDoc {
            id: generate_id(now),
            name: name.to_string(),
            title: content.title,
            filename: content.filename,
            source: content.source,
            created_at: now,
            updated_at: now,
        };
        self.write_doc(&doc)?;

        let mut index = self.index();
        index.order.insert(0, doc.id.clone());
        index.meta.insert(
            doc.id.clone(),
            DraftMeta {
                name: doc.name.clone(),
                updated_at: doc.updated_at,
            },
        );
        self.save_index(&index)?;
        Ok(doc)
    }

    fn write_doc(&self, doc: &DraftDoc) -> Result<(), DraftError> {
        let path = self.doc_path(&doc.id);
        save_json(&path, doc).map_err(|source| DraftError::Write { path, source })
    }

    fn save_index(&self, index: &DraftsIndex) -> Result<(), DraftError> {
        let path = self.index_path();
        save_json(&path, index).map_err(|source| DraftError::Write { path, source })
    }

    fn set_active(&self, id: &str) -> Result<(), DraftError> {
        let path = self.active_path();
        save_json(&path, id).map_err(|source| DraftError::Write { path, source })
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join("index.json")
    }

    fn active_path(&self) -> PathBuf {
        self.dir.join("active.json")
    }

    fn doc_path(&self, id: &str) -> PathBuf {
        self.dir
            .join("drafts")
            .join(format!("{}.json", sanitize_component(id)))
    }
}

fn generate_id(now: DateTime<Utc>) -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("d_{}_{}", now.timestamp_millis(), &random[..12])
}

/// Keeps ids usable as file names.
fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.trim_matches('.') {
        "" => "_".to_string(),
        trimmed => trimmed.to_string(),
    }
}
