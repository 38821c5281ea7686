use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Reads a JSON file, returning `fallback` when it is missing or unreadable.
pub fn load_json<T: DeserializeOwned>(path: &Path, fallback: T) -> T {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return fallback,
        Err(err) => {
            log::warn!("failed to read {}: {err}", path.display());
            return fallback;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(err) => {
            log::warn!("ignoring unparsable {}: {err}", path.display());
            fallback
        }
    }
}

/// Writes `value` as pretty JSON. The text goes to a sibling temp file that is
/// renamed over `path`, so readers never see a half-written file.
pub fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let text = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    let tmp = temp_sibling(path);
    if let Err(err) = fs::write(&tmp, text).and_then(|_| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}

pub fn remove_file(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::{load_json, remove_file, save_json, temp_sibling};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_fallback() {
        let tmp = TempDir::new().unwrap();
        let value: Vec<String> = load_json(&tmp.path().join("none.json"), vec!["x".into()]);
        assert_eq!(value, vec!["x".to_string()]);
    }

    #[test]
    fn corrupt_file_yields_fallback() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.json");
        fs::write(&path, "{ nope").unwrap();
        let value: u32 = load_json(&path, 7);
        assert_eq!(value, 7);
    }

    #[test]
    fn save_creates_parent_directories() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a/b/c.json");
        save_json(&path, &["one", "two"]).unwrap();
        let value: Vec<String> = load_json(&path, Vec::new());
        assert_eq!(value, vec!["one", "two"]);
    }

    #[test]
    fn save_replaces_existing_file_and_leaves_no_temp() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("doc.json");
        save_json(&path, "first").unwrap();
        save_json(&path, "second").unwrap();
        let value: String = load_json(&path, String::new());
        assert_eq!(value, "second");
        assert!(!temp_sibling(&path).exists());
        let entries: Vec<_> = fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn temp_file_sits_next_to_the_target() {
        let path = std::path::Path::new("/data/drafts/d_1.json");
        assert_eq!(temp_sibling(path), std::path::Path::new("/data/drafts/.d_1.json.tmp"));
    }

    #[test]
    fn removing_missing_file_is_ok() {
        let tmp = TempDir::new().unwrap();
        remove_file(&tmp.path().join("gone.json")).unwrap();
    }
}
