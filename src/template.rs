use crate::compiler::compile_to_html_body;
use crate::preset::Preset;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const TITLE_PLACEHOLDER: &str = "{{title}}";
pub const CONTENT_PLACEHOLDER: &str = "{{content}}";
pub const DEFAULT_EXPORT_FILENAME: &str = "page.html";

pub fn apply_template(template: &str, title: &str, content: &str) -> String {
    template
        .replace(TITLE_PLACEHOLDER, title)
        .replace(CONTENT_PLACEHOLDER, content)
}

/// Compiles `source` with the preset rules and places it in the preset template.
pub fn render_page(preset: &Preset, title: &str, source: &str) -> String {
    let title = match title.trim() {
        "" => preset.default_title(),
        trimmed => trimmed,
    };
    let body = compile_to_html_body(source, &preset.rules);
    apply_template(&preset.template, title, &body)
}

pub fn export_filename(requested: &str) -> String {
    let name = match requested.trim() {
        "" => DEFAULT_EXPORT_FILENAME,
        trimmed => trimmed,
    };
    name.replace(['/', '\\'], "-")
}

pub fn export_page(dir: &Path, requested_name: &str, html: &str) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(export_filename(requested_name));
    fs::write(&path, html)?;
    log::info!("exported {}", path.display());
    Ok(path)
}
