mod app;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use notify::{Event, RecursiveMode, Watcher};
use pagesmith::config::{self, Config};
use pagesmith::drafts::DraftStore;
use pagesmith::preset::{Preset, PresetCatalog};
use pagesmith::template::{export_page, render_page};
use pagesmith::{compile_to_html_body, RulesConfig};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "pagesmith", version, about = "Write lightly marked-up pages and export them as HTML")]
struct Cli {
    /// Preset to use (default: `default_preset` from the config, then the first preset)
    #[arg(long, global = true)]
    preset: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a source file to HTML
    Compile {
        file: PathBuf,
        /// JSON rules file overriding the preset's rules
        #[arg(long)]
        rules: Option<PathBuf>,
        /// Print only the body fragment, without the page template
        #[arg(long)]
        body: bool,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        title: Option<String>,
    },
    /// Recompile a source file whenever it changes
    Watch {
        file: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long)]
        title: Option<String>,
    },
    /// Open the editor (default)
    Edit,
    /// Manage the drafts of a preset
    Drafts {
        #[command(subcommand)]
        command: DraftCommands,
    },
    /// Inspect presets
    Presets {
        #[command(subcommand)]
        command: PresetCommands,
    },
    /// Open the config file in $EDITOR (default: nvim)
    Config,
}

#[derive(Subcommand)]
enum DraftCommands {
    /// List drafts, most recent first
    List,
    /// Create an empty draft from the preset defaults
    New { name: String },
    /// Print a draft's source (default: the active draft)
    Show { id: Option<String> },
    /// Delete a draft
    Delete { id: String },
    /// Export a draft as a full page (default: the active draft)
    Export {
        id: Option<String>,
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
}

#[derive(Subcommand)]
enum PresetCommands {
    /// List available presets
    List,
    /// Print a preset's reference sheet
    Reference { id: Option<String> },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Edit);

    let cfg = config::load_config()?;
    let log_file = matches!(command, Commands::Edit).then(|| app::log_file_path(&cfg));
    init_logging(log_file.as_deref());

    let catalog = PresetCatalog::load(cfg.presets_dir.as_deref())?;
    if let Some(id) = cli.preset.as_deref() {
        if catalog.get(id).is_none() {
            bail!("Unknown preset: {id}");
        }
    }

    match command {
        Commands::Config => config::open_config_in_editor(),
        Commands::Edit => app::run_app(cfg, catalog, cli.preset),
        Commands::Compile {
            file,
            rules,
            body,
            output,
            title,
        } => {
            let preset = resolve_preset(&catalog, &cfg, cli.preset.as_deref())?;
            let rules = rules.as_deref().map(load_rules).transpose()?;
            let source = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let html = compile_source(&source, preset, rules, body, title.as_deref().unwrap_or(""));
            write_output(output.as_deref(), &html)
        }
        Commands::Watch {
            file,
            output,
            title,
        } => {
            let preset = resolve_preset(&catalog, &cfg, cli.preset.as_deref())?;
            watch(&file, &output, preset, title.as_deref().unwrap_or(""))
        }
        Commands::Drafts { command } => {
            let preset = resolve_preset(&catalog, &cfg, cli.preset.as_deref())?;
            run_drafts(command, &cfg, preset)
        }
        Commands::Presets { command } => run_presets(command, &catalog, &cfg, cli.preset.as_deref()),
    }
}

fn init_logging(file: Option<&Path>) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if let Some(path) = file {
        let opened = path
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|_| OpenOptions::new().create(true).append(true).open(path));
        match opened {
            Ok(f) => {
                builder.target(env_logger::Target::Pipe(Box::new(f)));
            }
            // Stderr would draw over the TUI.
            Err(_) => {
                builder.filter_level(log::LevelFilter::Off);
            }
        }
    }
    let _ = builder.try_init();
}

fn resolve_preset<'a>(
    catalog: &'a PresetCatalog,
    cfg: &Config,
    requested: Option<&str>,
) -> Result<&'a Preset> {
    catalog
        .select(requested.or(cfg.default_preset.as_deref()))
        .context("No presets available")
}

fn load_rules(path: &Path) -> Result<RulesConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    RulesConfig::from_json_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Full page, or only the body when `body_only`. `rules` replaces the
/// preset's rules when given.
fn compile_source(
    source: &str,
    preset: &Preset,
    rules: Option<RulesConfig>,
    body_only: bool,
    title: &str,
) -> String {
    let rules = rules.unwrap_or_else(|| preset.rules.clone());
    if body_only {
        return compile_to_html_body(source, &rules);
    }
    let page = Preset {
        rules,
        ..preset.clone()
    };
    render_page(&page, title, source)
}

fn write_html(out: &mut impl Write, html: &str) -> io::Result<()> {
    out.write_all(html.as_bytes())?;
    if !html.ends_with('\n') {
        out.write_all(b"\n")?;
    }
    Ok(())
}

fn write_output(output: Option<&Path>, html: &str) -> Result<()> {
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            fs::write(path, html).with_context(|| format!("Failed to write {}", path.display()))
        }
        None => {
            write_html(&mut io::stdout().lock(), html)?;
            Ok(())
        }
    }
}

fn build_page(file: &Path, output: &Path, preset: &Preset, title: &str) -> Result<()> {
    let source = fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    write_output(Some(output), &render_page(preset, title, &source))
}

fn watch(file: &Path, output: &Path, preset: &Preset, title: &str) -> Result<()> {
    build_page(file, output, preset, title)?;
    eprintln!("Wrote {}; watching {} (Ctrl-C to stop)", output.display(), file.display());

    let name = file
        .file_name()
        .map(|n| n.to_os_string())
        .context("Watched path has no file name")?;
    let dir = match file.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let (tx, rx) = mpsc::channel::<notify::Result<Event>>();
    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = tx.send(res);
    })?;
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;

    let touches_file = |event: &Event| {
        event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(name.as_os_str()))
    };

    loop {
        let event = match rx.recv() {
            Ok(Ok(event)) => event,
            Ok(Err(err)) => {
                log::warn!("watch error: {err}");
                continue;
            }
            Err(_) => return Ok(()),
        };
        if !touches_file(&event) {
            continue;
        }
        // Editors write in bursts; wait for them to settle.
        while rx.recv_timeout(Duration::from_millis(150)).is_ok() {}

        match build_page(file, output, preset, title) {
            Ok(()) => {
                log::info!("rebuilt {}", output.display());
                eprintln!("Rebuilt {}", output.display());
            }
            Err(err) => eprintln!("Build failed: {err:#}"),
        }
    }
}

fn run_drafts(command: DraftCommands, cfg: &Config, preset: &Preset) -> Result<()> {
    let store = DraftStore::open(&cfg.data_dir(), preset)?;
    match command {
        DraftCommands::List => {
            let active = store.active_id();
            for draft in store.list() {
                let marker = if active.as_deref() == Some(draft.id.as_str()) { "*" } else { " " };
                let when = draft
                    .updated_at
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                println!("{marker} {}  {}  {when}", draft.id, draft.name);
            }
        }
        DraftCommands::New { name } => {
            let doc = store.create(&name)?;
            println!("{}", doc.id);
        }
        DraftCommands::Show { id } => {
            let doc = match id {
                Some(id) => store.load(&id)?,
                None => store.load_active()?,
            };
            print!("{}", doc.source);
            if !doc.source.ends_with('\n') {
                println!();
            }
        }
        DraftCommands::Delete { id } => {
            let next = store.delete(&id)?;
            println!("Deleted {id}; active draft is now {next}");
        }
        DraftCommands::Export { id, dir } => {
            let doc = match id {
                Some(id) => store.load(&id)?,
                None => store.load_active()?,
            };
            let html = render_page(preset, &doc.title, &doc.source);
            let path = export_page(&dir, &doc.filename, &html)
                .with_context(|| format!("Failed to export to {}", dir.display()))?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

fn run_presets(
    command: PresetCommands,
    catalog: &PresetCatalog,
    cfg: &Config,
    requested: Option<&str>,
) -> Result<()> {
    match command {
        PresetCommands::List => {
            for preset in catalog.iter() {
                let source = preset
                    .path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "built-in".to_string());
                println!("{}  {}  ({source})", preset.id, preset.display_name());
            }
        }
        PresetCommands::Reference { id } => {
            let preset = match id.as_deref() {
                Some(id) => catalog.get(id).with_context(|| format!("Unknown preset: {id}"))?,
                None => resolve_preset(catalog, cfg, requested)?,
            };
            let sheet = preset.reference_sheet();
            let width = sheet.iter().map(|item| item.syntax.len()).max().unwrap_or(0);
            for item in sheet {
                println!("{:width$}  {}", item.syntax, item.meaning);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{compile_source, load_rules, write_html, write_output};
    use pagesmith::preset::Preset;
    use pagesmith::{MarkerSpec, RulesConfig};
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn body_only_skips_the_template() {
        let preset = Preset::builtin().unwrap();
        let html = compile_source("# T\n\n{b:x}", &preset, None, true, "");
        assert_eq!(html, "<h2>T</h2>\n<p><strong>x</strong></p>");
    }

    #[test]
    fn rules_file_replaces_preset_rules() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("rules.json");
        fs::write(&path, r#"{"headings": false, "markers": {"b": {"tag": "b"}}}"#).unwrap();
        let rules = load_rules(&path).unwrap();
        assert_eq!(
            rules,
            RulesConfig::default()
                .with_headings(false)
                .with_marker("b", MarkerSpec::new("b"))
        );

        let preset = Preset::builtin().unwrap();
        let body = compile_source("# T\n\n{b:x} {i:y}", &preset, Some(rules.clone()), true, "");
        assert_eq!(body, "<p># T</p>\n<p><b>x</b> {i:y}</p>");

        let page = compile_source("{b:x}", &preset, Some(rules), false, "Mine");
        assert!(page.contains("<title>Mine</title>"));
        assert!(page.contains("<p><b>x</b></p>"));
    }

    #[test]
    fn unreadable_rules_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let missing = load_rules(&tmp.path().join("none.json")).unwrap_err();
        assert!(missing.to_string().contains("Failed to read"));

        let path = tmp.path().join("bad.json");
        fs::write(&path, "{ nope").unwrap();
        let bad = load_rules(&path).unwrap_err();
        assert!(bad.to_string().contains("Failed to parse"));
    }

    #[test]
    fn stdout_output_ends_with_one_newline() {
        let mut out = Vec::new();
        write_html(&mut out, "<p>a</p>").unwrap();
        assert_eq!(out, b"<p>a</p>\n");

        let mut out = Vec::new();
        write_html(&mut out, "<p>a</p>\n").unwrap();
        assert_eq!(out, b"<p>a</p>\n");
    }

    #[test]
    fn file_output_creates_parent_directories() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out/site/page.html");
        write_output(Some(&path), "<p>a</p>").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "<p>a</p>");
    }
}
