use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{execute, ExecutableCommand};
use pagesmith::completion::{apply_marker_suggestion, auto_pair, suggest_markers, Edit};
use pagesmith::config::{self, Config};
use pagesmith::drafts::{DraftContent, DraftDoc, DraftError, DraftStore, DraftSummary};
use pagesmith::preset::{Preset, PresetCatalog, ReferenceItem};
use pagesmith::template::{export_page, render_page};
use pagesmith::theme::{ThemeManager, UiPalette};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, BorderType, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::Terminal;
use ropey::Rope;
use std::collections::HashMap;
use std::io::{self, Stdout};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use syntect::easy::HighlightLines;
use syntect::highlighting::FontStyle;
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const REFERENCE_WIDTH: u16 = 34;

pub fn run_app(config: Config, catalog: PresetCatalog, preset_id: Option<String>) -> Result<()> {
    let mut app = App::new(config, catalog, preset_id.as_deref())?;

    let mut terminal = setup_terminal()?;
    let _guard = TerminalGuard;

    let tick_rate = Duration::from_millis(50);

    loop {
        let size = terminal.size()?;
        let layout = app.layout(size);
        app.ensure_preview();
        app.ensure_cursor_visible(layout.editor_height);
        app.follow_cursor_in_preview(layout.preview_width, layout.preview_height);

        terminal.draw(|f| ui(f, &mut app, &layout))?;

        if event::poll(tick_rate)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && app.handle_key(key, layout.editor_height) {
                    break;
                }
            }
        }

        app.handle_pending_autosave();
    }

    app.save_now();
    Ok(())
}

struct TerminalGuard;

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let mut stdout = io::stdout();
        let _ = stdout.execute(LeaveAlternateScreen);
    }
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Insert,
    CommandInput,
    DraftPicker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SaveChip {
    Idle,
    Dirty,
    Saved(DateTime<Utc>),
}

impl SaveChip {
    fn label(self) -> String {
        match self {
            SaveChip::Idle => "Saved".to_string(),
            SaveChip::Dirty => "Editing…".to_string(),
            SaveChip::Saved(at) => format!("Saved ✓ {}", format_time(at)),
        }
    }
}

fn format_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%-I:%M %p").to_string()
}

struct Suggestions {
    items: Vec<String>,
    active: usize,
    brace: usize,
}

struct LayoutInfo {
    main: Rect,
    status: Rect,
    editor: Rect,
    preview: Rect,
    reference: Option<Rect>,
    editor_width: u16,
    editor_height: u16,
    preview_width: u16,
    preview_height: u16,
}

struct App {
    config: Config,
    catalog: PresetCatalog,
    preset: Preset,
    store: DraftStore,
    draft: DraftDoc,
    title: String,
    filename: String,
    rope: Rope,
    cursor_char: usize,
    preferred_col: Option<usize>,
    edit_scroll: usize,
    preview_scroll: usize,
    theme_manager: ThemeManager,
    syntax_set: SyntaxSet,
    ui: UiPalette,
    base_style: Style,
    preview_lines: Vec<Line<'static>>,
    preview_dirty: bool,
    dirty: bool,
    chip: SaveChip,
    autosave_deadline: Option<Instant>,
    mode: Mode,
    command_input: String,
    status: Option<String>,
    suggestions: Option<Suggestions>,
    meanings: HashMap<String, String>,
    drafts: Vec<DraftSummary>,
    draft_selected: usize,
    pending_delete: bool,
}

impl App {
    fn new(config: Config, catalog: PresetCatalog, preset_id: Option<&str>) -> Result<Self> {
        let preset = catalog
            .select(preset_id.or(config.default_preset.as_deref()))
            .cloned()
            .context("No presets available")?;
        let store = DraftStore::open(&config.data_dir(), &preset)?;
        let draft = store.load_active()?;

        let theme_manager = ThemeManager::load();
        let ui = theme_manager.ui_palette(config.syntect_theme());
        let base_style = base_style_from(ui);
        let meanings = preset.marker_meanings();

        Ok(Self {
            config,
            catalog,
            title: draft.title.clone(),
            filename: draft.filename.clone(),
            rope: Rope::from_str(&draft.source),
            preset,
            store,
            draft,
            cursor_char: 0,
            preferred_col: None,
            edit_scroll: 0,
            preview_scroll: 0,
            theme_manager,
            syntax_set: SyntaxSet::load_defaults_newlines(),
            ui,
            base_style,
            preview_lines: Vec::new(),
            preview_dirty: true,
            dirty: false,
            chip: SaveChip::Idle,
            autosave_deadline: None,
            mode: Mode::Insert,
            command_input: String::new(),
            status: None,
            suggestions: None,
            meanings,
            drafts: Vec::new(),
            draft_selected: 0,
            pending_delete: false,
        })
    }

    fn layout(&self, size: Rect) -> LayoutInfo {
        let vertical = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(1), Constraint::Length(1)])
            .split(size);
        let main = vertical[0];
        let status = vertical[1];

        let (body, reference) = if self.config.reference_collapsed {
            (main, None)
        } else {
            let width = REFERENCE_WIDTH.min(main.width.saturating_sub(40));
            let horiz = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Min(40), Constraint::Length(width)])
                .split(main);
            (horiz[0], Some(horiz[1]))
        };

        let split = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(body);
        let editor = split[0];
        let preview = split[1];

        LayoutInfo {
            main,
            status,
            editor,
            preview,
            reference,
            editor_width: editor.width.saturating_sub(2).max(1),
            editor_height: editor.height.saturating_sub(2).max(1),
            preview_width: preview.width.saturating_sub(2).max(1),
            preview_height: preview.height.saturating_sub(2).max(1),
        }
    }

    fn content(&self) -> DraftContent {
        DraftContent {
            title: self.title.clone(),
            filename: self.filename.clone(),
            source: self.rope.to_string(),
        }
    }

    fn page_html(&self) -> String {
        render_page(&self.preset, &self.title, &self.rope.to_string())
    }

    fn ensure_preview(&mut self) {
        if !self.preview_dirty {
            return;
        }
        let html = self.page_html();
        self.preview_lines = self.highlight_html(&html);
        self.preview_dirty = false;
    }

    fn highlight_html(&self, html: &str) -> Vec<Line<'static>> {
        let syntax = self
            .syntax_set
            .find_syntax_by_extension("html")
            .unwrap_or_else(|| self.syntax_set.find_syntax_plain_text());
        let theme = self.theme_manager.get(self.config.syntect_theme());
        let mut highlighter = HighlightLines::new(syntax, theme);
        let mut lines: Vec<Line<'static>> = LinesWithEndings::from(html)
            .map(|line| {
                highlight_line_with(
                    &mut highlighter,
                    &self.syntax_set,
                    line,
                    self.ui.base_bg,
                    self.base_style,
                )
            })
            .collect();
        if lines.is_empty() {
            lines.push(Line::from(Span::styled("", self.base_style)));
        }
        lines
    }

    fn handle_key(&mut self, key: KeyEvent, content_height: u16) -> bool {
        match self.mode {
            Mode::CommandInput => self.handle_command_input(key),
            Mode::DraftPicker => self.handle_draft_picker(key),
            Mode::Insert => self.handle_insert_mode(key, content_height),
        }
    }

    fn handle_insert_mode(&mut self, key: KeyEvent, content_height: u16) -> bool {
        if self.suggestions.is_some() && self.handle_suggestion_key(key) {
            return false;
        }

        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('q') => return true,
                KeyCode::Char('s') => self.save_now(),
                KeyCode::Char('t') => self.toggle_theme(),
                KeyCode::Char('r') => self.toggle_reference(),
                KeyCode::Char('d') => self.open_draft_picker(),
                KeyCode::Char('e') => self.export(Path::new(".")),
                _ => {}
            }
            return false;
        }

        match key.code {
            KeyCode::Esc => {
                self.mode = Mode::CommandInput;
                self.command_input.clear();
            }
            KeyCode::Left => self.move_cursor_left(),
            KeyCode::Right => self.move_cursor_right(),
            KeyCode::Up => self.move_cursor_up(),
            KeyCode::Down => self.move_cursor_down(),
            KeyCode::PageUp => self.move_cursor_page(-(content_height as isize)),
            KeyCode::PageDown => self.move_cursor_page(content_height as isize),
            KeyCode::Home => self.move_cursor_line_start(),
            KeyCode::End => self.move_cursor_line_end(),
            KeyCode::Backspace => self.backspace(),
            KeyCode::Delete => self.delete(),
            KeyCode::Enter => self.insert_char('\n'),
            KeyCode::Tab => {
                let spaces = " ".repeat(self.config.tab_width.max(1));
                self.insert_str(&spaces);
            }
            KeyCode::Char(c) => self.type_char(c),
            _ => {}
        }

        if matches!(
            key.code,
            KeyCode::Char(_) | KeyCode::Backspace | KeyCode::Delete | KeyCode::Enter
        ) {
            self.refresh_suggestions();
        } else {
            self.suggestions = None;
        }
        false
    }

    /// Returns true when the key was consumed by the suggestion popup.
    fn handle_suggestion_key(&mut self, key: KeyEvent) -> bool {
        let Some(state) = self.suggestions.as_mut() else {
            return false;
        };
        match key.code {
            KeyCode::Down => {
                state.active = (state.active + 1).min(state.items.len().saturating_sub(1));
            }
            KeyCode::Up => {
                state.active = state.active.saturating_sub(1);
            }
            KeyCode::Esc => {
                self.suggestions = None;
            }
            KeyCode::Enter | KeyCode::Tab => {
                let chosen = state.items.get(state.active).cloned();
                let brace = state.brace;
                self.suggestions = None;
                if let Some(key) = chosen {
                    let text = self.rope.to_string();
                    if let Some(edit) = apply_marker_suggestion(&text, self.cursor_char, brace, &key) {
                        self.apply_edit(edit);
                    }
                }
            }
            _ => return false,
        }
        true
    }

    fn refresh_suggestions(&mut self) {
        let keys = self.preset.rules.marker_keys();
        if keys.is_empty() {
            self.suggestions = None;
            return;
        }
        let text = self.rope.to_string();
        self.suggestions = suggest_markers(&text, self.cursor_char, keys).map(|s| Suggestions {
            items: s.items,
            active: 0,
            brace: s.brace,
        });
    }

    fn handle_command_input(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Esc => {
                self.mode = Mode::Insert;
                self.command_input.clear();
            }
            KeyCode::Enter => {
                let command = self.command_input.trim().to_string();
                self.command_input.clear();
                self.mode = Mode::Insert;
                return self.execute_command(&command);
            }
            KeyCode::Backspace => {
                self.command_input.pop();
            }
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.command_input.push(c);
            }
            _ => {}
        }
        false
    }

    fn handle_draft_picker(&mut self, key: KeyEvent) -> bool {
        let total = self.drafts.len();
        if total == 0 {
            self.mode = Mode::Insert;
            return false;
        }
        match key.code {
            KeyCode::Esc => self.mode = Mode::Insert,
            KeyCode::Up => self.draft_selected = self.draft_selected.saturating_sub(1),
            KeyCode::Down => {
                if self.draft_selected + 1 < total {
                    self.draft_selected += 1;
                }
            }
            KeyCode::Enter => {
                if let Some(id) = self.drafts.get(self.draft_selected).map(|d| d.id.clone()) {
                    self.switch_draft(&id);
                }
                self.mode = Mode::Insert;
            }
            _ => {}
        }
        false
    }

    /// Returns true when the app should quit.
    fn execute_command(&mut self, command: &str) -> bool {
        let (name, arg) = match command.split_once(' ') {
            Some((name, arg)) => (name, arg.trim()),
            None => (command, ""),
        };
        if name != "delete" && name != "delete!" {
            self.pending_delete = false;
        }

        match name {
            "" => {}
            "w" | "write" => self.save_now(),
            "q" | "quit" | "wq" | "x" => return true,
            "title" => {
                self.title = arg.to_string();
                self.mark_changed();
            }
            "filename" => {
                self.filename = arg.to_string();
                self.mark_changed();
            }
            "new" => self.new_draft(arg),
            "saveas" => self.save_as(arg),
            "delete" => {
                self.pending_delete = true;
                self.status = Some(format!(
                    "Delete \"{}\"? This cannot be undone. Run :delete! to confirm",
                    self.draft.name
                ));
            }
            "delete!" => {
                if self.pending_delete {
                    self.delete_current();
                } else {
                    self.status = Some("Run :delete first".to_string());
                }
                self.pending_delete = false;
            }
            "drafts" => self.open_draft_picker(),
            "export" => {
                let dir = if arg.is_empty() { "." } else { arg };
                self.export(Path::new(dir));
            }
            "preset" => self.switch_preset(arg),
            "theme" => self.toggle_theme(),
            "ref" | "reference" => self.toggle_reference(),
            _ => self.status = Some(format!("Not a command: {name}")),
        }
        false
    }

    fn type_char(&mut self, c: char) {
        let text = self.rope.to_string();
        match auto_pair(&text, self.cursor_char, self.cursor_char, c) {
            Some(edit) if edit.text.len() == text.len() => {
                self.cursor_char = edit.selection_end;
                self.preferred_col = None;
            }
            Some(edit) => self.apply_edit(edit),
            None => self.insert_char(c),
        }
    }

    fn apply_edit(&mut self, edit: Edit) {
        self.rope = Rope::from_str(&edit.text);
        self.cursor_char = edit.selection_end.min(self.rope.len_chars());
        self.preferred_col = None;
        self.mark_changed();
    }

    fn insert_char(&mut self, c: char) {
        self.rope.insert_char(self.cursor_char, c);
        self.cursor_char = self.cursor_char.saturating_add(1);
        self.preferred_col = None;
        self.mark_changed();
    }

    fn insert_str(&mut self, text: &str) {
        self.rope.insert(self.cursor_char, text);
        self.cursor_char = self.cursor_char.saturating_add(text.chars().count());
        self.preferred_col = None;
        self.mark_changed();
    }

    fn backspace(&mut self) {
        if self.cursor_char == 0 {
            return;
        }
        let prev = self.cursor_char - 1;
        self.rope.remove(prev..self.cursor_char);
        self.cursor_char = prev;
        self.preferred_col = None;
        self.mark_changed();
    }

    fn delete(&mut self) {
        if self.cursor_char >= self.rope.len_chars() {
            return;
        }
        let next = self.cursor_char + 1;
        self.rope.remove(self.cursor_char..next);
        self.preferred_col = None;
        self.mark_changed();
    }

    fn mark_changed(&mut self) {
        self.dirty = true;
        self.preview_dirty = true;
        self.chip = SaveChip::Dirty;
        self.autosave_deadline =
            Some(Instant::now() + Duration::from_millis(self.config.autosave_ms));
    }

    fn handle_pending_autosave(&mut self) {
        let Some(deadline) = self.autosave_deadline else {
            return;
        };
        if Instant::now() >= deadline {
            self.save_now();
        }
    }

    fn save_now(&mut self) {
        self.autosave_deadline = None;
        if !self.dirty {
            return;
        }
        match self.store.autosave(&self.draft.id, &self.content()) {
            Ok(Some(doc)) => {
                self.chip = SaveChip::Saved(doc.updated_at);
                self.draft = doc;
                self.dirty = false;
            }
            Ok(None) => self.status = Some("Draft no longer exists".to_string()),
            Err(err) => {
                log::error!("autosave failed: {err}");
                self.status = Some(format!("Save failed: {err}"));
            }
        }
    }

    fn show_draft(&mut self, doc: DraftDoc) {
        self.title = doc.title.clone();
        self.filename = doc.filename.clone();
        self.rope = Rope::from_str(&doc.source);
        self.chip = SaveChip::Idle;
        self.draft = doc;
        self.cursor_char = 0;
        self.preferred_col = None;
        self.edit_scroll = 0;
        self.preview_scroll = 0;
        self.dirty = false;
        self.preview_dirty = true;
        self.suggestions = None;
        self.autosave_deadline = None;
    }

    fn report_draft_result(&mut self, result: Result<DraftDoc, DraftError>, done: &str) {
        match result {
            Ok(doc) => {
                self.status = Some(format!("{done} \"{}\"", doc.name));
                self.show_draft(doc);
            }
            Err(err) => self.status = Some(err.to_string()),
        }
    }

    fn switch_draft(&mut self, id: &str) {
        self.save_now();
        let result = self.store.load(id);
        self.report_draft_result(result, "Opened");
    }

    fn new_draft(&mut self, name: &str) {
        self.save_now();
        let result = self.store.create(name);
        self.report_draft_result(result, "Created");
    }

    fn save_as(&mut self, name: &str) {
        let result = self.store.save_as(name, self.content());
        self.report_draft_result(result, "Saved as");
    }

    fn delete_current(&mut self) {
        let name = self.draft.name.clone();
        let result = self
            .store
            .delete(&self.draft.id)
            .and_then(|next| self.store.load(&next));
        match result {
            Ok(doc) => {
                self.show_draft(doc);
                self.status = Some(format!("Deleted \"{name}\""));
            }
            Err(err) => self.status = Some(err.to_string()),
        }
    }

    fn open_draft_picker(&mut self) {
        self.drafts = self.store.list();
        self.draft_selected = self
            .drafts
            .iter()
            .position(|d| d.id == self.draft.id)
            .unwrap_or(0);
        self.mode = Mode::DraftPicker;
    }

    fn switch_preset(&mut self, id: &str) {
        let Some(preset) = self.catalog.get(id).cloned() else {
            self.status = Some(format!("Unknown preset: {id}"));
            return;
        };
        self.save_now();
        let opened = DraftStore::open(&self.config.data_dir(), &preset)
            .and_then(|store| store.load_active().map(|doc| (store, doc)));
        match opened {
            Ok((store, doc)) => {
                self.meanings = preset.marker_meanings();
                self.status = Some(format!("Preset: {}", preset.display_name()));
                self.preset = preset;
                self.store = store;
                self.show_draft(doc);
            }
            Err(err) => self.status = Some(err.to_string()),
        }
    }

    fn export(&mut self, dir: &Path) {
        let html = self.page_html();
        match export_page(dir, &self.filename, &html) {
            Ok(path) => self.status = Some(format!("Exported {}", path.display())),
            Err(err) => {
                log::error!("export to {} failed: {err}", dir.display());
                self.status = Some(format!("Export failed: {err}"));
            }
        }
    }

    fn toggle_theme(&mut self) {
        self.config.theme = self.config.theme.toggled();
        self.persist_config();
        self.ui = self.theme_manager.ui_palette(self.config.syntect_theme());
        self.base_style = base_style_from(self.ui);
        self.preview_dirty = true;
        self.status = Some(format!("Theme: {}", self.config.theme));
    }

    fn toggle_reference(&mut self) {
        self.config.reference_collapsed = !self.config.reference_collapsed;
        self.persist_config();
    }

    fn persist_config(&mut self) {
        if let Err(err) = config::write_config(&self.config) {
            log::warn!("failed to write config: {err:#}");
            self.status = Some(format!("Config not saved: {err}"));
        }
    }

    fn move_cursor_left(&mut self) {
        if self.cursor_char > 0 {
            self.cursor_char -= 1;
        }
        self.preferred_col = None;
    }

    fn move_cursor_right(&mut self) {
        if self.cursor_char < self.rope.len_chars() {
            self.cursor_char += 1;
        }
        self.preferred_col = None;
    }

    fn move_cursor_up(&mut self) {
        let (line, col) = self.cursor_line_col();
        if line == 0 {
            return;
        }
        self.move_cursor_to_line(line - 1, col);
    }

    fn move_cursor_down(&mut self) {
        let (line, col) = self.cursor_line_col();
        let max_line = self.rope.len_lines().saturating_sub(1);
        if line >= max_line {
            return;
        }
        self.move_cursor_to_line(line + 1, col);
    }

    fn move_cursor_page(&mut self, delta: isize) {
        let (line, col) = self.cursor_line_col();
        let max_line = self.rope.len_lines().saturating_sub(1);
        let target_line = if delta.is_negative() {
            line.saturating_sub(delta.unsigned_abs())
        } else {
            (line + delta as usize).min(max_line)
        };
        self.move_cursor_to_line(target_line, col);
    }

    fn move_cursor_to_line(&mut self, target_line: usize, col: usize) {
        let desired = self.preferred_col.unwrap_or(col);
        let target_col = desired.min(line_len_chars(&self.rope, target_line));
        self.cursor_char = self.rope.line_to_char(target_line) + target_col;
        self.preferred_col = Some(desired);
    }

    fn move_cursor_line_start(&mut self) {
        let (line, _) = self.cursor_line_col();
        self.cursor_char = self.rope.line_to_char(line);
        self.preferred_col = None;
    }

    fn move_cursor_line_end(&mut self) {
        let (line, _) = self.cursor_line_col();
        let len = line_len_chars(&self.rope, line);
        self.cursor_char = self.rope.line_to_char(line) + len;
        self.preferred_col = None;
    }

    fn ensure_cursor_visible(&mut self, height: u16) {
        let (line, _) = self.cursor_line_col();
        let height = height as usize;
        if line < self.edit_scroll {
            self.edit_scroll = line;
        } else if line >= self.edit_scroll + height {
            self.edit_scroll = line.saturating_sub(height.saturating_sub(1));
        }
    }

    /// Keeps the preview roughly at the same relative position as the caret.
    fn follow_cursor_in_preview(&mut self, width: u16, height: u16) {
        let (line, _) = self.cursor_line_col();
        let source_lines = self.rope.len_lines().max(1);
        let preview_rows = wrapped_rows(&self.preview_lines, width);
        let target = line * preview_rows / source_lines;
        let max_scroll = preview_rows.saturating_sub(height as usize);
        self.preview_scroll = target
            .saturating_sub(height as usize / 2)
            .min(max_scroll);
    }

    fn cursor_line_col(&self) -> (usize, usize) {
        let cursor = self.cursor_char.min(self.rope.len_chars());
        let line = self.rope.char_to_line(cursor);
        let line_start = self.rope.line_to_char(line);
        (line, cursor.saturating_sub(line_start))
    }

    fn editor_text(&self) -> Text<'static> {
        let heading_style = Style::default()
            .fg(self.ui.accent)
            .add_modifier(Modifier::BOLD);
        let mut lines = Vec::new();
        for line in self.rope.lines() {
            let mut s = line.to_string();
            if s.ends_with('\n') {
                s.pop();
                if s.ends_with('\r') {
                    s.pop();
                }
            }
            let style = if self.preset.rules.headings && s.trim_start().starts_with("# ") {
                heading_style
            } else {
                self.base_style
            };
            lines.push(Line::from(Span::styled(s, style)));
        }
        if lines.is_empty() {
            lines.push(Line::from(Span::styled("", self.base_style)));
        }
        Text::from(lines)
    }

    fn cursor_screen_position(&self, layout: &LayoutInfo) -> Option<(u16, u16)> {
        if !matches!(self.mode, Mode::Insert) {
            return None;
        }
        let (line, col) = self.cursor_line_col();
        if line < self.edit_scroll {
            return None;
        }
        let visible_line = line - self.edit_scroll;
        if visible_line >= layout.editor_height as usize {
            return None;
        }

        let width: usize = self
            .rope
            .line(line)
            .chars()
            .take(col)
            .map(|ch| UnicodeWidthChar::width(ch).unwrap_or(0))
            .sum();
        let x = layout
            .editor
            .x
            .saturating_add(1)
            .saturating_add(width.min(layout.editor_width as usize).try_into().ok()?);
        let y = layout
            .editor
            .y
            .saturating_add(1)
            .saturating_add(visible_line.try_into().ok()?);
        Some((x, y))
    }

    fn status_line(&self) -> Line<'static> {
        if matches!(self.mode, Mode::CommandInput) {
            return Line::from(vec![
                Span::styled(":", Style::default().fg(self.ui.accent)),
                Span::styled(self.command_input.clone(), self.base_style),
            ]);
        }

        let sep = || Span::styled(" | ", Style::default().fg(self.ui.muted));
        let title = if self.title.trim().is_empty() {
            self.preset.default_title().to_string()
        } else {
            self.title.clone()
        };
        let mut parts = vec![
            Span::styled(
                "pagesmith",
                Style::default().fg(self.ui.accent).add_modifier(Modifier::BOLD),
            ),
            sep(),
            Span::styled(self.preset.display_name(), self.base_style),
            sep(),
            Span::styled(self.draft.name.clone(), self.base_style),
            sep(),
            Span::styled(format!("title: {title}"), Style::default().fg(self.ui.muted)),
            sep(),
            Span::styled(
                format!("file: {}", self.filename),
                Style::default().fg(self.ui.muted),
            ),
            sep(),
            Span::styled(self.config.theme.to_string(), Style::default().fg(self.ui.muted)),
            sep(),
            Span::styled(self.chip.label(), Style::default().fg(self.ui.accent)),
        ];
        if let Some(msg) = &self.status {
            parts.push(sep());
            parts.push(Span::styled(msg.clone(), Style::default().fg(self.ui.accent)));
        }
        Line::from(parts)
    }

    fn bordered(&self, title: String) -> Block<'static> {
        Block::bordered()
            .title(title)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(self.ui.border))
            .style(self.base_style)
    }
}

fn ui(f: &mut ratatui::Frame, app: &mut App, layout: &LayoutInfo) {
    let highlight_fg = app.ui.base_bg.unwrap_or(app.ui.base_fg);
    let highlight_style = Style::default().bg(app.ui.accent).fg(highlight_fg);

    f.render_widget(
        Paragraph::new(app.status_line()).style(app.base_style),
        layout.status,
    );

    let editor_title = if app.dirty {
        format!(" *{} ", app.draft.name)
    } else {
        format!(" {} ", app.draft.name)
    };
    let editor = Paragraph::new(app.editor_text())
        .block(app.bordered(editor_title))
        .style(app.base_style)
        .scroll((app.edit_scroll as u16, 0));
    f.render_widget(editor, layout.editor);

    let preview = Paragraph::new(Text::from(app.preview_lines.clone()))
        .block(app.bordered(" Preview ".to_string()))
        .style(app.base_style)
        .wrap(Wrap { trim: false })
        .scroll((app.preview_scroll as u16, 0));
    f.render_widget(preview, layout.preview);

    if let Some(area) = layout.reference {
        let lines = reference_lines(&app.preset.reference_sheet(), app.ui, app.base_style);
        let reference = Paragraph::new(Text::from(lines))
            .block(app.bordered(" Reference ".to_string()))
            .style(app.base_style)
            .wrap(Wrap { trim: false });
        f.render_widget(reference, area);
    }

    if matches!(app.mode, Mode::DraftPicker) {
        let popup = centered_rect(50, 60, layout.main);
        f.render_widget(Clear, popup);
        let items: Vec<ListItem> = app
            .drafts
            .iter()
            .map(|d| {
                let when = d.updated_at.map(format_time).unwrap_or_default();
                ListItem::new(format!("{}  {when}", d.name))
            })
            .collect();
        let mut state = ListState::default();
        state.select(Some(app.draft_selected));
        let list = List::new(items)
            .block(app.bordered(" Drafts ".to_string()))
            .style(app.base_style)
            .highlight_style(highlight_style);
        f.render_stateful_widget(list, popup, &mut state);
    }

    let caret = app.cursor_screen_position(layout);
    if let (Some(state), Some(caret)) = (&app.suggestions, caret) {
        let items: Vec<(String, String)> = state
            .items
            .iter()
            .map(|k| (k.clone(), app.meanings.get(k).cloned().unwrap_or_default()))
            .collect();
        let key_width = items.iter().map(|(k, _)| k.width()).max().unwrap_or(0);
        let content_width = items
            .iter()
            .map(|(_, hint)| key_width + 2 + hint.width())
            .max()
            .unwrap_or(0);
        let popup = popup_rect(
            caret,
            (content_width as u16).saturating_add(2),
            items.len() as u16 + 2,
            layout.editor,
        );
        let list_items: Vec<ListItem> = items
            .into_iter()
            .map(|(key, hint)| {
                ListItem::new(Line::from(vec![
                    Span::styled(format!("{key:key_width$}  "), app.base_style),
                    Span::styled(hint, Style::default().fg(app.ui.muted)),
                ]))
            })
            .collect();
        let mut list_state = ListState::default();
        list_state.select(Some(state.active));
        f.render_widget(Clear, popup);
        let list = List::new(list_items)
            .block(app.bordered(String::new()))
            .style(app.base_style)
            .highlight_style(highlight_style);
        f.render_stateful_widget(list, popup, &mut list_state);
    }

    if let Some((x, y)) = caret {
        f.set_cursor(x, y);
    }
}

fn reference_lines(items: &[ReferenceItem], ui: UiPalette, base: Style) -> Vec<Line<'static>> {
    if items.is_empty() {
        return vec![Line::from(Span::styled(
            "No reference items defined for this preset.",
            Style::default().fg(ui.muted),
        ))];
    }
    let mut lines = Vec::new();
    for item in items {
        lines.push(Line::from(Span::styled(
            item.syntax.clone(),
            Style::default().fg(ui.accent),
        )));
        lines.push(Line::from(Span::styled(format!("  {}", item.meaning), base)));
    }
    lines
}

/// Places a popup of `width`x`height` one row below the caret, shifted back
/// inside `bounds` when it would overflow.
fn popup_rect(caret: (u16, u16), width: u16, height: u16, bounds: Rect) -> Rect {
    let width = width.min(bounds.width).max(1);
    let height = height.min(bounds.height).max(1);
    let right = bounds.x.saturating_add(bounds.width);
    let bottom = bounds.y.saturating_add(bounds.height);

    let x = caret.0.min(right.saturating_sub(width)).max(bounds.x);
    let below = caret.1.saturating_add(1);
    let y = if below.saturating_add(height) <= bottom {
        below
    } else {
        caret.1.saturating_sub(height).max(bounds.y)
    };
    Rect::new(x, y, width, height)
}

/// Rows `lines` take once word-wrapped to `width` columns.
fn wrapped_rows(lines: &[Line<'_>], width: u16) -> usize {
    let width = usize::from(width.max(1));
    lines
        .iter()
        .map(|line| {
            let text: String = line.spans.iter().map(|span| span.content.as_ref()).collect();
            wrapped_line_rows(&text, width)
        })
        .sum()
}

fn wrapped_line_rows(text: &str, width: usize) -> usize {
    let mut rows = 1;
    let mut col = 0;
    for word in text.split_inclusive(' ') {
        let visible = word.trim_end_matches(' ').width();
        if col > 0 && col + visible > width {
            rows += 1;
            col = 0;
        }
        col += word.width();
        while col > width {
            rows += 1;
            col -= width;
        }
    }
    rows
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn base_style_from(ui: UiPalette) -> Style {
    Style::default()
        .fg(ui.base_fg)
        .bg(ui.base_bg.unwrap_or(Color::Reset))
}

fn syntect_to_ratatui_style(
    style: syntect::highlighting::Style,
    base_bg: Option<Color>,
) -> Style {
    let mut out = Style::default()
        .fg(Color::Rgb(style.foreground.r, style.foreground.g, style.foreground.b));
    if let Some(bg) = base_bg {
        out = out.bg(bg);
    }
    if style.font_style.contains(FontStyle::BOLD) {
        out = out.add_modifier(Modifier::BOLD);
    }
    if style.font_style.contains(FontStyle::ITALIC) {
        out = out.add_modifier(Modifier::ITALIC);
    }
    if style.font_style.contains(FontStyle::UNDERLINE) {
        out = out.add_modifier(Modifier::UNDERLINED);
    }
    out
}

fn highlight_line_with(
    highlighter: &mut HighlightLines,
    syntax_set: &SyntaxSet,
    line: &str,
    base_bg: Option<Color>,
    base_style: Style,
) -> Line<'static> {
    let ranges = match highlighter.highlight_line(line, syntax_set) {
        Ok(r) => r,
        Err(_) => vec![(syntect::highlighting::Style::default(), line)],
    };
    let mut spans = Vec::new();
    for (style, text) in ranges {
        let text = text.trim_end_matches('\n');
        if text.is_empty() {
            continue;
        }
        spans.push(Span::styled(
            text.to_string(),
            syntect_to_ratatui_style(style, base_bg),
        ));
    }
    if spans.is_empty() {
        spans.push(Span::styled("", base_style));
    }
    Line::from(spans)
}

fn line_len_chars(rope: &Rope, line: usize) -> usize {
    if line >= rope.len_lines() {
        return 0;
    }
    let slice = rope.line(line);
    let mut len = slice.len_chars();
    if len == 0 {
        return 0;
    }
    if slice.char(len - 1) == '\n' {
        len = len.saturating_sub(1);
    }
    len
}

/// Log file used while the TUI owns the terminal.
pub fn log_file_path(config: &Config) -> PathBuf {
    config.data_dir().join("pagesmith.log")
}

#[cfg(test)]
mod tests {
    use super::{
        line_len_chars, popup_rect, reference_lines, wrapped_line_rows, wrapped_rows, SaveChip,
    };
    use pagesmith::preset::ReferenceItem;
    use pagesmith::theme::ThemeManager;
    use ratatui::layout::Rect;
    use ratatui::style::Style;
    use ratatui::text::Line;
    use ropey::Rope;

    #[test]
    fn popup_sits_below_the_caret() {
        let bounds = Rect::new(0, 0, 80, 24);
        assert_eq!(popup_rect((10, 5), 20, 6, bounds), Rect::new(10, 6, 20, 6));
    }

    #[test]
    fn popup_shifts_left_at_the_right_edge() {
        let bounds = Rect::new(0, 0, 80, 24);
        assert_eq!(popup_rect((75, 5), 20, 6, bounds), Rect::new(60, 6, 20, 6));
    }

    #[test]
    fn popup_flips_above_near_the_bottom() {
        let bounds = Rect::new(0, 0, 80, 24);
        assert_eq!(popup_rect((10, 21), 20, 6, bounds), Rect::new(10, 15, 20, 6));
    }

    #[test]
    fn popup_stays_inside_the_editor_pane() {
        let editor = Rect::new(0, 0, 40, 20);
        let rect = popup_rect((35, 5), 20, 6, editor);
        assert_eq!(rect, Rect::new(20, 6, 20, 6));
        assert!(rect.x + rect.width <= editor.x + editor.width);
    }

    #[test]
    fn popup_is_clamped_to_small_bounds() {
        let bounds = Rect::new(2, 1, 10, 4);
        let rect = popup_rect((5, 2), 30, 9, bounds);
        assert_eq!(rect.width, 10);
        assert_eq!(rect.height, 4);
        assert!(rect.x >= bounds.x && rect.y >= bounds.y);
    }

    #[test]
    fn long_preview_lines_count_their_wrapped_rows() {
        let html = format!("<p>{}</p>", "word ".repeat(60).trim_end());
        assert_eq!(wrapped_line_rows("word ".repeat(60).trim_end(), 38), 9);
        assert!(wrapped_line_rows(&html, 38) > 1);
        assert_eq!(wrapped_line_rows("", 38), 1);
        assert_eq!(wrapped_line_rows("<h2>Title</h2>", 38), 1);
    }

    #[test]
    fn unbroken_text_wraps_by_width() {
        assert_eq!(wrapped_line_rows(&"x".repeat(25), 10), 3);
    }

    #[test]
    fn wrapped_rows_sum_over_lines() {
        let lines = vec![Line::from("short"), Line::from("word ".repeat(60))];
        assert_eq!(wrapped_rows(&lines, 38), 1 + 9);
    }

    #[test]
    fn line_len_excludes_newline() {
        let rope = Rope::from_str("ab\nc");
        assert_eq!(line_len_chars(&rope, 0), 2);
        assert_eq!(line_len_chars(&rope, 1), 1);
        assert_eq!(line_len_chars(&rope, 5), 0);
    }

    #[test]
    fn chip_labels() {
        assert_eq!(SaveChip::Idle.label(), "Saved");
        assert_eq!(SaveChip::Dirty.label(), "Editing…");
        assert!(SaveChip::Saved(chrono::Utc::now()).label().starts_with("Saved ✓ "));
    }

    #[test]
    fn reference_lines_show_placeholder_when_empty() {
        let ui = ThemeManager::load().ui_palette("InspiredGitHub");
        let lines = reference_lines(&[], ui, Style::default());
        assert_eq!(lines.len(), 1);
        let items = [ReferenceItem {
            syntax: "{b:...}".into(),
            meaning: "Bold".into(),
            key: None,
        }];
        assert_eq!(reference_lines(&items, ui, Style::default()).len(), 2);
    }
}
