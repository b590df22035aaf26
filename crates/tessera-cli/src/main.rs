use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph},
};
use std::{env, fs, io::stdout, path::PathBuf, process};
use tessera_engine::{
    BlockType, EditorController, EditorEvent, EditorOptions, EditorState, IconSource, Key,
    KeyInput, MemorySelection, NullFloatingLayer,
};

/// Terminal stand-in for the host icon service: names map to glyphs
/// instead of SVG markup.
struct TerminalIcons;

impl IconSource for TerminalIcons {
    fn markup(&self, name: &str) -> String {
        let glyph = match name {
            "text" => "¶",
            "heading-1" => "H₁",
            "heading-2" => "H₂",
            "heading-3" => "H₃",
            "list-bullet" => "•",
            "list-numbered" => "#.",
            "quote" => "❝",
            "code" => "≡",
            "divider" => "─",
            _ => "·",
        };
        glyph.to_string()
    }
}

/// Terminal host for the editing engine: it implements the selection side
/// through [`MemorySelection`], feeds keys into the controller, and renders
/// blocks, the slash menu and the toolbar state.
struct App {
    editor: EditorController,
    selection: MemorySelection,
    content_path: Option<PathBuf>,
    status: String,
}

impl App {
    fn new(options: EditorOptions, content_path: Option<PathBuf>) -> Result<Self> {
        let selection = MemorySelection::new();
        let mut editor = EditorController::with_options(
            Box::new(selection.clone()),
            Box::new(NullFloatingLayer),
            options,
        );

        if let Some(path) = &content_path {
            let value = fs::read_to_string(path)?;
            editor.set_value(&value);
        }

        let first = editor.blocks()[0].id;
        selection.set_caret(first, 0);
        editor.focus();

        let mut app = Self {
            editor,
            selection,
            content_path,
            status: String::from("Ctrl+S save · Ctrl+Q quit"),
        };
        app.pump_events();
        Ok(app)
    }

    fn handle_key(&mut self, code: KeyCode, modifiers: KeyModifiers) -> Result<bool> {
        if modifiers.contains(KeyModifiers::CONTROL) {
            match code {
                KeyCode::Char('q') => return Ok(true),
                KeyCode::Char('s') => self.save()?,
                _ => {}
            }
            self.pump_events();
            return Ok(false);
        }

        match code {
            KeyCode::Char(c) => {
                self.editor.handle_key(KeyInput::char(c));
            }
            KeyCode::Enter => {
                self.editor.handle_key(KeyInput {
                    key: Key::Enter,
                    shift: modifiers.contains(KeyModifiers::SHIFT),
                });
            }
            KeyCode::Backspace => {
                self.editor.handle_key(KeyInput::plain(Key::Backspace));
            }
            KeyCode::Delete => {
                self.editor.handle_key(KeyInput::plain(Key::Delete));
            }
            KeyCode::Esc => {
                self.editor.handle_key(KeyInput::plain(Key::Escape));
            }
            KeyCode::Up => {
                if self.editor.handle_key(KeyInput::plain(Key::ArrowUp))
                    == tessera_engine::KeyDisposition::PassThrough
                {
                    self.move_caret_vertical(-1);
                }
            }
            KeyCode::Down => {
                if self.editor.handle_key(KeyInput::plain(Key::ArrowDown))
                    == tessera_engine::KeyDisposition::PassThrough
                {
                    self.move_caret_vertical(1);
                }
            }
            KeyCode::Left => self.move_caret_horizontal(-1),
            KeyCode::Right => self.move_caret_horizontal(1),
            _ => {}
        }
        self.pump_events();
        Ok(false)
    }

    /// Native caret movement: the engine only intercepts boundary arrows,
    /// everything inside a block belongs to the host.
    fn move_caret_horizontal(&mut self, delta: isize) {
        let Some(raw) = self.selection.get() else {
            return;
        };
        let doc = self.editor.document();
        let Some(block) = doc.get(raw.block_id) else {
            return;
        };
        let text = block.text();
        let caret = raw.range.start.min(text.len());

        if delta > 0 {
            if caret < text.len() {
                let next = (caret + 1..=text.len())
                    .find(|&i| text.is_char_boundary(i))
                    .unwrap_or(text.len());
                self.selection.set_caret(raw.block_id, next);
            } else if let Some(next) = doc.next_editable(raw.block_id) {
                self.selection.set_caret(next.id, 0);
            }
        } else if caret > 0 {
            let prev = (0..caret)
                .rev()
                .find(|&i| text.is_char_boundary(i))
                .unwrap_or(0);
            self.selection.set_caret(raw.block_id, prev);
        } else if let Some(prev) = doc.previous_editable(raw.block_id) {
            let end = prev.text_len();
            self.selection.set_caret(prev.id, end);
        }
        self.editor.selection_changed();
    }

    /// Up/Down inside a block (the engine passed the key through): hop to
    /// the neighbouring editable block, keeping the column where possible.
    fn move_caret_vertical(&mut self, delta: isize) {
        let Some(raw) = self.selection.get() else {
            return;
        };
        let doc = self.editor.document();
        let neighbour = if delta < 0 {
            doc.previous_editable(raw.block_id)
        } else {
            doc.next_editable(raw.block_id)
        };
        if let Some(block) = neighbour {
            let offset = raw.range.start.min(block.text_len());
            self.selection.set_caret(block.id, offset);
            self.editor.selection_changed();
        }
    }

    fn save(&mut self) -> Result<()> {
        let Some(path) = &self.content_path else {
            self.status = String::from("No content file to save to");
            return Ok(());
        };
        fs::write(path, self.editor.value())?;
        self.status = format!("Saved {}", path.display());
        log::info!("saved {}", path.display());
        Ok(())
    }

    /// Drain controller events. The demo runs deferral completions on the
    /// same loop turn: the next draw is its "animation frame".
    fn pump_events(&mut self) {
        loop {
            let events = self.editor.take_events();
            if events.is_empty() {
                break;
            }
            for event in events {
                match event {
                    EditorEvent::Schedule(deferral) => {
                        self.editor.complete_deferred(deferral);
                    }
                    EditorEvent::Change { text_content, .. } => {
                        log::info!("change: {} bytes", text_content.len());
                    }
                    EditorEvent::BlockChange { action, .. } => {
                        log::debug!("block change: {action:?}");
                    }
                    _ => {}
                }
            }
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .init();

    let args: Vec<String> = env::args().collect();
    let config = match tessera_config::Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: Failed to load config file: {e}");
            process::exit(1);
        }
    };

    let (options, config_content_path) = match config {
        Some(config) => (config.editor, config.content_path),
        None => (EditorOptions::default(), None),
    };

    let content_path = match args.len() {
        1 => config_content_path,
        2 => Some(PathBuf::from(&args[1])),
        _ => {
            eprintln!("Usage: {} [content-file.html]", args[0]);
            process::exit(1);
        }
    };

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(options, content_path)?;

    // Main loop
    let res = run_app(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("{err:?}");
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()>
where
    <B as ratatui::backend::Backend>::Error: Send + Sync + 'static,
{
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()?
            && app.handle_key(key.code, key.modifiers)?
        {
            return Ok(());
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)].as_ref())
        .split(f.area());

    let caret = app.selection.get();
    let caret_block = caret.as_ref().map(|c| c.block_id);
    let caret_offset = caret.as_ref().map(|c| c.range.start).unwrap_or(0);

    let mut lines: Vec<Line> = Vec::new();
    let mut caret_row = 0u16;
    let mut numbered_index = 0usize;
    for block in app.editor.blocks() {
        if block.kind == BlockType::NumberedList {
            numbered_index += 1;
        } else {
            numbered_index = 0;
        }
        let prefix = match block.kind {
            BlockType::Paragraph => String::new(),
            BlockType::Heading1 => "# ".to_string(),
            BlockType::Heading2 => "## ".to_string(),
            BlockType::Heading3 => "### ".to_string(),
            BlockType::BulletList => "• ".to_string(),
            BlockType::NumberedList => format!("{numbered_index}. "),
            BlockType::Quote => "> ".to_string(),
            BlockType::Code => "```".to_string(),
            BlockType::Divider => "────────".to_string(),
        };
        let mut text = block.text();
        let is_caret_block = caret_block == Some(block.id);
        if is_caret_block {
            let at = caret_offset.min(text.len());
            text.insert(at, '▏');
            caret_row = lines.len() as u16;
        }
        let style = match block.kind {
            BlockType::Heading1 | BlockType::Heading2 | BlockType::Heading3 => {
                Style::default().add_modifier(Modifier::BOLD)
            }
            BlockType::Quote => Style::default().fg(Color::Green),
            BlockType::Code => Style::default().fg(Color::Yellow),
            BlockType::Divider => Style::default().fg(Color::DarkGray),
            _ => Style::default(),
        };
        lines.push(Line::from(vec![
            Span::styled(prefix, Style::default().fg(Color::DarkGray)),
            Span::styled(text, style),
        ]));
    }

    let editor_panel = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("tessera"));
    f.render_widget(editor_panel, chunks[0]);

    let status = Line::from(vec![
        Span::styled(state_label(app), Style::default().fg(Color::Cyan)),
        Span::raw("  "),
        Span::raw(app.status.as_str()),
        Span::raw("  "),
        Span::styled(toolbar_label(app), Style::default().fg(Color::Magenta)),
    ]);
    f.render_widget(Paragraph::new(status), chunks[1]);

    if app.editor.menu().is_open() {
        draw_menu(f, app, chunks[0], caret_row);
    }
}

fn state_label(app: &App) -> &'static str {
    match app.editor.state() {
        EditorState::Idle => "idle",
        EditorState::Editing(_) => "editing",
        EditorState::SlashMenu(_) => "menu",
        EditorState::Toolbar(_) => "toolbar",
    }
}

fn toolbar_label(app: &App) -> String {
    if !app.editor.toolbar().is_visible() {
        return String::new();
    }
    let active = app.editor.toolbar().active();
    let flag = |on: bool, label: &str| {
        if on {
            format!("[{label}]")
        } else {
            format!(" {label} ")
        }
    };
    format!(
        "{}{}{}{}{}{}",
        flag(active.marks.bold, "B"),
        flag(active.marks.italic, "I"),
        flag(active.marks.underline, "U"),
        flag(active.marks.strikethrough, "S"),
        flag(active.marks.code, "`"),
        flag(active.link, "link"),
    )
}

/// Slash menu popup rendered just under the caret line.
fn draw_menu(f: &mut Frame, app: &App, editor_area: Rect, caret_row: u16) {
    let candidates = app.editor.menu().filtered();
    let focused = app.editor.menu().focused_index();

    let icons = TerminalIcons;
    let items: Vec<ListItem> = if candidates.is_empty() {
        vec![ListItem::new("No matching commands")]
    } else {
        candidates
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let marker = if i == focused { "› " } else { "  " };
                let line = format!(
                    "{marker}{} {:<14} {}",
                    icons.markup(c.icon),
                    c.label,
                    c.shortcut_text
                );
                let style = if i == focused {
                    Style::default().add_modifier(Modifier::REVERSED)
                } else {
                    Style::default()
                };
                ListItem::new(line).style(style)
            })
            .collect()
    };

    let height = (items.len() as u16 + 2).min(editor_area.height);
    let top = (editor_area.y + caret_row + 2)
        .min(editor_area.y + editor_area.height.saturating_sub(height));
    let area = Rect {
        x: editor_area.x + 2,
        y: top,
        width: 30.min(editor_area.width),
        height,
    };

    let menu = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("/{}", app.editor.menu().filter())),
    );
    f.render_widget(Clear, area);
    f.render_widget(menu, area);
}
