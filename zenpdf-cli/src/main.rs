use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use crossterm::cursor;
use crossterm::event::{self, DisableMouseCapture, EnableMouseCapture};
use crossterm::terminal::{self, Clear, ClearType};
use directories::ProjectDirs;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};
use zenpdf_core::config::project_dirs;
use zenpdf_core::{
    Command, DocumentBackend, DocumentProvider, FileStateStore, LayoutMode, RenderImage,
    RenderingSurface, Session, SessionEvent, StateStore, ViewerConfig,
};
use zenpdf_render::{PageSurface, PdfiumProvider, Viewport};
use zenpdf_tty::{
    combine_status, format_dialog_prompt, format_document_status, write_badge,
    write_status_line, DrawParams, EventMapper, InputMode, KittyRenderer, UiEvent,
};

/// Longest wait for input while nothing is animating.
const IDLE_POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Parser)]
#[command(
    name = "zenpdf",
    version,
    about = "Chrome-free PDF viewer for kitty-compatible terminals"
)]
struct Args {
    /// Page to open the last document on (1-based)
    #[arg(short = 'p', long = "page")]
    page: Option<usize>,

    /// Layout for documents opened for the first time
    /// (single, single-continuous, two-up, two-up-continuous)
    #[arg(short = 'l', long = "layout")]
    layout: Option<LayoutMode>,

    /// Configuration file to use instead of the platform default
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// PDF files to open; `-` reads a document from stdin
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> anyhow::Result<Self> {
        terminal::enable_raw_mode()?;
        crossterm::execute!(io::stdout(), EnableMouseCapture, cursor::Hide)?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(stdout, DisableMouseCapture, cursor::Show);
        let _ = terminal::disable_raw_mode();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs =
        project_dirs().ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let mut config = match args.config.as_deref() {
        Some(path) => ViewerConfig::load(path)?,
        None => ViewerConfig::load_from_project_dirs(&project_dirs)?,
    };
    if let Some(layout) = args.layout {
        config.default_layout = layout;
    }
    let _log_guard = init_logging(&project_dirs, &config.log_filter)?;

    let store: Arc<dyn StateStore> =
        Arc::new(FileStateStore::new(config.state_dir(&project_dirs))?);
    let mut session: Session<PageSurface> = Session::new(store, &config);
    let provider = PdfiumProvider::new()?;
    let mut geometry = TerminalGeometry::query();

    for path in &args.files {
        let backend = open_document(&provider, path)
            .await
            .with_context(|| format!("failed to open {:?}", path))?;
        let info = backend.info().clone();
        let mut surface = PageSurface::with_document(backend);
        surface.resize(geometry.page_viewport());
        session.open_window(info, surface, Instant::now())?;
    }

    if let Some(page) = args.page {
        session.apply(Command::GoToPage { page }, Instant::now())?;
    }

    let _raw = RawModeGuard::new()?;
    let mut renderer = KittyRenderer::new(io::stdout());
    let mut event_mapper = EventMapper::new();
    let mut dirty = true;
    let mut badge_drawn = false;

    loop {
        let now = Instant::now();
        session.on_frame(now);
        if drain_session_events(&session) {
            dirty = true;
        }

        if dirty {
            redraw(&mut renderer, &session, &geometry, event_mapper.pending_input().as_deref())?;
            badge_drawn = false;
            dirty = false;
        }
        badge_drawn = draw_hud(&mut renderer, &session, &geometry, now, badge_drawn)?;

        let timeout = session
            .next_frame(now)
            .map(|at| at.saturating_duration_since(now))
            .unwrap_or(IDLE_POLL)
            .min(IDLE_POLL);
        if !event::poll(timeout)? {
            continue;
        }

        let ui_event = event_mapper.map_event(event::read()?);
        let action = handle_event(
            ui_event,
            &mut session,
            &provider,
            &mut geometry,
            Instant::now(),
        )
        .await?;

        let dialog_open = session.active().and_then(|window| window.dialog()).is_some();
        if !dialog_open && event_mapper.mode() == InputMode::GoToDialog {
            event_mapper.set_mode(InputMode::Normal);
        }
        match action {
            LoopAction::Continue => dirty |= event_mapper.pending_input().is_some() || dialog_open,
            LoopAction::ContinueRedraw => dirty = true,
            LoopAction::Quit => break,
        }
    }

    {
        let mut writer = renderer.writer();
        crossterm::execute!(&mut writer, Clear(ClearType::All), cursor::MoveTo(0, 0))?;
    }

    session.persist()?;
    Ok(())
}

enum LoopAction {
    Continue,
    ContinueRedraw,
    Quit,
}

async fn open_document(
    provider: &PdfiumProvider,
    path: &Path,
) -> Result<Arc<dyn DocumentBackend>> {
    if path == Path::new("-") {
        let mut bytes = Vec::new();
        tokio::io::stdin()
            .read_to_end(&mut bytes)
            .await
            .context("failed to read document from stdin")?;
        return provider.open_bytes(bytes).await;
    }
    provider.open(path).await
}

async fn handle_event(
    event: UiEvent,
    session: &mut Session<PageSurface>,
    provider: &PdfiumProvider,
    geometry: &mut TerminalGeometry,
    now: Instant,
) -> Result<LoopAction> {
    match event {
        UiEvent::Command(command) => {
            session.apply(command, now)?;
            Ok(LoopAction::ContinueRedraw)
        }
        UiEvent::NextLayout => {
            if let Some(mode) = session.active_state().map(|state| state.layout_mode().next()) {
                session.apply(Command::SetLayoutMode { mode }, now)?;
            }
            Ok(LoopAction::ContinueRedraw)
        }
        UiEvent::Scroll { delta } => {
            session.interact(now, |surface| surface.scroll_pages(delta));
            Ok(LoopAction::Continue)
        }
        UiEvent::Pinch { factor } => {
            session.interact(now, |surface| surface.pinch(factor));
            Ok(LoopAction::Continue)
        }
        UiEvent::CycleDisplayMode => {
            session.interact(now, |surface| {
                surface.cycle_display_mode();
            });
            Ok(LoopAction::Continue)
        }
        UiEvent::Resize { columns, rows } => {
            *geometry = TerminalGeometry::query_or(columns, rows);
            let viewport = geometry.page_viewport();
            session.for_each_surface(now, |surface| surface.resize(viewport));
            Ok(LoopAction::ContinueRedraw)
        }
        UiEvent::NextWindow => {
            let count = session.windows().len();
            if count > 1 {
                let index = (session.active_index() + 1) % count;
                session.apply(Command::SwitchWindow { index }, now)?;
            }
            Ok(LoopAction::Continue)
        }
        UiEvent::CloseWindow => {
            session.apply(
                Command::CloseWindow {
                    index: session.active_index(),
                },
                now,
            )?;
            if session.windows().is_empty() {
                return Ok(LoopAction::Quit);
            }
            Ok(LoopAction::ContinueRedraw)
        }
        UiEvent::Reload => {
            reload_active(session, provider, now).await;
            Ok(LoopAction::ContinueRedraw)
        }
        UiEvent::Quit => Ok(LoopAction::Quit),
        UiEvent::None => Ok(LoopAction::Continue),
    }
}

/// Reopens the active window's file and swaps it into the same surface.
async fn reload_active(
    session: &mut Session<PageSurface>,
    provider: &PdfiumProvider,
    now: Instant,
) {
    let index = session.active_index();
    let Some(path) = session
        .active()
        .and_then(|window| window.info().path.clone())
    else {
        warn!("active document has no file to reload from");
        return;
    };
    let backend = match provider.open(&path).await {
        Ok(backend) => backend,
        Err(err) => {
            warn!(?err, path = %path.display(), "reload failed, keeping current document");
            return;
        }
    };
    let info = backend.info().clone();
    info!(document = %info.id, pages = info.page_count, "reloading document");
    let swapped = session.swap_document(index, info, now, move |surface| {
        surface.set_document(Some(backend));
        Ok(())
    });
    if let Err(err) = swapped {
        warn!(?err, path = %path.display(), "reload failed, keeping current document");
    }
}

/// Consumes queued session events; true when the active window must redraw.
fn drain_session_events(session: &Session<PageSurface>) -> bool {
    let active = session.active().map(|window| window.id());
    let events = session.events();
    let mut events = events.lock();
    let mut redraw = false;
    for event in events.drain(..) {
        match event {
            SessionEvent::RedrawNeeded(id) => redraw |= Some(id) == active,
            SessionEvent::PageChanged { window, page } => {
                debug!(%window, page, "page changed");
                redraw |= Some(window) == active;
            }
            SessionEvent::WindowOpened(_)
            | SessionEvent::WindowClosed(_)
            | SessionEvent::ActiveWindowChanged(_) => redraw = true,
        }
    }
    redraw
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct TerminalGeometry {
    columns: u16,
    rows: u16,
    cell_width: f32,
    cell_height: f32,
}

impl TerminalGeometry {
    /// Used when the terminal does not report its pixel size.
    const FALLBACK_CELL: (f32, f32) = (8.0, 16.0);

    fn query() -> Self {
        match terminal::size() {
            Ok((columns, rows)) => Self::query_or(columns, rows),
            Err(err) => {
                warn!(?err, "terminal size unavailable");
                Self::from_window(80, 24, 0, 0)
            }
        }
    }

    fn query_or(columns: u16, rows: u16) -> Self {
        match terminal::window_size() {
            Ok(window) => Self::from_window(window.columns, window.rows, window.width, window.height),
            Err(_) => Self::from_window(columns, rows, 0, 0),
        }
    }

    fn from_window(columns: u16, rows: u16, width: u16, height: u16) -> Self {
        let columns = columns.max(1);
        let rows = rows.max(1);
        let (cell_width, cell_height) = if width > 0 && height > 0 {
            (
                f32::from(width) / f32::from(columns),
                f32::from(height) / f32::from(rows),
            )
        } else {
            Self::FALLBACK_CELL
        };
        Self {
            columns,
            rows,
            cell_width,
            cell_height,
        }
    }

    /// Rows available to the page, the last one holds the status line.
    fn page_rows(&self) -> u16 {
        self.rows.saturating_sub(1).max(1)
    }

    fn page_viewport(&self) -> Viewport {
        Viewport::new(
            (f32::from(self.columns) * self.cell_width) as u32,
            (f32::from(self.page_rows()) * self.cell_height) as u32,
        )
    }

    /// Cells covered by `image` drawn at its native pixel size.
    fn cells_for(&self, image: &RenderImage) -> (u32, u32) {
        let columns = (image.width as f32 / self.cell_width).ceil() as u32;
        let rows = (image.height as f32 / self.cell_height).ceil() as u32;
        (
            columns.clamp(1, u32::from(self.columns)),
            rows.clamp(1, u32::from(self.page_rows())),
        )
    }
}

fn redraw(
    renderer: &mut KittyRenderer<io::Stdout>,
    session: &Session<PageSurface>,
    geometry: &TerminalGeometry,
    pending_input: Option<&str>,
) -> Result<()> {
    renderer.begin_sync_update()?;
    renderer.clear_all()?;

    if let Some(window) = session.active() {
        match window.surface().render()? {
            Some(image) => {
                let (draw_cols, draw_rows) = geometry.cells_for(&image);
                let start_col = u32::from(geometry.columns).saturating_sub(draw_cols) / 2;
                let start_row = u32::from(geometry.page_rows()).saturating_sub(draw_rows) / 2;
                {
                    let mut writer = renderer.writer();
                    crossterm::execute!(
                        &mut writer,
                        cursor::MoveTo(start_col as u16, start_row as u16)
                    )?;
                }
                renderer.draw(&image, DrawParams::clamped(draw_cols, draw_rows))?;
            }
            None => renderer.delete_image()?,
        }

        if let Some(state) = session.state(&window.info().id) {
            let status = match window.dialog() {
                Some(dialog) => format_dialog_prompt(dialog, state),
                None => combine_status(Some(format_document_status(window.info(), state)), pending_input)
                    .unwrap_or_default(),
            };
            draw_status_line(renderer, geometry, &status)?;
        }
    } else {
        renderer.delete_image()?;
    }

    renderer.end_sync_update()?;
    Ok(())
}

/// Draws the page badge while the overlay is animating, and blanks it once
/// after it faded out. Returns whether a badge is on screen.
fn draw_hud(
    renderer: &mut KittyRenderer<io::Stdout>,
    session: &Session<PageSurface>,
    geometry: &TerminalGeometry,
    now: Instant,
    badge_drawn: bool,
) -> Result<bool> {
    let Some(window) = session.active() else {
        return Ok(false);
    };
    let overlay = window.overlay();
    let opacity = overlay.opacity(now);
    if opacity <= 0.0 && !badge_drawn {
        return Ok(false);
    }
    let Some(page) = overlay.page() else {
        return Ok(false);
    };
    let row = geometry.page_rows().saturating_sub(1);
    write_badge(renderer.writer(), page, opacity, geometry.columns, row)?;
    Ok(opacity > 0.0)
}

fn draw_status_line(
    renderer: &mut KittyRenderer<io::Stdout>,
    geometry: &TerminalGeometry,
    status: &str,
) -> Result<()> {
    let status_row = geometry.rows.saturating_sub(1);
    let mut writer = renderer.writer();
    crossterm::execute!(
        &mut writer,
        cursor::MoveTo(0, status_row),
        Clear(ClearType::CurrentLine)
    )?;
    let width = usize::from(geometry.columns);
    let status: String = status.chars().take(width).collect();
    write_status_line(&mut writer, &status)?;
    Ok(())
}

/// Logs go to a file only. There is no console layer: anything written to
/// the terminal would land on top of the page image.
fn init_logging(project_dirs: &ProjectDirs, default_filter: &str) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "zenpdf.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}
