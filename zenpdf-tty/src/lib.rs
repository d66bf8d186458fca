use std::io::{self, Write};

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossterm::{
    cursor,
    event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseEvent, MouseEventKind},
    style::{Attribute, Print, SetAttribute},
    terminal::{Clear, ClearType},
};
use png::{BitDepth, ColorType, Encoder};
use tracing::trace;
use zenpdf_core::{Command, DocumentInfo, GoToPageDialog, NavigationState, RenderImage};

pub struct KittyRenderer<W: Write> {
    writer: W,
    image_id: u32,
    placement_id: u32,
}

pub struct DrawParams {
    pub columns: u32,
    pub rows: u32,
}

impl DrawParams {
    pub fn clamped(columns: u32, rows: u32) -> Self {
        Self {
            columns: columns.max(1),
            rows: rows.max(1),
        }
    }
}

impl<W: Write> KittyRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            image_id: 1,
            placement_id: 1,
        }
    }

    pub fn writer(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Transmits `image` and places it at the cursor, replacing the previous
    /// placement. The image sits below text so the HUD can be drawn over it.
    pub fn draw(&mut self, image: &RenderImage, params: DrawParams) -> Result<()> {
        let mut buffer = Vec::new();
        let mut encoder = Encoder::new(&mut buffer, image.width, image.height);
        encoder.set_color(ColorType::Rgba);
        encoder.set_depth(BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&image.pixels)?;
        writer.finish()?;

        let encoded = BASE64.encode(&buffer);
        let mut chunks = encoded.as_bytes().chunks(4096).peekable();
        let mut first = true;

        while let Some(chunk) = chunks.next() {
            let more = chunks.peek().is_some();
            if first {
                write!(
                    self.writer,
                    "\u{1b}_Ga=T,f=100,C=1,q=2,i={},p={},c={},r={},s={},v={},z=-1,m={}",
                    self.image_id,
                    self.placement_id,
                    params.columns,
                    params.rows,
                    image.width,
                    image.height,
                    u8::from(more)
                )?;
                first = false;
            } else {
                write!(self.writer, "\u{1b}_Gm={},q=2", u8::from(more))?;
            }
            if !chunk.is_empty() {
                self.writer.write_all(b";")?;
                self.writer.write_all(chunk)?;
            }
            write!(self.writer, "\u{1b}\\")?;
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Removes the placed image, e.g. when the window has no document.
    pub fn delete_image(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}_Ga=d,d=i,i={},q=2\u{1b}\\", self.image_id)?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn begin_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026h")?;
        Ok(())
    }

    /// The terminal renders all buffered changes at once.
    pub fn end_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026l")?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn clear_all(&mut self) -> Result<()> {
        crossterm::execute!(
            &mut self.writer,
            Clear(ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    /// Routed through the session like a menu item.
    Command(Command),
    /// Cycles the layout through the session rather than the surface.
    NextLayout,
    /// Interactions handled by the page surface itself.
    Scroll { delta: isize },
    Pinch { factor: f32 },
    CycleDisplayMode,
    Resize { columns: u16, rows: u16 },
    NextWindow,
    CloseWindow,
    Reload,
    Quit,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    GoToDialog,
}

#[derive(Debug, Default)]
pub struct EventMapper {
    pending_count: Option<usize>,
    pending_digits: String,
    mode: InputMode,
    dialog_buffer: Option<String>,
}

impl EventMapper {
    pub const PINCH_STEP: f32 = 1.1;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mode(&mut self, mode: InputMode) {
        if self.mode != mode {
            self.reset_count();
            self.dialog_buffer = None;
            self.mode = mode;
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        match event {
            Event::Key(KeyEvent { kind, .. }) if kind == KeyEventKind::Release => UiEvent::None,
            Event::Resize(columns, rows) => UiEvent::Resize { columns, rows },
            Event::Mouse(mouse) => self.map_mouse(mouse),
            event => match self.mode {
                InputMode::Normal => self.map_event_normal(event),
                InputMode::GoToDialog => self.map_event_dialog(event),
            },
        }
    }

    fn map_event_normal(&mut self, event: Event) -> UiEvent {
        let Event::Key(KeyEvent {
            code, modifiers, ..
        }) = event
        else {
            return UiEvent::None;
        };
        match (code, modifiers) {
            (KeyCode::Char('c'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                UiEvent::Quit
            }
            (KeyCode::Char('0'), KeyModifiers::NONE) if self.pending_count.is_none() => {
                UiEvent::Command(Command::ResetZoom)
            }
            (KeyCode::Char(c), KeyModifiers::NONE) if c.is_ascii_digit() => {
                if let Some(digit) = c.to_digit(10) {
                    self.push_digit(digit as usize);
                }
                UiEvent::None
            }
            (KeyCode::Char('l'), KeyModifiers::NONE)
            | (KeyCode::Char('j'), KeyModifiers::NONE)
            | (KeyCode::Char(' '), KeyModifiers::NONE)
            | (KeyCode::Right, KeyModifiers::NONE)
            | (KeyCode::PageDown, _) => {
                let count = self.take_count();
                UiEvent::Command(Command::NextPage { count })
            }
            (KeyCode::Char('h'), KeyModifiers::NONE)
            | (KeyCode::Char('k'), KeyModifiers::NONE)
            | (KeyCode::Left, KeyModifiers::NONE)
            | (KeyCode::PageUp, _) => {
                let count = self.take_count();
                UiEvent::Command(Command::PrevPage { count })
            }
            (KeyCode::Char('g'), KeyModifiers::NONE) => match self.pending_count.take() {
                Some(page) => {
                    self.pending_digits.clear();
                    UiEvent::Command(Command::GoToPage { page })
                }
                None => {
                    self.set_mode(InputMode::GoToDialog);
                    UiEvent::Command(Command::OpenGoToDialog)
                }
            },
            (KeyCode::Char('+'), _) | (KeyCode::Char('='), _) => {
                self.reset_count();
                UiEvent::Command(Command::ZoomIn)
            }
            (KeyCode::Char('-'), _) => {
                self.reset_count();
                UiEvent::Command(Command::ZoomOut)
            }
            (KeyCode::Char('d'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::CycleDisplayMode
            }
            (KeyCode::Char('D'), _) => {
                self.reset_count();
                UiEvent::NextLayout
            }
            (KeyCode::Tab, _) => {
                self.reset_count();
                UiEvent::NextWindow
            }
            (KeyCode::Char('x'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::CloseWindow
            }
            (KeyCode::Char('r'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::Reload
            }
            (KeyCode::Char('q'), _) => {
                self.reset_count();
                UiEvent::Quit
            }
            _ => {
                self.reset_count();
                UiEvent::None
            }
        }
    }

    /// The dialog opens with the current page prefilled; the first typed
    /// digit replaces the prefill. Other characters are ignored.
    fn map_event_dialog(&mut self, event: Event) -> UiEvent {
        let Event::Key(KeyEvent {
            code, modifiers, ..
        }) = event
        else {
            return UiEvent::None;
        };
        match (code, modifiers) {
            (KeyCode::Esc, _) => {
                self.set_mode(InputMode::Normal);
                UiEvent::Command(Command::CancelGoToDialog)
            }
            (KeyCode::Enter, _) => UiEvent::Command(Command::ConfirmGoToDialog),
            (KeyCode::Backspace, _) => {
                let buffer = self.dialog_buffer.get_or_insert_with(String::new);
                buffer.pop();
                UiEvent::Command(Command::UpdateGoToDialog {
                    input: buffer.clone(),
                })
            }
            (KeyCode::Char(c), KeyModifiers::NONE) if c.is_ascii_digit() => {
                let buffer = self.dialog_buffer.get_or_insert_with(String::new);
                buffer.push(c);
                UiEvent::Command(Command::UpdateGoToDialog {
                    input: buffer.clone(),
                })
            }
            _ => UiEvent::None,
        }
    }

    fn map_mouse(&mut self, mouse: MouseEvent) -> UiEvent {
        let pinch = mouse.modifiers.contains(KeyModifiers::CONTROL);
        match mouse.kind {
            MouseEventKind::ScrollDown if pinch => UiEvent::Pinch {
                factor: 1.0 / Self::PINCH_STEP,
            },
            MouseEventKind::ScrollUp if pinch => UiEvent::Pinch {
                factor: Self::PINCH_STEP,
            },
            MouseEventKind::ScrollDown => UiEvent::Scroll { delta: 1 },
            MouseEventKind::ScrollUp => UiEvent::Scroll { delta: -1 },
            _ => UiEvent::None,
        }
    }

    fn push_digit(&mut self, digit: usize) {
        let current = self.pending_count.unwrap_or(0);
        let next = current.saturating_mul(10).saturating_add(digit);
        self.pending_count = Some(next);
        if let Some(c) = char::from_digit(digit as u32, 10) {
            self.pending_digits.push(c);
        }
    }

    fn take_count(&mut self) -> usize {
        let count = self
            .pending_count
            .take()
            .filter(|&count| count > 0)
            .unwrap_or(1);
        self.pending_digits.clear();
        count
    }

    fn reset_count(&mut self) {
        self.pending_count = None;
        self.pending_digits.clear();
    }

    pub fn pending_input(&self) -> Option<String> {
        if self.pending_digits.is_empty() {
            None
        } else {
            Some(self.pending_digits.clone())
        }
    }
}

/// How strongly the page badge is drawn for an overlay opacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadgeIntensity {
    Hidden,
    Faint,
    Normal,
    Bold,
}

impl BadgeIntensity {
    pub fn from_opacity(opacity: f32) -> Self {
        if !(opacity > 0.0) {
            BadgeIntensity::Hidden
        } else if opacity <= 0.33 {
            BadgeIntensity::Faint
        } else if opacity < 0.66 {
            BadgeIntensity::Normal
        } else {
            BadgeIntensity::Bold
        }
    }
}

pub fn badge_label(page: usize) -> String {
    format!(" Page {page} ")
}

/// Draws the page badge centred on `row`. A hidden badge is overwritten with
/// blanks so the page image shows through again.
pub fn write_badge<W: Write>(
    writer: &mut W,
    page: usize,
    opacity: f32,
    columns: u16,
    row: u16,
) -> io::Result<()> {
    let label = badge_label(page);
    let width = label.chars().count() as u16;
    let col = columns.saturating_sub(width) / 2;
    crossterm::queue!(writer, cursor::MoveTo(col, row))?;
    match BadgeIntensity::from_opacity(opacity) {
        BadgeIntensity::Hidden => {
            crossterm::queue!(writer, Print(" ".repeat(width as usize)))?;
        }
        intensity => {
            let attribute = match intensity {
                BadgeIntensity::Faint => Attribute::Dim,
                BadgeIntensity::Bold => Attribute::Bold,
                _ => Attribute::NormalIntensity,
            };
            trace!(?intensity, page, "page badge");
            crossterm::queue!(
                writer,
                SetAttribute(Attribute::Reverse),
                SetAttribute(attribute),
                Print(&label),
                SetAttribute(Attribute::Reset)
            )?;
        }
    }
    writer.flush()
}

pub fn format_document_status(info: &DocumentInfo, state: &NavigationState) -> String {
    let zoom_percent = state.zoom_level() * 100.0;
    format!(
        "{} | page {}/{} | {:.0}% | {}",
        info.display_name(),
        state.page_number(),
        state.total_pages(),
        zoom_percent,
        state.layout_mode()
    )
}

pub fn format_dialog_prompt(dialog: &GoToPageDialog, state: &NavigationState) -> String {
    let mut prompt = format!(
        "Go to page (1-{}): {}",
        state.total_pages(),
        dialog.input()
    );
    if !dialog.is_input_valid(state) {
        prompt.push_str("  [enter disabled]");
    }
    prompt
}

pub fn combine_status(base: Option<String>, pending_input: Option<&str>) -> Option<String> {
    match (base, pending_input.filter(|s| !s.is_empty())) {
        (Some(mut base), Some(pending)) => {
            base.push_str(" | ");
            base.push_str(pending);
            Some(base)
        }
        (Some(base), None) => Some(base),
        (None, Some(pending)) => Some(pending.to_string()),
        (None, None) => None,
    }
}

pub fn write_status_line<W: Write>(writer: &mut W, label: &str) -> io::Result<()> {
    write!(writer, "{}", label)?;
    writer.flush()
}
