use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use parking_lot::Mutex;
use tracing::{debug, instrument, warn};

use crate::dialog::{DialogOutcome, GoToPageDialog};
use crate::overlay::{OverlayTiming, PageOverlay};
use crate::store::{StateRepository, StateStore};
use crate::surface::RenderingSurface;
use crate::sync::ViewSyncCoordinator;
use crate::{DocumentId, DocumentInfo, LayoutMode, NavigationState, ViewerConfig};

/// Retry interval while a window waits for its surface layout.
const LAYOUT_RETRY: Duration = Duration::from_millis(16);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(u64);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "window-{}", self.0)
    }
}

/// Menu and keyboard commands. Page numbers are 1-based.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    NextPage { count: usize },
    PrevPage { count: usize },
    GoToPage { page: usize },
    ZoomIn,
    ZoomOut,
    ResetZoom,
    SetZoom { level: f32 },
    SetLayoutMode { mode: LayoutMode },
    OpenGoToDialog,
    UpdateGoToDialog { input: String },
    ConfirmGoToDialog,
    CancelGoToDialog,
    SwitchWindow { index: usize },
    CloseWindow { index: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    WindowOpened(WindowId),
    WindowClosed(WindowId),
    ActiveWindowChanged(WindowId),
    PageChanged { window: WindowId, page: usize },
    RedrawNeeded(WindowId),
}

/// One open document: its surface, the coordinator bound to it, the page
/// badge and the go-to-page prompt when it is showing.
pub struct DocumentWindow<S> {
    id: WindowId,
    info: DocumentInfo,
    surface: S,
    coordinator: ViewSyncCoordinator,
    overlay: PageOverlay,
    dialog: Option<GoToPageDialog>,
}

impl<S> DocumentWindow<S> {
    pub fn id(&self) -> WindowId {
        self.id
    }

    pub fn info(&self) -> &DocumentInfo {
        &self.info
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn coordinator(&self) -> &ViewSyncCoordinator {
        &self.coordinator
    }

    pub fn overlay(&self) -> &PageOverlay {
        &self.overlay
    }

    pub fn dialog(&self) -> Option<&GoToPageDialog> {
        self.dialog.as_ref()
    }
}

/// Windows over shared per-document navigation state.
///
/// Windows showing the same document share one [`NavigationState`]. Whatever
/// changes it, a command on the active window or a user interaction with any
/// surface, is pushed to every other window on that document.
pub struct Session<S: RenderingSurface> {
    repository: StateRepository,
    default_layout: LayoutMode,
    overlay_timing: OverlayTiming,
    states: HashMap<DocumentId, NavigationState>,
    windows: Vec<DocumentWindow<S>>,
    active: usize,
    next_window_id: u64,
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl<S: RenderingSurface> Session<S> {
    pub fn new(store: Arc<dyn StateStore>, config: &ViewerConfig) -> Self {
        Self {
            repository: StateRepository::new(store),
            default_layout: config.default_layout,
            overlay_timing: config.hud,
            states: HashMap::new(),
            windows: Vec::new(),
            active: 0,
            next_window_id: 0,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn events(&self) -> Arc<Mutex<Vec<SessionEvent>>> {
        Arc::clone(&self.events)
    }

    pub fn windows(&self) -> &[DocumentWindow<S>] {
        &self.windows
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active(&self) -> Option<&DocumentWindow<S>> {
        self.windows.get(self.active)
    }

    pub fn state(&self, id: &DocumentId) -> Option<&NavigationState> {
        self.states.get(id)
    }

    pub fn active_state(&self) -> Option<&NavigationState> {
        self.active().and_then(|window| self.states.get(&window.info.id))
    }

    /// Adds a window for `info` on a surface that already shows the document
    /// and makes it active. The stored state for the document is restored, or
    /// created on first open.
    #[instrument(skip_all, fields(document = %info.id, pages = info.page_count))]
    pub fn open_window(&mut self, info: DocumentInfo, mut surface: S, now: Instant) -> Result<WindowId> {
        self.ensure_state(&info)?;
        self.next_window_id += 1;
        let id = WindowId(self.next_window_id);

        let mut coordinator = ViewSyncCoordinator::new();
        let mut overlay = PageOverlay::new(self.overlay_timing);
        if let Some(state) = self.states.get(&info.id) {
            coordinator.attach(&mut surface, state);
            coordinator.apply_state_to_view(&mut surface, state);
            overlay.observe(state.page_number(), now);
        }

        self.windows.push(DocumentWindow {
            id,
            info,
            surface,
            coordinator,
            overlay,
            dialog: None,
        });
        self.active = self.windows.len() - 1;
        self.events.lock().extend([
            SessionEvent::WindowOpened(id),
            SessionEvent::ActiveWindowChanged(id),
        ]);
        debug!(%id, "window opened");
        Ok(id)
    }

    pub fn apply(&mut self, command: Command, now: Instant) -> Result<()> {
        match command {
            Command::SwitchWindow { index } => {
                if index < self.windows.len() && index != self.active {
                    self.active = index;
                    let id = self.windows[index].id;
                    self.events.lock().extend([
                        SessionEvent::ActiveWindowChanged(id),
                        SessionEvent::RedrawNeeded(id),
                    ]);
                }
            }
            Command::CloseWindow { index } => self.close_window(index)?,
            command => self.apply_to_active(command, now),
        }
        Ok(())
    }

    /// Runs a user interaction against the active surface, then handles the
    /// notifications it produced.
    pub fn interact<F, R>(&mut self, now: Instant, interaction: F) -> Option<R>
    where
        F: FnOnce(&mut S) -> R,
    {
        let index = self.active;
        let window = self.windows.get_mut(index)?;
        let result = interaction(&mut window.surface);
        self.sync_window(index, now);
        Some(result)
    }

    /// Like [`interact`](Self::interact) for every surface, e.g. after the
    /// terminal was resized.
    pub fn for_each_surface<F>(&mut self, now: Instant, mut interaction: F)
    where
        F: FnMut(&mut S),
    {
        for window in &mut self.windows {
            interaction(&mut window.surface);
        }
        for index in 0..self.windows.len() {
            self.sync_window(index, now);
        }
    }

    /// Frame tick: retries deferred scale assertions, drains pending surface
    /// notifications and retires finished overlay cycles.
    pub fn on_frame(&mut self, now: Instant) {
        for index in 0..self.windows.len() {
            {
                let Self {
                    windows,
                    states,
                    events,
                    ..
                } = self;
                let window = &mut windows[index];
                if let Some(state) = states.get(&window.info.id) {
                    let outcome = window.coordinator.on_frame(&mut window.surface, state);
                    if outcome.view_updated {
                        events.lock().push(SessionEvent::RedrawNeeded(window.id));
                    }
                }
            }
            self.sync_window(index, now);
            self.windows[index].overlay.tick(now);
        }
    }

    /// Earliest instant the UI has to wake up for, if any.
    pub fn next_frame(&self, now: Instant) -> Option<Instant> {
        let overlay = self
            .active()
            .and_then(|window| window.overlay.next_frame(now));
        let layout = self
            .windows
            .iter()
            .any(|window| window.coordinator.has_pending_scale())
            .then(|| now + LAYOUT_RETRY);
        match (overlay, layout) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Replaces the document shown by window `index`. The coordinator is
    /// detached while `load` swaps the surface's document, then bound to the
    /// new document's state. When the new state cannot be set up or `load`
    /// fails, the surface is left alone and the old binding is restored.
    #[instrument(skip_all, fields(index = index, document = %info.id))]
    pub fn swap_document<F>(&mut self, index: usize, info: DocumentInfo, now: Instant, load: F) -> Result<()>
    where
        F: FnOnce(&mut S) -> Result<()>,
    {
        let Some(window) = self.windows.get_mut(index) else {
            warn!(index, "no window to swap document in");
            return Ok(());
        };
        let old_document = window.info.id;
        if let Some(state) = self.states.get(&old_document) {
            self.repository.save(state)?;
        }
        window.coordinator.detach(&mut window.surface);
        window.dialog = None;

        let previous = self.states.get(&info.id).cloned();
        let prepared = self.ensure_state(&info);
        let loaded = prepared.and_then(|()| load(&mut self.windows[index].surface));
        if let Err(err) = loaded {
            match previous {
                Some(state) => {
                    self.states.insert(info.id, state);
                }
                None => self.release_state(info.id),
            }
            let window = &mut self.windows[index];
            if let Some(state) = self.states.get(&old_document) {
                window.coordinator.attach(&mut window.surface, state);
                window.coordinator.apply_state_to_view(&mut window.surface, state);
            }
            return Err(err);
        }

        let window = &mut self.windows[index];
        window.info = info;
        let id = window.id;
        if let Some(state) = self.states.get(&window.info.id) {
            window.coordinator.attach(&mut window.surface, state);
            window.coordinator.apply_state_to_view(&mut window.surface, state);
            if window.overlay.observe(state.page_number(), now) {
                self.events.lock().push(SessionEvent::PageChanged {
                    window: id,
                    page: state.page_number(),
                });
            }
        }
        self.release_state(old_document);
        self.events.lock().push(SessionEvent::RedrawNeeded(id));
        Ok(())
    }

    pub fn close_window(&mut self, index: usize) -> Result<()> {
        if index >= self.windows.len() {
            return Ok(());
        }
        let mut window = self.windows.remove(index);
        window.coordinator.detach(&mut window.surface);
        if let Some(state) = self.states.get(&window.info.id) {
            self.repository.save(state)?;
        }
        self.release_state(window.info.id);
        self.events.lock().push(SessionEvent::WindowClosed(window.id));

        if self.windows.is_empty() {
            self.active = 0;
            return Ok(());
        }
        if index < self.active || self.active >= self.windows.len() {
            self.active = self.active.saturating_sub(1).min(self.windows.len() - 1);
            let id = self.windows[self.active].id;
            self.events.lock().push(SessionEvent::ActiveWindowChanged(id));
        } else if index == self.active {
            let id = self.windows[self.active].id;
            self.events.lock().push(SessionEvent::ActiveWindowChanged(id));
        }
        Ok(())
    }

    pub fn persist(&self) -> Result<()> {
        for state in self.states.values() {
            self.repository.save(state)?;
        }
        Ok(())
    }

    fn ensure_state(&mut self, info: &DocumentInfo) -> Result<()> {
        let expected = info.page_count.max(1);
        match self.states.get(&info.id) {
            Some(state) if state.total_pages() == expected => return Ok(()),
            Some(state) => warn!(
                document = %info.id,
                stored_pages = state.total_pages(),
                total_pages = expected,
                "document changed on disk, navigation state replaced"
            ),
            None => {}
        }
        let state = self
            .repository
            .lookup_or_create(info.id, info.page_count, self.default_layout)?;
        self.states.insert(info.id, state);
        Ok(())
    }

    /// Drops the in-memory state once no window shows the document.
    fn release_state(&mut self, id: DocumentId) {
        if !self.windows.iter().any(|window| window.info.id == id) {
            self.states.remove(&id);
        }
    }

    fn apply_to_active(&mut self, command: Command, now: Instant) {
        let Some(window) = self.windows.get_mut(self.active) else {
            return;
        };
        let document = window.info.id;
        let Some(state) = self.states.get_mut(&document) else {
            return;
        };
        let before = state.clone();

        match command {
            Command::NextPage { count } => state.advance(count.max(1)),
            Command::PrevPage { count } => state.retreat(count.max(1)),
            Command::GoToPage { page } => {
                if !state.go_to_page(page) {
                    debug!(page, "page out of range ignored");
                }
            }
            Command::ZoomIn => state.zoom_in(),
            Command::ZoomOut => state.zoom_out(),
            Command::ResetZoom => state.reset_zoom(),
            Command::SetZoom { level } => {
                if !state.set_zoom(level) {
                    debug!(level, "zoom level out of range ignored");
                }
            }
            Command::SetLayoutMode { mode } => state.set_layout_mode(mode),
            Command::OpenGoToDialog => {
                window.dialog = Some(GoToPageDialog::new(state));
                self.events.lock().push(SessionEvent::RedrawNeeded(window.id));
            }
            Command::UpdateGoToDialog { input } => {
                if let Some(dialog) = window.dialog.as_mut() {
                    dialog.set_input(input);
                    self.events.lock().push(SessionEvent::RedrawNeeded(window.id));
                }
            }
            Command::ConfirmGoToDialog => {
                if let Some(dialog) = window.dialog.as_ref() {
                    if let DialogOutcome::Submitted(_) = dialog.confirm(state) {
                        window.dialog = None;
                    }
                    self.events.lock().push(SessionEvent::RedrawNeeded(window.id));
                }
            }
            Command::CancelGoToDialog => {
                if window.dialog.take().is_some() {
                    self.events.lock().push(SessionEvent::RedrawNeeded(window.id));
                }
            }
            Command::SwitchWindow { .. } | Command::CloseWindow { .. } => {}
        }

        if *state != before {
            self.propagate(document, None, now);
        }
    }

    /// Pumps the notifications of window `index` into its state.
    fn sync_window(&mut self, index: usize, now: Instant) {
        let (document, id, state_changed) = {
            let Self {
                windows,
                states,
                events,
                ..
            } = self;
            let Some(window) = windows.get_mut(index) else {
                return;
            };
            let Some(state) = states.get_mut(&window.info.id) else {
                return;
            };
            let outcome = window.coordinator.pump(&mut window.surface, state);
            if outcome.view_updated || outcome.state_changed {
                events.lock().push(SessionEvent::RedrawNeeded(window.id));
            }
            (window.info.id, window.id, outcome.state_changed)
        };
        if state_changed {
            self.propagate(document, Some(id), now);
        }
    }

    /// Pushes the state of `document` to every window showing it except
    /// `origin`, whose surface already reflects the change.
    fn propagate(&mut self, document: DocumentId, origin: Option<WindowId>, now: Instant) {
        let Some(state) = self.states.get(&document) else {
            return;
        };
        let page = state.page_number();
        let mut events = Vec::new();
        for window in self.windows.iter_mut().filter(|window| window.info.id == document) {
            if Some(window.id) != origin {
                window.coordinator.apply_state_to_view(&mut window.surface, state);
            }
            if window.overlay.observe(page, now) {
                events.push(SessionEvent::PageChanged {
                    window: window.id,
                    page,
                });
            }
            events.push(SessionEvent::RedrawNeeded(window.id));
        }
        self.events.lock().extend(events);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStateStore;
    use crate::test_support::FakeSurface;
    use crate::{DocumentMetadata, OverlayPhase};
    use std::path::PathBuf;
    use uuid::Uuid;

    fn info(page_count: usize) -> DocumentInfo {
        DocumentInfo {
            id: Uuid::new_v4(),
            path: Some(PathBuf::from("/tmp/paper.pdf")),
            page_count,
            metadata: DocumentMetadata::default(),
        }
    }

    fn session() -> (Session<FakeSurface>, Arc<MemoryStateStore>) {
        let store = Arc::new(MemoryStateStore::new());
        (Session::new(store.clone(), &ViewerConfig::default()), store)
    }

    /// Memory store that refuses to save one document.
    struct RejectingStore {
        inner: MemoryStateStore,
        rejected: DocumentId,
    }

    impl StateStore for RejectingStore {
        fn load(&self, id: &DocumentId) -> Result<Option<NavigationState>> {
            self.inner.load(id)
        }

        fn save(&self, state: &NavigationState) -> Result<()> {
            if state.document_id() == self.rejected {
                anyhow::bail!("disk full");
            }
            self.inner.save(state)
        }
    }

    fn drain(session: &Session<FakeSurface>) -> Vec<SessionEvent> {
        std::mem::take(&mut *session.events().lock())
    }

    #[test]
    fn opening_a_window_applies_stored_state() {
        let (mut session, store) = session();
        let doc = info(20);
        let mut stored = NavigationState::new(doc.id, 20, LayoutMode::TwoUp);
        stored.go_to_page(9);
        stored.set_zoom(1.5);
        store.save(&stored).unwrap();

        let now = Instant::now();
        let id = session.open_window(doc, FakeSurface::new(20, 0.5), now).unwrap();
        let window = session.active().unwrap();
        assert_eq!(window.surface().page, Some(8));
        assert_eq!(window.surface().mode, LayoutMode::TwoUp);
        assert!((window.surface().scale - 0.75).abs() < 1e-6);
        assert!(window.overlay().is_visible(now));
        assert_eq!(
            drain(&session),
            vec![SessionEvent::WindowOpened(id), SessionEvent::ActiveWindowChanged(id)]
        );
    }

    #[test]
    fn commands_drive_the_active_surface() {
        let (mut session, _) = session();
        let now = Instant::now();
        session.open_window(info(100), FakeSurface::new(100, 1.0), now).unwrap();

        session.apply(Command::NextPage { count: 10 }, now).unwrap();
        assert_eq!(session.active_state().unwrap().page_number(), 11);
        session.apply(Command::PrevPage { count: 5 }, now).unwrap();
        session.apply(Command::GoToPage { page: 150 }, now).unwrap();
        assert_eq!(session.active_state().unwrap().page_number(), 6);
        assert_eq!(session.active().unwrap().surface().page, Some(5));

        session.apply(Command::ZoomIn, now).unwrap();
        session.apply(Command::SetZoom { level: 3.0 }, now).unwrap();
        let state = session.active_state().unwrap();
        assert!((state.zoom_level() - 1.05).abs() < 1e-6);
        assert!((session.active().unwrap().surface().scale - 1.05).abs() < 1e-6);
    }

    #[test]
    fn huge_repeat_counts_clamp_in_one_step() {
        let (mut session, _) = session();
        let now = Instant::now();
        session.open_window(info(10), FakeSurface::new(10, 1.0), now).unwrap();

        session.apply(Command::NextPage { count: usize::MAX }, now).unwrap();
        assert_eq!(session.active_state().unwrap().page_number(), 10);
        assert_eq!(session.active().unwrap().surface().page, Some(9));

        session.apply(Command::PrevPage { count: usize::MAX }, now).unwrap();
        assert_eq!(session.active_state().unwrap().page_number(), 1);
    }

    #[test]
    fn scrolling_one_window_moves_the_other() {
        let (mut session, _) = session();
        let now = Instant::now();
        let doc = info(30);
        session.open_window(doc.clone(), FakeSurface::new(30, 1.0), now).unwrap();
        session.open_window(doc.clone(), FakeSurface::new(30, 1.0), now).unwrap();
        drain(&session);

        session.interact(now, |surface| surface.user_scroll_to(12));
        assert_eq!(session.state(&doc.id).unwrap().page_number(), 13);

        let windows = session.windows();
        assert_eq!(windows[0].surface().page, Some(12));
        assert_eq!(windows[0].surface().page_writes, 1);
        assert_eq!(windows[1].surface().page_writes, 0);
        let events = drain(&session);
        assert!(events.contains(&SessionEvent::PageChanged {
            window: windows[0].id(),
            page: 13
        }));
    }

    #[test]
    fn pinch_on_surface_leaves_zoom_alone() {
        let (mut session, _) = session();
        let now = Instant::now();
        session.open_window(info(3), FakeSurface::new(3, 0.8), now).unwrap();

        session.interact(now, |surface| surface.user_pinch(2.5));
        assert_eq!(session.active_state().unwrap().zoom_level(), 1.0);
        assert!((session.active().unwrap().surface().scale - 0.8).abs() < 1e-6);
    }

    #[test]
    fn resize_before_layout_defers_scale_to_frame() {
        let (mut session, _) = session();
        let now = Instant::now();
        session.open_window(info(3), FakeSurface::new(3, 0.0), now).unwrap();
        session.apply(Command::ZoomOut, now).unwrap();
        assert!(session.active().unwrap().coordinator().has_pending_scale());
        assert!(session.next_frame(now).is_some());

        session.for_each_surface(now, |surface| surface.fit = 2.0);
        session.on_frame(now);
        let window = session.active().unwrap();
        assert!(!window.coordinator().has_pending_scale());
        assert!((window.surface().scale - 1.9).abs() < 1e-5);
    }

    #[test]
    fn go_to_dialog_keeps_invalid_input_open() {
        let (mut session, _) = session();
        let now = Instant::now();
        session.open_window(info(5), FakeSurface::new(5, 1.0), now).unwrap();

        session.apply(Command::OpenGoToDialog, now).unwrap();
        assert_eq!(session.active().unwrap().dialog().unwrap().input(), "1");

        session
            .apply(Command::UpdateGoToDialog { input: "0".to_owned() }, now)
            .unwrap();
        session.apply(Command::ConfirmGoToDialog, now).unwrap();
        assert!(session.active().unwrap().dialog().is_some());
        assert_eq!(session.active_state().unwrap().page_number(), 1);

        session
            .apply(Command::UpdateGoToDialog { input: "5".to_owned() }, now)
            .unwrap();
        session.apply(Command::ConfirmGoToDialog, now).unwrap();
        assert!(session.active().unwrap().dialog().is_none());
        assert_eq!(session.active_state().unwrap().page_number(), 5);
        assert_eq!(session.active().unwrap().surface().page, Some(4));
    }

    #[test]
    fn closing_last_window_saves_and_releases_state() {
        let (mut session, store) = session();
        let now = Instant::now();
        let doc = info(12);
        session.open_window(doc.clone(), FakeSurface::new(12, 1.0), now).unwrap();
        session.open_window(doc.clone(), FakeSurface::new(12, 1.0), now).unwrap();
        session.apply(Command::GoToPage { page: 8 }, now).unwrap();

        session.apply(Command::CloseWindow { index: 1 }, now).unwrap();
        assert!(session.state(&doc.id).is_some());
        assert_eq!(session.active_index(), 0);
        assert_eq!(session.windows()[0].surface().hub.subscriber_count(), 1);

        session.apply(Command::CloseWindow { index: 0 }, now).unwrap();
        assert!(session.state(&doc.id).is_none());
        assert!(session.windows().is_empty());
        assert_eq!(store.load(&doc.id).unwrap().unwrap().page_number(), 8);

        session.open_window(doc.clone(), FakeSurface::new(12, 1.0), now).unwrap();
        assert_eq!(session.active().unwrap().surface().page, Some(7));
    }

    #[test]
    fn swapping_documents_rebinds_the_window() {
        let (mut session, store) = session();
        let now = Instant::now();
        let first = info(10);
        let second = info(40);
        session.open_window(first.clone(), FakeSurface::new(10, 1.0), now).unwrap();
        session.apply(Command::GoToPage { page: 4 }, now).unwrap();

        session
            .swap_document(0, second.clone(), now, |surface| {
                surface.set_document(Some(40));
                Ok(())
            })
            .unwrap();
        assert_eq!(store.load(&first.id).unwrap().unwrap().page_number(), 4);
        assert!(session.state(&first.id).is_none());
        assert_eq!(
            session.active().unwrap().coordinator().attached_document(),
            Some(second.id)
        );

        session.interact(now, |surface| surface.user_scroll_to(25));
        assert_eq!(session.state(&second.id).unwrap().page_number(), 26);
        assert_eq!(session.windows()[0].surface().hub.subscriber_count(), 1);
    }

    #[test]
    fn failed_swap_keeps_the_old_binding() {
        let (mut session, _) = session();
        let now = Instant::now();
        let first = info(10);
        session.open_window(first.clone(), FakeSurface::new(10, 1.0), now).unwrap();

        let result = session.swap_document(0, info(3), now, |_| anyhow::bail!("broken file"));
        assert!(result.is_err());
        assert_eq!(
            session.active().unwrap().coordinator().attached_document(),
            Some(first.id)
        );
        session.interact(now, |surface| surface.user_scroll_to(2));
        assert_eq!(session.state(&first.id).unwrap().page_number(), 3);
    }

    #[test]
    fn swap_keeps_the_old_binding_when_the_new_state_cannot_be_saved() {
        let first = info(10);
        let second = info(40);
        let store = Arc::new(RejectingStore {
            inner: MemoryStateStore::new(),
            rejected: second.id,
        });
        let mut session = Session::new(store, &ViewerConfig::default());
        let now = Instant::now();
        session.open_window(first.clone(), FakeSurface::new(10, 1.0), now).unwrap();
        session.apply(Command::GoToPage { page: 6 }, now).unwrap();

        let mut loaded = false;
        let result = session.swap_document(0, second.clone(), now, |surface| {
            loaded = true;
            surface.set_document(Some(40));
            Ok(())
        });
        assert!(result.is_err());
        assert!(!loaded);

        let window = session.active().unwrap();
        assert_eq!(window.info().id, first.id);
        assert_eq!(window.surface().page_count, Some(10));
        assert!(window.coordinator().is_attached());
        assert_eq!(window.coordinator().attached_document(), Some(first.id));
        assert!(session.state(&second.id).is_none());

        session.interact(now, |surface| surface.user_scroll_to(1));
        assert_eq!(session.state(&first.id).unwrap().page_number(), 2);
    }

    #[test]
    fn rapid_page_changes_show_one_badge_cycle() {
        let (mut session, _) = session();
        let t0 = Instant::now();
        session.open_window(info(50), FakeSurface::new(50, 1.0), t0).unwrap();
        for step in 1..=10u64 {
            let now = t0 + Duration::from_millis(step * 50);
            session.apply(Command::NextPage { count: 1 }, now).unwrap();
            session.on_frame(now);
        }

        let last = t0 + Duration::from_millis(500);
        let overlay = session.active().unwrap().overlay();
        assert_eq!(overlay.cycles(), 1);
        assert_eq!(overlay.page(), Some(11));
        assert_eq!(overlay.phase(last + Duration::from_millis(500)), OverlayPhase::Visible);
        assert_eq!(overlay.phase(last + Duration::from_millis(1_400)), OverlayPhase::Hidden);
    }

    #[test]
    fn switching_windows_routes_commands() {
        let (mut session, _) = session();
        let now = Instant::now();
        let first = info(10);
        let second = info(10);
        session.open_window(first.clone(), FakeSurface::new(10, 1.0), now).unwrap();
        session.open_window(second.clone(), FakeSurface::new(10, 1.0), now).unwrap();

        session.apply(Command::SwitchWindow { index: 0 }, now).unwrap();
        session.apply(Command::NextPage { count: 2 }, now).unwrap();
        assert_eq!(session.state(&first.id).unwrap().page_number(), 3);
        assert_eq!(session.state(&second.id).unwrap().page_number(), 1);
        assert_eq!(session.windows()[1].surface().page, Some(0));
    }
}
