use crate::surface::{NotificationHub, RenderingSurface, Subscription, SubscriptionId, SurfaceEvent};
use crate::LayoutMode;

/// Surface double. Programmatic setters notify like user input does; with
/// `notify_always` they notify even when nothing changed.
pub(crate) struct FakeSurface {
    pub page_count: Option<usize>,
    pub page: Option<usize>,
    pub scale: f32,
    pub fit: f32,
    pub mode: LayoutMode,
    pub notify_always: bool,
    pub scale_writes: Vec<f32>,
    pub page_writes: usize,
    pub hub: NotificationHub,
}

impl FakeSurface {
    pub fn new(page_count: usize, fit: f32) -> Self {
        Self {
            page_count: Some(page_count),
            page: Some(0),
            scale: fit,
            fit,
            mode: LayoutMode::SinglePage,
            notify_always: false,
            scale_writes: Vec::new(),
            page_writes: 0,
            hub: NotificationHub::new(),
        }
    }

    pub fn user_scroll_to(&mut self, index: usize) {
        self.page = Some(index);
        self.hub.emit(SurfaceEvent::PageChanged);
    }

    pub fn user_pinch(&mut self, scale: f32) {
        self.scale = scale;
        self.hub.emit(SurfaceEvent::ScaleChanged);
    }

    pub fn user_resize(&mut self, fit: f32) {
        self.fit = fit;
        self.hub.emit(SurfaceEvent::BoundsChanged);
    }

    pub fn user_set_mode(&mut self, mode: LayoutMode, fit: f32) {
        self.mode = mode;
        self.fit = fit;
        self.hub.emit(SurfaceEvent::DisplayModeChanged);
    }
}

impl RenderingSurface for FakeSurface {
    type Document = usize;

    fn set_document(&mut self, document: Option<usize>) {
        self.page_count = document;
        self.page = document.map(|_| 0);
        self.hub.emit(SurfaceEvent::PageChanged);
    }

    fn page_count(&self) -> Option<usize> {
        self.page_count
    }

    fn current_page_index(&self) -> Option<usize> {
        self.page
    }

    fn go_to(&mut self, page_index: usize) {
        self.page_writes += 1;
        let changed = self.page != Some(page_index);
        self.page = Some(page_index);
        if changed || self.notify_always {
            self.hub.emit(SurfaceEvent::PageChanged);
        }
    }

    fn scale_factor(&self) -> f32 {
        self.scale
    }

    fn set_scale_factor(&mut self, scale: f32) {
        self.scale_writes.push(scale);
        let changed = self.scale != scale;
        self.scale = scale;
        if changed || self.notify_always {
            self.hub.emit(SurfaceEvent::ScaleChanged);
        }
    }

    fn fit_to_window_scale_factor(&self) -> f32 {
        self.fit
    }

    fn display_mode(&self) -> LayoutMode {
        self.mode
    }

    fn set_display_mode(&mut self, mode: LayoutMode) {
        let changed = self.mode != mode;
        self.mode = mode;
        if changed || self.notify_always {
            self.hub.emit(SurfaceEvent::DisplayModeChanged);
        }
    }

    fn subscribe(&mut self) -> Subscription {
        self.hub.subscribe()
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        self.hub.unsubscribe(id);
    }
}
