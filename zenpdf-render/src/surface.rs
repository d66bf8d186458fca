use std::sync::Arc;

use anyhow::{anyhow, Result};
use image::{imageops, Rgba, RgbaImage};
use tracing::{debug, trace};
use zenpdf_core::{
    DocumentBackend, LayoutMode, NotificationHub, PageSize, RenderImage, RenderRequest,
    RenderingSurface, Subscription, SubscriptionId, SurfaceEvent,
};

/// Gap between pages of a spread and between stacked spreads, in pixels.
const PAGE_GAP: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Page view drawn into a terminal image.
///
/// Holds the current page, the absolute scale (pixels per PDF point) and the
/// display mode, and notifies subscribers whenever one of them or the
/// viewport changes, whether through the [`RenderingSurface`] setters or
/// through the user-facing methods below.
pub struct PageSurface {
    document: Option<Arc<dyn DocumentBackend>>,
    page_index: Option<usize>,
    scale: f32,
    mode: LayoutMode,
    viewport: Option<Viewport>,
    hub: NotificationHub,
}

impl Default for PageSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl PageSurface {
    pub fn new() -> Self {
        Self {
            document: None,
            page_index: None,
            scale: 1.0,
            mode: LayoutMode::default(),
            viewport: None,
            hub: NotificationHub::new(),
        }
    }

    pub fn with_document(document: Arc<dyn DocumentBackend>) -> Self {
        let mut surface = Self::new();
        surface.set_document(Some(document));
        surface
    }

    pub fn document(&self) -> Option<&Arc<dyn DocumentBackend>> {
        self.document.as_ref()
    }

    pub fn viewport(&self) -> Option<Viewport> {
        self.viewport
    }

    /// Scrolls by `delta` spreads, the way a wheel or swipe would.
    pub fn scroll_pages(&mut self, delta: isize) -> bool {
        let (Some(current), Some(count)) = (self.page_index, self.page_count()) else {
            return false;
        };
        let step = self.mode.page_step() as isize;
        let target = (current as isize + delta * step).clamp(0, count as isize - 1) as usize;
        let target = self.spread_start(target);
        if target == current {
            return false;
        }
        self.page_index = Some(target);
        self.hub.emit(SurfaceEvent::PageChanged);
        true
    }

    /// Magnification gesture. The new scale is published like any other
    /// scale change.
    pub fn pinch(&mut self, factor: f32) {
        if !factor.is_finite() || factor <= 0.0 {
            return;
        }
        self.scale *= factor;
        trace!(scale = self.scale, "pinch");
        self.hub.emit(SurfaceEvent::ScaleChanged);
    }

    pub fn resize(&mut self, viewport: Viewport) {
        if self.viewport == Some(viewport) {
            return;
        }
        debug!(width = viewport.width, height = viewport.height, "viewport resized");
        self.viewport = Some(viewport);
        self.hub.emit(SurfaceEvent::BoundsChanged);
    }

    /// Switches to the next display mode from the surface's own controls.
    pub fn cycle_display_mode(&mut self) -> LayoutMode {
        let next = self.mode.next();
        self.set_display_mode(next);
        next
    }

    /// Pages drawn for the current position, grouped into spreads.
    pub fn visible_pages(&self) -> Vec<Vec<usize>> {
        let (Some(current), Some(count)) = (self.page_index, self.page_count()) else {
            return Vec::new();
        };
        let spread = |start: usize| -> Vec<usize> {
            (start..count).take(self.mode.page_step()).collect()
        };
        let start = self.spread_start(current);
        let mut spreads = vec![spread(start)];
        if self.mode.is_continuous() {
            let next = start + self.mode.page_step();
            if next < count {
                spreads.push(spread(next));
            }
        }
        spreads
    }

    /// Renders the visible spreads at the current scale, cropped to the
    /// viewport. `None` when there is nothing to draw.
    pub fn render(&self) -> Result<Option<RenderImage>> {
        let Some(document) = self.document.as_ref() else {
            return Ok(None);
        };
        let spreads = self.visible_pages();
        if spreads.is_empty() || !(self.scale > 0.0) {
            return Ok(None);
        }

        let mut rows = Vec::with_capacity(spreads.len());
        for spread in spreads {
            let mut pages = Vec::with_capacity(spread.len());
            for page_index in spread {
                let image = document.render_page(RenderRequest {
                    page_index,
                    scale: self.scale,
                })?;
                pages.push(to_rgba(image)?);
            }
            rows.push(join(pages, Axis::Horizontal));
        }
        let mut canvas = join(rows, Axis::Vertical);

        if let Some(viewport) = self.viewport.filter(|viewport| !viewport.is_empty()) {
            canvas = crop_to_viewport(canvas, viewport);
        }

        let (width, height) = canvas.dimensions();
        Ok(Some(RenderImage {
            width,
            height,
            pixels: canvas.into_raw(),
        }))
    }

    fn spread_start(&self, index: usize) -> usize {
        if self.mode.is_two_up() {
            index - index % 2
        } else {
            index
        }
    }

    /// Size of the current spread in points.
    fn spread_size(&self) -> Option<PageSize> {
        let document = self.document.as_ref()?;
        let current = self.spread_start(self.page_index?);
        let mut width = 0.0f32;
        let mut height = 0.0f32;
        let mut pages = 0;
        for index in (current..document.info().page_count).take(self.mode.page_step()) {
            let size = document.page_size(index)?;
            width += size.width;
            height = height.max(size.height);
            pages += 1;
        }
        if pages == 0 {
            return None;
        }
        let size = PageSize::new(width, height);
        (!size.is_empty()).then_some(size)
    }
}

impl RenderingSurface for PageSurface {
    type Document = Arc<dyn DocumentBackend>;

    fn set_document(&mut self, document: Option<Self::Document>) {
        self.page_index = document
            .as_ref()
            .filter(|document| document.info().page_count > 0)
            .map(|_| 0);
        self.document = document;
        self.hub.emit(SurfaceEvent::PageChanged);
        self.hub.emit(SurfaceEvent::BoundsChanged);
    }

    fn page_count(&self) -> Option<usize> {
        self.document
            .as_ref()
            .map(|document| document.info().page_count)
    }

    fn current_page_index(&self) -> Option<usize> {
        self.page_index
    }

    fn go_to(&mut self, page_index: usize) {
        let Some(count) = self.page_count().filter(|count| *count > 0) else {
            return;
        };
        let target = page_index.min(count - 1);
        if self.page_index != Some(target) {
            self.page_index = Some(target);
            self.hub.emit(SurfaceEvent::PageChanged);
        }
    }

    fn scale_factor(&self) -> f32 {
        self.scale
    }

    fn set_scale_factor(&mut self, scale: f32) {
        if scale != self.scale {
            self.scale = scale;
            self.hub.emit(SurfaceEvent::ScaleChanged);
        }
    }

    fn fit_to_window_scale_factor(&self) -> f32 {
        let (Some(viewport), Some(spread)) = (self.viewport, self.spread_size()) else {
            return 0.0;
        };
        if viewport.is_empty() {
            return 0.0;
        }
        (viewport.width as f32 / spread.width).min(viewport.height as f32 / spread.height)
    }

    fn display_mode(&self) -> LayoutMode {
        self.mode
    }

    fn set_display_mode(&mut self, mode: LayoutMode) {
        if mode != self.mode {
            self.mode = mode;
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

#[derive(Clone, Copy)]
enum Axis {
    Horizontal,
    Vertical,
}

fn to_rgba(image: RenderImage) -> Result<RgbaImage> {
    let (width, height) = (image.width, image.height);
    RgbaImage::from_raw(width, height, image.pixels)
        .ok_or_else(|| anyhow!("page bitmap does not match its size {}x{}", width, height))
}

/// Keeps the top of the canvas and its horizontal centre when it is larger
/// than the viewport, so a zoomed page is magnified rather than squeezed.
fn crop_to_viewport(canvas: RgbaImage, viewport: Viewport) -> RgbaImage {
    let (width, height) = canvas.dimensions();
    if width <= viewport.width && height <= viewport.height {
        return canvas;
    }
    let crop_width = width.min(viewport.width);
    let crop_height = height.min(viewport.height);
    let x = (width - crop_width) / 2;
    imageops::crop_imm(&canvas, x, 0, crop_width, crop_height).to_image()
}

fn join(images: Vec<RgbaImage>, axis: Axis) -> RgbaImage {
    if images.len() == 1 {
        if let Some(image) = images.into_iter().next() {
            return image;
        }
        return RgbaImage::new(1, 1);
    }
    let gaps = PAGE_GAP * images.len().saturating_sub(1) as u32;
    let (width, height) = match axis {
        Axis::Horizontal => (
            images.iter().map(RgbaImage::width).sum::<u32>() + gaps,
            images.iter().map(RgbaImage::height).max().unwrap_or(1),
        ),
        Axis::Vertical => (
            images.iter().map(RgbaImage::width).max().unwrap_or(1),
            images.iter().map(RgbaImage::height).sum::<u32>() + gaps,
        ),
    };
    let mut canvas = RgbaImage::from_pixel(width.max(1), height.max(1), Rgba([255, 255, 255, 255]));
    let mut offset = 0i64;
    for image in &images {
        match axis {
            Axis::Horizontal => {
                imageops::overlay(&mut canvas, image, offset, 0);
                offset += i64::from(image.width() + PAGE_GAP);
            }
            Axis::Vertical => {
                imageops::overlay(&mut canvas, image, 0, offset);
                offset += i64::from(image.height() + PAGE_GAP);
            }
        }
    }
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use zenpdf_core::{DocumentInfo, DocumentMetadata, NavigationState, ViewSyncCoordinator};

    /// US letter pages rendered as solid grey bitmaps.
    struct FakeBackend {
        info: DocumentInfo,
    }

    impl FakeBackend {
        fn new(page_count: usize) -> Arc<dyn DocumentBackend> {
            Arc::new(Self {
                info: DocumentInfo {
                    id: uuid::Uuid::new_v4(),
                    path: None,
                    page_count,
                    metadata: DocumentMetadata::default(),
                },
            })
        }
    }

    impl DocumentBackend for FakeBackend {
        fn info(&self) -> &DocumentInfo {
            &self.info
        }

        fn page_size(&self, page_index: usize) -> Option<PageSize> {
            (page_index < self.info.page_count).then(|| PageSize::new(612.0, 792.0))
        }

        fn render_page(&self, request: RenderRequest) -> Result<RenderImage> {
            let width = (612.0 * request.scale).round() as u32;
            let height = (792.0 * request.scale).round() as u32;
            Ok(RenderImage {
                width,
                height,
                pixels: vec![128; (width * height * 4) as usize],
            })
        }
    }

    fn drain(subscription: &Subscription) -> Vec<SurfaceEvent> {
        std::iter::from_fn(|| subscription.pop()).collect()
    }

    #[test]
    fn fit_scale_needs_document_and_viewport() {
        let mut surface = PageSurface::new();
        assert_eq!(surface.fit_to_window_scale_factor(), 0.0);

        surface.set_document(Some(FakeBackend::new(4)));
        assert_eq!(surface.fit_to_window_scale_factor(), 0.0);

        surface.resize(Viewport::new(612, 396));
        assert!((surface.fit_to_window_scale_factor() - 0.5).abs() < 1e-6);

        surface.set_display_mode(LayoutMode::TwoUp);
        surface.resize(Viewport::new(1224, 1584));
        assert!((surface.fit_to_window_scale_factor() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn setters_notify_only_on_change() {
        let mut surface = PageSurface::with_document(FakeBackend::new(10));
        let subscription = surface.subscribe();

        surface.go_to(3);
        surface.go_to(3);
        surface.set_scale_factor(2.0);
        surface.set_scale_factor(2.0);
        surface.set_display_mode(LayoutMode::SinglePage);
        surface.go_to(99);
        assert_eq!(surface.current_page_index(), Some(9));
        assert_eq!(
            drain(&subscription),
            vec![
                SurfaceEvent::PageChanged,
                SurfaceEvent::ScaleChanged,
                SurfaceEvent::PageChanged
            ]
        );
    }

    #[test]
    fn scrolling_moves_by_spread_and_clamps() {
        let mut surface = PageSurface::with_document(FakeBackend::new(7));
        let subscription = surface.subscribe();
        surface.set_display_mode(LayoutMode::TwoUp);
        drain(&subscription);

        assert!(surface.scroll_pages(1));
        assert_eq!(surface.current_page_index(), Some(2));
        assert!(surface.scroll_pages(10));
        assert_eq!(surface.current_page_index(), Some(6));
        assert!(!surface.scroll_pages(1));
        assert!(surface.scroll_pages(-1));
        assert_eq!(surface.current_page_index(), Some(4));
        assert_eq!(drain(&subscription).len(), 3);
        assert_eq!(surface.visible_pages(), vec![vec![4, 5]]);
    }

    #[test]
    fn replacing_the_document_resets_position() {
        let mut surface = PageSurface::with_document(FakeBackend::new(10));
        surface.go_to(8);
        let subscription = surface.subscribe();

        surface.set_document(Some(FakeBackend::new(2)));
        assert_eq!(surface.page_count(), Some(2));
        assert_eq!(surface.current_page_index(), Some(0));
        assert!(drain(&subscription).contains(&SurfaceEvent::PageChanged));

        surface.set_document(None);
        assert_eq!(surface.page_count(), None);
        assert_eq!(surface.current_page_index(), None);
        assert!(surface.render().unwrap().is_none());
    }

    #[test]
    fn two_up_render_places_pages_side_by_side() {
        let mut surface = PageSurface::with_document(FakeBackend::new(3));
        surface.set_scale_factor(0.5);
        surface.set_display_mode(LayoutMode::TwoUp);

        let image = surface.render().unwrap().unwrap();
        assert_eq!(image.width, 306 * 2 + PAGE_GAP);
        assert_eq!(image.height, 396);

        surface.go_to(2);
        let image = surface.render().unwrap().unwrap();
        assert_eq!(image.width, 306);
    }

    #[test]
    fn continuous_render_is_cropped_to_viewport() {
        let mut surface = PageSurface::with_document(FakeBackend::new(3));
        surface.set_display_mode(LayoutMode::SinglePageContinuous);
        surface.set_scale_factor(0.5);
        surface.resize(Viewport::new(400, 600));
        assert_eq!(surface.visible_pages(), vec![vec![0], vec![1]]);

        let image = surface.render().unwrap().unwrap();
        assert_eq!((image.width, image.height), (306, 600));
        assert_eq!(image.pixels.len(), 306 * 600 * 4);
    }

    #[test]
    fn zoomed_render_is_cropped_to_viewport_width() {
        let backend = FakeBackend::new(2);
        let mut surface = PageSurface::with_document(Arc::clone(&backend));
        surface.resize(Viewport::new(612, 792));
        let mut state = NavigationState::new(backend.info().id, 2, LayoutMode::SinglePage);
        state.set_zoom(2.0);

        let mut coordinator = ViewSyncCoordinator::new();
        coordinator.attach(&mut surface, &state);
        coordinator.apply_state_to_view(&mut surface, &state);
        assert!((surface.scale_factor() - 2.0).abs() < 1e-6);

        let image = surface.render().unwrap().unwrap();
        assert!(image.width <= 612);
        assert_eq!((image.width, image.height), (612, 792));
        assert_eq!(image.pixels.len(), 612 * 792 * 4);
    }

    #[test]
    fn coordinator_restores_zoom_after_display_mode_cycle() {
        let backend = FakeBackend::new(6);
        let mut surface = PageSurface::with_document(Arc::clone(&backend));
        surface.resize(Viewport::new(612, 792));
        let mut state = NavigationState::new(backend.info().id, 6, LayoutMode::SinglePage);
        state.set_zoom(1.5);

        let mut coordinator = ViewSyncCoordinator::new();
        coordinator.attach(&mut surface, &state);
        coordinator.apply_state_to_view(&mut surface, &state);
        assert!((surface.scale_factor() - 1.5).abs() < 1e-6);

        surface.cycle_display_mode();
        surface.cycle_display_mode();
        surface.pinch(1.7);
        coordinator.pump(&mut surface, &mut state);

        assert_eq!(state.layout_mode(), LayoutMode::TwoUp);
        assert_eq!(state.zoom_level(), 1.5);
        // two letter pages side by side halve the fit-to-window scale
        assert!((surface.scale_factor() - 0.75).abs() < 1e-6);
    }
}
