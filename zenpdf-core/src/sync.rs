//! Two-way synchronization between a [`NavigationState`] and the rendering
//! surface that displays it.
//!
//! State → view: [`ViewSyncCoordinator::apply_state_to_view`] pushes layout
//! mode, page and absolute scale. View → state: [`ViewSyncCoordinator::pump`]
//! consumes surface notifications. Only page and layout mode ever flow from the
//! view into the state. Scale notifications re-assert the state-derived scale
//! onto the surface, so a gesture zoom or a changing fit-to-window scale can
//! never start an oscillation.

use tracing::{debug, trace, warn};

use crate::scale::{self, ScaleConversion};
use crate::surface::{RenderingSurface, Subscription, SurfaceEvent};
use crate::{DocumentId, NavigationState};

/// Upper bound on notifications handled by one [`ViewSyncCoordinator::pump`].
const MAX_EVENTS_PER_PUMP: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    FromState,
    FromView,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPhase {
    #[default]
    Idle,
    Propagating(SyncDirection),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncProperty {
    Page,
    Scale,
    Layout,
}

impl SurfaceEvent {
    fn property(self) -> Option<SyncProperty> {
        match self {
            SurfaceEvent::PageChanged => Some(SyncProperty::Page),
            SurfaceEvent::ScaleChanged => Some(SyncProperty::Scale),
            SurfaceEvent::DisplayModeChanged => Some(SyncProperty::Layout),
            SurfaceEvent::BoundsChanged => None,
        }
    }
}

#[derive(Debug, Default)]
struct Phases {
    page: SyncPhase,
    scale: SyncPhase,
    layout: SyncPhase,
}

impl Phases {
    fn get(&self, property: SyncProperty) -> SyncPhase {
        match property {
            SyncProperty::Page => self.page,
            SyncProperty::Scale => self.scale,
            SyncProperty::Layout => self.layout,
        }
    }

    fn set(&mut self, property: SyncProperty, phase: SyncPhase) {
        match property {
            SyncProperty::Page => self.page = phase,
            SyncProperty::Scale => self.scale = phase,
            SyncProperty::Layout => self.layout = phase,
        }
    }

    fn is_echo(&self, event: SurfaceEvent) -> bool {
        event
            .property()
            .map(|property| {
                self.get(property) == SyncPhase::Propagating(SyncDirection::FromState)
            })
            .unwrap_or(false)
    }
}

/// What one coordinator call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncOutcome {
    /// The navigation state was mutated from the view.
    pub state_changed: bool,
    /// At least one value was written to the surface.
    pub view_updated: bool,
    /// A scale assertion is waiting for the surface layout to settle.
    pub scale_deferred: bool,
    /// Stale notifications that were discarded.
    pub dropped: usize,
}

impl SyncOutcome {
    fn merge(&mut self, other: SyncOutcome) {
        self.state_changed |= other.state_changed;
        self.view_updated |= other.view_updated;
        self.scale_deferred |= other.scale_deferred;
        self.dropped += other.dropped;
    }

    fn dropped() -> Self {
        Self {
            dropped: 1,
            ..Self::default()
        }
    }
}

#[derive(Debug)]
struct Attachment {
    subscription: Subscription,
    document_id: DocumentId,
}

/// Keeps one surface and one document state consistent.
///
/// The coordinator never owns the surface: it holds an [`Attachment`] (the
/// subscription plus the bound document) and borrows the surface for each
/// call. `attach` and `detach` are the only places the binding changes.
#[derive(Debug, Default)]
pub struct ViewSyncCoordinator {
    attachment: Option<Attachment>,
    phases: Phases,
    scale_pending: bool,
}

impl ViewSyncCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_attached(&self) -> bool {
        self.attachment.is_some()
    }

    pub fn attached_document(&self) -> Option<DocumentId> {
        self.attachment.as_ref().map(|attachment| attachment.document_id)
    }

    pub fn has_pending_scale(&self) -> bool {
        self.scale_pending
    }

    /// Binds to `surface` and `state`. An existing binding is released first,
    /// so attaching twice leaves exactly one subscription on the surface.
    pub fn attach<S: RenderingSurface>(&mut self, surface: &mut S, state: &NavigationState) {
        self.detach(surface);
        let subscription = surface.subscribe();
        debug!(
            document = %state.document_id(),
            subscription = ?subscription.id(),
            "attached view sync coordinator"
        );
        self.attachment = Some(Attachment {
            subscription,
            document_id: state.document_id(),
        });
        self.phases = Phases::default();
        self.scale_pending = false;
    }

    /// Unsubscribes from `surface`. Returns `false` when nothing was attached.
    pub fn detach<S: RenderingSurface>(&mut self, surface: &mut S) -> bool {
        let Some(attachment) = self.attachment.take() else {
            return false;
        };
        surface.unsubscribe(attachment.subscription.id());
        let dropped = attachment.subscription.clear();
        debug!(
            document = %attachment.document_id,
            dropped,
            "detached view sync coordinator"
        );
        self.scale_pending = false;
        true
    }

    /// Pushes layout mode, page and scale from `state` into `surface`.
    pub fn apply_state_to_view<S: RenderingSurface>(
        &mut self,
        surface: &mut S,
        state: &NavigationState,
    ) -> SyncOutcome {
        let mut outcome = SyncOutcome::default();
        if !self.bound_to(state) {
            return outcome;
        }

        let mode = state.layout_mode();
        if surface.display_mode() != mode {
            self.write(&[SyncProperty::Layout], surface, |surface| {
                surface.set_display_mode(mode)
            });
            outcome.view_updated = true;
        }

        if surface.page_count() == Some(state.total_pages()) {
            let target = state.page_number() - 1;
            if surface.current_page_index() != Some(target) {
                self.write(&[SyncProperty::Page], surface, |surface| surface.go_to(target));
                outcome.view_updated = true;
            }
        } else {
            debug!(
                document = %state.document_id(),
                surface_pages = ?surface.page_count(),
                total_pages = state.total_pages(),
                "surface shows another document, page not applied"
            );
        }

        outcome.merge(self.assert_scale(surface, state));
        outcome
    }

    /// Handles every queued surface notification.
    pub fn pump<S: RenderingSurface>(
        &mut self,
        surface: &mut S,
        state: &mut NavigationState,
    ) -> SyncOutcome {
        let mut outcome = SyncOutcome::default();
        let Some(attachment) = self.attachment.as_ref() else {
            return outcome;
        };
        if attachment.document_id != state.document_id() {
            outcome.dropped = attachment.subscription.clear();
            warn!(
                attached = %attachment.document_id,
                document = %state.document_id(),
                dropped = outcome.dropped,
                "notifications for a different document dropped"
            );
            return outcome;
        }

        for _ in 0..MAX_EVENTS_PER_PUMP {
            let Some(event) = self.next_event() else {
                return outcome;
            };
            trace!(?event, "surface notification");
            let step = match event {
                SurfaceEvent::PageChanged => self.on_page_changed(surface, state),
                SurfaceEvent::ScaleChanged | SurfaceEvent::BoundsChanged => {
                    self.assert_scale(surface, state)
                }
                SurfaceEvent::DisplayModeChanged => self.on_display_mode_changed(surface, state),
            };
            outcome.merge(step);
        }

        if let Some(attachment) = self.attachment.as_ref() {
            let dropped = attachment.subscription.clear();
            if dropped > 0 {
                warn!(dropped, "surface kept notifying, remaining events dropped");
                outcome.dropped += dropped;
            }
        }
        outcome
    }

    /// Layout/frame tick: retries a scale assertion deferred because the
    /// fit-to-window scale was not available yet.
    pub fn on_frame<S: RenderingSurface>(
        &mut self,
        surface: &mut S,
        state: &NavigationState,
    ) -> SyncOutcome {
        if !self.scale_pending || !self.bound_to(state) {
            return SyncOutcome::default();
        }
        self.assert_scale(surface, state)
    }

    fn bound_to(&self, state: &NavigationState) -> bool {
        match self.attachment.as_ref() {
            Some(attachment) if attachment.document_id == state.document_id() => true,
            Some(attachment) => {
                warn!(
                    attached = %attachment.document_id,
                    document = %state.document_id(),
                    "coordinator is bound to another document"
                );
                false
            }
            None => {
                debug!("coordinator is detached");
                false
            }
        }
    }

    fn next_event(&self) -> Option<SurfaceEvent> {
        self.attachment
            .as_ref()
            .and_then(|attachment| attachment.subscription.pop())
    }

    /// Writes to the surface with `properties` tagged as propagating from the
    /// state. Notifications the write produced for those properties are
    /// removed; anything else it produced stays queued.
    fn write<S, F>(&mut self, properties: &[SyncProperty], surface: &mut S, write: F)
    where
        S: RenderingSurface,
        F: FnOnce(&mut S),
    {
        let mark = self
            .attachment
            .as_ref()
            .map(|attachment| attachment.subscription.len())
            .unwrap_or(0);
        for property in properties {
            self.phases
                .set(*property, SyncPhase::Propagating(SyncDirection::FromState));
        }

        write(surface);

        if let Some(attachment) = self.attachment.as_ref() {
            for event in attachment.subscription.take_since(mark) {
                if self.phases.is_echo(event) {
                    trace!(?event, "echo suppressed");
                } else {
                    attachment.subscription.push_back(event);
                }
            }
        }
        for property in properties {
            self.phases.set(*property, SyncPhase::Idle);
        }
    }

    fn assert_scale<S: RenderingSurface>(
        &mut self,
        surface: &mut S,
        state: &NavigationState,
    ) -> SyncOutcome {
        let mut outcome = SyncOutcome::default();
        let fit = surface.fit_to_window_scale_factor();
        match scale::to_absolute(state.zoom_level(), fit) {
            ScaleConversion::Deferred => {
                debug!(fit, "fit-to-window scale unavailable, scale deferred");
                self.scale_pending = true;
                outcome.scale_deferred = true;
            }
            ScaleConversion::Ready(absolute) => {
                self.scale_pending = false;
                if !same_scale(surface.scale_factor(), absolute) {
                    self.write(&[SyncProperty::Scale], surface, |surface| {
                        surface.set_scale_factor(absolute)
                    });
                    outcome.view_updated = true;
                }
            }
        }
        outcome
    }

    fn on_page_changed<S: RenderingSurface>(
        &mut self,
        surface: &S,
        state: &mut NavigationState,
    ) -> SyncOutcome {
        if surface.page_count() != Some(state.total_pages()) {
            debug!(
                surface_pages = ?surface.page_count(),
                total_pages = state.total_pages(),
                "page notification from another document dropped"
            );
            return SyncOutcome::dropped();
        }
        let Some(page) = surface.current_page_index().map(|index| index + 1) else {
            return SyncOutcome::dropped();
        };
        if !state.is_valid_page(page) {
            debug!(page, "page notification out of range dropped");
            return SyncOutcome::dropped();
        }
        if page == state.page_number() {
            return SyncOutcome::default();
        }

        self.phases.set(
            SyncProperty::Page,
            SyncPhase::Propagating(SyncDirection::FromView),
        );
        let applied = state.go_to_page(page);
        self.phases.set(SyncProperty::Page, SyncPhase::Idle);
        SyncOutcome {
            state_changed: applied,
            ..SyncOutcome::default()
        }
    }

    fn on_display_mode_changed<S: RenderingSurface>(
        &mut self,
        surface: &mut S,
        state: &mut NavigationState,
    ) -> SyncOutcome {
        let mut outcome = SyncOutcome::default();
        let mode = surface.display_mode();
        if mode != state.layout_mode() {
            self.phases.set(
                SyncProperty::Layout,
                SyncPhase::Propagating(SyncDirection::FromView),
            );
            state.set_layout_mode(mode);
            self.phases.set(SyncProperty::Layout, SyncPhase::Idle);
            outcome.state_changed = true;
        }
        // the spread width changed, so did the fit-to-window scale
        outcome.merge(self.assert_scale(surface, state));
        outcome
    }
}

fn same_scale(a: f32, b: f32) -> bool {
    (a - b).abs() <= f32::EPSILON * a.abs().max(b.abs()).max(1.0)
}
