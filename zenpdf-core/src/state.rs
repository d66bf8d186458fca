use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::DocumentId;

pub const MIN_ZOOM: f32 = 0.5;
pub const MAX_ZOOM: f32 = 2.0;
pub const ZOOM_STEP: f32 = 0.05;
pub const DEFAULT_ZOOM: f32 = 1.0;

/// Version written into persisted records. Version 1 records predate
/// `layout_mode` and load as [`LayoutMode::SinglePage`].
pub const STATE_FORMAT_VERSION: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutMode {
    #[default]
    SinglePage,
    SinglePageContinuous,
    TwoUp,
    TwoUpContinuous,
}

impl LayoutMode {
    pub const ALL: [LayoutMode; 4] = [
        LayoutMode::SinglePage,
        LayoutMode::SinglePageContinuous,
        LayoutMode::TwoUp,
        LayoutMode::TwoUpContinuous,
    ];

    pub fn is_two_up(self) -> bool {
        matches!(self, LayoutMode::TwoUp | LayoutMode::TwoUpContinuous)
    }

    pub fn is_continuous(self) -> bool {
        matches!(
            self,
            LayoutMode::SinglePageContinuous | LayoutMode::TwoUpContinuous
        )
    }

    /// Number of pages a single navigation step moves.
    pub fn page_step(self) -> usize {
        if self.is_two_up() {
            2
        } else {
            1
        }
    }

    pub fn next(self) -> Self {
        let index = Self::ALL.iter().position(|mode| *mode == self).unwrap_or(0);
        Self::ALL[(index + 1) % Self::ALL.len()]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LayoutMode::SinglePage => "single",
            LayoutMode::SinglePageContinuous => "single-continuous",
            LayoutMode::TwoUp => "two-up",
            LayoutMode::TwoUpContinuous => "two-up-continuous",
        }
    }
}

impl fmt::Display for LayoutMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("unknown layout mode `{0}` (expected single, single-continuous, two-up or two-up-continuous)")]
pub struct ParseLayoutModeError(String);

impl FromStr for LayoutMode {
    type Err = ParseLayoutModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "single" | "single-page" => Ok(LayoutMode::SinglePage),
            "single-continuous" | "single-page-continuous" => {
                Ok(LayoutMode::SinglePageContinuous)
            }
            "two-up" => Ok(LayoutMode::TwoUp),
            "two-up-continuous" => Ok(LayoutMode::TwoUpContinuous),
            _ => Err(ParseLayoutModeError(s.to_owned())),
        }
    }
}

/// Invariant violations found in a deserialized record.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateError {
    #[error("document {id} has no pages")]
    NoPages { id: DocumentId },
    #[error("page {page} of document {id} is outside 1..={total_pages}")]
    PageOutOfRange {
        id: DocumentId,
        page: usize,
        total_pages: usize,
    },
    #[error("zoom level {zoom} of document {id} is out of range")]
    ZoomOutOfRange { id: DocumentId, zoom: f32 },
}

fn format_v1() -> u32 {
    1
}

/// Persisted navigation record of one document.
///
/// Fields are private: every mutation goes through the bounded operations
/// below so `1 <= page_number <= total_pages` and
/// `MIN_ZOOM <= zoom_level <= MAX_ZOOM` always hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationState {
    #[serde(default = "format_v1")]
    version: u32,
    document_id: DocumentId,
    zoom_level: f32,
    page_number: usize,
    total_pages: usize,
    #[serde(default)]
    layout_mode: LayoutMode,
}

impl NavigationState {
    pub fn new(document_id: DocumentId, total_pages: usize, layout_mode: LayoutMode) -> Self {
        Self {
            version: STATE_FORMAT_VERSION,
            document_id,
            zoom_level: DEFAULT_ZOOM,
            page_number: 1,
            total_pages: total_pages.max(1),
            layout_mode,
        }
    }

    pub fn document_id(&self) -> DocumentId {
        self.document_id
    }

    pub fn zoom_level(&self) -> f32 {
        self.zoom_level
    }

    pub fn page_number(&self) -> usize {
        self.page_number
    }

    pub fn total_pages(&self) -> usize {
        self.total_pages
    }

    pub fn layout_mode(&self) -> LayoutMode {
        self.layout_mode
    }

    pub fn zoom_in(&mut self) {
        self.zoom_level = (self.zoom_level + ZOOM_STEP).min(MAX_ZOOM);
    }

    pub fn zoom_out(&mut self) {
        self.zoom_level = (self.zoom_level - ZOOM_STEP).max(MIN_ZOOM);
    }

    pub fn reset_zoom(&mut self) {
        self.zoom_level = DEFAULT_ZOOM;
    }

    /// Assigns `zoom` when it is within bounds. Out-of-range values are
    /// dropped; unlike [`zoom_in`](Self::zoom_in) nothing is clamped.
    pub fn set_zoom(&mut self, zoom: f32) -> bool {
        if !Self::is_valid_zoom(zoom) {
            return false;
        }
        self.zoom_level = zoom;
        true
    }

    pub fn next_page(&mut self) {
        self.advance(1);
    }

    pub fn prev_page(&mut self) {
        self.retreat(1);
    }

    /// `count` forward steps at once, stopping at the last page.
    pub fn advance(&mut self, count: usize) {
        let distance = count.saturating_mul(self.layout_mode.page_step());
        self.page_number = self
            .page_number
            .saturating_add(distance)
            .min(self.total_pages);
    }

    /// `count` backward steps at once, stopping at the first page.
    pub fn retreat(&mut self, count: usize) {
        let distance = count.saturating_mul(self.layout_mode.page_step());
        self.page_number = self.page_number.saturating_sub(distance).max(1);
    }

    pub fn go_to_page(&mut self, page: usize) -> bool {
        if !self.is_valid_page(page) {
            return false;
        }
        self.page_number = page;
        true
    }

    pub fn set_layout_mode(&mut self, mode: LayoutMode) {
        self.layout_mode = mode;
    }

    pub fn is_valid_page(&self, page: usize) -> bool {
        (1..=self.total_pages).contains(&page)
    }

    pub fn is_valid_zoom(zoom: f32) -> bool {
        (MIN_ZOOM..=MAX_ZOOM).contains(&zoom)
    }

    /// Checks a record read back from storage.
    pub fn validate(&self) -> Result<(), StateError> {
        if self.total_pages == 0 {
            return Err(StateError::NoPages {
                id: self.document_id,
            });
        }
        if !self.is_valid_page(self.page_number) {
            return Err(StateError::PageOutOfRange {
                id: self.document_id,
                page: self.page_number,
                total_pages: self.total_pages,
            });
        }
        if !Self::is_valid_zoom(self.zoom_level) {
            return Err(StateError::ZoomOutOfRange {
                id: self.document_id,
                zoom: self.zoom_level,
            });
        }
        Ok(())
    }

    /// Brings an older record up to the current format.
    pub(crate) fn upgrade(mut self) -> Self {
        self.version = STATE_FORMAT_VERSION;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn state(total_pages: usize) -> NavigationState {
        NavigationState::new(Uuid::new_v4(), total_pages, LayoutMode::SinglePage)
    }

    #[test]
    fn new_state_starts_on_first_page_fit_to_window() {
        let state = state(10);
        assert_eq!(state.page_number(), 1);
        assert_eq!(state.zoom_level(), 1.0);
        assert_eq!(state.total_pages(), 10);
        assert_eq!(state.layout_mode(), LayoutMode::SinglePage);
    }

    #[test]
    fn empty_document_still_has_one_page() {
        let state = state(0);
        assert_eq!(state.total_pages(), 1);
        assert!(state.validate().is_ok());
    }

    #[test]
    fn go_to_page_only_accepts_pages_in_range() {
        let mut state = state(5);
        for page in 0..=7 {
            let before = state.page_number();
            let applied = state.go_to_page(page);
            if (1..=5).contains(&page) {
                assert!(applied);
                assert_eq!(state.page_number(), page);
            } else {
                assert!(!applied);
                assert_eq!(state.page_number(), before);
            }
        }
    }

    #[test]
    fn next_page_stops_at_last_page() {
        let mut state = state(10);
        for _ in 0..9 {
            state.next_page();
        }
        assert_eq!(state.page_number(), 10);
        state.next_page();
        assert_eq!(state.page_number(), 10);
    }

    #[test]
    fn prev_page_stops_at_first_page() {
        let mut state = state(3);
        state.prev_page();
        assert_eq!(state.page_number(), 1);
        state.go_to_page(3);
        state.prev_page();
        assert_eq!(state.page_number(), 2);
    }

    #[test]
    fn two_up_modes_step_by_two() {
        let mut state = state(10);
        state.set_layout_mode(LayoutMode::TwoUpContinuous);
        state.go_to_page(3);
        state.next_page();
        assert_eq!(state.page_number(), 5);
        state.go_to_page(10);
        state.next_page();
        assert_eq!(state.page_number(), 10);
        state.go_to_page(2);
        state.prev_page();
        assert_eq!(state.page_number(), 1);
    }

    #[test]
    fn multi_step_moves_clamp_without_overflow() {
        let mut state = state(10);
        state.advance(3);
        assert_eq!(state.page_number(), 4);
        state.advance(usize::MAX);
        assert_eq!(state.page_number(), 10);
        state.retreat(2);
        assert_eq!(state.page_number(), 8);

        state.set_layout_mode(LayoutMode::TwoUp);
        state.retreat(usize::MAX);
        assert_eq!(state.page_number(), 1);
        state.advance(2);
        assert_eq!(state.page_number(), 5);
    }

    #[test]
    fn layout_change_keeps_current_page() {
        let mut state = state(10);
        state.go_to_page(4);
        state.set_layout_mode(LayoutMode::TwoUp);
        assert_eq!(state.page_number(), 4);
    }

    #[test]
    fn zoom_stepping_clamps_to_bounds() {
        let mut state = state(1);
        let script = [true, true, false, true, true, true, true, true, true, true];
        for _ in 0..10 {
            for &zoom_in in &script {
                if zoom_in {
                    state.zoom_in();
                } else {
                    state.zoom_out();
                }
                assert!(NavigationState::is_valid_zoom(state.zoom_level()));
            }
        }
        assert_eq!(state.zoom_level(), MAX_ZOOM);

        for _ in 0..100 {
            state.zoom_out();
            assert!(NavigationState::is_valid_zoom(state.zoom_level()));
        }
        assert_eq!(state.zoom_level(), MIN_ZOOM);

        state.reset_zoom();
        assert_eq!(state.zoom_level(), 1.0);
    }

    #[test]
    fn set_zoom_rejects_out_of_range_values() {
        let mut state = state(1);
        assert!(state.set_zoom(1.5));
        for value in [0.49, 2.01, -1.0, f32::NAN, f32::INFINITY] {
            assert!(!state.set_zoom(value));
            assert_eq!(state.zoom_level(), 1.5);
        }
        assert!(state.set_zoom(MIN_ZOOM));
        assert!(state.set_zoom(MAX_ZOOM));
    }

    #[test]
    fn layout_mode_parses_cli_spellings() {
        assert_eq!("two-up".parse::<LayoutMode>().unwrap(), LayoutMode::TwoUp);
        assert_eq!(
            "Single_Continuous".parse::<LayoutMode>().unwrap(),
            LayoutMode::SinglePageContinuous
        );
        assert!("spread".parse::<LayoutMode>().is_err());
        for mode in LayoutMode::ALL {
            assert_eq!(mode.as_str().parse::<LayoutMode>().unwrap(), mode);
        }
    }

    #[test]
    fn version_one_records_default_to_single_page() {
        let id = Uuid::new_v4();
        let json = format!(
            r#"{{"document_id":"{id}","zoom_level":1.25,"page_number":3,"total_pages":8}}"#
        );
        let state: NavigationState = serde_json::from_str(&json).unwrap();
        assert_eq!(state.layout_mode(), LayoutMode::SinglePage);
        assert_eq!(state.version, 1);
        assert_eq!(state.upgrade().version, STATE_FORMAT_VERSION);
    }

    #[test]
    fn validate_reports_corrupt_records() {
        let id = Uuid::new_v4();
        let json = format!(
            r#"{{"version":2,"document_id":"{id}","zoom_level":1.0,"page_number":9,"total_pages":8,"layout_mode":"two_up"}}"#
        );
        let state: NavigationState = serde_json::from_str(&json).unwrap();
        assert_eq!(
            state.validate(),
            Err(StateError::PageOutOfRange {
                id,
                page: 9,
                total_pages: 8
            })
        );

        let json = format!(
            r#"{{"version":2,"document_id":"{id}","zoom_level":7.0,"page_number":1,"total_pages":8}}"#
        );
        let state: NavigationState = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            state.validate(),
            Err(StateError::ZoomOutOfRange { .. })
        ));
    }
}
