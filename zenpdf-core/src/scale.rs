//! Conversion between the surface's absolute scale factor and the
//! window-independent zoom level stored in [`NavigationState`](crate::NavigationState).
//!
//! The fit-to-window scale reported by a surface is zero until its first
//! layout pass has run. Conversions against such a value return
//! [`ScaleConversion::Deferred`] so the caller retries on the next layout or
//! frame event instead of storing `NaN` or `inf`.

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScaleConversion {
    Ready(f32),
    Deferred,
}

impl ScaleConversion {
    pub fn ready(self) -> Option<f32> {
        match self {
            ScaleConversion::Ready(value) => Some(value),
            ScaleConversion::Deferred => None,
        }
    }

    pub fn is_deferred(self) -> bool {
        matches!(self, ScaleConversion::Deferred)
    }
}

fn usable(fit_to_window: f32) -> bool {
    fit_to_window.is_finite() && fit_to_window > 0.0
}

fn checked(value: f32) -> ScaleConversion {
    if value.is_finite() {
        ScaleConversion::Ready(value)
    } else {
        ScaleConversion::Deferred
    }
}

/// `zoom_level * fit_to_window`
pub fn to_absolute(zoom_level: f32, fit_to_window: f32) -> ScaleConversion {
    if !usable(fit_to_window) {
        return ScaleConversion::Deferred;
    }
    checked(zoom_level * fit_to_window)
}

/// `absolute / fit_to_window`
pub fn to_normalized(absolute: f32, fit_to_window: f32) -> ScaleConversion {
    if !usable(fit_to_window) {
        return ScaleConversion::Deferred;
    }
    checked(absolute / fit_to_window)
}
