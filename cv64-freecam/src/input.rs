//! Values the input thread hands to the emulation thread.
//!
//! Everything here is written by input polling code and consumed once per
//! emulated frame, so each value is a single atomic. Fractional values are
//! stored as fixed point (x1000) the same way the mouse wheel delta is.

use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

use bitflags::bitflags;

const FIXED_POINT: f32 = 1000.0;

bitflags! {
    /// D-pad bits of the N64 controller button word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DPad: u16 {
        const RIGHT = 0x0100;
        const LEFT  = 0x0200;
        const DOWN  = 0x0400;
        const UP    = 0x0800;
    }
}

/// Remove D-pad left/right from a controller button word.
pub fn strip_horizontal(buttons: u16) -> u16 {
    buttons & !(DPad::LEFT | DPad::RIGHT).bits()
}

/// Radial deadzone: zero inside `deadzone`, rescaled to 0..1 outside it.
pub fn apply_radial_deadzone(x: f32, y: f32, deadzone: f32) -> (f32, f32) {
    let magnitude = (x * x + y * y).sqrt();
    if !magnitude.is_finite() || magnitude <= deadzone || deadzone >= 1.0 {
        return (0.0, 0.0);
    }
    let scaled = ((magnitude - deadzone) / (1.0 - deadzone)).min(1.0);
    (x / magnitude * scaled, y / magnitude * scaled)
}

pub struct SharedInput {
    yaw_offset_millideg: AtomicI32,
    zoom_multiplier_bits: AtomicU32,
    wheel_delta: AtomicI32,
}

impl Default for SharedInput {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedInput {
    pub fn new() -> Self {
        Self {
            yaw_offset_millideg: AtomicI32::new(0),
            zoom_multiplier_bits: AtomicU32::new(1.0f32.to_bits()),
            wheel_delta: AtomicI32::new(0),
        }
    }

    pub fn add_yaw_offset(&self, degrees: f32) {
        let delta = (degrees * FIXED_POINT) as i32;
        // Keep the accumulator inside one turn so it never saturates.
        let _ = self
            .yaw_offset_millideg
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some((current + delta).rem_euclid(360_000))
            });
    }

    /// Accumulated yaw offset in degrees, 0..360.
    pub fn yaw_offset(&self) -> f32 {
        self.yaw_offset_millideg.load(Ordering::Acquire) as f32 / FIXED_POINT
    }

    pub fn reset_yaw_offset(&self) {
        self.yaw_offset_millideg.store(0, Ordering::Release);
    }

    pub fn set_zoom_multiplier(&self, multiplier: f32) {
        let clamped = if multiplier.is_finite() { multiplier.clamp(0.25, 4.0) } else { 1.0 };
        self.zoom_multiplier_bits.store(clamped.to_bits(), Ordering::Release);
    }

    pub fn scale_zoom(&self, factor: f32) {
        self.set_zoom_multiplier(self.zoom_multiplier() * factor);
    }

    pub fn zoom_multiplier(&self) -> f32 {
        f32::from_bits(self.zoom_multiplier_bits.load(Ordering::Acquire))
    }

    /// Add wheel notches (positive zooms in).
    pub fn add_wheel_delta(&self, notches: f32) {
        self.wheel_delta
            .fetch_add((notches * FIXED_POINT) as i32, Ordering::AcqRel);
    }

    /// Take the accumulated wheel notches, leaving zero behind.
    pub fn take_wheel_delta(&self) -> f32 {
        self.wheel_delta.swap(0, Ordering::AcqRel) as f32 / FIXED_POINT
    }
}
