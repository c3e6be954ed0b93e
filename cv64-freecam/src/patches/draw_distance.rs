use log::info;

use crate::addresses::*;
use crate::logging::{FailureLog, LogOnce};
use crate::memory::GuestBus;

pub const MAX_FOG_START: f32 = 30_000.0;
pub const MAX_FOG_END: f32 = 32_000.0;
pub const MIN_FOG_SPAN: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FogDistances {
    pub start: u16,
    pub end: u16,
}

/// Scale an area's fog baseline, keeping both planes inside what the RDP fog
/// range can represent and the far plane at least `MIN_FOG_SPAN` past the near one.
pub fn scaled_fog(baseline: FogDistances, multiplier: f32) -> FogDistances {
    let multiplier = if multiplier.is_finite() && multiplier > 0.0 { multiplier } else { 1.0 };
    let start = (baseline.start as f32 * multiplier).min(MAX_FOG_START);
    let end = (baseline.end as f32 * multiplier)
        .min(MAX_FOG_END)
        .max(start + MIN_FOG_SPAN);
    FogDistances {
        start: start.round() as u16,
        end: end.round() as u16,
    }
}

/// Rewrites the guest's fog planes every frame from a per-area baseline.
///
/// The game reloads its own fog values each frame, so the override has to be
/// reasserted continuously. The baseline is taken from the first frame after
/// an area change (or re-arm) where fog end reads non-zero, and kept until
/// the next area change even if the guest briefly reports zero.
#[derive(Debug, Default)]
pub struct DrawDistanceRescaler {
    area: Option<u16>,
    baseline: Option<FogDistances>,
    snapshot_logged: LogOnce,
}

impl DrawDistanceRescaler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn baseline(&self) -> Option<FogDistances> {
        self.baseline
    }

    /// Drop the baseline so the next non-zero observation is captured again.
    pub fn rearm(&mut self) {
        self.baseline = None;
        self.snapshot_logged.rearm();
    }

    pub fn apply<B: GuestBus + ?Sized>(
        &mut self,
        bus: &B,
        area: u16,
        multiplier: f32,
        failures: &mut FailureLog,
    ) -> Option<FogDistances> {
        if self.area != Some(area) {
            self.area = Some(area);
            self.rearm();
        }

        let start_addr = resolve_fixed(OFF_FOG_START);
        let end_addr = resolve_fixed(OFF_FOG_END);

        let baseline = match self.baseline {
            Some(baseline) => baseline,
            None => {
                let observed = bus
                    .read_u16(end_addr)
                    .and_then(|end| Ok(FogDistances { start: bus.read_u16(start_addr)?, end }));
                let observed = match observed {
                    Ok(fog) => fog,
                    Err(e) => {
                        failures.warn_once("FOG", "Draw distance", end_addr, e);
                        return None;
                    }
                };
                if observed.end == 0 {
                    return None;
                }
                self.baseline = Some(observed);
                if self.snapshot_logged.fire() {
                    info!(
                        "[FOG] Area {} baseline captured: start {}, end {}",
                        area, observed.start, observed.end
                    );
                }
                observed
            }
        };

        let scaled = scaled_fog(baseline, multiplier);
        let written = bus
            .write_u16(start_addr, scaled.start)
            .and_then(|()| bus.write_u16(end_addr, scaled.end));
        if let Err(e) = written {
            failures.warn_once("FOG", "Draw distance", start_addr, e);
            return None;
        }
        Some(scaled)
    }
}
