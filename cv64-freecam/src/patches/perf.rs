//! Adaptive frame-budget tuning ("lag reduction").
//!
//! The game exposes two load meters (CPU and RDP share of the frame budget)
//! and reads a frame divisor plus a division count that control how much work
//! it spreads across frames. While enabled, the divisor ramps up under load
//! and eases back when there is headroom, bounded per area.

use log::info;

use crate::addresses::*;
use crate::logging::{FailureLog, LogOnce};
use crate::memory::GuestBus;

pub const DEFAULT_DIVISOR: f32 = 2.0;
const HIGH_LOAD: f32 = 0.85;
const LOW_LOAD: f32 = 0.60;
const RAMP_UP: f32 = 0.05;
const RAMP_DOWN: f32 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AreaProfile {
    pub baseline_divisor: f32,
    pub max_divisor: f32,
    pub division_count: u32,
}

const fn profile(baseline_divisor: f32, max_divisor: f32, division_count: u32) -> AreaProfile {
    AreaProfile {
        baseline_divisor,
        max_divisor,
        division_count,
    }
}

/// Indexed by map id.
pub const AREA_PROFILES: [AreaProfile; 0x1B] = [
    profile(1.5, 3.0, 3), // Forest of Silence
    profile(1.5, 2.5, 2), // Castle Wall (Towers)
    profile(1.5, 3.0, 3), // Castle Wall (Main)
    profile(1.5, 3.5, 3), // Villa (Yard)
    profile(1.0, 2.5, 2), // Villa (Foyer)
    profile(1.0, 2.5, 2), // Villa (Hallway)
    profile(2.0, 4.0, 4), // Villa (Maze Garden)
    profile(1.5, 3.0, 3), // Tunnel
    profile(1.5, 3.0, 3), // Underground Waterway
    profile(1.5, 3.5, 3), // Castle Center (Main)
    profile(1.0, 2.0, 2), // Castle Center (Bottom Elevator)
    profile(1.5, 3.0, 2), // Castle Center (Gears)
    profile(1.0, 2.0, 2), // Castle Center (Friendly Lizard-man)
    profile(1.0, 2.5, 2), // Castle Center (Library)
    profile(1.0, 2.5, 2), // Castle Center (Nitro Room)
    profile(1.0, 2.0, 2), // Castle Center (Top Elevator)
    profile(1.5, 3.0, 3), // Tower of Execution
    profile(1.5, 3.0, 3), // Tower of Sorcery
    profile(1.5, 3.0, 3), // Tower of Science
    profile(1.5, 3.0, 2), // Duel Tower
    profile(1.0, 2.5, 2), // Castle Keep Stairs
    profile(1.5, 3.0, 2), // Castle Keep
    profile(2.0, 2.0, 2), // Intro Cutscene
    profile(1.5, 3.0, 3), // Clock Tower
    profile(2.0, 3.5, 3), // Dracula's Desert
    profile(1.0, 2.5, 2), // Room of Clocks
    profile(1.0, 2.5, 2), // Villa (Crypt)
];

const FALLBACK_PROFILE: AreaProfile = profile(2.0, 3.0, 2);

pub fn profile_for(area: u16) -> AreaProfile {
    AREA_PROFILES.get(area as usize).copied().unwrap_or(FALLBACK_PROFILE)
}

/// What one tuning step did, for callers that want to surface it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TuneOutcome {
    pub divisor: f32,
    pub total_load: f32,
    pub area_changed: bool,
    pub logged: bool,
}

#[derive(Debug)]
pub struct FrameBudgetTuner {
    divisor: f32,
    area: Option<u16>,
    area_logged: LogOnce,
    ceiling_logged: LogOnce,
}

impl Default for FrameBudgetTuner {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBudgetTuner {
    pub fn new() -> Self {
        Self {
            divisor: DEFAULT_DIVISOR,
            area: None,
            area_logged: LogOnce::new(),
            ceiling_logged: LogOnce::new(),
        }
    }

    pub fn divisor(&self) -> f32 {
        self.divisor
    }

    /// Forget the current area so the next apply starts from the default divisor.
    pub fn reset(&mut self) {
        self.area = None;
        self.divisor = DEFAULT_DIVISOR;
        self.area_logged.rearm();
        self.ceiling_logged.rearm();
    }

    pub fn apply<B: GuestBus + ?Sized>(
        &mut self,
        bus: &B,
        area: u16,
        failures: &mut FailureLog,
    ) -> Option<TuneOutcome> {
        let area_changed = self.area != Some(area);
        if area_changed {
            self.reset();
            self.area = Some(area);
        }
        let profile = profile_for(area);

        let cpu_addr = resolve_fixed(OFF_PERF_METER_CPU);
        let gfx_addr = resolve_fixed(OFF_PERF_METER_GFX);
        let samples = bus.read_f32(cpu_addr).and_then(|cpu| Ok((cpu, bus.read_f32(gfx_addr)?)));
        let (cpu, gfx) = match samples {
            Ok(samples) => samples,
            Err(e) => {
                failures.warn_once("PERF", "Lag reduction", cpu_addr, e);
                return None;
            }
        };

        let total_load = cpu + gfx;
        if total_load > HIGH_LOAD {
            self.divisor += RAMP_UP;
        } else if total_load < LOW_LOAD {
            self.divisor -= RAMP_DOWN;
        }
        self.divisor = self.divisor.clamp(profile.baseline_divisor, profile.max_divisor);

        let divisor_addr = resolve_fixed(OFF_FRAME_DIVISOR);
        let count_addr = resolve_fixed(OFF_DIVISION_COUNT);
        let written = bus
            .write_f32(divisor_addr, self.divisor)
            .and_then(|()| bus.write_u32(count_addr, profile.division_count));
        if let Err(e) = written {
            failures.warn_once("PERF", "Lag reduction", divisor_addr, e);
            return None;
        }

        let logged = self.area_logged.fire();
        if logged {
            info!(
                "[PERF] Area {}: divisor {:.2} (baseline {:.2}, max {:.2}, {} divisions)",
                area, self.divisor, profile.baseline_divisor, profile.max_divisor, profile.division_count
            );
        }
        if self.divisor >= profile.max_divisor && self.ceiling_logged.fire() {
            info!("[PERF] Area {}: divisor reached its ceiling of {:.2}", area, profile.max_divisor);
        }

        Some(TuneOutcome {
            divisor: self.divisor,
            total_load,
            area_changed,
            logged,
        })
    }
}
