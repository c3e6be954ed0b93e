//! Per-frame guest modifications: stat locks, moon jump, frame-budget tuning
//! and draw distance. Each one is toggled independently from `Config`.

pub mod cheats;
pub mod draw_distance;
pub mod perf;

use log::debug;

use crate::addresses::SYSTEM_WORK;
use crate::config::Config;
use crate::game_state;
use crate::logging::{FailureLog, LogOnce};
use crate::memory::GuestBus;

pub use cheats::CheatPatches;
pub use draw_distance::{DrawDistanceRescaler, FogDistances};
pub use perf::{FrameBudgetTuner, TuneOutcome};

/// What the engine did this frame.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct PatchReport {
    pub ran: bool,
    pub tune: Option<TuneOutcome>,
    pub fog: Option<FogDistances>,
}

#[derive(Debug, Default)]
pub struct PatchEngine {
    cheats: CheatPatches,
    tuner: FrameBudgetTuner,
    fog: DrawDistanceRescaler,
    failures: FailureLog,
    lag_reduction_was_on: bool,
    draw_distance_was_on: bool,
    detached_logged: LogOnce,
}

impl PatchEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tuner(&self) -> &FrameBudgetTuner {
        &self.tuner
    }

    pub fn rescaler(&self) -> &DrawDistanceRescaler {
        &self.fog
    }

    /// Forget everything learned from the previous RDRAM buffer.
    pub fn reset_session(&mut self) {
        self.cheats = CheatPatches::new();
        self.tuner.reset();
        self.fog.rearm();
        self.failures.clear();
        self.detached_logged.rearm();
        self.lag_reduction_was_on = false;
        self.draw_distance_was_on = false;
    }

    /// Run every enabled patch once. The caller has already checked the gameplay gate.
    pub fn apply<B: GuestBus + ?Sized>(&mut self, bus: &B, config: &Config) -> PatchReport {
        if !bus.contains(SYSTEM_WORK, 4) {
            if self.detached_logged.fire() {
                debug!("[CHEATS] Guest memory unavailable, patches idle");
            }
            return PatchReport::default();
        }
        self.detached_logged.rearm();

        self.cheats.apply(bus, &config.cheats, &mut self.failures);

        let area = game_state::map_id(bus);
        let mut report = PatchReport {
            ran: true,
            ..PatchReport::default()
        };

        let lag_reduction = config.performance.lag_reduction;
        if lag_reduction && !self.lag_reduction_was_on {
            self.tuner.reset();
        }
        self.lag_reduction_was_on = lag_reduction;
        if let (true, Some(area)) = (lag_reduction, area) {
            report.tune = self.tuner.apply(bus, area, &mut self.failures);
        }

        let draw_distance = config.draw_distance.enabled;
        if draw_distance && !self.draw_distance_was_on {
            self.fog.rearm();
        }
        self.draw_distance_was_on = draw_distance;
        if let (true, Some(area)) = (draw_distance, area) {
            report.fog = self
                .fog
                .apply(bus, area, config.draw_distance.multiplier, &mut self.failures);
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addresses::*;
    use crate::game_state::tests::gameplay_ram;
    use crate::memory::GuestMemory;

    #[test]
    fn detached_buffer_disables_everything() {
        let mem = GuestMemory::new();
        let mut engine = PatchEngine::new();
        let mut config = Config::default();
        config.cheats.infinite_health = true;
        config.performance.lag_reduction = true;
        assert_eq!(engine.apply(&mem, &config), PatchReport::default());
    }

    #[test]
    fn toggling_draw_distance_recaptures_the_baseline() {
        let (_ram, mem) = gameplay_ram();
        let mut engine = PatchEngine::new();
        let mut config = Config::default();
        config.draw_distance.enabled = true;
        config.draw_distance.multiplier = 2.0;

        mem.write_u16(resolve_fixed(OFF_FOG_START), 400).unwrap();
        mem.write_u16(resolve_fixed(OFF_FOG_END), 800).unwrap();
        let first = engine.apply(&mem, &config);
        assert_eq!(first.fog, Some(FogDistances { start: 800, end: 1600 }));

        config.draw_distance.enabled = false;
        engine.apply(&mem, &config);
        mem.write_u16(resolve_fixed(OFF_FOG_START), 300).unwrap();
        mem.write_u16(resolve_fixed(OFF_FOG_END), 700).unwrap();

        config.draw_distance.enabled = true;
        let again = engine.apply(&mem, &config);
        assert_eq!(again.fog, Some(FogDistances { start: 600, end: 1400 }));
    }

    #[test]
    fn session_reset_forgets_tuning_fog_and_failures() {
        let (_ram, mem) = gameplay_ram();
        let mut engine = PatchEngine::new();
        let mut config = Config::default();
        config.performance.lag_reduction = true;
        config.draw_distance.enabled = true;
        mem.write_u16(resolve_fixed(OFF_MAP_ID), 0x40).unwrap();
        mem.write_f32(resolve_fixed(OFF_PERF_METER_CPU), 0.6).unwrap();
        mem.write_f32(resolve_fixed(OFF_PERF_METER_GFX), 0.5).unwrap();
        mem.write_u16(resolve_fixed(OFF_FOG_END), 800).unwrap();

        engine.apply(&mem, &config);
        assert!(engine.tuner().divisor() > perf::DEFAULT_DIVISOR);
        assert!(engine.rescaler().baseline().is_some());
        assert!(engine.failures.first_failure(0x8000_0000));

        engine.reset_session();
        assert_eq!(engine.tuner().divisor(), perf::DEFAULT_DIVISOR);
        assert_eq!(engine.rescaler().baseline(), None);
        assert!(engine.failures.first_failure(0x8000_0000));
    }

    #[test]
    fn runs_all_enabled_patches_in_one_pass() {
        let (_ram, mem) = gameplay_ram();
        let mut engine = PatchEngine::new();
        let mut config = Config::default();
        config.cheats.infinite_health = true;
        config.performance.lag_reduction = true;
        mem.write_u16(resolve_fixed(OFF_MAP_ID), 2).unwrap();

        let report = engine.apply(&mem, &config);
        assert!(report.ran);
        assert!(report.tune.is_some());
        assert_eq!(report.fog, None);
        assert_eq!(mem.read_u16(resolve_fixed(OFF_HEALTH)), Ok(cheats::HEALTH_LOCK_VALUE));
    }
}
