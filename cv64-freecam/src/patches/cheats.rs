use log::info;

use crate::addresses::*;
use crate::config::CheatConfig;
use crate::logging::{FailureLog, LogOnce};
use crate::memory::{GuestBus, MemoryError};

pub const HEALTH_LOCK_VALUE: u16 = 100;
pub const SUB_WEAPON_LOCK_VALUE: u16 = 99;
/// L trigger in the low byte of the held-buttons word.
pub const MOON_JUMP_BIT: u8 = 0x20;
pub const MOON_JUMP_VELOCITY: f32 = 35.0;

/// Stat locks and moon-jump. Each patch is written every frame it is enabled.
#[derive(Debug, Default)]
pub struct CheatPatches {
    health_applied: LogOnce,
    ammo_applied: LogOnce,
    moon_jump_applied: LogOnce,
}

impl CheatPatches {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply<B: GuestBus + ?Sized>(&mut self, bus: &B, config: &CheatConfig, failures: &mut FailureLog) {
        if config.infinite_health {
            let addr = resolve_fixed(OFF_HEALTH);
            let result = bus.write_u16(addr, HEALTH_LOCK_VALUE);
            report(result, addr, &mut self.health_applied, failures, "Infinite health");
        }

        if config.infinite_sub_weapon {
            let addr = resolve_fixed(OFF_SUB_WEAPON_AMMO);
            let result = bus.write_u16(addr, SUB_WEAPON_LOCK_VALUE);
            report(result, addr, &mut self.ammo_applied, failures, "Infinite sub-weapon");
        }

        if config.moon_jump {
            self.apply_moon_jump(bus, failures);
        }
    }

    fn apply_moon_jump<B: GuestBus + ?Sized>(&mut self, bus: &B, failures: &mut FailureLog) {
        // Low byte of the big-endian button word sits one byte in.
        let buttons_addr = resolve_fixed(OFF_BUTTONS_HELD) + 1;
        let held = match bus.read_u8(buttons_addr) {
            Ok(byte) => byte,
            Err(e) => {
                failures.warn_once(TAG, "Moon jump", buttons_addr, e);
                return;
            }
        };
        if held & MOON_JUMP_BIT == 0 {
            return;
        }
        let result = bus.write_f32(PLAYER_VERTICAL_VELOCITY, MOON_JUMP_VELOCITY);
        report(result, PLAYER_VERTICAL_VELOCITY, &mut self.moon_jump_applied, failures, "Moon jump");
    }
}

const TAG: &str = "CHEATS";

fn report(
    result: Result<(), MemoryError>,
    addr: u32,
    applied: &mut LogOnce,
    failures: &mut FailureLog,
    name: &str,
) -> bool {
    match result {
        Ok(()) => {
            if applied.fire() {
                info!("[CHEATS] {} active (0x{:08X})", name, addr);
            }
            true
        }
        Err(e) => {
            failures.warn_once(TAG, name, addr, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_state::tests::gameplay_ram;
    use crate::memory::GuestMemory;

    fn all_enabled() -> CheatConfig {
        CheatConfig {
            infinite_health: true,
            infinite_sub_weapon: true,
            moon_jump: true,
        }
    }

    #[test]
    fn stat_locks_write_absolute_values() {
        let (_ram, mem) = gameplay_ram();
        mem.write_u16(resolve_fixed(OFF_HEALTH), 7).unwrap();

        let mut cheats = CheatPatches::new();
        let mut failures = FailureLog::new();
        cheats.apply(&mem, &all_enabled(), &mut failures);

        assert_eq!(mem.read_u16(resolve_fixed(OFF_HEALTH)), Ok(HEALTH_LOCK_VALUE));
        assert_eq!(mem.read_u16(resolve_fixed(OFF_SUB_WEAPON_AMMO)), Ok(SUB_WEAPON_LOCK_VALUE));
        assert!(cheats.health_applied.has_fired());
    }

    #[test]
    fn moon_jump_only_while_trigger_held() {
        let (_ram, mem) = gameplay_ram();
        let config = CheatConfig {
            moon_jump: true,
            ..CheatConfig::default()
        };
        let mut cheats = CheatPatches::new();
        let mut failures = FailureLog::new();

        cheats.apply(&mem, &config, &mut failures);
        assert_eq!(mem.read_f32(PLAYER_VERTICAL_VELOCITY), Ok(0.0));

        mem.write_u16(resolve_fixed(OFF_BUTTONS_HELD), MOON_JUMP_BIT as u16).unwrap();
        cheats.apply(&mem, &config, &mut failures);
        assert_eq!(mem.read_f32(PLAYER_VERTICAL_VELOCITY), Ok(MOON_JUMP_VELOCITY));
    }

    #[test]
    fn disabled_cheats_leave_memory_alone() {
        let (_ram, mem) = gameplay_ram();
        mem.write_u16(resolve_fixed(OFF_HEALTH), 7).unwrap();
        let mut cheats = CheatPatches::new();
        cheats.apply(&mem, &CheatConfig::default(), &mut FailureLog::new());
        assert_eq!(mem.read_u16(resolve_fixed(OFF_HEALTH)), Ok(7));
    }

    #[test]
    fn short_buffer_reports_each_failing_address_once() {
        let mut ram = vec![0u8; 0x1000];
        let mem = GuestMemory::new();
        unsafe { mem.set_buffer(ram.as_mut_ptr(), ram.len()) };

        let mut cheats = CheatPatches::new();
        let mut failures = FailureLog::new();
        cheats.apply(&mem, &all_enabled(), &mut failures);
        assert!(!failures.first_failure(resolve_fixed(OFF_HEALTH)));
        assert!(!cheats.health_applied.has_fired());
    }
}
