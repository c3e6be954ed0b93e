//! Redirects the game's camera look-at call through a small stub in unused
//! RDRAM so the host can substitute the eye position.
//!
//! Everything here writes executable guest code. After any such write the
//! host's recompiler must be told, or blocks it already translated keep
//! running the old instructions.

use log::{error, info};
use nalgebra_glm as glm;
use thiserror::Error;

use crate::logging::LogOnce;
use crate::memory::{GuestBus, MemoryError};

/// Host-side translated-code cache.
pub trait CodeCache {
    fn invalidate(&self, addr: u32, size: u32);
}

/// Call site inside the camera update that passes the eye position in a1..a3.
pub const CALL_SITE: u32 = 0x8006_6D50;
/// Function the call site jumps to in an unmodified game.
pub const ORIGINAL_TARGET: u32 = 0x8007_0A94;
/// Top of expanded RDRAM, unused by the game.
pub const STUB_ADDR: u32 = 0x807F_FF00;
pub const STUB_WORDS: usize = 9;
pub const DATA_ADDR: u32 = 0x807F_FF40;
pub const DATA_WORDS: usize = 4;

const DATA_X: u32 = DATA_ADDR;
const DATA_Y: u32 = DATA_ADDR + 0x4;
const DATA_Z: u32 = DATA_ADDR + 0x8;
const DATA_ENABLE: u32 = DATA_ADDR + 0xC;

// MIPS GPR numbers
const ZERO: u32 = 0;
const A1: u32 = 5;
const A2: u32 = 6;
const A3: u32 = 7;
const T0: u32 = 8;
const T1: u32 = 9;

pub mod encode {
    pub const NOP: u32 = 0;

    pub const fn lui(rt: u32, imm: u16) -> u32 {
        (0x0F << 26) | (rt << 16) | imm as u32
    }

    pub const fn lw(rt: u32, offset: i16, base: u32) -> u32 {
        (0x23 << 26) | (base << 21) | (rt << 16) | (offset as u16 as u32)
    }

    /// `offset` is in instructions, relative to the delay slot.
    pub const fn beq(rs: u32, rt: u32, offset: i16) -> u32 {
        (0x04 << 26) | (rs << 21) | (rt << 16) | (offset as u16 as u32)
    }

    pub const fn j(target: u32) -> u32 {
        (0x02 << 26) | ((target >> 2) & 0x03FF_FFFF)
    }

    pub const fn jal(target: u32) -> u32 {
        (0x03 << 26) | ((target >> 2) & 0x03FF_FFFF)
    }
}

/// Signed 16-bit offset of `addr` from the `lui` base the stub loads.
const fn data_offset(addr: u32) -> i16 {
    addr.wrapping_sub(data_base()) as u16 as i16
}

/// `lui` value such that base + sign-extended offset reaches the data block.
const fn data_base() -> u32 {
    DATA_ADDR.wrapping_add(0x8000) & 0xFFFF_0000
}

/// If the enable word is set, load x/y/z into a1..a3, then tail-jump to the
/// original function. Returns from there straight to the original caller.
pub const fn stub_words(original_target: u32) -> [u32; STUB_WORDS] {
    [
        encode::lui(T0, (data_base() >> 16) as u16),
        encode::lw(T1, data_offset(DATA_ENABLE), T0),
        encode::beq(T1, ZERO, 4),
        encode::NOP,
        encode::lw(A1, data_offset(DATA_X), T0),
        encode::lw(A2, data_offset(DATA_Y), T0),
        encode::lw(A3, data_offset(DATA_Z), T0),
        encode::j(original_target),
        encode::NOP,
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookState {
    Uninstalled,
    Installed,
    Aborted,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HookError {
    #[error("call site holds 0x{found:08X}, expected a jal to the original function or the stub")]
    UnexpectedCallSite { found: u32 },
    #[error("guest memory: {0}")]
    Memory(#[from] MemoryError),
    #[error("installation was aborted earlier this session")]
    Aborted,
}

#[derive(Debug)]
pub struct CameraHook {
    state: HookState,
    abort_logged: LogOnce,
}

impl Default for CameraHook {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraHook {
    pub fn new() -> Self {
        Self {
            state: HookState::Uninstalled,
            abort_logged: LogOnce::new(),
        }
    }

    pub fn state(&self) -> HookState {
        self.state
    }

    pub fn is_installed(&self) -> bool {
        self.state == HookState::Installed
    }

    /// Start over for a freshly attached RDRAM buffer, which holds the
    /// unpatched game code again.
    pub fn reset(&mut self) {
        self.state = HookState::Uninstalled;
        self.abort_logged.rearm();
    }

    /// Verify the call site, write the stub and redirect the call.
    ///
    /// A no-op once installed. Any failure is permanent until `reset`.
    pub fn install<B: GuestBus + ?Sized>(&mut self, bus: &B, cache: &dyn CodeCache) -> Result<(), HookError> {
        match self.state {
            HookState::Installed => return Ok(()),
            HookState::Aborted => return Err(HookError::Aborted),
            HookState::Uninstalled => {}
        }

        match self.write_hook(bus, cache) {
            Ok(()) => {
                self.state = HookState::Installed;
                info!(
                    "[HOOK] Installed: call at 0x{:08X} now goes through stub at 0x{:08X}",
                    CALL_SITE, STUB_ADDR
                );
                Ok(())
            }
            Err(e) => {
                self.state = HookState::Aborted;
                if self.abort_logged.fire() {
                    error!("[HOOK] Installation aborted, camera override disabled: {}", e);
                }
                Err(e)
            }
        }
    }

    fn write_hook<B: GuestBus + ?Sized>(&self, bus: &B, cache: &dyn CodeCache) -> Result<(), HookError> {
        let found = bus.read_u32(CALL_SITE)?;
        let call_to_stub = encode::jal(STUB_ADDR);
        if found != encode::jal(ORIGINAL_TARGET) && found != call_to_stub {
            return Err(HookError::UnexpectedCallSite { found });
        }

        // Check the whole reserved range up front so a short buffer never leaves half a stub.
        let reserved = (DATA_ADDR + DATA_WORDS as u32 * 4 - STUB_ADDR) as usize;
        if !bus.contains(STUB_ADDR, reserved) {
            return Err(MemoryError::OutOfBounds {
                addr: STUB_ADDR,
                size: reserved,
            }
            .into());
        }

        for (i, word) in stub_words(ORIGINAL_TARGET).iter().enumerate() {
            bus.write_u32(STUB_ADDR + i as u32 * 4, *word)?;
        }
        for i in 0..DATA_WORDS as u32 {
            bus.write_u32(DATA_ADDR + i * 4, 0)?;
        }
        bus.write_u32(CALL_SITE, call_to_stub)?;

        cache.invalidate(CALL_SITE, 4);
        cache.invalidate(STUB_ADDR, STUB_WORDS as u32 * 4);
        Ok(())
    }

    /// Publish this frame's eye position, or disable the override with `None`.
    pub fn update<B: GuestBus + ?Sized>(&self, bus: &B, eye: Option<glm::Vec3>) -> Result<(), MemoryError> {
        if !self.is_installed() {
            return Ok(());
        }
        match eye {
            Some(eye) => {
                bus.write_f32(DATA_X, eye.x)?;
                bus.write_f32(DATA_Y, eye.y)?;
                bus.write_f32(DATA_Z, eye.z)?;
                bus.write_u32(DATA_ENABLE, 1)
            }
            None => bus.write_u32(DATA_ENABLE, 0),
        }
    }
}
