//! Where things live inside Castlevania 64 (NTSC-U 1.0) RDRAM.
//!
//! Most of the interesting state sits at fixed offsets inside the big system
//! work structure. The player and the camera manager are heap objects, so they
//! are reached through the module handles stored in that structure.

use crate::memory::{is_direct_mapped, GuestBus};

/// Start of the game's global system work structure.
pub const SYSTEM_WORK: u32 = 0x8036_3AB8;

// Offsets into SYSTEM_WORK
pub const OFF_GAMESTATE: u32 = 0x0_0000; // u32
pub const OFF_BUTTONS_HELD: u32 = 0x0_0010; // u16, controller 1
pub const OFF_FOG_START: u32 = 0x2_4028; // u16
pub const OFF_FOG_END: u32 = 0x2_402A; // u16
pub const OFF_PERF_METER_CPU: u32 = 0x2_4058; // f32, fraction of frame budget
pub const OFF_PERF_METER_GFX: u32 = 0x2_405C; // f32
pub const OFF_FRAME_DIVISOR: u32 = 0x2_4060; // f32
pub const OFF_DIVISION_COUNT: u32 = 0x2_4064; // u32
pub const OFF_CHARACTER: u32 = 0x2_6184; // u16
pub const OFF_HEALTH: u32 = 0x2_6186; // u16
pub const OFF_SUB_WEAPON_AMMO: u32 = 0x2_6190; // u16, red jewels
pub const OFF_DIFFICULTY: u32 = 0x2_6192; // u16
pub const OFF_CAMERA_MGR_HANDLE: u32 = 0x2_6224; // pointer
pub const OFF_PLAYER_HANDLE: u32 = 0x2_6228; // pointer
pub const OFF_MAP_ID: u32 = 0x2_6428; // u16
pub const OFF_MAP_ENTRANCE: u32 = 0x2_642A; // u16
pub const OFF_CUTSCENE_ID: u32 = 0x2_642C; // u16
pub const OFF_MAP_TRANSITION: u32 = 0x2_642F; // u8, non-zero while fading/loading
pub const OFF_PAUSE_MENU: u32 = 0x2_6433; // u8

/// Player vertical velocity; lives in the static player physics block, not in SYSTEM_WORK.
pub const PLAYER_VERTICAL_VELOCITY: u32 = 0x8034_E6D8;

// Fields of the player model reached through PLAYER_MODEL
pub const PLAYER_FACING_YAW: u32 = 0x02; // u16 binary angle
pub const PLAYER_POSITION: u32 = 0x08; // 3 x f32

// Fields of the camera manager reached through CAMERA_MANAGER
pub const CAMERA_MODE: u32 = 0x00; // u32
pub const CAMERA_YAW: u32 = 0x0A; // u16 binary angle
pub const CAMERA_DISTANCE: u32 = 0x10; // f32

pub const fn resolve_fixed(offset: u32) -> u32 {
    SYSTEM_WORK.wrapping_add(offset)
}

/// Follow the handle at `anchor + handle_offset` and step `data_sub_offset` into
/// the object it points at.
///
/// Returns `None` for a null handle, a handle that is not a direct-mapped guest
/// pointer or points outside RAM, and for a final address of 0.
pub fn resolve_chased<B: GuestBus + ?Sized>(
    bus: &B,
    anchor: u32,
    handle_offset: u32,
    data_sub_offset: u32,
) -> Option<u32> {
    let handle = bus.read_u32(anchor.wrapping_add(handle_offset)).ok()?;
    if handle == 0 || !is_direct_mapped(handle) || !bus.contains(handle, 4) {
        return None;
    }
    match handle.wrapping_add(data_sub_offset) {
        0 => None,
        addr => Some(addr),
    }
}

/// A pointer chase from a well-known anchor to a heap object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chase {
    pub anchor: u32,
    pub handle_offset: u32,
    pub data_sub_offset: u32,
}

impl Chase {
    pub fn resolve<B: GuestBus + ?Sized>(&self, bus: &B) -> Option<u32> {
        resolve_chased(bus, self.anchor, self.handle_offset, self.data_sub_offset)
    }

    /// Resolve and add a field offset inside the object.
    pub fn field<B: GuestBus + ?Sized>(&self, bus: &B, field: u32) -> Option<u32> {
        self.resolve(bus).map(|base| base.wrapping_add(field))
    }
}

/// The player module's handle points at a wrapper; the model data sits behind it.
pub const PLAYER_MODEL: Chase = Chase {
    anchor: SYSTEM_WORK,
    handle_offset: OFF_PLAYER_HANDLE,
    data_sub_offset: 0x34,
};

pub const CAMERA_MANAGER: Chase = Chase {
    anchor: SYSTEM_WORK,
    handle_offset: OFF_CAMERA_MGR_HANDLE,
    data_sub_offset: 0x0C,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::GuestMemory;

    #[test]
    fn fixed_fields_land_on_known_addresses() {
        assert_eq!(resolve_fixed(OFF_HEALTH), 0x8038_9C3E);
        assert_eq!(resolve_fixed(OFF_MAP_ID), 0x8038_9EE0);
        assert_eq!(resolve_fixed(OFF_GAMESTATE), SYSTEM_WORK);
    }

    #[test]
    fn chase_follows_handle_and_applies_sub_offset() {
        let mut ram = vec![0u8; 0x40_0000];
        let mem = GuestMemory::new();
        unsafe { mem.set_buffer(ram.as_mut_ptr(), ram.len()) };

        mem.write_u32(resolve_fixed(OFF_PLAYER_HANDLE), 0x8010_0000).unwrap();
        assert_eq!(PLAYER_MODEL.resolve(&mem), Some(0x8010_0034));
        assert_eq!(
            PLAYER_MODEL.field(&mem, PLAYER_POSITION),
            Some(0x8010_003C)
        );
    }

    #[test]
    fn chase_rejects_null_and_wild_handles() {
        let mut ram = vec![0u8; 0x40_0000];
        let mem = GuestMemory::new();
        unsafe { mem.set_buffer(ram.as_mut_ptr(), ram.len()) };

        assert_eq!(CAMERA_MANAGER.resolve(&mem), None);

        let handle = resolve_fixed(OFF_CAMERA_MGR_HANDLE);
        mem.write_u32(handle, 0x8060_0000).unwrap(); // past the 4 MiB buffer
        assert_eq!(CAMERA_MANAGER.resolve(&mem), None);

        mem.write_u32(handle, 0x0010_0000).unwrap(); // physical, not a pointer
        assert_eq!(CAMERA_MANAGER.resolve(&mem), None);
    }

    #[test]
    fn chase_on_detached_memory_is_unavailable() {
        let mem = GuestMemory::new();
        assert_eq!(PLAYER_MODEL.resolve(&mem), None);
    }
}
