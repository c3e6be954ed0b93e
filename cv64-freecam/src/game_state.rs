//! Read-only views of the running game for the overlay and the frame loop.
//!
//! All of these are safe to call at any time and fall back to a sentinel
//! (-1, "Unknown", `None`) when the guest buffer is missing or a field
//! cannot be reached.

use nalgebra_glm as glm;

use crate::addresses::*;
use crate::memory::GuestBus;

/// SYSTEM_WORK gamestate value while a save file is being played.
pub const GAMESTATE_GAMEPLAY: u32 = 3;

/// Guest camera manager modes.
pub const CAMERA_MODE_FREE_ROAM: u32 = 0;
pub const CAMERA_MODE_FIRST_PERSON: u32 = 3;

pub const MAP_NAMES: [&str; 0x1B] = [
    "Forest of Silence",
    "Castle Wall (Towers)",
    "Castle Wall (Main)",
    "Villa (Yard)",
    "Villa (Foyer)",
    "Villa (Hallway)",
    "Villa (Maze Garden)",
    "Tunnel",
    "Underground Waterway",
    "Castle Center (Main)",
    "Castle Center (Bottom Elevator)",
    "Castle Center (Gears)",
    "Castle Center (Friendly Lizard-man)",
    "Castle Center (Library)",
    "Castle Center (Nitro Room)",
    "Castle Center (Top Elevator)",
    "Tower of Execution",
    "Tower of Sorcery",
    "Tower of Science",
    "Duel Tower",
    "Castle Keep Stairs",
    "Castle Keep",
    "Intro Cutscene",
    "Clock Tower",
    "Dracula's Desert",
    "Room of Clocks",
    "Villa (Crypt)",
];

/// Whether the patch engine may write to the guest this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Unavailable,
    Menu,
    Loading,
    Cutscene,
    Gameplay,
}

impl GateState {
    pub fn allows_writes(self) -> bool {
        self == GateState::Gameplay
    }
}

pub fn gameplay_gate<B: GuestBus + ?Sized>(bus: &B) -> GateState {
    let Ok(gamestate) = bus.read_u32(resolve_fixed(OFF_GAMESTATE)) else {
        return GateState::Unavailable;
    };
    if gamestate != GAMESTATE_GAMEPLAY {
        return GateState::Menu;
    }
    if bus.read_u8(resolve_fixed(OFF_MAP_TRANSITION)).unwrap_or(1) != 0 {
        return GateState::Loading;
    }
    if bus.read_u16(resolve_fixed(OFF_CUTSCENE_ID)).unwrap_or(1) != 0 {
        return GateState::Cutscene;
    }
    if bus.read_u8(resolve_fixed(OFF_PAUSE_MENU)).unwrap_or(1) != 0 {
        return GateState::Menu;
    }
    GateState::Gameplay
}

pub fn map_id<B: GuestBus + ?Sized>(bus: &B) -> Option<u16> {
    bus.read_u16(resolve_fixed(OFF_MAP_ID)).ok()
}

pub fn map_name_for(id: u16) -> &'static str {
    MAP_NAMES.get(id as usize).copied().unwrap_or("Unknown")
}

pub fn map_name<B: GuestBus + ?Sized>(bus: &B) -> &'static str {
    map_id(bus).map_or("Unknown", map_name_for)
}

fn read_i32_u16<B: GuestBus + ?Sized>(bus: &B, offset: u32) -> i32 {
    bus.read_u16(resolve_fixed(offset)).map_or(-1, i32::from)
}

pub fn health<B: GuestBus + ?Sized>(bus: &B) -> i32 {
    read_i32_u16(bus, OFF_HEALTH)
}

pub fn sub_weapon_ammo<B: GuestBus + ?Sized>(bus: &B) -> i32 {
    read_i32_u16(bus, OFF_SUB_WEAPON_AMMO)
}

pub fn difficulty_name<B: GuestBus + ?Sized>(bus: &B) -> &'static str {
    match bus.read_u16(resolve_fixed(OFF_DIFFICULTY)) {
        Ok(0) => "Easy",
        Ok(1) => "Normal",
        _ => "Unknown",
    }
}

pub fn character_name<B: GuestBus + ?Sized>(bus: &B) -> &'static str {
    match bus.read_u16(resolve_fixed(OFF_CHARACTER)) {
        Ok(0) => "Reinhardt",
        Ok(1) => "Carrie",
        _ => "Unknown",
    }
}

pub fn camera_mode<B: GuestBus + ?Sized>(bus: &B) -> Option<u32> {
    let addr = CAMERA_MANAGER.field(bus, CAMERA_MODE)?;
    bus.read_u32(addr).ok()
}

/// Player position, `None` while the player object is missing or still at the origin.
pub fn player_position<B: GuestBus + ?Sized>(bus: &B) -> Option<glm::Vec3> {
    let addr = PLAYER_MODEL.field(bus, PLAYER_POSITION)?;
    let pos = bus.read_vec3(addr).ok()?;
    let usable = pos.iter().all(|c| c.is_finite()) && pos != glm::Vec3::zeros();
    usable.then_some(pos)
}

/// Player facing direction in degrees.
pub fn player_facing<B: GuestBus + ?Sized>(bus: &B) -> Option<f32> {
    let addr = PLAYER_MODEL.field(bus, PLAYER_FACING_YAW)?;
    bus.read_u16(addr).ok().map(binary_angle_to_degrees)
}

/// N64 binary angle (0x10000 per turn) to degrees in 0..360.
pub fn binary_angle_to_degrees(angle: u16) -> f32 {
    angle as f32 * (360.0 / 65536.0)
}

pub fn degrees_to_binary_angle(degrees: f32) -> u16 {
    let turns = degrees.rem_euclid(360.0) / 360.0;
    ((turns * 65536.0).round() as u32 & 0xFFFF) as u16
}
