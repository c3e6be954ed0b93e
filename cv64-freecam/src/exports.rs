//! C entry points for the emulator core, the input shell and the overlay.
//!
//! Nothing here panics across the boundary: failures come back as 0, false,
//! -1 or "Unknown".

use std::collections::HashMap;
use std::ffi::{c_char, CStr, CString};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use log::info;

use crate::config::Config;
use crate::frame::PatchSystem;
use crate::game_state;
use crate::globals::{self, HostCodeCache, InvalidateFn, INPUT, MEMORY, SYSTEM};
use crate::logging::init_logger;
use crate::memory::GuestBus;

const CONFIG_FILE: &str = "cv64-freecam.toml";
const LOG_FILE: &str = "cv64-freecam.log";

lazy_static::lazy_static! {
    // Names handed out to C stay alive for the life of the process.
    static ref C_NAMES: Mutex<HashMap<&'static str, CString>> = Mutex::new(HashMap::new());
}

fn c_name(name: &'static str) -> *const c_char {
    let mut names = C_NAMES.lock().unwrap_or_else(PoisonError::into_inner);
    names
        .entry(name)
        .or_insert_with(|| CString::new(name).unwrap_or_default())
        .as_ptr()
}

// Memory

/// # Safety
/// `ptr` must point to `size` bytes of RDRAM that stay valid until the next
/// call, or be null to detach.
#[no_mangle]
pub unsafe extern "C" fn cv64_memory_set_buffer(ptr: *mut u8, size: usize) {
    if ptr.is_null() || size == 0 {
        MEMORY.clear_buffer();
    } else {
        MEMORY.set_buffer(ptr, size);
    }
}

#[no_mangle]
pub extern "C" fn cv64_memory_is_initialized() -> bool {
    MEMORY.is_initialized()
}

#[no_mangle]
pub extern "C" fn cv64_memory_read_u8(addr: u32) -> u8 {
    MEMORY.read_u8(addr).unwrap_or_default()
}

#[no_mangle]
pub extern "C" fn cv64_memory_read_u16(addr: u32) -> u16 {
    MEMORY.read_u16(addr).unwrap_or_default()
}

#[no_mangle]
pub extern "C" fn cv64_memory_read_u32(addr: u32) -> u32 {
    MEMORY.read_u32(addr).unwrap_or_default()
}

#[no_mangle]
pub extern "C" fn cv64_memory_read_f32(addr: u32) -> f32 {
    MEMORY.read_f32(addr).unwrap_or_default()
}

#[no_mangle]
pub extern "C" fn cv64_memory_write_u8(addr: u32, value: u8) -> bool {
    MEMORY.write_u8(addr, value).is_ok()
}

#[no_mangle]
pub extern "C" fn cv64_memory_write_u16(addr: u32, value: u16) -> bool {
    MEMORY.write_u16(addr, value).is_ok()
}

#[no_mangle]
pub extern "C" fn cv64_memory_write_u32(addr: u32, value: u32) -> bool {
    MEMORY.write_u32(addr, value).is_ok()
}

#[no_mangle]
pub extern "C" fn cv64_memory_write_f32(addr: u32, value: f32) -> bool {
    MEMORY.write_f32(addr, value).is_ok()
}

#[no_mangle]
pub extern "C" fn cv64_set_code_cache_invalidator(func: Option<InvalidateFn>) {
    globals::set_invalidator(func);
}

// Lifecycle

/// Load settings from `config_dir` (or the working directory when null),
/// start logging and create the patch system. Returns false if already running.
///
/// # Safety
/// `config_dir` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn cv64_patches_init(config_dir: *const c_char) -> bool {
    let dir = if config_dir.is_null() {
        PathBuf::from(".")
    } else {
        PathBuf::from(CStr::from_ptr(config_dir).to_string_lossy().into_owned())
    };
    init_patches(&dir)
}

fn init_patches(dir: &Path) -> bool {
    let mut system = SYSTEM.lock().unwrap_or_else(PoisonError::into_inner);
    if system.is_some() {
        return false;
    }

    let config_path = dir.join(CONFIG_FILE);
    let (config, source) = Config::load_or_create(&config_path);
    let log_path = config
        .log_file
        .as_ref()
        .map_or_else(|| dir.join(LOG_FILE), PathBuf::from);
    init_logger(&log_path);
    source.log(&config_path);

    *system = Some(PatchSystem::new(MEMORY.clone(), INPUT.clone(), config));
    info!("[PATCHES] Initialized, guest memory attached: {}", MEMORY.is_initialized());
    true
}

#[no_mangle]
pub extern "C" fn cv64_patches_shutdown() {
    let previous = SYSTEM.lock().unwrap_or_else(PoisonError::into_inner).take();
    if previous.is_some() {
        INPUT.reset_yaw_offset();
        INPUT.set_zoom_multiplier(1.0);
        info!("[PATCHES] Shut down");
    }
}

#[no_mangle]
pub extern "C" fn cv64_frame_update(dt: f32) {
    let cache = HostCodeCache::current();
    globals::with_system(|system| system.on_frame(dt, &cache));
}

#[no_mangle]
pub extern "C" fn cv64_camera_reset() {
    globals::with_system(PatchSystem::reset_camera);
}

// Input

#[no_mangle]
pub extern "C" fn cv64_input_dpad(buttons: u16, dt: f32) {
    globals::with_system(|system| system.process_dpad(buttons, dt));
}

#[no_mangle]
pub extern "C" fn cv64_input_right_stick(x: f32, y: f32, dt: f32) {
    globals::with_system(|system| system.process_right_stick(x, y, dt));
}

#[no_mangle]
pub extern "C" fn cv64_input_mouse(dx: f32, dy: f32, dt: f32) {
    globals::with_system(|system| system.process_mouse(dx, dy, dt));
}

/// Lock-free; safe to call from the window procedure.
#[no_mangle]
pub extern "C" fn cv64_input_mouse_wheel(notches: f32) {
    if notches.is_finite() {
        INPUT.add_wheel_delta(notches);
    }
}

#[no_mangle]
pub extern "C" fn cv64_input_filter_buttons(buttons: u16) -> u16 {
    globals::with_system(|system| system.filter_forwarded_buttons(buttons)).unwrap_or(buttons)
}

// Game state for the overlay

#[no_mangle]
pub extern "C" fn cv64_get_health() -> i32 {
    game_state::health(&**MEMORY)
}

#[no_mangle]
pub extern "C" fn cv64_get_sub_weapon_ammo() -> i32 {
    game_state::sub_weapon_ammo(&**MEMORY)
}

#[no_mangle]
pub extern "C" fn cv64_get_map_id() -> i32 {
    game_state::map_id(&**MEMORY).map_or(-1, i32::from)
}

#[no_mangle]
pub extern "C" fn cv64_get_map_name() -> *const c_char {
    c_name(game_state::map_name(&**MEMORY))
}

#[no_mangle]
pub extern "C" fn cv64_get_camera_mode() -> i32 {
    game_state::camera_mode(&**MEMORY)
        .and_then(|mode| i32::try_from(mode).ok())
        .unwrap_or(-1)
}

#[no_mangle]
pub extern "C" fn cv64_get_difficulty_name() -> *const c_char {
    c_name(game_state::difficulty_name(&**MEMORY))
}

#[no_mangle]
pub extern "C" fn cv64_get_character_name() -> *const c_char {
    c_name(game_state::character_name(&**MEMORY))
}
