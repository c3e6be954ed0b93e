//! Free-look camera, cheats and performance patches for Castlevania 64,
//! loaded into an N64 emulator.
//!
//! The emulator hands over its RDRAM buffer and a code cache invalidation
//! callback through the C entry points in [`exports`], then calls
//! `cv64_frame_update` once per frame.

pub mod addresses;
pub mod camera;
pub mod config;
pub mod exports;
pub mod frame;
pub mod game_state;
pub mod globals;
pub mod hook;
pub mod input;
pub mod logging;
pub mod memory;
pub mod patches;

pub use camera::CameraState;
pub use config::{Config, ConfigSource};
pub use frame::{FrameReport, PatchSystem};
pub use hook::{CameraHook, CodeCache, HookError};
pub use input::SharedInput;
pub use memory::{GuestBus, GuestMemory, MemoryError};
