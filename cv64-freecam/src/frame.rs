//! The per-frame driver that ties memory, patches, hook and camera together.

use std::sync::Arc;

use log::{info, warn};
use nalgebra_glm as glm;

use crate::addresses::*;
use crate::camera::CameraState;
use crate::config::Config;
use crate::game_state::{self, GateState, CAMERA_MODE_FIRST_PERSON, CAMERA_MODE_FREE_ROAM};
use crate::hook::{CameraHook, CodeCache};
use crate::input::{apply_radial_deadzone, strip_horizontal, DPad, SharedInput};
use crate::logging::LogOnce;
use crate::memory::{GuestBus, GuestMemory};
use crate::patches::{PatchEngine, PatchReport};

// Longest frame step fed to the camera, seconds
const MAX_FRAME_DT: f32 = 0.1;
// Guest distance multiplier per wheel notch in free-roam mode
const WHEEL_ZOOM_FACTOR: f32 = 0.9;

/// A value we write over the guest's own every frame, remembered so the next
/// frame can tell the guest's fresh value apart from our previous write.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Reasserted<T> {
    base: T,
    written: T,
}

impl<T: Copy + PartialEq> Reasserted<T> {
    /// The guest's own value: `current` if the guest wrote since last frame,
    /// otherwise the base our previous write was derived from.
    fn base_for(last: Option<Self>, current: T) -> T {
        match last {
            Some(last) if last.written == current => last.base,
            _ => current,
        }
    }
}

/// What one `on_frame` call did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    pub gate: GateState,
    pub patches: PatchReport,
    pub eye: Option<glm::Vec3>,
}

impl FrameReport {
    fn idle(gate: GateState) -> Self {
        Self {
            gate,
            patches: PatchReport::default(),
            eye: None,
        }
    }
}

pub struct PatchSystem {
    memory: Arc<GuestMemory>,
    input: Arc<SharedInput>,
    config: Config,
    patches: PatchEngine,
    hook: CameraHook,
    camera: CameraState,

    // Attach generation of the RDRAM buffer the state below belongs to
    session: u32,
    camera_mode: Option<u32>,
    area: Option<u16>,
    gate: GateState,
    yaw_reasserted: Option<Reasserted<u16>>,
    distance_reasserted: Option<Reasserted<f32>>,
    data_block_failed: LogOnce,
}

impl PatchSystem {
    pub fn new(memory: Arc<GuestMemory>, input: Arc<SharedInput>, config: Config) -> Self {
        info!(
            "[PATCHES] Free camera {}, lag reduction {}, draw distance {}",
            on_off(config.free_camera_enabled),
            on_off(config.performance.lag_reduction),
            on_off(config.draw_distance.enabled)
        );
        let camera = CameraState::new(&config.camera);
        let session = memory.generation();
        Self {
            memory,
            input,
            config,
            patches: PatchEngine::new(),
            hook: CameraHook::new(),
            camera,
            session,
            camera_mode: None,
            area: None,
            gate: GateState::Unavailable,
            yaw_reasserted: None,
            distance_reasserted: None,
            data_block_failed: LogOnce::new(),
        }
    }

    pub fn camera(&self) -> &CameraState {
        &self.camera
    }

    pub fn hook(&self) -> &CameraHook {
        &self.hook
    }

    pub fn patches(&self) -> &PatchEngine {
        &self.patches
    }

    /// Last guest camera mode seen by the frame loop.
    pub fn camera_mode(&self) -> Option<u32> {
        self.camera_mode
    }

    fn free_roam(&self) -> bool {
        self.config.free_camera_enabled && self.camera_mode == Some(CAMERA_MODE_FREE_ROAM)
    }

    /// Called once per emulated frame and once per swap. Every step is idempotent.
    pub fn on_frame(&mut self, dt: f32, cache: &dyn CodeCache) -> FrameReport {
        let dt = if dt.is_finite() { dt.clamp(0.0, MAX_FRAME_DT) } else { 0.0 };

        let generation = self.memory.generation();
        if generation != self.session {
            self.begin_session(generation);
        }

        let gate = game_state::gameplay_gate(&*self.memory);
        if gate != self.gate {
            // The stub keeps substituting the last eye until told otherwise.
            if self.gate == GateState::Gameplay && gate != GateState::Unavailable {
                self.publish_eye(None);
            }
            if gate == GateState::Loading || self.gate == GateState::Loading {
                self.camera.notify_mode_changed();
            }
            self.gate = gate;
        }
        self.camera.in_cutscene = gate == GateState::Cutscene;
        if !gate.allows_writes() {
            return FrameReport::idle(gate);
        }

        let patches = self.patches.apply(&*self.memory, &self.config);

        if self.config.free_camera_enabled {
            self.reassert_guest_camera();
        }

        self.poll_wheel();
        self.refresh_cache();

        let eye = if self.config.free_camera_enabled {
            self.update_camera(dt, cache)
        } else {
            self.publish_eye(None);
            None
        };

        FrameReport { gate, patches, eye }
    }

    /// A new RDRAM buffer was attached: nothing patched or learned from the
    /// previous one applies to it.
    fn begin_session(&mut self, generation: u32) {
        info!("[PATCHES] Guest RAM reattached, hook and patches start over");
        self.session = generation;
        self.hook.reset();
        self.patches.reset_session();
        self.camera_mode = None;
        self.area = None;
        self.gate = GateState::Unavailable;
        self.yaw_reasserted = None;
        self.distance_reasserted = None;
        self.data_block_failed.rearm();
        self.camera.first_person = false;
        self.camera.notify_mode_changed();
    }

    /// In free-roam the guest camera keeps computing its own yaw and distance;
    /// offset them by the accumulated input without compounding across frames.
    fn reassert_guest_camera(&mut self) {
        if self.camera_mode != Some(CAMERA_MODE_FREE_ROAM) {
            self.yaw_reasserted = None;
            self.distance_reasserted = None;
            return;
        }
        let Some(manager) = CAMERA_MANAGER.resolve(&*self.memory) else {
            return;
        };

        let yaw_addr = manager.wrapping_add(CAMERA_YAW);
        if let Ok(current) = self.memory.read_u16(yaw_addr) {
            let base = Reasserted::base_for(self.yaw_reasserted, current);
            let offset = game_state::degrees_to_binary_angle(self.input.yaw_offset());
            let written = base.wrapping_add(offset);
            self.yaw_reasserted = self
                .memory
                .write_u16(yaw_addr, written)
                .ok()
                .map(|()| Reasserted { base, written });
        }

        let distance_addr = manager.wrapping_add(CAMERA_DISTANCE);
        if let Ok(current) = self.memory.read_f32(distance_addr) {
            let base = Reasserted::base_for(self.distance_reasserted, current);
            let written = base * self.input.zoom_multiplier();
            self.distance_reasserted = self
                .memory
                .write_f32(distance_addr, written)
                .ok()
                .map(|()| Reasserted { base, written });
        }
    }

    fn poll_wheel(&mut self) {
        let notches = self.input.take_wheel_delta();
        if notches == 0.0 || !self.config.free_camera_enabled {
            return;
        }
        if self.free_roam() {
            self.input.scale_zoom(WHEEL_ZOOM_FACTOR.powf(notches));
        } else {
            self.camera.zoom(-notches * self.config.camera.zoom_step);
        }
    }

    fn refresh_cache(&mut self) {
        let area = game_state::map_id(&*self.memory);
        if area != self.area {
            if let Some(id) = area {
                info!("[AREA] Entered {} (0x{:02X})", game_state::map_name_for(id), id);
            }
            self.area = area;
            self.camera.notify_mode_changed();
        }

        let mode = game_state::camera_mode(&*self.memory);
        if mode != self.camera_mode {
            info!("[CAMERA] Guest camera mode {:?} -> {:?}", self.camera_mode, mode);
            self.camera_mode = mode;
            self.camera.first_person = mode == Some(CAMERA_MODE_FIRST_PERSON);
            self.yaw_reasserted = None;
            self.distance_reasserted = None;
            self.camera.notify_mode_changed();
        }

        if let Some(position) = game_state::player_position(&*self.memory) {
            let facing = game_state::player_facing(&*self.memory).unwrap_or(0.0);
            self.camera.notify_player_moved(position, facing);
        }
    }

    fn update_camera(&mut self, dt: f32, cache: &dyn CodeCache) -> Option<glm::Vec3> {
        // Failures are logged by the hook itself and stay final for the session.
        let _ = self.hook.install(&*self.memory, cache);

        self.camera.update(dt);
        let eye = (self.camera.is_active() && !self.free_roam()).then(|| self.camera.eye());
        self.publish_eye(eye);
        eye
    }

    fn publish_eye(&mut self, eye: Option<glm::Vec3>) {
        if let Err(e) = self.hook.update(&*self.memory, eye) {
            if self.data_block_failed.fire() {
                warn!("[HOOK] Could not write camera data block: {}", e);
            }
        }
    }

    pub fn process_dpad(&mut self, buttons: u16, dt: f32) {
        if !self.config.free_camera_enabled {
            return;
        }
        if self.free_roam() {
            let pad = DPad::from_bits_truncate(buttons);
            let mut direction = 0.0;
            if pad.contains(DPad::RIGHT) {
                direction += 1.0;
            }
            if pad.contains(DPad::LEFT) {
                direction -= 1.0;
            }
            self.add_guest_yaw(direction * self.config.camera.dpad_speed * dt);
        } else {
            self.camera.process_dpad(buttons, dt);
        }
    }

    pub fn process_right_stick(&mut self, x: f32, y: f32, dt: f32) {
        if !self.config.free_camera_enabled {
            return;
        }
        if self.free_roam() {
            let (x, _) = apply_radial_deadzone(x, y, self.config.camera.stick_deadzone);
            self.add_guest_yaw(x * self.config.camera.stick_sensitivity * dt);
        } else {
            self.camera.process_right_stick(x, y, dt);
        }
    }

    pub fn process_mouse(&mut self, dx: f32, dy: f32, dt: f32) {
        if !self.config.free_camera_enabled {
            return;
        }
        if self.free_roam() {
            self.add_guest_yaw(dx * self.config.camera.mouse_sensitivity);
        } else {
            self.camera.process_mouse(dx, dy, dt);
        }
    }

    fn add_guest_yaw(&self, degrees: f32) {
        if !degrees.is_finite() || degrees == 0.0 {
            return;
        }
        let degrees = if self.config.camera.invert_x { -degrees } else { degrees };
        self.input.add_yaw_offset(degrees);
    }

    /// Button word about to be handed to the game. In free-roam the D-pad
    /// left/right turn the camera, so the game must not see them.
    pub fn filter_forwarded_buttons(&self, buttons: u16) -> u16 {
        if self.free_roam() {
            strip_horizontal(buttons)
        } else {
            buttons
        }
    }

    /// User-requested camera reset.
    pub fn reset_camera(&mut self) {
        self.camera.reset();
        self.input.reset_yaw_offset();
        self.input.set_zoom_multiplier(1.0);
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}
