use log::{debug, info};
use nalgebra_glm as glm;

use crate::config::CameraConfig;
use crate::input::{apply_radial_deadzone, DPad};

// Seconds to wait after a reset or guest camera mode change before orbiting again
const LOADING_COOLDOWN: f32 = 0.5;
// Per-frame decay of the rotation velocity shown by the overlay
const VELOCITY_DAMPING: f32 = 0.9;
// Pivot above the player's origin (feet), guest world units
const LOOK_AT_HEIGHT: f32 = 1.5;
const DEFAULT_PITCH: f32 = 15.0;

/// Wrap an angle in degrees into (-180, 180].
pub fn normalize_degrees(angle: f32) -> f32 {
    if !angle.is_finite() {
        return 0.0;
    }
    let wrapped = angle.rem_euclid(360.0);
    if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

/// Interpolate between two angles along the shorter arc.
pub fn lerp_degrees(current: f32, target: f32, t: f32) -> f32 {
    let delta = normalize_degrees(target - current);
    normalize_degrees(current + delta * t)
}

/// Free orbit camera around the player, driven by pad, stick and mouse.
///
/// Angles are in degrees. The camera stays idle while loading (after a reset
/// or mode change, until the cooldown elapsed and the player was seen), while
/// locked, and while the game owns the view (cutscenes, first person).
pub struct CameraState {
    pub settings: CameraConfig,

    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
    pub target_yaw: f32,
    pub target_pitch: f32,

    pub distance: f32,
    pub target_distance: f32,
    pub min_distance: f32,
    pub max_distance: f32,

    pub position: glm::Vec3, // eye
    pub look_at: glm::Vec3,

    pub locked: bool,
    pub first_person: bool,
    pub in_cutscene: bool,
    loading: bool,
    loading_timer: f32,
    has_target: bool,

    pub idle_time: f32,
    pub auto_centering: bool,
    pub yaw_velocity: f32,   // overlay feedback only
    pub pitch_velocity: f32,
    player_facing: f32,
}

impl CameraState {
    pub fn new(settings: &CameraConfig) -> Self {
        let mut camera = Self {
            settings: settings.clone(),
            yaw: 0.0,
            pitch: 0.0,
            roll: 0.0,
            target_yaw: 0.0,
            target_pitch: 0.0,
            distance: 0.0,
            target_distance: 0.0,
            min_distance: 0.0,
            max_distance: 0.0,
            position: glm::Vec3::zeros(),
            look_at: glm::Vec3::zeros(),
            locked: false,
            first_person: false,
            in_cutscene: false,
            loading: true,
            loading_timer: LOADING_COOLDOWN,
            has_target: false,
            idle_time: 0.0,
            auto_centering: false,
            yaw_velocity: 0.0,
            pitch_velocity: 0.0,
            player_facing: 0.0,
        };
        camera.reset();
        camera
    }

    /// Back to the default view behind the player, then wait for the next player position.
    pub fn reset(&mut self) {
        self.min_distance = self.settings.min_distance.min(self.settings.max_distance);
        self.max_distance = self.settings.max_distance.max(self.min_distance);
        self.distance = self
            .settings
            .default_distance
            .clamp(self.min_distance, self.max_distance);
        self.target_distance = self.distance;

        self.yaw = normalize_degrees(self.player_facing + 180.0);
        self.target_yaw = self.yaw;
        self.pitch = self.clamp_pitch(DEFAULT_PITCH);
        self.target_pitch = self.pitch;
        self.roll = 0.0;

        self.idle_time = 0.0;
        self.auto_centering = false;
        self.yaw_velocity = 0.0;
        self.pitch_velocity = 0.0;
        self.enter_loading();
        info!("[CAMERA] Reset to default view, distance {:.1}", self.distance);
    }

    /// The guest switched camera mode or map; hold still until a fresh target arrives.
    pub fn notify_mode_changed(&mut self) {
        self.enter_loading();
        debug!("[CAMERA] Mode changed, waiting {:.1}s for a target", LOADING_COOLDOWN);
    }

    /// `facing` is the player's facing yaw in degrees.
    pub fn notify_player_moved(&mut self, position: glm::Vec3, facing: f32) {
        if !position.iter().all(|c| c.is_finite()) || position == glm::Vec3::zeros() {
            return;
        }
        self.look_at = position + glm::vec3(0.0, LOOK_AT_HEIGHT, 0.0);
        if facing.is_finite() {
            self.player_facing = facing;
        }
        self.has_target = true;
    }

    fn enter_loading(&mut self) {
        self.loading = true;
        self.loading_timer = LOADING_COOLDOWN;
        self.has_target = false;
    }

    fn clamp_pitch(&self, pitch: f32) -> f32 {
        let (lo, hi) = (self.settings.pitch_min, self.settings.pitch_max.max(self.settings.pitch_min));
        if pitch.is_finite() {
            pitch.clamp(lo, hi)
        } else {
            lo.max(0.0).min(hi)
        }
    }

    /// Common entry for every input source. Degrees, positive pitch raises the camera.
    pub fn rotate(&mut self, delta_yaw: f32, delta_pitch: f32) {
        let delta_yaw = if delta_yaw.is_finite() { delta_yaw } else { 0.0 };
        let delta_pitch = if delta_pitch.is_finite() { delta_pitch } else { 0.0 };

        self.target_yaw = normalize_degrees(self.target_yaw + delta_yaw);
        self.target_pitch = self.clamp_pitch(self.target_pitch + delta_pitch);
        if !self.settings.smoothing_enabled {
            self.yaw = self.target_yaw;
            self.pitch = self.target_pitch;
        }

        self.yaw_velocity += delta_yaw;
        self.pitch_velocity += delta_pitch;
        if delta_yaw != 0.0 || delta_pitch != 0.0 {
            self.idle_time = 0.0;
            self.auto_centering = false;
        }
    }

    /// Positive `delta` moves the camera away from the player.
    pub fn zoom(&mut self, delta: f32) {
        if !delta.is_finite() || delta == 0.0 {
            return;
        }
        self.target_distance = (self.target_distance + delta).clamp(self.min_distance, self.max_distance);
        if !self.settings.smoothing_enabled {
            self.distance = self.target_distance;
        }
        self.idle_time = 0.0;
        self.auto_centering = false;
    }

    pub fn process_dpad(&mut self, buttons: u16, dt: f32) {
        let pad = DPad::from_bits_truncate(buttons);
        let step = self.settings.dpad_speed * dt;
        let mut yaw = 0.0;
        let mut pitch = 0.0;
        if pad.contains(DPad::RIGHT) {
            yaw += step;
        }
        if pad.contains(DPad::LEFT) {
            yaw -= step;
        }
        if pad.contains(DPad::UP) {
            pitch += step;
        }
        if pad.contains(DPad::DOWN) {
            pitch -= step;
        }
        self.rotate_with_inversion(yaw, pitch);
    }

    /// `x`/`y` in -1..1, up is positive.
    pub fn process_right_stick(&mut self, x: f32, y: f32, dt: f32) {
        let (x, y) = apply_radial_deadzone(x, y, self.settings.stick_deadzone);
        let rate = self.settings.stick_sensitivity * dt;
        self.rotate_with_inversion(x * rate, y * rate);
    }

    /// Raw mouse counts. Counts are already per frame, so `dt` is not applied.
    pub fn process_mouse(&mut self, dx: f32, dy: f32, _dt: f32) {
        let sens = self.settings.mouse_sensitivity;
        // Screen y grows downward; pulling the mouse back raises the camera.
        self.rotate_with_inversion(dx * sens, dy * sens);
    }

    fn rotate_with_inversion(&mut self, delta_yaw: f32, delta_pitch: f32) {
        let yaw = if self.settings.invert_x { -delta_yaw } else { delta_yaw };
        let pitch = if self.settings.invert_y { -delta_pitch } else { delta_pitch };
        self.rotate(yaw, pitch);
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_active(&self) -> bool {
        !self.loading && !self.locked && !self.in_cutscene && !self.first_person
    }

    pub fn update(&mut self, dt: f32) {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };

        if self.loading {
            self.loading_timer -= dt;
            if self.loading_timer <= 0.0 && self.has_target {
                self.loading = false;
                info!(
                    "[CAMERA] Active, pivot at ({:.2}, {:.2}, {:.2})",
                    self.look_at.x, self.look_at.y, self.look_at.z
                );
            } else {
                return;
            }
        }
        if !self.is_active() {
            return;
        }

        self.idle_time += dt;
        if self.settings.auto_center_enabled && self.idle_time > self.settings.auto_center_delay {
            if !self.auto_centering {
                debug!("[CAMERA] Idle for {:.1}s, centering behind player", self.idle_time);
            }
            self.auto_centering = true;
            let behind = normalize_degrees(self.player_facing + 180.0);
            let remaining = normalize_degrees(behind - self.target_yaw);
            let step = (self.settings.auto_center_speed * dt).abs();
            self.target_yaw = normalize_degrees(self.target_yaw + remaining.clamp(-step, step));
        }

        if self.settings.smoothing_enabled {
            let t = self.settings.smoothing_factor.clamp(0.0, 1.0);
            self.yaw = lerp_degrees(self.yaw, self.target_yaw, t);
            self.pitch = glm::lerp_scalar(self.pitch, self.target_pitch, t);
            self.distance = glm::lerp_scalar(self.distance, self.target_distance, t);
        } else {
            self.yaw = self.target_yaw;
            self.pitch = self.target_pitch;
            self.distance = self.target_distance;
        }
        self.yaw = normalize_degrees(self.yaw);
        self.pitch = self.clamp_pitch(self.pitch);

        self.position = orbit_eye(self.look_at, self.yaw, self.pitch, self.distance);

        self.yaw_velocity *= VELOCITY_DAMPING;
        self.pitch_velocity *= VELOCITY_DAMPING;
    }

    pub fn eye(&self) -> glm::Vec3 {
        self.position
    }

    pub fn look_at(&self) -> glm::Vec3 {
        self.look_at
    }
}

/// Eye position on a sphere of radius `distance` around `look_at`.
pub fn orbit_eye(look_at: glm::Vec3, yaw: f32, pitch: f32, distance: f32) -> glm::Vec3 {
    let (yaw, pitch) = (yaw.to_radians(), pitch.to_radians());
    look_at
        + glm::vec3(
            pitch.cos() * yaw.sin(),
            pitch.sin(),
            pitch.cos() * yaw.cos(),
        ) * distance
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snappy() -> CameraConfig {
        CameraConfig {
            smoothing_enabled: false,
            ..CameraConfig::default()
        }
    }

    fn active_camera(settings: &CameraConfig) -> CameraState {
        let mut camera = CameraState::new(settings);
        camera.notify_player_moved(glm::vec3(100.0, 0.0, -50.0), 0.0);
        camera.update(LOADING_COOLDOWN);
        assert!(camera.is_active());
        camera
    }

    #[test]
    fn normalize_keeps_half_open_range() {
        assert_eq!(normalize_degrees(190.0), -170.0);
        assert_eq!(normalize_degrees(-180.0), 180.0);
        assert_eq!(normalize_degrees(180.0), 180.0);
        assert_eq!(normalize_degrees(540.0), 180.0);
        assert_eq!(normalize_degrees(-190.0), 170.0);
        assert_eq!(normalize_degrees(f32::NAN), 0.0);
    }

    #[test]
    fn rotating_past_180_wraps_to_negative() {
        let mut camera = CameraState::new(&snappy());
        camera.yaw = 170.0;
        camera.target_yaw = 170.0;
        camera.rotate(10.0, 0.0);
        camera.rotate(10.0, 0.0);
        assert_eq!(camera.yaw, -170.0);
        assert_eq!(camera.target_yaw, -170.0);
    }

    #[test]
    fn yaw_stays_normalized_under_any_rotation() {
        let mut camera = CameraState::new(&CameraConfig::default());
        for i in 0..500 {
            camera.rotate((i as f32 * 37.3) % 721.0 - 360.0, 0.0);
            assert!(camera.target_yaw > -180.0 && camera.target_yaw <= 180.0);
            assert!(camera.yaw > -180.0 && camera.yaw <= 180.0);
        }
    }

    #[test]
    fn pitch_never_leaves_configured_limits() {
        let settings = CameraConfig::default();
        let mut camera = active_camera(&settings);
        for i in 0..300 {
            let delta = if i % 7 < 4 { 25.0 } else { -40.0 };
            camera.rotate(0.0, delta);
            camera.update(1.0 / 60.0);
            assert!(camera.pitch >= settings.pitch_min && camera.pitch <= settings.pitch_max);
            assert!(camera.target_pitch >= settings.pitch_min && camera.target_pitch <= settings.pitch_max);
        }
    }

    #[test]
    fn loading_needs_cooldown_and_a_target() {
        let mut camera = CameraState::new(&snappy());
        camera.update(1.0);
        assert!(camera.is_loading());

        camera.notify_player_moved(glm::Vec3::zeros(), 0.0);
        camera.update(0.1);
        assert!(camera.is_loading());

        camera.notify_player_moved(glm::vec3(1.0, 2.0, 3.0), 0.0);
        camera.update(0.0);
        assert!(!camera.is_loading());

        camera.notify_mode_changed();
        camera.notify_player_moved(glm::vec3(1.0, 2.0, 3.0), 0.0);
        camera.update(0.2);
        assert!(camera.is_loading());
        camera.update(0.4);
        assert!(!camera.is_loading());
    }

    #[test]
    fn eye_orbits_the_pivot() {
        let mut camera = active_camera(&snappy());
        let pivot = camera.look_at();
        assert_eq!(pivot, glm::vec3(100.0, LOOK_AT_HEIGHT, -50.0));

        camera.target_yaw = 90.0;
        camera.target_pitch = 0.0;
        camera.update(1.0 / 60.0);
        let offset = camera.eye() - pivot;
        assert!((offset.x - camera.distance).abs() < 1e-4);
        assert!(offset.y.abs() < 1e-4 && offset.z.abs() < 1e-4);
    }

    #[test]
    fn zoom_is_clamped_to_limits() {
        let settings = snappy();
        let mut camera = CameraState::new(&settings);
        camera.zoom(1000.0);
        assert_eq!(camera.distance, settings.max_distance);
        camera.zoom(-1000.0);
        assert_eq!(camera.distance, settings.min_distance);
    }

    #[test]
    fn inputs_share_the_rotate_policy() {
        let settings = CameraConfig {
            invert_y: true,
            ..snappy()
        };
        let mut camera = CameraState::new(&settings);
        let start_pitch = camera.pitch;
        camera.idle_time = 5.0;

        camera.process_dpad((DPad::RIGHT | DPad::UP).bits(), 0.5);
        assert!((camera.yaw - normalize_degrees(180.0 + settings.dpad_speed * 0.5)).abs() < 1e-4);
        assert!((camera.pitch - (start_pitch - settings.dpad_speed * 0.5)).abs() < 1e-4);
        assert_eq!(camera.idle_time, 0.0);

        let before = camera.yaw;
        camera.process_right_stick(0.05, 0.05, 1.0);
        assert_eq!(camera.yaw, before);

        camera.process_mouse(10.0, 0.0, 0.016);
        assert!((camera.yaw - normalize_degrees(before + 10.0 * settings.mouse_sensitivity)).abs() < 1e-4);
    }

    #[test]
    fn idle_camera_drifts_behind_the_player() {
        let settings = CameraConfig {
            auto_center_enabled: true,
            auto_center_delay: 1.0,
            auto_center_speed: 90.0,
            ..snappy()
        };
        let mut camera = active_camera(&settings);
        camera.notify_player_moved(glm::vec3(100.0, 0.0, -50.0), 90.0);
        camera.rotate(20.0, 0.0);
        let rotated = camera.yaw;

        camera.update(0.5);
        assert!(!camera.auto_centering);
        assert_eq!(camera.yaw, rotated);

        camera.update(1.0);
        assert!(camera.auto_centering);
        // 200 -> -90 along the shorter arc is 70 degrees, 90 deg/s covers it.
        assert_eq!(camera.yaw, -90.0);
    }

    #[test]
    fn locked_camera_does_not_move() {
        let mut camera = active_camera(&snappy());
        let eye = camera.eye();
        camera.locked = true;
        camera.rotate(45.0, 0.0);
        camera.update(0.1);
        assert_eq!(camera.eye(), eye);
    }
}
