//! Per-player simulated camera driven by gamepad sticks.
//!
//! Matrices are built left-handed with a [0, 1] depth range. `nalgebra-glm`
//! stores them column-major for column vectors, which is byte-for-byte the
//! row-major, row-vector layout the game's D3D math expects.

use nalgebra_glm as glm;
use serde::{Deserialize, Serialize};

use crate::input::GamepadState;

/// Stick and speed parameters shared by every slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraTuning {
    pub dead_zone: f32,
    pub movement_speed: f32,
    pub rotation_speed: f32,
    pub max_pitch: f32,
}

impl Default for CameraTuning {
    fn default() -> Self {
        Self {
            dead_zone: 0.15,
            movement_speed: 5.0,
            rotation_speed: 2.0,
            max_pitch: 89.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CameraState {
    position: glm::Vec3,
    /// Pitch, yaw, roll in degrees.
    rotation: glm::Vec3,
    forward: glm::Vec3,
    up: glm::Vec3,
    right: glm::Vec3,
    view: glm::Mat4,
    projection: glm::Mat4,
    pub fov: f32,
    pub aspect_ratio: f32,
    pub near_plane: f32,
    pub far_plane: f32,
    dirty: bool,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            position: glm::vec3(0.0, 0.0, 0.0),
            rotation: glm::vec3(0.0, 0.0, 0.0),
            forward: glm::vec3(0.0, 0.0, 1.0),
            up: glm::vec3(0.0, 1.0, 0.0),
            right: glm::vec3(1.0, 0.0, 0.0),
            view: glm::Mat4::identity(),
            projection: glm::Mat4::identity(),
            fov: 60.0,
            aspect_ratio: 16.0 / 9.0,
            near_plane: 0.1,
            far_plane: 1000.0,
            dirty: true,
        }
    }
}

impl CameraState {
    /// Starting camera for `slot`: players stand side by side at eye height.
    pub fn for_slot(slot: usize) -> Self {
        let mut camera = Self {
            position: glm::vec3(slot as f32 * 2.0, 1.7, -5.0),
            ..Self::default()
        };
        camera.update();
        camera
    }

    pub fn position(&self) -> [f32; 3] {
        [self.position.x, self.position.y, self.position.z]
    }

    pub fn rotation(&self) -> [f32; 3] {
        [self.rotation.x, self.rotation.y, self.rotation.z]
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_aspect_ratio(&mut self, aspect_ratio: f32) {
        if aspect_ratio.is_finite() && aspect_ratio > 0.0 && aspect_ratio != self.aspect_ratio {
            self.aspect_ratio = aspect_ratio;
            self.dirty = true;
        }
    }

    /// Advance the camera by one tick of stick input.
    ///
    /// The right stick turns (pitch clamped to ±`max_pitch`), the left stick
    /// moves along the current facing. Deflections inside the dead zone are
    /// ignored.
    pub fn apply_input(&mut self, input: &GamepadState, tuning: &CameraTuning, delta_time: f32) {
        let move_step = tuning.movement_speed * delta_time;
        let turn_step = tuning.rotation_speed * delta_time;

        let (rx, ry) = input.right_stick();
        if rx.abs() > tuning.dead_zone || ry.abs() > tuning.dead_zone {
            self.rotation.y += rx * turn_step;
            self.rotation.x = (self.rotation.x - ry * turn_step).clamp(-tuning.max_pitch, tuning.max_pitch);
            self.dirty = true;
        }

        let (mx, my) = input.left_stick();
        if mx.abs() > tuning.dead_zone || my.abs() > tuning.dead_zone {
            let yaw = self.rotation.y.to_radians();
            let pitch = self.rotation.x.to_radians();
            let forward = glm::vec3(yaw.sin() * pitch.cos(), pitch.sin(), yaw.cos() * pitch.cos());
            let right = glm::vec3(yaw.cos(), 0.0, -yaw.sin());
            self.position += forward * (my * move_step) + right * (mx * move_step);
            self.dirty = true;
        }

        if self.dirty {
            self.update();
        }
    }

    /// Rebuild basis vectors and matrices if anything changed.
    pub fn update(&mut self) {
        if !self.dirty {
            return;
        }

        let yaw = self.rotation.y.to_radians();
        let pitch = self.rotation.x.to_radians();
        self.forward = glm::normalize(&glm::vec3(
            yaw.sin() * pitch.cos(),
            pitch.sin(),
            yaw.cos() * pitch.cos(),
        ));
        let world_up = glm::vec3(0.0, 1.0, 0.0);
        self.right = glm::normalize(&glm::cross(&world_up, &self.forward));
        self.up = glm::normalize(&glm::cross(&self.forward, &self.right));

        self.view = glm::look_at_lh(&self.position, &(self.position + self.forward), &self.up);
        self.projection = glm::perspective_lh_zo(
            self.aspect_ratio,
            self.fov.to_radians(),
            self.near_plane,
            self.far_plane,
        );
        self.dirty = false;
    }

    /// View matrix in the game's memory layout.
    pub fn view_matrix(&self) -> [f32; 16] {
        to_array(&self.view)
    }

    /// Projection matrix in the game's memory layout.
    pub fn projection_matrix(&self) -> [f32; 16] {
        to_array(&self.projection)
    }
}

fn to_array(matrix: &glm::Mat4) -> [f32; 16] {
    let mut out = [0.0; 16];
    out.copy_from_slice(matrix.as_slice());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stick(lx: i16, ly: i16, rx: i16, ry: i16) -> GamepadState {
        GamepadState {
            thumb_lx: lx,
            thumb_ly: ly,
            thumb_rx: rx,
            thumb_ry: ry,
            ..GamepadState::default()
        }
    }

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_slot_start_positions() {
        assert_eq!(CameraState::for_slot(0).position(), [0.0, 1.7, -5.0]);
        assert_eq!(CameraState::for_slot(1).position(), [2.0, 1.7, -5.0]);
        assert!(!CameraState::for_slot(1).is_dirty());
    }

    #[test]
    fn test_dead_zone_ignores_small_deflection() {
        let mut camera = CameraState::for_slot(0);
        let before = camera.clone();
        camera.apply_input(&stick(3000, -3000, 4000, 0), &CameraTuning::default(), 1.0);
        assert_eq!(camera, before);
    }

    #[test]
    fn test_left_stick_moves_forward() {
        let mut camera = CameraState::for_slot(0);
        camera.apply_input(&stick(0, i16::MAX, 0, 0), &CameraTuning::default(), 0.5);
        let [x, y, z] = camera.position();
        assert!(approx(x, 0.0));
        assert!(approx(y, 1.7));
        assert!(z > -5.0 + 2.4 && z < -5.0 + 2.6);
    }

    #[test]
    fn test_pitch_is_clamped() {
        let mut camera = CameraState::for_slot(0);
        let tuning = CameraTuning {
            rotation_speed: 1000.0,
            ..CameraTuning::default()
        };
        camera.apply_input(&stick(0, 0, 0, i16::MIN), &tuning, 1.0);
        assert!(approx(camera.rotation()[0], 89.0));
        camera.apply_input(&stick(0, 0, 0, i16::MAX), &tuning, 1.0);
        assert!(approx(camera.rotation()[0], -89.0));
    }

    #[test]
    fn test_view_matrix_translates_eye_to_origin() {
        let camera = CameraState::for_slot(1);
        let view = glm::make_mat4(&camera.view_matrix());
        let eye = glm::vec4(2.0, 1.7, -5.0, 1.0);
        let in_view = view * eye;
        assert!(approx(in_view.x, 0.0));
        assert!(approx(in_view.y, 0.0));
        assert!(approx(in_view.z, 0.0));
    }

    #[test]
    fn test_projection_tracks_aspect_ratio() {
        let mut camera = CameraState::for_slot(0);
        let wide = camera.projection_matrix();
        camera.set_aspect_ratio(32.0 / 9.0);
        assert!(camera.is_dirty());
        camera.update();
        let wider = camera.projection_matrix();
        assert!(wider[0] < wide[0]);
        assert!(approx(wider[5], wide[5]));
    }
}
