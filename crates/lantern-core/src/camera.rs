//! Camera math: orbit control, view/projection matrices and the light-space
//! matrix used by shadow passes.

use glam::{Mat4, Quat, Vec3};

use crate::components::{Camera, OrbitController};

const MAX_PITCH: f32 = 89.0 * std::f32::consts::PI / 180.0;

impl OrbitController {
    /// Eye position on a sphere of radius `distance` around `target`.
    pub fn eye(&self) -> Vec3 {
        let (sy, cy) = self.yaw.sin_cos();
        let (sp, cp) = self.pitch.sin_cos();
        self.target + Vec3::new(sy * cp, sp, cy * cp) * self.distance
    }

    /// Rotate by a mouse delta in pixels.
    pub fn rotate(&mut self, dx: f32, dy: f32) {
        self.yaw -= dx * self.rotate_speed;
        self.pitch = (self.pitch + dy * self.rotate_speed).clamp(-MAX_PITCH, MAX_PITCH);
    }

    /// Zoom by scroll lines. Positive scroll moves closer.
    pub fn zoom(&mut self, scroll: f32) {
        let factor = (1.0 - scroll * self.zoom_speed).max(0.05);
        self.distance = (self.distance * factor).clamp(self.min_distance, self.max_distance);
    }

    /// Move the target in the camera plane. Scaled by distance so panning
    /// feels the same at any zoom level.
    pub fn pan(&mut self, dx: f32, dy: f32) {
        let (_, rotation) = self.transform();
        let right = rotation * Vec3::X;
        let up = rotation * Vec3::Y;
        let scale = self.pan_speed * self.distance;
        self.target += (-right * dx + up * dy) * scale;
    }

    /// Camera `(position, rotation)` looking at the target.
    pub fn transform(&self) -> (Vec3, Quat) {
        let eye = self.eye();
        let forward = (self.target - eye).normalize_or_zero();
        if forward == Vec3::ZERO {
            return (eye, Quat::IDENTITY);
        }
        // look_to_rh gives world->view; its inverse rotation is the camera's orientation
        let view = Mat4::look_to_rh(eye, forward, Vec3::Y);
        let (_, rotation, _) = view.inverse().to_scale_rotation_translation();
        (eye, rotation.normalize())
    }
}

pub fn view_matrix(position: Vec3, rotation: Quat) -> Mat4 {
    Mat4::look_to_rh(position, rotation * Vec3::NEG_Z, rotation * Vec3::Y)
}

pub fn projection_matrix(camera: &Camera, aspect: f32) -> Mat4 {
    let aspect = if aspect.is_finite() && aspect > 0.0 {
        aspect
    } else {
        1.0
    };
    Mat4::perspective_rh(camera.fov_degrees.to_radians(), aspect, camera.near, camera.far)
}

/// Smallest half-size of the shadow frustum.
const MIN_SHADOW_EXTENT: f32 = 0.01;

/// Orthographic light-space matrix covering `extent` around `focus`.
/// Non-positive or NaN extents are clamped to a small frustum.
pub fn directional_light_view_projection(direction: Vec3, focus: Vec3, extent: f32) -> Mat4 {
    let extent = extent.max(MIN_SHADOW_EXTENT);
    let dir = direction.normalize_or_zero();
    let dir = if dir == Vec3::ZERO { Vec3::NEG_Y } else { dir };
    // look_at degenerates when the view direction is parallel to the up vector
    let up = if dir.dot(Vec3::Y).abs() > 0.99 {
        Vec3::Z
    } else {
        Vec3::Y
    };
    let distance = extent * 1.5;
    let light_pos = focus - dir * distance;
    let light_view = Mat4::look_at_rh(light_pos, focus, up);
    let light_proj = Mat4::orthographic_rh(-extent, extent, -extent, extent, 0.0, distance * 2.0);
    light_proj * light_view
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-4
    }

    #[test]
    fn test_eye_on_sphere() {
        let orbit = OrbitController {
            target: Vec3::new(1.0, 0.0, 0.0),
            distance: 5.0,
            yaw: 0.0,
            pitch: 0.0,
            ..Default::default()
        };
        assert!(approx(orbit.eye(), Vec3::new(1.0, 0.0, 5.0)));
    }

    #[test]
    fn test_pitch_clamped() {
        let mut orbit = OrbitController::default();
        orbit.rotate(0.0, 1.0e6);
        assert!(orbit.pitch <= MAX_PITCH);
        orbit.rotate(0.0, -1.0e7);
        assert!(orbit.pitch >= -MAX_PITCH);
    }

    #[test]
    fn test_zoom_clamped() {
        let mut orbit = OrbitController::default();
        for _ in 0..200 {
            orbit.zoom(5.0);
        }
        assert_eq!(orbit.distance, orbit.min_distance);
        for _ in 0..200 {
            orbit.zoom(-5.0);
        }
        assert_eq!(orbit.distance, orbit.max_distance);
    }

    #[test]
    fn test_transform_looks_at_target() {
        let orbit = OrbitController {
            target: Vec3::new(0.0, 1.0, 0.0),
            yaw: 0.7,
            pitch: 0.3,
            ..Default::default()
        };
        let (pos, rot) = orbit.transform();
        let forward = rot * Vec3::NEG_Z;
        let expected = (orbit.target - pos).normalize();
        assert!(approx(forward, expected));
    }

    #[test]
    fn test_pan_keeps_offset() {
        let mut orbit = OrbitController::default();
        let offset_before = orbit.eye() - orbit.target;
        orbit.pan(100.0, 50.0);
        assert_ne!(orbit.target, Vec3::ZERO);
        assert!(approx(orbit.eye() - orbit.target, offset_before));
    }

    #[test]
    fn test_view_matrix_maps_eye_to_origin() {
        let orbit = OrbitController::default();
        let (pos, rot) = orbit.transform();
        let view = view_matrix(pos, rot);
        assert!(approx(view.transform_point3(pos), Vec3::ZERO));
        // Target sits straight ahead on -Z
        let t = view.transform_point3(orbit.target);
        assert!(t.x.abs() < 1e-4 && t.y.abs() < 1e-4 && t.z < 0.0);
    }

    #[test]
    fn test_projection_handles_zero_aspect() {
        let m = projection_matrix(&Camera::default(), 0.0);
        assert!(m.is_finite());
    }

    #[test]
    fn test_light_vp_straight_down_is_finite() {
        let m = directional_light_view_projection(Vec3::NEG_Y, Vec3::ZERO, 10.0);
        assert!(m.is_finite());
        // Focus lands inside the clip volume
        let p = m.project_point3(Vec3::ZERO);
        assert!(p.x.abs() <= 1.0 && p.y.abs() <= 1.0 && (0.0..=1.0).contains(&p.z));
    }

    #[test]
    fn test_light_vp_degenerate_extent_is_finite() {
        for extent in [0.0, -4.0, f32::NAN] {
            let m = directional_light_view_projection(Vec3::new(0.3, -1.0, 0.5), Vec3::ZERO, extent);
            assert!(m.is_finite(), "extent {extent}");
            let p = m.project_point3(Vec3::ZERO);
            assert!(p.is_finite() && (0.0..=1.0).contains(&p.z), "extent {extent} -> {p:?}");
        }
    }

    #[test]
    fn test_light_vp_covers_extent() {
        let m = directional_light_view_projection(Vec3::new(0.3, -1.0, 0.5), Vec3::ZERO, 10.0);
        for corner in [Vec3::new(5.0, 0.0, 5.0), Vec3::new(-5.0, 0.0, -5.0)] {
            let p = m.project_point3(corner);
            assert!(p.x.abs() <= 1.0 && p.y.abs() <= 1.0, "{corner:?} -> {p:?}");
            assert!((0.0..=1.0).contains(&p.z));
        }
    }
}
