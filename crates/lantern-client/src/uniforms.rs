//! GPU uniform layouts shared with the built-in WGSL.
//!
//! Field order and padding follow WGSL alignment rules; the size tests below
//! pin every struct to the byte size the shaders expect.

use glam::{Mat3, Mat4, Vec3};

use lantern_core::rng::SplitMix64;

pub const MAX_LIGHTS: usize = 32;

/// Each draw gets its own 256-byte slot (the dynamic offset alignment).
pub const DRAW_UNIFORM_SIZE: u64 = 256;
pub const INITIAL_DRAW_CAPACITY: u32 = 64;

pub const SSAO_KERNEL_SIZE: usize = 32;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    pub view: [[f32; 4]; 4],            // offset 0
    pub projection: [[f32; 4]; 4],      // offset 64
    pub view_projection: [[f32; 4]; 4], // offset 128
    pub position: [f32; 3],             // offset 192
    pub near_plane: f32,                // offset 204
    pub far_plane: f32,                 // offset 208
    pub _pad1: f32,                     // offset 212
    pub viewport_size: [f32; 2],        // offset 216
    pub _pad2: [f32; 4],                // offset 224
    pub inv_view_projection: [[f32; 4]; 4], // offset 240, total 304
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Mat4::IDENTITY, Vec3::ZERO, 0.1, 100.0, (1, 1))
    }
}

impl CameraUniform {
    pub fn new(
        view: Mat4,
        projection: Mat4,
        position: Vec3,
        near: f32,
        far: f32,
        viewport: (u32, u32),
    ) -> Self {
        let view_projection = projection * view;
        Self {
            view: view.to_cols_array_2d(),
            projection: projection.to_cols_array_2d(),
            view_projection: view_projection.to_cols_array_2d(),
            position: position.to_array(),
            near_plane: near,
            far_plane: far,
            _pad1: 0.0,
            viewport_size: [viewport.0 as f32, viewport.1 as f32],
            _pad2: [0.0; 4],
            inv_view_projection: view_projection.inverse().to_cols_array_2d(),
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PointLightUniform {
    pub position: [f32; 3],
    pub range: f32,
    pub color: [f32; 3],
    pub intensity: f32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightingUniforms {
    pub light_count: u32,
    pub has_directional: u32,
    /// 0 when no pass renders the shadow map this frame.
    pub shadow_enabled: u32,
    pub ao_enabled: u32,
    pub ambient: [f32; 3],
    pub _pad: f32,
    // Directional light (offset 32)
    pub dir_light_direction: [f32; 3],
    pub dir_light_intensity: f32,
    pub dir_light_color: [f32; 3],
    pub _pad2: f32,
    // Shadow light VP matrix (offset 64)
    pub light_vp: [[f32; 4]; 4],
    // Point lights (offset 128)
    pub lights: [PointLightUniform; MAX_LIGHTS],
}

impl Default for LightingUniforms {
    fn default() -> Self {
        Self {
            light_count: 0,
            has_directional: 0,
            shadow_enabled: 0,
            ao_enabled: 0,
            ambient: [0.1; 3],
            _pad: 0.0,
            dir_light_direction: [0.0, -1.0, 0.0],
            dir_light_intensity: 0.0,
            dir_light_color: [1.0; 3],
            _pad2: 0.0,
            light_vp: Mat4::IDENTITY.to_cols_array_2d(),
            lights: [PointLightUniform::default(); MAX_LIGHTS],
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ShadowUniforms {
    pub light_vp: [[f32; 4]; 4],
}

impl Default for ShadowUniforms {
    fn default() -> Self {
        Self {
            light_vp: Mat4::IDENTITY.to_cols_array_2d(),
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FrameUniforms {
    pub time: f32,
    pub delta: f32,
    pub wind_strength: f32,
    pub frame: u32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DrawUniforms {
    pub model_matrix: [[f32; 4]; 4],
    pub normal_matrix: [[f32; 4]; 4],
    pub base_color: [f32; 4],
    pub roughness: f32,
    pub metallic: f32,
    pub _pad: [f32; 2],
    pub emission: [f32; 4],
    pub _padding: [f32; 20],
}

impl DrawUniforms {
    pub fn new(model: Mat4, base_color: [f32; 4], roughness: f32, metallic: f32, emission: [f32; 4]) -> Self {
        Self {
            model_matrix: model.to_cols_array_2d(),
            normal_matrix: normal_matrix(model).to_cols_array_2d(),
            base_color,
            roughness,
            metallic,
            _pad: [0.0; 2],
            emission,
            _padding: [0.0; 20],
        }
    }
}

/// Inverse-transpose of the upper 3x3, widened back to a mat4.
pub fn normal_matrix(model: Mat4) -> Mat4 {
    let m = Mat3::from_mat4(model);
    if m.determinant().abs() < 1e-8 {
        return Mat4::IDENTITY;
    }
    Mat4::from_mat3(m.inverse().transpose())
}

/// Capacity bookkeeping for the dynamic-offset draw buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawUniformPool {
    capacity: u32,
}

impl Default for DrawUniformPool {
    fn default() -> Self {
        Self::new()
    }
}

impl DrawUniformPool {
    pub fn new() -> Self {
        Self {
            capacity: INITIAL_DRAW_CAPACITY,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn buffer_size(&self) -> u64 {
        self.capacity as u64 * DRAW_UNIFORM_SIZE
    }

    pub fn offset(index: u32) -> u32 {
        index * DRAW_UNIFORM_SIZE as u32
    }

    /// Grow to the next power of two holding `draws`. Returns the new
    /// capacity when the buffer must be replaced.
    pub fn reserve(&mut self, draws: usize) -> Option<u32> {
        if draws <= self.capacity as usize {
            return None;
        }
        let wanted = (draws as u32).next_power_of_two().max(INITIAL_DRAW_CAPACITY);
        tracing::debug!("Growing draw uniform pool {} -> {}", self.capacity, wanted);
        self.capacity = wanted;
        Some(wanted)
    }
}

/// Hemisphere sample kernel for SSAO: every sample has z >= 0 and length <= 1,
/// with samples clustered toward the origin.
pub fn ssao_kernel(n: usize, seed: u64) -> Vec<[f32; 4]> {
    let mut rng = SplitMix64::new(seed);
    (0..n)
        .map(|i| {
            let dir = Vec3::new(rng.next_signed(), rng.next_signed(), rng.next_unit());
            let dir = dir.try_normalize().unwrap_or(Vec3::Z);
            let t = i as f32 / n.max(1) as f32;
            let scale = 0.1 + 0.9 * t * t;
            let v = dir * rng.next_unit() * scale;
            [v.x, v.y, v.z, 0.0]
        })
        .collect()
}

/// 4x4 tile of random rotation vectors in the tangent plane.
pub fn ssao_noise(seed: u64) -> [[f32; 4]; 16] {
    let mut rng = SplitMix64::new(seed);
    let mut out = [[0.0; 4]; 16];
    for texel in out.iter_mut() {
        *texel = [rng.next_signed(), rng.next_signed(), 0.0, 0.0];
    }
    out
}

/// Encode signed vectors into RGBA8 unorm texels (`v * 0.5 + 0.5`).
pub fn encode_unorm8(texels: &[[f32; 4]]) -> Vec<u8> {
    texels
        .iter()
        .flat_map(|t| t.map(|c| ((c * 0.5 + 0.5).clamp(0.0, 1.0) * 255.0).round() as u8))
        .collect()
}
