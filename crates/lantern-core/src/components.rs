use glam::{Mat4, Quat, Vec3};

/// Transform component. Present on every spawned entity.
#[derive(Debug, Clone)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub world_matrix: Mat4,
    pub parent: Option<hecs::Entity>,
    pub dirty: bool,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            world_matrix: Mat4::IDENTITY,
            parent: None,
            dirty: true,
        }
    }
}

impl Transform {
    pub fn local_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

/// Identifies this entity as a mesh to render.
#[derive(Debug, Clone)]
pub struct MeshRenderer {
    pub mesh_handle: MeshHandle,
    pub material_handle: MaterialHandle,
    pub cast_shadows: bool,
}

/// Newtype handle into the mesh cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshHandle(pub usize);

/// Newtype handle into the material cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialHandle(pub usize);

/// Camera component.
#[derive(Debug, Clone)]
pub struct Camera {
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub role: CameraRole,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CameraRole {
    Main,
    Other(String),
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            fov_degrees: 60.0,
            near: 0.1,
            far: 100.0,
            role: CameraRole::Main,
        }
    }
}

/// Orbit control around a target point. Drives the owning entity's transform.
#[derive(Debug, Clone)]
pub struct OrbitController {
    pub target: Vec3,
    pub distance: f32,
    /// Radians around +Y.
    pub yaw: f32,
    /// Radians above the XZ plane.
    pub pitch: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub pan_speed: f32,
}

impl Default for OrbitController {
    fn default() -> Self {
        Self {
            target: Vec3::ZERO,
            distance: 6.0,
            yaw: 0.0,
            pitch: 25.0_f32.to_radians(),
            min_distance: 0.5,
            max_distance: 200.0,
            rotate_speed: 0.005,
            zoom_speed: 0.1,
            pan_speed: 0.002,
        }
    }
}

/// Point light component.
#[derive(Debug, Clone)]
pub struct PointLight {
    pub color: Vec3,
    pub intensity: f32,
    pub range: f32,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            intensity: 1.0,
            range: 10.0,
        }
    }
}

/// Directional light component (sun-like, infinite distance).
#[derive(Debug, Clone)]
pub struct DirectionalLight {
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub shadow_extent: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(0.3, -1.0, 0.5).normalize(),
            color: Vec3::ONE,
            intensity: 1.0,
            shadow_extent: 20.0,
        }
    }
}

/// A patch of instanced grass blades scattered around the entity origin.
#[derive(Debug, Clone, PartialEq)]
pub struct Foliage {
    pub blade_count: u32,
    /// Half-width of the square patch on the XZ plane.
    pub extent: f32,
    pub blade_height: f32,
    pub seed: u64,
    pub wind_strength: f32,
}

impl Default for Foliage {
    fn default() -> Self {
        Self {
            blade_count: 4096,
            extent: 8.0,
            blade_height: 0.6,
            seed: 1,
            wind_strength: 0.3,
        }
    }
}

/// Tag component storing the entity's YAML id string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Name(pub String);

/// Marker component: entity is hidden from rendering.
#[derive(Debug, Clone, Copy)]
pub struct Hidden;
