use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use glam::{EulerRot, Quat, Vec3};

use crate::components::{
    Camera, CameraRole, DirectionalLight, Foliage, OrbitController, PointLight, Transform,
};

#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("failed to read scene {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("scene YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("inheritance cycle detected at entity '{0}'")]
    InheritanceCycle(String),
    #[error("entity '{child}' extends missing parent '{parent}'")]
    MissingParent { child: String, parent: String },
    #[error("duplicate entity id '{0}'")]
    DuplicateId(String),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SceneFile {
    pub name: String,
    #[serde(default)]
    pub settings: SceneSettings,
    #[serde(default)]
    pub entities: Vec<EntityDef>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SceneSettings {
    #[serde(default = "default_ambient")]
    pub ambient_light: [f32; 3],
    /// Overrides the clear colour of passes that clear the surface.
    #[serde(default)]
    pub clear_color: Option<[f32; 4]>,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            ambient_light: default_ambient(),
            clear_color: None,
        }
    }
}

fn default_ambient() -> [f32; 3] {
    [0.1, 0.1, 0.1]
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EntityDef {
    pub id: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub extends: Option<String>,
    /// Transform parent, by entity id.
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub components: ComponentMap,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ComponentMap {
    #[serde(default)]
    pub transform: Option<TransformDef>,
    #[serde(default)]
    pub mesh_renderer: Option<MeshRendererDef>,
    #[serde(default)]
    pub camera: Option<CameraDef>,
    #[serde(default)]
    pub orbit: Option<OrbitDef>,
    #[serde(default)]
    pub point_light: Option<PointLightDef>,
    #[serde(default)]
    pub directional_light: Option<DirectionalLightDef>,
    #[serde(default)]
    pub foliage: Option<FoliageDef>,
    #[serde(default)]
    pub hidden: bool,
    /// Absorbs unknown component types.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransformDef {
    #[serde(default)]
    pub position: [f32; 3],
    /// Euler angles in degrees, applied Y then X then Z.
    #[serde(default)]
    pub rotation: [f32; 3],
    #[serde(default = "default_scale")]
    pub scale: [f32; 3],
}

fn default_scale() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

impl TransformDef {
    pub fn to_component(&self) -> Transform {
        let [rx, ry, rz] = self.rotation.map(f32::to_radians);
        Transform {
            position: Vec3::from(self.position),
            rotation: Quat::from_euler(EulerRot::YXZ, ry, rx, rz),
            scale: Vec3::from(self.scale),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MeshRendererDef {
    pub mesh: String,
    #[serde(default)]
    pub material: Option<String>,
    #[serde(default = "default_true")]
    pub cast_shadows: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CameraDef {
    #[serde(default = "default_fov")]
    pub fov: f32,
    #[serde(default = "default_near")]
    pub near: f32,
    #[serde(default = "default_far")]
    pub far: f32,
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_fov() -> f32 {
    60.0
}
fn default_near() -> f32 {
    0.1
}
fn default_far() -> f32 {
    100.0
}
fn default_role() -> String {
    "main".to_string()
}

impl CameraDef {
    pub fn to_component(&self) -> Camera {
        Camera {
            fov_degrees: self.fov,
            near: self.near,
            far: self.far,
            role: if self.role == "main" {
                CameraRole::Main
            } else {
                CameraRole::Other(self.role.clone())
            },
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OrbitDef {
    #[serde(default)]
    pub target: Option<[f32; 3]>,
    #[serde(default)]
    pub distance: Option<f32>,
    /// Degrees.
    #[serde(default)]
    pub yaw: Option<f32>,
    /// Degrees.
    #[serde(default)]
    pub pitch: Option<f32>,
}

impl OrbitDef {
    pub fn to_component(&self) -> OrbitController {
        let d = OrbitController::default();
        OrbitController {
            target: self.target.map(Vec3::from).unwrap_or(d.target),
            distance: self.distance.unwrap_or(d.distance),
            yaw: self.yaw.map(f32::to_radians).unwrap_or(d.yaw),
            pitch: self.pitch.map(f32::to_radians).unwrap_or(d.pitch),
            ..d
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PointLightDef {
    #[serde(default = "default_white")]
    pub color: [f32; 3],
    #[serde(default = "default_intensity")]
    pub intensity: f32,
    #[serde(default = "default_range")]
    pub range: f32,
}

fn default_white() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}
fn default_intensity() -> f32 {
    1.0
}
fn default_range() -> f32 {
    10.0
}

impl PointLightDef {
    pub fn to_component(&self) -> PointLight {
        PointLight {
            color: Vec3::from(self.color),
            intensity: self.intensity,
            range: self.range,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DirectionalLightDef {
    #[serde(default = "default_sun_direction")]
    pub direction: [f32; 3],
    #[serde(default = "default_white")]
    pub color: [f32; 3],
    #[serde(default = "default_intensity")]
    pub intensity: f32,
    #[serde(default = "default_shadow_extent")]
    pub shadow_extent: f32,
}

fn default_sun_direction() -> [f32; 3] {
    [0.3, -1.0, 0.5]
}
fn default_shadow_extent() -> f32 {
    20.0
}

impl DirectionalLightDef {
    pub fn to_component(&self) -> DirectionalLight {
        let dir = Vec3::from(self.direction).normalize_or_zero();
        DirectionalLight {
            direction: if dir == Vec3::ZERO { Vec3::NEG_Y } else { dir },
            color: Vec3::from(self.color),
            intensity: self.intensity,
            shadow_extent: self.shadow_extent,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FoliageDef {
    #[serde(default)]
    pub blade_count: Option<u32>,
    #[serde(default)]
    pub extent: Option<f32>,
    #[serde(default)]
    pub blade_height: Option<f32>,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub wind_strength: Option<f32>,
}

impl FoliageDef {
    pub fn to_component(&self) -> Foliage {
        let d = Foliage::default();
        Foliage {
            blade_count: self.blade_count.unwrap_or(d.blade_count),
            extent: self.extent.unwrap_or(d.extent),
            blade_height: self.blade_height.unwrap_or(d.blade_height),
            seed: self.seed.unwrap_or(d.seed),
            wind_strength: self.wind_strength.unwrap_or(d.wind_strength),
        }
    }
}

/// Load and parse a scene YAML file, resolving entity inheritance.
pub fn load_scene(path: &Path) -> Result<SceneFile, SceneError> {
    let contents = std::fs::read_to_string(path).map_err(|source| SceneError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_scene(&contents)
}

/// Parse scene YAML and resolve inheritance.
pub fn parse_scene(source: &str) -> Result<SceneFile, SceneError> {
    let mut scene: SceneFile = serde_yaml::from_str(source)?;
    scene.entities = resolve_inheritance(&scene)?;
    for entity in &scene.entities {
        for key in entity.components.extra.keys() {
            tracing::warn!("Entity '{}': ignoring unknown component '{}'", entity.id, key);
        }
    }
    Ok(scene)
}

/// Resolve `extends` chains of any depth. Child component groups override
/// the parent's; the result has no `extends` left.
pub fn resolve_inheritance(scene: &SceneFile) -> Result<Vec<EntityDef>, SceneError> {
    let mut by_id: HashMap<&str, &EntityDef> = HashMap::new();
    for entity in &scene.entities {
        if by_id.insert(entity.id.as_str(), entity).is_some() {
            return Err(SceneError::DuplicateId(entity.id.clone()));
        }
    }

    let mut cache: HashMap<String, EntityDef> = HashMap::new();
    scene
        .entities
        .iter()
        .map(|e| resolve_one(e, &by_id, &mut cache, &mut HashSet::new()))
        .collect()
}

fn resolve_one(
    entity: &EntityDef,
    by_id: &HashMap<&str, &EntityDef>,
    cache: &mut HashMap<String, EntityDef>,
    visiting: &mut HashSet<String>,
) -> Result<EntityDef, SceneError> {
    if let Some(done) = cache.get(&entity.id) {
        return Ok(done.clone());
    }
    let Some(parent_id) = &entity.extends else {
        return Ok(entity.clone());
    };
    if !visiting.insert(entity.id.clone()) {
        return Err(SceneError::InheritanceCycle(entity.id.clone()));
    }
    let parent = by_id
        .get(parent_id.as_str())
        .ok_or_else(|| SceneError::MissingParent {
            child: entity.id.clone(),
            parent: parent_id.clone(),
        })?;
    let parent = resolve_one(parent, by_id, cache, visiting)?;
    let merged = merge_entity(&parent, entity);
    visiting.remove(&entity.id);
    cache.insert(entity.id.clone(), merged.clone());
    Ok(merged)
}

/// Merge parent entity components into child. Child fields win.
fn merge_entity(parent: &EntityDef, child: &EntityDef) -> EntityDef {
    let mut merged = child.clone();
    merged.extends = None;

    let (c, p) = (&mut merged.components, &parent.components);
    c.transform = c.transform.take().or_else(|| p.transform.clone());
    c.mesh_renderer = c.mesh_renderer.take().or_else(|| p.mesh_renderer.clone());
    c.camera = c.camera.take().or_else(|| p.camera.clone());
    c.orbit = c.orbit.take().or_else(|| p.orbit.clone());
    c.point_light = c.point_light.take().or_else(|| p.point_light.clone());
    c.directional_light = c
        .directional_light
        .take()
        .or_else(|| p.directional_light.clone());
    c.foliage = c.foliage.take().or_else(|| p.foliage.clone());
    c.hidden |= p.hidden;
    for (key, value) in &p.extra {
        c.extra.entry(key.clone()).or_insert_with(|| value.clone());
    }

    if merged.tags.is_empty() {
        merged.tags = parent.tags.clone();
    }
    if merged.parent.is_none() {
        merged.parent = parent.parent.clone();
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scene() {
        let yaml = r#"
name: "Test Scene"
settings:
  ambient_light: [0.2, 0.2, 0.25]
entities:
  - id: main_camera
    components:
      transform:
        position: [0, 2, -5]
      camera:
        fov: 75
      orbit:
        distance: 8
        pitch: 30
  - id: cube_01
    components:
      mesh_renderer:
        mesh: procedural:cube
        material: materials/red.yaml
  - id: sun
    components:
      directional_light:
        direction: [0, -1, 0]
        intensity: 2.0
  - id: grass
    components:
      foliage:
        blade_count: 100
"#;
        let scene = parse_scene(yaml).unwrap();
        assert_eq!(scene.name, "Test Scene");
        assert_eq!(scene.settings.clear_color, None);
        assert_eq!(scene.entities.len(), 4);

        let cam = &scene.entities[0].components;
        assert_eq!(cam.camera.as_ref().unwrap().to_component().role, CameraRole::Main);
        let orbit = cam.orbit.as_ref().unwrap().to_component();
        assert_eq!(orbit.distance, 8.0);
        assert!((orbit.pitch - 30f32.to_radians()).abs() < 1e-6);

        let mr = scene.entities[1].components.mesh_renderer.as_ref().unwrap();
        assert!(mr.cast_shadows);
        assert_eq!(mr.material.as_deref(), Some("materials/red.yaml"));

        let sun = scene.entities[2].components.directional_light.as_ref().unwrap();
        assert_eq!(sun.to_component().direction, Vec3::NEG_Y);

        let grass = scene.entities[3].components.foliage.as_ref().unwrap().to_component();
        assert_eq!(grass.blade_count, 100);
        assert_eq!(grass.seed, Foliage::default().seed);
    }

    #[test]
    fn test_parse_scene_clear_color() {
        let scene = parse_scene("name: dusk\nsettings:\n  clear_color: [0.5, 0.3, 0.2, 1.0]\n").unwrap();
        assert_eq!(scene.settings.clear_color, Some([0.5, 0.3, 0.2, 1.0]));
        assert_eq!(scene.settings.ambient_light, default_ambient());
    }

    #[test]
    fn test_transform_def_rotation_degrees() {
        let def = TransformDef {
            position: [1.0, 2.0, 3.0],
            rotation: [0.0, 90.0, 0.0],
            scale: [1.0; 3],
        };
        let t = def.to_component();
        let x = t.rotation * Vec3::X;
        assert!((x - Vec3::NEG_Z).length() < 1e-5);
        assert_eq!(t.position, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_multi_level_inheritance() {
        let yaml = r#"
name: "Inheritance Test"
entities:
  - id: torch_base
    tags: [torch]
    components:
      transform:
        position: [0, 0, 0]
      mesh_renderer:
        mesh: meshes/torch.obj
      point_light:
        color: [1.0, 0.7, 0.3]
        intensity: 8.0
  - id: torch_02
    extends: torch_base
    components:
      transform:
        position: [3, 0, 0]
  - id: torch_03
    extends: torch_02
    components:
      point_light:
        intensity: 2.0
"#;
        let scene = parse_scene(yaml).unwrap();
        let t3 = &scene.entities[2];
        assert!(t3.extends.is_none());
        assert_eq!(t3.tags, vec!["torch".to_string()]);
        assert_eq!(
            t3.components.transform.as_ref().unwrap().position,
            [3.0, 0.0, 0.0]
        );
        assert!(t3.components.mesh_renderer.is_some());
        // Whole component group is replaced, not merged field by field
        let light = t3.components.point_light.as_ref().unwrap();
        assert_eq!(light.intensity, 2.0);
        assert_eq!(light.color, [1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_child_declared_before_parent() {
        let yaml = r#"
name: order
entities:
  - id: child
    extends: base
  - id: base
    components:
      camera: {}
"#;
        let scene = parse_scene(yaml).unwrap();
        assert!(scene.entities[0].components.camera.is_some());
    }

    #[test]
    fn test_missing_parent() {
        let yaml = "name: x\nentities:\n  - id: a\n    extends: ghost\n";
        let err = parse_scene(yaml).unwrap_err();
        assert!(matches!(err, SceneError::MissingParent { ref parent, .. } if parent == "ghost"));
    }

    #[test]
    fn test_inheritance_cycle() {
        let yaml = r#"
name: x
entities:
  - id: a
    extends: c
  - id: b
    extends: a
  - id: c
    extends: b
"#;
        assert!(matches!(
            parse_scene(yaml),
            Err(SceneError::InheritanceCycle(_))
        ));

        let self_ref = "name: x\nentities:\n  - id: a\n    extends: a\n";
        assert!(matches!(
            parse_scene(self_ref),
            Err(SceneError::InheritanceCycle(_))
        ));
    }

    #[test]
    fn test_duplicate_ids() {
        let yaml = "name: x\nentities:\n  - id: a\n  - id: a\n";
        assert!(matches!(parse_scene(yaml), Err(SceneError::DuplicateId(_))));
    }

    #[test]
    fn test_unknown_components_absorbed() {
        let yaml = r#"
name: "Forward Compat"
entities:
  - id: player
    components:
      transform:
        position: [0, 0, 0]
      rigid_body:
        mass: 70.0
"#;
        let scene = parse_scene(yaml).unwrap();
        assert!(scene.entities[0].components.transform.is_some());
        assert!(scene.entities[0].components.extra.contains_key("rigid_body"));
    }

    #[test]
    fn test_load_scene_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.yaml");
        std::fs::write(&path, "name: file\nentities: []\n").unwrap();
        assert_eq!(load_scene(&path).unwrap().name, "file");
        assert!(matches!(
            load_scene(&dir.path().join("missing.yaml")),
            Err(SceneError::Io { .. })
        ));
    }
}
