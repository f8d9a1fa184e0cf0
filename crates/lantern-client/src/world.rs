//! Scene spawning into a `hecs::World`.

use std::collections::HashMap;

use hecs::{Entity, EntityBuilder, World};

use lantern_core::components::{
    Hidden, MaterialHandle, MeshHandle, MeshRenderer, Name, Transform,
};
use lantern_core::scene::{EntityDef, SceneFile};

/// Resolves asset paths named by scene entities to cache handles.
pub trait SceneAssets {
    fn mesh(&mut self, path: &str) -> Option<MeshHandle>;
    /// `None` path means the default material.
    fn material(&mut self, path: Option<&str>) -> Option<MaterialHandle>;
}

/// The ECS world plus the entity id registry of the loaded scene.
#[derive(Default)]
pub struct SceneWorld {
    pub world: World,
    /// YAML entity id to hecs entity.
    pub registry: HashMap<String, Entity>,
    pub scene: Option<SceneFile>,
}

impl SceneWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(&self, id: &str) -> Option<Entity> {
        self.registry.get(id).copied()
    }

    pub fn clear(&mut self) {
        self.world.clear();
        self.registry.clear();
        self.scene = None;
    }
}

/// Replace the world's contents with the entities of `scene`.
pub fn spawn_scene(scene_world: &mut SceneWorld, scene: &SceneFile, assets: &mut dyn SceneAssets) {
    scene_world.clear();
    for def in &scene.entities {
        let entity = spawn_entity(&mut scene_world.world, def, assets);
        scene_world.registry.insert(def.id.clone(), entity);
    }
    link_parents(scene_world, &scene.entities);
    scene_world.scene = Some(scene.clone());
    tracing::info!(
        "Scene '{}' loaded: {} entities",
        scene.name,
        scene.entities.len()
    );
}

fn spawn_entity(world: &mut World, def: &EntityDef, assets: &mut dyn SceneAssets) -> Entity {
    let c = &def.components;
    let mut builder = EntityBuilder::new();
    builder.add(Name(def.id.clone()));
    builder.add(
        c.transform
            .as_ref()
            .map(|t| t.to_component())
            .unwrap_or_default(),
    );

    if let Some(mr) = &c.mesh_renderer {
        let mesh = assets.mesh(&mr.mesh);
        let material = assets.material(mr.material.as_deref());
        match (mesh, material) {
            (Some(mesh_handle), Some(material_handle)) => {
                builder.add(MeshRenderer {
                    mesh_handle,
                    material_handle,
                    cast_shadows: mr.cast_shadows,
                });
            }
            _ => tracing::error!("Entity '{}': mesh renderer dropped", def.id),
        }
    }
    if let Some(cam) = &c.camera {
        builder.add(cam.to_component());
    }
    if let Some(orbit) = &c.orbit {
        builder.add(orbit.to_component());
    }
    if let Some(light) = &c.point_light {
        builder.add(light.to_component());
    }
    if let Some(light) = &c.directional_light {
        builder.add(light.to_component());
    }
    if let Some(foliage) = &c.foliage {
        builder.add(foliage.to_component());
    }
    if c.hidden {
        builder.add(Hidden);
    }
    world.spawn(builder.build())
}

fn link_parents(scene_world: &mut SceneWorld, defs: &[EntityDef]) {
    for def in defs {
        let Some(parent_id) = &def.parent else {
            continue;
        };
        let Some(parent) = scene_world.entity(parent_id) else {
            tracing::warn!("Entity '{}': parent '{}' not found", def.id, parent_id);
            continue;
        };
        let Some(child) = scene_world.entity(&def.id) else {
            continue;
        };
        if let Ok(mut transform) = scene_world.world.get::<&mut Transform>(child) {
            transform.parent = Some(parent);
            transform.dirty = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lantern_core::components::{Camera, Foliage, OrbitController, PointLight};
    use lantern_core::scene::parse_scene;

    #[derive(Default)]
    struct FakeAssets {
        meshes: Vec<String>,
    }

    impl SceneAssets for FakeAssets {
        fn mesh(&mut self, path: &str) -> Option<MeshHandle> {
            if path == "broken.glb" {
                return None;
            }
            let index = match self.meshes.iter().position(|m| m == path) {
                Some(i) => i,
                None => {
                    self.meshes.push(path.to_string());
                    self.meshes.len() - 1
                }
            };
            Some(MeshHandle(index))
        }

        fn material(&mut self, path: Option<&str>) -> Option<MaterialHandle> {
            Some(MaterialHandle(path.map_or(0, |_| 1)))
        }
    }

    const SCENE: &str = r#"
name: spawn
entities:
  - id: camera
    components:
      camera: { fov: 50 }
      orbit: { distance: 8 }
  - id: base
    components:
      mesh_renderer: { mesh: "procedural:cube" }
  - id: child
    extends: base
    parent: base
    components:
      transform: { position: [0, 1, 0] }
      mesh_renderer: { mesh: "procedural:cube", material: red.yaml, cast_shadows: false }
  - id: lamp
    components:
      point_light: { intensity: 3 }
  - id: grass
    components:
      foliage: { blade_count: 10 }
      hidden: true
  - id: broken
    components:
      mesh_renderer: { mesh: broken.glb }
"#;

    fn spawned() -> SceneWorld {
        let scene = parse_scene(SCENE).unwrap();
        let mut sw = SceneWorld::new();
        spawn_scene(&mut sw, &scene, &mut FakeAssets::default());
        sw
    }

    #[test]
    fn test_spawn_registers_every_entity() {
        let sw = spawned();
        assert_eq!(sw.registry.len(), 6);
        assert_eq!(sw.world.len(), 6);
        let cam = sw.entity("camera").unwrap();
        assert!(sw.world.get::<&Camera>(cam).is_ok());
        assert_eq!(sw.world.get::<&OrbitController>(cam).unwrap().distance, 8.0);
        let lamp = sw.entity("lamp").unwrap();
        assert_eq!(sw.world.get::<&PointLight>(lamp).unwrap().intensity, 3.0);
    }

    #[test]
    fn test_parent_links_and_materials() {
        let sw = spawned();
        let base = sw.entity("base").unwrap();
        let child = sw.entity("child").unwrap();
        assert_eq!(sw.world.get::<&Transform>(child).unwrap().parent, Some(base));
        let mr = sw.world.get::<&MeshRenderer>(child).unwrap();
        assert_eq!(mr.material_handle, MaterialHandle(1));
        assert!(!mr.cast_shadows);
        let base_mr = sw.world.get::<&MeshRenderer>(base).unwrap();
        assert_eq!(base_mr.mesh_handle, mr.mesh_handle);
        assert_eq!(base_mr.material_handle, MaterialHandle(0));
    }

    #[test]
    fn test_failed_mesh_keeps_entity() {
        let sw = spawned();
        let broken = sw.entity("broken").unwrap();
        assert!(sw.world.get::<&MeshRenderer>(broken).is_err());
        assert!(sw.world.get::<&Transform>(broken).is_ok());
        let grass = sw.entity("grass").unwrap();
        assert!(sw.world.get::<&Hidden>(grass).is_ok());
        assert_eq!(sw.world.get::<&Foliage>(grass).unwrap().blade_count, 10);
    }

    #[test]
    fn test_respawn_replaces_world() {
        let mut sw = spawned();
        let scene = parse_scene("name: empty\n").unwrap();
        spawn_scene(&mut sw, &scene, &mut FakeAssets::default());
        assert!(sw.registry.is_empty());
        assert_eq!(sw.world.len(), 0);
        assert_eq!(sw.scene.as_ref().map(|s| s.name.as_str()), Some("empty"));
    }
}
