//! Prepare system: turns a graph file into an execution plan and gathers the
//! per-frame uniform data from the world.

use glam::{Mat4, Vec3};
use hecs::{Entity, World};

use lantern_core::camera::{directional_light_view_projection, projection_matrix, view_matrix};
use lantern_core::components::{
    Camera, CameraRole, DirectionalLight, Foliage, Hidden, MeshHandle, MeshRenderer,
    OrbitController, PointLight, Transform,
};
use lantern_core::foliage::{scatter, FoliageInstance};
use lantern_core::schedule::Time;

use std::path::Path;

use crate::builtins::{self, draw_buffer_desc, instance_buffer_desc};
use crate::descriptors::SURFACE;
use crate::graph::{self, Attachment, DepthAttachment, DrawKind, GraphError, GraphFile, PassDef};
use crate::material::{Material, MaterialCache};
use crate::storage::{ResourceKey, ResourceKind, StorageError, StorageManager};
use crate::uniforms::{
    CameraUniform, DrawUniformPool, DrawUniforms, FrameUniforms, LightingUniforms,
    PointLightUniform, ShadowUniforms, MAX_LIGHTS,
};

/// One pass of the plan, in execution order.
#[derive(Debug, Clone)]
pub struct PreparedPass {
    pub name: String,
    pub pipeline: String,
    pub color: Vec<Attachment>,
    pub depth: Option<DepthAttachment>,
    pub bind_groups: Vec<String>,
    pub draw_group: Option<u32>,
    pub draw: DrawKind,
    pub enabled: bool,
    /// Every storage key the pass touches.
    pub keys: Vec<ResourceKey>,
}

impl PreparedPass {
    fn from_def(def: &PassDef) -> Self {
        let mut keys = vec![ResourceKind::RenderPipeline.key(&def.pipeline)];
        let mut push = |key: ResourceKey| {
            if !keys.contains(&key) {
                keys.push(key);
            }
        };
        for bg in &def.bind_groups {
            push(ResourceKind::BindGroup.key(bg));
        }
        for target in graph::pass_writes(def) {
            if target != SURFACE {
                push(ResourceKind::Texture.key(target));
            }
        }
        for read in &def.reads {
            push(ResourceKind::Texture.key(read));
        }
        if def.draw == DrawKind::Foliage {
            push(ResourceKind::Buffer.key(builtins::FOLIAGE_INSTANCES));
        }
        Self {
            name: def.name.clone(),
            pipeline: def.pipeline.clone(),
            color: def.color.clone(),
            depth: def.depth.clone(),
            bind_groups: def.bind_groups.clone(),
            draw_group: def.draw_group,
            draw: def.draw.clone(),
            enabled: def.enabled,
            keys,
        }
    }

    pub fn writes(&self, texture: &str) -> bool {
        self.color.iter().any(|a| a.target == texture)
            || self.depth.as_ref().is_some_and(|d| d.target == texture)
    }

    pub fn writes_surface(&self) -> bool {
        self.color.iter().any(|a| a.target == SURFACE)
    }
}

#[derive(Debug, Clone)]
pub struct PreparedGraph {
    pub name: String,
    pub passes: Vec<PreparedPass>,
}

impl PreparedGraph {
    /// Register the graph's resources, validate everything and order the
    /// passes. Nothing touches the GPU here.
    pub fn prepare(
        graph: &GraphFile,
        storage: &mut StorageManager,
        root: &Path,
    ) -> Result<Self, GraphError> {
        graph::register_resources(graph, storage, root)?;

        let mut problems: Vec<String> = storage.validate().iter().map(|e| e.to_string()).collect();
        problems.extend(graph::validate(graph, storage).iter().map(|e| e.to_string()));
        if !problems.is_empty() {
            return Err(GraphError::Invalid(problems));
        }

        let order = graph::build_order(&graph.passes, storage)?;
        let passes: Vec<PreparedPass> = order
            .iter()
            .map(|&i| PreparedPass::from_def(&graph.passes[i]))
            .collect();
        let names: Vec<&str> = passes.iter().map(|p| p.name.as_str()).collect();
        tracing::info!("Graph '{}' order: {}", graph.name, names.join(" -> "));

        Ok(Self {
            name: graph.name.clone(),
            passes,
        })
    }

    /// Realise every key used by any pass. Disabled passes are included so
    /// toggling them back on never stalls a frame.
    pub fn ensure_all(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        storage: &mut StorageManager,
    ) -> Result<(), StorageError> {
        for pass in &self.passes {
            for key in &pass.keys {
                storage.ensure(device, queue, key)?;
            }
        }
        Ok(())
    }

    /// Flip the n-th pass (0-based, execution order). Passes that write the
    /// surface stay enabled. Returns the new state.
    pub fn toggle_pass(&mut self, index: usize) -> Option<bool> {
        let pass = self.passes.get_mut(index)?;
        if pass.writes_surface() {
            tracing::warn!("Pass '{}' writes the surface and cannot be disabled", pass.name);
            return None;
        }
        pass.enabled = !pass.enabled;
        tracing::info!(
            "Pass '{}' {}",
            pass.name,
            if pass.enabled { "enabled" } else { "disabled" }
        );
        Some(pass.enabled)
    }

    /// Whether an enabled pass renders into `texture` this frame.
    pub fn produces(&self, texture: &str) -> bool {
        self.passes.iter().any(|p| p.enabled && p.writes(texture))
    }

    /// Mesh paths named by `mesh:` draws.
    pub fn mesh_paths(&self) -> impl Iterator<Item = &str> {
        self.passes.iter().filter_map(|p| match &p.draw {
            DrawKind::Mesh(path) => Some(path.as_str()),
            _ => None,
        })
    }

    pub fn draws_foliage(&self) -> bool {
        self.passes.iter().any(|p| p.draw == DrawKind::Foliage)
    }
}

// ---------------------------------------------------------------------------
// World gathering
// ---------------------------------------------------------------------------

/// One visible mesh renderer. Its index in the draw list is its slot in the
/// draw uniform buffer.
#[derive(Debug, Clone)]
pub struct DrawItem {
    pub entity: Entity,
    pub mesh: MeshHandle,
    pub cast_shadows: bool,
    pub uniforms: DrawUniforms,
}

/// Visible mesh renderers ordered by mesh, then entity.
pub fn collect_draws(world: &World, materials: &MaterialCache) -> Vec<DrawItem> {
    let fallback = Material::default();
    let mut draws: Vec<DrawItem> = world
        .query::<(&Transform, &MeshRenderer)>()
        .without::<&Hidden>()
        .iter()
        .map(|(entity, (transform, renderer))| {
            let material = materials.get(renderer.material_handle).unwrap_or(&fallback);
            DrawItem {
                entity,
                mesh: renderer.mesh_handle,
                cast_shadows: renderer.cast_shadows,
                uniforms: DrawUniforms::new(
                    transform.world_matrix,
                    material.base_color_rgba(),
                    material.roughness,
                    material.metallic,
                    material.emission_rgba(),
                ),
            }
        })
        .collect();
    draws.sort_by_key(|d| (d.mesh, d.entity));
    draws
}

#[derive(Debug, Clone, Default)]
pub struct LightSet {
    pub points: Vec<PointLightUniform>,
    pub directional: Option<DirectionalLight>,
}

/// Up to `MAX_LIGHTS` visible point lights plus the first directional light.
pub fn collect_lights(world: &World) -> LightSet {
    let mut points: Vec<(Entity, PointLightUniform)> = world
        .query::<(&Transform, &PointLight)>()
        .without::<&Hidden>()
        .iter()
        .map(|(entity, (transform, light))| {
            let position = transform.world_matrix.w_axis.truncate();
            (
                entity,
                PointLightUniform {
                    position: position.to_array(),
                    range: light.range,
                    color: light.color.to_array(),
                    intensity: light.intensity,
                },
            )
        })
        .collect();
    points.sort_by_key(|(entity, _)| *entity);
    if points.len() > MAX_LIGHTS {
        tracing::debug!(
            "{} point lights, dropping {} over the limit",
            points.len(),
            points.len() - MAX_LIGHTS
        );
        points.truncate(MAX_LIGHTS);
    }

    let mut directional: Vec<(Entity, DirectionalLight)> = world
        .query::<&DirectionalLight>()
        .without::<&Hidden>()
        .iter()
        .map(|(entity, light)| (entity, light.clone()))
        .collect();
    directional.sort_by_key(|(entity, _)| *entity);

    LightSet {
        points: points.into_iter().map(|(_, p)| p).collect(),
        directional: directional.into_iter().next().map(|(_, d)| d),
    }
}

/// The main camera's view. Falls back to any camera, then to a default
/// orbit view of the origin.
pub struct CameraView {
    pub position: Vec3,
    pub view: Mat4,
    pub projection: Mat4,
    pub near: f32,
    pub far: f32,
    /// Point the camera orbits, used to centre the shadow frustum.
    pub focus: Vec3,
}

pub fn camera_view(world: &World, aspect: f32) -> CameraView {
    let mut cameras: Vec<(Entity, Camera, Mat4, Option<Vec3>)> = world
        .query::<(&Camera, &Transform, Option<&OrbitController>)>()
        .iter()
        .map(|(e, (cam, t, orbit))| (e, cam.clone(), t.world_matrix, orbit.map(|o| o.target)))
        .collect();
    cameras.sort_by_key(|(e, cam, _, _)| (cam.role != CameraRole::Main, *e));

    let (camera, matrix, focus) = match cameras.into_iter().next() {
        Some((_, camera, matrix, focus)) => (camera, matrix, focus.unwrap_or(Vec3::ZERO)),
        None => {
            let (eye, rotation) = OrbitController::default().transform();
            (
                Camera::default(),
                Mat4::from_rotation_translation(rotation, eye),
                Vec3::ZERO,
            )
        }
    };
    let (_, rotation, position) = matrix.to_scale_rotation_translation();
    CameraView {
        position,
        view: view_matrix(position, rotation),
        projection: projection_matrix(&camera, aspect),
        near: camera.near,
        far: camera.far,
        focus,
    }
}

/// Everything written to the built-in uniform buffers for one frame.
pub struct FrameData {
    pub camera: CameraUniform,
    pub lighting: LightingUniforms,
    pub shadow: ShadowUniforms,
    pub frame: FrameUniforms,
    pub draws: Vec<DrawItem>,
}

pub struct FrameSettings {
    pub viewport: (u32, u32),
    pub ambient: [f32; 3],
    pub shadows: bool,
    pub ambient_occlusion: bool,
}

pub fn build_frame_data(
    world: &World,
    materials: &MaterialCache,
    time: &Time,
    settings: &FrameSettings,
) -> FrameData {
    let (w, h) = settings.viewport;
    let aspect = w.max(1) as f32 / h.max(1) as f32;
    let cam = camera_view(world, aspect);
    let camera = CameraUniform::new(cam.view, cam.projection, cam.position, cam.near, cam.far, (w, h));

    let lights = collect_lights(world);
    let mut lighting = LightingUniforms {
        light_count: lights.points.len() as u32,
        ambient: settings.ambient,
        ao_enabled: settings.ambient_occlusion as u32,
        ..Default::default()
    };
    for (slot, light) in lighting.lights.iter_mut().zip(&lights.points) {
        *slot = *light;
    }

    let mut shadow = ShadowUniforms::default();
    if let Some(dir) = &lights.directional {
        let light_vp = directional_light_view_projection(dir.direction, cam.focus, dir.shadow_extent);
        lighting.has_directional = 1;
        lighting.shadow_enabled = settings.shadows as u32;
        lighting.dir_light_direction = dir.direction.to_array();
        lighting.dir_light_intensity = dir.intensity;
        lighting.dir_light_color = dir.color.to_array();
        lighting.light_vp = light_vp.to_cols_array_2d();
        shadow.light_vp = light_vp.to_cols_array_2d();
    }

    let wind_strength = world
        .query::<&Foliage>()
        .iter()
        .map(|(_, f)| f.wind_strength)
        .fold(0.0_f32, f32::max);

    FrameData {
        camera,
        lighting,
        shadow,
        frame: FrameUniforms {
            time: time.elapsed as f32,
            delta: time.delta,
            wind_strength,
            frame: time.frame as u32,
        },
        draws: collect_draws(world, materials),
    }
}

/// Write the frame's uniforms. Grows the draw buffer first when the draw
/// list no longer fits.
pub fn upload_frame(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    storage: &mut StorageManager,
    pool: &mut DrawUniformPool,
    data: &FrameData,
) -> Result<(), StorageError> {
    for key in grow_draw_pool(storage, pool, data.draws.len())? {
        storage.ensure(device, queue, &key)?;
    }

    queue.write_buffer(storage.buffer(builtins::CAMERA)?, 0, bytemuck::bytes_of(&data.camera));
    queue.write_buffer(storage.buffer(builtins::LIGHTING)?, 0, bytemuck::bytes_of(&data.lighting));
    queue.write_buffer(storage.buffer(builtins::SHADOW)?, 0, bytemuck::bytes_of(&data.shadow));
    queue.write_buffer(storage.buffer(builtins::FRAME)?, 0, bytemuck::bytes_of(&data.frame));
    if !data.draws.is_empty() {
        let uniforms: Vec<DrawUniforms> = data.draws.iter().map(|d| d.uniforms).collect();
        queue.write_buffer(storage.buffer(builtins::DRAW)?, 0, bytemuck::cast_slice(&uniforms));
    }
    Ok(())
}

/// Resize the draw buffer descriptor when `draws` exceeds the pool. Returns
/// every key the swap invalidated: the buffer plus each bind group built on
/// it, built-in or declared by the graph.
pub fn grow_draw_pool(
    storage: &mut StorageManager,
    pool: &mut DrawUniformPool,
    draws: usize,
) -> Result<Vec<ResourceKey>, StorageError> {
    if pool.reserve(draws).is_none() {
        return Ok(Vec::new());
    }
    storage.replace_buffer(builtins::DRAW, draw_buffer_desc(pool))
}

// ---------------------------------------------------------------------------
// Foliage instances
// ---------------------------------------------------------------------------

/// Tracks which foliage set the instance buffer was built from.
#[derive(Debug, Default)]
pub struct FoliageState {
    signature: Vec<(Foliage, [f32; 3])>,
    instance_count: u32,
}

impl FoliageState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }

    /// Rebuild the instance buffer descriptor when the foliage patches
    /// changed. Returns whether it was replaced.
    pub fn sync(&mut self, world: &World, storage: &mut StorageManager) -> Result<bool, StorageError> {
        let mut patches: Vec<(Entity, Foliage, [f32; 3])> = world
            .query::<(&Foliage, Option<&Transform>)>()
            .without::<&Hidden>()
            .iter()
            .map(|(e, (f, t))| {
                let origin = t.map_or(Vec3::ZERO, |t| t.world_matrix.w_axis.truncate());
                (e, f.clone(), origin.to_array())
            })
            .collect();
        patches.sort_by_key(|(e, _, _)| *e);
        let signature: Vec<(Foliage, [f32; 3])> =
            patches.into_iter().map(|(_, f, o)| (f, o)).collect();
        if signature == self.signature {
            return Ok(false);
        }

        let instances = foliage_instances(&signature);
        self.instance_count = instances.len() as u32;
        let bytes = if instances.is_empty() {
            vec![0; std::mem::size_of::<FoliageInstance>()]
        } else {
            bytemuck::cast_slice(&instances).to_vec()
        };
        storage.replace_buffer(builtins::FOLIAGE_INSTANCES, instance_buffer_desc(bytes))?;
        self.signature = signature;
        tracing::debug!("Foliage instance buffer rebuilt: {} blades", self.instance_count);
        Ok(true)
    }
}

/// Scatter each patch and offset its blades by the patch origin.
pub fn foliage_instances(patches: &[(Foliage, [f32; 3])]) -> Vec<FoliageInstance> {
    patches
        .iter()
        .flat_map(|(foliage, origin)| {
            scatter(foliage).into_iter().map(move |mut blade| {
                blade.position = [
                    blade.position[0] + origin[0],
                    blade.position[1] + origin[1],
                    blade.position[2] + origin[2],
                ];
                blade
            })
        })
        .collect()
}
