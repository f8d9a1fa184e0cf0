//! GPU-side state shared by the prepare and render systems.
//!
//! A [`Renderer`] lives in the schedule's `Resources`. It owns the storage
//! manager, the prepared graph and the asset caches, and swaps them whole
//! when a graph reload succeeds.

use std::path::{Path, PathBuf};

use hecs::World;

use lantern_core::components::{MaterialHandle, MeshHandle};
use lantern_core::scene::{load_scene, SceneError, SceneSettings};
use lantern_core::schedule::Time;

use crate::builtins::{register_builtins, AO_TARGET, SHADOW_MAP};
use crate::frame::{render_frame, FrameContext, FrameError, FrameStatus, GRASS_MESH};
use crate::gpu::GpuState;
use crate::graph::{load_graph, GraphError};
use crate::material::MaterialCache;
use crate::mesh::{MeshCache, MeshError};
use crate::prepare::{
    build_frame_data, upload_frame, DrawItem, FoliageState, FrameSettings, PreparedGraph,
};
use crate::storage::{StorageError, StorageManager};
use crate::uniforms::DrawUniformPool;
use crate::world::{spawn_scene, SceneAssets, SceneWorld};

#[derive(Debug, thiserror::Error)]
pub enum RendererError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Mesh(#[from] MeshError),
    #[error(transparent)]
    Scene(#[from] SceneError),
}

pub struct Renderer {
    pub gpu: GpuState,
    pub storage: StorageManager,
    pub plan: Option<PreparedGraph>,
    pub meshes: MeshCache,
    pub materials: MaterialCache,
    project_root: PathBuf,
    pool: DrawUniformPool,
    foliage: FoliageState,
    draws: Vec<DrawItem>,
    scene_settings: SceneSettings,
    /// Set when the surface ran out of memory. The engine exits on it.
    pub lost: bool,
}

impl Renderer {
    pub fn new(gpu: GpuState, project_root: &Path) -> Result<Self, RendererError> {
        let pool = DrawUniformPool::new();
        let storage = fresh_storage(&gpu, project_root, &pool)?;
        Ok(Self {
            gpu,
            storage,
            plan: None,
            meshes: MeshCache::new(),
            materials: MaterialCache::new(),
            project_root: project_root.to_path_buf(),
            pool,
            foliage: FoliageState::new(),
            draws: Vec::new(),
            scene_settings: SceneSettings::default(),
            lost: false,
        })
    }

    /// Load and prepare a graph into fresh storage. On any error the
    /// previous graph keeps rendering.
    pub fn load_graph(&mut self, path: &Path) -> Result<(), RendererError> {
        let graph = load_graph(path)?;
        let pool = DrawUniformPool::new();
        let mut storage = fresh_storage(&self.gpu, &self.project_root, &pool)?;
        let plan = PreparedGraph::prepare(&graph, &mut storage, &self.project_root)?;

        let mut meshes: Vec<String> = plan.mesh_paths().map(str::to_string).collect();
        if plan.draws_foliage() {
            meshes.push(GRASS_MESH.to_string());
        }
        for mesh in &meshes {
            self.meshes
                .get_or_load(&self.gpu.device, &self.project_root, mesh)?;
        }
        plan.ensure_all(&self.gpu.device, &self.gpu.queue, &mut storage)?;

        tracing::info!(
            "Graph '{}' ready: {} passes, resources {}",
            plan.name,
            plan.passes.len(),
            storage.stats()
        );
        self.storage = storage;
        self.plan = Some(plan);
        self.pool = pool;
        self.foliage = FoliageState::new();
        Ok(())
    }

    /// Load a scene file and respawn `scene_world` from it. Materials are
    /// re-read so edits to material files show up.
    pub fn load_scene(&mut self, scene_world: &mut SceneWorld, path: &Path) -> Result<(), RendererError> {
        let scene = load_scene(path)?;
        self.materials = MaterialCache::new();
        let mut assets = CacheAssets {
            device: &self.gpu.device,
            root: &self.project_root,
            meshes: &mut self.meshes,
            materials: &mut self.materials,
        };
        spawn_scene(scene_world, &scene, &mut assets);
        self.scene_settings = scene.settings.clone();
        Ok(())
    }

    /// Gather the world into uniforms and make sure every resource the plan
    /// uses exists.
    pub fn prepare_frame(&mut self, world: &World, time: &Time) -> Result<(), RendererError> {
        let Some(plan) = &self.plan else {
            return Ok(());
        };
        if plan.draws_foliage() {
            self.foliage.sync(world, &mut self.storage)?;
        }
        plan.ensure_all(&self.gpu.device, &self.gpu.queue, &mut self.storage)?;

        let settings = FrameSettings {
            viewport: self.gpu.size(),
            ambient: self.scene_settings.ambient_light,
            shadows: plan.produces(SHADOW_MAP),
            ambient_occlusion: plan.produces(AO_TARGET),
        };
        let data = build_frame_data(world, &self.materials, time, &settings);
        upload_frame(
            &self.gpu.device,
            &self.gpu.queue,
            &mut self.storage,
            &mut self.pool,
            &data,
        )?;
        self.draws = data.draws;
        Ok(())
    }

    pub fn render(&self) -> Result<FrameStatus, FrameError> {
        let Some(plan) = &self.plan else {
            return Ok(FrameStatus::Skipped);
        };
        let ctx = FrameContext {
            meshes: &self.meshes,
            draws: &self.draws,
            foliage_instances: self.foliage.instance_count(),
            surface_clear: self.scene_settings.clear_color,
        };
        render_frame(&self.gpu, &self.storage, plan, &ctx)
    }

    /// Reconfigure the surface and drop viewport-sized resources. They are
    /// recreated by the next `prepare_frame`.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.gpu.resize(width, height);
        self.storage.set_viewport(width, height);
    }

    /// Recompile every shader loaded from `path`.
    pub fn reload_shader_file(&mut self, path: &Path) {
        let names = self.storage.shaders_for_path(path);
        if names.is_empty() {
            tracing::debug!("No shader loaded from {:?}", path);
        }
        for name in names {
            if let Err(e) = self.storage.reload_shader(&self.gpu.device, &name) {
                tracing::error!("Shader '{}' reload failed, keeping previous: {}", name, e);
            }
        }
    }

    pub fn toggle_pass(&mut self, index: usize) {
        if let Some(plan) = &mut self.plan {
            plan.toggle_pass(index);
        }
    }
}

fn fresh_storage(
    gpu: &GpuState,
    root: &Path,
    pool: &DrawUniformPool,
) -> Result<StorageManager, StorageError> {
    let (width, height) = gpu.size();
    let mut storage = StorageManager::new(gpu.surface_format())
        .with_root(root)
        .with_viewport(width, height);
    register_builtins(&mut storage, pool)?;
    Ok(storage)
}

/// Scene asset resolution backed by the GPU caches.
struct CacheAssets<'a> {
    device: &'a wgpu::Device,
    root: &'a Path,
    meshes: &'a mut MeshCache,
    materials: &'a mut MaterialCache,
}

impl SceneAssets for CacheAssets<'_> {
    fn mesh(&mut self, path: &str) -> Option<MeshHandle> {
        match self.meshes.get_or_load(self.device, self.root, path) {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::error!("Failed to load mesh '{}': {}", path, e);
                None
            }
        }
    }

    fn material(&mut self, path: Option<&str>) -> Option<MaterialHandle> {
        let Some(path) = path else {
            return Some(self.materials.ensure_default());
        };
        match self.materials.get_or_load(self.root, path) {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::error!("Failed to load material '{}': {}", path, e);
                None
            }
        }
    }
}
