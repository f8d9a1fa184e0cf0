//! GPU resource storage.
//!
//! Every resource is registered under a string name as a plain descriptor.
//! Native objects are created on first use by [`StorageManager::ensure`], which
//! walks the descriptor references (bind group → layout, buffers, textures,
//! samplers; pipeline → shader, layouts) and realises dependencies first.
//! Invalidation runs the same edges in reverse so a resized texture or a
//! recompiled shader drops exactly the objects built on top of it.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};

use wgpu::util::DeviceExt;

use crate::descriptors::{
    buffer_binding_size, buffer_usages, format_from_string, texture_usages, BindGroupDesc,
    BindGroupLayoutDesc, BindingKind, BindingResourceDesc, BufferDesc, RenderPipelineDesc,
    SamplerDesc, ShaderDesc, ShaderSource, TextureDesc, SURFACE,
};
use crate::table::{Table, TableError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Buffer,
    Texture,
    Sampler,
    BindGroupLayout,
    BindGroup,
    Shader,
    RenderPipeline,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 7] = [
        ResourceKind::Buffer,
        ResourceKind::Texture,
        ResourceKind::Sampler,
        ResourceKind::BindGroupLayout,
        ResourceKind::BindGroup,
        ResourceKind::Shader,
        ResourceKind::RenderPipeline,
    ];

    pub fn key(self, name: &str) -> ResourceKey {
        ResourceKey {
            kind: self,
            name: name.to_string(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Buffer => "buffer",
            ResourceKind::Texture => "texture",
            ResourceKind::Sampler => "sampler",
            ResourceKind::BindGroupLayout => "bind_group_layout",
            ResourceKind::BindGroup => "bind_group",
            ResourceKind::Shader => "shader",
            ResourceKind::RenderPipeline => "render_pipeline",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub kind: ResourceKind,
    pub name: String,
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

fn join_keys(keys: &[ResourceKey]) -> String {
    keys.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("{0} is already registered")]
    DuplicateKey(ResourceKey),
    #[error("{0} is not registered")]
    UnknownKey(ResourceKey),
    #[error("'{name}' is a {found}, expected a {expected}")]
    KindMismatch {
        name: String,
        expected: ResourceKind,
        found: ResourceKind,
    },
    #[error("{0} has not been created yet")]
    NotRealized(ResourceKey),
    #[error("dependency cycle: {}", join_keys(.0))]
    DependencyCycle(Vec<ResourceKey>),
    #[error("{key}: invalid format '{format}'")]
    InvalidFormat { key: ResourceKey, format: String },
    #[error("{from} references missing {to}")]
    MissingReference { from: ResourceKey, to: ResourceKey },
    #[error("bind group '{bind_group}' binding {binding}: {reason}")]
    BindingMismatch {
        bind_group: String,
        binding: u32,
        reason: String,
    },
    #[error("shader '{name}': {message}")]
    Shader { name: String, message: String },
    #[error("{key}: GPU validation failed: {message}")]
    Gpu { key: ResourceKey, message: String },
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// Realised texture plus the values used to create it.
#[derive(Debug)]
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub format: wgpu::TextureFormat,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug)]
pub struct GpuShader {
    pub module: wgpu::ShaderModule,
    pub source: String,
}

/// Per-kind counts reported by [`StorageManager::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindStats {
    pub kind: ResourceKind,
    pub registered: usize,
    pub realized: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageStats(pub Vec<KindStats>);

impl StorageStats {
    pub fn registered(&self) -> usize {
        self.0.iter().map(|s| s.registered).sum()
    }

    pub fn realized(&self) -> usize {
        self.0.iter().map(|s| s.realized).sum()
    }
}

impl fmt::Display for StorageStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|s| format!("{} {}/{}", s.kind, s.realized, s.registered))
            .collect();
        f.write_str(&parts.join(", "))
    }
}

/// A freshly created object waiting to be installed in its table.
enum Created {
    Buffer(wgpu::Buffer),
    Texture(GpuTexture),
    Sampler(wgpu::Sampler),
    Layout(wgpu::BindGroupLayout),
    BindGroup(wgpu::BindGroup),
    Shader(GpuShader),
    Pipeline(wgpu::RenderPipeline),
}

pub struct StorageManager {
    surface_format: wgpu::TextureFormat,
    viewport: (u32, u32),
    root: PathBuf,
    buffers: Table<BufferDesc, wgpu::Buffer>,
    textures: Table<TextureDesc, GpuTexture>,
    samplers: Table<SamplerDesc, wgpu::Sampler>,
    layouts: Table<BindGroupLayoutDesc, wgpu::BindGroupLayout>,
    bind_groups: Table<BindGroupDesc, wgpu::BindGroup>,
    shaders: Table<ShaderDesc, GpuShader>,
    pipelines: Table<RenderPipelineDesc, wgpu::RenderPipeline>,
}

fn duplicate(kind: ResourceKind) -> impl Fn(TableError) -> StorageError {
    move |e| match e {
        TableError::DuplicateName(name) => StorageError::DuplicateKey(kind.key(&name)),
        TableError::UnknownName(name) => StorageError::UnknownKey(kind.key(&name)),
    }
}

impl StorageManager {
    pub fn new(surface_format: wgpu::TextureFormat) -> Self {
        Self {
            surface_format,
            viewport: (1, 1),
            root: PathBuf::from("."),
            buffers: Table::new(),
            textures: Table::new(),
            samplers: Table::new(),
            layouts: Table::new(),
            bind_groups: Table::new(),
            shaders: Table::new(),
            pipelines: Table::new(),
        }
    }

    /// Directory that shader and image paths are resolved against.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport = (width.max(1), height.max(1));
        self
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.surface_format
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // -- Registration -------------------------------------------------------

    pub fn register_buffer(&mut self, name: &str, desc: BufferDesc) -> Result<(), StorageError> {
        self.buffers
            .insert(name, desc)
            .map_err(duplicate(ResourceKind::Buffer))
    }

    pub fn register_texture(&mut self, name: &str, desc: TextureDesc) -> Result<(), StorageError> {
        self.textures
            .insert(name, desc)
            .map_err(duplicate(ResourceKind::Texture))
    }

    pub fn register_sampler(&mut self, name: &str, desc: SamplerDesc) -> Result<(), StorageError> {
        self.samplers
            .insert(name, desc)
            .map_err(duplicate(ResourceKind::Sampler))
    }

    pub fn register_layout(
        &mut self,
        name: &str,
        desc: BindGroupLayoutDesc,
    ) -> Result<(), StorageError> {
        self.layouts
            .insert(name, desc)
            .map_err(duplicate(ResourceKind::BindGroupLayout))
    }

    pub fn register_bind_group(
        &mut self,
        name: &str,
        desc: BindGroupDesc,
    ) -> Result<(), StorageError> {
        self.bind_groups
            .insert(name, desc)
            .map_err(duplicate(ResourceKind::BindGroup))
    }

    pub fn register_shader(&mut self, name: &str, desc: ShaderDesc) -> Result<(), StorageError> {
        self.shaders
            .insert(name, desc)
            .map_err(duplicate(ResourceKind::Shader))
    }

    pub fn register_pipeline(
        &mut self,
        name: &str,
        desc: RenderPipelineDesc,
    ) -> Result<(), StorageError> {
        self.pipelines
            .insert(name, desc)
            .map_err(duplicate(ResourceKind::RenderPipeline))
    }

    // -- Replacement --------------------------------------------------------

    /// Swap a buffer descriptor. The buffer and everything bound to it are
    /// re-created on next use. Returns the invalidated keys.
    pub fn replace_buffer(
        &mut self,
        name: &str,
        desc: BufferDesc,
    ) -> Result<Vec<ResourceKey>, StorageError> {
        self.buffers
            .replace(name, desc)
            .map_err(duplicate(ResourceKind::Buffer))?;
        self.invalidate(&ResourceKind::Buffer.key(name))
    }

    pub fn replace_texture(
        &mut self,
        name: &str,
        desc: TextureDesc,
    ) -> Result<Vec<ResourceKey>, StorageError> {
        self.textures
            .replace(name, desc)
            .map_err(duplicate(ResourceKind::Texture))?;
        self.invalidate(&ResourceKind::Texture.key(name))
    }

    pub fn replace_sampler(
        &mut self,
        name: &str,
        desc: SamplerDesc,
    ) -> Result<Vec<ResourceKey>, StorageError> {
        self.samplers
            .replace(name, desc)
            .map_err(duplicate(ResourceKind::Sampler))?;
        self.invalidate(&ResourceKind::Sampler.key(name))
    }

    pub fn replace_bind_group(
        &mut self,
        name: &str,
        desc: BindGroupDesc,
    ) -> Result<Vec<ResourceKey>, StorageError> {
        self.bind_groups
            .replace(name, desc)
            .map_err(duplicate(ResourceKind::BindGroup))?;
        self.invalidate(&ResourceKind::BindGroup.key(name))
    }

    pub fn replace_shader(
        &mut self,
        name: &str,
        desc: ShaderDesc,
    ) -> Result<Vec<ResourceKey>, StorageError> {
        self.shaders
            .replace(name, desc)
            .map_err(duplicate(ResourceKind::Shader))?;
        self.invalidate(&ResourceKind::Shader.key(name))
    }

    pub fn replace_pipeline(
        &mut self,
        name: &str,
        desc: RenderPipelineDesc,
    ) -> Result<Vec<ResourceKey>, StorageError> {
        self.pipelines
            .replace(name, desc)
            .map_err(duplicate(ResourceKind::RenderPipeline))?;
        self.invalidate(&ResourceKind::RenderPipeline.key(name))
    }

    // -- Lookup -------------------------------------------------------------

    pub fn contains(&self, key: &ResourceKey) -> bool {
        let name = key.name.as_str();
        match key.kind {
            ResourceKind::Buffer => self.buffers.contains(name),
            ResourceKind::Texture => self.textures.contains(name),
            ResourceKind::Sampler => self.samplers.contains(name),
            ResourceKind::BindGroupLayout => self.layouts.contains(name),
            ResourceKind::BindGroup => self.bind_groups.contains(name),
            ResourceKind::Shader => self.shaders.contains(name),
            ResourceKind::RenderPipeline => self.pipelines.contains(name),
        }
    }

    pub fn is_realized(&self, key: &ResourceKey) -> bool {
        let name = key.name.as_str();
        match key.kind {
            ResourceKind::Buffer => self.buffers.is_realized(name),
            ResourceKind::Texture => self.textures.is_realized(name),
            ResourceKind::Sampler => self.samplers.is_realized(name),
            ResourceKind::BindGroupLayout => self.layouts.is_realized(name),
            ResourceKind::BindGroup => self.bind_groups.is_realized(name),
            ResourceKind::Shader => self.shaders.is_realized(name),
            ResourceKind::RenderPipeline => self.pipelines.is_realized(name),
        }
    }

    /// Kinds under which `name` is registered.
    pub fn kinds_of(&self, name: &str) -> Vec<ResourceKind> {
        ResourceKind::ALL
            .into_iter()
            .filter(|kind| self.contains(&kind.key(name)))
            .collect()
    }

    pub fn buffer_desc(&self, name: &str) -> Option<&BufferDesc> {
        self.buffers.get(name)
    }

    pub fn texture_desc(&self, name: &str) -> Option<&TextureDesc> {
        self.textures.get(name)
    }

    pub fn layout_desc(&self, name: &str) -> Option<&BindGroupLayoutDesc> {
        self.layouts.get(name)
    }

    pub fn bind_group_desc(&self, name: &str) -> Option<&BindGroupDesc> {
        self.bind_groups.get(name)
    }

    pub fn shader_desc(&self, name: &str) -> Option<&ShaderDesc> {
        self.shaders.get(name)
    }

    pub fn pipeline_desc(&self, name: &str) -> Option<&RenderPipelineDesc> {
        self.pipelines.get(name)
    }

    pub fn texture_names(&self) -> impl Iterator<Item = &str> {
        self.textures.names()
    }

    /// Error for a name that is missing from the table of `expected` kind.
    fn lookup_error(&self, expected: ResourceKind, name: &str) -> StorageError {
        match self.kinds_of(name).first() {
            Some(&found) => StorageError::KindMismatch {
                name: name.to_string(),
                expected,
                found,
            },
            None => StorageError::UnknownKey(expected.key(name)),
        }
    }

    fn realized<'a, D, T>(
        &self,
        table: &'a Table<D, T>,
        kind: ResourceKind,
        name: &str,
    ) -> Result<&'a T, StorageError> {
        if !table.contains(name) {
            return Err(self.lookup_error(kind, name));
        }
        table
            .object(name)
            .ok_or_else(|| StorageError::NotRealized(kind.key(name)))
    }

    pub fn buffer(&self, name: &str) -> Result<&wgpu::Buffer, StorageError> {
        self.realized(&self.buffers, ResourceKind::Buffer, name)
    }

    pub fn texture(&self, name: &str) -> Result<&GpuTexture, StorageError> {
        self.realized(&self.textures, ResourceKind::Texture, name)
    }

    pub fn texture_view(&self, name: &str) -> Result<&wgpu::TextureView, StorageError> {
        self.texture(name).map(|t| &t.view)
    }

    /// Format from the descriptor. Available before the texture exists.
    pub fn texture_format(&self, name: &str) -> Result<wgpu::TextureFormat, StorageError> {
        let desc = self
            .textures
            .get(name)
            .ok_or_else(|| self.lookup_error(ResourceKind::Texture, name))?;
        format_from_string(&desc.format).map_err(|_| StorageError::InvalidFormat {
            key: ResourceKind::Texture.key(name),
            format: desc.format.clone(),
        })
    }

    pub fn sampler(&self, name: &str) -> Result<&wgpu::Sampler, StorageError> {
        self.realized(&self.samplers, ResourceKind::Sampler, name)
    }

    pub fn layout(&self, name: &str) -> Result<&wgpu::BindGroupLayout, StorageError> {
        self.realized(&self.layouts, ResourceKind::BindGroupLayout, name)
    }

    pub fn bind_group(&self, name: &str) -> Result<&wgpu::BindGroup, StorageError> {
        self.realized(&self.bind_groups, ResourceKind::BindGroup, name)
    }

    pub fn shader(&self, name: &str) -> Result<&GpuShader, StorageError> {
        self.realized(&self.shaders, ResourceKind::Shader, name)
    }

    pub fn pipeline(&self, name: &str) -> Result<&wgpu::RenderPipeline, StorageError> {
        self.realized(&self.pipelines, ResourceKind::RenderPipeline, name)
    }

    pub fn stats(&self) -> StorageStats {
        StorageStats(vec![
            KindStats {
                kind: ResourceKind::Buffer,
                registered: self.buffers.len(),
                realized: self.buffers.realized_count(),
            },
            KindStats {
                kind: ResourceKind::Texture,
                registered: self.textures.len(),
                realized: self.textures.realized_count(),
            },
            KindStats {
                kind: ResourceKind::Sampler,
                registered: self.samplers.len(),
                realized: self.samplers.realized_count(),
            },
            KindStats {
                kind: ResourceKind::BindGroupLayout,
                registered: self.layouts.len(),
                realized: self.layouts.realized_count(),
            },
            KindStats {
                kind: ResourceKind::BindGroup,
                registered: self.bind_groups.len(),
                realized: self.bind_groups.realized_count(),
            },
            KindStats {
                kind: ResourceKind::Shader,
                registered: self.shaders.len(),
                realized: self.shaders.realized_count(),
            },
            KindStats {
                kind: ResourceKind::RenderPipeline,
                registered: self.pipelines.len(),
                realized: self.pipelines.realized_count(),
            },
        ])
    }

    // -- Dependency graph ---------------------------------------------------

    /// Keys that must exist before `key` can be created.
    pub fn dependencies(&self, key: &ResourceKey) -> Result<Vec<ResourceKey>, StorageError> {
        if !self.contains(key) {
            return Err(StorageError::UnknownKey(key.clone()));
        }
        let name = key.name.as_str();
        let deps = match key.kind {
            ResourceKind::BindGroup => self
                .bind_groups
                .get(name)
                .map(bind_group_dependencies)
                .unwrap_or_default(),
            ResourceKind::RenderPipeline => self
                .pipelines
                .get(name)
                .map(pipeline_dependencies)
                .unwrap_or_default(),
            _ => Vec::new(),
        };
        Ok(deps)
    }

    /// Keys whose descriptors reference `key`, sorted.
    pub fn dependents(&self, key: &ResourceKey) -> Vec<ResourceKey> {
        let mut out = BTreeSet::new();
        match key.kind {
            ResourceKind::Buffer
            | ResourceKind::Texture
            | ResourceKind::Sampler
            | ResourceKind::BindGroupLayout => {
                for (name, desc) in self.bind_groups.iter() {
                    if bind_group_dependencies(desc).contains(key) {
                        out.insert(ResourceKind::BindGroup.key(name));
                    }
                }
            }
            _ => {}
        }
        if matches!(key.kind, ResourceKind::Shader | ResourceKind::BindGroupLayout) {
            for (name, desc) in self.pipelines.iter() {
                if pipeline_dependencies(desc).contains(key) {
                    out.insert(ResourceKind::RenderPipeline.key(name));
                }
            }
        }
        out.into_iter().collect()
    }

    /// `key` and everything it needs, dependencies first.
    pub fn resolution_order(&self, key: &ResourceKey) -> Result<Vec<ResourceKey>, StorageError> {
        let mut order = Vec::new();
        let mut done = HashSet::new();
        let mut stack = Vec::new();
        self.visit(key, None, &mut order, &mut done, &mut stack)?;
        Ok(order)
    }

    fn visit(
        &self,
        key: &ResourceKey,
        from: Option<&ResourceKey>,
        order: &mut Vec<ResourceKey>,
        done: &mut HashSet<ResourceKey>,
        stack: &mut Vec<ResourceKey>,
    ) -> Result<(), StorageError> {
        if done.contains(key) {
            return Ok(());
        }
        if let Some(pos) = stack.iter().position(|k| k == key) {
            let mut cycle = stack[pos..].to_vec();
            cycle.push(key.clone());
            return Err(StorageError::DependencyCycle(cycle));
        }
        if !self.contains(key) {
            return Err(match from {
                Some(from) => StorageError::MissingReference {
                    from: from.clone(),
                    to: key.clone(),
                },
                None => StorageError::UnknownKey(key.clone()),
            });
        }
        stack.push(key.clone());
        for dep in self.dependencies(key)? {
            self.visit(&dep, Some(key), order, done, stack)?;
        }
        stack.pop();
        done.insert(key.clone());
        order.push(key.clone());
        Ok(())
    }

    // -- Validation ---------------------------------------------------------

    /// Check every registered descriptor without touching the GPU.
    pub fn validate(&self) -> Vec<StorageError> {
        let mut errors = Vec::new();

        for (name, desc) in self.textures.iter() {
            if format_from_string(&desc.format).is_err() {
                errors.push(StorageError::InvalidFormat {
                    key: ResourceKind::Texture.key(name),
                    format: desc.format.clone(),
                });
            }
        }

        for (name, desc) in self.shaders.iter() {
            if let ShaderSource::Builtin(builtin) = &desc.source {
                if crate::builtins::builtin_shader(builtin).is_none() {
                    errors.push(StorageError::Shader {
                        name: name.to_string(),
                        message: format!("no built-in shader named '{}'", builtin),
                    });
                }
            }
        }

        for (name, desc) in self.bind_groups.iter() {
            self.validate_bind_group(name, desc, &mut errors);
        }

        for (name, desc) in self.pipelines.iter() {
            let key = ResourceKind::RenderPipeline.key(name);
            for dep in pipeline_dependencies(desc) {
                self.check_reference(&key, &dep, &mut errors);
            }
            for target in &desc.targets {
                if target.format != SURFACE && format_from_string(&target.format).is_err() {
                    errors.push(StorageError::InvalidFormat {
                        key: key.clone(),
                        format: target.format.clone(),
                    });
                }
            }
            if let Some(depth) = &desc.depth {
                if format_from_string(&depth.format).is_err() {
                    errors.push(StorageError::InvalidFormat {
                        key: key.clone(),
                        format: depth.format.clone(),
                    });
                }
            }
        }

        errors
    }

    fn check_reference(&self, from: &ResourceKey, to: &ResourceKey, errors: &mut Vec<StorageError>) -> bool {
        if self.contains(to) {
            return true;
        }
        errors.push(match self.kinds_of(&to.name).first() {
            Some(&found) => StorageError::KindMismatch {
                name: to.name.clone(),
                expected: to.kind,
                found,
            },
            None => StorageError::MissingReference {
                from: from.clone(),
                to: to.clone(),
            },
        });
        false
    }

    fn validate_bind_group(&self, name: &str, desc: &BindGroupDesc, errors: &mut Vec<StorageError>) {
        let key = ResourceKind::BindGroup.key(name);
        let mut references_ok = true;
        for dep in bind_group_dependencies(desc) {
            references_ok &= self.check_reference(&key, &dep, errors);
        }
        if !references_ok {
            return;
        }
        let Some(layout) = self.layouts.get(&desc.layout) else {
            return;
        };

        let mismatch = |binding: u32, reason: String| StorageError::BindingMismatch {
            bind_group: name.to_string(),
            binding,
            reason,
        };

        for entry in &desc.entries {
            let Some(slot) = layout.entries.iter().find(|e| e.binding == entry.binding) else {
                errors.push(mismatch(
                    entry.binding,
                    format!("layout '{}' has no such binding", desc.layout),
                ));
                continue;
            };
            match (&entry.resource, &slot.ty) {
                (BindingResourceDesc::Buffer { size, .. }, BindingKind::Uniform { dynamic }) => {
                    if *dynamic && size.is_none() {
                        errors.push(mismatch(
                            entry.binding,
                            "dynamic uniform needs an explicit size".to_string(),
                        ));
                    }
                }
                (BindingResourceDesc::Buffer { .. }, BindingKind::Storage { .. })
                | (BindingResourceDesc::Texture(_), BindingKind::Texture { .. })
                | (BindingResourceDesc::Sampler(_), BindingKind::Sampler { .. }) => {}
                (resource, ty) => errors.push(mismatch(
                    entry.binding,
                    format!("{} bound to a {:?} slot", resource_label(resource), ty),
                )),
            }
        }

        for slot in &layout.entries {
            if !desc.entries.iter().any(|e| e.binding == slot.binding) {
                errors.push(mismatch(slot.binding, "missing entry".to_string()));
            }
        }
    }

    // -- Realisation --------------------------------------------------------

    /// Create `key` and any unrealised dependency. Existing objects are reused.
    pub fn ensure(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        key: &ResourceKey,
    ) -> Result<(), StorageError> {
        if self.is_realized(key) {
            return Ok(());
        }
        for k in self.resolution_order(key)? {
            if self.is_realized(&k) {
                continue;
            }
            let created = self.create_object(device, queue, &k)?;
            self.install(&k, created);
            tracing::debug!("Created {}", k);
        }
        Ok(())
    }

    fn install(&mut self, key: &ResourceKey, created: Created) {
        let name = key.name.as_str();
        let result = match created {
            Created::Buffer(o) => self.buffers.realize(name, o),
            Created::Texture(o) => self.textures.realize(name, o),
            Created::Sampler(o) => self.samplers.realize(name, o),
            Created::Layout(o) => self.layouts.realize(name, o),
            Created::BindGroup(o) => self.bind_groups.realize(name, o),
            Created::Shader(o) => self.shaders.realize(name, o),
            Created::Pipeline(o) => self.pipelines.realize(name, o),
        };
        if let Err(e) = result {
            tracing::warn!("Dropping created {}: {}", key, e);
        }
    }

    fn create_object(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        key: &ResourceKey,
    ) -> Result<Created, StorageError> {
        let name = key.name.as_str();
        let unknown = || StorageError::UnknownKey(key.clone());
        match key.kind {
            ResourceKind::Buffer => {
                let desc = self.buffers.get(name).ok_or_else(unknown)?;
                Ok(Created::Buffer(create_buffer(device, name, desc)))
            }
            ResourceKind::Texture => {
                let desc = self.textures.get(name).ok_or_else(unknown)?;
                let format = self.texture_format(name)?;
                Ok(Created::Texture(create_texture(
                    device,
                    queue,
                    name,
                    desc,
                    format,
                    self.viewport,
                )))
            }
            ResourceKind::Sampler => {
                let desc = self.samplers.get(name).ok_or_else(unknown)?;
                Ok(Created::Sampler(device.create_sampler(&desc.to_wgpu(name))))
            }
            ResourceKind::BindGroupLayout => {
                let desc = self.layouts.get(name).ok_or_else(unknown)?;
                let entries: Vec<_> = desc.entries.iter().map(|e| e.to_wgpu()).collect();
                let layout = scoped(device, key, || {
                    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                        label: Some(name),
                        entries: &entries,
                    })
                })?;
                Ok(Created::Layout(layout))
            }
            ResourceKind::BindGroup => {
                let desc = self.bind_groups.get(name).ok_or_else(unknown)?;
                Ok(Created::BindGroup(self.create_bind_group(device, key, desc)?))
            }
            ResourceKind::Shader => {
                let desc = self.shaders.get(name).ok_or_else(unknown)?;
                let source = self.shader_source(name, desc)?;
                Ok(Created::Shader(compile_shader(device, name, source)?))
            }
            ResourceKind::RenderPipeline => {
                let desc = self.pipelines.get(name).ok_or_else(unknown)?;
                Ok(Created::Pipeline(self.create_pipeline(device, key, desc)?))
            }
        }
    }

    fn create_bind_group(
        &self,
        device: &wgpu::Device,
        key: &ResourceKey,
        desc: &BindGroupDesc,
    ) -> Result<wgpu::BindGroup, StorageError> {
        let layout = self.layout(&desc.layout)?;
        let mut entries = Vec::with_capacity(desc.entries.len());
        for entry in &desc.entries {
            let resource = match &entry.resource {
                BindingResourceDesc::Buffer { name, size } => {
                    wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: self.buffer(name)?,
                        offset: 0,
                        size: buffer_binding_size(*size),
                    })
                }
                BindingResourceDesc::Texture(name) => {
                    wgpu::BindingResource::TextureView(self.texture_view(name)?)
                }
                BindingResourceDesc::Sampler(name) => {
                    wgpu::BindingResource::Sampler(self.sampler(name)?)
                }
            };
            entries.push(wgpu::BindGroupEntry {
                binding: entry.binding,
                resource,
            });
        }
        scoped(device, key, || {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(key.name.as_str()),
                layout,
                entries: &entries,
            })
        })
    }

    fn create_pipeline(
        &self,
        device: &wgpu::Device,
        key: &ResourceKey,
        desc: &RenderPipelineDesc,
    ) -> Result<wgpu::RenderPipeline, StorageError> {
        let shader = self.shader(&desc.shader)?;
        let layouts = desc
            .bind_group_layouts
            .iter()
            .map(|name| self.layout(name))
            .collect::<Result<Vec<_>, _>>()?;
        let invalid = |e: crate::descriptors::DescriptorError| StorageError::InvalidFormat {
            key: key.clone(),
            format: e.to_string(),
        };
        let targets = desc.color_targets(self.surface_format).map_err(invalid)?;
        let depth_stencil = desc.depth_state().map_err(invalid)?;
        let vertex_buffers: Vec<_> = desc.vertex_layouts.iter().map(|l| l.to_wgpu()).collect();

        scoped(device, key, || {
            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(key.name.as_str()),
                bind_group_layouts: &layouts,
                push_constant_ranges: &[],
            });
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(key.name.as_str()),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &shader.module,
                    entry_point: Some(desc.vertex_entry.as_str()),
                    buffers: &vertex_buffers,
                    compilation_options: Default::default(),
                },
                // Depth-only pipelines have no fragment stage
                fragment: if targets.is_empty() {
                    None
                } else {
                    Some(wgpu::FragmentState {
                        module: &shader.module,
                        entry_point: Some(desc.fragment_entry.as_str()),
                        targets: &targets,
                        compilation_options: Default::default(),
                    })
                },
                primitive: desc.primitive_state(),
                depth_stencil,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        })
    }

    fn shader_source(&self, name: &str, desc: &ShaderDesc) -> Result<String, StorageError> {
        match &desc.source {
            ShaderSource::Builtin(builtin) => crate::builtins::builtin_shader(builtin)
                .map(str::to_string)
                .ok_or_else(|| StorageError::Shader {
                    name: name.to_string(),
                    message: format!("no built-in shader named '{}'", builtin),
                }),
            ShaderSource::Path(path) => {
                let full = self.root.join(path);
                std::fs::read_to_string(&full).map_err(|source| StorageError::Io {
                    path: full.display().to_string(),
                    source,
                })
            }
            ShaderSource::Inline(src) => Ok(src.clone()),
        }
    }

    // -- Invalidation -------------------------------------------------------

    /// Drop the object for `key` and every transitive dependent. Descriptors
    /// stay registered and are re-created on the next `ensure`. Returns every
    /// key in the invalidated set, `key` first.
    pub fn invalidate(&mut self, key: &ResourceKey) -> Result<Vec<ResourceKey>, StorageError> {
        if !self.contains(key) {
            return Err(StorageError::UnknownKey(key.clone()));
        }
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([key.clone()]);
        let mut closure = Vec::new();
        while let Some(k) = queue.pop_front() {
            if !seen.insert(k.clone()) {
                continue;
            }
            queue.extend(self.dependents(&k));
            closure.push(k);
        }
        for k in &closure {
            if self.drop_object(k) {
                tracing::debug!("Invalidated {}", k);
            }
        }
        Ok(closure)
    }

    fn drop_object(&mut self, key: &ResourceKey) -> bool {
        let name = key.name.as_str();
        match key.kind {
            ResourceKind::Buffer => self.buffers.invalidate(name),
            ResourceKind::Texture => self.textures.invalidate(name),
            ResourceKind::Sampler => self.samplers.invalidate(name),
            ResourceKind::BindGroupLayout => self.layouts.invalidate(name),
            ResourceKind::BindGroup => self.bind_groups.invalidate(name),
            ResourceKind::Shader => self.shaders.invalidate(name),
            ResourceKind::RenderPipeline => self.pipelines.invalidate(name),
        }
    }

    /// Record a new viewport size. Viewport-relative textures and everything
    /// bound to them are invalidated; fixed-size textures are untouched.
    pub fn set_viewport(&mut self, width: u32, height: u32) -> Vec<ResourceKey> {
        let viewport = (width.max(1), height.max(1));
        if viewport == self.viewport {
            return Vec::new();
        }
        self.viewport = viewport;
        let relative: Vec<String> = self
            .textures
            .iter()
            .filter(|(_, desc)| desc.size.is_viewport_relative())
            .map(|(name, _)| name.to_string())
            .collect();
        let mut dropped = Vec::new();
        for name in relative {
            if let Ok(keys) = self.invalidate(&ResourceKind::Texture.key(&name)) {
                for key in keys {
                    if !dropped.contains(&key) {
                        dropped.push(key);
                    }
                }
            }
        }
        tracing::debug!(
            "Viewport {}x{}: invalidated {} resources",
            viewport.0,
            viewport.1,
            dropped.len()
        );
        dropped
    }

    // -- Shader hot reload --------------------------------------------------

    /// Names of shaders loaded from `path`.
    pub fn shaders_for_path(&self, path: &Path) -> Vec<String> {
        let target = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.shaders
            .iter()
            .filter_map(|(name, desc)| {
                let rel = desc.path()?;
                let full = self.root.join(rel);
                let full = full.canonicalize().unwrap_or(full);
                (full == target).then(|| name.to_string())
            })
            .collect()
    }

    /// Recompile a shader from its source. On failure the previous module
    /// and the pipelines built from it stay in place.
    pub fn reload_shader(
        &mut self,
        device: &wgpu::Device,
        name: &str,
    ) -> Result<Vec<ResourceKey>, StorageError> {
        let key = ResourceKind::Shader.key(name);
        let desc = self
            .shaders
            .get(name)
            .ok_or_else(|| StorageError::UnknownKey(key.clone()))?;
        let source = self.shader_source(name, desc)?;
        let shader = compile_shader(device, name, source)?;
        let dropped = self.invalidate(&key)?;
        self.install(&key, Created::Shader(shader));
        tracing::info!(
            "Reloaded shader '{}' ({} dependents invalidated)",
            name,
            dropped.len().saturating_sub(1)
        );
        Ok(dropped)
    }
}

fn resource_label(resource: &BindingResourceDesc) -> &'static str {
    match resource {
        BindingResourceDesc::Buffer { .. } => "buffer",
        BindingResourceDesc::Texture(_) => "texture",
        BindingResourceDesc::Sampler(_) => "sampler",
    }
}

fn bind_group_dependencies(desc: &BindGroupDesc) -> Vec<ResourceKey> {
    let mut deps = vec![ResourceKind::BindGroupLayout.key(&desc.layout)];
    for entry in &desc.entries {
        let key = match &entry.resource {
            BindingResourceDesc::Buffer { name, .. } => ResourceKind::Buffer.key(name),
            BindingResourceDesc::Texture(name) => ResourceKind::Texture.key(name),
            BindingResourceDesc::Sampler(name) => ResourceKind::Sampler.key(name),
        };
        if !deps.contains(&key) {
            deps.push(key);
        }
    }
    deps
}

fn pipeline_dependencies(desc: &RenderPipelineDesc) -> Vec<ResourceKey> {
    let mut deps = vec![ResourceKind::Shader.key(&desc.shader)];
    for layout in &desc.bind_group_layouts {
        let key = ResourceKind::BindGroupLayout.key(layout);
        if !deps.contains(&key) {
            deps.push(key);
        }
    }
    deps
}

/// Run `f` inside a validation error scope.
fn scoped<T>(
    device: &wgpu::Device,
    key: &ResourceKey,
    f: impl FnOnce() -> T,
) -> Result<T, StorageError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = f();
    match pollster::block_on(device.pop_error_scope()) {
        Some(err) => Err(StorageError::Gpu {
            key: key.clone(),
            message: err.to_string(),
        }),
        None => Ok(value),
    }
}

fn compile_shader(
    device: &wgpu::Device,
    name: &str,
    source: String,
) -> Result<GpuShader, StorageError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(name),
        source: wgpu::ShaderSource::Wgsl(source.as_str().into()),
    });
    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        return Err(StorageError::Shader {
            name: name.to_string(),
            message: err.to_string(),
        });
    }
    Ok(GpuShader { module, source })
}

fn create_buffer(device: &wgpu::Device, name: &str, desc: &BufferDesc) -> wgpu::Buffer {
    let usage = buffer_usages(&desc.usage);
    let size = desc.allocation_size();
    match &desc.contents {
        Some(contents) => {
            let mut bytes = contents.clone();
            bytes.resize(size as usize, 0);
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(name),
                contents: &bytes,
                usage,
            })
        }
        None => device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(name),
            size,
            usage,
            mapped_at_creation: false,
        }),
    }
}

fn create_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    name: &str,
    desc: &TextureDesc,
    format: wgpu::TextureFormat,
    viewport: (u32, u32),
) -> GpuTexture {
    let (width, height) = desc.size.resolve(viewport);
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(name),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: texture_usages(&desc.usage),
        view_formats: &[],
    });
    if let Some(data) = &desc.data {
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &data.bytes,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(data.bytes_per_row),
                rows_per_image: Some(height),
            },
            size,
        );
    }
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    GpuTexture {
        texture,
        view,
        format,
        width,
        height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptors::{
        BindGroupEntryDesc, ColorTargetDesc, LayoutEntry, ResourceSize, SampleKind, SamplerKind,
    };

    fn storage() -> StorageManager {
        let mut s = StorageManager::new(wgpu::TextureFormat::Bgra8UnormSrgb);
        s.register_buffer("params", BufferDesc::uniform(64)).unwrap();
        s.register_texture("hdr", TextureDesc::target("rgba16f", ResourceSize::Viewport))
            .unwrap();
        s.register_texture(
            "shadow_map",
            TextureDesc::target("depth32f", ResourceSize::Fixed(1024, 1024)),
        )
        .unwrap();
        s.register_sampler("linear", SamplerDesc::default()).unwrap();
        s.register_layout(
            "post_layout",
            BindGroupLayoutDesc {
                entries: vec![
                    LayoutEntry::new(0, BindingKind::Uniform { dynamic: false }),
                    LayoutEntry::new(
                        1,
                        BindingKind::Texture {
                            sample: SampleKind::Float,
                        },
                    ),
                    LayoutEntry::new(
                        2,
                        BindingKind::Sampler {
                            kind: SamplerKind::Filtering,
                        },
                    ),
                ],
            },
        )
        .unwrap();
        s.register_bind_group(
            "post",
            BindGroupDesc {
                layout: "post_layout".into(),
                entries: vec![
                    BindGroupEntryDesc::buffer(0, "params", None),
                    BindGroupEntryDesc::texture(1, "hdr"),
                    BindGroupEntryDesc::sampler(2, "linear"),
                ],
            },
        )
        .unwrap();
        s.register_shader("tonemap", ShaderDesc::builtin("tonemap"))
            .unwrap();
        s.register_pipeline("tonemap", pipeline("tonemap", &["post_layout"]))
            .unwrap();
        s
    }

    fn pipeline(shader: &str, layouts: &[&str]) -> RenderPipelineDesc {
        RenderPipelineDesc {
            shader: shader.into(),
            vertex_entry: "vs_main".into(),
            fragment_entry: "fs_main".into(),
            bind_group_layouts: layouts.iter().map(|s| s.to_string()).collect(),
            vertex_layouts: vec![],
            targets: vec![ColorTargetDesc {
                format: SURFACE.into(),
                blend: Default::default(),
            }],
            depth: None,
            topology: Default::default(),
            cull: Default::default(),
            depth_bias: None,
        }
    }

    #[test]
    fn test_key_display() {
        assert_eq!(ResourceKind::BindGroup.key("post").to_string(), "bind_group:post");
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut s = storage();
        let err = s.register_buffer("params", BufferDesc::uniform(16)).unwrap_err();
        assert!(matches!(err, StorageError::DuplicateKey(k) if k == ResourceKind::Buffer.key("params")));
        // Same name under another kind is fine
        s.register_texture("params", TextureDesc::target("r8", ResourceSize::Viewport))
            .unwrap();
    }

    #[test]
    fn test_dependencies_and_dependents() {
        let s = storage();
        let deps = s.dependencies(&ResourceKind::BindGroup.key("post")).unwrap();
        assert_eq!(
            deps,
            vec![
                ResourceKind::BindGroupLayout.key("post_layout"),
                ResourceKind::Buffer.key("params"),
                ResourceKind::Texture.key("hdr"),
                ResourceKind::Sampler.key("linear"),
            ]
        );
        assert!(s.dependencies(&ResourceKind::Texture.key("hdr")).unwrap().is_empty());
        assert_eq!(
            s.dependents(&ResourceKind::BindGroupLayout.key("post_layout")),
            vec![
                ResourceKind::BindGroup.key("post"),
                ResourceKind::RenderPipeline.key("tonemap"),
            ]
        );
        assert!(matches!(
            s.dependencies(&ResourceKind::Buffer.key("nope")),
            Err(StorageError::UnknownKey(_))
        ));
    }

    #[test]
    fn test_resolution_order_dependencies_first() {
        let s = storage();
        let order = s
            .resolution_order(&ResourceKind::RenderPipeline.key("tonemap"))
            .unwrap();
        assert_eq!(
            order,
            vec![
                ResourceKind::Shader.key("tonemap"),
                ResourceKind::BindGroupLayout.key("post_layout"),
                ResourceKind::RenderPipeline.key("tonemap"),
            ]
        );
        let order = s.resolution_order(&ResourceKind::BindGroup.key("post")).unwrap();
        assert_eq!(order.last(), Some(&ResourceKind::BindGroup.key("post")));
        assert_eq!(order.len(), 5);
    }

    #[test]
    fn test_resolution_order_missing_reference() {
        let mut s = storage();
        s.register_bind_group(
            "broken",
            BindGroupDesc {
                layout: "post_layout".into(),
                entries: vec![BindGroupEntryDesc::texture(1, "ghost")],
            },
        )
        .unwrap();
        let err = s
            .resolution_order(&ResourceKind::BindGroup.key("broken"))
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::MissingReference { to, .. } if to == ResourceKind::Texture.key("ghost")
        ));
    }

    #[test]
    fn test_validate_clean() {
        let errors = storage().validate();
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[test]
    fn test_validate_reports_problems() {
        let mut s = storage();
        s.register_texture("bad", TextureDesc::target("rgb9", ResourceSize::Viewport))
            .unwrap();
        s.register_bind_group(
            "wrong_kind",
            BindGroupDesc {
                layout: "post_layout".into(),
                entries: vec![
                    BindGroupEntryDesc::buffer(0, "params", None),
                    // 'linear' is a sampler, not a texture
                    BindGroupEntryDesc::texture(1, "linear"),
                    BindGroupEntryDesc::sampler(2, "linear"),
                ],
            },
        )
        .unwrap();
        s.register_bind_group(
            "wrong_slot",
            BindGroupDesc {
                layout: "post_layout".into(),
                entries: vec![
                    BindGroupEntryDesc::sampler(0, "linear"),
                    BindGroupEntryDesc::texture(1, "hdr"),
                ],
            },
        )
        .unwrap();
        s.register_shader("missing", ShaderDesc::builtin("does_not_exist"))
            .unwrap();

        let errors = s.validate();
        assert!(errors
            .iter()
            .any(|e| matches!(e, StorageError::InvalidFormat { format, .. } if format == "rgb9")));
        assert!(errors.iter().any(|e| matches!(
            e,
            StorageError::KindMismatch { name, expected: ResourceKind::Texture, found: ResourceKind::Sampler }
                if name == "linear"
        )));
        assert!(errors.iter().any(|e| matches!(
            e,
            StorageError::BindingMismatch { bind_group, binding: 0, .. } if bind_group == "wrong_slot"
        )));
        assert!(errors.iter().any(|e| matches!(
            e,
            StorageError::BindingMismatch { bind_group, binding: 2, reason } if bind_group == "wrong_slot" && reason == "missing entry"
        )));
        assert!(errors
            .iter()
            .any(|e| matches!(e, StorageError::Shader { name, .. } if name == "missing")));
    }

    #[test]
    fn test_dynamic_uniform_needs_size() {
        let mut s = storage();
        s.register_layout(
            "dyn_layout",
            BindGroupLayoutDesc {
                entries: vec![LayoutEntry::new(0, BindingKind::Uniform { dynamic: true })],
            },
        )
        .unwrap();
        s.register_bind_group(
            "dyn",
            BindGroupDesc {
                layout: "dyn_layout".into(),
                entries: vec![BindGroupEntryDesc::buffer(0, "params", None)],
            },
        )
        .unwrap();
        assert!(s
            .validate()
            .iter()
            .any(|e| matches!(e, StorageError::BindingMismatch { bind_group, .. } if bind_group == "dyn")));
    }

    #[test]
    fn test_invalidate_cascades_to_dependents() {
        let mut s = storage();
        let dropped = s.invalidate(&ResourceKind::BindGroupLayout.key("post_layout")).unwrap();
        assert_eq!(dropped[0], ResourceKind::BindGroupLayout.key("post_layout"));
        assert!(dropped.contains(&ResourceKind::BindGroup.key("post")));
        assert!(dropped.contains(&ResourceKind::RenderPipeline.key("tonemap")));
        assert!(!dropped.contains(&ResourceKind::Texture.key("hdr")));

        let dropped = s.invalidate(&ResourceKind::Shader.key("tonemap")).unwrap();
        assert_eq!(
            dropped,
            vec![
                ResourceKind::Shader.key("tonemap"),
                ResourceKind::RenderPipeline.key("tonemap"),
            ]
        );
        assert!(s.invalidate(&ResourceKind::Shader.key("ghost")).is_err());
    }

    #[test]
    fn test_set_viewport_only_touches_relative_textures() {
        let mut s = storage().with_viewport(800, 600);
        let dropped = s.set_viewport(1024, 768);
        assert!(dropped.contains(&ResourceKind::Texture.key("hdr")));
        assert!(dropped.contains(&ResourceKind::BindGroup.key("post")));
        assert!(!dropped.contains(&ResourceKind::Texture.key("shadow_map")));
        assert_eq!(s.viewport(), (1024, 768));
        // Same size again is a no-op
        assert!(s.set_viewport(1024, 768).is_empty());
    }

    #[test]
    fn test_replace_buffer_invalidates_bind_groups() {
        let mut s = storage();
        let dropped = s.replace_buffer("params", BufferDesc::uniform(512)).unwrap();
        assert_eq!(s.buffer_desc("params").map(|d| d.size), Some(512));
        assert!(dropped.contains(&ResourceKind::BindGroup.key("post")));
        assert!(s.replace_buffer("ghost", BufferDesc::uniform(4)).is_err());
    }

    #[test]
    fn test_accessor_errors() {
        let s = storage();
        assert!(matches!(s.buffer("params"), Err(StorageError::NotRealized(_))));
        assert!(matches!(s.buffer("nope"), Err(StorageError::UnknownKey(_))));
        assert!(matches!(
            s.texture_view("linear"),
            Err(StorageError::KindMismatch { expected: ResourceKind::Texture, found: ResourceKind::Sampler, .. })
        ));
        assert_eq!(
            s.texture_format("shadow_map").unwrap(),
            wgpu::TextureFormat::Depth32Float
        );
    }

    #[test]
    fn test_shaders_for_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("shaders")).unwrap();
        let file = dir.path().join("shaders/custom.wgsl");
        std::fs::write(&file, "// empty").unwrap();

        let mut s = storage().with_root(dir.path());
        s.register_shader(
            "custom",
            ShaderDesc {
                source: ShaderSource::Path("shaders/custom.wgsl".into()),
            },
        )
        .unwrap();
        assert_eq!(s.shaders_for_path(&file), vec!["custom".to_string()]);
        assert!(s.shaders_for_path(&dir.path().join("other.wgsl")).is_empty());
    }

    #[test]
    fn test_stats() {
        let s = storage();
        let stats = s.stats();
        assert_eq!(stats.registered(), 8);
        assert_eq!(stats.realized(), 0);
        assert!(stats.to_string().starts_with("buffer 0/1"));
    }
}
