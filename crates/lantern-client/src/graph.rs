//! Render graph files: resource declarations plus an ordered list of passes.
//!
//! Pass order is derived from texture reads and writes. A hand-written order
//! that already satisfies every dependency is kept as is.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;

use serde::Deserialize;

use crate::descriptors::{
    format_from_string, BindGroupDesc, BindGroupLayoutDesc, BufferDesc, DescriptorError,
    RenderPipelineDesc, SamplerDesc, ShaderDesc, TextureDesc, SURFACE,
};
use crate::storage::{ResourceKind, StorageError, StorageManager};
use crate::texture::{load_texture_desc, TextureError};

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("failed to read graph {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("graph parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Texture(#[from] TextureError),
    #[error("pass dependency cycle between {}", .0.join(", "))]
    Cycle(Vec<String>),
    #[error("graph has no passes")]
    NoPasses,
    #[error("duplicate pass name '{0}'")]
    DuplicatePass(String),
    #[error("pass '{pass}' references missing {kind} '{name}'")]
    MissingResource {
        pass: String,
        kind: ResourceKind,
        name: String,
    },
    #[error("pass '{pass}' attachment '{target}': {reason}")]
    InvalidAttachment {
        pass: String,
        target: String,
        reason: String,
    },
    #[error("pass '{pass}' has {found} colour attachments, pipeline expects {expected}")]
    AttachmentCount {
        pass: String,
        expected: usize,
        found: usize,
    },
    #[error("pass '{0}' draws scene meshes but has no valid draw_group")]
    MissingDrawGroup(String),
    #[error("pass '{pass}' both reads and writes '{texture}'")]
    ReadWriteHazard { pass: String, texture: String },
    #[error("no pass writes to the surface")]
    NoSurfaceWriter,
    #[error("graph failed validation:\n  {}", .0.join("\n  "))]
    Invalid(Vec<String>),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphResources {
    #[serde(default)]
    pub buffers: BTreeMap<String, BufferDesc>,
    #[serde(default)]
    pub textures: BTreeMap<String, TextureDesc>,
    #[serde(default)]
    pub samplers: BTreeMap<String, SamplerDesc>,
    #[serde(default)]
    pub layouts: BTreeMap<String, BindGroupLayoutDesc>,
    #[serde(default)]
    pub bind_groups: BTreeMap<String, BindGroupDesc>,
    #[serde(default)]
    pub shaders: BTreeMap<String, ShaderDesc>,
    #[serde(default)]
    pub pipelines: BTreeMap<String, RenderPipelineDesc>,
}

impl GraphResources {
    pub fn len(&self) -> usize {
        self.buffers.len()
            + self.textures.len()
            + self.samplers.len()
            + self.layouts.len()
            + self.bind_groups.len()
            + self.shaders.len()
            + self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphFile {
    pub version: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub resources: GraphResources,
    pub passes: Vec<PassDef>,
}

/// Colour attachment. No `clear` means load the previous contents.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Attachment {
    pub target: String,
    #[serde(default)]
    pub clear: Option<[f64; 4]>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DepthAttachment {
    pub target: String,
    #[serde(default)]
    pub clear: Option<f32>,
}

/// What a pass draws once its pipeline and bind groups are set.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum DrawKind {
    /// One oversized triangle, no vertex buffers.
    Fullscreen,
    /// Every visible mesh renderer.
    Scene,
    /// Visible mesh renderers with `cast_shadows`.
    ShadowCasters,
    /// Grass blades instanced over the foliage buffer.
    Foliage,
    /// A single mesh by path or `procedural:` name.
    Mesh(String),
}

impl TryFrom<String> for DrawKind {
    type Error = DescriptorError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.as_str() {
            "fullscreen" => Ok(DrawKind::Fullscreen),
            "scene" => Ok(DrawKind::Scene),
            "shadow_casters" => Ok(DrawKind::ShadowCasters),
            "foliage" => Ok(DrawKind::Foliage),
            other => match other.strip_prefix("mesh:") {
                Some(path) if !path.is_empty() => Ok(DrawKind::Mesh(path.to_string())),
                _ => Err(DescriptorError::UnknownDraw(s)),
            },
        }
    }
}

impl DrawKind {
    pub fn uses_draw_group(&self) -> bool {
        matches!(self, DrawKind::Scene | DrawKind::ShadowCasters)
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct PassDef {
    pub name: String,
    pub pipeline: String,
    #[serde(default)]
    pub color: Vec<Attachment>,
    #[serde(default)]
    pub depth: Option<DepthAttachment>,
    /// Bind group names, set at group index = position.
    #[serde(default)]
    pub bind_groups: Vec<String>,
    /// Group index rebound with a per-draw dynamic offset.
    #[serde(default)]
    pub draw_group: Option<u32>,
    pub draw: DrawKind,
    /// Extra texture reads not visible through bind groups.
    #[serde(default)]
    pub reads: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl PassDef {
    pub fn writes_surface(&self) -> bool {
        self.color.iter().any(|a| a.target == SURFACE)
    }
}

pub fn load_graph(path: &Path) -> Result<GraphFile, GraphError> {
    let contents = std::fs::read_to_string(path).map_err(|source| GraphError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let graph = parse_graph(&contents)?;
    tracing::info!(
        "Loaded graph '{}' v{} with {} passes and {} resources",
        graph.name,
        graph.version,
        graph.passes.len(),
        graph.resources.len()
    );
    Ok(graph)
}

pub fn parse_graph(yaml: &str) -> Result<GraphFile, GraphError> {
    Ok(serde_yaml::from_str(yaml)?)
}

/// Register every resource the graph declares. Textures with an `image`
/// are decoded from `root` here.
pub fn register_resources(
    graph: &GraphFile,
    storage: &mut StorageManager,
    root: &Path,
) -> Result<(), GraphError> {
    let res = &graph.resources;
    for (name, desc) in &res.buffers {
        storage.register_buffer(name, desc.clone())?;
    }
    for (name, desc) in &res.textures {
        let desc = match &desc.image {
            Some(image) => {
                let mut loaded = load_texture_desc(&root.join(image))?;
                loaded.image = Some(image.clone());
                loaded
            }
            None => desc.clone(),
        };
        storage.register_texture(name, desc)?;
    }
    for (name, desc) in &res.samplers {
        storage.register_sampler(name, desc.clone())?;
    }
    for (name, desc) in &res.layouts {
        storage.register_layout(name, desc.clone())?;
    }
    for (name, desc) in &res.bind_groups {
        storage.register_bind_group(name, desc.clone())?;
    }
    for (name, desc) in &res.shaders {
        storage.register_shader(name, desc.clone())?;
    }
    for (name, desc) in &res.pipelines {
        storage.register_pipeline(name, desc.clone())?;
    }
    Ok(())
}

/// Attachment targets, colour first. May include `surface`.
pub fn pass_writes(pass: &PassDef) -> Vec<&str> {
    let mut out: Vec<&str> = pass.color.iter().map(|a| a.target.as_str()).collect();
    if let Some(depth) = &pass.depth {
        out.push(depth.target.as_str());
    }
    out
}

/// Explicit reads plus every texture bound through the pass's bind groups.
pub fn pass_reads(pass: &PassDef, storage: &StorageManager) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let bound = pass
        .bind_groups
        .iter()
        .filter_map(|bg| storage.bind_group_desc(bg))
        .flat_map(|desc| desc.texture_names());
    for name in pass.reads.iter().map(String::as_str).chain(bound) {
        if !out.iter().any(|n| n == name) {
            out.push(name.to_string());
        }
    }
    out
}

/// Execution order as indices into `passes`.
///
/// A reader depends on the nearest writer declared before it, or on the last
/// writer when the texture is only produced further down the file. Writers
/// of the same target run in declaration order. Ready passes are taken in
/// declaration order.
pub fn build_order(passes: &[PassDef], storage: &StorageManager) -> Result<Vec<usize>, GraphError> {
    let n = passes.len();
    let mut writers: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, pass) in passes.iter().enumerate() {
        for target in pass_writes(pass) {
            let list = writers.entry(target).or_default();
            if list.last() != Some(&i) {
                list.push(i);
            }
        }
    }

    let mut edges: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
    for list in writers.values() {
        for pair in list.windows(2) {
            edges[pair[0]].insert(pair[1]);
        }
    }
    for (i, pass) in passes.iter().enumerate() {
        for read in pass_reads(pass, storage) {
            let Some(list) = writers.get(read.as_str()) else {
                continue;
            };
            let writer = list
                .iter()
                .rev()
                .find(|&&w| w < i)
                .or_else(|| list.last())
                .copied();
            if let Some(w) = writer.filter(|&w| w != i) {
                edges[w].insert(i);
            }
        }
    }

    let mut in_degree = vec![0usize; n];
    for targets in &edges {
        for &t in targets {
            in_degree[t] += 1;
        }
    }
    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(node) = ready.pop_first() {
        order.push(node);
        for &next in &edges[node] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.insert(next);
            }
        }
    }

    if order.len() != n {
        let stuck: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] > 0).collect();
        let names = stuck
            .iter()
            .filter(|&&i| on_cycle(i, &edges, &stuck))
            .map(|&i| passes[i].name.clone())
            .collect();
        return Err(GraphError::Cycle(names));
    }
    Ok(order)
}

/// Whether `start` can reach itself through passes in `within`. Passes that
/// only sit downstream of a cycle cannot.
fn on_cycle(start: usize, edges: &[BTreeSet<usize>], within: &BTreeSet<usize>) -> bool {
    let mut seen = HashSet::new();
    let mut stack: Vec<usize> = edges[start].iter().copied().collect();
    while let Some(node) = stack.pop() {
        if node == start {
            return true;
        }
        if within.contains(&node) && seen.insert(node) {
            stack.extend(edges[node].iter().copied());
        }
    }
    false
}

/// Structural checks against registered resources. Returns every problem.
pub fn validate(graph: &GraphFile, storage: &StorageManager) -> Vec<GraphError> {
    let mut errors = Vec::new();
    if graph.passes.is_empty() {
        errors.push(GraphError::NoPasses);
        return errors;
    }

    let mut names = HashSet::new();
    for pass in &graph.passes {
        if !names.insert(pass.name.as_str()) {
            errors.push(GraphError::DuplicatePass(pass.name.clone()));
        }
        validate_pass(pass, storage, &mut errors);
    }

    if !graph.passes.iter().any(PassDef::writes_surface) {
        errors.push(GraphError::NoSurfaceWriter);
    }
    errors
}

fn validate_pass(pass: &PassDef, storage: &StorageManager, errors: &mut Vec<GraphError>) {
    let missing = |kind: ResourceKind, name: &str| GraphError::MissingResource {
        pass: pass.name.clone(),
        kind,
        name: name.to_string(),
    };
    let invalid = |target: &str, reason: String| GraphError::InvalidAttachment {
        pass: pass.name.clone(),
        target: target.to_string(),
        reason,
    };

    for bg in &pass.bind_groups {
        if !storage.contains(&ResourceKind::BindGroup.key(bg)) {
            errors.push(missing(ResourceKind::BindGroup, bg));
        }
    }
    for read in &pass.reads {
        if !storage.contains(&ResourceKind::Texture.key(read)) {
            errors.push(missing(ResourceKind::Texture, read));
        }
    }

    if pass.draw.uses_draw_group() {
        let valid = pass
            .draw_group
            .is_some_and(|g| (g as usize) < pass.bind_groups.len());
        if !valid {
            errors.push(GraphError::MissingDrawGroup(pass.name.clone()));
        }
    }

    let writes = pass_writes(pass);
    for read in pass_reads(pass, storage) {
        if writes.contains(&read.as_str()) {
            errors.push(GraphError::ReadWriteHazard {
                pass: pass.name.clone(),
                texture: read,
            });
        }
    }

    if pass.depth.as_ref().is_some_and(|d| d.target == SURFACE) {
        errors.push(invalid(SURFACE, "the surface cannot be a depth target".to_string()));
    }

    let Some(pipeline) = storage.pipeline_desc(&pass.pipeline) else {
        errors.push(missing(ResourceKind::RenderPipeline, &pass.pipeline));
        return;
    };

    if pipeline.targets.len() != pass.color.len() {
        errors.push(GraphError::AttachmentCount {
            pass: pass.name.clone(),
            expected: pipeline.targets.len(),
            found: pass.color.len(),
        });
    }
    for (attachment, target) in pass.color.iter().zip(&pipeline.targets) {
        let wants_surface = target.format == SURFACE;
        if attachment.target == SURFACE {
            if !wants_surface {
                errors.push(invalid(
                    SURFACE,
                    format!("pipeline target format is {}", target.format),
                ));
            }
            continue;
        }
        match storage.texture_format(&attachment.target) {
            Ok(actual) => {
                let expected = if wants_surface {
                    Ok(storage.surface_format())
                } else {
                    format_from_string(&target.format)
                };
                if expected.is_ok_and(|f| f != actual) {
                    errors.push(invalid(
                        &attachment.target,
                        format!("texture is {:?}, pipeline expects {}", actual, target.format),
                    ));
                }
            }
            Err(_) => errors.push(missing(ResourceKind::Texture, &attachment.target)),
        }
    }

    match (&pass.depth, &pipeline.depth) {
        (Some(attachment), Some(depth)) if attachment.target != SURFACE => {
            match storage.texture_format(&attachment.target) {
                Ok(actual) => {
                    if format_from_string(&depth.format).is_ok_and(|f| f != actual) {
                        errors.push(invalid(
                            &attachment.target,
                            format!("texture is {:?}, pipeline expects {}", actual, depth.format),
                        ));
                    }
                }
                Err(_) => errors.push(missing(ResourceKind::Texture, &attachment.target)),
            }
        }
        (Some(_), Some(_)) => {}
        (Some(attachment), None) => errors.push(invalid(
            &attachment.target,
            "pipeline has no depth state".to_string(),
        )),
        (None, Some(_)) => errors.push(invalid(
            "<none>",
            "pipeline expects a depth attachment".to_string(),
        )),
        (None, None) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::register_builtins;
    use crate::uniforms::DrawUniformPool;

    const DEFERRED: &str = r#"
version: 1
name: deferred
resources:
  textures:
    albedo: { format: rgba8 }
    normal: { format: rgba16f }
    depth: { format: depth32f }
    hdr: { format: rgba16f }
  layouts:
    gbuffer_read:
      entries:
        - { binding: 0, type: texture, sample: unfilterable }
        - { binding: 1, type: texture, sample: unfilterable }
    hdr_read:
      entries:
        - { binding: 0, type: texture }
        - { binding: 1, type: sampler }
  bind_groups:
    gbuffer:
      layout: gbuffer_read
      entries:
        - { binding: 0, texture: albedo }
        - { binding: 1, texture: normal }
    hdr:
      layout: hdr_read
      entries:
        - { binding: 0, texture: hdr }
        - { binding: 1, sampler: linear }
  pipelines:
    geometry:
      shader: gbuffer
      bind_group_layouts: [camera_layout, draw_layout]
      vertex_layouts: [mesh]
      targets: [{ format: rgba8 }, { format: rgba16f }]
      depth: { format: depth32f }
    light:
      shader: deferred_light
      bind_group_layouts: [gbuffer_read]
      targets: [{ format: rgba16f }]
    tonemap:
      shader: tonemap
      bind_group_layouts: [hdr_read]
      targets: [{ format: surface }]
passes:
  - name: geometry
    pipeline: geometry
    color: [{ target: albedo, clear: [0, 0, 0, 1] }, { target: normal, clear: [0, 0, 0, 0] }]
    depth: { target: depth, clear: 1.0 }
    bind_groups: [camera, draw]
    draw_group: 1
    draw: scene
  - name: lighting
    pipeline: light
    color: [{ target: hdr, clear: [0, 0, 0, 1] }]
    bind_groups: [gbuffer]
    draw: fullscreen
  - name: tonemap
    pipeline: tonemap
    color: [{ target: surface }]
    bind_groups: [hdr]
    draw: fullscreen
"#;

    fn prepared(yaml: &str) -> (GraphFile, StorageManager) {
        let graph = parse_graph(yaml).unwrap();
        let mut storage = StorageManager::new(wgpu::TextureFormat::Bgra8UnormSrgb);
        register_builtins(&mut storage, &DrawUniformPool::new()).unwrap();
        register_resources(&graph, &mut storage, Path::new(".")).unwrap();
        (graph, storage)
    }

    fn reorder(graph: &mut GraphFile, order: &[usize]) {
        let passes = std::mem::take(&mut graph.passes);
        graph.passes = order.iter().map(|&i| passes[i].clone()).collect();
    }

    #[test]
    fn test_parse_graph_yaml() {
        let graph = parse_graph(DEFERRED).unwrap();
        assert_eq!(graph.version, 1);
        assert_eq!(graph.name, "deferred");
        assert_eq!(graph.passes.len(), 3);
        assert_eq!(graph.resources.textures.len(), 4);
        assert_eq!(graph.passes[0].draw, DrawKind::Scene);
        assert_eq!(graph.passes[0].depth.as_ref().and_then(|d| d.clear), Some(1.0));
        assert_eq!(graph.passes[2].color[0].clear, None);
        assert!(graph.passes.iter().all(|p| p.enabled));
    }

    #[test]
    fn test_draw_kind_from_str() {
        assert_eq!(DrawKind::try_from("foliage".to_string()), Ok(DrawKind::Foliage));
        assert_eq!(
            DrawKind::try_from("mesh:procedural:cube".to_string()),
            Ok(DrawKind::Mesh("procedural:cube".into()))
        );
        assert!(DrawKind::try_from("mesh:".to_string()).is_err());
        assert!(DrawKind::try_from("compute".to_string()).is_err());
    }

    #[test]
    fn test_validate_deferred_graph() {
        let (graph, storage) = prepared(DEFERRED);
        let errors = validate(&graph, &storage);
        assert!(errors.is_empty(), "{:?}", errors);
        assert!(storage.validate().is_empty());
    }

    #[test]
    fn test_declared_order_preserved() {
        let (graph, storage) = prepared(DEFERRED);
        assert_eq!(build_order(&graph.passes, &storage).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_reader_moved_after_later_writer() {
        let (mut graph, storage) = prepared(DEFERRED);
        // tonemap, lighting, geometry
        reorder(&mut graph, &[2, 1, 0]);
        let order = build_order(&graph.passes, &storage).unwrap();
        let names: Vec<&str> = order.iter().map(|&i| graph.passes[i].name.as_str()).collect();
        assert_eq!(names, vec!["geometry", "lighting", "tonemap"]);
    }

    #[test]
    fn test_pass_reads_include_bind_group_textures() {
        let (graph, storage) = prepared(DEFERRED);
        assert_eq!(pass_reads(&graph.passes[1], &storage), vec!["albedo", "normal"]);
        assert_eq!(pass_writes(&graph.passes[0]), vec!["albedo", "normal", "depth"]);
    }

    #[test]
    fn test_cycle_names_passes() {
        let yaml = r#"
version: 1
resources:
  textures:
    a: { format: rgba8 }
    b: { format: rgba8 }
    c: { format: rgba8 }
passes:
  - { name: first, pipeline: p, color: [{ target: a }], reads: [b], draw: fullscreen }
  - { name: second, pipeline: p, color: [{ target: b }], reads: [a], draw: fullscreen }
  - { name: after, pipeline: p, color: [{ target: c }], reads: [b], draw: fullscreen }
"#;
        let (graph, storage) = prepared(yaml);
        match build_order(&graph.passes, &storage) {
            // `after` only waits on the cycle and is not part of it
            Err(GraphError::Cycle(names)) => assert_eq!(names, vec!["first", "second"]),
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_successive_writers_keep_order() {
        let yaml = r#"
version: 1
resources:
  textures:
    hdr: { format: rgba16f }
passes:
  - { name: base, pipeline: p, color: [{ target: hdr, clear: [0, 0, 0, 1] }], draw: fullscreen }
  - { name: overlay, pipeline: p, color: [{ target: hdr }], draw: fullscreen }
  - { name: present, pipeline: p, color: [{ target: surface }], reads: [hdr], draw: fullscreen }
"#;
        let (mut graph, storage) = prepared(yaml);
        reorder(&mut graph, &[2, 0, 1]);
        let order = build_order(&graph.passes, &storage).unwrap();
        let names: Vec<&str> = order.iter().map(|&i| graph.passes[i].name.as_str()).collect();
        assert_eq!(names, vec!["base", "overlay", "present"]);
    }

    #[test]
    fn test_validate_reports_problems() {
        let yaml = r#"
version: 1
resources:
  textures:
    hdr: { format: rgba16f }
  pipelines:
    tonemap:
      shader: tonemap
      targets: [{ format: surface }]
passes:
  - name: a
    pipeline: tonemap
    color: [{ target: hdr }]
    bind_groups: [nope]
    draw: scene
  - name: a
    pipeline: missing
    color: [{ target: hdr }]
    reads: [hdr]
    draw: fullscreen
"#;
        let (graph, storage) = prepared(yaml);
        let errors = validate(&graph, &storage);
        let has = |f: &dyn Fn(&GraphError) -> bool| errors.iter().any(f);
        assert!(has(&|e| matches!(e, GraphError::DuplicatePass(n) if n == "a")));
        assert!(has(&|e| matches!(e, GraphError::MissingResource { kind: ResourceKind::BindGroup, .. })));
        assert!(has(&|e| matches!(e, GraphError::MissingResource { kind: ResourceKind::RenderPipeline, .. })));
        assert!(has(&|e| matches!(e, GraphError::MissingDrawGroup(_))));
        assert!(has(&|e| matches!(e, GraphError::ReadWriteHazard { texture, .. } if texture == "hdr")));
        assert!(has(&|e| matches!(e, GraphError::InvalidAttachment { target, .. } if target == "hdr")));
        assert!(has(&|e| matches!(e, GraphError::NoSurfaceWriter)));
    }

    #[test]
    fn test_depth_attachment_must_match_pipeline() {
        let (mut graph, storage) = prepared(DEFERRED);
        graph.passes[0].depth = None;
        let errors = validate(&graph, &storage);
        assert!(errors
            .iter()
            .any(|e| matches!(e, GraphError::InvalidAttachment { pass, .. } if pass == "geometry")));
    }

    #[test]
    fn test_load_graph_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.yaml");
        std::fs::write(&path, DEFERRED).unwrap();
        let graph = load_graph(&path).unwrap();
        assert_eq!(graph.passes.len(), 3);
        assert!(matches!(
            load_graph(&dir.path().join("missing.yaml")),
            Err(GraphError::Io { .. })
        ));
    }
}
