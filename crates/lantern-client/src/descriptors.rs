//! Declarative descriptors for every storage kind and their `wgpu` conversions.
//!
//! Descriptors are plain serde data so graph files can declare resources and
//! the storage layer can validate references before any device exists.

use std::num::NonZeroU64;

use serde::Deserialize;

use lantern_core::mesh_data::MeshVertex;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DescriptorError {
    #[error("unknown texture format '{0}'")]
    UnknownFormat(String),
    #[error("bind group entry {binding} must name exactly one of buffer, texture or sampler")]
    AmbiguousEntry { binding: u32 },
    #[error("shader source must set exactly one of builtin, path or wgsl")]
    AmbiguousShader,
    #[error("unknown draw kind '{0}'")]
    UnknownDraw(String),
}

// ---------------------------------------------------------------------------
// Buffers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferUsage {
    Uniform,
    Storage,
    Vertex,
    Index,
    CopyDst,
    CopySrc,
}

pub fn buffer_usages(usage: &[BufferUsage]) -> wgpu::BufferUsages {
    usage
        .iter()
        .fold(wgpu::BufferUsages::empty(), |acc, u| {
            acc | match u {
                BufferUsage::Uniform => wgpu::BufferUsages::UNIFORM,
                BufferUsage::Storage => wgpu::BufferUsages::STORAGE,
                BufferUsage::Vertex => wgpu::BufferUsages::VERTEX,
                BufferUsage::Index => wgpu::BufferUsages::INDEX,
                BufferUsage::CopyDst => wgpu::BufferUsages::COPY_DST,
                BufferUsage::CopySrc => wgpu::BufferUsages::COPY_SRC,
            }
        })
}

fn default_buffer_usage() -> Vec<BufferUsage> {
    vec![BufferUsage::Uniform, BufferUsage::CopyDst]
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BufferDesc {
    pub size: u64,
    #[serde(default = "default_buffer_usage")]
    pub usage: Vec<BufferUsage>,
    /// Initial contents. Padded with zeros up to `size`.
    #[serde(default)]
    pub contents: Option<Vec<u8>>,
}

impl BufferDesc {
    pub fn uniform(size: u64) -> Self {
        Self {
            size,
            usage: default_buffer_usage(),
            contents: None,
        }
    }

    pub fn with_contents(usage: Vec<BufferUsage>, contents: Vec<u8>) -> Self {
        Self {
            size: contents.len() as u64,
            usage,
            contents: Some(contents),
        }
    }

    /// Allocation size: at least `size` and the contents, rounded up to 4 bytes.
    pub fn allocation_size(&self) -> u64 {
        let len = self.contents.as_ref().map_or(0, |c| c.len() as u64);
        let size = self.size.max(len).max(4);
        size.div_ceil(wgpu::COPY_BUFFER_ALIGNMENT) * wgpu::COPY_BUFFER_ALIGNMENT
    }
}

// ---------------------------------------------------------------------------
// Textures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceSize {
    Viewport,
    /// Viewport divided by N (e.g., ViewportDiv(2) = half resolution)
    ViewportDiv(u32),
    Fixed(u32, u32),
}

impl ResourceSize {
    pub fn is_viewport_relative(&self) -> bool {
        !matches!(self, ResourceSize::Fixed(..))
    }

    /// Pixel size for the given viewport, never below 1x1.
    pub fn resolve(&self, viewport: (u32, u32)) -> (u32, u32) {
        let (w, h) = match *self {
            ResourceSize::Viewport => viewport,
            ResourceSize::ViewportDiv(d) => (viewport.0 / d, viewport.1 / d),
            ResourceSize::Fixed(w, h) => (w, h),
        };
        (w.max(1), h.max(1))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SizeSpec {
    Text(String),
    Pair([u32; 2]),
}

impl<'de> Deserialize<'de> for ResourceSize {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match SizeSpec::deserialize(deserializer)? {
            SizeSpec::Text(s) => parse_resource_size(&s),
            SizeSpec::Pair([w, h]) => ResourceSize::Fixed(w, h),
        })
    }
}

/// Parse a size string: "viewport", "viewport/2", or "[width, height]".
/// Anything else falls back to the viewport size.
pub fn parse_resource_size(s: &str) -> ResourceSize {
    let s = s.trim();
    if s == "viewport" {
        return ResourceSize::Viewport;
    }
    if let Some(divisor) = s.strip_prefix("viewport/") {
        if let Ok(divisor) = divisor.trim().parse::<u32>() {
            if divisor > 0 {
                return ResourceSize::ViewportDiv(divisor);
            }
        }
    }
    let trimmed = s.trim_matches(|c| c == '[' || c == ']');
    let parts: Vec<&str> = trimmed.split(',').map(str::trim).collect();
    if let [w, h] = parts.as_slice() {
        if let (Ok(w), Ok(h)) = (w.parse::<u32>(), h.parse::<u32>()) {
            if w > 0 && h > 0 {
                return ResourceSize::Fixed(w, h);
            }
        }
    }
    tracing::warn!("Unrecognised texture size '{}', using viewport", s);
    ResourceSize::Viewport
}

/// Map format string from YAML to wgpu::TextureFormat.
pub fn format_from_string(s: &str) -> Result<wgpu::TextureFormat, DescriptorError> {
    use wgpu::TextureFormat as F;
    match s {
        "rgba8" | "rgba8unorm" => Ok(F::Rgba8Unorm),
        "rgba8srgb" => Ok(F::Rgba8UnormSrgb),
        "bgra8" | "bgra8unorm" => Ok(F::Bgra8Unorm),
        "bgra8srgb" => Ok(F::Bgra8UnormSrgb),
        "r8" | "r8unorm" => Ok(F::R8Unorm),
        "rgb16f" | "rgba16f" => Ok(F::Rgba16Float),
        "rg16f" => Ok(F::Rg16Float),
        "r16f" => Ok(F::R16Float),
        "rgba32f" => Ok(F::Rgba32Float),
        "r32f" => Ok(F::R32Float),
        "depth32f" => Ok(F::Depth32Float),
        "depth24plus" => Ok(F::Depth24Plus),
        _ => Err(DescriptorError::UnknownFormat(s.to_string())),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextureUsage {
    RenderAttachment,
    TextureBinding,
    StorageBinding,
    CopyDst,
    CopySrc,
}

pub fn texture_usages(usage: &[TextureUsage]) -> wgpu::TextureUsages {
    usage
        .iter()
        .fold(wgpu::TextureUsages::empty(), |acc, u| {
            acc | match u {
                TextureUsage::RenderAttachment => wgpu::TextureUsages::RENDER_ATTACHMENT,
                TextureUsage::TextureBinding => wgpu::TextureUsages::TEXTURE_BINDING,
                TextureUsage::StorageBinding => wgpu::TextureUsages::STORAGE_BINDING,
                TextureUsage::CopyDst => wgpu::TextureUsages::COPY_DST,
                TextureUsage::CopySrc => wgpu::TextureUsages::COPY_SRC,
            }
        })
}

fn default_texture_usage() -> Vec<TextureUsage> {
    vec![TextureUsage::RenderAttachment, TextureUsage::TextureBinding]
}

fn default_size() -> ResourceSize {
    ResourceSize::Viewport
}

/// Raw texel data uploaded after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureData {
    pub bytes_per_row: u32,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TextureDesc {
    pub format: String,
    #[serde(default = "default_size")]
    pub size: ResourceSize,
    #[serde(default = "default_texture_usage")]
    pub usage: Vec<TextureUsage>,
    /// Image file (relative to the project root) decoded at prepare time.
    #[serde(default)]
    pub image: Option<String>,
    #[serde(skip)]
    pub data: Option<TextureData>,
}

impl TextureDesc {
    pub fn target(format: &str, size: ResourceSize) -> Self {
        Self {
            format: format.to_string(),
            size,
            usage: default_texture_usage(),
            image: None,
            data: None,
        }
    }

    /// Fixed-size sampled texture initialised from `bytes`.
    pub fn with_data(format: &str, width: u32, height: u32, bytes_per_row: u32, bytes: Vec<u8>) -> Self {
        Self {
            format: format.to_string(),
            size: ResourceSize::Fixed(width, height),
            usage: vec![TextureUsage::TextureBinding, TextureUsage::CopyDst],
            image: None,
            data: Some(TextureData {
                bytes_per_row,
                bytes,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Samplers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    #[default]
    Linear,
    Nearest,
}

impl From<Filter> for wgpu::FilterMode {
    fn from(f: Filter) -> Self {
        match f {
            Filter::Linear => wgpu::FilterMode::Linear,
            Filter::Nearest => wgpu::FilterMode::Nearest,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressMode {
    #[default]
    Clamp,
    Repeat,
    Mirror,
}

impl From<AddressMode> for wgpu::AddressMode {
    fn from(a: AddressMode) -> Self {
        match a {
            AddressMode::Clamp => wgpu::AddressMode::ClampToEdge,
            AddressMode::Repeat => wgpu::AddressMode::Repeat,
            AddressMode::Mirror => wgpu::AddressMode::MirrorRepeat,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compare {
    Never,
    Less,
    LessEqual,
    Equal,
    Greater,
    GreaterEqual,
    Always,
}

impl From<Compare> for wgpu::CompareFunction {
    fn from(c: Compare) -> Self {
        match c {
            Compare::Never => wgpu::CompareFunction::Never,
            Compare::Less => wgpu::CompareFunction::Less,
            Compare::LessEqual => wgpu::CompareFunction::LessEqual,
            Compare::Equal => wgpu::CompareFunction::Equal,
            Compare::Greater => wgpu::CompareFunction::Greater,
            Compare::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
            Compare::Always => wgpu::CompareFunction::Always,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct SamplerDesc {
    #[serde(default)]
    pub filter: Filter,
    #[serde(default)]
    pub address_mode: AddressMode,
    #[serde(default)]
    pub compare: Option<Compare>,
}

impl SamplerDesc {
    pub fn to_wgpu<'a>(&self, label: &'a str) -> wgpu::SamplerDescriptor<'a> {
        let address = self.address_mode.into();
        wgpu::SamplerDescriptor {
            label: Some(label),
            address_mode_u: address,
            address_mode_v: address,
            address_mode_w: address,
            mag_filter: self.filter.into(),
            min_filter: self.filter.into(),
            mipmap_filter: wgpu::FilterMode::Nearest,
            compare: self.compare.map(Into::into),
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Bind group layouts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

fn default_visibility() -> Vec<ShaderStage> {
    vec![ShaderStage::Vertex, ShaderStage::Fragment]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleKind {
    #[default]
    Float,
    Unfilterable,
    Depth,
    Uint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplerKind {
    #[default]
    Filtering,
    NonFiltering,
    Comparison,
}

fn default_true() -> bool {
    true
}

/// What a layout slot accepts.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BindingKind {
    Uniform {
        #[serde(default)]
        dynamic: bool,
    },
    Storage {
        #[serde(default = "default_true")]
        read_only: bool,
    },
    Texture {
        #[serde(default)]
        sample: SampleKind,
    },
    Sampler {
        #[serde(default)]
        kind: SamplerKind,
    },
}

impl BindingKind {
    pub fn to_wgpu(&self) -> wgpu::BindingType {
        match *self {
            BindingKind::Uniform { dynamic } => wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: dynamic,
                min_binding_size: None,
            },
            BindingKind::Storage { read_only } => wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            BindingKind::Texture { sample } => wgpu::BindingType::Texture {
                sample_type: match sample {
                    SampleKind::Float => wgpu::TextureSampleType::Float { filterable: true },
                    SampleKind::Unfilterable => {
                        wgpu::TextureSampleType::Float { filterable: false }
                    }
                    SampleKind::Depth => wgpu::TextureSampleType::Depth,
                    SampleKind::Uint => wgpu::TextureSampleType::Uint,
                },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            BindingKind::Sampler { kind } => wgpu::BindingType::Sampler(match kind {
                SamplerKind::Filtering => wgpu::SamplerBindingType::Filtering,
                SamplerKind::NonFiltering => wgpu::SamplerBindingType::NonFiltering,
                SamplerKind::Comparison => wgpu::SamplerBindingType::Comparison,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LayoutEntry {
    pub binding: u32,
    #[serde(default = "default_visibility")]
    pub visibility: Vec<ShaderStage>,
    #[serde(flatten)]
    pub ty: BindingKind,
}

impl LayoutEntry {
    pub fn new(binding: u32, ty: BindingKind) -> Self {
        Self {
            binding,
            visibility: default_visibility(),
            ty,
        }
    }

    pub fn to_wgpu(&self) -> wgpu::BindGroupLayoutEntry {
        let visibility = self
            .visibility
            .iter()
            .fold(wgpu::ShaderStages::NONE, |acc, s| {
                acc | match s {
                    ShaderStage::Vertex => wgpu::ShaderStages::VERTEX,
                    ShaderStage::Fragment => wgpu::ShaderStages::FRAGMENT,
                }
            });
        wgpu::BindGroupLayoutEntry {
            binding: self.binding,
            visibility,
            ty: self.ty.to_wgpu(),
            count: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct BindGroupLayoutDesc {
    pub entries: Vec<LayoutEntry>,
}

// ---------------------------------------------------------------------------
// Bind groups
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum BindingResourceDesc {
    /// Whole buffer, or the first `size` bytes (dynamic-offset windows).
    Buffer { name: String, size: Option<u64> },
    Texture(String),
    Sampler(String),
}

#[derive(Deserialize)]
struct RawBindGroupEntry {
    binding: u32,
    #[serde(default)]
    buffer: Option<String>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    texture: Option<String>,
    #[serde(default)]
    sampler: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawBindGroupEntry")]
pub struct BindGroupEntryDesc {
    pub binding: u32,
    pub resource: BindingResourceDesc,
}

impl TryFrom<RawBindGroupEntry> for BindGroupEntryDesc {
    type Error = DescriptorError;

    fn try_from(raw: RawBindGroupEntry) -> Result<Self, Self::Error> {
        let resource = match (raw.buffer, raw.texture, raw.sampler) {
            (Some(name), None, None) => BindingResourceDesc::Buffer {
                name,
                size: raw.size,
            },
            (None, Some(name), None) => BindingResourceDesc::Texture(name),
            (None, None, Some(name)) => BindingResourceDesc::Sampler(name),
            _ => {
                return Err(DescriptorError::AmbiguousEntry {
                    binding: raw.binding,
                })
            }
        };
        Ok(Self {
            binding: raw.binding,
            resource,
        })
    }
}

impl BindGroupEntryDesc {
    pub fn buffer(binding: u32, name: &str, size: Option<u64>) -> Self {
        Self {
            binding,
            resource: BindingResourceDesc::Buffer {
                name: name.to_string(),
                size,
            },
        }
    }

    pub fn texture(binding: u32, name: &str) -> Self {
        Self {
            binding,
            resource: BindingResourceDesc::Texture(name.to_string()),
        }
    }

    pub fn sampler(binding: u32, name: &str) -> Self {
        Self {
            binding,
            resource: BindingResourceDesc::Sampler(name.to_string()),
        }
    }
}

pub fn buffer_binding_size(size: Option<u64>) -> Option<NonZeroU64> {
    size.and_then(NonZeroU64::new)
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BindGroupDesc {
    pub layout: String,
    pub entries: Vec<BindGroupEntryDesc>,
}

impl BindGroupDesc {
    pub fn texture_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|e| match &e.resource {
            BindingResourceDesc::Texture(name) => Some(name.as_str()),
            _ => None,
        })
    }
}

// ---------------------------------------------------------------------------
// Shaders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ShaderSource {
    Builtin(String),
    /// File relative to the project root.
    Path(String),
    Inline(String),
}

#[derive(Deserialize)]
struct RawShaderSource {
    #[serde(default)]
    builtin: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    wgsl: Option<String>,
}

impl TryFrom<RawShaderSource> for ShaderSource {
    type Error = DescriptorError;

    fn try_from(raw: RawShaderSource) -> Result<Self, Self::Error> {
        match (raw.builtin, raw.path, raw.wgsl) {
            (Some(name), None, None) => Ok(ShaderSource::Builtin(name)),
            (None, Some(path), None) => Ok(ShaderSource::Path(path)),
            (None, None, Some(src)) => Ok(ShaderSource::Inline(src)),
            _ => Err(DescriptorError::AmbiguousShader),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawShaderSource")]
pub struct ShaderDesc {
    pub source: ShaderSource,
}

impl TryFrom<RawShaderSource> for ShaderDesc {
    type Error = DescriptorError;

    fn try_from(raw: RawShaderSource) -> Result<Self, Self::Error> {
        Ok(Self {
            source: raw.try_into()?,
        })
    }
}

impl ShaderDesc {
    pub fn builtin(name: &str) -> Self {
        Self {
            source: ShaderSource::Builtin(name.to_string()),
        }
    }

    pub fn path(&self) -> Option<&str> {
        match &self.source {
            ShaderSource::Path(p) => Some(p),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Render pipelines
// ---------------------------------------------------------------------------

/// Vertex buffer layouts a pipeline can consume, in slot order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VertexLayout {
    /// `MeshVertex`: position, normal, uv, colour at locations 0..=3.
    Mesh,
    /// Per-instance foliage data at locations 4..=5.
    FoliageInstance,
}

const MESH_ATTRIBS: [wgpu::VertexAttribute; 4] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2, 3 => Float32x4];
const FOLIAGE_ATTRIBS: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![4 => Float32x4, 5 => Float32x4];

impl VertexLayout {
    pub fn to_wgpu(self) -> wgpu::VertexBufferLayout<'static> {
        match self {
            VertexLayout::Mesh => wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<MeshVertex>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &MESH_ATTRIBS,
            },
            VertexLayout::FoliageInstance => wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<lantern_core::foliage::FoliageInstance>()
                    as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Instance,
                attributes: &FOLIAGE_ATTRIBS,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    #[default]
    Replace,
    Alpha,
    Additive,
}

impl BlendMode {
    pub fn to_wgpu(self) -> wgpu::BlendState {
        match self {
            BlendMode::Replace => wgpu::BlendState::REPLACE,
            BlendMode::Alpha => wgpu::BlendState::ALPHA_BLENDING,
            BlendMode::Additive => wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::One,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
                alpha: wgpu::BlendComponent::OVER,
            },
        }
    }
}

/// Format name, or `"surface"` for the swapchain format.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ColorTargetDesc {
    pub format: String,
    #[serde(default)]
    pub blend: BlendMode,
}

pub const SURFACE: &str = "surface";

fn default_depth_compare() -> Compare {
    Compare::Less
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DepthDesc {
    pub format: String,
    #[serde(default = "default_true")]
    pub write: bool,
    #[serde(default = "default_depth_compare")]
    pub compare: Compare,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct DepthBiasDesc {
    #[serde(default)]
    pub constant: i32,
    #[serde(default)]
    pub slope_scale: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    #[default]
    TriangleList,
    TriangleStrip,
    LineList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cull {
    #[default]
    None,
    Back,
    Front,
}

fn default_vs() -> String {
    "vs_main".to_string()
}

fn default_fs() -> String {
    "fs_main".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RenderPipelineDesc {
    /// Shader resource name.
    pub shader: String,
    #[serde(default = "default_vs")]
    pub vertex_entry: String,
    #[serde(default = "default_fs")]
    pub fragment_entry: String,
    #[serde(default)]
    pub bind_group_layouts: Vec<String>,
    #[serde(default)]
    pub vertex_layouts: Vec<VertexLayout>,
    #[serde(default)]
    pub targets: Vec<ColorTargetDesc>,
    #[serde(default)]
    pub depth: Option<DepthDesc>,
    #[serde(default)]
    pub topology: Topology,
    #[serde(default)]
    pub cull: Cull,
    #[serde(default)]
    pub depth_bias: Option<DepthBiasDesc>,
}

impl RenderPipelineDesc {
    pub fn primitive_state(&self) -> wgpu::PrimitiveState {
        wgpu::PrimitiveState {
            topology: match self.topology {
                Topology::TriangleList => wgpu::PrimitiveTopology::TriangleList,
                Topology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
                Topology::LineList => wgpu::PrimitiveTopology::LineList,
            },
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: match self.cull {
                Cull::None => None,
                Cull::Back => Some(wgpu::Face::Back),
                Cull::Front => Some(wgpu::Face::Front),
            },
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        }
    }

    pub fn depth_state(&self) -> Result<Option<wgpu::DepthStencilState>, DescriptorError> {
        let Some(depth) = &self.depth else {
            return Ok(None);
        };
        let bias = self.depth_bias.unwrap_or_default();
        Ok(Some(wgpu::DepthStencilState {
            format: format_from_string(&depth.format)?,
            depth_write_enabled: depth.write,
            depth_compare: depth.compare.into(),
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState {
                constant: bias.constant,
                slope_scale: bias.slope_scale,
                clamp: 0.0,
            },
        }))
    }

    /// Resolve target formats, mapping `"surface"` to `surface_format`.
    pub fn color_targets(
        &self,
        surface_format: wgpu::TextureFormat,
    ) -> Result<Vec<Option<wgpu::ColorTargetState>>, DescriptorError> {
        self.targets
            .iter()
            .map(|t| {
                let format = if t.format == SURFACE {
                    surface_format
                } else {
                    format_from_string(&t.format)?
                };
                Ok(Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(t.blend.to_wgpu()),
                    write_mask: wgpu::ColorWrites::ALL,
                }))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_string() {
        assert_eq!(format_from_string("rgba16f"), Ok(wgpu::TextureFormat::Rgba16Float));
        assert_eq!(format_from_string("rgb16f"), Ok(wgpu::TextureFormat::Rgba16Float));
        assert_eq!(format_from_string("depth32f"), Ok(wgpu::TextureFormat::Depth32Float));
        assert!(matches!(
            format_from_string("rgba9"),
            Err(DescriptorError::UnknownFormat(_))
        ));
    }

    #[test]
    fn test_parse_resource_size() {
        assert_eq!(parse_resource_size("viewport"), ResourceSize::Viewport);
        assert_eq!(parse_resource_size("viewport/2"), ResourceSize::ViewportDiv(2));
        assert_eq!(parse_resource_size("[2048, 1024]"), ResourceSize::Fixed(2048, 1024));
        // Malformed falls back to viewport
        assert_eq!(parse_resource_size("viewport/0"), ResourceSize::Viewport);
        assert_eq!(parse_resource_size("huge"), ResourceSize::Viewport);
    }

    #[test]
    fn test_size_resolve_never_zero() {
        assert_eq!(ResourceSize::ViewportDiv(4).resolve((2, 2)), (1, 1));
        assert_eq!(ResourceSize::Viewport.resolve((800, 600)), (800, 600));
        assert_eq!(ResourceSize::Fixed(16, 8).resolve((800, 600)), (16, 8));
    }

    #[test]
    fn test_texture_desc_yaml() {
        let yaml = "format: rgba16f\nsize: viewport/2\n";
        let desc: TextureDesc = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(desc.size, ResourceSize::ViewportDiv(2));
        assert_eq!(desc.usage, default_texture_usage());

        let fixed: TextureDesc = serde_yaml::from_str("format: depth32f\nsize: [1024, 1024]\n").unwrap();
        assert_eq!(fixed.size, ResourceSize::Fixed(1024, 1024));
    }

    #[test]
    fn test_layout_entry_yaml() {
        let yaml = r#"
entries:
  - { binding: 0, type: uniform, dynamic: true, visibility: [vertex] }
  - { binding: 1, type: texture, sample: depth }
  - { binding: 2, type: sampler, kind: comparison }
"#;
        let desc: BindGroupLayoutDesc = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(desc.entries[0].ty, BindingKind::Uniform { dynamic: true });
        assert_eq!(desc.entries[0].visibility, vec![ShaderStage::Vertex]);
        assert_eq!(
            desc.entries[1].ty,
            BindingKind::Texture {
                sample: SampleKind::Depth
            }
        );
        assert_eq!(
            desc.entries[2].to_wgpu().ty,
            wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison)
        );
    }

    #[test]
    fn test_bind_group_entry_yaml() {
        let yaml = r#"
layout: lit_layout
entries:
  - { binding: 0, buffer: lighting }
  - { binding: 1, buffer: draw, size: 256 }
  - { binding: 2, texture: shadow_map }
  - { binding: 3, sampler: shadow_compare }
"#;
        let desc: BindGroupDesc = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            desc.entries[1].resource,
            BindingResourceDesc::Buffer {
                name: "draw".into(),
                size: Some(256)
            }
        );
        assert_eq!(desc.texture_names().collect::<Vec<_>>(), vec!["shadow_map"]);

        let bad = "layout: x\nentries:\n  - { binding: 0, buffer: a, texture: b }\n";
        assert!(serde_yaml::from_str::<BindGroupDesc>(bad).is_err());
    }

    #[test]
    fn test_shader_desc_yaml() {
        let d: ShaderDesc = serde_yaml::from_str("builtin: gbuffer").unwrap();
        assert_eq!(d.source, ShaderSource::Builtin("gbuffer".into()));
        let d: ShaderDesc = serde_yaml::from_str("path: shaders/x.wgsl").unwrap();
        assert_eq!(d.path(), Some("shaders/x.wgsl"));
        assert!(serde_yaml::from_str::<ShaderDesc>("{}").is_err());
    }

    #[test]
    fn test_pipeline_desc_defaults() {
        let yaml = r#"
shader: tonemap
targets: [{ format: surface }]
"#;
        let desc: RenderPipelineDesc = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(desc.vertex_entry, "vs_main");
        assert_eq!(desc.fragment_entry, "fs_main");
        assert!(desc.depth_state().unwrap().is_none());
        let targets = desc
            .color_targets(wgpu::TextureFormat::Bgra8UnormSrgb)
            .unwrap();
        assert_eq!(
            targets[0].as_ref().map(|t| t.format),
            Some(wgpu::TextureFormat::Bgra8UnormSrgb)
        );
    }

    #[test]
    fn test_buffer_allocation_size_aligned() {
        let desc = BufferDesc::with_contents(vec![BufferUsage::Vertex], vec![1, 2, 3, 4, 5]);
        assert_eq!(desc.allocation_size(), 8);
        assert_eq!(BufferDesc::uniform(0).allocation_size(), 4);
        assert_eq!(BufferDesc::uniform(304).allocation_size(), 304);
    }

    #[test]
    fn test_usage_flags() {
        let u = buffer_usages(&[BufferUsage::Uniform, BufferUsage::CopyDst]);
        assert_eq!(u, wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST);
        let t = texture_usages(&default_texture_usage());
        assert!(t.contains(wgpu::TextureUsages::RENDER_ATTACHMENT));
    }
}
