//! Reserved resources every graph can reference.
//!
//! Registered before any graph resources so graph files only declare what is
//! specific to them (targets, their own layouts, bind groups and pipelines).

use crate::descriptors::{
    AddressMode, BindGroupDesc, BindGroupEntryDesc, BindGroupLayoutDesc, BindingKind, BufferDesc,
    BufferUsage, Compare, Filter, LayoutEntry, ResourceSize, SamplerDesc, ShaderDesc,
    ShaderStage, TextureDesc, TextureUsage,
};
use crate::storage::{StorageError, StorageManager};
use crate::uniforms::{
    encode_unorm8, ssao_kernel, ssao_noise, CameraUniform, DrawUniformPool, FrameUniforms,
    LightingUniforms, ShadowUniforms, DRAW_UNIFORM_SIZE, SSAO_KERNEL_SIZE,
};

pub const CAMERA: &str = "camera";
pub const LIGHTING: &str = "lighting";
pub const SHADOW: &str = "shadow";
pub const FRAME: &str = "frame";
pub const DRAW: &str = "draw";
pub const SSAO_KERNEL: &str = "ssao_kernel";
pub const FOLIAGE_INSTANCES: &str = "foliage_instances";

pub const CAMERA_LAYOUT: &str = "camera_layout";
pub const DRAW_LAYOUT: &str = "draw_layout";
pub const FRAME_LAYOUT: &str = "frame_layout";
pub const SHADOW_LAYOUT: &str = "shadow_layout";

pub const WHITE: &str = "white";
pub const SHADOW_NONE: &str = "shadow_none";
pub const SSAO_NOISE: &str = "ssao_noise";

/// Texture a graph renders its shadow map into. Lighting treats shadows as
/// enabled only when an enabled pass writes it.
pub const SHADOW_MAP: &str = "shadow_map";
/// Texture holding ambient occlusion. Same rule as [`SHADOW_MAP`].
pub const AO_TARGET: &str = "ssao_blurred";

const SSAO_SEED: u64 = 0x55a0;

const BUILTIN_SHADERS: &[(&str, &str)] = &[
    ("triangle", include_str!("shaders/triangle.wgsl")),
    ("forward", include_str!("shaders/forward.wgsl")),
    ("forward_shadowed", include_str!("shaders/forward_shadowed.wgsl")),
    ("shadow_depth", include_str!("shaders/shadow_depth.wgsl")),
    ("gbuffer", include_str!("shaders/gbuffer.wgsl")),
    ("foliage", include_str!("shaders/foliage.wgsl")),
    ("deferred_light", include_str!("shaders/deferred_light.wgsl")),
    ("ssao", include_str!("shaders/ssao.wgsl")),
    ("ssao_blur", include_str!("shaders/ssao_blur.wgsl")),
    ("tonemap", include_str!("shaders/tonemap.wgsl")),
];

pub fn builtin_shader(name: &str) -> Option<&'static str> {
    BUILTIN_SHADERS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, src)| *src)
}

pub fn builtin_shader_names() -> impl Iterator<Item = &'static str> {
    BUILTIN_SHADERS.iter().map(|(n, _)| *n)
}

fn uniform_layout(visibility: Vec<ShaderStage>, dynamic: bool) -> BindGroupLayoutDesc {
    BindGroupLayoutDesc {
        entries: vec![LayoutEntry {
            binding: 0,
            visibility,
            ty: BindingKind::Uniform { dynamic },
        }],
    }
}

fn single_buffer_group(layout: &str, buffer: &str, size: Option<u64>) -> BindGroupDesc {
    BindGroupDesc {
        layout: layout.to_string(),
        entries: vec![BindGroupEntryDesc::buffer(0, buffer, size)],
    }
}

/// Descriptor for the draw buffer at the pool's current capacity.
pub fn draw_buffer_desc(pool: &DrawUniformPool) -> BufferDesc {
    BufferDesc {
        size: pool.buffer_size(),
        usage: vec![BufferUsage::Uniform, BufferUsage::CopyDst],
        contents: None,
    }
}

/// Vertex buffer descriptor sized for `bytes` of instance data.
pub fn instance_buffer_desc(bytes: Vec<u8>) -> BufferDesc {
    BufferDesc::with_contents(vec![BufferUsage::Vertex, BufferUsage::CopyDst], bytes)
}

pub fn register_builtins(
    storage: &mut StorageManager,
    pool: &DrawUniformPool,
) -> Result<(), StorageError> {
    let size_of = |n: usize| n as u64;

    // Buffers
    storage.register_buffer(CAMERA, BufferDesc::uniform(size_of(std::mem::size_of::<CameraUniform>())))?;
    storage.register_buffer(
        LIGHTING,
        BufferDesc::uniform(size_of(std::mem::size_of::<LightingUniforms>())),
    )?;
    storage.register_buffer(SHADOW, BufferDesc::uniform(size_of(std::mem::size_of::<ShadowUniforms>())))?;
    storage.register_buffer(FRAME, BufferDesc::uniform(size_of(std::mem::size_of::<FrameUniforms>())))?;
    storage.register_buffer(DRAW, draw_buffer_desc(pool))?;
    let kernel = ssao_kernel(SSAO_KERNEL_SIZE, SSAO_SEED);
    storage.register_buffer(
        SSAO_KERNEL,
        BufferDesc::with_contents(
            vec![BufferUsage::Uniform, BufferUsage::CopyDst],
            bytemuck::cast_slice(&kernel).to_vec(),
        ),
    )?;
    // Placeholder until a scene with foliage uploads its instances
    storage.register_buffer(FOLIAGE_INSTANCES, instance_buffer_desc(vec![0; 32]))?;

    // Layouts
    storage.register_layout(
        CAMERA_LAYOUT,
        uniform_layout(vec![ShaderStage::Vertex, ShaderStage::Fragment], false),
    )?;
    storage.register_layout(
        DRAW_LAYOUT,
        uniform_layout(vec![ShaderStage::Vertex, ShaderStage::Fragment], true),
    )?;
    storage.register_layout(
        FRAME_LAYOUT,
        uniform_layout(vec![ShaderStage::Vertex, ShaderStage::Fragment], false),
    )?;
    storage.register_layout(SHADOW_LAYOUT, uniform_layout(vec![ShaderStage::Vertex], false))?;

    // Bind groups
    storage.register_bind_group(CAMERA, single_buffer_group(CAMERA_LAYOUT, CAMERA, None))?;
    storage.register_bind_group(
        DRAW,
        single_buffer_group(DRAW_LAYOUT, DRAW, Some(DRAW_UNIFORM_SIZE)),
    )?;
    storage.register_bind_group(FRAME, single_buffer_group(FRAME_LAYOUT, FRAME, None))?;
    storage.register_bind_group(SHADOW, single_buffer_group(SHADOW_LAYOUT, SHADOW, None))?;

    // Textures
    storage.register_texture(WHITE, TextureDesc::with_data("rgba8", 1, 1, 4, vec![255; 4]))?;
    storage.register_texture(
        SHADOW_NONE,
        TextureDesc {
            format: "depth32f".to_string(),
            size: ResourceSize::Fixed(1, 1),
            usage: vec![TextureUsage::TextureBinding, TextureUsage::RenderAttachment],
            image: None,
            data: None,
        },
    )?;
    storage.register_texture(
        SSAO_NOISE,
        TextureDesc::with_data("rgba8", 4, 4, 16, encode_unorm8(&ssao_noise(SSAO_SEED))),
    )?;

    // Samplers
    storage.register_sampler("linear", SamplerDesc::default())?;
    storage.register_sampler(
        "nearest",
        SamplerDesc {
            filter: Filter::Nearest,
            ..Default::default()
        },
    )?;
    storage.register_sampler(
        "shadow_compare",
        SamplerDesc {
            filter: Filter::Linear,
            address_mode: AddressMode::Clamp,
            compare: Some(Compare::LessEqual),
        },
    )?;

    // Shaders, one resource per built-in source
    for name in builtin_shader_names() {
        storage.register_shader(name, ShaderDesc::builtin(name))?;
    }

    tracing::debug!("Registered built-in resources: {}", storage.stats());
    Ok(())
}
