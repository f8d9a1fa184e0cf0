//! Frame submission: encodes every enabled pass of a prepared graph into one
//! command buffer and presents the surface.

use crate::builtins;
use crate::descriptors::SURFACE;
use crate::gpu::GpuState;
use crate::graph::{Attachment, DrawKind};
use crate::mesh::{GpuMesh, MeshCache};
use crate::prepare::{DrawItem, PreparedGraph, PreparedPass};
use crate::storage::{StorageError, StorageManager};
use crate::uniforms::DrawUniformPool;

/// Mesh used for every foliage instance.
pub const GRASS_MESH: &str = "procedural:grass";

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("surface out of memory")]
    OutOfMemory,
    #[error("pass '{pass}': bind group index {index} out of range")]
    DrawGroup { pass: String, index: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Presented,
    /// No surface texture this frame; try again on the next redraw.
    Skipped,
}

/// Per-frame inputs the passes draw from.
pub struct FrameContext<'a> {
    pub meshes: &'a MeshCache,
    /// Same order as the draw uniform slots.
    pub draws: &'a [DrawItem],
    pub foliage_instances: u32,
    /// Scene clear colour. Replaces the clear value of surface attachments
    /// that clear; attachments that load stay untouched.
    pub surface_clear: Option<[f32; 4]>,
}

pub fn render_frame(
    gpu: &GpuState,
    storage: &StorageManager,
    plan: &PreparedGraph,
    ctx: &FrameContext,
) -> Result<FrameStatus, FrameError> {
    let output = match gpu.surface.get_current_texture() {
        Ok(t) => t,
        Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
            tracing::debug!("Surface lost or outdated, reconfiguring");
            gpu.reconfigure();
            return Ok(FrameStatus::Skipped);
        }
        Err(wgpu::SurfaceError::OutOfMemory) => return Err(FrameError::OutOfMemory),
        Err(e) => {
            tracing::warn!("Surface error: {:?}", e);
            return Ok(FrameStatus::Skipped);
        }
    };
    let surface_view = output
        .texture
        .create_view(&wgpu::TextureViewDescriptor::default());

    let mut encoder = gpu
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(plan.name.as_str()),
        });
    for pass in plan.passes.iter().filter(|p| p.enabled) {
        encode_pass(&mut encoder, pass, storage, &surface_view, ctx)?;
    }
    gpu.queue.submit(std::iter::once(encoder.finish()));
    output.present();
    Ok(FrameStatus::Presented)
}

fn encode_pass(
    encoder: &mut wgpu::CommandEncoder,
    pass: &PreparedPass,
    storage: &StorageManager,
    surface_view: &wgpu::TextureView,
    ctx: &FrameContext,
) -> Result<(), FrameError> {
    let color_attachments = pass
        .color
        .iter()
        .map(|attachment| {
            let view = if attachment.target == SURFACE {
                surface_view
            } else {
                storage.texture_view(&attachment.target)?
            };
            Ok(Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: color_load(attachment, ctx.surface_clear),
                    store: wgpu::StoreOp::Store,
                },
            }))
        })
        .collect::<Result<Vec<_>, StorageError>>()?;

    let depth_stencil_attachment = match &pass.depth {
        Some(depth) => Some(wgpu::RenderPassDepthStencilAttachment {
            view: storage.texture_view(&depth.target)?,
            depth_ops: Some(wgpu::Operations {
                load: depth.clear.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        }),
        None => None,
    };

    let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(pass.name.as_str()),
        color_attachments: &color_attachments,
        depth_stencil_attachment,
        timestamp_writes: None,
        occlusion_query_set: None,
    });
    render_pass.set_pipeline(storage.pipeline(&pass.pipeline)?);
    for (index, name) in (0_u32..).zip(&pass.bind_groups) {
        if pass.draw_group == Some(index) {
            continue;
        }
        render_pass.set_bind_group(index, storage.bind_group(name)?, &[]);
    }

    match &pass.draw {
        DrawKind::Fullscreen => render_pass.draw(0..3, 0..1),
        DrawKind::Scene | DrawKind::ShadowCasters => {
            let index = pass.draw_group.unwrap_or_default();
            let group = pass
                .bind_groups
                .get(index as usize)
                .ok_or_else(|| FrameError::DrawGroup {
                    pass: pass.name.clone(),
                    index,
                })?;
            let draw_bind_group = storage.bind_group(group)?;
            for (slot, item) in scene_draws(ctx.draws, &pass.draw) {
                let Some(mesh) = ctx.meshes.get(item.mesh) else {
                    continue;
                };
                render_pass.set_bind_group(index, draw_bind_group, &[DrawUniformPool::offset(slot)]);
                draw_mesh(&mut render_pass, mesh, 1);
            }
        }
        DrawKind::Foliage => {
            if ctx.foliage_instances == 0 {
                return Ok(());
            }
            if let Some(mesh) = ctx.meshes.handle(GRASS_MESH).and_then(|h| ctx.meshes.get(h)) {
                render_pass.set_vertex_buffer(1, storage.buffer(builtins::FOLIAGE_INSTANCES)?.slice(..));
                draw_mesh(&mut render_pass, mesh, ctx.foliage_instances);
            }
        }
        DrawKind::Mesh(path) => match ctx.meshes.handle(path).and_then(|h| ctx.meshes.get(h)) {
            Some(mesh) => draw_mesh(&mut render_pass, mesh, 1),
            None => tracing::debug!("Pass '{}': mesh '{}' not loaded", pass.name, path),
        },
    }
    Ok(())
}

fn draw_mesh(render_pass: &mut wgpu::RenderPass<'_>, mesh: &GpuMesh, instances: u32) {
    render_pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
    render_pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
    render_pass.draw_indexed(0..mesh.index_count, 0, 0..instances);
}

fn color_load(attachment: &Attachment, surface_clear: Option<[f32; 4]>) -> wgpu::LoadOp<wgpu::Color> {
    let clear = match (attachment.clear, surface_clear) {
        (Some(_), Some(c)) if attachment.target == SURFACE => Some(c.map(f64::from)),
        (clear, _) => clear,
    };
    match clear {
        Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
        None => wgpu::LoadOp::Load,
    }
}

/// Draw items a scene pass renders, paired with their uniform slot.
pub fn scene_draws<'a>(
    draws: &'a [DrawItem],
    kind: &'a DrawKind,
) -> impl Iterator<Item = (u32, &'a DrawItem)> + 'a {
    (0_u32..)
        .zip(draws)
        .filter(move |(_, item)| *kind != DrawKind::ShadowCasters || item.cast_shadows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uniforms::DrawUniforms;
    use glam::Mat4;
    use lantern_core::components::MeshHandle;

    fn item(world: &mut hecs::World, mesh: usize, cast_shadows: bool) -> DrawItem {
        DrawItem {
            entity: world.spawn(()),
            mesh: MeshHandle(mesh),
            cast_shadows,
            uniforms: DrawUniforms::new(Mat4::IDENTITY, [1.0; 4], 0.5, 0.0, [0.0; 4]),
        }
    }

    #[test]
    fn test_shadow_casters_keep_uniform_slots() {
        let mut world = hecs::World::new();
        let draws = vec![
            item(&mut world, 0, true),
            item(&mut world, 0, false),
            item(&mut world, 1, true),
        ];
        let slots: Vec<u32> = scene_draws(&draws, &DrawKind::ShadowCasters)
            .map(|(slot, _)| slot)
            .collect();
        assert_eq!(slots, vec![0, 2]);
        assert_eq!(scene_draws(&draws, &DrawKind::Scene).count(), 3);
    }

    #[test]
    fn test_color_load_ops() {
        let clear = Attachment {
            target: "hdr".into(),
            clear: Some([0.1, 0.2, 0.3, 1.0]),
        };
        assert_eq!(
            color_load(&clear, None),
            wgpu::LoadOp::Clear(wgpu::Color {
                r: 0.1,
                g: 0.2,
                b: 0.3,
                a: 1.0
            })
        );
        let load = Attachment {
            target: "hdr".into(),
            clear: None,
        };
        assert_eq!(color_load(&load, None), wgpu::LoadOp::Load);
    }

    #[test]
    fn test_scene_clear_overrides_surface_only() {
        let dusk = Some([0.5, 0.25, 0.0, 1.0]);
        let surface = Attachment {
            target: SURFACE.into(),
            clear: Some([0.0, 0.0, 0.0, 1.0]),
        };
        assert_eq!(
            color_load(&surface, dusk),
            wgpu::LoadOp::Clear(wgpu::Color {
                r: 0.5,
                g: 0.25,
                b: 0.0,
                a: 1.0
            })
        );

        let loaded_surface = Attachment {
            target: SURFACE.into(),
            clear: None,
        };
        assert_eq!(color_load(&loaded_surface, dusk), wgpu::LoadOp::Load);

        let hdr = Attachment {
            target: "hdr".into(),
            clear: Some([0.0; 4]),
        };
        assert_eq!(
            color_load(&hdr, dusk),
            wgpu::LoadOp::Clear(wgpu::Color {
                r: 0.0,
                g: 0.0,
                b: 0.0,
                a: 0.0
            })
        );
    }
}
