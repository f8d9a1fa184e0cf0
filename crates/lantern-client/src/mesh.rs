use std::collections::HashMap;
use std::path::Path;

use wgpu::util::DeviceExt;

use lantern_core::components::MeshHandle;
use lantern_core::mesh_data::{self, compute_normals, MeshData, MeshDataError, MeshVertex};
use lantern_core::obj::{load_obj, ObjError};

#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    #[error(transparent)]
    Obj(#[from] ObjError),
    #[error("glTF error: {0}")]
    Gltf(#[from] gltf::Error),
    #[error("glTF file contains no meshes")]
    NoMeshes,
    #[error("unsupported mesh format '{0}'")]
    UnsupportedFormat(String),
    #[error("invalid mesh data: {0}")]
    Invalid(#[from] MeshDataError),
}

/// A loaded GPU mesh.
pub struct GpuMesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
}

/// Cache of loaded meshes, keyed by the path string used to load them.
#[derive(Default)]
pub struct MeshCache {
    meshes: Vec<GpuMesh>,
    path_to_handle: HashMap<String, MeshHandle>,
}

impl MeshCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_load(
        &mut self,
        device: &wgpu::Device,
        project_root: &Path,
        mesh_path: &str,
    ) -> Result<MeshHandle, MeshError> {
        if let Some(&handle) = self.path_to_handle.get(mesh_path) {
            return Ok(handle);
        }

        let data = load_mesh_data(project_root, mesh_path)?;
        data.validate()?;
        let gpu_mesh = upload(device, mesh_path, &data);

        let handle = MeshHandle(self.meshes.len());
        self.meshes.push(gpu_mesh);
        self.path_to_handle.insert(mesh_path.to_string(), handle);
        tracing::info!(
            "Loaded mesh: {} ({} triangles)",
            mesh_path,
            data.triangle_count()
        );
        Ok(handle)
    }

    pub fn get(&self, handle: MeshHandle) -> Option<&GpuMesh> {
        self.meshes.get(handle.0)
    }

    pub fn handle(&self, mesh_path: &str) -> Option<MeshHandle> {
        self.path_to_handle.get(mesh_path).copied()
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}

fn upload(device: &wgpu::Device, label: &str, data: &MeshData) -> GpuMesh {
    let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(&format!("Mesh VB: {}", label)),
        contents: bytemuck::cast_slice(&data.vertices),
        usage: wgpu::BufferUsages::VERTEX,
    });
    let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(&format!("Mesh IB: {}", label)),
        contents: bytemuck::cast_slice(&data.indices),
        usage: wgpu::BufferUsages::INDEX,
    });
    GpuMesh {
        vertex_buffer,
        index_buffer,
        index_count: data.indices.len() as u32,
    }
}

/// CPU mesh for a `procedural:` name or a file under `project_root`.
/// A missing file yields a cube so the scene still renders.
pub fn load_mesh_data(project_root: &Path, mesh_path: &str) -> Result<MeshData, MeshError> {
    if let Some(shape) = mesh_path.strip_prefix("procedural:") {
        return Ok(procedural(shape));
    }

    let full_path = project_root.join(mesh_path);
    if !full_path.exists() {
        tracing::warn!(
            "Mesh file not found: {:?}, using procedural cube",
            full_path
        );
        return Ok(mesh_data::cube());
    }

    let ext = full_path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "obj" => Ok(load_obj(&full_path)?),
        "gltf" | "glb" => load_gltf(&full_path),
        other => Err(MeshError::UnsupportedFormat(other.to_string())),
    }
}

fn procedural(shape: &str) -> MeshData {
    match shape {
        "triangle" => mesh_data::triangle(),
        "cube" => mesh_data::cube(),
        "plane" => mesh_data::plane(20.0),
        "sphere" => mesh_data::sphere(0.5, 32, 32),
        "grass" => mesh_data::grass_blade(4),
        _ => {
            tracing::warn!("Unknown procedural shape '{}', using cube", shape);
            mesh_data::cube()
        }
    }
}

/// Merge every primitive of every scene node into one mesh, baking node
/// transforms into positions and normals.
fn load_gltf(path: &Path) -> Result<MeshData, MeshError> {
    let (document, buffers, _images) = gltf::import(path)?;

    let mut mesh = MeshData::default();
    let mut needs_normals = false;
    for scene in document.scenes() {
        for node in scene.nodes() {
            collect_node_meshes(&node, glam::Mat4::IDENTITY, &buffers, &mut mesh, &mut needs_normals);
        }
    }

    if mesh.vertices.is_empty() {
        return Err(MeshError::NoMeshes);
    }
    if needs_normals {
        compute_normals(&mut mesh);
    }
    tracing::debug!(
        "glTF {:?}: {} verts, {} indices",
        path,
        mesh.vertices.len(),
        mesh.indices.len()
    );
    Ok(mesh)
}

fn collect_node_meshes(
    node: &gltf::Node,
    parent_transform: glam::Mat4,
    buffers: &[gltf::buffer::Data],
    mesh: &mut MeshData,
    needs_normals: &mut bool,
) {
    let world = parent_transform * glam::Mat4::from_cols_array_2d(&node.transform().matrix());
    let normal_mat = glam::Mat3::from_mat4(world).inverse().transpose();

    if let Some(gltf_mesh) = node.mesh() {
        for primitive in gltf_mesh.primitives() {
            let reader = primitive.reader(|buf| buffers.get(buf.index()).map(|d| &d.0[..]));

            let Some(positions) = reader.read_positions() else {
                continue;
            };
            let positions: Vec<[f32; 3]> = positions.collect();
            let tex_coords: Vec<[f32; 2]> = reader
                .read_tex_coords(0)
                .map(|t| t.into_f32().collect())
                .unwrap_or_default();
            let colors: Vec<[f32; 4]> = reader
                .read_colors(0)
                .map(|c| c.into_rgba_f32().collect())
                .unwrap_or_default();
            let normals: Vec<[f32; 3]> = match reader.read_normals() {
                Some(n) => n.collect(),
                None => {
                    *needs_normals = true;
                    Vec::new()
                }
            };

            let base_vertex = mesh.vertices.len() as u32;
            for (i, pos) in positions.iter().enumerate() {
                let p = world.transform_point3(glam::Vec3::from(*pos));
                let n = normals
                    .get(i)
                    .map(|n| (normal_mat * glam::Vec3::from(*n)).normalize_or_zero())
                    .unwrap_or(glam::Vec3::Y);
                mesh.vertices.push(MeshVertex {
                    position: p.to_array(),
                    normal: n.to_array(),
                    tex_coords: tex_coords.get(i).copied().unwrap_or([0.0, 0.0]),
                    color: colors.get(i).copied().unwrap_or([1.0; 4]),
                });
            }

            match reader.read_indices() {
                Some(indices) => mesh
                    .indices
                    .extend(indices.into_u32().map(|i| base_vertex + i)),
                None => mesh
                    .indices
                    .extend((0..positions.len() as u32).map(|i| base_vertex + i)),
            }
        }
    }

    for child in node.children() {
        collect_node_meshes(&child, world, buffers, mesh, needs_normals);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_procedural_shapes() {
        let root = Path::new(".");
        assert_eq!(load_mesh_data(root, "procedural:triangle").unwrap().indices.len(), 3);
        assert_eq!(
            load_mesh_data(root, "procedural:cube").unwrap(),
            mesh_data::cube()
        );
        // Unknown shapes fall back to a cube
        assert_eq!(
            load_mesh_data(root, "procedural:torus").unwrap(),
            mesh_data::cube()
        );
        let grass = load_mesh_data(root, "procedural:grass").unwrap();
        assert!(grass.validate().is_ok());
    }

    #[test]
    fn test_missing_file_falls_back_to_cube() {
        let dir = tempfile::tempdir().unwrap();
        let mesh = load_mesh_data(dir.path(), "models/missing.glb").unwrap();
        assert_eq!(mesh, mesh_data::cube());
    }

    #[test]
    fn test_loads_obj_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("tri.obj"),
            "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n",
        )
        .unwrap();
        let mesh = load_mesh_data(dir.path(), "tri.obj").unwrap();
        assert_eq!(mesh.vertices.len(), 3);
        assert_eq!(mesh.triangle_count(), 1);
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("mesh.stl"), "solid").unwrap();
        assert!(matches!(
            load_mesh_data(dir.path(), "mesh.stl"),
            Err(MeshError::UnsupportedFormat(ext)) if ext == "stl"
        ));
    }
}
