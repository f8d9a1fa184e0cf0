//! CPU-side mesh data and procedural generators.

use glam::Vec3;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum MeshDataError {
    #[error("index {index} out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: u32, vertex_count: usize },
    #[error("index count {0} is not a multiple of 3")]
    NotTriangles(usize),
}

/// Interleaved vertex shared by every mesh pipeline.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coords: [f32; 2],
    pub color: [f32; 4],
}

impl MeshVertex {
    pub fn new(position: Vec3, normal: Vec3, tex_coords: [f32; 2]) -> Self {
        Self {
            position: position.to_array(),
            normal: normal.to_array(),
            tex_coords,
            color: [1.0; 4],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn validate(&self) -> Result<(), MeshDataError> {
        if self.indices.len() % 3 != 0 {
            return Err(MeshDataError::NotTriangles(self.indices.len()));
        }
        if let Some(&index) = self
            .indices
            .iter()
            .find(|&&i| i as usize >= self.vertices.len())
        {
            return Err(MeshDataError::IndexOutOfRange {
                index,
                vertex_count: self.vertices.len(),
            });
        }
        Ok(())
    }
}

/// Single RGB triangle facing +Z.
pub fn triangle() -> MeshData {
    let colors = [[1.0, 0.0, 0.0, 1.0], [0.0, 1.0, 0.0, 1.0], [0.0, 0.0, 1.0, 1.0]];
    let positions = [[-0.5, -0.5, 0.0], [0.5, -0.5, 0.0], [0.0, 0.5, 0.0]];
    let uvs = [[0.0, 1.0], [1.0, 1.0], [0.5, 0.0]];
    let vertices = (0..3)
        .map(|i| MeshVertex {
            position: positions[i],
            normal: [0.0, 0.0, 1.0],
            tex_coords: uvs[i],
            color: colors[i],
        })
        .collect();
    MeshData {
        vertices,
        indices: vec![0, 1, 2],
    }
}

/// Unit cube centred on the origin, 4 vertices per face.
pub fn cube() -> MeshData {
    // (normal, u, v) with u x v == normal so corners wind CCW from outside
    let faces = [
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
        (Vec3::Y, Vec3::X, Vec3::NEG_Z),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        (Vec3::X, Vec3::NEG_Z, Vec3::Y),
        (Vec3::NEG_X, Vec3::Z, Vec3::Y),
    ];
    let corners = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

    let mut mesh = MeshData::default();
    for (normal, u, v) in faces {
        let base = mesh.vertices.len() as u32;
        for (cu, cv) in corners {
            let p = (normal + u * cu + v * cv) * 0.5;
            let uv = [(cu + 1.0) * 0.5, 1.0 - (cv + 1.0) * 0.5];
            mesh.vertices.push(MeshVertex::new(p, normal, uv));
        }
        mesh.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    mesh
}

/// Square on the XZ plane facing +Y.
pub fn plane(size: f32) -> MeshData {
    let h = size * 0.5;
    let corners = [(-h, h), (h, h), (h, -h), (-h, -h)];
    let uvs = [[0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]];
    let vertices = corners
        .iter()
        .zip(uvs)
        .map(|(&(x, z), uv)| MeshVertex::new(Vec3::new(x, 0.0, z), Vec3::Y, uv))
        .collect();
    MeshData {
        vertices,
        indices: vec![0, 1, 2, 0, 2, 3],
    }
}

/// UV sphere. `stacks` and `slices` are clamped to at least 2 and 3.
pub fn sphere(radius: f32, stacks: u32, slices: u32) -> MeshData {
    let stacks = stacks.max(2);
    let slices = slices.max(3);
    let mut mesh = MeshData::default();

    for stack in 0..=stacks {
        let theta = std::f32::consts::PI * stack as f32 / stacks as f32;
        let (sin_theta, cos_theta) = theta.sin_cos();
        for slice in 0..=slices {
            let phi = std::f32::consts::TAU * slice as f32 / slices as f32;
            let (sin_phi, cos_phi) = phi.sin_cos();
            let n = Vec3::new(sin_theta * cos_phi, cos_theta, sin_theta * sin_phi);
            mesh.vertices.push(MeshVertex::new(
                n * radius,
                n,
                [slice as f32 / slices as f32, stack as f32 / stacks as f32],
            ));
        }
    }

    let row = slices + 1;
    for stack in 0..stacks {
        for slice in 0..slices {
            let a = stack * row + slice;
            let b = (stack + 1) * row + slice;
            // Skip the collapsed triangle at each pole
            if stack != 0 {
                mesh.indices.extend_from_slice(&[a, b + 1, b]);
            }
            if stack != stacks - 1 {
                mesh.indices.extend_from_slice(&[a, a + 1, b + 1]);
            }
        }
    }
    mesh
}

/// Tapered grass blade one unit tall, rooted at the origin and facing +Z.
/// Vertex colour runs from dark at the root to light at the tip so shaders
/// can use it as a height gradient.
pub fn grass_blade(segments: u32) -> MeshData {
    let segments = segments.max(1);
    let base_width = 0.1;
    let mut mesh = MeshData::default();

    for i in 0..segments {
        let t = i as f32 / segments as f32;
        let half = base_width * 0.5 * (1.0 - t);
        let shade = [0.1 + 0.3 * t, 0.35 + 0.5 * t, 0.1, 1.0];
        for (x, u) in [(-half, 0.0), (half, 1.0)] {
            mesh.vertices.push(MeshVertex {
                position: [x, t, 0.0],
                normal: [0.0, 0.0, 1.0],
                tex_coords: [u, 1.0 - t],
                color: shade,
            });
        }
    }
    let tip = mesh.vertices.len() as u32;
    mesh.vertices.push(MeshVertex {
        position: [0.0, 1.0, 0.0],
        normal: [0.0, 0.0, 1.0],
        tex_coords: [0.5, 0.0],
        color: [0.4, 0.85, 0.1, 1.0],
    });

    for i in 0..segments - 1 {
        let (l, r) = (2 * i, 2 * i + 1);
        let (l1, r1) = (l + 2, r + 2);
        mesh.indices.extend_from_slice(&[l, r, r1, l, r1, l1]);
    }
    let (l, r) = (2 * (segments - 1), 2 * (segments - 1) + 1);
    mesh.indices.extend_from_slice(&[l, r, tip]);
    mesh
}

/// Recompute smooth vertex normals, weighting each face by its area.
/// Degenerate triangles and out-of-range indices contribute nothing.
pub fn compute_normals(mesh: &mut MeshData) {
    let count = mesh.vertices.len();
    let mut acc = vec![Vec3::ZERO; count];

    for tri in mesh.indices.chunks_exact(3) {
        let [i0, i1, i2] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        if i0 >= count || i1 >= count || i2 >= count {
            continue;
        }
        let v0 = Vec3::from(mesh.vertices[i0].position);
        let v1 = Vec3::from(mesh.vertices[i1].position);
        let v2 = Vec3::from(mesh.vertices[i2].position);
        // Unnormalised cross product: magnitude is twice the area
        let face = (v1 - v0).cross(v2 - v0);
        if face.length_squared() <= f32::EPSILON * f32::EPSILON {
            continue;
        }
        acc[i0] += face;
        acc[i1] += face;
        acc[i2] += face;
    }

    for (vertex, n) in mesh.vertices.iter_mut().zip(acc) {
        let n = n.normalize_or_zero();
        vertex.normal = if n == Vec3::ZERO { Vec3::Y } else { n }.to_array();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every non-degenerate triangle's winding agrees with its vertex normals.
    fn assert_outward(mesh: &MeshData) {
        for tri in mesh.indices.chunks_exact(3) {
            let v: Vec<&MeshVertex> = tri.iter().map(|&i| &mesh.vertices[i as usize]).collect();
            let p0 = Vec3::from(v[0].position);
            let face = (Vec3::from(v[1].position) - p0).cross(Vec3::from(v[2].position) - p0);
            if face.length() < 1e-6 {
                continue;
            }
            let n = Vec3::from(v[0].normal) + Vec3::from(v[1].normal) + Vec3::from(v[2].normal);
            assert!(face.dot(n) > 0.0, "triangle {tri:?} winds against its normals");
        }
    }

    #[test]
    fn test_generators_are_valid() {
        for mesh in [
            triangle(),
            cube(),
            plane(4.0),
            sphere(0.5, 8, 12),
            grass_blade(1),
            grass_blade(4),
        ] {
            mesh.validate().unwrap();
            assert_outward(&mesh);
        }
    }

    #[test]
    fn test_cube_counts() {
        let cube = cube();
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.triangle_count(), 12);
        for v in &cube.vertices {
            assert!(v.position.iter().all(|c| c.abs() == 0.5));
        }
    }

    #[test]
    fn test_sphere_radius() {
        let mesh = sphere(2.0, 6, 6);
        for v in &mesh.vertices {
            assert!((Vec3::from(v.position).length() - 2.0).abs() < 1e-4);
        }
        // Pole rows contribute one triangle per slice, others two
        assert_eq!(mesh.triangle_count(), 6 * (2 * 6 - 2));
    }

    #[test]
    fn test_grass_blade_shape() {
        let blade = grass_blade(3);
        assert_eq!(blade.vertices.len(), 7);
        assert_eq!(blade.indices.len(), 6 * 2 + 3);
        let top = blade
            .vertices
            .iter()
            .map(|v| v.position[1])
            .fold(f32::MIN, f32::max);
        assert_eq!(top, 1.0);
    }

    #[test]
    fn test_validate_errors() {
        let mut mesh = triangle();
        mesh.indices.push(0);
        assert_eq!(mesh.validate(), Err(MeshDataError::NotTriangles(4)));

        mesh.indices = vec![0, 1, 7];
        assert_eq!(
            mesh.validate(),
            Err(MeshDataError::IndexOutOfRange {
                index: 7,
                vertex_count: 3
            })
        );
    }

    #[test]
    fn test_compute_normals_smooths_shared_vertex() {
        // Two triangles at right angles sharing the edge 0-1
        let mut mesh = MeshData {
            vertices: [
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.0, 0.0, -1.0],
                [0.0, 1.0, 0.0],
            ]
            .iter()
            .map(|&p| MeshVertex::new(Vec3::from(p), Vec3::ZERO, [0.0; 2]))
            .collect(),
            indices: vec![0, 1, 2, 0, 1, 3],
        };
        compute_normals(&mut mesh);
        let up = Vec3::from(mesh.vertices[2].normal);
        let front = Vec3::from(mesh.vertices[3].normal);
        assert!((up - Vec3::Y).length() < 1e-5);
        assert!((front - Vec3::Z).length() < 1e-5);
        let shared = Vec3::from(mesh.vertices[0].normal);
        assert!((shared - (Vec3::Y + Vec3::Z).normalize()).length() < 1e-5);
    }

    #[test]
    fn test_compute_normals_ignores_degenerate() {
        let mut mesh = MeshData {
            vertices: vec![MeshVertex::new(Vec3::ZERO, Vec3::ZERO, [0.0; 2]); 3],
            indices: vec![0, 1, 2],
        };
        compute_normals(&mut mesh);
        for v in &mesh.vertices {
            assert_eq!(v.normal, [0.0, 1.0, 0.0]);
        }
    }
}
