//! Wavefront OBJ parser.
//!
//! Handles positions, normals, texture coordinates and polygon faces in all
//! four reference forms. Material and grouping statements are skipped.

use std::collections::HashMap;
use std::path::Path;

use glam::Vec3;

use crate::mesh_data::{compute_normals, MeshData, MeshVertex};

#[derive(Debug, thiserror::Error)]
pub enum ObjError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("line {line}: invalid number '{value}'")]
    InvalidNumber { line: usize, value: String },
    #[error("line {line}: index {index} out of range")]
    IndexOutOfRange { line: usize, index: i64 },
    #[error("line {line}: face needs at least 3 vertices")]
    FaceTooSmall { line: usize },
    #[error("line {line}: malformed '{keyword}' statement")]
    Malformed { line: usize, keyword: String },
    #[error("no faces found")]
    Empty,
}

pub fn load_obj(path: &Path) -> Result<MeshData, ObjError> {
    let source = std::fs::read_to_string(path).map_err(|source| ObjError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mesh = parse_obj(&source)?;
    tracing::debug!(
        "Loaded OBJ {:?}: {} vertices, {} triangles",
        path,
        mesh.vertices.len(),
        mesh.triangle_count()
    );
    Ok(mesh)
}

/// Key for vertex de-duplication: 0-based (position, tex, normal).
type VertexKey = (usize, Option<usize>, Option<usize>);

#[derive(Default)]
struct ObjBuilder {
    positions: Vec<Vec3>,
    colors: Vec<[f32; 4]>,
    normals: Vec<Vec3>,
    tex_coords: Vec<[f32; 2]>,
    mesh: MeshData,
    lookup: HashMap<VertexKey, u32>,
    has_normal: Vec<bool>,
}

pub fn parse_obj(source: &str) -> Result<MeshData, ObjError> {
    let mut b = ObjBuilder::default();

    for (i, raw) in source.lines().enumerate() {
        let line = i + 1;
        let content = raw.split('#').next().unwrap_or("").trim();
        let mut tokens = content.split_whitespace();
        let Some(keyword) = tokens.next() else {
            continue;
        };
        let args: Vec<&str> = tokens.collect();

        match keyword {
            "v" => {
                let values = parse_floats(&args, line)?;
                if values.len() < 3 {
                    return Err(malformed(line, keyword));
                }
                b.positions.push(Vec3::new(values[0], values[1], values[2]));
                // Optional per-vertex colour extension: v x y z r g b
                let color = if values.len() >= 6 {
                    [values[3], values[4], values[5], 1.0]
                } else {
                    [1.0; 4]
                };
                b.colors.push(color);
            }
            "vn" => {
                let values = parse_floats(&args, line)?;
                if values.len() < 3 {
                    return Err(malformed(line, keyword));
                }
                b.normals
                    .push(Vec3::new(values[0], values[1], values[2]).normalize_or_zero());
            }
            "vt" => {
                let values = parse_floats(&args, line)?;
                if values.is_empty() {
                    return Err(malformed(line, keyword));
                }
                let v = values.get(1).copied().unwrap_or(0.0);
                // OBJ has v pointing up; textures are sampled top-down
                b.tex_coords.push([values[0], 1.0 - v]);
            }
            "f" => {
                if args.len() < 3 {
                    return Err(ObjError::FaceTooSmall { line });
                }
                let mut corners = Vec::with_capacity(args.len());
                for arg in &args {
                    let key = b.resolve_ref(arg, line)?;
                    corners.push(b.vertex(key));
                }
                // Fan triangulation
                for k in 1..corners.len() - 1 {
                    b.mesh
                        .indices
                        .extend_from_slice(&[corners[0], corners[k], corners[k + 1]]);
                }
            }
            "o" | "g" | "s" | "usemtl" | "mtllib" | "l" | "p" => {}
            other => {
                tracing::debug!("OBJ line {}: skipping unsupported '{}'", line, other);
            }
        }
    }

    if b.mesh.indices.is_empty() {
        return Err(ObjError::Empty);
    }

    if b.has_normal.iter().any(|has| !has) {
        let mut smoothed = b.mesh.clone();
        compute_normals(&mut smoothed);
        for ((vertex, computed), has) in b
            .mesh
            .vertices
            .iter_mut()
            .zip(&smoothed.vertices)
            .zip(&b.has_normal)
        {
            if !has {
                vertex.normal = computed.normal;
            }
        }
    }

    Ok(b.mesh)
}

impl ObjBuilder {
    fn resolve_ref(&self, arg: &str, line: usize) -> Result<VertexKey, ObjError> {
        let mut parts = arg.split('/');
        let pos = parts.next().unwrap_or("");
        let tex = parts.next().filter(|s| !s.is_empty());
        let norm = parts.next().filter(|s| !s.is_empty());

        let pi = resolve_index(pos, self.positions.len(), line)?;
        let ti = tex
            .map(|t| resolve_index(t, self.tex_coords.len(), line))
            .transpose()?;
        let ni = norm
            .map(|n| resolve_index(n, self.normals.len(), line))
            .transpose()?;
        Ok((pi, ti, ni))
    }

    fn vertex(&mut self, key: VertexKey) -> u32 {
        if let Some(&index) = self.lookup.get(&key) {
            return index;
        }
        let (pi, ti, ni) = key;
        let index = self.mesh.vertices.len() as u32;
        self.mesh.vertices.push(MeshVertex {
            position: self.positions[pi].to_array(),
            normal: ni.map(|n| self.normals[n]).unwrap_or(Vec3::ZERO).to_array(),
            tex_coords: ti.map(|t| self.tex_coords[t]).unwrap_or([0.0, 0.0]),
            color: self.colors[pi],
        });
        self.has_normal.push(ni.is_some());
        self.lookup.insert(key, index);
        index
    }
}

/// 1-based or negative (relative to the end) index into a list of `len`.
fn resolve_index(token: &str, len: usize, line: usize) -> Result<usize, ObjError> {
    let index: i64 = token.parse().map_err(|_| ObjError::InvalidNumber {
        line,
        value: token.to_string(),
    })?;
    let resolved = if index > 0 {
        index - 1
    } else if index < 0 {
        len as i64 + index
    } else {
        -1
    };
    if resolved < 0 || resolved >= len as i64 {
        return Err(ObjError::IndexOutOfRange { line, index });
    }
    Ok(resolved as usize)
}

fn parse_floats(args: &[&str], line: usize) -> Result<Vec<f32>, ObjError> {
    args.iter()
        .map(|a| {
            a.parse::<f32>().map_err(|_| ObjError::InvalidNumber {
                line,
                value: a.to_string(),
            })
        })
        .collect()
}

fn malformed(line: usize, keyword: &str) -> ObjError {
    ObjError::Malformed {
        line,
        keyword: keyword.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAD: &str = "\
# a unit quad
o quad
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
vn 0 0 1
usemtl none
s off
f 1/1/1 2/2/1 3/3/1 4/4/1
";

    #[test]
    fn test_quad_fan_triangulated() {
        let mesh = parse_obj(QUAD).unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices, vec![0, 1, 2, 0, 2, 3]);
        assert_eq!(mesh.vertices[2].tex_coords, [1.0, 0.0]);
        assert_eq!(mesh.vertices[0].normal, [0.0, 0.0, 1.0]);
        mesh.validate().unwrap();
    }

    #[test]
    fn test_identical_refs_deduplicated() {
        let src = "v 0 0 0\nv 1 0 0\nv 0 1 0\nv 1 1 0\nf 1 2 3\nf 3 2 4\n";
        let mesh = parse_obj(src).unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices, vec![0, 1, 2, 2, 1, 3]);
    }

    #[test]
    fn test_distinct_normals_split_vertex() {
        let src = "v 0 0 0\nv 1 0 0\nv 0 1 0\nvn 0 0 1\nvn 0 0 -1\nf 1//1 2//1 3//1\nf 1//2 3//2 2//2\n";
        let mesh = parse_obj(src).unwrap();
        assert_eq!(mesh.vertices.len(), 6);
    }

    #[test]
    fn test_negative_indices() {
        let src = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n";
        let mesh = parse_obj(src).unwrap();
        assert_eq!(mesh.vertices[0].position, [0.0, 0.0, 0.0]);
        assert_eq!(mesh.vertices[2].position, [0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_missing_normals_computed() {
        let src = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        let mesh = parse_obj(src).unwrap();
        for v in &mesh.vertices {
            assert_eq!(v.normal, [0.0, 0.0, 1.0]);
        }
    }

    #[test]
    fn test_vertex_colors() {
        let src = "v 0 0 0 1 0 0\nv 1 0 0 0 1 0\nv 0 1 0 0 0 1\nf 1 2 3\n";
        let mesh = parse_obj(src).unwrap();
        assert_eq!(mesh.vertices[1].color, [0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_errors_carry_line_numbers() {
        let err = parse_obj("v 0 0 0\nv 1 x 0\n").unwrap_err();
        assert!(matches!(err, ObjError::InvalidNumber { line: 2, .. }));

        let err = parse_obj("v 0 0 0\nv 1 0 0\nv 0 1 0\n\nf 1 2 4\n").unwrap_err();
        assert!(matches!(err, ObjError::IndexOutOfRange { line: 5, index: 4 }));

        let err = parse_obj("v 0 0 0\nf 1 0 1\n").unwrap_err();
        assert!(matches!(err, ObjError::IndexOutOfRange { line: 2, index: 0 }));

        let err = parse_obj("v 0 0 0\nv 1 0 0\nf 1 2\n").unwrap_err();
        assert!(matches!(err, ObjError::FaceTooSmall { line: 3 }));

        assert!(matches!(parse_obj("# nothing\n\n"), Err(ObjError::Empty)));
    }

    #[test]
    fn test_load_obj_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quad.obj");
        std::fs::write(&path, QUAD).unwrap();
        assert_eq!(load_obj(&path).unwrap().triangle_count(), 2);

        let missing = load_obj(&dir.path().join("nope.obj")).unwrap_err();
        assert!(matches!(missing, ObjError::Io { .. }));
    }
}
