use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use lantern_core::components::MaterialHandle;

#[derive(Debug, thiserror::Error)]
pub enum MaterialError {
    #[error("failed to read material {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("material parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Material YAML: surface parameters fed to the draw uniforms.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Material {
    #[serde(default = "default_base_color")]
    pub base_color: [f32; 3],
    #[serde(default = "default_roughness")]
    pub roughness: f32,
    #[serde(default)]
    pub metallic: f32,
    #[serde(default)]
    pub emission: [f32; 3],
}

impl Default for Material {
    fn default() -> Self {
        Self {
            base_color: default_base_color(),
            roughness: default_roughness(),
            metallic: 0.0,
            emission: [0.0; 3],
        }
    }
}

fn default_base_color() -> [f32; 3] {
    [0.8, 0.8, 0.8]
}

fn default_roughness() -> f32 {
    0.5
}

impl Material {
    pub fn base_color_rgba(&self) -> [f32; 4] {
        let [r, g, b] = self.base_color;
        [r, g, b, 1.0]
    }

    pub fn emission_rgba(&self) -> [f32; 4] {
        let [r, g, b] = self.emission;
        [r, g, b, 0.0]
    }
}

pub fn parse_material(yaml: &str) -> Result<Material, MaterialError> {
    Ok(serde_yaml::from_str(yaml)?)
}

/// Cache of loaded materials.
#[derive(Default)]
pub struct MaterialCache {
    materials: Vec<Material>,
    path_to_handle: HashMap<String, MaterialHandle>,
    default_handle: Option<MaterialHandle>,
}

impl MaterialCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_load(
        &mut self,
        project_root: &Path,
        material_path: &str,
    ) -> Result<MaterialHandle, MaterialError> {
        if let Some(&handle) = self.path_to_handle.get(material_path) {
            return Ok(handle);
        }

        let full_path = project_root.join(material_path);
        let material = if full_path.exists() {
            let contents =
                std::fs::read_to_string(&full_path).map_err(|source| MaterialError::Io {
                    path: full_path.display().to_string(),
                    source,
                })?;
            parse_material(&contents)?
        } else {
            tracing::warn!("Material file not found: {:?}, using defaults", full_path);
            Material::default()
        };

        let handle = self.push(material);
        self.path_to_handle.insert(material_path.to_string(), handle);
        tracing::info!("Loaded material: {}", material_path);
        Ok(handle)
    }

    /// Handle used by mesh renderers that name no material.
    pub fn ensure_default(&mut self) -> MaterialHandle {
        if let Some(handle) = self.default_handle {
            return handle;
        }
        let handle = self.push(Material::default());
        self.default_handle = Some(handle);
        handle
    }

    pub fn get(&self, handle: MaterialHandle) -> Option<&Material> {
        self.materials.get(handle.0)
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    fn push(&mut self, material: Material) -> MaterialHandle {
        let handle = MaterialHandle(self.materials.len());
        self.materials.push(material);
        handle
    }
}
