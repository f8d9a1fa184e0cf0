//! `lantern check`: validate a project's graph and scene without a GPU.

use std::fmt;
use std::path::Path;

use serde::Serialize;

use lantern_core::scene::load_scene;

use crate::builtins::register_builtins;
use crate::graph::{load_graph, DrawKind};
use crate::material::MaterialCache;
use crate::mesh::{load_mesh_data, MeshError};
use crate::prepare::PreparedGraph;
use crate::project_config::LaunchSettings;
use crate::storage::StorageManager;
use crate::uniforms::DrawUniformPool;

/// Stand-in for the swapchain format when no surface exists.
const CHECK_SURFACE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Bgra8UnormSrgb;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassSummary {
    pub name: String,
    pub pipeline: String,
    pub draw: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceCount {
    pub kind: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CheckReport {
    pub graph: String,
    pub scene: String,
    /// Execution order.
    pub passes: Vec<PassSummary>,
    pub resources: Vec<ResourceCount>,
    pub entities: usize,
    pub problems: Vec<String>,
}

impl CheckReport {
    pub fn ok(&self) -> bool {
        self.problems.is_empty()
    }
}

impl fmt::Display for CheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "graph: {}", self.graph)?;
        for (i, pass) in self.passes.iter().enumerate() {
            writeln!(
                f,
                "  {}. {:<16} {:<16} {}{}",
                i + 1,
                pass.name,
                pass.pipeline,
                pass.draw,
                if pass.enabled { "" } else { " (disabled)" }
            )?;
        }
        let resources: Vec<String> = self
            .resources
            .iter()
            .map(|r| format!("{} {}", r.count, r.kind))
            .collect();
        writeln!(f, "resources: {}", resources.join(", "))?;
        writeln!(f, "scene: {} ({} entities)", self.scene, self.entities)?;
        if self.ok() {
            write!(f, "ok")
        } else {
            writeln!(f, "{} problem(s):", self.problems.len())?;
            for problem in &self.problems {
                writeln!(f, "  - {}", problem)?;
            }
            Ok(())
        }
    }
}

fn draw_label(draw: &DrawKind) -> String {
    match draw {
        DrawKind::Fullscreen => "fullscreen".to_string(),
        DrawKind::Scene => "scene".to_string(),
        DrawKind::ShadowCasters => "shadow_casters".to_string(),
        DrawKind::Foliage => "foliage".to_string(),
        DrawKind::Mesh(path) => format!("mesh:{}", path),
    }
}

/// Load, register, validate and order the graph, then load the scene and
/// every asset it names. Problems are collected rather than returned early.
pub fn check_project(settings: &LaunchSettings) -> CheckReport {
    let root = &settings.project_root;
    let mut report = CheckReport {
        graph: settings.graph.display().to_string(),
        scene: settings.scene.display().to_string(),
        ..Default::default()
    };

    check_graph(settings, &mut report);

    match load_scene(&settings.scene) {
        Ok(scene) => {
            report.entities = scene.entities.len();
            let mut materials = MaterialCache::new();
            for def in &scene.entities {
                let Some(mr) = &def.components.mesh_renderer else {
                    continue;
                };
                let mesh = load_mesh_data(root, &mr.mesh)
                    .and_then(|m| m.validate().map_err(MeshError::from));
                if let Err(e) = mesh {
                    report
                        .problems
                        .push(format!("entity '{}': mesh '{}': {}", def.id, mr.mesh, e));
                }
                if let Some(material) = &mr.material {
                    if let Err(e) = materials.get_or_load(root, material) {
                        report
                            .problems
                            .push(format!("entity '{}': material '{}': {}", def.id, material, e));
                    }
                }
            }
        }
        Err(e) => report.problems.push(format!("scene: {}", e)),
    }

    tracing::debug!("Check finished with {} problem(s)", report.problems.len());
    report
}

fn check_graph(settings: &LaunchSettings, report: &mut CheckReport) {
    let graph = match load_graph(&settings.graph) {
        Ok(graph) => graph,
        Err(e) => {
            report.problems.push(format!("graph: {}", e));
            return;
        }
    };

    let mut storage =
        StorageManager::new(CHECK_SURFACE_FORMAT).with_root(settings.project_root.clone());
    if let Err(e) = register_builtins(&mut storage, &DrawUniformPool::new()) {
        report.problems.push(format!("built-in resources: {}", e));
        return;
    }

    match PreparedGraph::prepare(&graph, &mut storage, &settings.project_root) {
        Ok(plan) => {
            report.passes = plan
                .passes
                .iter()
                .map(|p| PassSummary {
                    name: p.name.clone(),
                    pipeline: p.pipeline.clone(),
                    draw: draw_label(&p.draw),
                    enabled: p.enabled,
                })
                .collect();
            for mesh in plan.mesh_paths() {
                if let Err(e) = load_mesh_data(&settings.project_root, mesh) {
                    report.problems.push(format!("graph mesh '{}': {}", mesh, e));
                }
            }
        }
        Err(e) => report.problems.push(e.to_string()),
    }

    report.resources = storage
        .stats()
        .0
        .iter()
        .map(|s| ResourceCount {
            kind: s.kind.to_string(),
            count: s.registered,
        })
        .collect();
}

/// Convenience for callers that only have paths.
pub fn check_paths(project_root: &Path, graph: &Path, scene: &Path) -> CheckReport {
    check_project(&LaunchSettings {
        project_root: project_root.to_path_buf(),
        scene: scene.to_path_buf(),
        graph: graph.to_path_buf(),
        window: Default::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demos::{extract_demo, find_demo};

    #[test]
    fn test_check_extracted_demo_is_clean() {
        let dir = tempfile::tempdir().unwrap();
        let root = extract_demo(find_demo("ssao").unwrap(), dir.path()).unwrap();
        let report = check_paths(&root, &root.join("graph.yaml"), &root.join("scene.yaml"));
        assert!(report.ok(), "{}", report);
        let names: Vec<&str> = report.passes.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["shadow", "geometry", "ssao", "ssao_blur", "lighting", "tonemap"]
        );
        assert!(report.entities > 0);
        assert!(report.resources.iter().any(|r| r.kind == "texture" && r.count > 0));
    }

    #[test]
    fn test_check_collects_problems() {
        let dir = tempfile::tempdir().unwrap();
        let root = extract_demo(find_demo("cube").unwrap(), dir.path()).unwrap();
        std::fs::write(
            root.join("scene.yaml"),
            "name: broken\nentities:\n  - id: a\n    components:\n      mesh_renderer:\n        mesh: meshes/thing.stl\n",
        )
        .unwrap();
        std::fs::write(
            root.join("graph.yaml"),
            "version: 1\npasses:\n  - name: main\n    pipeline: nope\n    color: [{ target: surface }]\n    draw: fullscreen\n",
        )
        .unwrap();
        std::fs::create_dir_all(root.join("meshes")).unwrap();
        std::fs::write(root.join("meshes/thing.stl"), "solid").unwrap();

        let report = check_paths(&root, &root.join("graph.yaml"), &root.join("scene.yaml"));
        assert!(!report.ok());
        assert!(report.passes.is_empty());
        assert!(report.problems.iter().any(|p| p.contains("nope")));
        assert!(report.problems.iter().any(|p| p.contains("thing.stl")));
    }

    #[test]
    fn test_report_serializes() {
        let report = CheckReport {
            graph: "g.yaml".into(),
            scene: "s.yaml".into(),
            entities: 2,
            ..Default::default()
        };
        assert!(report.to_string().ends_with("ok"));
        let yaml = serde_yaml::to_string(&report).unwrap();
        assert!(yaml.contains("entities: 2"));
    }
}
