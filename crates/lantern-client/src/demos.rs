//! `lantern demo` / `lantern demos`: built-in graph and scene pairs.
//!
//! Demo content is embedded with `include_str!`. Running a demo extracts it
//! into a temp directory laid out like a regular project and launches that.

use std::path::{Path, PathBuf};

use crate::cli::CliArgs;
use crate::project_config::CONFIG_FILE;

const GRAPH_FILE: &str = "graph.yaml";
const SCENE_FILE: &str = "scene.yaml";

static MATERIALS: &[(&str, &str)] = &[
    ("red.yaml", include_str!("../demos/materials/red.yaml")),
    ("gold.yaml", include_str!("../demos/materials/gold.yaml")),
    ("ground.yaml", include_str!("../demos/materials/ground.yaml")),
    ("lamp.yaml", include_str!("../demos/materials/lamp.yaml")),
];

pub struct DemoEntry {
    pub number: usize,
    pub slug: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub graph: &'static str,
    pub scene: &'static str,
}

static DEMOS: &[DemoEntry] = &[
    DemoEntry {
        number: 1,
        slug: "triangle",
        name: "Triangle",
        description: "One pass, one mesh, straight to the surface",
        graph: include_str!("../demos/triangle/graph.yaml"),
        scene: include_str!("../demos/triangle/scene.yaml"),
    },
    DemoEntry {
        number: 2,
        slug: "cube",
        name: "Forward Cube",
        description: "Forward shading with per-draw uniforms and an orbit camera",
        graph: include_str!("../demos/cube/graph.yaml"),
        scene: include_str!("../demos/cube/scene.yaml"),
    },
    DemoEntry {
        number: 3,
        slug: "shadow",
        name: "Shadow Map",
        description: "Directional shadow pass feeding a forward pass",
        graph: include_str!("../demos/shadow/graph.yaml"),
        scene: include_str!("../demos/shadow/scene.yaml"),
    },
    DemoEntry {
        number: 4,
        slug: "deferred",
        name: "Deferred Lights",
        description: "G-buffer, fullscreen lighting and tonemapping with point lights",
        graph: include_str!("../demos/deferred/graph.yaml"),
        scene: include_str!("../demos/deferred/scene.yaml"),
    },
    DemoEntry {
        number: 5,
        slug: "ssao",
        name: "Ambient Occlusion",
        description: "Deferred pipeline with shadows and blurred SSAO",
        graph: include_str!("../demos/ssao/graph.yaml"),
        scene: include_str!("../demos/ssao/scene.yaml"),
    },
    DemoEntry {
        number: 6,
        slug: "foliage",
        name: "Meadow",
        description: "Instanced grass drawn into the G-buffer, swaying in the wind",
        graph: include_str!("../demos/foliage/graph.yaml"),
        scene: include_str!("../demos/foliage/scene.yaml"),
    },
];

#[derive(Debug, thiserror::Error)]
pub enum DemoError {
    #[error("no demo #{0}, use 1-{max}", max = DEMOS.len())]
    NoNumber(usize),
    #[error("no demo matching \"{0}\", run `lantern demos` to see all demos")]
    NoMatch(String),
    #[error("\"{selector}\" is ambiguous, matches: {}", .matches.join(", "))]
    Ambiguous {
        selector: String,
        matches: Vec<&'static str>,
    },
    #[error("failed to write demo file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

pub fn demos() -> &'static [DemoEntry] {
    DEMOS
}

/// Look a demo up by number, exact slug, or a unique substring of its slug
/// or name.
pub fn find_demo(selector: &str) -> Result<&'static DemoEntry, DemoError> {
    if let Ok(num) = selector.parse::<usize>() {
        return DEMOS
            .iter()
            .find(|d| d.number == num)
            .ok_or(DemoError::NoNumber(num));
    }

    if let Some(demo) = DEMOS.iter().find(|d| d.slug.eq_ignore_ascii_case(selector)) {
        return Ok(demo);
    }

    let lower = selector.to_ascii_lowercase();
    let matches: Vec<&'static DemoEntry> = DEMOS
        .iter()
        .filter(|d| d.slug.contains(&lower) || d.name.to_ascii_lowercase().contains(&lower))
        .collect();
    match matches.as_slice() {
        [] => Err(DemoError::NoMatch(selector.to_string())),
        [demo] => Ok(*demo),
        _ => Err(DemoError::Ambiguous {
            selector: selector.to_string(),
            matches: matches.iter().map(|d| d.slug).collect(),
        }),
    }
}

pub fn print_demo_list() {
    let version = env!("CARGO_PKG_VERSION");
    println!();
    println!("  \x1b[1mLantern demos\x1b[0m (v{})", version);
    println!();
    for demo in DEMOS {
        println!(
            "    \x1b[1;33m{:>2}\x1b[0m  \x1b[1m{:<10}\x1b[0m {}",
            demo.number, demo.slug, demo.description
        );
    }
    println!();
    println!("  Run one with `lantern demo <number|name>`.");
    println!();
}

/// Extract `selector`'s demo to a temp project and return the arguments
/// that launch it. Flags from `base` other than the paths carry over.
pub fn run_demo(selector: &str, base: &CliArgs) -> Result<CliArgs, DemoError> {
    let demo = find_demo(selector)?;
    let root = std::env::temp_dir().join("lantern-demo");
    // Stale files from a previous demo would be picked up by the watcher
    let _ = std::fs::remove_dir_all(&root);
    extract_demo(demo, &root)?;

    tracing::info!("Launching demo {}: {}", demo.number, demo.name);
    Ok(CliArgs {
        command: None,
        project: Some(root.to_string_lossy().to_string()),
        scene: None,
        graph: None,
        verbose: base.verbose,
    })
}

/// Write the demo's graph, scene, shared materials and a `lantern.yaml`
/// pointing at them under `root`.
pub fn extract_demo(demo: &DemoEntry, root: &Path) -> Result<PathBuf, DemoError> {
    let config = format!(
        "name: \"{}\"\nversion: \"0.0.0\"\ndefault_scene: {}\ndefault_graph: {}\nwindow:\n  title: \"Lantern - {}\"\n",
        demo.slug, SCENE_FILE, GRAPH_FILE, demo.name
    );
    write_file(&root.join(CONFIG_FILE), &config)?;
    write_file(&root.join(GRAPH_FILE), demo.graph)?;
    write_file(&root.join(SCENE_FILE), demo.scene)?;
    for (filename, content) in MATERIALS {
        write_file(&root.join("materials").join(filename), content)?;
    }
    Ok(root.to_path_buf())
}

fn write_file(path: &Path, content: &str) -> Result<(), DemoError> {
    let io_err = |source| DemoError::Io {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, content).map_err(io_err)
}
