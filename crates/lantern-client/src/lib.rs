//! Lantern client: everything that touches the GPU or the window.
//!
//! Render graph YAML is registered into a [`storage::StorageManager`], which
//! creates wgpu objects lazily and tracks which ones depend on which. The
//! [`prepare`] module turns a graph into an ordered plan and gathers frame
//! uniforms from the world; [`frame`] encodes and submits that plan.

pub mod builtins;
pub mod check;
pub mod cli;
pub mod demos;
pub mod descriptors;
pub mod engine;
pub mod frame;
pub mod gpu;
pub mod graph;
pub mod input;
pub mod material;
pub mod mesh;
pub mod prepare;
pub mod project_config;
pub mod renderer;
pub mod storage;
pub mod table;
pub mod texture;
pub mod uniforms;
pub mod watcher;
pub mod world;
