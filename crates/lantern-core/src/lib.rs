//! Lantern core: GPU-free building blocks shared by the client and runtime.
//!
//! Components live in a `hecs::World`; the [`schedule`] module drives systems
//! over that world in fixed stages. Mesh data, OBJ parsing, foliage scatter and
//! scene files are plain CPU-side data so they can be tested without a device.

pub mod camera;
pub mod components;
pub mod foliage;
pub mod mesh_data;
pub mod obj;
pub mod rng;
pub mod scene;
pub mod schedule;
pub mod transform;
