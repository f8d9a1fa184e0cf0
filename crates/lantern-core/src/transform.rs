use std::collections::HashMap;

use glam::Mat4;
use hecs::{Entity, World};

use crate::components::Transform;

/// Compute world matrices for all entities with Transform components.
///
/// Parents are resolved before their children regardless of depth. A parent
/// that no longer exists (or carries no Transform) makes the child a root.
/// Entities on a parent cycle are treated as roots.
pub fn update_transforms(world: &mut World) {
    // Snapshot (local, parent) for every transform
    let mut nodes: HashMap<Entity, (Mat4, Option<Entity>)> = HashMap::new();
    for (entity, transform) in world.query_mut::<&Transform>() {
        nodes.insert(entity, (transform.local_matrix(), transform.parent));
    }

    let mut resolved: HashMap<Entity, Mat4> = HashMap::with_capacity(nodes.len());
    let mut warned_cycle = false;

    let entities: Vec<Entity> = nodes.keys().copied().collect();
    for start in entities {
        if resolved.contains_key(&start) {
            continue;
        }

        // Walk up until a resolved ancestor, a root, or a repeat
        let mut chain: Vec<Entity> = vec![start];
        let mut base = Mat4::IDENTITY;
        let mut cycle_at: Option<usize> = None;
        loop {
            let current = chain[chain.len() - 1];
            let parent = nodes.get(&current).and_then(|(_, p)| *p);
            let Some(parent) = parent else { break };
            if let Some(m) = resolved.get(&parent) {
                base = *m;
                break;
            }
            if !nodes.contains_key(&parent) {
                break;
            }
            if let Some(pos) = chain.iter().position(|e| *e == parent) {
                cycle_at = Some(pos);
                break;
            }
            chain.push(parent);
        }

        if let Some(pos) = cycle_at {
            if !warned_cycle {
                tracing::warn!(
                    "Transform parent cycle through {} entities; treating them as roots",
                    chain.len() - pos
                );
                warned_cycle = true;
            }
            // Cycle members become roots; everything below them stacks on top
            for entity in &chain[pos..] {
                resolved.insert(*entity, nodes[entity].0);
            }
            chain.truncate(pos);
            if let Some(last) = chain.last() {
                let parent = nodes[last].1;
                base = parent.and_then(|p| resolved.get(&p).copied()).unwrap_or(Mat4::IDENTITY);
            }
        }

        // Resolve top-down
        for entity in chain.iter().rev() {
            let world_matrix = base * nodes[entity].0;
            resolved.insert(*entity, world_matrix);
            base = world_matrix;
        }
    }

    for (entity, transform) in world.query_mut::<&mut Transform>() {
        if let Some(m) = resolved.get(&entity) {
            transform.world_matrix = *m;
            transform.dirty = false;
        }
    }
}
