//! Deterministic grass scatter.

use crate::components::Foliage;
use crate::rng::SplitMix64;

/// Per-blade instance data, laid out for direct upload as a vertex buffer.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FoliageInstance {
    /// Root position relative to the patch origin (y is always 0).
    pub position: [f32; 3],
    /// Yaw in radians.
    pub rotation: f32,
    pub scale: f32,
    /// Wind phase offset in radians.
    pub phase: f32,
    pub _pad: [f32; 2],
}

pub fn scatter(foliage: &Foliage) -> Vec<FoliageInstance> {
    let mut rng = SplitMix64::new(foliage.seed);
    let extent = foliage.extent.max(0.0);
    let tau = std::f32::consts::TAU;

    (0..foliage.blade_count)
        .map(|_| {
            let x = rng.next_signed() * extent;
            let z = rng.next_signed() * extent;
            let rotation = rng.next_unit() * tau;
            let scale = foliage.blade_height * (0.6 + 0.8 * rng.next_unit());
            let phase = rng.next_unit() * tau;
            FoliageInstance {
                position: [x, 0.0, z],
                rotation,
                scale,
                phase,
                _pad: [0.0; 2],
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_instances() {
        let f = Foliage {
            blade_count: 256,
            ..Default::default()
        };
        assert_eq!(scatter(&f), scatter(&f));
    }

    #[test]
    fn test_different_seed_differs() {
        let a = Foliage {
            blade_count: 16,
            seed: 1,
            ..Default::default()
        };
        let b = Foliage { seed: 2, ..a.clone() };
        assert_ne!(scatter(&a), scatter(&b));
    }

    #[test]
    fn test_instances_inside_extent() {
        let f = Foliage {
            blade_count: 2000,
            extent: 3.0,
            ..Default::default()
        };
        let instances = scatter(&f);
        assert_eq!(instances.len(), 2000);
        for inst in &instances {
            assert!(inst.position[0].abs() <= 3.0 && inst.position[2].abs() <= 3.0);
            assert_eq!(inst.position[1], 0.0);
            assert!(inst.scale > 0.0 && inst.scale <= f.blade_height * 1.4 + 1e-6);
            assert!((0.0..std::f32::consts::TAU).contains(&inst.rotation));
        }
    }

    #[test]
    fn test_zero_blades() {
        let f = Foliage {
            blade_count: 0,
            ..Default::default()
        };
        assert!(scatter(&f).is_empty());
    }

    #[test]
    fn test_instance_stride() {
        assert_eq!(std::mem::size_of::<FoliageInstance>(), 32);
    }
}
