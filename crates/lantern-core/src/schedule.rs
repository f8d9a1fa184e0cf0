//! Minimal system scheduler over a `hecs::World`.
//!
//! Systems are registered into fixed stages and run single-threaded in stage
//! order, then insertion order. Singletons shared between systems live in
//! [`Resources`], a type-keyed map.

use std::any::{Any, TypeId};
use std::collections::HashMap;

use hecs::World;

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("system '{name}' is already registered in stage {stage:?}")]
    DuplicateSystem { stage: Stage, name: String },
}

/// Execution stages. Frame stages run in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Startup,
    Update,
    Prepare,
    Render,
}

impl Stage {
    pub const FRAME: [Stage; 3] = [Stage::Update, Stage::Prepare, Stage::Render];
}

/// Frame timing, advanced once per `run_frame`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Time {
    pub delta: f32,
    pub elapsed: f64,
    pub frame: u64,
}

/// Type-keyed singleton storage.
#[derive(Default)]
pub struct Resources {
    values: HashMap<TypeId, Box<dyn Any>>,
}

impl Resources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning the previous one of the same type.
    pub fn insert<T: 'static>(&mut self, value: T) -> Option<T> {
        self.values
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
    }

    pub fn get_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.values
            .get_mut(&TypeId::of::<T>())
            .and_then(|v| v.downcast_mut::<T>())
    }

    pub fn remove<T: 'static>(&mut self) -> Option<T> {
        self.values
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast::<T>().ok())
            .map(|v| *v)
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.values.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

type SystemFn = Box<dyn FnMut(&mut World, &mut Resources)>;

struct SystemEntry {
    stage: Stage,
    name: String,
    run: SystemFn,
}

/// Ordered collection of systems.
#[derive(Default)]
pub struct Schedule {
    systems: Vec<SystemEntry>,
    started: bool,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_system(
        &mut self,
        stage: Stage,
        name: &str,
        system: impl FnMut(&mut World, &mut Resources) + 'static,
    ) -> Result<(), ScheduleError> {
        if self
            .systems
            .iter()
            .any(|s| s.stage == stage && s.name == name)
        {
            return Err(ScheduleError::DuplicateSystem {
                stage,
                name: name.to_string(),
            });
        }
        tracing::debug!("Registered system '{}' in {:?}", name, stage);
        self.systems.push(SystemEntry {
            stage,
            name: name.to_string(),
            run: Box::new(system),
        });
        Ok(())
    }

    pub fn system_names(&self, stage: Stage) -> Vec<&str> {
        self.systems
            .iter()
            .filter(|s| s.stage == stage)
            .map(|s| s.name.as_str())
            .collect()
    }

    /// Run startup systems. Only the first call has any effect.
    pub fn run_startup(&mut self, world: &mut World, resources: &mut Resources) {
        if self.started {
            return;
        }
        self.started = true;
        self.run_stage(Stage::Startup, world, resources);
    }

    /// Advance [`Time`] by `dt` seconds and run every frame stage.
    pub fn run_frame(&mut self, world: &mut World, resources: &mut Resources, dt: f32) {
        if !self.started {
            self.run_startup(world, resources);
        }
        let mut time = resources.remove::<Time>().unwrap_or_default();
        time.delta = dt;
        time.elapsed += dt as f64;
        time.frame += 1;
        resources.insert(time);

        for stage in Stage::FRAME {
            self.run_stage(stage, world, resources);
        }
    }

    fn run_stage(&mut self, stage: Stage, world: &mut World, resources: &mut Resources) {
        for system in self.systems.iter_mut().filter(|s| s.stage == stage) {
            (system.run)(world, resources);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_resources_insert_get_remove() {
        let mut res = Resources::new();
        assert!(res.insert(5u32).is_none());
        assert_eq!(res.insert(7u32), Some(5));
        assert_eq!(res.get::<u32>(), Some(&7));
        *res.get_mut::<u32>().unwrap() += 1;
        assert_eq!(res.remove::<u32>(), Some(8));
        assert!(!res.contains::<u32>());
        assert!(res.is_empty());
    }

    #[test]
    fn test_stage_and_insertion_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut schedule = Schedule::new();
        for (stage, name) in [
            (Stage::Render, "render"),
            (Stage::Update, "update_a"),
            (Stage::Prepare, "prepare"),
            (Stage::Update, "update_b"),
            (Stage::Startup, "startup"),
        ] {
            let log = Rc::clone(&log);
            schedule
                .add_system(stage, name, move |_, _| log.borrow_mut().push(name))
                .unwrap();
        }

        let mut world = World::new();
        let mut res = Resources::new();
        schedule.run_frame(&mut world, &mut res, 0.016);
        schedule.run_frame(&mut world, &mut res, 0.016);

        assert_eq!(
            *log.borrow(),
            vec![
                "startup", "update_a", "update_b", "prepare", "render", "update_a", "update_b",
                "prepare", "render",
            ]
        );
    }

    #[test]
    fn test_time_advances() {
        let mut schedule = Schedule::new();
        let mut world = World::new();
        let mut res = Resources::new();
        schedule.run_frame(&mut world, &mut res, 0.5);
        schedule.run_frame(&mut world, &mut res, 0.25);
        let time = res.get::<Time>().unwrap();
        assert_eq!(time.frame, 2);
        assert_eq!(time.delta, 0.25);
        assert!((time.elapsed - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_duplicate_system_rejected() {
        let mut schedule = Schedule::new();
        schedule.add_system(Stage::Update, "move", |_, _| {}).unwrap();
        assert!(schedule.add_system(Stage::Update, "move", |_, _| {}).is_err());
        // Same name in another stage is fine.
        schedule.add_system(Stage::Render, "move", |_, _| {}).unwrap();
        assert_eq!(schedule.system_names(Stage::Update), vec!["move"]);
    }

    #[test]
    fn test_systems_query_world() {
        #[derive(Debug)]
        struct Velocity(f32);
        #[derive(Debug)]
        struct Position(f32);

        let mut schedule = Schedule::new();
        schedule
            .add_system(Stage::Update, "integrate", |world, res| {
                let dt = res.get::<Time>().map(|t| t.delta).unwrap_or(0.0);
                for (_, (pos, vel)) in world.query_mut::<(&mut Position, &Velocity)>() {
                    pos.0 += vel.0 * dt;
                }
            })
            .unwrap();

        let mut world = World::new();
        let e = world.spawn((Position(0.0), Velocity(2.0)));
        let mut res = Resources::new();
        schedule.run_frame(&mut world, &mut res, 0.5);
        assert_eq!(world.get::<&Position>(e).unwrap().0, 1.0);
    }
}
