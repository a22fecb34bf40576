//! `TaskRegistry`: the set of live tasks and registered fleet specialists.
//!
//! Mutated from `vehicle` (insertions, on threshold crossing) and from
//! `specialist`/`data_interface` (removals, on swap completion). Exposes
//! `available_tasks` as a snapshot `Vec` so planners observe a consistent
//! set within one event's synchronous handling, per the specification's
//! shared-resource policy (§5).
//!
//! Backed by `IndexSet` rather than `std::collections::HashSet`: the latter's
//! iteration order is randomized per-process (`RandomState`), which would
//! make `find_nearest_task`'s equal-distance tie-break
//! (specification §4.5/§9) non-reproducible across runs with the same seed.

use bevy_ecs::prelude::{Entity, Resource, World};
use indexmap::IndexSet;

use crate::ecs::{Task, TaskStatus, Vehicle, VehicleStatus};

#[derive(Debug, Default, Resource)]
pub struct TaskRegistry {
    tasks: IndexSet<Entity>,
    specialists: IndexSet<Entity>,
}

impl TaskRegistry {
    pub fn add_task(&mut self, task: Entity) {
        self.tasks.insert(task);
    }

    pub fn remove_task(&mut self, task: Entity) {
        // `shift_remove`, not `swap_remove`: preserves insertion order among
        // the remaining tasks so the tie-break stays reproducible.
        self.tasks.shift_remove(&task);
    }

    pub fn add_specialist(&mut self, specialist: Entity) {
        self.specialists.insert(specialist);
    }

    pub fn tasks(&self) -> impl Iterator<Item = Entity> + '_ {
        self.tasks.iter().copied()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn contains(&self, task: Entity) -> bool {
        self.tasks.contains(&task)
    }
}

/// Tasks whose vehicle is not `riding` and whose own status is not
/// `pending` (specification §4.6). A snapshot `Vec`, not a live view, so a
/// planner iterating it mid-decision can't observe another entity's
/// concurrent removal. Nothing *can* run concurrently here, but this
/// keeps the call sites honest about when the set was taken.
///
/// Per the specification's §9 open question, tasks are always removed from
/// the registry before their vehicle link is cleared, so this never reads
/// through a dangling vehicle reference.
pub fn available_tasks(world: &World, registry: &TaskRegistry) -> Vec<Entity> {
    registry
        .tasks()
        .filter(|&task_entity| {
            let Some(task) = world.get::<Task>(task_entity) else {
                return false;
            };
            if task.status == TaskStatus::Pending {
                return false;
            }
            world
                .get::<Vehicle>(task.vehicle)
                .map(|v| v.status != VehicleStatus::Riding)
                .unwrap_or(false)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_remove_round_trips() {
        let mut reg = TaskRegistry::default();
        let e = Entity::from_raw(1);
        reg.add_task(e);
        assert!(reg.contains(e));
        assert_eq!(reg.task_count(), 1);
        reg.remove_task(e);
        assert!(!reg.contains(e));
        assert_eq!(reg.task_count(), 0);
    }
}
