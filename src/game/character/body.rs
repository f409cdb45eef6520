use rapier3d::prelude::RigidBodyHandle;

use crate::game::math::{Quat, Vec3};
use crate::game::parent::ParentAttachment;
use crate::game::physics::{EntityId, WorldHit};

/// Kinematic body state owned by the shared pipeline and the active state.
#[derive(Debug, Clone, PartialEq)]
pub struct CharacterBody {
    /// Velocity relative to the parent body, if any
    pub relative_velocity: Vec3,
    pub is_grounded: bool,
    pub was_grounded_before_update: bool,
    pub grounding_up: Vec3,
    pub ground_hit: Option<WorldHit>,
    pub parent: Option<ParentAttachment>,
    pub previous_parent: Option<ParentAttachment>,
    /// World velocity of the parent at the character's position this step
    pub parent_velocity: Vec3,
    /// Rotation the parent applied during the last physics step
    pub rotation_from_parent: Quat,
    pub last_physics_dt: f32,
    /// Obstructions the next velocity projection must respect
    pub velocity_projection_hits: Vec<WorldHit>,
}

impl Default for CharacterBody {
    fn default() -> Self {
        Self {
            relative_velocity: Vec3::zeros(),
            is_grounded: false,
            was_grounded_before_update: false,
            grounding_up: Vec3::y(),
            ground_hit: None,
            parent: None,
            previous_parent: None,
            parent_velocity: Vec3::zeros(),
            rotation_from_parent: Quat::identity(),
            last_physics_dt: 0.0,
            velocity_projection_hits: Vec::new(),
        }
    }
}

impl CharacterBody {
    /// Absolute velocity: relative velocity plus whatever the parent contributes.
    pub fn world_velocity(&self) -> Vec3 {
        self.relative_velocity + self.parent_velocity
    }

    pub fn ground_normal(&self) -> Vec3 {
        self.ground_hit.map_or(self.grounding_up, |hit| hit.normal)
    }

    pub fn ground_entity(&self) -> Option<EntityId> {
        self.ground_hit.and_then(|hit| hit.entity)
    }

    pub fn parent_body(&self) -> Option<RigidBodyHandle> {
        self.parent.map(|p| p.body)
    }

    pub fn parent_changed(&self) -> bool {
        self.parent_body() != self.previous_parent.map(|p| p.body)
    }
}

/// Lifecycle of a contact between a character and an entity across steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitState {
    Enter,
    Stay,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatefulHit {
    pub entity: EntityId,
    pub state: HitState,
}

/// Entities touched during the current and the previous step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HitTracker {
    current: Vec<EntityId>,
    previous: Vec<EntityId>,
    events: Vec<StatefulHit>,
}

impl HitTracker {
    pub fn begin_step(&mut self) {
        std::mem::swap(&mut self.current, &mut self.previous);
        self.current.clear();
    }

    pub fn record(&mut self, hit: &WorldHit) {
        if let Some(entity) = hit.entity {
            if !self.current.contains(&entity) {
                self.current.push(entity);
            }
        }
    }

    /// Diffs this step's contacts against the previous step's.
    pub fn finalize(&mut self) {
        self.events.clear();
        for entity in &self.current {
            let state = if self.previous.contains(entity) {
                HitState::Stay
            } else {
                HitState::Enter
            };
            self.events.push(StatefulHit { entity: *entity, state });
        }
        for entity in &self.previous {
            if !self.current.contains(entity) {
                self.events.push(StatefulHit {
                    entity: *entity,
                    state: HitState::Exit,
                });
            }
        }
    }

    pub fn events(&self) -> &[StatefulHit] {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rapier3d::prelude::ColliderHandle;

    fn hit(entity: u64) -> WorldHit {
        WorldHit {
            entity: Some(EntityId(entity)),
            collider: ColliderHandle::invalid(),
            body: None,
            position: Vec3::zeros(),
            normal: Vec3::y(),
            distance: 0.0,
            fraction: 0.0,
        }
    }

    #[test]
    fn test_hit_tracker_enter_stay_exit() {
        let mut tracker = HitTracker::default();
        tracker.begin_step();
        tracker.record(&hit(1));
        tracker.record(&hit(1));
        tracker.finalize();
        assert_eq!(
            tracker.events(),
            &[StatefulHit { entity: EntityId(1), state: HitState::Enter }]
        );

        tracker.begin_step();
        tracker.record(&hit(1));
        tracker.record(&hit(2));
        tracker.finalize();
        assert!(tracker
            .events()
            .contains(&StatefulHit { entity: EntityId(1), state: HitState::Stay }));
        assert!(tracker
            .events()
            .contains(&StatefulHit { entity: EntityId(2), state: HitState::Enter }));

        tracker.begin_step();
        tracker.finalize();
        assert_eq!(tracker.events().len(), 2);
        assert!(tracker.events().iter().all(|e| e.state == HitState::Exit));
    }

    #[test]
    fn test_world_velocity_includes_parent() {
        let body = CharacterBody {
            relative_velocity: Vec3::new(1.0, 0.0, 0.0),
            parent_velocity: Vec3::new(0.0, 0.0, 2.0),
            ..Default::default()
        };
        assert_eq!(body.world_velocity(), Vec3::new(1.0, 0.0, 2.0));
        assert!(!body.parent_changed());
    }
}
