//! Character -> supporting body relation.
//!
//! A parent (moving platform, grabbed ledge, climbed surface) is never owned by the character.
//! The registry stores a non-owning handle plus the attachment point, and lookups that find a
//! body that no longer exists treat the character as detached.

use dashmap::DashMap;
use rapier3d::prelude::RigidBodyHandle;

use super::math::Vec3;
use super::physics::{CollisionWorld, EntityId};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParentAttachment {
    pub body: RigidBodyHandle,
    pub entity: Option<EntityId>,
    /// World-space anchor recorded when the attachment was last set
    pub anchor: Vec3,
}

/// Keyed by character. Each key is written only by its own character's update, so concurrent
/// character updates never contend on the same entry.
#[derive(Debug, Default)]
pub struct ParentRegistry {
    attachments: DashMap<EntityId, ParentAttachment>,
}

impl ParentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets, moves or clears (`None`) the parent of `character`.
    pub fn set_or_update(&self, character: EntityId, attachment: Option<ParentAttachment>) {
        match attachment {
            Some(attachment) => {
                self.attachments.insert(character, attachment);
            }
            None => {
                self.attachments.remove(&character);
            }
        }
    }

    pub fn get(&self, character: EntityId) -> Option<ParentAttachment> {
        self.attachments.get(&character).map(|entry| *entry.value())
    }

    /// Parent of `character` if its body is still present in `world`.
    pub fn live_parent(&self, character: EntityId, world: &CollisionWorld) -> Option<ParentAttachment> {
        self.get(character)
            .filter(|attachment| world.rigid_body_set.get(attachment.body).is_some())
    }

    pub fn children_of(&self, body: RigidBodyHandle) -> Vec<EntityId> {
        let mut children: Vec<EntityId> = self
            .attachments
            .iter()
            .filter(|entry| entry.value().body == body)
            .map(|entry| *entry.key())
            .collect();
        children.sort();
        children
    }

    pub fn remove(&self, character: EntityId) {
        self.attachments.remove(&character);
    }

    pub fn len(&self) -> usize {
        self.attachments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attachments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rapier3d::prelude::*;

    #[test]
    fn test_single_parent_per_character() {
        let mut bodies = RigidBodySet::new();
        let a = bodies.insert(RigidBodyBuilder::fixed().build());
        let b = bodies.insert(RigidBodyBuilder::fixed().build());
        let registry = ParentRegistry::new();
        let character = EntityId(7);

        registry.set_or_update(
            character,
            Some(ParentAttachment { body: a, entity: None, anchor: Vec3::zeros() }),
        );
        registry.set_or_update(
            character,
            Some(ParentAttachment { body: b, entity: None, anchor: Vec3::x() }),
        );

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(character).map(|p| p.body), Some(b));
        assert!(registry.children_of(a).is_empty());
        assert_eq!(registry.children_of(b), vec![character]);

        registry.set_or_update(character, None);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_removed_body_reads_as_detached() {
        let mut world = CollisionWorld::new();
        let handle = world.rigid_body_set.insert(RigidBodyBuilder::fixed().build());
        let registry = ParentRegistry::new();
        let character = EntityId(1);
        registry.set_or_update(
            character,
            Some(ParentAttachment { body: handle, entity: None, anchor: Vec3::zeros() }),
        );
        assert!(registry.live_parent(character, &world).is_some());

        world.rigid_body_set.remove(
            handle,
            &mut world.island_manager,
            &mut world.collider_set,
            &mut world.impulse_joint_set,
            &mut world.multibody_joint_set,
            true,
        );
        assert!(registry.live_parent(character, &world).is_none());
    }
}
