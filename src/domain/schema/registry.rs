//! Registered entity descriptors.

use sha2::{Digest, Sha256};

use crate::domain::entity::{Entity, EntityDescriptor};

/// The set of entities handed to the schema compiler.
///
/// Built once at startup:
///
/// ```ignore
/// let registry = EntityRegistry::new()
///     .register::<User>()
///     .register::<Post>();
/// ```
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    descriptors: Vec<EntityDescriptor>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<E: Entity>(self) -> Self {
        self.register_descriptor(E::describe())
    }

    pub fn register_descriptor(mut self, descriptor: EntityDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn descriptors(&self) -> &[EntityDescriptor] {
        &self.descriptors
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.descriptors.iter().map(|d| d.role.as_str())
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Hex SHA-256 over the serialized descriptors.
    ///
    /// Changes whenever any mapping changes.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for descriptor in &self.descriptors {
            hasher.update(serde_json::to_vec(descriptor).unwrap_or_default());
            hasher.update([0u8]);
        }
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::ColumnDef;

    fn tag() -> EntityDescriptor {
        EntityDescriptor::new("tag", "app").column(ColumnDef::primary("id"))
    }

    #[test]
    fn fingerprint_is_stable_for_same_descriptors() {
        let a = EntityRegistry::new().register_descriptor(tag());
        let b = EntityRegistry::new().register_descriptor(tag());
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn fingerprint_changes_with_mapping() {
        let a = EntityRegistry::new().register_descriptor(tag());
        let b = EntityRegistry::new()
            .register_descriptor(tag().column(ColumnDef::string("label")));
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn roles_follow_registration_order() {
        let registry = EntityRegistry::new()
            .register_descriptor(tag())
            .register_descriptor(EntityDescriptor::new("post", "app"));
        assert_eq!(registry.roles().collect::<Vec<_>>(), vec!["tag", "post"]);
        assert_eq!(registry.len(), 2);
    }
}
