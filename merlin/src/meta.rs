//! Link-time registry of every type deriving [`Entity`](crate::Entity).

use crate::{Entity, ModelDefinition, Schema};

#[doc(hidden)]
pub struct EntityMetadataWrapper(pub EntityMetadata);

inventory::collect!(EntityMetadataWrapper);

pub struct EntityMetadata {
    model_name: &'static str,
    collection_name: Option<&'static str>,
    schema_ptr: fn() -> Schema,
}

impl EntityMetadata {
    #[doc(hidden)]
    pub const fn of<E: Entity>() -> Self {
        Self {
            model_name: E::MODEL_NAME,
            collection_name: E::COLLECTION_NAME,
            schema_ptr: E::schema,
        }
    }

    pub fn model_name(&self) -> &'static str {
        self.model_name
    }

    /// The collection override, if the entity declares one.
    pub fn collection_name(&self) -> Option<&'static str> {
        self.collection_name
    }

    pub fn schema(&self) -> Schema {
        (self.schema_ptr)()
    }

    pub fn definition(&self) -> ModelDefinition {
        let definition = ModelDefinition::from_schema(self.schema());

        match self.collection_name {
            Some(collection) => definition.collection(collection),
            None => definition,
        }
    }

    #[cfg(feature = "schema")]
    pub fn json_schema(&self) -> schemars::schema::Schema {
        self.schema().json_schema()
    }
}

pub fn entity_metadata() -> impl Iterator<Item = &'static EntityMetadata> {
    inventory::iter::<EntityMetadataWrapper>
        .into_iter()
        .map(|wrapper| &wrapper.0)
}
