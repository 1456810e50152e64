//! Merlin is a schema-driven object-document mapper with pluggable storage
//! drivers.
//!
//! ## Example
//!
//! ```ignore
//! use merlin::{Config, Merlin, ModelDefinition, Options, Schema};
//! use serde_json::json;
//!
//! // Set up the orchestrator with a driver
//! let merlin = Merlin::new(Config::default())?;
//! merlin.set_driver(merlin::driver::mongo::MongoDriver::for_config(merlin.config()))?;
//!
//! // Declare model types and how they relate
//! let mut schema = Schema::new();
//! schema.add(json!({ "email": { "type": "string", "required": true } }))?;
//!
//! let users = merlin.model("User", ModelDefinition::from_schema(schema))?;
//! let posts = merlin.model("Post", ModelDefinition::new())?;
//!
//! // Every post stores the id of its author in `authorId`
//! posts.many_have_one("User", "author")?;
//!
//! merlin.connect("mongodb://localhost/blog", Options::default()).await?;
//!
//! // Insert a record and get a model back
//! let mut user = users.create(json!({ "email": "mail@example.com" }), Options::default()).await?;
//!
//! // Change it and save the delta
//! user.set("email", "new.email@example.com")?;
//! user.save().await?;
//!
//! // Find posts with their authors attached
//! let recent = posts
//!     .find(json!({ "published": true, "author": {} }), Options::default())
//!     .all()
//!     .await?;
//!
//! // Remove the user
//! user.remove().await?;
//! ```
//!
//! See [`guides`] module to learn more!

#![warn(clippy::pedantic)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions
)]

extern crate self as merlin;

mod config;
pub mod driver;
mod error;
pub mod guides;
pub mod hook_hub;
mod inflect;
#[cfg(feature = "meta")]
pub mod meta;
mod model;
mod model_set;
mod model_type;
mod orchestrator;
pub mod path;
mod query;
pub mod relation;
pub mod schema;
mod stream;

use serde::{Serialize, de::DeserializeOwned};
use std::fmt::Display;

/// A record as it flows between models and drivers.
pub type Record = serde_json::Map<String, serde_json::Value>;

pub use config::Config;
pub use driver::Driver;
pub use error::{Error, FieldError, Result, ValidationErrors};
pub use hook_hub::{Hook, HookArgs, HookHub};
pub use model::{INSTANCE_API, Model, ModelStatus, SubModel};
pub use model_set::ModelSet;
pub use model_type::{DefaultValue, ModelDefinition, ModelType};
pub use orchestrator::{Merlin, Plugin, Status};
pub use query::{Delta, Field, Filter, FilterOperator, Options, Query, QueryOptions, Update};
pub use relation::{Descriptor, Edge, RelationKind, RelationOptions, Resolved};
pub use schema::{RuleType, Schema, SchemaRule, VirtualRule};
pub use stream::{CountStream, Materialize, ModelStream};

pub use merlin_macros::{Entity, Fields, construct_filter, construct_update};

#[doc(hidden)]
pub use serde_json;

#[cfg(feature = "meta")]
#[doc(hidden)]
pub use inventory;

/// A Rust struct stored as the records of one model type.
///
/// Usually derived; see [`guides::entities`].
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    type Fields: Display + Send + 'static;

    const MODEL_NAME: &'static str;

    /// Overrides the default collection name.
    const COLLECTION_NAME: Option<&'static str>;

    fn schema() -> Schema;
}

#[cfg(feature = "meta")]
#[doc(hidden)]
#[macro_export]
macro_rules! __submit_entity {
    ($entity: ty) => {
        $crate::inventory::submit! {
            $crate::meta::EntityMetadataWrapper($crate::meta::EntityMetadata::of::<$entity>())
        }
    };
}

#[cfg(not(feature = "meta"))]
#[doc(hidden)]
#[macro_export]
macro_rules! __submit_entity {
    ($entity: ty) => {};
}
