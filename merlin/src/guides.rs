/// ## Getting started
///
/// [`Merlin`](crate::Merlin) owns a storage driver, the registered model
/// types and the relations between them. A model type is registered under a
/// name and stores its records in a collection named after it: the lower
/// camel case, pluralized model name (`BlogPost` → `blogPosts`) unless
/// [`ModelDefinition::collection`](crate::ModelDefinition::collection) says
/// otherwise.
///
/// Model types can only be registered while a driver is installed and the
/// orchestrator is not connected.
///
/// ```ignore
/// use merlin::{Config, Merlin, ModelDefinition, Options, driver::mongo::MongoDriver};
/// use serde_json::json;
///
/// let merlin = Merlin::new(Config::default())?;
/// merlin.set_driver(MongoDriver::for_config(merlin.config()))?;
///
/// let users = merlin.model("User", ModelDefinition::new())?;
///
/// merlin.connect("mongodb://localhost/app", Options::default()).await?;
///
/// let user = users.create(json!({ "name": "Kit" }), Options::default()).await?;
/// ```
///
/// ### Method overview
///
/// | Method                      | Description                                                   | Returns                           |
/// |-----------------------------|---------------------------------------------------------------|-----------------------------------|
/// | `ModelType::find`           | Finds records matching a filter.                              | `ModelStream`                     |
/// | `ModelType::find_one`       | Finds the first matching record; the driver sees `limit: 1`.  | `Result<Option<Model>>`           |
/// | `ModelType::find_by_id`     | Finds a record by id.                                         | `Result<Option<Model>>`           |
/// | `ModelType::all`            | Every record of the collection.                               | `ModelStream`                     |
/// | `ModelType::count`          | Counts matching records.                                      | `CountStream`                     |
/// | `ModelType::insert`         | Inserts records through defaults, validation and hooks.       | `ModelStream`                     |
/// | `ModelType::create`         | Inserts a single record.                                      | `Result<Model>`                   |
/// | `ModelType::update`         | Applies an update document to every matching record.          | `Result<CountStream>`             |
/// | `ModelType::update_one`     | Same, with `limit: 1`.                                        | `Result<CountStream>`             |
/// | `ModelType::update_by_id`   | Same, by id.                                                  | `Result<CountStream>`             |
/// | `ModelType::remove`         | Removes every matching record.                                | `Result<CountStream>`             |
/// | `ModelType::remove_one`     | Same, with `limit: 1`.                                        | `Result<CountStream>`             |
/// | `ModelType::remove_by_id`   | Same, by id.                                                  | `Result<CountStream>`             |
/// | `ModelType::index`          | Asks the driver to index a field path.                        | `Result<()>`                      |
/// | `Model::save`               | Inserts a new model or updates a persisted one with its delta.| `Result<()>`                      |
/// | `Model::remove`             | Removes a persisted model.                                    | `Result<()>`                      |
/// | `Model::reset`              | Reloads the record by id.                                     | `Result<()>`                      |
///
/// Streams can be consumed once, with `all`, `first`, `at`, `last` or
/// `for_each`, used as a [`Stream`](futures_util::Stream), or awaited, which
/// is the same as `all`. Every `*_as::<Record>` variant skips building models
/// and yields plain records.
pub mod getting_started {}

/// ## Relations
///
/// Relations are declared on model types by name, after both types are
/// registered. The type that stores the foreign key owns the relation; the
/// other type gets a mirrored reference.
///
/// | Declaration on `A`              | Stored on | Key path default  | Attached on `A` at |
/// |---------------------------------|-----------|-------------------|--------------------|
/// | `a.has_one("B", ..)`            | `A`       | `bId`             | `b`                |
/// | `a.has_many("B", ..)`           | `A`       | `bIds`            | `bs`               |
/// | `a.many_have_one("B", ..)`      | `A`       | `bId`             | `b`                |
/// | `a.belongs_to_one("B", ..)`     | `B`       | `aId`             | `b`                |
/// | `a.belongs_to_many("B", ..)`    | `B`       | `aIds`            | `b`                |
/// | `a.many_belong_to_one("B", ..)` | `B`       | `aId`             | `bs`               |
///
/// The second argument is either a bare path, which names the attach path,
/// or [`RelationOptions`](crate::RelationOptions) to override the key path,
/// field path and foreign field path one by one. Key names come from the
/// `singularForeignKey` and `pluralForeignKey` templates of
/// [`Config`](crate::Config).
///
/// ### Populating
///
/// A filter may contain an object (or `true`) at an attach path. It is
/// removed from the filter sent to the driver, and every relation and
/// reference of each found record is loaded and attached, the object
/// narrowing the lookup at its path:
///
/// ```ignore
/// let posts = posts
///     .find(json!({ "author": { "active": true } }), Options::default())
///     .all()
///     .await?;
///
/// let author = posts[0].sub_model("author");
/// ```
///
/// Updates and removals refuse such filters.
///
/// A single model loads related data with
/// [`Model::load_related`](crate::Model::load_related), and saves or removes
/// everything attached to it with
/// [`Model::save_all`](crate::Model::save_all) and
/// [`Model::remove_all`](crate::Model::remove_all).
pub mod relations {}

/// ## Schemas and hooks
///
/// A [`Schema`](crate::Schema) declares field rules, virtual fields,
/// instance and static methods, and `pre`/`post` handlers around `save` and
/// `remove`.
///
/// ```ignore
/// let mut schema = Schema::new();
///
/// schema.add(json!({
///     "name": { "type": "string", "required": true, "minLength": 1 },
///     "address": { "city": "string" },
/// }))?;
///
/// schema.virtual_field(
///     "greeting",
///     VirtualRule::new().getter(|model| json!(format!("Hi, {}", model.get("name").unwrap_or_default()))),
/// );
///
/// schema.pre("save", Hook::new(|args| {
///     // args[0] is the record about to be saved
///     Ok(())
/// }));
/// ```
///
/// Inserts are validated in full and updates only on the fields they write,
/// unless `skipSchemaValidation` is set in the config or the call options.
/// Every violation is reported at once in
/// [`ValidationErrors`](crate::ValidationErrors).
///
/// Model types, the orchestrator and schemas share the same
/// [`Hook`](crate::Hook) handlers. The static surface emits `query`,
/// `beforeFind`/`afterFind`, `beforeCount`/`afterCount`,
/// `beforeInsert`/`afterInsert`, `beforeUpdate`/`afterUpdate`,
/// `beforeRemove`/`afterRemove` and `index` on the model type; handlers may
/// rewrite their arguments and the first error aborts the operation. The
/// orchestrator emits `model`, `connected` and `close`.
pub mod schemas_and_hooks {}

/// ## Entities
///
/// A struct deriving [`Entity`](crate::Entity) carries its model name and a
/// schema built from its fields:
///
/// ```ignore
/// #[derive(Serialize, Deserialize, Entity)]
/// #[entity(collection = "people")]
/// struct User {
///     id: Option<String>,
///     #[entity(min_length = 1)]
///     name: String,
///     age: Option<u32>,
/// }
///
/// let users = merlin.register::<User>()?;
///
/// let kit = users
///     .create_entity(&User { id: None, name: "Kit".into(), age: None }, Options::default())
///     .await?;
///
/// let adults: Vec<User> = users
///     .find_entities(user::filter! { age: Gte(&18) }, Options::default())
///     .await?;
///
/// users.update(user::filter! { name: "Kit" }, user::update! { age: Some(30) }, Options::default())?.await?;
/// ```
///
/// Non-`Option` fields are required. The `id` field is never validated. The
/// derive also generates a module named after the struct in snake case, with
/// `TypedFilter`, `TypedUpdate`, a `Fields` enum and the `filter!` and
/// `update!` macros.
///
/// With the `meta` feature every derived entity is recorded at link time,
/// and [`Merlin::register_all`](crate::Merlin::register_all) registers all of
/// them at once.
pub mod entities {}
