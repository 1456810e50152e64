use crate::{
    Config, Driver, Error, ModelDefinition, ModelType, Options, Result,
    hook_hub::{Hook, HookArgs, HookHub, names},
    inflect,
    relation::RelationGraph,
};
use dashmap::DashMap;
use serde_json::Value;
use std::{
    fmt,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

/// Lifecycle of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// No driver installed.
    Init,
    /// A driver is installed but not connected.
    Ready,
    Connected,
}

/// An extension installed on the orchestrator as a whole.
///
/// `apply` runs once, before the `plugin` hook fires, and usually registers
/// hooks or models on the orchestrator it is handed.
pub trait Plugin: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn apply(&self, _merlin: &Merlin) -> Result<()> {
        Ok(())
    }
}

pub(crate) struct Inner {
    pub(crate) config: Arc<Config>,
    status: RwLock<Status>,
    driver: RwLock<Option<Arc<dyn Driver>>>,
    models: DashMap<String, Arc<ModelType>>,
    graph: RwLock<RelationGraph>,
    hooks: HookHub,
    plugins: RwLock<Vec<Arc<dyn Plugin>>>,
}

impl Inner {
    pub(crate) fn driver(&self) -> Result<Arc<dyn Driver>> {
        self.driver
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| Error::configuration("no driver installed"))
    }

    pub(crate) fn model(&self, name: &str) -> Result<Arc<ModelType>> {
        self.models
            .get(name)
            .map(|model| model.value().clone())
            .ok_or_else(|| Error::configuration(format!("`{name}` is not a registered model")))
    }

    pub(crate) fn graph(&self) -> RwLockReadGuard<'_, RelationGraph> {
        self.graph.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn graph_mut(&self) -> RwLockWriteGuard<'_, RelationGraph> {
        self.graph.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn status(&self) -> Status {
        *self.status.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, status: Status) {
        *self.status.write().unwrap_or_else(PoisonError::into_inner) = status;
    }
}

/// Owns the driver, the registered model types and the relation graph.
///
/// Cloning is cheap; clones share the same registry.
///
/// ```no_run
/// # async fn run(driver: impl merlin::Driver) -> merlin::Result<()> {
/// use merlin::{Config, Merlin, ModelDefinition, Options};
/// use serde_json::json;
///
/// let merlin = Merlin::new(Config::default())?;
/// merlin.set_driver(driver)?;
///
/// let users = merlin.model("User", ModelDefinition::new())?;
/// merlin.connect("mongodb://localhost/app", Options::default()).await?;
///
/// let adults = users.find(json!({ "age": { "$gte": 18 } }), Options::default()).all().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Merlin {
    inner: Arc<Inner>,
}

impl Merlin {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            inner: Arc::new(Inner {
                config: Arc::new(config),
                status: RwLock::new(Status::Init),
                driver: RwLock::new(None),
                models: DashMap::new(),
                graph: RwLock::default(),
                hooks: HookHub::new(),
                plugins: RwLock::default(),
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn status(&self) -> Status {
        self.inner.status()
    }

    /// Installs the storage driver. Not allowed while connected.
    pub fn set_driver(&self, driver: impl Driver) -> Result<()> {
        self.ensure_disconnected("change the driver")?;

        *self
            .inner
            .driver
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(driver));
        self.inner.set_status(Status::Ready);

        Ok(())
    }

    /// Removes the driver. Not allowed while connected or once models are
    /// registered against it.
    pub fn remove_driver(&self) -> Result<()> {
        self.ensure_disconnected("remove the driver")?;

        if !self.inner.models.is_empty() {
            return Err(Error::configuration(
                "cannot remove the driver while models are registered",
            ));
        }

        *self
            .inner
            .driver
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
        self.inner.set_status(Status::Init);

        Ok(())
    }

    pub fn driver(&self) -> Result<Arc<dyn Driver>> {
        self.inner.driver()
    }

    pub async fn connect(&self, url: &str, opts: Options) -> Result<()> {
        let driver = self.inner.driver()?;

        tracing::debug!(url, "connecting driver");
        driver.connect(url, &opts).await?;
        self.inner.set_status(Status::Connected);

        self.inner
            .hooks
            .emit_async(names::CONNECTED, HookArgs::new(vec![Value::from(url)]))
            .await?;

        Ok(())
    }

    pub async fn close(&self) -> Result<()> {
        let driver = self.inner.driver()?;

        tracing::debug!("disconnecting driver");
        driver.disconnect().await?;
        self.inner.set_status(Status::Ready);

        self.inner
            .hooks
            .emit_async(names::CLOSE, HookArgs::default())
            .await?;

        Ok(())
    }

    /// Registers a model type. Re-registering a name replaces the type.
    pub fn model(&self, name: &str, definition: ModelDefinition) -> Result<Arc<ModelType>> {
        self.inner.driver()?;
        self.ensure_disconnected("register a model")?;

        if name.is_empty() {
            return Err(Error::configuration("a model needs a name"));
        }

        let collection_name = definition
            .collection_name
            .clone()
            .unwrap_or_else(|| inflect::pluralize(&inflect::lower_camel(name)));

        let model = Arc::new(ModelType::new(
            name.to_owned(),
            collection_name,
            Arc::downgrade(&self.inner),
            self.inner.config.clone(),
            definition,
        ));

        self.inner.models.insert(name.to_owned(), model.clone());

        tracing::debug!(
            model = name,
            collection = model.collection_name(),
            "registered model"
        );

        self.inner
            .hooks
            .emit(names::MODEL, &mut HookArgs::new(vec![Value::from(name)]))?;

        Ok(model)
    }

    /// Installs an orchestrator plugin. Needs a driver and is not allowed
    /// while connected.
    pub fn plugin(&self, plugin: impl Plugin) -> Result<Arc<dyn Plugin>> {
        self.ensure_disconnected("add a plugin")?;
        if self.inner.status() == Status::Init {
            return Err(Error::configuration("cannot add a plugin without a driver"));
        }

        let plugin: Arc<dyn Plugin> = Arc::new(plugin);
        plugin.apply(self)?;

        tracing::debug!(plugin = plugin.name(), "installed plugin");

        self.inner.hooks.emit(
            names::PLUGIN,
            &mut HookArgs::new(vec![Value::from(plugin.name())]),
        )?;

        self.inner
            .plugins
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(plugin.clone());

        Ok(plugin)
    }

    /// Names of the installed plugins, in installation order.
    pub fn plugin_names(&self) -> Vec<String> {
        self.inner
            .plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|plugin| plugin.name().to_owned())
            .collect()
    }

    pub fn get_model(&self, name: &str) -> Option<Arc<ModelType>> {
        self.inner.model(name).ok()
    }

    pub fn model_names(&self) -> Vec<String> {
        let mut names = self
            .inner
            .models
            .iter()
            .map(|model| model.key().clone())
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    /// Registers a typed entity under its model and collection names.
    pub fn register<E: crate::Entity>(&self) -> Result<Arc<ModelType>> {
        let mut definition = ModelDefinition::from_schema(E::schema());
        if let Some(collection) = E::COLLECTION_NAME {
            definition = definition.collection(collection);
        }

        self.model(E::MODEL_NAME, definition)
    }

    /// Registers every entity that derives [`Entity`](crate::Entity) in the
    /// final binary.
    #[cfg(feature = "meta")]
    pub fn register_all(&self) -> Result<Vec<Arc<ModelType>>> {
        crate::meta::entity_metadata()
            .map(|metadata| self.model(metadata.model_name(), metadata.definition()))
            .collect()
    }

    pub fn hooks(&self) -> &HookHub {
        &self.inner.hooks
    }

    pub fn on(&self, name: impl Into<String>, hook: Hook) {
        self.inner.hooks.on(name, hook);
    }

    pub fn off(&self, name: &str, hook: &Hook) -> bool {
        self.inner.hooks.off(name, hook)
    }

    fn ensure_disconnected(&self, action: &str) -> Result<()> {
        if self.inner.status() == Status::Connected {
            return Err(Error::configuration(format!(
                "cannot {action} while connected"
            )));
        }

        Ok(())
    }
}

impl fmt::Debug for Merlin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Merlin")
            .field("config", &self.inner.config)
            .field("status", &self.inner.status())
            .field("models", &self.model_names())
            .field("plugins", &self.plugin_names())
            .finish_non_exhaustive()
    }
}
