//! Named hooks with ordered, sequential handlers.
//!
//! A [`HookHub`] maps hook names to handler lists. Handlers run in the order
//! they were added and never concurrently; the first failing handler stops
//! the rest and its error is handed back to whoever emitted the hook.

use crate::Result;
use futures_util::future::BoxFuture;
use serde_json::Value;
use std::{
    collections::HashMap,
    fmt,
    future::Future,
    ops::{Deref, DerefMut},
    sync::{Arc, PoisonError, RwLock},
};

/// Hook names emitted by the static model surface and the orchestrator.
pub mod names {
    pub const QUERY: &str = "query";
    pub const INDEX: &str = "index";
    pub const BEFORE_COUNT: &str = "beforeCount";
    pub const AFTER_COUNT: &str = "afterCount";
    pub const BEFORE_FIND: &str = "beforeFind";
    pub const AFTER_FIND: &str = "afterFind";
    pub const BEFORE_INSERT: &str = "beforeInsert";
    pub const AFTER_INSERT: &str = "afterInsert";
    pub const BEFORE_UPDATE: &str = "beforeUpdate";
    pub const AFTER_UPDATE: &str = "afterUpdate";
    pub const BEFORE_REMOVE: &str = "beforeRemove";
    pub const AFTER_REMOVE: &str = "afterRemove";

    pub const MODEL: &str = "model";
    pub const PLUGIN: &str = "plugin";
    pub const CONNECTED: &str = "connected";
    pub const CLOSE: &str = "close";

    pub const SAVE: &str = "save";
    pub const REMOVE: &str = "remove";
}

/// Positional arguments handed to hook handlers. Handlers may rewrite them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HookArgs(Vec<Value>);

impl HookArgs {
    pub fn new(args: Vec<Value>) -> Self {
        Self(args)
    }

    pub fn into_inner(self) -> Vec<Value> {
        self.0
    }

    /// Takes the argument at `index`, leaving `null` behind.
    pub fn take(&mut self, index: usize) -> Value {
        self.0.get_mut(index).map(Value::take).unwrap_or_default()
    }
}

impl Deref for HookArgs {
    type Target = Vec<Value>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for HookArgs {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Vec<Value>> for HookArgs {
    fn from(args: Vec<Value>) -> Self {
        Self(args)
    }
}

type SyncHandler = dyn Fn(&mut HookArgs) -> Result<()> + Send + Sync;
type AsyncHandler = dyn Fn(HookArgs) -> BoxFuture<'static, Result<HookArgs>> + Send + Sync;

enum Handler {
    Sync(Box<SyncHandler>),
    Async(Box<AsyncHandler>),
}

/// A hook handler. Clones share identity, which is what [`HookHub::off`]
/// compares.
#[derive(Clone)]
pub struct Hook(Arc<Handler>);

impl Hook {
    /// A handler that completes synchronously.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&mut HookArgs) -> Result<()> + Send + Sync + 'static,
    {
        Self(Arc::new(Handler::Sync(Box::new(handler))))
    }

    /// A handler that completes when its future resolves.
    pub fn new_async<F, Fut>(handler: F) -> Self
    where
        F: Fn(HookArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HookArgs>> + Send + 'static,
    {
        Self(Arc::new(Handler::Async(Box::new(move |args| {
            Box::pin(handler(args))
        }))))
    }

    pub fn is_async(&self) -> bool {
        matches!(*self.0, Handler::Async(_))
    }

    pub fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Runs the handler to completion and returns the arguments it leaves behind.
    pub async fn call(&self, mut args: HookArgs) -> Result<HookArgs> {
        match &*self.0 {
            Handler::Sync(handler) => {
                handler(&mut args)?;
                Ok(args)
            }
            Handler::Async(handler) => handler(args).await,
        }
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Hook")
            .field(&if self.is_async() { "async" } else { "sync" })
            .finish()
    }
}

/// Runs `hooks` one after another, threading the arguments through.
pub(crate) async fn run_sequence(hooks: &[Hook], mut args: HookArgs) -> Result<HookArgs> {
    for hook in hooks {
        args = hook.call(args).await?;
    }

    Ok(args)
}

#[derive(Default)]
pub struct HookHub {
    hooks: RwLock<HashMap<String, Vec<Hook>>>,
}

impl HookHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `hook` to the handlers of `name`. Adding the same hook twice
    /// makes it run twice.
    pub fn on(&self, name: impl Into<String>, hook: Hook) {
        self.hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.into())
            .or_default()
            .push(hook);
    }

    /// Removes the first registration of `hook` under `name`.
    pub fn off(&self, name: &str, hook: &Hook) -> bool {
        let mut hooks = self.hooks.write().unwrap_or_else(PoisonError::into_inner);

        let Some(handlers) = hooks.get_mut(name) else {
            return false;
        };

        let Some(position) = handlers.iter().position(|handler| handler.same(hook)) else {
            return false;
        };

        handlers.remove(position);

        if handlers.is_empty() {
            hooks.remove(name);
        }

        true
    }

    /// Snapshot of the handlers registered under `name`.
    pub fn handlers(&self, name: &str) -> Vec<Hook> {
        self.hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn has_handlers(&self, name: &str) -> bool {
        self.hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    pub fn hook_names(&self) -> Vec<String> {
        let mut names = self
            .hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    /// Calls `worker` with every registered handler of every hook name.
    pub fn for_each_hook(&self, mut worker: impl FnMut(&str, &Hook)) {
        let hooks = self.hooks.read().unwrap_or_else(PoisonError::into_inner);

        for (name, handlers) in hooks.iter() {
            for handler in handlers {
                worker(name, handler);
            }
        }
    }

    /// Fire-and-forget emission. Synchronous handlers run in order and the
    /// first error is returned; asynchronous handlers need an executor and
    /// are skipped.
    pub fn emit(&self, name: &str, args: &mut HookArgs) -> Result<()> {
        for hook in self.handlers(name) {
            match &*hook.0 {
                Handler::Sync(handler) => handler(args)?,
                Handler::Async(_) => {
                    tracing::warn!(hook = name, "skipping async handler on synchronous emit");
                }
            }
        }

        Ok(())
    }

    /// Emits `name` and waits for every handler, one at a time. The first
    /// failing handler ends the emission with its error.
    pub async fn emit_async(&self, name: &str, args: HookArgs) -> Result<HookArgs> {
        let handlers = self.handlers(name);

        if handlers.is_empty() {
            return Ok(args);
        }

        tracing::trace!(hook = name, handlers = handlers.len(), "emitting hook");

        run_sequence(&handlers, args).await
    }
}

impl fmt::Debug for HookHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookHub")
            .field("hooks", &self.hook_names())
            .finish()
    }
}
