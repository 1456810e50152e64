//! Field rules, virtual fields, methods and pre/post hooks of a model type.

mod rule;

#[cfg(feature = "schema")]
mod json_schema;

pub use rule::{RuleType, SchemaRule};

use crate::{
    Error, Model, ModelType, Record, Result, ValidationErrors,
    hook_hub::{Hook, HookArgs, run_sequence},
    path,
};
use serde_json::{Map, Value};
use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    future::Future,
    sync::Arc,
};

/// An instance method, called with the model it is invoked on.
pub type Method = Arc<dyn Fn(&mut Model, &[Value]) -> Result<Value> + Send + Sync>;

/// A static method, called with the model type it is invoked on.
pub type StaticMethod = Arc<dyn Fn(&Arc<ModelType>, &[Value]) -> Result<Value> + Send + Sync>;

/// A schema plugin. Each distinct plugin function is applied at most once.
pub type SchemaPlugin = fn(&mut Schema, &Value);

pub type VirtualGetter = Arc<dyn Fn(&Model) -> Value + Send + Sync>;
pub type VirtualSetter = Arc<dyn Fn(&mut Model, Value) -> Result<()> + Send + Sync>;

/// A computed field. Neither side is persisted.
#[derive(Clone, Default)]
pub struct VirtualRule {
    pub get: Option<VirtualGetter>,
    pub set: Option<VirtualSetter>,
}

impl VirtualRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn getter(mut self, get: impl Fn(&Model) -> Value + Send + Sync + 'static) -> Self {
        self.get = Some(Arc::new(get));
        self
    }

    pub fn setter(
        mut self,
        set: impl Fn(&mut Model, Value) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.set = Some(Arc::new(set));
        self
    }
}

impl fmt::Debug for VirtualRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualRule")
            .field("get", &self.get.is_some())
            .field("set", &self.set.is_some())
            .finish()
    }
}

#[derive(Clone, Default)]
pub struct Schema {
    rules: BTreeMap<String, SchemaRule>,
    virtuals: BTreeMap<String, VirtualRule>,
    methods: BTreeMap<String, Method>,
    statics: BTreeMap<String, StaticMethod>,
    pre: HashMap<String, Vec<Hook>>,
    post: HashMap<String, Vec<Hook>>,
    plugins: Vec<SchemaPlugin>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges nested rule definitions.
    ///
    /// A string is shorthand for `{"type": <string>}`; an object with a
    /// string `type` is a rule; any other object nests one path level deeper.
    ///
    /// ```
    /// # use serde_json::json;
    /// let mut schema = merlin::Schema::new();
    /// schema.add(json!({
    ///     "name": { "type": "string", "required": true },
    ///     "address": { "city": "string", "zip": "string" },
    /// }))?;
    ///
    /// assert!(schema.get("address.city").is_some());
    /// # Ok::<_, merlin::Error>(())
    /// ```
    pub fn add(&mut self, rules: Value) -> Result<&mut Self> {
        let Value::Object(rules) = rules else {
            return Err(Error::configuration(format!(
                "schema rules must be an object, got `{rules}`"
            )));
        };

        self.add_at("", rules)?;

        Ok(self)
    }

    fn add_at(&mut self, prefix: &str, rules: Map<String, Value>) -> Result<()> {
        for (key, node) in rules {
            let path = if prefix.is_empty() {
                key
            } else {
                format!("{prefix}.{key}")
            };

            match node {
                Value::String(tag) => {
                    self.rule(path, SchemaRule::new(RuleType::parse(&tag)?));
                }
                Value::Object(node) if node.get("type").is_some_and(Value::is_string) => {
                    let rule: SchemaRule =
                        serde_json::from_value(Value::Object(node)).map_err(|error| {
                            Error::configuration(format!("invalid rule at `{path}`: {error}"))
                        })?;
                    rule.check()?;
                    self.rule(path, rule);
                }
                Value::Object(node) => self.add_at(&path, node)?,
                other => {
                    return Err(Error::configuration(format!(
                        "invalid rule at `{path}`: `{other}`"
                    )));
                }
            }
        }

        Ok(())
    }

    /// Sets the rule at `path`, replacing any previous one.
    pub fn rule(&mut self, path: impl Into<String>, rule: SchemaRule) -> &mut Self {
        self.rules.insert(path.into(), rule);
        self
    }

    pub fn get(&self, path: &str) -> Option<&SchemaRule> {
        self.rules.get(path)
    }

    pub fn rules(&self) -> impl Iterator<Item = (&str, &SchemaRule)> {
        self.rules.iter().map(|(path, rule)| (path.as_str(), rule))
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    pub fn method(
        &mut self,
        name: impl Into<String>,
        method: impl Fn(&mut Model, &[Value]) -> Result<Value> + Send + Sync + 'static,
    ) -> &mut Self {
        self.methods.insert(name.into(), Arc::new(method));
        self
    }

    pub fn get_method(&self, name: &str) -> Option<&Method> {
        self.methods.get(name)
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    pub fn static_method(
        &mut self,
        name: impl Into<String>,
        method: impl Fn(&Arc<ModelType>, &[Value]) -> Result<Value> + Send + Sync + 'static,
    ) -> &mut Self {
        self.statics.insert(name.into(), Arc::new(method));
        self
    }

    pub fn get_static(&self, name: &str) -> Option<&StaticMethod> {
        self.statics.get(name)
    }

    pub fn virtual_field(&mut self, path: impl Into<String>, rule: VirtualRule) -> &mut Self {
        self.virtuals.insert(path.into(), rule);
        self
    }

    pub fn get_virtual(&self, path: &str) -> Option<&VirtualRule> {
        self.virtuals.get(path)
    }

    pub fn virtual_paths(&self) -> impl Iterator<Item = &str> {
        self.virtuals.keys().map(String::as_str)
    }

    /// Adds a handler that runs before the body of `hook`.
    pub fn pre(&mut self, hook: impl Into<String>, handler: Hook) -> &mut Self {
        self.pre.entry(hook.into()).or_default().push(handler);
        self
    }

    /// Adds a handler that runs after the body of `hook`.
    pub fn post(&mut self, hook: impl Into<String>, handler: Hook) -> &mut Self {
        self.post.entry(hook.into()).or_default().push(handler);
        self
    }

    pub fn has_hooks(&self, hook: &str) -> bool {
        self.pre.contains_key(hook) || self.post.contains_key(hook)
    }

    /// Runs the pre handlers of `hook`, then `body`, then the post handlers.
    ///
    /// Pre handlers receive `args` and may rewrite them before `body` sees
    /// them; post handlers receive what `body` returned. The first error
    /// anywhere stops the sequence and is returned.
    pub async fn execute<F, Fut>(&self, hook: &str, args: HookArgs, body: F) -> Result<HookArgs>
    where
        F: FnOnce(HookArgs) -> Fut,
        Fut: Future<Output = Result<HookArgs>>,
    {
        let pre = self.pre.get(hook).map_or(&[][..], Vec::as_slice);
        let post = self.post.get(hook).map_or(&[][..], Vec::as_slice);

        let args = run_sequence(pre, args).await?;
        let results = body(args).await?;

        run_sequence(post, results).await
    }

    /// Applies `plugin` with `opts` unless it was applied before.
    pub fn plugin(&mut self, plugin: SchemaPlugin, opts: &Value) -> &mut Self {
        if self
            .plugins
            .iter()
            .any(|applied| std::ptr::fn_addr_eq(*applied, plugin))
        {
            return self;
        }

        self.plugins.push(plugin);
        plugin(self, opts);
        self
    }

    /// Checks `record` against every rule and reports all violations at once.
    pub fn validate(&self, record: &Record) -> Result<()> {
        self.check(record, false)
    }

    /// Like [`validate`](Self::validate), but absent fields are not
    /// required. Used for update patches.
    pub fn validate_partial(&self, record: &Record) -> Result<()> {
        self.check(record, true)
    }

    fn check(&self, record: &Record, partial: bool) -> Result<()> {
        let mut errors = ValidationErrors::default();

        for (path, rule) in &self.rules {
            rule.validate(path, path::get(record, path), partial, &mut errors);
        }

        errors.into_result()
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("rules", &self.rules)
            .field("virtuals", &self.virtuals.keys().collect::<Vec<_>>())
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("statics", &self.statics.keys().collect::<Vec<_>>())
            .field("pre", &self.pre.keys().collect::<Vec<_>>())
            .field("post", &self.post.keys().collect::<Vec<_>>())
            .field("plugins", &self.plugins.len())
            .finish()
    }
}
