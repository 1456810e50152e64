use crate::{Error, Result, inflect};
use serde::{Deserialize, Serialize};

pub(crate) const MODEL_NAME_PLACEHOLDER: &str = "{modelName}";

/// Orchestrator-wide settings.
///
/// A `Config` is frozen once handed to [`Merlin::new`](crate::Merlin::new)
/// and shared by every registered model type.
///
/// ```
/// let config = merlin::Config::default()
///     .with_id_key("_key")
///     .with_singular_foreign_key("{modelName}Key");
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Record field holding the primary key.
    pub id_key: String,
    /// Template for single foreign keys, e.g. `{modelName}Id`.
    pub singular_foreign_key: String,
    /// Template for foreign key arrays, e.g. `{modelName}Ids`.
    pub plural_foreign_key: String,
    /// Populate related records when a query carries sub-queries.
    pub auto_populate_by_query: bool,
    /// Skip schema validation on every insert and update.
    pub skip_schema_validation: bool,
    /// Strip populated sub-records from records before they are inserted.
    pub prune_sub_records: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            id_key: "id".into(),
            singular_foreign_key: "{modelName}Id".into(),
            plural_foreign_key: "{modelName}Ids".into(),
            auto_populate_by_query: true,
            skip_schema_validation: false,
            prune_sub_records: true,
        }
    }
}

impl Config {
    pub fn with_id_key(mut self, id_key: impl Into<String>) -> Self {
        self.id_key = id_key.into();
        self
    }

    pub fn with_singular_foreign_key(mut self, template: impl Into<String>) -> Self {
        self.singular_foreign_key = template.into();
        self
    }

    pub fn with_plural_foreign_key(mut self, template: impl Into<String>) -> Self {
        self.plural_foreign_key = template.into();
        self
    }

    pub fn with_auto_populate_by_query(mut self, enabled: bool) -> Self {
        self.auto_populate_by_query = enabled;
        self
    }

    pub fn with_skip_schema_validation(mut self, skip: bool) -> Self {
        self.skip_schema_validation = skip;
        self
    }

    pub fn with_prune_sub_records(mut self, prune: bool) -> Self {
        self.prune_sub_records = prune;
        self
    }

    /// Reads a config from a JSON object; missing keys take their defaults.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        let config: Self = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.id_key.is_empty() {
            return Err(Error::configuration("`idKey` must not be empty"));
        }

        for (name, template) in [
            ("singularForeignKey", &self.singular_foreign_key),
            ("pluralForeignKey", &self.plural_foreign_key),
        ] {
            if !template.contains(MODEL_NAME_PLACEHOLDER) {
                return Err(Error::configuration(format!(
                    "`{name}` must contain `{MODEL_NAME_PLACEHOLDER}`, got `{template}`"
                )));
            }
        }

        Ok(())
    }

    /// Singular foreign key for a model or path name, e.g. `author` -> `authorId`.
    pub fn singular_foreign_key(&self, name: &str) -> String {
        inflect::foreign_key(&self.singular_foreign_key, name)
    }

    /// Plural foreign key for a model or path name, e.g. `tag` -> `tagIds`.
    pub fn plural_foreign_key(&self, name: &str) -> String {
        inflect::foreign_key(&self.plural_foreign_key, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_keys_take_defaults() {
        let config = Config::from_json(json!({ "idKey": "_id" })).unwrap();

        assert_eq!(config.id_key, "_id");
        assert_eq!(config.singular_foreign_key, "{modelName}Id");
        assert!(config.auto_populate_by_query);
        assert!(!config.skip_schema_validation);
    }

    #[test]
    fn templates_must_name_the_model() {
        let config = Config::default().with_plural_foreign_key("ids");

        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn foreign_keys_use_templates() {
        let config = Config::default().with_singular_foreign_key("{modelName}Key");

        assert_eq!(config.singular_foreign_key("simpleModel"), "simpleModelKey");
        assert_eq!(config.plural_foreign_key("simpleModel"), "simpleModelIds");
    }
}
