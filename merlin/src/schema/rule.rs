use crate::{Error, Result, ValidationErrors};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{borrow::Cow, sync::OnceLock};

/// The type tag of a [`SchemaRule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
    /// RFC 3339 timestamp, plain date, or epoch milliseconds.
    Date,
    /// A primary key; strings and integers are accepted.
    Id,
    Any,
}

impl RuleType {
    pub fn parse(tag: &str) -> Result<Self> {
        serde_json::from_value(Value::String(tag.to_owned()))
            .map_err(|_| Error::configuration(format!("unknown schema type `{tag}`")))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
            Self::Date => "date",
            Self::Id => "id",
            Self::Any => "any",
        }
    }

    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => {
                value.is_i64()
                    || value.is_u64()
                    || value.as_f64().is_some_and(|number| number.fract() == 0.0)
            }
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
            Self::Date => match value {
                Value::String(text) => {
                    chrono::DateTime::parse_from_rfc3339(text).is_ok()
                        || chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok()
                }
                Value::Number(number) => number.is_i64() || number.is_u64(),
                _ => false,
            },
            Self::Id => value.is_string() || value.is_i64() || value.is_u64(),
            Self::Any => true,
        }
    }
}

/// Constraints for one field path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaRule {
    #[serde(rename = "type")]
    pub ty: RuleType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub one_of: Option<Vec<Value>>,
    /// Element type of an array.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<RuleType>,
    #[serde(skip)]
    compiled: CompiledPattern,
}

/// The regex of the first pattern a rule was checked against.
#[derive(Debug, Clone, Default)]
struct CompiledPattern(OnceLock<Regex>);

impl PartialEq for CompiledPattern {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}

impl SchemaRule {
    pub fn new(ty: RuleType) -> Self {
        Self {
            ty,
            required: false,
            min: None,
            max: None,
            min_length: None,
            max_length: None,
            pattern: None,
            one_of: None,
            items: None,
            compiled: CompiledPattern::default(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn min_length(mut self, min_length: usize) -> Self {
        self.min_length = Some(min_length);
        self
    }

    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self.compiled = CompiledPattern::default();
        self
    }

    pub fn one_of(mut self, values: impl IntoIterator<Item = Value>) -> Self {
        self.one_of = Some(values.into_iter().collect());
        self
    }

    pub fn items(mut self, ty: RuleType) -> Self {
        self.items = Some(ty);
        self
    }

    pub(crate) fn check(&self) -> Result<()> {
        if let Some(pattern) = &self.pattern {
            self.compiled_pattern(pattern).map_err(|error| {
                Error::configuration(format!("invalid pattern `{pattern}`: {error}"))
            })?;
        }

        Ok(())
    }

    /// Compiles `pattern` once; a pattern replaced after that is compiled on
    /// every call.
    fn compiled_pattern(&self, pattern: &str) -> Result<Cow<'_, Regex>, regex::Error> {
        if let Some(regex) = self.compiled.0.get().filter(|regex| regex.as_str() == pattern) {
            return Ok(Cow::Borrowed(regex));
        }

        let regex = Regex::new(pattern)?;
        Ok(match self.compiled.0.get() {
            Some(_) => Cow::Owned(regex),
            None => Cow::Borrowed(self.compiled.0.get_or_init(|| regex)),
        })
    }

    /// Records every violation of this rule by `value` into `errors`.
    pub(crate) fn validate(
        &self,
        path: &str,
        value: Option<&Value>,
        partial: bool,
        errors: &mut ValidationErrors,
    ) {
        let value = match value {
            None | Some(Value::Null) => {
                if self.required && !partial {
                    errors.push(path, "is required");
                }
                return;
            }
            Some(value) => value,
        };

        if !self.ty.matches(value) {
            errors.push(path, format!("must be of type {}", self.ty.as_str()));
            return;
        }

        if let Some(number) = value.as_f64() {
            if let Some(min) = self.min.filter(|min| number < *min) {
                errors.push(path, format!("must be at least {min}"));
            }
            if let Some(max) = self.max.filter(|max| number > *max) {
                errors.push(path, format!("must be at most {max}"));
            }
        }

        let length = match value {
            Value::String(text) => Some(text.chars().count()),
            Value::Array(items) => Some(items.len()),
            _ => None,
        };

        if let Some(length) = length {
            if let Some(min_length) = self.min_length.filter(|min| length < *min) {
                errors.push(path, format!("must have a length of at least {min_length}"));
            }
            if let Some(max_length) = self.max_length.filter(|max| length > *max) {
                errors.push(path, format!("must have a length of at most {max_length}"));
            }
        }

        if let (Some(pattern), Value::String(text)) = (&self.pattern, value) {
            match self.compiled_pattern(pattern) {
                Ok(regex) if regex.is_match(text) => {}
                Ok(_) => errors.push(path, format!("must match `{pattern}`")),
                Err(error) => errors.push(path, format!("has an invalid pattern: {error}")),
            }
        }

        if let Some(one_of) = &self.one_of {
            if !one_of.contains(value) {
                errors.push(path, "is not one of the allowed values");
            }
        }

        if let (Some(items), Value::Array(values)) = (self.items, value) {
            for (index, item) in values.iter().enumerate() {
                if !items.matches(item) {
                    errors.push(
                        format!("{path}.{index}"),
                        format!("must be of type {}", items.as_str()),
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn violations(rule: &SchemaRule, value: Value) -> Vec<String> {
        let mut errors = ValidationErrors::default();
        rule.validate("field", Some(&value), false, &mut errors);
        errors.0.into_iter().map(|error| error.message).collect()
    }

    #[test]
    fn type_tags_parse_from_strings() {
        assert_eq!(RuleType::parse("string").unwrap(), RuleType::String);
        assert!(matches!(
            RuleType::parse("strnig"),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn dates_accept_timestamps_and_epoch_millis() {
        assert!(RuleType::Date.matches(&json!("2024-05-01T10:00:00Z")));
        assert!(RuleType::Date.matches(&json!("2024-05-01")));
        assert!(RuleType::Date.matches(&json!(1_714_557_600_000_i64)));
        assert!(!RuleType::Date.matches(&json!("yesterday")));
    }

    #[test]
    fn numeric_bounds() {
        let rule = SchemaRule::new(RuleType::Integer).min(1.0).max(10.0);

        assert!(violations(&rule, json!(5)).is_empty());
        assert_eq!(violations(&rule, json!(0)), ["must be at least 1"]);
        assert_eq!(violations(&rule, json!(11)), ["must be at most 10"]);
        assert_eq!(violations(&rule, json!(1.5)), ["must be of type integer"]);
    }

    #[test]
    fn string_constraints() {
        let rule = SchemaRule::new(RuleType::String)
            .min_length(2)
            .pattern("^[a-z]+$");

        assert!(violations(&rule, json!("kit")).is_empty());
        assert_eq!(
            violations(&rule, json!("K")),
            ["must have a length of at least 2", "must match `^[a-z]+$`"]
        );
    }

    #[test]
    fn patterns_compile_once() {
        let mut rule = SchemaRule::new(RuleType::String).pattern("^[a-z]+$");
        rule.check().unwrap();

        assert_eq!(rule.compiled.0.get().map(Regex::as_str), Some("^[a-z]+$"));
        assert!(violations(&rule, json!("kit")).is_empty());

        rule.pattern = Some("^K".to_owned());
        assert!(violations(&rule, json!("Kit")).is_empty());
        assert_eq!(violations(&rule, json!("kit")), ["must match `^K`"]);
        assert_eq!(rule.compiled.0.get().map(Regex::as_str), Some("^[a-z]+$"));

        let rule = rule.pattern("(");
        assert!(rule.check().is_err());
        assert!(rule.compiled.0.get().is_none());
    }

    #[test]
    fn required_is_skipped_for_partial_checks() {
        let rule = SchemaRule::new(RuleType::String).required();
        let mut errors = ValidationErrors::default();

        rule.validate("name", None, true, &mut errors);
        assert!(errors.is_empty());

        rule.validate("name", None, false, &mut errors);
        assert_eq!(errors.0.len(), 1);
    }

    #[test]
    fn enum_and_items() {
        let rule = SchemaRule::new(RuleType::Array).items(RuleType::String);
        assert_eq!(violations(&rule, json!(["a", 1])), ["must be of type string"]);

        let rule = SchemaRule::new(RuleType::String).one_of([json!("a"), json!("b")]);
        assert!(violations(&rule, json!("a")).is_empty());
        assert_eq!(
            violations(&rule, json!("c")),
            ["is not one of the allowed values"]
        );
    }
}
