//! Naming helpers for default collection names and relation paths.

use crate::config::MODEL_NAME_PLACEHOLDER;
use heck::ToLowerCamelCase;

/// `BlogPost` -> `blogPost`.
pub fn lower_camel(name: &str) -> String {
    name.to_lower_camel_case()
}

/// English plural of a camel-cased identifier; only the last word changes.
pub fn pluralize(word: &str) -> String {
    if word.is_empty() {
        return String::new();
    }

    if let Some(stem) = word.strip_suffix('y') {
        if !stem.ends_with(['a', 'e', 'i', 'o', 'u']) {
            return format!("{stem}ies");
        }
    }

    if word.ends_with("ss")
        || word.ends_with("sh")
        || word.ends_with("ch")
        || word.ends_with('x')
        || word.ends_with('z')
    {
        return format!("{word}es");
    }

    if word.ends_with('s') {
        return word.to_owned();
    }

    format!("{word}s")
}

/// Inverse of [`pluralize`] for the shapes it produces.
pub fn singularize(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        return format!("{stem}y");
    }

    for suffix in ["sses", "shes", "ches", "xes", "zes"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_owned();
        }
    }

    if let Some(stem) = word.strip_suffix('s') {
        if !stem.ends_with('s') {
            return stem.to_owned();
        }
    }

    word.to_owned()
}

/// Substitutes `name` into a foreign key template.
pub fn foreign_key(template: &str, name: &str) -> String {
    template.replace(MODEL_NAME_PLACEHOLDER, name)
}
