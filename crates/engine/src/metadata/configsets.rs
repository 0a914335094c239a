//! configSets expansion
//!
//! ```json
//! {
//!   "configSets": {
//!     "default": [{"ConfigSet": "base"}, "web"],
//!     "base": ["packages"]
//!   },
//!   "packages": {...},
//!   "web": {...}
//! }
//! ```
//!
//! Selecting `default` yields the configs `packages`, `web`. Without a
//! `configSets` key the single `config` entry is used.

use crate::{Error, Result};
use serde_json::{Map, Value};

/// Set selected when the caller names none
pub const DEFAULT_CONFIG_SET: &str = "default";

const CONFIG_SETS_KEY: &str = "configSets";
const SINGLE_CONFIG: &str = "config";

/// Names of the configs to apply, in order
///
/// `selected` is a comma-separated list of set names.
///
/// # Errors
///
/// [`Error::Configuration`] for a set or config that does not exist, or a set
/// that includes itself.
pub fn resolve(init: &Map<String, Value>, selected: Option<&str>) -> Result<Vec<String>> {
    let Some(sets) = init.get(CONFIG_SETS_KEY) else {
        if let Some(selected) = selected
            && selected != DEFAULT_CONFIG_SET
        {
            return Err(Error::Configuration(format!(
                "configSet {selected} requested but the metadata defines no {CONFIG_SETS_KEY}"
            )));
        }
        return Ok(if init.contains_key(SINGLE_CONFIG) {
            vec![SINGLE_CONFIG.to_string()]
        } else {
            Vec::new()
        });
    };
    let sets = sets
        .as_object()
        .ok_or_else(|| Error::Configuration(format!("{CONFIG_SETS_KEY} must be a mapping")))?;

    let mut configs = Vec::new();
    let mut stack = Vec::new();
    for name in selected
        .unwrap_or(DEFAULT_CONFIG_SET)
        .split(',')
        .map(str::trim)
        .filter(|n| !n.is_empty())
    {
        expand(name, sets, &mut stack, &mut configs)?;
    }

    if let Some(missing) = configs
        .iter()
        .find(|name| !init.get(name.as_str()).is_some_and(Value::is_object))
    {
        return Err(Error::Configuration(format!("config {missing} not found")));
    }
    Ok(configs)
}

fn expand<'a>(
    name: &'a str,
    sets: &'a Map<String, Value>,
    stack: &mut Vec<&'a str>,
    configs: &mut Vec<String>,
) -> Result<()> {
    if stack.contains(&name) {
        return Err(Error::Configuration(format!(
            "configSet {name} includes itself ({} -> {name})",
            stack.join(" -> ")
        )));
    }
    let items = sets
        .get(name)
        .ok_or_else(|| Error::Configuration(format!("configSet {name} not found")))?;

    stack.push(name);
    let items = match items {
        Value::Array(items) => items.as_slice(),
        single => std::slice::from_ref(single),
    };
    for item in items {
        match item {
            Value::String(config) => configs.push(config.clone()),
            Value::Object(reference) => match reference.get("ConfigSet") {
                Some(Value::String(inner)) => expand(inner, sets, stack, configs)?,
                Some(Value::Array(inner)) => {
                    for inner in inner {
                        let inner = inner.as_str().ok_or_else(|| {
                            Error::Configuration(format!("configSet {name}: bad reference"))
                        })?;
                        expand(inner, sets, stack, configs)?;
                    }
                }
                _ => {
                    return Err(Error::Configuration(format!(
                        "configSet {name}: entries must be config names or ConfigSet references"
                    )));
                }
            },
            _ => {
                return Err(Error::Configuration(format!(
                    "configSet {name}: unexpected entry {item}"
                )));
            }
        }
    }
    stack.pop();
    Ok(())
}
