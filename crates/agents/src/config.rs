use std::env;

use querylens_ml::DEFAULT_THRESHOLD;
use serde::Serialize;
use tracing::warn;

pub const DEFAULT_MODEL: &str = "microsoft/phi-2";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouterConfig {
    pub threshold: f32,
    pub model_name: String,
    /// Include the intent catalog in fallback prompts.
    pub catalog_context: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            model_name: DEFAULT_MODEL.to_string(),
            catalog_context: true,
        }
    }
}

impl RouterConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let threshold = match lookup("QUERYLENS_THRESHOLD") {
            Some(raw) => match raw.trim().parse::<f32>() {
                Ok(value) if (0.0..=1.0).contains(&value) => value,
                _ => {
                    warn!(value = %raw, "ignoring invalid QUERYLENS_THRESHOLD");
                    defaults.threshold
                }
            },
            None => defaults.threshold,
        };

        let model_name = lookup("QUERYLENS_MODEL")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or(defaults.model_name);

        let catalog_context = match lookup("QUERYLENS_CATALOG_CONTEXT") {
            Some(raw) => match raw.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    warn!(value = %raw, "ignoring invalid QUERYLENS_CATALOG_CONTEXT");
                    defaults.catalog_context
                }
            },
            None => defaults.catalog_context,
        };

        Self {
            threshold,
            model_name,
            catalog_context,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn reads_overrides() {
        let config = RouterConfig::from_lookup(lookup_from(&[
            ("QUERYLENS_THRESHOLD", "0.6"),
            ("QUERYLENS_MODEL", "phi"),
            ("QUERYLENS_CATALOG_CONTEXT", "off"),
        ]));
        assert_eq!(config.threshold, 0.6);
        assert_eq!(config.model_name, "phi");
        assert!(!config.catalog_context);
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let config = RouterConfig::from_lookup(lookup_from(&[
            ("QUERYLENS_THRESHOLD", "1.7"),
            ("QUERYLENS_MODEL", "  "),
            ("QUERYLENS_CATALOG_CONTEXT", "maybe"),
        ]));
        assert_eq!(config, RouterConfig::default());
    }
}
