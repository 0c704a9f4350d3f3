use serde_json::{Map, Value};
use tiermux_common::ParamsConfig;

/// Applies configured default parameters to an outbound request body.
/// Global defaults fill in keys the caller omitted, leaving caller-supplied
/// keys untouched. Model-specific overrides are then written unconditionally
/// — they win over both the global defaults and whatever the caller sent,
/// replacing a key's whole value rather than deep-merging into it.
pub fn merge_params(config: &ParamsConfig, model: &str, body: &mut Map<String, Value>) {
    apply_defaults(body, &config.global_params);
    if let Some(overrides) = config.overrides_for(model) {
        for (key, value) in overrides {
            body.insert(key.clone(), value.clone());
        }
    }
}

fn apply_defaults(body: &mut Map<String, Value>, defaults: &Map<String, Value>) {
    for (key, value) in defaults {
        if !body.contains_key(key) {
            body.insert(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(global: Map<String, Value>, model_params: HashMap<String, Map<String, Value>>) -> ParamsConfig {
        ParamsConfig {
            global_params: global,
            model_params,
        }
    }

    #[test]
    fn caller_supplied_keys_are_never_overwritten() {
        let mut global = Map::new();
        global.insert("temperature".to_string(), Value::from(0.7));
        let cfg = config(global, HashMap::new());

        let mut body = Map::new();
        body.insert("temperature".to_string(), Value::from(0.2));
        merge_params(&cfg, "gpt-4o-mini", &mut body);

        assert_eq!(body.get("temperature"), Some(&Value::from(0.2)));
    }

    #[test]
    fn model_override_replaces_whole_value_not_deep_merge() {
        let mut global = Map::new();
        let mut global_response_format = Map::new();
        global_response_format.insert("type".to_string(), Value::from("text"));
        global.insert(
            "response_format".to_string(),
            Value::Object(global_response_format),
        );

        let mut model_response_format = Map::new();
        model_response_format.insert("type".to_string(), Value::from("json_object"));
        let mut model_overrides = Map::new();
        model_overrides.insert(
            "response_format".to_string(),
            Value::Object(model_response_format.clone()),
        );
        let mut model_params = HashMap::new();
        model_params.insert("gpt-4o-mini".to_string(), model_overrides);

        let cfg = config(global, model_params);
        let mut body = Map::new();
        merge_params(&cfg, "gpt-4o-mini", &mut body);

        assert_eq!(
            body.get("response_format"),
            Some(&Value::Object(model_response_format))
        );
    }

    #[test]
    fn model_override_wins_even_when_the_caller_already_set_the_key() {
        let mut model_response_format = Map::new();
        model_response_format.insert("type".to_string(), Value::from("json_object"));
        let mut model_overrides = Map::new();
        model_overrides.insert(
            "response_format".to_string(),
            Value::Object(model_response_format.clone()),
        );
        let mut model_params = HashMap::new();
        model_params.insert("gpt-4o-mini".to_string(), model_overrides);

        let cfg = config(Map::new(), model_params);

        let mut caller_response_format = Map::new();
        caller_response_format.insert("type".to_string(), Value::from("text"));
        let mut body = Map::new();
        body.insert(
            "response_format".to_string(),
            Value::Object(caller_response_format),
        );
        merge_params(&cfg, "gpt-4o-mini", &mut body);

        assert_eq!(
            body.get("response_format"),
            Some(&Value::Object(model_response_format))
        );
    }

    #[test]
    fn unrecognized_model_only_gets_global_defaults() {
        let mut global = Map::new();
        global.insert("max_tokens".to_string(), Value::from(256));
        let cfg = config(global, HashMap::new());

        let mut body = Map::new();
        merge_params(&cfg, "some-other-model", &mut body);

        assert_eq!(body.get("max_tokens"), Some(&Value::from(256)));
    }
}
