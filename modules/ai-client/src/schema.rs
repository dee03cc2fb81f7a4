use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;

/// Trait for types that can be extracted as schema-constrained model output.
///
/// Automatically implemented for any type that implements
/// `JsonSchema + DeserializeOwned`.
pub trait StructuredOutput: JsonSchema + DeserializeOwned {
    /// Generate a tool-input JSON schema for this type.
    ///
    /// The messages API accepts standard JSON Schema as a tool's
    /// `input_schema`, but extraction is far more reliable when:
    /// 1. every object carries `additionalProperties: false`
    /// 2. ALL properties are listed in `required`, even nullable ones
    /// 3. the schema is fully inlined (no `$ref` indirection)
    fn tool_schema() -> serde_json::Value {
        let schema = schema_for!(Self);
        let mut value = serde_json::to_value(schema).unwrap_or_default();

        fix_object_schemas(&mut value);
        inline_refs(&mut value);

        if let serde_json::Value::Object(map) = &mut value {
            map.remove("definitions");
            map.remove("$schema");
        }

        value
    }

    fn type_name() -> String {
        <Self as JsonSchema>::schema_name()
    }
}

impl<T: JsonSchema + DeserializeOwned> StructuredOutput for T {}

fn fix_object_schemas(value: &mut serde_json::Value) {
    if let serde_json::Value::Object(map) = value {
        if map.get("type") == Some(&serde_json::Value::String("object".to_string())) {
            map.insert(
                "additionalProperties".to_string(),
                serde_json::Value::Bool(false),
            );

            if let Some(serde_json::Value::Object(props)) = map.get("properties") {
                let all_keys: Vec<serde_json::Value> = props
                    .keys()
                    .map(|k| serde_json::Value::String(k.clone()))
                    .collect();
                map.insert("required".to_string(), serde_json::Value::Array(all_keys));
            }
        }

        for (_, v) in map.iter_mut() {
            fix_object_schemas(v);
        }
    } else if let serde_json::Value::Array(arr) = value {
        for item in arr.iter_mut() {
            fix_object_schemas(item);
        }
    }
}

/// Replace `$ref` references with the referenced definition, inlined.
fn inline_refs(value: &mut serde_json::Value) {
    let definitions = match value.get("definitions") {
        Some(defs) => defs.clone(),
        None => return,
    };
    inline_refs_inner(value, &definitions);
}

fn inline_refs_inner(value: &mut serde_json::Value, definitions: &serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            if let Some(serde_json::Value::String(reference)) = map.get("$ref") {
                let name = reference.trim_start_matches("#/definitions/").to_string();
                if let Some(def) = definitions.get(&name) {
                    let mut replacement = def.clone();
                    inline_refs_inner(&mut replacement, definitions);
                    *value = replacement;
                    return;
                }
            }
            for (_, v) in map.iter_mut() {
                inline_refs_inner(v, definitions);
            }
        }
        serde_json::Value::Array(arr) => {
            for item in arr.iter_mut() {
                inline_refs_inner(item, definitions);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, JsonSchema)]
    struct Verdict {
        verdict: String,
        confidence: f64,
        signals: Signals,
    }

    #[derive(Debug, Deserialize, JsonSchema)]
    struct Signals {
        phone_match: bool,
        name_match: bool,
    }

    #[test]
    fn schema_has_no_refs_and_closed_objects() {
        let schema = Verdict::tool_schema();
        let rendered = serde_json::to_string(&schema).unwrap();
        assert!(!rendered.contains("$ref"));
        assert_eq!(schema["additionalProperties"], false);
        let required = schema["required"].as_array().unwrap();
        assert_eq!(required.len(), 3);
        // Nested objects are closed too
        assert_eq!(
            schema["properties"]["signals"]["additionalProperties"],
            false
        );
    }

    #[test]
    fn type_name_is_struct_name() {
        assert_eq!(Verdict::type_name(), "Verdict");
    }
}
