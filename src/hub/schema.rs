//! JSON Schema（inputSchema）到参数描述的转换

use serde_json::Value;

use crate::tools::{ParamSpec, ParamType};

/// integer -> int, number -> float, boolean -> bool, string -> string, 其余 -> any
pub fn param_type(schema: &Value) -> ParamType {
    let ty = match schema.get("type") {
        Some(Value::String(s)) => Some(s.as_str()),
        // ["string", "null"] 之类的联合类型取第一个非 null
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .find(|t| *t != "null"),
        _ => None,
    };
    match ty {
        Some("integer") => ParamType::Int,
        Some("number") => ParamType::Float,
        Some("boolean") => ParamType::Bool,
        Some("string") => ParamType::String,
        _ => ParamType::Any,
    }
}

/// properties 按声明顺序展开（serde_json 启用 preserve_order）
pub fn params_from_schema(schema: Option<&Value>) -> Vec<ParamSpec> {
    let Some(schema) = schema else {
        return Vec::new();
    };
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| {
            props
                .iter()
                .map(|(name, prop)| ParamSpec {
                    name: name.clone(),
                    param_type: param_type(prop),
                    required: required.contains(&name.as_str()),
                    description: prop
                        .get("description")
                        .or_else(|| prop.get("title"))
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn maps_schema_types_and_required() {
        let schema = json!({
            "type": "object",
            "properties": {
                "count": {"type": "integer", "title": "Count"},
                "ratio": {"type": "number"},
                "tz": {"type": ["string", "null"], "description": "Time zone"},
                "opts": {"type": "object"}
            },
            "required": ["count"]
        });
        let params = params_from_schema(Some(&schema));
        let get = |n: &str| params.iter().find(|p| p.name == n).unwrap();
        assert_eq!(get("count").param_type, ParamType::Int);
        assert!(get("count").required);
        assert_eq!(get("count").description, "Count");
        assert_eq!(get("ratio").param_type, ParamType::Float);
        assert_eq!(get("tz").param_type, ParamType::String);
        assert!(!get("tz").required);
        assert_eq!(get("opts").param_type, ParamType::Any);
    }

    #[test]
    fn keeps_declared_property_order() {
        let raw = r#"{"properties": {"zone": {"type": "string"}, "count": {"type": "integer"}, "as_of": {}}}"#;
        let schema: Value = serde_json::from_str(raw).unwrap();
        let names: Vec<String> = params_from_schema(Some(&schema))
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["zone", "count", "as_of"]);
    }

    #[test]
    fn missing_schema_means_no_params() {
        assert!(params_from_schema(None).is_empty());
    }
}
