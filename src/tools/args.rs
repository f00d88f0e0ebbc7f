//! 参数校验与类型转换
//!
//! 模型给出的参数大多是字符串，按描述里声明的类型转换；
//! 可选参数的 `"none"` / `"null"`（不区分大小写）与 JSON null 视为未提供。
//! 缺少必填参数、出现未声明参数、转换失败都是不可重试错误，且发生在调用工具之前。

use serde_json::{Map, Number, Value};

use super::descriptor::{FunctionDescriptor, ParamSpec, ParamType};
use super::ToolError;

/// 转换后的参数；只包含实际提供的参数
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArgs {
    values: Map<String, Value>,
}

impl ToolArgs {
    pub fn new(values: Map<String, Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.values.get(name).and_then(Value::as_i64)
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        self.values.get(name).and_then(Value::as_f64)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.values.get(name).and_then(Value::as_bool)
    }

    pub fn require_str(&self, name: &str) -> Result<&str, ToolError> {
        self.str(name)
            .ok_or_else(|| ToolError::failed(format!("missing required parameter '{}'", name)))
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.values
    }
}

pub fn coerce(
    descriptor: &FunctionDescriptor,
    raw: &Map<String, Value>,
) -> Result<ToolArgs, ToolError> {
    if let Some(extra) = raw.keys().find(|k| descriptor.get_param(k).is_none()) {
        return Err(ToolError::failed(format!(
            "unexpected parameter '{}' for function '{}'",
            extra, descriptor.name
        )));
    }

    let mut values = Map::new();
    for spec in &descriptor.params {
        let value = raw.get(&spec.name).filter(|v| !is_absent(spec, v));
        match value {
            Some(v) => {
                values.insert(spec.name.clone(), coerce_value(spec, v)?);
            }
            None if spec.required => {
                return Err(ToolError::failed(format!(
                    "missing required parameter '{}' for function '{}'",
                    spec.name, descriptor.name
                )));
            }
            None => {}
        }
    }
    Ok(ToolArgs { values })
}

fn is_absent(spec: &ParamSpec, value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) if !spec.required => {
            let s = s.trim();
            s.eq_ignore_ascii_case("none") || s.eq_ignore_ascii_case("null")
        }
        _ => false,
    }
}

fn coerce_value(spec: &ParamSpec, value: &Value) -> Result<Value, ToolError> {
    let coerced = match (spec.param_type, value) {
        (ParamType::Any, v) => Some(v.clone()),
        (ParamType::String, Value::String(s)) => Some(Value::String(s.clone())),
        (ParamType::String, v) => Some(Value::String(v.to_string())),

        (ParamType::Int, Value::Number(n)) => as_int(n).map(Value::from),
        (ParamType::Int, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),

        (ParamType::Float, Value::Number(n)) => n.as_f64().and_then(float_value),
        (ParamType::Float, Value::String(s)) => {
            s.trim().parse::<f64>().ok().and_then(float_value)
        }

        (ParamType::Bool, Value::Bool(b)) => Some(Value::Bool(*b)),
        (ParamType::Bool, Value::String(s)) => parse_bool(s).map(Value::Bool),
        (ParamType::Bool, Value::Number(n)) => match n.as_i64() {
            Some(1) => Some(Value::Bool(true)),
            Some(0) => Some(Value::Bool(false)),
            _ => None,
        },

        _ => None,
    };
    coerced.ok_or_else(|| {
        ToolError::failed(format!(
            "parameter '{}' expects {}, got {}",
            spec.name, spec.param_type, value
        ))
    })
}

fn as_int(n: &Number) -> Option<i64> {
    n.as_i64().or_else(|| {
        n.as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| f as i64)
    })
}

fn float_value(f: f64) -> Option<Value> {
    Number::from_f64(f).map(Value::Number)
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptor() -> FunctionDescriptor {
        FunctionDescriptor::new("f", "test")
            .required("name", ParamType::String, "")
            .optional("count", ParamType::Int, "")
            .optional("ratio", ParamType::Float, "")
            .optional("flag", ParamType::Bool, "")
    }

    fn raw(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn strings_are_coerced_to_declared_types() {
        let args = coerce(
            &descriptor(),
            &raw(json!({"name": 7, "count": "42", "ratio": "0.5", "flag": "Yes"})),
        )
        .unwrap();
        assert_eq!(args.str("name"), Some("7"));
        assert_eq!(args.int("count"), Some(42));
        assert_eq!(args.float("ratio"), Some(0.5));
        assert_eq!(args.bool("flag"), Some(true));
    }

    #[test]
    fn null_tokens_mean_absent_for_optional() {
        let args = coerce(
            &descriptor(),
            &raw(json!({"name": "x", "count": "null", "ratio": "None", "flag": null})),
        )
        .unwrap();
        assert!(!args.contains("count"));
        assert!(!args.contains("ratio"));
        assert!(!args.contains("flag"));
    }

    #[test]
    fn missing_required_and_undeclared_fail() {
        let err = coerce(&descriptor(), &raw(json!({"count": 1}))).unwrap_err();
        assert!(err.to_string().contains("'name'"));
        assert!(matches!(err, ToolError::Failed { retryable: false, .. }));

        let err = coerce(&descriptor(), &raw(json!({"name": "x", "extra": 1}))).unwrap_err();
        assert!(err.to_string().contains("'extra'"));
    }

    #[test]
    fn coercion_failure_names_parameter() {
        let err = coerce(&descriptor(), &raw(json!({"name": "x", "count": "many"}))).unwrap_err();
        assert!(err.to_string().contains("'count'"));
        let err = coerce(&descriptor(), &raw(json!({"name": "x", "flag": "maybe"}))).unwrap_err();
        assert!(err.to_string().contains("'flag'"));
    }
}
