//! 工具函数描述：参数名、类型、是否必填、调用方式
//!
//! 描述在工具构造时一次性建立，注册后不可变；ToolCatalog 用它生成 prompt 文本并校验/转换参数。

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ToolError;
use crate::protocol::SEPARATOR;

/// 声明的参数类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Int,
    Float,
    Bool,
    /// 不做转换，原样传递（远程工具的 object/array 参数）
    Any,
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParamType::String => "string",
            ParamType::Int => "int",
            ParamType::Float => "float",
            ParamType::Bool => "bool",
            ParamType::Any => "any",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub param_type: ParamType,
    pub required: bool,
    pub description: String,
}

/// 调用方式：Inline 在当前 async 任务中 await，Blocking 放到 blocking 线程池
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStyle {
    #[default]
    Inline,
    Blocking,
}

/// 调用超时：默认沿用目录的统一超时；等人回答的函数不设上限，自带重试的函数给出更宽的预算
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallTimeout {
    #[default]
    Catalog,
    Secs(u64),
    Unbounded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    pub name: String,
    pub description: String,
    /// 保持声明顺序
    pub params: Vec<ParamSpec>,
    pub style: CallStyle,
    #[serde(default)]
    pub timeout: CallTimeout,
}

impl FunctionDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
            style: CallStyle::Inline,
            timeout: CallTimeout::Catalog,
        }
    }

    pub fn param(
        mut self,
        name: impl Into<String>,
        param_type: ParamType,
        required: bool,
        description: impl Into<String>,
    ) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            param_type,
            required,
            description: description.into(),
        });
        self
    }

    pub fn required(
        self,
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
    ) -> Self {
        self.param(name, param_type, true, description)
    }

    pub fn optional(
        self,
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
    ) -> Self {
        self.param(name, param_type, false, description)
    }

    pub fn blocking(mut self) -> Self {
        self.style = CallStyle::Blocking;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = CallTimeout::Secs(secs);
        self
    }

    pub fn no_timeout(mut self) -> Self {
        self.timeout = CallTimeout::Unbounded;
        self
    }

    pub fn get_param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// 注册前的自检：名称非空、函数名不含分隔符、参数不重名
    pub fn validate(&self) -> Result<(), ToolError> {
        if self.name.trim().is_empty() {
            return Err(ToolError::Implementation(
                "function name must not be empty".to_string(),
            ));
        }
        if self.name.contains(SEPARATOR) {
            return Err(ToolError::Implementation(format!(
                "function name '{}' must not contain '{}'",
                self.name, SEPARATOR
            )));
        }
        for (i, p) in self.params.iter().enumerate() {
            if p.name.trim().is_empty() {
                return Err(ToolError::Implementation(format!(
                    "function '{}' has a parameter with an empty name",
                    self.name
                )));
            }
            if self.params[..i].iter().any(|q| q.name == p.name) {
                return Err(ToolError::Implementation(format!(
                    "function '{}' declares parameter '{}' twice",
                    self.name, p.name
                )));
            }
        }
        Ok(())
    }

    /// prompt 中的一段：
    ///
    /// ```text
    /// ## tool.function
    /// Description: ...
    /// Parameters:
    /// - name: (type, required): description
    /// ```
    pub fn describe(&self, tool_name: &str) -> String {
        let mut out = format!(
            "## {}{}{}\nDescription: {}\nParameters:\n",
            tool_name, SEPARATOR, self.name, self.description
        );
        if self.params.is_empty() {
            out.push_str("None\n");
        }
        for p in &self.params {
            out.push_str(&format!(
                "- {}: ({}, {}): {}\n",
                p.name,
                p.param_type,
                if p.required { "required" } else { "optional" },
                p.description
            ));
        }
        out
    }
}
