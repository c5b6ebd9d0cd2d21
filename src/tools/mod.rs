// src/tools/mod.rs: Analysis capabilities callable from a reasoning loop
//
// Every capability declares its parameters up front; the JSON schema handed
// to a model is derived from that declaration, never inferred at runtime.

pub mod executor;
pub mod flash_loan;
pub mod liquidity;
pub mod llm;
pub mod price_lookup;
pub mod registry;
pub mod sanitizer;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::infra::errors::VeriteError;

/// Parameter map passed to a capability.
pub type Params = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
        }
    }

    /// Whether a JSON value is acceptable for this declared type.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Array => value.is_array(),
            ParamType::Object => value.is_object(),
        }
    }
}

/// One declared parameter of a capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub description: String,
    pub required: bool,
    pub default: Option<Value>,
    pub allowed: Option<Vec<Value>>,
}

impl ToolParameter {
    pub fn required(name: &str, param_type: ParamType, description: &str) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: description.into(),
            required: true,
            default: None,
            allowed: None,
        }
    }

    pub fn optional(name: &str, param_type: ParamType, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_enum<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.allowed = Some(values.into_iter().map(Into::into).collect());
        self
    }

    fn property(&self) -> Value {
        let mut prop = json!({
            "type": self.param_type.as_str(),
            "description": self.description,
        });
        if let Some(default) = &self.default {
            prop["default"] = default.clone();
        }
        if let Some(allowed) = &self.allowed {
            prop["enum"] = Value::Array(allowed.clone());
        }
        prop
    }
}

/// Machine-consumable description of a capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSchema {
    pub fn from_parameters(name: &str, description: &str, params: &[ToolParameter]) -> Self {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for p in params {
            properties.insert(p.name.clone(), p.property());
            if p.required {
                required.push(Value::String(p.name.clone()));
            }
        }
        Self {
            name: name.into(),
            description: description.into(),
            parameters: json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }),
        }
    }

    /// OpenAI-style `{"type":"function","function":{...}}` wrapper.
    pub fn to_function_tool(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// Outcome of one capability invocation. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub data: Value,
    pub error: Option<String>,
    pub tool_name: String,
}

impl ToolResult {
    pub fn ok(tool_name: &str, data: Value) -> Self {
        Self {
            success: true,
            data,
            error: None,
            tool_name: tool_name.into(),
        }
    }

    pub fn failure(tool_name: &str, error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Value::Object(Map::new()),
            error: Some(error.into()),
            tool_name: tool_name.into(),
        }
    }
}

/// A unit of analysis work with a declared parameter list.
///
/// Implementations must be safe to call concurrently; any state they keep
/// (caches, clients) has to tolerate parallel batches.
#[async_trait]
pub trait Capability: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters(&self) -> Vec<ToolParameter>;

    async fn execute(&self, params: &Params) -> Result<ToolResult, VeriteError>;

    fn schema(&self) -> ToolSchema {
        ToolSchema::from_parameters(self.name(), self.description(), &self.parameters())
    }
}

/// Check required parameters, types and enums, and fill declared defaults.
pub fn prepare_params(declared: &[ToolParameter], given: &Params) -> Result<Params, VeriteError> {
    let mut params = given.clone();
    for p in declared {
        match params.get(&p.name) {
            Some(Value::Null) | None => {
                if let Some(default) = &p.default {
                    params.insert(p.name.clone(), default.clone());
                } else if p.required {
                    return Err(VeriteError::invalid_param(&p.name, "missing required parameter"));
                }
            }
            Some(value) => {
                if !p.param_type.accepts(value) {
                    return Err(VeriteError::invalid_param(
                        &p.name,
                        format!("expected {}", p.param_type.as_str()),
                    ));
                }
                if let Some(allowed) = &p.allowed {
                    if !allowed.contains(value) {
                        return Err(VeriteError::invalid_param(
                            &p.name,
                            format!("{value} is not one of {}", Value::Array(allowed.clone())),
                        ));
                    }
                }
            }
        }
    }
    Ok(params)
}

// ─── Param accessors shared by the builtin capabilities ─────────────────────

pub(crate) fn str_param<'a>(params: &'a Params, name: &str) -> Result<&'a str, VeriteError> {
    params
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| VeriteError::invalid_param(name, "expected string"))
}

pub(crate) fn u64_param(params: &Params, name: &str) -> Result<u64, VeriteError> {
    params
        .get(name)
        .and_then(Value::as_u64)
        .ok_or_else(|| VeriteError::invalid_param(name, "expected non-negative integer"))
}

pub(crate) fn f64_param(params: &Params, name: &str) -> Result<f64, VeriteError> {
    params
        .get(name)
        .and_then(Value::as_f64)
        .ok_or_else(|| VeriteError::invalid_param(name, "expected number"))
}
