//! Static tool descriptor: name, description, parameter schema, required set.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::llm::ToolDef;

/// Descriptor advertised to the model for one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    /// Parameter name -> `{type, description, ...constraints}`.
    pub parameters: Map<String, Value>,
    pub required: Vec<String>,
}

impl ToolInfo {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Map::new(),
            required: Vec::new(),
        }
    }

    /// Add a parameter of JSON type `type_`.
    pub fn param(self, name: &str, type_: &str, description: &str, required: bool) -> Self {
        self.param_schema(
            name,
            json!({ "type": type_, "description": description }),
            required,
        )
    }

    /// Add a parameter with a full schema fragment (enums, bounds, ...).
    pub fn param_schema(mut self, name: &str, schema: Value, required: bool) -> Self {
        self.parameters.insert(name.to_string(), schema);
        if required && !self.required.iter().any(|r| r == name) {
            self.required.push(name.to_string());
        }
        self
    }

    /// JSON-Schema object for the tool's input.
    pub fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": Value::Object(self.parameters.clone()),
            "required": self.required,
        })
    }

    /// Required parameters missing from the `parameters` map.
    pub fn undeclared_required(&self) -> Vec<&str> {
        self.required
            .iter()
            .filter(|r| !self.parameters.contains_key(r.as_str()))
            .map(String::as_str)
            .collect()
    }

    /// Provider tool definition (OpenAI function shape).
    pub fn to_tool_def(&self) -> ToolDef {
        ToolDef::function(self.name.clone(), self.description.clone(), self.schema())
    }
}
