use crate::configuration::DeepSearchConfig;
use crate::estimate::LineItem;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::env;
use std::fs;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

#[derive(Error, Debug)]
pub enum DeepSearchError {
    #[error("Cannot parse and deserialize model response: {0}")]
    ParseError(String),
    #[error("Cannot find api key in env")]
    EnvError,
    #[error("Client error: {0}")]
    ClientError(String),
    #[error("System prompt construction error:{0}")]
    SystemPromptError(String),
    #[error("API overloaded")]
    OverloadedError,
}

/// Material line item proposed from the project description
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct GeneratedItem {
    /// Short purchasable name, e.g. "5/8 inch drywall sheet"
    pub name: String,
    /// Quantity required for the described project
    pub quantity: f64,
    /// Unit label, e.g. "sheet", "m2", "hour"
    pub unit: String,
    /// Estimated unit price in the contractor's currency
    pub unit_price: f64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct GeneratedItems {
    /// Materials needed for the project
    #[serde(default)]
    pub materials: Vec<GeneratedItem>,
    /// Labor positions needed for the project
    #[serde(default)]
    pub labor: Vec<GeneratedItem>,
}

impl GeneratedItems {
    pub fn into_line_items(self) -> Vec<LineItem> {
        self.materials
            .into_iter()
            .chain(self.labor)
            .map(|item| {
                LineItem::new(&item.name, "", item.quantity, item.unit_price, &item.unit)
            })
            .collect()
    }
}

pub struct DeepSearchService {
    system_prompt: String,
    api_key: String,
    model: String,
    api_url: String,
    client: reqwest::Client,
}

impl DeepSearchService {
    pub fn new(config: &DeepSearchConfig) -> Result<Self, DeepSearchError> {
        let prompt = fs::read_to_string(&config.system_prompt)
            .map_err(|e| DeepSearchError::SystemPromptError(e.to_string()))?;
        let api_key = env::var("ANTHROPIC_API_KEY").map_err(|_| DeepSearchError::EnvError)?;
        Ok(Self::from_parts(
            &prompt,
            &api_key,
            &config.model,
            &config.api_url,
        ))
    }

    pub fn from_parts(system_prompt: &str, api_key: &str, model: &str, api_url: &str) -> Self {
        Self {
            system_prompt: system_prompt.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            api_url: api_url.to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn tool_definitions() -> serde_json::Value {
        let items_schema = schema_for!(GeneratedItems);
        json!([
            {
                "name": "propose_line_items",
                "description": "Propose material and labor line items for a construction project description",
                "input_schema": serde_json::to_value(&items_schema).unwrap_or(json!({})),
            }
        ])
    }

    /// One retry with an enhanced prompt when the model returns something
    /// that does not match the tool schema; anything else surfaces as-is.
    pub async fn generate_items(
        &self,
        project_description: &str,
    ) -> Result<GeneratedItems, DeepSearchError> {
        let mut parse_retry_attempted = false;
        let mut parse_error: String = "".into();

        loop {
            let query_text = if parse_retry_attempted {
                format!(
                    "Project description: {}\nYour response:{}\nYour previous response was not as per input schema. Return ONLY a valid tool call with input matching the exact input schema.",
                    project_description, parse_error
                )
            } else {
                project_description.to_string()
            };

            let response = self.make_api_request(&query_text).await?;
            match Self::parse_response(&response) {
                Ok(items) => return Ok(items),
                Err(DeepSearchError::ParseError(err)) if !parse_retry_attempted => {
                    error!("DeepSearch parse error, will retry with enhanced prompt");
                    parse_retry_attempted = true;
                    parse_error = err;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn make_api_request(&self, query: &str) -> Result<serde_json::Value, DeepSearchError> {
        info!("Requesting line item generation");
        let response = self
            .client
            .post(&self.api_url)
            .timeout(Duration::from_secs(45))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&json!({
                "model": self.model,
                "temperature": 0.0,
                "system": [
                    {
                        "type": "text",
                        "text": self.system_prompt.as_str(),
                    }
                ],
                "max_tokens": 4096,
                "tool_choice": {"type": "any"},
                "tools": Self::tool_definitions(),
                "messages": [{
                    "role": "user",
                    "content": query
                }]
            }))
            .send()
            .await
            .map_err(|e| DeepSearchError::ClientError(e.to_string()))?;

        let json_response: serde_json::Value = response
            .json()
            .await
            .map_err(|e| DeepSearchError::ClientError(e.to_string()))?;

        if let Some(error) = json_response.get("error") {
            let error_type = error
                .get("type")
                .and_then(|t| t.as_str())
                .unwrap_or("unknown");
            let error_message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown");

            return if error_type == "overloaded_error" {
                Err(DeepSearchError::OverloadedError)
            } else if error_type == "invalid_request_error"
                && (error_message.contains("input_schema")
                    || error_message.contains("tool")
                    || error_message.contains("JSON schema"))
            {
                Err(DeepSearchError::ParseError(
                    serde_json::to_string(&json_response)
                        .map_err(|_| DeepSearchError::ParseError("".into()))?,
                ))
            } else {
                Err(DeepSearchError::ClientError(format!(
                    "{}: {}",
                    error_type, error_message
                )))
            };
        }

        Ok(json_response)
    }

    fn parse_response(response: &serde_json::Value) -> Result<GeneratedItems, DeepSearchError> {
        let content_array = response["content"]
            .as_array()
            .ok_or_else(|| DeepSearchError::ParseError("no content array".to_string()))?;

        for content_block in content_array {
            let is_tool_use = content_block
                .get("type")
                .and_then(|t| t.as_str())
                .is_some_and(|t| t == "tool_use");
            if !is_tool_use {
                continue;
            }
            let tool_name = content_block["name"].as_str().unwrap_or("");
            if tool_name != "propose_line_items" {
                continue;
            }
            return serde_json::from_value(content_block["input"].clone())
                .map_err(|e| DeepSearchError::ParseError(e.to_string()));
        }

        Err(DeepSearchError::ParseError(
            "no propose_line_items tool call in response".to_string(),
        ))
    }
}
