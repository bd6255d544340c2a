use async_trait::async_trait;
use serde_json::{json, Value};
use voicegate_core::budget::Budget;
use voicegate_core::deadline::Deadline;
use voicegate_core::errors::CallError;

use super::{CallOptions, ProviderEndpoint, ProviderResult, TextProvider};

pub const CODE_OPS: &str = "code_ops";

const API_VERSION: &str = "2023-06-01";

/// Messages-API backend answering code and operations questions.
#[derive(Clone, Debug)]
pub struct AnthropicProvider {
    endpoint: ProviderEndpoint,
}

impl AnthropicProvider {
    pub fn new(endpoint: ProviderEndpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl TextProvider for AnthropicProvider {
    fn name(&self) -> &str {
        CODE_OPS
    }

    async fn call(
        &self,
        prompt: &str,
        budget: &mut Budget,
        options: &CallOptions,
        deadline: &Deadline,
    ) -> Result<ProviderResult, CallError> {
        self.endpoint.pricing().charge_input(budget, CODE_OPS, prompt, options)?;
        let api_key = self.endpoint.api_key(CODE_OPS)?;

        let request = self
            .endpoint
            .post("messages")
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&messages_body(self.endpoint.model(), prompt, options));
        let body = self.endpoint.send_json(CODE_OPS, request, deadline).await?;

        let text = content_text(&body);
        self.endpoint.pricing().charge_output(budget, CODE_OPS, &text)?;
        Ok(ProviderResult::new(CODE_OPS, text))
    }
}

fn messages_body(model: &str, prompt: &str, options: &CallOptions) -> Value {
    let mut body = json!({
        "model": model,
        "max_tokens": options.max_output_units,
        "messages": [{"role": "user", "content": prompt}],
    });
    if let Some(system_prompt) = &options.system_prompt {
        body["system"] = Value::String(system_prompt.clone());
    }
    body
}

/// Joins every `text` block; tool-use and other block types are skipped.
fn content_text(body: &Value) -> String {
    body["content"]
        .as_array()
        .map(|blocks| {
            blocks
                .iter()
                .filter(|block| block["type"] == "text")
                .filter_map(|block| block["text"].as_str())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
        .trim()
        .to_string()
}
