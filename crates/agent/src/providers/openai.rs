use async_trait::async_trait;
use serde_json::{json, Value};
use voicegate_core::budget::Budget;
use voicegate_core::deadline::Deadline;
use voicegate_core::errors::CallError;

use super::{CallOptions, ProviderEndpoint, ProviderResult, TextProvider};

pub const CONVERSATIONAL: &str = "conversational";

/// Chat-completions backend answering the conversational class.
#[derive(Clone, Debug)]
pub struct OpenAiProvider {
    endpoint: ProviderEndpoint,
}

impl OpenAiProvider {
    pub fn new(endpoint: ProviderEndpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl TextProvider for OpenAiProvider {
    fn name(&self) -> &str {
        CONVERSATIONAL
    }

    async fn call(
        &self,
        prompt: &str,
        budget: &mut Budget,
        options: &CallOptions,
        deadline: &Deadline,
    ) -> Result<ProviderResult, CallError> {
        self.endpoint.pricing().charge_input(budget, CONVERSATIONAL, prompt, options)?;
        let api_key = self.endpoint.api_key(CONVERSATIONAL)?;

        let request = self
            .endpoint
            .post("chat/completions")
            .bearer_auth(api_key)
            .json(&chat_body(self.endpoint.model(), prompt, options));
        let body = self.endpoint.send_json(CONVERSATIONAL, request, deadline).await?;

        let text = completion_text(&body);
        self.endpoint.pricing().charge_output(budget, CONVERSATIONAL, &text)?;
        Ok(ProviderResult::new(CONVERSATIONAL, text))
    }
}

pub(crate) fn chat_body(model: &str, prompt: &str, options: &CallOptions) -> Value {
    let mut messages = Vec::with_capacity(2);
    if let Some(system_prompt) = &options.system_prompt {
        messages.push(json!({"role": "system", "content": system_prompt}));
    }
    messages.push(json!({"role": "user", "content": prompt}));

    json!({
        "model": model,
        "messages": messages,
        "max_tokens": options.max_output_units,
    })
}

/// `choices[0].message.content`, or empty when the envelope has no text.
pub(crate) fn completion_text(body: &Value) -> String {
    body["choices"][0]["message"]["content"].as_str().unwrap_or_default().trim().to_string()
}
