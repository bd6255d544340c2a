use async_trait::async_trait;
use serde_json::Value;
use voicegate_core::budget::Budget;
use voicegate_core::deadline::Deadline;
use voicegate_core::errors::CallError;

use super::openai::{chat_body, completion_text};
use super::{CallOptions, ProviderEndpoint, ProviderResult, TextProvider};

pub const RESEARCH: &str = "research";

/// Search-grounded chat completions; sources come back as extras.
#[derive(Clone, Debug)]
pub struct PerplexityProvider {
    endpoint: ProviderEndpoint,
}

impl PerplexityProvider {
    pub fn new(endpoint: ProviderEndpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl TextProvider for PerplexityProvider {
    fn name(&self) -> &str {
        RESEARCH
    }

    async fn call(
        &self,
        prompt: &str,
        budget: &mut Budget,
        options: &CallOptions,
        deadline: &Deadline,
    ) -> Result<ProviderResult, CallError> {
        self.endpoint.pricing().charge_input(budget, RESEARCH, prompt, options)?;
        let api_key = self.endpoint.api_key(RESEARCH)?;

        let request = self
            .endpoint
            .post("chat/completions")
            .bearer_auth(api_key)
            .json(&chat_body(self.endpoint.model(), prompt, options));
        let body = self.endpoint.send_json(RESEARCH, request, deadline).await?;

        let text = completion_text(&body);
        self.endpoint.pricing().charge_output(budget, RESEARCH, &text)?;

        let result = ProviderResult::new(RESEARCH, text);
        Ok(match citations(&body) {
            Some(citations) => result.with_extras(citations),
            None => result,
        })
    }
}

fn citations(body: &Value) -> Option<Value> {
    body.get("citations")
        .filter(|citations| citations.as_array().is_some_and(|items| !items.is_empty()))
        .map(|citations| serde_json::json!({ "citations": citations }))
}
