//! Text-generation backends behind one contract.
//!
//! Every adapter charges the prompt against the budget before it touches the network,
//! issues exactly one request bounded by `min(call_timeout, deadline.remaining())`, and
//! charges the answer after a successful response. Callers only ever see `ProviderResult`.

pub mod anthropic;
pub mod openai;
pub mod perplexity;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use voicegate_core::budget::{Budget, CharacterHeuristic, CostEstimator, RateCard};
use voicegate_core::config::ProviderConfig;
use voicegate_core::deadline::Deadline;
use voicegate_core::errors::CallError;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;
pub use perplexity::PerplexityProvider;

const MAX_ERROR_BODY_CHARS: usize = 300;

#[derive(Clone, Debug, PartialEq)]
pub struct ProviderResult {
    /// Trimmed. May be empty; an empty answer is "no usable answer", not an error.
    pub text: String,
    pub provider: String,
    pub extras: Option<Value>,
}

impl ProviderResult {
    pub fn new(provider: impl Into<String>, text: impl AsRef<str>) -> Self {
        Self { text: text.as_ref().trim().to_string(), provider: provider.into(), extras: None }
    }

    pub fn with_extras(mut self, extras: Value) -> Self {
        self.extras = Some(extras);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallOptions {
    pub system_prompt: Option<String>,
    pub max_output_units: u32,
}

impl CallOptions {
    pub fn new(system_prompt: impl Into<String>, max_output_units: u32) -> Self {
        Self { system_prompt: Some(system_prompt.into()), max_output_units }
    }
}

#[async_trait]
pub trait TextProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn call(
        &self,
        prompt: &str,
        budget: &mut Budget,
        options: &CallOptions,
        deadline: &Deadline,
    ) -> Result<ProviderResult, CallError>;
}

/// Rates plus the estimation policy used to turn text into a charge.
#[derive(Clone)]
pub struct Pricing {
    rates: RateCard,
    estimator: Arc<dyn CostEstimator>,
}

impl Pricing {
    pub fn new(rates: RateCard, estimator: Arc<dyn CostEstimator>) -> Self {
        Self { rates, estimator }
    }

    pub fn charge_input(
        &self,
        budget: &mut Budget,
        provider: &str,
        prompt: &str,
        options: &CallOptions,
    ) -> Result<(), CallError> {
        let mut units = self.estimator.estimate_units(prompt);
        if let Some(system_prompt) = &options.system_prompt {
            units += self.estimator.estimate_units(system_prompt);
        }
        budget.charge(self.rates.input_cost(units), format!("{provider} input"))?;
        Ok(())
    }

    pub fn charge_output(
        &self,
        budget: &mut Budget,
        provider: &str,
        text: &str,
    ) -> Result<(), CallError> {
        let units = self.estimator.estimate_units(text);
        budget.charge(self.rates.output_cost(units), format!("{provider} output"))?;
        Ok(())
    }
}

impl std::fmt::Debug for Pricing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pricing").field("rates", &self.rates).finish_non_exhaustive()
    }
}

/// Connection details shared by the HTTP adapters.
#[derive(Clone, Debug)]
pub struct ProviderEndpoint {
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
    call_timeout: Duration,
    pricing: Pricing,
}

impl ProviderEndpoint {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        api_key: Option<SecretString>,
        model: impl Into<String>,
        call_timeout: Duration,
        pricing: Pricing,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key,
            model: model.into(),
            call_timeout,
            pricing,
        }
    }

    pub fn from_config(
        client: Client,
        config: &ProviderConfig,
        call_timeout: Duration,
        estimator: Arc<dyn CostEstimator>,
    ) -> Self {
        Self::new(
            client,
            config.base_url.clone(),
            config.api_key.clone(),
            config.model.clone(),
            call_timeout,
            Pricing::new(config.rate_card(), estimator),
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn pricing(&self) -> &Pricing {
        &self.pricing
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    /// Missing credentials surface here, at call time, as a provider error.
    pub fn api_key(&self, provider: &str) -> Result<&str, CallError> {
        self.api_key
            .as_ref()
            .map(|key| key.expose_secret())
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| CallError::provider(provider, None, "missing api credentials"))
    }

    pub fn post(&self, path: &str) -> RequestBuilder {
        self.client.post(self.url(path))
    }

    /// Sends `request` and decodes a JSON body, all within the tighter of the two timeouts.
    pub async fn send_json(
        &self,
        provider: &str,
        request: RequestBuilder,
        deadline: &Deadline,
    ) -> Result<Value, CallError> {
        let limit = deadline.bound(self.call_timeout).ok_or_else(|| {
            CallError::timeout(format!("{provider} call"), deadline.limit_ms())
        })?;
        let limit_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);

        match tokio::time::timeout(limit, exchange(provider, request)).await {
            Ok(result) => result,
            Err(_) => Err(CallError::timeout(format!("{provider} call"), limit_ms)),
        }
    }
}

async fn exchange(provider: &str, request: RequestBuilder) -> Result<Value, CallError> {
    let response = request
        .send()
        .await
        .map_err(|error| CallError::provider(provider, None, error.to_string()))?;
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(CallError::provider(provider, Some(status.as_u16()), truncate_body(&body)));
    }

    response.json::<Value>().await.map_err(|error| {
        let detail = format!("invalid response body: {error}");
        CallError::provider(provider, Some(status.as_u16()), detail)
    })
}

pub fn truncate_body(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

pub fn default_estimator(chars_per_unit: u32) -> Arc<dyn CostEstimator> {
    Arc::new(CharacterHeuristic { chars_per_unit })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;
    use voicegate_core::budget::{Budget, CharacterHeuristic, RateCard};
    use voicegate_core::errors::{BudgetError, CallError};

    use super::{truncate_body, CallOptions, Pricing, ProviderResult};

    fn pricing(input: i64, output: i64) -> Pricing {
        Pricing::new(
            RateCard::new(Decimal::new(input, 0), Decimal::new(output, 0)),
            Arc::new(CharacterHeuristic::default()),
        )
    }

    #[test]
    fn input_charge_counts_the_system_prompt_too() {
        let mut budget = Budget::new(Decimal::new(100, 0));
        let options = CallOptions::new("abcd", 10);

        pricing(1000, 0)
            .charge_input(&mut budget, "conversational", "abcdefgh", &options)
            .expect("charge should fit");

        // 2 units of prompt + 1 unit of system prompt at 1 cent per unit
        assert_eq!(budget.spent(), Decimal::new(3, 0));
        assert_eq!(budget.charges()[0].reason, "conversational input");
    }

    #[test]
    fn refused_input_charge_surfaces_as_budget_error() {
        let mut budget = Budget::new(Decimal::ONE);
        let options = CallOptions { system_prompt: None, max_output_units: 10 };

        let error = pricing(1000, 0)
            .charge_input(&mut budget, "research", &"x".repeat(400), &options)
            .expect_err("charge should be refused");

        assert!(matches!(error, CallError::Budget(BudgetError::Exceeded { .. })));
        assert_eq!(budget.spent(), Decimal::ZERO);
    }

    #[test]
    fn output_charge_uses_output_rate() {
        let mut budget = Budget::new(Decimal::new(100, 0));

        pricing(0, 2000).charge_output(&mut budget, "code", "abcd").expect("charge should fit");

        assert_eq!(budget.spent(), Decimal::new(2, 0));
    }

    #[test]
    fn error_bodies_are_truncated() {
        assert_eq!(truncate_body(&"é".repeat(500)).chars().count(), 300);
        assert_eq!(truncate_body("short"), "short");
    }

    #[test]
    fn blank_text_counts_as_empty_result() {
        assert!(ProviderResult::new("conversational", "  \n").is_empty());
        assert!(!ProviderResult::new("conversational", "hi").is_empty());
    }

    #[test]
    fn answer_text_is_trimmed_once_at_construction() {
        let result = ProviderResult::new("code_ops", "\n  Restart the worker.  \n");

        assert_eq!(result.text, "Restart the worker.");
    }
}
