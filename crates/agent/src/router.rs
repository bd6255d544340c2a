use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use voicegate_core::budget::Budget;
use voicegate_core::deadline::Deadline;
use voicegate_core::errors::CallError;
use voicegate_core::intent::IntentClass;
use voicegate_core::payload::CallPayload;

use crate::providers::{CallOptions, ProviderResult, TextProvider};

pub const ROUTING_STAGE: &str = "routing";

const CONVERSATIONAL_PROMPT: &str = "You are a friendly phone assistant. Answer in two or three \
    short sentences that sound natural when read aloud. Do not use lists, markdown or URLs.";
const CODE_OPS_PROMPT: &str = "You are an on-call engineering assistant answering over the \
    phone. Give the most likely cause and the next concrete step in plain spoken language. \
    Never read out code blocks.";
const RESEARCH_PROMPT: &str = "Research the caller's question and return a compact factual \
    digest with the key figures and dates.";
const SUMMARIZE_PROMPT: &str = "You turn research notes into a short answer for a phone \
    caller. Use at most three sentences and no citations, lists or URLs.";

/// One backend plus the options it is called with.
#[derive(Clone)]
pub struct RouteTarget {
    pub provider: Arc<dyn TextProvider>,
    pub options: CallOptions,
}

impl RouteTarget {
    pub fn new(provider: Arc<dyn TextProvider>, options: CallOptions) -> Self {
        Self { provider, options }
    }
}

#[derive(Clone)]
pub struct IntentRouter {
    conversational: RouteTarget,
    code_ops: RouteTarget,
    research: RouteTarget,
    summarize: CallOptions,
    stage_timeout: Duration,
}

impl IntentRouter {
    pub fn new(
        conversational: RouteTarget,
        code_ops: RouteTarget,
        research: RouteTarget,
        summarize: CallOptions,
        stage_timeout: Duration,
    ) -> Self {
        Self { conversational, code_ops, research, summarize, stage_timeout }
    }

    /// Wires each provider with its default system prompt and output cap.
    pub fn with_default_prompts(
        conversational: (Arc<dyn TextProvider>, u32),
        code_ops: (Arc<dyn TextProvider>, u32),
        research: (Arc<dyn TextProvider>, u32),
        stage_timeout: Duration,
    ) -> Self {
        let (conversational, conversational_units) = conversational;
        let (code_ops, code_ops_units) = code_ops;
        let (research, research_units) = research;
        Self::new(
            RouteTarget::new(
                conversational,
                CallOptions::new(CONVERSATIONAL_PROMPT, conversational_units),
            ),
            RouteTarget::new(code_ops, CallOptions::new(CODE_OPS_PROMPT, code_ops_units)),
            RouteTarget::new(research, CallOptions::new(RESEARCH_PROMPT, research_units)),
            CallOptions::new(SUMMARIZE_PROMPT, conversational_units),
            stage_timeout,
        )
    }

    pub fn stage_timeout(&self) -> Duration {
        self.stage_timeout
    }

    /// Answers one utterance. Both research stages share `budget` and the single stage
    /// deadline; any failure is returned as is, without retries.
    pub async fn route(
        &self,
        payload: &CallPayload,
        budget: &mut Budget,
    ) -> Result<ProviderResult, CallError> {
        let class = IntentClass::classify(payload.intent.as_deref());
        let deadline = Deadline::after(self.stage_timeout);
        debug!(
            event_name = "voice.route.selected",
            correlation_id = %payload.call_id,
            intent_class = class.as_str(),
            "intent classified"
        );

        let stage = self.dispatch(class, &payload.utterance, budget, &deadline);
        match tokio::time::timeout(self.stage_timeout, stage).await {
            Ok(result) => result,
            Err(_) => Err(CallError::timeout(ROUTING_STAGE, deadline.limit_ms())),
        }
    }

    async fn dispatch(
        &self,
        class: IntentClass,
        utterance: &str,
        budget: &mut Budget,
        deadline: &Deadline,
    ) -> Result<ProviderResult, CallError> {
        match class {
            IntentClass::Conversational | IntentClass::Unclassified => {
                call(&self.conversational, utterance, budget, deadline).await
            }
            IntentClass::CodeOps => call(&self.code_ops, utterance, budget, deadline).await,
            IntentClass::Research => {
                self.research_then_summarize(utterance, budget, deadline).await
            }
        }
    }

    async fn research_then_summarize(
        &self,
        utterance: &str,
        budget: &mut Budget,
        deadline: &Deadline,
    ) -> Result<ProviderResult, CallError> {
        let digest = call(&self.research, utterance, budget, deadline).await?;
        let prompt = format!(
            "Caller question: {utterance}\n\nResearch digest:\n{}\n\n\
             Condense the digest into a short spoken answer.",
            digest.text
        );

        let summary = self
            .conversational
            .provider
            .call(&prompt, budget, &self.summarize, deadline)
            .await?;
        Ok(match digest.extras {
            Some(extras) => summary.with_extras(extras),
            None => summary,
        })
    }
}

async fn call(
    target: &RouteTarget,
    prompt: &str,
    budget: &mut Budget,
    deadline: &Deadline,
) -> Result<ProviderResult, CallError> {
    debug!(
        event_name = "voice.route.dispatched",
        provider = target.provider.name(),
        spent_cents = %budget.spent(),
        "calling provider"
    );
    target.provider.call(prompt, budget, &target.options, deadline).await
}
