use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use rust_decimal::Decimal;
use tracing::{error, info, warn};
use voicegate_core::budget::Budget;
use voicegate_core::config::{AppConfig, BudgetConfig, ProviderConfig};
use voicegate_core::errors::CallError;
use voicegate_core::payload::CallPayload;

use crate::composer::{compose, needs_synthesis, CallOutcome, ComposeDecision};
use crate::providers::{
    default_estimator, AnthropicProvider, OpenAiProvider, PerplexityProvider, ProviderEndpoint,
    TextProvider,
};
use crate::router::IntentRouter;
use crate::speech::{ElevenLabsSynthesizer, SpeechSynthesizer};

const OVERALL_SLACK: Duration = Duration::from_secs(1);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallReport {
    pub decision: ComposeDecision,
    pub spent: Decimal,
    pub ceiling: Decimal,
}

/// Runs one verified call: route under the budget, synthesize, compose.
#[derive(Clone)]
pub struct CallPipeline {
    router: IntentRouter,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    budget: BudgetConfig,
    synthesis_timeout: Duration,
}

impl CallPipeline {
    pub fn new(
        router: IntentRouter,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        budget: BudgetConfig,
        synthesis_timeout: Duration,
    ) -> Self {
        Self { router, synthesizer, budget, synthesis_timeout }
    }

    pub fn from_config(config: &AppConfig, client: Client) -> Self {
        let estimator = default_estimator(config.budget.chars_per_unit);
        let providers = &config.providers;
        let endpoint = |provider: &ProviderConfig| {
            ProviderEndpoint::from_config(
                client.clone(),
                provider,
                providers.call_timeout(),
                Arc::clone(&estimator),
            )
        };

        let conversational: Arc<dyn TextProvider> =
            Arc::new(OpenAiProvider::new(endpoint(&providers.conversational)));
        let code_ops: Arc<dyn TextProvider> =
            Arc::new(AnthropicProvider::new(endpoint(&providers.code)));
        let research: Arc<dyn TextProvider> =
            Arc::new(PerplexityProvider::new(endpoint(&providers.research)));

        let router = IntentRouter::with_default_prompts(
            (conversational, providers.conversational.max_output_units),
            (code_ops, providers.code.max_output_units),
            (research, providers.research.max_output_units),
            providers.stage_timeout(),
        );
        let synthesizer = Arc::new(ElevenLabsSynthesizer::from_config(client, &config.speech));

        Self::new(router, synthesizer, config.budget.clone(), config.speech.timeout())
    }

    /// Upper bound for `answer`: both stage deadlines plus a little overhead.
    pub fn overall_timeout(&self) -> Duration {
        self.router.stage_timeout() + self.synthesis_timeout + OVERALL_SLACK
    }

    pub async fn answer(&self, payload: &CallPayload) -> CallReport {
        let ceiling = self.budget.ceiling_for(payload.ceiling_override);
        let mut budget = Budget::new(ceiling);
        let call_id = payload.call_id.as_str();

        let outcome = match self.router.route(payload, &mut budget).await {
            Err(route_error) => {
                log_route_failure(call_id, &route_error, &budget);
                CallOutcome::RouteFailed(route_error)
            }
            Ok(result) if !needs_synthesis(&result) => {
                warn!(
                    event_name = "voice.route.empty_answer",
                    correlation_id = %call_id,
                    provider = %result.provider,
                    "provider returned no usable text"
                );
                CallOutcome::Answered { result, audio: None }
            }
            Ok(result) => {
                let audio = self.synthesizer.synthesize(&result.text, call_id).await;
                if let Err(synthesis_error) = &audio {
                    warn!(
                        event_name = "voice.speech.failed",
                        correlation_id = %call_id,
                        error_kind = synthesis_error.kind(),
                        error = %synthesis_error,
                        "speech synthesis failed; answering with spoken text"
                    );
                }
                CallOutcome::Answered { result, audio: Some(audio) }
            }
        };

        let decision = compose(outcome);
        info!(
            event_name = "voice.call.composed",
            correlation_id = %call_id,
            response_shape = decision.response().shape(),
            reason_code = decision.reason_code().unwrap_or("none"),
            spent_cents = %budget.spent(),
            ceiling_cents = %ceiling,
            "call answered"
        );

        CallReport { decision, spent: budget.spent(), ceiling }
    }
}

fn log_route_failure(call_id: &str, route_error: &CallError, budget: &Budget) {
    match route_error {
        CallError::Budget(_) | CallError::Timeout { .. } => warn!(
            event_name = "voice.route.failed",
            correlation_id = %call_id,
            error_kind = route_error.kind(),
            error = %route_error,
            spent_cents = %budget.spent(),
            "routing failed; answering with fallback message"
        ),
        _ => error!(
            event_name = "voice.route.failed",
            correlation_id = %call_id,
            error_kind = route_error.kind(),
            error = %route_error,
            spent_cents = %budget.spent(),
            "routing failed; answering with fallback message"
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use voicegate_core::budget::Budget;
    use voicegate_core::config::AppConfig;
    use voicegate_core::deadline::Deadline;
    use voicegate_core::errors::{CallError, FALLBACK_MESSAGE};
    use voicegate_core::markup::VoiceResponse;
    use voicegate_core::payload::CallPayload;

    use super::CallPipeline;
    use crate::providers::{CallOptions, ProviderResult, TextProvider};
    use crate::router::IntentRouter;
    use crate::speech::{AudioReference, SpeechSynthesizer};

    struct FixedProvider {
        text: &'static str,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TextProvider for FixedProvider {
        fn name(&self) -> &str {
            "conversational"
        }

        async fn call(
            &self,
            _prompt: &str,
            budget: &mut Budget,
            _options: &CallOptions,
            _deadline: &Deadline,
        ) -> Result<ProviderResult, CallError> {
            budget.charge(Decimal::new(2, 0), "conversational input")?;
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ProviderResult::new("conversational", self.text))
        }
    }

    struct FixedSynthesizer {
        fail: bool,
        calls: Arc<AtomicUsize>,
        texts: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl SpeechSynthesizer for FixedSynthesizer {
        async fn synthesize(&self, text: &str, prefix: &str) -> Result<AudioReference, CallError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.texts.lock().expect("text log").push(text.to_string());
            if self.fail {
                return Err(CallError::synthesis("upstream returned 503"));
            }
            let file_name = format!("{prefix}-1.mp3");
            Ok(AudioReference {
                url: format!("https://voice.example.com/audio/{file_name}"),
                path: PathBuf::from(&file_name),
                file_name,
            })
        }
    }

    struct Harness {
        pipeline: CallPipeline,
        provider_calls: Arc<AtomicUsize>,
        synthesis_calls: Arc<AtomicUsize>,
        synthesized: Arc<Mutex<Vec<String>>>,
    }

    fn harness(answer: &'static str, synthesis_fails: bool) -> Harness {
        let provider_calls = Arc::new(AtomicUsize::new(0));
        let synthesis_calls = Arc::new(AtomicUsize::new(0));
        let synthesized = Arc::new(Mutex::new(Vec::new()));
        let provider = || -> Arc<dyn TextProvider> {
            Arc::new(FixedProvider { text: answer, calls: Arc::clone(&provider_calls) })
        };
        let router = IntentRouter::with_default_prompts(
            (provider(), 100),
            (provider(), 100),
            (provider(), 100),
            Duration::from_secs(8),
        );
        let synthesizer = Arc::new(FixedSynthesizer {
            fail: synthesis_fails,
            calls: Arc::clone(&synthesis_calls),
            texts: Arc::clone(&synthesized),
        });
        let config = AppConfig::default();

        Harness {
            pipeline: CallPipeline::new(
                router,
                synthesizer,
                config.budget,
                config.speech.timeout(),
            ),
            provider_calls,
            synthesis_calls,
            synthesized,
        }
    }

    fn payload(ceiling_override: Option<Decimal>) -> CallPayload {
        CallPayload {
            utterance: "When are you open?".to_string(),
            intent: None,
            call_id: "CA42".to_string(),
            ceiling_override,
        }
    }

    #[tokio::test]
    async fn answered_and_synthesized_call_plays_audio() {
        let harness = harness("We're open nine to five", false);

        let report = harness.pipeline.answer(&payload(None)).await;

        assert_eq!(
            report.decision.into_response(),
            VoiceResponse::play("https://voice.example.com/audio/CA42-1.mp3")
        );
        assert_eq!(report.ceiling, Decimal::new(50, 0));
        assert_eq!(report.spent, Decimal::new(2, 0));
    }

    #[tokio::test]
    async fn failed_synthesis_speaks_the_answer() {
        let harness = harness("We're open nine to five", true);

        let report = harness.pipeline.answer(&payload(None)).await;

        assert_eq!(report.decision.into_response(), VoiceResponse::say("We're open nine to five"));
        assert_eq!(harness.synthesis_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn synthesis_and_spoken_fallback_use_the_same_trimmed_text() {
        let harness = harness("\n  We're open nine to five.  \n", true);

        let report = harness.pipeline.answer(&payload(None)).await;

        assert_eq!(
            harness.synthesized.lock().expect("text log").as_slice(),
            ["We're open nine to five.".to_string()]
        );
        assert_eq!(report.decision.into_response(), VoiceResponse::say("We're open nine to five."));
    }

    #[tokio::test]
    async fn empty_answer_skips_synthesis() {
        let harness = harness("", false);

        let report = harness.pipeline.answer(&payload(None)).await;

        assert_eq!(report.decision.into_response(), VoiceResponse::say(FALLBACK_MESSAGE));
        assert_eq!(harness.synthesis_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn ceiling_override_is_applied_and_capped() {
        let harness = harness("hi", false);

        let tiny = harness.pipeline.answer(&payload(Some(Decimal::ONE))).await;
        let huge = harness.pipeline.answer(&payload(Some(Decimal::new(100_000, 0)))).await;

        assert_eq!(tiny.decision.into_response(), VoiceResponse::say(FALLBACK_MESSAGE));
        assert_eq!(tiny.spent, Decimal::ZERO);
        assert_eq!(huge.ceiling, Decimal::new(500, 0));
        assert_eq!(harness.provider_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn overall_timeout_covers_both_stages() {
        let harness = harness("hi", false);

        assert_eq!(
            harness.pipeline.overall_timeout(),
            Duration::from_millis(8_000 + 4_000 + 1_000)
        );
    }
}
