use serde::{Deserialize, Serialize};

const CONVERSATIONAL_INTENTS: [&str; 6] =
    ["chat", "conversation", "general", "greeting", "support", "faq"];
const CODE_OPS_INTENTS: [&str; 7] =
    ["code", "coding", "ops", "devops", "debug", "deploy", "incident"];
const RESEARCH_INTENTS: [&str; 5] = ["research", "lookup", "facts", "news", "search"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentClass {
    Conversational,
    CodeOps,
    Research,
    Unclassified,
}

impl IntentClass {
    /// Total: every label, including none, lands in exactly one class.
    pub fn classify(label: Option<&str>) -> Self {
        let Some(label) = label.map(str::trim).filter(|label| !label.is_empty()) else {
            return Self::Unclassified;
        };
        let label = label.to_ascii_lowercase();
        let label = label.as_str();

        if CONVERSATIONAL_INTENTS.contains(&label) {
            Self::Conversational
        } else if CODE_OPS_INTENTS.contains(&label) {
            Self::CodeOps
        } else if RESEARCH_INTENTS.contains(&label) {
            Self::Research
        } else {
            Self::Unclassified
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conversational => "conversational",
            Self::CodeOps => "code_ops",
            Self::Research => "research",
            Self::Unclassified => "unclassified",
        }
    }
}
