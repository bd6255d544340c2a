use crate::errors::{FALLBACK_MESSAGE, UNAUTHORIZED_MESSAGE};

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>";

/// The three shapes a webhook reply can take.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VoiceResponse {
    Unauthorized,
    Say { text: String },
    Play { url: String },
}

impl VoiceResponse {
    pub fn say(text: impl Into<String>) -> Self {
        Self::Say { text: text.into() }
    }

    pub fn fallback() -> Self {
        Self::say(FALLBACK_MESSAGE)
    }

    pub fn play(url: impl Into<String>) -> Self {
        Self::Play { url: url.into() }
    }

    pub fn shape(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::Say { .. } => "say",
            Self::Play { .. } => "play",
        }
    }

    pub fn render(&self) -> String {
        let body = match self {
            Self::Unauthorized => format!("<Say>{}</Say>", escape_markup(UNAUTHORIZED_MESSAGE)),
            Self::Say { text } => format!("<Say>{}</Say>", escape_markup(text)),
            Self::Play { url } => format!("<Play>{}</Play>", escape_markup(url)),
        };
        format!("{XML_DECLARATION}\n<Response>{body}</Response>")
    }
}

pub fn escape_markup(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}
