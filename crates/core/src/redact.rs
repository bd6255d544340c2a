use std::sync::OnceLock;

use regex::Regex;

const EMAIL_PLACEHOLDER: &str = "[redacted-email]";
const PHONE_PLACEHOLDER: &str = "[redacted-phone]";
const WITHHELD_PLACEHOLDER: &str = "[redacted]";

const EMAIL_PATTERN: &str = r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}";
const PHONE_PATTERN: &str = r"(?:\+|%2B)?\d(?:[\s().\-]*\d){6,14}";

fn compiled(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

fn email_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    compiled(&PATTERN, EMAIL_PATTERN)
}

fn phone_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    compiled(&PATTERN, PHONE_PATTERN)
}

/// Replaces email-like and phone-like substrings before text reaches a log line.
pub fn redact_pii(text: &str) -> String {
    redact_with(text, email_pattern(), phone_pattern())
}

/// Without both patterns nothing is known to be safe, so the whole text is withheld.
fn redact_with(text: &str, email: Option<&Regex>, phone: Option<&Regex>) -> String {
    let (Some(email), Some(phone)) = (email, phone) else {
        return WITHHELD_PLACEHOLDER.to_string();
    };
    let without_emails = email.replace_all(text, EMAIL_PLACEHOLDER);
    phone.replace_all(&without_emails, PHONE_PLACEHOLDER).into_owned()
}
