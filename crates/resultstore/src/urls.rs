use serde::Serialize;

const SCHEMES: [&str; 2] = ["http://", "https://"];
const WWW: &str = "www.";

/// Display form of a URL: `text` is the URL without scheme and `www.`,
/// `value` is exactly what was stripped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UrlEntry {
    pub text: String,
    pub value: String,
}

pub fn normalize_url(url: &str) -> UrlEntry {
    let mut rest = url;
    let mut prefix = String::new();

    if let Some(scheme) = SCHEMES.iter().find(|s| rest.starts_with(*s)) {
        prefix.push_str(scheme);
        rest = &rest[scheme.len()..];
    }
    if let Some(stripped) = rest.strip_prefix(WWW) {
        prefix.push_str(WWW);
        rest = stripped;
    }

    UrlEntry {
        text: rest.to_string(),
        value: prefix,
    }
}
