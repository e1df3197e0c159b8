use regex::Regex;
use std::sync::LazyLock;

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

static EDGE_PUNCTUATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^["'“”‘’「『]+|["'“”‘’」』.,;:!?]+$"#).expect("punctuation pattern is valid")
});

/// Canonical entity name: trimmed, inner whitespace collapsed, surrounding
/// quotes and trailing punctuation removed. Case is preserved, so "IPCC" and
/// "ipcc" stay distinct ids.
pub fn canonical_name(name: &str) -> String {
    let collapsed = WHITESPACE.replace_all(name.trim(), " ");
    EDGE_PUNCTUATION.replace_all(&collapsed, "").trim().to_string()
}
