use serde::{Deserialize, Serialize};

/// Refusal phrases models tend to produce when the input is useless.
pub const DEFAULT_NEGATIVE_KEYWORDS: &[&str] = &[
    "役立ちません",
    "含まれていません",
    "提供されていません",
    "見つかりません",
    "存在しません",
    "情報がありません",
    "評価するのに役立ちません",
    "情報源の信頼性",
    "not helpful",
    "does not contain",
    "is not provided",
    "could not be found",
    "does not exist",
    "no information",
];

pub const DEFAULT_PLACEHOLDER: &str = "Analysis in progress...";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegativityFilter {
    keywords: Vec<String>,
    placeholder: String,
}

impl Default for NegativityFilter {
    fn default() -> Self {
        Self::new(
            DEFAULT_NEGATIVE_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            DEFAULT_PLACEHOLDER,
        )
    }
}

impl NegativityFilter {
    pub fn new(keywords: Vec<String>, placeholder: impl Into<String>) -> Self {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect(),
            placeholder: placeholder.into(),
        }
    }

    pub fn is_negative(&self, text: &str) -> bool {
        self.keywords.iter().any(|keyword| text.contains(keyword.as_str()))
    }

    /// Drop boilerplate refusals; never returns an empty list
    pub fn filter(&self, items: &[String]) -> Vec<String> {
        let kept: Vec<String> = items
            .iter()
            .filter(|item| !self.is_negative(item))
            .cloned()
            .collect();

        if kept.is_empty() {
            vec![self.placeholder.clone()]
        } else {
            kept
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_refusals_are_removed() {
        let filter = NegativityFilter::default();
        let items = strings(&[
            "Emissions fell 3% in 2023",
            "この情報は評価するのに役立ちません",
            "The text does not contain any dates",
        ]);

        assert_eq!(filter.filter(&items), strings(&["Emissions fell 3% in 2023"]));
    }

    #[test]
    fn test_all_negative_yields_placeholder() {
        let filter = NegativityFilter::new(strings(&["nope"]), "pending");
        assert_eq!(filter.filter(&strings(&["nope nope"])), strings(&["pending"]));
        assert_eq!(filter.filter(&[]), strings(&["pending"]));
    }

    #[test]
    fn test_blank_keywords_are_ignored() {
        let filter = NegativityFilter::new(strings(&["", "  "]), "pending");
        assert_eq!(filter.filter(&strings(&["anything"])), strings(&["anything"]));
    }
}
