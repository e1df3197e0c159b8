//! Parsing of raw model output.
//!
//! The model is asked for a JSON shape but nothing guarantees it answers with
//! one, so every parse distinguishes "not JSON at all" from "JSON with the
//! wrong shape".

use serde_json::{Map, Value};

use crate::normalizer::canonical_name;
use crate::prompt::MAX_KEYWORDS;
use crate::schema::{EntityType, ExtractedEntity, Sentiment, TextAnalysis};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnalysisParseError {
    #[error("model response is not valid JSON: {message}")]
    ParseFailure { message: String, raw: String },

    #[error("model response has unexpected shape: `{field}` {problem}")]
    SchemaMismatch {
        field: String,
        problem: String,
        raw: String,
    },
}

impl AnalysisParseError {
    pub fn raw(&self) -> &str {
        match self {
            AnalysisParseError::ParseFailure { raw, .. }
            | AnalysisParseError::SchemaMismatch { raw, .. } => raw,
        }
    }

    fn mismatch(field: &str, problem: &str, raw: &str) -> Self {
        AnalysisParseError::SchemaMismatch {
            field: field.to_string(),
            problem: problem.to_string(),
            raw: raw.to_string(),
        }
    }
}

/// Parse raw model text into JSON, tolerating markdown code fences and
/// prose around a single JSON object or array.
pub fn parse_json(raw: &str) -> Result<Value, AnalysisParseError> {
    let body = strip_code_fence(raw);

    match serde_json::from_str(body) {
        Ok(value) => Ok(value),
        Err(first_error) => embedded_json(body)
            .and_then(|candidate| serde_json::from_str(candidate).ok())
            .ok_or_else(|| AnalysisParseError::ParseFailure {
                message: first_error.to_string(),
                raw: raw.to_string(),
            }),
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Outermost `{...}` or `[...]` span, whichever opens first
fn embedded_json(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let close = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

pub fn parse_text_analysis(raw: &str) -> Result<TextAnalysis, AnalysisParseError> {
    let value = parse_json(raw)?;
    let object = value
        .as_object()
        .ok_or_else(|| AnalysisParseError::mismatch("<root>", "is not an object", raw))?;

    let summary = required_str(object, "summary", raw)?.trim().to_string();

    let sentiment_label = required_str(object, "sentiment", raw)?;
    let sentiment = Sentiment::from_label(sentiment_label).ok_or_else(|| {
        AnalysisParseError::mismatch("sentiment", "is not positive, negative or neutral", raw)
    })?;

    let keywords = string_list(object.get("keywords"), "keywords", raw)?
        .into_iter()
        .take(MAX_KEYWORDS)
        .collect();

    Ok(TextAnalysis {
        summary,
        sentiment,
        keywords,
    })
}

pub fn parse_entities(raw: &str) -> Result<Vec<ExtractedEntity>, AnalysisParseError> {
    let value = parse_json(raw)?;

    let items = match &value {
        Value::Array(items) => items,
        Value::Object(object) => object
            .get("entities")
            .and_then(Value::as_array)
            .ok_or_else(|| AnalysisParseError::mismatch("entities", "is missing", raw))?,
        _ => {
            return Err(AnalysisParseError::mismatch(
                "<root>",
                "is neither an array nor an object",
                raw,
            ));
        }
    };

    let mut entities = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let object = item.as_object().ok_or_else(|| {
            AnalysisParseError::mismatch(&format!("[{i}]"), "is not an object", raw)
        })?;

        let name = canonical_name(required_str(object, "name", raw)?);
        if name.is_empty() {
            continue;
        }

        let entity_type = object
            .get("type")
            .and_then(Value::as_str)
            .map(EntityType::from_tag)
            .unwrap_or(EntityType::Unknown);

        let relevance = relevance(object.get("relevance"))
            .ok_or_else(|| AnalysisParseError::mismatch("relevance", "is not a number", raw))?;

        entities.push(ExtractedEntity {
            name,
            entity_type,
            relevance,
        });
    }

    Ok(entities)
}

pub fn parse_questions(raw: &str) -> Result<Vec<String>, AnalysisParseError> {
    let value = parse_json(raw)?;
    let list = match &value {
        Value::Object(object) => object.get("questions"),
        other => Some(other),
    };
    string_list(list, "questions", raw)
}

fn required_str<'a>(
    object: &'a Map<String, Value>,
    field: &str,
    raw: &str,
) -> Result<&'a str, AnalysisParseError> {
    match object.get(field) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(AnalysisParseError::mismatch(field, "is not a string", raw)),
        None => Err(AnalysisParseError::mismatch(field, "is missing", raw)),
    }
}

fn string_list(
    value: Option<&Value>,
    field: &str,
    raw: &str,
) -> Result<Vec<String>, AnalysisParseError> {
    let items = match value {
        Some(Value::Array(items)) => items,
        Some(_) => return Err(AnalysisParseError::mismatch(field, "is not an array", raw)),
        None => return Err(AnalysisParseError::mismatch(field, "is missing", raw)),
    };

    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(|s| s.trim().to_string())
                .ok_or_else(|| AnalysisParseError::mismatch(field, "contains a non-string", raw))
        })
        .filter(|item| !matches!(item, Ok(s) if s.is_empty()))
        .collect()
}

/// Numbers or numeric strings, clamped to [0, 1]
fn relevance(value: Option<&Value>) -> Option<f64> {
    let score = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    score.is_finite().then(|| score.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_analysis() {
        let raw = r#"{
            "summary": "IPCC report",
            "sentiment": "neutral",
            "keywords": ["climate", "policy"]
        }"#;
        let analysis = parse_text_analysis(raw).unwrap();

        assert_eq!(analysis.summary, "IPCC report");
        assert_eq!(analysis.sentiment, Sentiment::Neutral);
        assert_eq!(analysis.keywords, vec!["climate", "policy"]);
    }

    #[test]
    fn test_fenced_analysis_with_japanese_sentiment() {
        let raw = "```json\n{\"summary\": \"要約\", \"sentiment\": \"ポジティブ\", \"keywords\": []}\n```";
        let analysis = parse_text_analysis(raw).unwrap();

        assert_eq!(analysis.sentiment, Sentiment::Positive);
        assert!(analysis.keywords.is_empty());
    }

    #[test]
    fn test_json_embedded_in_prose() {
        let raw = r#"Sure! Here is the analysis:
            {"summary": "s", "sentiment": "Negative", "keywords": ["a"]} Hope it helps."#;
        let analysis = parse_text_analysis(raw).unwrap();

        assert_eq!(analysis.sentiment, Sentiment::Negative);
    }

    #[test]
    fn test_keywords_are_capped() {
        let raw = r#"{
            "summary": "s",
            "sentiment": "neutral",
            "keywords": ["a", "b", "c", "d", "e", "f", "g"]
        }"#;
        let analysis = parse_text_analysis(raw).unwrap();

        assert_eq!(analysis.keywords.len(), MAX_KEYWORDS);
        assert_eq!(analysis.keywords[0], "a");
    }

    #[test]
    fn test_not_json_is_parse_failure() {
        let err = parse_text_analysis("I cannot help with that.").unwrap_err();

        assert!(matches!(err, AnalysisParseError::ParseFailure { .. }));
        assert_eq!(err.raw(), "I cannot help with that.");
    }

    #[test]
    fn test_missing_field_is_schema_mismatch() {
        let err = parse_text_analysis(r#"{"summary": "s", "keywords": []}"#).unwrap_err();

        match err {
            AnalysisParseError::SchemaMismatch { field, .. } => assert_eq!(field, "sentiment"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_sentiment_is_schema_mismatch() {
        let raw = r#"{"summary": "s", "sentiment": "ecstatic", "keywords": []}"#;
        let err = parse_text_analysis(raw).unwrap_err();

        assert!(matches!(
            err,
            AnalysisParseError::SchemaMismatch { ref field, .. } if field == "sentiment"
        ));
    }

    #[test]
    fn test_entities_with_string_relevance() {
        let raw = r#"[
            {"name": "IPCC", "type": "organization", "relevance": 0.9},
            {"name": " Paris Agreement ", "type": "concept", "relevance": "0.8"},
            {"name": "Somewhere", "type": "planet", "relevance": 1.7}
        ]"#;
        let entities = parse_entities(raw).unwrap();

        assert_eq!(entities.len(), 3);
        assert_eq!(entities[0].entity_type, EntityType::Organization);
        assert_eq!(entities[1].name, "Paris Agreement");
        assert_eq!(entities[1].relevance, 0.8);
        assert_eq!(entities[2].entity_type, EntityType::Unknown);
        assert_eq!(entities[2].relevance, 1.0);
    }

    #[test]
    fn test_wrapped_entities() {
        let raw = r#"{"entities": [{"name": "IPCC", "type": "organization", "relevance": 0.9}]}"#;
        assert_eq!(parse_entities(raw).unwrap().len(), 1);
    }

    #[test]
    fn test_empty_entity_list() {
        assert!(parse_entities("[]").unwrap().is_empty());
    }

    #[test]
    fn test_entity_without_name_is_schema_mismatch() {
        let err = parse_entities(r#"[{"type": "person", "relevance": 0.5}]"#).unwrap_err();
        assert!(matches!(
            err,
            AnalysisParseError::SchemaMismatch { ref field, .. } if field == "name"
        ));
    }

    #[test]
    fn test_entity_with_bad_relevance_is_schema_mismatch() {
        let err = parse_entities(r#"[{"name": "X", "relevance": "high"}]"#).unwrap_err();
        assert!(matches!(
            err,
            AnalysisParseError::SchemaMismatch { ref field, .. } if field == "relevance"
        ));
    }

    #[test]
    fn test_questions() {
        let questions = parse_questions(r#"["Why?", "How?", "When?"]"#).unwrap();
        assert_eq!(questions.len(), 3);

        let wrapped = parse_questions(r#"{"questions": ["Why?"]}"#).unwrap();
        assert_eq!(wrapped, vec!["Why?"]);
    }
}
