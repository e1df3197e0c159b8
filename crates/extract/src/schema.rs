use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Closed set of entity kinds. Anything the model invents maps to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Person,
    Organization,
    Location,
    Concept,
    Event,
    Product,
    Keyword,
    Insight,
    Unknown,
}

impl EntityType {
    pub const ALL: [EntityType; 9] = [
        EntityType::Person,
        EntityType::Organization,
        EntityType::Location,
        EntityType::Concept,
        EntityType::Event,
        EntityType::Product,
        EntityType::Keyword,
        EntityType::Insight,
        EntityType::Unknown,
    ];

    /// Map a free-form tag from the model onto the closed set
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_lowercase().as_str() {
            "person" | "people" | "人物" => EntityType::Person,
            "organization" | "organisation" | "org" | "company" | "組織" => EntityType::Organization,
            "location" | "place" | "country" | "city" | "場所" => EntityType::Location,
            "concept" | "topic" | "idea" | "概念" => EntityType::Concept,
            "event" | "イベント" => EntityType::Event,
            "product" | "technology" | "製品" => EntityType::Product,
            "keyword" => EntityType::Keyword,
            "insight" => EntityType::Insight,
            _ => EntityType::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Person => "person",
            EntityType::Organization => "organization",
            EntityType::Location => "location",
            EntityType::Concept => "concept",
            EntityType::Event => "event",
            EntityType::Product => "product",
            EntityType::Keyword => "keyword",
            EntityType::Insight => "insight",
            EntityType::Unknown => "unknown",
        }
    }

    /// Node label used by graph stores
    pub fn label(&self) -> &'static str {
        match self {
            EntityType::Person => "Person",
            EntityType::Organization => "Organization",
            EntityType::Location => "Location",
            EntityType::Concept => "Concept",
            EntityType::Event => "Event",
            EntityType::Product => "Product",
            EntityType::Keyword => "Keyword",
            EntityType::Insight => "Insight",
            EntityType::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An entity as the model reported it for one piece of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub relevance: f64,
}

/// A graph node. `id` is the canonical name and is unique within one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl Entity {
    pub fn new(id: impl Into<String>, entity_type: EntityType, relevance: f64) -> Self {
        let id = id.into();
        let mut properties = Map::new();
        properties.insert("relevance".to_string(), Value::from(relevance));

        Self {
            label: id.clone(),
            id,
            entity_type,
            properties,
        }
    }

    pub fn relevance(&self) -> f64 {
        self.properties
            .get("relevance")
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    }
}

impl From<&ExtractedEntity> for Entity {
    fn from(extracted: &ExtractedEntity) -> Self {
        Entity::new(extracted.name.clone(), extracted.entity_type, extracted.relevance)
    }
}

/// A directed, typed edge between two entity ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub rel_type: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl Relationship {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        rel_type: impl Into<String>,
        confidence: f64,
    ) -> Self {
        let mut properties = Map::new();
        properties.insert("confidence".to_string(), Value::from(confidence));

        Self {
            source: source.into(),
            target: target.into(),
            rel_type: rel_type.into(),
            properties,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn confidence(&self) -> f64 {
        self.properties
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    /// Accepts English and Japanese labels, case-insensitively
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "positive" | "ポジティブ" => Some(Sentiment::Positive),
            "negative" | "ネガティブ" => Some(Sentiment::Negative),
            "neutral" | "ニュートラル" => Some(Sentiment::Neutral),
            _ => None,
        }
    }
}

/// Summary, sentiment and up to five keywords for one piece of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextAnalysis {
    pub summary: String,
    pub sentiment: Sentiment,
    pub keywords: Vec<String>,
}
