use crawl::{PageRecord, ResearchTask};
use extract::Sentiment;
use orchestrator::ResearchOutcome;
use serde::{Deserialize, Serialize};

use crate::config::GraphBackendKind;

/// Body of `POST /research`. Accepts the UI's camelCase names as well.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResearchRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub domains: Option<Vec<String>>,
    #[serde(default, alias = "maxDepth")]
    pub max_depth: Option<u32>,
    #[serde(default, alias = "maxPages")]
    pub max_pages: Option<u32>,
    #[serde(default)]
    pub language: Option<String>,
}

impl ResearchRequest {
    pub fn into_task(self) -> ResearchTask {
        ResearchTask {
            query: self.query,
            domains: self.domains,
            max_depth: self.max_depth,
            max_pages: self.max_pages,
            language: self.language,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchResponse {
    pub id: String,
    pub query: String,
    pub cached: bool,
    pub result: ResearchOutcome,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeepResearchRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default, alias = "maxPages")]
    pub max_pages: Option<u32>,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeepResearchResponse {
    pub results: Vec<PageRecord>,
    pub analysis: DeepAnalysis,
}

#[derive(Debug, Serialize)]
pub struct DeepAnalysis {
    pub summary: String,
    pub sentiment: Sentiment,
    pub keywords: Vec<String>,
    pub insights: Vec<String>,
    pub questions: Vec<String>,
}

/// Body of `POST /research/cot`. `depth` runs from 1 (basic) to 3.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReasoningRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default, alias = "maxPages")]
    pub max_pages: Option<u32>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub hypothesis: Option<String>,
    #[serde(default)]
    pub depth: Option<u8>,
}

#[derive(Debug, Serialize)]
pub struct ReasoningResponse {
    pub query: String,
    pub hypothesis: Option<String>,
    pub depth: u8,
    pub results: Vec<PageRecord>,
    pub reasoning: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub id: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct NeighborhoodQuery {
    pub depth: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub graph: String,
    pub backend: GraphBackendKind,
    pub gemini_configured: bool,
    pub crawler_configured: bool,
}
