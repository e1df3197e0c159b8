pub mod filter;
pub mod llm;
pub mod normalizer;
pub mod parse;
pub mod prompt;
pub mod schema;

pub use filter::NegativityFilter;
pub use llm::{AnalysisError, GeminiClient, GeminiConfig};
pub use normalizer::canonical_name;
pub use parse::AnalysisParseError;
pub use schema::{Entity, EntityType, ExtractedEntity, Relationship, Sentiment, TextAnalysis};

use async_trait::async_trait;
use tracing::warn;

/// Text analysis backed by a generative model.
#[async_trait]
pub trait TextAnalyzer: Send + Sync {
    /// Summary, sentiment and keywords for `text`
    async fn analyze(&self, text: &str) -> Result<TextAnalysis, AnalysisError>;

    /// Named entities with a type and a relevance in [0, 1]
    async fn extract_entities(&self, text: &str) -> Result<Vec<ExtractedEntity>, AnalysisError>;

    /// Follow-up questions about `text`
    async fn generate_questions(&self, text: &str) -> Result<Vec<String>, AnalysisError>;

    /// Free-form staged reasoning about `query` over `sources`, testing
    /// `hypothesis` when one is given
    async fn reason(
        &self,
        query: &str,
        sources: &str,
        hypothesis: Option<&str>,
        depth: u8,
    ) -> Result<String, AnalysisError>;
}

/// Gemini-backed analyzer. One request per call, no retry: a response that
/// does not parse is returned to the caller as an error.
#[derive(Clone)]
pub struct Analyzer {
    llm_client: GeminiClient,
}

impl Analyzer {
    pub fn new(llm_client: GeminiClient) -> Self {
        Self { llm_client }
    }

    async fn ask<T: Send>(
        &self,
        operation: &'static str,
        instruction: String,
        text: &str,
        parse: fn(&str) -> Result<T, AnalysisParseError>,
    ) -> Result<T, AnalysisError> {
        let raw = self.llm_client.generate(&[instruction.as_str(), text], true).await?;

        parse(&raw).map_err(|e| {
            warn!(
                operation,
                model = self.llm_client.model(),
                error = %e,
                "Model response rejected"
            );
            AnalysisError::Parse(e)
        })
    }
}

#[async_trait]
impl TextAnalyzer for Analyzer {
    async fn analyze(&self, text: &str) -> Result<TextAnalysis, AnalysisError> {
        self.ask("analyze", prompt::analysis_instruction(), text, parse::parse_text_analysis)
            .await
    }

    async fn extract_entities(&self, text: &str) -> Result<Vec<ExtractedEntity>, AnalysisError> {
        self.ask("extract_entities", prompt::entity_instruction(), text, parse::parse_entities)
            .await
    }

    async fn generate_questions(&self, text: &str) -> Result<Vec<String>, AnalysisError> {
        self.ask(
            "generate_questions",
            prompt::questions_instruction(),
            text,
            parse::parse_questions,
        )
        .await
    }

    async fn reason(
        &self,
        query: &str,
        sources: &str,
        hypothesis: Option<&str>,
        depth: u8,
    ) -> Result<String, AnalysisError> {
        let instruction = prompt::reasoning_instruction(query, hypothesis, depth);
        self.llm_client.generate(&[instruction.as_str(), sources], false).await
    }
}
