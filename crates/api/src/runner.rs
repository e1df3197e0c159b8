use async_trait::async_trait;
use crawl::{AcquisitionError, CrawlerClient, PageRecord, ResearchTask, SearchOptions};
use extract::{AnalysisError, Analyzer, TextAnalysis, TextAnalyzer};
use graph::{GraphStoreError, MemoryGraphStore, Neo4jConfig, Neo4jGraphStore};
use orchestrator::{Orchestrator, OrchestratorConfig, ResearchError, ResearchOutcome, RunState};
use std::sync::Arc;
use tracing::debug;

pub type TransitionFn = Box<dyn FnMut(RunState) + Send>;

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Research(#[from] ResearchError),

    #[error("graph store unavailable: {0}")]
    Store(#[from] GraphStoreError),

    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

impl RunError {
    pub fn is_validation(&self) -> bool {
        matches!(self, RunError::Research(e) if e.is_validation())
    }
}

/// Crawler search results plus one analysis over their joined content.
#[derive(Debug, Clone)]
pub struct DeepResearch {
    pub results: Vec<PageRecord>,
    pub analysis: TextAnalysis,
    pub questions: Vec<String>,
}

/// Crawler search results and the staged reasoning written over them.
#[derive(Debug, Clone)]
pub struct Reasoning {
    pub results: Vec<PageRecord>,
    pub text: String,
}

/// What the HTTP layer needs from the research pipeline.
#[async_trait]
pub trait ResearchRunner: Send + Sync {
    async fn research(
        &self,
        task: ResearchTask,
        on_transition: TransitionFn,
    ) -> Result<ResearchOutcome, RunError>;

    async fn deep_research(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<DeepResearch, RunError>;

    async fn reason(
        &self,
        query: &str,
        options: &SearchOptions,
        hypothesis: Option<&str>,
        depth: u8,
    ) -> Result<Reasoning, RunError>;
}

pub enum GraphBackend {
    /// A fresh connection per run, closed when the run ends
    Neo4j(Neo4jConfig),
    /// One process-wide store shared by every run and by the graph routes
    Memory(Arc<MemoryGraphStore>),
}

pub struct PipelineRunner {
    crawler: Arc<CrawlerClient>,
    analyzer: Arc<Analyzer>,
    backend: GraphBackend,
    config: OrchestratorConfig,
}

impl PipelineRunner {
    pub fn new(
        crawler: Arc<CrawlerClient>,
        analyzer: Arc<Analyzer>,
        backend: GraphBackend,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            crawler,
            analyzer,
            backend,
            config,
        }
    }
}

#[async_trait]
impl ResearchRunner for PipelineRunner {
    async fn research(
        &self,
        task: ResearchTask,
        on_transition: TransitionFn,
    ) -> Result<ResearchOutcome, RunError> {
        match &self.backend {
            GraphBackend::Neo4j(config) => {
                let store = Neo4jGraphStore::connect(config).await?;
                let orchestrator = Orchestrator::new(
                    self.crawler.clone(),
                    self.analyzer.clone(),
                    Arc::new(store),
                    self.config.clone(),
                );
                Ok(orchestrator.run_once(task, on_transition).await?)
            }
            GraphBackend::Memory(store) => {
                let orchestrator = Orchestrator::new(
                    self.crawler.clone(),
                    self.analyzer.clone(),
                    store.clone(),
                    self.config.clone(),
                );
                Ok(orchestrator.execute_research_with(task, on_transition).await?)
            }
        }
    }

    async fn deep_research(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<DeepResearch, RunError> {
        let results = self.crawler.search(query, options).await?;
        debug!(query, results = results.len(), "Search results received");

        let content = results
            .iter()
            .map(|page| page.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let (analysis, questions) = tokio::try_join!(
            self.analyzer.analyze(&content),
            self.analyzer.generate_questions(&content)
        )?;

        Ok(DeepResearch {
            results,
            analysis,
            questions,
        })
    }

    async fn reason(
        &self,
        query: &str,
        options: &SearchOptions,
        hypothesis: Option<&str>,
        depth: u8,
    ) -> Result<Reasoning, RunError> {
        let results = self.crawler.search(query, options).await?;
        debug!(query, results = results.len(), depth, "Reasoning over search results");

        let sources = source_digest(&results);
        let text = self.analyzer.reason(query, &sources, hypothesis, depth).await?;

        Ok(Reasoning { results, text })
    }
}

/// One block per page: title, URL and summary, plus publication date and
/// author when the crawler reported them. The summary is the crawler's own
/// when present, the page content otherwise.
fn source_digest(pages: &[PageRecord]) -> String {
    let meta = |page: &PageRecord, key: &str| {
        page.metadata
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let mut digest = String::new();
    for page in pages {
        let summary = meta(page, "summary").unwrap_or_else(|| page.content.clone());
        digest.push_str(&format!(
            "Title: {}\nURL: {}\nSummary: {}\n",
            page.title, page.url, summary
        ));
        if let Some(date) = meta(page, "date") {
            digest.push_str(&format!("Published: {date}\n"));
        }
        if let Some(author) = meta(page, "author") {
            digest.push_str(&format!("Author: {author}\n"));
        }
        digest.push('\n');
    }
    digest
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_source_digest_prefers_crawler_summary() {
        let mut report = PageRecord::new("https://example.org/solar", "Solar report", "Long body");
        report.metadata.insert("summary".to_string(), json!("Prices fell."));
        report.metadata.insert("author".to_string(), json!("IEA"));
        let plain = PageRecord::new("https://example.org/wind", "Wind", "Wind output rose.");

        let digest = source_digest(&[report, plain]);

        assert_eq!(
            digest,
            "Title: Solar report\nURL: https://example.org/solar\n\
             Summary: Prices fell.\nAuthor: IEA\n\n\
             Title: Wind\nURL: https://example.org/wind\nSummary: Wind output rose.\n\n"
        );
    }

    #[test]
    fn test_source_digest_of_no_pages_is_empty() {
        assert_eq!(source_digest(&[]), "");
    }
}
