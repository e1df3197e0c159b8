use extract::{Entity, ExtractedEntity, Relationship, TextAnalysis};
use serde::Serialize;
use std::collections::HashSet;

pub const RELATED_TO: &str = "RELATED_TO";

/// Analysis output for one crawled page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageAnalysis {
    pub url: String,
    pub title: String,
    pub analysis: TextAnalysis,
    pub entities: Vec<ExtractedEntity>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BuiltGraph {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
}

/// Turn per-page analyses into graph records.
///
/// Entities are deduplicated by name in page order; the first occurrence
/// wins and later ones are dropped without merging. Within each page, every
/// pair among the first `max_entities_per_page` entities is linked with a
/// `RELATED_TO` edge whose confidence is the mean of the two relevances.
pub fn build_graph(pages: &[PageAnalysis], max_entities_per_page: usize) -> BuiltGraph {
    let mut graph = BuiltGraph::default();
    let mut seen = HashSet::new();

    for page in pages {
        for extracted in &page.entities {
            if seen.insert(extracted.name.as_str()) {
                graph.entities.push(Entity::from(extracted));
            }
        }

        let linked: Vec<&ExtractedEntity> =
            page.entities.iter().take(max_entities_per_page).collect();
        for (i, a) in linked.iter().enumerate() {
            for b in &linked[i + 1..] {
                if a.name == b.name {
                    continue;
                }
                let confidence = (a.relevance + b.relevance) / 2.0;
                graph.relationships.push(
                    Relationship::new(a.name.clone(), b.name.clone(), RELATED_TO, confidence)
                        .with_property("source_url", page.url.clone()),
                );
            }
        }
    }

    graph
}
