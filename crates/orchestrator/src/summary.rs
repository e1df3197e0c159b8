use graph::GraphSnapshot;

/// Number of node ids quoted in the summary prompt
pub const SUMMARY_SAMPLE_SIZE: usize = 5;

/// Prompt for the closing analysis call, built from what the store holds
/// after graph building.
pub fn build_summary_prompt(query: &str, snapshot: &GraphSnapshot) -> String {
    let mut prompt = String::from(
        "Summarize the main findings and insights of this research in at most 300 characters, \
         based on the following knowledge graph.\n\n",
    );

    prompt.push_str(&format!("RESEARCH QUERY: {query}\n"));
    prompt.push_str(&format!("ENTITY COUNT: {}\n", snapshot.nodes.len()));
    prompt.push_str(&format!("RELATIONSHIP COUNT: {}\n", snapshot.links.len()));

    let sample = snapshot.node_ids(SUMMARY_SAMPLE_SIZE);
    if sample.is_empty() {
        prompt.push_str("MAIN ENTITIES: none\n");
    } else {
        prompt.push_str(&format!("MAIN ENTITIES: {}\n", sample.join(", ")));
    }

    prompt
}
