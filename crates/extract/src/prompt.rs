//! Instruction templates sent ahead of the text being analyzed.
//!
//! The text itself always travels as a separate part, verbatim.

pub const MAX_KEYWORDS: usize = 5;

pub fn analysis_instruction() -> String {
    format!(
        r#"Analyze the text that follows and return JSON in exactly this shape:
{{
  "summary": "summary of the text, at most 200 characters",
  "sentiment": "positive|negative|neutral",
  "keywords": ["the most important keywords, at most {MAX_KEYWORDS}"]
}}

Output ONLY the JSON object, no markdown, no explanations."#
    )
}

pub fn entity_instruction() -> String {
    r#"Extract the important entities (people, organizations, locations, concepts, events, products) from the text that follows and return JSON in exactly this shape:
[
  {
    "name": "entity name",
    "type": "person|organization|location|concept|event|product",
    "relevance": 0.0
  }
]

RULES:
- relevance is a number between 0 and 1
- Output ONLY the JSON array, no markdown, no explanations"#
        .to_string()
}

pub fn questions_instruction() -> String {
    r#"Generate three important follow-up questions about the text that follows.
Return them as a JSON array of strings. Output ONLY the JSON array."#
        .to_string()
}

pub const DEFAULT_REASONING_DEPTH: u8 = 2;
pub const MAX_REASONING_DEPTH: u8 = 3;

/// Staged reasoning over the search results that follow: sources, facts,
/// hypotheses, verification, conclusion, open questions.
///
/// `depth` is clamped to 1..=3. From 2 on at least three hypotheses are
/// asked for, and 3 adds source-bias and trend analysis. A caller-supplied
/// `hypothesis` is tested alongside the model's own.
pub fn reasoning_instruction(query: &str, hypothesis: Option<&str>, depth: u8) -> String {
    let depth = depth.clamp(1, MAX_REASONING_DEPTH);
    let (level, min_hypotheses) = if depth >= 2 { ("detailed", 3) } else { ("basic", 2) };

    let mut prompt = format!(
        "# Chain-of-Thought Deep Research: {query}\n\n\
         Based on the web search results that follow, carry out a {level} analysis \
         and verify hypotheses step by step.\n\n\
         ## Step 1: Organize the sources\n\
         Assess each source for reliability, relevance and recency.\n\n\
         ## Step 2: Extract the key facts\n\
         List the main facts, claims and data points of each source. \
         Call out contradictions between sources explicitly.\n\n\
         ## Step 3: Form hypotheses\n\
         From the extracted facts, form at least {min_hypotheses} distinct, testable hypotheses.\n"
    );

    if let Some(hypothesis) = hypothesis.map(str::trim).filter(|h| !h.is_empty()) {
        prompt.push_str(&format!(
            "Include this hypothesis from the user and test it like the others: {hypothesis}\n"
        ));
    }

    prompt.push_str(
        "\n## Step 4: Verify the hypotheses\n\
         For each hypothesis, identify in the search results:\n\
         - the evidence that supports it\n\
         - the evidence that contradicts it\n\
         - how strong and reliable that evidence is\n\n\
         ## Step 5: Most likely conclusion\n\
         Draw the most likely conclusion from the weighed evidence \
         and state how uncertain it is.\n\n\
         ## Step 6: Further research\n\
         Name the areas that need more research and the important questions \
         the current sources cannot answer.\n",
    );

    if depth >= 3 {
        prompt.push_str(
            "\n## Additional requirements\n\
             1. Identify the bias or viewpoint of each source and how it affects the conclusion.\n\
             2. Identify changes or trends over time.\n\
             3. Consider how the question reads in different cultural and social contexts.\n\
             4. Discuss the practical implications of the conclusion.\n",
        );
    }

    prompt
}
