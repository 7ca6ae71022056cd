//! Prompt templates for every inference call site.

/// Cut `text` to at most `max_chars` chars, on a char boundary.
pub fn prefix(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte, _)) => &text[..byte],
        None => text,
    }
}

pub fn relevance(content: &str, section: &str, goal: &str) -> String {
    format!(
        "Analyze whether the source contains information relevant to informing the goal of the research:\n\n\
         REPORT SECTION: {section}\n\
         RESEARCH GOAL: {goal}\n\n\
         Return EXACTLY one JSON object in a ```json code block with:\n\
         - `is_relevant`: boolean\n\
         - `confidence`: float (0-1)\n\
         - `reason`: brief explanation\n\n\
         CONTENT:\n{content}..."
    )
}

pub fn quotes(content: &str, section: &str, goal: &str) -> String {
    format!(
        "Extract relevant DIRECT quotes from this content that support:\n\n\
         SECTION: {section}\n\
         RESEARCH GOAL: {goal}\n\n\
         NOTE: DO NOT RESTATE THE GOAL, you are evaluating a data source.\n\
         Copy each quote character for character from the content; do not paraphrase.\n\
         Return between 3 and 10 quotes when the content allows it.\n\n\
         CONTENT:\n{content}\n\n\
         Return EXACTLY one JSON object in a ```json code block with `quotes` as an array of strings.\n"
    )
}

pub fn insight(content: &str, section: &str) -> String {
    format!(
        "Analyze this research content for Section {section}.\n\
         Provide a detailed technical analysis focusing on:\n\
         1. Key technical specifications and requirements\n\
         2. Implementation considerations\n\
         3. Dependencies and constraints\n\
         4. Performance metrics and targets\n\
         5. Critical success factors\n\n\
         Format as clear, actionable technical insights.\n\n\
         CONTENT:\n{content}\n"
    )
}

pub const INSIGHT_SEPARATOR: &str = "\n\n===\n\n";

pub fn synthesis(combined: &str, section: &str, goal: &str) -> String {
    format!(
        "Synthesize these individual analyses into a cohesive technical section.\n\n\
         SECTION: {section}\n\
         GOAL: {goal}\n\n\
         Create a technical synthesis that:\n\
         1. Consolidates key requirements\n\
         2. Resolves any contradictions\n\
         3. Presents a unified technical approach\n\
         4. Maintains specific technical details\n\
         5. Provides actionable implementation guidance\n\n\
         SOURCE ANALYSES:\n{combined}\n"
    )
}

pub fn integrate_quotes(draft: &str, quotes: &str) -> String {
    format!(
        "Re-write the given Content to integrate the Quotes into a markdown section. \
         Use [src: Source] to cite a quote when you use it.\n\
         Select the most relevant quotes to enhance the text.\n\
         Content:\n{draft}\n\n\
         Quotes:\n{quotes}\n\n\
         Requirements:\n\
         1. ONLY use relevant quotes that support or enhance the text\n\
         2. Add citations as [src: Source] immediately after each quote\n\
         3. Integrate quotes naturally\n\
         4. Maintain the original meaning and structure\n\n\
         Return ONLY the updated draft."
    )
}
