//! Research-depth prompt composition.
//!
//! Depth decides how many grounding facts reach the model and what kind of
//! answer is asked for. Composition is pure: no engine runs and no transport
//! is involved here.

use essight_core::ResearchDepth;
use serde::Serialize;

/// Facts used at `brief` depth.
pub const BRIEF_FACT_LIMIT: usize = 3;
/// Facts used at `standard` depth.
pub const STANDARD_FACT_LIMIT: usize = 8;

/// Appended to the system prompt at `deep` depth.
pub const METHODOLOGY_CAVEATS: &str = "Methodology caveats: discuss the statistical limitations \
of these results. Address sample bias (survey non-response and country sampling designs), \
missingness (rows dropped during cleaning and complete-case analysis), and causal versus \
correlational framing (a regression coefficient on observational data is an association, \
not an effect).";

const PREAMBLE: &str = "You are an expert analyst of the European Social Survey (round 11). \
Answer using only the dataset facts provided, and say so when the facts do not cover the question.";

/// Everything that shaped one composed prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResearchContext {
    pub depth: ResearchDepth,
    pub grounding_facts: Vec<String>,
    pub user_message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComposedPrompt {
    pub system_prompt: String,
    pub user_prompt: String,
    pub context: ResearchContext,
}

/// How many grounding facts `depth` admits; `None` means all of them.
pub fn fact_limit(depth: ResearchDepth) -> Option<usize> {
    match depth {
        ResearchDepth::Brief => Some(BRIEF_FACT_LIMIT),
        ResearchDepth::Standard => Some(STANDARD_FACT_LIMIT),
        ResearchDepth::Deep => None,
    }
}

fn instructions(depth: ResearchDepth) -> &'static str {
    match depth {
        ResearchDepth::Brief => {
            "Give a concise answer in a single paragraph. Cite the figures you rely on."
        }
        ResearchDepth::Standard => {
            "Give a structured answer with short sections: Key findings, Interpretation, \
             and European context. Cite the figures you rely on."
        }
        ResearchDepth::Deep => {
            "Give a comprehensive answer with sections: Statistical interpretation, \
             Social science context, Policy implications, Methodological considerations, \
             and Future research directions."
        }
    }
}

/// Build the system/user prompt pair for one chat turn.
///
/// Facts are taken in order, so callers put the most important first.
pub fn compose(depth: ResearchDepth, grounding: &[String], user_message: &str) -> ComposedPrompt {
    let take = fact_limit(depth).unwrap_or(grounding.len());
    let facts: Vec<String> = grounding.iter().take(take).cloned().collect();

    let mut system_prompt = format!("{PREAMBLE}\n\n{}", instructions(depth));
    if depth == ResearchDepth::Deep {
        system_prompt.push_str("\n\n");
        system_prompt.push_str(METHODOLOGY_CAVEATS);
    }

    let mut user_prompt = String::from("Dataset facts:\n");
    if facts.is_empty() {
        user_prompt.push_str("- (none available)\n");
    }
    for fact in &facts {
        user_prompt.push_str("- ");
        user_prompt.push_str(fact);
        user_prompt.push('\n');
    }
    user_prompt.push_str("\nQuestion: ");
    user_prompt.push_str(user_message.trim());

    ComposedPrompt {
        system_prompt,
        user_prompt,
        context: ResearchContext {
            depth,
            grounding_facts: facts,
            user_message: user_message.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("fact number {i}")).collect()
    }

    #[test]
    fn test_brief_uses_at_most_three_facts() {
        let prompt = compose(ResearchDepth::Brief, &facts(10), "Why?");
        assert_eq!(prompt.context.grounding_facts.len(), 3);
        assert!(prompt.user_prompt.contains("fact number 3"));
        assert!(!prompt.user_prompt.contains("fact number 4"));
        assert!(prompt.system_prompt.contains("single paragraph"));
        assert!(!prompt.system_prompt.contains(METHODOLOGY_CAVEATS));
    }

    #[test]
    fn test_standard_uses_up_to_eight() {
        let prompt = compose(ResearchDepth::Standard, &facts(10), "Why?");
        assert_eq!(prompt.context.grounding_facts.len(), 8);
        let prompt = compose(ResearchDepth::Standard, &facts(2), "Why?");
        assert_eq!(prompt.context.grounding_facts.len(), 2);
    }

    #[test]
    fn test_deep_uses_all_facts_and_caveats() {
        let prompt = compose(ResearchDepth::Deep, &facts(20), "Does ideology drive attitudes?");
        assert_eq!(prompt.context.grounding_facts.len(), 20);
        assert!(prompt.system_prompt.contains(METHODOLOGY_CAVEATS));
        assert!(prompt.system_prompt.contains("sample bias"));
        assert!(prompt.system_prompt.contains("missingness"));
        assert!(prompt.system_prompt.contains("causal versus"));
        assert!(prompt.user_prompt.ends_with("Question: Does ideology drive attitudes?"));
    }

    #[test]
    fn test_fact_order_preserved() {
        let prompt = compose(ResearchDepth::Brief, &facts(5), "q");
        assert_eq!(prompt.context.grounding_facts, facts(3));
        let first = prompt.user_prompt.find("fact number 1").unwrap();
        let second = prompt.user_prompt.find("fact number 2").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_no_facts() {
        let prompt = compose(ResearchDepth::Standard, &[], "q");
        assert!(prompt.user_prompt.contains("(none available)"));
        assert_eq!(prompt.context.user_message, "q");
    }
}
