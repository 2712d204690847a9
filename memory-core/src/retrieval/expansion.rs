//! Deterministic query expansion.
//!
//! Generates up to `num_expansions` paraphrases from fixed heuristics —
//! verb synonyms and question-to-statement reformulation. No LLM involved,
//! so expansion is free and reproducible.

/// Synonym table for common query verbs. Order fixes expansion order.
const VERB_SYNONYMS: [(&str, &str); 8] = [
    ("implement", "build"),
    ("implement", "create"),
    ("fix", "resolve"),
    ("fix", "repair"),
    ("use", "apply"),
    ("configure", "set up"),
    ("error", "failure"),
    ("delete", "remove"),
];

/// Leading question phrases stripped when reformulating to statements.
const QUESTION_PREFIXES: [&str; 6] = [
    "how do i ",
    "how do you ",
    "how to ",
    "what is the ",
    "what is ",
    "why does ",
];

/// Deterministic paraphrase generator.
#[derive(Debug, Clone)]
pub struct QueryExpander {
    num_expansions: usize,
}

impl QueryExpander {
    #[must_use]
    pub fn new(num_expansions: usize) -> Self {
        Self { num_expansions }
    }

    /// Expand a query into itself plus up to `num_expansions` paraphrases.
    ///
    /// The original query always comes first; duplicates are dropped.
    #[must_use]
    pub fn expand(&self, query: &str) -> Vec<String> {
        let mut queries = vec![query.to_string()];

        let mut push = |candidate: String, queries: &mut Vec<String>| {
            if queries.len() > self.num_expansions {
                return;
            }
            let trimmed = candidate.trim().to_string();
            if !trimmed.is_empty() && !queries.contains(&trimmed) {
                queries.push(trimmed);
            }
        };

        // Question → statement reformulation first: it changes the most.
        let lower = query.to_lowercase();
        for prefix in QUESTION_PREFIXES {
            if lower.starts_with(prefix) {
                let statement: String = query.chars().skip(prefix.chars().count()).collect();
                push(statement.trim_end_matches('?').to_string(), &mut queries);
                break;
            }
        }

        // Verb synonyms, one substitution per expansion.
        for (verb, synonym) in VERB_SYNONYMS {
            if queries.len() > self.num_expansions {
                break;
            }
            if lower.contains(verb) {
                let replaced = replace_ignore_case(query, verb, synonym);
                push(replaced, &mut queries);
            }
        }

        queries
    }
}

/// Replace the first case-insensitive occurrence of `needle`.
///
/// Lowercasing can shift byte offsets for non-ASCII text; when the found
/// offsets don't land on char boundaries of the original, the query is
/// returned unchanged rather than sliced incorrectly.
fn replace_ignore_case(haystack: &str, needle: &str, replacement: &str) -> String {
    let lower = haystack.to_lowercase();
    match lower.find(needle) {
        Some(start) => {
            let end = start + needle.len();
            if end > haystack.len()
                || !haystack.is_char_boundary(start)
                || !haystack.is_char_boundary(end)
            {
                return haystack.to_string();
            }
            format!("{}{replacement}{}", &haystack[..start], &haystack[end..])
        }
        None => haystack.to_string(),
    }
}
