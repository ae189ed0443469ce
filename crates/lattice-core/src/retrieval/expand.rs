//! Query expansion: construct synonyms, cross-language synonyms,
//! intent-dependent terms

use super::SearchIntent;

/// Synonym groups for common code constructs. Matching any member pulls
/// the rest of the group into the query.
const CONSTRUCT_SYNONYMS: &[&[&str]] = &[
    &["map", "transform", "iterate"],
    &["filter", "select", "reject"],
    &["fold", "reduce", "accumulate"],
    &["validate", "check", "verify"],
    &["parse", "decode", "deserialize"],
    &["encode", "serialize", "render"],
    &["create", "new", "build"],
    &["delete", "remove", "drop"],
    &["fetch", "load", "retrieve"],
    &["send", "publish", "emit"],
];

/// Cross-language vocabulary: the same concept under different names.
const CROSS_LANGUAGE_SYNONYMS: &[&[&str]] = &[
    &["promise", "future", "task"],
    &["struct", "class", "record"],
    &["trait", "interface", "protocol"],
    &["vector", "list", "array"],
    &["hashmap", "dict", "map"],
    &["closure", "lambda", "callback"],
    &["exception", "error", "panic"],
    &["module", "namespace", "package"],
    &["null", "none", "nil"],
    &["string", "str", "text"],
];

fn intent_terms(intent: SearchIntent) -> &'static [&'static str] {
    match intent {
        SearchIntent::General => &[],
        SearchIntent::Explain => &["documentation", "overview", "purpose"],
        SearchIntent::Refactor => &["dependencies", "callers", "usage"],
        SearchIntent::Debug => &["error", "failure", "edge"],
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedQuery {
    pub original: String,
    /// Original tokens plus bounded expansion, deduplicated, in
    /// deterministic order.
    pub terms: Vec<String>,
    pub intent: SearchIntent,
}

impl ExpandedQuery {
    /// The text handed to the embedding backend.
    pub fn text(&self) -> String {
        self.terms.join(" ")
    }
}

/// Lowercase alphanumeric tokens of at least two characters.
pub fn tokenize_query(query: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for token in query
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| t.len() >= 2)
        .map(str::to_lowercase)
    {
        if !tokens.contains(&token) {
            tokens.push(token);
        }
    }
    tokens
}

/// Rewrite a raw query with synonym and intent expansion. At most
/// `max_terms` terms are added on top of the original tokens.
pub fn expand_query(query: &str, intent: SearchIntent, max_terms: usize) -> ExpandedQuery {
    let mut terms = tokenize_query(query);
    let originals = terms.clone();
    let mut budget = max_terms;

    let mut push = |terms: &mut Vec<String>, budget: &mut usize, term: &str| {
        if *budget == 0 {
            return;
        }
        let term = term.to_string();
        if !terms.contains(&term) {
            terms.push(term);
            *budget -= 1;
        }
    };

    for group in CONSTRUCT_SYNONYMS.iter().chain(CROSS_LANGUAGE_SYNONYMS) {
        if group.iter().any(|member| originals.iter().any(|t| t == member)) {
            for member in *group {
                push(&mut terms, &mut budget, member);
            }
        }
    }
    for term in intent_terms(intent) {
        push(&mut terms, &mut budget, term);
    }

    ExpandedQuery {
        original: query.to_string(),
        terms,
        intent,
    }
}
