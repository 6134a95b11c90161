//! Relevance scoring for search hits
//!
//! Candidates come from the FTS5 index; the score attached to each hit is a
//! weighted, saturating term-frequency measure so that it stays on a fixed
//! scale regardless of corpus size. Title hits weigh more than body hits.

use std::collections::HashMap;

/// Weight of a query term found in the page title
pub const TITLE_WEIGHT: f64 = 1.0;

/// Weight of a query term found in the page content
pub const CONTENT_WEIGHT: f64 = 0.4;

/// Splits free text into lowercase alphanumeric terms
pub fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for term in tokenize(query) {
        if !terms.contains(&term) {
            terms.push(term);
        }
    }
    terms
}

/// Builds an FTS5 MATCH expression requiring every term
///
/// Each term is quoted so that user input can never be read as FTS5 query
/// syntax.
pub fn match_expression(terms: &[String]) -> String {
    terms
        .iter()
        .map(|t| format!("\"{}\"", t))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Scores a document against the query terms
///
/// Every term contributes `weight * tf / (tf + 1)` for the title and for the
/// content; the sum is averaged over the terms. A single content occurrence
/// of a one-word query scores 0.2, a single title occurrence 0.5.
pub fn rank_document(terms: &[String], title: &str, content: &str) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }

    let title_counts = term_counts(title);
    let content_counts = term_counts(content);

    let total: f64 = terms
        .iter()
        .map(|term| {
            TITLE_WEIGHT * saturate(title_counts.get(term.as_str()).copied().unwrap_or(0))
                + CONTENT_WEIGHT
                    * saturate(content_counts.get(term.as_str()).copied().unwrap_or(0))
        })
        .sum();

    total / terms.len() as f64
}

fn saturate(tf: usize) -> f64 {
    let tf = tf as f64;
    tf / (tf + 1.0)
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

fn term_counts(text: &str) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for term in tokenize(text) {
        *counts.entry(term).or_insert(0) += 1;
    }
    counts
}
