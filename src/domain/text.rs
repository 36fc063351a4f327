//! Text normalization, keyword extraction and content fingerprints.
//!
//! Everything here is pure and deterministic. The fingerprint is the
//! cheap duplicate pre-filter; keywords feed the heuristic fallbacks
//! (coverage overlap, topic matching, lexical similarity).

use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

const STOP_WORDS: &[&str] = &[
    "a", "about", "all", "an", "and", "any", "are", "as", "at", "be", "by", "can", "do", "does",
    "for", "from", "get", "has", "have", "in", "into", "is", "it", "its", "more", "most", "of",
    "on", "or", "our", "so", "some", "that", "the", "their", "them", "then", "these", "this",
    "those", "to", "up", "us", "we", "what", "when", "which", "while", "will", "with", "within",
    "without", "you", "your", "task", "tasks", "todo", "item", "items", "thing", "things",
    "stuff", "work", "related",
];

/// Case-fold and collapse every whitespace run to a single space.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Hex SHA-256 of the normalized text.
pub fn fingerprint(text: &str) -> String {
    let digest = Sha256::digest(normalize(text).as_bytes());
    hex::encode(digest)
}

/// Lower-cased alphanumeric words, apostrophes folded away.
pub fn tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .replace(['\u{2019}', '\''], "")
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Light suffix stripping; prefix matching in [`stems_match`] does the rest.
pub fn stem(word: &str) -> String {
    let w = word.to_lowercase();
    if w.len() > 4 && w.ends_with("ies") {
        return format!("{}y", &w[..w.len() - 3]);
    }
    if w.len() > 3 && w.ends_with('s') && !w.ends_with("ss") {
        return w[..w.len() - 1].to_string();
    }
    w
}

/// Stemmed content words, stop words and bare numbers removed, order preserved.
pub fn keywords(text: &str) -> Vec<String> {
    keywords_without(text, &[])
}

/// [`keywords`] with `ignored` words also dropped.
///
/// A word is dropped when either its surface form or its stem is listed, so
/// `focus` goes even though it stems to `focu`.
pub fn keywords_without(text: &str, ignored: &[&str]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    tokens(text)
        .into_iter()
        .filter(|t| !STOP_WORDS.contains(&t.as_str()) && !ignored.contains(&t.as_str()))
        .filter(|t| !t.chars().all(|c| c.is_ascii_digit()))
        .map(|t| stem(&t))
        .filter(|t| t.len() > 1 && !ignored.contains(&t.as_str()) && seen.insert(t.clone()))
        .collect()
}

/// Two stems match when equal or when the shorter (at least three
/// characters) is a prefix of the longer: `doc` ~ `documentation`.
pub fn stems_match(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    short.len() >= 3 && long.starts_with(short)
}

/// Whether any keyword of `text` matches any of `topic_keywords`.
pub fn mentions_any(text: &str, topic_keywords: &[String]) -> bool {
    let words = keywords(text);
    topic_keywords
        .iter()
        .any(|k| words.iter().any(|w| stems_match(w, k)))
}

/// Jaccard overlap of keyword sets under [`stems_match`].
pub fn keyword_overlap(a: &str, b: &str) -> f64 {
    let ka = keywords(a);
    let kb = keywords(b);
    if ka.is_empty() || kb.is_empty() {
        return 0.0;
    }
    let shared = ka
        .iter()
        .filter(|x| kb.iter().any(|y| stems_match(x, y)))
        .count();
    let union = (ka.len() + kb.len()).saturating_sub(shared).max(1);
    (shared as f64 / union as f64).min(1.0)
}
