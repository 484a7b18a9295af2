use assert_json_diff::{assert_json_matches_no_panic, CompareMode, Config};
use serde_json::Value;
use similar::{ChangeTag, TextDiff};
use sxd_document::{dom, parser};

use crate::common::data::{Diff, DiffResult, HttpStubRegex, Tokenizer};

/// The highest score a non-exact comparison can produce. Keeps fractional
/// near-miss scores strictly below the exact-match threshold.
const MAX_PARTIAL_SCORE: f64 = 0.99;

/// Scores candidate equality against an expected string. Exact equality yields 1.0;
/// anything else yields a normalized edit-distance similarity strictly below 1.0,
/// which feeds the near-miss ranking.
pub fn equality_score(expected: &str, candidate: &str) -> f64 {
    if expected == candidate {
        return 1.0;
    }

    let max_len = expected.chars().count().max(candidate.chars().count());
    if max_len == 0 {
        return 1.0;
    }

    let distance = stringmetrics::levenshtein(expected, candidate) as f64;
    let similarity = 1.0 - (distance / max_len as f64);
    similarity.clamp(0.0, MAX_PARTIAL_SCORE)
}

pub fn contains_score(expected: &str, candidate: &str) -> f64 {
    if candidate.contains(expected) {
        1.0
    } else {
        // Rank candidates that carry a fragment of the expected substring above
        // ones that share nothing with it.
        equality_score(expected, candidate).min(MAX_PARTIAL_SCORE)
    }
}

/// Whole-candidate regex match, per the pattern's dot-all/multiline compilation.
pub fn regex_score(pattern: &HttpStubRegex, candidate: &str) -> f64 {
    if pattern.is_full_match(candidate) {
        1.0
    } else {
        0.0
    }
}

pub fn negated_regex_score(pattern: &HttpStubRegex, candidate: &str) -> f64 {
    if pattern.is_full_match(candidate) {
        0.0
    } else {
        1.0
    }
}

/// Compares a candidate JSON document against an expected one. In lenient mode key
/// order is ignored and extra fields on the candidate side are tolerated; missing
/// fields always fail. A candidate that does not parse as JSON is a non-match,
/// never an error.
pub fn json_score(expected: &Value, candidate: &str, lenient: bool) -> f64 {
    let actual: Value = match serde_json::from_str(candidate) {
        Ok(value) => value,
        Err(_) => {
            let rendered = serde_json::to_string(expected).unwrap_or_default();
            return text_similarity(&rendered, candidate);
        }
    };

    // Inclusive comparison tolerates extra fields on the candidate (left) side.
    let mode = if lenient {
        CompareMode::Inclusive
    } else {
        CompareMode::Strict
    };
    let equal = assert_json_matches_no_panic(&actual, expected, Config::new(mode)).is_ok();

    if equal {
        return 1.0;
    }

    let expected_str = serde_json::to_string_pretty(expected).unwrap_or_default();
    let actual_str = serde_json::to_string_pretty(&actual).unwrap_or_default();
    text_similarity(&expected_str, &actual_str)
}

/// Compares a candidate XML document structurally against an expected one,
/// ignoring attribute order and inter-element whitespace. A candidate that does
/// not parse is a non-match, never an error.
pub fn xml_score(expected: &str, candidate: &str) -> f64 {
    let expected_canonical = match canonical_xml(expected) {
        Some(c) => c,
        // An unparsable expectation can never match anything.
        None => return 0.0,
    };

    let candidate_canonical = match canonical_xml(candidate) {
        Some(c) => c,
        None => return text_similarity(expected, candidate),
    };

    if expected_canonical == candidate_canonical {
        return 1.0;
    }

    text_similarity(&expected_canonical, &candidate_canonical)
}

fn canonical_xml(xml: &str) -> Option<String> {
    let package = parser::parse(xml).ok()?;
    let document = package.as_document();

    let mut out = String::new();
    for child in document.root().children() {
        if let dom::ChildOfRoot::Element(element) = child {
            canonicalize_element(element, &mut out);
        }
    }

    Some(out)
}

fn canonicalize_element(element: dom::Element, out: &mut String) {
    out.push('<');
    out.push_str(element.name().local_part());

    let mut attributes: Vec<(String, String)> = element
        .attributes()
        .iter()
        .map(|a| (a.name().local_part().to_string(), a.value().to_string()))
        .collect();
    attributes.sort();

    for (name, value) in attributes {
        out.push(' ');
        out.push_str(&name);
        out.push_str("=\"");
        out.push_str(&value);
        out.push('"');
    }
    out.push('>');

    for child in element.children() {
        match child {
            dom::ChildOfElement::Element(child_element) => {
                canonicalize_element(child_element, out)
            }
            dom::ChildOfElement::Text(text) => {
                let trimmed = text.text().trim();
                if !trimmed.is_empty() {
                    out.push_str(trimmed);
                }
            }
            _ => {}
        }
    }

    out.push_str("</");
    out.push_str(element.name().local_part());
    out.push('>');
}

/// A [0, 1) similarity between two texts, used for fractional near-miss scores of
/// structured comparisons that have no natural edit distance.
pub fn text_similarity(expected: &str, actual: &str) -> f64 {
    let ratio = TextDiff::from_chars(expected, actual).ratio() as f64;
    ratio.clamp(0.0, MAX_PARTIAL_SCORE)
}

pub fn diff_str(base: &str, edit: &str, tokenizer: Tokenizer) -> DiffResult {
    let changes = match tokenizer {
        Tokenizer::Line => TextDiff::from_lines(base, edit),
        Tokenizer::Word => TextDiff::from_words(base, edit),
        Tokenizer::Character => TextDiff::from_chars(base, edit),
    };

    DiffResult {
        tokenizer,
        distance: changes.ratio(),
        differences: changes
            .iter_all_changes()
            .map(|change| match change.tag() {
                ChangeTag::Equal => Diff::Same(change.to_string_lossy().to_string()),
                ChangeTag::Insert => Diff::Add(change.to_string_lossy().to_string()),
                ChangeTag::Delete => Diff::Rem(change.to_string_lossy().to_string()),
            })
            .collect(),
    }
}

#[cfg(test)]
mod equality_score_tests {
    use super::*;

    #[test]
    fn exact_equality_scores_one() {
        assert_eq!(equality_score("hello", "hello"), 1.0);
        assert_eq!(equality_score("", ""), 1.0);
    }

    #[test]
    fn inequality_scores_below_one() {
        let score = equality_score("hello", "hallo");
        assert!(score < 1.0);
        assert!(score > 0.0);
    }

    #[test]
    fn closer_strings_score_higher() {
        let close = equality_score("/hello", "/hallo");
        let far = equality_score("/hello", "/completely/other");
        assert!(close > far);
    }
}
