extern crate httpstub;

use httpstub::prelude::*;
use httpstub::{NearMiss, NearMissCandidate, DEFAULT_NEAR_MISS_COUNT, STARTED};

fn request(method: &str, uri: &str) -> HttpStubRequest {
    HttpStubRequest::builder().method(method).uri(uri).build()
}

fn stub(method: Method, url: &str, status: u16) -> StubMapping {
    StubMapping::new(
        RequestPattern::builder().method(method).url(url).build().unwrap(),
        ResponseDefinition::status(status),
    )
}

fn candidate_url(near_miss: &NearMiss) -> String {
    match &near_miss.candidate {
        NearMissCandidate::Stub(mapping) => mapping
            .request
            .url
            .as_ref()
            .map(|url| url.expected())
            .unwrap_or_default(),
        NearMissCandidate::Pattern(_) => panic!("expected a stub candidate"),
    }
}

#[test]
fn empty_registry_yields_no_near_misses() {
    let registry = StubRegistry::new();

    let misses = registry.nearest_misses_for(&request("GET", "/hello"), 3);

    assert!(misses.is_empty());
}

#[test]
fn closest_mapping_is_ranked_first() {
    // Arrange: one mapping off by method only, one off by method and path.
    let _ = env_logger::try_init();
    let registry = StubRegistry::new();
    registry.add_stub(stub(Method::GET, "/hello", 200)).unwrap();
    registry.add_stub(stub(Method::GET, "/something/else", 200)).unwrap();

    // Act
    let misses = registry.nearest_misses_for(&request("POST", "/hello"), 3);

    // Assert
    assert_eq!(misses.len(), 2);
    assert_eq!(candidate_url(&misses[0]), "/hello");
    assert!(misses[0].result.score > misses[1].result.score);
}

#[test]
fn only_non_exact_sections_are_listed_as_mismatches() {
    let registry = StubRegistry::new();
    registry.add_stub(stub(Method::GET, "/hello", 200)).unwrap();

    let misses = registry.nearest_misses_for(&request("POST", "/hello"), 3);

    let result = &misses[0].result;
    assert_eq!(result.mismatches.len(), 1);

    let mismatch = &result.mismatches[0];
    assert_eq!(mismatch.entity, "method");
    assert_eq!(mismatch.expected, "GET");
    assert_eq!(mismatch.actual.as_deref(), Some("POST"));
    assert_eq!(mismatch.score, 0.0);
}

#[test]
fn near_miss_count_is_capped_at_the_requested_limit() {
    let registry = StubRegistry::new();
    for path in ["/a", "/b", "/c", "/d", "/e"] {
        registry.add_stub(stub(Method::GET, path, 200)).unwrap();
    }

    let misses = registry.nearest_misses_for(&request("POST", "/a"), 3);

    assert_eq!(misses.len(), 3);
}

#[test]
fn default_near_miss_count_applies_without_an_explicit_limit() {
    let registry = StubRegistry::new();
    for path in ["/a", "/b", "/c", "/d", "/e"] {
        registry.add_stub(stub(Method::GET, path, 200)).unwrap();
    }

    let misses = registry.nearest_misses(&request("POST", "/a"));

    assert_eq!(misses.len(), DEFAULT_NEAR_MISS_COUNT);
    assert_eq!(candidate_url(&misses[0]), "/a");
}

#[test]
fn ineligible_scenario_mappings_are_still_scored() {
    // Near-miss diagnostics ignore scenario gating and report the state instead.
    let registry = StubRegistry::new();
    registry
        .add_stub(stub(Method::GET, "/cart", 200).in_scenario(
            "checkout",
            Some("paid".to_string()),
            None,
        ))
        .unwrap();
    registry.set_scenario_state("checkout", STARTED);

    let misses = registry.nearest_misses_for(&request("POST", "/cart"), 3);

    assert_eq!(misses.len(), 1);
    assert_eq!(misses[0].scenario_state.as_deref(), Some(STARTED));
}

#[test]
fn journaled_requests_can_be_ranked_against_a_pattern() {
    // Arrange: nothing matches, so both serves land in the journal unmatched.
    let registry = StubRegistry::new();
    registry.serve_for(&request("GET", "/hello"));
    registry.serve_for(&request("DELETE", "/something/else"));

    let pattern = RequestPattern::builder()
        .method(Method::GET)
        .url("/hello")
        .build()
        .unwrap();

    // Act
    let misses = registry.nearest_misses_to_pattern(&pattern, 3).unwrap();

    // Assert: the request differing in nothing ranks above the one differing
    // in method and path.
    assert_eq!(misses.len(), 2);
    assert_eq!(misses[0].request.uri_str(), "/hello");
    assert!(misses[0].result.is_exact_match());
    assert!(!misses[1].result.is_exact_match());
    assert!(matches!(misses[0].candidate, NearMissCandidate::Pattern(_)));
}
