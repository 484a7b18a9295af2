extern crate httpstub;

use httpstub::prelude::*;
use httpstub::Error;

fn get(uri: &str) -> HttpStubRequest {
    HttpStubRequest::builder().method("GET").uri(uri).build()
}

fn stub_for(pattern: RequestPattern) -> StubMapping {
    StubMapping::new(pattern, ResponseDefinition::status(200))
}

#[test]
fn resolves_a_simple_get_mapping() {
    // Arrange
    let registry = StubRegistry::new();
    let stub = registry
        .add_stub(stub_for(
            RequestPattern::builder()
                .method(Method::GET)
                .url("/hello")
                .build()
                .unwrap(),
        ))
        .unwrap();

    // Act
    let hit = registry.serve_for(&get("/hello"));
    let miss = registry.serve_for(
        &HttpStubRequest::builder()
            .method("POST")
            .uri("/hello")
            .build(),
    );

    // Assert
    assert!(hit.was_matched);
    assert_eq!(hit.stub.unwrap().id, stub.id);
    assert_eq!(hit.response.unwrap().status, Some(200));

    assert!(!miss.was_matched);
    assert!(miss.stub.is_none());
    assert!(miss.response.is_none());
}

#[test]
fn lower_priority_value_wins() {
    // Arrange
    let registry = StubRegistry::new();
    let pattern = || RequestPattern::builder().url("/a").build().unwrap();

    registry
        .add_stub(stub_for(pattern()).with_priority(5))
        .unwrap();
    let important = registry
        .add_stub(stub_for(pattern()).with_priority(1))
        .unwrap();

    // Act
    let outcome = registry.serve_for(&get("/a"));

    // Assert
    assert_eq!(outcome.stub.unwrap().id, important.id);
}

#[test]
fn most_recently_registered_wins_among_equal_priorities() {
    // Arrange
    let registry = StubRegistry::new();
    let pattern = || RequestPattern::builder().url("/a").build().unwrap();

    registry.add_stub(stub_for(pattern())).unwrap();
    let newer = registry.add_stub(stub_for(pattern())).unwrap();

    // Act
    let outcome = registry.serve_for(&get("/a"));

    // Assert: the newer mapping shadows the older identical one.
    assert_eq!(outcome.stub.unwrap().id, newer.id);
}

#[test]
fn repeated_resolution_is_deterministic_without_mutation() {
    let registry = StubRegistry::new();
    let stub = registry
        .add_stub(stub_for(
            RequestPattern::builder().url("/x").build().unwrap(),
        ))
        .unwrap();

    for _ in 0..3 {
        let outcome = registry.serve_for(&get("/x"));
        assert_eq!(outcome.stub.unwrap().id, stub.id);
    }
}

#[test]
fn duplicate_id_registration_is_a_conflict() {
    let registry = StubRegistry::new();
    let pattern = || RequestPattern::builder().url("/a").build().unwrap();

    registry.add_stub(stub_for(pattern()).with_id(7)).unwrap();
    let result = registry.add_stub(stub_for(pattern()).with_id(7));

    assert!(matches!(result, Err(Error::DuplicateStubId(7))));
    assert_eq!(registry.all_stubs().len(), 1);
}

#[test]
fn edit_preserves_tie_break_order() {
    // Arrange: two identical mappings, B registered after A.
    let registry = StubRegistry::new();
    let pattern = || RequestPattern::builder().url("/a").build().unwrap();

    let a = registry.add_stub(stub_for(pattern())).unwrap();
    let b = registry.add_stub(stub_for(pattern())).unwrap();

    // Act: editing A must not make it win ties against B.
    let edited = stub_for(pattern()).with_id(a.id).with_name("edited");
    registry.edit_stub(edited).unwrap().unwrap();

    // Assert
    let outcome = registry.serve_for(&get("/a"));
    assert_eq!(outcome.stub.unwrap().id, b.id);
    assert_eq!(
        registry.get_stub(a.id).unwrap().mapping.name.as_deref(),
        Some("edited")
    );
}

#[test]
fn resequencing_edit_assigns_a_fresh_tie_break_position() {
    let registry = StubRegistry::new();
    let pattern = || RequestPattern::builder().url("/a").build().unwrap();

    let a = registry.add_stub(stub_for(pattern())).unwrap();
    registry.add_stub(stub_for(pattern())).unwrap();

    registry
        .edit_stub_resequencing(stub_for(pattern()).with_id(a.id))
        .unwrap()
        .unwrap();

    let outcome = registry.serve_for(&get("/a"));
    assert_eq!(outcome.stub.unwrap().id, a.id);
}

#[test]
fn editing_an_unknown_id_returns_none() {
    let registry = StubRegistry::new();
    let result = registry
        .edit_stub(stub_for(RequestPattern::builder().build().unwrap()).with_id(99))
        .unwrap();
    assert!(result.is_none());
}

#[test]
fn add_then_remove_restores_prior_contents() {
    // Arrange
    let registry = StubRegistry::new();
    registry
        .add_stub(stub_for(
            RequestPattern::builder().url("/a").build().unwrap(),
        ))
        .unwrap();
    let before: Vec<usize> = registry.all_stubs().iter().map(|s| s.id).collect();

    // Act
    let added = registry
        .add_stub(
            stub_for(RequestPattern::builder().url("/b").build().unwrap())
                .in_scenario("checkout", None, Some("paid".to_string())),
        )
        .unwrap();
    assert!(registry.remove_stub(added.id));

    // Assert: same ids, same order, and registration alone changed no scenario.
    let after: Vec<usize> = registry.all_stubs().iter().map(|s| s.id).collect();
    assert_eq!(before, after);
    assert!(registry.all_scenarios().is_empty());
}

#[test]
fn removing_an_unknown_id_is_distinguishable() {
    let registry = StubRegistry::new();
    assert!(!registry.remove_stub(123));
}

#[test]
fn reset_restores_the_default_set() {
    // Arrange: defaults come from the mapping-loader collaborator.
    let registry = StubRegistry::new();
    let default = registry
        .load_defaults(vec![stub_for(
            RequestPattern::builder().url("/default").build().unwrap(),
        )])
        .unwrap()
        .remove(0);

    registry
        .add_stub(stub_for(
            RequestPattern::builder().url("/extra").build().unwrap(),
        ))
        .unwrap();

    // Act
    registry.reset();

    // Assert
    let stubs = registry.all_stubs();
    assert_eq!(stubs.len(), 1);
    assert_eq!(stubs[0].id, default.id);
    assert!(registry.serve_for(&get("/default")).was_matched);
    assert!(!registry.serve_for(&get("/extra")).was_matched);
}

#[test]
fn delete_all_keeps_defaults_and_persistent_mappings() {
    let registry = StubRegistry::new();
    registry
        .load_defaults(vec![stub_for(
            RequestPattern::builder().url("/default").build().unwrap(),
        )])
        .unwrap();
    registry
        .add_stub(
            stub_for(RequestPattern::builder().url("/keep").build().unwrap()).persistent(),
        )
        .unwrap();
    registry
        .add_stub(stub_for(
            RequestPattern::builder().url("/drop").build().unwrap(),
        ))
        .unwrap();

    registry.delete_all_stubs();

    assert!(registry.serve_for(&get("/default")).was_matched);
    assert!(registry.serve_for(&get("/keep")).was_matched);
    assert!(!registry.serve_for(&get("/drop")).was_matched);
}

#[test]
fn winning_matches_increment_the_call_counter() {
    let registry = StubRegistry::new();
    let stub = registry
        .add_stub(stub_for(
            RequestPattern::builder().url("/count").build().unwrap(),
        ))
        .unwrap();

    registry.serve_for(&get("/count"));
    registry.serve_for(&get("/count"));
    registry.serve_for(&get("/other"));

    assert_eq!(registry.get_stub(stub.id).unwrap().call_counter, 2);
}

#[test]
fn find_by_metadata_matches_structurally() {
    let registry = StubRegistry::new();
    let tagged = registry
        .add_stub(
            stub_for(RequestPattern::builder().url("/a").build().unwrap())
                .with_metadata(serde_json::json!({"team": "payments", "tier": 1})),
        )
        .unwrap();
    registry
        .add_stub(stub_for(RequestPattern::builder().url("/b").build().unwrap()))
        .unwrap();

    let found =
        registry.find_by_metadata(&ValuePattern::equal_to_json_lenient(serde_json::json!({
            "team": "payments"
        })));

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, tagged.id);
}

#[test]
fn path_template_parameters_reach_the_serve_outcome() {
    let registry = StubRegistry::new();
    registry
        .add_stub(stub_for(
            RequestPattern::builder()
                .path_template("/orders/{id}")
                .unwrap()
                .build()
                .unwrap(),
        ))
        .unwrap();

    let outcome = registry.serve_for(&get("/orders/42"));

    assert!(outcome.was_matched);
    assert_eq!(
        outcome.path_parameters.get("id").map(String::as_str),
        Some("42")
    );
}
