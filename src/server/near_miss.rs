use std::sync::Arc;

use crate::{
    common::data::{ActiveStub, HttpStubRequest, NearMiss, NearMissCandidate},
    server::{
        matchers::{CustomMatchers, RequestPattern},
        scenario::ScenarioRegistry,
    },
};

/// How many near misses a calculation returns when the caller does not choose.
pub const DEFAULT_NEAR_MISS_COUNT: usize = 3;

/// Scores every stub against an unmatched request and returns the closest few,
/// ranked by descending score with registry order breaking ties. Scenario
/// eligibility is deliberately ignored: near misses are explanatory, not
/// eligibility-filtered.
pub fn nearest_stubs_to_request(
    request: &HttpStubRequest,
    stubs: &[ActiveStub],
    scenarios: &ScenarioRegistry,
    custom: &CustomMatchers,
    limit: usize,
) -> Vec<NearMiss> {
    let mut scored: Vec<(usize, NearMiss)> = stubs
        .iter()
        .enumerate()
        .map(|(registry_order, stub)| {
            let result = stub.mapping.request.match_result(request, custom);
            let scenario_state = stub
                .mapping
                .scenario
                .as_ref()
                .map(|binding| scenarios.observed_state(&binding.scenario));
            (
                registry_order,
                NearMiss {
                    request: request.clone(),
                    candidate: NearMissCandidate::Stub(stub.mapping.clone()),
                    result,
                    scenario_state,
                },
            )
        })
        .collect();

    scored.sort_by(|(order_a, a), (order_b, b)| {
        b.result
            .score
            .partial_cmp(&a.result.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(order_a.cmp(order_b))
    });

    scored
        .into_iter()
        .take(limit)
        .map(|(_, near_miss)| near_miss)
        .collect()
}

/// Scores journaled requests against a free request pattern, for verification
/// calls that ask "which requests came closest to this expectation".
pub fn nearest_requests_to_pattern(
    pattern: &RequestPattern,
    requests: &[Arc<HttpStubRequest>],
    custom: &CustomMatchers,
    limit: usize,
) -> Vec<NearMiss> {
    let mut scored: Vec<(usize, NearMiss)> = requests
        .iter()
        .enumerate()
        .map(|(order, request)| {
            let result = pattern.match_result(request, custom);
            (
                order,
                NearMiss {
                    request: HttpStubRequest::clone(request),
                    candidate: NearMissCandidate::Pattern(pattern.clone()),
                    result,
                    scenario_state: None,
                },
            )
        })
        .collect();

    scored.sort_by(|(order_a, a), (order_b, b)| {
        b.result
            .score
            .partial_cmp(&a.result.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(order_a.cmp(order_b))
    });

    scored
        .into_iter()
        .take(limit)
        .map(|(_, near_miss)| near_miss)
        .collect()
}
