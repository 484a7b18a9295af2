use std::{collections::BTreeMap, sync::Mutex};

use serde::{Deserialize, Serialize};

use crate::common::data::ScenarioBinding;

/// The state every scenario starts in.
pub const STARTED: &str = "started";

/// A named state register observed by the administrative surface.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    pub name: String,
    pub state: String,
}

/// Holds the current state of every scenario referenced by a stub mapping.
///
/// Scenarios materialize the first time their state is read, set or transitioned;
/// merely registering a mapping that references one creates no state. The internal
/// lock serializes transitions, so two concurrent winning matches on the same
/// scenario cannot race to an inconsistent state.
pub struct ScenarioRegistry {
    states: Mutex<BTreeMap<String, String>>,
}

impl ScenarioRegistry {
    pub fn new() -> Self {
        ScenarioRegistry {
            states: Mutex::new(BTreeMap::new()),
        }
    }

    /// The current state of the scenario, creating it in its initial state when
    /// unseen.
    pub fn current_state(&self, name: &str) -> String {
        let mut states = self.states.lock().unwrap();
        states
            .entry(name.to_string())
            .or_insert_with(|| STARTED.to_string())
            .clone()
    }

    /// The state a scenario would report without materializing it.
    pub(crate) fn observed_state(&self, name: &str) -> String {
        let states = self.states.lock().unwrap();
        states
            .get(name)
            .cloned()
            .unwrap_or_else(|| STARTED.to_string())
    }

    pub fn set_state<S: Into<String>>(&self, name: &str, state: S) {
        let state = state.into();
        tracing::debug!("Setting scenario {:?} to state {:?}", name, state);

        let mut states = self.states.lock().unwrap();
        states.insert(name.to_string(), state);
    }

    /// Reverts one scenario to its initial state.
    pub fn reset_one(&self, name: &str) {
        self.set_state(name, STARTED);
    }

    /// Reverts every scenario to its initial state.
    pub fn reset_all(&self) {
        let mut states = self.states.lock().unwrap();
        states.clear();

        tracing::trace!("Reset all scenarios");
    }

    pub fn all(&self) -> Vec<Scenario> {
        let states = self.states.lock().unwrap();
        states
            .iter()
            .map(|(name, state)| Scenario {
                name: name.clone(),
                state: state.clone(),
            })
            .collect()
    }

    /// Whether a mapping carrying this binding may be considered for matching.
    /// A binding without a required state is always eligible; it represents the
    /// entry point of its scenario.
    pub fn is_eligible(&self, binding: &ScenarioBinding) -> bool {
        match &binding.required_state {
            None => true,
            Some(required) => self.observed_state(&binding.scenario) == *required,
        }
    }

    /// Applies the state transition of a winning match. Must run before the serve
    /// event is journaled so a subsequent request observes the new state.
    pub fn apply_transition(&self, binding: &ScenarioBinding) {
        if let Some(new_state) = &binding.new_state {
            let mut states = self.states.lock().unwrap();
            let previous = states.insert(binding.scenario.clone(), new_state.clone());

            tracing::debug!(
                "Scenario {:?} transitioned from {:?} to {:?}",
                binding.scenario,
                previous.unwrap_or_else(|| STARTED.to_string()),
                new_state
            );
        }
    }
}

impl Default for ScenarioRegistry {
    fn default() -> Self {
        ScenarioRegistry::new()
    }
}
