//! Custom Test Assertions
//!
//! Assertion helpers for KOE types that give more meaningful failure
//! messages than `assert_eq!` on whole structs.

use domain_koe::{OverordnetStatus, Regel, SakState, SporStatus, SporType, ValidationResult};

/// Asserts that a validation passed
///
/// # Panics
///
/// Panics with the violated rule and message if the validation failed
pub fn assert_valid(result: &ValidationResult) {
    assert!(
        result.is_valid,
        "Expected valid event, rejected by {:?}: {}",
        result.violated_rule,
        result.message.as_deref().unwrap_or("")
    );
}

/// Asserts that a validation failed on the given rule
///
/// # Arguments
///
/// * `result` - The validation result
/// * `regel` - The rule expected to be reported
pub fn assert_rule_violated(result: &ValidationResult, regel: Regel) {
    assert!(
        !result.is_valid,
        "Expected violation of {regel}, but the event was accepted"
    );
    assert_eq!(
        result.violated_rule,
        Some(regel),
        "Wrong rule reported (message: {})",
        result.message.as_deref().unwrap_or("")
    );
    assert!(
        result.message.as_deref().is_some_and(|m| !m.is_empty()),
        "Violation of {regel} carries no message"
    );
}

/// Asserts the status of one track
pub fn assert_spor_status(state: &SakState, spor: SporType, expected: SporStatus) {
    assert_eq!(
        state.spor_status(spor),
        expected,
        "Unexpected status on {} track",
        spor.as_str()
    );
}

/// Asserts the overall status and the derived change-order flag together
pub fn assert_overordnet(state: &SakState, status: OverordnetStatus, kan_utstede_eo: bool) {
    assert_eq!(state.overordnet_status, status, "Unexpected overall status");
    assert_eq!(
        state.kan_utstede_eo, kan_utstede_eo,
        "Unexpected kan_utstede_eo for tracks {:?}/{:?}/{:?}",
        state.grunnlag.status(),
        state.vederlag.status,
        state.frist.status
    );
}
