//! Property-Based Test Generators
//!
//! Proptest strategies for identifiers, statuses and whole case logs.
//! Generated logs are arbitrary but well-formed: every event belongs to the
//! same case and carries a valid payload.

use proptest::prelude::*;
use serde_json::json;

use core_kernel::SakId;
use domain_koe::{AktorRolle, Event, EventType, SporStatus};

use crate::builders::EventBuilder;
use crate::fixtures::{DataFixtures, IdFixtures, TemporalFixtures};

/// Strategy for valid case identifiers
pub fn sak_id_strategy() -> impl Strategy<Value = SakId> {
    "[A-Za-z0-9_-]{1,32}".prop_map(|s| SakId::new(s).unwrap())
}

pub fn spor_status_strategy() -> impl Strategy<Value = SporStatus> {
    prop::sample::select(SporStatus::ALL.to_vec())
}

pub fn event_type_strategy() -> impl Strategy<Value = EventType> {
    prop::sample::select(EventType::ALL.to_vec())
}

pub fn rolle_strategy() -> impl Strategy<Value = AktorRolle> {
    prop_oneof![Just(AktorRolle::Te), Just(AktorRolle::Bh)]
}

/// Strategy for response payloads covering every outcome
pub fn respons_data_strategy() -> impl Strategy<Value = serde_json::Value> {
    prop_oneof![
        Just(DataFixtures::godkjent()),
        Just(DataFixtures::avslatt()),
        Just(json!({"resultat": "DELVIS_GODKJENT", "godkjent_belop": "50000", "godkjent_dager": 5})),
    ]
}

fn event_data(event_type: EventType, respons: serde_json::Value) -> serde_json::Value {
    if event_type.er_respons() {
        respons
    } else {
        DataFixtures::standard(event_type)
    }
}

/// Strategy for a log of one case, in arbitrary (possibly rule-breaking) order
///
/// # Arguments
///
/// * `max_len` - Upper bound on the number of events after `sak_opprettet`
pub fn event_log_strategy(max_len: usize) -> impl Strategy<Value = Vec<Event>> {
    prop::collection::vec(
        (event_type_strategy(), rolle_strategy(), respons_data_strategy()),
        0..=max_len,
    )
    .prop_map(|steps| {
        let sak_id = IdFixtures::sak_id();
        let mut events = vec![EventBuilder::new(EventType::SakOpprettet)
            .sak(sak_id.clone())
            .build()];
        for (event_type, rolle, respons) in steps {
            let event = EventBuilder::new(event_type)
                .sak(sak_id.clone())
                .rolle(rolle)
                .data(event_data(event_type, respons))
                .at(TemporalFixtures::step(events.len()))
                .build();
            events.push(event);
        }
        events
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn test_sak_id_strategy_generates_valid_ids(id in sak_id_strategy()) {
            prop_assert!(SakId::new(id.as_str()).is_ok());
        }

        #[test]
        fn test_event_log_starts_with_creation(log in event_log_strategy(8)) {
            prop_assert_eq!(log[0].event_type(), EventType::SakOpprettet);
            prop_assert!(log.iter().all(|e| e.sak_id == log[0].sak_id));
        }
    }
}
