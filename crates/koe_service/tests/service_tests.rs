//! Service tests
//!
//! End-to-end write and read paths over the in-memory and file stores.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use core_kernel::{DomainPort, PortError, SakId};
use domain_koe::{
    AktorRolle, EoStatus, EventType, OverordnetStatus, Regel, SporStatus, SporType, Submission,
};
use infra_store::{open_store, StoreConfig};
use koe_service::{
    InMemoryMetadataCache, KoeService, MetadataCache, NotificationSink, SakMetadata,
    ServiceError, Tilstandsendring,
};
use test_utils::{assert_spor_status, DataFixtures, EventBuilder, IdFixtures};

async fn service() -> KoeService {
    let store = open_store(&StoreConfig::memory()).await.unwrap();
    KoeService::new(Arc::new(store))
}

fn innsending(event_type: EventType) -> Submission {
    EventBuilder::new(event_type).submission()
}

fn innsending_for(sak_id: &SakId, event_type: EventType) -> Submission {
    EventBuilder::new(event_type).sak(sak_id.clone()).submission()
}

/// Submits events one by one, each against the version the previous returned
async fn send_alle(service: &KoeService, types: &[EventType]) -> u64 {
    let mut version = 0;
    for event_type in types {
        version = service
            .submit(innsending(*event_type), version)
            .await
            .unwrap_or_else(|e| panic!("{event_type} rejected: {e}"))
            .version;
    }
    version
}

#[derive(Default)]
struct RecordingSink {
    seen: Mutex<Vec<(EventType, OverordnetStatus, OverordnetStatus)>>,
}

impl DomainPort for RecordingSink {}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn varsle(&self, endring: Tilstandsendring<'_>) -> Result<(), PortError> {
        self.seen.lock().unwrap().push((
            endring.hendelse.event_type(),
            endring.gammel.overordnet_status,
            endring.ny.overordnet_status,
        ));
        Ok(())
    }
}

struct FailingSink;

impl DomainPort for FailingSink {}

#[async_trait]
impl NotificationSink for FailingSink {
    async fn varsle(&self, _endring: Tilstandsendring<'_>) -> Result<(), PortError> {
        Err(PortError::connection("sink offline"))
    }
}

#[async_trait]
impl MetadataCache for FailingSink {
    async fn oppdater(&self, _metadata: SakMetadata) -> Result<(), PortError> {
        Err(PortError::connection("cache offline"))
    }
}

// ============================================================================
// Write path
// ============================================================================

mod submit_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_create_then_send_grunnlag() {
        let service = service().await;

        let created = service.submit(innsending(EventType::SakOpprettet), 0).await.unwrap();
        assert_eq!(created.version, 1);
        assert_eq!(created.event_ids.len(), 1);
        assert_eq!(created.state.overordnet_status, OverordnetStatus::IngenAktiveSpor);

        let sent = service
            .submit(innsending(EventType::GrunnlagOpprettet), 1)
            .await
            .unwrap();
        assert_eq!(sent.version, 2);
        assert_spor_status(&sent.state, SporType::Grunnlag, SporStatus::Sendt);
        assert_eq!(sent.state.overordnet_status, OverordnetStatus::VenterPaaSvar);
    }

    #[tokio::test]
    async fn test_locked_grunnlag_cannot_be_updated() {
        let service = service().await;
        let version = send_alle(
            &service,
            &[
                EventType::SakOpprettet,
                EventType::GrunnlagOpprettet,
                EventType::ResponsGrunnlag,
            ],
        )
        .await;

        let err = service
            .submit(innsending(EventType::GrunnlagOppdatert), version)
            .await
            .unwrap_err();

        match err {
            ServiceError::BusinessRule { regel, spor, .. } => {
                assert_eq!(regel, Regel::NotLocked);
                assert_eq!(spor, Some(SporType::Grunnlag));
            }
            other => panic!("expected business rule violation, got {other:?}"),
        }
        let view = service.get_state(&IdFixtures::sak_id()).await.unwrap();
        assert_eq!(view.version, version);
        assert!(view.state.grunnlag.er_laast());
    }

    #[tokio::test]
    async fn test_vederlag_requires_grunnlag() {
        let service = service().await;
        send_alle(&service, &[EventType::SakOpprettet]).await;

        let err = service
            .submit(innsending(EventType::VederlagKravSendt), 1)
            .await
            .unwrap_err();

        assert_eq!(err.regel(), Some(Regel::GrunnlagRequired));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_wrong_role_is_rejected() {
        let service = service().await;
        send_alle(&service, &[EventType::SakOpprettet, EventType::GrunnlagOpprettet]).await;

        let forged = EventBuilder::new(EventType::ResponsGrunnlag)
            .rolle(AktorRolle::Te)
            .submission();
        let err = service.submit(forged, 2).await.unwrap_err();

        assert_eq!(err.regel(), Some(Regel::ActorRole));
    }

    #[tokio::test]
    async fn test_event_for_missing_case_is_rejected() {
        let service = service().await;
        let err = service
            .submit(innsending(EventType::GrunnlagOpprettet), 0)
            .await
            .unwrap_err();
        assert_eq!(err.regel(), Some(Regel::CaseExists));
        assert!(service.list_saker().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_claim_revision_must_follow_sequence() {
        let service = service().await;
        let version =
            send_alle(&service, &[EventType::SakOpprettet, EventType::GrunnlagOpprettet]).await;

        for versjon in [0, 4242, u32::MAX] {
            let submission = EventBuilder::new(EventType::VederlagKravSendt)
                .versjon(versjon)
                .submission();
            let err = service.submit(submission, version).await.unwrap_err();
            match err {
                ServiceError::BusinessRule { regel, spor, .. } => {
                    assert_eq!(regel, Regel::RevisionSequence, "versjon {versjon}");
                    assert_eq!(spor, Some(SporType::Vederlag));
                }
                other => panic!("expected business rule violation, got {other:?}"),
            }
        }

        let sent = service
            .submit(
                EventBuilder::new(EventType::VederlagKravSendt).versjon(1).submission(),
                version,
            )
            .await
            .unwrap();
        assert_eq!(sent.state.vederlag.versjon, 1);

        let updated = service
            .submit(innsending(EventType::VederlagKravOppdatert), sent.version)
            .await
            .unwrap();
        assert_eq!(updated.state.vederlag.versjon, 2);
    }

    #[tokio::test]
    async fn test_stale_version_is_a_concurrency_error() {
        let service = service().await;
        send_alle(&service, &[EventType::SakOpprettet, EventType::GrunnlagOpprettet]).await;

        let err = service
            .submit(innsending(EventType::ResponsGrunnlag), 1)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ServiceError::Concurrency { expected: 1, actual: 2, .. }
        ));
        assert!(err.is_retryable());
        assert_eq!(service.get_state(&IdFixtures::sak_id()).await.unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_client_supplied_identity_is_rejected() {
        let service = service().await;
        let mut body = EventBuilder::new(EventType::SakOpprettet).json();
        body["event_id"] = json!("5f0c7e0e-0000-4000-8000-000000000000");

        let err = service.submit_json(body, 0).await.unwrap_err();

        match err {
            ServiceError::Validation { field, .. } => assert_eq!(field.as_deref(), Some("event_id")),
            other => panic!("expected validation error, got {other:?}"),
        }
        assert!(service.list_saker().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_event_type_is_rejected() {
        let service = service().await;
        let mut body = EventBuilder::new(EventType::SakOpprettet).json();
        body["event_type"] = json!("sak_slettet");

        let err = service.submit_json(body, 0).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_specified_frist_without_days_is_rejected() {
        let service = service().await;
        send_alle(&service, &[EventType::SakOpprettet, EventType::GrunnlagOpprettet]).await;

        let submission = EventBuilder::new(EventType::FristKravSendt)
            .data(json!({"varsel_type": "SPESIFISERT", "begrunnelse": "Mangler dager"}))
            .submission();
        let err = service.submit(submission, 2).await.unwrap_err();

        match err {
            ServiceError::Validation { field, context, .. } => {
                assert_eq!(field.as_deref(), Some("antall_dager"));
                let event_type = context.as_ref().and_then(|c| c.get("event_type"));
                assert_eq!(event_type.map(String::as_str), Some("frist_krav_sendt"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_withdrawn_case_is_closed() {
        let service = service().await;
        let version = send_alle(
            &service,
            &[
                EventType::SakOpprettet,
                EventType::GrunnlagOpprettet,
                EventType::GrunnlagTrukket,
            ],
        )
        .await;
        let view = service.get_state(&IdFixtures::sak_id()).await.unwrap();
        assert_eq!(view.state.overordnet_status, OverordnetStatus::LukketTrukket);

        let err = service
            .submit(innsending(EventType::FristKravSendt), version)
            .await
            .unwrap_err();
        assert_eq!(err.regel(), Some(Regel::CaseNotClosed));
    }
}

// ============================================================================
// Batches
// ============================================================================

mod batch_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_batch_is_validated_against_running_state() {
        let service = service().await;
        let batch = vec![
            innsending(EventType::SakOpprettet),
            innsending(EventType::GrunnlagOpprettet),
            innsending(EventType::VederlagKravSendt),
        ];

        let outcome = service.submit_batch(batch, 0).await.unwrap();

        assert_eq!(outcome.version, 3);
        assert_eq!(outcome.event_ids.len(), 3);
        assert_spor_status(&outcome.state, SporType::Vederlag, SporStatus::Sendt);
    }

    #[tokio::test]
    async fn test_one_bad_candidate_rejects_the_whole_batch() {
        let service = service().await;
        let batch = vec![
            innsending(EventType::SakOpprettet),
            innsending(EventType::VederlagKravSendt),
        ];

        let err = service.submit_batch(batch, 0).await.unwrap_err();

        assert_eq!(err.regel(), Some(Regel::GrunnlagRequired));
        assert!(service.list_saker().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_and_mixed_batches_are_invalid() {
        let service = service().await;
        let err = service.submit_batch(Vec::new(), 0).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation { .. }));

        let mixed = vec![
            innsending_for(&IdFixtures::sak_id_n(1), EventType::SakOpprettet),
            innsending_for(&IdFixtures::sak_id_n(2), EventType::SakOpprettet),
        ];
        let err = service.submit_batch(mixed, 0).await.unwrap_err();
        match err {
            ServiceError::Validation { field, .. } => assert_eq!(field.as_deref(), Some("sak_id")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}

// ============================================================================
// Change orders
// ============================================================================

mod endringsordre_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const KLAR_FOR_EO: [EventType; 7] = [
        EventType::SakOpprettet,
        EventType::GrunnlagOpprettet,
        EventType::ResponsGrunnlag,
        EventType::VederlagKravSendt,
        EventType::ResponsVederlag,
        EventType::FristKravSendt,
        EventType::ResponsFrist,
    ];

    #[tokio::test]
    async fn test_issue_on_standard_case_when_agreed() {
        let service = service().await;
        let version = send_alle(&service, &KLAR_FOR_EO).await;
        let view = service.get_state(&IdFixtures::sak_id()).await.unwrap();
        assert!(view.state.kan_utstede_eo);

        let outcome = service
            .submit(innsending(EventType::EoUtstedt), version)
            .await
            .unwrap();

        assert_eq!(outcome.state.eo_status(), Some(EoStatus::Utstedt));
        assert!(outcome.state.er_lukket);
    }

    #[tokio::test]
    async fn test_issue_before_agreement_is_rejected() {
        let service = service().await;
        let version = send_alle(&service, &KLAR_FOR_EO[..4]).await;

        let err = service
            .submit(innsending(EventType::EoUtstedt), version)
            .await
            .unwrap_err();
        assert_eq!(err.regel(), Some(Regel::CanIssueEo));
    }

    #[tokio::test]
    async fn test_dispute_and_revise_on_eo_case() {
        let service = service().await;
        let sak = IdFixtures::eo_sak_id();
        let opprett = EventBuilder::new(EventType::SakOpprettet)
            .sak(sak.clone())
            .data(json!({"sakstittel": "Endringsordre 1", "sakstype": "ENDRINGSORDRE"}))
            .submission();

        let mut version = service.submit(opprett, 0).await.unwrap().version;
        for event_type in [
            EventType::EoOpprettet,
            EventType::EoKoeLagtTil,
            EventType::EoUtstedt,
            EventType::EoBestridt,
            EventType::EoRevidert,
        ] {
            version = service
                .submit(innsending_for(&sak, event_type), version)
                .await
                .unwrap_or_else(|e| panic!("{event_type} rejected: {e}"))
                .version;
        }

        let view = service.get_state(&sak).await.unwrap();
        assert_eq!(view.version, 6);
        assert_eq!(view.state.eo_status(), Some(EoStatus::Revidert));

        let err = service
            .submit(innsending_for(&sak, EventType::EoAkseptert), version)
            .await
            .unwrap_err();
        assert_eq!(err.regel(), Some(Regel::EoIssued));
    }
}

// ============================================================================
// Read path
// ============================================================================

mod read_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_unknown_case_is_not_found() {
        let service = service().await;
        let sak = IdFixtures::sak_id();
        assert!(service.get_state(&sak).await.unwrap_err().is_not_found());
        assert!(service.get_timeline(&sak).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_timeline_lists_events_in_order() {
        let service = service().await;
        send_alle(
            &service,
            &[
                EventType::SakOpprettet,
                EventType::GrunnlagOpprettet,
                EventType::ResponsGrunnlag,
            ],
        )
        .await;

        let timeline = service.get_timeline(&IdFixtures::sak_id()).await.unwrap();

        assert_eq!(timeline.version, 3);
        let types: Vec<EventType> = timeline.events.iter().map(|e| e.event_type).collect();
        assert_eq!(
            types,
            vec![
                EventType::SakOpprettet,
                EventType::GrunnlagOpprettet,
                EventType::ResponsGrunnlag
            ]
        );
        assert_eq!(timeline.events[0].spor, None);
        assert_eq!(timeline.events[1].spor, Some(SporType::Grunnlag));
        assert_eq!(timeline.events[2].aktor_rolle, AktorRolle::Bh);
        assert!(timeline.events.iter().all(|e| !e.sammendrag.is_empty()));
    }

    #[tokio::test]
    async fn test_state_survives_restart_on_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::file(dir.path());
        {
            let service = KoeService::new(Arc::new(open_store(&config).await.unwrap()));
            send_alle(&service, &[EventType::SakOpprettet, EventType::GrunnlagOpprettet]).await;
        }

        let service = KoeService::new(Arc::new(open_store(&config).await.unwrap()));
        let view = service.get_state(&IdFixtures::sak_id()).await.unwrap();
        assert_eq!(view.version, 2);
        assert_spor_status(&view.state, SporType::Grunnlag, SporStatus::Sendt);
    }
}

// ============================================================================
// Collaborators
// ============================================================================

mod collaborator_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_sink_sees_every_transition() {
        let sink = Arc::new(RecordingSink::default());
        let service = service().await.with_notification_sink(sink.clone());

        send_alle(
            &service,
            &[
                EventType::SakOpprettet,
                EventType::GrunnlagOpprettet,
                EventType::ResponsGrunnlag,
            ],
        )
        .await;

        let seen = sink.seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                (
                    EventType::SakOpprettet,
                    OverordnetStatus::IngenAktiveSpor,
                    OverordnetStatus::IngenAktiveSpor
                ),
                (
                    EventType::GrunnlagOpprettet,
                    OverordnetStatus::IngenAktiveSpor,
                    OverordnetStatus::VenterPaaSvar
                ),
                (
                    EventType::ResponsGrunnlag,
                    OverordnetStatus::VenterPaaSvar,
                    OverordnetStatus::Omforent
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_rejected_submission_notifies_nobody() {
        let sink = Arc::new(RecordingSink::default());
        let service = service().await.with_notification_sink(sink.clone());

        let _ = service.submit(innsending(EventType::GrunnlagOpprettet), 0).await;

        assert!(sink.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_collaborator_failure_keeps_the_event() {
        let service = service()
            .await
            .with_notification_sink(Arc::new(FailingSink))
            .with_metadata_cache(Arc::new(FailingSink));

        let outcome = service.submit(innsending(EventType::SakOpprettet), 0).await.unwrap();

        assert_eq!(outcome.version, 1);
        assert_eq!(service.get_state(&IdFixtures::sak_id()).await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_metadata_cache_follows_submissions_and_rebuilds() {
        let cache = Arc::new(InMemoryMetadataCache::new());
        let service = service().await.with_metadata_cache(cache.clone());
        send_alle(&service, &[EventType::SakOpprettet, EventType::GrunnlagOpprettet]).await;

        let entry = cache.get(&IdFixtures::sak_id()).unwrap();
        assert_eq!(entry.status, OverordnetStatus::VenterPaaSvar);
        assert_eq!(
            entry.sakstittel.as_deref(),
            DataFixtures::standard(EventType::SakOpprettet)["sakstittel"].as_str()
        );

        cache.clear();
        assert_eq!(service.rebuild_metadata().await.unwrap(), 1);
        assert_eq!(cache.get(&IdFixtures::sak_id()), Some(entry));
    }
}
