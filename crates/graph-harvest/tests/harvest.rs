//! Harvest controller integration tests against scripted strategies.

mod support;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use graph_harvest::*;
use support::*;

// ─────────────────────── helpers ───────────────────────

fn harvester(
    journal: &Journal,
    endpoint: Option<Arc<ScriptedEndpoint>>,
    provider: Arc<ScriptedProvider>,
    config: HarvestConfig,
) -> Harvester {
    let endpoint = endpoint.map(|e| e as Arc<dyn EndpointSource>);
    Harvester::new(endpoint, provider, config).with_pacer(recording_pacer(journal))
}

fn handles(report: &HarvestReport) -> Vec<String> {
    report.handles().map(str::to_string).collect()
}

fn expected(prefix: &str, n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{prefix}{i}")).collect()
}

fn page(entities: Vec<Entity>, cursor: Option<&str>) -> StrategyResult<EndpointPage> {
    Ok(EndpointPage {
        entities,
        next_cursor: cursor.map(str::to_string),
        has_more: cursor.is_some(),
    })
}

// ─────────────────────── structured endpoint ───────────────────────

#[tokio::test]
async fn endpoint_collects_every_page_in_first_seen_order() {
    let journal = Journal::default();
    let endpoint = Arc::new(ScriptedEndpoint::paged(&journal, &entities("u", 0..12), 5));
    let provider = Arc::new(ScriptedProvider::new(&journal, SurfaceScript::finite(vec![], 1)));
    let h = harvester(&journal, Some(endpoint.clone()), provider.clone(), test_config());

    let report = h
        .harvest(HarvestJob::new("subject", Relation::Followers, session_with_csrf()))
        .await
        .unwrap();

    assert_eq!(handles(&report), expected("u", 12));
    assert_eq!(report.count, 12);
    assert_eq!(report.strategy, StrategyKind::Endpoint);
    assert_eq!(report.terminal, TerminalReason::Exhausted);
    assert_eq!(endpoint.pages_served(), 3);
    assert_eq!(provider.acquired(), 0);
    assert_eq!(report.entities[3].remote_id.as_deref(), Some("3"));

    // jitter between pages only, never before the first
    let sleeps = journal.sleeps();
    assert_eq!(sleeps.len(), 2);
    let jitter = test_config().page_jitter;
    assert!(sleeps.iter().all(|d| jitter.contains(*d)));
}

#[tokio::test]
async fn overlapping_pages_keep_first_seen_attributes() {
    let journal = Journal::default();
    let first = Entity {
        display_name: Some("First".into()),
        ..Entity::bare("dup")
    };
    let later = Entity {
        display_name: Some("Later".into()),
        ..Entity::bare("dup")
    };
    let endpoint = ScriptedEndpoint::new(&journal).with_pages(vec![
        page(vec![Entity::bare("a"), first, Entity::bare("b")], Some("c1")),
        page(vec![Entity::bare("b"), later, Entity::bare("c")], Some("c2")),
        page(vec![Entity::bare("a"), Entity::bare("c")], None),
    ]);
    let provider = Arc::new(ScriptedProvider::new(&journal, SurfaceScript::finite(vec![], 1)));
    let h = harvester(&journal, Some(Arc::new(endpoint)), provider, test_config());

    let report = h
        .harvest(HarvestJob::new("subject", Relation::Following, session_with_csrf()))
        .await
        .unwrap();

    assert_eq!(handles(&report), ["a", "dup", "b", "c"]);
    assert_eq!(report.entities[1].display_name.as_deref(), Some("First"));
}

#[tokio::test]
async fn upper_bound_truncates_endpoint_result() {
    let journal = Journal::default();
    let endpoint = Arc::new(ScriptedEndpoint::paged(&journal, &entities("u", 0..25), 5));
    let provider = Arc::new(ScriptedProvider::new(&journal, SurfaceScript::finite(vec![], 1)));
    let h = harvester(&journal, Some(endpoint.clone()), provider, test_config());

    let job = HarvestJob::new("subject", Relation::Followers, session_with_csrf())
        .with_upper_bound(Some(10));
    let report = h.harvest(job).await.unwrap();

    assert_eq!(handles(&report), expected("u", 10));
    assert_eq!(report.terminal, TerminalReason::UpperBound);
    assert_eq!(endpoint.pages_served(), 2);
}

#[tokio::test]
async fn upper_bound_inside_a_page_stops_mid_page() {
    let journal = Journal::default();
    let endpoint = Arc::new(ScriptedEndpoint::paged(&journal, &entities("u", 0..25), 8));
    let provider = Arc::new(ScriptedProvider::new(&journal, SurfaceScript::finite(vec![], 1)));
    let h = harvester(&journal, Some(endpoint.clone()), provider, test_config());

    let job = HarvestJob::new("subject", Relation::Followers, session_with_csrf())
        .with_upper_bound(Some(10));
    let report = h.harvest(job).await.unwrap();

    assert_eq!(handles(&report), expected("u", 10));
    assert_eq!(endpoint.pages_served(), 2);
}

#[tokio::test]
async fn cancel_after_two_of_five_pages_returns_those_pages() {
    let journal = Journal::default();
    let cancel = CancellationToken::new();
    let endpoint = Arc::new(
        ScriptedEndpoint::paged(&journal, &entities("u", 0..25), 5).cancel_after(2, cancel.clone()),
    );
    let provider = Arc::new(ScriptedProvider::new(
        &journal,
        SurfaceScript::finite(entities("s", 0..5), 5),
    ));
    let h = harvester(&journal, Some(endpoint.clone()), provider.clone(), test_config());

    let job = HarvestJob::new("subject", Relation::Followers, session_with_csrf())
        .with_cancel(cancel);
    let report = h.harvest(job).await.unwrap();

    assert!(report.cancelled());
    assert!(report.possibly_incomplete());
    assert_eq!(handles(&report), expected("u", 10));
    assert_eq!(endpoint.pages_served(), 2);
    assert_eq!(provider.acquired(), 0);
    assert_eq!(provider.active(), 0);
}

#[tokio::test]
async fn endpoint_failure_after_good_page_returns_partial() {
    let journal = Journal::default();
    let endpoint = Arc::new(
        ScriptedEndpoint::new(&journal)
            .push_page(page(entities("u", 0..5), Some("c1")))
            .push_page(Err(StrategyError::transient("HTTP 502"))),
    );
    let provider = Arc::new(ScriptedProvider::new(
        &journal,
        SurfaceScript::finite(entities("s", 0..5), 5),
    ));
    let h = harvester(&journal, Some(endpoint.clone()), provider.clone(), test_config());

    let report = h
        .harvest(HarvestJob::new("subject", Relation::Followers, session_with_csrf()))
        .await
        .unwrap();

    assert_eq!(report.terminal, TerminalReason::EndpointInterrupted);
    assert_eq!(report.strategy, StrategyKind::Endpoint);
    assert_eq!(handles(&report), expected("u", 5));
    assert_eq!(provider.acquired(), 0);
}

#[tokio::test]
async fn expired_session_on_endpoint_is_not_masked_by_fallback() {
    let journal = Journal::default();
    let endpoint =
        Arc::new(ScriptedEndpoint::new(&journal).push_page(Err(StrategyError::Unauthenticated)));
    let provider = Arc::new(ScriptedProvider::new(
        &journal,
        SurfaceScript::finite(entities("s", 0..5), 5),
    ));
    let h = harvester(&journal, Some(endpoint), provider.clone(), test_config());

    let err = h
        .harvest(HarvestJob::new("subject", Relation::Followers, session_with_csrf()))
        .await
        .unwrap_err();

    assert_eq!(err, HarvestError::Unauthenticated);
    assert_eq!(provider.acquired(), 0);
}

#[tokio::test]
async fn endpoint_page_ceiling_is_a_safety_limit() {
    let journal = Journal::default();
    let pages = (0..10)
        .map(|i| page(vec![Entity::bare(format!("u{i}"))], Some("next")))
        .collect();
    let endpoint = Arc::new(ScriptedEndpoint::new(&journal).with_pages(pages));
    let provider = Arc::new(ScriptedProvider::new(&journal, SurfaceScript::finite(vec![], 1)));
    let config = HarvestConfig {
        max_pages: 4,
        ..test_config()
    };
    let h = harvester(&journal, Some(endpoint.clone()), provider, config);

    let report = h
        .harvest(HarvestJob::new("subject", Relation::Followers, session_with_csrf()))
        .await
        .unwrap();

    assert_eq!(report.terminal, TerminalReason::SafetyLimit);
    assert_eq!(report.count, 4);
    assert_eq!(endpoint.pages_served(), 4);
}

// ─────────────────────── fallback ───────────────────────

#[tokio::test]
async fn first_page_failure_falls_back_to_surface_exactly_once() {
    let journal = Journal::default();
    let endpoint = Arc::new(
        ScriptedEndpoint::new(&journal)
            .push_page(Err(StrategyError::transient("HTTP 500")))
            .push_page(page(entities("u", 0..5), None)),
    );
    let provider = Arc::new(ScriptedProvider::new(
        &journal,
        SurfaceScript::finite(entities("s", 0..7), 3),
    ));
    let h = harvester(&journal, Some(endpoint.clone()), provider.clone(), test_config());

    let report = h
        .harvest(HarvestJob::new("subject", Relation::Followers, session_with_csrf()))
        .await
        .unwrap();

    assert_eq!(report.strategy, StrategyKind::Surface);
    assert_eq!(handles(&report), expected("s", 7));
    assert_eq!(endpoint.pages_served(), 1);
    assert_eq!(provider.acquired(), 1);
    assert_eq!(journal.count(|e| *e == Event::Open), 1);
    assert_eq!(provider.active(), 0);

    // no endpoint traffic once the surface took over
    let events = journal.events();
    let acquired_at = events.iter().position(|e| *e == Event::Acquire).unwrap();
    assert!(events[acquired_at..]
        .iter()
        .all(|e| !matches!(e, Event::Page(_) | Event::Resolve)));
}

#[tokio::test]
async fn unresolvable_subject_falls_back() {
    let journal = Journal::default();
    let endpoint = Arc::new(
        ScriptedEndpoint::new(&journal)
            .with_resolve(Err(StrategyError::transient("profile has no id"))),
    );
    let provider = Arc::new(ScriptedProvider::new(
        &journal,
        SurfaceScript::finite(entities("s", 0..4), 2),
    ));
    let h = harvester(&journal, Some(endpoint.clone()), provider.clone(), test_config());

    let report = h
        .harvest(HarvestJob::new("subject", Relation::Followers, session_with_csrf()))
        .await
        .unwrap();

    assert_eq!(report.strategy, StrategyKind::Surface);
    assert_eq!(report.count, 4);
    assert_eq!(endpoint.pages_served(), 0);
}

#[tokio::test]
async fn missing_csrf_token_goes_straight_to_surface() {
    let journal = Journal::default();
    let endpoint = Arc::new(ScriptedEndpoint::paged(&journal, &entities("u", 0..5), 5));
    let provider = Arc::new(ScriptedProvider::new(
        &journal,
        SurfaceScript::finite(entities("s", 0..5), 5),
    ));
    let h = harvester(&journal, Some(endpoint.clone()), provider.clone(), test_config());

    let report = h
        .harvest(HarvestJob::new("subject", Relation::Following, session_without_csrf()))
        .await
        .unwrap();

    assert_eq!(report.strategy, StrategyKind::Surface);
    assert_eq!(journal.count(|e| *e == Event::Resolve), 0);
    assert_eq!(endpoint.pages_served(), 0);
}

#[tokio::test]
async fn rate_limit_falls_back_under_default_policy() {
    let journal = Journal::default();
    let endpoint = Arc::new(
        ScriptedEndpoint::new(&journal)
            .push_page(Err(StrategyError::RateLimited { retry_after: None })),
    );
    let provider = Arc::new(ScriptedProvider::new(
        &journal,
        SurfaceScript::finite(entities("s", 0..3), 3),
    ));
    let h = harvester(&journal, Some(endpoint.clone()), provider.clone(), test_config());

    let report = h
        .harvest(HarvestJob::new("subject", Relation::Followers, session_with_csrf()))
        .await
        .unwrap();

    assert_eq!(report.strategy, StrategyKind::Surface);
    assert_eq!(endpoint.pages_served(), 1);
}

#[tokio::test]
async fn rate_limit_cooldown_retries_same_page() {
    let journal = Journal::default();
    let endpoint = Arc::new(
        ScriptedEndpoint::new(&journal)
            .push_page(Err(StrategyError::RateLimited {
                retry_after: Some(Duration::from_secs(5)),
            }))
            .push_page(page(entities("u", 0..3), None)),
    );
    let provider = Arc::new(ScriptedProvider::new(&journal, SurfaceScript::finite(vec![], 1)));
    let config = HarvestConfig {
        rate_limit: RateLimitPolicy::Cooldown {
            wait: Duration::from_secs(30),
            max_retries: 2,
        },
        ..test_config()
    };
    let h = harvester(&journal, Some(endpoint.clone()), provider.clone(), config);

    let report = h
        .harvest(HarvestJob::new("subject", Relation::Followers, session_with_csrf()))
        .await
        .unwrap();

    assert_eq!(report.strategy, StrategyKind::Endpoint);
    assert_eq!(report.count, 3);
    assert_eq!(endpoint.pages_served(), 2);
    assert_eq!(journal.sleeps(), [Duration::from_secs(30)]);
    assert_eq!(provider.acquired(), 0);
}

// ─────────────────────── rendered surface ───────────────────────

#[tokio::test]
async fn idle_rounds_terminate_with_every_entity() {
    for n in [0usize, 1, 7, 60, 333] {
        let journal = Journal::default();
        let provider = Arc::new(ScriptedProvider::new(
            &journal,
            SurfaceScript::finite(entities("s", 0..n), 12),
        ));
        let h = harvester(&journal, None, provider.clone(), test_config());

        let report = h
            .harvest(HarvestJob::new("subject", Relation::Followers, session_without_csrf()))
            .await
            .unwrap();

        assert_eq!(handles(&report), expected("s", n), "list of {n}");
        assert_eq!(report.terminal, TerminalReason::IdleRounds);
        let passes = journal.count(|e| *e == Event::Extract);
        assert!(passes <= n.div_ceil(12) + 3, "{passes} passes for {n}");
        assert_eq!(provider.active(), 0);
    }
}

#[tokio::test]
async fn upper_bound_truncates_surface_result() {
    let journal = Journal::default();
    let provider = Arc::new(ScriptedProvider::new(
        &journal,
        SurfaceScript::finite(entities("s", 0..25), 4),
    ));
    let h = harvester(&journal, None, provider.clone(), test_config());

    let job = HarvestJob::new("subject", Relation::Followers, session_without_csrf())
        .with_upper_bound(Some(10));
    let report = h.harvest(job).await.unwrap();

    assert_eq!(handles(&report), expected("s", 10));
    assert_eq!(report.terminal, TerminalReason::UpperBound);
    assert_eq!(provider.active(), 0);
}

#[tokio::test]
async fn endless_surface_stops_at_pass_ceiling() {
    let journal = Journal::default();
    let provider = Arc::new(ScriptedProvider::new(&journal, SurfaceScript::endless()));
    let h = harvester(&journal, None, provider.clone(), test_config());

    let report = h
        .harvest(HarvestJob::new("subject", Relation::Followers, session_without_csrf()))
        .await
        .unwrap();

    assert_eq!(report.terminal, TerminalReason::SafetyLimit);
    assert_eq!(report.count, 200);
    assert_eq!(journal.count(|e| *e == Event::Extract), 200);
    assert_eq!(provider.active(), 0);
}

#[tokio::test]
async fn broken_elements_are_skipped_not_fatal() {
    let journal = Journal::default();
    let mut script = SurfaceScript::finite(entities("s", 0..6), 3);
    script.broken_rows = 2;
    let provider = Arc::new(ScriptedProvider::new(&journal, script));
    let h = harvester(&journal, None, provider, test_config());

    let report = h
        .harvest(HarvestJob::new("subject", Relation::Followers, session_without_csrf()))
        .await
        .unwrap();

    assert_eq!(handles(&report), expected("s", 6));
}

#[tokio::test]
async fn reveal_waits_between_passes() {
    let journal = Journal::default();
    let provider = Arc::new(ScriptedProvider::new(
        &journal,
        SurfaceScript::finite(entities("s", 0..6), 3),
    ));
    let h = harvester(&journal, None, provider, test_config());

    h.harvest(HarvestJob::new("subject", Relation::Followers, session_without_csrf()))
        .await
        .unwrap();

    let reveals = journal.count(|e| *e == Event::Reveal);
    let sleeps = journal.sleeps();
    assert_eq!(sleeps.len(), reveals);
    let wait = test_config().reveal_wait;
    assert!(sleeps.iter().all(|d| wait.contains(*d)));
}

#[tokio::test]
async fn cancel_during_surface_keeps_partial_and_releases() {
    let journal = Journal::default();
    let cancel = CancellationToken::new();
    let mut script = SurfaceScript::finite(entities("s", 0..50), 5);
    script.cancel_after_passes = Some((2, cancel.clone()));
    let provider = Arc::new(ScriptedProvider::new(&journal, script));
    let h = harvester(&journal, None, provider.clone(), test_config());

    let job = HarvestJob::new("subject", Relation::Followers, session_without_csrf())
        .with_cancel(cancel);
    let report = h.harvest(job).await.unwrap();

    assert!(report.cancelled());
    assert_eq!(handles(&report), expected("s", 10));
    assert_eq!(provider.active(), 0);
    assert_eq!(journal.events().last(), Some(&Event::Close));
}

#[tokio::test]
async fn surface_error_is_reported_with_cause_and_released() {
    let journal = Journal::default();
    let mut script = SurfaceScript::finite(entities("s", 0..5), 5);
    script.open_error = Some(StrategyError::transient("list container never appeared"));
    let provider = Arc::new(ScriptedProvider::new(&journal, script));
    let h = harvester(&journal, None, provider.clone(), test_config());

    let err = h
        .harvest(HarvestJob::new("subject", Relation::Followers, session_without_csrf()))
        .await
        .unwrap_err();

    match err {
        HarvestError::Surface { cause } => assert!(cause.contains("never appeared")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(provider.active(), 0);
}

#[tokio::test]
async fn login_redirect_on_surface_is_unauthenticated() {
    let journal = Journal::default();
    let mut script = SurfaceScript::finite(entities("s", 0..5), 5);
    script.open_error = Some(StrategyError::Unauthenticated);
    let provider = Arc::new(ScriptedProvider::new(&journal, script));
    let h = harvester(&journal, None, provider.clone(), test_config());

    let err = h
        .harvest(HarvestJob::new("subject", Relation::Followers, session_without_csrf()))
        .await
        .unwrap_err();

    assert_eq!(err, HarvestError::Unauthenticated);
    assert_eq!(provider.active(), 0);
}

#[tokio::test]
async fn unavailable_browser_is_a_resource_error() {
    let journal = Journal::default();
    let mut script = SurfaceScript::finite(vec![], 1);
    script.acquire_error = Some(StrategyError::Unavailable("Chromium not found".into()));
    let provider = Arc::new(ScriptedProvider::new(&journal, script));
    let h = harvester(&journal, None, provider, test_config());

    let err = h
        .harvest(HarvestJob::new("subject", Relation::Followers, session_without_csrf()))
        .await
        .unwrap_err();

    assert!(matches!(err, HarvestError::ResourceUnavailable(_)));
}

#[tokio::test]
async fn empty_subject_is_rejected() {
    let journal = Journal::default();
    let provider = Arc::new(ScriptedProvider::new(&journal, SurfaceScript::finite(vec![], 1)));
    let h = harvester(&journal, None, provider.clone(), test_config());

    let err = h
        .harvest(HarvestJob::new(" @ ", Relation::Followers, session_without_csrf()))
        .await
        .unwrap_err();

    assert!(matches!(err, HarvestError::InvalidJob(_)));
    assert_eq!(provider.acquired(), 0);
}
