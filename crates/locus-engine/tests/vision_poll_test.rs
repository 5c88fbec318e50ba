mod common;

use common::{FakeOcr, FakePage, fragment};
use locus_common::{LocatorStrategy, OcrFragment, Point, Rect, VisualTextQuery, ceiling};
use locus_engine::evaluators::VisualTextEvaluator;
use locus_engine::{
    ConditionalPoll, EvaluatorRegistry, OcrService, PollStatus, RunControl, StrategyEvaluator,
};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

fn evaluator(ocr: FakeOcr) -> VisualTextEvaluator {
    VisualTextEvaluator::new(Some(Arc::new(OcrService::new(Box::new(ocr)))), true)
}

fn poll(targets: &[&str]) -> ConditionalPoll {
    ConditionalPoll::new(targets.iter().map(|t| t.to_string()).collect())
        .with_interval(Duration::from_secs(1))
        .with_idle_timeout(Duration::from_secs(3))
        .with_post_click_delay(Duration::ZERO)
}

fn text_strategy(text: &str) -> LocatorStrategy {
    LocatorStrategy::visual_text(VisualTextQuery::new(text), ceiling::VISUAL_TEXT)
}

fn next_button() -> Vec<OcrFragment> {
    vec![fragment("Next", Rect::new(100.0, 100.0, 40.0, 20.0), 95.0)]
}

#[tokio::test(start_paused = true)]
async fn test_click_resets_idle_timer() {
    let ocr = FakeOcr::scheduled(vec![
        (Duration::ZERO, vec![]),
        (Duration::from_millis(2000), next_button()),
        (Duration::from_millis(2500), vec![]),
    ]);
    let page = FakePage::default();

    let outcome = poll(&["Next"])
        .run(&page, &evaluator(ocr), &RunControl::new())
        .await;

    assert_eq!(outcome.status, PollStatus::IdleTimeout);
    assert_eq!(outcome.clicks.len(), 1);
    assert_eq!(outcome.clicks[0].elapsed_ms, 2000);
    assert_eq!(outcome.clicks[0].point, Point::new(120.0, 110.0));
    // Idle window restarts at the click: 2000 + 3000.
    assert_eq!(outcome.elapsed_ms, 5000);
    assert_eq!(page.clicks(), vec![Point::new(120.0, 110.0)]);
}

#[tokio::test(start_paused = true)]
async fn test_times_out_without_progress() {
    let page = FakePage::default();

    let outcome = poll(&["Next"])
        .run(&page, &evaluator(FakeOcr::showing(vec![])), &RunControl::new())
        .await;

    assert_eq!(outcome.status, PollStatus::IdleTimeout);
    assert!(outcome.clicks.is_empty());
    assert_eq!(outcome.polls, 4);
    assert_eq!(outcome.elapsed_ms, 3000);
}

#[tokio::test(start_paused = true)]
async fn test_success_marker_ends_poll() {
    let ocr = FakeOcr::scheduled(vec![
        (Duration::ZERO, vec![]),
        (
            Duration::from_millis(1500),
            vec![fragment(
                "Order placed",
                Rect::new(10.0, 10.0, 120.0, 20.0),
                90.0,
            )],
        ),
    ]);
    let page = FakePage::default();

    let outcome = poll(&["Next"])
        .with_success_text("Order placed")
        .run(&page, &evaluator(ocr), &RunControl::new())
        .await;

    assert_eq!(outcome.status, PollStatus::Success);
    assert_eq!(outcome.polls, 3);
    assert_eq!(outcome.elapsed_ms, 2000);
    assert!(page.clicks().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stopped_before_start() {
    let control = RunControl::new();
    control.stop();

    let outcome = poll(&["Next"])
        .run(
            &FakePage::default(),
            &evaluator(FakeOcr::showing(next_button())),
            &control,
        )
        .await;

    assert_eq!(outcome.status, PollStatus::Cancelled);
    assert_eq!(outcome.polls, 0);
    assert!(outcome.clicks.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_interval() {
    let control = RunControl::new();
    let stopper = {
        let control = control.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            control.stop();
        })
    };

    let outcome = poll(&["Next"])
        .with_idle_timeout(Duration::from_secs(60))
        .run(
            &FakePage::default(),
            &evaluator(FakeOcr::showing(vec![])),
            &control,
        )
        .await;
    stopper.await.unwrap();

    assert_eq!(outcome.status, PollStatus::Cancelled);
    assert_eq!(outcome.polls, 2);
    assert_eq!(outcome.elapsed_ms, 1500);
}

#[tokio::test(start_paused = true)]
async fn test_hung_ocr_still_reaches_idle_timeout() {
    let outcome = poll(&["Next"])
        .with_success_text("Done")
        .with_evaluator_timeout(Duration::from_secs(2))
        .run(
            &FakePage::default(),
            &evaluator(FakeOcr::hanging()),
            &RunControl::new(),
        )
        .await;

    // Marker lookup gives up after 2 s, the target lookup gets the last 1 s.
    assert_eq!(outcome.status, PollStatus::IdleTimeout);
    assert_eq!(outcome.polls, 1);
    assert_eq!(outcome.elapsed_ms, 3000);
    assert!(outcome.clicks.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stop_interrupts_hung_ocr() {
    let control = RunControl::new();
    let stopper = {
        let control = control.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(700)).await;
            control.stop();
        })
    };

    let outcome = poll(&["Next"])
        .with_idle_timeout(Duration::from_secs(60))
        .run(&FakePage::default(), &evaluator(FakeOcr::hanging()), &control)
        .await;
    stopper.await.unwrap();

    assert_eq!(outcome.status, PollStatus::Cancelled);
    assert_eq!(outcome.polls, 1);
    assert_eq!(outcome.elapsed_ms, 700);
}

#[tokio::test(start_paused = true)]
async fn test_evaluator_and_poll_share_ocr_one_call_at_a_time() {
    let ocr = FakeOcr::scheduled(vec![
        (Duration::ZERO, next_button()),
        (Duration::from_millis(1000), vec![]),
    ])
    .with_latency(Duration::from_millis(200));
    let recognized = ocr.recognized.clone();
    let peak = ocr.peak_in_flight.clone();
    let service = Arc::new(OcrService::new(Box::new(ocr)));

    let lookups = VisualTextEvaluator::new(Some(service.clone()), false);
    let poller = VisualTextEvaluator::new(Some(service), false);
    let page = FakePage::default();
    let strategies: Vec<_> = ["Next", "Back", "Cancel"]
        .into_iter()
        .map(text_strategy)
        .collect();

    let poll_builder = poll(&["Next"]).with_idle_timeout(Duration::from_secs(2));
    let control = RunControl::new();
    let (found, outcome) = tokio::join!(
        futures::future::join_all(strategies.iter().map(|s| lookups.evaluate(&page, s))),
        poll_builder.run(&page, &poller, &control),
    );

    assert!(found[0].found);
    assert!(!found[1].found);
    assert_eq!(outcome.status, PollStatus::IdleTimeout);
    assert!(!outcome.clicks.is_empty());
    assert!(recognized.load(Ordering::SeqCst) >= 4);
    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_registry_lookups_do_not_overlap_on_shared_ocr() {
    let ocr = FakeOcr::showing(next_button()).with_latency(Duration::from_millis(5));
    let peak = ocr.peak_in_flight.clone();
    let service = Arc::new(OcrService::new(Box::new(ocr)));
    let mut registry = EvaluatorRegistry::new(Duration::from_secs(5));
    registry.register(Arc::new(VisualTextEvaluator::new(Some(service), false)));
    let page = FakePage::default();
    let strategy = text_strategy("Next");

    let results =
        futures::future::join_all((0..4).map(|_| registry.evaluate(&page, &strategy))).await;

    assert!(results.iter().all(|r| r.found));
    assert_eq!(peak.load(Ordering::SeqCst), 1);
}
