mod common;

use common::{
    FakeElement, FakeOcr, FakePage, Outcome, ScriptedEvaluator, SlowEvaluator, checkout_page,
    fragment,
};
use locus_common::{
    AttributeQuery, CoordinatesMetadata, EvidenceMetadata, FailureKind, LocatorStrategy, Point,
    Rect, RoleQuery, RoleStates, StrategyKind, StrategyTarget, VisualTextQuery,
};
use locus_engine::config::LocusConfig;
use locus_engine::{EvaluatorRegistry, OcrService};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

fn registry() -> EvaluatorRegistry {
    EvaluatorRegistry::with_defaults(&LocusConfig::default(), None)
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[tokio::test]
async fn test_structural_css_resolves_to_box_center() {
    let page = checkout_page();
    let result = registry()
        .evaluate(&page, &LocatorStrategy::structural("#buy", 0.95))
        .await;

    assert!(result.found);
    assert!(approx(result.confidence, 0.95));
    assert_eq!(result.click_point, Some(Point::new(400.0, 300.0)));
    assert_eq!(result.match_count, Some(1));
    assert_eq!(result.resolved_handle.map(|h| h.value()), Some(11));
    assert_eq!(result.metadata["selectorClass"], "attribute");
}

#[tokio::test]
async fn test_structural_multiple_matches_are_penalized() {
    let page = FakePage::new(
        (0..3)
            .map(|i| {
                FakeElement::new(i + 1, "li", Rect::new(0.0, i as f64 * 20.0, 100.0, 20.0))
                    .css("ul > li")
            })
            .collect(),
    );
    let result = registry()
        .evaluate(&page, &LocatorStrategy::structural("ul > li", 0.8))
        .await;

    assert!(result.found);
    // positional base 0.80, two extra matches
    assert!(approx(result.confidence, 0.4));
    assert_eq!(result.match_count, Some(3));
    assert_eq!(result.click_point, Some(Point::new(50.0, 10.0)));
}

#[tokio::test]
async fn test_structural_zero_matches_is_not_found() {
    let page = checkout_page();
    let result = registry()
        .evaluate(&page, &LocatorStrategy::structural("#gone", 0.95))
        .await;

    assert!(!result.found);
    assert_eq!(result.confidence, 0.0);
    assert_eq!(result.failure, Some(FailureKind::NotFound));
}

#[tokio::test]
async fn test_structural_falls_back_to_embedded_documents() {
    let page = FakePage::new(vec![
        FakeElement::new(2, "div", Rect::new(0.0, 0.0, 800.0, 600.0)).css("body > div"),
        FakeElement::new(3, "button", Rect::new(10.0, 10.0, 20.0, 20.0))
            .css("#pay")
            .in_frame(500),
    ]);
    let result = registry()
        .evaluate(&page, &LocatorStrategy::structural("#pay", 0.95))
        .await;

    assert!(result.found);
    assert_eq!(result.metadata["frame"], true);
    assert_eq!(result.click_point, Some(Point::new(20.0, 20.0)));
}

#[tokio::test]
async fn test_structural_xpath_uses_search_and_discards_it() {
    let page = checkout_page();
    let result = registry()
        .evaluate(&page, &LocatorStrategy::structural("//*[@id='buy']", 0.95))
        .await;

    assert!(result.found);
    assert!(approx(result.confidence, 0.95));
    assert_eq!(page.open_searches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_invalid_selector_is_a_configuration_failure() {
    let page = checkout_page();
    let result = registry()
        .evaluate(&page, &LocatorStrategy::structural("!!bad", 0.95))
        .await;

    assert!(!result.found);
    assert_eq!(result.failure, Some(FailureKind::Configuration));
}

#[tokio::test]
async fn test_transport_failure_is_reported_not_raised() {
    let page = checkout_page();
    page.break_connection();
    let result = registry()
        .evaluate(&page, &LocatorStrategy::structural("#buy", 0.95))
        .await;

    assert!(!result.found);
    assert_eq!(result.failure, Some(FailureKind::Transport));
    assert!(result.error.unwrap().contains("Connection lost"));
}

#[tokio::test]
async fn test_role_with_exact_name() {
    let page = checkout_page();
    let query = RoleQuery {
        exact: true,
        ..RoleQuery::new("button").with_name("Buy now")
    };
    let result = registry()
        .evaluate(&page, &LocatorStrategy::role(query, 0.9))
        .await;

    assert!(result.found);
    assert!(approx(result.confidence, 0.9));
    assert_eq!(result.click_point, Some(Point::new(400.0, 300.0)));
}

#[tokio::test]
async fn test_role_substring_name_and_unbacked_nodes() {
    let page = FakePage::new(vec![
        FakeElement::new(11, "button", Rect::new(380.0, 280.0, 40.0, 40.0))
            .role("button", "Buy now"),
        FakeElement::new(20, "button", Rect::default())
            .role("button", "Buy now")
            .detached(),
    ]);

    let loose = RoleQuery::new("button").with_name("buy");
    let result = registry()
        .evaluate(&page, &LocatorStrategy::role(loose, 0.9))
        .await;
    assert!(result.found);
    // The unbacked node does not count towards ambiguity.
    assert_eq!(result.match_count, Some(1));
    assert!(approx(result.confidence, 0.9));

    let exact = RoleQuery {
        exact: true,
        ..RoleQuery::new("button").with_name("Buy")
    };
    let result = registry()
        .evaluate(&page, &LocatorStrategy::role(exact, 0.9))
        .await;
    assert!(!result.found);
}

#[tokio::test]
async fn test_role_state_filter_excludes_mismatch() {
    let page = checkout_page();
    let query = RoleQuery {
        states: RoleStates {
            disabled: Some(true),
            ..Default::default()
        },
        ..RoleQuery::new("button")
    };
    let result = registry()
        .evaluate(&page, &LocatorStrategy::role(query, 0.8))
        .await;

    assert!(!result.found);
    assert_eq!(result.failure, Some(FailureKind::NotFound));
}

#[tokio::test]
async fn test_attribute_lookups_in_priority_order() {
    let page = checkout_page();
    let query = AttributeQuery {
        test_id: Some("missing".into()),
        label: Some("Email address".into()),
        exact: true,
        ..Default::default()
    };
    let result = registry()
        .evaluate(&page, &LocatorStrategy::attribute(query, 0.9))
        .await;

    assert!(result.found);
    assert_eq!(result.metadata["lookup"], "label");
    assert!(approx(result.confidence, 0.85));
    assert_eq!(result.click_point, Some(Point::new(200.0, 115.0)));
}

#[tokio::test]
async fn test_test_id_wins_when_present() {
    let page = checkout_page();
    let query = AttributeQuery {
        test_id: Some("buy-button".into()),
        title: Some("Buy".into()),
        exact: true,
        ..Default::default()
    };
    let result = registry()
        .evaluate(&page, &LocatorStrategy::attribute(query, 0.9))
        .await;

    assert!(result.found);
    assert_eq!(result.metadata["lookup"], "test_id");
    assert!(approx(result.confidence, 0.9));
}

#[tokio::test]
async fn test_label_falls_through_to_placeholder_without_accessibility() {
    let page = checkout_page().without_accessibility();
    let query = AttributeQuery {
        label: Some("Email address".into()),
        placeholder: Some("Email".into()),
        exact: true,
        ..Default::default()
    };
    let result = registry()
        .evaluate(&page, &LocatorStrategy::attribute(query, 0.85))
        .await;

    assert!(result.found);
    assert_eq!(result.metadata["lookup"], "placeholder");
    assert!(approx(result.confidence, 0.8));
}

#[tokio::test]
async fn test_visible_text_lookup_uses_search() {
    let page = checkout_page();
    let query = AttributeQuery {
        text: Some("Buy now".into()),
        exact: true,
        ..Default::default()
    };
    let result = registry()
        .evaluate(&page, &LocatorStrategy::attribute(query, 0.75))
        .await;

    assert!(result.found);
    assert!(approx(result.confidence, 0.75));
    assert_eq!(page.open_searches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_visual_text_maps_ocr_confidence_and_caches() {
    let page = checkout_page();
    let ocr = FakeOcr::showing(vec![fragment(
        "Buy now",
        Rect::new(380.0, 290.0, 40.0, 20.0),
        92.0,
    )]);
    let initialized = ocr.initialized.clone();
    let recognized = ocr.recognized.clone();
    let service = Arc::new(OcrService::new(Box::new(ocr)));
    let registry = EvaluatorRegistry::with_defaults(&LocusConfig::default(), Some(service));

    let strategy = LocatorStrategy::visual_text(VisualTextQuery::new("buy now"), 0.85);
    let first = registry.evaluate(&page, &strategy).await;
    let second = registry.evaluate(&page, &strategy).await;

    assert!(first.found);
    assert!(approx(first.confidence, 0.85));
    assert_eq!(first.click_point, Some(Point::new(400.0, 300.0)));
    assert_eq!(first.metadata["matchedText"], "Buy now");
    assert_eq!(second.confidence, first.confidence);
    assert_eq!(initialized.load(Ordering::SeqCst), 1);
    assert_eq!(recognized.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_visual_text_low_ocr_confidence_passes_through() {
    let page = checkout_page();
    let ocr = FakeOcr::showing(vec![fragment(
        "Buy now",
        Rect::new(380.0, 290.0, 40.0, 20.0),
        40.0,
    )]);
    let service = Arc::new(OcrService::new(Box::new(ocr)));
    let registry = EvaluatorRegistry::with_defaults(&LocusConfig::default(), Some(service));

    let result = registry
        .evaluate(
            &page,
            &LocatorStrategy::visual_text(VisualTextQuery::new("Buy now"), 0.85),
        )
        .await;
    assert!(result.found);
    assert!(approx(result.confidence, 0.4));
}

#[tokio::test]
async fn test_visual_text_without_ocr_is_configuration_failure() {
    let page = checkout_page();
    let result = registry()
        .evaluate(
            &page,
            &LocatorStrategy::visual_text(VisualTextQuery::new("Buy now"), 0.85),
        )
        .await;

    assert!(!result.found);
    assert_eq!(result.failure, Some(FailureKind::Configuration));
}

fn validated_point(x: f64, y: f64) -> LocatorStrategy {
    LocatorStrategy::new(
        StrategyTarget::Coordinates(CoordinatesMetadata {
            x,
            y,
            bounding_rect: None,
            validate_element_exists: true,
        }),
        None,
        0.6,
    )
}

#[tokio::test]
async fn test_coordinates_always_found() {
    let page = checkout_page();
    let plain = registry()
        .evaluate(&page, &LocatorStrategy::coordinates(Point::new(5000.0, 5000.0)))
        .await;
    assert!(plain.found);
    assert!(approx(plain.confidence, 0.6));

    let empty_spot = registry().evaluate(&page, &validated_point(5000.0, 5000.0)).await;
    assert!(empty_spot.found);
    assert!(approx(empty_spot.confidence, 0.6));
    assert_eq!(empty_spot.metadata["validated"], false);
}

#[tokio::test]
async fn test_coordinates_boost_when_node_present() {
    let page = checkout_page();
    let result = registry().evaluate(&page, &validated_point(400.0, 300.0)).await;

    assert!(result.found);
    assert!(approx(result.confidence, 0.7));
    assert_eq!(result.resolved_handle.map(|h| h.value()), Some(11));
}

#[tokio::test]
async fn test_coordinates_survive_broken_page() {
    let page = checkout_page();
    page.break_connection();
    let result = registry().evaluate(&page, &validated_point(400.0, 300.0)).await;

    assert!(result.found);
    assert!(approx(result.confidence, 0.6));
    assert!(result.metadata.contains_key("validationError"));
}

#[tokio::test(start_paused = true)]
async fn test_coordinates_survive_slow_hit_test() {
    let page = checkout_page().with_delay(Duration::from_secs(60));
    let result = registry().evaluate(&page, &validated_point(400.0, 300.0)).await;

    assert!(result.found);
    assert!(approx(result.confidence, 0.6));
}

#[tokio::test]
async fn test_evidence_picks_best_candidate() {
    let page = checkout_page();
    let metadata = EvidenceMetadata {
        endpoint: Point::new(400.0, 300.0),
        expected_tag: Some("button".into()),
        expected_id: Some("buy".into()),
        expected_classes: vec!["btn".into()],
        trail_direction: None,
    };
    let result = registry()
        .evaluate(&page, &LocatorStrategy::evidence(metadata, 0.85))
        .await;

    assert!(result.found);
    assert_eq!(result.resolved_handle.map(|h| h.value()), Some(11));
    // 0.25 + 0.20 + 0.15 + 0.20 + 0.20 * 0.5 = 0.9, capped
    assert!(approx(result.confidence, 0.85));
    assert_eq!(result.match_count, Some(2));
}

#[tokio::test]
async fn test_evidence_below_threshold_is_not_found() {
    let page = checkout_page();
    let metadata = EvidenceMetadata {
        endpoint: Point::new(400.0, 300.0),
        expected_tag: Some("a".into()),
        expected_id: Some("nav-link".into()),
        expected_classes: vec!["nav".into()],
        trail_direction: None,
    };
    let result = registry()
        .evaluate(&page, &LocatorStrategy::evidence(metadata, 0.85))
        .await;

    assert!(!result.found);
    assert_eq!(result.failure, Some(FailureKind::NotFound));
}

#[tokio::test]
async fn test_unhandled_kind_is_configuration_failure() {
    let page = checkout_page();
    let empty = EvaluatorRegistry::new(Duration::from_secs(1));
    let result = empty
        .evaluate(&page, &LocatorStrategy::structural("#buy", 0.95))
        .await;

    assert!(!result.found);
    assert_eq!(result.failure, Some(FailureKind::Configuration));
}

#[tokio::test]
async fn test_registered_evaluator_takes_precedence() {
    let page = checkout_page();
    let strategy = LocatorStrategy::structural("#buy", 0.95);
    let mut registry = registry();
    registry.register(Arc::new(ScriptedEvaluator::new(vec![(
        &strategy,
        Outcome::Found(0.42),
    )])));

    let result = registry.evaluate(&page, &strategy).await;
    assert!(approx(result.confidence, 0.42));
}

#[tokio::test(start_paused = true)]
async fn test_slow_evaluator_times_out() {
    let page = checkout_page();
    let mut registry = EvaluatorRegistry::new(Duration::from_millis(100));
    registry.register(Arc::new(SlowEvaluator {
        kind: StrategyKind::StructuralSelector,
        delay: Duration::from_secs(10),
    }));

    let result = registry
        .evaluate(&page, &LocatorStrategy::structural("#buy", 0.95))
        .await;
    assert!(!result.found);
    assert_eq!(result.failure, Some(FailureKind::Timeout));
    assert!(result.duration_ms >= 100);
}
