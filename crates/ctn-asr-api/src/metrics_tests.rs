//! Tests for metrics collection and path normalization.

use super::*;

#[test]
fn test_numeric_segments_are_normalized() {
    assert_eq!(
        normalize_path_for_metrics("/api/verify/kvk/68750110"),
        "/api/verify/kvk/:id"
    );
}

#[test]
fn test_uuid_segments_are_normalized() {
    assert_eq!(
        normalize_path_for_metrics("/api/members/550e8400-e29b-41d4-a716-446655440000"),
        "/api/members/:id"
    );
}

#[test]
fn test_lei_segments_are_normalized() {
    assert_eq!(
        normalize_path_for_metrics("/api/verify/lei/HWUPKR0MPOU8FGXBT394"),
        "/api/verify/lei/:id"
    );
}

#[test]
fn test_peppol_segments_are_normalized() {
    assert_eq!(
        normalize_path_for_metrics("/api/verify/peppol/0106:68750110"),
        "/api/verify/peppol/:id"
    );
}

#[test]
fn test_route_words_are_preserved() {
    assert_eq!(normalize_path_for_metrics("/health/deep"), "/health/deep");
    assert_eq!(
        normalize_path_for_metrics("/admin/breakers"),
        "/admin/breakers"
    );
    assert_eq!(normalize_path_for_metrics("/"), "/");
}

#[test]
fn test_breaker_names_are_preserved_in_reset_path() {
    assert_eq!(
        normalize_path_for_metrics("/admin/breakers/kvk/reset"),
        "/admin/breakers/kvk/reset"
    );
}

#[test]
fn test_uuid_detection() {
    assert!(is_uuid_like("550e8400-e29b-41d4-a716-446655440000"));
    assert!(is_uuid_like("00000000-0000-0000-0000-000000000000"));

    // Wrong length
    assert!(!is_uuid_like("550e8400-e29b-41d4-a716-44665544000"));
    // Hyphens in wrong positions
    assert!(!is_uuid_like("550e8400e-29b-41d4-a716-446655440000"));
    // Non-hex characters
    assert!(!is_uuid_like("550e8400-e29g-41d4-a716-446655440000"));
}

#[test]
fn test_counters_appear_in_exposition() {
    let metrics = ServiceMetrics::new().unwrap();

    metrics.record_http_request(
        "GET",
        "/api/verify/kvk/68750110",
        200,
        Duration::from_millis(12),
    );
    metrics.record_registry_lookup("kvk");
    metrics.record_breaker_rejection("kvk");

    let text = metrics.encode().unwrap();
    assert!(text.contains("asr_http_requests_total"));
    assert!(text.contains("asr_registry_lookups_total"));
    assert!(text.contains("asr_breaker_rejections_total"));
    // Path labels use the normalized form.
    assert!(text.contains("/api/verify/kvk/:id"));
}

#[test]
fn test_independent_instances_do_not_collide() {
    // Each instance owns its registry, so parallel tests never trip
    // duplicate-registration errors.
    let first = ServiceMetrics::new().unwrap();
    let second = ServiceMetrics::new().unwrap();

    first.record_registry_lookup("kvk");
    second.record_registry_lookup("gleif");

    assert!(first.encode().unwrap().contains("kvk"));
    assert!(!second.encode().unwrap().contains("\"kvk\""));
}
