use super::*;

fn create_test_registry() -> Registry {
    let registry = Registry::new_custom(Some("shared_state".to_string()), None).unwrap();
    register_custom_metrics(&registry);
    registry
}

#[test]
fn test_custom_registry() {
    let registry = create_test_registry();

    STATE_BATCHES.with_label_values(&[OUTCOME_APPLIED]).inc();
    LOCK_BATCHES.with_label_values(&[OUTCOME_REJECTED]).inc();
    let metrics = &registry.gather();
    assert!(!metrics.is_empty());

    let metric_names: Vec<_> = metrics.iter().map(|m| m.get_name()).collect();
    assert!(
        metric_names.contains(&"shared_state_state_batches_total"),
        "Missing shared_state_state_batches_total"
    );
    assert!(
        metric_names.contains(&"shared_state_lock_batches_total"),
        "Missing shared_state_lock_batches_total"
    );
}

#[test]
fn test_counter_increment() {
    let before = BROADCASTS_SENT.get();
    BROADCASTS_SENT.inc();
    BROADCASTS_SENT.inc();
    assert!(BROADCASTS_SENT.get() >= before + 2);
}

#[test]
fn encoded_metrics_use_text_format() {
    ACTIVE_SUBSCRIBERS.set(ACTIVE_SUBSCRIBERS.get());
    let body = encode_metrics();
    assert!(body.contains("active_subscribers"));
}
