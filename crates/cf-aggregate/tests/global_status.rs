//! The process-wide entry point and its status flag.
//!
//! Kept in its own test binary so no other test touches the global state.

use cf_aggregate::{aggregate, last_status, AggregateOptions, AggregateStatus};
use test_utils::{time_slab, FieldBuilder, TIME_UNITS};

#[test]
fn test_last_status_tracks_latest_call() {
    let options = AggregateOptions::default();

    let overlapping = vec![
        FieldBuilder::new("air_temperature", "K")
            .dim("time", vec![0.0, 1.0, 2.0], TIME_UNITS)
            .build()
            .unwrap(),
        FieldBuilder::new("air_temperature", "K")
            .dim("time", vec![2.0, 3.0], TIME_UNITS)
            .build()
            .unwrap(),
    ];
    let fields = aggregate(overlapping, &options).unwrap();
    assert_eq!(fields.len(), 2);
    assert_eq!(last_status(), AggregateStatus::Failed);

    let adjacent = vec![time_slab(0.0, 2).unwrap(), time_slab(2.0, 2).unwrap()];
    let fields = aggregate(adjacent, &options).unwrap();
    assert_eq!(fields.len(), 1);
    assert_eq!(last_status(), AggregateStatus::Success);
}

#[test]
fn test_invalid_options_surface() {
    let options = AggregateOptions {
        equal: vec!["units".to_string()],
        ..Default::default()
    };
    assert!(aggregate(vec![time_slab(0.0, 1).unwrap()], &options).is_err());
}
