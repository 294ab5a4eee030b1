use anyhow::Result;
use polars::prelude::*;
use stockwin_rs::target::RATIO_EPSILON;
use stockwin_rs::{AggregationKind, PriceMovementTarget, TargetSpec, ValidationError};

fn sample_frame() -> Result<DataFrame> {
    Ok(df!(
        "High" => &[10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 80.0, 80.0],
        "Low" => &[10i64, 9, 8, 7, 6, 5, 4, 3, 2, 1]
    )?)
}

fn floats(frame: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    Ok(frame.column(name)?.f64()?.into_iter().collect())
}

fn assert_close(actual: Option<f64>, expected: f64) {
    let actual = actual.expect("value should be present");
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn future_high_point_matches_forward_window() -> Result<()> {
    let base = sample_frame()?;
    let mut targets = PriceMovementTarget::new(&base, 1);
    targets.add_future_high_point("High", 3)?;
    let frame = targets.build();

    assert_eq!(
        frame.get_column_names(),
        vec![
            "High",
            "Low",
            "future_3day_max_High_ratio",
            "future_3day_max_High"
        ]
    );

    let future = floats(&frame, "future_3day_max_High")?;
    assert_eq!(future[0], Some(40.0));
    assert_eq!(future[6], Some(80.0));
    assert!(future[7..].iter().all(Option::is_none));

    let ratio = floats(&frame, "future_3day_max_High_ratio")?;
    assert_eq!(ratio[0], Some(40.0 / (20.0 + RATIO_EPSILON)));
    assert_close(ratio[0], 2.0);
    assert_close(ratio[6], 1.0);
    assert!(ratio[7..].iter().all(Option::is_none));
    Ok(())
}

#[test]
fn ratio_equals_aggregate_over_next_day_plus_epsilon() -> Result<()> {
    let base = sample_frame()?;
    let mut targets = PriceMovementTarget::new(&base, 2);
    targets
        .add_future_low_point("Low", 3)?
        .add_future_avg_point("Low", 3)?;
    let frame = targets.build();

    let next = floats(&frame, "next_day_Low")?;
    assert_eq!(next[0], Some(9.0));
    assert_eq!(next[9], None);

    for kind in ["min", "mean"] {
        let future = floats(&frame, &format!("future_3day_{kind}_Low"))?;
        let ratio = floats(&frame, &format!("future_3day_{kind}_Low_ratio"))?;
        for i in 0..frame.height() {
            match (future[i], next[i]) {
                (Some(f), Some(n)) => assert_eq!(ratio[i], Some(f / (n + RATIO_EPSILON))),
                _ => assert_eq!(ratio[i], None),
            }
        }
        assert!(future[7..].iter().all(Option::is_none));
    }

    // Integer input is coerced before dividing.
    let min_ratio = floats(&frame, "future_3day_min_Low_ratio")?;
    assert_close(min_ratio[0], 7.0 / 9.0);
    let avg_ratio = floats(&frame, "future_3day_mean_Low_ratio")?;
    assert_close(avg_ratio[0], 8.0 / 9.0);
    Ok(())
}

#[test]
fn verbosity_controls_intermediate_columns() -> Result<()> {
    let base = sample_frame()?;

    let mut quiet = PriceMovementTarget::new(&base, 0);
    quiet.add_future_high_point("High", 2)?;
    assert_eq!(
        quiet.data().get_column_names(),
        vec!["High", "Low", "future_2day_max_High_ratio"]
    );

    let mut verbose = PriceMovementTarget::new(&base, 2);
    verbose.add_future_high_point("High", 2)?;
    assert_eq!(
        verbose.data().get_column_names(),
        vec![
            "High",
            "Low",
            "future_2day_max_High_ratio",
            "future_2day_max_High",
            "next_day_High"
        ]
    );

    // An explicit verbosity on compute_movement overrides the builder's.
    let mut explicit = PriceMovementTarget::new(&base, 0);
    explicit.compute_movement("High", 2, AggregationKind::Mean, 1)?;
    assert_eq!(explicit.verbosity(), 0);
    assert_eq!(explicit.data().width(), 4);
    Ok(())
}

#[test]
fn spec_driven_targets_use_builder_verbosity() -> Result<()> {
    let base = sample_frame()?;
    let spec: TargetSpec = "High:4:mean".parse()?;
    let mut targets = PriceMovementTarget::new(&base, 1);
    targets.add_spec(&spec)?;

    let future = floats(targets.data(), "future_4day_mean_High")?;
    assert_eq!(future[0], Some(35.0));
    assert!(future[6..].iter().all(Option::is_none));
    assert_eq!(spec.ratio_name(), "future_4day_mean_High_ratio");
    Ok(())
}

#[test]
fn invalid_requests_fail_before_any_column_is_written() -> Result<()> {
    let base = sample_frame()?;
    let mut targets = PriceMovementTarget::new(&base, 2);

    let err = targets.add_future_high_point("Close", 3).unwrap_err();
    assert_eq!(
        err.downcast_ref::<ValidationError>(),
        Some(&ValidationError::MissingColumn("Close".to_string()))
    );

    let err = targets
        .compute_movement("High", 3, AggregationKind::Median, 2)
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ValidationError>(),
        Some(ValidationError::UnsupportedAggregation { .. })
    ));

    let err = targets.add_future_low_point("Low", 0).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ValidationError>(),
        Some(ValidationError::ZeroLength { .. })
    ));

    assert_eq!(targets.data().get_column_names(), vec!["High", "Low"]);
    Ok(())
}
