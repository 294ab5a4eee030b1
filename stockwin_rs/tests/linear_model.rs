use anyhow::Result;
use polars::prelude::*;
use stockwin_rs::model::DEFAULT_PREDICTION_COLUMN;
use stockwin_rs::{LinearModel, LinearParams, Model};
use tempfile::tempdir;

fn training_frame() -> Result<DataFrame> {
    Ok(df!(
        "x" => &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0],
        "y" => &[4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 11.0, 12.0]
    )?)
}

#[test]
fn train_fits_slope_through_moments() -> Result<()> {
    let train = training_frame()?;
    let mut model = LinearModel::default();
    model.train(&train, None)?;

    let LinearParams { k, b } = model.params();
    let expected_k = 40.875 / (25.5 + 1e-10);
    assert!((k - expected_k).abs() < 1e-12);
    assert!((k - 1.602_941_2).abs() < 1e-6);
    assert!((b - (7.75 - expected_k * 4.5)).abs() < 1e-12);
    assert!((b - 0.536_764_7).abs() < 1e-6);
    Ok(())
}

#[test]
fn predict_appends_column_and_evaluate_reports_mse() -> Result<()> {
    let frame = training_frame()?;
    let mut model = LinearModel::default();
    model.build(LinearParams { k: 2.0, b: 1.0 })?;

    let predicted = model.predict(&frame, DEFAULT_PREDICTION_COLUMN)?;
    assert_eq!(predicted.get_column_names(), vec!["x", "y", "predict"]);
    let values: Vec<Option<f64>> = predicted.column("predict")?.f64()?.into_iter().collect();
    assert_eq!(values[0], Some(3.0));
    assert_eq!(values[7], Some(17.0));
    assert_eq!(frame.width(), 2);

    // Residuals -1 0 1 2 3 4 4 5; squares sum to 72.
    let metrics = model.evaluate(&frame)?;
    assert_eq!(metrics.keys().collect::<Vec<_>>(), vec!["mse"]);
    assert!((metrics["mse"] - 9.0).abs() < 1e-12);
    Ok(())
}

#[test]
fn rows_with_missing_values_are_ignored_in_training() -> Result<()> {
    let frame = df!(
        "feat" => &[Some(1.0), Some(2.0), None, Some(4.0)],
        "label" => &[Some(2.0), Some(4.0), Some(100.0), None]
    )?;
    let mut model = LinearModel::new("feat", "label");
    model.train(&frame, None)?;
    // Only (1, 2) and (2, 4) remain.
    let LinearParams { k, b } = model.params();
    assert!((k - 5.0 / (2.5 + 1e-10)).abs() < 1e-12);
    assert!((b - (3.0 - k * 1.5)).abs() < 1e-12);

    let empty = df!("feat" => &[None::<f64>], "label" => &[Some(1.0)])?;
    assert!(LinearModel::new("feat", "label").train(&empty, None).is_err());
    assert!(LinearModel::default().train(&frame, None).is_err());
    Ok(())
}

#[test]
fn save_and_load_restore_parameters() -> Result<()> {
    let temp_dir = tempdir()?;
    let path = temp_dir.path().join("linear.json");

    let mut trained = LinearModel::default();
    trained.train(&training_frame()?, None)?;
    let written = trained.save(&path)?;
    assert_eq!(written, path);

    let stored: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert!(stored.get("k").is_some());
    assert!(stored.get("b").is_some());

    let mut restored = LinearModel::default();
    restored.load(&path)?;
    assert_eq!(restored.params(), trained.params());
    Ok(())
}
