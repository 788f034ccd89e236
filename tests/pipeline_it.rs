use std::sync::Arc;

use bandcast::{
    join_with_actuals,
    model::{AdditiveContribution, AdditiveStaged, BaggedTrees, DecisionTree, RecurrentSequence},
    pipeline::{PipelineMode, SequencePipeline, TablePipeline},
    store::{MemoryFeatureStore, MemoryPredictionStore},
    FsModelRepository, MinMaxScaler, Model,
};
use ndarray::array;
use polars::prelude::*;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/**
 * End-to-end run over two tables with filesystem artifacts:
 *  - "alpha" carries a bagged and a contribution artifact, no staged one
 *      - bagged votes are [1, 2, 3, 4] on every row
 *          => main 2.5, 5th 1.15, 95th 3.85
 *      - contribution trees are [1, 2] with bias 0.5
 *          => native main 3.5, cumulative rows [1, 3], 5th 1.1, 95th 2.9
 *  - "beta" carries only a staged artifact, base 5.0, lr 0.5, stages [1, 3]
 *      => main 7.0, stage-output band 1.1 / 2.9
 *  - the missing staged family on "alpha" must skip without failing it
 */

fn bagged() -> Model {
    Model::Bagged(BaggedTrees::new(vec![
        DecisionTree::leaf(1.0),
        DecisionTree::leaf(2.0),
        DecisionTree::leaf(3.0),
        DecisionTree::leaf(4.0),
    ]))
}

fn contribution() -> Model {
    Model::Contribution(AdditiveContribution::new(
        0.5,
        vec![DecisionTree::leaf(1.0), DecisionTree::leaf(2.0)],
    ))
}

fn staged() -> Model {
    Model::Staged(AdditiveStaged::new(
        5.0,
        0.5,
        vec![DecisionTree::leaf(1.0), DecisionTree::leaf(3.0)],
    ))
}

fn feature_df() -> DataFrame {
    df!(
        "Date" => &["2024-03-04", "2024-03-05", "2024-03-06"],
        "Close" => &[100.0, 101.0, 102.0],
        "target_n7d" => &[Some(103.0), Some(104.0), None],
    )
    .unwrap()
}

fn fs_repository(dir: &std::path::Path) -> FsModelRepository {
    let repo = FsModelRepository::new(dir);
    repo.save_model("alpha", &bagged()).unwrap();
    repo.save_model("alpha", &contribution()).unwrap();
    repo.save_model("beta", &staged()).unwrap();
    repo
}

fn features() -> MemoryFeatureStore {
    MemoryFeatureStore::new()
        .with_table("alpha", feature_df())
        .with_table("beta", feature_df())
}

#[test]
fn backfill_run_bands_every_table_with_its_available_families() -> anyhow::Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let predictions = Arc::new(MemoryPredictionStore::new());

    let pipeline = TablePipeline::builder()
        .with_feature_store(Arc::new(features()))
        .with_prediction_store(predictions.clone())
        .with_model_repository(Arc::new(fs_repository(dir.path())))
        .build()?;

    let summary = pipeline.run()?;
    assert_eq!(
        summary.completed,
        vec!["alpha".to_string(), "beta".to_string()]
    );
    assert!(summary.skipped.is_empty());
    assert!(summary.failed.is_empty());

    let alpha = predictions.table("prediction_alpha").unwrap();
    assert_eq!(alpha.height(), 3);
    assert_eq!(
        alpha
            .get_column_names()
            .iter()
            .map(|n| n.as_str())
            .collect::<Vec<_>>(),
        vec![
            "Date",
            "Actual",
            "Predicted_bagged_trees",
            "5th_Percentile_bagged_trees",
            "95th_Percentile_bagged_trees",
            "Predicted_boosted_contribution",
            "5th_Percentile_boosted_contribution",
            "95th_Percentile_boosted_contribution",
        ]
    );

    let get = |name: &str, i: usize| alpha.column(name).unwrap().f64().unwrap().get(i).unwrap();
    assert!((get("Predicted_bagged_trees", 0) - 2.5).abs() < 1e-12);
    assert!((get("5th_Percentile_bagged_trees", 0) - 1.15).abs() < 1e-12);
    assert!((get("95th_Percentile_bagged_trees", 0) - 3.85).abs() < 1e-12);
    assert!((get("Predicted_boosted_contribution", 0) - 3.5).abs() < 1e-12);
    assert!((get("5th_Percentile_boosted_contribution", 0) - 1.1).abs() < 1e-12);
    assert!((get("95th_Percentile_boosted_contribution", 0) - 2.9).abs() < 1e-12);

    let beta = predictions.table("prediction_beta").unwrap();
    let get = |name: &str, i: usize| beta.column(name).unwrap().f64().unwrap().get(i).unwrap();
    assert!((get("Predicted_staged_boosting", 1) - 7.0).abs() < 1e-12);
    assert!((get("5th_Percentile_staged_boosting", 1) - 1.1).abs() < 1e-12);
    assert!((get("95th_Percentile_staged_boosting", 1) - 2.9).abs() < 1e-12);
    assert!(beta.column("Predicted_bagged_trees").is_err());
    Ok(())
}

#[test]
fn future_run_emits_one_row_per_table_and_joins_back_to_actuals() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let predictions = Arc::new(MemoryPredictionStore::new());

    let pipeline = TablePipeline::builder()
        .with_feature_store(Arc::new(features()))
        .with_prediction_store(predictions.clone())
        .with_model_repository(Arc::new(fs_repository(dir.path())))
        .with_mode(PipelineMode::Future)
        .build()
        .unwrap();

    let summary = pipeline.run().unwrap();
    assert_eq!(summary.completed.len(), 2);

    // Only the latest date without a realized target is scored, and the
    // future view never carries an Actual column.
    let alpha = predictions.table("future_prediction_alpha").unwrap();
    assert_eq!(alpha.height(), 1);
    assert!(alpha.column("Actual").is_err());

    // Once the target realizes, the evaluation view is an inner join on
    // the timestamp column.
    let realized = DataFrame::new(vec![
        alpha.column("Date").unwrap().clone(),
        Column::new("Close".into(), vec![102.4]),
    ])
    .unwrap();
    let joined = join_with_actuals(&alpha, &realized, "Date").unwrap();
    assert_eq!(joined.height(), 1);
    assert!(joined.column("Close").is_ok());
    assert!(joined.column("Predicted_bagged_trees").is_ok());
}

#[test]
fn rerun_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let predictions = Arc::new(MemoryPredictionStore::new());

    let pipeline = TablePipeline::builder()
        .with_feature_store(Arc::new(features()))
        .with_prediction_store(predictions.clone())
        .with_model_repository(Arc::new(fs_repository(dir.path())))
        .build()
        .unwrap();

    pipeline.run().unwrap();
    let first = predictions.table("prediction_alpha").unwrap();
    pipeline.run().unwrap();
    let second = predictions.table("prediction_alpha").unwrap();
    assert!(first.equals_missing(&second));
}

/**
 * Sequence run through filesystem artifacts:
 *  - one hidden unit, zero recurrence weight, two-step head [h, 2h]
 *      => the forecast after a window is tanh of its last (scaled) input
 *  - scaler fitted on [0, 1] so transform/inverse are the identity
 *  - four 5-minute bars, n_steps = 2 => windows anchor at 09:25 and 09:30;
 *    the overlapping 09:35 forecast resolves to the later window
 */
#[test]
fn sequence_run_forecasts_through_persisted_artifacts() {
    let model = Model::Recurrent(
        RecurrentSequence::new(
            array![[1.0]],
            array![[0.0]],
            array![0.0],
            array![[1.0], [2.0]],
            array![0.0, 0.0],
            2,
            1,
        )
        .unwrap(),
    );
    let scaler = MinMaxScaler::fit(&array![[0.0], [1.0]]);

    let dir = tempfile::tempdir().unwrap();
    let repo = FsModelRepository::new(dir.path());
    repo.save_model("alpha", &model).unwrap();
    repo.save_scaler("alpha", &scaler).unwrap();

    let bars = df!(
        "Datetime" => &[
            "2024-03-04 09:15:00",
            "2024-03-04 09:20:00",
            "2024-03-04 09:25:00",
            "2024-03-04 09:30:00",
        ],
        "Close" => &[0.0, 0.25, 0.5, 1.0],
    )
    .unwrap();

    let predictions = Arc::new(MemoryPredictionStore::new());
    let pipeline = SequencePipeline::builder()
        .with_feature_store(Arc::new(
            MemoryFeatureStore::new().with_table("alpha", bars),
        ))
        .with_prediction_store(predictions.clone())
        .with_model_repository(Arc::new(repo))
        .with_input_columns(vec!["Close".to_string()])
        .with_n_steps(2)
        .build()
        .unwrap();

    let summary = pipeline.run().unwrap();
    assert_eq!(summary.completed, vec!["alpha".to_string()]);

    let out = predictions.table("alpha_predictions").unwrap();
    assert_eq!(out.height(), 3);
    let forecast = out.column("Predicted_Close").unwrap().f64().unwrap();
    assert!((forecast.get(0).unwrap() - 0.25_f64.tanh()).abs() < 1e-12);
    assert!((forecast.get(1).unwrap() - 0.5_f64.tanh()).abs() < 1e-12);
    assert!((forecast.get(2).unwrap() - 2.0 * 0.5_f64.tanh()).abs() < 1e-12);
}
