use std::sync::Arc;

use rayon::prelude::*;
use strum::Display;

use crate::{
    aligner::{AlignedBatch, DataAligner},
    assembler::{PredictionAssembler, PredictionRecord},
    bands::UncertaintyEstimator,
    error::{
        AlignmentError, BandcastError, BandcastResult, DataError, EmptyInputError,
    },
    model::ModelFamily,
    session::TimestampProjector,
    store::{FeatureStore, ModelRepository, PredictionStore},
    windower::SequenceWindower,
};

/// Which rows of a table the ensemble pipeline scores.
///
/// `Backfill` scores every aligned row and carries the realized target as
/// `Actual`; `Future` keeps only the rows whose target is still missing,
/// restricted to the latest date, and emits no `Actual` column. One
/// configurable pipeline replaces the divergent per-mode scripts of the
/// system this engine supersedes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum PipelineMode {
    Backfill,
    Future,
}

/// Per-run outcome accounting. A skipped table produced no output rows but
/// is not a failure; a failed table hit a real error that was contained at
/// the table boundary.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub completed: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
}

fn summarize(outcomes: Vec<(String, BandcastResult<()>)>) -> RunSummary {
    let mut summary = RunSummary::default();
    for (table, outcome) in outcomes {
        match outcome {
            Ok(()) => summary.completed.push(table),
            Err(BandcastError::Empty(e)) => {
                tracing::info!(table = %table, reason = %e, "Skipping table");
                summary.skipped.push(table);
            }
            Err(BandcastError::Model(e)) => {
                tracing::info!(table = %table, reason = %e, "Skipping table");
                summary.skipped.push(table);
            }
            Err(e) => {
                tracing::warn!(table = %table, error = %e, "Table failed");
                summary.failed.push(table);
            }
        }
    }
    summary
}

// ================================================================================================
// Ensemble pipeline
// ================================================================================================

/// Scores every source table with the configured tree-ensemble families
/// and writes one banded prediction table per source table.
///
/// Tables are independent units of work: they share no mutable state, run
/// in parallel, and a failure in one never aborts its siblings. A missing
/// model artifact skips that family only; the table still completes with
/// the remaining families.
pub struct TablePipeline {
    features: Arc<dyn FeatureStore>,
    predictions: Arc<dyn PredictionStore>,
    models: Arc<dyn ModelRepository>,
    aligner: DataAligner,
    estimator: UncertaintyEstimator,
    families: Vec<ModelFamily>,
    mode: PipelineMode,
}

impl TablePipeline {
    pub fn builder() -> TablePipelineBuilder {
        TablePipelineBuilder::new()
    }

    #[tracing::instrument(skip(self), fields(mode = %self.mode))]
    pub fn run(&self) -> BandcastResult<RunSummary> {
        let tables = self.features.table_names()?;
        tracing::info!(n_tables = tables.len(), "Starting ensemble prediction run");

        let outcomes: Vec<(String, BandcastResult<()>)> = tables
            .into_par_iter()
            .map(|table| {
                let outcome = self.process_table(&table);
                (table, outcome)
            })
            .collect();

        Ok(summarize(outcomes))
    }

    fn process_table(&self, table: &str) -> BandcastResult<()> {
        let df = self.features.load_table(table)?;
        let batch = self.aligner.align(&df)?;
        let batch = match self.mode {
            PipelineMode::Backfill => batch,
            PipelineMode::Future => self.future_rows(&batch)?,
        };
        if batch.is_empty() {
            return Err(EmptyInputError::NoRowsAfterCleaning(table.to_string()).into());
        }

        let mut outputs = Vec::with_capacity(self.families.len());
        for &family in &self.families {
            if family == ModelFamily::RecurrentSequence {
                tracing::warn!(
                    table = %table,
                    "Recurrent family has no distribution; use the sequence pipeline"
                );
                continue;
            }
            let model = match self.models.load_model(table, family) {
                Ok(model) => model,
                Err(e) => {
                    tracing::warn!(table = %table, family = %family, reason = %e, "Skipping model family");
                    continue;
                }
            };
            let prediction = model.predict_with_distribution(&batch.features)?;
            let band = self.estimator.bands(&prediction.distribution);
            outputs.push((family, prediction, band));
        }

        let mut assembler = PredictionAssembler::new(self.aligner.date_column());
        if self.mode == PipelineMode::Backfill {
            assembler = assembler.with_actuals();
        }

        for i in 0..batch.len() {
            let mut record = PredictionRecord::new(batch.dates[i]);
            if self.mode == PipelineMode::Backfill {
                record = record.with_actual(batch.target.as_ref().and_then(|t| t[i]));
            }
            for (family, prediction, band) in &outputs {
                record = record
                    .with_value(format!("Predicted_{family}"), prediction.main[i])
                    .with_value(format!("5th_Percentile_{family}"), band.lower[i])
                    .with_value(format!("95th_Percentile_{family}"), band.upper[i]);
            }
            assembler.insert(record);
        }

        let rows = assembler.len();
        let out = assembler.finish()?;
        self.predictions
            .replace_table(&self.output_table_name(table), out)?;
        tracing::info!(table = %table, rows, "Wrote prediction table");
        Ok(())
    }

    /// Rows still awaiting a realized target, restricted to the latest
    /// date among them. These are the only rows worth forecasting forward.
    fn future_rows(&self, batch: &AlignedBatch) -> BandcastResult<AlignedBatch> {
        let target = batch.target.as_ref().ok_or_else(|| {
            AlignmentError::MissingColumn(self.aligner.target_column().to_string())
        })?;

        let missing: Vec<usize> = (0..batch.len()).filter(|&i| target[i].is_none()).collect();
        let latest = missing.iter().map(|&i| batch.dates[i]).max();
        let keep: Vec<usize> = missing
            .into_iter()
            .filter(|&i| Some(batch.dates[i]) == latest)
            .collect();
        Ok(batch.select(&keep))
    }

    fn output_table_name(&self, table: &str) -> String {
        match self.mode {
            PipelineMode::Backfill => format!("prediction_{table}"),
            PipelineMode::Future => format!("future_prediction_{table}"),
        }
    }
}

pub struct TablePipelineBuilder {
    features: Option<Arc<dyn FeatureStore>>,
    predictions: Option<Arc<dyn PredictionStore>>,
    models: Option<Arc<dyn ModelRepository>>,
    date_column: String,
    target_column: String,
    families: Vec<ModelFamily>,
    mode: PipelineMode,
}

impl TablePipelineBuilder {
    pub fn new() -> Self {
        Self {
            features: None,
            predictions: None,
            models: None,
            date_column: "Date".to_string(),
            target_column: "target_n7d".to_string(),
            families: ModelFamily::banded().to_vec(),
            mode: PipelineMode::Backfill,
        }
    }

    pub fn with_feature_store(mut self, store: Arc<dyn FeatureStore>) -> Self {
        self.features = Some(store);
        self
    }

    pub fn with_prediction_store(mut self, store: Arc<dyn PredictionStore>) -> Self {
        self.predictions = Some(store);
        self
    }

    pub fn with_model_repository(mut self, repo: Arc<dyn ModelRepository>) -> Self {
        self.models = Some(repo);
        self
    }

    pub fn with_date_column(mut self, name: impl Into<String>) -> Self {
        self.date_column = name.into();
        self
    }

    pub fn with_target_column(mut self, name: impl Into<String>) -> Self {
        self.target_column = name.into();
        self
    }

    pub fn with_families(mut self, families: Vec<ModelFamily>) -> Self {
        self.families = families;
        self
    }

    pub fn with_mode(mut self, mode: PipelineMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn build(self) -> BandcastResult<TablePipeline> {
        Ok(TablePipeline {
            features: self
                .features
                .ok_or_else(|| DataError::MissingField("feature store".to_string()))?,
            predictions: self
                .predictions
                .ok_or_else(|| DataError::MissingField("prediction store".to_string()))?,
            models: self
                .models
                .ok_or_else(|| DataError::MissingField("model repository".to_string()))?,
            aligner: DataAligner::new(self.date_column, self.target_column),
            estimator: UncertaintyEstimator::default(),
            families: self.families,
            mode: self.mode,
        })
    }
}

impl Default for TablePipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ================================================================================================
// Sequence pipeline
// ================================================================================================

/// Multi-step recurrent forecasting over sliding windows, with forecast
/// timestamps projected onto trading-session boundaries. Shares the
/// aligner and per-table isolation rules with the ensemble pipeline.
pub struct SequencePipeline {
    features: Arc<dyn FeatureStore>,
    predictions: Arc<dyn PredictionStore>,
    models: Arc<dyn ModelRepository>,
    aligner: DataAligner,
    windower: SequenceWindower,
    projector: TimestampProjector,
    input_columns: Vec<String>,
}

impl SequencePipeline {
    pub fn builder() -> SequencePipelineBuilder {
        SequencePipelineBuilder::new()
    }

    #[tracing::instrument(skip(self))]
    pub fn run(&self) -> BandcastResult<RunSummary> {
        let tables = self.features.table_names()?;
        tracing::info!(n_tables = tables.len(), "Starting sequence forecast run");

        let outcomes: Vec<(String, BandcastResult<()>)> = tables
            .into_par_iter()
            .map(|table| {
                let outcome = self.process_table(&table);
                (table, outcome)
            })
            .collect();

        Ok(summarize(outcomes))
    }

    fn process_table(&self, table: &str) -> BandcastResult<()> {
        let df = self.features.load_table(table)?;
        let (matrix, dates) = self.aligner.extract_ordered(&df, &self.input_columns)?;

        let model = self
            .models
            .load_model(table, ModelFamily::RecurrentSequence)?;
        let scaler = self.models.load_scaler(table)?;
        if scaler.n_columns() != self.input_columns.len() {
            return Err(DataError::DimensionMismatch(format!(
                "scaler covers {} columns, pipeline configured for {}",
                scaler.n_columns(),
                self.input_columns.len()
            ))
            .into());
        }

        let scaled = scaler.transform(&matrix)?;
        let windows = self.windower.windows(&scaled);
        if windows.is_empty() {
            return Err(EmptyInputError::InsufficientHistory {
                table: table.to_string(),
                rows: scaled.nrows(),
                n_steps: self.windower.n_steps(),
            }
            .into());
        }

        let mut assembler = PredictionAssembler::new(self.aligner.date_column());
        for window in &windows {
            let forecast_scaled = model.forecast_window(window.data())?;
            let forecast = scaler.inverse_transform(&forecast_scaled)?;

            // Each window is anchored to the timestamp of the row right
            // after it; all steps project from that same base.
            let base = dates[window.start() + self.windower.n_steps()];
            for step in 0..forecast.nrows() {
                let timestamp = self.projector.project(base, step as u32 + 1);
                let mut record = PredictionRecord::new(timestamp);
                for (j, column) in self.input_columns.iter().enumerate() {
                    record = record.with_value(format!("Predicted_{column}"), forecast[(step, j)]);
                }
                assembler.insert(record);
            }
        }

        let rows = assembler.len();
        let out = assembler.finish()?;
        self.predictions
            .replace_table(&format!("{table}_predictions"), out)?;
        tracing::info!(table = %table, rows, "Wrote sequence forecast table");
        Ok(())
    }
}

pub struct SequencePipelineBuilder {
    features: Option<Arc<dyn FeatureStore>>,
    predictions: Option<Arc<dyn PredictionStore>>,
    models: Option<Arc<dyn ModelRepository>>,
    date_column: String,
    input_columns: Vec<String>,
    n_steps: usize,
    projector: TimestampProjector,
}

impl SequencePipelineBuilder {
    pub fn new() -> Self {
        Self {
            features: None,
            predictions: None,
            models: None,
            date_column: "Datetime".to_string(),
            input_columns: ["Open", "High", "Low", "Close", "Volume"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            n_steps: 12,
            projector: TimestampProjector::default(),
        }
    }

    pub fn with_feature_store(mut self, store: Arc<dyn FeatureStore>) -> Self {
        self.features = Some(store);
        self
    }

    pub fn with_prediction_store(mut self, store: Arc<dyn PredictionStore>) -> Self {
        self.predictions = Some(store);
        self
    }

    pub fn with_model_repository(mut self, repo: Arc<dyn ModelRepository>) -> Self {
        self.models = Some(repo);
        self
    }

    pub fn with_date_column(mut self, name: impl Into<String>) -> Self {
        self.date_column = name.into();
        self
    }

    pub fn with_input_columns(mut self, columns: Vec<String>) -> Self {
        self.input_columns = columns;
        self
    }

    pub fn with_n_steps(mut self, n_steps: usize) -> Self {
        self.n_steps = n_steps;
        self
    }

    pub fn with_projector(mut self, projector: TimestampProjector) -> Self {
        self.projector = projector;
        self
    }

    pub fn build(self) -> BandcastResult<SequencePipeline> {
        Ok(SequencePipeline {
            features: self
                .features
                .ok_or_else(|| DataError::MissingField("feature store".to_string()))?,
            predictions: self
                .predictions
                .ok_or_else(|| DataError::MissingField("prediction store".to_string()))?,
            models: self
                .models
                .ok_or_else(|| DataError::MissingField("model repository".to_string()))?,
            aligner: DataAligner::new(self.date_column, ""),
            windower: SequenceWindower::new(self.n_steps),
            projector: self.projector,
            input_columns: self.input_columns,
        })
    }
}

impl Default for SequencePipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
