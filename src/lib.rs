pub mod aligner;
pub mod assembler;
pub mod bands;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod scaler;
pub mod session;
pub mod store;
pub mod training;
pub mod windower;

pub use aligner::{AlignedBatch, DataAligner};
pub use assembler::{join_with_actuals, PredictionAssembler, PredictionRecord};
pub use bands::{PercentileBand, UncertaintyEstimator};
pub use error::{BandcastError, BandcastResult};
pub use model::{Model, ModelFamily, Prediction};
pub use pipeline::{PipelineMode, RunSummary, SequencePipeline, TablePipeline};
pub use scaler::{MinMaxScaler, StandardScaler};
pub use session::{MarketSession, TimestampProjector};
pub use store::{FeatureStore, FsModelRepository, ModelRepository, PredictionStore};
pub use training::{train_test_split, ModelTrainer, TrainContext};
pub use windower::{SequenceWindow, SequenceWindower};
