use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Mutex,
};

use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::{
    error::{BandcastResult, ModelLoadError, UpstreamFetchError},
    model::{Model, ModelFamily},
    scaler::MinMaxScaler,
};

// ================================================================================================
// Collaborator seams
// ================================================================================================

/// Keyed collection of source tables. Failures here are fatal for the
/// whole run; nothing downstream can proceed without data.
pub trait FeatureStore: Send + Sync {
    fn table_names(&self) -> Result<Vec<String>, UpstreamFetchError>;
    fn load_table(&self, name: &str) -> Result<DataFrame, UpstreamFetchError>;
}

/// Destination for assembled prediction tables. Write policy is full
/// replace, never append or merge.
pub trait PredictionStore: Send + Sync {
    fn replace_table(&self, name: &str, table: DataFrame) -> BandcastResult<()>;
}

/// Read-only repository of fitted model artifacts, one per
/// (table, family), plus the feature scaler shipped with the recurrent
/// family. Absence is a soft-skip condition, not fatal.
pub trait ModelRepository: Send + Sync {
    fn load_model(&self, table: &str, family: ModelFamily) -> Result<Model, ModelLoadError>;
    fn load_scaler(&self, table: &str) -> Result<MinMaxScaler, ModelLoadError>;
}

// ================================================================================================
// Serde Formats
// ================================================================================================

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    IntoStaticStr,
    Default,
)]
#[strum(serialize_all = "lowercase")]
pub enum SerdeFormat {
    #[default]
    Postcard,
}

// ================================================================================================
// Filesystem model repository
// ================================================================================================

/// Loads model artifacts from a flat directory:
/// `<root>/<table>_<family>.<format>` and `<root>/<table>_scaler.<format>`.
#[derive(Debug, Clone)]
pub struct FsModelRepository {
    root: PathBuf,
    format: SerdeFormat,
}

impl FsModelRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            format: SerdeFormat::default(),
        }
    }

    fn artifact_path(&self, stem: &str) -> PathBuf {
        self.root.join(format!("{stem}.{}", self.format))
    }

    fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, ModelLoadError> {
        std::fs::read(path).map_err(|e| ModelLoadError::Io(format!("{}: {e}", path.display())))
    }

    /// Serializes a fitted model into the repository layout. The engine
    /// itself never writes artifacts; this exists for training tooling and
    /// tests.
    pub fn save_model(&self, table: &str, model: &Model) -> Result<(), ModelLoadError> {
        let bytes = match self.format {
            SerdeFormat::Postcard => {
                postcard::to_stdvec(model).map_err(|e| ModelLoadError::Corrupt(e.to_string()))?
            }
        };
        let path = self.artifact_path(&format!("{table}_{}", model.family()));
        std::fs::write(&path, bytes)
            .map_err(|e| ModelLoadError::Io(format!("{}: {e}", path.display())))
    }

    pub fn save_scaler(&self, table: &str, scaler: &MinMaxScaler) -> Result<(), ModelLoadError> {
        let bytes = match self.format {
            SerdeFormat::Postcard => {
                postcard::to_stdvec(scaler).map_err(|e| ModelLoadError::Corrupt(e.to_string()))?
            }
        };
        let path = self.artifact_path(&format!("{table}_scaler"));
        std::fs::write(&path, bytes)
            .map_err(|e| ModelLoadError::Io(format!("{}: {e}", path.display())))
    }
}

impl ModelRepository for FsModelRepository {
    fn load_model(&self, table: &str, family: ModelFamily) -> Result<Model, ModelLoadError> {
        let path = self.artifact_path(&format!("{table}_{family}"));
        if !path.exists() {
            return Err(ModelLoadError::ArtifactNotFound {
                table: table.to_string(),
                family,
            });
        }

        let bytes = self.read_bytes(&path)?;
        let model: Model = match self.format {
            SerdeFormat::Postcard => postcard::from_bytes(&bytes)
                .map_err(|e| ModelLoadError::Corrupt(format!("{}: {e}", path.display())))?,
        };

        if model.family() != family {
            return Err(ModelLoadError::WrongFamily {
                table: table.to_string(),
                expected: family,
                found: model.family(),
            });
        }
        Ok(model)
    }

    fn load_scaler(&self, table: &str) -> Result<MinMaxScaler, ModelLoadError> {
        let path = self.artifact_path(&format!("{table}_scaler"));
        if !path.exists() {
            return Err(ModelLoadError::ScalerNotFound(table.to_string()));
        }
        let bytes = self.read_bytes(&path)?;
        match self.format {
            SerdeFormat::Postcard => postcard::from_bytes(&bytes)
                .map_err(|e| ModelLoadError::Corrupt(format!("{}: {e}", path.display()))),
        }
    }
}

// ================================================================================================
// In-memory stores
// ================================================================================================

/// Feature store backed by a plain map. Used by tests and embedders that
/// already hold their tables in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryFeatureStore {
    tables: BTreeMap<String, DataFrame>,
}

impl MemoryFeatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: impl Into<String>, table: DataFrame) -> Self {
        self.tables.insert(name.into(), table);
        self
    }
}

impl FeatureStore for MemoryFeatureStore {
    fn table_names(&self) -> Result<Vec<String>, UpstreamFetchError> {
        Ok(self.tables.keys().cloned().collect())
    }

    fn load_table(&self, name: &str) -> Result<DataFrame, UpstreamFetchError> {
        self.tables
            .get(name)
            .cloned()
            .ok_or_else(|| UpstreamFetchError::TableRead {
                table: name.to_string(),
                msg: "not present in memory store".to_string(),
            })
    }
}

#[derive(Debug, Default)]
pub struct MemoryPredictionStore {
    tables: Mutex<BTreeMap<String, DataFrame>>,
}

impl MemoryPredictionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, name: &str) -> Option<DataFrame> {
        self.tables
            .lock()
            .ok()
            .and_then(|tables| tables.get(name).cloned())
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables
            .lock()
            .map(|tables| tables.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl PredictionStore for MemoryPredictionStore {
    fn replace_table(&self, name: &str, table: DataFrame) -> BandcastResult<()> {
        if let Ok(mut tables) = self.tables.lock() {
            tables.insert(name.to_string(), table);
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryModelRepository {
    models: BTreeMap<(String, ModelFamily), Model>,
    scalers: BTreeMap<String, MinMaxScaler>,
}

impl MemoryModelRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, table: impl Into<String>, model: Model) -> Self {
        self.models.insert((table.into(), model.family()), model);
        self
    }

    pub fn with_scaler(mut self, table: impl Into<String>, scaler: MinMaxScaler) -> Self {
        self.scalers.insert(table.into(), scaler);
        self
    }
}

impl ModelRepository for MemoryModelRepository {
    fn load_model(&self, table: &str, family: ModelFamily) -> Result<Model, ModelLoadError> {
        self.models
            .get(&(table.to_string(), family))
            .cloned()
            .ok_or_else(|| ModelLoadError::ArtifactNotFound {
                table: table.to_string(),
                family,
            })
    }

    fn load_scaler(&self, table: &str) -> Result<MinMaxScaler, ModelLoadError> {
        self.scalers
            .get(table)
            .cloned()
            .ok_or_else(|| ModelLoadError::ScalerNotFound(table.to_string()))
    }
}
