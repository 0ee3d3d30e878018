//! Supply Chain Detective mission engine
//!
//! Platform-agnostic evaluation core: validated shipment records, derived
//! features and KPIs, pluggable signal scorers, mission definitions, and the
//! grading and scoring engines. Presentation lives elsewhere.

pub mod config;
pub mod constants;
pub mod data;
pub mod features;
pub mod grading;
pub mod hypothesis;
pub mod kpi;
pub mod mission;
pub mod numbers;
pub mod records;
pub mod scoring;
pub mod seed;
pub mod session;
pub mod signals;

use serde::de::DeserializeOwned;
use thiserror::Error;

// Re-export commonly used types
pub use config::{
    ConfigError, EngineConfig, FeatureConfig, GradingConfig, ScorerConfig, ScoringConfig,
};
pub use data::{EmbeddedError, EmbeddedLoader};
pub use features::{
    DerivedFeatures, RouteStats, ShipmentFeatures, SupplierStats, WarehouseStats, supplier_score,
    warehouse_load_score,
};
pub use grading::{
    CorrectnessTier, EvidenceNote, EvidenceSubject, Explanation, FieldDelta, GradedResult,
    GradingEngine, GradingError, MatchedAssertion, SubmissionAttempt,
};
pub use hypothesis::{CauseCategory, HypothesisError, RootCause};
pub use kpi::KpiSummary;
pub use mission::{
    Difficulty, FocusMetric, Hint, HintError, HintReveal, HintSpec, MissionCatalog,
    MissionConfigError, MissionDefinition, MissionSpec, MissionSummary, RevealSpec,
};
pub use records::{RecordStore, SchemaError, SchemaViolation, ShipmentRecord, ViolationKind};
pub use scoring::{PerformanceRating, ScoreBreakdown, ScoringEngine};
pub use seed::{derive_stream_seed, mission_seed};
pub use session::{HintContent, HintDetail, MetricRow, MissionSession, SubmissionOutcome};
pub use signals::{
    AnomalyScorer, DelayRiskScorer, InsufficientData, ScorerKind, SignalOutcome, SignalReport,
    SignalScore, SignalScorer, SignalSet,
};

/// Trait for abstracting data loading operations
/// Platform-specific implementations should provide this
pub trait DataLoader {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load every mission spec in the catalog
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read or parsed.
    fn load_missions(&self) -> Result<Vec<MissionSpec>, Self::Error>;

    /// Load the raw rows of a named dataset
    ///
    /// # Errors
    ///
    /// Returns an error if the dataset is unknown or not a JSON array.
    fn load_dataset(&self, dataset: &str) -> Result<Vec<serde_json::Value>, Self::Error>;

    /// Load configuration data for a specific system
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded or parsed.
    fn load_config<T>(&self, config_name: &str) -> Result<T, Self::Error>
    where
        T: DeserializeOwned;
}

/// Failures turning loader output into a playable mission.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("data source failure: {0}")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("invalid engine configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid mission catalog: {0}")]
    Mission(#[from] MissionConfigError),
    #[error("unknown mission '{0}'")]
    UnknownMission(String),
    #[error("dataset '{dataset}' failed validation: {source}")]
    Schema {
        dataset: String,
        source: SchemaError,
    },
}

impl LoadError {
    fn source_error<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Source(Box::new(err))
    }
}

/// Main engine holding the validated configuration and mission catalog
#[derive(Debug)]
pub struct MissionEngine<L>
where
    L: DataLoader,
{
    data_loader: L,
    config: EngineConfig,
    catalog: MissionCatalog,
}

impl<L> MissionEngine<L>
where
    L: DataLoader,
{
    /// Create an engine from the loader's `engine` config and mission catalog
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration or catalog cannot be loaded or
    /// fails validation.
    pub fn new(data_loader: L) -> Result<Self, LoadError> {
        let config: EngineConfig = data_loader
            .load_config("engine")
            .map_err(LoadError::source_error)?;
        Self::with_config(data_loader, config)
    }

    /// Create an engine with an explicit configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration or catalog is invalid.
    pub fn with_config(data_loader: L, config: EngineConfig) -> Result<Self, LoadError> {
        config.validate()?;
        let specs = data_loader
            .load_missions()
            .map_err(LoadError::source_error)?;
        let catalog = MissionCatalog::from_specs(&specs, config.scoring.default_hint_cost)?;
        Ok(Self {
            data_loader,
            config,
            catalog,
        })
    }

    #[must_use]
    pub const fn catalog(&self) -> &MissionCatalog {
        &self.catalog
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub const fn data_loader(&self) -> &L {
        &self.data_loader
    }

    /// Load a mission's dataset and derive its features
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown mission id, a loader failure, or a
    /// dataset that fails schema validation.
    pub fn load_mission(&self, mission_id: &str) -> Result<MissionSession, LoadError> {
        let mission = self
            .catalog
            .get(mission_id)
            .ok_or_else(|| LoadError::UnknownMission(mission_id.to_string()))?;
        let rows = self
            .data_loader
            .load_dataset(mission.dataset())
            .map_err(LoadError::source_error)?;
        let store = RecordStore::load(&rows).map_err(|source| LoadError::Schema {
            dataset: mission.dataset().to_string(),
            source,
        })?;
        Ok(MissionSession::new(mission, store, &self.config))
    }

    /// Load a mission and compute both scorers concurrently up front
    ///
    /// # Errors
    ///
    /// Same as [`MissionEngine::load_mission`].
    #[cfg(feature = "async")]
    pub async fn load_mission_async(&self, mission_id: &str) -> Result<MissionSession, LoadError> {
        let session = self.load_mission(mission_id)?;
        let signals = signals::compute_signals_async(
            std::sync::Arc::clone(session.features()),
            self.config.scorers.clone(),
            session.seed(),
        )
        .await;
        Ok(session.with_signals(signals))
    }
}
