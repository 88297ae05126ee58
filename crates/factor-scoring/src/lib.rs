pub mod aggregator;
pub mod explainer;
pub mod lifecycle;
pub mod percentile;
pub mod pipeline;
pub mod stabilizer;
pub mod weights;

pub use aggregator::{assess_confidence, AggregatorConfig, ConfidenceAssessment, ScoreAggregator};
pub use explainer::{
    CoverageChange, FactorDataStatus, GranularConfidence, ScoreChangeExplainer,
    ScoreChangeExplanation, ScoreChangeReason, ScoreSnapshot,
};
pub use lifecycle::{
    LifecycleClassification, LifecycleClassifier, LifecycleMetrics, QuarterlyFinancials,
};
pub use percentile::{
    is_lower_better, DistributionCurve, MedianRatioCurve, PercentileScore, ScoringStrategy,
    SectorBenchmark, SectorPercentileScorer,
};
pub use pipeline::{FactorInput, MetricInput, PipelineSummary, ScoringPipeline, TickerInput, TickerOutcome};
pub use stabilizer::{ScoreEvent, ScoreStabilizer, StabilizationResult, StabilizerConfig};
pub use weights::{FactorWeights, WeightTable};
