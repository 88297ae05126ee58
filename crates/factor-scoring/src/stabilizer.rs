use score_core::stats::{clamp_score, round_to};
use score_core::ScoreError;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Market events that may accompany a new score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreEvent {
    EarningsRelease,
    AnalystRatingChange,
    InsiderTradeLarge,
    DividendAnnouncement,
    AcquisitionNews,
    GuidanceUpdate,
    StockSplit,
    PriceBreakout,
    TechnicalSignal,
}

impl ScoreEvent {
    /// Reset events carry new fundamental information, so the raw score is
    /// taken as-is instead of being smoothed.
    pub fn is_reset(&self) -> bool {
        matches!(
            self,
            ScoreEvent::EarningsRelease
                | ScoreEvent::AnalystRatingChange
                | ScoreEvent::InsiderTradeLarge
                | ScoreEvent::DividendAnnouncement
                | ScoreEvent::AcquisitionNews
                | ScoreEvent::GuidanceUpdate
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StabilizerConfig {
    /// Weight on the new score, in (0, 1].
    pub alpha: f64,
    /// Smoothed moves smaller than this keep the previous score.
    pub min_change_threshold: f64,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            alpha: 0.7,
            min_change_threshold: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilizationResult {
    pub final_score: f64,
    pub raw_score: f64,
    pub smoothing_applied: bool,
    pub previous_score: Option<f64>,
    pub events: Vec<ScoreEvent>,
    pub change: f64,
}

/// Exponential smoothing of successive overall scores, to keep day-to-day
/// data noise from flipping ratings.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreStabilizer {
    config: StabilizerConfig,
}

impl ScoreStabilizer {
    pub fn new(config: StabilizerConfig) -> Result<Self, ScoreError> {
        if !(config.alpha > 0.0 && config.alpha <= 1.0) {
            return Err(ScoreError::InvalidConfig(format!(
                "smoothing alpha must be within (0, 1], got {}",
                config.alpha
            )));
        }
        if !config.min_change_threshold.is_finite() || config.min_change_threshold < 0.0 {
            return Err(ScoreError::InvalidConfig(format!(
                "min_change_threshold must be non-negative, got {}",
                config.min_change_threshold
            )));
        }
        Ok(Self { config })
    }

    pub fn stabilize(
        &self,
        raw_score: f64,
        previous_score: Option<f64>,
        events: &[ScoreEvent],
    ) -> StabilizationResult {
        let raw = clamp_score(raw_score);
        let events = events.to_vec();

        let Some(previous) = previous_score else {
            return StabilizationResult {
                final_score: round_to(raw, 2),
                raw_score,
                smoothing_applied: false,
                previous_score: None,
                events,
                change: 0.0,
            };
        };

        if events.iter().any(ScoreEvent::is_reset) {
            debug!(?events, "Reset event, bypassing smoothing");
            return StabilizationResult {
                final_score: round_to(raw, 2),
                raw_score,
                smoothing_applied: false,
                previous_score: Some(previous),
                events,
                change: round_to(raw - previous, 2),
            };
        }

        let alpha = self.config.alpha;
        let smoothed = alpha * raw + (1.0 - alpha) * previous;
        if (smoothed - previous).abs() < self.config.min_change_threshold {
            return StabilizationResult {
                final_score: round_to(previous, 2),
                raw_score,
                smoothing_applied: true,
                previous_score: Some(previous),
                events,
                change: 0.0,
            };
        }

        let final_score = round_to(clamp_score(smoothed), 2);
        StabilizationResult {
            final_score,
            raw_score,
            smoothing_applied: true,
            previous_score: Some(previous),
            events,
            change: round_to(final_score - previous, 2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_score_passes_through() {
        let r = ScoreStabilizer::default().stabilize(71.234, None, &[]);
        assert_eq!(r.final_score, 71.23);
        assert!(!r.smoothing_applied);
        assert_eq!(r.change, 0.0);
    }

    #[test]
    fn test_exponential_smoothing() {
        let r = ScoreStabilizer::default().stabilize(80.0, Some(60.0), &[]);
        assert_eq!(r.final_score, 74.0);
        assert!(r.smoothing_applied);
        assert_eq!(r.change, 14.0);
    }

    #[test]
    fn test_small_change_keeps_previous() {
        let r = ScoreStabilizer::default().stabilize(60.5, Some(60.0), &[]);
        assert_eq!(r.final_score, 60.0);
        assert!(r.smoothing_applied);
        assert_eq!(r.change, 0.0);
    }

    #[test]
    fn test_reset_event_bypasses_smoothing() {
        let r = ScoreStabilizer::default().stabilize(
            40.0,
            Some(70.0),
            &[ScoreEvent::TechnicalSignal, ScoreEvent::EarningsRelease],
        );
        assert_eq!(r.final_score, 40.0);
        assert!(!r.smoothing_applied);
        assert_eq!(r.change, -30.0);
        assert_eq!(r.events.len(), 2);
    }

    #[test]
    fn test_non_reset_event_is_still_smoothed() {
        let r = ScoreStabilizer::default().stabilize(40.0, Some(70.0), &[ScoreEvent::StockSplit]);
        assert_eq!(r.final_score, 49.0);
        assert!(r.smoothing_applied);
    }

    #[test]
    fn test_invalid_config() {
        let bad = StabilizerConfig {
            alpha: 0.0,
            min_change_threshold: 0.5,
        };
        assert!(ScoreStabilizer::new(bad).is_err());
        let bad = StabilizerConfig {
            alpha: 0.7,
            min_change_threshold: -1.0,
        };
        assert!(ScoreStabilizer::new(bad).is_err());
    }
}
