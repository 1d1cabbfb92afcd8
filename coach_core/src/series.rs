//! Prescribed sets ("series") and their validation rules.
//!
//! A series is one prescribed set: reps (or AMRAP), an optional rep range,
//! an optional intensity target, tempo and rest. Series carry no identity;
//! they are ordered by position and replaced wholesale on every cell edit.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tempo: four characters, each a digit or `X` (explosive)
static TEMPO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9Xx]{4}$").expect("valid tempo regex"));

/// Unit of an absolute load
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum WeightUnit {
    #[default]
    Kg,
    Lb,
}

impl WeightUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            WeightUnit::Kg => "kg",
            WeightUnit::Lb => "lb",
        }
    }
}

/// Flat intensity kind, as stored and filtered on
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IntensityType {
    Absolute,
    Percentage,
    Rpe,
    Rir,
}

impl fmt::Display for IntensityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IntensityType::Absolute => "absolute",
            IntensityType::Percentage => "percentage",
            IntensityType::Rpe => "rpe",
            IntensityType::Rir => "rir",
        };
        f.write_str(name)
    }
}

/// Intensity target of a series
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Intensity {
    /// Load on the bar, e.g. `@120kg`
    Absolute { value: f64, unit: WeightUnit },
    /// Percentage of 1RM, e.g. `@75%`
    Percentage { value: f64 },
    /// Rate of perceived exertion, e.g. `@RPE8`
    Rpe { value: f64 },
    /// Reps in reserve, e.g. `@RIR2`
    Rir { value: f64 },
}

impl Intensity {
    pub fn intensity_type(&self) -> IntensityType {
        match self {
            Intensity::Absolute { .. } => IntensityType::Absolute,
            Intensity::Percentage { .. } => IntensityType::Percentage,
            Intensity::Rpe { .. } => IntensityType::Rpe,
            Intensity::Rir { .. } => IntensityType::Rir,
        }
    }

    pub fn value(&self) -> f64 {
        match self {
            Intensity::Absolute { value, .. }
            | Intensity::Percentage { value }
            | Intensity::Rpe { value }
            | Intensity::Rir { value } => *value,
        }
    }

    fn validate(&self) -> Result<(), SeriesError> {
        let value = self.value();
        let in_range = match self {
            Intensity::Absolute { .. } => value >= 0.0,
            Intensity::Percentage { .. } => (0.0..=100.0).contains(&value),
            Intensity::Rpe { .. } | Intensity::Rir { .. } => (0.0..=10.0).contains(&value),
        };

        if in_range && value.is_finite() {
            Ok(())
        } else {
            Err(SeriesError::IntensityOutOfRange {
                intensity_type: self.intensity_type(),
                value,
            })
        }
    }
}

/// Side qualifier for single-limb work, e.g. `3x12/leg`
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnilateralUnit {
    Leg,
    Arm,
    Side,
}

impl UnilateralUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnilateralUnit::Leg => "leg",
            UnilateralUnit::Arm => "arm",
            UnilateralUnit::Side => "side",
        }
    }
}

/// Series validation failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SeriesError {
    #[error("Reps cannot be negative")]
    NegativeReps,

    #[error("Maximum reps must be greater than or equal to minimum reps")]
    InvalidRepsRange,

    #[error("AMRAP series should have reps of 0")]
    AmrapWithReps,

    #[error("{intensity_type} intensity out of range: {value}")]
    IntensityOutOfRange {
        intensity_type: IntensityType,
        value: f64,
    },

    #[error("Tempo must be 4 characters (digits or X for explosive), got {0:?}")]
    InvalidTempo(String),

    #[error("Rest seconds cannot be negative")]
    NegativeRest,
}

/// One prescribed set
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Series {
    pub order_index: u32,
    pub reps: u32,
    pub reps_max: Option<u32>,
    pub is_amrap: bool,
    pub intensity: Option<Intensity>,
    #[serde(default)]
    pub unilateral: Option<UnilateralUnit>,
    pub tempo: Option<String>,
    pub rest_seconds: Option<u32>,
}

/// Unvalidated series fields, as received from callers
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SeriesInput {
    pub reps: i64,
    pub reps_max: Option<i64>,
    pub is_amrap: bool,
    pub intensity: Option<Intensity>,
    pub unilateral: Option<UnilateralUnit>,
    pub tempo: Option<String>,
    pub rest_seconds: Option<i64>,
}

impl Series {
    /// Validate input and build a series at the given position.
    pub fn create(input: SeriesInput, order_index: u32) -> Result<Self, SeriesError> {
        let reps = u32::try_from(input.reps).map_err(|_| SeriesError::NegativeReps)?;

        if input.is_amrap && reps > 0 {
            return Err(SeriesError::AmrapWithReps);
        }

        let reps_max = match input.reps_max {
            Some(max) if max < input.reps => return Err(SeriesError::InvalidRepsRange),
            Some(max) => Some(u32::try_from(max).map_err(|_| SeriesError::NegativeReps)?),
            None => None,
        };

        if let Some(intensity) = &input.intensity {
            intensity.validate()?;
        }

        let tempo = match input.tempo {
            Some(tempo) if !TEMPO_RE.is_match(&tempo) => {
                return Err(SeriesError::InvalidTempo(tempo));
            }
            Some(tempo) => Some(tempo.to_uppercase()),
            None => None,
        };

        let rest_seconds = input
            .rest_seconds
            .map(|rest| u32::try_from(rest).map_err(|_| SeriesError::NegativeRest))
            .transpose()?;

        Ok(Series {
            order_index,
            reps,
            reps_max,
            is_amrap: input.is_amrap,
            intensity: input.intensity,
            unilateral: input.unilateral,
            tempo,
            rest_seconds,
        })
    }

    pub fn intensity_type(&self) -> Option<IntensityType> {
        self.intensity.map(|i| i.intensity_type())
    }

    pub fn intensity_value(&self) -> Option<f64> {
        self.intensity.map(|i| i.value())
    }

    /// True when both series prescribe the same work, ignoring position.
    pub fn same_prescription(&self, other: &Series) -> bool {
        self.reps == other.reps
            && self.reps_max == other.reps_max
            && self.is_amrap == other.is_amrap
            && self.intensity == other.intensity
            && self.unilateral == other.unilateral
            && self.tempo == other.tempo
            && self.rest_seconds == other.rest_seconds
    }
}

impl From<&Series> for SeriesInput {
    fn from(series: &Series) -> Self {
        SeriesInput {
            reps: i64::from(series.reps),
            reps_max: series.reps_max.map(i64::from),
            is_amrap: series.is_amrap,
            intensity: series.intensity,
            unilateral: series.unilateral,
            tempo: series.tempo.clone(),
            rest_seconds: series.rest_seconds.map(i64::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(reps: i64) -> SeriesInput {
        SeriesInput {
            reps,
            ..Default::default()
        }
    }

    #[test]
    fn test_create_basic_series() {
        let series = Series::create(input(8), 2).unwrap();
        assert_eq!(series.order_index, 2);
        assert_eq!(series.reps, 8);
        assert!(series.intensity.is_none());
    }

    #[test]
    fn test_negative_reps_rejected() {
        assert_eq!(Series::create(input(-5), 0), Err(SeriesError::NegativeReps));
    }

    #[test]
    fn test_reps_range_must_not_be_inverted() {
        let mut bad = input(12);
        bad.reps_max = Some(8);
        assert_eq!(Series::create(bad, 0), Err(SeriesError::InvalidRepsRange));

        let mut good = input(8);
        good.reps_max = Some(12);
        assert_eq!(Series::create(good, 0).unwrap().reps_max, Some(12));
    }

    #[test]
    fn test_amrap_requires_zero_reps() {
        let mut amrap = input(5);
        amrap.is_amrap = true;
        assert_eq!(Series::create(amrap, 0), Err(SeriesError::AmrapWithReps));
    }

    #[test]
    fn test_intensity_ranges() {
        let mut pct = input(5);
        pct.intensity = Some(Intensity::Percentage { value: 120.0 });
        assert!(matches!(
            Series::create(pct, 0),
            Err(SeriesError::IntensityOutOfRange { .. })
        ));

        let mut rpe = input(5);
        rpe.intensity = Some(Intensity::Rpe { value: 8.5 });
        assert_eq!(Series::create(rpe, 0).unwrap().intensity_value(), Some(8.5));

        let mut load = input(5);
        load.intensity = Some(Intensity::Absolute {
            value: -10.0,
            unit: WeightUnit::Kg,
        });
        assert!(Series::create(load, 0).is_err());
    }

    #[test]
    fn test_tempo_is_validated_and_normalized() {
        let mut tempo = input(5);
        tempo.tempo = Some("31x0".into());
        assert_eq!(Series::create(tempo, 0).unwrap().tempo.as_deref(), Some("31X0"));

        let mut bad = input(5);
        bad.tempo = Some("310".into());
        assert!(matches!(Series::create(bad, 0), Err(SeriesError::InvalidTempo(_))));
    }

    #[test]
    fn test_same_prescription_ignores_position() {
        let a = Series::create(input(8), 0).unwrap();
        let b = Series::create(input(8), 3).unwrap();
        let c = Series::create(input(6), 1).unwrap();
        assert!(a.same_prescription(&b));
        assert!(!a.same_prescription(&c));
    }
}
