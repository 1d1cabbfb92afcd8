//! Compact prescription notation used for grid cell edits.
//!
//! A cell holds one or more parts joined by `+`. Each part encodes N
//! identical sets:
//!
//! - `3x8` → sets x reps
//! - `3x8-12` → rep range
//! - `3xAMRAP` → as many reps as possible
//! - `3x12/leg` → unilateral (leg, arm or side)
//! - `3x8@120kg`, `3x8@100lb`, `3x8@120` → absolute load (kg by default)
//! - `3x8@75%` → percentage of 1RM
//! - `3x8@RPE8`, `3x8@RIR2` → effort targets
//! - `3x8@120kg (3110)` or `3x8@120kg, 3110` → tempo
//! - `3x8@120kg;90s` → rest between sets, in seconds
//! - `3x8@120kg + 1x1@130kg` → several parts in one cell
//!
//! `""`, whitespace, `-` and `—` clear the cell.

use crate::series::{Intensity, Series, SeriesError, SeriesInput, UnilateralUnit, WeightUnit};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Canonical rendering of an empty cell (em dash)
pub const SKIP_NOTATION: &str = "—";

/// Maximum number of sets a single part may expand into
pub const MAX_SETS: u32 = 20;

/// Maximum reps (or rep range upper bound) per set
pub const MAX_REPS: u32 = 100;

/// Longest notation accepted from a grid cell
pub const MAX_NOTATION_LENGTH: usize = 50;

static PART_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)
        ^
        (?P<sets>\d+) \s* x \s*
        (?:
            (?P<amrap>amrap)
          | (?P<reps>\d+)
            (?: \s* - \s* (?P<reps_max>\d+) )?
            (?: \s* / \s* (?P<side>leg|arm|side) )?
        )
        (?: \s* @ \s*
            (?:
                rpe \s* (?P<rpe>\d+(?:\.\d+)?)
              | rir \s* (?P<rir>\d+)
              | (?P<pct>\d+(?:\.\d+)?) \s* %
              | (?P<load>\d+(?:\.\d+)?) \s* (?P<unit>kg|lb)?
            )
        )?
        (?:
            \s* \( \s* (?P<tempo>[0-9x]{4}) \s* \)
          | \s* , \s* (?P<tempo_alt>[0-9x]{4})
        )?
        (?: \s* ; \s* (?P<rest>\d+) \s* s? )?
        $",
    )
    .expect("valid prescription part regex")
});

/// Why a notation string was rejected
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NotationError {
    #[error("notation must not exceed {max} characters")]
    TooLong { max: usize },

    #[error("unrecognized prescription {0:?}")]
    Unrecognized(String),

    #[error("set count must be between 1 and {MAX_SETS}, got {0}")]
    SetCount(String),

    #[error("reps must be between 0 and {MAX_REPS}, got {0}")]
    RepsOutOfRange(String),

    #[error("invalid number {0:?}")]
    Number(String),

    #[error(transparent)]
    Series(#[from] SeriesError),
}

/// True for the strings that clear a cell
pub fn is_clear_sentinel(input: &str) -> bool {
    matches!(input.trim(), "" | "-" | SKIP_NOTATION)
}

/// Parse a cell's notation.
///
/// Returns `Ok(None)` for clear sentinels and `Ok(Some(series))` with at
/// least one series otherwise. Any unparseable part rejects the whole cell.
pub fn parse_notation(input: &str) -> Result<Option<Vec<Series>>, NotationError> {
    if is_clear_sentinel(input) {
        return Ok(None);
    }

    let mut series = Vec::new();
    for part in input.trim().split('+') {
        let (count, template) = parse_part(part.trim())?;
        for _ in 0..count {
            let order_index = series.len() as u32;
            series.push(Series::create(template.clone(), order_index)?);
        }
    }

    tracing::trace!("Parsed {:?} into {} series", input, series.len());
    Ok(Some(series))
}

/// Parse one `+`-separated part into its set count and per-set fields
fn parse_part(part: &str) -> Result<(u32, SeriesInput), NotationError> {
    let caps = PART_RE
        .captures(part)
        .ok_or_else(|| NotationError::Unrecognized(part.to_string()))?;

    let sets_str = &caps["sets"];
    let sets: u32 = sets_str
        .parse()
        .ok()
        .filter(|n| (1..=MAX_SETS).contains(n))
        .ok_or_else(|| NotationError::SetCount(sets_str.to_string()))?;

    let mut input = SeriesInput::default();

    if caps.name("amrap").is_some() {
        input.is_amrap = true;
    } else {
        let reps = parse_reps(&caps["reps"])?;
        input.reps = i64::from(reps);
        input.reps_max = match caps.name("reps_max") {
            Some(m) => {
                let max = parse_reps(m.as_str())?;
                // `3x8-8` is just `3x8`
                (max != reps).then_some(i64::from(max))
            }
            None => None,
        };
        input.unilateral = caps.name("side").map(|m| parse_side(m.as_str()));
    }

    input.intensity = parse_intensity(&caps)?;
    input.tempo = caps
        .name("tempo")
        .or_else(|| caps.name("tempo_alt"))
        .map(|m| m.as_str().to_uppercase());
    input.rest_seconds = caps
        .name("rest")
        .map(|m| {
            m.as_str()
                .parse::<i64>()
                .map_err(|_| NotationError::Number(m.as_str().to_string()))
        })
        .transpose()?;

    Ok((sets, input))
}

fn parse_reps(text: &str) -> Result<u32, NotationError> {
    text.parse::<u32>()
        .ok()
        .filter(|n| *n <= MAX_REPS)
        .ok_or_else(|| NotationError::RepsOutOfRange(text.to_string()))
}

fn parse_side(text: &str) -> UnilateralUnit {
    match text.to_lowercase().as_str() {
        "leg" => UnilateralUnit::Leg,
        "arm" => UnilateralUnit::Arm,
        _ => UnilateralUnit::Side,
    }
}

fn parse_number(text: &str) -> Result<f64, NotationError> {
    text.parse::<f64>()
        .map_err(|_| NotationError::Number(text.to_string()))
}

fn parse_intensity(caps: &Captures<'_>) -> Result<Option<Intensity>, NotationError> {
    if let Some(m) = caps.name("rpe") {
        return Ok(Some(Intensity::Rpe {
            value: parse_number(m.as_str())?,
        }));
    }
    if let Some(m) = caps.name("rir") {
        return Ok(Some(Intensity::Rir {
            value: parse_number(m.as_str())?,
        }));
    }
    if let Some(m) = caps.name("pct") {
        return Ok(Some(Intensity::Percentage {
            value: parse_number(m.as_str())?,
        }));
    }
    if let Some(m) = caps.name("load") {
        let unit = match caps.name("unit").map(|u| u.as_str().to_lowercase()) {
            Some(u) if u == "lb" => WeightUnit::Lb,
            _ => WeightUnit::Kg,
        };
        return Ok(Some(Intensity::Absolute {
            value: parse_number(m.as_str())?,
            unit,
        }));
    }
    Ok(None)
}

/// Format series back to canonical notation.
///
/// Consecutive series prescribing the same work collapse into one part;
/// an empty slice renders as [`SKIP_NOTATION`].
pub fn format_series(series: &[Series]) -> String {
    if series.is_empty() {
        return SKIP_NOTATION.to_string();
    }

    let mut groups: Vec<(u32, &Series)> = Vec::new();
    for current in series {
        match groups.last_mut() {
            Some((count, template)) if template.same_prescription(current) => *count += 1,
            _ => groups.push((1, current)),
        }
    }

    groups
        .iter()
        .map(|(count, template)| format_part(*count, template))
        .collect::<Vec<_>>()
        .join(" + ")
}

fn format_part(count: u32, series: &Series) -> String {
    let mut out = if series.is_amrap {
        format!("{}xAMRAP", count)
    } else {
        let mut base = format!("{}x{}", count, series.reps);
        if let Some(max) = series.reps_max.filter(|max| *max != series.reps) {
            base.push_str(&format!("-{}", max));
        }
        if let Some(side) = series.unilateral {
            base.push('/');
            base.push_str(side.as_str());
        }
        base
    };

    match series.intensity {
        Some(Intensity::Absolute { value, unit }) => {
            out.push_str(&format!("@{}{}", value, unit.as_str()))
        }
        Some(Intensity::Percentage { value }) => out.push_str(&format!("@{}%", value)),
        Some(Intensity::Rpe { value }) => out.push_str(&format!("@RPE{}", value)),
        Some(Intensity::Rir { value }) => out.push_str(&format!("@RIR{}", value)),
        None => {}
    }

    if let Some(tempo) = &series.tempo {
        out.push_str(&format!(" ({})", tempo));
    }

    if let Some(rest) = series.rest_seconds {
        out.push_str(&format!(";{}s", rest));
    }

    out
}

/// Canonical form of a notation string; clear sentinels become [`SKIP_NOTATION`].
pub fn normalize_notation(input: &str) -> Result<String, NotationError> {
    Ok(match parse_notation(input)? {
        Some(series) => format_series(&series),
        None => SKIP_NOTATION.to_string(),
    })
}
