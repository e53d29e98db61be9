//! Satellite pass windows
//!
//! Orbital prediction itself is delegated to a [`PassPredictor`]. The bundled
//! [`ScheduledPasses`] answers from a precomputed pass list, which is how a
//! pass table exported from a tracking program is fed to the satellite beacon.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::{GateError, Result};

/// ISS element set used when none is configured.
pub const ISS_TLE: &str = "ISS (ZARYA)
1 25544U 98067A   16340.19707176  .00003392  00000-0  59140-4 0  9992
2 25544  51.6453 285.3071 0006023 292.9316 269.6257 15.53798216 31586
";

/// Default ground station.
pub const DEFAULT_QTH: Qth = Qth { latitude: 37.76, longitude: 122.4975, altitude_m: 56.0 };

/// One predicted pass: the half-open window `[start, start + duration)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassInterval {
    pub start: SystemTime,
    pub duration: Duration,
}

impl PassInterval {
    pub fn new(start: SystemTime, duration: Duration) -> Self {
        Self { start, duration }
    }

    pub fn end(&self) -> SystemTime {
        self.start + self.duration
    }

    /// Whether `now` falls inside the window.
    pub fn contains(&self, now: SystemTime) -> bool {
        now >= self.start && now < self.end()
    }
}

/// Serialized form of a pass: Unix seconds plus a duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassSpec {
    pub start: u64,
    pub duration_secs: u64,
}

impl From<PassSpec> for PassInterval {
    fn from(spec: PassSpec) -> Self {
        PassInterval::new(
            UNIX_EPOCH + Duration::from_secs(spec.start),
            Duration::from_secs(spec.duration_secs),
        )
    }
}

/// Ground station location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Qth {
    /// Degrees, positive north
    pub latitude: f64,
    /// Degrees, positive west
    pub longitude: f64,
    /// Metres above sea level
    pub altitude_m: f64,
}

/// Two-line element set with an optional name line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tle {
    pub name: Option<String>,
    pub line1: String,
    pub line2: String,
}

impl Tle {
    /// NORAD catalog number from line 1
    pub fn catalog_number(&self) -> &str {
        self.line1.get(2..7).unwrap_or_default().trim()
    }
}

impl FromStr for Tle {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self> {
        let lines: Vec<&str> = s.lines().map(str::trim_end).filter(|l| !l.is_empty()).collect();
        let (name, line1, line2) = match lines.as_slice() {
            [line1, line2] => (None, *line1, *line2),
            [name, line1, line2] => (Some(name.trim().to_string()), *line1, *line2),
            _ => {
                return Err(GateError::Config(format!(
                    "TLE must have 2 or 3 lines, got {}",
                    lines.len()
                )));
            }
        };

        if !line1.starts_with("1 ") || !line2.starts_with("2 ") {
            return Err(GateError::Config("TLE lines must start with '1 ' and '2 '".into()));
        }
        if line1.get(2..7) != line2.get(2..7) {
            return Err(GateError::Config("TLE lines disagree on catalog number".into()));
        }

        Ok(Self { name, line1: line1.to_string(), line2: line2.to_string() })
    }
}

impl fmt::Display for Tle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            writeln!(f, "{}", name)?;
        }
        writeln!(f, "{}", self.line1)?;
        write!(f, "{}", self.line2)
    }
}

/// Source of pass predictions
pub trait PassPredictor: Send + Sync + 'static {
    /// The pass nearest to `now` that has not ended yet: the current pass if
    /// one is in progress, otherwise the next upcoming one.
    fn next_pass(&self, tle: &Tle, qth: &Qth, now: SystemTime) -> Result<Option<PassInterval>>;
}

/// Predictor answering from a fixed list of passes.
///
/// The list is assumed to be computed for the configured satellite and
/// ground station; the element set and location are not consulted.
#[derive(Debug, Clone, Default)]
pub struct ScheduledPasses {
    passes: Vec<PassInterval>,
}

impl ScheduledPasses {
    pub fn new(mut passes: Vec<PassInterval>) -> Self {
        passes.sort_by_key(|p| p.start);
        Self { passes }
    }

    pub fn from_specs(specs: &[PassSpec]) -> Self {
        Self::new(specs.iter().copied().map(PassInterval::from).collect())
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }
}

impl PassPredictor for ScheduledPasses {
    fn next_pass(&self, _tle: &Tle, _qth: &Qth, now: SystemTime) -> Result<Option<PassInterval>> {
        Ok(self.passes.iter().find(|p| p.end() > now).copied())
    }
}
