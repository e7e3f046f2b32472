use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SequencerError};

/// A time signature. The cycle length of every track follows from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Meter {
    pub numerator: u32,
    pub denominator: u32,
}

impl Meter {
    pub fn new(numerator: u32, denominator: u32) -> Result<Self> {
        let meter = Self {
            numerator,
            denominator,
        };
        if numerator == 0 || denominator == 0 || meter.subdivisions() == 0 {
            return Err(SequencerError::InvalidMeter {
                numerator,
                denominator,
            });
        }
        Ok(meter)
    }

    /// Sixteenth notes in one bar, rounded to the nearest integer.
    pub fn subdivisions(&self) -> u32 {
        if self.denominator == 0 {
            return 0;
        }
        (self.numerator as f64 * 16.0 / self.denominator as f64).round() as u32
    }

    /// File name of the reference rhythm for this meter, e.g. `7_8.txt`.
    pub fn reference_file_name(&self) -> String {
        format!("{}_{}.txt", self.numerator, self.denominator)
    }
}

impl fmt::Display for Meter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

impl FromStr for Meter {
    type Err = SequencerError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || SequencerError::InvalidMeter {
            numerator: 0,
            denominator: 0,
        };
        let (num, den) = s.trim().split_once('/').ok_or_else(invalid)?;
        let numerator = num.trim().parse().map_err(|_| invalid())?;
        let denominator = den.trim().parse().map_err(|_| invalid())?;
        Self::new(numerator, denominator)
    }
}
