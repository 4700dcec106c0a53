//! Resolution ladder configuration and the layout math used to fit a
//! source into each rung.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use validator::{Validate, ValidationErrors};

#[derive(Debug, Error)]
pub enum LadderError {
    #[error("Invalid ladder JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid bitrate '{0}': expected digits with an optional k/M suffix")]
    InvalidBitrate(String),

    #[error("Invalid rung '{name}': {source}")]
    InvalidRung {
        name: String,
        #[source]
        source: ValidationErrors,
    },

    #[error("Ladder must contain at least one rung")]
    Empty,
}

/// Target bitrate as written in config (`800k`, `5M`, `2500000`).
///
/// The raw text is handed to the encoder unchanged; the parsed value is what
/// gets recorded on the produced variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Bitrate {
    raw: String,
    bits_per_second: u64,
}

impl Bitrate {
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn bits_per_second(&self) -> u64 {
        self.bits_per_second
    }
}

impl FromStr for Bitrate {
    type Err = LadderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let (digits, multiplier) = match raw.char_indices().last() {
            Some((idx, 'k' | 'K')) => (&raw[..idx], 1_000),
            Some((idx, 'm' | 'M')) => (&raw[..idx], 1_000_000),
            _ => (raw, 1),
        };

        let value: u64 = digits
            .parse()
            .map_err(|_| LadderError::InvalidBitrate(s.to_string()))?;
        let bits_per_second = value
            .checked_mul(multiplier)
            .filter(|&bps| bps > 0)
            .ok_or_else(|| LadderError::InvalidBitrate(s.to_string()))?;

        Ok(Self {
            raw: raw.to_string(),
            bits_per_second,
        })
    }
}

impl TryFrom<String> for Bitrate {
    type Error = LadderError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Bitrate> for String {
    fn from(value: Bitrate) -> Self {
        value.raw
    }
}

impl fmt::Display for Bitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct LadderRung {
    #[validate(length(min = 1, message = "Rung name is required"))]
    pub name: String,
    #[validate(range(min = 2, message = "Rung height must be at least 2"))]
    pub height: u32,
    pub bitrate: Bitrate,
}

impl LadderRung {
    pub fn new(name: &str, height: u32, bitrate: &str) -> Result<Self, LadderError> {
        let rung = Self {
            name: name.to_string(),
            height,
            bitrate: bitrate.parse()?,
        };
        rung.validate().map_err(|source| LadderError::InvalidRung {
            name: rung.name.clone(),
            source,
        })?;
        Ok(rung)
    }
}

/// Ordered list of rungs. Order is processing order and defines how the
/// ladder's progress span is sliced.
#[derive(Debug, Clone, PartialEq)]
pub struct Ladder {
    rungs: Vec<LadderRung>,
}

impl Ladder {
    pub fn new(rungs: Vec<LadderRung>) -> Result<Self, LadderError> {
        if rungs.is_empty() {
            return Err(LadderError::Empty);
        }
        for rung in &rungs {
            rung.validate().map_err(|source| LadderError::InvalidRung {
                name: rung.name.clone(),
                source,
            })?;
        }
        Ok(Self { rungs })
    }

    pub fn from_json(json: &str) -> Result<Self, LadderError> {
        let rungs: Vec<LadderRung> = serde_json::from_str(json)?;
        Self::new(rungs)
    }

    pub fn rungs(&self) -> &[LadderRung] {
        &self.rungs
    }

    pub fn len(&self) -> usize {
        self.rungs.len()
    }
}

impl Default for Ladder {
    fn default() -> Self {
        let rung = |name: &str, height: u32, bits_per_second: u64, raw: &str| LadderRung {
            name: name.to_string(),
            height,
            bitrate: Bitrate {
                raw: raw.to_string(),
                bits_per_second,
            },
        };

        Self {
            rungs: vec![
                rung("360p", 360, 800_000, "800k"),
                rung("720p", 720, 2_500_000, "2500k"),
                rung("1080p", 1080, 5_000_000, "5000k"),
                rung("1440p", 1440, 10_000_000, "10000k"),
                rung("2160p", 2160, 20_000_000, "20000k"),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Codecs reject odd frame sizes.
pub fn round_down_even(value: u32) -> u32 {
    value - value % 2
}

/// Output frame size for a rung, or `None` when the rung would upscale.
pub fn scale_for_rung(source: Dimensions, target_height: u32) -> Option<Dimensions> {
    if source.height == 0 || source.height < target_height {
        return None;
    }

    // target_height <= source.height, so the quotient fits back into u32
    let width = u64::from(target_height) * u64::from(source.width) / u64::from(source.height);

    Some(Dimensions {
        width: round_down_even(width as u32),
        height: round_down_even(target_height),
    })
}
