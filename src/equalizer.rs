use crate::model::Band;
use crate::Error;

/// The number of bands a node's equalizer has.
pub const BAND_COUNT: usize = 15;
/// The lowest gain a band accepts.
pub const MIN_GAIN: f32 = -0.25;
/// The highest gain a band accepts.
pub const MAX_GAIN: f32 = 1.0;

/// A full 15-band equalizer configuration.
///
/// Bands that are not given a gain default to `0.0`, which leaves them
/// unchanged.
#[derive(Clone, Debug, PartialEq)]
pub struct Equalizer {
    name: String,
    gains: [f32; BAND_COUNT],
}

impl Equalizer {
    /// Builds an equalizer from `(band, gain)` pairs.
    ///
    /// Returns [`Error::InvalidOperation`] if a band index is out of range or
    /// a gain is outside of [`MIN_GAIN`]..=[`MAX_GAIN`].
    pub fn build(name: impl Into<String>, bands: &[(u8, f32)]) -> Result<Self, Error> {
        let mut gains = [0.0; BAND_COUNT];

        for &(band, gain) in bands {
            if band as usize >= BAND_COUNT {
                return Err(Error::InvalidOperation("equalizer band index out of range"));
            }

            if !(MIN_GAIN..=MAX_GAIN).contains(&gain) {
                return Err(Error::InvalidOperation("equalizer gain out of range"));
            }

            gains[band as usize] = gain;
        }

        Ok(Self {
            name: name.into(),
            gains,
        })
    }

    /// A flat equalizer, with every band at `0.0`.
    pub fn flat() -> Self {
        Self {
            name: "Flat".to_owned(),
            gains: [0.0; BAND_COUNT],
        }
    }

    pub fn boost() -> Self {
        Self::preset("Boost", [
            -0.075, 0.125, 0.125, 0.1, 0.1, 0.05, 0.075, 0.0, 0.0, 0.0, 0.0, 0.0, 0.125, 0.15, 0.05,
        ])
    }

    pub fn metal() -> Self {
        Self::preset("Metal", [
            0.0, 0.1, 0.1, 0.15, 0.13, 0.1, 0.0, 0.125, 0.175, 0.175, 0.125, 0.125, 0.1, 0.075, 0.0,
        ])
    }

    pub fn piano() -> Self {
        Self::preset("Piano", [
            -0.25, -0.25, -0.125, 0.0, 0.25, 0.25, 0.0, -0.25, -0.25, 0.0, 0.0, 0.5, 0.25, -0.025, 0.0,
        ])
    }

    fn preset(name: &str, gains: [f32; BAND_COUNT]) -> Self {
        Self {
            name: name.to_owned(),
            gains,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn gain(&self, band: u8) -> Option<f32> {
        self.gains.get(band as usize).copied()
    }

    pub fn is_flat(&self) -> bool {
        self.gains.iter().all(|gain| *gain == 0.0)
    }

    pub(crate) fn bands(&self) -> Vec<Band> {
        self.gains
            .iter()
            .enumerate()
            .map(|(band, gain)| Band {
                band: band as u8,
                gain: *gain,
            })
            .collect()
    }
}

impl Default for Equalizer {
    fn default() -> Self {
        Self::flat()
    }
}
