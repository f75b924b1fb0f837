//! Configuration types for a degradation run.
//!
//! Two structs, split by who owns the value:
//!
//! * [`DegradationParameters`]: the five visual knobs a requester picks
//!   (blur, skew, noise, JPEG quality, DPI). These are what a settings store
//!   persists per requester and what the history ledger records.
//! * [`PipelineOptions`]: run-level plumbing that is not part of the look of
//!   the output (noise seed, source password).
//!
//! # Clamping contract
//! Every way of producing `DegradationParameters` from untrusted input clamps
//! each field into its valid range: the builder setters, [`DegradationParameters::clamped`]
//! and the JSON loader. The pipeline itself trusts the values it is given and
//! does not re-validate them.

use crate::error::DegradeError;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::Path;

/// Valid blur amounts. 0 disables the blur stage.
pub const BLUR_RANGE: RangeInclusive<i32> = 0..=20;
/// Valid skew angles in degrees. 0 disables the skew stage.
pub const SKEW_RANGE: RangeInclusive<i32> = -45..=45;
/// Valid noise standard deviations. 0 disables the noise stage.
pub const NOISE_RANGE: RangeInclusive<i32> = 0..=50;
/// Valid JPEG qualities.
pub const QUALITY_RANGE: RangeInclusive<i32> = 10..=100;
/// Valid rasterisation resolutions.
pub const DPI_RANGE: RangeInclusive<i32> = 72..=300;

fn clamp_to(value: i64, range: &RangeInclusive<i32>) -> i32 {
    value.clamp(*range.start() as i64, *range.end() as i64) as i32
}

/// The visual degradation applied to every page of a run.
///
/// Built via [`DegradationParameters::builder()`] or taken from
/// [`DegradationParameters::default()`].
///
/// # Example
/// ```rust
/// use pdf_degrade::DegradationParameters;
///
/// let params = DegradationParameters::builder()
///     .blur(2)
///     .skew(-5)
///     .noise(10)
///     .quality(40)
///     .dpi(120)
///     .build()
///     .unwrap();
/// assert_eq!(params.skew_degrees, -5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct DegradationParameters {
    /// Gaussian blur strength, 0–20. Default: 1.
    ///
    /// Used as the blur sigma, with a floor of 1 whenever blur is enabled.
    #[serde(alias = "blur")]
    pub blur_amount: i32,

    /// Rotation in degrees, -45–45 (positive turns counter-clockwise). Default: 0.
    #[serde(alias = "skew")]
    pub skew_degrees: i32,

    /// Standard deviation of the additive per-channel noise, 0–50. Default: 2.
    #[serde(alias = "noise")]
    pub noise_std_dev: i32,

    /// JPEG quality, 10–100. Default: 50.
    ///
    /// Lower means smaller files and blockier pages. 40–60 gives a convincing
    /// "photocopied" look without making text unreadable.
    pub quality: i32,

    /// Rasterisation resolution, 72–300. Default: 150.
    ///
    /// Output pages measure `points × dpi / 72` pixels, so DPI drives both the
    /// output file size and the per-page memory peak.
    pub dpi: i32,
}

impl Default for DegradationParameters {
    fn default() -> Self {
        Self {
            blur_amount: 1,
            skew_degrees: 0,
            noise_std_dev: 2,
            quality: 50,
            dpi: 150,
        }
    }
}

impl DegradationParameters {
    /// Create a new builder starting from the defaults.
    pub fn builder() -> DegradationParametersBuilder {
        DegradationParametersBuilder {
            params: Self::default(),
        }
    }

    /// Parameters that switch every transform stage off.
    ///
    /// Pages still go through rasterisation and JPEG re-encoding.
    pub fn passthrough(quality: i32, dpi: i32) -> Self {
        Self {
            blur_amount: 0,
            skew_degrees: 0,
            noise_std_dev: 0,
            quality,
            dpi,
        }
        .clamped()
    }

    /// Clamp every field into its valid range. A no-op for in-range values.
    pub fn clamped(self) -> Self {
        Self {
            blur_amount: clamp_to(self.blur_amount as i64, &BLUR_RANGE),
            skew_degrees: clamp_to(self.skew_degrees as i64, &SKEW_RANGE),
            noise_std_dev: clamp_to(self.noise_std_dev as i64, &NOISE_RANGE),
            quality: clamp_to(self.quality as i64, &QUALITY_RANGE),
            dpi: clamp_to(self.dpi as i64, &DPI_RANGE),
        }
    }

    /// Whether every field already lies inside its range.
    pub fn is_valid(&self) -> bool {
        BLUR_RANGE.contains(&self.blur_amount)
            && SKEW_RANGE.contains(&self.skew_degrees)
            && NOISE_RANGE.contains(&self.noise_std_dev)
            && QUALITY_RANGE.contains(&self.quality)
            && DPI_RANGE.contains(&self.dpi)
    }

    /// Load parameters from a JSON settings file, clamping every field.
    ///
    /// Missing fields fall back to the defaults; both the long field names
    /// and the short `blur`/`skew`/`noise` spellings are accepted.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, DegradeError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            DegradeError::InvalidConfig(format!("cannot read settings '{}': {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    /// Parse parameters from a JSON string, clamping every field.
    ///
    /// Any JSON number is accepted. Fractions truncate toward zero and
    /// magnitudes beyond `i64` saturate before clamping.
    pub fn from_json_str(text: &str) -> Result<Self, DegradeError> {
        let file: SettingsFile = serde_json::from_str(text)
            .map_err(|e| DegradeError::InvalidConfig(format!("malformed settings: {e}")))?;
        file.into_params()
    }

    /// JPEG quality as the encoder wants it.
    pub(crate) fn jpeg_quality(&self) -> u8 {
        clamp_to(self.quality as i64, &QUALITY_RANGE) as u8
    }

    /// Rasterisation zoom factor relative to PDF user space (72 points per inch).
    pub fn zoom(&self) -> f32 {
        self.dpi as f32 / 72.0
    }
}

/// On-disk settings shape. Wider than the parameters so huge values clamp
/// instead of failing to deserialise.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SettingsFile {
    #[serde(alias = "blur")]
    blur_amount: Option<f64>,
    #[serde(alias = "skew")]
    skew_degrees: Option<f64>,
    #[serde(alias = "noise")]
    noise_std_dev: Option<f64>,
    quality: Option<f64>,
    dpi: Option<f64>,
}

impl SettingsFile {
    fn into_params(self) -> Result<DegradationParameters, DegradeError> {
        // `as` saturates at the i64 bounds and maps NaN to 0.
        let mut builder = DegradationParameters::builder();
        if let Some(v) = self.blur_amount {
            builder = builder.blur(v as i64);
        }
        if let Some(v) = self.skew_degrees {
            builder = builder.skew(v as i64);
        }
        if let Some(v) = self.noise_std_dev {
            builder = builder.noise(v as i64);
        }
        if let Some(v) = self.quality {
            builder = builder.quality(v as i64);
        }
        if let Some(v) = self.dpi {
            builder = builder.dpi(v as i64);
        }
        builder.build()
    }
}

/// Builder for [`DegradationParameters`].
///
/// Setters take any integer and clamp it into range: `.blur(99)` becomes 20,
/// `.dpi(10)` becomes 72.
#[derive(Debug)]
pub struct DegradationParametersBuilder {
    params: DegradationParameters,
}

impl DegradationParametersBuilder {
    pub fn blur(mut self, amount: i64) -> Self {
        self.params.blur_amount = clamp_to(amount, &BLUR_RANGE);
        self
    }

    pub fn skew(mut self, degrees: i64) -> Self {
        self.params.skew_degrees = clamp_to(degrees, &SKEW_RANGE);
        self
    }

    pub fn noise(mut self, std_dev: i64) -> Self {
        self.params.noise_std_dev = clamp_to(std_dev, &NOISE_RANGE);
        self
    }

    pub fn quality(mut self, quality: i64) -> Self {
        self.params.quality = clamp_to(quality, &QUALITY_RANGE);
        self
    }

    pub fn dpi(mut self, dpi: i64) -> Self {
        self.params.dpi = clamp_to(dpi, &DPI_RANGE);
        self
    }

    /// Build the parameters, validating constraints.
    pub fn build(self) -> Result<DegradationParameters, DegradeError> {
        if !self.params.is_valid() {
            return Err(DegradeError::InvalidConfig(format!(
                "parameters out of range: {:?}",
                self.params
            )));
        }
        Ok(self.params)
    }
}

/// Run-level options that do not affect which degradation is applied.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Seed for the noise generator. `None` seeds from OS entropy.
    ///
    /// With a fixed seed two runs over the same source produce byte-identical
    /// output, which is what the tests rely on.
    pub noise_seed: Option<u64>,

    /// User password for encrypted source documents.
    pub password: Option<String>,
}

impl PipelineOptions {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.noise_seed = Some(seed);
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}
