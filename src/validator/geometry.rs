//! Aspect-ratio and resolution classification.
//!
//! Category mismatches are always critical. Within a category, the relative
//! ratio difference selects the recommended transform:
//!
//! | diff        | severity | recommendation  |
//! |-------------|----------|-----------------|
//! | < 5%        | none     | identity        |
//! | 5% - 10%    | none     | minor scale     |
//! | 10% - 20%   | warning  | moderate scale  |
//! | > 20%       | critical | review required |

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::{FindingCategory, MappingEntry, Severity, Size, ValidationFinding};

/// Ratios below this are portrait
pub const SQUARE_LOWER: f64 = 0.9;

/// Ratios above this are landscape
pub const SQUARE_UPPER: f64 = 1.1;

/// Below this diff no transform is needed
pub const IDENTITY_LIMIT: f64 = 0.05;

/// Below this diff a transform is applied without review
pub const AUTO_APPLY_LIMIT: f64 = 0.10;

/// Above this diff a human must review
pub const REVIEW_LIMIT: f64 = 0.20;

/// Upscale factors above this lose too much quality
pub const SEVERE_UPSCALE: f64 = 2.0;

/// Coarse aspect-ratio category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AspectCategory {
    Portrait,
    Square,
    Landscape,
}

impl AspectCategory {
    /// Classify a width/height ratio
    pub fn classify(ratio: f64) -> Self {
        if ratio < SQUARE_LOWER {
            Self::Portrait
        } else if ratio <= SQUARE_UPPER {
            Self::Square
        } else {
            Self::Landscape
        }
    }

    /// Classify a size, `None` if degenerate
    pub fn of(size: Size) -> Option<Self> {
        size.ratio().map(Self::classify)
    }
}

impl fmt::Display for AspectCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Portrait => "portrait",
            Self::Square => "square",
            Self::Landscape => "landscape",
        };
        f.write_str(label)
    }
}

/// Relative difference between source and target ratios
pub fn ratio_diff(source_ratio: f64, target_ratio: f64) -> f64 {
    (source_ratio - target_ratio).abs() / target_ratio
}

/// Ratio-difference band, used as the feedback key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffBucket {
    Under5,
    From5To10,
    From10To20,
    Over20,
}

impl DiffBucket {
    pub fn from_diff(diff: f64) -> Self {
        if diff < IDENTITY_LIMIT {
            Self::Under5
        } else if diff < AUTO_APPLY_LIMIT {
            Self::From5To10
        } else if diff <= REVIEW_LIMIT {
            Self::From10To20
        } else {
            Self::Over20
        }
    }
}

impl fmt::Display for DiffBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Under5 => "<5%",
            Self::From5To10 => "5-10%",
            Self::From10To20 => "10-20%",
            Self::Over20 => ">20%",
        };
        f.write_str(label)
    }
}

/// What the validator recommends doing with the source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    /// Place as-is
    Identity,

    /// Small uniform scale, applied automatically
    MinorScale,

    /// Noticeable scale; a human should look
    ModerateScale,

    /// Too far apart to transform without a human
    ReviewRequired,

    /// Different aspect categories; never transformed automatically
    CrossCategory,
}

/// Aspect-ratio assessment for one mapped pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AspectAssessment {
    pub source_category: AspectCategory,
    pub target_category: AspectCategory,
    pub source_ratio: f64,
    pub target_ratio: f64,
    pub diff: f64,
    pub bucket: DiffBucket,
    pub recommendation: Recommendation,
    pub findings: Vec<ValidationFinding>,
    pub can_auto_advance: bool,
}

/// Classify the aspect relationship between a source and its slot.
///
/// Returns `None` when either size is degenerate (zero, negative, non-finite).
pub fn assess_aspect(entry: &MappingEntry, source: Size, target: Size) -> Option<AspectAssessment> {
    let source_ratio = source.ratio()?;
    let target_ratio = target.ratio()?;

    let source_category = AspectCategory::classify(source_ratio);
    let target_category = AspectCategory::classify(target_ratio);
    let diff = ratio_diff(source_ratio, target_ratio);
    let bucket = DiffBucket::from_diff(diff);

    let mut findings = Vec::new();

    if source_category != target_category {
        findings.push(ValidationFinding::new(
            Severity::Critical,
            FindingCategory::AspectRatio,
            format!(
                "{} source ({:.3}) assigned to {} slot ({:.3})",
                source_category, source_ratio, target_category, target_ratio
            ),
            entry.clone(),
        ));

        return Some(AspectAssessment {
            source_category,
            target_category,
            source_ratio,
            target_ratio,
            diff,
            bucket,
            recommendation: Recommendation::CrossCategory,
            findings,
            can_auto_advance: false,
        });
    }

    let recommendation = match bucket {
        DiffBucket::Under5 => Recommendation::Identity,
        DiffBucket::From5To10 => Recommendation::MinorScale,
        DiffBucket::From10To20 => {
            findings.push(ValidationFinding::new(
                Severity::Warning,
                FindingCategory::AspectRatio,
                format!(
                    "Ratio differs by {:.1}%; moderate scale, review suggested",
                    diff * 100.0
                ),
                entry.clone(),
            ));
            Recommendation::ModerateScale
        }
        DiffBucket::Over20 => {
            findings.push(ValidationFinding::new(
                Severity::Critical,
                FindingCategory::AspectRatio,
                format!(
                    "Ratio differs by {:.1}%; human review required",
                    diff * 100.0
                ),
                entry.clone(),
            ));
            Recommendation::ReviewRequired
        }
    };

    Some(AspectAssessment {
        source_category,
        target_category,
        source_ratio,
        target_ratio,
        diff,
        bucket,
        recommendation,
        findings,
        can_auto_advance: diff < AUTO_APPLY_LIMIT,
    })
}

/// Resolution assessment for one mapped pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionAssessment {
    /// target pixels / source pixels along the worse axis
    pub upscale_factor: f64,
    pub finding: Option<ValidationFinding>,
}

/// Check how far the source must be upscaled to fill its slot.
///
/// Returns `None` if the source has no usable pixel size.
pub fn assess_resolution(
    entry: &MappingEntry,
    source_pixels: Size,
    target: Size,
) -> Option<ResolutionAssessment> {
    if source_pixels.width <= 0.0 || source_pixels.height <= 0.0 {
        return None;
    }

    let upscale_factor =
        (target.width / source_pixels.width).max(target.height / source_pixels.height);

    let finding = if upscale_factor > SEVERE_UPSCALE {
        Some(ValidationFinding::new(
            Severity::Critical,
            FindingCategory::Resolution,
            format!(
                "Source needs {:.2}x upscale ({}x{} into {}x{}); severe quality loss",
                upscale_factor,
                source_pixels.width,
                source_pixels.height,
                target.width,
                target.height
            ),
            entry.clone(),
        ))
    } else if upscale_factor > 1.0 {
        Some(ValidationFinding::new(
            Severity::Warning,
            FindingCategory::Resolution,
            format!("Source needs {:.2}x upscale", upscale_factor),
            entry.clone(),
        ))
    } else {
        None
    };

    Some(ResolutionAssessment {
        upscale_factor,
        finding,
    })
}
