//! Image scoring: external classifier first, pixel heuristic as fallback.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{at_least, CapabilityError};

/// Violent-class probability at or above which the classifier flags an image.
pub const VIOLENCE_THRESHOLD: f32 = 0.7;

/// Heuristic score strictly above which the fallback flags an image.
pub const HEURISTIC_THRESHOLD: f32 = 0.3;

/// Raw RGB frame, row-major, 3 bytes per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFrame {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

impl ImageFrame {
    pub fn new(width: u32, height: u32, rgb: Vec<u8>) -> Self {
        Self { width, height, rgb }
    }

    /// Frame filled with a single colour.
    pub fn solid(width: u32, height: u32, pixel: [u8; 3]) -> Self {
        let count = (width as usize) * (height as usize);
        Self::new(width, height, pixel.repeat(count))
    }

    /// Complete pixels in the buffer; a trailing partial pixel is ignored.
    pub fn pixels(&self) -> impl Iterator<Item = [u8; 3]> + '_ {
        self.rgb.chunks_exact(3).map(|p| [p[0], p[1], p[2]])
    }
}

/// Two-class image classifier (normal, violent).
pub trait ViolenceClassifier: Send + Sync {
    /// Class probabilities `[p_normal, p_violent]`.
    fn infer(&self, frame: &ImageFrame) -> Result<[f32; 2], CapabilityError>;
}

/// Result of scoring an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualScore {
    pub is_suspicious: bool,
    pub score: f32,
    pub note: String,
}

/// Score a frame, preferring `classifier` when one is available.
pub fn score_image(frame: &ImageFrame, classifier: Option<&dyn ViolenceClassifier>) -> VisualScore {
    let Some(classifier) = classifier else {
        return heuristic_score(frame);
    };

    match classifier.infer(frame) {
        Ok([_, p_violent]) if p_violent.is_finite() => {
            let score = p_violent.clamp(0.0, 1.0);
            debug!(score, "Classifier scored image");
            VisualScore {
                is_suspicious: at_least(score, VIOLENCE_THRESHOLD),
                score,
                note: format!("classifier: violent {:.0}%", score * 100.0),
            }
        }
        Ok(probabilities) => {
            warn!(?probabilities, "Classifier returned invalid output, using heuristic");
            heuristic_score(frame)
        }
        Err(e) => {
            warn!(error = %e, "Classifier unavailable, using heuristic");
            heuristic_score(frame)
        }
    }
}

/// Red-dominant and dark pixel ratios blended into one score.
pub fn heuristic_score(frame: &ImageFrame) -> VisualScore {
    let mut total = 0_u64;
    let mut red = 0_u64;
    let mut dark = 0_u64;

    for [r, g, b] in frame.pixels() {
        total += 1;
        let (rf, gf, bf) = (f32::from(r), f32::from(g), f32::from(b));
        if r > 150 && rf > 1.5 * gf && rf > 1.5 * bf {
            red += 1;
        }
        if u16::from(r) + u16::from(g) + u16::from(b) < 150 {
            dark += 1;
        }
    }

    if total == 0 {
        return VisualScore {
            is_suspicious: false,
            score: 0.0,
            note: "empty image".to_string(),
        };
    }

    let red_ratio = red as f32 / total as f32;
    let dark_ratio = dark as f32 / total as f32;
    let score = (0.6 * red_ratio + 0.4 * dark_ratio).clamp(0.0, 1.0);

    VisualScore {
        is_suspicious: score > HEURISTIC_THRESHOLD,
        score,
        note: format!(
            "heuristic: red {:.0}%, dark {:.0}%",
            red_ratio * 100.0,
            dark_ratio * 100.0
        ),
    }
}
