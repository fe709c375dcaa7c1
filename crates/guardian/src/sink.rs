//! Local notification surface on the monitored device.

use tracing::info;

/// Fire-and-forget local notification.
pub trait NotificationSink: Send + Sync {
    fn present(&self, title: &str, body: &str, confidence_percent: u8);
}

/// Sink that writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn present(&self, title: &str, body: &str, confidence_percent: u8) {
        info!(title, body, confidence_percent, "Local notification");
    }
}

/// Confidence in `[0, 1]` as a whole percentage.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn confidence_percent(confidence: f32) -> u8 {
    (confidence.clamp(0.0, 1.0) * 100.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_percent() {
        assert_eq!(confidence_percent(0.0), 0);
        assert_eq!(confidence_percent(0.856), 86);
        assert_eq!(confidence_percent(1.7), 100);
    }
}
