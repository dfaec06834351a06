//! Detector + recognizer -> per-frame observations

use super::capability::{Detection, ObjectDetector, TextRead, TextRecognizer};
use crate::core::dispatch::event::{CargoLabel, Observation, OperationalContext, UNKNOWN_IDENTIFIER};
use crate::core::error::CapabilityError;
use crate::core::video::Frame;
use chrono::NaiveDateTime;
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

/// Alphabet handed to the recognizer: truck numbers are digits only.
pub const ALLOWED_CHARACTERS: &str = "0123456789";

static IDENTIFIER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9]{3}").expect("identifier pattern is a valid regex"));

/// First 3-digit run across the reads, in the order the recognizer returned them.
pub fn first_identifier(reads: &[TextRead]) -> Option<String> {
    reads
        .iter()
        .find_map(|read| IDENTIFIER_PATTERN.find(&read.text))
        .map(|m| m.as_str().to_string())
}

#[derive(Clone)]
pub struct DetectionExtractor {
    detector: Arc<dyn ObjectDetector>,
    recognizer: Arc<dyn TextRecognizer>,
    input_size: u32,
}

impl DetectionExtractor {
    pub fn new(
        detector: Arc<dyn ObjectDetector>,
        recognizer: Arc<dyn TextRecognizer>,
        input_size: u32,
    ) -> Self {
        Self {
            detector,
            recognizer,
            input_size,
        }
    }

    /// Extracts one observation per cargo box at or above `confidence_threshold`.
    ///
    /// A capability failure drops the whole frame (empty result); it is logged,
    /// never propagated, so one bad frame cannot stop the stream.
    pub fn extract(
        &self,
        frame: &Frame,
        confidence_threshold: f32,
        context: &OperationalContext,
        timestamp: NaiveDateTime,
    ) -> Vec<Observation> {
        match self.try_extract(frame, confidence_threshold, context, timestamp) {
            Ok(observations) => observations,
            Err(e) => {
                warn!("⚠️ Frame {} skipped: {}", frame.frame_number, e);
                Vec::new()
            }
        }
    }

    fn try_extract(
        &self,
        frame: &Frame,
        confidence_threshold: f32,
        context: &OperationalContext,
        timestamp: NaiveDateTime,
    ) -> Result<Vec<Observation>, CapabilityError> {
        let detections = self
            .detector
            .predict(frame, confidence_threshold, self.input_size)?;

        let mut observations = Vec::new();
        for detection in detections {
            let Some(label) = Self::accepted_label(&detection, confidence_threshold) else {
                continue;
            };

            // 灰度裁剪，颜色对识别无用
            let Some(crop) = frame.crop_gray(&detection.bbox) else {
                debug!("Empty crop for {:?} on frame {}", detection.bbox, frame.frame_number);
                continue;
            };

            let reads = self.recognizer.read(&crop, ALLOWED_CHARACTERS)?;
            let identifier =
                first_identifier(&reads).unwrap_or_else(|| UNKNOWN_IDENTIFIER.to_string());

            debug!(
                "Frame {}: {} truck {} ({:.2})",
                frame.frame_number, label, identifier, detection.score
            );

            observations.push(Observation {
                label,
                identifier,
                confidence: detection.score,
                timestamp,
                source: context.source.clone(),
                site: context.site.clone(),
                shift: context.shift.clone(),
            });
        }

        Ok(observations)
    }

    fn accepted_label(detection: &Detection, confidence_threshold: f32) -> Option<CargoLabel> {
        // NaN scores fail the comparison and are dropped
        if !(detection.score >= confidence_threshold) {
            return None;
        }
        CargoLabel::from_class_name(&detection.class_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::detection::capability::{MockObjectDetector, MockTextRecognizer};
    use crate::core::video::BoundingBox;
    use chrono::NaiveDate;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn context() -> OperationalContext {
        OperationalContext::new("Site-A", "Morning", "Gate-1")
    }

    fn extractor(
        detector: MockObjectDetector,
        recognizer: MockTextRecognizer,
    ) -> DetectionExtractor {
        DetectionExtractor::new(Arc::new(detector), Arc::new(recognizer), 640)
    }

    fn boxed(class_name: &str, score: f32) -> Detection {
        Detection::new(BoundingBox::new(10, 10, 50, 40), class_name, score)
    }

    #[test]
    fn test_first_identifier_scans_in_order() {
        let reads = vec![
            TextRead::new("7", 0.9),
            TextRead::new("A12", 0.9),
            TextRead::new("x4567", 0.8),
            TextRead::new("999", 0.99),
        ];
        assert_eq!(first_identifier(&reads), Some("456".to_string()));
        assert_eq!(first_identifier(&[TextRead::new("12", 0.9)]), None);
        assert_eq!(first_identifier(&[]), None);
    }

    #[test]
    fn test_extract_builds_observation() {
        let ex = extractor(
            MockObjectDetector::with_pattern(|_| vec![boxed("riche", 0.9)]),
            MockTextRecognizer::with_text(vec!["123"]),
        );
        let frame = Frame::filled(64, 64, [90, 90, 90], 4);
        let observations = ex.extract(&frame, 0.75, &context(), at());

        assert_eq!(observations.len(), 1);
        let obs = &observations[0];
        assert_eq!(obs.label, CargoLabel::Rich);
        assert_eq!(obs.identifier, "123");
        assert_eq!(obs.site, "Site-A");
        assert_eq!(obs.shift, "Morning");
        assert_eq!(obs.source, "Gate-1");
        assert_eq!(obs.timestamp, at());
        assert!(obs.is_identified());
    }

    #[test]
    fn test_low_score_and_foreign_classes_filtered() {
        let ex = extractor(
            MockObjectDetector::with_pattern(|_| {
                vec![
                    boxed("riche", 0.5),
                    boxed("person", 0.99),
                    boxed("mixte", 0.75),
                    boxed("vide", f32::NAN),
                ]
            }),
            MockTextRecognizer::with_text(vec!["321"]),
        );
        let frame = Frame::filled(64, 64, [90, 90, 90], 4);
        let observations = ex.extract(&frame, 0.75, &context(), at());

        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].label, CargoLabel::Mixed);
    }

    #[test]
    fn test_unreadable_number_is_unknown() {
        let ex = extractor(
            MockObjectDetector::with_pattern(|_| vec![boxed("sterile", 0.9)]),
            MockTextRecognizer::with_text(vec!["12", ""]),
        );
        let frame = Frame::filled(64, 64, [90, 90, 90], 4);
        let observations = ex.extract(&frame, 0.75, &context(), at());

        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].identifier, UNKNOWN_IDENTIFIER);
        assert!(!observations[0].is_identified());
    }

    #[test]
    fn test_box_outside_frame_skipped() {
        let ex = extractor(
            MockObjectDetector::with_pattern(|_| {
                vec![Detection::new(BoundingBox::new(200, 200, 260, 240), "riche", 0.9)]
            }),
            MockTextRecognizer::with_text(vec!["123"]),
        );
        let frame = Frame::filled(64, 64, [90, 90, 90], 4);
        assert!(ex.extract(&frame, 0.75, &context(), at()).is_empty());
    }

    #[test]
    fn test_capability_failure_yields_empty_frame() {
        let detector_fails = extractor(
            MockObjectDetector::failing_on(vec![4], MockObjectDetector::new()),
            MockTextRecognizer::with_text(vec!["123"]),
        );
        let frame = Frame::filled(64, 64, [90, 90, 90], 4);
        assert!(detector_fails.extract(&frame, 0.75, &context(), at()).is_empty());

        let recognizer_fails = extractor(
            MockObjectDetector::with_pattern(|_| vec![boxed("riche", 0.9)]),
            MockTextRecognizer::failing(),
        );
        assert!(recognizer_fails.extract(&frame, 0.75, &context(), at()).is_empty());
    }

    #[test]
    fn test_recognizer_sees_grayscale_crop() {
        let ex = extractor(
            MockObjectDetector::with_pattern(|_| vec![boxed("riche", 0.9)]),
            MockTextRecognizer::with_pattern(|image| {
                if image.width() == 40 && image.height() == 30 {
                    vec![TextRead::new("777", 0.9)]
                } else {
                    Vec::new()
                }
            }),
        );
        let frame = Frame::filled(64, 64, [90, 90, 90], 4);
        let observations = ex.extract(&frame, 0.75, &context(), at());
        assert_eq!(observations[0].identifier, "777");
    }
}
