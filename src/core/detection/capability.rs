use crate::core::error::CapabilityError;
use crate::core::video::{BoundingBox, Frame};
use image::GrayImage;

/// One box returned by the object detector.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub class_name: String,
    pub score: f32,
}

impl Detection {
    pub fn new(bbox: BoundingBox, class_name: impl Into<String>, score: f32) -> Self {
        Self {
            bbox,
            class_name: class_name.into(),
            score,
        }
    }
}

/// One text fragment returned by the recognizer, `region` relative to the crop.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRead {
    pub region: BoundingBox,
    pub text: String,
    pub score: f32,
}

impl TextRead {
    pub fn new(text: impl Into<String>, score: f32) -> Self {
        Self {
            region: BoundingBox::new(0, 0, 0, 0),
            text: text.into(),
            score,
        }
    }
}

pub trait ObjectDetector: Send + Sync {
    fn predict(
        &self,
        frame: &Frame,
        confidence_threshold: f32,
        input_size: u32,
    ) -> Result<Vec<Detection>, CapabilityError>;
}

pub trait TextRecognizer: Send + Sync {
    /// `allowed_characters` restricts the recognizer's alphabet.
    fn read(
        &self,
        image: &GrayImage,
        allowed_characters: &str,
    ) -> Result<Vec<TextRead>, CapabilityError>;
}

type DetectionPattern =
    Box<dyn Fn(&Frame) -> Result<Vec<Detection>, CapabilityError> + Send + Sync>;

/// Scripted detector: answers by frame number.
pub struct MockObjectDetector {
    pattern: Option<DetectionPattern>,
}

impl MockObjectDetector {
    /// Never detects anything.
    pub fn new() -> Self {
        Self { pattern: None }
    }

    pub fn with_pattern<F>(pattern: F) -> Self
    where
        F: Fn(u64) -> Vec<Detection> + Send + Sync + 'static,
    {
        Self {
            pattern: Some(Box::new(move |frame: &Frame| Ok(pattern(frame.frame_number)))),
        }
    }

    /// Same detections on each listed frame, nothing elsewhere.
    pub fn with_fixed_frames(frames: Vec<u64>, detections: Vec<Detection>) -> Self {
        Self::with_pattern(move |frame_number| {
            if frames.contains(&frame_number) {
                detections.clone()
            } else {
                Vec::new()
            }
        })
    }

    /// Fails on the listed frames, delegates to `inner` elsewhere.
    pub fn failing_on(frames: Vec<u64>, inner: MockObjectDetector) -> Self {
        Self {
            pattern: Some(Box::new(move |frame: &Frame| {
                if frames.contains(&frame.frame_number) {
                    Err(CapabilityError::Detection(format!(
                        "scripted failure on frame {}",
                        frame.frame_number
                    )))
                } else {
                    inner.predict(frame, 0.0, 0)
                }
            })),
        }
    }
}

impl Default for MockObjectDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectDetector for MockObjectDetector {
    fn predict(
        &self,
        frame: &Frame,
        _confidence_threshold: f32,
        _input_size: u32,
    ) -> Result<Vec<Detection>, CapabilityError> {
        match &self.pattern {
            Some(pattern) => pattern(frame),
            None => Ok(Vec::new()),
        }
    }
}

type RecognitionPattern =
    Box<dyn Fn(&GrayImage) -> Result<Vec<TextRead>, CapabilityError> + Send + Sync>;

/// Scripted recognizer: answers from the crop contents.
pub struct MockTextRecognizer {
    pattern: RecognitionPattern,
}

impl MockTextRecognizer {
    /// Reads the same fragments from every crop.
    pub fn with_text(texts: Vec<&str>) -> Self {
        let reads: Vec<TextRead> = texts.into_iter().map(|t| TextRead::new(t, 0.9)).collect();
        Self {
            pattern: Box::new(move |_| Ok(reads.clone())),
        }
    }

    pub fn with_pattern<F>(pattern: F) -> Self
    where
        F: Fn(&GrayImage) -> Vec<TextRead> + Send + Sync + 'static,
    {
        Self {
            pattern: Box::new(move |image| Ok(pattern(image))),
        }
    }

    pub fn failing() -> Self {
        Self {
            pattern: Box::new(|_| {
                Err(CapabilityError::Recognition(
                    "scripted failure".to_string(),
                ))
            }),
        }
    }
}

impl TextRecognizer for MockTextRecognizer {
    fn read(
        &self,
        image: &GrayImage,
        _allowed_characters: &str,
    ) -> Result<Vec<TextRead>, CapabilityError> {
        (self.pattern)(image)
    }
}
