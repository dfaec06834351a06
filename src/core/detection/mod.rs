pub mod capability;
pub mod extractor;

pub use capability::{
    Detection, MockObjectDetector, MockTextRecognizer, ObjectDetector, TextRead, TextRecognizer,
};
pub use extractor::{first_identifier, DetectionExtractor, ALLOWED_CHARACTERS};
