pub mod backends;
mod engine;
mod pipeline;
mod result;

pub use engine::{
    ElementType, InferenceEngine, InputTensor, OutputTensor, TensorData, TensorDetails,
};
pub use pipeline::{
    DetectionPipeline, OUTPUT_BOXES, OUTPUT_CLASSES, OUTPUT_COUNT, OUTPUT_SCORES,
};
pub use result::{BoundingBox, Detection, DetectionBatch};
