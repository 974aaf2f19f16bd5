pub mod scripted;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use scripted::{ScriptedEngine, ScriptedOutputs};

#[cfg(feature = "backend-tract")]
pub use tract::TractEngine;

use std::path::Path;

use anyhow::Result;

use super::engine::{ElementType, InferenceEngine};
#[cfg(feature = "backend-tract")]
use crate::error::EngineError;

/// Model paths with this prefix select `ScriptedEngine` (no detections).
pub const STUB_MODEL_PREFIX: &str = "stub://";

/// Open the engine for a model path.
///
/// `stub://...` yields a scripted engine that never detects anything; any
/// other path is loaded as an ONNX model (feature: backend-tract).
pub fn open_engine(
    model_path: &Path,
    width: u32,
    height: u32,
    element_type: ElementType,
) -> Result<Box<dyn InferenceEngine>> {
    let is_stub = model_path
        .to_str()
        .is_some_and(|path| path.starts_with(STUB_MODEL_PREFIX));
    if is_stub {
        log::warn!(
            "model {} is a stub: no objects will ever be detected",
            model_path.display()
        );
        return Ok(Box::new(
            ScriptedEngine::new(width, height).with_element_type(element_type),
        ));
    }
    open_model(model_path, width, height, element_type)
}

#[cfg(feature = "backend-tract")]
fn open_model(
    model_path: &Path,
    width: u32,
    height: u32,
    element_type: ElementType,
) -> Result<Box<dyn InferenceEngine>> {
    let engine = TractEngine::new(model_path, width, height, element_type)
        .map_err(|err| EngineError::ModelLoad(format!("{:#}", err)))?;
    Ok(Box::new(engine))
}

#[cfg(not(feature = "backend-tract"))]
fn open_model(
    model_path: &Path,
    _width: u32,
    _height: u32,
    _element_type: ElementType,
) -> Result<Box<dyn InferenceEngine>> {
    Err(anyhow::anyhow!(
        "cannot load {}: model inference requires the backend-tract feature",
        model_path.display()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_paths_open_scripted_engine() {
        let engine = open_engine(Path::new("stub://bench"), 300, 300, ElementType::U8)
            .expect("stub engine");
        assert_eq!(engine.name(), "scripted");
        assert_eq!(engine.output_details().len(), 4);
    }
}
