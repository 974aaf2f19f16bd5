#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::engine::{
    ElementType, InferenceEngine, InputTensor, OutputTensor, TensorData, TensorDetails,
};
use crate::error::EngineError;

/// Tract-based engine for ONNX SSD-style detectors.
///
/// The model must take a single NHWC image tensor `[1, H, W, 3]` and produce
/// boxes, classes, scores and a detection count (TF Object Detection API
/// exports converted with tf2onnx have this layout). The model is loaded from
/// a local file; nothing is written to disk.
pub struct TractEngine {
    model: TypedRunnableModel<TypedModel>,
    inputs: Vec<TensorDetails>,
    outputs: Vec<TensorDetails>,
    staged: Option<Tensor>,
    results: TVec<Tensor>,
}

impl TractEngine {
    /// Load an ONNX model from disk and prepare it for inference.
    ///
    /// `width`/`height` pin the input fact so models exported with symbolic
    /// image dimensions still optimize to a fixed shape.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        width: u32,
        height: u32,
        element_type: ElementType,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let datum = match element_type {
            ElementType::U8 => u8::datum_type(),
            ElementType::F32 => f32::datum_type(),
        };
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(datum, tvec!(1, height as usize, width as usize, 3)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        let graph = model.model();
        let input_fact = graph.input_fact(0).context("model has no input")?;
        let input_shape = input_fact
            .shape
            .as_concrete()
            .ok_or_else(|| anyhow!("model input shape is not concrete"))?
            .to_vec();
        let inputs = vec![TensorDetails {
            index: 0,
            name: graph.node(graph.inputs[0].node).name.clone(),
            shape: input_shape,
            element_type,
        }];
        let outputs = graph
            .outputs
            .iter()
            .enumerate()
            .map(|(index, outlet)| TensorDetails {
                index,
                name: graph.node(outlet.node).name.clone(),
                shape: graph
                    .outlet_fact(*outlet)
                    .ok()
                    .and_then(|fact| fact.shape.as_concrete().map(|s| s.to_vec()))
                    .unwrap_or_default(),
                element_type: ElementType::F32,
            })
            .collect();

        log::info!("TractEngine: loaded {}", model_path.display());
        Ok(Self {
            model,
            inputs,
            outputs,
            staged: None,
            results: tvec!(),
        })
    }
}

impl InferenceEngine for TractEngine {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn input_details(&self) -> Vec<TensorDetails> {
        self.inputs.clone()
    }

    fn output_details(&self) -> Vec<TensorDetails> {
        self.outputs.clone()
    }

    fn set_input(&mut self, index: usize, tensor: &InputTensor) -> Result<(), EngineError> {
        if index != 0 {
            return Err(EngineError::MissingTensor(index));
        }
        let shape = tensor.shape();
        let built = match tensor.data() {
            TensorData::U8(buf) => Tensor::from_shape(&shape, buf.as_slice()),
            TensorData::F32(buf) => Tensor::from_shape(&shape, buf.as_slice()),
        }
        .map_err(|err| EngineError::Invoke(format!("failed to build input tensor: {}", err)))?;
        self.staged = Some(built);
        Ok(())
    }

    fn invoke(&mut self) -> Result<(), EngineError> {
        let input = self
            .staged
            .take()
            .ok_or_else(|| EngineError::Invoke("input tensor not set".to_string()))?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|err| EngineError::Invoke(format!("ONNX inference failed: {}", err)))?;
        self.results = outputs.into_iter().map(|value| value.into_tensor()).collect();
        Ok(())
    }

    fn output(&self, index: usize) -> Result<OutputTensor, EngineError> {
        let tensor = self
            .results
            .get(index)
            .ok_or(EngineError::MissingTensor(index))?;
        let as_f32 = tensor
            .cast_to::<f32>()
            .map_err(|err| EngineError::MalformedOutput {
                index,
                reason: err.to_string(),
            })?;
        let values = as_f32
            .as_slice::<f32>()
            .map_err(|err| EngineError::MalformedOutput {
                index,
                reason: err.to_string(),
            })?;
        Ok(OutputTensor::new(tensor.shape().to_vec(), values.to_vec()))
    }
}
