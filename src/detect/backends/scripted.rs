use std::collections::VecDeque;

use crate::detect::engine::{
    ElementType, InferenceEngine, InputTensor, OutputTensor, TensorDetails,
};
use crate::error::EngineError;

const OUTPUT_NAMES: [&str; 4] = [
    "detection_boxes",
    "detection_classes",
    "detection_scores",
    "num_detections",
];

/// Raw detector outputs for one forward pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScriptedOutputs {
    pub boxes: Vec<[f32; 4]>,
    pub classes: Vec<f32>,
    pub scores: Vec<f32>,
    pub count: f32,
}

impl ScriptedOutputs {
    /// A pass that found nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A pass with exactly one detection.
    pub fn single(class_id: u32, score: f32, bounding_box: [f32; 4]) -> Self {
        Self {
            boxes: vec![bounding_box],
            classes: vec![class_id as f32],
            scores: vec![score],
            count: 1.0,
        }
    }
}

/// Engine that replays canned outputs instead of running a model.
///
/// Each `invoke` consumes the next scripted step; once the script is used up
/// the `repeat` outputs are returned forever. Used for tests and for dry runs
/// with a `stub://` model path.
pub struct ScriptedEngine {
    width: u32,
    height: u32,
    element_type: ElementType,
    output_arity: usize,
    script: VecDeque<Result<ScriptedOutputs, String>>,
    fallback: ScriptedOutputs,
    current: Option<ScriptedOutputs>,
    staged: bool,
    invocations: u64,
}

impl ScriptedEngine {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            element_type: ElementType::U8,
            output_arity: OUTPUT_NAMES.len(),
            script: VecDeque::new(),
            fallback: ScriptedOutputs::empty(),
            current: None,
            staged: false,
            invocations: 0,
        }
    }

    pub fn with_element_type(mut self, element_type: ElementType) -> Self {
        self.element_type = element_type;
        self
    }

    /// Declare a different number of outputs (for contract checks).
    pub fn with_output_arity(mut self, arity: usize) -> Self {
        self.output_arity = arity;
        self
    }

    /// Outputs returned once the script is exhausted.
    pub fn repeat(mut self, outputs: ScriptedOutputs) -> Self {
        self.fallback = outputs;
        self
    }

    /// Queue outputs for the next unscripted invoke.
    pub fn then(mut self, outputs: ScriptedOutputs) -> Self {
        self.script.push_back(Ok(outputs));
        self
    }

    /// Queue a failing invoke.
    pub fn then_fail(mut self, reason: &str) -> Self {
        self.script.push_back(Err(reason.to_string()));
        self
    }

    /// Number of completed forward passes.
    pub fn invocations(&self) -> u64 {
        self.invocations
    }
}

impl InferenceEngine for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn input_details(&self) -> Vec<TensorDetails> {
        vec![TensorDetails {
            index: 0,
            name: "image_tensor".to_string(),
            shape: vec![1, self.height as usize, self.width as usize, 3],
            element_type: self.element_type,
        }]
    }

    fn output_details(&self) -> Vec<TensorDetails> {
        (0..self.output_arity)
            .map(|index| TensorDetails {
                index,
                name: OUTPUT_NAMES
                    .get(index)
                    .map(|name| name.to_string())
                    .unwrap_or_else(|| format!("output_{}", index)),
                shape: Vec::new(),
                element_type: ElementType::F32,
            })
            .collect()
    }

    fn set_input(&mut self, index: usize, tensor: &InputTensor) -> Result<(), EngineError> {
        if index != 0 {
            return Err(EngineError::MissingTensor(index));
        }
        if tensor.width() != self.width || tensor.height() != self.height {
            return Err(EngineError::InputShape {
                shape: tensor.shape().to_vec(),
            });
        }
        self.staged = true;
        Ok(())
    }

    fn invoke(&mut self) -> Result<(), EngineError> {
        if !self.staged {
            return Err(EngineError::Invoke("input tensor not set".to_string()));
        }
        let step = self
            .script
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()));
        let outputs = step.map_err(EngineError::Invoke)?;
        self.current = Some(outputs);
        self.invocations += 1;
        Ok(())
    }

    fn output(&self, index: usize) -> Result<OutputTensor, EngineError> {
        let current = self
            .current
            .as_ref()
            .ok_or_else(|| EngineError::Invoke("no forward pass has completed".to_string()))?;
        let n = current.boxes.len();
        let tensor = match index {
            0 => OutputTensor::new(
                vec![1, n, 4],
                current.boxes.iter().flat_map(|b| b.iter().copied()).collect(),
            ),
            1 => OutputTensor::new(vec![1, current.classes.len()], current.classes.clone()),
            2 => OutputTensor::new(vec![1, current.scores.len()], current.scores.clone()),
            3 => OutputTensor::new(vec![1], vec![current.count]),
            other => return Err(EngineError::MissingTensor(other)),
        };
        Ok(tensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staged(engine: &mut ScriptedEngine) {
        let tensor = InputTensor::zeroed(engine.width, engine.height, ElementType::U8);
        engine.set_input(0, &tensor).expect("stage input");
    }

    #[test]
    fn script_plays_in_order_then_repeats() -> Result<(), EngineError> {
        let mut engine = ScriptedEngine::new(2, 2)
            .then(ScriptedOutputs::single(1, 0.9, [0.0, 0.0, 1.0, 1.0]))
            .repeat(ScriptedOutputs::empty());
        staged(&mut engine);

        engine.invoke()?;
        assert_eq!(engine.output(2)?.data, vec![0.9]);
        assert_eq!(engine.output(0)?.shape, vec![1, 1, 4]);

        engine.invoke()?;
        assert!(engine.output(2)?.data.is_empty());
        assert_eq!(engine.output(3)?.data, vec![0.0]);
        engine.invoke()?;
        assert_eq!(engine.invocations(), 3);
        Ok(())
    }

    #[test]
    fn invoke_requires_staged_input() {
        let mut engine = ScriptedEngine::new(2, 2);
        assert!(matches!(engine.invoke(), Err(EngineError::Invoke(_))));
        assert!(matches!(engine.output(0), Err(EngineError::Invoke(_))));
    }

    #[test]
    fn scripted_failure_is_an_invoke_error() {
        let mut engine = ScriptedEngine::new(2, 2).then_fail("boom");
        staged(&mut engine);
        match engine.invoke() {
            Err(EngineError::Invoke(reason)) => assert_eq!(reason, "boom"),
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(engine.invocations(), 0);
    }

    #[test]
    fn unknown_output_index_is_missing() -> Result<(), EngineError> {
        let mut engine = ScriptedEngine::new(2, 2);
        staged(&mut engine);
        engine.invoke()?;
        assert!(matches!(engine.output(4), Err(EngineError::MissingTensor(4))));
        Ok(())
    }
}
