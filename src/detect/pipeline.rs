//! Frame → detections.
//!
//! The pipeline owns the label table, the engine and the reusable input
//! tensor. Output decoding follows the SSD post-processing contract: four
//! outputs in fixed ordinal position (boxes, classes, scores, count), with
//! non-max suppression already applied inside the model. Models without
//! built-in NMS are not supported by this decoder.

use super::engine::{InferenceEngine, InputTensor, OutputTensor};
use super::result::{BoundingBox, Detection, DetectionBatch};
use crate::error::{EngineError, UnknownClassError};
use crate::frame::Frame;
use crate::labels::LabelTable;

/// Ordinal positions of the detector outputs.
pub const OUTPUT_BOXES: usize = 0;
pub const OUTPUT_CLASSES: usize = 1;
pub const OUTPUT_SCORES: usize = 2;
pub const OUTPUT_COUNT: usize = 3;
const DETECTOR_OUTPUTS: usize = 4;

pub struct DetectionPipeline<E: InferenceEngine> {
    engine: E,
    labels: LabelTable,
    input_index: usize,
    output_indices: [usize; DETECTOR_OUTPUTS],
    input: InputTensor,
}

impl<E: InferenceEngine> DetectionPipeline<E> {
    /// Introspect the engine once and allocate the input buffer.
    pub fn new(engine: E, labels: LabelTable) -> Result<Self, EngineError> {
        let inputs = engine.input_details();
        let input = inputs.first().ok_or(EngineError::MissingTensor(0))?;
        let (height, width) = match input.shape.as_slice() {
            [1, height, width, 3] if *height > 0 && *width > 0 => (
                u32::try_from(*height).map_err(|_| EngineError::InputShape {
                    shape: input.shape.clone(),
                })?,
                u32::try_from(*width).map_err(|_| EngineError::InputShape {
                    shape: input.shape.clone(),
                })?,
            ),
            _ => {
                return Err(EngineError::InputShape {
                    shape: input.shape.clone(),
                })
            }
        };

        let outputs = engine.output_details();
        if outputs.len() != DETECTOR_OUTPUTS {
            return Err(EngineError::OutputArity {
                expected: DETECTOR_OUTPUTS,
                actual: outputs.len(),
            });
        }
        let output_indices = [
            outputs[OUTPUT_BOXES].index,
            outputs[OUTPUT_CLASSES].index,
            outputs[OUTPUT_SCORES].index,
            outputs[OUTPUT_COUNT].index,
        ];

        log::info!(
            "DetectionPipeline: engine={} input={}x{} {:?} outputs={:?} labels={}",
            engine.name(),
            width,
            height,
            input.element_type,
            outputs.iter().map(|o| o.name.as_str()).collect::<Vec<_>>(),
            labels.len()
        );

        Ok(Self {
            input_index: input.index,
            input: InputTensor::zeroed(width, height, input.element_type),
            engine,
            labels,
            output_indices,
        })
    }

    /// Model input size as `(width, height)`. Frames must arrive at this size.
    pub fn input_size(&self) -> (u32, u32) {
        (self.input.width(), self.input.height())
    }

    /// Copy a frame into the input buffer and stage it on the engine.
    pub fn set_input(&mut self, frame: &Frame) -> Result<&InputTensor, EngineError> {
        let (width, height) = self.input_size();
        if frame.width != width || frame.height != height {
            return Err(EngineError::FrameSize {
                width: frame.width,
                height: frame.height,
                expected_width: width,
                expected_height: height,
            });
        }
        self.input.fill_from_rgb(frame.pixels());
        self.engine.set_input(self.input_index, &self.input)?;
        Ok(&self.input)
    }

    /// Run one blocking forward pass and keep detections scoring at least
    /// `threshold`, in engine output order.
    pub fn run(&mut self, frame: &Frame, threshold: f32) -> Result<DetectionBatch, EngineError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(EngineError::InvalidThreshold(threshold));
        }
        self.set_input(frame)?;
        self.engine.invoke()?;

        let boxes = self.engine.output(self.output_indices[OUTPUT_BOXES])?;
        let classes = self.engine.output(self.output_indices[OUTPUT_CLASSES])?;
        let scores = self.engine.output(self.output_indices[OUTPUT_SCORES])?;
        let count = self.engine.output(self.output_indices[OUTPUT_COUNT])?;

        decode_detections(&boxes, &classes, &scores, &count, threshold)
    }

    pub fn label_for(&self, detection: &Detection) -> Result<&str, UnknownClassError> {
        self.labels.lookup(detection.class_id)
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }
}

/// Decode the four detector outputs.
///
/// Iteration is clamped to the shortest of the reported count and the
/// physical lengths of the box, class and score tensors.
pub(crate) fn decode_detections(
    boxes: &OutputTensor,
    classes: &OutputTensor,
    scores: &OutputTensor,
    count: &OutputTensor,
    threshold: f32,
) -> Result<DetectionBatch, EngineError> {
    if boxes.data.len() % 4 != 0 {
        return Err(EngineError::MalformedOutput {
            index: OUTPUT_BOXES,
            reason: format!("{} values is not a multiple of 4", boxes.data.len()),
        });
    }
    if !count.squeezed_shape().is_empty() {
        return Err(EngineError::MalformedOutput {
            index: OUTPUT_COUNT,
            reason: format!("expected a scalar, got shape {:?}", count.shape),
        });
    }
    let reported = match count.data.as_slice() {
        [value] if value.is_finite() && *value > 0.0 => value.trunc() as usize,
        [_] => 0,
        other => {
            return Err(EngineError::MalformedOutput {
                index: OUTPUT_COUNT,
                reason: format!("expected a scalar, got {} values", other.len()),
            })
        }
    };

    let available = (boxes.data.len() / 4)
        .min(classes.data.len())
        .min(scores.data.len());
    if reported > available {
        log::warn!(
            "detector reported {} detections but outputs hold {}; clamping",
            reported,
            available
        );
    }
    let limit = reported.min(available);

    let mut batch = Vec::new();
    for i in 0..limit {
        let score = scores.data[i];
        if score.is_nan() || score < threshold {
            continue;
        }
        let class = classes.data[i];
        if !class.is_finite() || class < 0.0 {
            return Err(EngineError::MalformedOutput {
                index: OUTPUT_CLASSES,
                reason: format!("class value {} at position {}", class, i),
            });
        }
        let b = &boxes.data[i * 4..i * 4 + 4];
        batch.push(Detection {
            bounding_box: BoundingBox::from_array([b[0], b[1], b[2], b[3]]),
            class_id: class.trunc() as u32,
            score,
        });
    }
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::{ScriptedEngine, ScriptedOutputs};
    use crate::detect::engine::ElementType;

    const STOP_BOX: [f32; 4] = [0.1, 0.2, 0.5, 0.6];

    fn labels() -> LabelTable {
        LabelTable::parse("0: person\n1: stop sign\n")
    }

    fn frame(width: u32, height: u32) -> Frame {
        let data = (0..(width * height * 3)).map(|i| (i % 251) as u8).collect();
        Frame::from_rgb(data, width, height, 1).expect("test frame")
    }

    fn outputs(classes: Vec<f32>, scores: Vec<f32>, count: f32) -> ScriptedOutputs {
        ScriptedOutputs {
            boxes: vec![STOP_BOX; classes.len()],
            classes,
            scores,
            count,
        }
    }

    #[test]
    fn stop_sign_above_threshold_is_reported() -> Result<(), EngineError> {
        let engine = ScriptedEngine::new(4, 4).repeat(outputs(vec![1.0], vec![0.9], 1.0));
        let mut pipeline = DetectionPipeline::new(engine, labels())?;

        let batch = pipeline.run(&frame(4, 4), 0.4)?;
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].class_id, 1);
        assert_eq!(batch[0].score, 0.9);
        assert_eq!(batch[0].bounding_box.to_array(), STOP_BOX);
        assert_eq!(pipeline.label_for(&batch[0]).unwrap(), "stop sign");
        Ok(())
    }

    #[test]
    fn low_scores_are_filtered() -> Result<(), EngineError> {
        let engine = ScriptedEngine::new(4, 4).repeat(outputs(vec![1.0], vec![0.2], 1.0));
        let mut pipeline = DetectionPipeline::new(engine, labels())?;
        assert!(pipeline.run(&frame(4, 4), 0.4)?.is_empty());
        Ok(())
    }

    #[test]
    fn every_emitted_detection_meets_threshold() -> Result<(), EngineError> {
        let scores = vec![0.05, 0.4, 0.39, 0.99, 0.0, 1.0, 0.41, f32::NAN];
        let classes = vec![0.0; scores.len()];
        let count = scores.len() as f32;
        let engine = ScriptedEngine::new(4, 4).repeat(outputs(classes, scores.clone(), count));
        let mut pipeline = DetectionPipeline::new(engine, labels())?;

        for threshold in [0.0, 0.2, 0.4, 0.5, 1.0] {
            let batch = pipeline.run(&frame(4, 4), threshold)?;
            assert!(batch.iter().all(|d| d.score >= threshold));
            let expected = scores.iter().filter(|&&s| s >= threshold).count();
            assert_eq!(batch.len(), expected, "threshold {}", threshold);
        }
        Ok(())
    }

    #[test]
    fn output_order_is_preserved() -> Result<(), EngineError> {
        let engine = ScriptedEngine::new(4, 4).repeat(outputs(
            vec![0.0, 1.0, 0.0],
            vec![0.5, 0.9, 0.7],
            3.0,
        ));
        let mut pipeline = DetectionPipeline::new(engine, labels())?;
        let scores: Vec<f32> = pipeline
            .run(&frame(4, 4), 0.4)?
            .iter()
            .map(|d| d.score)
            .collect();
        assert_eq!(scores, vec![0.5, 0.9, 0.7]);
        Ok(())
    }

    #[test]
    fn run_is_deterministic_for_same_frame() -> Result<(), EngineError> {
        let engine = ScriptedEngine::new(4, 4).repeat(outputs(
            vec![1.0, 0.0],
            vec![0.8, 0.6],
            2.0,
        ));
        let mut pipeline = DetectionPipeline::new(engine, labels())?;
        let input = frame(4, 4);
        let first = pipeline.run(&input, 0.4)?;
        let second = pipeline.run(&input, 0.4)?;
        assert_eq!(first, second);
        assert_eq!(pipeline.engine().invocations(), 2);
        Ok(())
    }

    #[test]
    fn count_beyond_physical_length_is_clamped() -> Result<(), EngineError> {
        let engine = ScriptedEngine::new(4, 4).repeat(outputs(
            vec![1.0, 0.0],
            vec![0.9, 0.8],
            10.0,
        ));
        let mut pipeline = DetectionPipeline::new(engine, labels())?;
        assert_eq!(pipeline.run(&frame(4, 4), 0.4)?.len(), 2);
        Ok(())
    }

    #[test]
    fn count_limits_iteration_and_is_truncated() -> Result<(), EngineError> {
        let engine = ScriptedEngine::new(4, 4).repeat(outputs(
            vec![1.0, 0.0, 0.0],
            vec![0.9, 0.8, 0.7],
            1.9,
        ));
        let mut pipeline = DetectionPipeline::new(engine, labels())?;
        assert_eq!(pipeline.run(&frame(4, 4), 0.4)?.len(), 1);
        Ok(())
    }

    #[test]
    fn negative_or_nan_count_yields_nothing() {
        let boxes = OutputTensor::new(vec![1, 1, 4], STOP_BOX.to_vec());
        let classes = OutputTensor::from_vec(vec![1.0]);
        let scores = OutputTensor::from_vec(vec![0.9]);
        for raw in [-3.0, f32::NAN] {
            let count = OutputTensor::from_vec(vec![raw]);
            let batch = decode_detections(&boxes, &classes, &scores, &count, 0.4).unwrap();
            assert!(batch.is_empty());
        }
    }

    #[test]
    fn malformed_outputs_are_rejected() {
        let classes = OutputTensor::from_vec(vec![1.0]);
        let scores = OutputTensor::from_vec(vec![0.9]);
        let count = OutputTensor::from_vec(vec![1.0]);

        let ragged = OutputTensor::from_vec(vec![0.0; 5]);
        assert!(matches!(
            decode_detections(&ragged, &classes, &scores, &count, 0.4),
            Err(EngineError::MalformedOutput { index: OUTPUT_BOXES, .. })
        ));

        let boxes = OutputTensor::from_vec(STOP_BOX.to_vec());
        let no_count = OutputTensor::from_vec(vec![]);
        assert!(matches!(
            decode_detections(&boxes, &classes, &scores, &no_count, 0.4),
            Err(EngineError::MalformedOutput { index: OUTPUT_COUNT, .. })
        ));

        let paired_count = OutputTensor::new(vec![1, 2], vec![1.0, 1.0]);
        assert!(matches!(
            decode_detections(&boxes, &classes, &scores, &paired_count, 0.4),
            Err(EngineError::MalformedOutput { index: OUTPUT_COUNT, .. })
        ));

        let negative_class = OutputTensor::from_vec(vec![-1.0]);
        assert!(matches!(
            decode_detections(&boxes, &negative_class, &scores, &count, 0.4),
            Err(EngineError::MalformedOutput { index: OUTPUT_CLASSES, .. })
        ));
    }

    #[test]
    fn unknown_class_is_reported_by_label_for() -> Result<(), EngineError> {
        let engine = ScriptedEngine::new(4, 4).repeat(outputs(vec![77.0], vec![0.9], 1.0));
        let mut pipeline = DetectionPipeline::new(engine, labels())?;
        let batch = pipeline.run(&frame(4, 4), 0.4)?;
        assert_eq!(pipeline.label_for(&batch[0]), Err(UnknownClassError(77)));
        Ok(())
    }

    #[test]
    fn frame_size_must_match_model_input() -> Result<(), EngineError> {
        let mut pipeline = DetectionPipeline::new(ScriptedEngine::new(4, 4), labels())?;
        assert_eq!(pipeline.input_size(), (4, 4));
        assert!(matches!(
            pipeline.run(&frame(8, 4), 0.4),
            Err(EngineError::FrameSize { width: 8, .. })
        ));
        Ok(())
    }

    #[test]
    fn threshold_outside_unit_range_is_rejected() -> Result<(), EngineError> {
        let mut pipeline = DetectionPipeline::new(ScriptedEngine::new(4, 4), labels())?;
        for threshold in [-0.1, 1.5, f32::NAN] {
            assert!(matches!(
                pipeline.run(&frame(4, 4), threshold),
                Err(EngineError::InvalidThreshold(_))
            ));
        }
        Ok(())
    }

    #[test]
    fn set_input_reuses_buffer() -> Result<(), EngineError> {
        let mut pipeline = DetectionPipeline::new(
            ScriptedEngine::new(2, 1).with_element_type(ElementType::F32),
            labels(),
        )?;
        let first = Frame::from_rgb(vec![255; 6], 2, 1, 1).expect("frame");
        let ptr_before = match pipeline.set_input(&first)?.data() {
            crate::detect::engine::TensorData::F32(buf) => buf.as_ptr(),
            other => panic!("unexpected tensor data {:?}", other),
        };
        let second = Frame::from_rgb(vec![0; 6], 2, 1, 2).expect("frame");
        let tensor = pipeline.set_input(&second)?;
        match tensor.data() {
            crate::detect::engine::TensorData::F32(buf) => {
                assert_eq!(buf.as_ptr(), ptr_before);
                assert!(buf.iter().all(|&v| v == 0.0));
            }
            other => panic!("unexpected tensor data {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn engine_contract_is_checked_at_construction() {
        let wrong_arity = ScriptedEngine::new(4, 4).with_output_arity(3);
        assert!(matches!(
            DetectionPipeline::new(wrong_arity, labels()),
            Err(EngineError::OutputArity {
                expected: 4,
                actual: 3
            })
        ));

        let zero_input = ScriptedEngine::new(0, 4);
        assert!(matches!(
            DetectionPipeline::new(zero_input, labels()),
            Err(EngineError::InputShape { .. })
        ));
    }

    #[test]
    fn engine_failure_surfaces_as_error() -> Result<(), EngineError> {
        let engine = ScriptedEngine::new(4, 4).then_fail("delegate crashed");
        let mut pipeline = DetectionPipeline::new(engine, labels())?;
        assert!(matches!(
            pipeline.run(&frame(4, 4), 0.4),
            Err(EngineError::Invoke(_))
        ));
        Ok(())
    }
}
