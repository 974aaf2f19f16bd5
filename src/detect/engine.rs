use crate::error::EngineError;

/// Element type of a tensor as declared by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementType {
    /// Quantized models take raw `0..=255` pixel values.
    U8,
    /// Float models take pixels scaled to `[0, 1]`.
    F32,
}

/// What an engine declares about one of its tensors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TensorDetails {
    pub index: usize,
    pub name: String,
    pub shape: Vec<usize>,
    pub element_type: ElementType,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TensorData {
    U8(Vec<u8>),
    F32(Vec<f32>),
}

/// The model input buffer, `[1, H, W, 3]` in NHWC order.
///
/// Allocated once by the pipeline and overwritten in place for every frame.
#[derive(Clone, Debug, PartialEq)]
pub struct InputTensor {
    width: u32,
    height: u32,
    data: TensorData,
}

impl InputTensor {
    pub(crate) fn zeroed(width: u32, height: u32, element_type: ElementType) -> Self {
        let len = (width as usize) * (height as usize) * 3;
        let data = match element_type {
            ElementType::U8 => TensorData::U8(vec![0; len]),
            ElementType::F32 => TensorData::F32(vec![0.0; len]),
        };
        Self {
            width,
            height,
            data,
        }
    }

    /// Copy packed RGB24 pixels into the buffer without reallocating.
    pub(crate) fn fill_from_rgb(&mut self, pixels: &[u8]) {
        match &mut self.data {
            TensorData::U8(buf) => buf.copy_from_slice(pixels),
            TensorData::F32(buf) => {
                for (dst, &src) in buf.iter_mut().zip(pixels) {
                    *dst = src as f32 / 255.0;
                }
            }
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn shape(&self) -> [usize; 4] {
        [1, self.height as usize, self.width as usize, 3]
    }

    pub fn element_type(&self) -> ElementType {
        match self.data {
            TensorData::U8(_) => ElementType::U8,
            TensorData::F32(_) => ElementType::F32,
        }
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }
}

/// One output tensor, flattened to `f32` with its declared shape.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OutputTensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl OutputTensor {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Self {
        Self { shape, data }
    }

    /// Build a tensor whose shape is just its length.
    pub fn from_vec(data: Vec<f32>) -> Self {
        Self {
            shape: vec![data.len()],
            data,
        }
    }

    /// Shape with all size-1 dimensions removed.
    pub fn squeezed_shape(&self) -> Vec<usize> {
        self.shape.iter().copied().filter(|&dim| dim != 1).collect()
    }
}

/// An opaque model executor.
///
/// The engine declares its tensors once; the pipeline then feeds one input,
/// calls `invoke` (blocking until the forward pass completes) and reads the
/// outputs by index. There are no partial results.
pub trait InferenceEngine {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Declared input tensors.
    fn input_details(&self) -> Vec<TensorDetails>;

    /// Declared output tensors, in model order.
    fn output_details(&self) -> Vec<TensorDetails>;

    /// Stage the input for the next `invoke`.
    fn set_input(&mut self, index: usize, tensor: &InputTensor) -> Result<(), EngineError>;

    /// Run the forward pass synchronously.
    fn invoke(&mut self) -> Result<(), EngineError>;

    /// Read an output produced by the last `invoke`.
    fn output(&self, index: usize) -> Result<OutputTensor, EngineError>;
}

impl<E: InferenceEngine + ?Sized> InferenceEngine for Box<E> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn input_details(&self) -> Vec<TensorDetails> {
        (**self).input_details()
    }

    fn output_details(&self) -> Vec<TensorDetails> {
        (**self).output_details()
    }

    fn set_input(&mut self, index: usize, tensor: &InputTensor) -> Result<(), EngineError> {
        (**self).set_input(index, tensor)
    }

    fn invoke(&mut self) -> Result<(), EngineError> {
        (**self).invoke()
    }

    fn output(&self, index: usize) -> Result<OutputTensor, EngineError> {
        (**self).output(index)
    }
}
