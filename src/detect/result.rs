/// Normalized box in `[ymin, xmin, ymax, xmax]` order, as SSD detectors emit.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoundingBox {
    pub ymin: f32,
    pub xmin: f32,
    pub ymax: f32,
    pub xmax: f32,
}

impl BoundingBox {
    pub fn from_array(values: [f32; 4]) -> Self {
        Self {
            ymin: values[0],
            xmin: values[1],
            ymax: values[2],
            xmax: values[3],
        }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.ymin, self.xmin, self.ymax, self.xmax]
    }
}

/// One recognized object instance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
    pub bounding_box: BoundingBox,
    pub class_id: u32,
    /// Confidence in `[0, 1]`.
    pub score: f32,
}

/// Detections for one frame, in engine output order.
pub type DetectionBatch = Vec<Detection>;
