/// 检测数据结构定义
/// Data structures shared by adapters, the assembler and the merger
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DetectError, Result};
use crate::utils::{Mask, Vertex};

// ========== 基础类型 ==========

/// Original image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Box with score, stored as `[x1, y1, x2, y2, confidence]` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f32; 5]", into = "[f32; 5]")]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            confidence,
        }
    }

    /// Independent x/y affine scale. Confidence is untouched.
    pub fn rescale(&self, sx: f32, sy: f32) -> Self {
        Self {
            x1: self.x1 * sx,
            y1: self.y1 * sy,
            x2: self.x2 * sx,
            y2: self.y2 * sy,
            confidence: self.confidence,
        }
    }

    /// Smallest box containing both; keeps the higher confidence.
    pub fn envelope(&self, other: &BBox) -> Self {
        Self {
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
            x2: self.x2.max(other.x2),
            y2: self.y2.max(other.y2),
            confidence: self.confidence.max(other.confidence),
        }
    }

    /// Integer pixel box clamped to the image.
    pub fn to_pixels(&self, size: ImageSize) -> [i32; 4] {
        let w = size.width as i32;
        let h = size.height as i32;
        [
            (self.x1 as i32).clamp(0, w),
            (self.y1 as i32).clamp(0, h),
            (self.x2 as i32).clamp(0, w),
            (self.y2 as i32).clamp(0, h),
        ]
    }
}

impl From<[f32; 5]> for BBox {
    fn from(v: [f32; 5]) -> Self {
        Self::new(v[0], v[1], v[2], v[3], v[4])
    }
}

impl From<BBox> for [f32; 5] {
    fn from(b: BBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2, b.confidence]
    }
}

/// Caller-supplied class id → name mapping.
///
/// May be sparse. Iteration is by ascending id, which also defines the
/// class position used by [`ClassTable`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassMap(BTreeMap<u32, String>);

impl ClassMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: u32, name: impl Into<String>) {
        self.0.insert(id, name.into());
    }

    pub fn get(&self, id: u32) -> Option<&str> {
        self.0.get(&id).map(String::as_str)
    }

    /// Position of `id` among the mapped ids.
    pub fn position(&self, id: u32) -> Option<usize> {
        self.0.keys().position(|&k| k == id)
    }

    pub fn id_at(&self, position: usize) -> Option<u32> {
        self.0.keys().nth(position).copied()
    }

    pub fn label_at(&self, position: usize) -> Option<&str> {
        self.0.values().nth(position).map(String::as_str)
    }

    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

impl<S: Into<String>> FromIterator<(u32, S)> for ClassMap {
    fn from_iter<I: IntoIterator<Item = (u32, S)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

// ========== 归一化实例 ==========

/// One normalized instance: class position (see [`ClassMap::position`]),
/// box in original-image space, and a full-image mask.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub class_pos: usize,
    pub bbox: BBox,
    pub mask: Mask,
}

/// Per-class boxes and masks, index-aligned:
/// `masks[c][i]` belongs to `boxes[c][i]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassTable {
    boxes: Vec<Vec<BBox>>,
    masks: Vec<Vec<Mask>>,
}

impl ClassTable {
    pub fn new(boxes: Vec<Vec<BBox>>, masks: Vec<Vec<Mask>>) -> Result<Self> {
        if boxes.len() != masks.len() {
            return Err(DetectError::ShapeMismatch(format!(
                "{} box classes vs {} mask classes",
                boxes.len(),
                masks.len()
            )));
        }
        for (c, (b, m)) in boxes.iter().zip(masks.iter()).enumerate() {
            if b.len() != m.len() {
                return Err(DetectError::ShapeMismatch(format!(
                    "class {}: {} boxes vs {} masks",
                    c,
                    b.len(),
                    m.len()
                )));
            }
        }
        Ok(Self { boxes, masks })
    }

    pub fn with_classes(class_count: usize) -> Self {
        Self {
            boxes: vec![Vec::new(); class_count],
            masks: vec![Vec::new(); class_count],
        }
    }

    /// Builds a table of `class_count` classes from instances, keeping
    /// their relative order within each class.
    pub fn from_instances(class_count: usize, instances: Vec<Instance>) -> Self {
        let mut table = Self::with_classes(class_count);
        for inst in instances {
            table.push(inst.class_pos, inst.bbox, inst.mask);
        }
        table
    }

    /// Appends to class `class_pos`, growing the table if needed.
    pub fn push(&mut self, class_pos: usize, bbox: BBox, mask: Mask) {
        if class_pos >= self.boxes.len() {
            self.boxes.resize_with(class_pos + 1, Vec::new);
            self.masks.resize_with(class_pos + 1, Vec::new);
        }
        self.boxes[class_pos].push(bbox);
        self.masks[class_pos].push(mask);
    }

    pub fn class_count(&self) -> usize {
        self.boxes.len()
    }

    pub fn has_class(&self, class_pos: usize) -> bool {
        class_pos < self.boxes.len()
    }

    pub fn instance_count(&self, class_pos: usize) -> usize {
        self.boxes.get(class_pos).map_or(0, Vec::len)
    }

    pub fn total_instances(&self) -> usize {
        self.boxes.iter().map(Vec::len).sum()
    }

    pub fn boxes(&self) -> &[Vec<BBox>] {
        &self.boxes
    }

    pub fn masks(&self) -> &[Vec<Mask>] {
        &self.masks
    }

    pub fn bbox(&self, class_pos: usize, index: usize) -> &BBox {
        &self.boxes[class_pos][index]
    }

    pub fn mask(&self, class_pos: usize, index: usize) -> &Mask {
        &self.masks[class_pos][index]
    }

    pub fn into_parts(self) -> (Vec<Vec<BBox>>, Vec<Vec<Mask>>) {
        (self.boxes, self.masks)
    }

    /// Flattens class-major.
    pub fn into_instances(self) -> Vec<Instance> {
        let mut out = Vec::with_capacity(self.total_instances());
        for (class_pos, (boxes, masks)) in self.boxes.into_iter().zip(self.masks).enumerate() {
            for (bbox, mask) in boxes.into_iter().zip(masks) {
                out.push(Instance {
                    class_pos,
                    bbox,
                    mask,
                });
            }
        }
        out
    }
}

// ========== 最终结果 ==========

/// A finalized detection.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_label: String,
    pub confidence: f32,
    pub bbox: [i32; 4],
    pub mask: Option<Mask>,
    pub polygon: Vec<Vertex>,
    /// Producing backend. Never serialized.
    pub source_model_id: Option<String>,
}

impl Detection {
    pub fn confidence_label(&self) -> String {
        format_confidence(self.confidence)
    }

    pub fn to_record(&self) -> DetectionRecord {
        DetectionRecord {
            class: self.class_label.clone(),
            confidence: self.confidence_label(),
            bbox: self.bbox,
            seg: self.polygon.clone(),
        }
    }
}

/// Two-decimal presentation, always with a fractional part (`"0.9"`, `"1.0"`).
pub fn format_confidence(confidence: f32) -> String {
    let rounded = (confidence as f64 * 100.0).round() / 100.0;
    let s = format!("{}", rounded);
    if s.contains('.') {
        s
    } else {
        format!("{}.0", s)
    }
}

/// One entry of the `results` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub class: String,
    pub confidence: String,
    pub bbox: [i32; 4],
    pub seg: Vec<Vertex>,
}

/// `{"results": [...]}`; an empty list means nothing passed the threshold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub results: Vec<DetectionRecord>,
}

impl DetectionReport {
    pub fn from_detections(detections: &[Detection]) -> Self {
        Self {
            results: detections.iter().map(Detection::to_record).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_json_pretty()?)?;
        Ok(())
    }
}
