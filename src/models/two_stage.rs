// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 两阶段模型适配器 (per-class nested lists)
// boxes[class][instance] = [x1, y1, x2, y2, conf], masks[class][instance] = 原图尺寸二值掩码

use serde::{Deserialize, Serialize};

use super::{BackendAdapter, BackendKind, RawOutput, Tolerance};
use crate::config::ToleranceTable;
use crate::detection::{BBox, ClassMap, ConfidenceFilter, ImageSize, Instance};
use crate::error::{DetectError, Result};
use crate::utils::Mask;

/// Output of a two-stage model, indexed first by raw class id.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TwoStageOutput {
    pub boxes: Vec<Vec<BBox>>,
    pub masks: Vec<Vec<Mask>>,
}

/// 两阶段适配器
#[derive(Debug, Clone, Copy, Default)]
pub struct TwoStageAdapter {
    tolerance: ToleranceTable,
}

impl TwoStageAdapter {
    pub fn new(tolerance: ToleranceTable) -> Self {
        Self { tolerance }
    }
}

impl BackendAdapter for TwoStageAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::TwoStage
    }

    fn normalize(
        &self,
        raw: &RawOutput,
        image: ImageSize,
        classes: &ClassMap,
        filter: &ConfidenceFilter,
    ) -> Result<Vec<Instance>> {
        let out = match raw {
            RawOutput::TwoStage(out) => out,
            other => {
                return Err(DetectError::BackendMismatch {
                    expected: self.kind(),
                    actual: other.kind(),
                })
            }
        };
        if out.boxes.len() != out.masks.len() {
            return Err(DetectError::ShapeMismatch(format!(
                "two-stage output: {} box classes vs {} mask classes",
                out.boxes.len(),
                out.masks.len()
            )));
        }

        let expected = (image.height as usize, image.width as usize);
        let mut instances = Vec::new();
        // 只处理映射表中的类别, 其余类别完全忽略
        for (class_pos, class_id) in classes.ids().enumerate() {
            let idx = class_id as usize;
            let (Some(boxes), Some(masks)) = (out.boxes.get(idx), out.masks.get(idx)) else {
                continue;
            };
            if boxes.len() != masks.len() {
                return Err(DetectError::ShapeMismatch(format!(
                    "class {}: {} boxes vs {} masks",
                    class_id,
                    boxes.len(),
                    masks.len()
                )));
            }

            for (bbox, mask) in boxes.iter().zip(masks) {
                if !filter.accepts(bbox.confidence) {
                    continue;
                }
                // 两阶段掩码必须已是原图尺寸
                if mask.dim() != expected {
                    return Err(DetectError::MaskSize {
                        left: expected,
                        right: mask.dim(),
                    });
                }
                instances.push(Instance {
                    class_pos,
                    bbox: *bbox,
                    mask: mask.clone(),
                });
            }
        }

        Ok(instances)
    }

    fn tolerance(&self) -> Tolerance {
        Tolerance::Tiered(self.tolerance)
    }
}
