// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 单阶段模型适配器 (box + mask head)
// 推理在缩放后的图像上进行, 框和掩码需要还原到原图坐标

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::{BackendAdapter, BackendKind, RawOutput, Tolerance};
use crate::detection::{BBox, ClassMap, ConfidenceFilter, ImageSize, Instance};
use crate::error::{DetectError, Result};
use crate::utils::Mask;

/// Combined result of a single-stage model.
///
/// `boxes` are xyxy in mask output coordinates; `masks` are raw scores at
/// the output resolution `(rows, cols)`, one per box.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SingleStageOutput {
    pub boxes: Vec<[f32; 4]>,
    pub confidences: Vec<f32>,
    pub class_ids: Vec<u32>,
    #[serde(default)]
    pub masks: Option<Vec<Array2<f32>>>,
}

/// 单阶段适配器
#[derive(Debug, Clone, Copy)]
pub struct SingleStageAdapter {
    mask_threshold: f32,
    tolerance: f32,
}

impl Default for SingleStageAdapter {
    fn default() -> Self {
        Self {
            mask_threshold: 0.0,
            tolerance: 1.0,
        }
    }
}

impl SingleStageAdapter {
    pub fn new(mask_threshold: f32, tolerance: f32) -> Self {
        Self {
            mask_threshold,
            tolerance,
        }
    }

    fn check_lengths(out: &SingleStageOutput, masks: &[Array2<f32>]) -> Result<()> {
        let n = out.boxes.len();
        if out.confidences.len() != n || out.class_ids.len() != n || masks.len() != n {
            return Err(DetectError::ShapeMismatch(format!(
                "single-stage output: {} boxes, {} confidences, {} class ids, {} masks",
                n,
                out.confidences.len(),
                out.class_ids.len(),
                masks.len()
            )));
        }
        Ok(())
    }
}

impl BackendAdapter for SingleStageAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::SingleStage
    }

    fn normalize(
        &self,
        raw: &RawOutput,
        image: ImageSize,
        classes: &ClassMap,
        filter: &ConfidenceFilter,
    ) -> Result<Vec<Instance>> {
        let out = match raw {
            RawOutput::SingleStage(out) => out,
            other => {
                return Err(DetectError::BackendMismatch {
                    expected: self.kind(),
                    actual: other.kind(),
                })
            }
        };

        // 无掩码输出 => 空结果
        let masks = match &out.masks {
            Some(masks) if !masks.is_empty() => masks,
            _ => return Ok(Vec::new()),
        };
        Self::check_lengths(out, masks)?;

        let (out_h, out_w) = masks[0].dim();
        if let Some(bad) = masks.iter().find(|m| m.dim() != (out_h, out_w)) {
            return Err(DetectError::MaskSize {
                left: (out_h, out_w),
                right: bad.dim(),
            });
        }
        if out_h == 0 || out_w == 0 {
            return Ok(Vec::new());
        }

        // 原图尺寸 / 输出尺寸
        let sx = image.width as f32 / out_w as f32;
        let sy = image.height as f32 / out_h as f32;

        let mut instances = Vec::new();
        for (i, scores) in masks.iter().enumerate() {
            let confidence = out.confidences[i];
            if !filter.accepts(confidence) {
                continue;
            }
            let class_id = out.class_ids[i];
            let Some(class_pos) = classes.position(class_id) else {
                log::debug!("candidate {}: class {} not mapped, dropped", i, class_id);
                continue;
            };

            let [x1, y1, x2, y2] = out.boxes[i];
            let bbox = BBox::new(x1, y1, x2, y2, confidence).rescale(sx, sy);
            let mask = Mask::from_scores(scores, self.mask_threshold)
                .resize(image.width, image.height);

            instances.push(Instance {
                class_pos,
                bbox,
                mask,
            });
        }

        Ok(instances)
    }

    fn tolerance(&self) -> Tolerance {
        Tolerance::Uniform(self.tolerance)
    }
}
