/// 推理阶段 (Inference stage)
/// 职责: 依次调用每个模型 → 释放缓冲 → 交给后处理
use std::time::Instant;

use anyhow::Context;
use image::{DynamicImage, GenericImageView};

use crate::config::PipelineConfig;
use crate::detection::{ClassMap, Detection, ImageSize};
use crate::models::{Detector, ModelRun};

/// Runs every detector on `image` back to back, then post-processes.
///
/// Buffers are released after each inference, so only one model's
/// intermediates are alive at a time.
pub fn run_image(
    image: &DynamicImage,
    detectors: &mut [Box<dyn Detector>],
    classes: &ClassMap,
    config: &PipelineConfig,
    merge: bool,
) -> anyhow::Result<Vec<Detection>> {
    let (width, height) = image.dimensions();
    let size = ImageSize::new(width, height);

    let mut runs = Vec::with_capacity(detectors.len());
    for detector in detectors.iter_mut() {
        let t = Instant::now();
        let output = detector
            .infer(image)
            .with_context(|| format!("inference failed for model {}", detector.model_id()))?;
        detector.release_buffers();
        log::debug!(
            "model {}: inference {:.2}ms",
            detector.model_id(),
            t.elapsed().as_secs_f64() * 1000.0
        );

        runs.push(ModelRun {
            model_id: detector.model_id().to_string(),
            backend: detector.backend(),
            image: size,
            output,
        });
    }

    Ok(super::process_runs(&runs, classes, config, merge)?)
}
