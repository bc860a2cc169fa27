/// 处理流水线 (Processing pipeline)
///
/// 单线程、同步:
/// - 每个模型: 适配器 → 置信度过滤 → 多边形 → Detection
/// - 合并模式: 全部模型注册 → 跨模型合并 → 对合并表重新组装
pub mod detector;

pub use detector::run_image;

use crate::config::PipelineConfig;
use crate::detection::{ClassMap, Detection, ResultAssembler};
use crate::error::{DetectError, Result};
use crate::fusion::{CrossModelMerger, ModelRegistry};
use crate::models::ModelRun;

/// Turns the raw outputs of several models on one image into detections.
///
/// Without `merge`, or with fewer than two runs, this is the concatenation
/// of every run's own detections in input order. With `merge`, all runs go
/// through the registry and the merged table is assembled once.
pub fn process_runs(
    runs: &[ModelRun],
    classes: &ClassMap,
    config: &PipelineConfig,
    merge: bool,
) -> Result<Vec<Detection>> {
    let assembler = ResultAssembler::new(config.clone());

    if !merge || runs.len() < 2 {
        let mut detections = Vec::new();
        for run in runs {
            let ys = assembler.run(run, classes)?;
            log::info!("model {}: {} detections", run.model_id, ys.len());
            detections.extend(ys);
        }
        return Ok(detections);
    }

    let image = runs[0].image;
    if let Some(other) = runs.iter().find(|r| r.image != image) {
        return Err(DetectError::ShapeMismatch(format!(
            "model {} ran on {}x{}, expected {}x{}",
            other.model_id, other.image.width, other.image.height, image.width, image.height
        )));
    }

    let mut registry = ModelRegistry::new();
    for run in runs {
        let count = assembler.register_run(run, classes, &mut registry)?;
        log::info!("model {}: {} instances registered", run.model_id, count);
    }

    let outcome = CrossModelMerger::new(config.merge_iou_threshold).merge(&mut registry)?;
    Ok(assembler.assemble_table(outcome.table, classes, image))
}
