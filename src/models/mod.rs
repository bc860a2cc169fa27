/// 后端适配器统一接口与实现
///
/// # 架构说明
///
/// Each detector backend reports results in its own shape. An adapter turns
/// one raw output into [`Instance`]s in original-image space; the
/// [`ResultAssembler`](crate::detection::ResultAssembler) then filters,
/// traces polygons and resolves class names.
///
/// - **SingleStage**: one combined result, N boxes + N masks at the head's
///   output resolution. File: `single_stage.rs`
/// - **TwoStage**: per-class nested lists, masks at image resolution.
///   File: `two_stage.rs`
///
/// The adapter is chosen by the [`BackendKind`] tag the caller supplies,
/// never by inspecting the shape of the output.
use std::fs;
use std::path::Path;

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::config::{PipelineConfig, ToleranceTable};
use crate::detection::{ClassMap, ConfidenceFilter, ImageSize, Instance};
use crate::error::Result;

/// Backend type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Box + mask-head detector (YOLO-style)
    SingleStage,
    /// Two-stage detector with per-class output lists (Mask R-CNN-style)
    TwoStage,
}

/// Raw inference output, one variant per backend kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawOutput {
    SingleStage(SingleStageOutput),
    TwoStage(TwoStageOutput),
}

impl RawOutput {
    pub fn kind(&self) -> BackendKind {
        match self {
            RawOutput::SingleStage(_) => BackendKind::SingleStage,
            RawOutput::TwoStage(_) => BackendKind::TwoStage,
        }
    }
}

/// One model's raw output for one image, as fed to the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRun {
    pub model_id: String,
    pub backend: BackendKind,
    pub image: ImageSize,
    pub output: RawOutput,
}

impl ModelRun {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Polygon simplification policy of a backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tolerance {
    Uniform(f32),
    Tiered(ToleranceTable),
}

impl Tolerance {
    pub fn for_class(&self, class_pos: usize) -> f32 {
        match self {
            Tolerance::Uniform(t) => *t,
            Tolerance::Tiered(table) => table.for_class(class_pos),
        }
    }
}

/// Normalizes one backend's raw output.
pub trait BackendAdapter {
    fn kind(&self) -> BackendKind;

    /// Raw output → instances in original-image space.
    ///
    /// Applies the confidence filter and drops unmapped classes; polygon
    /// validity is left to the assembler. Output of the wrong kind is a
    /// [`DetectError::BackendMismatch`](crate::error::DetectError).
    fn normalize(
        &self,
        raw: &RawOutput,
        image: ImageSize,
        classes: &ClassMap,
        filter: &ConfidenceFilter,
    ) -> Result<Vec<Instance>>;

    fn tolerance(&self) -> Tolerance;
}

/// Adapter for `kind`, configured from `config`.
pub fn adapter_for(kind: BackendKind, config: &PipelineConfig) -> Box<dyn BackendAdapter> {
    match kind {
        BackendKind::SingleStage => Box::new(SingleStageAdapter::new(
            config.mask_threshold,
            config.default_tolerance,
        )),
        BackendKind::TwoStage => Box::new(TwoStageAdapter::new(config.tolerance)),
    }
}

/// 推理接口 (Inference seam)
///
/// Inference itself is opaque to this crate; implementors wrap whatever
/// runtime produces the raw tensors.
pub trait Detector {
    fn model_id(&self) -> &str;

    fn backend(&self) -> BackendKind;

    fn infer(&mut self, image: &DynamicImage) -> anyhow::Result<RawOutput>;

    /// Release accelerator-held intermediate buffers. Called after every
    /// `infer`, so back-to-back models do not stack peak memory.
    fn release_buffers(&mut self) {}
}

pub mod single_stage;
pub mod two_stage;

pub use single_stage::{SingleStageAdapter, SingleStageOutput};
pub use two_stage::{TwoStageAdapter, TwoStageOutput};
