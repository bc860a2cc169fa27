// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 配置参数与命令行
pub mod detection; // 结果数据结构、过滤与组装
pub mod error; // 错误类型
pub mod fusion; // 跨模型合并
pub mod models; // 后端适配器与推理接口
pub mod pipeline; // 处理流水线
pub mod utils; // 掩码与多边形工具

pub use crate::config::{Args, PipelineConfig, ToleranceTable};
pub use crate::detection::{
    BBox, ClassMap, ClassTable, ConfidenceFilter, Detection, DetectionReport, ImageSize,
    ResultAssembler,
};
pub use crate::error::{DetectError, Result};
pub use crate::fusion::{CrossModelMerger, MergeOutcome, ModelRegistry};
pub use crate::models::{BackendAdapter, BackendKind, Detector, ModelRun, RawOutput};
pub use crate::pipeline::{process_runs, run_image};
pub use crate::utils::{ContourExtractor, Mask, PolygonExtractor};
