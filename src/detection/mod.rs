/// 检测结果处理 (Detection post-processing)
///
/// - types:     实例、类别表、最终结果与报告格式
/// - filter:    置信度过滤
/// - assembler: 适配器 → 过滤 → 多边形 → Detection
pub mod assembler;
pub mod filter;
pub mod types;

pub use assembler::{ResultAssembler, MIN_POLYGON_VERTICES};
pub use filter::ConfidenceFilter;
pub use types::{
    format_confidence, BBox, ClassMap, ClassTable, Detection, DetectionRecord, DetectionReport,
    ImageSize, Instance,
};
