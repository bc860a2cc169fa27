/// 多模型融合 (Multi-model fusion)
///
/// - registry: 每个模型的按类别结果表
/// - merger:   同类别、掩码IOU超过阈值的跨模型实例合并
pub mod merger;
pub mod registry;

pub use merger::{CrossModelMerger, MergeOutcome};
pub use registry::ModelRegistry;
