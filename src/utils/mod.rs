/// 工具模块
/// Utility modules
pub mod mask;
pub mod polygon;

pub use mask::Mask;
pub use polygon::{ContourExtractor, PolygonExtractor, Scale, Vertex};
