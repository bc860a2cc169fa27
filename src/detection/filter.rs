/// 置信度过滤 (Confidence filter)
///
/// `confidence >= threshold`: a score exactly at the threshold passes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceFilter {
    threshold: f32,
}

impl ConfidenceFilter {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn accepts(&self, confidence: f32) -> bool {
        confidence >= self.threshold
    }
}
