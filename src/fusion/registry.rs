// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 模型结果注册表 (Model result registry)
//!
//! Holds one per-class table per model for the image being processed.
//! Order of registration is the order the merger walks models in.

use crate::detection::{BBox, ClassTable};
use crate::error::Result;
use crate::utils::Mask;

#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    entries: Vec<(String, ClassTable)>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `table` under `model_id`. An existing entry is overwritten in
    /// place and keeps its original position.
    pub fn register(&mut self, model_id: impl Into<String>, table: ClassTable) {
        let model_id = model_id.into();
        if let Some(entry) = self.entries.iter_mut().find(|(id, _)| *id == model_id) {
            log::debug!("model {} registered twice, overwriting", model_id);
            entry.1 = table;
        } else {
            self.entries.push((model_id, table));
        }
    }

    /// Validates alignment of `boxes` and `masks` before storing them.
    pub fn register_parts(
        &mut self,
        model_id: impl Into<String>,
        boxes: Vec<Vec<BBox>>,
        masks: Vec<Vec<Mask>>,
    ) -> Result<()> {
        let table = ClassTable::new(boxes, masks)?;
        self.register(model_id, table);
        Ok(())
    }

    pub fn get(&self, model_id: &str) -> Option<&ClassTable> {
        self.entries
            .iter()
            .find(|(id, _)| id == model_id)
            .map(|(_, table)| table)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ClassTable)> {
        self.entries.iter().map(|(id, table)| (id.as_str(), table))
    }

    pub fn model_ids(&self) -> Vec<&str> {
        self.entries.iter().map(|(id, _)| id.as_str()).collect()
    }

    /// Total instance count per model, in registration order.
    pub fn instance_counts(&self) -> Vec<(String, usize)> {
        self.entries
            .iter()
            .map(|(id, table)| (id.clone(), table.total_instances()))
            .collect()
    }

    pub fn total_instances(&self) -> usize {
        self.entries.iter().map(|(_, t)| t.total_instances()).sum()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Moves every entry out, leaving the registry empty.
    pub fn take(&mut self) -> Vec<(String, ClassTable)> {
        std::mem::take(&mut self.entries)
    }
}
