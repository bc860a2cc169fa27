// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 跨模型合并 (Cross-model merge)
//!
//! Greedy pairwise merge over the registry. The result depends on
//! registration order: each instance pairs with the first live partner
//! found in a later model, and merged instances are not compared again.

use std::time::Instant;

use crate::detection::ClassTable;
use crate::error::Result;

use super::registry::ModelRegistry;

/// Result of one merge pass.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub table: ClassTable,
    /// Number of merged pairs.
    pub merged_count: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct CrossModelMerger {
    iou_threshold: f32,
}

impl Default for CrossModelMerger {
    fn default() -> Self {
        Self { iou_threshold: 0.5 }
    }
}

impl CrossModelMerger {
    /// Pairs merge when mask IoU is strictly greater than `iou_threshold`.
    pub fn new(iou_threshold: f32) -> Self {
        Self { iou_threshold }
    }

    pub fn iou_threshold(&self) -> f32 {
        self.iou_threshold
    }

    /// Drains `registry` and merges its tables into one.
    ///
    /// The registry is empty afterwards, also when a mask size mismatch
    /// aborts the merge.
    pub fn merge(&self, registry: &mut ModelRegistry) -> Result<MergeOutcome> {
        let start = Instant::now();
        for (model_id, count) in registry.instance_counts() {
            log::info!("model {}: {} instances", model_id, count);
        }

        let entries = registry.take();
        let class_count = entries
            .iter()
            .map(|(_, t)| t.class_count())
            .max()
            .unwrap_or(0);
        if entries.iter().any(|(_, t)| t.class_count() != class_count) {
            log::warn!(
                "models disagree on class count, merging over {} classes",
                class_count
            );
        }

        // consumed[model][class][instance]
        let mut consumed: Vec<Vec<Vec<bool>>> = entries
            .iter()
            .map(|(_, t)| {
                (0..t.class_count())
                    .map(|c| vec![false; t.instance_count(c)])
                    .collect()
            })
            .collect();

        let mut out = ClassTable::with_classes(class_count);
        let mut merged_count = 0;

        for c in 0..class_count {
            for m1 in 0..entries.len() {
                let t1 = &entries[m1].1;
                if !t1.has_class(c) {
                    continue;
                }
                for i1 in 0..t1.instance_count(c) {
                    if consumed[m1][c][i1] {
                        continue;
                    }
                    let Some((m2, i2)) = self.find_partner(&entries, &consumed, c, m1, i1)? else {
                        continue;
                    };
                    let t2 = &entries[m2].1;
                    let bbox = t1.bbox(c, i1).envelope(t2.bbox(c, i2));
                    let mask = t1.mask(c, i1).union(t2.mask(c, i2))?;
                    log::debug!(
                        "class {}: {}[{}] + {}[{}] merged",
                        c,
                        entries[m1].0,
                        i1,
                        entries[m2].0,
                        i2
                    );
                    out.push(c, bbox, mask);
                    consumed[m1][c][i1] = true;
                    consumed[m2][c][i2] = true;
                    merged_count += 1;
                }
            }
        }

        // 未合并的实例按注册顺序追加
        for (m, (model_id, table)) in entries.into_iter().enumerate() {
            let (boxes, masks) = table.into_parts();
            let mut kept = 0;
            for (c, (boxes, masks)) in boxes.into_iter().zip(masks).enumerate() {
                for (i, (bbox, mask)) in boxes.into_iter().zip(masks).enumerate() {
                    if !consumed[m][c][i] {
                        out.push(c, bbox, mask);
                        kept += 1;
                    }
                }
            }
            log::info!("model {}: {} instances kept unmerged", model_id, kept);
        }

        log::info!(
            "merged {} pairs, {} instances out, {:.2}ms",
            merged_count,
            out.total_instances(),
            start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(MergeOutcome {
            table: out,
            merged_count,
        })
    }

    /// First live instance of class `c` in a model after `m1` whose mask IoU
    /// with `(m1, i1)` exceeds the threshold.
    fn find_partner(
        &self,
        entries: &[(String, ClassTable)],
        consumed: &[Vec<Vec<bool>>],
        c: usize,
        m1: usize,
        i1: usize,
    ) -> Result<Option<(usize, usize)>> {
        let mask = entries[m1].1.mask(c, i1);
        for (m2, (_, t2)) in entries.iter().enumerate().skip(m1 + 1) {
            if !t2.has_class(c) {
                continue;
            }
            for i2 in 0..t2.instance_count(c) {
                if consumed[m2][c][i2] {
                    continue;
                }
                if mask.iou(t2.mask(c, i2))? > self.iou_threshold {
                    return Ok(Some((m2, i2)));
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{format_confidence, BBox};
    use crate::error::DetectError;
    use crate::utils::Mask;
    use ndarray::Array2;

    /// 10x10 mask covering columns `c0..c1` on every row.
    fn cols(c0: usize, c1: usize) -> Mask {
        Mask::new(Array2::from_shape_fn((10, 10), |(_, x)| (c0..c1).contains(&x)))
    }

    fn single(bbox: BBox, mask: Mask) -> ClassTable {
        let mut t = ClassTable::with_classes(1);
        t.push(0, bbox, mask);
        t
    }

    #[test]
    fn test_overlapping_pair_merges() {
        let mut reg = ModelRegistry::new();
        // |A∩B| = 40, |A∪B| = 50
        reg.register("a", single(BBox::new(0.0, 0.0, 5.0, 10.0, 0.9), cols(0, 5)));
        reg.register("b", single(BBox::new(1.0, 0.0, 5.0, 9.0, 0.6), cols(1, 5)));
        let outcome = CrossModelMerger::default().merge(&mut reg).unwrap();

        assert!(reg.is_empty());
        assert_eq!(outcome.merged_count, 1);
        assert_eq!(outcome.table.instance_count(0), 1);
        let bbox = outcome.table.bbox(0, 0);
        assert_eq!(*bbox, BBox::new(0.0, 0.0, 5.0, 10.0, 0.9));
        assert_eq!(format_confidence(bbox.confidence), "0.9");
        assert_eq!(*outcome.table.mask(0, 0), cols(0, 5));
    }

    #[test]
    fn test_third_disjoint_model_kept() {
        let mut reg = ModelRegistry::new();
        reg.register("a", single(BBox::new(0.0, 0.0, 5.0, 10.0, 0.9), cols(0, 5)));
        reg.register("b", single(BBox::new(1.0, 0.0, 5.0, 10.0, 0.6), cols(1, 5)));
        reg.register("c", single(BBox::new(7.0, 0.0, 10.0, 10.0, 0.7), cols(7, 10)));
        let outcome = CrossModelMerger::default().merge(&mut reg).unwrap();

        assert_eq!(outcome.merged_count, 1);
        assert_eq!(outcome.table.instance_count(0), 2);
        // merged first, leftovers after
        assert_eq!(outcome.table.bbox(0, 0).confidence, 0.9);
        assert_eq!(outcome.table.bbox(0, 1).confidence, 0.7);
    }

    #[test]
    fn test_iou_at_threshold_is_not_merged() {
        let mut reg = ModelRegistry::new();
        // |A∩B| = 20, |A∪B| = 40
        reg.register("a", single(BBox::new(0.0, 0.0, 4.0, 10.0, 0.9), cols(0, 4)));
        reg.register("b", single(BBox::new(0.0, 0.0, 2.0, 10.0, 0.8), cols(0, 2)));
        let outcome = CrossModelMerger::default().merge(&mut reg).unwrap();
        assert_eq!(outcome.merged_count, 0);
        assert_eq!(outcome.table.instance_count(0), 2);
        assert_eq!(*outcome.table.mask(0, 0), cols(0, 4));
        assert_eq!(*outcome.table.mask(0, 1), cols(0, 2));
    }

    #[test]
    fn test_disjoint_is_identity() {
        let mut a = ClassTable::with_classes(2);
        a.push(0, BBox::new(0.0, 0.0, 2.0, 10.0, 0.9), cols(0, 2));
        a.push(1, BBox::new(3.0, 0.0, 4.0, 10.0, 0.5), cols(3, 4));
        let mut b = ClassTable::with_classes(2);
        b.push(0, BBox::new(5.0, 0.0, 7.0, 10.0, 0.4), cols(5, 7));

        let mut reg = ModelRegistry::new();
        reg.register("a", a.clone());
        reg.register("b", b.clone());
        let outcome = CrossModelMerger::default().merge(&mut reg).unwrap();

        let mut expected = a;
        expected.push(0, *b.bbox(0, 0), b.mask(0, 0).clone());
        assert_eq!(outcome.merged_count, 0);
        assert_eq!(outcome.table, expected);
        assert!(reg.is_empty());
    }

    #[test]
    fn test_first_partner_wins() {
        let mut a = ClassTable::with_classes(1);
        a.push(0, BBox::new(0.0, 0.0, 6.0, 10.0, 0.9), cols(0, 6));
        let mut b = ClassTable::with_classes(1);
        b.push(0, BBox::new(0.0, 0.0, 5.0, 10.0, 0.5), cols(0, 5));
        b.push(0, BBox::new(1.0, 0.0, 6.0, 10.0, 0.8), cols(1, 6));

        let mut reg = ModelRegistry::new();
        reg.register("a", a);
        reg.register("b", b);
        let outcome = CrossModelMerger::default().merge(&mut reg).unwrap();

        assert_eq!(outcome.merged_count, 1);
        assert_eq!(outcome.table.instance_count(0), 2);
        assert_eq!(*outcome.table.bbox(0, 0), BBox::new(0.0, 0.0, 6.0, 10.0, 0.9));
        // second candidate of b survives untouched
        assert_eq!(outcome.table.bbox(0, 1).confidence, 0.8);
    }

    #[test]
    fn test_merged_instance_not_recompared() {
        let mut reg = ModelRegistry::new();
        for (id, conf) in [("a", 0.9), ("b", 0.8), ("c", 0.7)] {
            reg.register(id, single(BBox::new(0.0, 0.0, 5.0, 10.0, conf), cols(0, 5)));
        }
        let outcome = CrossModelMerger::default().merge(&mut reg).unwrap();
        assert_eq!(outcome.merged_count, 1);
        assert_eq!(outcome.table.instance_count(0), 2);
        assert_eq!(outcome.table.bbox(0, 1).confidence, 0.7);
    }

    #[test]
    fn test_consumed_partner_skipped_for_later_model() {
        let mut a = ClassTable::with_classes(1);
        a.push(0, BBox::new(0.0, 0.0, 5.0, 10.0, 0.9), cols(0, 5));
        a.push(0, BBox::new(0.0, 0.0, 5.0, 10.0, 0.8), cols(0, 5));

        let mut reg = ModelRegistry::new();
        reg.register("a", a);
        reg.register("b", single(BBox::new(0.0, 0.0, 5.0, 10.0, 0.5), cols(0, 5)));
        reg.register("c", single(BBox::new(0.0, 0.0, 5.0, 10.0, 0.4), cols(0, 5)));
        let outcome = CrossModelMerger::default().merge(&mut reg).unwrap();

        // a[1] passes over the consumed b[0] and pairs with c[0]
        assert_eq!(outcome.merged_count, 2);
        assert_eq!(outcome.table.total_instances(), 2);
        let confs: Vec<f32> = outcome.table.boxes()[0].iter().map(|b| b.confidence).collect();
        assert_eq!(confs, vec![0.9, 0.8]);
    }

    #[test]
    fn test_class_count_mismatch_tolerated() {
        let mut wide = ClassTable::with_classes(3);
        wide.push(2, BBox::new(0.0, 0.0, 5.0, 10.0, 0.9), cols(0, 5));
        let mut reg = ModelRegistry::new();
        reg.register("a", single(BBox::new(0.0, 0.0, 5.0, 10.0, 0.6), cols(0, 5)));
        reg.register("b", wide);
        let outcome = CrossModelMerger::default().merge(&mut reg).unwrap();
        assert_eq!(outcome.table.class_count(), 3);
        assert_eq!(outcome.merged_count, 0);
        assert_eq!(outcome.table.total_instances(), 2);
    }

    #[test]
    fn test_mask_size_mismatch_clears_registry() {
        let mut reg = ModelRegistry::new();
        reg.register("a", single(BBox::default(), cols(0, 5)));
        reg.register("b", single(BBox::default(), Mask::empty(4, 4)));
        let err = CrossModelMerger::default().merge(&mut reg);
        assert!(matches!(err, Err(DetectError::MaskSize { .. })));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_empty_registry() {
        let mut reg = ModelRegistry::new();
        let outcome = CrossModelMerger::default().merge(&mut reg).unwrap();
        assert_eq!(outcome.table.total_instances(), 0);
        assert_eq!(outcome.merged_count, 0);
    }
}
