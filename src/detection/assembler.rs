// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 结果组装 (Result assembler)
//!
//! adapter → confidence filter → polygon extraction → `Detection` list.

use super::filter::ConfidenceFilter;
use super::types::{ClassMap, ClassTable, Detection, ImageSize, Instance};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::fusion::ModelRegistry;
use crate::models::{adapter_for, ModelRun, Tolerance};
use crate::utils::{ContourExtractor, PolygonExtractor, Scale};

/// Minimum vertex count of a valid polygon.
pub const MIN_POLYGON_VERTICES: usize = 3;

pub struct ResultAssembler<E = ContourExtractor> {
    config: PipelineConfig,
    filter: ConfidenceFilter,
    extractor: E,
}

impl ResultAssembler<ContourExtractor> {
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_extractor(config, ContourExtractor)
    }
}

impl<E: PolygonExtractor> ResultAssembler<E> {
    pub fn with_extractor(config: PipelineConfig, extractor: E) -> Self {
        let filter = ConfidenceFilter::new(config.conf_threshold);
        Self {
            config,
            filter,
            extractor,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn filter(&self) -> &ConfidenceFilter {
        &self.filter
    }

    /// Normalizes one model run into instances, dispatching on its backend tag.
    pub fn normalize(
        &self,
        run: &ModelRun,
        classes: &ClassMap,
    ) -> Result<(Vec<Instance>, Tolerance)> {
        let adapter = adapter_for(run.backend, &self.config);
        let instances = adapter.normalize(&run.output, run.image, classes, &self.filter)?;
        log::debug!(
            "model {}: {} instances above {}",
            run.model_id,
            instances.len(),
            self.filter.threshold()
        );
        Ok((instances, adapter.tolerance()))
    }

    /// Per-model detection list for one image.
    pub fn run(&self, run: &ModelRun, classes: &ClassMap) -> Result<Vec<Detection>> {
        let (instances, tolerance) = self.normalize(run, classes)?;
        Ok(self.assemble(
            &instances,
            classes,
            run.image,
            tolerance,
            Some(run.model_id.as_str()),
        ))
    }

    /// Stores the model's per-class table in `registry` for a later merge.
    ///
    /// No polygons are traced here; that happens once, on the merged table.
    /// Returns the number of registered instances.
    pub fn register_run(
        &self,
        run: &ModelRun,
        classes: &ClassMap,
        registry: &mut ModelRegistry,
    ) -> Result<usize> {
        let (instances, _) = self.normalize(run, classes)?;
        let count = instances.len();
        registry.register(
            run.model_id.clone(),
            ClassTable::from_instances(classes.len(), instances),
        );
        Ok(count)
    }

    /// Detections for a merged per-class table, using the tiered tolerance
    /// table of the config.
    pub fn assemble_table(
        &self,
        table: ClassTable,
        classes: &ClassMap,
        image: ImageSize,
    ) -> Vec<Detection> {
        let instances = table.into_instances();
        self.assemble(
            &instances,
            classes,
            image,
            Tolerance::Tiered(self.config.tolerance),
            None,
        )
    }

    /// Filters, traces polygons and resolves class names.
    ///
    /// Drops instances below the threshold, with an unmapped class position
    /// or with fewer than [`MIN_POLYGON_VERTICES`] vertices.
    pub fn assemble(
        &self,
        instances: &[Instance],
        classes: &ClassMap,
        image: ImageSize,
        tolerance: Tolerance,
        source_model_id: Option<&str>,
    ) -> Vec<Detection> {
        let mut detections = Vec::with_capacity(instances.len());
        for inst in instances {
            let confidence = inst.bbox.confidence;
            if !self.filter.accepts(confidence) {
                continue;
            }
            let Some(label) = classes.label_at(inst.class_pos) else {
                log::debug!("class position {} not mapped, dropped", inst.class_pos);
                continue;
            };

            let polygon = self.extractor.extract(
                &inst.mask,
                Scale::identity(),
                tolerance.for_class(inst.class_pos),
            );
            if polygon.len() < MIN_POLYGON_VERTICES {
                log::debug!(
                    "{} ({:.2}): degenerate polygon with {} vertices, dropped",
                    label,
                    confidence,
                    polygon.len()
                );
                continue;
            }

            detections.push(Detection {
                class_label: label.to_string(),
                confidence,
                bbox: inst.bbox.to_pixels(image),
                mask: Some(inst.mask.clone()),
                polygon,
                source_model_id: source_model_id.map(str::to_string),
            });
        }
        detections
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BBox;
    use crate::models::{BackendKind, RawOutput, TwoStageOutput};
    use crate::utils::{Mask, Vertex};
    use ndarray::Array2;
    use std::cell::RefCell;

    /// Records the tolerance of every call.
    #[derive(Default)]
    struct Recording {
        tolerances: RefCell<Vec<f32>>,
    }

    impl PolygonExtractor for Recording {
        fn extract(&self, mask: &Mask, scale: Scale, tolerance: f32) -> Vec<Vertex> {
            self.tolerances.borrow_mut().push(tolerance);
            ContourExtractor.extract(mask, scale, tolerance)
        }
    }

    fn square(x0: usize, y0: usize, side: usize) -> Mask {
        Mask::new(Array2::from_shape_fn((20, 20), |(y, x)| {
            (x0..x0 + side).contains(&x) && (y0..y0 + side).contains(&y)
        }))
    }

    fn two_stage_run() -> ModelRun {
        ModelRun {
            model_id: "mask-rcnn".to_string(),
            backend: BackendKind::TwoStage,
            image: ImageSize::new(20, 20),
            output: RawOutput::TwoStage(TwoStageOutput {
                boxes: vec![
                    vec![BBox::new(2.0, 2.0, 7.0, 7.0, 0.9)],
                    vec![
                        BBox::new(10.0, 10.0, 16.0, 16.0, 0.7),
                        BBox::new(0.0, 0.0, 1.0, 1.0, 0.8),
                    ],
                ],
                masks: vec![
                    vec![square(2, 2, 5)],
                    vec![square(10, 10, 6), square(0, 0, 1)],
                ],
            }),
        }
    }

    #[test]
    fn test_degenerate_polygon_dropped() {
        let classes: ClassMap = [(0, "leaf"), (1, "stem")].into_iter().collect();
        let assembler = ResultAssembler::new(PipelineConfig::default());
        let ys = assembler.run(&two_stage_run(), &classes).unwrap();
        // single-pixel instance has no valid polygon
        assert_eq!(ys.len(), 2);
        assert!(ys.iter().all(|d| d.polygon.len() >= MIN_POLYGON_VERTICES));
        assert_eq!(ys[0].class_label, "leaf");
        assert_eq!(ys[1].class_label, "stem");
        assert_eq!(ys[0].source_model_id.as_deref(), Some("mask-rcnn"));
        assert_eq!(ys[1].bbox, [10, 10, 16, 16]);
    }

    #[test]
    fn test_first_class_uses_fine_tolerance() {
        let classes: ClassMap = [(0, "leaf"), (1, "stem")].into_iter().collect();
        let config = PipelineConfig::default();
        let assembler = ResultAssembler::with_extractor(config.clone(), Recording::default());
        assembler.run(&two_stage_run(), &classes).unwrap();
        let seen = assembler.extractor.tolerances.borrow().clone();
        assert_eq!(
            seen,
            vec![
                config.tolerance.first_class,
                config.tolerance.other_classes,
                config.tolerance.other_classes
            ]
        );
    }

    #[test]
    fn test_register_run_skips_tracing() {
        let classes: ClassMap = [(0, "leaf"), (1, "stem")].into_iter().collect();
        let assembler =
            ResultAssembler::with_extractor(PipelineConfig::default(), Recording::default());
        let mut registry = ModelRegistry::new();
        let count = assembler
            .register_run(&two_stage_run(), &classes, &mut registry)
            .unwrap();
        assert_eq!(count, 3);
        assert!(assembler.extractor.tolerances.borrow().is_empty());
        let table = registry.get("mask-rcnn").unwrap();
        assert_eq!(table.class_count(), 2);
        assert_eq!(table.instance_count(0), 1);
        // registry keeps every instance above threshold, polygon or not
        assert_eq!(table.instance_count(1), 2);
    }

    #[test]
    fn test_raising_threshold_never_adds() {
        let classes: ClassMap = [(0, "leaf"), (1, "stem")].into_iter().collect();
        let mut last = usize::MAX;
        for t in [0.0, 0.5, 0.75, 0.85, 0.95] {
            let config = PipelineConfig {
                conf_threshold: t,
                ..PipelineConfig::default()
            };
            let n = ResultAssembler::new(config)
                .run(&two_stage_run(), &classes)
                .unwrap()
                .len();
            assert!(n <= last);
            last = n;
        }
        assert_eq!(last, 0);
    }
}
