// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 配置 - 命令行参数与JSON配置文件

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Two-tier polygon simplification tolerance, in mask pixels.
///
/// Two-stage backends reserve their first mapped class for shapes that need
/// more geometric precision, so that class gets the finer tier.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToleranceTable {
    pub first_class: f32,
    pub other_classes: f32,
}

impl Default for ToleranceTable {
    fn default() -> Self {
        Self {
            first_class: 1.0,
            other_classes: 2.5,
        }
    }
}

impl ToleranceTable {
    /// Tolerance for the class at `class_pos` in the filtered class list.
    pub fn for_class(&self, class_pos: usize) -> f32 {
        if class_pos == 0 {
            self.first_class
        } else {
            self.other_classes
        }
    }
}

/// Post-processing parameters, adjustable through a JSON file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub conf_threshold: f32,      // 置信度阈值
    pub mask_threshold: f32,      // 掩码二值化阈值 (score > t)
    pub merge_iou_threshold: f32, // 跨模型合并IOU阈值 (iou > t)
    pub default_tolerance: f32,   // 单阶段模型的多边形简化容差
    pub tolerance: ToleranceTable,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            conf_threshold: 0.3,
            mask_threshold: 0.0,
            merge_iou_threshold: 0.5,
            default_tolerance: 1.0,
            tolerance: ToleranceTable::default(),
        }
    }
}

impl PipelineConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Falls back to defaults when the file is missing or malformed.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => {
                log::info!("config loaded from {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("failed to load config {}: {}, using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// 多模型分割结果后处理与合并
#[derive(Parser, Clone, Debug)]
#[command(author, version, about = "Normalize and merge instance segmentation results", long_about = None)]
pub struct Args {
    /// Raw model output files (JSON), one per model run on the same image
    #[arg(short, long = "input", required = true)]
    pub inputs: Vec<PathBuf>,

    /// Class id → name mapping (JSON object)
    #[arg(short, long)]
    pub classes: PathBuf,

    /// Pipeline config file (JSON)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Confidence threshold, overrides the config file
    #[arg(long)]
    pub conf: Option<f32>,

    /// Merge overlapping detections across models
    #[arg(short, long)]
    pub merge: bool,

    /// Report output path, stdout when absent
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// More logging (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    pub fn log_level(&self) -> log::LevelFilter {
        if self.quiet {
            return log::LevelFilter::Error;
        }
        match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }

    /// Config file (or defaults) with command-line overrides applied.
    pub fn pipeline_config(&self) -> PipelineConfig {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load_or_default(path),
            None => PipelineConfig::default(),
        };
        if let Some(conf) = self.conf {
            config.conf_threshold = conf;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = PipelineConfig::default();
        assert_eq!(config.conf_threshold, 0.3);
        assert_eq!(config.merge_iou_threshold, 0.5);
        assert_eq!(config.mask_threshold, 0.0);
    }

    #[test]
    fn test_tolerance_tiers() {
        let table = ToleranceTable {
            first_class: 1.0,
            other_classes: 2.5,
        };
        assert_eq!(table.for_class(0), 1.0);
        assert_eq!(table.for_class(1), 2.5);
        assert_eq!(table.for_class(9), 2.5);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: PipelineConfig = serde_json::from_str(r#"{"conf_threshold": 0.5}"#).unwrap();
        assert_eq!(config.conf_threshold, 0.5);
        assert_eq!(config.tolerance, ToleranceTable::default());
    }

    #[test]
    fn test_args_override() {
        let args = Args::parse_from([
            "segfuse", "-i", "a.json", "-i", "b.json", "-c", "classes.json", "--conf", "0.6",
            "--merge", "-vv",
        ]);
        assert_eq!(args.inputs.len(), 2);
        assert!(args.merge);
        assert_eq!(args.log_level(), log::LevelFilter::Debug);
        assert_eq!(args.pipeline_config().conf_threshold, 0.6);
    }
}
