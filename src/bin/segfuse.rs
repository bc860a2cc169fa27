/// 分割结果融合 (Segmentation result fusion)
///
/// 读取各模型的原始输出 (JSON), 归一化、过滤、提取多边形,
/// 可选地跨模型合并, 最后输出 {"results": [...]} 报告。
use anyhow::{Context, Result};
use clap::Parser;
use env_logger::{Builder, Env};

use segfuse_rs::{process_runs, Args, ClassMap, DetectionReport, ModelRun};

fn main() -> Result<()> {
    let args = Args::parse();

    // 未指定 -v/-q 且设置了 RUST_LOG 时使用环境变量
    let use_env = args.verbose == 0 && !args.quiet && std::env::var_os("RUST_LOG").is_some();
    let mut logger = if use_env {
        Builder::from_env(Env::default())
    } else {
        let mut b = Builder::new();
        b.filter_level(args.log_level());
        b
    };
    logger.init();

    let config = args.pipeline_config();
    let classes = ClassMap::load(&args.classes)
        .with_context(|| format!("failed to load class map {}", args.classes.display()))?;
    log::info!("{} classes mapped", classes.len());

    let mut runs = Vec::with_capacity(args.inputs.len());
    for path in &args.inputs {
        let run = ModelRun::load(path)
            .with_context(|| format!("failed to load model output {}", path.display()))?;
        log::info!(
            "loaded {} ({:?}) from {}",
            run.model_id,
            run.backend,
            path.display()
        );
        runs.push(run);
    }

    let detections = process_runs(&runs, &classes, &config, args.merge)?;
    let report = DetectionReport::from_detections(&detections);
    log::info!("{} detections", report.len());

    match &args.output {
        Some(path) => {
            report
                .write_to(path)
                .with_context(|| format!("failed to write report {}", path.display()))?;
            log::info!("report written to {}", path.display());
        }
        None => println!("{}", report.to_json_pretty()?),
    }

    Ok(())
}
