//! 程序运行函数.

use anyhow::Context;
use label_berry::dataset::{discover_cases, CaseSelection};
use label_berry::fetch::Fetcher;
use label_berry::{
    ConfigError, ConvertOptions, Converter, IsoConfig, LabelDictionary, LabelGroups,
    SmoothConfig, StlFormat,
};

use crate::result::RunSummary;
use crate::Args;

/// 由命令行参数构建转换器. 参数不合法时返回 `Err`.
fn build_converter(args: &Args) -> Result<Converter, ConfigError> {
    let smooth = if args.dont_smooth {
        None
    } else {
        Some(SmoothConfig::new(
            args.smooth_iterations,
            args.relaxation_factor,
        )?)
    };
    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(utils::output_dir_from_env_or_home);
    let options = ConvertOptions {
        smooth,
        lump: !args.dont_lump_tissues,
        format: if args.ascii {
            StlFormat::Ascii
        } else {
            StlFormat::Binary
        },
        skip_existing: args.skip_existing,
        iso: IsoConfig {
            close_boundary: !args.open_boundary,
        },
        ..ConvertOptions::new(output_dir)
    };
    Converter::new(
        LabelDictionary::breast_detailed(),
        LabelGroups::breast_default(),
        options,
    )
}

/// 实际运行. 只有运行级别的错误 (参数、输入/输出根目录) 会返回 `Err`,
/// 单个病例的失败记录在返回的汇总中.
pub fn run(args: &Args) -> anyhow::Result<RunSummary> {
    let selection =
        CaseSelection::from_args(args.exam_names.as_deref(), args.start_exam, args.end_exam)?;
    let converter = build_converter(args)?;
    converter.prepare_output()?;

    let input_dir = args
        .input_dir
        .clone()
        .unwrap_or_else(utils::input_dir_from_env_or_home);
    log::info!("Input: {}", input_dir.display());
    log::info!("Output: {}", converter.options().output_dir.display());

    let mut summary = RunSummary::default();
    if args.no_download {
        log::debug!("Download disabled");
    } else {
        let fetcher = Fetcher::new(args.base_url.as_str(), input_dir.clone());
        summary.record_fetch(fetcher.fetch_all(selection.expected_names(&args.prefix)));
    }

    let cases = discover_cases(&input_dir, &args.prefix, &selection)?;
    if cases.is_empty() {
        log::warn!("No case found under {}", input_dir.display());
    }

    let jobs = utils::jobs_or_cpus(args.jobs);
    if jobs <= 1 {
        summary.extend(converter.run(&cases));
    } else {
        log::info!("Converting {} cases with {jobs} threads", cases.len());
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build()
            .context("cannot build thread pool")?;
        summary.extend(pool.install(|| converter.par_run(&cases)));
    }
    Ok(summary)
}
