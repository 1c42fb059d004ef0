//! 将乳腺体素标签图批量转换为各组织的 STL 网格.
//!
//! 可选地先从远程仓库逐病例下载并解压标签图归档.

mod result;
mod runner;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use label_berry::consts::{
    DEFAULT_BASE_URL, DEFAULT_CASE_PREFIX, DEFAULT_RELAXATION_FACTOR, DEFAULT_SMOOTH_ITERATIONS,
};
use simple_logger::SimpleLogger;

/// 体素标签图 -> 组织网格 (STL) 批量转换
#[derive(Parser, Debug)]
#[command(name = "berry-convert", version, long_about = None)]
pub struct Args {
    /// 输入根目录 (也是下载目标). 默认为 `$BERRY_INPUT_DIR` 或 `~/dataset/breast/input`
    #[arg(long)]
    pub input_dir: Option<PathBuf>,

    /// 输出根目录. 默认为 `$BERRY_OUTPUT_DIR` 或 `~/dataset/breast/stl`
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// 远程归档地址前缀
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// 起始病例编号
    #[arg(long, default_value_t = 1)]
    pub start_exam: u32,

    /// 结束病例编号 (包含)
    #[arg(long, default_value_t = 55)]
    pub end_exam: u32,

    /// 逗号分隔的病例名单, 覆盖编号范围
    #[arg(long)]
    pub exam_names: Option<String>,

    /// 病例目录名前缀
    #[arg(long, default_value = DEFAULT_CASE_PREFIX)]
    pub prefix: String,

    /// 不做网格平滑
    #[arg(long)]
    pub dont_smooth: bool,

    /// 平滑松弛因子
    #[arg(long, default_value_t = DEFAULT_RELAXATION_FACTOR)]
    pub relaxation_factor: f64,

    /// 平滑迭代次数
    #[arg(long, default_value_t = DEFAULT_SMOOTH_ITERATIONS)]
    pub smooth_iterations: u32,

    /// 逐标签提取, 不合并组织
    #[arg(long)]
    pub dont_lump_tissues: bool,

    /// 跳过下载
    #[arg(long)]
    pub no_download: bool,

    /// 保留已存在的网格文件
    #[arg(long)]
    pub skip_existing: bool,

    /// 不在体数据外补一圈背景, 贴边的表面保持开放
    #[arg(long)]
    pub open_boundary: bool,

    /// 写出文本 STL
    #[arg(long)]
    pub ascii: bool,

    /// 并行处理病例的线程数, 0 表示使用所有核心
    #[arg(long, default_value_t = 1)]
    pub jobs: usize,

    /// 输出调试日志
    #[arg(short, long)]
    pub verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    if let Err(e) = SimpleLogger::new().with_level(level).env().init() {
        eprintln!("cannot initialize logger: {e}");
    }

    match runner::run(&args) {
        Ok(summary) => {
            summary.print();
            if summary.is_ok() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            }
        }
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::from(2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["berry-convert"]);
        assert_eq!(args.start_exam, 1);
        assert_eq!(args.end_exam, 55);
        assert_eq!(args.prefix, "Exam_");
        assert_eq!(args.smooth_iterations, 15);
        assert_eq!(args.relaxation_factor, 0.25);
        assert_eq!(args.jobs, 1);
        assert!(!args.dont_smooth && !args.no_download && !args.verbose);
        assert!(args.input_dir.is_none());
    }

    #[test]
    fn test_flags() {
        let args = Args::parse_from([
            "berry-convert",
            "--exam-names",
            "Exam_02,Exam_07",
            "--dont-lump-tissues",
            "--no-download",
            "--relaxation-factor",
            "0.1",
            "--jobs",
            "0",
            "-v",
        ]);
        assert_eq!(args.exam_names.as_deref(), Some("Exam_02,Exam_07"));
        assert!(args.dont_lump_tissues && args.no_download && args.verbose);
        assert_eq!(args.relaxation_factor, 0.1);
        assert_eq!(args.jobs, 0);
    }
}
