//! 命令行工具依赖的通用组件.

use std::env;
use std::io;
use std::path::PathBuf;

use label_berry::dataset::home_dataset_dir_with;

const SEP: &str = "--------------------------------------------------------";

/// 输入根目录的环境变量.
pub const INPUT_DIR_ENV: &str = "BERRY_INPUT_DIR";

/// 输出根目录的环境变量.
pub const OUTPUT_DIR_ENV: &str = "BERRY_OUTPUT_DIR";

/// 向 `w` 写入简单分隔线.
#[inline]
pub fn sep_to<W: io::Write>(mut w: W) -> io::Result<()> {
    writeln!(&mut w, "{SEP}")
}

/// 获得可并行核心数.
pub fn cpus() -> usize {
    std::thread::available_parallelism().map_or_else(|_| num_cpus::get(), usize::from)
}

/// 将 `--jobs` 参数换算为线程数. `0` 表示使用所有核心.
#[inline]
pub fn jobs_or_cpus(jobs: usize) -> usize {
    if jobs == 0 {
        cpus()
    } else {
        jobs
    }
}

fn dir_from_env_or_home(var: &str, rest: [&str; 2]) -> PathBuf {
    match env::var(var) {
        Ok(d) if !d.is_empty() => PathBuf::from(d),
        _ => home_dataset_dir_with(rest).unwrap_or_else(|| rest.iter().collect()),
    }
}

/// 获取输入根目录 (也是下载目标目录).
///
/// 1. 若环境变量 `$BERRY_INPUT_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/breast/input`.
pub fn input_dir_from_env_or_home() -> PathBuf {
    dir_from_env_or_home(INPUT_DIR_ENV, ["breast", "input"])
}

/// 获取输出根目录.
///
/// 1. 若环境变量 `$BERRY_OUTPUT_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/breast/stl`.
pub fn output_dir_from_env_or_home() -> PathBuf {
    dir_from_env_or_home(OUTPUT_DIR_ENV, ["breast", "stl"])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sep_to() {
        let mut buf = Vec::new();
        sep_to(&mut buf).unwrap();
        assert_eq!(buf, format!("{SEP}\n").into_bytes());
    }

    #[test]
    fn test_jobs() {
        assert!(cpus() >= 1);
        assert_eq!(jobs_or_cpus(3), 3);
        assert_eq!(jobs_or_cpus(0), cpus());
    }

    #[test]
    fn test_fallback_dir() {
        let d = dir_from_env_or_home("BERRY_SURELY_UNSET_VARIABLE", ["breast", "input"]);
        assert!(d.ends_with("breast/input"));
    }
}
