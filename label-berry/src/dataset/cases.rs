//! 病例目录的命名约定与筛选.
//!
//! 病例目录名形如 `{prefix}{编号}[_其他]`, 例如 `Exam_07`. 编号为前缀之后、下一个 `_` 之前的整数.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use either::Either;
use itertools::Itertools;
use walkdir::WalkDir;

use super::VolumeLoader;
use crate::data::VolumeFormat;
use crate::error::{ConfigError, Error};

/// 需要处理的病例集合.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CaseSelection {
    /// 显式病例名单.
    Named(Vec<String>),

    /// 编号闭区间 `start..=end`.
    Range {
        /// 起始编号.
        start: u32,
        /// 结束编号 (包含).
        end: u32,
    },
}

impl CaseSelection {
    /// 由命令行参数构建.
    ///
    /// `names` 为逗号分隔的病例名单, 非空时覆盖编号区间. 名单中没有任何名字,
    /// 或 `start > end` 时返回 `Err`.
    pub fn from_args(names: Option<&str>, start: u32, end: u32) -> Result<Self, ConfigError> {
        match names {
            Some(names) => {
                let names = names
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .unique()
                    .collect_vec();
                if names.is_empty() {
                    Err(ConfigError::EmptyCaseList)
                } else {
                    Ok(Self::Named(names))
                }
            }
            None if start > end => Err(ConfigError::InvalidRange { start, end }),
            None => Ok(Self::Range { start, end }),
        }
    }

    /// 目录名 `name` 是否被选中?
    ///
    /// 区间模式下编号无法解析时返回 `Err`, 调用方应跳过该目录.
    pub fn matches(&self, name: &str, prefix: &str) -> Result<bool, ConfigError> {
        if !name.starts_with(prefix) {
            return Ok(false);
        }
        match self {
            Self::Named(names) => Ok(names.iter().any(|n| n == name)),
            Self::Range { start, end } => {
                parse_case_number(name, prefix).map(|n| (*start..=*end).contains(&n))
            }
        }
    }

    /// 期望存在的病例名, 用于下载. 区间模式下编号补零到两位.
    pub fn expected_names<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = String> + 'a {
        match self {
            Self::Named(names) => Either::Left(names.iter().cloned()),
            Self::Range { start, end } => {
                Either::Right((*start..=*end).map(move |n| format!("{prefix}{n:02}")))
            }
        }
    }
}

/// 解析病例目录名中的编号.
pub fn parse_case_number(name: &str, prefix: &str) -> Result<u32, ConfigError> {
    let malformed = || ConfigError::MalformedCaseName(name.to_string());
    let rest = name.strip_prefix(prefix).ok_or_else(malformed)?;
    let digits = rest.split('_').next().unwrap_or_default();
    digits.parse().map_err(|_| malformed())
}

/// 一个病例目录及其中的体数据文件.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseDir {
    /// 病例名 (目录名).
    pub name: String,

    /// 目录路径.
    pub path: PathBuf,

    /// 目录中受支持的体数据文件, 按文件名排序.
    pub volumes: Vec<PathBuf>,
}

impl CaseDir {
    /// 扫描目录 `path` 中的体数据文件 (不递归).
    pub fn scan<P: AsRef<Path>>(name: impl Into<String>, path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut volumes = Vec::new();
        for entry in fs::read_dir(&path)? {
            let p = entry?.path();
            if p.is_file() && VolumeFormat::from_path(&p).is_some() {
                volumes.push(p);
            }
        }
        volumes.sort();
        Ok(Self {
            name: name.into(),
            path,
            volumes,
        })
    }

    /// 逐个加载该病例中的体数据.
    #[inline]
    pub fn loader(&self) -> VolumeLoader {
        VolumeLoader::new(self.volumes.iter().cloned())
    }
}

/// 在 `root` 下递归查找被 `selection` 选中的病例目录, 按病例名排序.
///
/// 名字以 `prefix` 开头但编号无法解析的目录被跳过. 不跟随符号链接.
/// `root` 不可读时返回 `Err`, 子目录不可读时记录警告后跳过.
///
/// 多个目录同名时只保留路径排序最靠前的一个, 其余记录警告后跳过,
/// 以免它们写入同一个输出目录.
pub fn discover_cases<P: AsRef<Path>>(
    root: P,
    prefix: &str,
    selection: &CaseSelection,
) -> Result<Vec<CaseDir>, Error> {
    let root = root.as_ref();
    fs::read_dir(root).map_err(|source| Error::InputRoot {
        path: root.to_path_buf(),
        source,
    })?;

    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name();

    let mut ans = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                log::warn!("cannot read directory entry: {e}");
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };

        match selection.matches(name, prefix) {
            Ok(true) => match CaseDir::scan(name, entry.path()) {
                Ok(case) => ans.push(case),
                Err(e) => log::warn!("cannot scan case directory {}: {e}", entry.path().display()),
            },
            Ok(false) => {}
            Err(e) => log::debug!("skipping {}: {e}", entry.path().display()),
        }
    }

    ans.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.path.cmp(&b.path)));
    let mut seen = HashSet::new();
    ans.retain(|case| {
        let first = seen.insert(case.name.clone());
        if !first {
            log::warn!(
                "duplicate case {} at {}, skipped",
                case.name,
                case.path.display()
            );
        }
        first
    });
    Ok(ans)
}
