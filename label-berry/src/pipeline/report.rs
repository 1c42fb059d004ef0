//! 转换结果报告.

use std::fmt;
use std::path::PathBuf;

use crate::error::VolumeError;
use crate::LabelCode;

/// 跳过某个组织的原因. 均不是错误.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SkipReason {
    /// 体数据中没有该组织的体素.
    EmptyMask,

    /// 掩膜非空, 但提取不到任何三角形 (例如不补边且掩膜充满整个体数据).
    EmptySurface,

    /// 输出文件已存在, 按要求保留.
    AlreadyExists,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::EmptyMask => "no voxels",
            Self::EmptySurface => "empty surface",
            Self::AlreadyExists => "output already exists",
        };
        f.write_str(s)
    }
}

/// 单个组织 (或组织组) 的处理结果.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TissueStatus {
    /// 已写出.
    Saved {
        /// 输出路径.
        path: PathBuf,
        /// 三角形个数.
        triangles: usize,
    },

    /// 已跳过.
    Skipped(SkipReason),

    /// 写出失败.
    Failed(String),
}

/// 单个组织 (或组织组) 的报告.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TissueReport {
    /// 组织名或组名.
    pub name: String,

    /// 参与提取的标签值.
    pub codes: Vec<LabelCode>,

    /// 处理结果.
    pub status: TissueStatus,
}

impl TissueReport {
    /// 是否已写出?
    #[inline]
    pub fn is_saved(&self) -> bool {
        matches!(self.status, TissueStatus::Saved { .. })
    }

    /// 是否被跳过?
    #[inline]
    pub fn is_skipped(&self) -> bool {
        matches!(self.status, TissueStatus::Skipped(_))
    }
}

/// 单个体数据文件的报告.
#[derive(Debug)]
pub struct VolumeReport {
    /// 体数据文件路径.
    pub source: PathBuf,

    /// 已处理的组织, 按提取顺序.
    pub tissues: Vec<TissueReport>,

    /// 中断该文件的错误.
    pub error: Option<VolumeError>,
}

/// 单个病例的报告.
#[derive(Debug)]
pub struct CaseReport {
    /// 病例名.
    pub case: String,

    /// 每个体数据文件的报告.
    pub volumes: Vec<VolumeReport>,
}

impl CaseReport {
    /// 所有文件都没有出错? 跳过不算出错.
    pub fn is_ok(&self) -> bool {
        self.volumes.iter().all(|v| v.error.is_none())
    }

    /// 遍历所有组织报告.
    pub fn tissues(&self) -> impl Iterator<Item = &TissueReport> {
        self.volumes.iter().flat_map(|v| v.tissues.iter())
    }

    /// 写出的网格文件个数.
    pub fn saved_count(&self) -> usize {
        self.tissues().filter(|t| t.is_saved()).count()
    }

    /// 被跳过的组织个数.
    pub fn skipped_count(&self) -> usize {
        self.tissues().filter(|t| t.is_skipped()).count()
    }

    /// 出错的文件个数.
    pub fn failed_count(&self) -> usize {
        self.volumes.iter().filter(|v| v.error.is_some()).count()
    }
}
