#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 将体素标签图 (每个体素一个整数组织标签) 按组织类别转换为三角网格,
//! 每类组织 (或合并后的组织组) 输出一个 STL 文件.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 该 crate 主要面向 "detailed label map" 乳腺模型数据 (标签 -4..=7),
//!   但标签字典和分组都是注入的, 其他按同样方式组织的数据也可以工作.
//! 2. 单个病例的失败 (读取/写出) 只影响该病例, 不会中断整批转换.
//!
//! # 开发计划
//!
//! ### 体素标签图读取 ✅
//!
//! 支持 MetaImage (`.mha`, `.mhd` + raw, 可选 zlib 压缩) 和 NIfTI
//! (`.nii`, `.nii.gz`). 数据统一以 `(z, y, x)` 顺序存储.
//!
//! 实现位于 `label-berry/src/data`.
//!
//! ### 二值掩膜 ✅
//!
//! 单标签或标签组的二值化. 空掩膜不是错误, 由调用方跳过.
//!
//! 实现位于 `label-berry/src/data/mask.rs`.
//!
//! ### 等值面提取 ✅
//!
//! 在体素中心格点上以 0.5 为阈值提取界面. 每个格点立方体被平移不变地切分为 6
//! 个四面体 (marching tetrahedra), 因此不存在 marching cubes 的歧义情形,
//! 输出网格在填充边界后是封闭且定向一致的.
//!
//! 实现位于 `label-berry/src/mesh/iso.rs`.
//!
//! ### 网格平滑 ✅
//!
//! Laplacian 松弛, 默认 15 次迭代, 边界沿边界平滑, 可选的尖锐特征边处理.
//!
//! 实现位于 `label-berry/src/mesh/smooth.rs`.
//!
//! ### STL 读写 ✅
//!
//! 二进制 / ASCII. 写出为 "全有或全无" 语义: 先写临时文件, 成功后原子重命名.
//!
//! 实现位于 `label-berry/src/mesh/stl.rs`.
//!
//! ### 病例目录枚举 & 批处理 ✅
//!
//! 按前缀 + 编号范围或显式名单筛选病例目录, 逐病例、逐文件、逐组织转换.
//! 开启 `rayon` feature 后可按病例并行.
//!
//! 实现位于 `label-berry/src/dataset` 和 `label-berry/src/pipeline`.
//!
//! ### 远程归档下载 ✅
//!
//! 逐病例下载 zip 并解压, 单个病例失败不影响其余病例. 需要 `download` feature.
//!
//! 实现位于 `label-berry/src/fetch.rs`.

/// 三维索引, 按 `(z, y, x)` 顺序.
pub type Idx3d = (usize, usize, usize);

/// 体素标签值.
pub type LabelCode = i16;

/// 世界坐标系下的点 / 向量, 按 `[x, y, z]` 顺序.
pub type Point3 = [f64; 3];

/// 体素标签图基础数据结构.
mod data;

mod atomic;

pub use data::{
    write_meta_image, BinaryMask, LabelVolume, VolumeAttr, VolumeFormat, VolumeGeometry,
};

pub mod consts;

pub mod error;

pub use error::{
    ArchiveError, ConfigError, Error, FetchError, ReadError, VolumeError, WriteError,
};

pub mod labels;

pub use labels::{ExtractionPlan, LabelDictionary, LabelGroups, Target};

pub mod mesh;

pub use mesh::{IsoConfig, Mesh, SmoothConfig, StlFormat};

pub mod dataset;

pub mod pipeline;

pub use pipeline::{
    CaseReport, ConvertOptions, Converter, SkipReason, TissueReport, TissueStatus, VolumeReport,
};

#[cfg(feature = "download")]
pub mod fetch;

pub mod prelude;
