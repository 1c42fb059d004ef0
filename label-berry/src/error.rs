//! 运行时错误.
//!
//! 除 [`Error`] 以外的错误都只影响单个病例 (或单个文件), 批处理会记录后继续.

use std::path::PathBuf;
use thiserror::Error;

/// 读取体素标签图或网格文件的错误. 只中断当前文件.
#[derive(Debug, Error)]
pub enum ReadError {
    /// 文件不存在.
    #[error("file not found: {}", .path.display())]
    NotFound {
        /// 不存在的路径.
        path: PathBuf,
    },

    /// 无法根据文件名识别格式.
    #[error("unsupported volume format: {}", .path.display())]
    UnsupportedFormat {
        /// 文件路径.
        path: PathBuf,
    },

    /// 文件头或数据内容不合法.
    #[error("invalid content in {}: {message}", .path.display())]
    InvalidContent {
        /// 文件路径.
        path: PathBuf,
        /// 具体描述.
        message: String,
    },

    /// 底层 I/O 错误.
    #[error("I/O error while reading {}: {source}", .path.display())]
    Io {
        /// 文件路径.
        path: PathBuf,
        /// 底层错误.
        source: std::io::Error,
    },

    /// NIfTI 解析错误.
    #[error("NIfTI error in {}: {source}", .path.display())]
    Nifti {
        /// 文件路径.
        path: PathBuf,
        /// 底层错误.
        source: nifti::NiftiError,
    },
}

impl ReadError {
    /// 创建 `InvalidContent` 错误.
    pub fn invalid(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::InvalidContent {
            path: path.into(),
            message: message.into(),
        }
    }

    /// 包装 I/O 错误. `NotFound` 会被单独识别.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound { path }
        } else {
            Self::Io { path, source }
        }
    }
}

/// 写出网格或体数据的错误. 中断当前病例剩余的写出.
#[derive(Debug, Error)]
pub enum WriteError {
    /// 底层 I/O 错误 (目录不可写, 路径非法等).
    #[error("cannot write {}: {source}", .path.display())]
    Io {
        /// 目标路径.
        path: PathBuf,
        /// 底层错误.
        source: std::io::Error,
    },

    /// 三角形个数超出二进制 STL 的 `u32` 上限.
    #[error("too many triangles for {}: {count}", .path.display())]
    TooManyTriangles {
        /// 目标路径.
        path: PathBuf,
        /// 三角形个数.
        count: usize,
    },
}

/// 单个体数据文件转换失败的原因. 只中断该文件.
#[derive(Debug, Error)]
pub enum VolumeError {
    /// 读取失败.
    #[error(transparent)]
    Read(#[from] ReadError),

    /// 写出失败.
    #[error(transparent)]
    Write(#[from] WriteError),
}

/// 下载归档的解压错误.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// zip 格式错误.
    #[cfg(feature = "download")]
    #[error("corrupt archive {}: {source}", .path.display())]
    Zip {
        /// 归档路径.
        path: PathBuf,
        /// 底层错误.
        source: zip::result::ZipError,
    },

    /// 解压过程中的 I/O 错误.
    #[error("I/O error on archive {}: {source}", .path.display())]
    Io {
        /// 归档路径.
        path: PathBuf,
        /// 底层错误.
        source: std::io::Error,
    },
}

/// 获取单个病例远程数据的错误. 该病例被跳过, 其余病例继续.
#[derive(Debug, Error)]
pub enum FetchError {
    /// 服务器返回非成功状态码.
    #[error("GET {url} returned status {status}")]
    Status {
        /// 请求地址.
        url: String,
        /// HTTP 状态码.
        status: u16,
    },

    /// 网络层错误.
    #[error("GET {url} failed: {message}")]
    Transport {
        /// 请求地址.
        url: String,
        /// 具体描述.
        message: String,
    },

    /// 实际收到的字节数与 `Content-Length` 不一致.
    #[error("GET {url} truncated: expected {expected} bytes, got {got}")]
    Truncated {
        /// 请求地址.
        url: String,
        /// 声明的长度.
        expected: u64,
        /// 实际长度.
        got: u64,
    },

    /// 本地写入下载内容失败.
    #[error("cannot store download at {}: {source}", .path.display())]
    Io {
        /// 本地路径.
        path: PathBuf,
        /// 底层错误.
        source: std::io::Error,
    },

    /// 归档损坏.
    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

/// 参数或配置错误.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// 病例名无法解析出编号. 该目录项被跳过.
    #[error("malformed case name `{0}`")]
    MalformedCaseName(String),

    /// 编号范围为空.
    #[error("invalid case range {start}..={end}")]
    InvalidRange {
        /// 起始编号.
        start: u32,
        /// 结束编号.
        end: u32,
    },

    /// 显式病例名单中没有任何名字.
    #[error("case name list is empty")]
    EmptyCaseList,

    /// 平滑松弛因子必须为 `[0, 1]` 内的有限值.
    #[error("invalid relaxation factor {0}")]
    InvalidRelaxation(f64),

    /// 标签组中包含背景标签.
    #[error("label group `{0}` contains the background label")]
    GroupContainsBackground(String),

    /// 同一个标签属于多个组.
    #[error("label {code} belongs to both `{first}` and `{second}`")]
    OverlappingGroups {
        /// 标签值.
        code: crate::LabelCode,
        /// 第一个组名.
        first: String,
        /// 第二个组名.
        second: String,
    },

    /// 标签字典中出现重复标签或重名.
    #[error("duplicate label dictionary entry `{0}`")]
    DuplicateLabel(String),
}

/// 整批运行级别的错误, 会中断整个运行.
#[derive(Debug, Error)]
pub enum Error {
    /// 输入根目录不可访问.
    #[error("input root {} is not accessible: {source}", .path.display())]
    InputRoot {
        /// 输入根目录.
        path: PathBuf,
        /// 底层错误.
        source: std::io::Error,
    },

    /// 输出根目录不可创建或不可写.
    #[error("output root {} is not writable: {source}", .path.display())]
    OutputRoot {
        /// 输出根目录.
        path: PathBuf,
        /// 底层错误.
        source: std::io::Error,
    },

    /// 配置错误.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
