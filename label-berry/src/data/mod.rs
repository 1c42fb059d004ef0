use std::collections::BTreeMap;
use std::ops::Index;
use std::path::Path;

use ndarray::{Array3, ArrayView, Ix3};

use crate::consts::label::is_background;
use crate::error::ReadError;
use crate::{Idx3d, LabelCode, Point3};

mod mask;
mod meta_image;
mod nifti_io;

pub use mask::BinaryMask;
pub use meta_image::write_meta_image;

/// 体数据的物理几何信息: 体素间距和原点.
///
/// 两者都按世界坐标 `[x, y, z]` 顺序存储, 单位一般为毫米.
/// 方向余弦不参与坐标计算.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VolumeGeometry {
    /// 体素间距 `[x, y, z]`.
    pub spacing: Point3,

    /// 第一个体素中心的世界坐标 `[x, y, z]`.
    pub origin: Point3,
}

impl Default for VolumeGeometry {
    #[inline]
    fn default() -> Self {
        Self {
            spacing: [1.0; 3],
            origin: [0.0; 3],
        }
    }
}

impl VolumeGeometry {
    /// 由间距和原点构造.
    #[inline]
    pub const fn new(spacing: Point3, origin: Point3) -> Self {
        Self { spacing, origin }
    }

    /// 将 (可为小数的) `(z, y, x)` 体素坐标转换为世界坐标.
    #[inline]
    pub fn to_world(&self, z: f64, y: f64, x: f64) -> Point3 {
        [
            self.origin[0] + x * self.spacing[0],
            self.origin[1] + y * self.spacing[1],
            self.origin[2] + z * self.spacing[2],
        ]
    }
}

/// 体数据文件格式.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum VolumeFormat {
    /// MetaImage, 文件头与数据在同一文件 (`.mha`).
    MetaImage,

    /// MetaImage, 文件头指向独立的数据文件 (`.mhd`).
    MetaHeader,

    /// NIfTI-1 (`.nii`, `.nii.gz`).
    Nifti,
}

impl VolumeFormat {
    /// 根据文件名识别格式. 无法识别时返回 `None`.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        let name = path.as_ref().file_name()?.to_str()?.to_ascii_lowercase();
        if name.ends_with(".mha") {
            Some(Self::MetaImage)
        } else if name.ends_with(".mhd") {
            Some(Self::MetaHeader)
        } else if name.ends_with(".nii") || name.ends_with(".nii.gz") {
            Some(Self::Nifti)
        } else {
            None
        }
    }

    /// 去掉格式扩展名后的文件名.
    pub fn stem_of<P: AsRef<Path>>(path: P) -> Option<String> {
        let name = path.as_ref().file_name()?.to_str()?;
        let lower = name.to_ascii_lowercase();
        let cut = [".nii.gz", ".nii", ".mha", ".mhd"]
            .iter()
            .find(|ext| lower.ends_with(*ext))
            .map_or(name.len(), |ext| name.len() - ext.len());
        Some(name[..cut].to_string())
    }
}

/// 3D 体数据的共用属性和部分通用操作.
pub trait VolumeAttr {
    /// 获取几何信息.
    fn geometry(&self) -> &VolumeGeometry;

    /// 获取数据形状大小 `(z, y, x)`.
    fn shape(&self) -> Idx3d;

    /// 获取数据体素个数.
    #[inline]
    fn size(&self) -> usize {
        let (z, h, w) = self.shape();
        z * h * w
    }

    /// 检查索引是否合法.
    #[inline]
    fn check(&self, (z0, h0, w0): &Idx3d) -> bool {
        let (z, h, w) = self.shape();
        *z0 < z && *h0 < h && *w0 < w
    }

    /// 获取单个体素分辨率, 按 `[z, y, x]` 顺序.
    #[inline]
    fn pix_dim(&self) -> [f64; 3] {
        let [x, y, z] = self.geometry().spacing;
        [z, y, x]
    }

    /// 体素分辨率在三个维度上是否是各向同的?
    #[inline]
    fn is_isotropic(&self) -> bool {
        let [z, h, w] = self.pix_dim();
        z == h && z == w
    }

    /// 获取体素的实际体积值, 以立方毫米为单位.
    #[inline]
    fn voxel(&self) -> f64 {
        self.pix_dim().iter().product()
    }

    /// 获取体素 `pos` 中心的世界坐标.
    #[inline]
    fn world_position(&self, (z, y, x): Idx3d) -> Point3 {
        self.geometry().to_world(z as f64, y as f64, x as f64)
    }
}

/// 3D 体素标签图. 标签值以 `i16` 保存, 数据按 `(z, y, x)` 行优先存储.
#[derive(Debug, Clone)]
pub struct LabelVolume {
    geometry: VolumeGeometry,
    data: Array3<LabelCode>,
}

impl VolumeAttr for LabelVolume {
    #[inline]
    fn geometry(&self) -> &VolumeGeometry {
        &self.geometry
    }

    #[inline]
    fn shape(&self) -> Idx3d {
        self.data.dim()
    }
}

impl Index<Idx3d> for LabelVolume {
    type Output = LabelCode;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl LabelVolume {
    /// 根据 `(z, y, x)` 顺序的标签数据和几何信息直接创建.
    #[inline]
    pub fn new(data: Array3<LabelCode>, geometry: VolumeGeometry) -> Self {
        Self { geometry, data }
    }

    /// 打开体素标签图. 格式由文件名决定, 见 [`VolumeFormat::from_path`].
    ///
    /// 文件不存在、格式不支持、内容损坏时返回 `Err`. 除读取外没有其他副作用.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ReadError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ReadError::NotFound {
                path: path.to_path_buf(),
            });
        }
        match VolumeFormat::from_path(path) {
            Some(VolumeFormat::MetaImage | VolumeFormat::MetaHeader) => meta_image::read(path),
            Some(VolumeFormat::Nifti) => nifti_io::read(path),
            None => Err(ReadError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, LabelCode, Ix3> {
        self.data.view()
    }

    /// 获取 3D 标签中值为 `label` 的体素个数.
    #[inline]
    pub fn count(&self, label: LabelCode) -> usize {
        self.data.iter().filter(|p| **p == label).count()
    }

    /// 统计每个标签值的体素个数, 按标签值升序.
    pub fn histogram(&self) -> BTreeMap<LabelCode, usize> {
        let mut ans = BTreeMap::new();
        for &pixel in self.data.iter() {
            *ans.entry(pixel).or_insert(0usize) += 1;
        }
        ans
    }

    /// 该体数据中出现过的所有非背景标签, 升序.
    pub fn foreground_labels(&self) -> Vec<LabelCode> {
        self.histogram()
            .into_keys()
            .filter(|p| !is_background(*p))
            .collect()
    }
}
