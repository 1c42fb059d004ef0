use std::ops::Index;

use ndarray::{Array3, ArrayView, Ix3};

use super::{LabelVolume, VolumeAttr, VolumeGeometry};
use crate::{Idx3d, LabelCode};

/// 单个组织 (或组织组) 的二值掩膜. 1 表示选中, 0 表示未选中.
///
/// 掩膜总是非空的: 空掩膜由 [`BinaryMask::build`] 以 `None` 表示.
#[derive(Debug, Clone)]
pub struct BinaryMask {
    geometry: VolumeGeometry,
    data: Array3<u8>,
    count: usize,
    bbox: (Idx3d, Idx3d),
}

impl VolumeAttr for BinaryMask {
    #[inline]
    fn geometry(&self) -> &VolumeGeometry {
        &self.geometry
    }

    #[inline]
    fn shape(&self) -> Idx3d {
        self.data.dim()
    }
}

impl Index<Idx3d> for BinaryMask {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl BinaryMask {
    /// 由 `volume` 中值属于 `codes` 的体素构建掩膜. 没有任何体素命中时返回 `None`.
    pub fn build(volume: &LabelVolume, codes: &[LabelCode]) -> Option<Self> {
        let mut count = 0usize;
        let mut lo = (usize::MAX, usize::MAX, usize::MAX);
        let mut hi = (0usize, 0usize, 0usize);

        let data = Array3::from_shape_fn(volume.shape(), |pos| {
            if codes.contains(&volume[pos]) {
                count += 1;
                lo = (lo.0.min(pos.0), lo.1.min(pos.1), lo.2.min(pos.2));
                hi = (hi.0.max(pos.0), hi.1.max(pos.1), hi.2.max(pos.2));
                1
            } else {
                0
            }
        });

        (count > 0).then(|| Self {
            geometry: *volume.geometry(),
            data,
            count,
            bbox: (lo, hi),
        })
    }

    /// 直接由 0/1 数据构建, 主要用于测试和合成数据. 非零值视为 1.
    pub fn from_array(data: Array3<u8>, geometry: VolumeGeometry) -> Option<Self> {
        let volume = LabelVolume::new(data.mapv(|v| (v != 0) as LabelCode), geometry);
        Self::build(&volume, &[1])
    }

    /// 被选中的体素个数. 总是大于 0.
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    /// 被选中体素的包围盒 `(最小索引, 最大索引)`, 两端都包含.
    #[inline]
    pub fn bbox(&self) -> (Idx3d, Idx3d) {
        self.bbox
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, u8, Ix3> {
        self.data.view()
    }

    /// 被选中区域的体积, 以立方毫米为单位.
    #[inline]
    pub fn volume_mm3(&self) -> f64 {
        self.count as f64 * self.voxel()
    }
}
