//! NIfTI-1 (`.nii`, `.nii.gz`) 体素标签图读取.

use std::path::Path;

use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use ndarray::Array3;

use super::{LabelVolume, VolumeGeometry};
use crate::error::ReadError;
use crate::{Idx3d, LabelCode, Point3};

fn shape_of(header: &NiftiHeader) -> Idx3d {
    // [W, H, z]. 体素个数数组.
    let [_, w, h, z, ..] = header.dim;
    (z as usize, h as usize, w as usize)
}

/// 原点: 优先使用 qform 偏移, 其次 sform 平移分量, 否则为 0.
fn origin_of(h: &NiftiHeader) -> Point3 {
    if h.qform_code > 0 {
        [h.quatern_x as f64, h.quatern_y as f64, h.quatern_z as f64]
    } else if h.sform_code > 0 {
        [h.srow_x[3] as f64, h.srow_y[3] as f64, h.srow_z[3] as f64]
    } else {
        [0.0; 3]
    }
}

fn spacing_of(header: &NiftiHeader) -> Point3 {
    let [_, w, h, z, ..] = header.pixdim;
    // 负号只表示方向, 取绝对值; 部分文件会把未使用的 pixdim 置 0.
    let fix = |v: f32| {
        let v = v.abs() as f64;
        if v > 0.0 && v.is_finite() {
            v
        } else {
            1.0
        }
    };
    [fix(w), fix(h), fix(z)]
}

pub(super) fn read(path: &Path) -> Result<LabelVolume, ReadError> {
    let wrap = |source| ReadError::Nifti {
        path: path.to_path_buf(),
        source,
    };
    let obj = ReaderOptions::new().read_file(path).map_err(wrap)?;
    let header = obj.header().clone();
    if header.dim[0] != 3 {
        return Err(ReadError::invalid(
            path,
            format!("expected a 3D volume, got {} dimensions", header.dim[0]),
        ));
    }

    // [W, H, z] -> [z, H, W].
    let data = obj
        .into_volume()
        .into_ndarray::<f64>()
        .map_err(wrap)?
        .permuted_axes([2, 1, 0].as_slice());

    let mut values = Vec::with_capacity(data.len());
    for &v in data.as_standard_layout().iter() {
        if v.fract() != 0.0 || v < LabelCode::MIN as f64 || v > LabelCode::MAX as f64 {
            return Err(ReadError::invalid(
                path,
                format!("voxel value {v} is not a valid integer label"),
            ));
        }
        values.push(v as LabelCode);
    }

    let data = Array3::<LabelCode>::from_shape_vec(shape_of(&header), values)
        .map_err(|e| ReadError::invalid(path, e.to_string()))?;

    let geometry = VolumeGeometry::new(spacing_of(&header), origin_of(&header));
    Ok(LabelVolume::new(data, geometry))
}
