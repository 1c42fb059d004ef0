use std::path::PathBuf;

use crate::data::LabelVolume;
use crate::error::ReadError;

/// 体素标签图加载器. 按顺序逐个打开文件, 每次只在内存中保留一个体数据.
pub struct VolumeLoader {
    paths_rev: Vec<PathBuf>,
}

impl VolumeLoader {
    /// 从文件路径序列创建加载器.
    pub fn new<I: IntoIterator<Item = PathBuf>>(paths: I) -> Self {
        let mut paths_rev: Vec<PathBuf> = paths.into_iter().collect();
        paths_rev.reverse();
        Self { paths_rev }
    }
}

impl Iterator for VolumeLoader {
    type Item = (PathBuf, Result<LabelVolume, ReadError>);

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.paths_rev.pop()?;
        let data = LabelVolume::open(&path);
        Some((path, data))
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.paths_rev.len(), Some(self.paths_rev.len()))
    }
}

impl ExactSizeIterator for VolumeLoader {
    #[inline]
    fn len(&self) -> usize {
        self.paths_rev.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{write_meta_image, VolumeGeometry};
    use ndarray::Array3;

    #[test]
    fn test_loader_order_and_errors() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("a.mha");
        let v = LabelVolume::new(Array3::ones((1, 2, 2)), VolumeGeometry::default());
        write_meta_image(&v, &good, false).unwrap();
        let missing = dir.path().join("b.mha");

        let mut loader = VolumeLoader::new([good.clone(), missing.clone()]);
        assert_eq!(loader.len(), 2);

        let (p, r) = loader.next().unwrap();
        assert_eq!(p, good);
        assert_eq!(r.unwrap().count(1), 4);

        let (p, r) = loader.next().unwrap();
        assert_eq!(p, missing);
        assert!(matches!(r, Err(ReadError::NotFound { .. })));
        assert!(loader.next().is_none());
    }
}
