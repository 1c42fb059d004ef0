use std::collections::HashMap;

use super::{cross, dot, sub, Mesh};
use crate::consts::ISO_LEVEL;
use crate::data::{BinaryMask, VolumeAttr};
use crate::Point3;

/// 等值面提取参数.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IsoConfig {
    /// 是否在体数据外围补一层 0, 使接触边界的组织也得到封闭表面.
    pub close_boundary: bool,
}

impl Default for IsoConfig {
    #[inline]
    fn default() -> Self {
        Self {
            close_boundary: true,
        }
    }
}

/// 立方体 8 个角点的偏移 `(z, y, x)`. 第 `b` 个角点: bit0 = x, bit1 = y, bit2 = z.
const CORNERS: [(i64, i64, i64); 8] = [
    (0, 0, 0),
    (0, 0, 1),
    (0, 1, 0),
    (0, 1, 1),
    (1, 0, 0),
    (1, 0, 1),
    (1, 1, 0),
    (1, 1, 1),
];

/// 沿主对角线 0 -> 7 的 6 四面体剖分. 对所有立方体相同, 相邻立方体的公共面剖分一致.
const TETS: [[usize; 4]; 6] = [
    [0, 1, 3, 7],
    [0, 1, 5, 7],
    [0, 2, 3, 7],
    [0, 2, 6, 7],
    [0, 4, 5, 7],
    [0, 4, 6, 7],
];

type Lattice = (i64, i64, i64);

/// 单次提取的状态: 共享边顶点表和输出.
struct Builder<'a> {
    mask: &'a BinaryMask,
    /// 补边后的格点维度, 用于生成全局唯一的格点编号.
    padded: (u64, u64, u64),
    index: HashMap<(u64, u64), u32>,
    vertices: Vec<Point3>,
    triangles: Vec<[u32; 3]>,
}

impl<'a> Builder<'a> {
    fn new(mask: &'a BinaryMask) -> Self {
        let (z, y, x) = mask.shape();
        Self {
            mask,
            padded: (z as u64 + 2, y as u64 + 2, x as u64 + 2),
            index: HashMap::new(),
            vertices: Vec::new(),
            triangles: Vec::new(),
        }
    }

    /// 格点值. 体数据之外恒为 0.
    #[inline]
    fn at(&self, (z, y, x): Lattice) -> bool {
        if z < 0 || y < 0 || x < 0 {
            return false;
        }
        let pos = (z as usize, y as usize, x as usize);
        self.mask.check(&pos) && self.mask[pos] != 0
    }

    #[inline]
    fn lattice_id(&self, (z, y, x): Lattice) -> u64 {
        let (_, py, px) = self.padded;
        ((z + 1) as u64 * py + (y + 1) as u64) * px + (x + 1) as u64
    }

    #[inline]
    fn world(&self, (z, y, x): (f64, f64, f64)) -> Point3 {
        self.mask.geometry().to_world(z, y, x)
    }

    #[inline]
    fn world_of(&self, p: Lattice) -> Point3 {
        self.world((p.0 as f64, p.1 as f64, p.2 as f64))
    }

    /// 边 `a`(内) - `b`(外) 上的等值点, 相邻单元共享.
    fn edge_vertex(&mut self, a: Lattice, b: Lattice) -> u32 {
        let (ia, ib) = (self.lattice_id(a), self.lattice_id(b));
        let key = (ia.min(ib), ia.max(ib));
        if let Some(&v) = self.index.get(&key) {
            return v;
        }
        // 二值场上线性插值的位置恒为 ISO_LEVEL.
        let t = ISO_LEVEL;
        let lerp = |u: i64, v: i64| u as f64 + t * (v - u) as f64;
        let p = self.world((lerp(a.0, b.0), lerp(a.1, b.1), lerp(a.2, b.2)));
        let id = self.vertices.len() as u32;
        self.vertices.push(p);
        self.index.insert(key, id);
        id
    }

    /// 按 "法向从内指向外" 的规则定向后输出多边形 (三角形或平面四边形).
    fn emit(&mut self, mut poly: Vec<u32>, inside: &[Lattice], outside: &[Lattice]) {
        let centroid = |pts: &[Lattice]| {
            let n = pts.len() as f64;
            let s = pts.iter().fold([0.0; 3], |acc, p| {
                let w = self.world_of(*p);
                [acc[0] + w[0], acc[1] + w[1], acc[2] + w[2]]
            });
            [s[0] / n, s[1] / n, s[2] / n]
        };
        let outward = sub(centroid(outside), centroid(inside));

        let [a, b, c] = [0, 1, 2].map(|k| self.vertices[poly[k] as usize]);
        if dot(cross(sub(b, a), sub(c, a)), outward) < 0.0 {
            poly.reverse();
        }
        for k in 1..poly.len() - 1 {
            self.triangles.push([poly[0], poly[k], poly[k + 1]]);
        }
    }

    fn march_tet(&mut self, corners: &[Lattice; 4]) {
        let (inside, outside): (Vec<Lattice>, Vec<Lattice>) =
            corners.iter().copied().partition(|p| self.at(*p));
        match inside.len() {
            1 => {
                let poly = outside
                    .iter()
                    .map(|b| self.edge_vertex(inside[0], *b))
                    .collect();
                self.emit(poly, &inside, &outside);
            }
            3 => {
                let poly = inside
                    .iter()
                    .map(|a| self.edge_vertex(*a, outside[0]))
                    .collect();
                self.emit(poly, &inside, &outside);
            }
            2 => {
                let (a1, a2, b1, b2) = (inside[0], inside[1], outside[0], outside[1]);
                let poly = vec![
                    self.edge_vertex(a1, b1),
                    self.edge_vertex(a1, b2),
                    self.edge_vertex(a2, b2),
                    self.edge_vertex(a2, b1),
                ];
                self.emit(poly, &inside, &outside);
            }
            _ => {}
        }
    }

    fn march_cube(&mut self, (z, y, x): Lattice) {
        let pts = CORNERS.map(|(dz, dy, dx)| (z + dz, y + dy, x + dx));
        let inside = pts.iter().filter(|p| self.at(**p)).count();
        if inside == 0 || inside == 8 {
            return;
        }
        for tet in TETS.iter() {
            self.march_tet(&tet.map(|k| pts[k]));
        }
    }

    fn finish(self) -> Mesh {
        Mesh::new(self.vertices, self.triangles)
    }
}

/// 在体素中心格点上提取 `mask` 0/1 之间的等值面 (阈值 0.5).
///
/// 每个格点立方体被剖分为 6 个四面体分别处理 (marching tetrahedra), 相邻单元共享边上的顶点.
/// 三角形法向指向掩膜外部. `config.close_boundary` 为 `true` 时输出总是封闭的.
///
/// 只遍历掩膜包围盒外扩一格的范围.
pub fn extract_isosurface(mask: &BinaryMask, config: &IsoConfig) -> Mesh {
    let ((z0, y0, x0), (z1, y1, x1)) = mask.bbox();
    let (dz, dy, dx) = mask.shape();

    // 立方体以其最小角点标识, 覆盖 [c, c + 1].
    let range = |lo: usize, hi: usize, dim: usize| {
        let (lo, hi) = (lo as i64 - 1, hi as i64);
        if config.close_boundary {
            lo..=hi
        } else {
            lo.max(0)..=hi.min(dim as i64 - 2)
        }
    };

    let mut builder = Builder::new(mask);
    for z in range(z0, z1, dz) {
        for y in range(y0, y1, dy) {
            for x in range(x0, x1, dx) {
                builder.march_cube((z, y, x));
            }
        }
    }
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::VolumeGeometry;
    use approx::assert_relative_eq;
    use ndarray::Array3;

    fn box_mask(geometry: VolumeGeometry) -> BinaryMask {
        let mut data = Array3::<u8>::zeros((6, 5, 7));
        for z in 1..=4 {
            for y in 1..=3 {
                for x in 2..=4 {
                    data[(z, y, x)] = 1;
                }
            }
        }
        BinaryMask::from_array(data, geometry).unwrap()
    }

    #[test]
    fn test_box_is_closed_and_tight() {
        let geometry = VolumeGeometry::new([0.5, 1.0, 2.0], [10.0, -5.0, 3.0]);
        let mask = box_mask(geometry);
        let mesh = extract_isosurface(&mask, &IsoConfig::default());

        assert!(!mesh.is_empty());
        assert!(mesh.is_watertight());
        assert!(mesh.edge_usage().values().all(|n| *n == 2));

        // 表面位于体素包围盒外扩半个体素处.
        let (lo, hi) = mesh.bounds().unwrap();
        assert_relative_eq!(lo[0], 10.0 + 1.5 * 0.5);
        assert_relative_eq!(hi[0], 10.0 + 4.5 * 0.5);
        assert_relative_eq!(lo[1], -5.0 + 0.5);
        assert_relative_eq!(hi[1], -5.0 + 3.5);
        assert_relative_eq!(lo[2], 3.0 + 0.5 * 2.0);
        assert_relative_eq!(hi[2], 3.0 + 4.5 * 2.0);

        let full = mask.volume_mm3();
        let v = mesh.signed_volume();
        assert!(v > 0.75 * full && v <= full, "{v} vs {full}");
    }

    #[test]
    fn test_normals_point_outward() {
        let mask = box_mask(VolumeGeometry::default());
        let mesh = extract_isosurface(&mask, &IsoConfig::default());
        let center = [3.0, 2.0, 2.5];
        for i in 0..mesh.triangle_count() {
            let [a, b, c] = mesh.corners(i);
            let centroid = [
                (a[0] + b[0] + c[0]) / 3.0,
                (a[1] + b[1] + c[1]) / 3.0,
                (a[2] + b[2] + c[2]) / 3.0,
            ];
            assert!(dot(mesh.triangle_normal(i), sub(centroid, center)) > 0.0);
        }
    }

    #[test]
    fn test_border_touching_mask() {
        let data = Array3::<u8>::ones((2, 3, 4));
        let mask = BinaryMask::from_array(data, VolumeGeometry::default()).unwrap();

        let closed = extract_isosurface(&mask, &IsoConfig::default());
        assert!(closed.is_watertight());
        assert!(closed.signed_volume() > 0.75 * 24.0);

        // 不补边时整块掩膜内部没有任何 0/1 界面.
        let open = extract_isosurface(
            &mask,
            &IsoConfig {
                close_boundary: false,
            },
        );
        assert!(open.is_empty());
    }

    #[test]
    fn test_open_boundary_surface() {
        let mut data = Array3::<u8>::zeros((3, 3, 3));
        data.slice_mut(ndarray::s![0, .., ..]).fill(1);
        let mask = BinaryMask::from_array(data, VolumeGeometry::default()).unwrap();
        let mesh = extract_isosurface(
            &mask,
            &IsoConfig {
                close_boundary: false,
            },
        );
        assert!(!mesh.is_empty());
        assert!(!mesh.is_watertight());
        // 只剩 z = 0.5 处的一层.
        assert!(mesh.vertices().iter().all(|p| p[2] == 0.5));
    }

    #[test]
    fn test_separate_components() {
        let mut data = Array3::<u8>::zeros((3, 3, 7));
        data[(1, 1, 1)] = 1;
        data[(1, 1, 5)] = 1;
        let mask = BinaryMask::from_array(data, VolumeGeometry::default()).unwrap();
        let mesh = extract_isosurface(&mask, &IsoConfig::default());
        assert!(mesh.is_watertight());
        assert_eq!(mesh.triangle_count(), 48);
        assert_relative_eq!(mesh.signed_volume(), 1.0, epsilon = 1e-9);
    }
}
