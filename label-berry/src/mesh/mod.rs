//! 三角网格及其上的操作: 等值面提取、平滑、STL 读写.

use std::collections::{HashMap, HashSet};

use crate::Point3;

mod iso;
mod smooth;
mod stl;

pub use iso::{extract_isosurface, IsoConfig};
pub use smooth::{smooth, SmoothConfig};
pub use stl::{read_stl, write_stl, StlFormat};

/// 世界坐标系下的带索引三角网格.
///
/// 三角形按右手法则定向, 由等值面提取得到的网格法向指向掩膜外部.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    vertices: Vec<Point3>,
    triangles: Vec<[u32; 3]>,
}

impl Mesh {
    /// 由顶点和三角形索引直接创建.
    ///
    /// # 注意
    ///
    /// 调用方保证所有索引都小于顶点个数, 否则后续操作会 panic.
    #[inline]
    pub fn new(vertices: Vec<Point3>, triangles: Vec<[u32; 3]>) -> Self {
        debug_assert!(triangles
            .iter()
            .flatten()
            .all(|i| (*i as usize) < vertices.len()));
        Self {
            vertices,
            triangles,
        }
    }

    /// 空网格.
    #[inline]
    pub fn empty() -> Self {
        Self::default()
    }

    /// 是否没有任何三角形?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// 顶点个数.
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// 三角形个数.
    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// 所有顶点.
    #[inline]
    pub fn vertices(&self) -> &[Point3] {
        &self.vertices
    }

    /// 所有三角形.
    #[inline]
    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.triangles
    }

    /// 第 `i` 个三角形的三个顶点坐标.
    #[inline]
    pub fn corners(&self, i: usize) -> [Point3; 3] {
        let [a, b, c] = self.triangles[i];
        [
            self.vertices[a as usize],
            self.vertices[b as usize],
            self.vertices[c as usize],
        ]
    }

    /// 第 `i` 个三角形的单位法向 (右手法则). 退化三角形返回零向量.
    pub fn triangle_normal(&self, i: usize) -> Point3 {
        let [a, b, c] = self.corners(i);
        normalize(cross(sub(b, a), sub(c, a)))
    }

    /// 轴对齐包围盒 `(min, max)`. 没有顶点时返回 `None`.
    pub fn bounds(&self) -> Option<(Point3, Point3)> {
        let first = *self.vertices.first()?;
        Some(self.vertices.iter().fold((first, first), |(lo, hi), p| {
            (
                [lo[0].min(p[0]), lo[1].min(p[1]), lo[2].min(p[2])],
                [hi[0].max(p[0]), hi[1].max(p[1]), hi[2].max(p[2])],
            )
        }))
    }

    /// 包围盒对角线长度. 没有顶点时为 0.
    pub fn diagonal(&self) -> f64 {
        self.bounds().map_or(0.0, |(lo, hi)| norm(sub(hi, lo)))
    }

    /// 表面积.
    pub fn area(&self) -> f64 {
        (0..self.triangle_count())
            .map(|i| {
                let [a, b, c] = self.corners(i);
                0.5 * norm(cross(sub(b, a), sub(c, a)))
            })
            .sum()
    }

    /// 有向体积 (散度定理). 对法向朝外的封闭网格为正.
    pub fn signed_volume(&self) -> f64 {
        (0..self.triangle_count())
            .map(|i| {
                let [a, b, c] = self.corners(i);
                dot(a, cross(b, c)) / 6.0
            })
            .sum()
    }

    /// 每条无向边被多少个三角形使用. 键为 `(小索引, 大索引)`.
    pub fn edge_usage(&self) -> HashMap<(u32, u32), usize> {
        let mut ans = HashMap::with_capacity(self.triangles.len() * 3 / 2);
        for t in self.triangles.iter() {
            for k in 0..3 {
                let (a, b) = (t[k], t[(k + 1) % 3]);
                *ans.entry((a.min(b), a.max(b))).or_insert(0usize) += 1;
            }
        }
        ans
    }

    /// 网格是否封闭且定向一致?
    ///
    /// 即每条无向边恰好被两个三角形使用, 且两次方向相反.
    pub fn is_watertight(&self) -> bool {
        let mut directed = HashSet::with_capacity(self.triangles.len() * 3);
        for t in self.triangles.iter() {
            for k in 0..3 {
                let e = (t[k], t[(k + 1) % 3]);
                if !directed.insert(e) {
                    return false;
                }
            }
        }
        directed.iter().all(|(a, b)| directed.contains(&(*b, *a)))
    }

    /// 合并距离在 `tolerance` 之内的顶点 (按 `tolerance` 网格量化), 并丢弃因此退化的三角形.
    ///
    /// `tolerance <= 0` 时只合并坐标完全相同的顶点.
    pub fn weld(&self, tolerance: f64) -> Self {
        let key = |p: &Point3| -> [i64; 3] {
            if tolerance > 0.0 {
                p.map(|v| (v / tolerance).round() as i64)
            } else {
                p.map(|v| v.to_bits() as i64)
            }
        };

        let mut index: HashMap<[i64; 3], u32> = HashMap::new();
        let mut vertices = Vec::new();
        let remap: Vec<u32> = self
            .vertices
            .iter()
            .map(|p| {
                *index.entry(key(p)).or_insert_with(|| {
                    vertices.push(*p);
                    (vertices.len() - 1) as u32
                })
            })
            .collect();

        let triangles = self
            .triangles
            .iter()
            .map(|t| t.map(|i| remap[i as usize]))
            .filter(|[a, b, c]| a != b && b != c && a != c)
            .collect();
        Self {
            vertices,
            triangles,
        }
    }

    /// 按顶点下标变换所有顶点坐标, 拓扑不变.
    pub(crate) fn with_vertices(&self, vertices: Vec<Point3>) -> Self {
        debug_assert_eq!(vertices.len(), self.vertices.len());
        Self {
            vertices,
            triangles: self.triangles.clone(),
        }
    }
}

#[inline]
pub(crate) fn sub(a: Point3, b: Point3) -> Point3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
pub(crate) fn add(a: Point3, b: Point3) -> Point3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

#[inline]
pub(crate) fn scale(a: Point3, k: f64) -> Point3 {
    [a[0] * k, a[1] * k, a[2] * k]
}

#[inline]
pub(crate) fn dot(a: Point3, b: Point3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub(crate) fn cross(a: Point3, b: Point3) -> Point3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

#[inline]
pub(crate) fn norm(a: Point3) -> f64 {
    dot(a, a).sqrt()
}

#[inline]
pub(crate) fn normalize(a: Point3) -> Point3 {
    let n = norm(a);
    if n > 0.0 {
        scale(a, 1.0 / n)
    } else {
        [0.0; 3]
    }
}
