use std::collections::HashMap;

use super::{add, dot, norm, scale, sub, Mesh};
use crate::consts::{DEFAULT_FEATURE_ANGLE, DEFAULT_RELAXATION_FACTOR, DEFAULT_SMOOTH_ITERATIONS};
use crate::error::ConfigError;
use crate::Point3;

/// Laplacian 平滑参数.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SmoothConfig {
    /// 最大迭代次数.
    pub iterations: u32,

    /// 松弛因子, 每次迭代顶点向邻居均值移动的比例. 取值 `[0, 1]`.
    pub relaxation: f64,

    /// 是否平滑边界顶点 (沿边界方向).
    pub boundary_smoothing: bool,

    /// 是否识别尖锐特征边并沿特征边平滑.
    pub feature_edge_smoothing: bool,

    /// 特征边二面角阈值, 以度为单位.
    pub feature_angle: f64,

    /// 收敛阈值, 相对包围盒对角线. 单次迭代最大位移不超过该值时提前停止.
    pub convergence: f64,
}

impl Default for SmoothConfig {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_SMOOTH_ITERATIONS,
            relaxation: DEFAULT_RELAXATION_FACTOR,
            boundary_smoothing: true,
            feature_edge_smoothing: false,
            feature_angle: DEFAULT_FEATURE_ANGLE,
            convergence: 0.0,
        }
    }
}

impl SmoothConfig {
    /// 以给定迭代次数和松弛因子构建, 其余参数取默认值.
    pub fn new(iterations: u32, relaxation: f64) -> Result<Self, ConfigError> {
        let ans = Self {
            iterations,
            relaxation,
            ..Self::default()
        };
        ans.validate()?;
        Ok(ans)
    }

    /// 检查参数是否合法.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.relaxation.is_finite() && (0.0..=1.0).contains(&self.relaxation) {
            Ok(())
        } else {
            Err(ConfigError::InvalidRelaxation(self.relaxation))
        }
    }
}

/// 单个顶点在平滑中的角色.
#[derive(Debug, Clone, PartialEq)]
enum Role {
    /// 不移动.
    Fixed,

    /// 向给定邻居的均值移动.
    Towards(Vec<u32>),
}

/// 按边的使用情况和特征角对所有顶点分类.
fn classify(mesh: &Mesh, config: &SmoothConfig) -> Vec<Role> {
    let n = mesh.vertex_count();
    let usage = mesh.edge_usage();

    // 每条内部边所在的两个三角形, 用于计算二面角.
    let mut faces: HashMap<(u32, u32), Vec<usize>> = HashMap::new();
    if config.feature_edge_smoothing {
        for (i, t) in mesh.triangles().iter().enumerate() {
            for k in 0..3 {
                let (a, b) = (t[k], t[(k + 1) % 3]);
                faces.entry((a.min(b), a.max(b))).or_default().push(i);
            }
        }
    }
    let cos_feature = config.feature_angle.to_radians().cos();

    let mut all = vec![Vec::new(); n];
    let mut boundary = vec![Vec::new(); n];
    let mut feature = vec![Vec::new(); n];
    let mut non_manifold = vec![false; n];

    for (&(a, b), &count) in usage.iter() {
        let (ua, ub) = (a as usize, b as usize);
        all[ua].push(b);
        all[ub].push(a);
        match count {
            1 => {
                boundary[ua].push(b);
                boundary[ub].push(a);
            }
            2 if config.feature_edge_smoothing => {
                let f = &faces[&(a, b)];
                let c = dot(mesh.triangle_normal(f[0]), mesh.triangle_normal(f[1]));
                if c < cos_feature {
                    feature[ua].push(b);
                    feature[ub].push(a);
                }
            }
            2 => {}
            _ => {
                non_manifold[ua] = true;
                non_manifold[ub] = true;
            }
        }
    }

    (0..n)
        .map(|v| {
            if non_manifold[v] || all[v].is_empty() {
                Role::Fixed
            } else if !boundary[v].is_empty() {
                if config.boundary_smoothing && boundary[v].len() == 2 {
                    Role::Towards(std::mem::take(&mut boundary[v]))
                } else {
                    Role::Fixed
                }
            } else if !feature[v].is_empty() {
                if feature[v].len() == 2 {
                    Role::Towards(std::mem::take(&mut feature[v]))
                } else {
                    Role::Fixed
                }
            } else {
                Role::Towards(std::mem::take(&mut all[v]))
            }
        })
        .collect()
}

/// 对 `mesh` 做 Jacobi 式 Laplacian 平滑, 返回新网格. 拓扑保持不变.
///
/// 每次迭代中, 可移动顶点 `p` 移动到 `p + relaxation * (mean(邻居) - p)`.
/// 边界顶点沿边界平滑 (或固定), 非流形边上的顶点固定.
/// 开启特征边平滑时, 二面角超过 `feature_angle` 的边被视为特征边:
/// 恰在两条特征边上的顶点沿特征边平滑, 其余特征顶点固定.
///
/// 调用方应先用 [`SmoothConfig::validate`] 检查参数.
pub fn smooth(mesh: &Mesh, config: &SmoothConfig) -> Mesh {
    debug_assert!(config.validate().is_ok());
    if mesh.is_empty() || config.iterations == 0 || config.relaxation == 0.0 {
        return mesh.clone();
    }

    let roles = classify(mesh, config);
    let tolerance = config.convergence * mesh.diagonal();
    let mut current: Vec<Point3> = mesh.vertices().to_vec();

    for it in 0..config.iterations {
        let mut next = current.clone();
        let mut max_move = 0.0f64;
        for (v, role) in roles.iter().enumerate() {
            let Role::Towards(neighbours) = role else {
                continue;
            };
            let sum = neighbours
                .iter()
                .fold([0.0; 3], |acc, u| add(acc, current[*u as usize]));
            let mean = scale(sum, 1.0 / neighbours.len() as f64);
            let delta = scale(sub(mean, current[v]), config.relaxation);
            next[v] = add(current[v], delta);
            max_move = max_move.max(norm(delta));
        }
        current = next;
        if max_move <= tolerance {
            log::trace!("smoothing converged after {} iterations", it + 1);
            break;
        }
    }
    mesh.with_vertices(current)
}
