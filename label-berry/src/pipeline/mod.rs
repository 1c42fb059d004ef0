//! 批量转换: 病例 -> 体数据文件 -> 组织 -> STL 网格.
//!
//! 每个组织依次经过 "二值化 -> 等值面提取 -> (可选) 平滑 -> 写出".
//! 读取失败只影响该文件, 写出失败中止该病例剩余的写出. 不同病例的输出目录互不相交.

use std::fs;
use std::path::{Path, PathBuf};

use itertools::Itertools;

use crate::consts::MESH_EXT;
use crate::data::{BinaryMask, LabelVolume, VolumeFormat};
use crate::dataset::CaseDir;
use crate::error::{ConfigError, Error, VolumeError, WriteError};
use crate::labels::{ExtractionPlan, LabelDictionary, LabelGroups, Target};
use crate::mesh::{extract_isosurface, smooth, write_stl, IsoConfig, SmoothConfig, StlFormat};

mod report;

pub use report::{CaseReport, SkipReason, TissueReport, TissueStatus, VolumeReport};

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
    }
}

/// 转换参数.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConvertOptions {
    /// 输出根目录. 每个病例输出到 `{output_dir}/{病例名}/`.
    pub output_dir: PathBuf,

    /// 平滑参数, `None` 表示不平滑.
    pub smooth: Option<SmoothConfig>,

    /// 是否按组合并组织.
    pub lump: bool,

    /// 输出格式.
    pub format: StlFormat,

    /// 输出文件已存在时是否保留并跳过.
    pub skip_existing: bool,

    /// 等值面提取参数.
    pub iso: IsoConfig,
}

impl ConvertOptions {
    /// 以默认参数输出到 `output_dir`.
    pub fn new<P: Into<PathBuf>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.into(),
            smooth: Some(SmoothConfig::default()),
            lump: true,
            format: StlFormat::default(),
            skip_existing: false,
            iso: IsoConfig::default(),
        }
    }
}

impl Default for ConvertOptions {
    /// 输出到 `{用户主目录}/dataset/breast/stl`.
    fn default() -> Self {
        Self::new(
            crate::dataset::home_dataset_dir_with(["breast", "stl"])
                .unwrap_or_else(|| PathBuf::from("stl")),
        )
    }
}

/// 体素标签图到组织网格的转换器.
///
/// 标签字典和分组在创建时注入, 之后不再改变. 转换器本身不持有任何可变状态,
/// 因此可以在多个线程间共享.
#[derive(Debug, Clone)]
pub struct Converter {
    labels: LabelDictionary,
    groups: LabelGroups,
    options: ConvertOptions,
    plan: ExtractionPlan,
}

impl Converter {
    /// 创建转换器, 并计算提取计划. 平滑参数不合法时返回 `Err`.
    pub fn new(
        labels: LabelDictionary,
        groups: LabelGroups,
        options: ConvertOptions,
    ) -> Result<Self, ConfigError> {
        if let Some(cfg) = options.smooth.as_ref() {
            cfg.validate()?;
        }
        let plan = ExtractionPlan::new(&labels, &groups, options.lump);
        Ok(Self {
            labels,
            groups,
            options,
            plan,
        })
    }

    /// 标签字典.
    #[inline]
    pub fn labels(&self) -> &LabelDictionary {
        &self.labels
    }

    /// 组织分组.
    #[inline]
    pub fn groups(&self) -> &LabelGroups {
        &self.groups
    }

    /// 转换参数.
    #[inline]
    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    /// 提取计划.
    #[inline]
    pub fn plan(&self) -> &ExtractionPlan {
        &self.plan
    }

    /// 创建输出根目录. 失败时整个运行应当中止.
    pub fn prepare_output(&self) -> Result<(), Error> {
        let root = &self.options.output_dir;
        fs::create_dir_all(root).map_err(|source| Error::OutputRoot {
            path: root.clone(),
            source,
        })
    }

    /// 按提取计划转换单个体数据, 网格写入 `out_dir`.
    ///
    /// 空掩膜、空表面和已存在的输出被记录为跳过. 写出失败时中止该体数据剩余的组织.
    pub fn convert_volume(
        &self,
        volume: &LabelVolume,
        out_dir: &Path,
    ) -> Result<Vec<TissueReport>, WriteError> {
        let mut ans = Vec::with_capacity(self.plan.len());
        self.convert_volume_into(volume, out_dir, &mut ans)?;
        Ok(ans)
    }

    /// 同 [`Self::convert_volume`], 但出错时保留已完成组织的报告.
    fn convert_volume_into(
        &self,
        volume: &LabelVolume,
        out_dir: &Path,
        reports: &mut Vec<TissueReport>,
    ) -> Result<(), WriteError> {
        let unknown = volume
            .foreground_labels()
            .into_iter()
            .filter(|c| !self.labels.contains(*c))
            .collect_vec();
        if !unknown.is_empty() {
            log::warn!("Ignoring labels missing from the dictionary: {unknown:?}");
        }

        for target in self.plan.targets() {
            let path = out_dir.join(format!("{}.{MESH_EXT}", target.name));
            match self.convert_target(volume, target, &path) {
                Ok(status) => reports.push(TissueReport {
                    name: target.name.clone(),
                    codes: target.codes.clone(),
                    status,
                }),
                Err(e) => {
                    log::error!("Failed to write {}: {e}", path.display());
                    reports.push(TissueReport {
                        name: target.name.clone(),
                        codes: target.codes.clone(),
                        status: TissueStatus::Failed(e.to_string()),
                    });
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn convert_target(
        &self,
        volume: &LabelVolume,
        target: &Target,
        path: &Path,
    ) -> Result<TissueStatus, WriteError> {
        let kind = if target.codes.len() > 1 { "group" } else { "label" };

        if self.options.skip_existing && path.exists() {
            log::info!("Keeping existing {}", path.display());
            return Ok(TissueStatus::Skipped(SkipReason::AlreadyExists));
        }

        let Some(mask) = BinaryMask::build(volume, &target.codes) else {
            log::info!("No data found for {kind}: {}", target.name);
            return Ok(TissueStatus::Skipped(SkipReason::EmptyMask));
        };
        log::info!("Processing {kind}: {} {:?}", target.name, target.codes);

        let mut mesh = extract_isosurface(&mask, &self.options.iso);
        if mesh.is_empty() {
            log::info!("Empty surface for {kind}: {}", target.name);
            return Ok(TissueStatus::Skipped(SkipReason::EmptySurface));
        }
        if let Some(cfg) = self.options.smooth.as_ref() {
            mesh = smooth(&mesh, cfg);
        }

        write_stl(&mesh, path, &target.name, self.options.format)?;
        log::info!("Saved: {}", path.display());
        Ok(TissueStatus::Saved {
            path: path.to_path_buf(),
            triangles: mesh.triangle_count(),
        })
    }

    /// 转换单个病例的所有体数据文件.
    ///
    /// 只有一个文件时输出到 `{output_dir}/{病例名}/`, 否则输出到
    /// `{output_dir}/{病例名}/{文件名主干}/`, 避免相互覆盖.
    ///
    /// 读取失败只跳过该文件; 写出失败则中止该病例剩余的写出, 之后的文件不再加载.
    pub fn convert_case(&self, case: &CaseDir) -> CaseReport {
        let case_dir = self.options.output_dir.join(&case.name);
        if case.volumes.is_empty() {
            log::warn!("No label map found in {}", case.path.display());
        }

        let nested = case.volumes.len() > 1;
        let mut volumes = Vec::with_capacity(case.volumes.len());
        let mut loader = case.loader();
        for (source, loaded) in loader.by_ref() {
            let mut tissues = Vec::new();
            let error: Option<VolumeError> = match loaded {
                Ok(volume) => {
                    let out_dir = match VolumeFormat::stem_of(&source) {
                        Some(stem) if nested => case_dir.join(stem),
                        _ => case_dir.clone(),
                    };
                    log::debug!("{} -> {}", source.display(), out_dir.display());
                    self.convert_volume_into(&volume, &out_dir, &mut tissues)
                        .err()
                        .map(Into::into)
                }
                Err(e) => {
                    log::error!("Cannot read {}: {e}", source.display());
                    Some(e.into())
                }
            };
            let write_failed = matches!(error, Some(VolumeError::Write(_)));
            volumes.push(VolumeReport {
                source,
                tissues,
                error,
            });
            if write_failed {
                break;
            }
        }
        if loader.len() > 0 {
            log::warn!(
                "Skipping {} remaining label map(s) of {} after a write failure",
                loader.len(),
                case.name
            );
        }

        CaseReport {
            case: case.name.clone(),
            volumes,
        }
    }

    /// 依次转换所有病例. 惰性求值, 每处理一个病例产出一份报告.
    pub fn run<'a>(&'a self, cases: &'a [CaseDir]) -> impl Iterator<Item = CaseReport> + 'a {
        let n = cases.len();
        cases.iter().enumerate().map(move |(i, case)| {
            log::info!("[{}/{n}] Processing {}", i + 1, case.name);
            self.convert_case(case)
        })
    }
}

/// 并发操作部分
#[cfg(feature = "rayon")]
impl Converter {
    /// 借助 `rayon`, 按病例并行转换. 报告顺序与 `cases` 一致.
    ///
    /// 线程数由调用方所在的 `rayon` 线程池决定.
    pub fn par_run(&self, cases: &[CaseDir]) -> Vec<CaseReport> {
        cases
            .par_iter()
            .map(|case| {
                log::info!("Processing {}", case.name);
                self.convert_case(case)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{write_meta_image, VolumeGeometry};
    use crate::mesh::read_stl;
    use ndarray::{s, Array3};

    /// 含脂肪 (5, 6)、纤维腺体 (2) 和皮肤 (-2) 的小体数据.
    fn sample_volume() -> LabelVolume {
        let mut data = Array3::<i16>::zeros((8, 8, 8));
        data.slice_mut(s![1..4, 1..4, 1..4]).fill(5);
        data.slice_mut(s![1..4, 1..4, 4..6]).fill(6);
        data.slice_mut(s![5..7, 5..7, 5..7]).fill(2);
        data.slice_mut(s![6, 1..3, 1..3]).fill(-2);
        data[(0, 7, 7)] = 42;
        LabelVolume::new(data, VolumeGeometry::new([0.5, 0.5, 1.0], [0.0; 3]))
    }

    fn converter(out: &Path, lump: bool) -> Converter {
        let options = ConvertOptions {
            lump,
            ..ConvertOptions::new(out)
        };
        Converter::new(
            LabelDictionary::breast_detailed(),
            LabelGroups::breast_default(),
            options,
        )
        .unwrap()
    }

    fn file_names(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .sorted()
            .collect()
    }

    #[test]
    fn test_convert_volume_lumped() {
        let dir = tempfile::tempdir().unwrap();
        let c = converter(dir.path(), true);
        let reports = c.convert_volume(&sample_volume(), dir.path()).unwrap();

        assert_eq!(file_names(dir.path()), vec!["fat.stl", "fibroglandular.stl", "skin.stl"]);
        assert_eq!(reports.len(), c.plan().len());
        assert_eq!(reports.iter().filter(|r| r.is_saved()).count(), 3);
        assert!(reports
            .iter()
            .filter(|r| !r.is_saved())
            .all(|r| r.status == TissueStatus::Skipped(SkipReason::EmptyMask)));

        let fat = read_stl(dir.path().join("fat.stl")).unwrap().weld(1e-6);
        assert!(fat.is_watertight());
        assert!(fat.signed_volume() > 0.0);
    }

    #[test]
    fn test_convert_volume_per_label() {
        let dir = tempfile::tempdir().unwrap();
        let c = converter(dir.path(), false);
        c.convert_volume(&sample_volume(), dir.path()).unwrap();
        assert_eq!(
            file_names(dir.path()),
            vec!["fat_low.stl", "fat_median.stl", "fibroglandular_median.stl", "skin.stl"]
        );
    }

    #[test]
    fn test_skip_existing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("fat.stl"), b"keep me").unwrap();
        let options = ConvertOptions {
            skip_existing: true,
            smooth: None,
            ..ConvertOptions::new(dir.path())
        };
        let c = Converter::new(
            LabelDictionary::breast_detailed(),
            LabelGroups::breast_default(),
            options,
        )
        .unwrap();
        let reports = c.convert_volume(&sample_volume(), dir.path()).unwrap();
        assert_eq!(
            reports[0].status,
            TissueStatus::Skipped(SkipReason::AlreadyExists)
        );
        assert_eq!(fs::read(dir.path().join("fat.stl")).unwrap(), b"keep me");
        assert!(reports[1].is_saved());
    }

    #[test]
    fn test_invalid_smoothing_is_rejected() {
        let options = ConvertOptions {
            smooth: Some(SmoothConfig {
                relaxation: 2.0,
                ..SmoothConfig::default()
            }),
            ..ConvertOptions::new("out")
        };
        assert_eq!(
            Converter::new(
                LabelDictionary::breast_detailed(),
                LabelGroups::breast_default(),
                options
            )
            .err(),
            Some(ConfigError::InvalidRelaxation(2.0))
        );
    }

    #[test]
    fn test_convert_case_with_two_volumes_and_a_broken_one() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let case_dir = input.path().join("Exam_03");
        fs::create_dir_all(&case_dir).unwrap();
        write_meta_image(&sample_volume(), case_dir.join("left.mha"), true).unwrap();
        write_meta_image(&sample_volume(), case_dir.join("right.mha"), false).unwrap();
        fs::write(case_dir.join("zz_broken.mha"), b"NDims = 3\n").unwrap();

        let case = CaseDir::scan("Exam_03", &case_dir).unwrap();
        let c = converter(output.path(), true);
        let report = c.convert_case(&case);

        assert_eq!(report.volumes.len(), 3);
        assert!(!report.is_ok());
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.saved_count(), 6);
        let out = output.path().join("Exam_03");
        assert_eq!(file_names(&out), vec!["left", "right"]);
        assert_eq!(file_names(&out.join("left")).len(), 3);
    }

    #[test]
    fn test_write_failure_aborts_volume() {
        let dir = tempfile::tempdir().unwrap();
        // 输出目录被同名文件占用.
        let blocked = dir.path().join("Exam_01");
        fs::write(&blocked, b"").unwrap();
        let c = converter(dir.path(), true);
        let err = c.convert_volume(&sample_volume(), &blocked);
        assert!(matches!(err, Err(WriteError::Io { .. })));
    }

    #[test]
    fn test_write_failure_aborts_rest_of_case() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let case_dir = input.path().join("Exam_04");
        fs::create_dir_all(&case_dir).unwrap();
        write_meta_image(&sample_volume(), case_dir.join("left.mha"), false).unwrap();
        write_meta_image(&sample_volume(), case_dir.join("right.mha"), false).unwrap();

        // 第一个文件的输出目录被同名文件占用.
        let out = output.path().join("Exam_04");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("left"), b"").unwrap();

        let case = CaseDir::scan("Exam_04", &case_dir).unwrap();
        let report = converter(output.path(), true).convert_case(&case);

        assert_eq!(report.volumes.len(), 1);
        assert_eq!(report.volumes[0].source, case_dir.join("left.mha"));
        assert!(matches!(
            report.volumes[0].error,
            Some(VolumeError::Write(_))
        ));
        assert_eq!(report.saved_count(), 0);
        assert_eq!(file_names(&out), vec!["left"]);
    }

    #[test]
    fn test_run_is_lazy_and_ordered() {
        let output = tempfile::tempdir().unwrap();
        let c = converter(output.path(), true);
        let cases = vec![
            CaseDir {
                name: "Exam_01".into(),
                path: "missing".into(),
                volumes: vec![],
            },
            CaseDir {
                name: "Exam_02".into(),
                path: "missing".into(),
                volumes: vec!["missing/x.mha".into()],
            },
        ];
        let mut it = c.run(&cases);
        let first = it.next().unwrap();
        assert_eq!(first.case, "Exam_01");
        assert!(first.is_ok());
        let second = it.next().unwrap();
        assert!(!second.is_ok());
        assert!(it.next().is_none());
    }

    #[test]
    fn test_discover_and_run_range() {
        use crate::dataset::{discover_cases, CaseSelection};

        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        for name in ["Exam_01", "Exam_02", "Exam_03", "Exam_04", "Exam_05", "Exam_X"] {
            let d = input.path().join(name);
            fs::create_dir_all(&d).unwrap();
            write_meta_image(&sample_volume(), d.join("Label_map_detailed.mha"), true).unwrap();
        }

        let sel = CaseSelection::from_args(None, 2, 4).unwrap();
        let cases = discover_cases(input.path(), "Exam_", &sel).unwrap();
        let c = converter(output.path(), false);
        let reports = c.run(&cases).collect_vec();

        assert_eq!(
            reports.iter().map(|r| r.case.as_str()).collect_vec(),
            vec!["Exam_02", "Exam_03", "Exam_04"]
        );
        assert!(reports.iter().all(|r| r.is_ok() && r.saved_count() == 4));
        assert_eq!(file_names(output.path()), vec!["Exam_02", "Exam_03", "Exam_04"]);
        assert_eq!(
            file_names(&output.path().join("Exam_03")),
            vec!["fat_low.stl", "fat_median.stl", "fibroglandular_median.stl", "skin.stl"]
        );
    }

    #[cfg(feature = "rayon")]
    #[test]
    fn test_par_run_matches_run() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let cases = (1..=3)
            .map(|n| {
                let d = input.path().join(format!("Exam_{n:02}"));
                fs::create_dir_all(&d).unwrap();
                write_meta_image(&sample_volume(), d.join("a.mha"), false).unwrap();
                CaseDir::scan(format!("Exam_{n:02}"), &d).unwrap()
            })
            .collect_vec();

        let c = converter(output.path(), true);
        let par = c.par_run(&cases);
        let seq = c.run(&cases).collect_vec();
        assert_eq!(par.len(), 3);
        for (p, s) in par.iter().zip(&seq) {
            assert_eq!(p.case, s.case);
            assert_eq!(p.volumes[0].tissues, s.volumes[0].tissues);
        }
    }
}
