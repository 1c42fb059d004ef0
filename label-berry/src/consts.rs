//! 通用常量.

/// "detailed label map" 中的标签值.
pub mod label {
    use crate::LabelCode;

    /// 良性肿瘤.
    pub const BENIGN_TUMOUR: LabelCode = -4;

    /// 恶性肿瘤.
    pub const MALIGNANT_TUMOUR: LabelCode = -3;

    /// 皮肤.
    pub const SKIN: LabelCode = -2;

    /// 肌肉.
    pub const MUSCLE: LabelCode = -1;

    /// 背景. 永远不会被提取.
    pub const BACKGROUND: LabelCode = 0;

    /// 纤维腺体 (低).
    pub const FIBROGLANDULAR_LOW: LabelCode = 1;

    /// 纤维腺体 (中).
    pub const FIBROGLANDULAR_MEDIAN: LabelCode = 2;

    /// 纤维腺体 (高).
    pub const FIBROGLANDULAR_HIGH: LabelCode = 3;

    /// 过渡区.
    pub const TRANSITION: LabelCode = 4;

    /// 脂肪 (低).
    pub const FAT_LOW: LabelCode = 5;

    /// 脂肪 (中).
    pub const FAT_MEDIAN: LabelCode = 6;

    /// 脂肪 (高).
    pub const FAT_HIGH: LabelCode = 7;

    /// 体素是否是背景?
    #[inline]
    pub const fn is_background(p: LabelCode) -> bool {
        matches!(p, BACKGROUND)
    }

    /// 体素是否是纤维腺体?
    #[inline]
    pub const fn is_fibroglandular(p: LabelCode) -> bool {
        matches!(
            p,
            FIBROGLANDULAR_LOW | FIBROGLANDULAR_MEDIAN | FIBROGLANDULAR_HIGH
        )
    }

    /// 体素是否是脂肪?
    #[inline]
    pub const fn is_fat(p: LabelCode) -> bool {
        matches!(p, FAT_LOW | FAT_MEDIAN | FAT_HIGH)
    }
}

/// 等值面阈值. 二值掩膜的 0/1 体素之间的界面.
pub const ISO_LEVEL: f64 = 0.5;

/// 默认平滑迭代次数.
pub const DEFAULT_SMOOTH_ITERATIONS: u32 = 15;

/// 默认平滑松弛因子.
pub const DEFAULT_RELAXATION_FACTOR: f64 = 0.25;

/// 默认特征边角度, 以度为单位.
pub const DEFAULT_FEATURE_ANGLE: f64 = 45.0;

/// 默认病例目录名前缀.
pub const DEFAULT_CASE_PREFIX: &str = "Exam_";

/// 默认远程归档根地址.
pub const DEFAULT_BASE_URL: &str = "https://github.com/acpelicano/breast_models_repository/raw/main/";

/// 每个病例远程归档的文件名.
pub const DEFAULT_ARCHIVE_NAME: &str = "Label_map_detailed.zip";

/// 输出网格文件扩展名.
pub const MESH_EXT: &str = "stl";
