//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx3d, LabelCode, Point3};

pub use crate::data::{BinaryMask, LabelVolume, VolumeAttr, VolumeGeometry};

pub use crate::labels::{ExtractionPlan, LabelDictionary, LabelGroups, Target};

pub use crate::mesh::{extract_isosurface, read_stl, smooth, write_stl};
pub use crate::mesh::{IsoConfig, Mesh, SmoothConfig, StlFormat};

pub use crate::consts::label::{is_background, BACKGROUND};
pub use crate::consts::{DEFAULT_CASE_PREFIX, DEFAULT_RELAXATION_FACTOR, DEFAULT_SMOOTH_ITERATIONS};

pub use crate::dataset::home_dataset_dir_with;
pub use crate::dataset::{discover_cases, CaseDir, CaseSelection};

pub use crate::pipeline::{CaseReport, ConvertOptions, Converter, TissueStatus};
