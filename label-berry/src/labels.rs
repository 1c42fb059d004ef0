//! 标签字典、组织分组以及由二者得到的提取计划.

use std::collections::BTreeMap;

use itertools::Itertools;
use once_cell::sync::Lazy;

use crate::consts::label::*;
use crate::error::ConfigError;
use crate::LabelCode;

static BREAST_DETAILED: Lazy<LabelDictionary> = Lazy::new(|| LabelDictionary {
    entries: BTreeMap::from([
        (BENIGN_TUMOUR, "benign_tumour".to_string()),
        (MALIGNANT_TUMOUR, "malignant_tumour".to_string()),
        (SKIN, "skin".to_string()),
        (MUSCLE, "muscle".to_string()),
        (BACKGROUND, "background".to_string()),
        (FIBROGLANDULAR_LOW, "fibroglandular_low".to_string()),
        (FIBROGLANDULAR_MEDIAN, "fibroglandular_median".to_string()),
        (FIBROGLANDULAR_HIGH, "fibroglandular_high".to_string()),
        (TRANSITION, "transition".to_string()),
        (FAT_LOW, "fat_low".to_string()),
        (FAT_MEDIAN, "fat_median".to_string()),
        (FAT_HIGH, "fat_high".to_string()),
    ]),
});

/// 标签值到组织名的映射. 构建后不再改变.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LabelDictionary {
    entries: BTreeMap<LabelCode, String>,
}

impl LabelDictionary {
    /// 由 `(标签值, 组织名)` 构建. 标签值或组织名重复时返回 `Err`.
    pub fn new<I, S>(entries: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (LabelCode, S)>,
        S: Into<String>,
    {
        let mut map: BTreeMap<LabelCode, String> = BTreeMap::new();
        for (code, name) in entries {
            let name = name.into();
            if map.values().any(|n| *n == name) {
                return Err(ConfigError::DuplicateLabel(name));
            }
            if map.insert(code, name).is_some() {
                return Err(ConfigError::DuplicateLabel(code.to_string()));
            }
        }
        Ok(Self { entries: map })
    }

    /// "detailed label map" 乳腺模型的标准字典 (标签 -4..=7).
    pub fn breast_detailed() -> Self {
        BREAST_DETAILED.clone()
    }

    /// 标签值对应的组织名.
    #[inline]
    pub fn name(&self, code: LabelCode) -> Option<&str> {
        self.entries.get(&code).map(String::as_str)
    }

    /// 组织名对应的标签值.
    pub fn code(&self, name: &str) -> Option<LabelCode> {
        self.entries
            .iter()
            .find_map(|(c, n)| (n == name).then_some(*c))
    }

    /// 字典中是否包含 `code`?
    #[inline]
    pub fn contains(&self, code: LabelCode) -> bool {
        self.entries.contains_key(&code)
    }

    /// 按标签值升序遍历.
    pub fn iter(&self) -> impl Iterator<Item = (LabelCode, &str)> {
        self.entries.iter().map(|(c, n)| (*c, n.as_str()))
    }

    /// 条目个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 有序的组织组: 组名到一组标签值. 同一组的标签合并为一个表面提取.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LabelGroups {
    groups: Vec<(String, Vec<LabelCode>)>,
}

impl LabelGroups {
    /// 按给定顺序构建.
    ///
    /// 组中包含背景标签, 或同一标签出现在两个组中时返回 `Err`.
    pub fn new<I, S, C>(groups: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (S, C)>,
        S: Into<String>,
        C: IntoIterator<Item = LabelCode>,
    {
        let mut owner: BTreeMap<LabelCode, String> = BTreeMap::new();
        let mut ans: Vec<(String, Vec<LabelCode>)> = Vec::new();
        for (name, codes) in groups {
            let name = name.into();
            if ans.iter().any(|(n, _)| *n == name) {
                return Err(ConfigError::DuplicateLabel(name));
            }
            let codes = codes.into_iter().sorted().dedup().collect_vec();
            for &code in codes.iter() {
                if is_background(code) {
                    return Err(ConfigError::GroupContainsBackground(name));
                }
                if let Some(first) = owner.insert(code, name.clone()) {
                    return Err(ConfigError::OverlappingGroups {
                        code,
                        first,
                        second: name,
                    });
                }
            }
            ans.push((name, codes));
        }
        Ok(Self { groups: ans })
    }

    /// 默认分组: `fat = {5, 6, 7}`, `fibroglandular = {1, 2, 3}`.
    pub fn breast_default() -> Self {
        let codes_of = |pred: fn(LabelCode) -> bool| {
            BREAST_DETAILED.iter().map(|(c, _)| c).filter(|c| pred(*c)).collect_vec()
        };
        Self {
            groups: vec![
                ("fat".to_string(), codes_of(is_fat)),
                ("fibroglandular".to_string(), codes_of(is_fibroglandular)),
            ],
        }
    }

    /// `code` 所属的组名.
    pub fn group_of(&self, code: LabelCode) -> Option<&str> {
        self.groups
            .iter()
            .find_map(|(n, c)| c.contains(&code).then_some(n.as_str()))
    }

    /// 按配置顺序遍历.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[LabelCode])> {
        self.groups.iter().map(|(n, c)| (n.as_str(), c.as_slice()))
    }

    /// 组数.
    #[inline]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// 是否为空?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// 一次提取的目标: 输出名和参与的标签值.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Target {
    /// 输出文件名 (不含扩展名).
    pub name: String,

    /// 参与提取的标签值, 升序且非空.
    pub codes: Vec<LabelCode>,
}

/// 提取计划: 每次运行计算一次, 对所有病例相同.
///
/// 开启合并时先按配置顺序列出各组, 再按标签值升序列出其余非背景标签;
/// 不合并时按标签值升序列出所有非背景标签.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionPlan {
    targets: Vec<Target>,
}

impl ExtractionPlan {
    /// 根据字典、分组和合并开关计算提取计划.
    pub fn new(labels: &LabelDictionary, groups: &LabelGroups, lump: bool) -> Self {
        let mut targets = Vec::new();
        if lump {
            targets.extend(groups.iter().map(|(name, codes)| Target {
                name: name.to_string(),
                codes: codes.to_vec(),
            }));
        }
        targets.extend(
            labels
                .iter()
                .filter(|(code, _)| !is_background(*code))
                .filter(|(code, _)| !lump || groups.group_of(*code).is_none())
                .map(|(code, name)| Target {
                    name: name.to_string(),
                    codes: vec![code],
                }),
        );
        Self { targets }
    }

    /// 所有目标, 按提取顺序.
    #[inline]
    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// 目标个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// 是否为空?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breast_dictionary() {
        let d = LabelDictionary::breast_detailed();
        assert_eq!(d.len(), 12);
        assert_eq!(d.name(-4), Some("benign_tumour"));
        assert_eq!(d.name(7), Some("fat_high"));
        assert_eq!(d.name(8), None);
        assert_eq!(d.code("transition"), Some(4));
        assert_eq!(d.iter().next(), Some((-4, "benign_tumour")));
    }

    #[test]
    fn test_dictionary_rejects_duplicates() {
        assert_eq!(
            LabelDictionary::new([(1, "a"), (1, "b")]),
            Err(ConfigError::DuplicateLabel("1".into()))
        );
        assert_eq!(
            LabelDictionary::new([(1, "a"), (2, "a")]),
            Err(ConfigError::DuplicateLabel("a".into()))
        );
    }

    #[test]
    fn test_groups_validation() {
        assert_eq!(
            LabelGroups::new([("g", vec![0, 1])]),
            Err(ConfigError::GroupContainsBackground("g".into()))
        );
        assert_eq!(
            LabelGroups::new([("a", vec![1, 2]), ("b", vec![2, 3])]),
            Err(ConfigError::OverlappingGroups {
                code: 2,
                first: "a".into(),
                second: "b".into()
            })
        );
        let g = LabelGroups::new([("b", vec![3, 2, 2]), ("a", vec![7])]).unwrap();
        assert_eq!(g.iter().collect_vec(), vec![("b", &[2, 3][..]), ("a", &[7][..])]);
        assert_eq!(g.group_of(7), Some("a"));
        assert_eq!(g.group_of(1), None);
    }

    #[test]
    fn test_plan_with_lumping() {
        let d = LabelDictionary::breast_detailed();
        let g = LabelGroups::breast_default();
        let plan = ExtractionPlan::new(&d, &g, true);
        let names = plan.targets().iter().map(|t| t.name.as_str()).collect_vec();
        assert_eq!(
            names,
            vec![
                "fat",
                "fibroglandular",
                "benign_tumour",
                "malignant_tumour",
                "skin",
                "muscle",
                "transition"
            ]
        );
        assert_eq!(plan.targets()[0].codes, vec![5, 6, 7]);
        assert_eq!(plan.targets()[1].codes, vec![1, 2, 3]);
        assert_eq!(g.group_of(FIBROGLANDULAR_HIGH), Some("fibroglandular"));
        assert!(plan.targets().iter().all(|t| !t.codes.contains(&BACKGROUND)));
    }

    #[test]
    fn test_plan_without_lumping() {
        let d = LabelDictionary::breast_detailed();
        let plan = ExtractionPlan::new(&d, &LabelGroups::breast_default(), false);
        assert_eq!(plan.len(), 11);
        assert!(plan.targets().iter().all(|t| t.codes.len() == 1));
        assert_eq!(plan.targets()[4].name, "fibroglandular_low");
    }
}
