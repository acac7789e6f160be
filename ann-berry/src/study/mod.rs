//! 多标注员标注研究的数据模型.
//!
//! 标注研究在两个身体部位 (脊柱/膝盖) 上, 让多名标注员以不同协议
//! (纯手动, 或 "超像素预分割 + 手动修正") 各自标注同一批病例;
//! 部分标注员还会跨多个批次重复标注以评估自身一致性.
//!
//! 本模块把磁盘目录树解码为强类型键值: 标注类型从目录名一次性解码为
//! [`AnnotationType`], 单次测量以 [`MeasurementKey`] 定位, 全部数据装入
//! `BTreeMap` 以保证迭代顺序确定.

use crate::consts::{KNEE_CASE_LIST, RATER_LEN, SPA_CASE_LIST};
use crate::raw::RawError;
use crate::{Idx3d, ManualVolume, MaskVolume};
use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

mod loader;

pub use loader::{
    combined_masks, home_annotation_dir, home_annotation_dir_with, load_interrater,
    load_intrarater, StudyConfig,
};

/// 标注对象的身体部位.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum BodyRegion {
    /// 脊柱 (目录名前缀 `SPA`).
    Spine,

    /// 膝盖 (目录名前缀 `KNEE`).
    Knee,
}

impl BodyRegion {
    /// 目录名前缀.
    #[inline]
    pub fn dir_prefix(&self) -> &'static str {
        match self {
            Self::Spine => "SPA",
            Self::Knee => "KNEE",
        }
    }

    /// 该部位的病例编号列表.
    #[inline]
    pub fn case_list(&self) -> &'static [u32] {
        match self {
            Self::Spine => &SPA_CASE_LIST,
            Self::Knee => &KNEE_CASE_LIST,
        }
    }

    /// 跨部位聚合展示时的部位名.
    #[inline]
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Spine => "SIJ",
            Self::Knee => "Knee",
        }
    }
}

/// 超像素预分割算法.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum SpMethod {
    /// Linear Spectral Clustering.
    Lsc,

    /// Texture-Preserving Superpixel.
    Tps,
}

impl SpMethod {
    /// 目录名后缀.
    #[inline]
    pub fn dir_suffix(&self) -> &'static str {
        match self {
            Self::Lsc => "LSC",
            Self::Tps => "TPS",
        }
    }
}

/// 超像素密度档位. 具体超像素个数依部位而定.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum SpDensity {
    /// 低密度 (脊柱 1000 个, 膝盖 1250 个).
    Lower,

    /// 高密度 (脊柱 2000 个, 膝盖 2500 个).
    Higher,
}

/// 标注协议.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Protocol {
    /// 纯手动逐体素标注.
    Manual,

    /// 超像素预分割 + 手动修正.
    Superpixel {
        /// 预分割算法.
        method: SpMethod,
        /// 密度档位.
        density: SpDensity,
    },
}

/// 标注类型: 身体部位 x 标注协议, 与磁盘目录一一对应.
///
/// 例如目录 `SPA1000LSC` 解码为脊柱 + LSC 低密度超像素协议,
/// `KNEEMANUAL` 解码为膝盖 + 纯手动协议.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct AnnotationType {
    /// 身体部位.
    pub region: BodyRegion,

    /// 标注协议.
    pub protocol: Protocol,
}

/// 目录名 -> 标注类型的解码表.
static DIR_TABLE: Lazy<BTreeMap<String, AnnotationType>> = Lazy::new(|| {
    AnnotationType::all()
        .iter()
        .map(|t| (t.dir_name(), *t))
        .collect()
});

impl AnnotationType {
    /// 研究中全部 10 种标注类型, 按 (部位, 协议) 排序.
    pub fn all() -> [Self; 10] {
        let mut ans = Vec::with_capacity(10);
        for region in [BodyRegion::Spine, BodyRegion::Knee] {
            ans.push(Self {
                region,
                protocol: Protocol::Manual,
            });
            for method in [SpMethod::Lsc, SpMethod::Tps] {
                for density in [SpDensity::Lower, SpDensity::Higher] {
                    ans.push(Self {
                        region,
                        protocol: Protocol::Superpixel { method, density },
                    });
                }
            }
        }
        // 恰好 10 个元素, 不会失败.
        ans.try_into().unwrap()
    }

    /// 从目录名解码. 未知目录名返回 `None`.
    #[inline]
    pub fn parse_dir(name: &str) -> Option<Self> {
        DIR_TABLE.get(name).copied()
    }

    /// 编码回目录名, 如 `SPA1000LSC`, `KNEEMANUAL`.
    pub fn dir_name(&self) -> String {
        match self.protocol {
            Protocol::Manual => format!("{}MANUAL", self.region.dir_prefix()),
            Protocol::Superpixel { method, .. } => format!(
                "{}{}{}",
                self.region.dir_prefix(),
                // sp_count 在超像素协议下恒为 Some.
                self.sp_count().unwrap(),
                method.dir_suffix()
            ),
        }
    }

    /// 预分割超像素个数. 纯手动协议返回 `None`.
    pub fn sp_count(&self) -> Option<u32> {
        let Protocol::Superpixel { density, .. } = self.protocol else {
            return None;
        };
        Some(match (self.region, density) {
            (BodyRegion::Spine, SpDensity::Lower) => 1000,
            (BodyRegion::Spine, SpDensity::Higher) => 2000,
            (BodyRegion::Knee, SpDensity::Lower) => 1250,
            (BodyRegion::Knee, SpDensity::Higher) => 2500,
        })
    }

    /// 跨部位聚合时使用的协议分组名, 如 `LSC-lower`, `manual`.
    pub fn display_bucket(&self) -> &'static str {
        match self.protocol {
            Protocol::Manual => "manual",
            Protocol::Superpixel { method, density } => match (method, density) {
                (SpMethod::Lsc, SpDensity::Lower) => "LSC-lower",
                (SpMethod::Lsc, SpDensity::Higher) => "LSC-higher",
                (SpMethod::Tps, SpDensity::Lower) => "TPS-lower",
                (SpMethod::Tps, SpDensity::Higher) => "TPS-higher",
            },
        }
    }
}

impl fmt::Display for AnnotationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dir_name())
    }
}

/// 标注批次 (自身一致性研究中同一标注员的重复轮次).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Series {
    /// 第一批.
    I,

    /// 第二批.
    II,

    /// 第三批.
    III,
}

impl Series {
    /// 全部批次, 按时间顺序.
    pub const ALL: [Self; 3] = [Self::I, Self::II, Self::III];

    /// 批次对应的目录名.
    #[inline]
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::I => "series I",
            Self::II => "series II",
            Self::III => "series III",
        }
    }
}

/// 单次测量的复合键.
///
/// `BTreeMap<MeasurementKey, Annotation>` 即一次研究的全部数据;
/// 键序决定了所有批处理与统计的迭代顺序.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct MeasurementKey {
    /// 标注员编号 (1 起).
    pub rater: u32,

    /// 标注类型.
    pub ann_type: AnnotationType,

    /// 病例编号.
    pub case_no: u32,

    /// 标注批次. 仅自身一致性研究使用, 组间研究为 `None`.
    pub series: Option<Series>,
}

/// 单次测量的标注数据.
#[derive(Clone, Debug)]
pub struct Annotation {
    /// 超像素标注掩膜. 纯手动协议下为 `None`.
    pub sp: Option<MaskVolume>,

    /// 手动修正体数据 (纯手动协议下即标注本体).
    pub manual: ManualVolume,

    /// 合成标注: 超像素标注 + 手动修正, 或纯手动标注本身.
    pub combined: MaskVolume,
}

/// 研究数据集.
pub type StudyData = BTreeMap<MeasurementKey, Annotation>;

/// 研究数据加载错误.
#[derive(Debug)]
pub enum StudyError {
    /// raw 文件读取错误.
    Raw(RawError),

    /// 体素取值越出协议允许范围.
    ValueRange {
        /// 出错文件.
        path: PathBuf,
        /// 第一个非法体素的下标.
        pos: Idx3d,
    },

    /// 超像素协议下, 超像素标注与手动修正文件未能配对.
    MissingPair {
        /// 标注员编号.
        rater: u32,
        /// 标注类型目录名.
        dir: String,
        /// 病例编号.
        case_no: u32,
    },

    /// 目录遍历 I/O 错误.
    Io(std::io::Error),
}

impl fmt::Display for StudyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw(e) => write!(f, "标注文件读取失败: {e}"),
            Self::ValueRange { path, pos } => write!(
                f,
                "`{}` 中 {pos:?} 处体素取值越出协议允许范围",
                path.display()
            ),
            Self::MissingPair {
                rater,
                dir,
                case_no,
            } => write!(
                f,
                "标注员 {rater} 的 `{dir}` 下, 病例 {case_no} 的超像素/手动文件未配对"
            ),
            Self::Io(e) => write!(f, "目录遍历失败: {e}"),
        }
    }
}

impl std::error::Error for StudyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Raw(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RawError> for StudyError {
    #[inline]
    fn from(e: RawError) -> Self {
        Self::Raw(e)
    }
}

impl From<std::io::Error> for StudyError {
    #[inline]
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// 默认标注员编号列表: `1..=RATER_LEN`.
#[inline]
pub fn default_raters() -> Vec<u32> {
    (1..=RATER_LEN as u32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dir_name_roundtrip() {
        for t in AnnotationType::all() {
            let name = t.dir_name();
            assert_eq!(AnnotationType::parse_dir(&name), Some(t), "目录名 {name}");
        }
    }

    #[test]
    fn test_parse_known_dirs() {
        let t = AnnotationType::parse_dir("SPA1000LSC").unwrap();
        assert_eq!(t.region, BodyRegion::Spine);
        assert_eq!(
            t.protocol,
            Protocol::Superpixel {
                method: SpMethod::Lsc,
                density: SpDensity::Lower
            }
        );
        assert_eq!(t.sp_count(), Some(1000));
        assert_eq!(t.display_bucket(), "LSC-lower");

        let t = AnnotationType::parse_dir("KNEE2500TPS").unwrap();
        assert_eq!(t.region, BodyRegion::Knee);
        assert_eq!(t.sp_count(), Some(2500));
        assert_eq!(t.display_bucket(), "TPS-higher");
        assert_eq!(t.region.display_name(), "Knee");
        assert_eq!(BodyRegion::Spine.display_name(), "SIJ");

        let t = AnnotationType::parse_dir("SPAMANUAL").unwrap();
        assert_eq!(t.protocol, Protocol::Manual);
        assert_eq!(t.sp_count(), None);
        assert_eq!(t.display_bucket(), "manual");

        assert_eq!(AnnotationType::parse_dir("SPA1500LSC"), None);
        assert_eq!(AnnotationType::parse_dir("LIVER1000LSC"), None);
    }

    #[test]
    fn test_key_ordering_is_deterministic() {
        let t = AnnotationType::parse_dir("SPA1000LSC").unwrap();
        let a = MeasurementKey {
            rater: 1,
            ann_type: t,
            case_no: 4,
            series: None,
        };
        let b = MeasurementKey {
            rater: 1,
            ann_type: t,
            case_no: 8,
            series: None,
        };
        let c = MeasurementKey {
            rater: 2,
            ann_type: t,
            case_no: 4,
            series: None,
        };
        assert!(a < b && b < c);
    }

    #[test]
    fn test_series_dirs() {
        assert_eq!(Series::I.dir_name(), "series I");
        assert_eq!(Series::ALL.len(), 3);
    }
}
