//! 标注研究目录树的加载器.
//!
//! 组间研究目录布局:
//!
//! ```text
//! <root>/rater<r>/manual/<标注类型>/<TAG>_<case>_<H>_<W>_<z>_1_.raw
//! <root>/rater<r>/sp/<标注类型>/<TAG>_<case>_<H>_<W>_<z>_1_.raw
//! ```
//!
//! 自身一致性研究在 `rater<r>` 与 `manual`/`sp` 之间多一层批次目录
//! (`series I` 等). 纯手动协议没有 `sp` 侧, 手动体数据即标注本体.

use super::{
    Annotation, AnnotationType, MeasurementKey, Protocol, Series, StudyData, StudyError,
};
use crate::consts::{marker, KNEE_CASE_LIST, SPA_CASE_LIST};
use crate::raw::{self, RawMeta};
use crate::MaskVolume;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// 获取 `{用户主目录}/dataset/annotation` 目录.
pub fn home_annotation_dir() -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push("dataset");
    ans.push("annotation");
    Some(ans)
}

/// 获取 `{用户主目录}/dataset/annotation` 目录下给定继续项组成的全路径.
pub fn home_annotation_dir_with<P: AsRef<Path>, I: IntoIterator<Item = P>>(
    it: I,
) -> Option<PathBuf> {
    let mut ans = home_annotation_dir()?;
    ans.extend(it);
    Some(ans)
}

/// 标注研究的加载配置. 所有入口函数都显式接收配置, 不依赖任何全局状态.
#[derive(Clone, Debug)]
pub struct StudyConfig {
    /// 标注根目录.
    pub root: PathBuf,

    /// 参与研究的标注员编号.
    pub raters: Vec<u32>,

    /// 脊柱病例编号列表.
    pub spa_cases: Vec<u32>,

    /// 膝盖病例编号列表.
    pub knee_cases: Vec<u32>,

    /// 超像素标注文件中的前景标记值.
    pub sp_marker: u8,
}

impl StudyConfig {
    /// 以研究既定的标注员与病例列表创建配置.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_owned(),
            raters: super::default_raters(),
            spa_cases: SPA_CASE_LIST.to_vec(),
            knee_cases: KNEE_CASE_LIST.to_vec(),
            sp_marker: marker::SP_FOREGROUND,
        }
    }

    /// 标注类型对应的病例编号列表.
    fn case_list(&self, ann_type: &AnnotationType) -> &[u32] {
        match ann_type.region {
            super::BodyRegion::Spine => &self.spa_cases,
            super::BodyRegion::Knee => &self.knee_cases,
        }
    }
}

/// 加载组间研究的全部标注数据.
///
/// 缺失的标注员目录会被跳过并记录 warn 日志; 未知的标注类型目录被忽略;
/// 文件名无法解码或病例编号不在配置列表中的文件同样跳过.
/// 体素取值越界或超像素/手动文件无法配对时返回 `Err`.
pub fn load_interrater(cfg: &StudyConfig) -> Result<StudyData, StudyError> {
    let mut out = StudyData::new();
    for &rater in &cfg.raters {
        let base = cfg.root.join(format!("rater{rater}"));
        if !base.is_dir() {
            log::warn!("标注员目录 `{}` 不存在, 跳过", base.display());
            continue;
        }
        load_rater_tree(&base, rater, None, cfg, &mut out)?;
    }
    Ok(out)
}

/// 加载自身一致性研究的全部标注数据. 键的 `series` 字段必为 `Some`.
///
/// 跳过与报错规则与 [`load_interrater`] 相同; 缺失的批次目录也会被跳过.
pub fn load_intrarater(cfg: &StudyConfig) -> Result<StudyData, StudyError> {
    let mut out = StudyData::new();
    for &rater in &cfg.raters {
        for series in Series::ALL {
            let base = cfg
                .root
                .join(format!("rater{rater}"))
                .join(series.dir_name());
            if !base.is_dir() {
                log::warn!("批次目录 `{}` 不存在, 跳过", base.display());
                continue;
            }
            load_rater_tree(&base, rater, Some(series), cfg, &mut out)?;
        }
    }
    Ok(out)
}

/// 加载 `base` 下 (`manual` 与可选的 `sp` 两侧) 的全部标注类型目录.
fn load_rater_tree(
    base: &Path,
    rater: u32,
    series: Option<Series>,
    cfg: &StudyConfig,
    out: &mut StudyData,
) -> Result<(), StudyError> {
    let manual_base = base.join("manual");
    let sp_base = base.join("sp");

    for entry in std::fs::read_dir(&manual_base)? {
        let type_dir = entry?.path();
        let Some(name) = type_dir.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(ann_type) = AnnotationType::parse_dir(name) else {
            log::debug!("忽略未知标注类型目录 `{}`", type_dir.display());
            continue;
        };

        // 超像素协议的配对文件索引: 病例编号 -> (元信息, 路径).
        let sp_files: BTreeMap<u32, (RawMeta, PathBuf)> = match ann_type.protocol {
            Protocol::Manual => BTreeMap::new(),
            Protocol::Superpixel { .. } => raw::scan_dir(sp_base.join(name))?
                .into_iter()
                .map(|(meta, path)| (meta.case_no, (meta, path)))
                .collect(),
        };

        for (meta, path) in raw::scan_dir(&type_dir)? {
            if !cfg.case_list(&ann_type).contains(&meta.case_no) {
                log::warn!("病例 {} 不在配置列表中, 跳过", meta.case_no);
                continue;
            }
            let ann = load_annotation(&ann_type, &meta, &path, &sp_files, rater, cfg)?;
            out.insert(
                MeasurementKey {
                    rater,
                    ann_type,
                    case_no: meta.case_no,
                    series,
                },
                ann,
            );
        }
    }
    Ok(())
}

/// 加载单次测量: 读取手动体数据, 超像素协议下配对超像素掩膜并合成.
fn load_annotation(
    ann_type: &AnnotationType,
    meta: &RawMeta,
    manual_path: &Path,
    sp_files: &BTreeMap<u32, (RawMeta, PathBuf)>,
    rater: u32,
    cfg: &StudyConfig,
) -> Result<Annotation, StudyError> {
    let manual = raw::read_manual_volume(manual_path, meta)?;
    if let Some(pos) = manual.first_invalid() {
        return Err(StudyError::ValueRange {
            path: manual_path.to_owned(),
            pos,
        });
    }

    let missing_pair = || StudyError::MissingPair {
        rater,
        dir: ann_type.dir_name(),
        case_no: meta.case_no,
    };

    match ann_type.protocol {
        Protocol::Manual => {
            // 手动协议下体数据即标注本体, 不允许出现删减体素.
            let combined = manual.to_mask().map_err(|pos| StudyError::ValueRange {
                path: manual_path.to_owned(),
                pos,
            })?;
            Ok(Annotation {
                sp: None,
                manual,
                combined,
            })
        }
        Protocol::Superpixel { .. } => {
            let (sp_meta, sp_path) = sp_files.get(&meta.case_no).ok_or_else(missing_pair)?;
            // 形状不一致的配对与缺失同样不可用.
            if sp_meta.shape() != meta.shape() {
                return Err(missing_pair());
            }
            let sp = raw::read_mask_volume(sp_path, sp_meta, cfg.sp_marker)?;
            let combined = sp
                .apply_corrections(&manual)
                .map_err(|pos| StudyError::ValueRange {
                    path: manual_path.to_owned(),
                    pos,
                })?;
            Ok(Annotation {
                sp: Some(sp),
                manual,
                combined,
            })
        }
    }
}

/// 仅保留合成掩膜, 丢弃中间数据. 聚合统计只关心合成标注时使用.
pub fn combined_masks(data: StudyData) -> BTreeMap<MeasurementKey, MaskVolume> {
    data.into_iter().map(|(k, v)| (k, v.combined)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::marker;
    use crate::raw;
    use ndarray::Array3;

    /// 在临时目录下搭建一个最小的组间研究目录树.
    fn build_tree(root: &Path) {
        let meta = RawMeta {
            tag: "ANN".to_owned(),
            case_no: 4,
            height: 2,
            width: 2,
            slices: 1,
        };

        // rater1 / SPA1000LSC: 超像素标注 + 一处增补修正.
        let sp_dir = root.join("rater1").join("sp").join("SPA1000LSC");
        let manual_dir = root.join("rater1").join("manual").join("SPA1000LSC");
        std::fs::create_dir_all(&sp_dir).unwrap();
        std::fs::create_dir_all(&manual_dir).unwrap();

        let mut sp = Array3::from_elem((1, 2, 2), false);
        sp[(0, 0, 0)] = true;
        let sp = MaskVolume::from_parts(sp);
        raw::write_mask_volume(
            sp_dir.join(meta.filename()),
            &sp,
            marker::SP_FOREGROUND,
        )
        .unwrap();

        // 手动修正: (0,1,1) 增补.
        std::fs::write(
            manual_dir.join(meta.filename()),
            [0u8, 0, 0, 1],
        )
        .unwrap();

        // rater1 / SPAMANUAL: 纯手动.
        let manual_only = root.join("rater1").join("manual").join("SPAMANUAL");
        std::fs::create_dir_all(&manual_only).unwrap();
        std::fs::write(manual_only.join(meta.filename()), [1u8, 1, 0, 0]).unwrap();
    }

    fn temp_root(name: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("ann-berry-study-{}-{name}", std::process::id()));
        p
    }

    #[test]
    fn test_load_interrater_tree() {
        let root = temp_root("ok");
        build_tree(&root);

        let mut cfg = StudyConfig::new(&root);
        cfg.raters = vec![1];
        let data = load_interrater(&cfg).unwrap();
        std::fs::remove_dir_all(&root).unwrap();

        assert_eq!(data.len(), 2);

        let lsc = AnnotationType::parse_dir("SPA1000LSC").unwrap();
        let ann = &data[&MeasurementKey {
            rater: 1,
            ann_type: lsc,
            case_no: 4,
            series: None,
        }];
        // 合成 = 超像素 (0,0,0) + 增补 (0,1,1).
        assert_eq!(ann.combined.count_foreground(), 2);
        assert!(ann.combined[(0, 0, 0)] && ann.combined[(0, 1, 1)]);
        assert_eq!(ann.manual.correction_area(), 1);
        assert_eq!(ann.sp.as_ref().unwrap().count_foreground(), 1);

        let manual = AnnotationType::parse_dir("SPAMANUAL").unwrap();
        let ann = &data[&MeasurementKey {
            rater: 1,
            ann_type: manual,
            case_no: 4,
            series: None,
        }];
        assert!(ann.sp.is_none());
        assert_eq!(ann.combined.count_foreground(), 2);
    }

    #[test]
    fn test_missing_sp_pair() {
        let root = temp_root("missing");
        let manual_dir = root.join("rater1").join("manual").join("SPA1000LSC");
        std::fs::create_dir_all(root.join("rater1").join("sp").join("SPA1000LSC")).unwrap();
        std::fs::create_dir_all(&manual_dir).unwrap();
        std::fs::write(manual_dir.join("ANN_4_2_2_1_1_.raw"), [0u8; 4]).unwrap();

        let mut cfg = StudyConfig::new(&root);
        cfg.raters = vec![1];
        let err = load_interrater(&cfg).unwrap_err();
        std::fs::remove_dir_all(&root).unwrap();

        assert!(matches!(
            err,
            StudyError::MissingPair {
                rater: 1,
                case_no: 4,
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_manual_value() {
        let root = temp_root("range");
        let manual_dir = root.join("rater1").join("manual").join("SPAMANUAL");
        std::fs::create_dir_all(&manual_dir).unwrap();
        // 手动协议不允许删减体素 (-1 = 0xff).
        std::fs::write(manual_dir.join("ANN_4_2_2_1_1_.raw"), [1u8, 0xff, 0, 0]).unwrap();

        let mut cfg = StudyConfig::new(&root);
        cfg.raters = vec![1];
        let err = load_interrater(&cfg).unwrap_err();
        std::fs::remove_dir_all(&root).unwrap();

        assert!(matches!(err, StudyError::ValueRange { pos: (0, 0, 1), .. }));
    }

    #[test]
    fn test_skips_unlisted_case() {
        let root = temp_root("unlisted");
        let manual_dir = root.join("rater1").join("manual").join("SPAMANUAL");
        std::fs::create_dir_all(&manual_dir).unwrap();
        // 病例 3 不在脊柱病例列表中.
        std::fs::write(manual_dir.join("ANN_3_2_2_1_1_.raw"), [0u8; 4]).unwrap();

        let mut cfg = StudyConfig::new(&root);
        cfg.raters = vec![1];
        let data = load_interrater(&cfg).unwrap();
        std::fs::remove_dir_all(&root).unwrap();
        assert!(data.is_empty());
    }
}
