//! 程序运行函数.

use crate::report::{CaseOutcome, MergeSummary};
use ann_berry::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::path::{Path, PathBuf};
use utils::loader;

/// 实际运行.
///
/// 单个病例的失败 (缺配对, 文件损坏, 候选区域过多等) 只会跳过该病例,
/// 不会中止整个批次.
pub fn run() -> MergeSummary {
    let lesion_dir = loader::lesion_dir_from_env_or_home();
    assert!(lesion_dir.is_dir(), "病灶目录不存在");
    let merged_dir = loader::merged_dir_from_env_or_home();
    assert!(merged_dir.is_dir(), "超像素合并卷目录不存在");
    let out_dir = loader::out_dir_from_env_or_home();
    std::fs::create_dir_all(&out_dir).expect("无法创建输出目录");

    let entries = raw::scan_dir(&lesion_dir).expect("无法枚举病灶目录");
    let os_by_case: BTreeMap<u32, (RawMeta, PathBuf)> = raw::scan_dir(&merged_dir)
        .expect("无法枚举超像素合并卷目录")
        .into_iter()
        .filter(|(meta, _)| meta.tag == "OS")
        .map(|(meta, path)| (meta.case_no, (meta, path)))
        .collect();

    println!("Running lesion mask merging on {}...", lesion_dir.display());
    let mut outcomes = Vec::new();
    let mut skipped = Vec::new();
    for (meta, path) in entries.iter().filter(|(meta, _)| meta.tag == "GT") {
        match merge_case(meta, path, os_by_case.get(&meta.case_no), &out_dir) {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => {
                log::error!("病例 {} 调和失败, 跳过: {e}", meta.case_no);
                skipped.push(meta.case_no);
            }
        }
    }

    MergeSummary {
        outcomes,
        skipped,
        out_dir,
    }
}

/// 调和单个病例: 读入真值与超像素合并卷, 调和, 写出 `ML_` 掩膜.
fn merge_case(
    gt_meta: &RawMeta,
    gt_path: &Path,
    os_entry: Option<&(RawMeta, PathBuf)>,
    out_dir: &Path,
) -> Result<CaseOutcome, Box<dyn Error>> {
    let (os_meta, os_path) = os_entry.ok_or("缺少 OS_ 配套文件")?;
    let lesion = raw::read_mask_volume(gt_path, gt_meta, LESION)?;
    let width = raw::detect_sample_width(os_path, os_meta)?;
    let labels = match raw::read_volume(os_path, os_meta, width.nbytes())? {
        RawVolume::B2(data) => LabelVolume::from_parts(data),
        other => {
            return Err(format!(
                "超像素合并卷采样宽度应为 2 字节, 实际 {} 字节",
                other.width().nbytes()
            )
            .into())
        }
    };

    let merged = par_reconcile(&lesion, &labels, &ReconcileParams::default())?;

    let ml_meta = gt_meta.with_tag("ML");
    raw::write_mask_volume(out_dir.join(ml_meta.filename()), &merged.mask, LESION)?;

    let sim = similarity::compare_by_slice(&merged.mask, &lesion);
    Ok(CaseOutcome {
        case_no: gt_meta.case_no,
        sp_regions: count_labels(&labels),
        sim,
    })
}

/// 超像素合并卷中出现的不同标签值个数, 作为超像素密度的近似.
fn count_labels(labels: &LabelVolume) -> usize {
    labels.data().iter().copied().collect::<BTreeSet<u16>>().len()
}
