//! 超像素掩膜调和.
//!
//! 给定同一体数据的二值病灶掩膜和超像素标签卷, 逐切片求出
//! "只用连通超像素区域的并集" 能达到的对病灶掩膜的最佳近似, 并报告其 IoU.
//!
//! 每个切片独立处理:
//!
//! 1. 枚举病灶前景体素作为种子; 无种子的切片输出全背景并跳过.
//! 2. 对每个尚未被 "直接接受" 区域覆盖的种子做漫水填充, 得到同标签连通区域.
//! 3. 按区域与病灶的重叠率分档: 高于接受阈值的区域无条件并入;
//!    落在考虑区间的区域 (按逐体素相等去重) 进入候选集合; 其余丢弃.
//! 4. 对候选集合的 **幂集** 穷举 (含空集), 取 "接受并集 ∪ 子集并集"
//!    对病灶切片 IoU 最大者; 平局时保留最先枚举到的子集.
//!
//! 幂集穷举对候选个数是指数的. 这是有意保留的设计决定 (研究域中候选
//! 通常不超过 10~15 个), 以穷举最优保证数值结果可复现; 不得用贪心近似
//! 替代. [`ReconcileParams::max_candidates`] 提供了唯一的安全阀:
//! 候选个数超限的切片会使当次调用失败, 由批处理层决定跳过与否.

use crate::{similarity, Idx3d, LabelVolume, MaskSlice, MaskVolume, Region2d, SpxSlice, VolumeAttr};
use itertools::Itertools;
use ndarray::{Array3, Axis, Zip};
use std::fmt;

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};
    }
}

/// 调和参数.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ReconcileParams {
    /// 接受阈值: 区域重叠率严格高于该值时无条件并入.
    accept: f64,

    /// 考虑阈值: 区域重叠率严格高于该值 (但不高于接受阈值) 时进入候选集合.
    consider: f64,

    /// 单切片候选集合大小上限. 幂集大小为 `2^n`, 上限过大会让穷举不可行.
    /// `None` 表示不设上限.
    max_candidates: Option<usize>,
}

impl Default for ReconcileParams {
    /// 默认接受阈值 0.9, 考虑阈值 0.1, 候选上限 20.
    #[inline]
    fn default() -> Self {
        Self {
            accept: 0.9,
            consider: 0.1,
            max_candidates: Some(20),
        }
    }
}

impl ReconcileParams {
    /// 构建调和参数.
    ///
    /// 必须满足 `0 <= consider <= accept <= 1`, 否则返回 `None`.
    pub fn new(consider: f64, accept: f64) -> Option<Self> {
        if 0.0 <= consider && consider <= accept && accept <= 1.0 {
            Some(Self {
                accept,
                consider,
                ..Self::default()
            })
        } else {
            None
        }
    }

    /// 修改候选集合大小上限. `None` 表示不设上限.
    #[inline]
    pub fn with_max_candidates(mut self, max_candidates: Option<usize>) -> Self {
        self.max_candidates = max_candidates;
        self
    }

    /// 接受阈值.
    #[inline]
    pub fn accept(&self) -> f64 {
        self.accept
    }

    /// 考虑阈值.
    #[inline]
    pub fn consider(&self) -> f64 {
        self.consider
    }
}

/// 调和错误.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    /// 病灶掩膜与超像素标签卷形状不一致.
    ShapeMismatch {
        /// 病灶掩膜形状.
        lesion: Idx3d,
        /// 超像素标签卷形状.
        labels: Idx3d,
    },

    /// 某切片的候选集合大小超出上限, 幂集穷举不可行.
    TooManyCandidates {
        /// 切片索引.
        slice: usize,
        /// 实际候选个数.
        count: usize,
        /// 配置的上限.
        limit: usize,
    },
}

impl fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShapeMismatch { lesion, labels } => write!(
                f,
                "病灶掩膜形状 {lesion:?} 与超像素标签卷形状 {labels:?} 不一致"
            ),
            Self::TooManyCandidates {
                slice,
                count,
                limit,
            } => write!(
                f,
                "切片 #{slice} 候选区域过多: {count} 个 (上限 {limit}), 放弃幂集穷举"
            ),
        }
    }
}

impl std::error::Error for ReconcileError {}

/// 调和结果.
#[derive(Debug, Clone)]
pub struct Reconciled {
    /// 调和后的二值掩膜. 每个前景体素必然属于某个被选中的超像素区域.
    pub mask: MaskVolume,

    /// 逐切片最佳 IoU. 无种子的切片为 `None`.
    pub slice_iou: Vec<Option<f64>>,
}

impl Reconciled {
    /// 有意义切片的最佳 IoU 均值. 所有切片都无种子时返回 `None`.
    pub fn mean_iou(&self) -> Option<f64> {
        let vals: Vec<f64> = self.slice_iou.iter().filter_map(|v| *v).collect();
        (!vals.is_empty()).then(|| vals.iter().sum::<f64>() / vals.len() as f64)
    }
}

/// 校验两个输入卷的形状.
fn check_shapes(lesion: &MaskVolume, labels: &LabelVolume) -> Result<(), ReconcileError> {
    if lesion.shape() != labels.shape() {
        return Err(ReconcileError::ShapeMismatch {
            lesion: lesion.shape(),
            labels: labels.shape(),
        });
    }
    Ok(())
}

/// 逐切片调和病灶掩膜. 切片按升序串行处理.
///
/// 结果是确定性的: 相同输入的重复运行产生逐位相同的掩膜与 IoU 序列.
pub fn reconcile(
    lesion: &MaskVolume,
    labels: &LabelVolume,
    params: &ReconcileParams,
) -> Result<Reconciled, ReconcileError> {
    check_shapes(lesion, labels)?;

    let (z_len, h, w) = lesion.shape();
    let mut out = Array3::from_elem((z_len, h, w), false);
    let mut slice_iou = Vec::with_capacity(z_len);

    for (z, (lesion_sli, label_sli)) in lesion.slice_iter().zip(labels.slice_iter()).enumerate() {
        let (best_mask, best_iou) = reconcile_slice(&lesion_sli, &label_sli, params, z)?;
        out.index_axis_mut(Axis(0), z).assign(&best_mask);
        slice_iou.push(best_iou);
    }

    Ok(Reconciled {
        mask: MaskVolume::from_parts(out),
        slice_iou,
    })
}

/// 单切片调和. 返回 (最佳掩膜, 最佳 IoU).
fn reconcile_slice(
    lesion: &MaskSlice,
    labels: &SpxSlice,
    params: &ReconcileParams,
    z: usize,
) -> Result<(Region2d, Option<f64>), ReconcileError> {
    let (h, w) = lesion.shape();
    let seeds = lesion.foreground_pos();
    if seeds.is_empty() {
        // 无种子切片: 全背景输出, 不做任何漫水填充.
        return Ok((Region2d::from_elem((h, w), false), None));
    }

    let mut accepted = Region2d::from_elem((h, w), false);
    let mut candidates: Vec<Region2d> = Vec::new();

    for seed in seeds {
        if accepted[seed] {
            // 该种子所在区域已被整体接受, 重新填充只会得到同一区域.
            continue;
        }
        let region = labels.flood(seed);
        let region_area = region.iter().filter(|p| **p).count();
        let inter = Zip::from(&region)
            .and(lesion.array_view())
            .fold(0usize, |acc, &r, &l| acc + usize::from(r && l));

        // 漫水填充必含种子, region_area > 0 恒成立.
        let level = inter as f64 / region_area as f64;
        if level > params.accept {
            accepted.zip_mut_with(&region, |a, &r| *a |= r);
        } else if level > params.consider && !candidates.iter().any(|m| m == &region) {
            candidates.push(region);
        }
    }

    if let Some(limit) = params.max_candidates {
        if candidates.len() > limit {
            return Err(ReconcileError::TooManyCandidates {
                slice: z,
                count: candidates.len(),
                limit,
            });
        }
    }

    // 幂集穷举: 子集按大小升序、同大小按候选插入序枚举.
    // 空集使 "只有接受并集" 的方案也参与竞争; 空并集的 IoU 记 0, 永远不会胜出.
    let mut best_iou = 0.0;
    let mut best_mask = Region2d::from_elem((h, w), false);
    for k in 0..=candidates.len() {
        for combo in (0..candidates.len()).combinations(k) {
            let mut union = accepted.clone();
            for idx in combo {
                union.zip_mut_with(&candidates[idx], |a, &r| *a |= r);
            }
            let cur = similarity::iou(union.view(), lesion.array_view()).unwrap_or(0.0);
            // 严格大于: 平局保留最先枚举到的子集.
            if cur > best_iou {
                best_iou = cur;
                best_mask = union;
            }
        }
    }

    Ok((best_mask, Some(best_iou)))
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        /// 借助 `rayon`, 并行地逐切片调和病灶掩膜.
        ///
        /// 切片之间没有数据依赖, 并行结果与 [`reconcile`] 逐位相同.
        pub fn par_reconcile(
            lesion: &MaskVolume,
            labels: &LabelVolume,
            params: &ReconcileParams,
        ) -> Result<Reconciled, ReconcileError> {
            check_shapes(lesion, labels)?;

            let lesion_view = lesion.data();
            let labels_view = labels.data();
            let results: Result<Vec<(Region2d, Option<f64>)>, ReconcileError> = lesion_view
                .axis_iter(Axis(0))
                .into_par_iter()
                .zip(labels_view.axis_iter(Axis(0)))
                .enumerate()
                .map(|(z, (l, s))| {
                    reconcile_slice(&MaskSlice::new(l), &SpxSlice::new(s), params, z)
                })
                .collect();
            let results = results?;

            let (z_len, h, w) = lesion.shape();
            let mut out = Array3::from_elem((z_len, h, w), false);
            let mut slice_iou = Vec::with_capacity(z_len);
            for (z, (best_mask, best_iou)) in results.into_iter().enumerate() {
                out.index_axis_mut(Axis(0), z).assign(&best_mask);
                slice_iou.push(best_iou);
            }

            Ok(Reconciled {
                mask: MaskVolume::from_parts(out),
                slice_iou,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LabelVolume, MaskVolume};
    use ndarray::{Array3, Axis};

    /// 4x4 单切片标签卷: 左半为区域 A (8 体素), 右半为区域 B (8 体素).
    fn two_region_labels() -> LabelVolume {
        let mut labels = Array3::from_elem((1, 4, 4), 0u16);
        for h in 0..4 {
            for w in 0..4 {
                labels[(0, h, w)] = if w < 2 { 10 } else { 20 };
            }
        }
        LabelVolume::from_parts(labels)
    }

    fn region_a_mask() -> MaskVolume {
        let mut data = Array3::from_elem((1, 4, 4), false);
        for h in 0..4 {
            for w in 0..2 {
                data[(0, h, w)] = true;
            }
        }
        MaskVolume::from_parts(data)
    }

    #[test]
    fn test_params_validation() {
        assert!(ReconcileParams::new(0.1, 0.9).is_some());
        assert!(ReconcileParams::new(0.0, 1.0).is_some());
        assert!(ReconcileParams::new(0.5, 0.5).is_some());
        assert!(ReconcileParams::new(0.9, 0.1).is_none());
        assert!(ReconcileParams::new(-0.1, 0.9).is_none());
        assert!(ReconcileParams::new(0.1, 1.1).is_none());
    }

    #[test]
    fn test_exact_region_match() {
        // 病灶恰为区域 A: 区域 A 重叠率 1.0 > 0.9, 直接接受; IoU = 1.
        let lesion = region_a_mask();
        let labels = two_region_labels();
        let out = reconcile(&lesion, &labels, &ReconcileParams::default()).unwrap();

        assert_eq!(out.mask, lesion);
        assert_eq!(out.slice_iou, vec![Some(1.0)]);
        assert_eq!(out.mean_iou(), Some(1.0));
    }

    #[test]
    fn test_partial_region_enters_candidate_band() {
        // 病灶为区域 A 去掉一个体素 (7/8): 重叠率 0.875 < 0.9, 进入候选集合;
        // 幂集穷举在 {A} 与空集之间选择 A (IoU 7/8 对 0).
        let mut lesion = region_a_mask().into_raw();
        lesion[(0, 3, 1)] = false;
        let lesion = MaskVolume::from_parts(lesion);
        let labels = two_region_labels();

        let out = reconcile(&lesion, &labels, &ReconcileParams::default()).unwrap();
        assert_eq!(out.mask, region_a_mask());
        assert_eq!(out.slice_iou, vec![Some(0.875)]);
    }

    #[test]
    fn test_empty_slice_is_skipped() {
        let lesion = MaskVolume::from_parts(Array3::from_elem((2, 4, 4), false));
        let labels = LabelVolume::from_parts(Array3::from_elem((2, 4, 4), 5u16));
        let out = reconcile(&lesion, &labels, &ReconcileParams::default()).unwrap();

        assert!(out.mask.is_empty_mask());
        assert_eq!(out.slice_iou, vec![None, None]);
        assert_eq!(out.mean_iou(), None);
    }

    #[test]
    fn test_output_is_union_of_regions() {
        // 病灶跨过两个区域的部分体素: 输出的每个前景体素都必须属于
        // 某个完整的漫水填充区域, 即输出只能是整区域的并集.
        let mut data = Array3::from_elem((1, 4, 4), false);
        // A 的 6/8 + B 的 2/8.
        for h in 0..3 {
            for w in 0..2 {
                data[(0, h, w)] = true;
            }
        }
        data[(0, 0, 2)] = true;
        data[(0, 0, 3)] = true;
        let lesion = MaskVolume::from_parts(data);
        let labels = two_region_labels();

        let out = reconcile(&lesion, &labels, &ReconcileParams::default()).unwrap();
        // 每个区域要么整体出现, 要么整体缺席.
        for region_w in [0usize..2, 2..4] {
            let count = out
                .mask
                .foreground_pos()
                .iter()
                .filter(|(_, _, w)| region_w.contains(w))
                .count();
            assert!(count == 0 || count == 8, "区域被部分选中: {count}");
        }
        // A (6/8): IoU(A, 病灶) = 6/10; B (2/8): IoU(B, 病灶) = 2/14;
        // A ∪ B: 8/16. 最优为 A 单独.
        assert_eq!(out.slice_iou, vec![Some(0.6)]);
    }

    #[test]
    fn test_idempotent_when_regions_align() {
        // 每个连通区域要么整体在病灶内, 要么整体在外: 输出必须精确复原病灶.
        let mut labels = Array3::from_elem((2, 4, 4), 0u16);
        let mut data = Array3::from_elem((2, 4, 4), false);
        for z in 0..2 {
            for h in 0..4 {
                for w in 0..4 {
                    labels[(z, h, w)] = if h < 2 { 1 } else { 2 };
                    data[(z, h, w)] = h < 2;
                }
            }
        }
        let lesion = MaskVolume::from_parts(data);
        let labels = LabelVolume::from_parts(labels);

        let out = reconcile(&lesion, &labels, &ReconcileParams::default()).unwrap();
        assert_eq!(out.mask, lesion);
        assert_eq!(out.slice_iou, vec![Some(1.0), Some(1.0)]);
    }

    #[test]
    fn test_determinism() {
        let mut lesion = region_a_mask().into_raw();
        lesion[(0, 3, 1)] = false;
        lesion[(0, 0, 2)] = true;
        let lesion = MaskVolume::from_parts(lesion);
        let labels = two_region_labels();
        let params = ReconcileParams::default();

        let a = reconcile(&lesion, &labels, &params).unwrap();
        let b = reconcile(&lesion, &labels, &params).unwrap();
        assert_eq!(a.mask, b.mask);
        assert_eq!(a.slice_iou, b.slice_iou);
    }

    #[cfg(feature = "rayon")]
    #[test]
    fn test_par_matches_serial() {
        let mut labels = Array3::from_elem((3, 6, 6), 0u16);
        let mut data = Array3::from_elem((3, 6, 6), false);
        for z in 0..3 {
            for h in 0..6 {
                for w in 0..6 {
                    labels[(z, h, w)] = (w as u16) / 2 + 10 * z as u16;
                    data[(z, h, w)] = w < 3 && h % 2 == 0;
                }
            }
        }
        let lesion = MaskVolume::from_parts(data);
        let labels = LabelVolume::from_parts(labels);
        let params = ReconcileParams::default();

        let serial = reconcile(&lesion, &labels, &params).unwrap();
        let parallel = par_reconcile(&lesion, &labels, &params).unwrap();
        assert_eq!(serial.mask, parallel.mask);
        assert_eq!(serial.slice_iou, parallel.slice_iou);
    }

    #[test]
    fn test_shape_mismatch() {
        let lesion = MaskVolume::from_parts(Array3::from_elem((1, 4, 4), false));
        let labels = LabelVolume::from_parts(Array3::from_elem((2, 4, 4), 0u16));
        let err = reconcile(&lesion, &labels, &ReconcileParams::default()).unwrap_err();
        assert!(matches!(err, ReconcileError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_candidate_cap() {
        // 棋盘病灶 + 列条带标签: 每个 1 体素宽条带 (4 体素) 与病灶重叠 2/4,
        // 全部落入考虑区间, 候选个数为列数.
        let mut labels = Array3::from_elem((1, 4, 4), 0u16);
        let mut data = Array3::from_elem((1, 4, 4), false);
        for h in 0..4 {
            for w in 0..4 {
                labels[(0, h, w)] = w as u16 + 1;
                data[(0, h, w)] = (h + w) % 2 == 0;
            }
        }
        let lesion = MaskVolume::from_parts(data);
        let labels = LabelVolume::from_parts(labels);

        let params = ReconcileParams::default().with_max_candidates(Some(2));
        let err = reconcile(&lesion, &labels, &params).unwrap_err();
        assert_eq!(
            err,
            ReconcileError::TooManyCandidates {
                slice: 0,
                count: 4,
                limit: 2
            }
        );

        // 不设上限时正常完成.
        let params = ReconcileParams::default().with_max_candidates(None);
        assert!(reconcile(&lesion, &labels, &params).is_ok());
    }
}
