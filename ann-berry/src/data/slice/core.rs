use crate::{Idx2d, Region2d};
use ndarray::iter::{Iter, IterMut};
use ndarray::{Array2, ArrayView2, ArrayViewMut2, Ix2};
use std::collections::VecDeque;

/// 不可变、借用的二维水平掩膜切片.
pub struct MaskSlice<'a> {
    /// 底层数据的轻量级视图, 借用于 [`crate::MaskVolume`].
    ///
    /// 这里有意把代码写死为 `ArrayView` 降低灵活性, 但使结构的意图更加明确.
    data: ArrayView2<'a, bool>,
}

/// 可变、借用的二维水平掩膜切片.
pub struct MaskSliceMut<'a> {
    /// 底层数据的轻量级视图, 借用于 [`crate::MaskVolume`].
    data: ArrayViewMut2<'a, bool>,
}

/// 可变方法集合.
impl<'a> MaskSliceMut<'a> {
    /// 获取可以迭代并修改切片体素的迭代器.
    #[inline]
    pub fn iter_mut(&mut self) -> IterMut<'_, bool, Ix2> {
        self.data.iter_mut()
    }

    /// 用 `other` 覆写原本 `self` 的内容.
    ///
    /// 如果两者形状不符, 则程序 panic.
    pub fn assign(&mut self, other: &Region2d) {
        let &[h, w] = other.shape() else {
            unreachable!()
        };
        assert_eq!(self.shape(), (h, w), "切片形状不一致");
        self.data.assign(other);
    }

    /// 将 `it` 中的每个索引对应的体素置为前景.
    pub fn fill_batch<I: IntoIterator<Item = Idx2d>>(&mut self, it: I) {
        for pos in it.into_iter() {
            self.data[pos] = true;
        }
    }
}

/// 掩膜切片不可变方法集合.
macro_rules! impl_mask_slice_immut {
    ($life: lifetime, $slice: ty, $array: ty) => {
        /// 不可变方法集合.
        impl<$life> $slice {
            /// 直接初始化.
            #[inline]
            pub(crate) fn new(data: $array) -> Self {
                Self { data }
            }

            /// 获得 **底层** 数据的一份不可变 shallow copy.
            #[inline]
            pub fn array_view(&self) -> ArrayView2<bool> {
                self.data.view()
            }

            /// 获取可以迭代切片体素的迭代器.
            #[inline]
            pub fn iter(&self) -> Iter<'_, bool, Ix2> {
                self.data.iter()
            }

            /// 获取给定位置 (高, 宽) 的体素值. 越界时返回 `None`.
            #[inline]
            pub fn get(&self, pos: Idx2d) -> Option<&bool> {
                self.data.get(pos)
            }

            /// 切片的分辨率 (高, 宽).
            #[inline]
            pub fn shape(&self) -> Idx2d {
                let &[h, w] = self.data.shape() else {
                    unreachable!()
                };
                (h, w)
            }

            /// 切片的体素个数.
            #[inline]
            pub fn size(&self) -> usize {
                let (h, w) = self.shape();
                h * w
            }

            /// 判断一个索引是否合法 (未越界).
            #[inline]
            pub fn check(&self, (h, w): Idx2d) -> bool {
                let (h_len, w_len) = self.shape();
                h < h_len && w < w_len
            }

            /// 统计切片中前景体素的总个数.
            #[inline]
            pub fn count_foreground(&self) -> usize {
                self.data.iter().filter(|p| **p).count()
            }

            /// 该切片是否为全背景?
            #[inline]
            pub fn is_empty_mask(&self) -> bool {
                !self.data.iter().any(|p| *p)
            }

            /// 以行优先规则, 收集切片中所有前景体素的索引.
            /// 这些索引即调和过程的种子坐标.
            pub fn foreground_pos(&self) -> Vec<Idx2d> {
                self.data
                    .indexed_iter()
                    .filter_map(|(pos, &p)| p.then_some(pos))
                    .collect()
            }

            /// 以行优先规则, 获取能迭代切片所有 `(索引, 体素值)` 的迭代器.
            #[inline]
            pub fn indexed_iter(&self) -> impl Iterator<Item = (Idx2d, &bool)> {
                self.data.indexed_iter()
            }

            /// 克隆自己, 获得一个拥有所有权的切片对象.
            pub fn to_owned(&self) -> OwnedMaskSlice {
                OwnedMaskSlice {
                    data: self.data.to_owned(),
                }
            }
        }
    };
}

impl_mask_slice_immut!('a, MaskSlice<'a>, ArrayView2<'a, bool>);
impl_mask_slice_immut!('a, MaskSliceMut<'a>, ArrayViewMut2<'a, bool>);

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 拥有所有权的二维水平掩膜切片.
///
/// `OwnedMaskSlice` 仅提供到 `MaskSlice` 的轻量转换和底层数据移动,
/// 不提供任何其它方法.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnedMaskSlice {
    data: Array2<bool>,
}

impl OwnedMaskSlice {
    /// 获得不可变切片引用.
    #[inline]
    pub fn as_immut(&self) -> MaskSlice<'_> {
        MaskSlice::new(self.data.view())
    }

    /// 直接获得底层数据.
    #[inline]
    pub fn into_raw(self) -> Array2<bool> {
        self.data
    }
}

impl From<Region2d> for OwnedMaskSlice {
    #[inline]
    fn from(data: Region2d) -> Self {
        Self { data }
    }
}

/// 不可变、借用的二维水平超像素标签切片.
pub struct SpxSlice<'a> {
    /// 底层数据的轻量级视图, 借用于 [`crate::LabelVolume`].
    data: ArrayView2<'a, u16>,
}

impl<'a> SpxSlice<'a> {
    /// 直接初始化.
    #[inline]
    pub(crate) fn new(data: ArrayView2<'a, u16>) -> Self {
        Self { data }
    }

    /// 获得底层数据的一份不可变 shallow copy.
    #[inline]
    pub fn array_view(&self) -> ArrayView2<u16> {
        self.data.view()
    }

    /// 获取给定位置 (高, 宽) 的标签值. 越界时返回 `None`.
    #[inline]
    pub fn get(&self, pos: Idx2d) -> Option<&u16> {
        self.data.get(pos)
    }

    /// 切片的分辨率 (高, 宽).
    #[inline]
    pub fn shape(&self) -> Idx2d {
        let &[h, w] = self.data.shape() else {
            unreachable!()
        };
        (h, w)
    }

    /// 判断一个索引是否合法 (未越界).
    #[inline]
    pub fn check(&self, (h, w): Idx2d) -> bool {
        let (h_len, w_len) = self.shape();
        h < h_len && w < w_len
    }

    /// 从 `seed` 出发做 8-邻接漫水填充, 返回与种子同标签值的连通区域掩膜.
    ///
    /// 两个体素属于同一区域, 当且仅当存在一条 8-相邻路径,
    /// 路径上所有体素 (含端点) 的标签值都与种子相等.
    /// 返回的区域必然包含 `seed` 本身, 即至少有一个前景体素.
    ///
    /// 当 `seed` 越界时程序 panic.
    pub fn flood(&self, seed: Idx2d) -> Region2d {
        let (height, width) = self.shape();
        assert!(self.check(seed), "种子坐标越界");

        let target = self.data[seed];
        let mut region = Array2::from_elem((height, width), false);
        let mut bfs_q = VecDeque::with_capacity(16);

        region[seed] = true;
        bfs_q.push_back(seed);

        while let Some((h, w)) = bfs_q.pop_front() {
            // bfs, 8-邻接.
            for nh in h.saturating_sub(1)..=usize::min(h + 1, height - 1) {
                for nw in w.saturating_sub(1)..=usize::min(w + 1, width - 1) {
                    if !region[(nh, nw)] && self.data[(nh, nw)] == target {
                        region[(nh, nw)] = true;
                        bfs_q.push_back((nh, nw));
                    }
                }
            }
        }
        region
    }
}
