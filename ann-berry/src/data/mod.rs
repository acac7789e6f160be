use std::ops::{Index, IndexMut};

use ndarray::{Array3, ArrayView, Axis, Ix3};

use crate::{Idx2d, Idx3d};

pub mod slice;

pub use slice::{ImgWriteVis, MaskSlice, MaskSliceMut, OwnedMaskSlice, SpxSlice};

/// 三维标注体数据的形状属性与部分通用操作.
///
/// 所有体数据一律以 `(z, H, W)` 模式组织: 第一维为切片方向,
/// 第二/三维分别为自然图像的垂直与水平方向.
pub trait VolumeAttr {
    /// 获取数据形状大小 `(z, H, W)`.
    fn shape(&self) -> Idx3d;

    /// 获取数据水平切片形状大小 `(H, W)`.
    #[inline]
    fn slice_shape(&self) -> Idx2d {
        let (_, h, w) = self.shape();
        (h, w)
    }

    /// 获取水平切片个数.
    #[inline]
    fn len_z(&self) -> usize {
        self.shape().0
    }

    /// 获取数据体素个数.
    #[inline]
    fn size(&self) -> usize {
        let (z, h, w) = self.shape();
        z * h * w
    }

    /// 检查索引是否合法.
    #[inline]
    fn check(&self, (z0, h0, w0): &Idx3d) -> bool {
        let (z, h, w) = self.shape();
        *z0 < z && *h0 < h && *w0 < w
    }
}

#[inline]
fn shape3<T>(data: &Array3<T>) -> Idx3d {
    let &[z, h, w] = data.shape() else {
        unreachable!()
    };
    (z, h, w)
}

/// 三维二值掩膜体数据. 可代表病灶真值、超像素标注或合成标注.
///
/// 一旦创建即不再逐体素修改; 所有加工操作都会生成新的实体.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskVolume {
    data: Array3<bool>,
}

impl VolumeAttr for MaskVolume {
    #[inline]
    fn shape(&self) -> Idx3d {
        shape3(&self.data)
    }
}

impl Index<Idx3d> for MaskVolume {
    type Output = bool;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl MaskVolume {
    /// 从裸布尔数据直接创建.
    #[inline]
    pub fn from_parts(data: Array3<bool>) -> Self {
        Self { data }
    }

    /// 以标记值 `marker` 对裸 `u8` 体数据二值化.
    ///
    /// 构造后前景体素个数恒等于原数据中值为 `marker` 的体素个数.
    pub fn from_raw(raw: &Array3<u8>, marker: u8) -> Self {
        Self {
            data: raw.mapv(|p| p == marker),
        }
    }

    /// 创建同形状的全背景掩膜.
    pub fn zeros_like<V: VolumeAttr>(other: &V) -> Self {
        let (z, h, w) = other.shape();
        Self {
            data: Array3::from_elem((z, h, w), false),
        }
    }

    /// 获取前景体素总个数.
    #[inline]
    pub fn count_foreground(&self) -> usize {
        self.data.iter().filter(|p| **p).count()
    }

    /// 该掩膜是否为全背景?
    #[inline]
    pub fn is_empty_mask(&self) -> bool {
        !self.data.iter().any(|p| *p)
    }

    /// 获取 z 空间的第 `z_index` 层不可变切片.
    ///
    /// 当 `z_index` 越界时 panic.
    #[inline]
    pub fn slice_at(&self, z_index: usize) -> MaskSlice<'_> {
        MaskSlice::new(self.data.index_axis(Axis(0), z_index))
    }

    /// 获取 z 空间的第 `z_index` 层可变切片.
    ///
    /// 当 `z_index` 越界时 panic.
    #[inline]
    pub fn slice_at_mut(&mut self, z_index: usize) -> MaskSliceMut<'_> {
        MaskSliceMut::new(self.data.index_axis_mut(Axis(0), z_index))
    }

    /// 获取能按升序迭代水平不可变切片的迭代器.
    #[inline]
    pub fn slice_iter(&self) -> impl ExactSizeIterator<Item = MaskSlice> {
        self.data.axis_iter(Axis(0)).map(MaskSlice::new)
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, bool, Ix3> {
        self.data.view()
    }

    /// 直接获得底层数据.
    #[inline]
    pub fn into_raw(self) -> Array3<bool> {
        self.data
    }

    /// 收集所有前景体素对应的下标. 结果按行优先存储.
    pub fn foreground_pos(&self) -> Vec<Idx3d> {
        self.data
            .indexed_iter()
            .filter_map(|(ref pos, p)| p.then_some(*pos))
            .collect()
    }

    /// 将手动修正 `manual` 应用到超像素掩膜 `self` 上, 得到合成掩膜.
    ///
    /// 每个体素的合成值为 `sp + manual`, 其合法取值只能是 0 或 1.
    /// 若某体素的合成值越出该范围 (例如在背景上删减),
    /// 则返回 `Err` 并携带第一个非法体素的下标.
    ///
    /// 若两者形状不一致, 则程序 panic.
    pub fn apply_corrections(&self, manual: &ManualVolume) -> Result<MaskVolume, Idx3d> {
        assert_eq!(self.shape(), manual.shape(), "掩膜与手动修正形状不一致");

        let mut out = Array3::from_elem(self.shape(), false);
        for ((pos, &sp), (&m, o)) in self
            .data
            .indexed_iter()
            .zip(manual.data.iter().zip(out.iter_mut()))
        {
            *o = match i8::from(sp) + m {
                0 => false,
                1 => true,
                _ => return Err(pos),
            };
        }
        Ok(MaskVolume { data: out })
    }
}

/// 三维超像素标签体数据. 每个体素保存上游超像素合并管线输出的 `u16` 采样值,
/// 连通的同值体素构成一个超像素区域.
#[derive(Debug, Clone)]
pub struct LabelVolume {
    data: Array3<u16>,
}

impl VolumeAttr for LabelVolume {
    #[inline]
    fn shape(&self) -> Idx3d {
        shape3(&self.data)
    }
}

impl Index<Idx3d> for LabelVolume {
    type Output = u16;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl LabelVolume {
    /// 从裸标签数据直接创建.
    #[inline]
    pub fn from_parts(data: Array3<u16>) -> Self {
        Self { data }
    }

    /// 获取 z 空间的第 `z_index` 层不可变切片.
    ///
    /// 当 `z_index` 越界时 panic.
    #[inline]
    pub fn slice_at(&self, z_index: usize) -> SpxSlice<'_> {
        SpxSlice::new(self.data.index_axis(Axis(0), z_index))
    }

    /// 获取能按升序迭代水平不可变切片的迭代器.
    #[inline]
    pub fn slice_iter(&self) -> impl ExactSizeIterator<Item = SpxSlice> {
        self.data.axis_iter(Axis(0)).map(SpxSlice::new)
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, u16, Ix3> {
        self.data.view()
    }
}

/// 三维手动修正体数据. 体素取值为 -1 (删减), 0 (不变), 1 (增补);
/// 手动协议下整卷即标注本体, 取值限于 0/1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualVolume {
    data: Array3<i8>,
}

impl VolumeAttr for ManualVolume {
    #[inline]
    fn shape(&self) -> Idx3d {
        shape3(&self.data)
    }
}

impl Index<Idx3d> for ManualVolume {
    type Output = i8;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx3d> for ManualVolume {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl ManualVolume {
    /// 从裸数据直接创建.
    #[inline]
    pub fn from_parts(data: Array3<i8>) -> Self {
        Self { data }
    }

    /// 获取修正面积, 即非零体素的总个数.
    /// 增补与删减同样计为一次修正.
    #[inline]
    pub fn correction_area(&self) -> usize {
        self.data.iter().filter(|p| **p != 0).count()
    }

    /// 收集取值非法 (不在 -1..=1 中) 的第一个体素下标.
    pub fn first_invalid(&self) -> Option<Idx3d> {
        self.data
            .indexed_iter()
            .find_map(|(pos, &p)| (!crate::consts::marker::is_valid_manual(p)).then_some(pos))
    }

    /// 以 0/1 取值直接视为二值掩膜 (手动协议).
    ///
    /// 若存在删减体素 (-1), 则返回 `Err` 并携带其下标.
    pub fn to_mask(&self) -> Result<MaskVolume, Idx3d> {
        let mut out = Array3::from_elem(self.shape(), false);
        for ((pos, &p), o) in self.data.indexed_iter().zip(out.iter_mut()) {
            *o = match p {
                0 => false,
                1 => true,
                _ => return Err(pos),
            };
        }
        Ok(MaskVolume { data: out })
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, i8, Ix3> {
        self.data.view()
    }
}
