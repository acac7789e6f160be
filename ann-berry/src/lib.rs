#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 提供膝关节 (KNEE) / 骶髂关节 (SPA) MRI 病灶标注研究数据的
//! 结构化信息和基础处理算法.
//!
//! 标注研究中的体数据一律以无 header 的 raw 文件存储, 元信息编码在文件名中
//! (见 [`raw`] 模块). 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 该 crate 按照最初标注任务的目录组织方式加载数据, 没有对其它来源的数据
//!   进行直接适配 (但如果新数据按照同样模式进行组织, 也可以工作).
//! 2. 在非期望情况下, 程序会直接 panic, 而不会导致内存错误. As what Rust promises.
//!
//! # 开发计划
//!
//! ### raw 体数据读写 ✅
//!
//! 无 header 的定长 raw 文件编解码, 多字节采样按大端序存储.
//! 文件名即元信息.
//!
//! 实现位于 `ann-berry/src/raw`.
//!
//! ### 掩膜/超像素切片视图 ✅
//!
//! 以 `(z, H, W)` 模式组织的三维体数据, 及其二维水平切片的轻量级视图.
//! 切片视图上提供种子枚举与 8-邻接漫水填充.
//!
//! 实现位于 `ann-berry/src/data`.
//!
//! ### 相似度度量 ✅
//!
//! IoU (交并比) 与 Dice 系数, 以及整体/逐切片的掩膜比较.
//! 并集为空时比较无意义, 以 `None` 表示, 不得当作 0.
//!
//! 实现位于 `ann-berry/src/similarity.rs`.
//!
//! ### 超像素掩膜调和 ✅
//!
//! 逐切片将病灶掩膜调和为连通超像素区域的并集: 漫水填充提取区域,
//! 按重叠率分为 "直接接受" 与 "候选" 两档, 再对候选集合的幂集做穷举搜索,
//! 取 IoU 最大的子集. 穷举是有意为之的设计决定, 以保证数值结果可复现.
//!
//! 实现位于 `ann-berry/src/reconcile`.
//!
//! ### 标注研究数据模型与加载器 ✅
//!
//! 标注类型 (解剖部位 x 协议 x 超像素密度) 在加载时一次性解码为强类型;
//! 测量值以复合键的有序映射存储, 取代原始脚本中的多层嵌套字典.
//!
//! 实现位于 `ann-berry/src/study`.
//!
//! ### 评分者一致性统计 ✅
//!
//! 一致面积占比与手动修正面积占比.
//!
//! 实现位于 `ann-berry/src/agreement.rs`.
//!
//! ### 图表绘制 ✅
//!
//! 柱状图/折线图, 仅消费已聚合的数值. 需要 `plot` feature.
//!
//! 实现位于 `ann-berry/src/plot.rs`.

/// 二维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx2d = (usize, usize);

/// 三维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

/// 二维布尔区域掩膜. 漫水填充的输出单位.
type Region2d = ndarray::Array2<bool>;

/// 三维标注体数据基础数据结构.
mod data;

pub use data::{
    ImgWriteVis, LabelVolume, ManualVolume, MaskSlice, MaskSliceMut, MaskVolume, OwnedMaskSlice,
    SpxSlice, VolumeAttr,
};

pub mod consts;

pub mod agreement;
pub mod raw;
pub mod reconcile;
pub mod similarity;
pub mod study;

#[cfg(feature = "plot")]
pub mod plot;

pub mod prelude;
