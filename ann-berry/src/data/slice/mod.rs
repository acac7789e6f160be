//! 二维水平切片视图.
//!
//! 切片是调和与统计工作的独立处理单元, 切片之间没有任何数据依赖.

mod core;
mod save;

pub use core::{MaskSlice, MaskSliceMut, OwnedMaskSlice, SpxSlice};
pub use save::ImgWriteVis;
