//! 无 header 的 raw 体数据文件读写.
//!
//! 文件布局: `slices × height × width` 个采样, 按切片序 + 行优先存储,
//! 多字节采样一律以 **大端序** 编码. 文件内没有 header 和校验和,
//! 解码所需的全部元信息按位置编码在文件名中:
//!
//! ```text
//! <tag>_<case_no>_<height>_<width>_<slices>_<unused>_.raw
//! ```
//!
//! 16 位采样的大端序是最初标注管线的既成事实; 若数据源自小端序管线,
//! 解码结果将是字节序颠倒的, 调用方需自行确认数据来源.

use crate::{Idx3d, ManualVolume, MaskVolume};
use ndarray::Array3;
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// raw 文件读写错误.
#[derive(Debug)]
pub enum RawError {
    /// 文件名无法解码出预期的元信息字段.
    MalformedFilename(String),

    /// 不支持的采样字节宽度. 只允许 1, 2, 4.
    UnsupportedSampleWidth(usize),

    /// 文件实际字节数与元信息不符.
    Truncated {
        /// 元信息蕴含的字节数.
        expected: usize,
        /// 文件实际字节数.
        actual: usize,
    },

    /// 底层 I/O 错误.
    Io(io::Error),
}

impl fmt::Display for RawError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedFilename(name) => write!(f, "无法解码的 raw 文件名: `{name}`"),
            Self::UnsupportedSampleWidth(n) => {
                write!(f, "不支持的采样字节宽度: {n} (只允许 1, 2, 4)")
            }
            Self::Truncated { expected, actual } => {
                write!(f, "raw 文件长度不符: 期望 {expected} 字节, 实际 {actual} 字节")
            }
            Self::Io(e) => write!(f, "raw 文件 I/O 错误: {e}"),
        }
    }
}

impl std::error::Error for RawError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for RawError {
    #[inline]
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// 采样字节宽度.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SampleWidth {
    /// 单字节采样 (标注掩膜).
    B1,

    /// 双字节采样, 大端序 (超像素标签).
    B2,

    /// 四字节采样, 大端序.
    B4,
}

impl SampleWidth {
    /// 从字节数构造. 字节数不为 1, 2, 4 时返回 `Err`.
    pub fn from_nbytes(n: usize) -> Result<Self, RawError> {
        match n {
            1 => Ok(Self::B1),
            2 => Ok(Self::B2),
            4 => Ok(Self::B4),
            other => Err(RawError::UnsupportedSampleWidth(other)),
        }
    }

    /// 每采样字节数.
    #[inline]
    pub fn nbytes(&self) -> usize {
        match self {
            Self::B1 => 1,
            Self::B2 => 2,
            Self::B4 => 4,
        }
    }
}

/// raw 文件的元信息, 从文件名一次性解码.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RawMeta {
    /// 文件类别标签, 如 `GT` (真值), `OS` (超像素合并), `ML` (调和病灶).
    pub tag: String,

    /// 病例编号.
    pub case_no: u32,

    /// 切片高度.
    pub height: usize,

    /// 切片宽度.
    pub width: usize,

    /// 切片个数.
    pub slices: usize,
}

impl RawMeta {
    /// 从文件名解码元信息.
    ///
    /// 文件名必须恰好由 7 个下划线分隔字段构成, 且以 `.raw` 结尾,
    /// 否则返回 [`RawError::MalformedFilename`].
    pub fn parse_filename(name: &str) -> Result<Self, RawError> {
        let malformed = || RawError::MalformedFilename(name.to_owned());

        let fields: Vec<&str> = name.split('_').collect();
        let [tag, case_no, height, width, slices, _unused, ext] = fields.as_slice() else {
            return Err(malformed());
        };
        if *ext != ".raw" {
            return Err(malformed());
        }

        Ok(Self {
            tag: (*tag).to_owned(),
            case_no: case_no.parse().map_err(|_| malformed())?,
            height: height.parse().map_err(|_| malformed())?,
            width: width.parse().map_err(|_| malformed())?,
            slices: slices.parse().map_err(|_| malformed())?,
        })
    }

    /// 将元信息编码回文件名. 未使用字段固定写为 `1`.
    pub fn filename(&self) -> String {
        format!(
            "{}_{}_{}_{}_{}_1_.raw",
            self.tag, self.case_no, self.height, self.width, self.slices
        )
    }

    /// 获得同一病例下、类别标签为 `tag` 的配套文件元信息.
    pub fn with_tag(&self, tag: &str) -> Self {
        Self {
            tag: tag.to_owned(),
            ..self.clone()
        }
    }

    /// 体数据形状 `(z, H, W)`.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        (self.slices, self.height, self.width)
    }

    /// 体素个数.
    #[inline]
    pub fn size(&self) -> usize {
        self.slices * self.height * self.width
    }
}

/// 读取文件全部字节并校验长度.
fn read_sized(path: &Path, expected: usize) -> Result<Vec<u8>, RawError> {
    let mut buf = Vec::with_capacity(expected);
    File::open(path)?.read_to_end(&mut buf)?;
    if buf.len() != expected {
        return Err(RawError::Truncated {
            expected,
            actual: buf.len(),
        });
    }
    Ok(buf)
}

/// 读取单字节采样体数据.
pub fn read_volume_u8<P: AsRef<Path>>(path: P, meta: &RawMeta) -> Result<Array3<u8>, RawError> {
    let buf = read_sized(path.as_ref(), meta.size())?;
    // 长度已校验, 该操作不会生成 `Err`, 可直接 unwrap.
    Ok(Array3::from_shape_vec(meta.shape(), buf).unwrap())
}

/// 读取单字节采样体数据, 并按补码直接重释为有符号值.
pub fn read_volume_i8<P: AsRef<Path>>(path: P, meta: &RawMeta) -> Result<Array3<i8>, RawError> {
    let buf = read_sized(path.as_ref(), meta.size())?;
    let buf: Vec<i8> = buf.into_iter().map(|b| b as i8).collect();
    Ok(Array3::from_shape_vec(meta.shape(), buf).unwrap())
}

/// 读取双字节采样体数据 (大端序).
pub fn read_volume_u16<P: AsRef<Path>>(path: P, meta: &RawMeta) -> Result<Array3<u16>, RawError> {
    let buf = read_sized(path.as_ref(), 2 * meta.size())?;
    let buf: Vec<u16> = buf
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect();
    Ok(Array3::from_shape_vec(meta.shape(), buf).unwrap())
}

/// 读取四字节采样体数据 (大端序).
pub fn read_volume_u32<P: AsRef<Path>>(path: P, meta: &RawMeta) -> Result<Array3<u32>, RawError> {
    let buf = read_sized(path.as_ref(), 4 * meta.size())?;
    let buf: Vec<u32> = buf
        .chunks_exact(4)
        .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    Ok(Array3::from_shape_vec(meta.shape(), buf).unwrap())
}

/// 读取单字节采样体数据并以标记值 `marker` 二值化为掩膜.
#[inline]
pub fn read_mask_volume<P: AsRef<Path>>(
    path: P,
    meta: &RawMeta,
    marker: u8,
) -> Result<MaskVolume, RawError> {
    Ok(MaskVolume::from_raw(&read_volume_u8(path, meta)?, marker))
}

/// 读取单字节采样的手动修正体数据.
#[inline]
pub fn read_manual_volume<P: AsRef<Path>>(
    path: P,
    meta: &RawMeta,
) -> Result<ManualVolume, RawError> {
    Ok(ManualVolume::from_parts(read_volume_i8(path, meta)?))
}

/// 按采样字节宽度分派解码得到的体数据.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RawVolume {
    /// 单字节采样.
    B1(Array3<u8>),

    /// 双字节采样 (大端序).
    B2(Array3<u16>),

    /// 四字节采样 (大端序).
    B4(Array3<u32>),
}

impl RawVolume {
    /// 本体数据的采样字节宽度.
    #[inline]
    pub fn width(&self) -> SampleWidth {
        match self {
            Self::B1(_) => SampleWidth::B1,
            Self::B2(_) => SampleWidth::B2,
            Self::B4(_) => SampleWidth::B4,
        }
    }
}

/// 按每采样 `nbytes` 字节分派读取体数据.
///
/// `nbytes` 不为 1, 2, 4 时返回 [`RawError::UnsupportedSampleWidth`].
pub fn read_volume<P: AsRef<Path>>(
    path: P,
    meta: &RawMeta,
    nbytes: usize,
) -> Result<RawVolume, RawError> {
    Ok(match SampleWidth::from_nbytes(nbytes)? {
        SampleWidth::B1 => RawVolume::B1(read_volume_u8(path, meta)?),
        SampleWidth::B2 => RawVolume::B2(read_volume_u16(path, meta)?),
        SampleWidth::B4 => RawVolume::B4(read_volume_u32(path, meta)?),
    })
}

/// 由文件实际长度推断采样字节宽度.
///
/// 文件长度必须恰好是体素个数的 1, 2 或 4 倍; 长度不是体素个数整数倍时
/// 返回 [`RawError::Truncated`].
pub fn detect_sample_width<P: AsRef<Path>>(
    path: P,
    meta: &RawMeta,
) -> Result<SampleWidth, RawError> {
    let actual = std::fs::metadata(path)?.len() as usize;
    if meta.size() == 0 || actual % meta.size() != 0 {
        return Err(RawError::Truncated {
            expected: meta.size(),
            actual,
        });
    }
    SampleWidth::from_nbytes(actual / meta.size())
}

/// 将掩膜以单字节采样写出, 前景体素写为 `marker`, 背景写为 0.
pub fn write_mask_volume<P: AsRef<Path>>(
    path: P,
    mask: &MaskVolume,
    marker: u8,
) -> Result<(), RawError> {
    let mut w = BufWriter::new(File::create(path)?);
    for &p in mask.data().iter() {
        w.write_all(&[if p { marker } else { 0 }])?;
    }
    w.flush()?;
    Ok(())
}

/// 将双字节采样体数据以大端序写出.
pub fn write_volume_u16<P: AsRef<Path>>(path: P, data: &Array3<u16>) -> Result<(), RawError> {
    let mut w = BufWriter::new(File::create(path)?);
    for &p in data.iter() {
        w.write_all(&p.to_be_bytes())?;
    }
    w.flush()?;
    Ok(())
}

/// 枚举目录下所有文件名可解码的 raw 文件, 按病例编号升序返回.
///
/// 扩展名为 `.raw` 但文件名无法解码的文件会被跳过并记录 warn 日志;
/// 其它文件被静默忽略.
pub fn scan_dir<P: AsRef<Path>>(dir: P) -> Result<Vec<(RawMeta, PathBuf)>, RawError> {
    let mut ans = Vec::new();
    for entry in std::fs::read_dir(dir.as_ref())? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.ends_with(".raw") {
            continue;
        }
        match RawMeta::parse_filename(name) {
            Ok(meta) => ans.push((meta, path)),
            Err(e) => log::warn!("跳过 `{}`: {e}", path.display()),
        }
    }
    ans.sort_by_key(|(meta, _)| meta.case_no);
    Ok(ans)
}
