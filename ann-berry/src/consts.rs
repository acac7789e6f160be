//! 通用常量.

/// 体素标记值.
pub mod marker {
    /// 真值病灶 raw 文件中, 病灶体素的标记值.
    pub const LESION: u8 = 255;

    /// 标注 raw 文件中, 背景体素的值.
    pub const EMPTY: u8 = 0;

    /// 超像素标注中, 前景体素的值.
    pub const SP_FOREGROUND: u8 = 1;

    /// 手动修正中, 增补体素的值.
    pub const MANUAL_ADD: i8 = 1;

    /// 手动修正中, 删减体素的值.
    pub const MANUAL_REMOVE: i8 = -1;

    /// 体素是否是病灶标记?
    #[inline]
    pub const fn is_lesion(p: u8) -> bool {
        matches!(p, LESION)
    }

    /// 超像素标注体素取值是否合法?
    #[inline]
    pub const fn is_valid_sp(p: u8) -> bool {
        matches!(p, EMPTY | SP_FOREGROUND)
    }

    /// 手动修正体素取值是否合法?
    #[inline]
    pub const fn is_valid_manual(p: i8) -> bool {
        matches!(p, MANUAL_REMOVE | 0 | MANUAL_ADD)
    }
}

/// 骶髂关节 (SPA) 研究病例编号.
pub const SPA_CASE_LIST: [u32; 9] = [4, 8, 9, 10, 11, 27, 33, 38, 39];

/// 膝关节 (KNEE) 研究病例编号.
pub const KNEE_CASE_LIST: [u32; 6] = [1, 5, 7, 10, 11, 12];

/// 研究默认的评分者数量.
pub const RATER_LEN: usize = 4;
