//! 对 `ann-berry::study` 路径约定的更一层封装. 提供各分析程序的输入/输出目录.

use std::env;
use std::path::PathBuf;

/// 获取标注研究根目录.
///
/// 1. 若环境变量 `$ANN_STUDY_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/annotation/study`.
pub fn study_dir_from_env_or_home() -> PathBuf {
    if let Ok(d) = env::var("ANN_STUDY_DIR") {
        PathBuf::from(d)
    } else {
        ann_berry::study::home_annotation_dir_with(["study"]).unwrap()
    }
}

/// 获取病灶真值与超像素合并卷所在目录.
///
/// 1. 若环境变量 `$ANN_LESION_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/annotation/lesion`.
pub fn lesion_dir_from_env_or_home() -> PathBuf {
    if let Ok(d) = env::var("ANN_LESION_DIR") {
        PathBuf::from(d)
    } else {
        ann_berry::study::home_annotation_dir_with(["lesion"]).unwrap()
    }
}

/// 获取超像素合并卷 (`OS_` 文件) 所在目录.
///
/// 1. 若环境变量 `$ANN_MERGED_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/annotation/merged`.
pub fn merged_dir_from_env_or_home() -> PathBuf {
    if let Ok(d) = env::var("ANN_MERGED_DIR") {
        PathBuf::from(d)
    } else {
        ann_berry::study::home_annotation_dir_with(["merged"]).unwrap()
    }
}

/// 获取分析结果 (调和掩膜, JSON 汇总, 图表) 的输出目录.
///
/// 1. 若环境变量 `$ANN_OUT_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/annotation/out`.
pub fn out_dir_from_env_or_home() -> PathBuf {
    if let Ok(d) = env::var("ANN_OUT_DIR") {
        PathBuf::from(d)
    } else {
        ann_berry::study::home_annotation_dir_with(["out"]).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merged_dir_env_override() {
        env::set_var("ANN_MERGED_DIR", "/tmp/ann-merged-override");
        assert_eq!(
            merged_dir_from_env_or_home(),
            PathBuf::from("/tmp/ann-merged-override")
        );
        env::remove_var("ANN_MERGED_DIR");
        assert!(merged_dir_from_env_or_home().ends_with("merged"));
    }
}
