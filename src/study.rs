//! 病例目录布局.
//!
//! 一份病例是一个目录: CT 体数据 `ct.nii.gz`、结构掩膜目录
//! `segmentations/`、逐切片标注目录 `annotations/`.

use std::path::{Path, PathBuf};

/// 病例 CT 文件名.
pub const CT_FILE_NAME: &str = "ct.nii.gz";

/// 结构掩膜子目录名.
pub const MASK_DIR_NAME: &str = "segmentations";

/// 逐切片标注子目录名.
pub const ANNOTATION_DIR_NAME: &str = "annotations";

/// 病例根目录与它的标准子路径.
#[derive(Debug, Clone)]
pub struct StudyLayout {
    root: PathBuf,
}

impl StudyLayout {
    /// 以 `root` 为病例根目录.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// 病例根目录.
    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// CT 体数据文件全路径.
    #[inline]
    pub fn ct_path(&self) -> PathBuf {
        self.root.join(CT_FILE_NAME)
    }

    /// 结构掩膜目录全路径.
    #[inline]
    pub fn mask_dir(&self) -> PathBuf {
        self.root.join(MASK_DIR_NAME)
    }

    /// 逐切片标注目录全路径.
    #[inline]
    pub fn annotation_dir(&self) -> PathBuf {
        self.root.join(ANNOTATION_DIR_NAME)
    }
}

/// 获取 `{用户主目录}/study` 目录.
pub fn home_study_dir() -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push("study");
    Some(ans)
}

/// 获取 `{用户主目录}/study` 目录下给定继续项组成的全路径.
pub fn home_study_dir_with<P: AsRef<Path>, I: IntoIterator<Item = P>>(it: I) -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push("study");
    ans.extend(it);
    Some(ans)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let layout = StudyLayout::new("/data/case_007");
        assert_eq!(layout.ct_path(), PathBuf::from("/data/case_007/ct.nii.gz"));
        assert_eq!(
            layout.mask_dir(),
            PathBuf::from("/data/case_007/segmentations")
        );
        assert_eq!(
            layout.annotation_dir(),
            PathBuf::from("/data/case_007/annotations")
        );
    }
}
