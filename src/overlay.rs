//! 结构掩膜目录: 与 CT 体数据几何对齐的具名 3D 二值掩膜集合.
//!
//! 目录中每个 `<name>.nii.gz` 文件是一个结构掩膜, 通过目录列举发现,
//! 名字由剥掉复合后缀得到. 传播输出以保留名
//! [`crate::consts::PROPAGATED_MASK_NAME`] 发布到同一目录,
//! 之后与其他结构掩膜走同一条读取路径.

use crate::consts::MASK_VOLUME_SUFFIX;
use crate::data::get_shape_from_header;
use crate::{Idx3d, MaskVolume};
use ndarray::Array3;
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiObject, ReaderOptions};
use std::fs;
use std::path::{Path, PathBuf};

/// 结构掩膜目录的运行时错误.
#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    /// 底层 I/O 错误.
    #[error("掩膜目录 I/O 失败: {0}")]
    Io(#[from] std::io::Error),

    /// nifti 读写错误.
    #[error("掩膜体读写失败: {0}")]
    Nifti(#[from] nifti::NiftiError),

    /// 请求的结构不存在.
    #[error("结构掩膜 `{0}` 不存在")]
    NotFound(String),

    /// 掩膜体与 CT 体数据形状不一致. 这是完整性错误.
    #[error("掩膜体形状不符: 期望 {expected:?}, 实际 {actual:?}")]
    ShapeMismatch {
        /// 期望的 `(z, h, w)`.
        expected: Idx3d,
        /// 实际的 `(z, h, w)`.
        actual: Idx3d,
    },
}

/// 结构掩膜目录.
#[derive(Debug, Clone)]
pub struct OverlayDir {
    dir: PathBuf,
}

impl OverlayDir {
    /// 打开 (必要时创建) 掩膜目录.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, OverlayError> {
        fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
        })
    }

    /// 目录路径.
    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}{MASK_VOLUME_SUFFIX}"))
    }

    /// 枚举目录内全部结构名, 升序排列.
    ///
    /// 只认 `<name>.nii.gz`; 隐藏文件与其他扩展名一律忽略.
    pub fn structure_names(&self) -> Result<Vec<String>, OverlayError> {
        let mut ans: Vec<String> = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            if let Some(stem) = name.strip_suffix(MASK_VOLUME_SUFFIX) {
                ans.push(stem.to_owned());
            }
        }
        ans.sort_unstable();
        Ok(ans)
    }

    /// 读取名为 `name` 的结构掩膜. 非零体素折叠为前景.
    pub fn load(&self, name: &str) -> Result<MaskVolume, OverlayError> {
        let path = self.path_of(name);
        if !path.exists() {
            return Err(OverlayError::NotFound(name.to_owned()));
        }
        let obj = ReaderOptions::new().read_file(&path)?;
        let shape = get_shape_from_header(obj.header());

        // [W, H, z] -> [z, H, W], 与 CT 扫描同一约定.
        let data = obj
            .into_volume()
            .into_ndarray::<u8>()?
            .permuted_axes([2, 1, 0].as_slice());
        debug_assert!(data.is_standard_layout());

        // 该操作不会生成 `Err`, 可直接 unwrap.
        let data = Array3::<u8>::from_shape_vec(shape, data.into_raw_vec()).unwrap();
        Ok(MaskVolume::from_raw(data))
    }

    /// 读取名为 `name` 的结构掩膜, 并校验其形状与 `expected` 一致.
    pub fn load_checked(&self, name: &str, expected: Idx3d) -> Result<MaskVolume, OverlayError> {
        let mask = self.load(name)?;
        if mask.shape() != expected {
            return Err(OverlayError::ShapeMismatch {
                expected,
                actual: mask.shape(),
            });
        }
        Ok(mask)
    }

    /// 以名字 `name` 发布一个完整掩膜体.
    ///
    /// 先写同目录隐藏临时文件, 再原子改名. 任何失败路径都不会让
    /// 读者看到半写的掩膜体, 临时文件也会被清理.
    pub fn publish(&self, name: &str, mask: &MaskVolume) -> Result<(), OverlayError> {
        let tmp = self.dir.join(format!(".tmp_{name}{MASK_VOLUME_SUFFIX}"));

        // [z, H, W] -> [W, H, z], 回到 nifti 惯用存储序.
        let view = mask.data().permuted_axes([2, 1, 0]);
        let data = view.as_standard_layout();

        let result = WriterOptions::new(&tmp)
            .write_nifti(&data)
            .map_err(OverlayError::from)
            .and_then(|()| fs::rename(&tmp, self.path_of(name)).map_err(OverlayError::from));
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result
    }
}
