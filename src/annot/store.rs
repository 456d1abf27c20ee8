use crate::consts::gray::*;
use crate::consts::{ANNOTATION_EXT, ANNOTATION_PREFIX};
use crate::Idx2d;
use ndarray::Array2;
use std::fs;
use std::path::{Path, PathBuf};

/// 标注仓库的运行时错误.
#[derive(Debug, thiserror::Error)]
pub enum AnnotError {
    /// 底层 I/O 错误. 保存/清除未完成时必须立即上报,
    /// 内存侧不得假装成功.
    #[error("标注 I/O 失败: {0}")]
    Io(#[from] std::io::Error),

    /// PNG 编解码错误.
    #[error("标注图像编解码失败: {0}")]
    Image(#[from] image::ImageError),

    /// 掩膜尺寸与体数据切片栅格不一致. 这是完整性错误, 不是可忽略的小问题.
    #[error("掩膜尺寸不符: 期望 {expected:?}, 实际 {actual:?}")]
    DimensionMismatch {
        /// 期望的 `(h, w)`.
        expected: Idx2d,
        /// 实际的 `(h, w)`.
        actual: Idx2d,
    },
}

/// 逐切片标注掩膜仓库.
///
/// 仓库拥有 "切片索引 -> 已持久化二值掩膜" 的映射. 每个切片索引至多一张掩膜,
/// 重复保存即覆盖. 磁盘上每个条目是一个
/// `annotation_slice_<index>.png` 文件, 文件名就是枚举的唯一事实来源,
/// 没有独立的索引文件.
///
/// 掩膜以 0/255 灰度写盘 (任何看图软件都能直接查看), 读回时折叠为 {0, 1}.
#[derive(Debug, Clone)]
pub struct AnnotationStore {
    dir: PathBuf,
    slice_shape: Idx2d,
}

/// 发布前临时文件的看守: 除非明确解除武装, 否则 drop 时删除临时文件,
/// 保证所有退出路径上都不会留下半成品.
struct TmpGuard<'a> {
    path: &'a Path,
    armed: bool,
}

impl Drop for TmpGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let _ = fs::remove_file(self.path);
        }
    }
}

impl AnnotationStore {
    /// 打开 (必要时创建) 标注目录.
    ///
    /// `slice_shape` 是体数据的切片栅格形状 `(h, w)`;
    /// 之后所有保存和读取都会按它做完整性校验.
    pub fn open<P: AsRef<Path>>(dir: P, slice_shape: Idx2d) -> Result<Self, AnnotError> {
        fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
            slice_shape,
        })
    }

    /// 仓库目录.
    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 期望的切片栅格形状 `(h, w)`.
    #[inline]
    pub fn slice_shape(&self) -> Idx2d {
        self.slice_shape
    }

    fn path_of(&self, index: usize) -> PathBuf {
        self.dir
            .join(format!("{ANNOTATION_PREFIX}{index}.{ANNOTATION_EXT}"))
    }

    /// 持久化切片 `index` 的掩膜, 覆盖同索引旧条目.
    ///
    /// 采用先写临时文件、再原子改名发布的模式:
    /// 并发读者要么看到旧文件, 要么看到完整的新文件, 绝不会读到半写状态.
    pub fn save(&self, index: usize, mask: &Array2<u8>) -> Result<(), AnnotError> {
        if mask.dim() != self.slice_shape {
            return Err(AnnotError::DimensionMismatch {
                expected: self.slice_shape,
                actual: mask.dim(),
            });
        }

        let (height, width) = mask.dim();
        let mut buf = image::GrayImage::new(width as u32, height as u32);
        for ((h, w), &pix) in mask.indexed_iter() {
            let gray = if is_foreground(pix) { WHITE } else { BLACK };
            buf.put_pixel(w as u32, h as u32, image::Luma([gray]));
        }

        let tmp = self
            .dir
            .join(format!(".{ANNOTATION_PREFIX}{index}.{ANNOTATION_EXT}.tmp"));
        let mut guard = TmpGuard {
            path: tmp.as_path(),
            armed: true,
        };
        buf.save_with_format(&tmp, image::ImageFormat::Png)?;
        fs::rename(&tmp, self.path_of(index))?;
        guard.armed = false;
        Ok(())
    }

    /// 读取切片 `index` 的掩膜. 不存在时返回 `Ok(None)`.
    ///
    /// 磁盘上掩膜尺寸与栅格不符属于完整性错误.
    pub fn load(&self, index: usize) -> Result<Option<Array2<u8>>, AnnotError> {
        let path = self.path_of(index);
        if !path.exists() {
            return Ok(None);
        }
        let img = image::open(&path)?.into_luma8();
        let actual = (img.height() as usize, img.width() as usize);
        if actual != self.slice_shape {
            return Err(AnnotError::DimensionMismatch {
                expected: self.slice_shape,
                actual,
            });
        }
        let mask = Array2::from_shape_fn(self.slice_shape, |(h, w)| {
            u8::from(is_foreground(img.get_pixel(w as u32, h as u32)[0]))
        });
        Ok(Some(mask))
    }

    /// 删除切片 `index` 的条目. 条目不存在时是 no-op, 不是错误.
    pub fn clear(&self, index: usize) -> Result<(), AnnotError> {
        match fs::remove_file(self.path_of(index)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// 删除所有已持久化条目. 返回删除的条目个数.
    pub fn reset_all(&self) -> Result<usize, AnnotError> {
        let indices = self.annotated_indices()?;
        for &index in &indices {
            self.clear(index)?;
        }
        Ok(indices.len())
    }

    /// 枚举当前已持久化的切片索引, 升序排列.
    pub fn annotated_indices(&self) -> Result<Vec<usize>, AnnotError> {
        let mut ans: Vec<usize> = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(index) = parse_annotation_index(name) {
                ans.push(index);
            }
        }
        ans.sort_unstable();
        Ok(ans)
    }

    /// 环形导航: 从 `current` 出发, 沿 `direction` (±1) 找到下一个已标注索引.
    ///
    /// 没有任何标注时返回 `Ok(None)`. 若 `current` 本身未被标注,
    /// 则把出发位置视为已标注列表的第 0 位 (这是约定好的行为, 而非随意选择),
    /// 再施加步进.
    pub fn step(&self, current: usize, direction: i32) -> Result<Option<usize>, AnnotError> {
        let list = self.annotated_indices()?;
        if list.is_empty() {
            return Ok(None);
        }
        let n = list.len() as i64;
        let pos = list.iter().position(|&i| i == current).unwrap_or(0) as i64;
        let next = (pos + direction as i64).rem_euclid(n) as usize;
        Ok(Some(list[next]))
    }
}

/// 从文件名解析切片索引. 不符合命名约定的文件一律忽略.
fn parse_annotation_index(name: &str) -> Option<usize> {
    name.strip_prefix(ANNOTATION_PREFIX)?
        .strip_suffix(&format!(".{ANNOTATION_EXT}"))?
        .parse()
        .ok()
}
