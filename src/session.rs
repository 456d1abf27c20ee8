//! 浏览会话上下文.
//!
//! 原型应用把当前切片索引、窗口设置等存成环境全局量;
//! 这里改为显式的、由外部持有的会话结构, 作为参数传入各操作,
//! 不存在任何隐藏状态.

use crate::annot::{AnnotError, AnnotationStore};
use crate::{CtScan, CtWindow, Idx2d};

/// 单个用户的浏览会话状态. 纯状态持有者, 所有 I/O 都在仓库/目录类型里.
#[derive(Debug, Clone)]
pub struct ViewSession {
    nz: usize,
    slice_shape: Idx2d,
    current: usize,
    window: CtWindow,
    last_saved: Option<usize>,
}

impl ViewSession {
    /// 为 `scan` 创建会话, 初始定位在中间切片.
    ///
    /// `window` 是用户显示窗口; 展示层应当先用
    /// [`CtScan::intensity_range`] 约束滑条再构造窗口.
    pub fn new(scan: &CtScan, window: CtWindow) -> Self {
        let nz = scan.len_z();
        Self {
            nz,
            slice_shape: scan.slice_shape(),
            current: nz / 2,
            window,
            last_saved: None,
        }
    }

    /// 切片总数.
    #[inline]
    pub fn len_z(&self) -> usize {
        self.nz
    }

    /// 切片栅格形状, `(h, w)`.
    #[inline]
    pub fn slice_shape(&self) -> Idx2d {
        self.slice_shape
    }

    /// 当前切片索引.
    #[inline]
    pub fn current(&self) -> usize {
        self.current
    }

    /// 当前显示窗口.
    #[inline]
    pub fn window(&self) -> CtWindow {
        self.window
    }

    /// 最近一次保存标注的切片索引.
    #[inline]
    pub fn last_saved(&self) -> Option<usize> {
        self.last_saved
    }

    /// 跳转到切片 `index`. 越界时拒绝并返回 `false`.
    pub fn set_slice(&mut self, index: usize) -> bool {
        if index < self.nz {
            self.current = index;
            true
        } else {
            false
        }
    }

    /// 以 `(vmin, vmax)` 更新显示窗口.
    ///
    /// 退化区间 (`vmax <= vmin`) 在这里就被拒绝,
    /// 不允许它到达归一化环节.
    pub fn set_window(&mut self, vmin: f32, vmax: f32) -> bool {
        match CtWindow::from_range(vmin, vmax) {
            Some(w) => {
                self.window = w;
                true
            }
            None => false,
        }
    }

    /// 沿 `direction` (±1) 跳到下一个已标注切片 (环形).
    ///
    /// 跳转成功时更新当前索引并返回目标; 没有任何标注时返回 `Ok(None)`.
    pub fn goto_annotated(
        &mut self,
        store: &AnnotationStore,
        direction: i32,
    ) -> Result<Option<usize>, AnnotError> {
        let target = store.step(self.current, direction)?;
        if let Some(index) = target {
            self.current = index;
        }
        Ok(target)
    }

    /// 记录当前切片已成功保存.
    ///
    /// 只能在仓库保存确实成功之后调用; 不允许乐观地先行标记.
    pub fn mark_saved(&mut self) {
        self.last_saved = Some(self.current);
    }
}
