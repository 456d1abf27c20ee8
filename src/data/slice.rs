//! CT 扫描切片视图及其持久化存储.

use super::window::CtWindow;
use crate::Idx2d;
use image::ImageResult;
use ndarray::{Array2, ArrayView2};
use std::path::Path;

/// 不可变、借用的二维水平 CT 扫描切片.
pub struct ScanSlice<'a> {
    /// 底层数据的轻量级视图, 借用于 [`crate::CtScan`].
    ///
    /// 这里有意把代码写死为 `ArrayView` 降低灵活性, 但使结构的意图更加明确.
    data: ArrayView2<'a, f32>,
}

impl<'a> ScanSlice<'a> {
    /// 包装一个二维 HU 视图.
    #[inline]
    pub fn new(data: ArrayView2<'a, f32>) -> Self {
        Self { data }
    }

    /// 图像形状, `(h, w)`.
    #[inline]
    pub fn shape(&self) -> Idx2d {
        self.data.dim()
    }

    /// 获取给定位置 (高, 宽) 的 HU 值. 越界时返回 `None`.
    #[inline]
    pub fn get(&self, pos: Idx2d) -> Option<f32> {
        self.data.get(pos).copied()
    }

    /// 获得底层数据的一份不可变 shallow copy.
    #[inline]
    pub fn array_view(&self) -> ArrayView2<'a, f32> {
        self.data
    }

    /// 在给定 CT 窗下将切片归一化到 `[0, 1]`, 供展示层合成灰度图.
    #[inline]
    pub fn normalized(&self, window: &CtWindow) -> Array2<f32> {
        window.normalize_slice(self.data)
    }

    /// 在给定 CT 窗下将切片保存为 8-bit 灰度图.
    pub fn save_windowed<P: AsRef<Path>>(&self, path: P, window: &CtWindow) -> ImageResult<()> {
        let (height, width) = self.shape();
        let mut buf = image::GrayImage::new(width as u32, height as u32);
        for ((h, w), &hu) in self.data.indexed_iter() {
            let gray = window.eval(hu).unwrap_or(u8::MIN);
            buf.put_pixel(w as u32, h as u32, image::Luma([gray]));
        }
        buf.save(path)
    }
}
