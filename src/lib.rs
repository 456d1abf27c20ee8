#![warn(missing_docs)] // <= 合适时移除它.

//! 核心库. 为交互式轴向 CT 浏览器提供切片标注掩膜合成与跨切片分割传播功能.
//!
//! 该 crate 只负责有真实状态和不变量的部分: 掩膜栅格化、标注持久化与导航、
//! 分割传播. 展示层 (滑条/按钮/画布) 以及体数据加载器、分割模型本体
//! 均作为外部协作者存在, 不在本库范围内.
//!
//! # 注意
//!
//! 1. 体数据在加载后统一按 `(z, h, w)` 轴序访问, 行优先, 原点在左上角,
//!    此后不再做任何转置. 栅格化、标注与掩膜叠加均遵循该约定.
//! 2. 越界索引会直接 panic, 而不会导致内存错误. As what Rust promises.
//!
//! # 功能清单
//!
//! ### CT window 视图 ✅
//!
//! 将 CT HU 值线性映射到 `[0, 1]` 或 8-bit 灰度. 退化窗口 (窗宽为 0)
//! 在构造期即被拒绝.
//!
//! 实现位于 `src/data/window.rs`.
//!
//! ### 矢量图形栅格化 ✅
//!
//! 将画布给出的自由笔画/多边形/矩形记录并集栅格化为二值掩膜,
//! 并在并集后做一次 3×3 形态学闭运算. 单条坏记录只告警跳过,
//! 不影响批内其余图形.
//!
//! 实现位于 `src/annot/raster.rs`.
//!
//! ### 切片标注仓库 ✅
//!
//! 以 `annotation_slice_<index>.png` 为唯一事实来源的逐切片掩膜仓库,
//! 支持保存 (写临时文件后原子改名发布)、清除、枚举与环形导航.
//!
//! 实现位于 `src/annot/store.rs`.
//!
//! ### 分割传播驱动 ✅
//!
//! 用固定临床窗预处理体数据, 在中间切片的几何中心注入单点提示,
//! 驱动点提示式视频分割模型在整个切片栈上传播, 并把结果重采样回原分辨率.
//! 模型通过能力契约 trait 注入, 以便用假模型测试.
//!
//! 实现位于 `src/seg/*`.
//!
//! ### 结构掩膜目录 ✅
//!
//! 按文件名发现 `<name>.nii.gz` 结构掩膜, 传播输出以保留名发布到同一目录.
//!
//! 实现位于 `src/overlay.rs`.

/// 二维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx2d = (usize, usize);

/// 三维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

/// 切片像素坐标系中的点, `(x, y)`, 原点在左上角.
pub type PointF = (f32, f32);

/// 3D CT nii 体数据基础结构.
mod data;

pub use data::{CtScan, CtWindow, MaskVolume, ScanSlice};

pub mod consts;

pub mod annot;

pub mod overlay;

pub mod seg;

pub mod session;

pub mod study;

pub mod prelude;
