//! 通用常量.

/// 单通道颜色与掩膜像素值.
pub mod gray {
    /// 二值掩膜中, 背景的像素值.
    pub const MASK_BACKGROUND: u8 = 0;

    /// 二值掩膜中, 前景的像素值.
    pub const MASK_FOREGROUND: u8 = 1;

    /// 单通道黑色.
    pub const BLACK: u8 = 0b_0000_0000;

    /// 单通道白色.
    pub const WHITE: u8 = 0b_1111_1111;

    /// 像素是否是前景?
    #[inline]
    pub const fn is_foreground(p: u8) -> bool {
        p != MASK_BACKGROUND
    }

    /// 像素是否是背景?
    #[inline]
    pub const fn is_background(p: u8) -> bool {
        p == MASK_BACKGROUND
    }
}

/// 分割模型要求的正方形输入边长 (像素).
pub const MODEL_INPUT_SIZE: usize = 512;

/// 传播预处理所用固定临床窗的窗位 (HU).
///
/// 注意该窗口与用户的显示窗口相互独立, 两者不可混用.
pub const PROPAGATION_LEVEL: f32 = -750.0;

/// 传播预处理所用固定临床窗的窗宽 (HU).
pub const PROPAGATION_WIDTH: f32 = 1500.0;

/// 传播输出在结构掩膜目录中的保留结构名.
pub const PROPAGATED_MASK_NAME: &str = "propagated";

/// 逐切片标注文件的文件名前缀. 切片索引可从文件名中解析回来,
/// 文件名即是标注枚举的唯一事实来源.
pub const ANNOTATION_PREFIX: &str = "annotation_slice_";

/// 逐切片标注文件的扩展名.
pub const ANNOTATION_EXT: &str = "png";

/// 结构掩膜体文件的复合后缀.
pub const MASK_VOLUME_SUFFIX: &str = ".nii.gz";
