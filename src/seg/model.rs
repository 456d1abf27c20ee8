use crate::PointF;
use ndarray::{Array2, Array4};

/// 外部模型错误. 按阶段区分, 与数据错误 (栅格化失败等) 严格分离.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// 模型加载或会话初始化失败.
    #[error("模型会话初始化失败: {0}")]
    Init(String),

    /// 提示注入失败.
    #[error("提示注入失败: {0}")]
    Prompt(String),

    /// 传播过程失败.
    #[error("模型传播失败: {0}")]
    Propagate(String),
}

/// 模型对单帧给出的预测 logits.
///
/// logits 不是概率; 在 0 处阈值化是驱动器的职责, 不是模型的.
#[derive(Debug, Clone)]
pub struct FrameLogits {
    /// 帧 (切片) 索引.
    pub frame: usize,

    /// 对象 id.
    pub obj_id: u32,

    /// 模型分辨率下的逐像素 logits, `(h, w)`.
    pub logits: Array2<f32>,
}

/// 点提示式视频分割模型的能力契约.
///
/// 会话状态严格局限于一次驱动调用: [`Self::propagate`] 消耗会话,
/// 产出的序列是有限、单遍、不可中途重启的; 驱动器恰好消费一次.
/// 不允许跨调用共享或缓存会话句柄.
pub trait PromptPropagator {
    /// 模型内部的会话句柄.
    type Session;

    /// 用预处理后的 4D 张量栈 `(d, 3, h, w)` 初始化会话.
    fn init_session(&self, stack: Array4<f32>) -> Result<Self::Session, ModelError>;

    /// 在第 `frame` 帧上为对象 `obj_id` 注入点提示.
    ///
    /// `points` 为模型输入分辨率下的 `(x, y)` 坐标;
    /// `labels` 与之一一对应, 1 表示正例, 0 表示负例.
    fn add_point_prompt(
        &self,
        session: &mut Self::Session,
        frame: usize,
        obj_id: u32,
        points: &[PointF],
        labels: &[i8],
    ) -> Result<(), ModelError>;

    /// 在整个栈上传播, 按模型自己的顺序逐帧产出 logits.
    fn propagate(
        &self,
        session: Self::Session,
    ) -> Result<Box<dyn Iterator<Item = Result<FrameLogits, ModelError>> + '_>, ModelError>;
}
