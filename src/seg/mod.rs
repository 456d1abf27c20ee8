//! 跨切片分割传播.
//!
//! 点提示式视频分割模型只以能力契约 ([`PromptPropagator`]) 的形式出现,
//! 模型的内部结构与权重不属于本库. 驱动器负责预处理、提示注入、
//! 逐帧阈值化与重采样, 并把全体掩膜发布到结构掩膜目录.

mod driver;
mod model;

pub use driver::{preprocess_stack, PropagationDriver, SegError};
pub use model::{FrameLogits, ModelError, PromptPropagator};
