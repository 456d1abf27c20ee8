//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx2d, Idx3d, PointF};

pub use crate::data::{CtScan, CtWindow, MaskVolume, ScanSlice};

pub use crate::annot::{parse_shapes, rasterize, AnnotError, AnnotationStore, Shape};

pub use crate::overlay::{OverlayDir, OverlayError};

pub use crate::seg::{FrameLogits, ModelError, PromptPropagator, PropagationDriver, SegError};

pub use crate::session::ViewSession;

pub use crate::study::{home_study_dir_with, StudyLayout};

pub use crate::consts::{MODEL_INPUT_SIZE, PROPAGATED_MASK_NAME};
