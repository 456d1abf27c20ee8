//! 切片标注: 矢量图形记录、掩膜栅格化与逐切片持久化仓库.

mod raster;
mod shape;
mod store;

pub use raster::rasterize;
pub use shape::{parse_shapes, Shape};
pub use store::{AnnotError, AnnotationStore};
