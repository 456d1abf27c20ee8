use crate::PointF;
use serde::{Deserialize, Serialize};

/// 画布协作者在一次交互后给出的矢量图形记录.
///
/// 坐标均为切片像素坐标系 `(x, y)`, 原点在左上角,
/// 与展示栅格尺寸完全一致 (不容忍坐标系错位).
///
/// 几何上退化的记录 (点数不足、边长非正) 不是解析错误;
/// 栅格化阶段会让它们贡献空集.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Shape {
    /// 自由笔画: 依次连接所有相邻点对的折线, 带笔画宽度.
    Freehand {
        /// 有序点列.
        points: Vec<PointF>,

        /// 笔画宽度 (像素). 非正值时回退到调用方给定的默认宽度.
        stroke_width: f32,
    },

    /// 多边形: 闭合点列的实心内部.
    Polygon {
        /// 有序点列. 首尾隐式闭合.
        points: Vec<PointF>,
    },

    /// 轴对齐矩形: 从 `(x, y)` 到 `(x + width, y + height)` 的实心区域.
    Rectangle {
        /// 左上角横坐标.
        x: f32,
        /// 左上角纵坐标.
        y: f32,
        /// 宽度.
        width: f32,
        /// 高度.
        height: f32,
    },
}

/// 解析画布给出的 JSON 图形记录数组.
///
/// 整体不是合法 JSON 数组时返回 `Err`. 数组内单条坏记录
/// (缺字段、未知 `type` 标签等) 只告警跳过, 绝不拖垮批内其余图形 —
/// 一条坏记录不应让用户丢掉整幅画.
pub fn parse_shapes(json: &str) -> Result<Vec<Shape>, serde_json::Error> {
    let raw: Vec<serde_json::Value> = serde_json::from_str(json)?;
    let mut shapes = Vec::with_capacity(raw.len());
    for (i, value) in raw.into_iter().enumerate() {
        match serde_json::from_value::<Shape>(value) {
            Ok(s) => shapes.push(s),
            Err(e) => log::warn!("跳过第 {i} 条无法识别的图形记录: {e}"),
        }
    }
    Ok(shapes)
}
