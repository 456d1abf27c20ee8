use super::shape::Shape;
use crate::consts::gray::{is_foreground, MASK_FOREGROUND};
use crate::{Idx2d, PointF};
use itertools::Itertools;
use ndarray::Array2;

/// 将一批矢量图形记录并集栅格化为一张二值掩膜.
///
/// 纯函数: 输出只由 `(shapes, raster_shape, default_stroke)` 决定,
/// 相同输入得到逐 bit 相同的掩膜. 绘制顺序与结果无关 (并集语义).
///
/// 逐图形规则:
///
/// 1. 自由笔画: 按相邻点对连成给定宽度的折线; 少于 2 个点时贡献空集.
/// 2. 多边形: 闭合点列的实心内部 (even-odd 规则); 少于 3 个点时贡献空集.
/// 3. 矩形: `[x, x+width) × [y, y+height)` 实心区域; 边长非正时贡献空集.
///
/// 并集完成后做 **一次** 3×3 形态学闭运算, 填补单像素缝隙并平滑笔画边缘.
/// 逐图形闭运算再并集与此不等价, 故不允许.
///
/// 含非有限坐标的记录告警跳过, 不影响批内其余图形.
pub fn rasterize(shapes: &[Shape], raster_shape: Idx2d, default_stroke: f32) -> Array2<u8> {
    let mut mask = Array2::zeros(raster_shape);
    for shape in shapes {
        if !shape_is_finite(shape) {
            log::warn!("跳过含非有限坐标的图形记录: {shape:?}");
            continue;
        }
        match shape {
            Shape::Freehand {
                points,
                stroke_width,
            } => {
                let stroke = if *stroke_width > 0.0 {
                    *stroke_width
                } else {
                    default_stroke
                };
                paint_freehand(&mut mask, points, stroke);
            }
            Shape::Polygon { points } => paint_polygon(&mut mask, points),
            Shape::Rectangle {
                x,
                y,
                width,
                height,
            } => paint_rectangle(&mut mask, (*x, *y), (*width, *height)),
        }
    }
    close_3x3(&mask)
}

fn shape_is_finite(shape: &Shape) -> bool {
    let finite_pts = |pts: &[PointF]| pts.iter().all(|(x, y)| x.is_finite() && y.is_finite());
    match shape {
        Shape::Freehand {
            points,
            stroke_width,
        } => stroke_width.is_finite() && finite_pts(points),
        Shape::Polygon { points } => finite_pts(points),
        Shape::Rectangle {
            x,
            y,
            width,
            height,
        } => [x, y, width, height].iter().all(|v| v.is_finite()),
    }
}

/// 将浮点区间 `[lo, hi)` 收缩为合法的整数索引半开区间.
#[inline]
fn clamp_range(lo: f32, hi: f32, len: usize) -> (usize, usize) {
    let lo = lo.floor().max(0.0) as usize;
    let hi = (hi.ceil().max(0.0) as usize).min(len);
    (lo.min(hi), hi)
}

fn paint_freehand(mask: &mut Array2<u8>, points: &[PointF], stroke: f32) {
    if points.len() < 2 {
        return;
    }
    // 至少 1 像素宽, 否则细笔画会整条消失.
    let radius = stroke.max(1.0) / 2.0;
    for (a, b) in points.iter().tuple_windows() {
        paint_segment(mask, *a, *b, radius);
    }
}

/// 将线段 `(a, b)` 以半径 `radius` 加粗后写入掩膜.
/// 判据: 像素中心到线段的欧氏距离不超过 `radius`.
fn paint_segment(mask: &mut Array2<u8>, a: PointF, b: PointF, radius: f32) {
    let (hh, ww) = mask.dim();
    let (w_lo, w_hi) = clamp_range(
        a.0.min(b.0) - radius - 1.0,
        a.0.max(b.0) + radius + 1.0,
        ww,
    );
    let (h_lo, h_hi) = clamp_range(
        a.1.min(b.1) - radius - 1.0,
        a.1.max(b.1) + radius + 1.0,
        hh,
    );
    let r2 = radius * radius;
    for h in h_lo..h_hi {
        for w in w_lo..w_hi {
            let center = (w as f32 + 0.5, h as f32 + 0.5);
            if dist2_to_segment(center, a, b) <= r2 {
                mask[[h, w]] = MASK_FOREGROUND;
            }
        }
    }
}

/// 点到线段距离的平方.
fn dist2_to_segment((px, py): PointF, (ax, ay): PointF, (bx, by): PointF) -> f32 {
    let (dx, dy) = (bx - ax, by - ay);
    let len2 = dx * dx + dy * dy;
    let t = if len2 <= f32::EPSILON {
        0.0
    } else {
        (((px - ax) * dx + (py - ay) * dy) / len2).clamp(0.0, 1.0)
    };
    let (ex, ey) = (px - (ax + t * dx), py - (ay + t * dy));
    ex * ex + ey * ey
}

/// even-odd 扫描线填充. 点列隐式闭合.
fn paint_polygon(mask: &mut Array2<u8>, points: &[PointF]) {
    if points.len() < 3 {
        return;
    }
    let (hh, ww) = mask.dim();
    let y_min = points.iter().map(|p| p.1).fold(f32::INFINITY, f32::min);
    let y_max = points.iter().map(|p| p.1).fold(f32::NEG_INFINITY, f32::max);
    let (h_lo, h_hi) = clamp_range(y_min - 1.0, y_max + 1.0, hh);

    let n = points.len();
    let mut xs: Vec<f32> = Vec::with_capacity(n);
    for h in h_lo..h_hi {
        let y = h as f32 + 0.5;
        xs.clear();
        for i in 0..n {
            let (x1, y1) = points[i];
            let (x2, y2) = points[(i + 1) % n];
            if (y1 > y) != (y2 > y) {
                xs.push(x1 + (y - y1) * (x2 - x1) / (y2 - y1));
            }
        }
        // 坐标已验证有限, 全序比较安全.
        xs.sort_by(|a, b| a.total_cmp(b));
        for pair in xs.chunks_exact(2) {
            let w_lo = (pair[0] - 0.5).ceil().max(0.0) as usize;
            let w_hi = ((pair[1] - 0.5).ceil().max(0.0) as usize).min(ww);
            for w in w_lo..w_hi {
                mask[[h, w]] = MASK_FOREGROUND;
            }
        }
    }
}

fn paint_rectangle(mask: &mut Array2<u8>, (x, y): PointF, (width, height): PointF) {
    if width <= 0.0 || height <= 0.0 {
        return;
    }
    let (hh, ww) = mask.dim();
    // 像素中心落在 [x, x+width) × [y, y+height) 内.
    let w_lo = (x - 0.5).ceil().max(0.0) as usize;
    let w_hi = ((x + width - 0.5).ceil().max(0.0) as usize).min(ww);
    let h_lo = (y - 0.5).ceil().max(0.0) as usize;
    let h_hi = ((y + height - 0.5).ceil().max(0.0) as usize).min(hh);
    for h in h_lo..h_hi {
        for w in w_lo..w_hi {
            mask[[h, w]] = MASK_FOREGROUND;
        }
    }
}

/// 3×3 结构元形态学闭运算 (先膨胀后腐蚀).
///
/// 栅格外视作各自操作的中性元素: 膨胀只看在界邻居,
/// 腐蚀也只要求在界邻居全为前景, 因此贴边的实心区域闭运算后保持不变.
fn close_3x3(mask: &Array2<u8>) -> Array2<u8> {
    erode_3x3(&dilate_3x3(mask))
}

fn dilate_3x3(mask: &Array2<u8>) -> Array2<u8> {
    let (hh, ww) = mask.dim();
    Array2::from_shape_fn((hh, ww), |(h, w)| {
        let any = neighbourhood_3x3((h, w), (hh, ww)).any(|pos| is_foreground(mask[pos]));
        u8::from(any)
    })
}

fn erode_3x3(mask: &Array2<u8>) -> Array2<u8> {
    let (hh, ww) = mask.dim();
    Array2::from_shape_fn((hh, ww), |(h, w)| {
        let all = neighbourhood_3x3((h, w), (hh, ww)).all(|pos| is_foreground(mask[pos]));
        u8::from(all)
    })
}

/// 以 `(h, w)` 为中心的 3×3 在界邻域 (含自身).
fn neighbourhood_3x3((h, w): Idx2d, (hh, ww): Idx2d) -> impl Iterator<Item = Idx2d> {
    let h_lo = h.saturating_sub(1);
    let w_lo = w.saturating_sub(1);
    let h_hi = (h + 2).min(hh);
    let w_hi = (w + 2).min(ww);
    (h_lo..h_hi).cartesian_product(w_lo..w_hi)
}
