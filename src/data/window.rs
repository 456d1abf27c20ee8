use ndarray::{Array2, ArrayView2};

/// CT 窗口, 包含窗位 (window level) 和窗宽 (window width).
///
/// 该窗口是只读的. 若要修改窗口参数, 你应该创建新的实例.
#[derive(Copy, Clone, Debug)]
pub struct CtWindow {
    level: f32,
    width: f32,
}

impl CtWindow {
    /// 构建 CT 窗.
    ///
    /// `level` 和 `width` 必须在合理范围内, 否则返回 `None`.
    pub fn new(level: f32, width: f32) -> Option<CtWindow> {
        if (-1e5..=1e5).contains(&level) && 0.0 < width && width <= 1e5 {
            Some(Self { level, width })
        } else {
            None
        }
    }

    /// 以 `(vmin, vmax)` 强度区间构建 CT 窗.
    ///
    /// `vmax <= vmin` 是退化窗口 (除数为 0), 属于配置错误,
    /// 在此处即被拒绝并返回 `None`, 不允许它到达归一化环节.
    pub fn from_range(vmin: f32, vmax: f32) -> Option<CtWindow> {
        if !vmin.is_finite() || !vmax.is_finite() || vmax <= vmin {
            return None;
        }
        Self::new((vmin + vmax) / 2.0, vmax - vmin)
    }

    /// 构建传播预处理所用的固定临床窗. 窗位 -750, 窗宽 1500.
    ///
    /// 该窗口与用户显示窗口相互独立.
    #[inline]
    pub const fn from_propagation_default() -> CtWindow {
        Self {
            level: crate::consts::PROPAGATION_LEVEL,
            width: crate::consts::PROPAGATION_WIDTH,
        }
    }

    /// 窗下限.
    #[inline]
    pub fn lower_bound(&self) -> f32 {
        self.level - self.width / 2.0
    }

    /// 窗上限.
    #[inline]
    pub fn upper_bound(&self) -> f32 {
        self.level + self.width / 2.0
    }

    /// 窗位.
    #[inline]
    pub fn level(&self) -> f32 {
        self.level
    }

    /// 窗宽.
    #[inline]
    pub fn width(&self) -> f32 {
        self.width
    }

    /// 求在当前 CT 窗设置下, `ct` HU 值对应的灰度图像素整数值 (0 <= value <= 255)
    ///
    /// 如果 `ct` 无意义 (如 inf, NaN), 则返回 `None`.
    pub fn eval(&self, ct: f32) -> Option<u8> {
        if !ct.is_finite() {
            return None;
        }
        let lb = self.lower_bound();
        if ct <= lb {
            Some(u8::MIN)
        } else if ct >= self.upper_bound() {
            Some(u8::MAX)
        } else {
            // 255, not 256.
            Some((((ct - lb) / self.width()) * 255.0) as u8)
        }
    }

    /// 求在当前 CT 窗设置下, `ct` HU 值线性映射到 `[0, 1]` 的分布点.
    ///
    /// 窗外的值被截断到边界. 无意义输入 (inf, NaN) 映射为 0.0,
    /// 以免在批量归一化时污染整个栅格.
    pub fn eval_unit(&self, ct: f32) -> f32 {
        if !ct.is_finite() {
            return 0.0;
        }
        ((ct - self.lower_bound()) / self.width()).clamp(0.0, 1.0)
    }

    /// 将整个 HU 切片归一化到 `[0, 1]`.
    pub fn normalize_slice(&self, slice: ArrayView2<'_, f32>) -> Array2<f32> {
        slice.mapv(|hu| self.eval_unit(hu))
    }
}

#[cfg(test)]
mod tests {
    use crate::CtWindow;

    fn is_valid_init(level: f32, width: f32) -> bool {
        CtWindow::new(level, width).is_some()
    }

    fn float_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_ct_window_invalid_input() {
        assert!(!is_valid_init(0.0, -1.0));
        assert!(!is_valid_init(0.0, 0.0));
    }

    #[test]
    fn test_from_range_rejects_degenerate() {
        assert!(CtWindow::from_range(40.0, 40.0).is_none());
        assert!(CtWindow::from_range(40.0, 30.0).is_none());
        assert!(CtWindow::from_range(f32::NAN, 30.0).is_none());
        assert!(CtWindow::from_range(0.0, f32::INFINITY).is_none());

        let w = CtWindow::from_range(-100.0, 300.0).unwrap();
        assert!(float_eq(w.level(), 100.0));
        assert!(float_eq(w.width(), 400.0));
        assert!(float_eq(w.lower_bound(), -100.0));
        assert!(float_eq(w.upper_bound(), 300.0));
    }

    #[test]
    fn test_eval_unit_bounds_and_monotonic() {
        let w = CtWindow::from_range(60.0, 100.0).unwrap();

        // 端点.
        assert!(float_eq(w.eval_unit(60.0), 0.0));
        assert!(float_eq(w.eval_unit(100.0), 1.0));

        // 窗外截断.
        assert!(float_eq(w.eval_unit(-1e4), 0.0));
        assert!(float_eq(w.eval_unit(1e4), 1.0));

        // 单调且全程落在 [0, 1].
        let mut last = -1.0f32;
        for i in 0..=200 {
            let hu = 40.0 + i as f32;
            let v = w.eval_unit(hu);
            assert!((0.0..=1.0).contains(&v));
            assert!(v >= last);
            last = v;
        }

        // 无意义输入不产生 NaN.
        assert!(float_eq(w.eval_unit(f32::NAN), 0.0));
        assert!(float_eq(w.eval_unit(f32::INFINITY), 0.0));
    }

    #[test]
    fn test_eval_u8() {
        // [60, 100]
        let ct = CtWindow::new(80.0, 40.0).unwrap();
        assert_eq!(ct.eval(f32::NAN), None);
        assert_eq!(ct.eval(f32::MIN), Some(0));
        assert_eq!(ct.eval(f32::MAX), Some(255));
        assert_eq!(ct.eval(70.0).unwrap(), (255.0 * 0.25) as u8);
        assert_eq!(ct.eval(90.0).unwrap(), (255.0 * 0.75) as u8);
        assert_eq!(ct.eval(100.0).unwrap(), u8::MAX);
    }

    #[test]
    fn test_propagation_window_is_fixed() {
        let w = CtWindow::from_propagation_default();
        assert!(float_eq(w.lower_bound(), -1500.0));
        assert!(float_eq(w.upper_bound(), 0.0));
    }

    #[test]
    fn test_normalize_slice() {
        use ndarray::array;
        let w = CtWindow::from_range(0.0, 10.0).unwrap();
        let sli = array![[0.0f32, 5.0], [10.0, 20.0]];
        let norm = w.normalize_slice(sli.view());
        assert!(float_eq(norm[[0, 0]], 0.0));
        assert!(float_eq(norm[[0, 1]], 0.5));
        assert!(float_eq(norm[[1, 0]], 1.0));
        assert!(float_eq(norm[[1, 1]], 1.0));
    }
}
