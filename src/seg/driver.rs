use super::model::{FrameLogits, ModelError, PromptPropagator};
use crate::consts::{MODEL_INPUT_SIZE, PROPAGATED_MASK_NAME};
use crate::overlay::{OverlayDir, OverlayError};
use crate::{CtScan, CtWindow, Idx2d, MaskVolume};
use image::imageops::{self, FilterType};
use ndarray::{s, Array2, Array3, Array4, ArrayView2, Axis};
use std::sync::atomic::{AtomicBool, Ordering};

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelIterator, ParallelIterator};
    }
}

/// 分割传播的运行时错误.
///
/// 模型侧失败对本次调用是致命的 (不发布任何部分结果),
/// 但不影响整个用户会话, 用户可以重试.
#[derive(Debug, thiserror::Error)]
pub enum SegError {
    /// 体数据没有任何体素, 无从传播.
    #[error("CT 体数据为空, 无法传播")]
    EmptyVolume,

    /// 同一驱动器上已有一次传播在进行. 该调用被拒绝而不是并行执行.
    #[error("上一次分割传播尚未结束, 本次调用被拒绝")]
    AlreadyRunning,

    /// 外部模型错误.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// 传播结果发布失败.
    #[error("传播结果发布失败: {0}")]
    Publish(#[from] OverlayError),
}

/// 传播预处理: 把 HU 体数据变换成模型要求的 4D 张量栈 `(d, 3, s, s)`.
///
/// 步骤: 按固定临床窗 (窗位 -750, 窗宽 1500) 截断, 以 **截断后体数据自身的**
/// 最值线性缩放到 `[0, 255]` 并转 8-bit, 逐切片双线性重采样到模型要求的
/// 正方形分辨率, 单通道复制为 3 通道, 最后除以 255 得到 `f32`.
///
/// 注意这里的窗口与用户显示窗口无关.
pub fn preprocess_stack(scan: &CtScan) -> Array4<f32> {
    let window = CtWindow::from_propagation_default();
    let (lb, ub) = (window.lower_bound(), window.upper_bound());
    let clipped = scan
        .data()
        .mapv(|v| if v.is_finite() { v.clamp(lb, ub) } else { lb });

    let mut mn = f32::INFINITY;
    let mut mx = f32::NEG_INFINITY;
    for &v in clipped.iter() {
        mn = mn.min(v);
        mx = mx.max(v);
    }
    // 全体同值时整体归零, 避免除零.
    let scale = if mx > mn { 255.0 / (mx - mn) } else { 0.0 };
    let vol8 = clipped.mapv(|v| ((v - mn) * scale) as u8);

    let d = vol8.dim().0;
    let side = MODEL_INPUT_SIZE;

    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            let planes: Vec<Array2<f32>> = vol8
                .axis_iter(Axis(0))
                .into_par_iter()
                .map(|sli| resize_plane_unit(sli, side))
                .collect();
        } else {
            let planes: Vec<Array2<f32>> = vol8
                .axis_iter(Axis(0))
                .map(|sli| resize_plane_unit(sli, side))
                .collect();
        }
    }

    let mut out = Array4::<f32>::zeros((d, 3, side, side));
    for (i, plane) in planes.iter().enumerate() {
        for c in 0..3 {
            out.slice_mut(s![i, c, .., ..]).assign(plane);
        }
    }
    out
}

/// 单切片: 8-bit 灰度双线性重采样到 `side × side`, 再缩放到 `[0, 1]`.
fn resize_plane_unit(slice: ArrayView2<'_, u8>, side: usize) -> Array2<f32> {
    let img = gray_from_view(slice);
    let resized = imageops::resize(&img, side as u32, side as u32, FilterType::Triangle);
    Array2::from_shape_fn((side, side), |(h, w)| {
        resized.get_pixel(w as u32, h as u32)[0] as f32 / 255.0
    })
}

fn gray_from_view(v: ArrayView2<'_, u8>) -> image::GrayImage {
    let (height, width) = v.dim();
    let mut buf = image::GrayImage::new(width as u32, height as u32);
    for ((h, w), &pix) in v.indexed_iter() {
        buf.put_pixel(w as u32, h as u32, image::Luma([pix]));
    }
    buf
}

/// 最近邻把模型分辨率的二值掩膜重采样回原生 `(h, w)`.
///
/// 二值掩膜绝不允许平滑插值, 那会重新引入分数值.
fn resize_mask_nearest(mask: &Array2<u8>, (h, w): Idx2d) -> Array2<u8> {
    let img = gray_from_view(mask.view());
    let resized = imageops::resize(&img, w as u32, h as u32, FilterType::Nearest);
    Array2::from_shape_fn((h, w), |(hh, ww)| {
        u8::from(resized.get_pixel(ww as u32, hh as u32)[0] != 0)
    })
}

/// 传播进行标记的看守, 所有退出路径上都保证释放.
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// 分割传播驱动器.
///
/// 把中间切片上的单点提示变成与原体数据形状完全一致的全体二值掩膜.
/// 这是系统中唯一会挂起人类可感知时长的操作; 同一驱动器不允许重入,
/// 传播进行中的第二次调用会得到 [`SegError::AlreadyRunning`].
/// 会话状态严格局限于一次调用, 调用结束即丢弃.
///
/// 基线设计中传播不可取消; 若将来需要, 逐帧循环处是检查协作式取消
/// 标志的自然位置.
#[derive(Debug, Default)]
pub struct PropagationDriver {
    in_flight: AtomicBool,
}

impl PropagationDriver {
    /// 创建驱动器.
    pub fn new() -> Self {
        Self::default()
    }

    /// 驱动一次完整传播, 返回与 `scan` 同形状的二值掩膜体.
    ///
    /// 模型加载、提示构造或传播中的任何失败都是本次调用的致命错误,
    /// 不会产出部分体数据.
    pub fn run<M: PromptPropagator>(
        &self,
        model: &M,
        scan: &CtScan,
    ) -> Result<MaskVolume, SegError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Acquire)
            .is_err()
        {
            return Err(SegError::AlreadyRunning);
        }
        let _guard = FlightGuard(&self.in_flight);
        self.run_locked(model, scan)
    }

    /// 驱动一次完整传播, 并把结果以保留名发布到结构掩膜目录.
    ///
    /// 任何失败路径上都不会发布部分掩膜体.
    pub fn run_and_publish<M: PromptPropagator>(
        &self,
        model: &M,
        scan: &CtScan,
        overlays: &OverlayDir,
    ) -> Result<MaskVolume, SegError> {
        let mask = self.run(model, scan)?;
        overlays.publish(PROPAGATED_MASK_NAME, &mask)?;
        Ok(mask)
    }

    fn run_locked<M: PromptPropagator>(
        &self,
        model: &M,
        scan: &CtScan,
    ) -> Result<MaskVolume, SegError> {
        let (d, h, w) = scan.shape();
        if d == 0 || h == 0 || w == 0 {
            return Err(SegError::EmptyVolume);
        }

        log::info!("开始分割传播, 体数据形状 {:?}", (d, h, w));
        let stack = preprocess_stack(scan);
        let mut session = model.init_session(stack)?;

        // 简单的默认提示: 中间切片的几何中心处一个正例点.
        // 这是已知的粗粒度限制, 不来自任何用户交互.
        let side = MODEL_INPUT_SIZE as f32;
        model.add_point_prompt(&mut session, d / 2, 1, &[(side / 2.0, side / 2.0)], &[1])?;

        let mut volume = Array3::<u8>::zeros((d, h, w));
        for item in model.propagate(session)? {
            let FrameLogits { frame, logits, .. } = item?;
            if frame >= d {
                return Err(
                    ModelError::Propagate(format!("模型产出越界帧 {frame}, 栈深 {d}")).into(),
                );
            }
            // 在 0 处阈值化得到模型分辨率二值掩膜, 再最近邻回原分辨率.
            let bin = logits.mapv(|v| u8::from(v > 0.0));
            let native = resize_mask_nearest(&bin, (h, w));
            volume.index_axis_mut(Axis(0), frame).assign(&native);
        }

        log::info!("分割传播完成");
        Ok(MaskVolume::from_raw(volume))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PointF;
    use ndarray::Array3;
    use std::cell::RefCell;
    use tempfile::TempDir;

    /// 对每帧返回恒定 logits 的假模型.
    struct ConstModel {
        value: f32,
    }

    impl PromptPropagator for ConstModel {
        type Session = (usize, usize);

        fn init_session(&self, stack: Array4<f32>) -> Result<Self::Session, ModelError> {
            let (d, c, h, _) = stack.dim();
            assert_eq!(c, 3);
            Ok((d, h))
        }

        fn add_point_prompt(
            &self,
            _session: &mut Self::Session,
            _frame: usize,
            _obj_id: u32,
            _points: &[PointF],
            _labels: &[i8],
        ) -> Result<(), ModelError> {
            Ok(())
        }

        fn propagate(
            &self,
            (d, side): Self::Session,
        ) -> Result<Box<dyn Iterator<Item = Result<FrameLogits, ModelError>> + '_>, ModelError>
        {
            let value = self.value;
            Ok(Box::new((0..d).map(move |frame| {
                Ok(FrameLogits {
                    frame,
                    obj_id: 1,
                    logits: Array2::from_elem((side, side), value),
                })
            })))
        }
    }

    fn small_scan(d: usize, h: usize, w: usize) -> CtScan {
        let mut data = Array3::<f32>::zeros((d, h, w));
        // 制造一些强度差异, 避免预处理走全同值分支.
        for ((z, hh, ww), v) in data.indexed_iter_mut() {
            *v = -1200.0 + (z * 97 + hh * 13 + ww * 7) as f32;
        }
        CtScan::fake(data, [2.5, 0.7, 0.7])
    }

    #[test]
    fn test_preprocess_stack_layout() {
        let scan = small_scan(3, 10, 12);
        let stack = preprocess_stack(&scan);
        assert_eq!(stack.dim(), (3, 3, MODEL_INPUT_SIZE, MODEL_INPUT_SIZE));
        assert!(stack.iter().all(|v| (0.0..=1.0).contains(v)));
        // 三个通道必须是同一平面的复制.
        let c0 = stack.slice(s![0, 0, .., ..]);
        let c1 = stack.slice(s![0, 1, .., ..]);
        let c2 = stack.slice(s![0, 2, .., ..]);
        assert_eq!(c0, c1);
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_propagation_shape_and_binary_values() {
        let scan = small_scan(5, 20, 24);
        let driver = PropagationDriver::new();

        let positive = driver.run(&ConstModel { value: 2.5 }, &scan).unwrap();
        assert_eq!(positive.shape(), scan.shape());
        assert!(positive.data().iter().all(|p| matches!(*p, 0 | 1)));
        // logits 恒正 => 全前景.
        assert_eq!(positive.count_foreground(), 5 * 20 * 24);

        let negative = driver.run(&ConstModel { value: -1.0 }, &scan).unwrap();
        assert_eq!(negative.shape(), scan.shape());
        assert_eq!(negative.count_foreground(), 0);
    }

    #[test]
    fn test_empty_volume_rejected() {
        let scan = small_scan(0, 8, 8);
        let driver = PropagationDriver::new();
        assert!(matches!(
            driver.run(&ConstModel { value: 1.0 }, &scan),
            Err(SegError::EmptyVolume)
        ));
    }

    /// 记录提示注入参数的假模型.
    struct RecordingModel {
        prompt: RefCell<Option<(usize, u32, Vec<PointF>, Vec<i8>)>>,
    }

    impl PromptPropagator for RecordingModel {
        type Session = usize;

        fn init_session(&self, stack: Array4<f32>) -> Result<Self::Session, ModelError> {
            Ok(stack.dim().0)
        }

        fn add_point_prompt(
            &self,
            _session: &mut Self::Session,
            frame: usize,
            obj_id: u32,
            points: &[PointF],
            labels: &[i8],
        ) -> Result<(), ModelError> {
            *self.prompt.borrow_mut() = Some((frame, obj_id, points.to_vec(), labels.to_vec()));
            Ok(())
        }

        fn propagate(
            &self,
            _session: Self::Session,
        ) -> Result<Box<dyn Iterator<Item = Result<FrameLogits, ModelError>> + '_>, ModelError>
        {
            Ok(Box::new(std::iter::empty()))
        }
    }

    #[test]
    fn test_prompt_is_center_point_of_middle_slice() {
        let scan = small_scan(7, 16, 16);
        let driver = PropagationDriver::new();
        let model = RecordingModel {
            prompt: RefCell::new(None),
        };
        driver.run(&model, &scan).unwrap();

        let (frame, obj_id, points, labels) = model.prompt.borrow().clone().unwrap();
        assert_eq!(frame, 3); // 7 / 2
        assert_eq!(obj_id, 1);
        let half = MODEL_INPUT_SIZE as f32 / 2.0;
        assert_eq!(points, vec![(half, half)]);
        assert_eq!(labels, vec![1]); // 单个正例点.
    }

    /// 传播阶段直接失败的假模型.
    struct FailingModel;

    impl PromptPropagator for FailingModel {
        type Session = ();

        fn init_session(&self, _stack: Array4<f32>) -> Result<Self::Session, ModelError> {
            Ok(())
        }

        fn add_point_prompt(
            &self,
            _session: &mut Self::Session,
            _frame: usize,
            _obj_id: u32,
            _points: &[PointF],
            _labels: &[i8],
        ) -> Result<(), ModelError> {
            Ok(())
        }

        fn propagate(
            &self,
            _session: Self::Session,
        ) -> Result<Box<dyn Iterator<Item = Result<FrameLogits, ModelError>> + '_>, ModelError>
        {
            Err(ModelError::Propagate("checkpoint unavailable".into()))
        }
    }

    #[test]
    fn test_model_failure_publishes_nothing() {
        let tmp = TempDir::new().unwrap();
        let overlays = OverlayDir::open(tmp.path()).unwrap();
        let scan = small_scan(4, 12, 12);
        let driver = PropagationDriver::new();

        let err = driver
            .run_and_publish(&FailingModel, &scan, &overlays)
            .unwrap_err();
        assert!(matches!(err, SegError::Model(ModelError::Propagate(_))));
        assert!(overlays.structure_names().unwrap().is_empty());
    }

    #[test]
    fn test_success_publishes_under_reserved_name() {
        let tmp = TempDir::new().unwrap();
        let overlays = OverlayDir::open(tmp.path()).unwrap();
        let scan = small_scan(3, 10, 10);
        let driver = PropagationDriver::new();

        let mask = driver
            .run_and_publish(&ConstModel { value: 1.0 }, &scan, &overlays)
            .unwrap();
        assert_eq!(
            overlays.structure_names().unwrap(),
            vec![PROPAGATED_MASK_NAME.to_owned()]
        );
        let loaded = overlays
            .load_checked(PROPAGATED_MASK_NAME, scan.shape())
            .unwrap();
        assert_eq!(loaded, mask);
    }

    /// 传播期间再次发起调用的探针模型.
    struct ReentrantProbe<'a> {
        driver: &'a PropagationDriver,
        scan: &'a CtScan,
    }

    impl PromptPropagator for ReentrantProbe<'_> {
        type Session = ();

        fn init_session(&self, _stack: Array4<f32>) -> Result<Self::Session, ModelError> {
            Ok(())
        }

        fn add_point_prompt(
            &self,
            _session: &mut Self::Session,
            _frame: usize,
            _obj_id: u32,
            _points: &[PointF],
            _labels: &[i8],
        ) -> Result<(), ModelError> {
            Ok(())
        }

        fn propagate(
            &self,
            _session: Self::Session,
        ) -> Result<Box<dyn Iterator<Item = Result<FrameLogits, ModelError>> + '_>, ModelError>
        {
            // 传播进行中, 第二次调用必须被拒绝而不是并行执行.
            let again = self.driver.run(&ConstModel { value: 1.0 }, self.scan);
            assert!(matches!(again, Err(SegError::AlreadyRunning)));
            Ok(Box::new(std::iter::empty()))
        }
    }

    #[test]
    fn test_in_flight_reentry_rejected_then_released() {
        let scan = small_scan(2, 8, 8);
        let driver = PropagationDriver::new();
        let probe = ReentrantProbe {
            driver: &driver,
            scan: &scan,
        };
        driver.run(&probe, &scan).unwrap();

        // 看守释放后, 驱动器可以再次使用.
        assert!(driver.run(&ConstModel { value: 1.0 }, &scan).is_ok());
    }

    #[test]
    fn test_out_of_range_frame_is_a_model_error() {
        struct RogueModel;
        impl PromptPropagator for RogueModel {
            type Session = ();

            fn init_session(&self, _stack: Array4<f32>) -> Result<Self::Session, ModelError> {
                Ok(())
            }

            fn add_point_prompt(
                &self,
                _session: &mut Self::Session,
                _frame: usize,
                _obj_id: u32,
                _points: &[PointF],
                _labels: &[i8],
            ) -> Result<(), ModelError> {
                Ok(())
            }

            fn propagate(
                &self,
                _session: Self::Session,
            ) -> Result<Box<dyn Iterator<Item = Result<FrameLogits, ModelError>> + '_>, ModelError>
            {
                Ok(Box::new(std::iter::once(Ok(FrameLogits {
                    frame: 99,
                    obj_id: 1,
                    logits: Array2::zeros((4, 4)),
                }))))
            }
        }

        let scan = small_scan(2, 8, 8);
        let driver = PropagationDriver::new();
        assert!(matches!(
            driver.run(&RogueModel, &scan),
            Err(SegError::Model(ModelError::Propagate(_)))
        ));
    }
}
