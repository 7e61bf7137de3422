//! 多线程种子调度.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::assembler;
use super::notify::{Subject, TrackingEvent};
use super::params::TrackingParams;
use super::sampler::SamplingPattern;
use super::selector::DirectionSelector;
use super::streamline::Integrator;
use crate::classify::Classifier;
use crate::consts::tissue;
use crate::error::{TrackingError, TrackingResult};
use crate::{Idx3d, Point, TractData, Tractogram, VolumeAttr};

/// 协作式取消与暂停. 工作线程在两个种子之间检查这些标志, 不会中断正在生长的纤维.
#[derive(Debug, Default)]
pub struct TrackingControl {
    abort: AtomicBool,
    pause: AtomicBool,
}

impl TrackingControl {
    /// 创建未中止, 未暂停的控制对象.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 请求中止. 各工作线程处理完当前种子后退出, 剩余种子被丢弃.
    #[inline]
    pub fn abort(&self) {
        self.abort.store(true, Ordering::Release);
    }

    /// 是否已请求中止.
    #[inline]
    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::Acquire)
    }

    /// 暂停. 各工作线程处理完当前种子后等待.
    #[inline]
    pub fn pause(&self) {
        self.pause.store(true, Ordering::Release);
    }

    /// 恢复.
    #[inline]
    pub fn resume(&self) {
        self.pause.store(false, Ordering::Release);
    }

    /// 是否处于暂停状态.
    #[inline]
    pub fn is_paused(&self) -> bool {
        self.pause.load(Ordering::Acquire)
    }

    /// 清除全部标志, 以便复用.
    #[inline]
    pub fn reset(&self) {
        self.abort.store(false, Ordering::Release);
        self.pause.store(false, Ordering::Release);
    }

    /// 暂停时阻塞. 返回 `false` 表示应当中止.
    fn wait_while_paused(&self) -> bool {
        loop {
            if self.is_aborted() {
                return false;
            }
            if !self.is_paused() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }
}

/// 一个种子点.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Seed {
    /// 所在体素.
    pub voxel: Idx3d,

    /// 物理坐标.
    pub point: Point,

    /// 体素行优先线性索引.
    linear: usize,

    /// 体素内编号.
    sub: usize,
}

impl Seed {
    /// 该种子专属的随机数发生器. 只依赖 `(base, 体素, 体素内编号)`,
    /// 与线程数和分区方式无关.
    fn rng(&self, base: u64) -> StdRng {
        seed_rng(base, self.linear, self.sub + 1)
    }
}

#[inline]
fn seed_rng(base: u64, linear: usize, sub: usize) -> StdRng {
    let key = base
        ^ (linear as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (sub as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
    StdRng::seed_from_u64(key)
}

/// 把 `[0, len)` 切成至多 `parts` 段连续的非空区间.
pub fn slabs(len: usize, parts: usize) -> Vec<Range<usize>> {
    let parts = parts.clamp(1, len.max(1));
    let chunk = (len + parts - 1) / parts;
    (0..len)
        .step_by(chunk.max(1))
        .map(|s| s..(s + chunk).min(len))
        .collect()
}

/// 流线追踪器.
///
/// 特征场与分类器在追踪期间只读, 在工作线程间共享.
/// 每个工作线程负责网格的一段连续水平切片 (z-slab) 内的种子,
/// 结果按分区顺序合并, 因此输出与线程数无关.
pub struct Tracker<'a, C> {
    data: &'a TractData,
    classifier: &'a C,
    params: TrackingParams,
    control: Arc<TrackingControl>,
    events: Subject<TrackingEvent>,
}

impl<'a, C: Classifier> Tracker<'a, C> {
    /// 检查参数与数据后创建追踪器.
    ///
    /// 以下情况返回错误: 参数非法, 附属图像与特征场网格不一致,
    /// 分类器不接受特征场分量与历史方向个数, 开启 `seed_only_gm` 但没有四组织类型图像.
    pub fn new(
        data: &'a TractData,
        classifier: &'a C,
        params: TrackingParams,
    ) -> TrackingResult<Self> {
        params.validate()?;
        data.validate()?;
        classifier.validate_features(data.field.components(), params.num_previous_directions)?;
        if params.seed_only_gm && data.tissue.is_none() {
            return Err(TrackingError::MissingTissueImage);
        }
        if params.demo_mode && params.num_threads.is_some_and(|n| n > 1) {
            warn!("demo mode runs a single worker, ignoring num_threads");
        }
        if classifier.directions().is_empty() {
            warn!("classifier has no direction classes, every seed will stop immediately");
        }
        Ok(Self {
            data,
            classifier,
            params,
            control: Arc::new(TrackingControl::new()),
            events: Subject::new(),
        })
    }

    /// 追踪参数.
    #[inline]
    pub fn params(&self) -> &TrackingParams {
        &self.params
    }

    /// 控制对象. 可以交给其他线程或事件回调以中止/暂停追踪.
    #[inline]
    pub fn control(&self) -> Arc<TrackingControl> {
        Arc::clone(&self.control)
    }

    /// 事件主题.
    #[inline]
    pub fn events(&self) -> &Subject<TrackingEvent> {
        &self.events
    }

    /// 体素 `idx` 是否是种子体素.
    fn is_seed_voxel(&self, idx: Idx3d) -> bool {
        let in_seed = self.data.seed.as_ref().map_or(true, |s| s[idx] > 0);
        let in_gm = !self.params.seed_only_gm
            || self
                .data
                .tissue
                .as_ref()
                .is_some_and(|t| tissue::is_gray_matter(t[idx]));
        in_seed && in_gm
    }

    /// 枚举 `zs` 切片范围内的种子, 行优先.
    ///
    /// 每体素一个种子时放在体素中心, 否则在体素内均匀随机放置.
    pub fn seeds_in(&self, zs: Range<usize>) -> Vec<Seed> {
        let g = self.data.field.geometry();
        let (_, sh, sw) = g.shape();
        let n = self.params.seeds_per_voxel;
        let mut seeds = Vec::new();
        for z in zs {
            for h in 0..sh {
                for w in 0..sw {
                    let voxel = (z, h, w);
                    if !self.is_seed_voxel(voxel) {
                        continue;
                    }
                    let linear = g.linear_index(voxel);
                    if n == 1 {
                        seeds.push(Seed {
                            voxel,
                            point: g.index_to_point(voxel),
                            linear,
                            sub: 0,
                        });
                        continue;
                    }
                    let mut rng = seed_rng(self.params.rng_seed, linear, 0);
                    for sub in 0..n {
                        let jitter = [z, h, w].map(|c| c as f64 + rng.gen_range(-0.5..0.5));
                        seeds.push(Seed {
                            voxel,
                            point: g.continuous_to_point(jitter),
                            linear,
                            sub,
                        });
                    }
                }
            }
        }
        seeds
    }

    /// 全部种子, 按分区顺序.
    #[inline]
    pub fn seeds(&self) -> Vec<Seed> {
        self.seeds_in(0..self.data.field.len_z())
    }

    /// 运行追踪. 被中止时返回部分结果, 此时 `report.aborted` 为真.
    pub fn run(&self) -> Tractogram {
        let start = Instant::now();
        let g = self.data.field.geometry();
        let step = self.params.step_size_for(g);
        let distance = self.params.sampling_distance_for(g);
        let pattern = if self.params.random_sampling {
            SamplingPattern::Random {
                count: self.params.num_samples,
                radius: distance,
            }
        } else {
            SamplingPattern::sphere(self.params.num_samples, distance)
        };

        let partitions: Vec<Vec<Seed>> = slabs(self.data.field.len_z(), self.params.threads())
            .into_iter()
            .map(|zs| self.seeds_in(zs))
            .collect();
        let total: usize = partitions.iter().map(Vec::len).sum();
        info!(
            "tracking {total} seeds with {} workers, step {step:.3} mm, sampling distance {distance:.3} mm",
            partitions.len()
        );
        self.events.publish(&TrackingEvent::Started {
            seeds: total,
            workers: partitions.len(),
        });

        let parts: Vec<Tractogram> = thread::scope(|s| {
            let handles: Vec<_> = partitions
                .iter()
                .enumerate()
                .map(|(worker, seeds)| {
                    let pattern = &pattern;
                    s.spawn(move || self.run_partition(worker, seeds, pattern, step))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                .collect()
        });

        let mut out = assembler::assemble(parts, self.params.cleanup);
        out.report.elapsed = start.elapsed();
        info!("tracking finished in {:?}: {}", out.report.elapsed, out.report);
        self.events.publish(&TrackingEvent::Finished {
            fibers: out.len(),
            aborted: out.report.aborted,
        });
        out
    }

    /// 单个工作线程: 依次处理分区内的种子.
    fn run_partition(
        &self,
        worker: usize,
        seeds: &[Seed],
        pattern: &SamplingPattern,
        step: f64,
    ) -> Tractogram {
        let events = self.params.demo_mode.then_some(&self.events);
        let selector = DirectionSelector::new(self.data, self.classifier, pattern, &self.params, events);
        let mut integrator = Integrator::new(selector, &self.params, step);
        let mut out = Tractogram::default();
        out.report.seeds = seeds.len();

        for seed in seeds {
            if !self.control.wait_while_paused() {
                out.report.aborted = true;
                break;
            }
            let mut rng = seed.rng(self.params.rng_seed);
            let accepted = integrator.track_seed(seed.point, &mut rng, &mut out);
            out.report.processed += 1;
            trace!("seed {:?}: {:?}", seed.voxel, integrator.state());
            self.events.publish(&TrackingEvent::SeedFinished {
                worker,
                seed: seed.point,
                accepted,
            });
        }
        debug!("worker {worker} done: {}", out.report);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::{slabs, TrackingControl};

    #[test]
    fn test_slabs() {
        assert_eq!(slabs(10, 3), vec![0..4, 4..8, 8..10]);
        assert_eq!(slabs(3, 8), vec![0..1, 1..2, 2..3]);
        assert_eq!(slabs(5, 1), vec![0..5]);
        assert_eq!(slabs(4, 0), vec![0..4]);
        assert!(slabs(0, 4).is_empty());
    }

    #[test]
    fn test_control_flags() {
        let c = TrackingControl::new();
        assert!(c.wait_while_paused());
        c.pause();
        assert!(c.is_paused());
        c.abort();
        assert!(!c.wait_while_paused());
        c.reset();
        assert!(!c.is_aborted() && !c.is_paused());
    }
}
