//! 追踪参数.

use std::fmt;

use crate::Geometry;

/// 追踪参数非法.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamError {
    /// 该参数必须是正有限数. 参数为参数名与实际值.
    NotPositive(&'static str, f64),

    /// 最小长度大于最大长度. 参数为 `(min, max)`.
    LengthRange(f64, f64),

    /// 角度阈值不在 `(0, 180]` 内.
    AngularThreshold(f64),

    /// 偏转系数为负数或非有限数.
    DeflectionMod(f64),

    /// 每个体素的种子数为 0.
    ZeroSeedsPerVoxel,

    /// 指定的线程数为 0.
    ZeroThreads,
}

impl fmt::Display for ParamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotPositive(name, v) => write!(f, "`{name}` must be positive and finite, got {v}"),
            Self::LengthRange(min, max) => {
                write!(f, "min tract length {min} exceeds max tract length {max}")
            }
            Self::AngularThreshold(v) => {
                write!(f, "angular threshold must be in (0, 180] degrees, got {v}")
            }
            Self::DeflectionMod(v) => {
                write!(f, "deflection modifier must be non-negative and finite, got {v}")
            }
            Self::ZeroSeedsPerVoxel => write!(f, "seeds per voxel must be at least 1"),
            Self::ZeroThreads => write!(f, "thread count must be at least 1"),
        }
    }
}

impl std::error::Error for ParamError {}

/// 流线追踪的全部可配置项.
///
/// 长度相关的参数均以毫米为单位, 角度以度为单位.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TrackingParams {
    /// 步长. `None` 表示最小体素分辨率的一半.
    pub step_size: Option<f64>,

    /// 最小纤维长度. 低于该长度的纤维被丢弃.
    pub min_tract_length: f64,

    /// 最大纤维长度 (两个方向合计).
    pub max_tract_length: f64,

    /// 候选方向与上一方向的最大夹角.
    pub angular_threshold: f64,

    /// 邻域采样半径. `None` 表示最小体素分辨率.
    pub sampling_distance: Option<f64>,

    /// 邻域采样点个数 (不含中心点).
    pub num_samples: usize,

    /// 每个种子体素的种子数. 1 表示体素中心, 大于 1 表示体素内均匀随机位置.
    pub seeds_per_voxel: usize,

    /// 前方采样点的否定投票是否可以强制停止.
    pub use_stop_votes: bool,

    /// 是否忽略位于上一方向后方的采样点.
    pub only_forward_samples: bool,

    /// 偏转系数: 新方向与上一方向混合时上一方向的权重,
    /// 同时也是镜像采样点偏转方向的权重.
    pub deflection_mod: f64,

    /// 演示模式: 单线程运行, 并发布每一步的采样点.
    pub demo_mode: bool,

    /// 只在灰质中播种, 只向一个方向生长, 离开灰质后再次进入灰质时停止.
    pub seed_only_gm: bool,

    /// 是否启用后验曲率检查.
    pub aposteriori_curv_check: bool,

    /// 掩膜外的采样点是否镜像到对侧, 使流线偏离边界.
    pub avoid_stop: bool,

    /// 每一步随机放置采样点, 否则使用固定的球面模板.
    pub random_sampling: bool,

    /// 作为分类器特征的历史方向个数.
    pub num_previous_directions: usize,

    /// 工作线程数. `None` 表示可用的处理器个数.
    pub num_threads: Option<usize>,

    /// 随机数种子. 每个种子点的随机数发生器都由它派生.
    pub rng_seed: u64,

    /// 是否把同一种子的两个方向拼接成一根纤维.
    pub concatenate_halves: bool,

    /// 是否对输出纤维做清理.
    pub cleanup: bool,
}

impl Default for TrackingParams {
    fn default() -> Self {
        Self {
            step_size: None,
            min_tract_length: 20.0,
            max_tract_length: 400.0,
            angular_threshold: 45.0,
            sampling_distance: None,
            num_samples: 30,
            seeds_per_voxel: 1,
            use_stop_votes: true,
            only_forward_samples: true,
            deflection_mod: 1.0,
            demo_mode: false,
            seed_only_gm: false,
            aposteriori_curv_check: false,
            avoid_stop: true,
            random_sampling: false,
            num_previous_directions: 1,
            num_threads: None,
            rng_seed: 0,
            concatenate_halves: true,
            cleanup: true,
        }
    }
}

/// 检查 `v` 是否是正有限数.
#[inline]
fn positive(name: &'static str, v: f64) -> Result<(), ParamError> {
    if v.is_finite() && v > 0.0 {
        Ok(())
    } else {
        Err(ParamError::NotPositive(name, v))
    }
}

impl TrackingParams {
    /// 检查参数是否合法.
    pub fn validate(&self) -> Result<(), ParamError> {
        if let Some(s) = self.step_size {
            positive("step_size", s)?;
        }
        if let Some(s) = self.sampling_distance {
            positive("sampling_distance", s)?;
        }
        positive("max_tract_length", self.max_tract_length)?;
        if !(self.min_tract_length.is_finite() && self.min_tract_length >= 0.0) {
            return Err(ParamError::NotPositive("min_tract_length", self.min_tract_length));
        }
        if self.min_tract_length > self.max_tract_length {
            return Err(ParamError::LengthRange(
                self.min_tract_length,
                self.max_tract_length,
            ));
        }
        if !(self.angular_threshold > 0.0 && self.angular_threshold <= 180.0) {
            return Err(ParamError::AngularThreshold(self.angular_threshold));
        }
        if !(self.deflection_mod.is_finite() && self.deflection_mod >= 0.0) {
            return Err(ParamError::DeflectionMod(self.deflection_mod));
        }
        if self.seeds_per_voxel == 0 {
            return Err(ParamError::ZeroSeedsPerVoxel);
        }
        if self.num_threads == Some(0) {
            return Err(ParamError::ZeroThreads);
        }
        Ok(())
    }

    /// 在网格 `g` 上的实际步长.
    #[inline]
    pub fn step_size_for(&self, g: &Geometry) -> f64 {
        self.step_size.unwrap_or_else(|| 0.5 * g.min_spacing())
    }

    /// 在网格 `g` 上的实际采样半径.
    #[inline]
    pub fn sampling_distance_for(&self, g: &Geometry) -> f64 {
        self.sampling_distance.unwrap_or_else(|| g.min_spacing())
    }

    /// 角度阈值的余弦.
    #[inline]
    pub fn cos_threshold(&self) -> f64 {
        self.angular_threshold.to_radians().cos()
    }

    /// 实际使用的工作线程数. 演示模式下恒为 1.
    pub fn threads(&self) -> usize {
        if self.demo_mode {
            return 1;
        }
        self.num_threads.unwrap_or_else(|| {
            std::thread::available_parallelism().map_or(1, usize::from)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{ParamError, TrackingParams};
    use crate::Geometry;

    #[test]
    fn test_default_params_are_valid() {
        let p = TrackingParams::default();
        assert!(p.validate().is_ok());

        let g = Geometry::new((4, 4, 4), [2.0, 1.0, 3.0], [0.0; 3]).unwrap();
        assert_eq!(p.step_size_for(&g), 0.5);
        assert_eq!(p.sampling_distance_for(&g), 1.0);
        assert!((p.cos_threshold() - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_params() {
        let p = TrackingParams {
            step_size: Some(0.0),
            ..Default::default()
        };
        assert_eq!(p.validate(), Err(ParamError::NotPositive("step_size", 0.0)));

        let p = TrackingParams {
            min_tract_length: 50.0,
            max_tract_length: 10.0,
            ..Default::default()
        };
        assert_eq!(p.validate(), Err(ParamError::LengthRange(50.0, 10.0)));

        let p = TrackingParams {
            angular_threshold: 200.0,
            ..Default::default()
        };
        assert!(p.validate().is_err());

        let p = TrackingParams {
            seeds_per_voxel: 0,
            ..Default::default()
        };
        assert_eq!(p.validate(), Err(ParamError::ZeroSeedsPerVoxel));

        let p = TrackingParams {
            num_threads: Some(0),
            ..Default::default()
        };
        assert_eq!(p.validate(), Err(ParamError::ZeroThreads));
    }

    #[test]
    fn test_demo_mode_is_single_threaded() {
        let p = TrackingParams {
            demo_mode: true,
            num_threads: Some(8),
            ..Default::default()
        };
        assert_eq!(p.threads(), 1);
    }
}
