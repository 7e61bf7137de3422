#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 提供基于学习型方向分类器的流线 (streamline) 纤维追踪引擎,
//! 以及其依赖的体数据、分类器推断和纤维输出等基础设施.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 体数据只支持轴对齐的体素网格 (即不处理方向余弦矩阵).
//!   物理坐标 `(x, y, z)` 分别对应索引 `(w, h, z)`.
//! 2. 分类器的 **训练** 不在本 crate 的范围内, 这里只负责推断.
//! 3. 单根纤维的终止 (越界、弯曲过大、无方向等) 是正常结果而不是错误,
//!   它们以 [`StopReason`] 的形式记录在纤维上.
//!
//! # 开发计划
//!
//! ### 体数据与坐标变换 ✅
//!
//! 特征场 (4D) 与标签体 (掩膜/种子/停止区域/四组织类型) 的加载,
//! 物理坐标与索引坐标互转, 三线性插值.
//!
//! 实现位于 `tract-berry/src/data`.
//!
//! ### 方向分类器推断 ✅
//!
//! 1. 峰值分类器 (张量主方向场, 合成场). ✅
//! 2. 随机森林推断, 从 bincode 文件加载. ✅
//!
//! 实现位于 `tract-berry/src/classify`.
//!
//! ### 流线追踪 ✅
//!
//! 邻域采样, 方向投票, 停止投票, 偏转, 双向生长, 曲率检查,
//! 灰质终止, 多线程种子调度与协作式取消.
//!
//! 实现位于 `tract-berry/src/track`.
//!
//! ### 纤维输出 ✅
//!
//! 合并, 清理, VTK polydata 导出.
//!
//! 实现位于 `tract-berry/src/fiber`.
//!
//! ### 数据集加载 ✅
//!
//! 从 nifti 目录或 npz 归档加载一次追踪需要的全部体数据.
//!
//! 实现位于 `tract-berry/src/dataset`.

/// 三维索引, 按 `(z, h, w)` 排列.
pub type Idx3d = (usize, usize, usize);

/// 物理空间中的点, 单位为毫米.
pub type Point = nalgebra::Point3<f64>;

/// 物理空间中的向量, 单位为毫米.
pub type Vec3 = nalgebra::Vector3<f64>;

/// 体数据基础结构.
mod data;

pub use data::{FeatureField, Geometry, LabelVolume, TractData, VolumeAttr};

pub mod classify;

pub mod consts;

mod error;

pub use error::{TrackingError, TrackingResult};

pub mod dataset;

pub mod fiber;

pub use fiber::{Fiber, PolyLines, StopReason, Tractogram, TrackingReport, VtkWrite};

pub mod prelude;

pub mod sphere;

pub mod track;
