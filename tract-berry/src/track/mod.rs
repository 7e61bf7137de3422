//! 流线纤维追踪.
//!
//! 追踪分为五个部分:
//!
//! 1. 邻域采样 ([`SamplingPattern`]): 在当前位置周围放置采样点,
//!    对每个采样点评估分类器;
//! 2. 方向选择 ([`vote`]): 角度阈值, 加权投票, 停止投票, 镜像偏转, 与上一方向混合;
//! 3. 流线积分 ([`StreamlineState`]): 单根流线的双向逐步生长与终止判定;
//! 4. 种子调度 ([`Tracker`]): 按水平切片静态分区, 每个分区一个工作线程;
//! 5. 结果合并 ([`assemble`]): 按分区顺序合并并清理.
//!
//! # 示例
//!
//! ```no_run
//! use tract_berry::classify::PeakClassifier;
//! use tract_berry::track::{Tracker, TrackingParams};
//! use tract_berry::TractData;
//!
//! let data = TractData::open_dir("subject01").unwrap();
//! let classifier = PeakClassifier::axial();
//! let tracker = Tracker::new(&data, &classifier, TrackingParams::default()).unwrap();
//! let tractogram = tracker.run();
//! println!("{}", tractogram.report);
//! ```

mod assembler;
mod driver;
mod history;
mod notify;
mod params;
mod sampler;
mod selector;
mod streamline;

pub use assembler::{assemble, clean};
pub use driver::{slabs, Seed, Tracker, TrackingControl};
pub use history::DirectionHistory;
pub use notify::{Subject, SubscriptionId, TrackingEvent};
pub use params::{ParamError, TrackingParams};
pub use sampler::SamplingPattern;
pub use selector::{vote, Vote};
pub use streamline::{curvature_violation, Outcome, StreamlineState};

#[cfg(test)]
mod tests;
