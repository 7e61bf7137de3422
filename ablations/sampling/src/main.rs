//! 邻域采样与方向投票策略的消融实验.
//!
//! 对数据集中的每个受试者, 用几组只在采样/投票策略上不同的参数分别追踪,
//! 比较纤维数量, 平均长度, 各终止原因的占比与耗时.
//!
//! 数据集位置见 [`utils::loader::data_dir_from_env_or_home`].
//! 若设置了环境变量 `$TRACT_FOREST`, 则使用该路径下的随机森林,
//! 否则使用峰值分类器.

mod profile;
mod result;
mod runner;

fn main() {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()
        .unwrap();

    let result = runner::run();
    result.analyze();
}
