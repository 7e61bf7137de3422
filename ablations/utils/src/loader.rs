//! 对 `tract-berry::dataset` 的更一层封装. 提供更直接的数据集加载器.
//!
//! 数据集目录下的每个受试者可以是一个 nifti 子目录 (见 [`TractData::open_dir`]),
//! 也可以是一个 `.npz` 归档 (见 [`tract_berry::dataset::open_npz`]).

use std::env;
use std::path::{Path, PathBuf};

use log::warn;
use tract_berry::{dataset, TractData, TrackingResult};

/// 获取追踪数据集基本路径.
///
/// 1. 若环境变量 `$TRACT_DATA_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/tract`.
///
/// 两者都无法得到时返回 `None`.
pub fn data_dir_from_env_or_home() -> Option<PathBuf> {
    match env::var("TRACT_DATA_DIR") {
        Ok(d) if !d.is_empty() => Some(PathBuf::from(d)),
        _ => dataset::home_dataset_dir_with(["tract"]),
    }
}

/// 列出 `dir` 下的所有受试者路径, 按文件名排序.
pub fn subjects<P: AsRef<Path>>(dir: P) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir.as_ref()) {
        Ok(e) => e,
        Err(e) => {
            warn!("cannot read {}: {e}", dir.as_ref().display());
            return Vec::new();
        }
    };
    let mut ans: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_dir() || p.extension().is_some_and(|x| x == "npz"))
        .collect();
    ans.sort();
    ans
}

/// 加载单个受试者.
pub fn open_subject<P: AsRef<Path>>(p: P) -> TrackingResult<TractData> {
    let p = p.as_ref();
    if p.is_dir() {
        TractData::open_dir(p)
    } else {
        dataset::open_npz(p)
    }
}

/// 受试者数据加载器. 依次产生 `(名称, 加载结果)`.
pub struct TractLoader {
    paths: std::vec::IntoIter<PathBuf>,
}

impl Iterator for TractLoader {
    type Item = (String, TrackingResult<TractData>);

    fn next(&mut self) -> Option<Self::Item> {
        let p = self.paths.next()?;
        let name = p
            .file_stem()
            .map_or_else(|| p.display().to_string(), |s| s.to_string_lossy().into_owned());
        Some((name, open_subject(&p)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.paths.size_hint()
    }
}

/// 获取 `dir` 下的受试者数据加载器.
pub fn data_loader<P: AsRef<Path>>(dir: P) -> TractLoader {
    TractLoader {
        paths: subjects(dir).into_iter(),
    }
}
