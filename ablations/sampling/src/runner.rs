//! 程序运行函数.

use std::env;
use std::thread;

use log::{info, warn};
use tract_berry::classify::{Classifier, DecisionForest, PeakClassifier};
use tract_berry::track::{Tracker, TrackingParams};
use tract_berry::TractData;
use utils::loader;

use crate::profile::Profile;
use crate::result::AblationResult;

/// 参与比较的参数组. 除名称对应的一项外, 其余均为默认值.
fn variants(threads: usize) -> [(&'static str, TrackingParams); 4] {
    let base = TrackingParams {
        num_threads: Some(threads),
        ..TrackingParams::default()
    };
    [
        ("sphere", base.clone()),
        (
            "random",
            TrackingParams {
                random_sampling: true,
                ..base.clone()
            },
        ),
        (
            "no-stop-votes",
            TrackingParams {
                use_stop_votes: false,
                ..base.clone()
            },
        ),
        (
            "no-avoid-stop",
            TrackingParams {
                avoid_stop: false,
                ..base
            },
        ),
    ]
}

/// 用一组参数追踪所有受试者.
fn profile<C: Classifier>(
    subjects: &[(String, TractData)],
    classifier: &C,
    params: &TrackingParams,
) -> Profile {
    let mut p = Profile::default();
    for (name, data) in subjects {
        match Tracker::new(data, classifier, params.clone()) {
            Ok(tracker) => p.record(&tracker.run()),
            Err(e) => warn!("{name}: {e}"),
        }
    }
    p
}

fn run_with<C: Classifier>(subjects: &[(String, TractData)], classifier: &C) -> AblationResult {
    let vs = variants((utils::cpus() / 4).max(1));
    thread::scope(|s| {
        let handles = vs
            .iter()
            .map(|(_, params)| s.spawn(move || profile(subjects, classifier, params)))
            .collect::<Vec<_>>();

        AblationResult::from_iter(
            vs.iter().map(|(name, _)| *name).zip(
                handles
                    .into_iter()
                    .map(|th| th.join().expect("Thread joining error")),
            ),
        )
    })
}

/// 实际运行.
pub fn run() -> AblationResult {
    let data_dir = loader::data_dir_from_env_or_home().expect("Cannot locate dataset directory");
    assert!(data_dir.is_dir(), "{} is not a directory", data_dir.display());

    let subjects: Vec<(String, TractData)> = loader::data_loader(&data_dir)
        .filter_map(|(name, r)| match r {
            Ok(d) => Some((name, d)),
            Err(e) => {
                warn!("skipping {name}: {e}");
                None
            }
        })
        .collect();
    // 短路判断
    assert!(!subjects.is_empty(), "Loading dataset config error");

    info!("Running ablation studies on {} subjects...", subjects.len());
    match env::var("TRACT_FOREST") {
        Ok(p) if !p.is_empty() => {
            let forest = DecisionForest::open(&p).expect("Loading forest error");
            info!("using forest {p} with {} trees", forest.len());
            run_with(&subjects, &forest)
        }
        _ => run_with(&subjects, &PeakClassifier::axial()),
    }
}
