//! 端到端场景.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ndarray::Array4;
use simple_logger::SimpleLogger;

use super::{Tracker, TrackingEvent, TrackingParams};
use crate::classify::PeakClassifier;
use crate::consts::tissue;
use crate::{
    FeatureField, Geometry, LabelVolume, StopReason, TractData, TrackingError, Tractogram,
    VolumeAttr,
};

fn init_logger() {
    let _ = SimpleLogger::new().with_level(log::LevelFilter::Warn).init();
}

/// 只有体素 `idx` 是种子的种子图像.
fn single_seed(g: &Geometry, idx: (usize, usize, usize)) -> LabelVolume {
    let mut seed = LabelVolume::filled(g.clone(), 0);
    seed[idx] = 1;
    seed
}

fn run(data: &TractData, params: TrackingParams) -> Tractogram {
    let classifier = PeakClassifier::polar();
    Tracker::new(data, &classifier, params).unwrap().run()
}

/// 连续两点间距约等于步长, 且长度在 `[min, max]` 内.
fn assert_well_formed(t: &Tractogram, params: &TrackingParams, step: f64) {
    for f in t.fibers.iter() {
        assert!(f.length() >= params.min_tract_length - 1e-9);
        assert!(f.length() <= params.max_tract_length + 1e-9);
        for w in f.points().windows(2) {
            assert!(((w[1] - w[0]).norm() - step).abs() < 1e-6);
        }
    }
}

#[test]
fn test_uniform_field_single_seed() {
    init_logger();
    let g = Geometry::isotropic((3, 3, 250), 1.0);
    let field = FeatureField::uniform(g.clone(), &[1.0, 0.0, 0.0]);
    let data = TractData::new(field).with_seed(single_seed(&g, (1, 1, 125)));
    let params = TrackingParams {
        step_size: Some(1.0),
        min_tract_length: 10.0,
        max_tract_length: 100.0,
        ..Default::default()
    };
    let t = run(&data, params.clone());

    assert_eq!(t.len(), 1);
    assert_eq!(t.report.seeds, 1);
    assert_eq!(t.report.processed, 1);
    let f = &t.fibers[0];
    assert!((f.len() as i64 - 100).abs() <= 1, "got {} points", f.len());
    assert!((f.length() - 100.0).abs() < 1e-6);
    assert!(f.stopped_by(StopReason::Length));
    assert_well_formed(&t, &params, 1.0);

    // 直线: y, z 不变.
    for p in f.points() {
        assert!((p.y - 1.0).abs() < 1e-6 && (p.z - 1.0).abs() < 1e-6);
    }
}

#[test]
fn test_single_voxel_mask_is_discarded() {
    init_logger();
    let g = Geometry::isotropic((3, 3, 20), 1.0);
    let field = FeatureField::uniform(g.clone(), &[1.0, 0.0, 0.0]);
    let data = TractData::new(field)
        .with_mask(single_seed(&g, (1, 1, 10)))
        .with_seed(single_seed(&g, (1, 1, 10)));
    let params = TrackingParams {
        step_size: Some(1.0),
        min_tract_length: 10.0,
        ..Default::default()
    };
    let t = run(&data, params);
    assert!(t.is_empty());
    assert_eq!(t.report.discarded, 1);
    assert_eq!(t.report.stops(StopReason::Mask), 2);
}

#[test]
fn test_sharp_reversal_stops_without_turning() {
    init_logger();
    let g = Geometry::isotropic((1, 1, 20), 1.0);
    let mut raw = Array4::<f32>::zeros((1, 1, 20, 3));
    for w in 0..20 {
        raw[[0, 0, w, 0]] = if w < 10 { 1.0 } else { -1.0 };
    }
    let field = FeatureField::from_array(g.clone(), raw).unwrap();
    let data = TractData::new(field).with_seed(single_seed(&g, (0, 0, 3)));
    let params = TrackingParams {
        step_size: Some(1.0),
        min_tract_length: 0.0,
        num_samples: 0,
        angular_threshold: 45.0,
        ..Default::default()
    };
    let t = run(&data, params);

    assert_eq!(t.len(), 1);
    let f = &t.fibers[0];
    assert_eq!(f.end_reason(), Some(StopReason::NoDirection));
    assert_eq!(f.start_reason(), Some(StopReason::NoDirection));
    assert!(f.points().iter().all(|p| p.x <= 10.0 + 1e-9));
    assert!((f.points().last().unwrap().x - 10.0).abs() < 1e-9);

    // 任意相邻两段都不反向.
    let pts = f.points();
    for w in pts.windows(3) {
        assert!((w[1] - w[0]).dot(&(w[2] - w[1])) > 0.0);
    }
}

#[test]
fn test_stopping_region_is_never_entered() {
    init_logger();
    let g = Geometry::isotropic((3, 3, 40), 1.0);
    let field = FeatureField::uniform(g.clone(), &[1.0, 0.0, 0.0]);
    let mut stop = LabelVolume::filled(g.clone(), 0);
    for z in 0..3 {
        for h in 0..3 {
            stop[(z, h, 30)] = 1;
        }
    }
    let data = TractData::new(field)
        .with_seed(single_seed(&g, (1, 1, 20)))
        .with_stop(stop);
    let params = TrackingParams {
        step_size: Some(0.5),
        min_tract_length: 5.0,
        avoid_stop: false,
        ..Default::default()
    };
    let t = run(&data, params.clone());

    assert_eq!(t.len(), 1);
    let f = &t.fibers[0];
    let stop = data.stop.as_ref().unwrap();
    assert!(f.points().iter().all(|p| !stop.is_set_at(p)));
    assert!(f.points().iter().all(|p| data.is_valid_position(p)));
    assert_eq!(f.end_reason(), Some(StopReason::Mask));
    assert!(f.points().last().unwrap().x < 29.5);
    assert_well_formed(&t, &params, 0.5);
}

/// 方向随位置缓慢变化的场.
fn wavy_data() -> TractData {
    let g = Geometry::isotropic((6, 5, 30), 1.0);
    let raw = Array4::from_shape_fn((6, 5, 30, 3), |(z, h, w, c)| match c {
        0 => 1.0,
        1 => 0.3 * (w as f32 / 4.0).sin(),
        _ => 0.1 * (h as f32 - 2.0) + 0.05 * z as f32,
    });
    let field = FeatureField::from_array(g.clone(), raw).unwrap();
    let mut seed = LabelVolume::filled(g, 0);
    seed.data_mut()
        .indexed_iter_mut()
        .filter(|((_, _, w), _)| *w == 15)
        .for_each(|(_, v)| *v = 1);
    TractData::new(field).with_seed(seed)
}

#[test]
fn test_single_thread_runs_are_identical() {
    init_logger();
    let data = wavy_data();
    let params = TrackingParams {
        min_tract_length: 2.0,
        num_samples: 10,
        num_threads: Some(1),
        ..Default::default()
    };
    let a = run(&data, params.clone());
    let b = run(&data, params);
    assert!(!a.is_empty());
    assert_eq!(a.fibers, b.fibers);
    assert_eq!(a.report.stops(StopReason::Mask), b.report.stops(StopReason::Mask));
}

#[test]
fn test_thread_count_does_not_change_output() {
    init_logger();
    let data = wavy_data();
    for random_sampling in [false, true] {
        let params = TrackingParams {
            min_tract_length: 2.0,
            num_samples: 10,
            seeds_per_voxel: 2,
            random_sampling,
            rng_seed: 42,
            ..Default::default()
        };
        let single = run(
            &data,
            TrackingParams {
                num_threads: Some(1),
                ..params.clone()
            },
        );
        let multi = run(
            &data,
            TrackingParams {
                num_threads: Some(4),
                ..params
            },
        );
        assert_eq!(single.report.seeds, 60);
        assert_eq!(single.fibers, multi.fibers);
    }
}

#[test]
fn test_seeds_per_voxel_jitter() {
    let data = wavy_data();
    let classifier = PeakClassifier::polar();
    let params = TrackingParams {
        seeds_per_voxel: 3,
        ..Default::default()
    };
    let tracker = Tracker::new(&data, &classifier, params).unwrap();
    let seeds = tracker.seeds();
    assert_eq!(seeds.len(), 6 * 5 * 3);

    let g = data.field.geometry();
    for s in seeds.iter() {
        let c = g.index_to_point(s.voxel);
        assert!((s.point - c).amax() <= 0.5);
        assert_eq!(g.point_to_index(&s.point), Some(s.voxel));
    }
    // 同一体素内的种子互不相同.
    assert_ne!(seeds[0].point, seeds[1].point);
    assert_eq!(seeds[0].voxel, seeds[2].voxel);
}

#[test]
fn test_abort_between_seeds() {
    init_logger();
    let data = wavy_data();
    let classifier = PeakClassifier::polar();
    let params = TrackingParams {
        min_tract_length: 2.0,
        num_samples: 10,
        num_threads: Some(1),
        ..Default::default()
    };
    let tracker = Tracker::new(&data, &classifier, params).unwrap();
    let control = tracker.control();
    let finished = Arc::new(Mutex::new(None));

    let c = Arc::clone(&control);
    let aborter = tracker.events().subscribe(Box::new(move |e| {
        if let TrackingEvent::SeedFinished { .. } = e {
            c.abort();
        }
    }));
    let f = Arc::clone(&finished);
    tracker.events().subscribe(Box::new(move |e| {
        if let TrackingEvent::Finished { aborted, .. } = e {
            *f.lock().unwrap() = Some(*aborted);
        }
    }));

    let t = tracker.run();
    assert!(t.report.aborted);
    assert_eq!(t.report.processed, 1);
    assert_eq!(t.report.seeds, 30);
    assert!(t.len() <= 1);
    assert_eq!(*finished.lock().unwrap(), Some(true));

    // 复位后可以完整运行.
    assert!(tracker.events().unsubscribe(aborter));
    control.reset();
    let t = tracker.run();
    assert!(!t.report.aborted);
    assert_eq!(t.report.processed, 30);
    assert_eq!(*finished.lock().unwrap(), Some(false));
}

#[test]
fn test_demo_mode_publishes_samples() {
    init_logger();
    let g = Geometry::isotropic((3, 3, 20), 1.0);
    let field = FeatureField::uniform(g.clone(), &[1.0, 0.0, 0.0]);
    let data = TractData::new(field).with_seed(single_seed(&g, (1, 1, 10)));
    let classifier = PeakClassifier::polar();
    let params = TrackingParams {
        demo_mode: true,
        num_samples: 12,
        num_threads: Some(4),
        min_tract_length: 1.0,
        ..Default::default()
    };
    let tracker = Tracker::new(&data, &classifier, params).unwrap();
    let steps = Arc::new(AtomicUsize::new(0));
    let s = Arc::clone(&steps);
    let id = tracker.events().subscribe(Box::new(move |e| {
        if let TrackingEvent::Sampled { samples, .. } = e {
            assert!(samples.len() <= 12);
            s.fetch_add(1, Ordering::Relaxed);
        }
    }));
    let t = tracker.run();
    assert_eq!(t.len(), 1);
    assert!(steps.load(Ordering::Relaxed) >= t.fibers[0].len());

    assert!(tracker.events().unsubscribe(id));
    let before = steps.load(Ordering::Relaxed);
    tracker.run();
    assert_eq!(steps.load(Ordering::Relaxed), before);
}

#[test]
fn test_configuration_errors() {
    let g = Geometry::isotropic((2, 2, 2), 1.0);
    let classifier = PeakClassifier::polar();

    let data = TractData::new(FeatureField::uniform(g.clone(), &[1.0, 0.0, 0.0]));
    let params = TrackingParams {
        seed_only_gm: true,
        ..Default::default()
    };
    assert!(matches!(
        Tracker::new(&data, &classifier, params),
        Err(TrackingError::MissingTissueImage)
    ));

    let data = TractData::new(FeatureField::uniform(g.clone(), &[1.0, 0.0]));
    assert!(matches!(
        Tracker::new(&data, &classifier, TrackingParams::default()),
        Err(TrackingError::FeatureLength(3, 2))
    ));

    let data = TractData::new(FeatureField::uniform(g.clone(), &[1.0, 0.0, 0.0]))
        .with_mask(LabelVolume::filled(Geometry::isotropic((2, 2, 3), 1.0), 1));
    assert!(matches!(
        Tracker::new(&data, &classifier, TrackingParams::default()),
        Err(TrackingError::ShapeMismatch("mask", _, _))
    ));

    let data = TractData::new(FeatureField::uniform(g, &[1.0, 0.0, 0.0]));
    let params = TrackingParams {
        max_tract_length: -1.0,
        ..Default::default()
    };
    assert!(matches!(
        Tracker::new(&data, &classifier, params),
        Err(TrackingError::Param(_))
    ));
}

#[test]
fn test_seed_only_gm_seeds() {
    let g = Geometry::isotropic((2, 2, 4), 1.0);
    let field = FeatureField::uniform(g.clone(), &[1.0, 0.0, 0.0]);
    let mut t = LabelVolume::filled(g, tissue::WHITE_MATTER);
    t[(0, 0, 0)] = tissue::CORTICAL_GM;
    t[(1, 1, 3)] = tissue::SUBCORTICAL_GM;
    let data = TractData::new(field).with_tissue(t);
    let classifier = PeakClassifier::polar();
    let params = TrackingParams {
        seed_only_gm: true,
        ..Default::default()
    };
    let tracker = Tracker::new(&data, &classifier, params).unwrap();
    let voxels: Vec<_> = tracker.seeds().iter().map(|s| s.voxel).collect();
    assert_eq!(voxels, vec![(0, 0, 0), (1, 1, 3)]);
    assert_eq!(data.field.len_z(), 2);
}
