//! 单个 npz 归档形式的追踪数据.
//!
//! 归档内的条目:
//!
//! | 名称      | 类型   | 形状           | 是否必需 |
//! |-----------|--------|----------------|----------|
//! | `field`   | `f32`  | `(z, h, w, c)` | 是       |
//! | `mask`    | `u8`   | `(z, h, w)`    | 否       |
//! | `seed`    | `u8`   | `(z, h, w)`    | 否       |
//! | `stop`    | `u8`   | `(z, h, w)`    | 否       |
//! | `tissue`  | `u8`   | `(z, h, w)`    | 否       |
//! | `spacing` | `f64`  | `(3,)`, 按 `(x, y, z)` | 否, 默认 1 mm |
//! | `origin`  | `f64`  | `(3,)`, 按 `(x, y, z)` | 否, 默认 0    |
//!
//! 条目名可以带也可以不带 `.npy` 后缀.

use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use log::debug;
use ndarray::{arr1, Array1, Ix1, Ix3, Ix4, OwnedRepr};
use ndarray_npy::{NpzReader, NpzWriter};

use crate::error::{TrackingError, TrackingResult};
use crate::{FeatureField, Geometry, LabelVolume, TractData, VolumeAttr};

/// 在归档条目名中查找 `stem` 或 `stem.npy`.
fn find_entry(names: &[String], stem: &str) -> Option<String> {
    let with_ext = format!("{stem}.npy");
    names
        .iter()
        .find(|n| n.as_str() == stem || n.as_str() == with_ext)
        .cloned()
}

fn read_vec3<R: Read + Seek>(
    npz: &mut NpzReader<R>,
    names: &[String],
    stem: &str,
    default: f64,
) -> TrackingResult<[f64; 3]> {
    let Some(name) = find_entry(names, stem) else {
        return Ok([default; 3]);
    };
    let v: Array1<f64> = npz.by_name::<OwnedRepr<f64>, Ix1>(&name)?;
    match v.as_slice() {
        Some(&[x, y, z]) => Ok([x, y, z]),
        _ => Err(TrackingError::BadGeometry),
    }
}

fn read_label<R: Read + Seek>(
    npz: &mut NpzReader<R>,
    names: &[String],
    stem: &'static str,
    geometry: &Geometry,
) -> TrackingResult<Option<LabelVolume>> {
    let Some(name) = find_entry(names, stem) else {
        return Ok(None);
    };
    let data = npz
        .by_name::<OwnedRepr<u8>, Ix3>(&name)?
        .as_standard_layout()
        .into_owned();
    let found = data.dim();
    LabelVolume::from_array(geometry.clone(), data)
        .map(Some)
        .ok_or(TrackingError::ShapeMismatch(stem, geometry.shape(), found))
}

/// 从 npz 归档加载追踪数据.
pub fn open_npz<P: AsRef<Path>>(path: P) -> TrackingResult<TractData> {
    let path = path.as_ref();
    let mut npz = NpzReader::new(File::open(path)?)?;
    let names = npz.names()?;
    debug!("{}: entries {names:?}", path.display());

    let field_name = find_entry(&names, "field").ok_or_else(|| {
        TrackingError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no `field` entry in {}", path.display()),
        ))
    })?;
    let field = npz
        .by_name::<OwnedRepr<f32>, Ix4>(&field_name)?
        .as_standard_layout()
        .into_owned();
    if field.is_empty() {
        return Err(TrackingError::EmptyField);
    }

    let spacing = read_vec3(&mut npz, &names, "spacing", 1.0)?;
    let origin = read_vec3(&mut npz, &names, "origin", 0.0)?;
    let (z, h, w, _) = field.dim();
    let geometry = Geometry::new((z, h, w), spacing, origin).ok_or(TrackingError::BadGeometry)?;

    let mask = read_label(&mut npz, &names, "mask", &geometry)?;
    let seed = read_label(&mut npz, &names, "seed", &geometry)?;
    let stop = read_label(&mut npz, &names, "stop", &geometry)?;
    let tissue = read_label(&mut npz, &names, "tissue", &geometry)?;

    let data = TractData {
        field: FeatureField::from_array(geometry, field).ok_or(TrackingError::EmptyField)?,
        mask,
        seed,
        stop,
        tissue,
    };
    data.validate()?;
    Ok(data)
}

/// 把追踪数据写入 npz 归档, 格式与 [`open_npz`] 一致.
pub fn save_npz<P: AsRef<Path>>(data: &TractData, path: P) -> TrackingResult<()> {
    let to_io = |e: ndarray_npy::WriteNpzError| {
        TrackingError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
    };
    let mut npz = NpzWriter::new(File::create(path)?);
    let g = data.field.geometry();
    let (sp, o) = (g.spacing(), g.origin());

    npz.add_array("field.npy", &data.field.data()).map_err(to_io)?;
    npz.add_array("spacing.npy", &arr1(&[sp.x, sp.y, sp.z])).map_err(to_io)?;
    npz.add_array("origin.npy", &arr1(&[o.x, o.y, o.z])).map_err(to_io)?;
    for (name, vol) in [
        ("mask.npy", &data.mask),
        ("seed.npy", &data.seed),
        ("stop.npy", &data.stop),
        ("tissue.npy", &data.tissue),
    ] {
        if let Some(v) = vol {
            npz.add_array(name, &v.data()).map_err(to_io)?;
        }
    }
    npz.finish().map_err(to_io)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{find_entry, open_npz, save_npz};
    use crate::error::TrackingError;
    use crate::{FeatureField, Geometry, LabelVolume, TractData, VolumeAttr};

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("tract-berry-{}-{name}.npz", std::process::id()))
    }

    #[test]
    fn test_find_entry() {
        let names = vec!["field.npy".to_string(), "mask".to_string()];
        assert_eq!(find_entry(&names, "field").as_deref(), Some("field.npy"));
        assert_eq!(find_entry(&names, "mask").as_deref(), Some("mask"));
        assert!(find_entry(&names, "seed").is_none());
    }

    #[test]
    fn test_save_then_open() {
        let g = Geometry::new((2, 3, 4), [2.0, 1.0, 0.5], [10.0, -3.0, 1.0]).unwrap();
        let mut mask = LabelVolume::filled(g.clone(), 1);
        mask[(1, 2, 3)] = 0;
        let data = TractData::new(FeatureField::uniform(g.clone(), &[1.0, 0.0, 0.0, 0.5]))
            .with_mask(mask)
            .with_stop(LabelVolume::filled(g.clone(), 0));

        let path = temp_path("roundtrip");
        save_npz(&data, &path).unwrap();
        let back = open_npz(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(back.field.geometry(), &g);
        assert_eq!(back.field.components(), 4);
        assert_eq!(back.field.data(), data.field.data());
        let m = back.mask.as_ref().unwrap();
        assert_eq!(m[(1, 2, 3)], 0);
        assert_eq!(m.count_nonzero(), 23);
        assert!(back.stop.is_some());
        assert!(back.seed.is_none() && back.tissue.is_none());
    }

    #[test]
    fn test_open_missing_file() {
        let err = open_npz(temp_path("does-not-exist")).unwrap_err();
        assert!(matches!(err, TrackingError::Io(_)));
    }
}
