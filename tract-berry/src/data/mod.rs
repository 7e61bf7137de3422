use std::ops::{Index, IndexMut};
use std::path::Path;

use ndarray::{Array3, Array4, ArrayD, ArrayView, ArrayView1, ArrayViewMut, Axis, Ix3, Ix4};
use nifti::{InMemNiftiVolume, IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

use crate::error::{TrackingError, TrackingResult};
use crate::{Idx3d, Point, Vec3};

mod tract_data;

pub use tract_data::TractData;

/// 轴对齐体素网格的几何信息: 形状, 分辨率和原点.
///
/// 索引按照 `(z, h, w)` 排列, 物理坐标按照 `(x, y, z)` 排列,
/// 其中 `x` 对应 `w`, `y` 对应 `h`.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    shape: Idx3d,
    spacing: Vec3,
    origin: Point,
}

impl Geometry {
    /// 创建网格几何. `spacing` 和 `origin` 均按 `(x, y, z)` 给出, 以毫米为单位.
    ///
    /// 如果形状存在 0 或分辨率不是正有限数, 则返回 `None`.
    pub fn new(shape: Idx3d, spacing: [f64; 3], origin: [f64; 3]) -> Option<Self> {
        let (z, h, w) = shape;
        let valid_spacing = spacing.iter().all(|s| s.is_finite() && *s > 0.0);
        let valid_origin = origin.iter().all(|o| o.is_finite());
        (z != 0 && h != 0 && w != 0 && valid_spacing && valid_origin).then(|| Self {
            shape,
            spacing: Vec3::from(spacing),
            origin: Point::from(origin),
        })
    }

    /// 原点为 0, 各向同性分辨率为 `mm` 的网格.
    ///
    /// 如果参数非法则 panic.
    pub fn isotropic(shape: Idx3d, mm: f64) -> Self {
        Self::new(shape, [mm; 3], [0.0; 3]).expect("invalid isotropic geometry")
    }

    /// 从 nifti header 中读取网格几何. 只使用 `pixdim` 与 `quatern_{x,y,z}`,
    /// 不处理旋转.
    pub(crate) fn from_header(h: &NiftiHeader) -> Option<Self> {
        let [_, w, hh, z, ..] = h.dim;
        let [_, sx, sy, sz, ..] = h.pixdim;
        Self::new(
            (z as usize, hh as usize, w as usize),
            [sx.abs() as f64, sy.abs() as f64, sz.abs() as f64],
            [h.quatern_x as f64, h.quatern_y as f64, h.quatern_z as f64],
        )
    }

    /// 网格形状 `(z, h, w)`.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.shape
    }

    /// 体素分辨率 `(x, y, z)`, 以毫米为单位.
    #[inline]
    pub fn spacing(&self) -> &Vec3 {
        &self.spacing
    }

    /// 索引 `(0, 0, 0)` 体素中心的物理坐标.
    #[inline]
    pub fn origin(&self) -> &Point {
        &self.origin
    }

    /// 三个方向中最小的分辨率.
    #[inline]
    pub fn min_spacing(&self) -> f64 {
        self.spacing.min()
    }

    /// 体素个数.
    #[inline]
    pub fn size(&self) -> usize {
        let (z, h, w) = self.shape;
        z * h * w
    }

    /// 检查索引是否合法.
    #[inline]
    pub fn contains(&self, &(z0, h0, w0): &Idx3d) -> bool {
        let (z, h, w) = self.shape;
        z0 < z && h0 < h && w0 < w
    }

    /// 行优先线性索引.
    #[inline]
    pub fn linear_index(&self, (z, h, w): Idx3d) -> usize {
        let (_, sh, sw) = self.shape;
        (z * sh + h) * sw + w
    }

    /// 体素中心的物理坐标.
    #[inline]
    pub fn index_to_point(&self, (z, h, w): Idx3d) -> Point {
        self.continuous_to_point([z as f64, h as f64, w as f64])
    }

    /// 连续索引 `(z, h, w)` 对应的物理坐标.
    #[inline]
    pub fn continuous_to_point(&self, [z, h, w]: [f64; 3]) -> Point {
        self.origin + Vec3::new(w, h, z).component_mul(&self.spacing)
    }

    /// 物理坐标对应的连续索引 `(z, h, w)`.
    #[inline]
    pub fn continuous_index(&self, p: &Point) -> [f64; 3] {
        let c = (p - self.origin).component_div(&self.spacing);
        [c.z, c.y, c.x]
    }

    /// 物理坐标是否落在网格内 (每个体素向外延伸半个体素).
    #[inline]
    pub fn is_inside(&self, p: &Point) -> bool {
        let (z, h, w) = self.shape;
        let c = self.continuous_index(p);
        c.iter()
            .zip([z, h, w])
            .all(|(&ci, n)| ci >= -0.5 && ci < n as f64 - 0.5)
    }

    /// 最近体素索引. 不在网格内时返回 `None`.
    #[inline]
    pub fn point_to_index(&self, p: &Point) -> Option<Idx3d> {
        self.is_inside(p).then(|| {
            let [z, h, w] = self.continuous_index(p).map(|c| (c + 0.5).floor() as usize);
            (z, h, w)
        })
    }

    /// 两个网格是否描述同一组体素 (形状相同, 分辨率与原点在误差范围内相同).
    pub fn is_compatible(&self, other: &Geometry) -> bool {
        const TOL: f64 = 1e-4;
        self.shape == other.shape
            && (self.spacing - other.spacing).amax() < TOL
            && (self.origin - other.origin).amax() < TOL
    }
}

/// 体数据的共用属性和部分通用操作.
pub trait VolumeAttr {
    /// 获取网格几何.
    fn geometry(&self) -> &Geometry;

    /// 获取数据形状大小.
    #[inline]
    fn shape(&self) -> Idx3d {
        self.geometry().shape()
    }

    /// 获取水平切片个数.
    #[inline]
    fn len_z(&self) -> usize {
        self.shape().0
    }

    /// 获取数据体素个数.
    #[inline]
    fn size(&self) -> usize {
        self.geometry().size()
    }

    /// 检查索引是否合法.
    #[inline]
    fn check(&self, pos: &Idx3d) -> bool {
        self.geometry().contains(pos)
    }
}

/// nifti 标签体 `[W, H, z]` -> `[z, H, W]`. 不是 3D 时返回错误.
fn label_to_zhw(data: ArrayD<u8>) -> TrackingResult<Array3<u8>> {
    let data = data
        .into_dimensionality::<Ix3>()
        .map_err(|_| TrackingError::BadGeometry)?;
    Ok(data.permuted_axes([2, 1, 0]).as_standard_layout().into_owned())
}

/// nifti 特征场 -> `[z, H, W, c]`.
///
/// 1. 3D `[W, H, z]` 视为单分量;
/// 2. 4D `[W, H, z, c]`;
/// 3. 5D `[W, H, z, 1, c]`, 即 ITK 向量图像的布局, 第四维必须为 1.
///
/// 其余维度返回 [`TrackingError::BadGeometry`].
fn field_to_zhwc(data: ArrayD<f32>) -> TrackingResult<Array4<f32>> {
    let data = match data.ndim() {
        3 => data.insert_axis(Axis(3)),
        4 => data,
        5 if data.len_of(Axis(3)) == 1 => data.index_axis_move(Axis(3), 0),
        _ => return Err(TrackingError::BadGeometry),
    };
    let data = data
        .into_dimensionality::<Ix4>()
        .map_err(|_| TrackingError::BadGeometry)?;
    Ok(data.permuted_axes([2, 1, 0, 3]).as_standard_layout().into_owned())
}

/// 读取 nifti 文件, 返回 header 和体数据对象.
fn read_nifti(path: &Path) -> TrackingResult<(NiftiHeader, InMemNiftiVolume)> {
    let obj = ReaderOptions::new().read_file(path)?;
    let header = obj.header().clone();
    Ok((header, obj.into_volume()))
}

/// 以 `u8` 保存的标签体 (掩膜, 种子, 停止区域, 四组织类型).
#[derive(Debug, Clone)]
pub struct LabelVolume {
    geometry: Geometry,
    data: Array3<u8>,
}

impl VolumeAttr for LabelVolume {
    #[inline]
    fn geometry(&self) -> &Geometry {
        &self.geometry
    }
}

impl Index<Idx3d> for LabelVolume {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx3d> for LabelVolume {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl LabelVolume {
    /// 打开 nii 文件格式的 3D 标签体. `path` 为 nii 文件的本地路径.
    pub fn open<P: AsRef<Path>>(path: P) -> TrackingResult<Self> {
        let (header, volume) = read_nifti(path.as_ref())?;
        let geometry = Geometry::from_header(&header).ok_or(TrackingError::BadGeometry)?;

        let data = label_to_zhw(volume.into_ndarray::<u8>()?)?;
        Self::from_array(geometry, data).ok_or(TrackingError::BadGeometry)
    }

    /// 从 `(z, h, w)` 排列的裸数据直接创建标签体.
    /// 如果数据形状与 `geometry` 不一致, 则返回 `None`.
    pub fn from_array(geometry: Geometry, data: Array3<u8>) -> Option<Self> {
        (data.dim() == geometry.shape()).then_some(Self { geometry, data })
    }

    /// 创建所有体素均为 `value` 的标签体.
    pub fn filled(geometry: Geometry, value: u8) -> Self {
        let data = Array3::from_elem(geometry.shape(), value);
        Self { geometry, data }
    }

    /// 获取物理坐标 `p` 所在体素的值. 不在网格内时返回 `None`.
    #[inline]
    pub fn value_at(&self, p: &Point) -> Option<u8> {
        self.geometry.point_to_index(p).map(|idx| self.data[idx])
    }

    /// 物理坐标 `p` 所在体素是否非零. 网格外视为零.
    #[inline]
    pub fn is_set_at(&self, p: &Point) -> bool {
        self.value_at(p).is_some_and(|v| v > 0)
    }

    /// 收集满足谓词 `pred` 的所有体素对应的下标, 结果按行优先存储.
    pub fn filter_pos<F: Fn(u8) -> bool>(&self, pred: F) -> Vec<Idx3d> {
        self.data
            .indexed_iter()
            .filter_map(|(pos, pixel)| pred(*pixel).then_some(pos))
            .collect()
    }

    /// 非零体素个数.
    #[inline]
    pub fn count_nonzero(&self) -> usize {
        self.data.iter().filter(|p| **p > 0).count()
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, u8, Ix3> {
        self.data.view()
    }

    /// 获得数据的一份可变 shallow copy.
    #[inline]
    pub fn data_mut(&mut self) -> ArrayViewMut<'_, u8, Ix3> {
        self.data.view_mut()
    }
}

/// 特征场: 每个体素保存一个 `f32` 特征向量.
///
/// 数据按 `(z, h, w, c)` 排列.
#[derive(Debug, Clone)]
pub struct FeatureField {
    geometry: Geometry,
    data: Array4<f32>,
}

impl VolumeAttr for FeatureField {
    #[inline]
    fn geometry(&self) -> &Geometry {
        &self.geometry
    }
}

impl FeatureField {
    /// 打开 nii 文件格式的特征场. 维度约定见 [`field_to_zhwc`].
    pub fn open<P: AsRef<Path>>(path: P) -> TrackingResult<Self> {
        let (header, volume) = read_nifti(path.as_ref())?;
        let geometry = Geometry::from_header(&header).ok_or(TrackingError::BadGeometry)?;

        let data = field_to_zhwc(volume.into_ndarray::<f32>()?)?;
        Self::from_array(geometry, data).ok_or(TrackingError::BadGeometry)
    }

    /// 从 `(z, h, w, c)` 排列的裸数据直接创建特征场.
    /// 如果前三维与 `geometry` 不一致或特征分量为 0, 则返回 `None`.
    pub fn from_array(geometry: Geometry, data: Array4<f32>) -> Option<Self> {
        let (z, h, w, c) = data.dim();
        ((z, h, w) == geometry.shape() && c > 0).then_some(Self { geometry, data })
    }

    /// 创建每个体素特征向量都等于 `features` 的均匀特征场.
    ///
    /// `features` 为空时 panic.
    pub fn uniform(geometry: Geometry, features: &[f32]) -> Self {
        assert!(!features.is_empty());
        let (z, h, w) = geometry.shape();
        let data = Array4::from_shape_fn((z, h, w, features.len()), |(_, _, _, k)| features[k]);
        Self { geometry, data }
    }

    /// 特征分量个数.
    #[inline]
    pub fn components(&self) -> usize {
        self.data.dim().3
    }

    /// 体素 `idx` 的特征向量.
    ///
    /// 当 `idx` 越界时 panic.
    #[inline]
    pub fn features_at(&self, (z, h, w): Idx3d) -> ArrayView1<'_, f32> {
        self.data.slice(ndarray::s![z, h, w, ..])
    }

    /// 对物理坐标 `p` 处的特征向量做三线性插值, 结果写入 `out`.
    ///
    /// `out` 的长度必须等于 [`Self::components`]. 如果 `p` 在网格外,
    /// 则返回 `false` 且 `out` 内容无意义.
    pub fn interpolate_into(&self, p: &Point, out: &mut [f32]) -> bool {
        debug_assert_eq!(out.len(), self.components());
        if !self.geometry.is_inside(p) {
            return false;
        }
        let (sz, sh, sw) = self.geometry.shape();
        let c = self.geometry.continuous_index(p);

        // 半体素边带内的点按边界体素处理.
        let mut lo = [0usize; 3];
        let mut hi = [0usize; 3];
        let mut frac = [0f64; 3];
        for (axis, n) in [sz, sh, sw].into_iter().enumerate() {
            let ci = num::clamp(c[axis], 0.0, (n - 1) as f64);
            let i0 = ci.floor() as usize;
            lo[axis] = i0;
            hi[axis] = (i0 + 1).min(n - 1);
            frac[axis] = ci - i0 as f64;
        }

        out.fill(0.0);
        for corner in 0..8u8 {
            let mut weight = 1.0;
            let mut idx = [0usize; 3];
            for axis in 0..3 {
                if corner >> axis & 1 == 1 {
                    weight *= frac[axis];
                    idx[axis] = hi[axis];
                } else {
                    weight *= 1.0 - frac[axis];
                    idx[axis] = lo[axis];
                }
            }
            if weight <= 0.0 {
                continue;
            }
            let voxel = self.features_at((idx[0], idx[1], idx[2]));
            for (o, v) in out.iter_mut().zip(voxel.iter()) {
                *o += (weight as f32) * *v;
            }
        }
        true
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, f32, Ix4> {
        self.data.view()
    }
}

#[cfg(test)]
mod tests {
    use super::{field_to_zhwc, label_to_zhw, FeatureField, Geometry, LabelVolume};
    use crate::error::TrackingError;
    use crate::Point;
    use ndarray::{Array4, ArrayD, IxDyn};

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-8
    }

    #[test]
    fn test_geometry_invalid_input() {
        assert!(Geometry::new((0, 1, 1), [1.0; 3], [0.0; 3]).is_none());
        assert!(Geometry::new((1, 1, 1), [1.0, 0.0, 1.0], [0.0; 3]).is_none());
        assert!(Geometry::new((1, 1, 1), [1.0, f64::NAN, 1.0], [0.0; 3]).is_none());
    }

    #[test]
    fn test_geometry_point_index_conversion() {
        let g = Geometry::new((4, 5, 6), [2.0, 1.0, 0.5], [10.0, -3.0, 1.0]).unwrap();
        let p = g.index_to_point((3, 2, 1));
        assert!(f64_eq(p.x, 12.0));
        assert!(f64_eq(p.y, -1.0));
        assert!(f64_eq(p.z, 2.5));
        assert_eq!(g.point_to_index(&p), Some((3, 2, 1)));

        // 半体素以内仍然归属该体素.
        let q = Point::new(12.9, -1.4, 2.7);
        assert_eq!(g.point_to_index(&q), Some((3, 2, 1)));

        // 网格外.
        assert_eq!(g.point_to_index(&Point::new(8.9, -3.0, 1.0)), None);
        assert_eq!(g.point_to_index(&Point::new(10.0, -3.0, 2.8)), None);
        assert!(g.is_inside(&Point::new(9.1, -3.4, 0.8)));
    }

    #[test]
    fn test_geometry_linear_index() {
        let g = Geometry::isotropic((2, 3, 4), 1.0);
        assert_eq!(g.linear_index((0, 0, 0)), 0);
        assert_eq!(g.linear_index((0, 1, 0)), 4);
        assert_eq!(g.linear_index((1, 2, 3)), 23);
        assert_eq!(g.size(), 24);
    }

    #[test]
    fn test_trilinear_interpolation() {
        let g = Geometry::isotropic((1, 1, 2), 1.0);
        let mut data = Array4::<f32>::zeros((1, 1, 2, 2));
        data[[0, 0, 0, 0]] = 1.0;
        data[[0, 0, 1, 0]] = 3.0;
        data[[0, 0, 0, 1]] = -1.0;
        data[[0, 0, 1, 1]] = -1.0;
        let field = FeatureField::from_array(g, data).unwrap();
        let mut out = [0f32; 2];

        assert!(field.interpolate_into(&Point::new(0.25, 0.0, 0.0), &mut out));
        assert!((out[0] - 1.5).abs() < 1e-6);
        assert!((out[1] + 1.0).abs() < 1e-6);

        // 边带内按边界体素处理.
        assert!(field.interpolate_into(&Point::new(1.4, 0.3, -0.2), &mut out));
        assert!((out[0] - 3.0).abs() < 1e-6);

        assert!(!field.interpolate_into(&Point::new(1.6, 0.0, 0.0), &mut out));
    }

    #[test]
    fn test_field_axes_from_nifti_layout() {
        // 按 [W, H, z, 1, c] 排列, 值编码了各维下标.
        let raw = ArrayD::from_shape_fn(IxDyn(&[4, 3, 2, 1, 3]), |ix| {
            (ix[0] * 100 + ix[1] * 10 + ix[2] + ix[4] * 1000) as f32
        });
        let field = field_to_zhwc(raw).unwrap();
        assert_eq!(field.dim(), (2, 3, 4, 3));
        assert_eq!(field[[1, 2, 3, 2]], 2321.0);
        assert_eq!(field[[0, 1, 2, 0]], 210.0);

        let raw = ArrayD::from_shape_fn(IxDyn(&[4, 3, 2, 3]), |ix| ix[3] as f32);
        let field = field_to_zhwc(raw).unwrap();
        assert_eq!(field.dim(), (2, 3, 4, 3));
        assert_eq!(field[[1, 0, 3, 2]], 2.0);

        let raw = ArrayD::<f32>::zeros(IxDyn(&[4, 3, 2]));
        assert_eq!(field_to_zhwc(raw).unwrap().dim(), (2, 3, 4, 1));
    }

    #[test]
    fn test_unsupported_nifti_dimensions() {
        let bad = [
            vec![4, 3],
            vec![4, 3, 2, 2, 3],
            vec![4, 3, 2, 1, 3, 1],
        ];
        for shape in bad {
            let raw = ArrayD::<f32>::zeros(IxDyn(&shape));
            assert!(matches!(field_to_zhwc(raw), Err(TrackingError::BadGeometry)));
        }
        let raw = ArrayD::<u8>::zeros(IxDyn(&[4, 3, 2, 1]));
        assert!(matches!(label_to_zhw(raw), Err(TrackingError::BadGeometry)));
        let raw = ArrayD::<u8>::zeros(IxDyn(&[4, 3, 2]));
        assert_eq!(label_to_zhw(raw).unwrap().dim(), (2, 3, 4));
    }

    #[test]
    fn test_label_volume_lookup() {
        let g = Geometry::isotropic((3, 3, 3), 2.0);
        let mut mask = LabelVolume::filled(g, 0);
        mask[(1, 1, 2)] = 1;
        assert!(mask.is_set_at(&Point::new(4.0, 2.0, 2.0)));
        assert!(mask.is_set_at(&Point::new(4.9, 2.9, 1.1)));
        assert!(!mask.is_set_at(&Point::new(2.0, 2.0, 2.0)));
        assert!(!mask.is_set_at(&Point::new(40.0, 2.0, 2.0)));
        assert_eq!(mask.count_nonzero(), 1);
        assert_eq!(mask.filter_pos(|p| p > 0), vec![(1, 1, 2)]);
    }
}
