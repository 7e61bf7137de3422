//! 运行时错误.

use std::fmt;

use crate::track::ParamError;
use crate::Idx3d;

/// 追踪运行失败的原因. 这些错误都在工作线程启动之前被检测到,
/// 对整次运行是致命的.
///
/// 单根纤维的终止 (越界、无方向等) 不属于错误, 见 [`crate::StopReason`].
#[derive(Debug)]
pub enum TrackingError {
    /// 追踪参数非法.
    Param(ParamError),

    /// 体数据与特征场的网格不一致.
    ///
    /// 第一个参数是体数据名称, 后两个参数分别是期望的和实际的形状.
    ShapeMismatch(&'static str, Idx3d, Idx3d),

    /// 分类器期望的特征长度与特征场 + 历史方向提供的长度不一致.
    ///
    /// 第一个参数是分类器期望值, 第二个参数是实际值.
    FeatureLength(usize, usize),

    /// 启用了灰质相关逻辑, 但没有提供四组织类型图像.
    MissingTissueImage,

    /// 特征场为空 (没有体素或没有特征分量).
    EmptyField,

    /// 体数据元信息非法 (如分辨率非正数).
    BadGeometry,

    /// 读取 nifti 文件错误.
    Nifti(nifti::NiftiError),

    /// 读取 npz 文件错误.
    Npz(ndarray_npy::ReadNpzError),

    /// 其他底层 I/O 错误.
    Io(std::io::Error),

    /// 模型文件解码错误.
    #[cfg(feature = "serde")]
    Decode(bincode::Error),
}

impl fmt::Display for TrackingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Param(e) => write!(f, "invalid tracking parameter: {e}"),
            Self::ShapeMismatch(name, expected, found) => write!(
                f,
                "`{name}` image shape {found:?} does not match field shape {expected:?}"
            ),
            Self::FeatureLength(expected, found) => write!(
                f,
                "classifier expects {expected} features, field and history provide {found}"
            ),
            Self::MissingTissueImage => write!(f, "gray matter logic requires a tissue image"),
            Self::EmptyField => write!(f, "feature field is empty"),
            Self::BadGeometry => write!(f, "volume geometry is invalid"),
            Self::Nifti(e) => write!(f, "nifti error: {e}"),
            Self::Npz(e) => write!(f, "npz error: {e}"),
            Self::Io(e) => write!(f, "i/o error: {e}"),
            #[cfg(feature = "serde")]
            Self::Decode(e) => write!(f, "model decoding error: {e}"),
        }
    }
}

impl std::error::Error for TrackingError {}

impl From<ParamError> for TrackingError {
    fn from(e: ParamError) -> Self {
        Self::Param(e)
    }
}

impl From<nifti::NiftiError> for TrackingError {
    fn from(e: nifti::NiftiError) -> Self {
        Self::Nifti(e)
    }
}

impl From<ndarray_npy::ReadNpzError> for TrackingError {
    fn from(e: ndarray_npy::ReadNpzError) -> Self {
        Self::Npz(e)
    }
}

impl From<std::io::Error> for TrackingError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

#[cfg(feature = "serde")]
impl From<bincode::Error> for TrackingError {
    fn from(e: bincode::Error) -> Self {
        Self::Decode(e)
    }
}

/// 追踪运行结果.
pub type TrackingResult<T> = Result<T, TrackingError>;
