//! 一次追踪所需的全部体数据.

use std::path::{Path, PathBuf};

use super::{FeatureField, LabelVolume, VolumeAttr};
use crate::consts::tissue;
use crate::error::{TrackingError, TrackingResult};
use crate::Point;

/// 特征场与其附属的标签体.
///
/// 该结构完全透明, 用户可以直接替换其中的任一部分.
/// 追踪期间所有内容只读, 在工作线程间共享.
///
/// # 注意
///
/// 附属标签体与特征场的网格一致性由 [`Self::validate`] 检查,
/// 追踪器在启动工作线程前会调用它.
#[derive(Debug, Clone)]
pub struct TractData {
    /// 特征场.
    pub field: FeatureField,

    /// 允许追踪的区域. `None` 表示整个特征场都允许追踪.
    pub mask: Option<LabelVolume>,

    /// 种子区域. `None` 表示每个体素都是候选种子.
    pub seed: Option<LabelVolume>,

    /// 停止区域. 流线进入其中立即停止.
    pub stop: Option<LabelVolume>,

    /// 四组织类型图像, 见 [`crate::consts::tissue`].
    pub tissue: Option<LabelVolume>,
}

/// 在 `dir` 下查找 `{stem}.nii.gz` 或 `{stem}.nii`.
fn find_nifti(dir: &Path, stem: &str) -> Option<PathBuf> {
    ["nii.gz", "nii"]
        .into_iter()
        .map(|ext| dir.join(format!("{stem}.{ext}")))
        .find(|p| p.is_file())
}

impl TractData {
    /// 只包含特征场的数据.
    #[inline]
    pub fn new(field: FeatureField) -> Self {
        Self {
            field,
            mask: None,
            seed: None,
            stop: None,
            tissue: None,
        }
    }

    /// 设置掩膜.
    #[inline]
    pub fn with_mask(mut self, mask: LabelVolume) -> Self {
        self.mask = Some(mask);
        self
    }

    /// 设置种子区域.
    #[inline]
    pub fn with_seed(mut self, seed: LabelVolume) -> Self {
        self.seed = Some(seed);
        self
    }

    /// 设置停止区域.
    #[inline]
    pub fn with_stop(mut self, stop: LabelVolume) -> Self {
        self.stop = Some(stop);
        self
    }

    /// 设置四组织类型图像.
    #[inline]
    pub fn with_tissue(mut self, tissue: LabelVolume) -> Self {
        self.tissue = Some(tissue);
        self
    }

    /// 从目录 `dir` 加载 nifti 数据. 目录下必须有 `field.nii[.gz]`,
    /// 可选 `mask`, `seed`, `stop`, `tissue` 同名文件.
    pub fn open_dir<P: AsRef<Path>>(dir: P) -> TrackingResult<Self> {
        let dir = dir.as_ref();
        let field_path = find_nifti(dir, "field").ok_or_else(|| {
            TrackingError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no field.nii[.gz] under {}", dir.display()),
            ))
        })?;

        let open_opt = |stem: &str| -> TrackingResult<Option<LabelVolume>> {
            find_nifti(dir, stem).map(LabelVolume::open).transpose()
        };

        let data = Self {
            field: FeatureField::open(field_path)?,
            mask: open_opt("mask")?,
            seed: open_opt("seed")?,
            stop: open_opt("stop")?,
            tissue: open_opt("tissue")?,
        };
        data.validate()?;
        Ok(data)
    }

    /// 检查所有附属标签体与特征场的网格是否一致.
    pub fn validate(&self) -> TrackingResult<()> {
        let g = self.field.geometry();
        if self.field.size() == 0 || self.field.components() == 0 {
            return Err(TrackingError::EmptyField);
        }
        for (name, vol) in [
            ("mask", &self.mask),
            ("seed", &self.seed),
            ("stop", &self.stop),
            ("tissue", &self.tissue),
        ] {
            if let Some(v) = vol {
                if !v.geometry().is_compatible(g) {
                    return Err(TrackingError::ShapeMismatch(name, g.shape(), v.shape()));
                }
            }
        }
        Ok(())
    }

    /// `p` 是否允许追踪: 在网格内, 在掩膜内, 且不在停止区域内.
    #[inline]
    pub fn is_valid_position(&self, p: &Point) -> bool {
        if !self.field.geometry().is_inside(p) {
            return false;
        }
        if self.mask.as_ref().is_some_and(|m| !m.is_set_at(p)) {
            return false;
        }
        !self.stop.as_ref().is_some_and(|s| s.is_set_at(p))
    }

    /// `p` 处的组织类型. 没有四组织类型图像或在网格外时返回 `None`.
    #[inline]
    pub fn tissue_at(&self, p: &Point) -> Option<u8> {
        self.tissue.as_ref().and_then(|t| t.value_at(p))
    }

    /// `p` 是否位于灰质. 没有四组织类型图像时恒为 `false`.
    #[inline]
    pub fn is_gray_matter(&self, p: &Point) -> bool {
        self.tissue_at(p).is_some_and(tissue::is_gray_matter)
    }
}
