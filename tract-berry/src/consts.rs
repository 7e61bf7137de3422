//! 通用常量.

/// 四组织类型 (4TT) 图像的标签值.
pub mod tissue {
    /// 背景.
    pub const BACKGROUND: u8 = 0;

    /// 皮层灰质.
    pub const CORTICAL_GM: u8 = 1;

    /// 皮层下灰质.
    pub const SUBCORTICAL_GM: u8 = 2;

    /// 白质.
    pub const WHITE_MATTER: u8 = 3;

    /// 脑脊液.
    pub const CSF: u8 = 4;

    /// 体素是否是灰质 (皮层或皮层下)?
    #[inline]
    pub const fn is_gray_matter(p: u8) -> bool {
        matches!(p, CORTICAL_GM | SUBCORTICAL_GM)
    }

    /// 体素是否是白质?
    #[inline]
    pub const fn is_white_matter(p: u8) -> bool {
        matches!(p, WHITE_MATTER)
    }
}

/// 追踪过程中的几何常量.
pub mod geom {
    /// 后验曲率检查的窗口长度 (单位: 毫米).
    pub const CURVATURE_WINDOW_MM: f64 = 5.0;

    /// 后验曲率检查窗口内允许的累计转角 (单位: 度).
    pub const MAX_CURVATURE_DEG: f64 = 30.0;

    /// 采样偏移与上一方向夹角余弦大于该值时, 视为 "前方" 采样点 (可投停止票).
    pub const FRONTAL_COS: f64 = 0.7;

    /// 模长小于该值的方向向量视为无效.
    pub const DIRECTION_EPS: f64 = 1e-3;

    /// 历史方向模长大于该值时视为有效.
    pub const HISTORY_VALID_NORM: f64 = 0.5;

    /// 清理阶段中距离小于该值 (单位: 毫米) 的相邻点视为重复点.
    pub const DUPLICATE_POINT_MM: f64 = 1e-6;
}
