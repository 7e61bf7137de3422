//! 随机森林推断.
//!
//! 模型以 bincode 格式保存. 每棵树是一组按数组存储的节点, 根节点索引为 0,
//! 子节点索引必须大于父节点索引 (因此树中不可能有环).
//! 叶子节点保存 `directions.len() + 1` 个类别的分布, 最后一个类别是 "无纤维".

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{exact_feature_len, Classifier, Prediction};
use crate::error::{TrackingError, TrackingResult};
use crate::Vec3;

/// 树节点.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ForestNode {
    /// 轴对齐划分: `features[feature] < threshold` 时走左子树.
    Split {
        /// 特征下标.
        feature: u32,

        /// 阈值.
        threshold: f32,

        /// 左子节点下标.
        left: u32,

        /// 右子节点下标.
        right: u32,
    },

    /// 叶子: 类别分布 (未必归一化).
    Leaf(Vec<f32>),
}

/// 单棵决策树.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestTree {
    /// 节点数组, 下标 0 为根.
    pub nodes: Vec<ForestNode>,
}

/// 随机森林模型的可序列化形式.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestModel {
    /// 方向类别 `(x, y, z)`. 加载时会被归一化.
    pub directions: Vec<[f64; 3]>,

    /// 方向类别是否轴向.
    pub axial: bool,

    /// 特征向量长度 (特征场分量 + 3 × 历史方向个数).
    pub num_features: usize,

    /// 决策树.
    pub trees: Vec<ForestTree>,
}

/// 经过校验、可直接用于追踪的随机森林分类器.
#[derive(Debug, Clone)]
pub struct DecisionForest {
    directions: Vec<Vec3>,
    model: ForestModel,
}

/// 模型校验失败.
#[inline]
fn bad_model(msg: &str) -> TrackingError {
    TrackingError::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        msg.to_string(),
    ))
}

impl DecisionForest {
    /// 校验模型并构建分类器.
    ///
    /// 以下任一情况视为非法模型: 没有方向类别或零向量类别, 没有树,
    /// 空树, 子节点下标不大于父节点下标或越界, 特征下标越界,
    /// 叶子分布长度不等于类别数 + 1.
    pub fn from_model(model: ForestModel) -> TrackingResult<Self> {
        if model.directions.is_empty() || model.trees.is_empty() {
            return Err(bad_model("forest has no classes or no trees"));
        }
        let mut directions = Vec::with_capacity(model.directions.len());
        for d in model.directions.iter() {
            let v = Vec3::from(*d);
            let n = v.norm();
            if !n.is_finite() || n < 1e-9 {
                return Err(bad_model("degenerate direction class"));
            }
            directions.push(v / n);
        }

        let classes = directions.len() + 1;
        for tree in model.trees.iter() {
            if tree.nodes.is_empty() {
                return Err(bad_model("empty tree"));
            }
            for (i, node) in tree.nodes.iter().enumerate() {
                match node {
                    ForestNode::Split {
                        feature,
                        left,
                        right,
                        ..
                    } => {
                        let n = tree.nodes.len();
                        let child_ok = |c: u32| (c as usize) > i && (c as usize) < n;
                        if !child_ok(*left) || !child_ok(*right) {
                            return Err(bad_model("bad child index"));
                        }
                        if *feature as usize >= model.num_features {
                            return Err(bad_model("feature index out of range"));
                        }
                    }
                    ForestNode::Leaf(dist) => {
                        if dist.len() != classes {
                            return Err(bad_model("leaf distribution length mismatch"));
                        }
                    }
                }
            }
        }
        Ok(Self { directions, model })
    }

    /// 从 bincode 文件加载模型.
    pub fn open<P: AsRef<Path>>(path: P) -> TrackingResult<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let model: ForestModel = bincode::deserialize_from(reader)?;
        Self::from_model(model)
    }

    /// 以 bincode 格式保存模型.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> TrackingResult<()> {
        let writer = BufWriter::new(File::create(path.as_ref())?);
        bincode::serialize_into(writer, &self.model)?;
        Ok(())
    }

    /// 树的棵数.
    #[inline]
    pub fn len(&self) -> usize {
        self.model.trees.len()
    }

    /// 是否没有树. 校验过的模型恒为 `false`.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.model.trees.is_empty()
    }

    /// 沿一棵树走到叶子.
    fn leaf<'a>(tree: &'a ForestTree, features: &[f32]) -> &'a [f32] {
        let mut i = 0usize;
        loop {
            match &tree.nodes[i] {
                ForestNode::Leaf(dist) => return dist,
                ForestNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let v = features.get(*feature as usize).copied().unwrap_or(0.0);
                    let next = if v < *threshold { *left } else { *right };
                    i = next as usize;
                }
            }
        }
    }
}

impl Classifier for DecisionForest {
    #[inline]
    fn directions(&self) -> &[Vec3] {
        &self.directions
    }

    #[inline]
    fn is_axial(&self) -> bool {
        self.model.axial
    }

    #[inline]
    fn validate_features(&self, field_components: usize, history: usize) -> TrackingResult<()> {
        exact_feature_len(self.model.num_features, field_components, history)
    }

    fn predict_into(&self, features: &[f32], out: &mut Prediction) {
        let n = self.directions.len();
        out.reset(n);
        let mut no_fiber = 0.0f64;
        let mut acc = vec![0.0f64; n];
        for tree in self.model.trees.iter() {
            let dist = Self::leaf(tree, features);
            let total: f64 = dist.iter().map(|v| v.max(0.0) as f64).sum();
            if total <= 0.0 {
                no_fiber += 1.0;
                continue;
            }
            for (a, v) in acc.iter_mut().zip(dist.iter()) {
                *a += v.max(0.0) as f64 / total;
            }
            no_fiber += dist[n].max(0.0) as f64 / total;
        }
        let trees = self.model.trees.len() as f64;
        for (p, a) in out.probs.iter_mut().zip(acc) {
            *p = (a / trees) as f32;
        }
        out.no_fiber = (no_fiber / trees) as f32;
    }
}
