//! 单位球面点集.

use std::collections::HashMap;
use std::f64::consts::PI;

use crate::Vec3;

/// 沿螺旋线在单位球面上均匀分布 `n` 个点.
///
/// 第一个点为南极 `(0, 0, -1)`, 最后一个点为北极 `(0, 0, 1)`.
/// 结果对相同的 `n` 稳定.
pub fn spiral(n: usize) -> Vec<Vec3> {
    match n {
        0 => return vec![],
        1 => return vec![Vec3::z()],
        _ => {}
    }
    let mut ans = Vec::with_capacity(n);
    let mut phi = 0.0f64;
    for k in 0..n {
        let h = -1.0 + 2.0 * k as f64 / (n - 1) as f64;
        let theta = h.acos();
        phi = if k == 0 || k + 1 == n {
            0.0
        } else {
            (phi + 3.6 / (n as f64 * (1.0 - h * h)).sqrt()) % (2.0 * PI)
        };
        ans.push(Vec3::new(
            theta.sin() * phi.cos(),
            theta.sin() * phi.sin(),
            theta.cos(),
        ));
    }
    ans
}

/// 细分 `subdivisions` 次的正二十面体顶点, 已投影到单位球面.
///
/// 顶点集合关于三个坐标平面对称, 也关于原点对称.
/// 0 次细分得到 12 个点, 1 次 42 个, 2 次 162 个.
pub fn icosphere(subdivisions: usize) -> Vec<Vec3> {
    let phi = (1.0 + 5.0f64.sqrt()) / 2.0;
    let mut vertices: Vec<Vec3> = [
        (-1.0, phi, 0.0),
        (1.0, phi, 0.0),
        (-1.0, -phi, 0.0),
        (1.0, -phi, 0.0),
        (0.0, -1.0, phi),
        (0.0, 1.0, phi),
        (0.0, -1.0, -phi),
        (0.0, 1.0, -phi),
        (phi, 0.0, -1.0),
        (phi, 0.0, 1.0),
        (-phi, 0.0, -1.0),
        (-phi, 0.0, 1.0),
    ]
    .into_iter()
    .map(|(x, y, z)| Vec3::new(x, y, z).normalize())
    .collect();

    let mut faces: Vec<[usize; 3]> = vec![
        [0, 11, 5],
        [0, 5, 1],
        [0, 1, 7],
        [0, 7, 10],
        [0, 10, 11],
        [1, 5, 9],
        [5, 11, 4],
        [11, 10, 2],
        [10, 7, 6],
        [7, 1, 8],
        [3, 9, 4],
        [3, 4, 2],
        [3, 2, 6],
        [3, 6, 8],
        [3, 8, 9],
        [4, 9, 5],
        [2, 4, 11],
        [6, 2, 10],
        [8, 6, 7],
        [9, 8, 1],
    ];

    for _ in 0..subdivisions {
        let mut midpoints = HashMap::<(usize, usize), usize>::with_capacity(faces.len() * 2);
        let mut next = Vec::with_capacity(faces.len() * 4);
        let mut midpoint = |a: usize, b: usize, vertices: &mut Vec<Vec3>| -> usize {
            let key = (a.min(b), a.max(b));
            *midpoints.entry(key).or_insert_with(|| {
                let m = ((vertices[a] + vertices[b]) / 2.0).normalize();
                vertices.push(m);
                vertices.len() - 1
            })
        };
        for &[a, b, c] in faces.iter() {
            let ab = midpoint(a, b, &mut vertices);
            let bc = midpoint(b, c, &mut vertices);
            let ca = midpoint(c, a, &mut vertices);
            next.extend([[a, ab, ca], [b, bc, ab], [c, ca, bc], [ab, bc, ca]]);
        }
        faces = next;
    }
    vertices
}
