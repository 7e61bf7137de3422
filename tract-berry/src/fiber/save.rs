//! 纤维的持久化存储.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use super::{PolyLines, Tractogram};

/// 表明一个可以保存为 VTK legacy ASCII polydata 的折线对象.
///
/// 文件中只有 `POINTS` 与 `LINES` 两节, 每根纤维一个 cell.
pub trait VtkWrite {
    /// 写入 `w`.
    fn write_vtk<W: Write>(&self, w: W) -> io::Result<()>;

    /// 保存到 `path` 路径.
    fn save_vtk<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut w = BufWriter::new(File::create(path)?);
        self.write_vtk(&mut w)?;
        w.flush()
    }
}

impl VtkWrite for PolyLines {
    fn write_vtk<W: Write>(&self, mut w: W) -> io::Result<()> {
        writeln!(w, "# vtk DataFile Version 3.0")?;
        writeln!(w, "tract-berry fibers")?;
        writeln!(w, "ASCII")?;
        writeln!(w, "DATASET POLYDATA")?;
        writeln!(w, "POINTS {} double", self.num_points())?;
        for p in self.points() {
            writeln!(w, "{} {} {}", p.x, p.y, p.z)?;
        }
        let n = self.num_lines();
        writeln!(w, "LINES {} {}", n, n + self.num_points())?;
        for win in self.offsets().windows(2) {
            write!(w, "{}", win[1] - win[0])?;
            for i in win[0]..win[1] {
                write!(w, " {i}")?;
            }
            writeln!(w)?;
        }
        Ok(())
    }
}

impl VtkWrite for Tractogram {
    #[inline]
    fn write_vtk<W: Write>(&self, w: W) -> io::Result<()> {
        self.to_polylines().write_vtk(w)
    }
}
