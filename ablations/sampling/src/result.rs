//! 实验结果.

use std::io::{self, Write};

use tract_berry::StopReason;

use crate::profile::Profile;

/// 将 `profile` 的结果写进 `w` 中.
fn describe_into<W: Write>(name: &str, p: &Profile, w: &mut W) -> io::Result<()> {
    const S4: &str = "    ";

    #[inline]
    fn f64_to_display(f: Option<f64>) -> String {
        match f {
            Some(f) => format!("{f:.4}"),
            None => "/".to_string(),
        }
    }

    writeln!(w, "Profile `{name}`:")?;
    writeln!(w, "{S4}Subjects: {}", p.get_subjects())?;
    writeln!(w, "{S4}Run report: {}", p.get_report())?;
    writeln!(w, "{S4}Fibers after cleanup: {}", p.get_fibers())?;
    writeln!(w, "{S4}Accept rate: {}", f64_to_display(p.get_accept_rate()))?;
    writeln!(w, "{S4}Average length: {} mm", f64_to_display(p.get_avg_length()))?;
    writeln!(w, "{S4}Average points: {}", f64_to_display(p.get_avg_points()))?;
    for r in StopReason::ALL {
        writeln!(w, "{S4}Stopped by {r}: {}", f64_to_display(p.get_stop_ratio(r)))?;
    }
    writeln!(w, "{S4}Total machine time: {} ms", p.get_total_ms())?;
    let t = p.get_slowest().map(|d| d.as_millis() as f64);
    write!(w, "{S4}Slowest subject costs {} ms", f64_to_display(t))?;
    Ok(())
}

/// 消融实验最终结果.
pub struct AblationResult {
    data: Vec<(&'static str, Profile)>,
}

impl AblationResult {
    pub fn from_iter<I: IntoIterator<Item = (&'static str, Profile)>>(it: I) -> Self {
        Self {
            data: it.into_iter().collect(),
        }
    }

    /// 分析运行结果.
    pub fn analyze(&self) {
        utils::sep();
        let mut buf = Vec::with_capacity(1024);

        for (key, profile) in self.data.iter() {
            if describe_into(key, profile, &mut buf).is_ok() {
                println!("{}", String::from_utf8_lossy(&buf));
            }
            buf.clear();

            utils::sep();
        }
    }
}
