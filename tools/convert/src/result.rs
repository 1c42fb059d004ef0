//! 运行结果汇总.

use std::io::{self, Write};

use label_berry::fetch::FetchReport;
use label_berry::{CaseReport, TissueStatus};

/// 将单个病例的结果写进 `w` 中.
fn describe_into<W: Write>(report: &CaseReport, w: &mut W) -> io::Result<()> {
    const S4: &str = "    ";

    let state = if report.is_ok() { "ok" } else { "FAILED" };
    writeln!(w, "Case `{}`: {state}", report.case)?;
    for volume in report.volumes.iter() {
        writeln!(w, "{S4}{}", volume.source.display())?;
        for t in volume.tissues.iter() {
            match &t.status {
                TissueStatus::Saved { path, triangles } => {
                    writeln!(w, "{S4}{S4}{}: {triangles} triangles -> {}", t.name, path.display())?
                }
                TissueStatus::Skipped(reason) => {
                    writeln!(w, "{S4}{S4}{}: skipped ({reason})", t.name)?
                }
                TissueStatus::Failed(msg) => writeln!(w, "{S4}{S4}{}: failed ({msg})", t.name)?,
            }
        }
        if let Some(e) = volume.error.as_ref() {
            writeln!(w, "{S4}{S4}error: {e}")?;
        }
    }
    write!(
        w,
        "{S4}saved {}, skipped {}, failed files {}",
        report.saved_count(),
        report.skipped_count(),
        report.failed_count()
    )
}

/// 整个运行的结果.
#[derive(Debug, Default)]
pub struct RunSummary {
    cases: Vec<CaseReport>,
    fetch_failed: Vec<String>,
}

impl RunSummary {
    /// 记录下载结果. 下载失败的病例计为失败.
    pub fn record_fetch(&mut self, report: FetchReport) {
        log::info!(
            "Fetched {} cases, {} failed",
            report.fetched.len(),
            report.failed.len()
        );
        self.fetch_failed
            .extend(report.failed.into_iter().map(|(case, _)| case));
    }

    /// 处理过的病例数.
    #[inline]
    pub fn case_count(&self) -> usize {
        self.cases.len()
    }

    /// 所有病例 (包括下载) 都成功?
    pub fn is_ok(&self) -> bool {
        self.fetch_failed.is_empty() && self.cases.iter().all(CaseReport::is_ok)
    }

    /// 打印汇总.
    pub fn print(&self) {
        let stdout = io::stdout();
        let mut lock = stdout.lock();
        if let Err(e) = self.write_to(&mut lock) {
            log::warn!("cannot print summary: {e}");
        }
    }

    /// 将汇总写进 `w` 中.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        utils::sep_to(&mut *w)?;
        for report in self.cases.iter() {
            describe_into(report, w)?;
            writeln!(w)?;
            utils::sep_to(&mut *w)?;
        }
        if !self.fetch_failed.is_empty() {
            writeln!(w, "Download failed: {}", self.fetch_failed.join(", "))?;
        }
        let failed = self.cases.iter().filter(|c| !c.is_ok()).count();
        writeln!(
            w,
            "{} cases, {} meshes saved, {} cases failed",
            self.cases.len(),
            self.cases.iter().map(CaseReport::saved_count).sum::<usize>(),
            failed + self.fetch_failed.len()
        )
    }
}

impl Extend<CaseReport> for RunSummary {
    fn extend<I: IntoIterator<Item = CaseReport>>(&mut self, iter: I) {
        for report in iter {
            if report.is_ok() {
                log::info!("Finished {}: {} meshes", report.case, report.saved_count());
            } else {
                log::warn!("Finished {} with {} failed files", report.case, report.failed_count());
            }
            self.cases.push(report);
        }
    }
}
