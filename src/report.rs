//! Reporting: plain-text performance report and LaTeX comparison table.

use std::fmt;

use statrs::distribution::{Continuous, Normal};

use crate::aggregate::SummaryRecord;

/// Metrics of one table column group, in order.
const TABLE_METRICS: [&str; 6] = ["Bias", "MAE", "RMSE", "Coverage", "CI size", "Quantile .95"];

/// Character width of the longest histogram bar.
const BAR_WIDTH: usize = 40;

/// Text report of one summary record.
#[derive(Debug, Clone, Copy)]
pub struct PerformanceReport<'a>(pub &'a SummaryRecord);

impl fmt::Display for PerformanceReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = self.0;
        let spec = r.spec();
        writeln!(f, "Experiment: {}", r.name())?;
        writeln!(
            f,
            "Sample size: {} ({} replications, {} bootstrap resamples)",
            r.sample_size(),
            spec.replications(),
            spec.bootstrap_resamples()
        )?;
        writeln!(f, "True effect: {:.4}", r.true_effect())?;
        writeln!(f, "Successful replications: {} / {}", r.successful(), r.requested())?;
        if r.failed() > 0 {
            let reasons: Vec<String> = r
                .failures()
                .iter()
                .map(|(kind, count)| format!("{kind}={count}"))
                .collect();
            writeln!(f, "Failed replications: {} ({})", r.failed(), reasons.join(", "))?;
        }
        writeln!(f, "Discarded bootstrap draws: {}", r.discarded_draws())?;
        writeln!(f)?;

        writeln!(f, "Point estimate:")?;
        writeln!(f, "- mean: {:.4}", r.mean_estimate())?;
        writeln!(f, "- bias: {:.4}", r.bias())?;
        writeln!(f, "- variance: {:.4}", r.variance())?;
        writeln!(f, "- MAE: {:.4}", r.mae())?;
        writeln!(f, "- RMSE: {:.4}", r.rmse())?;
        writeln!(f, "- Quantile .95: {:.4}", r.scaled_error_q95())?;
        writeln!(f)?;

        writeln!(f, "Standard errors:")?;
        writeln!(f, "- asymptotic (mean): {:.4}", r.mean_asymptotic_se())?;
        writeln!(f, "- bootstrap (mean): {:.4}", r.mean_bootstrap_se())?;
        writeln!(f, "- Monte Carlo sd: {:.4}", r.variance().sqrt())?;
        writeln!(f)?;

        writeln!(f, "Coverage rate (asymptotic / bootstrap):")?;
        for entry in r.coverage() {
            writeln!(
                f,
                "- {:.2}: {:.4} / {:.4} (CI size {:.4} / {:.4})",
                entry.level,
                entry.asymptotic,
                entry.bootstrap,
                entry.asymptotic_mean_width,
                entry.bootstrap_mean_width
            )?;
        }
        writeln!(f)?;
        write_histogram(f, r)
    }
}

/// Density histogram of `sqrt(n) * (estimate - truth)` next to the normal
/// density implied by the mean asymptotic standard error.
///
/// Bars are drawn with `#`; `+` marks the normal density when it falls
/// past the end of the bar, `|` when it falls inside it.
fn write_histogram(f: &mut fmt::Formatter<'_>, r: &SummaryRecord) -> fmt::Result {
    let hist = r.scaled_error_histogram();
    let sd = r.scaled_error_normal_sd();
    writeln!(f, "Scaled error sqrt(n)(estimate - truth), normal overlay sd {sd:.4}:")?;
    let normal = Normal::new(0.0, sd).ok();
    let rows: Vec<(f64, f64, f64)> = hist
        .bins()
        .enumerate()
        .map(|(i, (lower, upper, _))| {
            let centre = 0.5 * (lower + upper);
            let overlay = normal.as_ref().map_or(f64::NAN, |n| n.pdf(centre));
            (centre, hist.density(i), overlay)
        })
        .collect();
    let peak = rows
        .iter()
        .flat_map(|&(_, density, overlay)| [density, overlay])
        .filter(|v| v.is_finite())
        .fold(0.0, f64::max);
    let column = |v: f64| {
        if peak > 0.0 && v.is_finite() {
            (v / peak * BAR_WIDTH as f64).round() as usize
        } else {
            0
        }
    };

    for (centre, density, overlay) in rows {
        let mut bar: Vec<char> = "#".repeat(column(density)).chars().collect();
        if overlay.is_finite() {
            let at = column(overlay);
            if at < bar.len() {
                bar[at] = '|';
            } else {
                bar.resize(at, ' ');
                bar.push('+');
            }
        }
        let bar: String = bar.into_iter().collect();
        writeln!(f, "{centre:>9.3} {density:>8.4} {overlay:>8.4} {bar}")?;
    }
    Ok(())
}

/// Render the text report of `record`.
#[must_use]
pub fn performance_report(record: &SummaryRecord) -> String {
    PerformanceReport(record).to_string()
}

/// LaTeX table comparing interval methods across sample sizes.
///
/// One column group per record (sorted by sample size), one row per
/// interval method. Point-estimate metrics repeat across rows.
#[derive(Debug, Clone)]
pub struct LatexTable<'a> {
    records: Vec<&'a SummaryRecord>,
    level: f64,
    digits: usize,
}

impl<'a> LatexTable<'a> {
    /// Table over `records` at confidence `level`, rounded to `digits`.
    #[must_use]
    pub fn new(records: impl IntoIterator<Item = &'a SummaryRecord>, level: f64, digits: usize) -> Self {
        let mut records: Vec<&SummaryRecord> = records.into_iter().collect();
        records.sort_by_key(|r| r.sample_size());
        Self {
            records,
            level,
            digits,
        }
    }

    fn row(&self, f: &mut fmt::Formatter<'_>, label: &str, bootstrap: bool) -> fmt::Result {
        let d = self.digits;
        write!(f, "{label}")?;
        for r in &self.records {
            let (coverage, width) = r.coverage_at(self.level).map_or((f64::NAN, f64::NAN), |c| {
                if bootstrap {
                    (c.bootstrap, c.bootstrap_mean_width)
                } else {
                    (c.asymptotic, c.asymptotic_mean_width)
                }
            });
            for value in [r.bias(), r.mae(), r.rmse(), coverage, width, r.scaled_error_q95()] {
                write!(f, " & {value:.d$}")?;
            }
        }
        writeln!(f, r" \\")
    }
}

impl fmt::Display for LatexTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let per_group = TABLE_METRICS.len();
        writeln!(f, r"\begin{{table}}")?;
        write!(f, r"\begin{{tabular}}{{l|")?;
        for _ in &self.records {
            write!(f, "{}", "c".repeat(per_group))?;
        }
        writeln!(f, "}}")?;
        writeln!(f, r"\toprule")?;

        write!(f, " ")?;
        for r in &self.records {
            write!(f, r" & \multicolumn{{{per_group}}}{{c}}{{{}}}", r.sample_size())?;
        }
        writeln!(f, r" \\")?;

        write!(f, "interval")?;
        for _ in &self.records {
            for metric in TABLE_METRICS {
                write!(f, " & {metric}")?;
            }
        }
        writeln!(f, r" \\")?;
        writeln!(f, r"\hline")?;

        self.row(f, "asymptotic", false)?;
        self.row(f, "bootstrap", true)?;

        writeln!(f, r"\bottomrule")?;
        writeln!(f, r"\end{{tabular}}")?;
        writeln!(
            f,
            r"\caption{{Nominal level {:.2}, {}}}",
            self.level,
            self.records.first().map_or("", |r| r.name())
        )?;
        writeln!(f, r"\end{{table}}")
    }
}

/// Render a LaTeX comparison table.
#[must_use]
pub fn latex_table(records: &[SummaryRecord], level: f64, digits: usize) -> String {
    LatexTable::new(records, level, digits).to_string()
}
