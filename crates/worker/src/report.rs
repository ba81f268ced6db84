use std::fmt::Write;

use adaudit_core::domain::diagnosis::{Diagnosis, ScanReport, ScanStatus, Severity};
use adaudit_core::domain::metrics::EntityKind;

fn severity_tag(severity: Severity) -> &'static str {
    match severity {
        Severity::High => "HIGH",
        Severity::Medium => "MEDIUM",
        Severity::Low => "LOW",
    }
}

fn kind_heading(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Campaign => "Campaign Anomaly Report",
        EntityKind::Product => "Product Anomaly Report",
    }
}

pub fn render(reports: &[ScanReport], top: Option<usize>) -> String {
    let mut output = String::new();
    for report in reports {
        render_one(&mut output, report, top);
        let _ = writeln!(output);
    }
    output
}

fn render_one(output: &mut String, report: &ScanReport, top: Option<usize>) {
    let _ = writeln!(output, "# {}", kind_heading(report.kind));
    match report.target_date {
        Some(date) => {
            let _ = writeln!(output, "Target date: {date} (run {})", report.run_id);
        }
        None => {
            let _ = writeln!(output, "Run {}", report.run_id);
        }
    }
    let _ = writeln!(output);

    match report.status {
        ScanStatus::NoData => {
            let _ = writeln!(output, "No metric data available; nothing was scanned.");
            return;
        }
        ScanStatus::Clear => {
            let _ = writeln!(output, "All {}s look stable. No anomalies detected.", report.kind.as_str());
        }
        ScanStatus::Anomalies => {
            let shown = top.unwrap_or(report.diagnoses.len());
            let _ = writeln!(
                output,
                "{} anomalous {}(s), worst spend first:",
                report.diagnoses.len(),
                report.kind.as_str()
            );
            for (i, d) in report.diagnoses.iter().take(shown).enumerate() {
                let _ = writeln!(output);
                render_diagnosis(output, i + 1, d);
            }
            if shown < report.diagnoses.len() {
                let _ = writeln!(output);
                let _ = writeln!(
                    output,
                    "... and {} more below the cutoff.",
                    report.diagnoses.len() - shown
                );
            }
        }
    }

    if !report.skipped.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "Skipped (diagnosis did not complete): {}",
            report.skipped.join(", ")
        );
    }
}

fn render_diagnosis(output: &mut String, rank: usize, d: &Diagnosis) {
    let name = d.trigger.name.as_deref().unwrap_or(d.entity_id.as_str());
    let _ = writeln!(output, "## {rank}. {name} (`{}`)", d.entity_id);
    let _ = writeln!(output, "- Trigger: {}", d.trigger.reason_text);
    let _ = writeln!(
        output,
        "- Numbers: ROAS {:.2} -> {:.2}, CPA {:.2} -> {:.2}, conversions {:.1} -> {:.1} ({:+.0}%)",
        d.trigger.prev_roas,
        d.trigger.curr_roas,
        d.trigger.prev_cpa,
        d.trigger.curr_cpa,
        d.trigger.prev_conv,
        d.trigger.current_conv,
        d.trigger.growth_rate * 100.0
    );
    let _ = writeln!(output, "- Spend at risk: ${:.0}", d.trigger.cost_impact);
    let _ = writeln!(
        output,
        "- Root cause: {} (confidence: {})",
        d.root_cause,
        d.confidence.label()
    );
    let _ = writeln!(output, "- Action: {}", d.action_level.label());
    let _ = writeln!(output, "- Risk status: {}", d.risk.label());
    for reason in &d.risk.reasons {
        let _ = writeln!(output, "  - {reason}");
    }
    if d.coverage < 1.0 {
        let _ = writeln!(
            output,
            "- Coverage: {:.0}% of selected evaluators completed",
            d.coverage * 100.0
        );
    }

    if !d.findings.is_empty() {
        let _ = writeln!(output, "- Findings:");
        for f in &d.findings {
            let _ = writeln!(
                output,
                "  - [{}] {}: {} ({})",
                severity_tag(f.severity),
                f.issue,
                f.evidence,
                f.suggestion
            );
        }
    }
}
