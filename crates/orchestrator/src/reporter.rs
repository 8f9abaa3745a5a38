//! Plain-text rendering of a suite report for terminals and CI logs.

use chatprobe_core::types::TestReport;

/// Render report as a formatted text table.
pub fn render_text(report: &TestReport) -> String {
    let mut out = String::new();
    let title = report
        .configuration
        .name
        .clone()
        .unwrap_or_else(|| format!("Suite {}", report.test_id));
    out.push_str(&format!("=== {title} ===\n"));
    out.push_str(&format!(
        "Started: {}\n",
        report.start_time.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    if let Some(end) = report.end_time {
        let secs = (end - report.start_time).num_milliseconds().max(0) as f64 / 1000.0;
        out.push_str(&format!("Duration: {secs:.1}s\n"));
    }
    out.push('\n');

    out.push_str(&format!(
        "Total: {} | Successful: {} | Failed: {} | Success Rate: {:.1}% | Resolution Rate: {:.1}%\n",
        report.total_conversations,
        report.successful_conversations,
        report.failed_conversations,
        report.metrics.success_rate * 100.0,
        report.metrics.resolution_rate * 100.0,
    ));
    out.push_str(&format!(
        "Avg Length: {:.1} turns | Avg Response: {:.0}ms\n\n",
        report.metrics.average_conversation_length, report.metrics.average_response_time,
    ));

    out.push_str(&format!(
        "  {:<10} {:<12} {:<12} {:<6} {:<9} {:<8} {}\n",
        "Id", "Persona", "Category", "Turns", "Resolved", "Status", "Avg ms"
    ));
    out.push_str(&format!("  {}\n", "-".repeat(72)));

    for c in &report.conversations {
        let id = c.conversation_id.to_string();
        out.push_str(&format!(
            "  {:<10} {:<12} {:<12} {:<6} {:<9} {:<8} {:.0}\n",
            &id[..8],
            c.persona.as_str(),
            c.category.as_deref().unwrap_or("-"),
            c.turns.len(),
            if c.resolution_achieved { "yes" } else { "no" },
            if c.success { "OK" } else { "FAIL" },
            c.metrics.average_response_time,
        ));
    }

    if !report.metrics.common_intents.is_empty() {
        out.push_str("\nCommon Intents:\n");
        for i in &report.metrics.common_intents {
            out.push_str(&format!("  {:<30} {}\n", i.intent, i.count));
        }
    }

    if !report.metrics.error_summary.is_empty() {
        out.push_str("\nErrors:\n");
        for e in &report.metrics.error_summary {
            out.push_str(&format!("  [{}x] {}\n", e.count, e.error));
        }
    }

    out
}
