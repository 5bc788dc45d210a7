use analysis_core::AnalysisReport;

/// Render a report to the markdown body sent over channels.
///
/// Sections are separated by blank lines and start with a `##` heading:
/// the chunker relies on this shape to split on section boundaries.
pub fn render_report(report: &AnalysisReport, summary_only: bool) -> String {
    let meta = &report.meta;
    let summary = &report.summary;
    let mut out = String::new();

    out.push_str(&format!("# {} ({})\n\n", meta.name, meta.ticker));
    if let Some(price) = meta.current_price {
        let change = meta
            .change_pct
            .map(|c| format!(" ({c:+.2}%)"))
            .unwrap_or_default();
        out.push_str(&format!("Price: {price:.2}{change}\n"));
    }
    out.push_str(&format!(
        "Sentiment: {}/100 | Advice: {} | Trend: {}\n\n",
        summary.sentiment_score, summary.operation_advice, summary.trend_prediction
    ));

    out.push_str("## Summary\n\n");
    out.push_str(&summary.analysis_summary);
    out.push_str("\n\n");

    if !summary.risk_alerts.is_empty() {
        out.push_str("## Risk Alerts\n\n");
        for alert in &summary.risk_alerts {
            out.push_str(&format!("- {alert}\n"));
        }
        out.push('\n');
    }

    if !summary_only {
        let strategy = &report.strategy;
        out.push_str("## Levels\n\n");
        let mut level = |label: &str, value: Option<f64>| {
            if let Some(v) = value {
                out.push_str(&format!("- {label}: {v:.2}\n"));
            }
        };
        level("Ideal buy", strategy.ideal_buy);
        level("Secondary buy", strategy.secondary_buy);
        level("Stop loss", strategy.stop_loss);
        level("Take profit", strategy.take_profit);
        out.push('\n');
    }

    out.push_str(&format!(
        "_{} · {} · engine {}_\n",
        meta.report_type.as_str(),
        meta.created_at.format("%Y-%m-%d %H:%M UTC"),
        meta.engine_version
    ));
    out
}
