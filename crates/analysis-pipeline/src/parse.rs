//! Tolerant parsing of the model's JSON report.

use analysis_core::{
    AnalysisReport, ReportDetails, ReportMeta, ReportSummary, ReportType, StrategyLevels,
};
use chrono::Utc;
use serde_json::Value;

/// Parse the raw model output into a report.
///
/// Tries, in order: fenced ```json blocks, the raw text, the widest
/// `{...}` window, each with a light repair pass. Irrecoverable output
/// is a hard error (fatal for this ticker).
pub fn parse_report(
    raw: &str,
    ticker: &str,
    fallback_name: &str,
    report_type: ReportType,
    query_id: &str,
    engine_version: &str,
) -> Result<AnalysisReport, String> {
    let value = extract_json(raw).ok_or_else(|| {
        format!("no parseable JSON object in model output ({} chars)", raw.len())
    })?;

    let name = value
        .get("stock_name")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(fallback_name)
        .to_string();

    let sentiment_score = number(&value, "sentiment_score")
        .map(|v| v.round().clamp(0.0, 100.0) as u8)
        .ok_or("missing sentiment_score")?;

    let mut risk_alerts = Vec::new();
    match value.get("risk_warning") {
        Some(Value::String(s)) if !s.trim().is_empty() => risk_alerts.push(s.trim().to_string()),
        Some(Value::Array(items)) => {
            risk_alerts.extend(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string),
            );
        }
        _ => {}
    }

    let strategy_obj = value
        .get("strategy")
        .or_else(|| value.pointer("/dashboard/battle_plan/sniper_points"))
        .cloned()
        .unwrap_or(Value::Null);

    let report = AnalysisReport {
        meta: ReportMeta {
            id: 0,
            query_id: query_id.to_string(),
            ticker: ticker.to_string(),
            name,
            created_at: Utc::now(),
            current_price: None,
            change_pct: None,
            report_type,
            engine_version: engine_version.to_string(),
        },
        summary: ReportSummary {
            sentiment_score,
            analysis_summary: string_field(&value, "analysis_summary").unwrap_or_default(),
            operation_advice: string_field(&value, "operation_advice")
                .unwrap_or_else(|| "观望".to_string()),
            trend_prediction: string_field(&value, "trend_prediction")
                .unwrap_or_else(|| "震荡".to_string()),
            risk_alerts,
        },
        strategy: StrategyLevels {
            ideal_buy: number(&strategy_obj, "ideal_buy"),
            secondary_buy: number(&strategy_obj, "secondary_buy"),
            stop_loss: number(&strategy_obj, "stop_loss"),
            take_profit: number(&strategy_obj, "take_profit"),
        },
        details: ReportDetails { raw_result: raw.to_string(), context_snapshot: None },
    };
    Ok(report)
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Numbers arrive as numbers or as strings ("1650", "1,650.00", "N/A").
fn number(value: &Value, key: &str) -> Option<f64> {
    match value.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            cleaned.parse().ok()
        }
        _ => None,
    }
}

fn extract_json(raw: &str) -> Option<Value> {
    // Fenced blocks first.
    for block in fenced_blocks(raw) {
        if let Some(v) = parse_lenient(&block) {
            return Some(v);
        }
    }
    // Whole payload.
    if let Some(v) = parse_lenient(raw) {
        return Some(v);
    }
    // Widest brace window.
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    parse_lenient(&raw[start..=end])
}

fn fenced_blocks(raw: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut rest = raw;
    while let Some(open) = rest.find("```") {
        let after = &rest[open + 3..];
        let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
        let Some(close) = after[body_start..].find("```") else {
            break;
        };
        blocks.push(after[body_start..body_start + close].trim().to_string());
        rest = &after[body_start + close + 3..];
    }
    blocks
}

fn parse_lenient(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        return v.is_object().then_some(v);
    }
    let repaired = repair(trimmed);
    serde_json::from_str::<Value>(&repaired)
        .ok()
        .filter(Value::is_object)
}

/// Minimal repair for the common model slips: trailing commas and
/// unquoted NaN/None placeholders.
fn repair(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;
    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                // Drop the comma if the next non-space closes a scope.
                let mut lookahead = chars.clone();
                let next = loop {
                    match lookahead.next() {
                        Some(w) if w.is_whitespace() => continue,
                        other => break other,
                    }
                };
                if matches!(next, Some('}') | Some(']')) {
                    continue;
                }
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out.replace("NaN", "null").replace("None", "null")
}
