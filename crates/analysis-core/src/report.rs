use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ReportType;

/// Identity and pricing context of one report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMeta {
    /// Database primary key; 0 until persisted.
    #[serde(default)]
    pub id: i64,
    /// Groups reports from one batch run; not unique.
    pub query_id: String,
    pub ticker: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub current_price: Option<f64>,
    #[serde(default)]
    pub change_pct: Option<f64>,
    pub report_type: ReportType,
    pub engine_version: String,
}

/// The model's verdict on the ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// 0 = max bearish, 100 = max bullish.
    pub sentiment_score: u8,
    pub analysis_summary: String,
    pub operation_advice: String,
    pub trend_prediction: String,
    #[serde(default)]
    pub risk_alerts: Vec<String>,
}

/// Price levels the model proposes. All optional; the model may decline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyLevels {
    #[serde(default)]
    pub ideal_buy: Option<f64>,
    #[serde(default)]
    pub secondary_buy: Option<f64>,
    #[serde(default)]
    pub stop_loss: Option<f64>,
    #[serde(default)]
    pub take_profit: Option<f64>,
}

/// Raw material kept for audit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportDetails {
    pub raw_result: String,
    #[serde(default)]
    pub context_snapshot: Option<String>,
}

/// A complete structured decision report for one ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub meta: ReportMeta,
    pub summary: ReportSummary,
    pub strategy: StrategyLevels,
    pub details: ReportDetails,
}

impl AnalysisReport {
    /// Record (never enforce) stop/take levels that disagree with the
    /// current price. The model is allowed to dissent; the disagreement
    /// is surfaced as a risk alert.
    pub fn note_level_violations(&mut self) {
        let Some(price) = self.meta.current_price else {
            return;
        };
        if let Some(stop) = self.strategy.stop_loss {
            if stop >= price {
                self.summary
                    .risk_alerts
                    .push(format!("stop_loss {stop:.2} is at or above current price {price:.2}"));
            }
        }
        if let Some(take) = self.strategy.take_profit {
            if take <= price {
                self.summary
                    .risk_alerts
                    .push(format!("take_profit {take:.2} is at or below current price {price:.2}"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report(price: Option<f64>) -> AnalysisReport {
        AnalysisReport {
            meta: ReportMeta {
                id: 0,
                query_id: "q-1".into(),
                ticker: "600519".into(),
                name: "Kweichow Moutai".into(),
                created_at: Utc::now(),
                current_price: price,
                change_pct: Some(1.2),
                report_type: ReportType::Detailed,
                engine_version: "0.9.0".into(),
            },
            summary: ReportSummary {
                sentiment_score: 72,
                analysis_summary: "uptrend intact".into(),
                operation_advice: "hold".into(),
                trend_prediction: "bullish".into(),
                risk_alerts: vec![],
            },
            strategy: StrategyLevels {
                ideal_buy: Some(1650.0),
                secondary_buy: None,
                stop_loss: Some(1600.0),
                take_profit: Some(1800.0),
            },
            details: ReportDetails::default(),
        }
    }

    #[test]
    fn serde_round_trip_is_stable() {
        let report = sample_report(Some(1700.0));
        let json = serde_json::to_string(&report).unwrap();
        let back: AnalysisReport = serde_json::from_str(&json).unwrap();
        assert_eq!(report, back);
        assert_eq!(json, serde_json::to_string(&back).unwrap());
    }

    #[test]
    fn inverted_levels_are_recorded_not_rejected() {
        let mut report = sample_report(Some(1700.0));
        report.strategy.stop_loss = Some(1750.0);
        report.note_level_violations();
        assert_eq!(report.summary.risk_alerts.len(), 1);
        // Levels stay untouched.
        assert_eq!(report.strategy.stop_loss, Some(1750.0));
    }

    #[test]
    fn no_price_no_violation_check() {
        let mut report = sample_report(None);
        report.strategy.stop_loss = Some(99999.0);
        report.note_level_violations();
        assert!(report.summary.risk_alerts.is_empty());
    }
}
