use analysis_core::{Candle, EvidenceBundle, Market, NewsIntel, Quote, TechnicalSnapshot};

/// Size budgets for the evidence bundle. Oversized fields are cut and
/// the cut is recorded in `truncated_fields`.
#[derive(Debug, Clone, Copy)]
pub struct BundleBudget {
    pub max_candles: usize,
    pub max_news_per_dimension: usize,
    pub max_snippet_chars: usize,
    pub max_previous_report_chars: usize,
}

impl Default for BundleBudget {
    fn default() -> Self {
        BundleBudget {
            max_candles: 60,
            max_news_per_dimension: 5,
            max_snippet_chars: 280,
            max_previous_report_chars: 1200,
        }
    }
}

fn clip(text: &mut String, max_chars: usize) -> bool {
    if text.chars().count() <= max_chars {
        return false;
    }
    let cut: String = text.chars().take(max_chars).collect();
    *text = format!("{cut}…");
    true
}

/// Merge the fan-out results into the bundle the LLM will see.
#[allow(clippy::too_many_arguments)]
pub fn assemble_bundle(
    ticker: &str,
    name: &str,
    market: Market,
    quote: Option<Quote>,
    candles: Vec<Candle>,
    technicals: Option<TechnicalSnapshot>,
    mut news: NewsIntel,
    mut previous_report: Option<String>,
    budget: BundleBudget,
) -> EvidenceBundle {
    let mut truncated = Vec::new();

    let candles = if candles.len() > budget.max_candles {
        truncated.push(format!("candles:{}->{}", candles.len(), budget.max_candles));
        candles[candles.len() - budget.max_candles..].to_vec()
    } else {
        candles
    };

    for dim in &mut news.dimensions {
        if dim.items.len() > budget.max_news_per_dimension {
            truncated.push(format!(
                "news.{}:{}->{}",
                dim.name,
                dim.items.len(),
                budget.max_news_per_dimension
            ));
            dim.items.truncate(budget.max_news_per_dimension);
        }
        for item in &mut dim.items {
            if clip(&mut item.snippet, budget.max_snippet_chars) {
                truncated.push(format!("news.{}.snippet", dim.name));
            }
        }
    }

    if let Some(prev) = &mut previous_report {
        if clip(prev, budget.max_previous_report_chars) {
            truncated.push("previous_report".into());
        }
    }

    EvidenceBundle {
        ticker: ticker.to_string(),
        name: name.to_string(),
        market,
        quote,
        candles,
        technicals,
        news,
        previous_report,
        truncated_fields: truncated,
    }
}

/// Render the bundle into the user prompt for the single-shot call.
pub fn render_bundle(bundle: &EvidenceBundle) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Ticker: {} ({})\nMarket: {}\n\n",
        bundle.name, bundle.ticker, bundle.market.as_str()
    ));

    if let Some(quote) = &bundle.quote {
        out.push_str(&format!(
            "Live quote: price {:.3}, change {:+.2}%",
            quote.price, quote.change_pct
        ));
        if let Some(vr) = quote.volume_ratio {
            out.push_str(&format!(", volume ratio {vr:.2}"));
        }
        if let Some(tr) = quote.turnover_rate {
            out.push_str(&format!(", turnover {tr:.2}%"));
        }
        out.push_str("\n\n");
    } else {
        out.push_str("Live quote: unavailable (last close used)\n\n");
    }

    if let Some(tech) = &bundle.technicals {
        out.push_str("Technicals:\n");
        let mut line = |label: &str, value: Option<f64>| {
            if let Some(v) = value {
                out.push_str(&format!("- {label}: {v:.3}\n"));
            }
        };
        line("MA5", tech.ma5);
        line("MA10", tech.ma10);
        line("MA20", tech.ma20);
        line("MACD", tech.macd);
        line("MACD signal", tech.macd_signal);
        line("MACD histogram", tech.macd_histogram);
        line("RSI14", tech.rsi14);
        line("Bias vs MA20 %", tech.bias_pct);
        out.push_str(&format!(
            "- Bias acceptance band: {:.1}%\n- Bullish alignment: {}\n- Trend strength: {:.0}\n",
            tech.bias_band_pct, tech.bullish_alignment, tech.trend_strength
        ));
        if tech.intraday {
            out.push_str("- (computed with today's live price injected)\n");
        }
        out.push('\n');
    }

    if !bundle.candles.is_empty() {
        out.push_str(&format!("Daily candles (last {}):\n", bundle.candles.len()));
        out.push_str("date,open,high,low,close,volume\n");
        for c in &bundle.candles {
            out.push_str(&format!(
                "{},{:.3},{:.3},{:.3},{:.3},{:.0}\n",
                c.date, c.open, c.high, c.low, c.close, c.volume
            ));
        }
        out.push('\n');
    }

    if bundle.news.total_items() > 0 {
        out.push_str("News intelligence:\n");
        for dim in &bundle.news.dimensions {
            if dim.items.is_empty() {
                continue;
            }
            out.push_str(&format!("[{}]\n", dim.name));
            for item in &dim.items {
                let date = item
                    .published_at
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "undated".into());
                out.push_str(&format!("- ({date}) {}: {}\n", item.title, item.snippet));
            }
        }
        out.push('\n');
    } else if bundle.news.search_fallback {
        out.push_str("News intelligence: unavailable (all search providers failed)\n\n");
    }

    if let Some(prev) = &bundle.previous_report {
        out.push_str("Previous report summary:\n");
        out.push_str(prev);
        out.push_str("\n\n");
    }

    if !bundle.truncated_fields.is_empty() {
        out.push_str(&format!(
            "(truncated fields: {})\n",
            bundle.truncated_fields.join(", ")
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::{NewsDimension, NewsItem};
    use chrono::NaiveDate;

    fn candles(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| Candle {
                date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
                    + chrono::Duration::days(i as i64),
                open: 1.0,
                high: 2.0,
                low: 0.5,
                close: 1.5,
                volume: 100.0,
                amount: None,
            })
            .collect()
    }

    #[test]
    fn candle_overflow_truncates_keeping_tail() {
        let bundle = assemble_bundle(
            "600519",
            "Moutai",
            Market::AShare,
            None,
            candles(100),
            None,
            NewsIntel::default(),
            None,
            BundleBudget::default(),
        );
        assert_eq!(bundle.candles.len(), 60);
        // The kept window is the most recent one.
        assert_eq!(
            bundle.candles.last().unwrap().date,
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap() + chrono::Duration::days(99)
        );
        assert!(bundle.truncated_fields.iter().any(|f| f.starts_with("candles:")));
    }

    #[test]
    fn within_budget_records_no_truncation() {
        let bundle = assemble_bundle(
            "600519",
            "Moutai",
            Market::AShare,
            None,
            candles(10),
            None,
            NewsIntel::default(),
            None,
            BundleBudget::default(),
        );
        assert!(bundle.truncated_fields.is_empty());
    }

    #[test]
    fn long_snippets_are_clipped_with_marker() {
        let intel = NewsIntel {
            ticker: "600519".into(),
            dimensions: vec![NewsDimension {
                name: "company_news".into(),
                query: "q".into(),
                items: vec![NewsItem {
                    title: "t".into(),
                    snippet: "x".repeat(1000),
                    url: "https://a/1".into(),
                    published_at: None,
                    source: "company_news".into(),
                    fingerprint: 1,
                    relevance: 0.5,
                }],
            }],
            search_fallback: false,
        };
        let bundle = assemble_bundle(
            "600519",
            "Moutai",
            Market::AShare,
            None,
            vec![],
            None,
            intel,
            None,
            BundleBudget::default(),
        );
        let snippet = &bundle.news.dimensions[0].items[0].snippet;
        assert!(snippet.chars().count() <= 281);
        assert!(snippet.ends_with('…'));
        assert!(bundle
            .truncated_fields
            .iter()
            .any(|f| f == "news.company_news.snippet"));
    }

    #[test]
    fn render_mentions_fallback_when_search_down() {
        let bundle = assemble_bundle(
            "AAPL",
            "Apple",
            Market::Us,
            None,
            vec![],
            None,
            NewsIntel { search_fallback: true, ..Default::default() },
            None,
            BundleBudget::default(),
        );
        let text = render_bundle(&bundle);
        assert!(text.contains("all search providers failed"));
        assert!(text.contains("last close used"));
    }
}
