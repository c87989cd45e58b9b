//! One-line explanations shown next to metrics and gates in CLI output.

use crate::execution::types::StoredAnalysis;

pub fn explain_gate(name: &str) -> &'static str {
    match name {
        "liquidityOk" => "Market liquidity meets risk-profile minimum.",
        "closeTimeOk" => "Enough time remains before market close.",
        "edgeOk" => "Edge exceeds risk-profile minimum threshold.",
        "sigmaOk" => "Forecast uncertainty value is available and valid.",
        "supportedSchema" => "Market schema is parseable by current model rules.",
        _ => "Gate check",
    }
}

pub fn explain_metric(label: &str) -> &'static str {
    match label {
        "Market Price" => "Implied probability from Polymarket price.",
        "Model Probability" => "Probability estimated by forecast mean and sigma.",
        "Edge" => "Model probability minus market price. Positive means potential value.",
        "EV Net" => "Expected value after estimated fees/slippage for selected risk profile.",
        "Forecast Temp" => "Forecast central estimate used for probability model.",
        "Sigma" => "Forecast uncertainty (higher means wider outcomes).",
        _ => "",
    }
}

/// Plain summary for a stored row whose summary column is empty.
pub fn build_fallback_summary(row: &StoredAnalysis) -> String {
    if let Some(reason) = row.unsupported_reason.as_deref().filter(|r| !r.is_empty()) {
        return reason.to_string();
    }

    let core = match (row.p_model, row.price) {
        (Some(p), Some(price)) => format!(
            "Signal {}. Model {:.2}% vs market {:.2}%.",
            row.signal,
            p * 100.0,
            price * 100.0
        ),
        _ => format!("Signal {}.", row.signal),
    };

    let profile = if row.risk_profile.is_empty() { "selected" } else { row.risk_profile.as_str() };
    let ev_part = match (row.edge, row.ev_net) {
        (Some(edge), Some(ev_net)) => format!(
            "Edge {:.2} pts, EV net {:.2} pts for {} risk.",
            edge * 100.0,
            ev_net * 100.0,
            profile
        ),
        _ => "Insufficient metrics to compute edge and EV.".to_string(),
    };

    let failed = row.gates.failed();
    let gates_part = if failed.is_empty() {
        "All configured gates passed.".to_string()
    } else {
        format!("Failed gates: {}.", failed.join(", "))
    };

    format!("{} {} {}", core, ev_part, gates_part)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::types::{GateResult, SchemaSide};

    fn row() -> StoredAnalysis {
        StoredAnalysis {
            id: 7,
            source_market_id: Some("m-1".to_string()),
            event_title: "Highest temperature in NYC".to_string(),
            event_url: None,
            market_question: "Will the high be 90°F or above?".to_string(),
            schema_side: Some(SchemaSide::HighGte),
            threshold_f: Some(90.0),
            location_name: Some("New York".to_string()),
            target_date: Some("2025-06-01".to_string()),
            close_time: None,
            price: Some(0.4),
            liquidity: Some(3000.0),
            forecast_temp_f: Some(91.0),
            sigma_f: Some(4.5),
            risk_profile: "Balanced".to_string(),
            p_model: Some(0.5875),
            edge: Some(0.1875),
            ev_net: Some(0.1725),
            gates: GateResult {
                liquidity_ok: true,
                close_time_ok: true,
                edge_ok: true,
                sigma_ok: true,
                supported_schema: true,
            },
            signal: "PASS".to_string(),
            status: "ok".to_string(),
            unsupported_reason: None,
            summary: None,
            created_at: "2025-05-31T12:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_every_gate_has_explanation() {
        for (name, _) in GateResult::default().named() {
            assert_ne!(explain_gate(name), "Gate check", "{name}");
        }
        assert_eq!(explain_gate("unknown"), "Gate check");
        assert_eq!(explain_metric("unknown"), "");
    }

    #[test]
    fn test_fallback_summary_with_metrics() {
        assert_eq!(
            build_fallback_summary(&row()),
            "Signal PASS. Model 58.75% vs market 40.00%. \
             Edge 18.75 pts, EV net 17.25 pts for Balanced risk. \
             All configured gates passed."
        );
    }

    #[test]
    fn test_fallback_summary_missing_metrics() {
        let mut stored = row();
        stored.p_model = None;
        stored.edge = None;
        stored.ev_net = None;
        stored.signal = "NO_TRADE".to_string();
        stored.risk_profile = String::new();
        stored.gates.edge_ok = false;
        stored.gates.sigma_ok = false;

        assert_eq!(
            build_fallback_summary(&stored),
            "Signal NO_TRADE. Insufficient metrics to compute edge and EV. \
             Failed gates: edgeOk, sigmaOk."
        );
    }

    #[test]
    fn test_fallback_summary_prefers_unsupported_reason() {
        let mut stored = row();
        stored.status = "unsupported".to_string();
        stored.unsupported_reason = Some("Could not extract directional threshold.".to_string());
        assert_eq!(
            build_fallback_summary(&stored),
            "Could not extract directional threshold."
        );
    }
}
