use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use crate::strategies::types::{GateResult, RiskProfile, Signal};

/// Everything the admission gates look at for one market.
#[derive(Debug, Clone)]
pub struct GateInputs<'a> {
    pub risk_profile: RiskProfile,
    pub liquidity: f64,
    pub close_time: Option<&'a str>,
    pub edge: Option<f64>,
    pub sigma_f: Option<f64>,
    pub is_schema_supported: bool,
    pub now: DateTime<Utc>,
}

/// Evaluate the five admission gates against the risk profile's thresholds.
///
/// Each gate is a single comparison. A missing or unparseable close time and a
/// missing edge fail their gates.
pub fn evaluate_gates(inputs: &GateInputs<'_>) -> GateResult {
    let cfg = inputs.risk_profile.config();
    let close_hours = inputs
        .close_time
        .and_then(|close| hours_until_close(close, inputs.now));

    GateResult {
        liquidity_ok: inputs.liquidity >= cfg.min_liquidity,
        close_time_ok: close_hours.map_or(false, |h| h >= cfg.min_hours_to_close),
        edge_ok: inputs.edge.map_or(false, |e| e >= cfg.min_edge),
        sigma_ok: inputs.sigma_f.map_or(false, |s| s > 0.0),
        supported_schema: inputs.is_schema_supported,
    }
}

/// Collapse gates and net EV into a signal.
///
/// PASS needs every gate and a positive EV. WATCH means the model produced a number
/// (schema understood, sigma known) even though admission failed.
pub fn derive_signal(gates: &GateResult, ev_net: Option<f64>) -> Signal {
    let positive_ev = ev_net.map_or(false, |ev| ev > 0.0);

    if gates.all_passed() && positive_ev {
        Signal::Pass
    } else if gates.supported_schema && gates.sigma_ok {
        Signal::Watch
    } else {
        Signal::NoTrade
    }
}

/// Hours from `now` until `close_time`, negative once the market has closed.
pub fn hours_until_close(close_time: &str, now: DateTime<Utc>) -> Option<f64> {
    let close = parse_close_time(close_time)?;
    Some((close - now).num_milliseconds() as f64 / 3_600_000.0)
}

/// Parse the close-time shapes the market API emits.
///
/// Zone-less timestamps and bare dates are read as UTC.
pub fn parse_close_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn inputs<'a>(close: Option<&'a str>) -> GateInputs<'a> {
        GateInputs {
            risk_profile: RiskProfile::Balanced,
            liquidity: 2500.0,
            close_time: close,
            edge: Some(0.05),
            sigma_f: Some(4.5),
            is_schema_supported: true,
            now: now(),
        }
    }

    #[test]
    fn test_all_gates_pass() {
        let gates = evaluate_gates(&inputs(Some("2025-06-02T12:00:00Z")));
        assert!(gates.all_passed());
    }

    #[test]
    fn test_liquidity_gate_is_monotonic() {
        let min = RiskProfile::Balanced.config().min_liquidity;
        let mut seen_pass = false;
        for step in 0..=40 {
            let liquidity = min - 1000.0 + step as f64 * 50.0;
            let mut i = inputs(Some("2025-06-02T12:00:00Z"));
            i.liquidity = liquidity;
            let ok = evaluate_gates(&i).liquidity_ok;
            assert_eq!(ok, liquidity >= min);
            if seen_pass {
                assert!(ok, "liquidity gate flipped back at {liquidity}");
            }
            seen_pass |= ok;
        }
        assert!(seen_pass);
    }

    #[test]
    fn test_close_time_fails_closed() {
        assert!(!evaluate_gates(&inputs(None)).close_time_ok);
        assert!(!evaluate_gates(&inputs(Some("not a date"))).close_time_ok);
        assert!(!evaluate_gates(&inputs(Some(""))).close_time_ok);
        // Balanced needs 6h
        assert!(!evaluate_gates(&inputs(Some("2025-06-01T17:59:00Z"))).close_time_ok);
        assert!(evaluate_gates(&inputs(Some("2025-06-01T18:00:00Z"))).close_time_ok);
        // already closed
        assert!(!evaluate_gates(&inputs(Some("2025-05-31T00:00:00Z"))).close_time_ok);
    }

    #[test]
    fn test_edge_and_sigma_gates() {
        let mut i = inputs(Some("2025-06-03"));
        i.edge = Some(0.02);
        assert!(evaluate_gates(&i).edge_ok);
        i.edge = Some(0.019);
        assert!(!evaluate_gates(&i).edge_ok);
        i.edge = None;
        assert!(!evaluate_gates(&i).edge_ok);

        i.sigma_f = Some(0.0);
        assert!(!evaluate_gates(&i).sigma_ok);
        i.sigma_f = None;
        assert!(!evaluate_gates(&i).sigma_ok);

        i.is_schema_supported = false;
        assert!(!evaluate_gates(&i).supported_schema);
    }

    #[test]
    fn test_hours_until_close_formats() {
        let n = now();
        assert_eq!(hours_until_close("2025-06-01T18:00:00Z", n), Some(6.0));
        assert_eq!(hours_until_close("2025-06-01T14:00:00+02:00", n), Some(0.0));
        assert_eq!(hours_until_close("2025-06-02T00:00:00", n), Some(12.0));
        assert_eq!(hours_until_close("2025-06-02", n), Some(12.0));
        assert_eq!(hours_until_close("2025-06-01 13:30:00", n), Some(1.5));
        assert_eq!(hours_until_close("tomorrow-ish", n), None);

        let later = (n + Duration::minutes(90)).to_rfc3339();
        assert_eq!(hours_until_close(&later, n), Some(1.5));
    }

    #[test]
    fn test_signal_truth_table() {
        for bits in 0u8..32 {
            let gates = GateResult {
                liquidity_ok: bits & 1 != 0,
                close_time_ok: bits & 2 != 0,
                edge_ok: bits & 4 != 0,
                sigma_ok: bits & 8 != 0,
                supported_schema: bits & 16 != 0,
            };
            for ev in [Some(0.03), Some(0.0), Some(-0.02), None] {
                let all = bits == 31;
                let positive = matches!(ev, Some(v) if v > 0.0);
                let expected = if all && positive {
                    Signal::Pass
                } else if gates.supported_schema && gates.sigma_ok {
                    Signal::Watch
                } else {
                    Signal::NoTrade
                };
                assert_eq!(derive_signal(&gates, ev), expected, "bits={bits:05b} ev={ev:?}");
            }
        }
    }

    #[test]
    fn test_all_gates_without_ev_is_watch() {
        let gates = GateResult {
            liquidity_ok: true,
            close_time_ok: true,
            edge_ok: true,
            sigma_ok: true,
            supported_schema: true,
        };
        assert_eq!(derive_signal(&gates, None), Signal::Watch);
        assert_eq!(derive_signal(&gates, Some(0.0)), Signal::Watch);
        assert_eq!(derive_signal(&GateResult::default(), Some(1.0)), Signal::NoTrade);
    }
}
