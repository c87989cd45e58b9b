use crate::strategies::types::{RiskProfile, SchemaSide};

/// Probability that the settled temperature lands on the question's side of the threshold.
///
/// Temperature is modelled as N(mean, sigma²). Returns `None` when sigma is not positive,
/// since there is no distribution to integrate.
pub fn probability_for_threshold(
    side: SchemaSide,
    threshold_f: f64,
    mean_f: f64,
    sigma_f: f64,
) -> Option<f64> {
    if sigma_f.is_nan() || sigma_f <= 0.0 {
        return None;
    }

    let z = (threshold_f - mean_f) / sigma_f;
    let p = if side.is_at_or_above() {
        1.0 - normal_cdf(z)
    } else {
        normal_cdf(z)
    };

    Some(p.clamp(0.0, 1.0))
}

/// Standard normal CDF (Zelen & Severo polynomial, A&S 26.2.17).
pub fn normal_cdf(x: f64) -> f64 {
    let t = 1.0 / (1.0 + 0.2316419 * x.abs());
    let d = 0.3989423 * (-x * x / 2.0).exp();
    let p = d
        * t
        * (0.3193815 + t * (-0.3565638 + t * (1.781478 + t * (-1.821256 + t * 1.330274))));

    if x > 0.0 {
        1.0 - p
    } else {
        p
    }
}

/// Model probability minus market price. Positive means the model favors YES.
pub fn compute_edge(p_model: f64, price: f64) -> f64 {
    p_model - price
}

/// Expected value per dollar of holding YES at `price`, net of the profile's fee.
pub fn compute_ev_net(p_model: f64, price: f64, risk_profile: RiskProfile) -> f64 {
    let fee = risk_profile.config().fee_rate;
    let gross = p_model * (1.0 - price) - (1.0 - p_model) * price;
    gross - fee
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIDES: [SchemaSide; 4] = [
        SchemaSide::HighGte,
        SchemaSide::HighLte,
        SchemaSide::LowGte,
        SchemaSide::LowLte,
    ];

    #[test]
    fn test_normal_cdf() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-6);
        assert!((normal_cdf(1.0) - 0.841345).abs() < 1e-5);
        assert!((normal_cdf(-1.0) - 0.158655).abs() < 1e-5);
        assert!((normal_cdf(1.96) - 0.975002).abs() < 1e-5);
        assert!(normal_cdf(-9.0) < 1e-12);
        assert!((normal_cdf(9.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_non_positive_sigma_is_none() {
        for side in SIDES {
            assert_eq!(probability_for_threshold(side, 80.0, 78.0, 0.0), None);
            assert_eq!(probability_for_threshold(side, 80.0, 78.0, -2.5), None);
            assert_eq!(probability_for_threshold(side, 80.0, 78.0, f64::NAN), None);
        }
    }

    #[test]
    fn test_probability_in_unit_interval() {
        let thresholds = [-40.0, 0.0, 32.0, 75.5, 90.0, 130.0];
        let means = [-30.0, 10.0, 50.0, 88.0, 120.0];
        let sigmas = [0.01, 1.0, 4.5, 25.0];

        for side in SIDES {
            for &t in &thresholds {
                for &m in &means {
                    for &s in &sigmas {
                        let p = probability_for_threshold(side, t, m, s).unwrap();
                        assert!((0.0..=1.0).contains(&p), "{side} t={t} m={m} s={s} -> {p}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_gte_and_lte_are_complements() {
        for (t, m, s) in [(90.0, 88.0, 4.5), (32.0, 40.0, 2.0), (70.0, 70.0, 3.3), (10.0, -5.0, 8.0)] {
            let gte = probability_for_threshold(SchemaSide::HighGte, t, m, s).unwrap();
            let lte = probability_for_threshold(SchemaSide::HighLte, t, m, s).unwrap();
            assert!((gte + lte - 1.0).abs() < 1e-6);

            let low_gte = probability_for_threshold(SchemaSide::LowGte, t, m, s).unwrap();
            assert_eq!(low_gte, gte);
        }
    }

    #[test]
    fn test_forecast_to_probability() {
        // mean 92, threshold 90, sigma 4: z = -0.5, P(>= 90) ≈ 0.6915
        let p = probability_for_threshold(SchemaSide::HighGte, 90.0, 92.0, 4.0).unwrap();
        assert!((p - 0.6915).abs() < 1e-3);

        let p = probability_for_threshold(SchemaSide::HighGte, 90.0, 70.0, 4.5).unwrap();
        assert!(p < 0.01);

        let p = probability_for_threshold(SchemaSide::LowLte, 30.0, 20.0, 4.5).unwrap();
        assert!(p > 0.95);
    }

    #[test]
    fn test_edge_and_ev() {
        assert!((compute_edge(0.65, 0.55) - 0.10).abs() < 1e-12);
        assert!((compute_edge(0.30, 0.55) + 0.25).abs() < 1e-12);

        // gross = 0.65*0.45 - 0.35*0.55 = 0.10, which is always p - price
        let ev = compute_ev_net(0.65, 0.55, RiskProfile::Balanced);
        assert!((ev - (0.10 - 0.015)).abs() < 1e-12);

        let ev = compute_ev_net(0.65, 0.55, RiskProfile::Conservative);
        assert!((ev - 0.08).abs() < 1e-12);

        let ev = compute_ev_net(0.50, 0.50, RiskProfile::Aggressive);
        assert!((ev + 0.01).abs() < 1e-12);
    }
}
