use anyhow::{Context, Result};
use chrono::Utc;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use crate::strategies::types::AnalysisResult;

const HEADER: &str =
    "timestamp,id,status,risk_profile,signal,market_id,schema_side,threshold_f,price,liquidity,forecast_temp_f,sigma_f,p_model,edge,ev_net,failed_gates,question";

/// Append-only CSV audit trail of analyses returned to the caller.
pub struct CsvLogger {
    log_path: String,
}

impl CsvLogger {
    pub fn new(log_path: String) -> Result<Self> {
        // Create CSV file with headers if it doesn't exist
        if !Path::new(&log_path).exists() {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .open(&log_path)
                .with_context(|| format!("Failed to create CSV log: {}", log_path))?;

            writeln!(file, "{}", HEADER)?;
        }

        Ok(Self { log_path })
    }

    pub fn log_analysis(&self, result: &AnalysisResult) -> Result<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.log_path)
            .with_context(|| format!("Failed to open CSV log: {}", self.log_path))?;

        writeln!(file, "{}", format_row(result, &Utc::now().to_rfc3339()))?;
        Ok(())
    }
}

fn format_row(result: &AnalysisResult, timestamp: &str) -> String {
    let opt = |v: Option<f64>, precision: usize| match v {
        Some(v) => format!("{:.*}", precision, v),
        None => String::new(),
    };

    [
        timestamp.to_string(),
        result.id.map(|id| id.to_string()).unwrap_or_default(),
        result.status.as_str().to_string(),
        result.risk_profile.as_str().to_string(),
        result.signal.as_str().to_string(),
        escape(result.market_id.as_deref().unwrap_or_default()),
        result.schema.side.map(|s| s.as_str()).unwrap_or_default().to_string(),
        opt(result.schema.threshold_f, 1),
        format!("{:.3}", result.market.price),
        format!("{:.2}", result.market.liquidity),
        opt(result.forecast.temperature_f, 1),
        opt(result.forecast.sigma_f, 2),
        opt(result.metrics.p_model, 4),
        opt(result.metrics.edge, 4),
        opt(result.metrics.ev_net, 4),
        result.gates.failed().join("|"),
        escape(&result.market_question),
    ]
    .join(",")
}

/// Quote a field if it contains a delimiter.
fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
