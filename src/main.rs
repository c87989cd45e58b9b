mod ai;
mod config;
mod data;
mod execution;
mod monitoring;
mod strategies;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use ai::explain::{build_fallback_summary, explain_gate, explain_metric};
use ai::summary::{OpenAiClient, SummaryService};
use config::{Config, EnvConfig, LogFormat, MonitoringConfig};
use data::cache::SummaryCache;
use data::gamma_api::GammaApiClient;
use data::weather::WeatherClient;
use execution::persistence::AnalysisDatabase;
use monitoring::logger::CsvLogger;
use strategies::schema::parse_threshold_schema;
use strategies::types::{AnalysisResult, RiskProfile};
use strategies::weather_edge::{AnalysisInput, Collaborators, WeatherEdgeStrategy};

#[derive(Parser)]
#[command(name = "weather-edge")]
#[command(about = "Edge evaluator for Polymarket weather temperature markets", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one market by event title or Polymarket URL
    Analyze {
        /// Event title to search for
        #[arg(long, required_unless_present = "url")]
        title: Option<String>,
        /// Polymarket event or topic URL
        #[arg(long)]
        url: Option<String>,
        /// Risk profile (conservative, balanced, aggressive)
        #[arg(short, long)]
        profile: Option<RiskProfile>,
    },
    /// Summarize comparable history for a stored analysis
    Backtest {
        /// Analysis id
        id: i64,
    },
    /// Print one stored analysis
    Show {
        /// Analysis id
        id: i64,
    },
    /// List the most recent stored analyses
    History {
        /// Clamped to 1..=50
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// List active weather markets by liquidity
    Markets {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
        /// Search markets by event title instead of listing weather tags
        #[arg(short, long)]
        query: Option<String>,
    },
    /// Set the forecast error (°F) used for a location
    Sigma {
        /// Location key, e.g. "newyork" or "default"
        location_key: String,
        sigma_f: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_or_default(&cli.config)?;
    let env_config = EnvConfig::load()?;
    config.apply_env(&env_config);

    init_tracing(&config.monitoring);

    tracing::debug!("Opening database: {}", config.system.database_path);
    let db = Arc::new(AnalysisDatabase::new(&config.system.database_path)?);

    match cli.command {
        Commands::Analyze { title, url, profile } => {
            let strategy = build_strategy(&config, &env_config, db)?;
            let input = AnalysisInput {
                event_title: title,
                event_url: url,
                risk_profile: profile.unwrap_or(config.analysis.default_risk_profile),
            };

            let result = strategy.analyze(&input).await;

            if config.monitoring.csv_logging {
                if let Err(e) = CsvLogger::new(config.monitoring.csv_log_path.clone())
                    .and_then(|logger| logger.log_analysis(&result))
                {
                    tracing::warn!("Failed to write CSV log: {:#}", e);
                }
            }

            println!("{}", serde_json::to_string_pretty(&result)?);
            print_explanations(&result);
        }
        Commands::Backtest { id } => {
            let report =
                strategies::backtest::run_backtest(db.as_ref(), id, config.analysis.history_limit)
                    .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Show { id } => {
            let mut analysis = db
                .get_analysis(id)?
                .with_context(|| format!("Analysis {} not found", id))?;
            if analysis.summary.as_deref().map_or(true, str::is_empty) {
                analysis.summary = Some(build_fallback_summary(&analysis));
            }
            println!("{}", serde_json::to_string_pretty(&analysis)?);
        }
        Commands::History { limit } => {
            let rows = db.list_recent(limit.clamp(1, 50))?;
            for row in &rows {
                let p_model = row
                    .p_model
                    .map(|p| format!("{:.3}", p))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:>6}  {}  {:<11} {:<8} p={:<6} {}",
                    row.id, row.created_at, row.status, row.signal, p_model, row.market_question
                );
            }
            println!("{} of {} stored analyses", rows.len(), db.count_analyses()?);
        }
        Commands::Markets { limit, query } => {
            let gamma = GammaApiClient::new(
                config.infrastructure.gamma_url.clone(),
                config.infrastructure.http_timeout(),
            )?;

            let markets = match query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
                Some(q) => gamma.search_markets_by_title(q, limit).await,
                None => gamma.list_default_weather_markets(limit).await,
            };

            for market in markets {
                let schema = parse_threshold_schema(&market.question);
                let side = match schema.side {
                    Some(side) if schema.is_supported() => side.as_str(),
                    _ => "-",
                };
                println!(
                    "{:>12.0}  {:.3}  {:<9} {}  [{}]",
                    market.liquidity, market.price, side, market.question, market.id
                );
            }
        }
        Commands::Sigma { location_key, sigma_f } => {
            if !sigma_f.is_finite() || sigma_f <= 0.0 {
                anyhow::bail!("sigma must be a positive number of °F");
            }
            let key = data::types::normalize_location_key(&location_key);
            db.upsert_sigma(&key, sigma_f)?;
            tracing::info!("Sigma for {} set to {:.2}°F", key, sigma_f);
        }
    }

    Ok(())
}

fn init_tracing(monitoring: &MonitoringConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&monitoring.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match monitoring.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

fn build_strategy(
    config: &Config,
    env_config: &EnvConfig,
    db: Arc<AnalysisDatabase>,
) -> Result<WeatherEdgeStrategy> {
    let infra = &config.infrastructure;

    let markets = GammaApiClient::new(infra.gamma_url.clone(), infra.http_timeout())?;
    let forecasts = WeatherClient::new(
        infra.geocode_url.clone(),
        infra.forecast_url.clone(),
        infra.http_timeout(),
    )?;

    let llm = match (&env_config.openai_api_key, config.summary.model_enabled) {
        (Some(key), true) => Some(
            OpenAiClient::new(
                key.clone(),
                config.summary.model.clone(),
                config.summary.base_url.clone(),
                infra.http_timeout(),
            )
            .context("Failed to initialize summary model client")?,
        ),
        _ => None,
    };
    let summaries = SummaryService::new(db.clone(), SummaryCache::new(infra.summary_cache_ttl()), llm);

    let deps = Collaborators {
        markets: Arc::new(markets),
        forecasts: Arc::new(forecasts),
        sigmas: db.clone(),
        summaries: Arc::new(summaries),
        results: db,
    };

    Ok(WeatherEdgeStrategy::new(config.analysis.clone(), deps))
}

fn print_explanations(result: &AnalysisResult) {
    let failed = result.gates.failed();
    if failed.is_empty() {
        return;
    }

    eprintln!("\nSignal {} ({}):", result.signal, result.status.as_str());
    for gate in failed {
        eprintln!("  ✗ {:<16} {}", gate, explain_gate(gate));
    }
    if let Some(edge) = result.metrics.edge {
        eprintln!("  Edge {:+.2} pts: {}", edge * 100.0, explain_metric("Edge"));
    }
    if let Some(ev_net) = result.metrics.ev_net {
        eprintln!("  EV net {:+.2} pts: {}", ev_net * 100.0, explain_metric("EV Net"));
    }
}
