use anyhow::{Context, Result};
use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::data::sources::MarketSource;
use crate::data::types::MarketCandidate;

const WEATHER_TAGS: [&str; 3] = ["weather", "temperature", "global-temp"];
const PAGE_SIZE: usize = 200;
const MAX_PAGES: usize = 12;

fn high_low_re() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r"(?i)\b(high|low)\b").expect("static pattern compiles"))
}

fn temperature_question_re() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| {
        Regex::new(r"(?i)\b(high temperature|low temperature|high in|low in|temperature)\b")
            .expect("static pattern compiles")
    })
}

fn weather_text_re() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| {
        Regex::new(
            r"(?i)\b(weather|temperature|temperatures|rain|snow|hurricane|forecast|high temperature|low temperature|high in|low in|degrees)\b",
        )
        .expect("static pattern compiles")
    })
}

/// Polymarket Gamma REST client.
pub struct GammaApiClient {
    client: Client,
    base_url: String,
}

impl GammaApiClient {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build Gamma HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// GET a JSON document. Transport and HTTP failures are logged and read as "nothing".
    async fn fetch_json(&self, path: &str, query: &[(&str, String)]) -> Option<Value> {
        let url = format!("{}{}", self.base_url, path);
        let response = match self.client.get(&url).query(query).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("Gamma request to {} failed: {}", path, e);
                return None;
            }
        };

        if !response.status().is_success() {
            warn!("Gamma {} returned HTTP {}", path, response.status());
            return None;
        }

        match response.json::<Value>().await {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("Failed to parse Gamma {} response: {}", path, e);
                None
            }
        }
    }

    async fn fetch_active_markets_page(&self, offset: usize, limit: usize) -> Vec<Value> {
        let query = [
            ("active", "true".to_string()),
            ("closed", "false".to_string()),
            ("offset", offset.to_string()),
            ("limit", limit.to_string()),
        ];
        as_array(self.fetch_json("/markets", &query).await)
    }

    async fn fetch_events_by_tag(&self, tag_slug: &str, limit: usize) -> Vec<Value> {
        let query = [
            ("tag_slug", tag_slug.to_string()),
            ("active", "true".to_string()),
            ("closed", "false".to_string()),
            ("limit", limit.to_string()),
        ];
        as_array(self.fetch_json("/events", &query).await)
    }

    async fn fetch_event_by_slug(&self, slug: &str) -> Vec<MarketCandidate> {
        let query = [("slug", slug.to_string()), ("limit", "5".to_string())];
        let events = as_array(self.fetch_json("/events", &query).await);

        events
            .iter()
            .filter_map(|event| event.get("markets").and_then(Value::as_array))
            .flatten()
            .filter_map(to_market)
            .collect()
    }

    /// Scan active markets page by page, keeping those whose text passes `predicate`.
    async fn list_markets_by_predicate<F>(&self, predicate: F, limit: usize) -> Vec<MarketCandidate>
    where
        F: Fn(&str) -> bool + Send,
    {
        let mut deduped: HashMap<String, MarketCandidate> = HashMap::new();

        for page in 0..MAX_PAGES {
            let batch = self.fetch_active_markets_page(page * PAGE_SIZE, PAGE_SIZE).await;
            if batch.is_empty() {
                break;
            }

            for raw in &batch {
                let Some(market) = to_market(raw) else { continue };
                let text = format!("{} {}", market.event_title, market.question).to_lowercase();
                if predicate(&text) {
                    deduped.entry(market.id.clone()).or_insert(market);
                }
            }

            if deduped.len() >= limit && page >= 2 {
                break;
            }
        }

        top_by_liquidity(deduped.into_values().collect(), limit)
    }

    async fn list_tagged_weather_markets(&self, limit: usize) -> Vec<MarketCandidate> {
        let (a, b, c) = tokio::join!(
            self.fetch_events_by_tag(WEATHER_TAGS[0], 15),
            self.fetch_events_by_tag(WEATHER_TAGS[1], 15),
            self.fetch_events_by_tag(WEATHER_TAGS[2], 15),
        );

        let mut deduped: HashMap<String, MarketCandidate> = HashMap::new();
        for event in a.iter().chain(b.iter()).chain(c.iter()) {
            for market in markets_of_event(event) {
                deduped.entry(market.id.clone()).or_insert(market);
            }
        }

        top_by_liquidity(deduped.into_values().collect(), limit)
    }

    /// Weather markets to browse: tagged events first, keyword scan otherwise.
    pub async fn list_default_weather_markets(&self, limit: usize) -> Vec<MarketCandidate> {
        let tagged = self.list_tagged_weather_markets(limit).await;
        if !tagged.is_empty() {
            return tagged;
        }

        self.list_markets_by_predicate(|text| weather_text_re().is_match(text), limit)
            .await
    }

    /// Markets whose event title + question contain every token of `title`.
    pub async fn search_markets_by_title(&self, title: &str, limit: usize) -> Vec<MarketCandidate> {
        let query = title.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }
        let tokens: Vec<String> = query.split_whitespace().map(str::to_string).collect();
        let matches = |text: &str| tokens.iter().all(|t| text.contains(t.as_str()));

        let direct: Vec<MarketCandidate> = self
            .list_tagged_weather_markets(250)
            .await
            .into_iter()
            .filter(|m| matches(&format!("{} {}", m.event_title, m.question).to_lowercase()))
            .take(limit)
            .collect();
        if !direct.is_empty() {
            return direct;
        }

        self.list_markets_by_predicate(matches, limit).await
    }

    async fn resolve_from_url(&self, event_url: &str) -> Option<MarketCandidate> {
        if let Some(topic) = extract_climate_topic(event_url) {
            let candidates = if topic == "weather" || topic == "temperature" {
                self.list_default_weather_markets(20).await
            } else {
                self.search_markets_by_title(&topic, 20).await
            };
            if let Some(pick) = pick_preferred(candidates, |q| temperature_question_re().is_match(q)) {
                return Some(pick);
            }
        }

        if let Some(slug) = extract_event_slug(event_url) {
            let by_slug = self.fetch_event_by_slug(&slug).await;
            if let Some(pick) = pick_preferred(by_slug, |q| high_low_re().is_match(q)) {
                return Some(pick);
            }
        }

        let title_like = title_from_url(event_url)?;
        self.search_markets_by_title(&title_like, 10).await.into_iter().next()
    }

    async fn resolve_from_title(&self, event_title: &str) -> Option<MarketCandidate> {
        let candidates = self.search_markets_by_title(event_title, 20).await;
        pick_preferred(candidates, |q| high_low_re().is_match(q))
    }
}

#[async_trait]
impl MarketSource for GammaApiClient {
    async fn resolve_candidate(
        &self,
        event_title: Option<&str>,
        event_url: Option<&str>,
    ) -> Result<Option<MarketCandidate>> {
        if let Some(url) = event_url.filter(|u| !u.trim().is_empty()) {
            if let Some(market) = self.resolve_from_url(url.trim()).await {
                info!("Resolved market {} from URL", market.id);
                return Ok(Some(market));
            }
            debug!("No market resolved from URL {}", url);
        }

        if let Some(title) = event_title.filter(|t| !t.trim().is_empty()) {
            if let Some(market) = self.resolve_from_title(title).await {
                info!("Resolved market {} from title", market.id);
                return Ok(Some(market));
            }
        }

        Ok(None)
    }
}

fn as_array(value: Option<Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}

/// Markets nested in an event, with event fields copied down.
fn markets_of_event(event: &Value) -> Vec<MarketCandidate> {
    let event_title = pick_string(&[event.get("title"), event.get("slug")]);
    let event_id = pick_string(&[event.get("id")]);
    let event_slug = pick_string(&[event.get("slug")]);

    let Some(markets) = event.get("markets").and_then(Value::as_array) else {
        return Vec::new();
    };

    markets
        .iter()
        .filter_map(|market| {
            let mut row = market.clone();
            if let Value::Object(map) = &mut row {
                map.insert("eventTitle".into(), Value::String(event_title.clone()));
                map.insert("eventId".into(), Value::String(event_id.clone()));
                map.insert("eventSlug".into(), Value::String(event_slug.clone()));
            }
            to_market(&row)
        })
        .collect()
}

/// Normalize a loose Gamma market object. `None` if it lacks a question, title or id.
pub fn to_market(row: &Value) -> Option<MarketCandidate> {
    if !row.is_object() {
        return None;
    }

    let question = pick_string(&[row.get("question"), row.get("title"), row.get("name")]);
    let event_title = pick_string(&[
        row.get("eventTitle"),
        row.pointer("/event/title"),
        row.pointer("/events/0/title"),
        row.get("title"),
    ]);
    let event_title = if event_title.is_empty() { question.clone() } else { event_title };
    let market_id = pick_string(&[row.get("id"), row.get("market_id"), row.get("conditionId")]);

    if question.is_empty() || event_title.is_empty() || market_id.is_empty() {
        return None;
    }

    let event_id = pick_string(&[row.get("event_id"), row.get("eventId"), row.pointer("/event/id")]);
    let event_slug = pick_string(&[row.get("event_slug"), row.get("eventSlug"), row.pointer("/event/slug")]);
    let price = pick_number(&[
        row.get("lastTradePrice"),
        row.get("last_trade_price"),
        row.get("price"),
        row.get("bestAsk"),
        first_outcome_price(row).as_ref(),
    ]);
    let liquidity = pick_number(&[
        row.get("liquidity"),
        row.get("clobLiquidity"),
        row.get("volume"),
        row.get("volumeNum"),
    ]);
    let close_time = pick_string(&[
        row.get("endDate"),
        row.get("end_date_iso"),
        row.get("closedTime"),
        row.get("closeTime"),
        row.get("endTime"),
    ]);

    let url = (!event_slug.is_empty()).then(|| format!("https://polymarket.com/event/{}", event_slug));

    Some(MarketCandidate {
        event_id: if event_id.is_empty() { market_id.clone() } else { event_id },
        id: market_id,
        event_title,
        event_slug: (!event_slug.is_empty()).then_some(event_slug),
        question,
        price: clamp_price(price.unwrap_or(0.5)),
        liquidity: liquidity.unwrap_or(0.0).max(0.0),
        close_time: (!close_time.is_empty()).then_some(close_time),
        url,
        raw: row.clone(),
    })
}

/// `outcomePrices` arrives either as an array or as a JSON-encoded string of one.
fn first_outcome_price(row: &Value) -> Option<Value> {
    match row.get("outcomePrices")? {
        Value::Array(items) => items.first().cloned(),
        Value::String(s) => serde_json::from_str::<Vec<Value>>(s).ok()?.into_iter().next(),
        _ => None,
    }
}

fn pick_string(values: &[Option<&Value>]) -> String {
    values
        .iter()
        .flatten()
        .filter_map(|v| v.as_str())
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or_default()
        .to_string()
}

fn pick_number(values: &[Option<&Value>]) -> Option<f64> {
    values.iter().flatten().find_map(|v| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    })
}

fn clamp_price(value: f64) -> f64 {
    value.clamp(0.01, 0.99)
}

fn top_by_liquidity(mut markets: Vec<MarketCandidate>, limit: usize) -> Vec<MarketCandidate> {
    markets.sort_by(|a, b| b.liquidity.total_cmp(&a.liquidity));
    markets.truncate(limit);
    markets
}

/// First candidate whose question satisfies `prefer`, else the first candidate.
fn pick_preferred<F>(candidates: Vec<MarketCandidate>, prefer: F) -> Option<MarketCandidate>
where
    F: Fn(&str) -> bool,
{
    let idx = candidates.iter().position(|m| prefer(&m.question)).unwrap_or(0);
    candidates.into_iter().nth(idx)
}

fn extract_event_slug(value: &str) -> Option<String> {
    let url = Url::parse(value).ok()?;
    let mut segments = url.path_segments()?;
    while let Some(segment) = segments.next() {
        if segment.eq_ignore_ascii_case("event") {
            return segments.next().filter(|s| !s.is_empty()).map(str::to_string);
        }
    }
    None
}

fn extract_climate_topic(value: &str) -> Option<String> {
    let url = Url::parse(value).ok()?;
    let mut segments = url.path_segments()?;
    if !segments.next()?.eq_ignore_ascii_case("climate-science") {
        return None;
    }
    segments
        .next()
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
}

/// Last path segment of a URL as a space-separated title.
fn title_from_url(value: &str) -> Option<String> {
    let path = value.split(['?', '#']).next().unwrap_or(value);
    let last = path.trim_end_matches('/').rsplit('/').next()?;
    let decoded = percent_decode_str(last).decode_utf8_lossy();
    let title = decoded.replace('-', " ").trim().to_string();
    (!title.is_empty()).then_some(title)
}
