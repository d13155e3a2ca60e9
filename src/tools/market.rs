use anyhow::Context;
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use url::Url;

use crate::config::deserialize_option_u64;

#[derive(Debug, thiserror::Error)]
pub enum MarketDataError {
    #[error("Market data API error for {symbol} (status {status}): {body}")]
    ApiStatus {
        symbol: String,
        status: u16,
        body: String,
    },
    #[error("Not enough closing prices for {0}")]
    InsufficientData(String),
    #[error("Invalid market data base URL: {0}")]
    InvalidBaseUrl(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketSymbol {
    pub symbol: String,
    pub name: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct MarketConfig {
    #[serde(
        rename = "market_symbols",
        default = "default_symbols",
        deserialize_with = "deserialize_symbols"
    )]
    pub symbols: Vec<MarketSymbol>,
    #[serde(rename = "market_base_url", default = "default_base_url")]
    pub base_url: String,
    #[serde(rename = "market_range")]
    pub range: Option<String>,
    #[serde(
        rename = "market_timeout_secs",
        default,
        deserialize_with = "deserialize_option_u64"
    )]
    pub timeout_secs: Option<u64>,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            base_url: default_base_url(),
            range: None,
            timeout_secs: None,
        }
    }
}

fn default_base_url() -> String {
    "https://query1.finance.yahoo.com".to_string()
}

fn default_symbols() -> Vec<MarketSymbol> {
    [
        ("^DJI", "Dow Jones"),
        ("^GSPC", "S&P 500"),
        ("^IXIC", "Nasdaq"),
        ("^VIX", "VIX"),
    ]
    .into_iter()
    .map(|(symbol, name)| MarketSymbol {
        symbol: symbol.to_string(),
        name: name.to_string(),
    })
    .collect()
}

/// Parses `SYMBOL=Display Name` pairs separated by commas. A bare symbol is
/// its own display name.
fn deserialize_symbols<'de, D>(deserializer: D) -> Result<Vec<MarketSymbol>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (symbol, name) = entry.split_once('=').unwrap_or((entry, entry));
            let symbol = symbol.trim();
            if symbol.is_empty() {
                return Err(serde::de::Error::custom(format!(
                    "invalid market symbol '{}': expected 'SYMBOL=Name'",
                    entry
                )));
            }
            let name = match name.trim() {
                "" => symbol,
                name => name,
            };
            Ok(MarketSymbol {
                symbol: symbol.to_string(),
                name: name.to_string(),
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub symbol: String,
    pub name: String,
    pub close: f64,
    pub previous_close: f64,
    pub high: f64,
    pub low: f64,
}

impl Quote {
    pub fn change_pct(&self) -> f64 {
        (self.close - self.previous_close) / self.previous_close * 100.0
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarketSnapshot {
    pub quotes: Vec<Quote>,
}

impl MarketSnapshot {
    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    pub fn render(&self) -> String {
        if self.quotes.is_empty() {
            return "No market data was available for this run.".to_string();
        }
        let mut output = String::from("Latest US market data:\n");
        for quote in &self.quotes {
            output.push_str(&format!(
                "- {}: {:.2} ({:+.2}%) [range {:.2} - {:.2}]\n",
                quote.name,
                quote.close,
                quote.change_pct(),
                quote.low,
                quote.high
            ));
        }
        output.trim_end().to_string()
    }
}

#[derive(Deserialize, Debug)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Deserialize, Debug)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    indicators: Indicators,
}

#[derive(Deserialize, Debug)]
struct Indicators {
    quote: Vec<QuoteSeries>,
}

#[derive(Deserialize, Debug, Default)]
struct QuoteSeries {
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
}

#[derive(Debug, Clone)]
pub struct MarketDataClient {
    symbols: Vec<MarketSymbol>,
    base_url: Url,
    range: String,
    client: Client,
}

impl MarketDataClient {
    pub fn new(config: MarketConfig) -> Result<Self, MarketDataError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|_| MarketDataError::InvalidBaseUrl(config.base_url.clone()))?;
        if base_url.cannot_be_a_base() {
            return Err(MarketDataError::InvalidBaseUrl(config.base_url));
        }
        let range = config
            .range
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| "7d".to_string());
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.unwrap_or(15)))
            .user_agent("marketpost/0.1")
            .build()
            .context("Failed to build market data HTTP client")?;
        Ok(Self {
            symbols: config.symbols,
            base_url,
            range,
            client,
        })
    }

    /// Fetches every configured symbol. Symbols that fail are logged and left out.
    pub async fn fetch_snapshot(&self) -> MarketSnapshot {
        let mut quotes = Vec::new();
        for entry in &self.symbols {
            match self.fetch_quote(entry).await {
                Ok(quote) => {
                    log::info!("fetched {} ({})", entry.name, entry.symbol);
                    quotes.push(quote);
                }
                Err(err) => log::warn!("skipping {}: {:#}", entry.symbol, err),
            }
        }
        if quotes.is_empty() {
            log::warn!("no market data available, continuing without it");
        }
        MarketSnapshot { quotes }
    }

    pub async fn fetch_quote(&self, entry: &MarketSymbol) -> Result<Quote, MarketDataError> {
        let url = self.chart_url(&entry.symbol);
        log::debug!("fetching {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Market data request failed")?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(MarketDataError::ApiStatus {
                symbol: entry.symbol.clone(),
                status,
                body,
            });
        }

        let body = response.text().await.context("Market data body")?;
        let chart: ChartResponse = serde_json::from_str(&body).context("Market data JSON")?;
        let series = chart
            .chart
            .result
            .and_then(|results| results.into_iter().next())
            .and_then(|result| result.indicators.quote.into_iter().next())
            .unwrap_or_default();

        quote_from_series(entry, series)
            .ok_or_else(|| MarketDataError::InsufficientData(entry.symbol.clone()))
    }

    fn chart_url(&self, symbol: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["v8", "finance", "chart", symbol]);
        }
        url.query_pairs_mut()
            .append_pair("range", &self.range)
            .append_pair("interval", "1d");
        url
    }
}

fn quote_from_series(entry: &MarketSymbol, series: QuoteSeries) -> Option<Quote> {
    let closes: Vec<f64> = series.close.into_iter().flatten().collect();
    if closes.len() < 2 {
        return None;
    }
    let close = closes[closes.len() - 1];
    let previous_close = closes[closes.len() - 2];
    if previous_close == 0.0 {
        return None;
    }

    let highs: Vec<f64> = series.high.into_iter().flatten().collect();
    let lows: Vec<f64> = series.low.into_iter().flatten().collect();
    let high = highs
        .iter()
        .chain(closes.iter())
        .copied()
        .fold(f64::MIN, f64::max);
    let low = lows
        .iter()
        .chain(closes.iter())
        .copied()
        .fold(f64::MAX, f64::min);

    Some(Quote {
        symbol: entry.symbol.clone(),
        name: entry.name.clone(),
        close,
        previous_close,
        high,
        low,
    })
}
