//! Weekly gain/loss email for the holdings table.
//!
//! Quotes are fetched in batches because the quote API allows only a few calls
//! per minute: batches run one at a time and each is followed by a pause.

use super::table::{read_table, Row};
use super::JobDeps;
use crate::core::collab::Notification;
use crate::core::config::HomeflowConfig;
use crate::core::error::{FlowError, TaskError};
use crate::core::flow::{FlowBuilder, FlowGraph, Input, TaskContext, TaskSpec};
use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use indexmap::IndexMap;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const NAME: &str = "stock-summary";
pub const API_KEY: &str = "ALPHA_VANTAGE_API_KEY";

/// Daily adjusted closing prices.
#[async_trait]
pub trait QuoteSource: Send + Sync + 'static {
    /// Adjusted close on `on`, or on the latest trading day before it.
    async fn adjusted_close(
        &self,
        ctx: &TaskContext,
        ticker: &str,
        on: NaiveDate,
    ) -> Result<f64, TaskError>;
}

/// Alpha Vantage `TIME_SERIES_DAILY_ADJUSTED`, keyed by the `ALPHA_VANTAGE_API_KEY` secret.
pub struct AlphaVantageQuotes {
    http: reqwest::Client,
    base_url: Url,
}

impl AlphaVantageQuotes {
    pub fn new(http: reqwest::Client, base_url: &str) -> Result<Self, TaskError> {
        let base_url = Url::parse(base_url).map_err(|err| {
            TaskError::new(format!("invalid quotes url '{}': {}", base_url, err))
                .with_code("STOCK-001")
        })?;
        Ok(Self { http, base_url })
    }
}

#[derive(Deserialize)]
struct DailySeries {
    #[serde(rename = "Time Series (Daily)")]
    series: Option<IndexMap<String, IndexMap<String, String>>>,
    #[serde(rename = "Error Message")]
    error: Option<String>,
    #[serde(rename = "Note")]
    note: Option<String>,
}

#[async_trait]
impl QuoteSource for AlphaVantageQuotes {
    async fn adjusted_close(
        &self,
        ctx: &TaskContext,
        ticker: &str,
        on: NaiveDate,
    ) -> Result<f64, TaskError> {
        let api_key = ctx.require_secret(API_KEY)?;
        let url = self.base_url.join("/query").map_err(|err| {
            TaskError::new(format!("invalid quotes url: {}", err)).with_code("STOCK-001")
        })?;
        let body: DailySeries = self
            .http
            .get(url)
            .query(&[
                ("function", "TIME_SERIES_DAILY_ADJUSTED"),
                ("symbol", ticker),
                ("apikey", api_key.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let series = body.series.ok_or_else(|| {
            let reason = body
                .error
                .or(body.note)
                .unwrap_or_else(|| "response has no daily series".to_string());
            TaskError::new(reason)
                .with_code("STOCK-002")
                .with_context("ticker", ticker)
        })?;

        let on = on.format("%Y-%m-%d").to_string();
        let (day, fields) = series
            .iter()
            .filter(|(day, _)| day.as_str() <= on.as_str())
            .max_by(|a, b| a.0.cmp(b.0))
            .ok_or_else(|| {
                TaskError::new(format!("no quote on or before {}", on))
                    .with_code("STOCK-002")
                    .with_context("ticker", ticker)
            })?;
        let raw = fields.get("5. adjusted close").ok_or_else(|| {
            TaskError::new(format!("quote for {} has no adjusted close", day))
                .with_code("STOCK-002")
                .with_context("ticker", ticker)
        })?;
        raw.trim().parse().map_err(|_| {
            TaskError::new(format!("adjusted close '{}' is not a number", raw))
                .with_code("STOCK-002")
                .with_context("ticker", ticker)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub stock: String,
    pub initial_value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closing_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gain_loss: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
}

pub fn build(config: &HomeflowConfig, deps: &JobDeps) -> Result<FlowGraph, FlowError> {
    let quotes = AlphaVantageQuotes::new(
        deps.http.clone(),
        &config.jobs.stock_summary.quotes_api_url,
    )?;
    build_with(config, deps, Arc::new(quotes))
}

/// Build the flow against an explicit quote source.
pub fn build_with(
    config: &HomeflowConfig,
    deps: &JobDeps,
    quotes: Arc<dyn QuoteSource>,
) -> Result<FlowGraph, FlowError> {
    let settings = &config.jobs.stock_summary;
    let batch_pause = settings.batch_pause()?;
    let mut flow = FlowBuilder::new(NAME);

    let csv_path = settings.csv_path.clone();
    let stocks = flow.add_task(TaskSpec::from_fn("load_stocks", move |_| {
        let holdings = load_holdings(&read_table(&csv_path)?)?;
        tracing::debug!(count = holdings.len(), "holdings loaded");
        Ok(serde_json::to_value(holdings)?)
    }));

    let batches = flow.add_task(
        TaskSpec::from_fn("split_stocks", |inputs| {
            let holdings: Vec<Holding> = inputs.kwarg_as("stocks")?;
            let size: usize = inputs.kwarg_as("batch_size")?;
            let tickers: Vec<String> = holdings.into_iter().map(|h| h.stock).collect();
            let batches: Vec<Vec<String>> = tickers
                .chunks(size.max(1))
                .map(|chunk| chunk.to_vec())
                .collect();
            Ok(serde_json::to_value(batches)?)
        })
        .kwarg("stocks", stocks.clone())
        .kwarg("batch_size", Input::value(settings.batch_size)),
    );

    let gate = Arc::new(Mutex::new(()));
    let prices = flow.add_task(
        TaskSpec::from_async("get_prices", move |inputs, ctx| {
            let quotes = quotes.clone();
            let gate = gate.clone();
            async move {
                let tickers: Vec<String> = inputs.arg_as(0)?;
                let today = Local::now().date_naive();
                let _turn = gate.lock().await;
                let mut prices = Vec::with_capacity(tickers.len());
                for ticker in &tickers {
                    let price = quotes.adjusted_close(&ctx, ticker, today).await?;
                    tracing::debug!(ticker = %ticker, price, "quote fetched");
                    let mut entry = serde_json::Map::new();
                    entry.insert(ticker.clone(), Value::from(price));
                    prices.push(Value::Object(entry));
                }
                if !batch_pause.is_zero() {
                    tracing::info!(
                        pause = %humantime::format_duration(batch_pause),
                        "pausing for quote rate limit"
                    );
                    tokio::time::sleep(batch_pause).await;
                }
                Ok(Value::Array(prices))
            }
        })
        .map_arg(batches),
    );

    let flat = flow.add_task(TaskSpec::flatten("flatten_prices", prices));

    let merged = flow.add_task(
        TaskSpec::from_fn("merge_prices", |inputs| {
            let entries: Vec<IndexMap<String, f64>> = inputs.arg_as(0)?;
            Ok(serde_json::to_value(merge_prices(entries))?)
        })
        .arg(flat),
    );

    let priced = flow.add_task(
        TaskSpec::from_fn("add_prices", |inputs| {
            let holdings: Vec<Holding> = inputs.kwarg_as("stocks")?;
            let prices: IndexMap<String, f64> = inputs.kwarg_as("prices")?;
            Ok(serde_json::to_value(add_prices(holdings, &prices)?)?)
        })
        .kwarg("stocks", stocks)
        .kwarg("prices", merged),
    );

    let changes = flow.add_task(
        TaskSpec::from_fn("compute_changes", |inputs| {
            let holdings: Vec<Holding> = inputs.arg_as(0)?;
            Ok(serde_json::to_value(compute_changes(holdings))?)
        })
        .arg(priced),
    );

    let message = flow.add_task(
        TaskSpec::from_fn("create_message", |inputs| {
            let holdings: Vec<Holding> = inputs.arg_as(0)?;
            Ok(Value::String(create_message(&holdings)))
        })
        .arg(changes),
    );

    let notifier = deps.notifier.clone();
    let email_to = settings.email_to.clone();
    let subject = settings.subject.clone();
    flow.add_task(
        TaskSpec::from_async("send_email", move |inputs, _ctx| {
            let notifier = notifier.clone();
            let email_to = email_to.clone();
            let subject = subject.clone();
            async move {
                if email_to.trim().is_empty() {
                    return Err(TaskError::new("jobs.stock-summary.email_to is not set")
                        .with_code("STOCK-003"));
                }
                let notification = Notification::new(email_to, subject, inputs.kwarg_str("msg")?);
                notifier.send(&notification).await?;
                Ok(Value::Null)
            }
        })
        .kwarg("msg", message),
    );

    Ok(flow.build()?)
}

pub fn load_holdings(rows: &[Row]) -> Result<Vec<Holding>, TaskError> {
    rows.iter()
        .enumerate()
        .map(|(index, row)| {
            let stock = row.get("stock").map(|s| s.trim()).unwrap_or_default();
            let initial = row.get("initial_value").map(|s| s.trim()).unwrap_or_default();
            if stock.is_empty() {
                return Err(TaskError::new(format!("row {} has no stock", index + 1))
                    .with_code("STOCK-004"));
            }
            let initial_value = initial.parse::<f64>().map_err(|_| {
                TaskError::new(format!("initial_value '{}' is not a number", initial))
                    .with_code("STOCK-004")
                    .with_context("stock", stock)
            })?;
            Ok(Holding {
                stock: stock.to_string(),
                initial_value,
                closing_price: None,
                gain_loss: None,
                direction: None,
            })
        })
        .collect()
}

/// Merge single-ticker price maps; the first price seen for a ticker wins.
pub fn merge_prices(entries: Vec<IndexMap<String, f64>>) -> IndexMap<String, f64> {
    let mut merged = IndexMap::new();
    for entry in entries {
        for (ticker, price) in entry {
            merged.entry(ticker).or_insert(price);
        }
    }
    merged
}

pub fn add_prices(
    holdings: Vec<Holding>,
    prices: &IndexMap<String, f64>,
) -> Result<Vec<Holding>, TaskError> {
    holdings
        .into_iter()
        .map(|mut holding| {
            let price = prices.get(&holding.stock).copied().ok_or_else(|| {
                TaskError::new(format!("no price fetched for {}", holding.stock))
                    .with_code("STOCK-005")
            })?;
            holding.closing_price = Some(price);
            Ok(holding)
        })
        .collect()
}

pub fn compute_changes(holdings: Vec<Holding>) -> Vec<Holding> {
    holdings
        .into_iter()
        .map(|mut holding| {
            let closing = holding.closing_price.unwrap_or(holding.initial_value);
            let gain_loss = ((closing - holding.initial_value) * 100.0).round() / 100.0;
            holding.gain_loss = Some(gain_loss);
            holding.direction = Some(if gain_loss >= 0.0 {
                Direction::Up
            } else {
                Direction::Down
            });
            holding
        })
        .collect()
}

pub fn create_message(holdings: &[Holding]) -> String {
    let mut html = String::from(
        "Hi,\n<br>\nHere is your stock holding update for the week:\n<br>\n<table>\n\
         <thead><tr><th>Stock</th><th>Bought At</th><th>Current Price</th><th>Difference</th></tr></thead>\n\
         <tbody>\n",
    );
    for holding in holdings {
        let difference = holding.gain_loss.unwrap_or_default();
        let color = if difference < 0.0 { "red" } else { "green" };
        html.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td style=\"color: {}\">{}</td></tr>\n",
            escape_html(&holding.stock),
            money(holding.initial_value),
            holding.closing_price.map(money).unwrap_or_default(),
            color,
            money(difference),
        ));
    }
    html.push_str("</tbody>\n</table>\n");
    html
}

fn money(value: f64) -> String {
    if value < 0.0 {
        format!("-${:.2}", -value)
    } else {
        format!("${:.2}", value)
    }
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
