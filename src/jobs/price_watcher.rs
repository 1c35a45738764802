//! Email when a product page shows a price different from the watched price point.

use super::JobDeps;
use crate::core::collab::Notification;
use crate::core::config::HomeflowConfig;
use crate::core::error::{FlowError, TaskError};
use crate::core::flow::{FlowBuilder, FlowGraph, ParameterKind, ParameterSpec, TaskSpec};
use scraper::{Html, Selector};
use serde_json::Value;

pub const NAME: &str = "price-watcher";

pub fn build(config: &HomeflowConfig, deps: &JobDeps) -> Result<FlowGraph, FlowError> {
    let mut flow = FlowBuilder::new(NAME);
    let email = flow.declare(ParameterSpec::required("email").with_kind(ParameterKind::String));
    let price_point =
        flow.declare(ParameterSpec::required("price_point").with_kind(ParameterKind::Number));
    let url = flow.declare(ParameterSpec::required("url").with_kind(ParameterKind::String));

    let http = deps.http.clone();
    let price = flow.add_task(
        TaskSpec::from_async("get_price", move |inputs, _ctx| {
            let http = http.clone();
            async move {
                let url = inputs.kwarg_str("url")?;
                let html = http.get(url).send().await?.error_for_status()?.text().await?;
                let price = extract_price(&html)
                    .map_err(|err| err.with_context("url", url.to_string()))?;
                tracing::info!(url, price, "price fetched");
                Ok(Value::from(price))
            }
        })
        .kwarg("url", url),
    );

    let different = flow.add_task(
        TaskSpec::from_fn("is_different", |inputs| {
            let price_point = inputs.kwarg_f64("price_point")?;
            let price = inputs.kwarg_f64("price")?;
            Ok(Value::Bool(price_point != price))
        })
        .kwarg("price_point", price_point)
        .kwarg("price", price.clone()),
    );

    let subject = config.jobs.price_watcher.subject.clone();
    let notifier = deps.notifier.clone();
    flow.case(&different, true, |flow| {
        let message = flow.add_task(
            TaskSpec::from_fn("create_message", |inputs| {
                Ok(Value::String(create_message(inputs.kwarg_f64("price")?)))
            })
            .kwarg("price", price),
        );
        flow.add_task(
            TaskSpec::from_async("send_email", move |inputs, _ctx| {
                let notifier = notifier.clone();
                let subject = subject.clone();
                async move {
                    let notification = Notification::new(
                        inputs.kwarg_str("email_to")?,
                        subject,
                        inputs.kwarg_str("msg")?,
                    );
                    notifier.send(&notification).await?;
                    Ok(Value::Null)
                }
            })
            .kwarg("msg", message)
            .kwarg("email_to", email),
        );
    });

    Ok(flow.build()?)
}

/// Read the price from the first `<span class="value" content="...">` tag.
pub fn extract_price(html: &str) -> Result<f64, TaskError> {
    let selector =
        Selector::parse("span.value").map_err(|err| TaskError::new(err.to_string()))?;
    let document = Html::parse_document(html);
    let span = document
        .select(&selector)
        .next()
        .ok_or_else(|| TaskError::new("no price tag found on page").with_code("PRICE-001"))?;

    let raw = span.value().attr("content").ok_or_else(|| {
        TaskError::new("price tag has no content attribute").with_code("PRICE-002")
    })?;
    raw.trim().parse::<f64>().map_err(|_| {
        TaskError::new(format!("price '{}' is not a number", raw)).with_code("PRICE-002")
    })
}

pub fn create_message(price: f64) -> String {
    format!("Hi,\n<br>\nYour item has a new price of : {}\n<br>\n", price)
}
