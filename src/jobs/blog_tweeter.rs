//! Tweet the newest row of the blog table.

use super::table::{read_table, Row};
use super::twitter::{TwitterClient, BEARER_TOKEN};
use super::JobDeps;
use crate::core::config::HomeflowConfig;
use crate::core::error::{FlowError, TaskError};
use crate::core::flow::{FlowBuilder, FlowGraph, TaskSpec};
use serde_json::Value;

pub const NAME: &str = "blog-tweeter";

pub fn build(config: &HomeflowConfig, deps: &JobDeps) -> Result<FlowGraph, FlowError> {
    let settings = &config.jobs.blog_tweeter;
    let mut flow = FlowBuilder::new(NAME);

    let csv_path = settings.csv_path.clone();
    let post = flow.add_task(TaskSpec::from_fn("load_latest_post", move |_| {
        let rows = read_table(&csv_path)?;
        let latest = rows.into_iter().last().ok_or_else(|| {
            TaskError::new("blog table has no rows")
                .with_code("BLOG-001")
                .with_context("path", csv_path.display().to_string())
        })?;
        Ok(serde_json::to_value(latest)?)
    }));

    let tweet = flow.add_task(
        TaskSpec::from_fn("compose_tweet", |inputs| {
            let post: Row = inputs.arg_as(0)?;
            Ok(Value::String(compose_tweet(&post)?))
        })
        .arg(post),
    );

    let http = deps.http.clone();
    let api_url = settings.twitter_api_url.clone();
    flow.add_task(
        TaskSpec::from_async("send_tweet", move |inputs, ctx| {
            let http = http.clone();
            let api_url = api_url.clone();
            async move {
                let token = ctx.require_secret(BEARER_TOKEN)?;
                let client = TwitterClient::new(http, &api_url)?;
                let id = client.post_tweet(&token, inputs.kwarg_str("text")?).await?;
                Ok(Value::String(id))
            }
        })
        .kwarg("text", tweet),
    );

    Ok(flow.build()?)
}

/// Render the announcement for a `Title, MediumLink, BlogLink, Hashtags, Ats` row.
/// An empty `Ats` column selects the template without mentions.
pub fn compose_tweet(post: &Row) -> Result<String, TaskError> {
    let field = |name: &str| {
        post.get(name).map(|value| value.trim()).ok_or_else(|| {
            TaskError::new(format!("blog row has no '{}' column", name)).with_code("BLOG-002")
        })
    };
    let title = field("Title")?;
    let medium = field("MediumLink")?;
    let blog = field("BlogLink")?;
    let hashtags = field("Hashtags")?;
    let ats = post
        .get("Ats")
        .map(|ats| ats.trim().trim_matches('"').trim())
        .unwrap_or_default();

    let mut tweet = format!(
        "Check out my latest blog: \"{}\"!\n\nMedium: {}\nMy blog: {}\n\n",
        title, medium, blog
    );
    if !ats.is_empty() {
        tweet.push_str(ats);
        tweet.push_str("\n\n");
    }
    tweet.push_str(hashtags);
    tweet.push('\n');
    Ok(tweet)
}
