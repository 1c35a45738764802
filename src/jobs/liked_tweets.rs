//! Rebuild the search index of liked tweets.

use super::search::SearchIndex;
use super::twitter::{LikedTweet, TwitterClient, BEARER_TOKEN, USER_ID};
use super::JobDeps;
use crate::core::config::HomeflowConfig;
use crate::core::error::{FlowError, TaskError};
use crate::core::flow::{FlowBuilder, FlowGraph, ParameterKind, ParameterSpec, TaskSpec};
use serde::Serialize;
use serde_json::{json, Value};

pub const NAME: &str = "liked-tweets";
pub const DEFAULT_INDEX: &str = "tweet-index";

/// Document stored per liked tweet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TweetDocument {
    pub tweet: String,
    pub user: String,
    pub tweet_url: String,
    pub doc_type: String,
}

impl From<LikedTweet> for TweetDocument {
    fn from(tweet: LikedTweet) -> Self {
        TweetDocument {
            tweet_url: format!("https://twitter.com/twitter/statuses/{}", tweet.id),
            tweet: tweet.text,
            user: tweet.user,
            doc_type: "favourite".to_string(),
        }
    }
}

pub fn build(config: &HomeflowConfig, deps: &JobDeps) -> Result<FlowGraph, FlowError> {
    let settings = &config.jobs.liked_tweets;
    let twitter = TwitterClient::new(deps.http.clone(), &settings.twitter_api_url)?;
    let search = SearchIndex::new(deps.http.clone(), &settings.search_url)?;

    let mut flow = FlowBuilder::new(NAME);
    let index = flow.declare(
        ParameterSpec::optional("index", DEFAULT_INDEX).with_kind(ParameterKind::String),
    );

    let credentials = flow.add_task(TaskSpec::from_async(
        "check_credentials",
        |_inputs, ctx| async move {
            ctx.require_secret(BEARER_TOKEN)?;
            let user_id = ctx.require_secret(USER_ID)?;
            Ok(json!({ "user_id": user_id }))
        },
    ));

    let tweets = flow.add_task(
        TaskSpec::from_async("fetch_likes", move |inputs, ctx| {
            let twitter = twitter.clone();
            async move {
                let credentials: Value = inputs.arg_as(0)?;
                let user_id = credentials["user_id"]
                    .as_str()
                    .ok_or_else(|| {
                        TaskError::new("credentials carry no user id").with_code("TWITTER-002")
                    })?
                    .to_string();
                let token = ctx.require_secret(BEARER_TOKEN)?;
                let tweets = twitter.liked_tweets(&token, &user_id).await?;
                tracing::info!(count = tweets.len(), "liked tweets fetched");
                Ok(serde_json::to_value(tweets)?)
            }
        })
        .arg(credentials),
    );

    let pinger = search.clone();
    let connection = flow.add_task(TaskSpec::from_async(
        "connect_search",
        move |_inputs, _ctx| {
            let search = pinger.clone();
            async move { search.ping().await }
        },
    ));

    let dropper = search.clone();
    let deleted = flow.add_task(
        TaskSpec::from_async("delete_index", move |inputs, _ctx| {
            let search = dropper.clone();
            async move {
                let index: String = inputs.arg_as(0)?;
                let existed = search.delete_index(&index).await?;
                Ok(Value::Bool(existed))
            }
        })
        .arg(index.clone()),
    );

    let uploaded = flow.add_task(
        TaskSpec::from_async("upload_tweets", move |inputs, _ctx| {
            let search = search.clone();
            async move {
                let tweets: Vec<LikedTweet> = inputs.kwarg_as("tweets")?;
                let index = inputs.kwarg_str("index")?;
                let count = tweets.len();
                for tweet in tweets {
                    search
                        .index_document(index, &TweetDocument::from(tweet))
                        .await?;
                }
                tracing::info!(index, count, "tweets indexed");
                Ok(Value::from(count))
            }
        })
        .kwarg("tweets", tweets)
        .kwarg("index", index),
    );

    flow.add_edge(&connection, &deleted);
    flow.add_edge(&deleted, &uploaded);

    Ok(flow.build()?)
}
