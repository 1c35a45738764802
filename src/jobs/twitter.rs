//! Twitter v2 HTTP API, bearer-token authenticated.

use crate::core::error::TaskError;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const BEARER_TOKEN: &str = "TWITTER_BEARER_TOKEN";
pub const USER_ID: &str = "TWITTER_USER_ID";

const PAGE_SIZE: &str = "100";
/// Pages followed before `liked_tweets` gives up.
pub const MAX_PAGES: usize = 50;

/// A liked tweet, flattened to what the search index stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikedTweet {
    pub id: String,
    pub text: String,
    pub user: String,
}

#[derive(Clone)]
pub struct TwitterClient {
    http: reqwest::Client,
    base_url: Url,
    max_pages: usize,
}

#[derive(Deserialize)]
struct PostResponse {
    data: PostedTweet,
}

#[derive(Deserialize)]
struct PostedTweet {
    id: String,
}

#[derive(Deserialize)]
struct LikesPage {
    #[serde(default)]
    data: Vec<RawTweet>,
    #[serde(default)]
    includes: Includes,
    #[serde(default)]
    meta: Meta,
}

#[derive(Deserialize)]
struct RawTweet {
    id: String,
    text: String,
    #[serde(default)]
    author_id: Option<String>,
}

#[derive(Deserialize, Default)]
struct Includes {
    #[serde(default)]
    users: Vec<RawUser>,
}

#[derive(Deserialize)]
struct RawUser {
    id: String,
    name: String,
}

#[derive(Deserialize, Default)]
struct Meta {
    next_token: Option<String>,
}

impl TwitterClient {
    pub fn new(http: reqwest::Client, base_url: &str) -> Result<Self, TaskError> {
        let base_url = Url::parse(base_url).map_err(|err| {
            TaskError::new(format!("invalid twitter api url '{}': {}", base_url, err))
                .with_code("TWITTER-001")
        })?;
        Ok(Self {
            http,
            base_url,
            max_pages: MAX_PAGES,
        })
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url, TaskError> {
        self.base_url.join(path).map_err(|err| {
            TaskError::new(format!("invalid twitter endpoint {}: {}", path, err))
                .with_code("TWITTER-001")
        })
    }

    /// Post a status update and return the new tweet id.
    pub async fn post_tweet(&self, token: &str, text: &str) -> Result<String, TaskError> {
        let response = self
            .http
            .post(self.endpoint("/2/tweets")?)
            .bearer_auth(token)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await?
            .error_for_status()?;
        let body: PostResponse = response.json().await?;
        tracing::info!(tweet_id = %body.data.id, "tweet posted");
        Ok(body.data.id)
    }

    /// Every tweet liked by `user_id`, following pagination.
    ///
    /// Fails with TWITTER-003 rather than return a partial list when more
    /// pages remain after `max_pages`.
    pub async fn liked_tweets(
        &self,
        token: &str,
        user_id: &str,
    ) -> Result<Vec<LikedTweet>, TaskError> {
        let url = self.endpoint(&format!("/2/users/{}/liked_tweets", user_id))?;
        let mut tweets = Vec::new();
        let mut next_token: Option<String> = None;

        for _ in 0..self.max_pages {
            let mut request = self.http.get(url.clone()).bearer_auth(token).query(&[
                ("max_results", PAGE_SIZE),
                ("expansions", "author_id"),
                ("user.fields", "name"),
            ]);
            if let Some(token) = &next_token {
                request = request.query(&[("pagination_token", token.as_str())]);
            }
            let page: LikesPage = request.send().await?.error_for_status()?.json().await?;

            let users: HashMap<String, String> = page
                .includes
                .users
                .into_iter()
                .map(|user| (user.id, user.name))
                .collect();
            tweets.extend(page.data.into_iter().map(|tweet| LikedTweet {
                user: tweet
                    .author_id
                    .and_then(|author| users.get(&author).cloned())
                    .unwrap_or_default(),
                id: tweet.id,
                text: tweet.text,
            }));

            match page.meta.next_token {
                Some(token) => next_token = Some(token),
                None => {
                    tracing::debug!(count = tweets.len(), "liked tweets fetched");
                    return Ok(tweets);
                }
            }
        }
        tracing::warn!(
            pages = self.max_pages,
            count = tweets.len(),
            "liked tweets still paginating at page limit"
        );
        Err(TaskError::new(format!(
            "liked tweets exceed {} pages; refusing to return a partial list",
            self.max_pages
        ))
        .with_code("TWITTER-003")
        .with_context("fetched", tweets.len().to_string()))
    }
}
