//! Client for the `feed` service.

use serde::{Deserialize, Serialize};

use crate::context::CallContext;
use crate::error::CallResult;
use crate::pipeline::{LogicalService, Method};

pub const SERVICE: &str = "feed";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedRecord {
    pub id: i64,
    pub user_id: i64,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetFeedsRequest {
    pub user_id: i64,
    /// Maximum number of records to return.
    pub size: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GetFeedsResponse {
    #[serde(default)]
    pub feeds: Vec<FeedRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OkResponse {}

#[derive(Debug, Clone)]
pub struct FeedClient {
    get_feeds: Method<GetFeedsRequest, GetFeedsResponse>,
    create_feed: Method<FeedRecord, OkResponse>,
}

impl FeedClient {
    pub fn new(service: &LogicalService) -> Self {
        Self {
            get_feeds: service.method("GetFeeds"),
            create_feed: service.method("CreateFeed"),
        }
    }

    pub async fn get_feeds(
        &self,
        ctx: &CallContext,
        request: &GetFeedsRequest,
    ) -> CallResult<GetFeedsResponse> {
        self.get_feeds.call(ctx, request).await
    }

    pub async fn create_feed(
        &self,
        ctx: &CallContext,
        record: &FeedRecord,
    ) -> CallResult<OkResponse> {
        self.create_feed.call(ctx, record).await
    }
}
