//! Client for the `topic` service.

use serde::{Deserialize, Serialize};

use crate::context::CallContext;
use crate::error::CallResult;
use crate::pipeline::{LogicalService, Method};

pub const SERVICE: &str = "topic";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetTopicRequest {
    pub topic_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetTopicResponse {
    pub topic_id: i64,
    pub subject: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct TopicClient {
    get_topic: Method<GetTopicRequest, GetTopicResponse>,
}

impl TopicClient {
    pub fn new(service: &LogicalService) -> Self {
        Self {
            get_topic: service.method("GetTopic"),
        }
    }

    pub async fn get_topic(
        &self,
        ctx: &CallContext,
        request: &GetTopicRequest,
    ) -> CallResult<GetTopicResponse> {
        self.get_topic.call(ctx, request).await
    }
}
