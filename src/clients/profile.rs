//! Client for the `profile` service.

use serde::{Deserialize, Serialize};

use crate::context::CallContext;
use crate::error::CallResult;
use crate::pipeline::{LogicalService, Method};

pub const SERVICE: &str = "profile";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetProfileRequest {
    pub user_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetProfileResponse {
    pub user_id: i64,
    pub name: String,
    pub company: String,
    pub title: String,
}

#[derive(Debug, Clone)]
pub struct ProfileClient {
    get_profile: Method<GetProfileRequest, GetProfileResponse>,
}

impl ProfileClient {
    pub fn new(service: &LogicalService) -> Self {
        Self {
            get_profile: service.method("GetProfile"),
        }
    }

    pub async fn get_profile(
        &self,
        ctx: &CallContext,
        request: &GetProfileRequest,
    ) -> CallResult<GetProfileResponse> {
        self.get_profile.call(ctx, request).await
    }
}
