//! Demo instance serving the feed, profile and topic services from memory.
//!
//! ```text
//! cargo run --example mock_instance -- --addr 127.0.0.1:7001
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use clap::Parser;
use rpc_gateway::clients::feed::{FeedRecord, GetFeedsRequest, GetFeedsResponse, OkResponse};
use rpc_gateway::clients::profile::{GetProfileRequest, GetProfileResponse};
use rpc_gateway::clients::topic::{GetTopicRequest, GetTopicResponse};
use rpc_gateway::transport::{Payload, RpcServer, RpcStatus};
use rpc_gateway::Shutdown;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::TcpListener;

#[derive(Parser)]
struct Args {
    #[arg(long, default_value = "127.0.0.1:7001")]
    addr: String,
}

#[derive(Default)]
struct Store {
    feeds: HashMap<i64, BTreeMap<i64, FeedRecord>>,
    profiles: HashMap<i64, GetProfileResponse>,
    topics: HashMap<i64, GetTopicResponse>,
}

type Shared = Arc<Mutex<Store>>;

fn decode<T: DeserializeOwned>(payload: Payload) -> Result<T, RpcStatus> {
    serde_json::from_value(payload).map_err(|e| RpcStatus::invalid_argument(e.to_string()))
}

fn encode<T: Serialize>(value: &T) -> Result<Payload, RpcStatus> {
    serde_json::to_value(value).map_err(|e| RpcStatus::internal(e.to_string()))
}

fn seed(store: &mut Store) {
    store.profiles.insert(
        1,
        GetProfileResponse {
            user_id: 1,
            name: "Ada".into(),
            company: "Analytical Engines".into(),
            title: "Engineer".into(),
        },
    );
    store.topics.insert(
        1,
        GetTopicResponse {
            topic_id: 1,
            subject: "Welcome".into(),
            content: "First topic".into(),
        },
    );
}

fn server(store: Shared) -> RpcServer {
    let feeds = store.clone();
    let create = store.clone();
    let profiles = store.clone();
    let topics = store;

    RpcServer::new()
        .method("feed", "GetFeeds", move |payload| {
            let store = feeds.clone();
            async move {
                let req: GetFeedsRequest = decode(payload)?;
                let store = store.lock().map_err(|_| RpcStatus::internal("store poisoned"))?;
                let records = store
                    .feeds
                    .get(&req.user_id)
                    .ok_or_else(|| RpcStatus::not_found("user not found"))?;
                let feeds = records
                    .values()
                    .take(req.size.max(0) as usize)
                    .cloned()
                    .collect();
                encode(&GetFeedsResponse { feeds })
            }
        })
        .method("feed", "CreateFeed", move |payload| {
            let store = create.clone();
            async move {
                let record: FeedRecord = decode(payload)?;
                let mut store = store.lock().map_err(|_| RpcStatus::internal("store poisoned"))?;
                store
                    .feeds
                    .entry(record.user_id)
                    .or_default()
                    .insert(record.id, record);
                encode(&OkResponse {})
            }
        })
        .method("profile", "GetProfile", move |payload| {
            let store = profiles.clone();
            async move {
                let req: GetProfileRequest = decode(payload)?;
                let store = store.lock().map_err(|_| RpcStatus::internal("store poisoned"))?;
                let profile = store
                    .profiles
                    .get(&req.user_id)
                    .ok_or_else(|| RpcStatus::not_found("user not found"))?;
                encode(profile)
            }
        })
        .method("topic", "GetTopic", move |payload| {
            let store = topics.clone();
            async move {
                let req: GetTopicRequest = decode(payload)?;
                let store = store.lock().map_err(|_| RpcStatus::internal("store poisoned"))?;
                let topic = store
                    .topics
                    .get(&req.topic_id)
                    .ok_or_else(|| RpcStatus::not_found("topic not found"))?;
                encode(topic)
            }
        })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let mut store = Store::default();
    seed(&mut store);

    let listener = TcpListener::bind(&args.addr).await?;
    println!("Mock instance listening on http://{}", listener.local_addr()?);

    let shutdown = Shutdown::new();
    tokio::spawn(rpc_gateway::lifecycle::signals::shutdown_on_signal(shutdown.clone()));
    server(Arc::new(Mutex::new(store)))
        .serve(listener, shutdown.token())
        .await?;
    Ok(())
}
