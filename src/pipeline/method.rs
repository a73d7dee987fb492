//! Per-method call handles.
//!
//! [`CallPipeline`] is the untyped `call(ctx, request) -> response` surface
//! for one remote method; [`Method`] adds JSON encoding of typed request and
//! response values on top of it.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::context::CallContext;
use crate::error::CallResult;
use crate::pipeline::service::LogicalService;
use crate::transport::Payload;

#[derive(Clone)]
pub struct CallPipeline {
    service: LogicalService,
    method: Arc<str>,
}

impl CallPipeline {
    pub(crate) fn new(service: LogicalService, method: &str) -> Self {
        Self {
            service,
            method: Arc::from(method),
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn service(&self) -> &LogicalService {
        &self.service
    }

    pub async fn call(&self, ctx: &CallContext, request: Payload) -> CallResult<Payload> {
        self.service.call(ctx, &self.method, request).await
    }
}

impl fmt::Debug for CallPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallPipeline")
            .field("service", &self.service.name())
            .field("method", &self.method)
            .finish()
    }
}

/// Typed handle to one remote method.
pub struct Method<Req, Resp> {
    pipeline: CallPipeline,
    _types: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp> Method<Req, Resp> {
    pub(crate) fn new(pipeline: CallPipeline) -> Self {
        Self {
            pipeline,
            _types: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        self.pipeline.method()
    }
}

impl<Req, Resp> Method<Req, Resp>
where
    Req: Serialize,
    Resp: DeserializeOwned,
{
    /// Encode `request`, run it through the pipeline and decode the reply.
    /// Codec failures are reported as remote-call failures, never retried,
    /// and seen by the service's observers like any other failed call.
    pub async fn call(&self, ctx: &CallContext, request: &Req) -> CallResult<Resp> {
        self.pipeline
            .service()
            .call_with(
                ctx,
                self.pipeline.method(),
                || Ok(serde_json::to_value(request)?),
                |response| Ok(serde_json::from_value(response)?),
            )
            .await
    }
}

impl<Req, Resp> Clone for Method<Req, Resp> {
    fn clone(&self) -> Self {
        Self::new(self.pipeline.clone())
    }
}

impl<Req, Resp> fmt::Debug for Method<Req, Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Method").field(&self.pipeline).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use crate::error::{CallError, ErrorKind};
    use crate::observability::observer::testing::RecordingObserver;
    use crate::transport::testing::ScriptedDialer;
    use serde::Deserialize;

    #[derive(Debug, Serialize)]
    struct Ping {
        n: u32,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Pong {
        n: u32,
    }

    #[derive(Debug, Deserialize)]
    struct Mismatch {
        #[allow(dead_code)]
        missing: String,
    }

    struct Unencodable;

    impl Serialize for Unencodable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("unencodable"))
        }
    }

    async fn service() -> LogicalService {
        recorded_service(Arc::new(ScriptedDialer::new()), Arc::default()).await
    }

    async fn recorded_service(
        dialer: Arc<ScriptedDialer>,
        recorder: Arc<RecordingObserver>,
    ) -> LogicalService {
        let mut config = ServiceConfig::new("feed");
        config.instances = vec!["10.0.0.1:80".into()];
        let service = LogicalService::builder(config)
            .dialer(dialer)
            .without_observers()
            .observer(recorder)
            .build();
        service.wait_for(|s| !s.is_empty()).await;
        service
    }

    #[tokio::test]
    async fn test_typed_round_trip() {
        let service = service().await;
        let ping: Method<Ping, Pong> = service.method("Ping");
        assert_eq!(ping.name(), "Ping");

        let pong = ping.call(&CallContext::background(), &Ping { n: 4 }).await.unwrap();
        assert_eq!(pong, Pong { n: 4 });
    }

    #[tokio::test]
    async fn test_decode_failure_is_codec_error() {
        let service = service().await;
        let method: Method<Ping, Mismatch> = service.method("Ping");

        let err = method
            .call(&CallContext::background(), &Ping { n: 1 })
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::Codec(_)));
        assert_eq!(err.kind(), ErrorKind::RemoteCallFailed);
    }

    #[tokio::test]
    async fn test_decode_failure_is_observed_as_failed_call() {
        let recorder = Arc::new(RecordingObserver::default());
        let service = recorded_service(Arc::new(ScriptedDialer::new()), recorder.clone()).await;
        let method: Method<Ping, Mismatch> = service.method("Ping");

        let err = method
            .call(&CallContext::background(), &Ping { n: 1 })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteCallFailed);

        let calls = recorder.calls.lock().unwrap().clone();
        assert_eq!(calls, vec![("Ping".to_string(), "remote_call_failed", 1)]);
    }

    #[tokio::test]
    async fn test_encode_failure_is_observed_and_never_sent() {
        let recorder = Arc::new(RecordingObserver::default());
        let dialer = Arc::new(ScriptedDialer::new());
        let service = recorded_service(dialer.clone(), recorder.clone()).await;
        let method: Method<Unencodable, Pong> = service.method("Ping");

        let err = method
            .call(&CallContext::background(), &Unencodable)
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::Codec(_)));
        assert!(dialer.invoked().is_empty());

        let calls = recorder.calls.lock().unwrap().clone();
        assert_eq!(calls, vec![("Ping".to_string(), "remote_call_failed", 0)]);
        assert_eq!(service.breaker_stats().unwrap().total_failures, 0);
    }
}
