use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{Map, Value};

use crate::transport::TransportAdapter;

type Params = Map<String, Value>;

/// Caller-supplied base for websocket connection params.
pub enum ParamsSource {
    Ready(Params),
    Pending(BoxFuture<'static, Params>),
    Producer(Box<dyn FnOnce() -> BoxFuture<'static, Params> + Send>),
}

impl ParamsSource {
    pub fn empty() -> Self {
        ParamsSource::Ready(Map::new())
    }

    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = Params> + Send + 'static,
    {
        ParamsSource::Pending(future.boxed())
    }

    pub fn producer<P, F>(produce: P) -> Self
    where
        P: FnOnce() -> F + Send + 'static,
        F: Future<Output = Params> + Send + 'static,
    {
        ParamsSource::Producer(Box::new(move || produce().boxed()))
    }

    /// Invoke the producer if there is one, then await the result.
    pub async fn resolve(self) -> Params {
        match self {
            ParamsSource::Ready(params) => params,
            ParamsSource::Pending(future) => future.await,
            ParamsSource::Producer(produce) => produce().await,
        }
    }
}

impl Default for ParamsSource {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Params> for ParamsSource {
    fn from(params: Params) -> Self {
        ParamsSource::Ready(params)
    }
}

impl std::fmt::Debug for ParamsSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamsSource::Ready(params) => f.debug_tuple("Ready").field(params).finish(),
            ParamsSource::Pending(_) => f.write_str("Pending(..)"),
            ParamsSource::Producer(_) => f.write_str("Producer(..)"),
        }
    }
}

impl TransportAdapter {
    /// Build websocket connection params: the resolved source plus
    /// `authorization` set to the held token, or `null` when anonymous.
    /// The token is read after the source resolves.
    pub async fn connection_params(&self, source: ParamsSource) -> Params {
        let mut params = source.resolve().await;
        let authorization = self
            .holder()
            .current_token()
            .map_or(Value::Null, Value::String);
        params.insert("authorization".to_string(), authorization);
        params
    }
}
