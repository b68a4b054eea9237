use reqwest::{Client, Request, RequestBuilder, Response};

use crate::error::{HolderError, HolderResult};
use crate::holder::TokenHolder;
use crate::transport::TransportAdapter;

/// `reqwest` client that carries the held token on every request and feeds
/// token signals from every response, including error statuses, back into
/// the holder.
#[derive(Debug, Clone)]
pub struct AuthClient {
    client: Client,
    adapter: TransportAdapter,
}

impl AuthClient {
    pub fn new(holder: TokenHolder) -> Self {
        Self::with_client(Client::new(), TransportAdapter::new(holder))
    }

    pub fn with_client(client: Client, adapter: TransportAdapter) -> Self {
        Self { client, adapter }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn adapter(&self) -> &TransportAdapter {
        &self.adapter
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.client.get(url)
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.client.post(url)
    }

    pub async fn send(&self, builder: RequestBuilder) -> HolderResult<Response> {
        self.execute(builder.build()?).await
    }

    /// Send `request`. Non-success statuses come back as
    /// [`HolderError::Status`] after their token signals were applied.
    pub async fn execute(&self, mut request: Request) -> HolderResult<Response> {
        self.adapter.authorize_headers(request.headers_mut());

        let response = self.client.execute(request).await?;
        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let error = HolderError::Status {
                status,
                headers: response.headers().clone(),
            };
            return self.adapter.on_incoming_error(error);
        }

        self.adapter.observe(response.headers());
        Ok(response)
    }
}
