//! HTTP transport to the gridsync service.

use async_trait::async_trait;
use gridsync_core::mutation::{UpdateCellsRequest, UpdateCellsResponse};
use gridsync_core::page::{Direction, Page};

use crate::error::ClientError;

/// Requests a [`TableSession`](crate::TableSession) sends to the server.
#[async_trait]
pub trait MutationTransport: Send + Sync {
    /// `PATCH /api/table/update-cells`.
    async fn update_cells(&self, request: &UpdateCellsRequest) -> Result<UpdateCellsResponse, ClientError>;

    /// `GET /api/table`: one page walking `direction` from `cursor`.
    async fn fetch_page(&self, cursor: Option<&str>, direction: Direction) -> Result<Page, ClientError>;
}

/// [`MutationTransport`] over [`reqwest`].
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// * `base_url` - Server origin, e.g. `http://localhost:3000`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Reuse an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    // ---- private helpers ----

    /// Return the response unchanged on a 2xx status, or
    /// [`ClientError::Api`] with the status and body text.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ClientError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl MutationTransport for HttpTransport {
    async fn update_cells(&self, request: &UpdateCellsRequest) -> Result<UpdateCellsResponse, ClientError> {
        let response = self
            .client
            .patch(format!("{}/api/table/update-cells", self.base_url))
            .json(request)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    async fn fetch_page(&self, cursor: Option<&str>, direction: Direction) -> Result<Page, ClientError> {
        let direction = match direction {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
        };
        let mut query = vec![("direction", direction)];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor));
        }

        let response = self
            .client
            .get(format!("{}/api/table", self.base_url))
            .query(&query)
            .send()
            .await?;

        Self::parse_response(response).await
    }
}
