//! HTTP transport for the native engine.
//!
//! Each algorithm is a `POST {base_url}/workspaces/{ws}/graphs/{type}/algorithms/{name}`
//! with the [`BackendRequest`] as JSON body; the reply is a [`BackendResponse`].
//! Path segments are percent-encoded.

use reqwest::Url;
use std::time::Duration;
use tracing::{debug, warn};

use super::native::{BackendRequest, BackendResponse, NativeGraphBackend};
use crate::error::{GraphError, Result};
use crate::graph::GraphType;

pub struct HttpGraphBackend {
    client: reqwest::blocking::Client,
    base_url: Url,
}

impl HttpGraphBackend {
    pub fn new(base_url: impl AsRef<str>, timeout: Duration) -> Result<Self> {
        let raw = base_url.as_ref();
        let base_url = Url::parse(raw).map_err(|e| GraphError::Config(format!("native base_url {raw:?}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(GraphError::Config(format!("native base_url {raw:?} cannot take a path")));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GraphError::BackendUnavailable(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client, base_url })
    }

    pub fn endpoint(&self, workspace_id: &str, graph_type: GraphType, algorithm: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| GraphError::Config(format!("native base_url {} cannot take a path", self.base_url)))?
            .pop_if_empty()
            .extend([
                "workspaces",
                workspace_id,
                "graphs",
                graph_type.cache_key(),
                "algorithms",
                algorithm,
            ]);
        Ok(url)
    }
}

impl NativeGraphBackend for HttpGraphBackend {
    fn execute(
        &self,
        workspace_id: &str,
        graph_type: GraphType,
        request: &BackendRequest,
    ) -> Result<BackendResponse> {
        let url = self.endpoint(workspace_id, graph_type, request.algorithm_name())?;
        debug!(%url, "POST");

        let response = self
            .client
            .post(url.clone())
            .json(request)
            .send()
            .map_err(|e| GraphError::BackendUnavailable(format!("{url}: {e}")))?;

        let status = response.status();
        if status.is_server_error() {
            warn!(%url, %status, "native backend error");
            return Err(GraphError::BackendUnavailable(format!("{url} returned {status}")));
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(GraphError::InvalidBackendResponse(format!(
                "{url} returned {status}: {body}"
            )));
        }

        response
            .json::<BackendResponse>()
            .map_err(|e| GraphError::InvalidBackendResponse(format!("{url}: {e}")))
    }
}
