//! HTTP client for the VM cluster API.
//!
//! One method per remote operation, each checking the status the cluster
//! uses for that call (201 for VM create, 200 everywhere else). Every call
//! except `login` carries the bearer token. Image commit and save go
//! through a client with a bounded total timeout since those calls
//! regularly run for minutes.

use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::KilnError;

mod types;
pub use types::*;

/// Commit and save rewrite whole disk images on the cluster side.
const IMAGE_OP_TIMEOUT: Duration = Duration::from_secs(300);

pub struct Client {
    endpoint: String,
    http: reqwest::Client,
    image_http: reqwest::Client,
}

impl Client {
    pub fn new(endpoint: &str) -> Result<Self, KilnError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|source| KilnError::HttpClient { source })?;
        let image_http = reqwest::Client::builder()
            .timeout(IMAGE_OP_TIMEOUT)
            .build()
            .map_err(|source| KilnError::HttpClient { source })?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            http,
            image_http,
        })
    }

    // ── Operations ────────────────────────────────────────

    /// POST /token. The only unauthenticated call; returns the bearer
    /// token for everything that follows.
    pub async fn login(&self, user: &str, password: &str) -> Result<String, KilnError> {
        const OP: &str = "logging in";
        let response = self
            .send(
                &self.http,
                Method::POST,
                "/token",
                None,
                &TokenRequest { user, password },
                OP,
            )
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(KilnError::response(OP, status));
        }
        let body = text(response, OP).await?;
        let parsed: TokenResponse = parse_json("login response", &body)?;
        if parsed.token.is_empty() {
            return Err(KilnError::Parse {
                what: "login response".into(),
                message: "token missing or empty".into(),
            });
        }
        Ok(parsed.token)
    }

    /// POST /resources/image/copy. Duplicates `source` under the name
    /// `destination` so the builder VM can mutate the copy.
    pub async fn copy_image(
        &self,
        token: &str,
        source: &str,
        destination: &str,
    ) -> Result<(), KilnError> {
        const OP: &str = "copying the source image";
        let response = self
            .send(
                &self.http,
                Method::POST,
                "/resources/image/copy",
                Some(token),
                &ImageCopyRequest {
                    source_image: source,
                    dest_image: destination,
                },
                OP,
            )
            .await?;
        expect_status(OP, response.status(), StatusCode::OK)
    }

    /// POST /resources/vm/create. Registers the builder VM configuration.
    pub async fn create_vm(
        &self,
        token: &str,
        vm_name: &str,
        image: &str,
        cpu_cores: u32,
    ) -> Result<(), KilnError> {
        const OP: &str = "creating the builder VM configuration";
        // The cluster expects the VM name again in the baseImage slot.
        let request = VmCreateRequest {
            name: vm_name,
            image,
            base_image: vm_name,
            cpu_core: cpu_cores,
            vcpu_count: cpu_cores,
        };
        let response = self
            .send(
                &self.http,
                Method::POST,
                "/resources/vm/create",
                Some(token),
                &request,
                OP,
            )
            .await?;
        expect_status(OP, response.status(), StatusCode::CREATED)
    }

    /// POST /resources/vm/deploy. Boots the builder VM and returns its
    /// id and SSH coordinates.
    pub async fn deploy_vm(&self, token: &str, vm_name: &str) -> Result<VmDeployResponse, KilnError> {
        const OP: &str = "deploying the builder VM";
        let response = self
            .send(
                &self.http,
                Method::POST,
                "/resources/vm/deploy",
                Some(token),
                &VmDeployRequest { name: vm_name },
                OP,
            )
            .await?;
        expect_status(OP, response.status(), StatusCode::OK)?;
        let body = text(response, OP).await?;
        parse_json("deploy response", &body)
    }

    /// POST /resources/image/commit. Writes the VM's disk state back onto
    /// its pre-copied boot image. Returns the cluster's message.
    pub async fn commit_image(&self, token: &str, vm_id: &str) -> Result<String, KilnError> {
        const OP: &str = "committing the image";
        let response = self
            .send(
                &self.image_http,
                Method::POST,
                "/resources/image/commit",
                Some(token),
                &ImageCommitRequest { vm_id },
                OP,
            )
            .await?;
        expect_status(OP, response.status(), StatusCode::OK)?;
        Ok(message_of(response).await)
    }

    /// POST /resources/image/save. Captures the VM's disk state as a new
    /// named image. Returns the cluster's message.
    pub async fn save_image(
        &self,
        token: &str,
        vm_id: &str,
        image_name: &str,
    ) -> Result<String, KilnError> {
        const OP: &str = "saving the image";
        let response = self
            .send(
                &self.image_http,
                Method::POST,
                "/resources/image/save",
                Some(token),
                &ImageSaveRequest { vm_id, image_name },
                OP,
            )
            .await?;
        expect_status(OP, response.status(), StatusCode::OK)?;
        Ok(message_of(response).await)
    }

    /// DELETE /resources/image/delete. Removes an image by name.
    pub async fn delete_image(&self, token: &str, image_name: &str) -> Result<(), KilnError> {
        const OP: &str = "deleting the image";
        let response = self
            .send(
                &self.http,
                Method::DELETE,
                "/resources/image/delete",
                Some(token),
                &ImageDeleteRequest { image_name },
                OP,
            )
            .await?;
        expect_status(OP, response.status(), StatusCode::OK)
    }

    /// DELETE /resources/vm/purge. Removes the VM and its configuration.
    pub async fn purge_vm(&self, token: &str, vm_name: &str) -> Result<(), KilnError> {
        const OP: &str = "purging the builder VM";
        let response = self
            .send(
                &self.http,
                Method::DELETE,
                "/resources/vm/purge",
                Some(token),
                &VmPurgeRequest { name: vm_name },
                OP,
            )
            .await?;
        expect_status(OP, response.status(), StatusCode::OK)
    }

    // ── Transport ─────────────────────────────────────────

    async fn send<B: Serialize>(
        &self,
        client: &reqwest::Client,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: &B,
        operation: &str,
    ) -> Result<reqwest::Response, KilnError> {
        let url = format!("{}{path}", self.endpoint);
        let mut request = client.request(method, &url).json(body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| KilnError::request(operation, e))?;
        tracing::debug!(operation, status = %response.status(), "VM API call");
        Ok(response)
    }
}

fn expect_status(operation: &str, got: StatusCode, want: StatusCode) -> Result<(), KilnError> {
    if got != want {
        return Err(KilnError::response(operation, got));
    }
    Ok(())
}

async fn text(response: reqwest::Response, operation: &str) -> Result<String, KilnError> {
    response
        .text()
        .await
        .map_err(|e| KilnError::request(operation, e))
}

/// Best-effort extraction of the `{message}` acknowledgement. The message
/// only feeds user-facing reporting, so a malformed body reads as empty.
async fn message_of(response: reqwest::Response) -> String {
    match response.text().await {
        Ok(body) => serde_json::from_str::<ApiMessage>(&body)
            .map(|m| m.message)
            .unwrap_or_default(),
        Err(_) => String::new(),
    }
}

fn parse_json<T: DeserializeOwned>(what: &str, body: &str) -> Result<T, KilnError> {
    serde_json::from_str(body).map_err(|e| KilnError::Parse {
        what: what.into(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_trailing_slash_is_trimmed() {
        let client = Client::new("http://10.221.188.20/").unwrap();
        assert_eq!(client.endpoint, "http://10.221.188.20");

        let client = Client::new("https://cluster.example.com").unwrap();
        assert_eq!(client.endpoint, "https://cluster.example.com");
    }

    #[test]
    fn expect_status_matches() {
        expect_status("testing", StatusCode::OK, StatusCode::OK).unwrap();
        let err = expect_status("testing", StatusCode::INTERNAL_SERVER_ERROR, StatusCode::OK)
            .unwrap_err();
        match err {
            KilnError::Response { status, .. } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR)
            }
            other => panic!("expected Response error, got {other:?}"),
        }
    }

    #[test]
    fn parse_json_reports_bad_bodies() {
        let err = parse_json::<TokenResponse>("login response", "not json").unwrap_err();
        match err {
            KilnError::Parse { what, .. } => assert_eq!(what, "login response"),
            other => panic!("expected Parse error, got {other:?}"),
        }
    }
}
