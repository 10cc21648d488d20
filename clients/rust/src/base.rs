use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum APIErrorVariant {
    /// The server could not be reached
    Network,
    /// The server answered with another status code than expected
    UnexpectedStatusCode,
    MalformedResponse,
}

#[derive(Debug)]
pub struct APIError {
    pub variant: APIErrorVariant,
    pub status: Option<StatusCode>,
    pub message: String,
}

impl Display for APIError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "{:?} ({}): {}", self.variant, status, self.message),
            None => write!(f, "{:?}: {}", self.variant, self.message),
        }
    }
}

impl std::error::Error for APIError {}

pub type APIResponse<T> = Result<T, APIError>;

pub(crate) struct BaseClient {
    client: Client,
    address: String,
}

impl BaseClient {
    pub fn new(address: String) -> Self {
        Self {
            client: Client::new(),
            address: address.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.address, path)
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        expected_status_code: StatusCode,
    ) -> APIResponse<T> {
        let res = request.send().await.map_err(|e| APIError {
            variant: APIErrorVariant::Network,
            status: None,
            message: e.to_string(),
        })?;

        let status = res.status();
        if status != expected_status_code {
            let message = res.text().await.unwrap_or_default();
            return Err(APIError {
                variant: APIErrorVariant::UnexpectedStatusCode,
                status: Some(status),
                message,
            });
        }

        res.json::<T>().await.map_err(|e| APIError {
            variant: APIErrorVariant::MalformedResponse,
            status: Some(status),
            message: e.to_string(),
        })
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: String,
        expected_status_code: StatusCode,
    ) -> APIResponse<T> {
        let request = self.client.get(self.url(&path));
        self.handle_response(request, expected_status_code).await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: String,
        expected_status_code: StatusCode,
    ) -> APIResponse<T> {
        let request = self.client.delete(self.url(&path));
        self.handle_response(request, expected_status_code).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        body: B,
        path: String,
        expected_status_code: StatusCode,
    ) -> APIResponse<T> {
        let request = self.client.post(self.url(&path)).json(&body);
        self.handle_response(request, expected_status_code).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize>(
        &self,
        body: B,
        path: String,
        expected_status_code: StatusCode,
    ) -> APIResponse<T> {
        let request = self.client.put(self.url(&path)).json(&body);
        self.handle_response(request, expected_status_code).await
    }
}
