//! reqwest implementation of [`Backend`].

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{AiChatRequest, Backend, CreateChatRequest, CreateChatResponse, CreateUserRequest, CreateUserResponse};
use crate::error::ChatError;

pub struct HttpBackend {
    http: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    /// Build a client for the backend at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, ChatError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self { http: builder.build()?, base_url: base_url.trim_end_matches('/').to_owned() })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json<T: DeserializeOwned>(&self, path: &str, body: &impl Serialize) -> Result<T, ChatError> {
        let response = self.http.post(self.url(path)).json(body).send().await?;
        let response = ChatError::check_status("backend", response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait::async_trait]
impl Backend for HttpBackend {
    async fn health(&self) -> Result<String, ChatError> {
        let response = self.http.get(self.url("/")).send().await?;
        let response = ChatError::check_status("backend", response).await?;
        let body = response.json::<Value>().await?;
        body.get("message")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned)
            .ok_or(ChatError::MissingField("message"))
    }

    async fn create_user(&self, request: &CreateUserRequest) -> Result<CreateUserResponse, ChatError> {
        self.post_json("/create_user", request).await
    }

    async fn create_chat(&self, request: &CreateChatRequest) -> Result<CreateChatResponse, ChatError> {
        self.post_json("/create_chat", request).await
    }

    async fn start_ai_chat(&self, request: &AiChatRequest) -> Result<(), ChatError> {
        let response = self.http.post(self.url("/ai_chat")).json(request).send().await?;
        ChatError::check_status("backend", response).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "http_test.rs"]
mod tests;
