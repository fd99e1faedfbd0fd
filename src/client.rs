//! HTTP implementation of the exam server contract
//!
//! Every call carries the participant's bearer token. The server reports
//! refusals in the JSON body with `success: false` (often with a non-2xx
//! status), so bodies are decoded whatever the status; a body that is not
//! JSON counts as a transport failure.

use reqwest::{Method, RequestBuilder, Response};
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    api::{
        AckPayload, ApiError, ExamApi, FinishPayload, FinishRequest, FinishResponse,
        PersistAnswerRequest, ResultPayload, ResultResponse, SessionPayload, SessionResponse,
        StartPayload, StartResponse,
    },
    config::ClientConfig,
    constants::{client, endpoints},
};

/// Exam server reached over HTTP
#[derive(Debug, Clone)]
pub struct HttpExamApi {
    http: reqwest::Client,
    config: ClientConfig,
}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        ApiError::Transport {
            message: error.to_string(),
            reached_server: !(error.is_connect() || error.is_builder()),
        }
    }
}

impl HttpExamApi {
    /// Creates a client for the configured server
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Transport`] if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { http, config })
    }

    /// The configuration in use
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.config.endpoint(path))
            .bearer_auth(&self.config.token)
    }

    async fn call<P: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<P, ApiError> {
        let response = builder.send().await?;
        decode(response).await
    }

    async fn post<B: Serialize + ?Sized, P: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<P, ApiError> {
        self.call(self.request(Method::POST, path).json(body)).await
    }
}

async fn decode<P: DeserializeOwned>(response: Response) -> Result<P, ApiError> {
    let status = response.status();
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|error| {
        tracing::warn!(%status, %error, "undecodable response body");
        ApiError::Transport {
            message: format!("unreadable response ({status}): {error}"),
            reached_server: true,
        }
    })
}

impl ExamApi for HttpExamApi {
    async fn start_session(&self) -> Result<StartResponse, ApiError> {
        let payload: StartPayload = self.post(endpoints::START, &serde_json::json!({})).await?;
        payload.into_response()
    }

    async fn fetch_session(&self) -> Result<SessionResponse, ApiError> {
        let payload: SessionPayload = self
            .call(self.request(Method::GET, endpoints::QUESTIONS))
            .await?;
        payload.into_response()
    }

    async fn persist_answer(&self, request: &PersistAnswerRequest) -> Result<(), ApiError> {
        let payload: AckPayload = self.post(endpoints::SUBMIT_ANSWER, request).await?;
        payload.into_response()
    }

    async fn finish(&self, request: &FinishRequest) -> Result<FinishResponse, ApiError> {
        let payload: FinishPayload = self
            .call(
                self.request(Method::POST, endpoints::FINISH)
                    .header(client::IDEMPOTENCY_HEADER, request.idempotency_key.to_string())
                    .json(request),
            )
            .await?;
        payload.into_response()
    }

    async fn fetch_result(&self) -> Result<ResultResponse, ApiError> {
        let payload: ResultPayload = self
            .call(self.request(Method::GET, endpoints::RESULT))
            .await?;
        payload.into_response()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn api(base_url: &str) -> HttpExamApi {
        HttpExamApi::new(ClientConfig {
            base_url: base_url.to_owned(),
            token: "secret".to_owned(),
            ..ClientConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_requests_carry_bearer_token() {
        let request = api("http://localhost:3001/")
            .request(Method::GET, endpoints::QUESTIONS)
            .build()
            .unwrap();

        assert_eq!(
            request.url().as_str(),
            "http://localhost:3001/api/student/questions"
        );
        assert_eq!(
            request.headers()["authorization"].to_str().unwrap(),
            "Bearer secret"
        );
    }
}
