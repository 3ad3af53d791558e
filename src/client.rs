use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, RequestBuilder, Response, header};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::backend::{CompletionBackend, EventStream, TemplateBackend, ValidationBackend};
use crate::data_stream::process_data_stream;
use crate::error::{Error, Result};
use crate::template::{parse_selection_response, selection_prompt};
use crate::types::{
    ChatRequest, ProviderInfo, TemplateRequest, TemplateSeed, TemplateSelection, ValidationReport,
};

const DEFAULT_BASE_URL: &str = "http://localhost:5173/";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTP client for the chat, template and validation endpoints.
///
/// All three backend traits are implemented against one base URL; the
/// validation endpoint may live elsewhere.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: ReqwestClient,
    base_url: Url,
    validation_url: Url,
    timeout: Duration,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LlmCallBody<'a> {
    system: String,
    message: &'a str,
    model: &'a str,
    provider: ProviderInfo,
    stream_output: bool,
}

#[derive(Deserialize)]
struct LlmCallResponse {
    #[serde(default)]
    text: String,
}

impl HttpBackend {
    /// Create a backend rooted at `base_url`.
    pub fn new(base_url: Option<&str>) -> Result<Self> {
        Self::with_options(base_url, None, None)
    }

    /// Create a backend with custom settings.
    ///
    /// `validation_url` defaults to `<base>/api/vali`. The timeout bounds
    /// connection setup for every call and the whole exchange for the
    /// non-streaming calls; streamed replies may run longer.
    pub fn with_options(
        base_url: Option<&str>,
        validation_url: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let mut base_url = Url::parse(base_url.unwrap_or(DEFAULT_BASE_URL))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let validation_url = match validation_url {
            Some(url) => Url::parse(url)?,
            None => base_url.join("api/vali")?,
        };

        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = ReqwestClient::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {e}"),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            client,
            base_url,
            validation_url,
            timeout,
        })
    }

    /// The root every relative endpoint is resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    fn default_headers(accept: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static(accept));
        headers
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await.map_err(|e| self.request_error(e))?;
        if !response.status().is_success() {
            return Err(process_error_response(response).await);
        }
        Ok(response)
    }

    fn request_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::timeout(
                format!("Request timed out: {e}"),
                Some(self.timeout.as_secs_f64()),
            )
        } else if e.is_connect() {
            Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
        } else {
            Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
        }
    }
}

/// Convert a non-success response into an [`Error`].
pub(crate) async fn process_error_response(response: Response) -> Error {
    let status_code = response.status().as_u16();

    let request_id = response
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .map(String::from);

    let retry_after = response
        .headers()
        .get("retry-after")
        .and_then(|val| val.to_str().ok())
        .and_then(|val| val.parse::<u64>().ok());

    // The chat route answers `{message}` or `{error: {type, message}}`,
    // depending on where the failure originated.
    #[derive(Deserialize)]
    struct ErrorResponse {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        error: Option<ErrorDetail>,
    }

    #[derive(Deserialize)]
    struct ErrorDetail {
        #[serde(rename = "type")]
        error_type: Option<String>,
        message: Option<String>,
        param: Option<String>,
    }

    let error_body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            return Error::http_client(
                format!("Failed to read error response: {e}"),
                Some(Box::new(e)),
            );
        }
    };

    let parsed = serde_json::from_str::<ErrorResponse>(&error_body).ok();
    let detail = parsed.as_ref().and_then(|e| e.error.as_ref());
    let error_type = detail.and_then(|e| e.error_type.clone());
    let error_param = detail.and_then(|e| e.param.clone());
    let error_message = detail
        .and_then(|e| e.message.clone())
        .or_else(|| parsed.as_ref().and_then(|e| e.message.clone()))
        .unwrap_or(error_body);

    match status_code {
        400 => Error::bad_request(error_message, error_param),
        401 | 403 => Error::unauthorized(status_code, error_message),
        404 => Error::not_found(error_message),
        408 => Error::timeout(error_message, None),
        429 => Error::rate_limit(error_message, retry_after),
        500..=599 => Error::unavailable(status_code, error_message, retry_after),
        _ => Error::api(status_code, error_type, error_message, request_id),
    }
}

#[async_trait::async_trait]
impl CompletionBackend for HttpBackend {
    async fn stream_chat(&self, request: ChatRequest) -> Result<EventStream> {
        let url = self.endpoint("api/chat")?;
        let response = self
            .send(
                self.client
                    .post(url)
                    .headers(Self::default_headers("text/plain"))
                    .json(&request),
            )
            .await?;
        Ok(Box::pin(process_data_stream(response.bytes_stream())))
    }
}

#[async_trait::async_trait]
impl TemplateBackend for HttpBackend {
    async fn select_template(&self, request: &TemplateRequest) -> Result<TemplateSelection> {
        let url = self.endpoint("api/llmcall")?;
        let body = LlmCallBody {
            system: selection_prompt(),
            message: &request.message,
            model: &request.model,
            provider: ProviderInfo::named(&request.provider),
            stream_output: false,
        };
        let response = self
            .send(
                self.client
                    .post(url)
                    .headers(Self::default_headers("application/json"))
                    .timeout(self.timeout)
                    .json(&body),
            )
            .await?;
        let reply: LlmCallResponse = response.json().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse classification response: {e}"),
                Some(Box::new(e)),
            )
        })?;
        Ok(parse_selection_response(&reply.text))
    }

    async fn fetch_template(&self, template: &str, title: &str) -> Result<TemplateSeed> {
        let mut url = self.endpoint("api/templates/")?.join(template)?;
        url.query_pairs_mut().append_pair("title", title);
        let response = self
            .send(
                self.client
                    .get(url)
                    .headers(Self::default_headers("application/json"))
                    .timeout(self.timeout),
            )
            .await?;
        response.json::<TemplateSeed>().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse template '{template}': {e}"),
                Some(Box::new(e)),
            )
        })
    }
}

#[async_trait::async_trait]
impl ValidationBackend for HttpBackend {
    async fn validate(&self, file_name: Option<&str>) -> Result<ValidationReport> {
        let mut url = self.validation_url.clone();
        if let Some(file_name) = file_name {
            url.query_pairs_mut().append_pair("fileName", file_name);
        }
        let response = self
            .send(
                self.client
                    .get(url)
                    .headers(Self::default_headers("application/json"))
                    .timeout(self.timeout),
            )
            .await?;
        response.json::<ValidationReport>().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse validation response: {e}"),
                Some(Box::new(e)),
            )
        })
    }
}
