//! HTTP client for the remote bot API.
//!
//! Every call is a `POST {api_url}/bot{token}/{method}`. Requests without an
//! upload carry a JSON body; requests that upload a local file or in-memory
//! bytes are sent as `multipart/form-data`. Responses come wrapped in an
//! envelope:
//!
//! ```json
//! { "ok": true, "result": { ... } }
//! { "ok": false, "error_code": 401, "description": "Unauthorized" }
//! ```

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, ClientBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info, trace};

use courier_core::{
    ApiError, ApiResult, Bot, ChatAction, DefaultOptions, FileSource, Message, SendRequest,
    TransportError, Update, UpdateSource, User,
};

/// The public API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Connection settings for an [`HttpBot`].
#[derive(Clone)]
pub struct HttpBotConfig {
    pub token: String,
    pub api_url: String,
    /// Timeout for ordinary calls. Long polls add their own poll timeout.
    pub timeout: Duration,
    pub options: DefaultOptions,
}

impl HttpBotConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_url: DEFAULT_API_URL.to_string(),
            timeout: Duration::from_secs(30),
            options: DefaultOptions::default(),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_options(mut self, options: DefaultOptions) -> Self {
        self.options = options;
        self
    }
}

impl fmt::Debug for HttpBotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpBotConfig")
            .field("token", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("timeout", &self.timeout)
            .field("options", &self.options)
            .finish()
    }
}

/// The response envelope.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<i64>,
    description: Option<String>,
}

impl<T> ApiResponse<T> {
    fn into_result(self, method: &str) -> ApiResult<T> {
        if !self.ok {
            return Err(ApiError::from_envelope(self.error_code, self.description));
        }
        self.result
            .ok_or_else(|| ApiError::Serialization(format!("{method}: envelope has no result")))
    }
}

/// Decodes a raw response body.
///
/// The platform answers errors with a JSON envelope and a matching HTTP
/// status, so the envelope is tried first. Only a body that is not an
/// envelope falls back to the HTTP status.
fn decode<T: DeserializeOwned>(method: &str, status: u16, body: &[u8]) -> ApiResult<T> {
    match serde_json::from_slice::<ApiResponse<T>>(body) {
        Ok(envelope) => envelope.into_result(method),
        Err(_) if !(200..300).contains(&status) => Err(TransportError::Status {
            method: method.to_string(),
            status,
            body: String::from_utf8_lossy(body).into_owned(),
        }
        .into()),
        Err(e) => Err(e.into()),
    }
}

fn request_error(method: &str, err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        return ApiError::Timeout;
    }
    TransportError::Request {
        method: method.to_string(),
        // Strip the URL: it carries the token.
        reason: err.without_url().to_string(),
    }
    .into()
}

/// The raw method caller, shared by the identity check and the bot.
#[derive(Clone)]
struct Api {
    client: Client,
    base: String,
}

impl Api {
    fn new(config: &HttpBotConfig) -> ApiResult<Self> {
        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .build()
            .map_err(|e| request_error("client", e))?;
        let base = format!("{}/bot{}", config.api_url.trim_end_matches('/'), config.token);
        Ok(Self { client, base })
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{method}", self.base)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: &Value) -> ApiResult<T> {
        trace!(method, "Calling API");
        let request = self.client.post(self.url(method)).json(body);
        self.execute(method, request).await
    }

    async fn call_with_timeout<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &Value,
        timeout: Duration,
    ) -> ApiResult<T> {
        trace!(method, ?timeout, "Calling API");
        let request = self.client.post(self.url(method)).json(body).timeout(timeout);
        self.execute(method, request).await
    }

    async fn upload<T: DeserializeOwned>(&self, method: &str, form: Form) -> ApiResult<T> {
        trace!(method, "Uploading to API");
        let request = self.client.post(self.url(method)).multipart(form);
        self.execute(method, request).await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        method: &str,
        request: reqwest::RequestBuilder,
    ) -> ApiResult<T> {
        let response = request.send().await.map_err(|e| request_error(method, e))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| request_error(method, e))?;
        decode(method, status, &body)
    }
}

/// Builds the multipart form for a request that uploads `source` as `field`.
async fn upload_form(request: &SendRequest, field: &'static str, source: &FileSource) -> ApiResult<Form> {
    let mut form = Form::new();
    for (key, value) in request.to_fields() {
        let value = match value {
            Value::String(s) => s,
            other => other.to_string(),
        };
        form = form.text(key, value);
    }

    let part = match source {
        FileSource::ById(_) => return Ok(form),
        FileSource::ByPath(path) => {
            let bytes = tokio::fs::read(path).await.map_err(|e| ApiError::File {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            let filename = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| field.to_string());
            Part::bytes(bytes).file_name(filename)
        }
        FileSource::ByBytes { bytes, filename } => {
            Part::bytes(bytes.clone()).file_name(filename.clone())
        }
    };
    Ok(form.part(field, part))
}

/// A bot backed by the remote REST API.
///
/// Created through [`HttpBot::connect`], which verifies the token with
/// `getMe` before anything else runs.
pub struct HttpBot {
    api: Api,
    options: DefaultOptions,
    me: User,
}

impl HttpBot {
    /// Checks the token and fetches the bot's own identity.
    pub async fn connect(config: HttpBotConfig) -> ApiResult<Self> {
        let api = Api::new(&config)?;
        let me: User = api.call("getMe", &json!({})).await?;
        info!(
            bot_id = me.id,
            username = me.username.as_deref().unwrap_or(""),
            "Bot identity confirmed"
        );
        Ok(Self {
            api,
            options: config.options,
            me,
        })
    }

    pub fn options(&self) -> &DefaultOptions {
        &self.options
    }

    /// Re-fetches the bot's identity.
    pub async fn get_me(&self) -> ApiResult<User> {
        self.api.call("getMe", &json!({})).await
    }

    /// Registers `url` as the push endpoint. An empty url removes it.
    pub async fn set_webhook(&self, url: &str) -> ApiResult<()> {
        let _: bool = self.api.call("setWebhook", &json!({ "url": url })).await?;
        if url.is_empty() {
            debug!("Webhook removed");
        } else {
            info!("Webhook registered");
        }
        Ok(())
    }
}

#[async_trait]
impl Bot for HttpBot {
    fn identity(&self) -> &User {
        &self.me
    }

    async fn send(&self, mut request: SendRequest) -> ApiResult<Message> {
        request.apply_defaults(&self.options);
        let method = request.content.method();
        debug!(chat_id = request.chat_id, method, "Sending message");

        match request.content.file() {
            Some((field, source)) if source.needs_upload() => {
                let form = upload_form(&request, field, source).await?;
                self.api.upload(method, form).await
            }
            _ => {
                self.api
                    .call(method, &Value::Object(request.to_fields()))
                    .await
            }
        }
    }

    async fn forward(
        &self,
        chat_id: i64,
        from_chat_id: i64,
        message_id: i64,
    ) -> ApiResult<Message> {
        let body = json!({
            "chat_id": chat_id,
            "from_chat_id": from_chat_id,
            "message_id": message_id,
        });
        self.api.call("forwardMessage", &body).await
    }

    async fn send_chat_action(&self, chat_id: i64, action: ChatAction) -> ApiResult<()> {
        let body = json!({ "chat_id": chat_id, "action": action.as_str() });
        let _: bool = self.api.call("sendChatAction", &body).await?;
        Ok(())
    }
}

#[async_trait]
impl UpdateSource for HttpBot {
    async fn get_updates(&self, offset: i64, timeout: Duration) -> ApiResult<Vec<Update>> {
        let body = json!({ "offset": offset, "timeout": timeout.as_secs() });
        // The long poll holds the connection open for `timeout`.
        let deadline = timeout + Duration::from_secs(10);
        let entries: Vec<Value> = self
            .api
            .call_with_timeout("getUpdates", &body, deadline)
            .await?;
        Ok(decode_updates(entries))
    }

    async fn clear_webhook(&self) -> ApiResult<()> {
        self.set_webhook("").await
    }
}

/// Decodes a `getUpdates` batch entry by entry.
///
/// An entry the model cannot represent is reduced to its bare `update_id`, so
/// the cursor still moves past it while its payload is dropped. Entries
/// without a usable `update_id` are discarded.
fn decode_updates(entries: Vec<Value>) -> Vec<Update> {
    entries
        .into_iter()
        .filter_map(|entry| {
            let update_id = entry.get("update_id").and_then(Value::as_i64);
            match serde_json::from_value::<Update>(entry) {
                Ok(update) => Some(update),
                Err(e) => {
                    debug!(?update_id, error = %e, "Skipping undecodable update");
                    update_id.map(|update_id| Update {
                        update_id,
                        message: None,
                    })
                }
            }
        })
        .collect()
}

impl fmt::Debug for HttpBot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpBot")
            .field("id", &self.me.id)
            .field("username", &self.me.username)
            .finish()
    }
}
