//! HTTP API client for the matching and anonymous-chat endpoints

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::json;
use std::sync::Arc;
use url::Url;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::models::{ApiNotice, MatchingPreferences, ReportRequest, StartMatchingResponse};

pub const CSRF_COOKIE: &str = "csrftoken";
pub const CSRF_HEADER: &str = "X-CSRFToken";

#[async_trait]
pub trait MatchingApi: Send + Sync {
    async fn start_matching(&self, preferences: &MatchingPreferences) -> Result<StartMatchingResponse>;

    async fn stop_matching(&self) -> Result<()>;

    async fn leave_conversation(&self, conversation_id: &str) -> Result<()>;

    async fn send_connection_request(&self, conversation_id: &str) -> Result<ApiNotice>;

    async fn respond_connection_request(&self, request_id: &str, accept: bool) -> Result<ApiNotice>;

    async fn submit_report(&self, report: ReportRequest) -> Result<()>;
}

pub struct HttpApi {
    client: Client,
    base_url: Url,
    jar: Arc<Jar>,
    csrf_primed: Mutex<bool>,
}

impl HttpApi {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let base_url = Url::parse(&config.http_url())?;
        let jar = Arc::new(Jar::default());

        if let Some(ref session) = config.server.session_cookie {
            jar.add_cookie_str(&format!("sessionid={}", session), &base_url);
        }

        let client = Client::builder()
            .cookie_provider(jar.clone())
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url,
            jar,
            csrf_primed: Mutex::new(false),
        })
    }

    /// Current value of the CSRF cookie, if the server has set one.
    pub fn csrf_token(&self) -> Option<String> {
        let header = self.jar.cookies(&self.base_url)?;
        let cookies = header.to_str().ok()?;
        cookies.split(';').find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == CSRF_COOKIE).then(|| value.to_string())
        })
    }

    /// The server hands out the CSRF cookie on any page load. Fetch the
    /// root once if we have not seen it yet.
    async fn ensure_csrf(&self) -> Option<String> {
        if let Some(token) = self.csrf_token() {
            return Some(token);
        }

        let already_primed = std::mem::replace(&mut *self.csrf_primed.lock(), true);
        if !already_primed {
            if let Err(e) = self.client.get(self.base_url.clone()).send().await {
                tracing::warn!(error = %e, "Could not fetch CSRF cookie");
            }
        }

        let token = self.csrf_token();
        if token.is_none() {
            tracing::warn!("No CSRF cookie available, sending request without token");
        }
        token
    }

    fn url(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    async fn post(&self, path: &str) -> Result<RequestBuilder> {
        let mut req = self
            .client
            .post(self.url(path)?)
            .header("Referer", self.base_url.as_str());

        if let Some(token) = self.ensure_csrf().await {
            req = req.header(CSRF_HEADER, token);
        }

        Ok(req)
    }

    async fn send_json(&self, path: &str, body: serde_json::Value) -> Result<Response> {
        let resp = self.post(path).await?.json(&body).send().await?;
        check_status(resp).await
    }
}

/// Turn non-2xx responses into errors. A JSON body carrying `error` or
/// `message` is a refusal the user should see, everything else is a
/// transport failure.
async fn check_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let text = resp.text().await.unwrap_or_default();
    let reason = serde_json::from_str::<serde_json::Value>(&text)
        .ok()
        .and_then(|data| {
            data["error"]
                .as_str()
                .or_else(|| data["message"].as_str())
                .map(|s| s.to_string())
        });

    match reason {
        Some(reason) if status.is_client_error() => Err(Error::Rejected(reason)),
        _ => Err(Error::Http(format!("{} - {}", status, text))),
    }
}

#[async_trait]
impl MatchingApi for HttpApi {
    async fn start_matching(&self, preferences: &MatchingPreferences) -> Result<StartMatchingResponse> {
        let resp = self
            .send_json("/api/chat/matching/start/", serde_json::to_value(preferences)?)
            .await?;
        let data: StartMatchingResponse = resp.json().await?;
        Ok(data)
    }

    async fn stop_matching(&self) -> Result<()> {
        self.send_json("/api/chat/matching/stop/", json!({})).await?;
        Ok(())
    }

    async fn leave_conversation(&self, conversation_id: &str) -> Result<()> {
        self.send_json(
            &format!("/api/chat/conversations/{}/leave/", conversation_id),
            json!({}),
        )
        .await?;
        Ok(())
    }

    async fn send_connection_request(&self, conversation_id: &str) -> Result<ApiNotice> {
        let resp = self
            .send_json(
                "/api/chat/anonymous/connection-request/",
                json!({ "conversation_id": conversation_id }),
            )
            .await?;
        Ok(resp.json().await.unwrap_or_default())
    }

    async fn respond_connection_request(&self, request_id: &str, accept: bool) -> Result<ApiNotice> {
        let resp = self
            .send_json(
                "/api/chat/anonymous/connection-respond/",
                json!({ "request_id": request_id, "accept": accept }),
            )
            .await?;
        Ok(resp.json().await.unwrap_or_default())
    }

    async fn submit_report(&self, report: ReportRequest) -> Result<()> {
        let mut form = reqwest::multipart::Form::new()
            .text("reported_user", report.reported_user)
            .text("conversation", report.conversation)
            .text("report_type", report.report_type.as_str().to_string())
            .text("description", report.description);

        if let Some(frame) = report.video_frame {
            let part = reqwest::multipart::Part::bytes(frame)
                .file_name("video_frame.png")
                .mime_str("image/png")
                .map_err(|e| Error::Network(e.to_string()))?;
            form = form.part("video_frame", part);
        }

        let resp = self.post("/api/chat/report/").await?.multipart(form).send().await?;
        check_status(resp).await?;
        Ok(())
    }
}
