// src/client.rs
// Retrying invoker: translates drafting operations into x-callback-url
// launches mediated by the callback server, with bounded retry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::callback::{CallbackOutcome, CallbackServer};
use crate::error::DraftsError;
use crate::url_scheme::build_invocation_url;
use crate::utils::{parse_bool_flag, split_tags};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Seam for the OS-level "open URL" primitive, so tests can intercept
/// launches and drive callbacks themselves.
#[async_trait]
pub trait UrlOpener: Send + Sync {
    /// Ask the OS to open the URL. Success only means the OS accepted the
    /// request, not that Drafts processed it.
    async fn open_url(&self, url: &str) -> Result<(), DraftsError>;
}

/// Production opener: `/usr/bin/open <url>`.
#[derive(Default)]
pub struct SystemOpener;

#[async_trait]
impl UrlOpener for SystemOpener {
    async fn open_url(&self, url: &str) -> Result<(), DraftsError> {
        #[cfg(target_os = "macos")]
        {
            use tokio::process::Command;
            let status = Command::new("/usr/bin/open")
                .arg(url)
                .status()
                .await
                .map_err(|e| DraftsError::Launch(format!("failed to spawn open: {}", e)))?;
            if status.success() {
                Ok(())
            } else {
                Err(DraftsError::Launch(format!(
                    "open exited with status {}",
                    status.code().unwrap_or(-1)
                )))
            }
        }
        #[cfg(not(target_os = "macos"))]
        {
            let _ = url;
            Err(DraftsError::Launch(
                "opening URLs is only available on macOS".to_string(),
            ))
        }
    }
}

/// A draft reconstructed from the string map a callback echoes back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    pub uuid: String,
    pub content: String,
    /// First line of the content.
    pub title: String,
    pub tags: Vec<String>,
    pub flagged: bool,
}

impl Draft {
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let content = params
            .get("text")
            .or_else(|| params.get("content"))
            .cloned()
            .unwrap_or_default();
        let title = content.lines().next().unwrap_or_default().to_string();
        Self {
            uuid: params.get("uuid").cloned().unwrap_or_default(),
            title,
            content,
            tags: params.get("tags").map(|t| split_tags(t)).unwrap_or_default(),
            flagged: params
                .get("flagged")
                .map(|f| parse_bool_flag(f))
                .unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub tags: Vec<String>,
    pub folder: Option<String>,
    pub flagged: Option<bool>,
    pub action: Option<String>,
}

/// Client for the Drafts URL-scheme automation interface.
pub struct DraftsClient {
    callbacks: Arc<CallbackServer>,
    opener: Arc<dyn UrlOpener>,
    max_retries: u32,
    retry_delay: Duration,
}

impl DraftsClient {
    pub fn new(callbacks: Arc<CallbackServer>) -> Self {
        Self {
            callbacks,
            opener: Arc::new(SystemOpener),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_retry_policy(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_opener(mut self, opener: Arc<dyn UrlOpener>) -> Self {
        self.opener = opener;
        self
    }

    /// Create a new draft. The callback echoes the new draft's uuid; fields
    /// the app does not echo are filled from the request.
    pub async fn create(
        &self,
        content: &str,
        options: &CreateOptions,
    ) -> Result<Draft, DraftsError> {
        let mut params = vec![("text".to_string(), content.to_string())];
        for tag in &options.tags {
            params.push(("tag".to_string(), tag.clone()));
        }
        if let Some(folder) = &options.folder {
            params.push(("folder".to_string(), folder.clone()));
        }
        if let Some(flagged) = options.flagged {
            params.push(("flagged".to_string(), flagged.to_string()));
        }
        if let Some(action) = &options.action {
            params.push(("action".to_string(), action.clone()));
        }

        let data = self.invoke("create", params).await?;
        let mut draft = Draft::from_params(&data);
        if draft.content.is_empty() {
            draft.content = content.to_string();
            draft.title = content.lines().next().unwrap_or_default().to_string();
        }
        if draft.tags.is_empty() {
            draft.tags = options.tags.clone();
        }
        if let Some(flagged) = options.flagged {
            draft.flagged = flagged;
        }
        Ok(draft)
    }

    /// Fetch a draft's content by uuid.
    pub async fn get(&self, uuid: &str) -> Result<Draft, DraftsError> {
        let params = vec![
            ("uuid".to_string(), uuid.to_string()),
            ("retrieve".to_string(), "true".to_string()),
        ];
        let data = self.invoke("get", params).await?;
        let mut draft = Draft::from_params(&data);
        if draft.uuid.is_empty() {
            draft.uuid = uuid.to_string();
        }
        Ok(draft)
    }

    /// Append text to an existing draft.
    pub async fn append(&self, uuid: &str, text: &str) -> Result<Draft, DraftsError> {
        let params = vec![
            ("uuid".to_string(), uuid.to_string()),
            ("text".to_string(), text.to_string()),
        ];
        let data = self.invoke("append", params).await?;
        let mut draft = Draft::from_params(&data);
        if draft.uuid.is_empty() {
            draft.uuid = uuid.to_string();
        }
        Ok(draft)
    }

    /// Prepend text to an existing draft.
    pub async fn prepend(&self, uuid: &str, text: &str) -> Result<Draft, DraftsError> {
        let params = vec![
            ("uuid".to_string(), uuid.to_string()),
            ("text".to_string(), text.to_string()),
        ];
        let data = self.invoke("prepend", params).await?;
        let mut draft = Draft::from_params(&data);
        if draft.uuid.is_empty() {
            draft.uuid = uuid.to_string();
        }
        Ok(draft)
    }

    /// Open a draft in the app. Requires at least one identifying parameter;
    /// missing both is a local validation failure, raised before any launch
    /// and never retried.
    pub async fn open(
        &self,
        uuid: Option<&str>,
        title: Option<&str>,
    ) -> Result<HashMap<String, String>, DraftsError> {
        let mut params = Vec::new();
        match (uuid, title) {
            (Some(u), _) => params.push(("uuid".to_string(), u.to_string())),
            (None, Some(t)) => params.push(("title".to_string(), t.to_string())),
            (None, None) => {
                return Err(DraftsError::Validation(
                    "open requires a uuid or a title".to_string(),
                ))
            }
        }
        self.invoke("open", params).await
    }

    /// Run a named Drafts action, optionally against provided text.
    pub async fn run_action(
        &self,
        action: &str,
        text: Option<&str>,
    ) -> Result<HashMap<String, String>, DraftsError> {
        let mut params = vec![("action".to_string(), action.to_string())];
        if let Some(t) = text {
            params.push(("text".to_string(), t.to_string()));
        }
        self.invoke("runAction", params).await
    }

    /// Open the app's search UI for a query. Row data comes from the local
    /// store, not from this call.
    pub async fn search(&self, query: &str) -> Result<HashMap<String, String>, DraftsError> {
        let params = vec![("query".to_string(), query.to_string())];
        self.invoke("search", params).await
    }

    /// Bounded retry loop around one operation. Every attempt mints a fresh
    /// request id and callback triple; no correlation state is reused.
    async fn invoke(
        &self,
        endpoint: &str,
        params: Vec<(String, String)>,
    ) -> Result<HashMap<String, String>, DraftsError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.attempt_once(endpoint, &params).await {
                Ok(data) => return Ok(data),
                Err(err) if err.is_retryable() && attempt <= self.max_retries => {
                    warn!(
                        endpoint,
                        attempt,
                        error = %err,
                        "attempt failed, retrying after delay"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn attempt_once(
        &self,
        endpoint: &str,
        params: &[(String, String)],
    ) -> Result<HashMap<String, String>, DraftsError> {
        let request_id = Uuid::new_v4().to_string();
        let urls = self.callbacks.callback_urls(&request_id)?;
        let url = build_invocation_url(endpoint, params, &urls);

        let pending = self.callbacks.register(&request_id)?;
        debug!(endpoint, request_id = %request_id, "launching x-callback-url");

        if let Err(e) = self.opener.open_url(&url).await {
            // The app was never launched, so no callback can arrive.
            self.callbacks.discard(&request_id);
            return Err(e);
        }

        match pending.wait().await? {
            CallbackOutcome::Success(data) => Ok(data),
            CallbackOutcome::Failure(reason) => Err(DraftsError::External(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Instant;

    enum Respond {
        Success(&'static str),
        Error(&'static str),
        Cancel,
    }

    /// Opener that records every launch and plays the configured callback
    /// against the embedded callback URL, like the app would.
    struct ScriptedOpener {
        respond: Respond,
        launched: Mutex<Vec<String>>,
    }

    impl ScriptedOpener {
        fn new(respond: Respond) -> Arc<Self> {
            Arc::new(Self {
                respond,
                launched: Mutex::new(Vec::new()),
            })
        }

        fn launches(&self) -> Vec<String> {
            self.launched.lock().unwrap().clone()
        }

        fn extract_callback(url: &str, kind: &str) -> String {
            let query = url.split_once('?').map(|(_, q)| q).unwrap_or_default();
            let needle = format!("{}=", kind);
            let raw = query
                .split('&')
                .find_map(|p| p.strip_prefix(needle.as_str()))
                .expect("callback param present");
            urlencoding::decode(raw).unwrap().into_owned()
        }
    }

    #[async_trait]
    impl UrlOpener for ScriptedOpener {
        async fn open_url(&self, url: &str) -> Result<(), DraftsError> {
            self.launched.lock().unwrap().push(url.to_string());
            let target = match self.respond {
                Respond::Success(extra) => {
                    format!("{}?{}", Self::extract_callback(url, "x-success"), extra)
                }
                Respond::Error(reason) => format!(
                    "{}?error={}",
                    Self::extract_callback(url, "x-error"),
                    urlencoding::encode(reason)
                ),
                Respond::Cancel => Self::extract_callback(url, "x-cancel"),
            };
            tokio::spawn(async move {
                let _ = reqwest::get(&target).await;
            });
            Ok(())
        }
    }

    async fn client_with(
        opener: Arc<ScriptedOpener>,
        max_retries: u32,
        delay_ms: u64,
    ) -> (Arc<CallbackServer>, DraftsClient) {
        let server = Arc::new(CallbackServer::new());
        server.start().await.unwrap();
        let client = DraftsClient::new(Arc::clone(&server))
            .with_opener(opener)
            .with_retry_policy(max_retries, Duration::from_millis(delay_ms));
        (server, client)
    }

    #[tokio::test]
    async fn success_outcome_maps_to_draft() {
        let opener = ScriptedOpener::new(Respond::Success("uuid=D-1&text=hello%20world"));
        let (server, client) = client_with(Arc::clone(&opener), 0, 10).await;

        let draft = client.get("D-1").await.unwrap();
        assert_eq!(draft.uuid, "D-1");
        assert_eq!(draft.content, "hello world");
        assert_eq!(draft.title, "hello world");
        assert_eq!(opener.launches().len(), 1);

        server.stop().await;
    }

    #[tokio::test]
    async fn error_outcome_retries_then_propagates() {
        let opener = ScriptedOpener::new(Respond::Error("boom"));
        let (server, client) = client_with(Arc::clone(&opener), 1, 100).await;

        let started = Instant::now();
        let err = client.get("D-2").await.unwrap_err();
        let elapsed = started.elapsed();

        // 1 initial attempt + 1 retry, with the configured delay in between.
        assert_eq!(opener.launches().len(), 2);
        assert!(elapsed >= Duration::from_millis(100));
        match err {
            DraftsError::External(reason) => assert_eq!(reason, "boom"),
            other => panic!("unexpected error: {:?}", other),
        }

        server.stop().await;
    }

    #[tokio::test]
    async fn each_attempt_mints_a_fresh_request_id() {
        let opener = ScriptedOpener::new(Respond::Error("nope"));
        let (server, client) = client_with(Arc::clone(&opener), 1, 10).await;

        let _ = client.get("D-3").await;
        let launches = opener.launches();
        assert_eq!(launches.len(), 2);
        let id_of = |url: &str| ScriptedOpener::extract_callback(url, "x-success");
        assert_ne!(id_of(&launches[0]), id_of(&launches[1]));

        server.stop().await;
    }

    #[tokio::test]
    async fn cancel_outcome_carries_fixed_reason() {
        let opener = ScriptedOpener::new(Respond::Cancel);
        let (server, client) = client_with(Arc::clone(&opener), 0, 10).await;

        let err = client.run_action("Log", None).await.unwrap_err();
        match err {
            DraftsError::External(reason) => assert_eq!(reason, "User cancelled"),
            other => panic!("unexpected error: {:?}", other),
        }

        server.stop().await;
    }

    #[tokio::test]
    async fn open_without_identifier_fails_before_launch() {
        let opener = ScriptedOpener::new(Respond::Success(""));
        let (server, client) = client_with(Arc::clone(&opener), 3, 10).await;

        let err = client.open(None, None).await.unwrap_err();
        assert!(matches!(err, DraftsError::Validation(_)));
        assert!(opener.launches().is_empty());

        server.stop().await;
    }

    #[test]
    fn draft_from_params_coerces_fields() {
        let mut params = HashMap::new();
        params.insert("uuid".to_string(), "abc".to_string());
        params.insert("text".to_string(), "Title line\nbody".to_string());
        params.insert("tags".to_string(), "work, inbox,urgent".to_string());
        params.insert("flagged".to_string(), "true".to_string());

        let draft = Draft::from_params(&params);
        assert_eq!(draft.uuid, "abc");
        assert_eq!(draft.title, "Title line");
        assert_eq!(draft.tags, vec!["work", "inbox", "urgent"]);
        assert!(draft.flagged);
    }
}
