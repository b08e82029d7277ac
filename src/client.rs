//! Blocking client for the Gemini web chat interface.
//!
//! One HTTP session is built at initialization with browser-mimicking
//! headers and the two session cookies, the anti-forgery token is scraped
//! from the landing page, and each [`GeminiClient::ask`] call is a single
//! blocking round trip. Fatal setup failures surface as [`Error`];
//! per-exchange transport and parse failures are recovered into the
//! returned [`AskResponse`].

use crate::auth::{self, SessionCredentials};
use crate::config::Config;
use crate::conversation::{ConversationRegistry, ConversationState};
use crate::error::{Error, Result};
use crate::protocol;
use rand::seq::IndexedRandom;
use reqwest::cookie::Jar;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, ORIGIN, REFERER, USER_AGENT};
use std::path::Path;
use std::sync::Arc;

/// Browser strings to pick from when no fixed User-Agent is configured.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:127.0) Gecko/20100101 Firefox/127.0",
];

/// Result of one exchange.
///
/// Transport and parse failures land here too: `content` is `None`, the
/// correlation ids keep their pre-exchange values, and `error` carries the
/// explanation. Callers never need to catch anything to tell "no answer"
/// from "request failed".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AskResponse {
    /// Primary text answer, or `None` when the service returned no answer
    /// or the exchange failed.
    pub content: Option<String>,
    /// Image URLs attached to the answer.
    pub images: Vec<String>,
    pub conversation_id: String,
    pub response_id: String,
    /// Explanation for a failed exchange; `None` on success, including the
    /// legitimate no-answer case.
    pub error: Option<String>,
}

impl AskResponse {
    fn recovered(state: &ConversationState, error: &Error) -> Self {
        Self {
            content: None,
            images: Vec::new(),
            conversation_id: state.conversation_id.clone(),
            response_id: state.response_id.clone(),
            error: Some(error.to_string()),
        }
    }
}

/// Client for the Gemini web interface, authenticated with browser
/// session cookies.
///
/// Single-threaded by construction: `ask` and the registry operations take
/// `&mut self`, so concurrent use of one client requires external
/// serialization.
pub struct GeminiClient {
    http: reqwest::blocking::Client,
    base_url: String,
    at_token: String,
    conversations: ConversationRegistry,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .field("at_token", &"[REDACTED]")
            .field("conversations", &self.conversations)
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    /// Initialize against the production service with default settings.
    ///
    /// Loads the session cookies from `cookie_path`, builds the HTTP
    /// session, and scrapes the anti-forgery token from the landing page.
    pub fn new(cookie_path: impl AsRef<Path>, timeout_secs: u64) -> Result<Self> {
        let config = Config {
            cookie_path: cookie_path.as_ref().to_path_buf(),
            timeout_secs,
            ..Config::default()
        };
        Self::with_config(&config)
    }

    /// Initialize from an explicit [`Config`].
    pub fn with_config(config: &Config) -> Result<Self> {
        let credentials = auth::load_cookies(&config.cookie_path)?;
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let http = build_session(&credentials, config, &base_url)?;
        let at_token = fetch_at_token(&http, &base_url)?;
        tracing::debug!("session initialized, anti-forgery token acquired");

        Ok(Self {
            http,
            base_url,
            at_token,
            conversations: ConversationRegistry::default(),
        })
    }

    /// Send a question and return the answer.
    ///
    /// With `conversation: Some(name)` the named conversation is selected
    /// first and stays selected. With `None`, the current conversation is
    /// used, creating a default one on the first call. The correlation
    /// triple returned in one exchange is sent verbatim in the next.
    pub fn ask(&mut self, question: &str, conversation: Option<&str>) -> AskResponse {
        if let Some(name) = conversation
            && let Err(err) = self.conversations.switch(name)
        {
            return AskResponse::recovered(&ConversationState::default(), &err);
        }
        if self.conversations.current().is_none()
            && let Err(err) = self.conversations.create(None)
        {
            return AskResponse::recovered(&ConversationState::default(), &err);
        }

        let state = self
            .conversations
            .current_state()
            .cloned()
            .unwrap_or_default();

        match self.exchange(question, &state) {
            Ok(Some(payload)) => {
                if let Some(current) = self.conversations.current_state_mut() {
                    current.update(
                        &payload.conversation_id,
                        &payload.response_id,
                        &payload.choice_id,
                    );
                }
                AskResponse {
                    content: payload.content,
                    images: payload.images,
                    conversation_id: payload.conversation_id,
                    response_id: payload.response_id,
                    error: None,
                }
            }
            // The service returned no answer; state stays as it was.
            Ok(None) => AskResponse {
                content: None,
                images: Vec::new(),
                conversation_id: state.conversation_id,
                response_id: state.response_id,
                error: None,
            },
            Err(err) => {
                tracing::warn!("exchange failed: {err}");
                AskResponse::recovered(&state, &err)
            }
        }
    }

    fn exchange(
        &self,
        question: &str,
        state: &ConversationState,
    ) -> Result<Option<protocol::ChatPayload>> {
        let envelope = protocol::encode_envelope(question, state)?;
        let url = format!("{}{}", self.base_url, protocol::CHAT_PATH);
        tracing::debug!(conversation_id = %state.conversation_id, "sending chat request");

        let response = self
            .http
            .post(&url)
            .query(&protocol::QUERY_PARAMS)
            .form(&[
                ("f.req", envelope.as_str()),
                ("at", self.at_token.as_str()),
            ])
            .send()?
            .error_for_status()?;

        let body = response.text()?;
        Ok(protocol::decode_response(&body)?)
    }

    /// Create a conversation and select it; generates a name when omitted.
    pub fn create_conversation(&mut self, name: Option<&str>) -> Result<String> {
        self.conversations.create(name)
    }

    /// Select an existing conversation.
    pub fn switch_conversation(&mut self, name: &str) -> Result<()> {
        self.conversations.switch(name)
    }

    /// All conversation names in insertion order.
    #[must_use]
    pub fn list_conversations(&self) -> Vec<&str> {
        self.conversations.list()
    }

    /// Delete a conversation, reassigning the selection if needed.
    pub fn delete_conversation(&mut self, name: &str) -> Result<()> {
        self.conversations.delete(name)
    }

    /// Name of the currently selected conversation.
    #[must_use]
    pub fn current_conversation(&self) -> Option<&str> {
        self.conversations.current()
    }

    /// Correlation state of the currently selected conversation.
    #[must_use]
    pub fn current_state(&self) -> Option<&ConversationState> {
        self.conversations.current_state()
    }
}

fn build_session(
    credentials: &SessionCredentials,
    config: &Config,
    base_url: &str,
) -> Result<reqwest::blocking::Client> {
    let origin = reqwest::Url::parse(base_url)
        .map_err(|e| Error::Config(format!("invalid base url {base_url}: {e}")))?;

    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/x-www-form-urlencoded;charset=utf-8"),
    );
    headers.insert(
        ORIGIN,
        HeaderValue::from_str(base_url)
            .map_err(|e| Error::Config(format!("invalid base url {base_url}: {e}")))?,
    );
    headers.insert(
        REFERER,
        HeaderValue::from_str(&format!("{base_url}/"))
            .map_err(|e| Error::Config(format!("invalid base url {base_url}: {e}")))?,
    );
    headers.insert("X-Same-Domain", HeaderValue::from_static("1"));

    let agent = match &config.user_agent {
        Some(fixed) => fixed.as_str(),
        None => USER_AGENTS
            .choose(&mut rand::rng())
            .copied()
            .unwrap_or(USER_AGENTS[0]),
    };
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(agent)
            .map_err(|e| Error::Config(format!("invalid user agent: {e}")))?,
    );

    let jar = Arc::new(Jar::default());
    jar.add_cookie_str(
        &format!("{}={}; Path=/", auth::PSID_COOKIE, credentials.psid),
        &origin,
    );
    jar.add_cookie_str(
        &format!("{}={}; Path=/", auth::PSIDTS_COOKIE, credentials.psidts),
        &origin,
    );

    let client = reqwest::blocking::Client::builder()
        .default_headers(headers)
        .cookie_provider(jar)
        .timeout(config.timeout())
        .build()?;
    Ok(client)
}

fn fetch_at_token(http: &reqwest::blocking::Client, base_url: &str) -> Result<String> {
    let url = format!("{base_url}{}", protocol::LANDING_PATH);
    let response = http
        .get(&url)
        .send()
        .map_err(|e| Error::Retrieval(format!("landing page request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::Retrieval(format!(
            "landing page returned HTTP {status}"
        )));
    }

    let html = response
        .text()
        .map_err(|e| Error::Retrieval(format!("landing page read failed: {e}")))?;
    protocol::extract_at_token(&html)
        .ok_or_else(|| Error::Retrieval("anti-forgery token not found in landing page".into()))
}
