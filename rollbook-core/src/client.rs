use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://api.github.com";
const ACCEPT_HEADER: &str = "application/vnd.github.v3+json";

#[derive(Debug, Error)]
pub enum ContentsError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("remote content is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("remote content is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("remote content is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("branch ref response is missing the head commit sha")]
    MissingHeadSha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    NotFound,
    Conflict,
    RateLimit,
    Transient,
    Permanent,
}

impl ContentsError {
    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            ContentsError::Api { status, .. } => Some(classify_api_status(*status)),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.classification(),
            Some(ApiErrorClass::Conflict | ApiErrorClass::RateLimit | ApiErrorClass::Transient)
        ) || matches!(self, ContentsError::Request(_))
    }
}

fn classify_api_status(status: StatusCode) -> ApiErrorClass {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ApiErrorClass::Auth
    } else if status == StatusCode::NOT_FOUND {
        ApiErrorClass::NotFound
    } else if status == StatusCode::CONFLICT {
        ApiErrorClass::Conflict
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ApiErrorClass::RateLimit
    } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}

/// A document fetched from the remote store: decoded JSON content plus
/// the revision token (content sha) required to overwrite it.
#[derive(Debug, Clone)]
pub struct RemoteFile {
    pub content: Value,
    pub sha: String,
}

/// Whether `ensure_branch_exists` found the data branch or had to
/// provision it from the default branch head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchOutcome {
    AlreadyExists,
    Created,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AccountInfo {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub struct PutResult {
    #[serde(default)]
    pub content: Option<PutContent>,
}

#[derive(Debug, Deserialize)]
pub struct PutContent {
    pub sha: String,
}

#[derive(Debug, Deserialize)]
struct ContentsPayload {
    content: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GitRef {
    object: GitRefObject,
}

#[derive(Debug, Deserialize)]
struct GitRefObject {
    #[serde(default)]
    sha: Option<String>,
}

/// Client for a GitHub-style contents API: read a file (with its sha)
/// from a branch, write a file guarded by an optional sha, and create
/// the branch when it does not exist yet.
#[derive(Clone)]
pub struct ContentsClient {
    http: Client,
    base_url: Url,
    token: String,
    owner: String,
    repo: String,
    branch: String,
    default_branch: String,
}

impl ContentsClient {
    pub fn new(
        token: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
        branch: impl Into<String>,
    ) -> Result<Self, ContentsError> {
        Self::with_base_url(DEFAULT_BASE_URL, token, owner, repo, branch)
    }

    pub fn with_base_url(
        base_url: &str,
        token: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
        branch: impl Into<String>,
    ) -> Result<Self, ContentsError> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(base_url)?,
            token: token.into(),
            owner: owner.into(),
            repo: repo.into(),
            branch: branch.into(),
            default_branch: "main".to_string(),
        })
    }

    pub fn with_default_branch(mut self, name: impl Into<String>) -> Self {
        self.default_branch = name.into();
        self
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Fetch a file from the data branch. `Ok(None)` means the file does
    /// not exist yet; decode and parse failures are real errors so the
    /// caller can tell "nothing there" from "something broken".
    pub async fn get_file(&self, path: &str) -> Result<Option<RemoteFile>, ContentsError> {
        let mut url = self.endpoint(&format!(
            "/repos/{}/{}/contents/{}",
            self.owner, self.repo, path
        ))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("ref", &self.branch);
            // Cache buster so the returned sha is never stale.
            query.append_pair("t", &now_unix().to_string());
        }
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .header("Accept", ACCEPT_HEADER)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let payload: ContentsPayload = Self::handle_response(response).await?;
        let content = decode_content(&payload.content)?;
        Ok(Some(RemoteFile {
            content,
            sha: payload.sha,
        }))
    }

    /// Write a file on the data branch. A `sha` must be supplied to
    /// overwrite an existing file; the API rejects the write when the
    /// sha is stale, which surfaces here as an `Api` error. No retries
    /// happen at this level.
    pub async fn put_file(
        &self,
        path: &str,
        content: &Value,
        sha: Option<&str>,
    ) -> Result<PutResult, ContentsError> {
        let url = self.endpoint(&format!(
            "/repos/{}/{}/contents/{}",
            self.owner, self.repo, path
        ))?;
        let mut body = serde_json::json!({
            "message": format!("Update {path} - {}", now_rfc3339()),
            "content": encode_content(content)?,
            "branch": self.branch,
        });
        if let Some(sha) = sha {
            body["sha"] = Value::String(sha.to_string());
        }
        let response = self
            .http
            .put(url)
            .header("Authorization", self.auth_header_value())
            .header("Accept", ACCEPT_HEADER)
            .json(&body)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    /// Make sure the data branch exists, creating it from the default
    /// branch head when missing. Idempotent; resolution and creation
    /// failures propagate so a later write never targets a missing ref.
    pub async fn ensure_branch_exists(&self) -> Result<BranchOutcome, ContentsError> {
        let url = self.endpoint(&format!(
            "/repos/{}/{}/branches/{}",
            self.owner, self.repo, self.branch
        ))?;
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .header("Accept", ACCEPT_HEADER)
            .send()
            .await?;
        if response.status().is_success() {
            return Ok(BranchOutcome::AlreadyExists);
        }
        if response.status() != StatusCode::NOT_FOUND {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ContentsError::Api { status, body });
        }

        let ref_url = self.endpoint(&format!(
            "/repos/{}/{}/git/ref/heads/{}",
            self.owner, self.repo, self.default_branch
        ))?;
        let response = self
            .http
            .get(ref_url)
            .header("Authorization", self.auth_header_value())
            .header("Accept", ACCEPT_HEADER)
            .send()
            .await?;
        let head: GitRef = Self::handle_response(response).await?;
        let sha = head.object.sha.ok_or(ContentsError::MissingHeadSha)?;

        let create_url = self.endpoint(&format!("/repos/{}/{}/git/refs", self.owner, self.repo))?;
        let response = self
            .http
            .post(create_url)
            .header("Authorization", self.auth_header_value())
            .header("Accept", ACCEPT_HEADER)
            .json(&serde_json::json!({
                "ref": format!("refs/heads/{}", self.branch),
                "sha": sha,
            }))
            .send()
            .await?;
        if response.status().is_success() {
            Ok(BranchOutcome::Created)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ContentsError::Api { status, body })
        }
    }

    /// Validate the credential by fetching the authenticated account.
    pub async fn test_connection(&self) -> Result<AccountInfo, ContentsError> {
        let url = self.endpoint("/user")?;
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .header("Accept", ACCEPT_HEADER)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    fn auth_header_value(&self) -> String {
        format!("token {}", self.token)
    }

    fn endpoint(&self, path: &str) -> Result<Url, ContentsError> {
        Ok(self.base_url.join(path)?)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ContentsError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ContentsError::Api { status, body })
        }
    }
}

/// The API wraps base64 bodies at 60 columns; strip whitespace before
/// decoding, then treat the bytes as UTF-8 JSON.
fn decode_content(raw: &str) -> Result<Value, ContentsError> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = BASE64.decode(compact.as_bytes())?;
    let text = String::from_utf8(bytes)?;
    Ok(serde_json::from_str(&text)?)
}

/// UTF-8-safe transport encoding: serialize to UTF-8 JSON bytes first,
/// then base64 those bytes, so non-Latin-1 text survives the trip.
fn encode_content(content: &Value) -> Result<String, ContentsError> {
    let text = serde_json::to_string_pretty(content)?;
    Ok(BASE64.encode(text.as_bytes()))
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}
