//! HTTPS client for the Lichess Board API

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use hyper::{Method, Request, Response, StatusCode};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::OnceCell;

use chess::PieceColor;

use crate::error::{ClientError, ClientResult};
use crate::stream::GameStreamDecoder;
use crate::traits::{Connector, GameService, SnapshotStream};
use crate::types::{Account, ChallengeRequest, GameInfo};

pub const DEFAULT_BASE_URL: &str = "https://lichess.org";

const AGENT: &str = concat!("lichess-uci/", env!("CARGO_PKG_VERSION"));

type HttpClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

fn build_http_client() -> HttpClient {
    let https = HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .build();
    Client::builder(TokioExecutor::new()).build(https)
}

/// Hands out authenticated clients sharing one lazily built HTTPS transport.
pub struct LichessConnector {
    base_url: String,
    http: OnceCell<HttpClient>,
}

impl LichessConnector {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: OnceCell::new(),
        }
    }

    async fn http(&self) -> &HttpClient {
        self.http
            .get_or_init(|| async {
                tracing::debug!("Building HTTPS transport for {}", self.base_url);
                build_http_client()
            })
            .await
    }
}

impl Default for LichessConnector {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

#[async_trait]
impl Connector for LichessConnector {
    async fn warm_up(&self) {
        self.http().await;
    }

    async fn connect(&self, token: &str) -> ClientResult<Arc<dyn GameService>> {
        let token = token.trim();
        if token.is_empty() {
            return Err(ClientError::Unauthorized("no API token set".to_string()));
        }
        let http = self.http().await.clone();
        let client: Arc<dyn GameService> = Arc::new(LichessClient {
            http,
            base_url: self.base_url.clone(),
            token: token.to_string(),
        });
        Ok(client)
    }
}

/// Network client bound to one API token
pub struct LichessClient {
    http: HttpClient,
    base_url: String,
    token: String,
}

impl std::fmt::Debug for LichessClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LichessClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct AccountJson {
    id: String,
    username: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayingJson {
    #[serde(default)]
    now_playing: Vec<PlayingGame>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayingGame {
    game_id: String,
    #[serde(default)]
    color: Option<String>,
}

impl LichessClient {
    async fn request(
        &self,
        method: Method,
        path: &str,
        form: Option<String>,
    ) -> ClientResult<Response<Incoming>> {
        let uri = format!("{}{}", self.base_url, path);
        let builder = Request::builder()
            .method(method.clone())
            .uri(&uri)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(USER_AGENT, AGENT);

        let request = match form {
            Some(form) => builder
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Full::new(Bytes::from(form))),
            None => builder.body(Full::new(Bytes::new())),
        }
        .map_err(|e| ClientError::InvalidRequest(e.to_string()))?;

        tracing::debug!("{} {}", method, path);
        let response = self
            .http
            .request(request)
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        check_status(path, response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let response = self.request(Method::GET, path, None).await?;
        let body = read_body(response).await?;
        serde_json::from_slice(&body).map_err(|e| ClientError::InvalidData(e.to_string()))
    }

    async fn post(&self, path: &str, fields: &[(&str, String)]) -> ClientResult<Bytes> {
        let response = self
            .request(Method::POST, path, Some(encode_form(fields)))
            .await?;
        read_body(response).await
    }

    async fn challenge_status(&self, challenge_id: &str) -> ClientResult<Option<Value>> {
        match self
            .get_json::<Value>(&format!("/api/challenge/{}/show", challenge_id))
            .await
        {
            Ok(value) => Ok(Some(value)),
            Err(ClientError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl GameService for LichessClient {
    async fn account(&self) -> ClientResult<Account> {
        let account: AccountJson = self.get_json("/api/account").await?;
        Ok(Account {
            id: account.id,
            username: account.username,
        })
    }

    async fn create_challenge(&self, request: &ChallengeRequest) -> ClientResult<String> {
        let body = self
            .post(
                &challenge_path(&request.opponent),
                &request.form_fields(),
            )
            .await?;
        let value: Value =
            serde_json::from_slice(&body).map_err(|e| ClientError::InvalidData(e.to_string()))?;
        challenge_id_from(&value)
    }

    async fn find_game_by_challenge(&self, challenge_id: &str) -> ClientResult<Option<GameInfo>> {
        if let Some(challenge) = self.challenge_status(challenge_id).await? {
            let status = challenge_json(&challenge)
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or_default();
            match status {
                "declined" => {
                    let reason = challenge_json(&challenge)
                        .get("declineReason")
                        .and_then(Value::as_str)
                        .unwrap_or("no reason given");
                    return Err(ClientError::ChallengeDeclined(reason.to_string()));
                }
                "canceled" => {
                    return Err(ClientError::ChallengeDeclined("canceled".to_string()))
                }
                "created" | "offline" => return Ok(None),
                _ => {}
            }
        }

        // The accepted challenge becomes a game with the same id, but it can
        // take a moment before the game shows up as playable.
        let playing: PlayingJson = self.get_json("/api/account/playing").await?;
        Ok(playing
            .now_playing
            .into_iter()
            .find(|game| game.game_id == challenge_id)
            .map(|game| GameInfo {
                game_id: game.game_id,
                color: game
                    .color
                    .as_deref()
                    .and_then(|c| c.parse::<PieceColor>().ok()),
            }))
    }

    async fn stream_game(&self, game_id: &str) -> ClientResult<SnapshotStream> {
        let response = self
            .request(
                Method::GET,
                &format!("/api/board/game/stream/{}", game_id),
                None,
            )
            .await?;
        let mut body = response.into_body();
        let mut decoder = GameStreamDecoder::new(game_id);

        let stream = async_stream::stream! {
            while let Some(frame) = body.frame().await {
                let data = match frame {
                    Ok(frame) => match frame.into_data() {
                        Ok(data) => data,
                        Err(_) => continue,
                    },
                    Err(e) => {
                        yield Err(ClientError::Transport(e.to_string()));
                        break;
                    }
                };
                match decoder.push(&data) {
                    Ok(snapshots) => {
                        for snapshot in snapshots {
                            yield Ok(snapshot);
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
            tracing::debug!("Game stream ended");
        };
        Ok(Box::pin(stream))
    }

    async fn send_move(&self, game_id: &str, uci_move: &str) -> ClientResult<()> {
        self.post(
            &format!("/api/board/game/{}/move/{}", game_id, uci_move),
            &[],
        )
        .await?;
        Ok(())
    }

    async fn resign(&self, game_id: &str) -> ClientResult<()> {
        // Lichess only allows aborting before both sides have moved and
        // only allows resigning after; try the one that usually applies
        // first.
        match self
            .post(&format!("/api/board/game/{}/resign", game_id), &[])
            .await
        {
            Ok(_) => Ok(()),
            Err(ClientError::Rejected { .. }) => {
                self.post(&format!("/api/board/game/{}/abort", game_id), &[])
                    .await?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn cancel_challenge(&self, challenge_id: &str) -> ClientResult<()> {
        self.post(&format!("/api/challenge/{}/cancel", challenge_id), &[])
            .await?;
        Ok(())
    }
}

async fn check_status(path: &str, response: Response<Incoming>) -> ClientResult<Response<Incoming>> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = read_body(response)
        .await
        .map(|body| error_message(&body))
        .unwrap_or_default();
    tracing::debug!("{} failed with {}: {}", path, status, message);

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ClientError::Unauthorized(message),
        StatusCode::NOT_FOUND => ClientError::NotFound(path.to_string()),
        StatusCode::TOO_MANY_REQUESTS => ClientError::RateLimited,
        s if s.is_server_error() => ClientError::Server(s.as_u16()),
        s => ClientError::Rejected {
            status: s.as_u16(),
            message,
        },
    })
}

async fn read_body(response: Response<Incoming>) -> ClientResult<Bytes> {
    response
        .into_body()
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .map_err(|e| ClientError::Transport(e.to_string()))
}

/// Lichess error bodies look like `{"error": "..."}`.
fn error_message(body: &[u8]) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string())
}

/// Challenge objects come either bare or wrapped as `{"challenge": {...}}`.
fn challenge_json(value: &Value) -> &Value {
    value.get("challenge").unwrap_or(value)
}

fn challenge_id_from(value: &Value) -> ClientResult<String> {
    let challenge = challenge_json(value);
    if challenge.get("status").and_then(Value::as_str) == Some("declined") {
        return Err(ClientError::ChallengeDeclined(
            challenge
                .get("declineReason")
                .and_then(Value::as_str)
                .unwrap_or("no reason given")
                .to_string(),
        ));
    }
    challenge
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ClientError::InvalidData("challenge response has no id".to_string()))
}

/// `application/x-www-form-urlencoded` body from key/value pairs.
fn encode_form(fields: &[(&str, String)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{}={}", encode_component(k), encode_component(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn encode_component(s: &str) -> String {
    percent_encode(s, "+")
}

/// `POST /api/challenge/{username}` with the name as a single path segment.
fn challenge_path(opponent: &str) -> String {
    format!("/api/challenge/{}", percent_encode(opponent.trim(), "%20"))
}

fn percent_encode(s: &str, space: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b' ' => out.push_str(space),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}
