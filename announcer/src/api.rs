//! Game API access: the [`GameApi`] seam and its HTTP implementation.
//!
//! The run orchestrator only sees [`GameApi`], so tests drive it with an
//! in-memory fake while the binary uses [`ScreepsClient`].

use crate::config::ServerConfig;
use async_trait::async_trait;
use log::debug;
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use shared::{MapStats, NukeSighting, ShardInfo};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use thiserror::Error;

const OFFICIAL_HOST: &str = "screeps.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Nukes in flight, keyed by shard name.
pub type NukesByShard = HashMap<String, Vec<NukeSighting>>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{endpoint} rejected the request: {message}")]
    Rejected { endpoint: String, message: String },
    #[error("malformed response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid server url '{0}'")]
    InvalidUrl(String),
    #[error("no token returned from sign-in")]
    SignIn,
}

/// Read-only view of the game server needed for one announce run.
#[async_trait]
pub trait GameApi: Send + Sync {
    /// All nukes currently in flight.
    async fn nukes(&self) -> Result<NukesByShard, ApiError>;

    /// Shards to process. `nukes` is consulted on servers without a shard
    /// list, where the single shard is named after the nuke data.
    async fn shards(&self, nukes: &NukesByShard) -> Result<Vec<ShardInfo>, ApiError>;

    /// Current game tick of `shard`.
    async fn time(&self, shard: &str) -> Result<i64, ApiError>;

    /// Ownership stats for `rooms` on `shard`.
    async fn map_stats(&self, rooms: &[String], shard: &str) -> Result<MapStats, ApiError>;
}

/// Everything fetched for one shard in one run.
#[derive(Debug, Clone)]
pub struct ShardSnapshot {
    pub info: ShardInfo,
    pub time: i64,
    pub nukes: Vec<NukeSighting>,
    pub stats: MapStats,
}

/// Fetches time and ownership stats for one shard.
///
/// Stats are requested for every room that appears as a target or a
/// launch site. No stats request is made when the shard has no nukes.
pub async fn fetch_shard_snapshot(
    api: &dyn GameApi,
    info: ShardInfo,
    nukes: Vec<NukeSighting>,
) -> Result<ShardSnapshot, ApiError> {
    let time = api.time(&info.name).await?;

    let rooms: Vec<String> = nukes
        .iter()
        .flat_map(|n| [n.room.clone(), n.launch_room_name.clone()])
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let stats = if rooms.is_empty() {
        MapStats::default()
    } else {
        api.map_stats(&rooms, &info.name).await?
    };

    Ok(ShardSnapshot {
        info,
        time,
        nukes,
        stats,
    })
}

#[derive(Deserialize)]
struct NukesResponse {
    #[serde(default)]
    nukes: NukesByShard,
}

#[derive(Deserialize)]
struct ShardsResponse {
    shards: Vec<ShardInfo>,
}

#[derive(Deserialize)]
struct TickResponse {
    tick: f64,
}

#[derive(Deserialize)]
struct TimeResponse {
    time: i64,
}

#[derive(Deserialize)]
struct SignInResponse {
    token: Option<String>,
}

/// HTTP client for the Screeps web API.
pub struct ScreepsClient {
    http: Client,
    base: String,
    official: bool,
    token: Option<String>,
}

impl ScreepsClient {
    /// Builds a client for `config`, signing in with username and password
    /// when no token is configured.
    pub async fn connect(config: &ServerConfig) -> Result<Self, ApiError> {
        let url = Url::parse(&config.url).map_err(|_| ApiError::InvalidUrl(config.url.clone()))?;
        let official = url
            .host_str()
            .map(|host| host == OFFICIAL_HOST || host.ends_with(".screeps.com"))
            .unwrap_or(false);

        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let mut client = Self {
            http,
            base: config.url.trim_end_matches('/').to_string(),
            official,
            token: config.token.clone(),
        };

        if client.token.is_none() {
            if let (Some(username), Some(password)) = (&config.username, &config.password) {
                client.token = Some(client.sign_in(username, password).await?);
            }
        }

        Ok(client)
    }

    pub fn is_official(&self) -> bool {
        self.official
    }

    async fn sign_in(&self, username: &str, password: &str) -> Result<String, ApiError> {
        let response: SignInResponse = self
            .send(
                "auth/signin",
                self.http
                    .post(self.endpoint("auth/signin"))
                    .json(&json!({ "email": username, "password": password })),
            )
            .await?;
        response.token.ok_or(ApiError::SignIn)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/{}", self.base, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.header("X-Token", token).header("X-Username", token),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: RequestBuilder,
    ) -> Result<T, ApiError> {
        debug!("Requesting {}", endpoint);
        let body: Value = self
            .authorized(request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        decode(endpoint, body)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(path, self.http.get(self.endpoint(path))).await
    }
}

/// Decodes an API body, treating an `error` field as a rejection.
fn decode<T: DeserializeOwned>(endpoint: &str, body: Value) -> Result<T, ApiError> {
    if let Some(error) = body.get("error") {
        let message = error
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(ApiError::Rejected {
            endpoint: endpoint.to_string(),
            message,
        });
    }
    serde_json::from_value(body).map_err(|source| ApiError::Decode {
        endpoint: endpoint.to_string(),
        source,
    })
}

#[async_trait]
impl GameApi for ScreepsClient {
    async fn nukes(&self) -> Result<NukesByShard, ApiError> {
        let response: NukesResponse = self.get("experimental/nukes").await?;
        Ok(response.nukes)
    }

    async fn shards(&self, nukes: &NukesByShard) -> Result<Vec<ShardInfo>, ApiError> {
        if self.official {
            let response: ShardsResponse = self.get("game/shards/info").await?;
            return Ok(response.shards);
        }

        // Private servers run a single shard and report its tick separately
        let Some(name) = nukes.keys().min().cloned() else {
            return Ok(Vec::new());
        };
        let response: TickResponse = self.get("game/tick").await?;
        Ok(vec![ShardInfo {
            name,
            tick: response.tick,
        }])
    }

    async fn time(&self, shard: &str) -> Result<i64, ApiError> {
        let request = self
            .http
            .get(self.endpoint("game/time"))
            .query(&[("shard", shard)]);
        let response: TimeResponse = self.send("game/time", request).await?;
        Ok(response.time)
    }

    async fn map_stats(&self, rooms: &[String], shard: &str) -> Result<MapStats, ApiError> {
        let request = self.http.post(self.endpoint("game/map-stats")).json(&json!({
            "rooms": rooms,
            "statName": "owner0",
            "shard": shard,
        }));
        self.send("game/map-stats", request).await
    }
}
