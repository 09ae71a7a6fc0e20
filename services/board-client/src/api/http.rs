//! HTTP implementation of [`Backend`].

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use raidboard_events::{SseDecoder, SyncEvent};
use raidboard_grid::{CellKey, Character, Raid, RaidOrder, User, UserScheduleChange};
use raidboard_reconcile::ServerTimestamp;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, trace, warn};

use super::wire::{
    self, WireCharacter, WireRaid, WireRaidOrder, WireSchedule, WireScheduleBatch, WireUser,
    WireUserSchedule,
};
use super::{Backend, EventStream, ScheduleRecord, ScheduleSnapshot};
use crate::config::Config;
use crate::error::ClientError;

/// Timeout for ordinary request/response calls. The push stream has none.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// REST + server-sent-events client for the board backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a client for `base_url` (e.g. `http://localhost:8080/api`).
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| ClientError::Decode(format!("invalid API URL {base_url:?}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::Decode(format!(
                "API URL {base_url} cannot carry a path"
            )));
        }

        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &Config) -> Result<Self, ClientError> {
        Self::new(&config.api_url)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build a URL from path segments. Segments are percent-encoded.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ClientError> {
        let response = request.timeout(REQUEST_TIMEOUT).send().await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(self.handle_error(response).await)
        }
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ClientError> {
        let response = self.send(self.client.get(self.url(segments))).await?;
        response
            .json()
            .await
            .map_err(|e| ClientError::Decode(format!("failed to parse response: {e}")))
    }

    /// Send and discard the body. Mutations answer with free text.
    async fn execute(&self, request: RequestBuilder) -> Result<(), ClientError> {
        self.send(request).await.map(|_| ())
    }

    async fn handle_error(&self, response: Response) -> ClientError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        let message = serde_json::from_str::<ApiErrorResponse>(&body)
            .ok()
            .and_then(|e| e.error.or(e.message))
            .unwrap_or_else(|| {
                if body.trim().is_empty() {
                    format!("HTTP {status}")
                } else {
                    body.trim().to_string()
                }
            });

        ClientError::api(status, message)
    }
}

/// Error body shape, when the server sends JSON.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, serde::Serialize)]
struct SeqBody {
    seq: i32,
}

#[async_trait]
impl Backend for ApiClient {
    async fn list_raids(&self) -> Result<Vec<Raid>, ClientError> {
        let raids: Vec<WireRaid> = self.get(&["raid"]).await?;
        let mut raids: Vec<Raid> = raids.into_iter().map(Raid::from).collect();
        raids.sort_by_key(|r| r.seq);
        Ok(raids)
    }

    async fn create_raid(&self, name: &str, seq: Option<i32>) -> Result<(), ClientError> {
        let body = WireRaid {
            name: name.to_string(),
            seq,
        };
        self.execute(self.client.post(self.url(&["raid"])).json(&body))
            .await
    }

    async fn delete_raid(&self, name: &str) -> Result<(), ClientError> {
        self.execute(self.client.delete(self.url(&["raid", name])))
            .await
    }

    async fn reorder_raids(&self, order: &[RaidOrder]) -> Result<(), ClientError> {
        let body: Vec<WireRaidOrder> = order.iter().map(WireRaidOrder::from).collect();
        self.execute(self.client.put(self.url(&["raid", "order"])).json(&body))
            .await
    }

    async fn reorder_raid(&self, order: &RaidOrder) -> Result<(), ClientError> {
        let body = SeqBody { seq: order.seq };
        self.execute(
            self.client
                .put(self.url(&["raid", &order.name, "order"]))
                .json(&body),
        )
        .await
    }

    async fn list_characters(&self) -> Result<Vec<Character>, ClientError> {
        let characters: Vec<WireCharacter> = self.get(&["charactors"]).await?;
        Ok(characters.into_iter().map(Character::from).collect())
    }

    async fn create_character(&self, character: &Character) -> Result<(), ClientError> {
        let body = WireCharacter::from(character);
        self.execute(self.client.post(self.url(&["charactors"])).json(&body))
            .await
    }

    async fn update_character(&self, character: &Character) -> Result<(), ClientError> {
        let body = WireCharacter::from(character);
        self.execute(
            self.client
                .put(self.url(&["charactors", &character.name]))
                .json(&body),
        )
        .await
    }

    async fn delete_character(&self, name: &str) -> Result<(), ClientError> {
        self.execute(self.client.delete(self.url(&["charactors", name])))
            .await
    }

    async fn upsert_characters(&self, characters: &[Character]) -> Result<(), ClientError> {
        let body: Vec<WireCharacter> = characters.iter().map(WireCharacter::from).collect();
        self.execute(
            self.client
                .put(self.url(&["charactors", "batch"]))
                .json(&body),
        )
        .await
    }

    async fn list_schedules(&self) -> Result<Vec<ScheduleRecord>, ClientError> {
        let records: Vec<WireSchedule> = self.get(&["Schedule"]).await?;
        Ok(records.into_iter().map(ScheduleRecord::from).collect())
    }

    async fn create_schedule(&self, record: &ScheduleRecord) -> Result<(), ClientError> {
        let body = WireSchedule::from(record);
        self.execute(self.client.post(self.url(&["Schedule"])).json(&body))
            .await
    }

    async fn save_schedules(&self, snapshot: &ScheduleSnapshot) -> Result<(), ClientError> {
        let body = WireScheduleBatch::from(snapshot);
        self.execute(
            self.client
                .post(self.url(&["Schedule", "batch"]))
                .json(&body),
        )
        .await
    }

    async fn delete_schedules(&self, key: &CellKey) -> Result<(), ClientError> {
        self.execute(
            self.client
                .delete(self.url(&["Schedule", "party", &key.party, "raid", &key.raid])),
        )
        .await
    }

    async fn list_users(&self) -> Result<Vec<User>, ClientError> {
        let users: Vec<WireUser> = self.get(&["User"]).await?;
        Ok(users.into_iter().map(User::from).collect())
    }

    async fn create_user(&self, user: &User) -> Result<(), ClientError> {
        let body = WireUser::from(user);
        self.execute(self.client.post(self.url(&["User"])).json(&body))
            .await
    }

    async fn update_user(&self, user: &User) -> Result<(), ClientError> {
        let body = WireUser::from(user);
        self.execute(self.client.put(self.url(&["User", &user.name])).json(&body))
            .await
    }

    async fn delete_user(&self, name: &str) -> Result<(), ClientError> {
        self.execute(self.client.delete(self.url(&["User", name])))
            .await
    }

    async fn list_user_schedules(&self) -> Result<Vec<UserScheduleChange>, ClientError> {
        let records: Vec<WireUserSchedule> = self.get(&["user_schedule"]).await?;
        records
            .into_iter()
            .map(UserScheduleChange::try_from)
            .collect()
    }

    async fn upsert_user_schedule(&self, change: &UserScheduleChange) -> Result<(), ClientError> {
        let body = WireUserSchedule::from(change);
        self.execute(self.client.post(self.url(&["user_schedule"])).json(&body))
            .await
    }

    async fn save_user_schedules(&self, changes: &[UserScheduleChange]) -> Result<(), ClientError> {
        let body: Vec<WireUserSchedule> = changes.iter().map(WireUserSchedule::from).collect();
        self.execute(
            self.client
                .post(self.url(&["user_schedule", "batch"]))
                .json(&body),
        )
        .await
    }

    async fn advance_week(&self) -> Result<(), ClientError> {
        self.execute(
            self.client
                .post(self.url(&["user_schedule", "advance-week"])),
        )
        .await
    }

    async fn last_updated(&self) -> Result<ServerTimestamp, ClientError> {
        let response = self
            .send(self.client.get(self.url(&["last-updated"])))
            .await?;
        let body = response.text().await?;
        wire::parse_last_updated(&body)
    }

    async fn subscribe(&self) -> Result<EventStream, ClientError> {
        let url = self.url(&["events", "updates"]);
        debug!(url = %url, "opening push channel");

        let response = self
            .client
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(self.handle_error(response).await);
        }

        let mut decoder = SseDecoder::new();
        let events = response
            .bytes_stream()
            .map(move |chunk| -> Vec<Result<SyncEvent, ClientError>> {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => return vec![Err(ClientError::Stream(e.to_string()))],
                };
                let frames = match decoder.push(&bytes) {
                    Ok(frames) => frames,
                    Err(e) => {
                        warn!(error = %e, "dropping undecodable push data");
                        return Vec::new();
                    }
                };
                frames
                    .iter()
                    .filter_map(|frame| match SyncEvent::from_frame(frame) {
                        Ok(Some(event)) => Some(Ok(event)),
                        Ok(None) => {
                            trace!(event = frame.event_name(), "ignoring unknown push event");
                            None
                        }
                        Err(e) => {
                            warn!(event = frame.event_name(), error = %e, "malformed push event");
                            None
                        }
                    })
                    .collect()
            })
            .flat_map(futures_util::stream::iter);

        Ok(events.boxed())
    }
}
