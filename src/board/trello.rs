//! Trello board client over the REST API.
//!
//! Key and token travel as query parameters on every call, as Trello
//! expects. A client is bound to one set of credentials; the connector
//! builds one per run.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::error::BoardError;
use crate::pipeline::types::{BoardClient, BoardConnector, BoardCredentials, CardRef, Priority};

pub const DEFAULT_BASE_URL: &str = "https://api.trello.com";

/// Any Trello object we only need the id and name of.
#[derive(Debug, Deserialize)]
struct Named {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct Card {
    id: String,
    name: String,
    #[serde(default, rename = "shortUrl")]
    short_url: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// Trello client bound to one key/token pair.
pub struct TrelloClient {
    client: Client,
    base_url: String,
    api_key: SecretString,
    token: SecretString,
}

impl TrelloClient {
    pub fn new(client: Client, base_url: impl Into<String>, credentials: &BoardCredentials) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: credentials.board_api_key.clone(),
            token: credentials.board_token.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/1/{}", self.base_url, path)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.query(&[
            ("key", self.api_key.expose_secret()),
            ("token", self.token.expose_secret()),
        ])
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, BoardError> {
        let response = self
            .authed(builder)
            .send()
            .await
            .map_err(|e| BoardError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BoardError::Api {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| BoardError::Decode(e.to_string()))
    }

    async fn find_board(&self, name: &str) -> Result<Option<String>, BoardError> {
        let boards: Vec<Named> = self
            .send(
                self.client
                    .get(self.url("members/me/boards"))
                    .query(&[("fields", "name")]),
            )
            .await?;
        Ok(boards.into_iter().find(|b| b.name == name).map(|b| b.id))
    }

    async fn create_board(&self, name: &str) -> Result<String, BoardError> {
        let board: Named = self
            .send(
                self.client
                    .post(self.url("boards"))
                    .query(&[("name", name), ("defaultLists", "false")]),
            )
            .await?;
        Ok(board.id)
    }
}

#[async_trait]
impl BoardClient for TrelloClient {
    async fn ensure_destination(
        &self,
        board_id: Option<&str>,
        board_name: Option<&str>,
    ) -> Result<String, BoardError> {
        if let Some(id) = board_id.filter(|id| !id.trim().is_empty()) {
            debug!(board_id = id, "Using provided board id");
            return Ok(id.to_string());
        }

        let name = board_name
            .filter(|n| !n.trim().is_empty())
            .ok_or(BoardError::MissingDestination)?;

        if let Some(id) = self.find_board(name).await? {
            debug!(board_name = name, board_id = %id, "Found board");
            return Ok(id);
        }

        let id = self.create_board(name).await?;
        info!(board_name = name, board_id = %id, "Created board");
        Ok(id)
    }

    async fn ensure_list(&self, board_id: &str, list_name: &str) -> Result<String, BoardError> {
        let lists: Vec<Named> = self
            .send(self.client.get(self.url(&format!("boards/{board_id}/lists"))))
            .await?;

        if let Some(list) = lists.into_iter().find(|l| l.name == list_name) {
            debug!(list_name, list_id = %list.id, "Found list");
            return Ok(list.id);
        }

        let list: Named = self
            .send(
                self.client
                    .post(self.url("lists"))
                    .query(&[("name", list_name), ("idBoard", board_id)]),
            )
            .await?;
        info!(list_name, list_id = %list.id, "Created list");
        Ok(list.id)
    }

    async fn create_card(
        &self,
        list_id: &str,
        title: &str,
        priority: Priority,
        description: &str,
    ) -> Result<CardRef, BoardError> {
        let name = card_name(priority, title);
        let mut params = vec![("idList", list_id), ("name", name.as_str())];
        if !description.is_empty() {
            params.push(("desc", description));
        }

        let card: Card = self
            .send(self.client.post(self.url("cards")).query(&params))
            .await?;

        Ok(CardRef {
            id: card.id,
            name: card.name,
            url: card.short_url.or(card.url),
        })
    }
}

/// Card title with its priority tag.
pub fn card_name(priority: Priority, title: &str) -> String {
    format!("[{priority}] {title}")
}

/// Builds `TrelloClient`s that share one HTTP connection pool.
#[derive(Clone)]
pub struct TrelloConnector {
    client: Client,
    base_url: String,
}

impl TrelloConnector {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }
}

impl Default for TrelloConnector {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl BoardConnector for TrelloConnector {
    fn connect(&self, credentials: &BoardCredentials) -> Arc<dyn BoardClient> {
        Arc::new(TrelloClient::new(
            self.client.clone(),
            self.base_url.clone(),
            credentials,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_client() -> TrelloClient {
        // Nothing listens on port 1; any network call fails with a Request error.
        TrelloClient::new(
            Client::new(),
            "http://127.0.0.1:1/",
            &BoardCredentials::new("k", "t"),
        )
    }

    #[test]
    fn card_name_prefixes_priority() {
        assert_eq!(
            card_name(Priority::High, "[Bug Report] Crash on login"),
            "[High] [Bug Report] Crash on login"
        );
    }

    #[test]
    fn url_trims_trailing_slash() {
        assert_eq!(unreachable_client().url("cards"), "http://127.0.0.1:1/1/cards");
    }

    #[tokio::test]
    async fn explicit_board_id_skips_network() {
        let client = unreachable_client();
        let id = client
            .ensure_destination(Some("b-123"), Some("Ignored"))
            .await
            .unwrap();
        assert_eq!(id, "b-123");
    }

    #[tokio::test]
    async fn missing_destination_is_reported() {
        let client = unreachable_client();
        let err = client.ensure_destination(None, Some("  ")).await.unwrap_err();
        assert!(matches!(err, BoardError::MissingDestination));
        assert!(!err.is_recoverable());
    }

    #[tokio::test]
    async fn network_failure_is_recoverable() {
        let client = unreachable_client();
        let err = client.ensure_destination(None, Some("Board")).await.unwrap_err();
        assert!(matches!(err, BoardError::Request(_)));
        assert!(err.is_recoverable());
    }
}
