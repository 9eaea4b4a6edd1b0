//! The chat platform, as seen from the bot: private channels, channel messages and direct
//! messages. Production talks to a relay over HTTP; tests use [`testing::RecordingGateway`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::view::Reply;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// The channel or user no longer exists on the platform.
    #[error("Unable to find {0}")]
    NotFound(String),
    /// A server resource the bot relies on (category, role) is missing.
    #[error("Missing platform resource: {0}")]
    MissingResource(String),
    #[error("chat platform request failed: {0}")]
    Transport(String),
}

#[async_trait]
pub trait Gateway: Send + Sync {
    /// Creates a channel under `category` that only `owner_discord_id` (and the bot) can see.
    /// Returns the new channel's id.
    async fn create_private_channel(
        &self,
        name: &str,
        category: &str,
        owner_discord_id: &str,
    ) -> Result<String, GatewayError>;

    async fn delete_channel(&self, channel_id: &str, reason: &str) -> Result<(), GatewayError>;

    async fn send_message(&self, channel_id: &str, reply: &Reply) -> Result<(), GatewayError>;

    async fn send_direct_message(
        &self,
        discord_user_id: &str,
        reply: &Reply,
    ) -> Result<(), GatewayError>;
}

#[derive(Serialize)]
struct CreateChannel<'a> {
    name: &'a str,
    category: &'a str,
    owner: &'a str,
}

#[derive(Deserialize)]
struct CreatedChannel {
    id: String,
}

#[derive(Serialize)]
struct DeleteChannel<'a> {
    reason: &'a str,
}

/// Talks to the platform through an HTTP relay that owns the actual bot connection.
pub struct RelayGateway {
    client: Client,
    base_url: String,
}

impl RelayGateway {
    pub fn new(base_url: &str) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(RelayGateway {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(
        response: Result<reqwest::Response, reqwest::Error>,
        what: &str,
    ) -> Result<reqwest::Response, GatewayError> {
        let response = response.map_err(|e| GatewayError::Transport(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            debug!(%status, what, "relay request succeeded");
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        warn!(%status, what, body = %body, "relay request failed");
        Err(match status {
            StatusCode::NOT_FOUND => GatewayError::NotFound(what.to_string()),
            StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
                GatewayError::MissingResource(body.chars().take(200).collect())
            }
            _ => GatewayError::Transport(format!("HTTP {status} for {what}")),
        })
    }
}

#[async_trait]
impl Gateway for RelayGateway {
    async fn create_private_channel(
        &self,
        name: &str,
        category: &str,
        owner_discord_id: &str,
    ) -> Result<String, GatewayError> {
        let response = self
            .client
            .post(self.url("/channels"))
            .json(&CreateChannel {
                name,
                category,
                owner: owner_discord_id,
            })
            .send()
            .await;
        let created: CreatedChannel = Self::check(response, "channel category")
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(created.id)
    }

    async fn delete_channel(&self, channel_id: &str, reason: &str) -> Result<(), GatewayError> {
        let response = self
            .client
            .delete(self.url(&format!("/channels/{channel_id}")))
            .json(&DeleteChannel { reason })
            .send()
            .await;
        Self::check(response, &format!("channel {channel_id}")).await?;
        Ok(())
    }

    async fn send_message(&self, channel_id: &str, reply: &Reply) -> Result<(), GatewayError> {
        let response = self
            .client
            .post(self.url(&format!("/channels/{channel_id}/messages")))
            .json(reply)
            .send()
            .await;
        Self::check(response, &format!("channel {channel_id}")).await?;
        Ok(())
    }

    async fn send_direct_message(
        &self,
        discord_user_id: &str,
        reply: &Reply,
    ) -> Result<(), GatewayError> {
        let response = self
            .client
            .post(self.url(&format!("/users/{discord_user_id}/messages")))
            .json(reply)
            .send()
            .await;
        Self::check(response, &format!("user {discord_user_id}")).await?;
        Ok(())
    }
}

#[cfg(test)]
pub mod testing {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        CreateChannel {
            name: String,
            category: String,
            owner: String,
            id: String,
        },
        DeleteChannel {
            channel_id: String,
        },
        Message {
            channel_id: String,
            reply: Reply,
        },
        DirectMessage {
            user_id: String,
            reply: Reply,
        },
    }

    /// Records every call. Channels get sequential ids starting at 1000.
    #[derive(Default)]
    pub struct RecordingGateway {
        calls: Mutex<Vec<Call>>,
        next_channel: Mutex<u64>,
        missing: Mutex<HashSet<String>>,
    }

    impl RecordingGateway {
        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        /// Makes every later call that targets `channel_id` fail with `NotFound`.
        pub fn mark_missing(&self, channel_id: &str) {
            self.missing.lock().unwrap().insert(channel_id.to_string());
        }

        pub fn messages_to(&self, channel_id: &str) -> Vec<Reply> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    Call::Message { channel_id: c, reply } if c == channel_id => Some(reply),
                    _ => None,
                })
                .collect()
        }

        pub fn direct_messages_to(&self, user_id: &str) -> Vec<Reply> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    Call::DirectMessage { user_id: u, reply } if u == user_id => Some(reply),
                    _ => None,
                })
                .collect()
        }

        pub fn deleted_channels(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    Call::DeleteChannel { channel_id } => Some(channel_id),
                    _ => None,
                })
                .collect()
        }

        fn ensure_present(&self, channel_id: &str) -> Result<(), GatewayError> {
            if self.missing.lock().unwrap().contains(channel_id) {
                Err(GatewayError::NotFound(format!("channel {channel_id}")))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl Gateway for RecordingGateway {
        async fn create_private_channel(
            &self,
            name: &str,
            category: &str,
            owner_discord_id: &str,
        ) -> Result<String, GatewayError> {
            let id = {
                let mut next = self.next_channel.lock().unwrap();
                *next += 1;
                (999 + *next).to_string()
            };
            self.calls.lock().unwrap().push(Call::CreateChannel {
                name: name.to_string(),
                category: category.to_string(),
                owner: owner_discord_id.to_string(),
                id: id.clone(),
            });
            Ok(id)
        }

        async fn delete_channel(&self, channel_id: &str, _reason: &str) -> Result<(), GatewayError> {
            self.ensure_present(channel_id)?;
            self.calls.lock().unwrap().push(Call::DeleteChannel {
                channel_id: channel_id.to_string(),
            });
            Ok(())
        }

        async fn send_message(&self, channel_id: &str, reply: &Reply) -> Result<(), GatewayError> {
            self.ensure_present(channel_id)?;
            self.calls.lock().unwrap().push(Call::Message {
                channel_id: channel_id.to_string(),
                reply: reply.clone(),
            });
            Ok(())
        }

        async fn send_direct_message(
            &self,
            discord_user_id: &str,
            reply: &Reply,
        ) -> Result<(), GatewayError> {
            self.calls.lock().unwrap().push(Call::DirectMessage {
                user_id: discord_user_id.to_string(),
                reply: reply.clone(),
            });
            Ok(())
        }
    }
}
