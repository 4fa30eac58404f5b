use crate::core::manifest::Manifest;
use crate::utils::TailpackError;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Messages pushed to connected browsers over the live-reload socket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HmrMessage {
    Connected { generation: u64 },
    /// Swap stylesheet links in place, no navigation
    CssUpdate { updates: Vec<CssUpdate> },
    FullReload { reason: String },
    Error {
        message: String,
        file: Option<String>,
    },
    /// Build is healthy again; clears the overlay
    Ok { generation: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CssUpdate {
    pub name: String,
    pub previous_url: Option<String>,
    pub url: String,
}

impl HmrMessage {
    pub fn from_error(err: &TailpackError) -> Self {
        HmrMessage::Error {
            message: err.to_string(),
            file: err.file().map(|f| f.display().to_string()),
        }
    }

    /// What connected clients must do to move from `previous` to `next`.
    pub fn for_update(previous: &Manifest, next: &Manifest, public_path: &str) -> Option<Self> {
        let changed = next.changed_since(previous);
        if changed.is_empty() {
            return None;
        }

        if let Some(script) = changed.iter().find(|name| !name.ends_with(".css")) {
            return Some(HmrMessage::FullReload {
                reason: format!("{} changed", script),
            });
        }

        let updates: Vec<CssUpdate> = changed
            .iter()
            .filter_map(|name| {
                Some(CssUpdate {
                    name: name.clone(),
                    previous_url: previous.url_for(name, public_path),
                    url: next.url_for(name, public_path)?,
                })
            })
            .collect();

        // Only removed stylesheets: a reload drops their links
        if updates.is_empty() {
            return Some(HmrMessage::FullReload {
                reason: "stylesheet removed".to_string(),
            });
        }

        Some(HmrMessage::CssUpdate { updates })
    }
}

/// Fan-out of live-reload messages to every websocket task
#[derive(Clone)]
pub struct HmrBroadcaster {
    sender: broadcast::Sender<HmrMessage>,
}

impl HmrBroadcaster {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HmrMessage> {
        self.sender.subscribe()
    }

    /// Returns how many clients received the message.
    pub fn send(&self, message: HmrMessage) -> usize {
        // No connected clients is not an error
        self.sender.send(message).unwrap_or(0)
    }
}

impl Default for HmrBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
