use serde::{Deserialize, Serialize};

/// Discord application ID used for the RPC handshake. The default points
/// at the stock "Apple Music" application; supply your own to customize
/// the presence name and assets.
const DEFAULT_CLIENT_ID: &str = "1373525022819225601";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DiscordConfig {
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Pin the IPC socket index (discord-ipc-N). When unset, indexes
    /// 0..=9 are tried in order.
    #[serde(default)]
    pub pipe: Option<u8>,
}

fn default_client_id() -> String {
    DEFAULT_CLIENT_ID.to_string()
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
            pipe: None,
        }
    }
}
