use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("channel {0} is not reachable")]
    ChannelUnavailable(u64),
    #[error("role {0} could not be changed")]
    RoleChange(u64),
    #[error("message {0} could not be pinned")]
    Pin(u64),
}

/// One message pulled back out of a channel's history, reduced to what
/// participation scanning needs.
#[derive(Debug, Clone)]
pub struct HistoryMessage {
    pub author_id: u64,
    pub message_id: u64,
    pub timestamp: DateTime<Utc>,
    /// Authored by the bot itself (reset notices and the like).
    pub from_bot: bool,
    /// Carries a moderator veto reaction; skipped during scans.
    pub vetoed: bool,
}

/// Content of the weekly reset announcement posted into the squad channel.
#[derive(Debug, Clone)]
pub struct ResetNotice {
    pub channel_id: u64,
    pub headline: String,
    pub body: String,
}

/// Everything the squad logic needs from the chat platform. Handlers take
/// this as a trait object so tests can substitute a recording fake.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Channel messages newer than `since`, oldest first.
    async fn read_channel_history(
        &self,
        channel_id: u64,
        since: DateTime<Utc>,
    ) -> Result<Vec<HistoryMessage>, GatewayError>;

    /// Posts the reset announcement and returns the new message id.
    async fn post_reset_notice(&self, notice: &ResetNotice) -> Result<u64, GatewayError>;

    async fn pin_message(&self, channel_id: u64, message_id: u64) -> Result<(), GatewayError>;

    async fn unpin_message(&self, channel_id: u64, message_id: u64) -> Result<(), GatewayError>;

    async fn grant_role(&self, member_id: u64, role_id: u64) -> Result<(), GatewayError>;

    async fn revoke_role(&self, member_id: u64, role_id: u64) -> Result<(), GatewayError>;

    /// Members currently holding the given role.
    async fn role_members(&self, role_id: u64) -> Result<Vec<u64>, GatewayError>;
}

/// Placeholder chat client. Logs every interaction and fabricates ids so the
/// rest of the service can run end to end without a live connection.
pub struct ChatClient {
    next_message_id: AtomicU64,
}

impl ChatClient {
    pub fn new() -> Arc<Self> {
        info!("Initializing chat client");
        Arc::new(Self {
            next_message_id: AtomicU64::new(1),
        })
    }
}

#[async_trait]
impl ChatGateway for ChatClient {
    async fn read_channel_history(
        &self,
        channel_id: u64,
        since: DateTime<Utc>,
    ) -> Result<Vec<HistoryMessage>, GatewayError> {
        debug!("History read channel={} since={}", channel_id, since);
        Ok(Vec::new())
    }

    async fn post_reset_notice(&self, notice: &ResetNotice) -> Result<u64, GatewayError> {
        let id = self.next_message_id.fetch_add(1, Ordering::Relaxed);
        info!(
            "Posting reset notice to channel {}: {}",
            notice.channel_id, notice.headline
        );
        Ok(id)
    }

    async fn pin_message(&self, channel_id: u64, message_id: u64) -> Result<(), GatewayError> {
        info!("Pinning message {} in channel {}", message_id, channel_id);
        Ok(())
    }

    async fn unpin_message(&self, channel_id: u64, message_id: u64) -> Result<(), GatewayError> {
        info!("Unpinning message {} in channel {}", message_id, channel_id);
        Ok(())
    }

    async fn grant_role(&self, member_id: u64, role_id: u64) -> Result<(), GatewayError> {
        info!("Granting role {} to member {}", role_id, member_id);
        Ok(())
    }

    async fn revoke_role(&self, member_id: u64, role_id: u64) -> Result<(), GatewayError> {
        info!("Revoking role {} from member {}", role_id, member_id);
        Ok(())
    }

    async fn role_members(&self, role_id: u64) -> Result<Vec<u64>, GatewayError> {
        debug!("Listing members of role {}", role_id);
        Ok(Vec::new())
    }
}
