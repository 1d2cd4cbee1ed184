//! Session Manager
//!
//! Tracks every live `SessionRegistry` keyed by channel and enforces the accept
//! limit. Channel lifecycle (notifications, handle release, timer cancellation)
//! is driven by the engine; this type only owns the registries.

use hashbrown::HashMap;

#[cfg(not(feature = "std"))]
use log::info;
#[cfg(feature = "std")]
use tracing::info;

use crate::errors::SessionError;
use crate::session::SessionRegistry;
use crate::transport::ChannelInfo;
use crate::types::{ChannelId, Timestamp};

#[derive(Debug)]
pub struct SessionManager {
    sessions: HashMap<ChannelId, SessionRegistry>,
    max_sessions: usize,
    detect_duplicate_keys: bool,
}

impl SessionManager {
    pub fn new(max_sessions: usize, detect_duplicate_keys: bool) -> Self {
        Self {
            sessions: HashMap::new(),
            max_sessions,
            detect_duplicate_keys,
        }
    }

    /// Create the registry for a newly accepted channel
    pub fn accept(
        &mut self,
        channel: ChannelId,
        info: ChannelInfo,
        now: Timestamp,
    ) -> Result<&mut SessionRegistry, SessionError> {
        if self.sessions.contains_key(&channel) {
            return Err(SessionError::SessionAlreadyExists { channel });
        }
        if self.sessions.len() >= self.max_sessions {
            return Err(SessionError::MaxSessionsReached {
                current: self.sessions.len(),
                max: self.max_sessions,
            });
        }

        info!("Accepted {} from {}:{}", channel, info.host, info.port);
        let session = SessionRegistry::new(channel, info, self.detect_duplicate_keys, now);
        Ok(self.sessions.entry(channel).or_insert(session))
    }

    pub fn remove(&mut self, channel: ChannelId) -> Option<SessionRegistry> {
        self.sessions.remove(&channel)
    }

    pub fn get(&self, channel: ChannelId) -> Option<&SessionRegistry> {
        self.sessions.get(&channel)
    }

    pub fn get_mut(&mut self, channel: ChannelId) -> Option<&mut SessionRegistry> {
        self.sessions.get_mut(&channel)
    }

    pub fn session(&self, channel: ChannelId) -> Result<&SessionRegistry, SessionError> {
        self.sessions
            .get(&channel)
            .ok_or(SessionError::SessionNotFound { channel })
    }

    pub fn session_mut(&mut self, channel: ChannelId) -> Result<&mut SessionRegistry, SessionError> {
        self.sessions
            .get_mut(&channel)
            .ok_or(SessionError::SessionNotFound { channel })
    }

    pub fn channels(&self) -> Vec<ChannelId> {
        let mut channels: Vec<ChannelId> = self.sessions.keys().copied().collect();
        channels.sort();
        channels
    }

    pub fn iter(&self) -> impl Iterator<Item = &SessionRegistry> {
        self.sessions.values()
    }

    pub fn connection_info(&self, channel: ChannelId) -> Option<&ChannelInfo> {
        self.sessions.get(&channel).map(SessionRegistry::info)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_limit() {
        let mut manager = SessionManager::new(1, true);
        manager
            .accept(ChannelId::new(1), ChannelInfo::default(), Timestamp::new(0))
            .expect("first");
        let err = manager
            .accept(ChannelId::new(2), ChannelInfo::default(), Timestamp::new(0))
            .unwrap_err();
        assert_eq!(err, SessionError::MaxSessionsReached { current: 1, max: 1 });
    }

    #[test]
    fn test_duplicate_channel_rejected() {
        let mut manager = SessionManager::new(4, true);
        manager
            .accept(ChannelId::new(1), ChannelInfo::default(), Timestamp::new(0))
            .expect("first");
        assert!(manager
            .accept(ChannelId::new(1), ChannelInfo::default(), Timestamp::new(0))
            .is_err());
        assert!(manager.remove(ChannelId::new(1)).is_some());
        assert!(manager.is_empty());
    }
}
