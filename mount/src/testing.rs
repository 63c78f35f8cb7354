//! In-memory mount link for unit tests

use crate::client::MountLink;
use crate::error::MountResult;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Link answering by longest matching command prefix
pub(crate) struct ScriptedLink {
    replies: Mutex<HashMap<String, String>>,
    sent: Mutex<Vec<String>>,
}

impl ScriptedLink {
    pub(crate) fn new(replies: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(
                replies
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn set_reply(&self, command: &str, reply: &str) {
        self.replies
            .lock()
            .unwrap()
            .insert(command.to_string(), reply.to_string());
    }

    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MountLink for ScriptedLink {
    async fn send_command(&self, command: &str) -> MountResult<String> {
        self.sent.lock().unwrap().push(command.to_string());
        let replies = self.replies.lock().unwrap();
        let reply = replies
            .iter()
            .filter(|(k, _)| command.starts_with(k.as_str()))
            .max_by_key(|(k, _)| k.len())
            .map(|(_, v)| v.clone())
            .unwrap_or_default();
        Ok(reply)
    }

    fn is_connected(&self) -> bool {
        true
    }
}
