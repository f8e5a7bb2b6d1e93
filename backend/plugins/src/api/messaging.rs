//! Messaging API: lets a context talk to the other components of its own
//! plugin. The host stamps `pluginId` and `source`.

use plugdock_core::{HostError, HostResult, MessageTarget, PluginMessage};
use serde::Serialize;
use serde_json::Value;

use super::{boundary, CapabilityApi};

pub struct MessagingApi<'a> {
    api: &'a CapabilityApi,
}

impl<'a> MessagingApi<'a> {
    pub(super) fn new(api: &'a CapabilityApi) -> Self {
        Self { api }
    }

    /// Returns the number of components the message reached.
    pub async fn send<T: Serialize + ?Sized>(
        &self,
        target: MessageTarget,
        topic: &str,
        payload: &T,
    ) -> HostResult<usize> {
        let plugin_id = self.api.plugin_id();
        if !self.api.is_approved() {
            return Err(HostError::NotApproved(plugin_id.to_string()));
        }
        let payload: Value = boundary::transfer(payload)?;
        let message = PluginMessage::new(plugin_id, self.api.component(), target, topic, payload);
        Ok(self.api.bus().send(message).await?)
    }
}
