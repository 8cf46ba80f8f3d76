//! Master side of the discovery protocol.
//!
//! Each subscription spawns one task looping over the bus receiver
//! rather than polling centrally, the same way one task is dedicated
//! per accepted connection elsewhere in this crate.

use std::sync::Arc;

use crate::bus::BusClient;
use crate::discovery::{add_member_subject, register_subject, unregister_subject};
use crate::error::CherryError;
use crate::member::{Member, MemberRegistry};

pub struct DiscoveryMaster {
    node_id: String,
    members: Arc<MemberRegistry>,
    bus: Arc<dyn BusClient>,
}

impl DiscoveryMaster {
    pub fn new(node_id: impl Into<String>, members: Arc<MemberRegistry>, bus: Arc<dyn BusClient>) -> Self {
        Self {
            node_id: node_id.into(),
            members,
            bus,
        }
    }

    /// Joins the cluster as master. Returns once the
    /// master has added itself and both subscriptions are live; the
    /// subscription loops themselves run detached for the facade's
    /// lifetime.
    pub async fn start(&self, self_member: Member) -> Result<(), CherryError> {
        // Open question — duplicate master: a second self-declared master
        // publishing on the same `<masterId>.register` subject is
        // rejected here the same way any conflicting member add is,
        // because both masters add themselves under the same node id.
        self.members.add(self_member)?;

        let register_subject = register_subject(&self.node_id);
        let mut register_rx = self.bus.subscribe(&register_subject).await?;
        let members = Arc::clone(&self.members);
        let bus = Arc::clone(&self.bus);
        let master_node_id = self.node_id.clone();
        let add_member_subject = add_member_subject(&self.node_id);
        tokio::spawn(async move {
            while let Some(message) = register_rx.recv().await {
                let incoming: Member = match serde_json::from_slice(&message.payload) {
                    Ok(m) => m,
                    Err(e) => {
                        log::warn!("discovery master: malformed register payload: {e}");
                        continue;
                    }
                };

                if let Err(e) = members.add(incoming.clone()) {
                    log::warn!("discovery master: rejecting register for '{}': {e}", incoming.node_id);
                    continue;
                }

                let reply_list: Vec<Member> = members
                    .snapshot()
                    .into_iter()
                    .filter(|m| m.node_id != incoming.node_id && m.node_id != master_node_id)
                    .collect();

                if let Some(reply_to) = &message.reply_to {
                    match serde_json::to_vec(&reply_list) {
                        Ok(bytes) => {
                            let _ = bus.publish(reply_to, bytes).await;
                        }
                        Err(e) => log::warn!("discovery master: failed to marshal register reply: {e}"),
                    }
                }

                if let Ok(bytes) = serde_json::to_vec(&incoming) {
                    let _ = bus.publish(&add_member_subject, bytes).await;
                }
            }
        });

        let unregister_subject = unregister_subject(&self.node_id);
        let mut unregister_rx = self.bus.subscribe(&unregister_subject).await?;
        let members = Arc::clone(&self.members);
        tokio::spawn(async move {
            while let Some(message) = unregister_rx.recv().await {
                // Open question — unregister of master: the source allows
                // any node to unregister any id, including the master's
                // own; that denial-of-service vector is preserved here
                // and only flagged via this warning.
                match serde_json::from_slice::<String>(&message.payload) {
                    Ok(node_id) => {
                        log::warn!("discovery master: unregistering '{node_id}'");
                        members.remove(&node_id);
                    }
                    Err(e) => log::warn!("discovery master: malformed unregister payload: {e}"),
                }
            }
        });

        Ok(())
    }
}
