//! Client side of the discovery protocol.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::bus::BusClient;
use crate::discovery::{add_member_subject, register_subject, unregister_subject};
use crate::error::{CherryError, ErrorCode};
use crate::member::{Member, MemberRegistry};

pub struct DiscoveryClient {
    node_id: String,
    master_node_id: String,
    members: Arc<MemberRegistry>,
    bus: Arc<dyn BusClient>,
    ready: Arc<AtomicBool>,
}

impl DiscoveryClient {
    pub fn new(node_id: impl Into<String>, master_node_id: impl Into<String>, members: Arc<MemberRegistry>, bus: Arc<dyn BusClient>) -> Self {
        Self {
            node_id: node_id.into(),
            master_node_id: master_node_id.into(),
            members,
            bus,
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Joins the cluster: subscriptions for `addMember`/`unregister` are
    /// opened before the blocking `register`
    /// request so broadcasts that arrive during the request/reply window
    /// are reconciled idempotently rather than missed.
    pub async fn start(&self, self_member: Member) -> Result<(), CherryError> {
        let add_member_subject = add_member_subject(&self.master_node_id);
        let mut add_member_rx = self.bus.subscribe(&add_member_subject).await?;
        let members = Arc::clone(&self.members);
        tokio::spawn(async move {
            while let Some(message) = add_member_rx.recv().await {
                match serde_json::from_slice::<Member>(&message.payload) {
                    Ok(member) => {
                        if !members.contains(&member.node_id) {
                            if let Err(e) = members.add(member) {
                                log::warn!("discovery client: rejected addMember broadcast: {e}");
                            }
                        }
                    }
                    Err(e) => log::warn!("discovery client: malformed addMember payload: {e}"),
                }
            }
        });

        let unregister_subject = unregister_subject(&self.master_node_id);
        let mut unregister_rx = self.bus.subscribe(&unregister_subject).await?;
        let members = Arc::clone(&self.members);
        let local_node_id = self.node_id.clone();
        tokio::spawn(async move {
            while let Some(message) = unregister_rx.recv().await {
                match serde_json::from_slice::<String>(&message.payload) {
                    Ok(node_id) if node_id != local_node_id => members.remove(&node_id),
                    Ok(_) => {}
                    Err(e) => log::warn!("discovery client: malformed unregister payload: {e}"),
                }
            }
        });

        let register_subject = register_subject(&self.master_node_id);
        let payload = serde_json::to_vec(&self_member).map_err(|e| CherryError::with_source(ErrorCode::MarshalError, e))?;

        let initial_members = loop {
            match self.bus.request(&register_subject, payload.clone(), self.bus.reconnect_delay() * 10).await {
                Ok(bytes) => match serde_json::from_slice::<Vec<Member>>(&bytes) {
                    Ok(members) => break members,
                    Err(e) => {
                        log::warn!("discovery client: malformed register reply, retrying: {e}");
                        tokio::time::sleep(self.bus.reconnect_delay()).await;
                    }
                },
                Err(e) => {
                    log::warn!("discovery client: register attempt failed, retrying: {e}");
                    tokio::time::sleep(self.bus.reconnect_delay()).await;
                }
            }
        };

        for member in initial_members {
            if !self.members.contains(&member.node_id) {
                self.members.add(member)?;
            }
        }

        self.ready.store(true, Ordering::Release);
        Ok(())
    }

    /// Step 5: publish `unregister` with the local id. The caller is
    /// still responsible for closing the bus client afterward.
    pub async fn shutdown(&self) {
        let subject = unregister_subject(&self.master_node_id);
        if let Ok(payload) = serde_json::to_vec(&self.node_id) {
            let _ = self.bus.publish(&subject, payload).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::memory::InMemoryBus;
    use crate::discovery::master::DiscoveryMaster;

    #[tokio::test]
    async fn client_converges_with_master() {
        let bus: Arc<dyn BusClient> = Arc::new(InMemoryBus::new());

        let master_members = Arc::new(MemberRegistry::new());
        let master = DiscoveryMaster::new("m1", Arc::clone(&master_members), Arc::clone(&bus));
        master.start(Member::new("m1", "center", "addr-m1")).await.unwrap();

        let client_members = Arc::new(MemberRegistry::new());
        let client = DiscoveryClient::new("g1", "m1", Arc::clone(&client_members), Arc::clone(&bus));
        client.start(Member::new("g1", "gate", "addr-g1")).await.unwrap();

        assert!(client.is_ready());
        assert!(client_members.contains("m1"));
        assert!(master_members.contains("g1"));
    }

    #[tokio::test]
    async fn two_clients_converge_to_the_same_set() {
        let bus: Arc<dyn BusClient> = Arc::new(InMemoryBus::new());

        let master_members = Arc::new(MemberRegistry::new());
        let master = DiscoveryMaster::new("m1", Arc::clone(&master_members), Arc::clone(&bus));
        master.start(Member::new("m1", "center", "addr-m1")).await.unwrap();

        let g1_members = Arc::new(MemberRegistry::new());
        let g1 = DiscoveryClient::new("g1", "m1", Arc::clone(&g1_members), Arc::clone(&bus));
        g1.start(Member::new("g1", "gate", "addr-g1")).await.unwrap();

        let g2_members = Arc::new(MemberRegistry::new());
        let g2 = DiscoveryClient::new("g2", "m1", Arc::clone(&g2_members), Arc::clone(&bus));
        g2.start(Member::new("g2", "gate", "addr-g2")).await.unwrap();

        // allow g1's addMember subscription to observe g2's broadcast
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(master_members.len(), 3);
        assert!(g1_members.contains("g2"));
        assert_eq!(g1_members.len(), g2_members.len());
    }
}
