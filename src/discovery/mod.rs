//! The discovery protocol keeping every node's `MemberRegistry`
//! converged from one bootstrap master address and nothing else.

pub mod client;
pub mod master;

pub use client::DiscoveryClient;
pub use master::DiscoveryMaster;

fn register_subject(master_node_id: &str) -> String {
    format!("cherry.discovery.{master_node_id}.register")
}

fn add_member_subject(master_node_id: &str) -> String {
    format!("cherry.discovery.{master_node_id}.addMember")
}

fn unregister_subject(master_node_id: &str) -> String {
    format!("cherry.discovery.{master_node_id}.unregister")
}
