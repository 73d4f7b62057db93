pub mod api;
pub mod client;
pub mod memory;
pub mod quantity;
pub mod types;

pub use api::{EventApi, EventSnapshot, EventStream, KubeApi, StreamEvent};
pub use client::{Credentials, K8sClient};
pub use memory::InMemoryCluster;
pub use types::PodInfo;
