//! Scan controller and subscription pipeline (§4.H).

pub mod controller;
pub mod subscription;

pub use controller::ScanController;
pub use subscription::{subscription_key, ProtocolProbe, SubscriptionRegistry};
