//! Service discovery using mDNS/DNS-SD
//!
//! Advertises the satellite's control server on the local network so a
//! pipeline server can find it without manual configuration

pub mod mdns;

pub use mdns::{MdnsAdvertiser, SERVICE_TYPE, ServiceAdvert};
