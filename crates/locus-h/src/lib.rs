//! Chromium remote-debugging adapter for the locus engine.

pub mod backend;
pub mod cdp;
pub mod client;

pub use backend::{HeadlessSession, NavigationResult};
pub use cdp::CdpClient;
pub use client::ChromiumPage;
