//! shotdiff baseline server
//!
//! Persists accepted snapshots, compares incoming snapshots against them,
//! captures screenshot diffs through a headless browser and watches CI runs.

pub mod ci;
pub mod config;
pub mod resolve;
pub mod screenshot;
pub mod server;
pub mod store;

pub use ci::{CiOutcome, CiWatcher};
pub use config::{BrowserKind, ServerConfig};
pub use resolve::Resolver;
pub use screenshot::{BrowserLauncher, BrowserSession, CaptureService, PlaywrightLauncher};
pub use server::{router, serve, AppState};
pub use store::SnapshotStore;
