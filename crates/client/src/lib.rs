//! shotdiff scenario client
//!
//! Declares scenarios, schedules them for comparison against the baseline
//! server, merges the results and promotes accepted snapshots.
//!
//! ```no_run
//! use shotdiff_client::{DeepLink, HttpTransport, Registry, SyncEngine};
//! use shotdiff_common::ScenarioOptions;
//!
//! # async fn run() -> shotdiff_common::Result<()> {
//! let mut registry = Registry::new();
//! registry.context("Button", |scope| {
//!     scope.register("Primary", || "<button>Go</button>".to_string(), ScenarioOptions::default())?;
//!     Ok(())
//! })?;
//!
//! let transport = HttpTransport::new("http://127.0.0.1:5001", std::time::Duration::from_secs(30))?;
//! let engine = SyncEngine::new(transport).with_chunk_size(Some(20));
//! engine.resolve_all(&mut registry, &DeepLink::None).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod notify;
pub mod registry;
pub mod report;
pub mod scheduler;
pub mod sync;
pub mod tree;

pub use config::ClientConfig;
pub use notify::{MemoryNotifier, Notifier, WsNotifier};
pub use registry::{styled, ContextScope, Registry, RenderSource, Scenario};
pub use report::prepare_ci_report;
pub use scheduler::{schedule, DeepLink};
pub use sync::{merge, HttpTransport, SyncEngine, SyncTransport};
pub use tree::{filter_scenarios, sort_nodes, sort_scenarios, ContextTree, TreeNode};
