//! A small Rust client for NASA Earthdata's AppEEARS API.
//!
//! This crate implements the AppEEARS extraction flow:
//! validate a point or area request against a product catalog, submit it,
//! poll until the task finishes, then list and download the produced files.
//!
//! ## Quick start
//! - Configure credentials via environment variables (`APPEEARS_USER`, `APPEEARS_PASS`,
//!   optionally `APPEEARS_URL`) or an `.appeearsrc` file (supported in the current
//!   directory and in your home directory).
//! - Build a [`TaskSpec`] and call [`Client::retrieve`].
//!
//! ```no_run
//! use anyhow::Result;
//! use appeears::{Client, DateRange};
//!
//! fn main() -> Result<()> {
//!     let client = Client::from_env()?;
//!     let spec = client.submitter().point_spec(
//!         40.7128,
//!         -74.0060,
//!         "MOD11A1.061",
//!         &["LST_Day_1km"],
//!         DateRange::parse("01-01-2023", "01-31-2023")?,
//!     )?;
//!     let files = client.retrieve(&spec, std::path::Path::new("output"))?;
//!     println!("{} file(s) downloaded", files.len());
//!     client.logout()?;
//!     Ok(())
//! }
//! ```
//!
//! The pieces behind [`Client`] ([`TaskSubmitter`], [`TaskStatusPoller`],
//! [`FileLister`], [`TaskOrchestrator`]) can be used directly with any
//! [`Transport`]; the poller accepts a [`Clock`] and a [`CancellationToken`].

#![forbid(unsafe_code)]

mod catalog;
mod client;
mod config;
mod dates;
mod error;
mod files;
mod orchestrator;
mod poll;
pub mod raster;
mod session;
mod submit;
mod task;
mod transport;
mod util;

pub use catalog::{Band, Catalog, Product};
pub use client::Client;
pub use config::ClientConfig;
pub use dates::{DateRange, WIRE_DATE_FORMAT};
pub use error::{AuthError, Error, Result, ValidationError};
pub use files::{DownloadOutcome, Downloader, FileDescriptor, FileLister};
pub use orchestrator::{CompletedTask, OrchestrationError, Stage, TaskOrchestrator};
pub use poll::{
    CancellationToken, Clock, MIN_POLL_INTERVAL, NoProgress, PollPolicy, ProgressBarObserver,
    ProgressObserver, SystemClock, TaskStatusPoller, TerminalStatus,
};
pub use session::{CredentialCell, Session};
pub use submit::TaskSubmitter;
pub use task::{
    AreaGeometry, AreaTask, DEFAULT_PROJECTION, Layer, OutputFormat, PointTask, TaskHandle,
    TaskSpec, TaskStatus, resolve_layers,
};
pub use transport::{
    ApiRequest, ApiResponse, Auth, DEFAULT_BASE_URL, HttpTransport, Method, Transport,
    TransportError,
};
