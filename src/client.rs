use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::catalog::Catalog;
use crate::config::load_config;
use crate::dates::DateRange;
use crate::error;
use crate::files::{Downloader, FileDescriptor, FileLister};
use crate::orchestrator::{OrchestrationError, TaskOrchestrator};
use crate::poll::{
    CancellationToken, Clock, NoProgress, PollPolicy, ProgressBarObserver, ProgressObserver,
    SystemClock, TaskStatusPoller, TerminalStatus,
};
use crate::session::Session;
use crate::submit::TaskSubmitter;
use crate::task::{DEFAULT_PROJECTION, OutputFormat, TaskHandle, TaskSpec, TaskStatus};
use crate::transport::HttpTransport;

/// High-level entry point: log in once, then submit, wait and download.
#[derive(Clone)]
pub struct Client {
    session: Session,
    catalog: Arc<Catalog>,

    poll: PollPolicy,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
    extension: Option<String>,
    progress: bool,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("session", &self.session)
            .field("poll", &self.poll)
            .field("extension", &self.extension)
            .field("progress", &self.progress)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a client from environment variables and/or `.appeearsrc`,
    /// then logs in.
    ///
    /// This is equivalent to `Client::new(None, None, None, None)`.
    pub fn from_env() -> Result<Self> {
        Self::new(None, None, None, None)
    }

    /// Creates a client using (in order of precedence):
    /// - explicit arguments
    /// - environment variables `APPEEARS_URL` / `APPEEARS_USER` / `APPEEARS_PASS`
    /// - config file from `APPEEARS_RC` or `.appeearsrc`
    pub fn new(
        url: Option<String>,
        username: Option<String>,
        password: Option<String>,
        verify: Option<bool>,
    ) -> Result<Self> {
        let cfg = load_config(url, username, password, verify)?;
        let transport =
            HttpTransport::new(cfg.url.clone(), cfg.verify).context("failed to build HTTP client")?;

        let session = Session::new(Arc::new(transport));
        session
            .login(&cfg.username, &cfg.password)
            .with_context(|| format!("failed to log in to {}", cfg.url))?;

        Ok(Self::with_session(session))
    }

    /// Wraps an existing (usually already logged-in) session.
    pub fn with_session(session: Session) -> Self {
        Self {
            session,
            catalog: Arc::new(Catalog::builtin().clone()),
            poll: PollPolicy::default(),
            clock: Arc::new(SystemClock),
            cancel: CancellationToken::new(),
            extension: Some("tif".to_string()),
            progress: true,
        }
    }

    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = Arc::new(catalog);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll.interval = interval;
        self
    }

    pub fn with_max_poll_interval(mut self, max: Duration) -> Self {
        self.poll.max_interval = max;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.poll.timeout = Some(timeout);
        self
    }

    pub fn with_transport_retries(mut self, retries: usize) -> Self {
        self.poll.max_transport_retries = retries;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Restricts downloads to one extension; `None` downloads everything.
    pub fn with_extension_filter(mut self, extension: Option<&str>) -> Self {
        self.extension = extension.map(str::to_string);
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn submitter(&self) -> TaskSubmitter {
        TaskSubmitter::new(self.session.clone(), Arc::clone(&self.catalog))
    }

    pub fn poller(&self) -> TaskStatusPoller {
        TaskStatusPoller::new(self.session.clone())
            .with_policy(self.poll)
            .with_clock(Arc::clone(&self.clock))
            .with_cancellation(self.cancel.clone())
    }

    pub fn lister(&self) -> FileLister {
        FileLister::new(self.session.clone())
    }

    pub fn downloader(&self) -> Downloader {
        Downloader::new(self.session.clone())
            .with_extension(self.extension.as_deref())
            .with_progress(self.progress)
    }

    pub fn orchestrator(&self) -> TaskOrchestrator {
        TaskOrchestrator::new(self.submitter(), self.poller(), self.lister())
    }

    /// Product metadata and layer descriptions from the service, for
    /// products in the catalog only.
    pub fn product(&self, product_id: &str) -> error::Result<Value> {
        let product = self.catalog.resolve(product_id)?;
        self.session
            .get_json(&format!("product/{}", product.id), "fetching product")
    }

    /// Every product the service offers.
    pub fn products(&self) -> error::Result<Vec<Value>> {
        self.session.get_json("product", "listing products")
    }

    pub fn submit_point<S: AsRef<str>>(
        &self,
        latitude: f64,
        longitude: f64,
        product_id: &str,
        band_names: &[S],
        dates: DateRange,
    ) -> error::Result<TaskHandle> {
        self.submitter()
            .submit_point(latitude, longitude, product_id, band_names, dates)
    }

    /// Area task with the default projection and GeoTIFF output.
    pub fn submit_area<S: AsRef<str>>(
        &self,
        geometry: Value,
        product_id: &str,
        band_names: &[S],
        dates: DateRange,
    ) -> error::Result<TaskHandle> {
        self.submitter().submit_area(
            geometry,
            product_id,
            band_names,
            dates,
            DEFAULT_PROJECTION,
            OutputFormat::GeoTiff,
        )
    }

    pub fn task_status(&self, handle: &TaskHandle) -> error::Result<TaskStatus> {
        self.poller().status(handle)
    }

    pub fn wait(&self, handle: &TaskHandle) -> error::Result<TerminalStatus> {
        let mut observer = self.observer();
        self.poller().await_completion(handle, observer.as_mut())
    }

    pub fn list_files(&self, handle: &TaskHandle) -> error::Result<Vec<FileDescriptor>> {
        self.lister().list_files(handle)
    }

    /// Submits, waits and lists.
    pub fn run(&self, spec: &TaskSpec) -> std::result::Result<Vec<FileDescriptor>, OrchestrationError> {
        let mut observer = self.observer();
        self.orchestrator().run_with_observer(spec, observer.as_mut())
    }

    /// Runs `spec` and downloads its accepted files into `target_dir`.
    pub fn retrieve(&self, spec: &TaskSpec, target_dir: &Path) -> Result<Vec<PathBuf>> {
        let mut observer = self.observer();
        let done = self.orchestrator().execute(spec, observer.as_mut())?;

        let saved = self
            .downloader()
            .download_all(&done.handle, &done.files, target_dir)
            .with_context(|| format!("downloading files of task {} failed", done.handle))?;
        log::info!(
            "task {}: {} of {} file(s) saved to {}",
            done.handle,
            saved.len(),
            done.files.len(),
            target_dir.display()
        );
        Ok(saved)
    }

    pub fn logout(&self) -> error::Result<()> {
        self.session.logout()
    }

    fn observer(&self) -> Box<dyn ProgressObserver> {
        if self.progress {
            Box::new(ProgressBarObserver::new())
        } else {
            Box::new(NoProgress)
        }
    }
}
