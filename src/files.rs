use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::error::{Error, Result, ValidationError, describe_remote_error};
use crate::session::Session;
use crate::task::TaskHandle;
use crate::transport::TransportError;
use crate::util::safe_relative_path;

/// One output file of a completed task.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct FileDescriptor {
    pub file_id: String,
    pub file_name: String,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub sha256: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct BundleReply {
    #[serde(default)]
    files: Vec<FileDescriptor>,
}

#[derive(Debug, Clone)]
pub struct FileLister {
    session: Session,
}

impl FileLister {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    /// Lists the bundle of a finished task. An empty list means the task
    /// produced nothing; a failed request is an error.
    pub fn list_files(&self, handle: &TaskHandle) -> Result<Vec<FileDescriptor>> {
        let resp = self.session.get(&format!("bundle/{}", handle))?;
        if !resp.is_success() {
            let status = resp.status;
            let body = resp.text().unwrap_or_default();
            return Err(Error::ListingFailed {
                task_id: handle.to_string(),
                status,
                message: describe_remote_error(status, &body),
            });
        }
        let reply: BundleReply = resp.json("reading file bundle")?;
        log::info!("task {}: {} file(s) listed", handle, reply.files.len());
        Ok(reply.files)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Saved(PathBuf),
    /// The file did not match the extension filter.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct Downloader {
    session: Session,
    extension: Option<String>,
    progress: bool,
    retry_max: usize,
    retry_pause: Duration,
}

impl Downloader {
    /// Downloads only `.tif` files by default.
    pub fn new(session: Session) -> Self {
        Self {
            session,
            extension: Some("tif".to_string()),
            progress: false,
            retry_max: 3,
            retry_pause: Duration::from_secs(5),
        }
    }

    /// `None` downloads every file.
    pub fn with_extension(mut self, extension: Option<&str>) -> Self {
        self.extension = extension.map(|e| e.trim_start_matches('.').to_ascii_lowercase());
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Attempts per file for interrupted or truncated transfers.
    pub fn with_retry_max(mut self, retry_max: usize) -> Self {
        self.retry_max = retry_max.max(1);
        self
    }

    pub fn with_retry_pause(mut self, pause: Duration) -> Self {
        self.retry_pause = pause;
        self
    }

    pub fn accepts(&self, file_name: &str) -> bool {
        match &self.extension {
            None => true,
            Some(ext) => Path::new(file_name)
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(ext)),
        }
    }

    /// Streams one file into `dir`, keeping the remote file name.
    ///
    /// Bytes go to `<name>.part` first; the file appears under its real name
    /// only once the announced size (if any) has been received. On failure
    /// the partial file is removed.
    pub fn download(
        &self,
        handle: &TaskHandle,
        file: &FileDescriptor,
        dir: &Path,
    ) -> Result<DownloadOutcome> {
        if !self.accepts(&file.file_name) {
            log::warn!("skipping {} (extension filter)", file.file_name);
            return Ok(DownloadOutcome::Skipped);
        }

        let relative = safe_relative_path(&file.file_name)
            .ok_or_else(|| ValidationError::InvalidFileName(file.file_name.clone()))?;
        let target = dir.join(relative);
        let partial = partial_path(&target);

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|source| Error::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let pb = if self.progress {
            let pb = ProgressBar::new(file.file_size.unwrap_or(0));
            if let Ok(style) = ProgressStyle::with_template(
                "{spinner:.green} {bytes}/{total_bytes} ({bytes_per_sec}) {wide_bar} {eta}",
            ) {
                pb.set_style(style.progress_chars("=>-"));
            }
            Some(pb)
        } else {
            None
        };

        let fetched = self
            .fetch_with_retries(handle, file, &partial, pb.as_ref())
            .and_then(|written| {
                fs::rename(&partial, &target)
                    .map(|()| written)
                    .map_err(|source| Error::Io {
                        path: target.clone(),
                        source,
                    })
            });
        if let Some(pb) = &pb {
            pb.finish_and_clear();
        }

        match fetched {
            Ok(written) => {
                log::info!("downloaded {} ({} bytes)", target.display(), written);
                Ok(DownloadOutcome::Saved(target))
            }
            Err(err) => {
                if let Err(e) = fs::remove_file(&partial) {
                    if e.kind() != io::ErrorKind::NotFound {
                        log::warn!("could not remove {}: {}", partial.display(), e);
                    }
                }
                Err(err)
            }
        }
    }

    /// Downloads every accepted file, returning the paths written.
    pub fn download_all(
        &self,
        handle: &TaskHandle,
        files: &[FileDescriptor],
        dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        let mut saved = Vec::new();
        for file in files {
            if let DownloadOutcome::Saved(path) = self.download(handle, file, dir)? {
                saved.push(path);
            }
        }
        Ok(saved)
    }

    fn fetch_with_retries(
        &self,
        handle: &TaskHandle,
        file: &FileDescriptor,
        partial: &Path,
        pb: Option<&ProgressBar>,
    ) -> Result<u64> {
        let mut tries = 0usize;
        loop {
            tries += 1;
            if let Some(pb) = pb {
                pb.set_position(0);
            }

            let err = match self.fetch_once(handle, file, partial, pb) {
                Ok(written) => match file.file_size {
                    Some(expected) if written < expected => Error::IncompleteDownload {
                        file_name: file.file_name.clone(),
                        expected,
                        received: written,
                    },
                    Some(expected) if written > expected => {
                        log::warn!(
                            "{}: expected {} byte(s), received {}",
                            file.file_name,
                            expected,
                            written
                        );
                        return Ok(written);
                    }
                    _ => return Ok(written),
                },
                Err(err) if err.is_retryable() => err,
                Err(err) => return Err(err),
            };

            if tries >= self.retry_max {
                return Err(err);
            }
            log::warn!(
                "download of {} failed ({}/{}): {}, retrying",
                file.file_name,
                tries,
                self.retry_max,
                err
            );
            thread::sleep(self.retry_pause);
        }
    }

    /// One GET of the file into `partial`, truncating whatever is there.
    fn fetch_once(
        &self,
        handle: &TaskHandle,
        file: &FileDescriptor,
        partial: &Path,
        pb: Option<&ProgressBar>,
    ) -> Result<u64> {
        let resp = self
            .session
            .get(&format!("bundle/{}/{}", handle, file.file_id))?;
        if !resp.is_success() {
            let status = resp.status;
            let body = resp.text().unwrap_or_default();
            return Err(Error::DownloadFailed {
                file_name: file.file_name.clone(),
                status,
                message: describe_remote_error(status, &body),
            });
        }

        let out = File::create(partial).map_err(|source| Error::Io {
            path: partial.to_path_buf(),
            source,
        })?;
        copy_body(resp.body, out, partial, pb)
    }
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Read failures come from the network and are reported as transport
/// errors; write failures are local I/O errors on `path`.
fn copy_body(
    mut body: Box<dyn Read + Send>,
    out: File,
    path: &Path,
    pb: Option<&ProgressBar>,
) -> Result<u64> {
    let local = |source: io::Error| Error::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut out = BufWriter::new(out);
    let mut buf = [0u8; 64 * 1024];
    let mut written = 0u64;
    loop {
        let n = match body.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(TransportError::Body(e).into()),
        };
        out.write_all(&buf[..n]).map_err(local)?;
        written += n as u64;
        if let Some(pb) = pb {
            pb.inc(n as u64);
        }
    }
    out.flush().map_err(local)?;
    Ok(written)
}
