//! The render thread.
//!
//! PDF libraries are generally not thread-safe, so a single dedicated thread
//! owns the backend. Async callers queue jobs over a channel and await the
//! answer on a oneshot. Documents loaded by the backend stay resident on the
//! thread until their [`ResidentDocument`] is dropped.

use crate::backend::{DocumentHandle, DocumentSource, PaintRequest, PdfBackend};
use crate::error::{Result, ViewerError};
use crate::geometry::PageGeometry;
use async_channel::{Receiver, Sender};
use image::RgbaImage;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

enum Job {
    Load {
        handle: DocumentHandle,
        source: DocumentSource,
        reply: oneshot::Sender<Result<Vec<PageGeometry>>>,
    },
    Paint {
        request: PaintRequest,
        reply: oneshot::Sender<Result<RgbaImage>>,
    },
    Release {
        handle: DocumentHandle,
    },
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Job::Load { handle, source, .. } => f
                .debug_struct("Load")
                .field("handle", handle)
                .field("source", source)
                .finish(),
            Job::Paint { request, .. } => f
                .debug_struct("Paint")
                .field("handle", &request.handle)
                .field("page_index", &request.page_index)
                .field("width", &request.width)
                .field("height", &request.height)
                .finish(),
            Job::Release { handle } => {
                f.debug_struct("Release").field("handle", handle).finish()
            }
        }
    }
}

/// A document held open by the backend.
///
/// Dropping it queues a release behind every job already waiting, so renders
/// that were queued while it was alive still find the document.
#[derive(Debug)]
pub struct ResidentDocument {
    handle: DocumentHandle,
    jobs: Sender<Job>,
}

impl ResidentDocument {
    pub fn handle(&self) -> DocumentHandle {
        self.handle
    }

    /// A document not tied to any render thread.
    #[cfg(test)]
    pub(crate) fn detached(handle: DocumentHandle) -> Self {
        let (jobs, _) = async_channel::unbounded();
        Self { handle, jobs }
    }
}

impl Drop for ResidentDocument {
    fn drop(&mut self) {
        let handle = self.handle;
        if self.jobs.try_send(Job::Release { handle }).is_err() {
            debug!("Render worker gone, document {} released with it", handle);
        }
    }
}

/// Handle to the render thread.
#[derive(Debug)]
pub struct RenderWorker {
    jobs: Sender<Job>,
    handle: Mutex<Option<JoinHandle<()>>>,
    completed: Arc<AtomicUsize>,
    next_document: AtomicU64,
}

impl RenderWorker {
    /// Start the render thread.
    ///
    /// The backend is built by `factory` on the render thread itself, so it
    /// never has to cross threads. Returns the factory's error if it fails.
    pub fn spawn<B, F>(factory: F) -> Result<Self>
    where
        B: PdfBackend + 'static,
        F: FnOnce() -> Result<B> + Send + 'static,
    {
        let (jobs_tx, jobs_rx) = async_channel::unbounded::<Job>();
        let (ready_tx, ready_rx) = async_channel::bounded::<Result<()>>(1);
        let completed = Arc::new(AtomicUsize::new(0));
        let thread_completed = Arc::clone(&completed);

        let handle = std::thread::Builder::new()
            .name("pdf-render".to_string())
            .spawn(move || {
                let mut backend = match factory() {
                    Ok(backend) => backend,
                    Err(e) => {
                        let _ = ready_tx.send_blocking(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send_blocking(Ok(()));
                drop(ready_tx);
                run_jobs(&mut backend, jobs_rx, &thread_completed);
            })
            .map_err(|e| {
                ViewerError::InvalidConfig(format!("Failed to spawn render thread: {}", e))
            })?;

        if let Err(e) = ready_rx.recv_blocking()? {
            let _ = handle.join();
            return Err(e);
        }

        info!("Render worker started");

        Ok(Self {
            jobs: jobs_tx,
            handle: Mutex::new(Some(handle)),
            completed,
            next_document: AtomicU64::new(1),
        })
    }

    /// Parse a document on the render thread and keep it open there.
    pub async fn load(
        &self,
        source: DocumentSource,
    ) -> Result<(ResidentDocument, Vec<PageGeometry>)> {
        let handle = DocumentHandle(self.next_document.fetch_add(1, Ordering::Relaxed));
        let (reply, rx) = oneshot::channel();
        self.jobs
            .send(Job::Load {
                handle,
                source,
                reply,
            })
            .await?;
        let pages = rx.await??;

        let resident = ResidentDocument {
            handle,
            jobs: self.jobs.clone(),
        };
        Ok((resident, pages))
    }

    /// Paint a page on the render thread.
    ///
    /// The canvas starts filled with `request.fill` and leaves fully opaque.
    pub async fn paint(&self, request: PaintRequest) -> Result<RgbaImage> {
        let (reply, rx) = oneshot::channel();
        self.jobs.send(Job::Paint { request, reply }).await?;
        rx.await?
    }

    /// Jobs the render thread has finished, failed ones included.
    pub fn completed_jobs(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Jobs waiting in the queue.
    pub fn queued_jobs(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_running(&self) -> bool {
        !self.jobs.is_closed()
    }

    /// Stop accepting jobs, let queued ones finish and wait for the thread.
    pub async fn shutdown(&self) {
        info!("Shutting down render worker");
        self.jobs.close();

        let handle = match self.handle.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            match tokio::task::spawn_blocking(move || handle.join()).await {
                Ok(Ok(())) => debug!("Render worker joined"),
                Ok(Err(_)) => warn!("Render worker panicked"),
                Err(e) => warn!("Failed to join render worker: {}", e),
            }
        }
    }
}

fn run_jobs<B: PdfBackend>(backend: &mut B, jobs: Receiver<Job>, completed: &AtomicUsize) {
    while let Ok(job) = jobs.recv_blocking() {
        match job {
            Job::Load {
                handle,
                source,
                reply,
            } => {
                let result = contain_panic(
                    || backend.load(handle, &source),
                    |message| ViewerError::PdfiumError(format!("backend panicked: {}", message)),
                );
                let loaded = result.is_ok();
                completed.fetch_add(1, Ordering::SeqCst);
                if reply.send(result).is_err() && loaded {
                    debug!("Releasing document {}, caller went away", handle);
                    release(backend, handle);
                }
            }
            Job::Paint { request, reply } => {
                if reply.is_closed() {
                    debug!("Skipping page {}, caller went away", request.page_index + 1);
                    continue;
                }
                let result = contain_panic(
                    || paint(backend, &request),
                    |message| request.failure(format!("backend panicked: {}", message)),
                );
                completed.fetch_add(1, Ordering::SeqCst);
                let _ = reply.send(result);
            }
            Job::Release { handle } => release(backend, handle),
        }
    }
    debug!("Render worker exiting");
}

fn release<B: PdfBackend>(backend: &mut B, handle: DocumentHandle) {
    let _ = contain_panic(
        || {
            backend.release(handle);
            Ok(())
        },
        ViewerError::PdfiumError,
    );
}

/// Run one job, turning a panic into an error so the thread keeps serving.
fn contain_panic<T>(
    job: impl FnOnce() -> Result<T>,
    on_panic: impl FnOnce(String) -> ViewerError,
) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(job)).unwrap_or_else(|payload| {
        let message = panic_message(payload.as_ref());
        error!("Render job panicked: {}", message);
        Err(on_panic(message))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn paint<B: PdfBackend>(backend: &mut B, request: &PaintRequest) -> Result<RgbaImage> {
    let start = Instant::now();
    let mut canvas = RgbaImage::from_pixel(request.width, request.height, request.fill);

    backend.paint(request, &mut canvas)?;

    debug!(
        "Painted page {} at {}x{} in {:?}",
        request.page_index + 1,
        request.width,
        request.height,
        start.elapsed()
    );
    Ok(canvas)
}
