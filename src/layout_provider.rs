use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError};
use log::debug;
use logging_timer::time;
use thiserror::Error;

use crate::layout::{LayoutDocument, StructuralError};

#[derive(Debug, Error)]
pub enum LayoutProviderError {
    #[error("unable to read layout {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Structural(#[from] StructuralError),
    #[error("text layout extraction did not finish within {0:?}")]
    DeadlineExceeded(Duration),
    #[error("text layout extraction failed: {0}")]
    ProviderFailed(String),
}

/// Extracts words and their positions from raw image bytes.
pub trait TextLayoutProvider: Send + Sync {
    fn analyze(&self, image: &[u8]) -> Result<LayoutDocument, LayoutProviderError>;
}

/// Serves a layout that the text-extraction service already produced for the
/// image, stored as JSON on disk.
#[derive(Debug, Clone)]
pub struct PrecomputedLayoutProvider {
    path: PathBuf,
}

impl PrecomputedLayoutProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TextLayoutProvider for PrecomputedLayoutProvider {
    fn analyze(&self, _image: &[u8]) -> Result<LayoutDocument, LayoutProviderError> {
        let bytes = std::fs::read(&self.path).map_err(|source| LayoutProviderError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(LayoutDocument::from_slice(&bytes)?)
    }
}

/// Runs `provider` on a worker thread and waits at most `deadline` for the
/// result. A late result is discarded.
#[time]
pub fn analyze_with_deadline(
    provider: Arc<dyn TextLayoutProvider>,
    image: Arc<[u8]>,
    deadline: Duration,
) -> Result<LayoutDocument, LayoutProviderError> {
    let (sender, receiver) = bounded(1);
    thread::spawn(move || {
        // the receiver is gone if the deadline already passed
        let _ = sender.send(provider.analyze(&image));
    });

    match receiver.recv_timeout(deadline) {
        Ok(result) => {
            debug!("text layout extraction finished");
            result
        }
        Err(RecvTimeoutError::Timeout) => Err(LayoutProviderError::DeadlineExceeded(deadline)),
        Err(RecvTimeoutError::Disconnected) => Err(LayoutProviderError::ProviderFailed(
            "provider stopped without returning a layout".to_string(),
        )),
    }
}
