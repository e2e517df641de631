use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::capture::CaptureSource;
use crate::classify::ClassificationClient;
use crate::frame::{self, CapturedImage};
use crate::payload;
use crate::reduce;

/// What the display shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayState {
    Idle,
    Loading,
    Result(u32),
    Error(String),
}

impl fmt::Display for DisplayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayState::Idle => write!(f, "Idle"),
            DisplayState::Loading => write!(f, "Loading..."),
            DisplayState::Result(age) => write!(f, "Predicted Age: {}", age),
            DisplayState::Error(reason) => write!(f, "Error: {}", reason),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No image staged; capture a frame or choose a file first")]
    NothingStaged,
}

pub struct Session {
    client: Arc<ClassificationClient>,
    staged: Option<CapturedImage>,
    state: Arc<watch::Sender<DisplayState>>,
    cycle: Arc<AtomicU64>,
    in_flight: Option<JoinHandle<()>>,
}

impl Session {
    pub fn new(client: ClassificationClient) -> Self {
        let (state, _) = watch::channel(DisplayState::Idle);
        Self {
            client: Arc::new(client),
            staged: None,
            state: Arc::new(state),
            cycle: Arc::new(AtomicU64::new(0)),
            in_flight: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<DisplayState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> DisplayState {
        self.state.borrow().clone()
    }

    pub fn staged(&self) -> Option<&CapturedImage> {
        self.staged.as_ref()
    }

    /// Replace the staged image
    pub fn stage(&mut self, image: CapturedImage) {
        debug!("Staged {} byte image from {:?}", image.len(), image.origin());
        self.staged = Some(image);
    }

    /// Freeze the current camera frame. Without a source nothing is staged.
    pub fn capture(&mut self, source: Option<&mut dyn CaptureSource>) -> anyhow::Result<bool> {
        match frame::capture_from_stream(source)? {
            Some(image) => {
                self.stage(image);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Whether an upload makes sense right now
    pub fn can_upload(&self) -> bool {
        self.staged.is_some() && !self.is_loading()
    }

    /// Start classifying the staged image and return the new cycle id.
    ///
    /// A request still in flight from an earlier cycle is cancelled and its
    /// result, if any, is never displayed.
    pub fn upload(&mut self) -> Result<u64, SessionError> {
        let image = self.staged.as_ref().ok_or(SessionError::NothingStaged)?;

        let mut cycle = 0;
        self.state.send_modify(|state| {
            cycle = self.cycle.fetch_add(1, Ordering::SeqCst) + 1;
            *state = DisplayState::Loading;
        });

        if let Some(previous) = self.in_flight.take() {
            if !previous.is_finished() {
                info!("Cancelling superseded classification before cycle {}", cycle);
                previous.abort();
            }
        }

        let encoded = match payload::encode(image) {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!("Cycle {}: {}", cycle, err);
                publish(&self.state, &self.cycle, cycle, DisplayState::Error(err.to_string()));
                return Ok(cycle);
            }
        };

        let client = Arc::clone(&self.client);
        let state = Arc::clone(&self.state);
        let current = Arc::clone(&self.cycle);

        self.in_flight = Some(tokio::spawn(async move {
            let outcome = match client.classify(&encoded).await {
                Ok(predictions) => match reduce::estimate_age(&predictions) {
                    Ok(age) => DisplayState::Result(age),
                    Err(err) => DisplayState::Error(err.to_string()),
                },
                Err(err) => DisplayState::Error(err.to_string()),
            };

            if let DisplayState::Error(reason) = &outcome {
                warn!("Cycle {} failed: {}", cycle, reason);
            }
            publish(&state, &current, cycle, outcome);
        }));

        Ok(cycle)
    }

    /// Wait for the current cycle to resolve and return what is displayed.
    pub async fn settle(&mut self) -> DisplayState {
        if let Some(handle) = self.in_flight.take() {
            if let Err(err) = handle.await {
                if err.is_panic() {
                    warn!("Classification task panicked: {}", err);
                    self.state.send_replace(DisplayState::Error("classification task panicked".to_string()));
                }
            }
        }
        self.state()
    }
}

/// Show `outcome` only if `cycle` is still the latest one
fn publish(
    state: &watch::Sender<DisplayState>,
    current: &AtomicU64,
    cycle: u64,
    outcome: DisplayState,
) {
    let shown = state.send_if_modified(|displayed| {
        if current.load(Ordering::SeqCst) != cycle {
            return false;
        }
        *displayed = outcome;
        true
    });

    if !shown {
        debug!("Dropping result of stale cycle {}", cycle);
    }
}
