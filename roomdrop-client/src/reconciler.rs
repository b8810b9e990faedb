//! Listing reconciler: polls a room's file listing on a fixed interval and
//! folds each snapshot into the client file set.
//!
//! The poll loop runs as one spawned task per room. It polls once
//! immediately, then on every interval tick. A poll is awaited inline, so
//! at most one is ever in flight. Ticks that come due while a poll is
//! running are dropped: the next poll starts on the first tick after the
//! running one returns, never straight after it. Refresh requests queued
//! while a poll runs collapse into one follow-up poll. Failed polls leave
//! the file set untouched and surface a notice until the next successful
//! poll.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use roomdrop_common::record::FileRecord;
use roomdrop_common::room::RoomId;

use crate::api::RoomTransport;
use crate::file_set::ClientFileSet;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

pub const LIST_FAILED_NOTICE: &str = "Failed to load files, retrying shortly";

/// Snapshot of the reconciler's state, published after every change.
#[derive(Debug, Clone, Default)]
pub struct RoomView {
    /// Files newest first.
    pub files: Vec<FileRecord>,
    /// Set while the last poll failed; cleared by the next success.
    pub notice: Option<String>,
    /// Whether a listing call is currently outstanding.
    pub polling: bool,
    /// Polls finished so far, successful or not.
    pub polls_completed: u64,
}

enum Command {
    Refresh,
    Insert(FileRecord),
}

/// Handle to a running poll loop. Dropping the handle stops the loop.
pub struct ListingReconciler {
    room_id: RoomId,
    commands: mpsc::UnboundedSender<Command>,
    view: watch::Receiver<RoomView>,
    task: JoinHandle<()>,
}

impl ListingReconciler {
    /// Start polling `room`. Must be called from within a tokio runtime.
    pub fn spawn(transport: Arc<dyn RoomTransport>, room: RoomId, interval: Duration) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let (view_tx, view) = watch::channel(RoomView::default());

        let task = tokio::spawn(run(transport, room.clone(), interval, rx, view_tx));
        info!(room_id = %room, interval_ms = interval.as_millis() as u64, "Listing reconciler started");

        Self {
            room_id: room,
            commands,
            view,
            task,
        }
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn view(&self) -> watch::Receiver<RoomView> {
        self.view.clone()
    }

    /// Current state without waiting.
    pub fn current(&self) -> RoomView {
        self.view.borrow().clone()
    }

    /// Ask for a poll as soon as the loop is idle.
    pub fn refresh(&self) {
        let _ = self.commands.send(Command::Refresh);
    }

    /// Merge a record known locally (e.g. a finished upload) without waiting
    /// for the listing to catch up.
    pub fn insert(&self, record: FileRecord) {
        let _ = self.commands.send(Command::Insert(record));
    }
}

impl Drop for ListingReconciler {
    fn drop(&mut self) {
        self.task.abort();
        debug!(room_id = %self.room_id, "Listing reconciler stopped");
    }
}

async fn run(
    transport: Arc<dyn RoomTransport>,
    room: RoomId,
    interval: Duration,
    mut commands: mpsc::UnboundedReceiver<Command>,
    view: watch::Sender<RoomView>,
) {
    let mut files = ClientFileSet::new();
    let start = Instant::now();
    let mut ticker = time::interval_at(start, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            cmd = commands.recv() => match cmd {
                Some(Command::Refresh) => {}
                Some(Command::Insert(record)) => {
                    files.apply(vec![record]);
                    view.send_modify(|v| v.files = files.files().to_vec());
                    continue;
                }
                // Handle dropped
                None => break,
            },
        }

        // This poll answers every refresh already queued.
        while let Ok(cmd) = commands.try_recv() {
            if let Command::Insert(record) = cmd {
                files.apply(vec![record]);
            }
        }

        view.send_modify(|v| {
            v.files = files.files().to_vec();
            v.polling = true;
        });
        let result = transport.list_files(&room).await;

        match result {
            Ok(snapshot) => {
                debug!(room_id = %room, count = snapshot.len(), "Listing snapshot received");
                files.apply(snapshot);
                view.send_modify(|v| {
                    v.files = files.files().to_vec();
                    v.notice = None;
                    v.polling = false;
                    v.polls_completed += 1;
                });
            }
            Err(e) => {
                warn!(room_id = %room, error = %e, "Listing poll failed");
                view.send_modify(|v| {
                    v.notice = Some(LIST_FAILED_NOTICE.to_string());
                    v.polling = false;
                    v.polls_completed += 1;
                });
            }
        }

        realign(&mut ticker, start, interval);
    }
}

/// Push the ticker to the first tick boundary strictly after now, so ticks
/// that fell due during the poll are dropped instead of firing at once.
fn realign(ticker: &mut Interval, start: Instant, period: Duration) {
    let period_nanos = period.as_nanos().max(1);
    let elapsed = Instant::now().saturating_duration_since(start).as_nanos();
    let ticks = elapsed / period_nanos + 1;
    let offset = Duration::from_nanos(u64::try_from(ticks * period_nanos).unwrap_or(u64::MAX));
    ticker.reset_at(start + offset);
}
