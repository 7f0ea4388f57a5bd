use std::io::BufRead;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::cache::CacheEvent;
use crate::error::MutationError;

/// Application events
#[derive(Debug)]
pub enum Event {
  /// A line typed at the prompt
  Line(String),
  /// Stdin closed
  Eof,
  /// A spawned mutation finished; `Ok` carries the success message
  Mutation {
    label: String,
    result: Result<String, MutationError>,
  },
  /// Something changed in the shared query cache
  Cache(CacheEvent),
}

/// Event handler that merges stdin lines, mutation outcomes and cache events
pub struct EventHandler {
  tx: mpsc::UnboundedSender<Event>,
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Create a new event handler reading stdin and following `cache_events`
  pub fn new(mut cache_events: broadcast::Receiver<CacheEvent>) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    // Blocking stdin reader on its own thread, detached at exit
    let input_tx = tx.clone();
    std::thread::spawn(move || {
      for line in std::io::stdin().lock().lines() {
        match line {
          Ok(line) => {
            if input_tx.send(Event::Line(line)).is_err() {
              return;
            }
          }
          Err(e) => {
            warn!(error = %e, "failed to read stdin");
            break;
          }
        }
      }
      let _ = input_tx.send(Event::Eof);
    });

    // Forward cache events
    let cache_tx = tx.clone();
    tokio::spawn(async move {
      loop {
        match cache_events.recv().await {
          Ok(event) => {
            if cache_tx.send(Event::Cache(event)).is_err() {
              break;
            }
          }
          Err(broadcast::error::RecvError::Lagged(skipped)) => {
            debug!(skipped, "cache event stream lagged");
          }
          Err(broadcast::error::RecvError::Closed) => break,
        }
      }
    });

    Self { tx, rx }
  }

  /// Sender for spawned tasks to report back on
  pub fn sender(&self) -> mpsc::UnboundedSender<Event> {
    self.tx.clone()
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}
