//! The background flusher thread.
//!
//! A single dedicated thread drains flush requests off an mpsc channel so
//! writers never block on table I/O. Shutdown is cooperative: `close()`
//! sends [`FlushRequest::Shutdown`] and joins the thread; any flush the
//! shutdown races past is covered by the final flush in close.

use crate::index::{FlushRequest, IndexManager};
use std::io;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::{Builder, JoinHandle};
use tracing::error;

pub(crate) fn spawn(
    index: Arc<IndexManager>,
    rx: Receiver<FlushRequest>,
) -> io::Result<JoinHandle<()>> {
    Builder::new()
        .name("silt-flusher".to_string())
        .spawn(move || {
            while let Ok(request) = rx.recv() {
                match request {
                    FlushRequest::Flush => {
                        if let Err(e) = index.flush() {
                            // The data is still in the memtable and the
                            // WAL; the next flush retries.
                            error!("background flush failed: {e}");
                        }
                    }
                    FlushRequest::Shutdown => break,
                }
            }
        })
}
