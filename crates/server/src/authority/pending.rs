// Copyright 2026 the zonegate authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Tracking of update transaction ids that are currently in flight.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// The set of update transaction ids being processed right now.
///
/// UDP clients retransmit an update while waiting for its response. A
/// retransmission that arrives while the original is still being applied is
/// dropped without any response, leaving the client's retry logic in charge.
#[derive(Clone, Debug, Default)]
pub struct PendingRequests {
    ids: Arc<Mutex<HashSet<u16>>>,
}

impl PendingRequests {
    /// An empty pending set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `id` as in flight. Returns `None` if it already is.
    pub fn begin(&self, id: u16) -> Option<PendingGuard> {
        let mut ids = self.ids.lock().unwrap(); // poisoning is fatal
        if !ids.insert(id) {
            return None;
        }
        Some(PendingGuard {
            ids: Arc::clone(&self.ids),
            id,
        })
    }
}

/// Removes its id from the pending set when dropped, whatever the exit path
/// of the transaction was.
#[derive(Debug)]
pub struct PendingGuard {
    ids: Arc<Mutex<HashSet<u16>>>,
    id: u16,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if let Ok(mut ids) = self.ids.lock() {
            ids.remove(&self.id);
        }
    }
}
