// SPDX-License-Identifier: PMPL-1.0-or-later
//! Open-connection bookkeeping used to block version upgrades.

use std::time::Duration;

use tokio::sync::watch;

use crate::error::EngineError;

/// Counts the open connections of one database.
#[derive(Debug)]
pub(crate) struct ConnectionTracker {
    open: watch::Sender<usize>,
}

impl ConnectionTracker {
    pub(crate) fn new() -> Self {
        let (open, _) = watch::channel(0);
        Self { open }
    }

    pub(crate) fn open(&self) -> usize {
        *self.open.borrow()
    }

    pub(crate) fn acquire(&self) {
        self.open.send_modify(|open| *open += 1);
    }

    pub(crate) fn release(&self) {
        self.open.send_modify(|open| *open = open.saturating_sub(1));
    }

    /// Wait until no connection is open, failing with
    /// [`EngineError::Blocked`] once `timeout` elapses.
    pub(crate) async fn wait_idle(
        &self,
        timeout: Option<Duration>,
        version: u64,
    ) -> Result<(), EngineError> {
        let mut released = self.open.subscribe();
        let wait = async move {
            released
                .wait_for(|open| *open == 0)
                .await
                .map(|_| ())
                .map_err(|_| EngineError::BackendUnavailable("connection tracker closed".to_string()))
        };

        match timeout {
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(result) => result,
                Err(_) => Err(EngineError::Blocked {
                    version,
                    open: self.open(),
                }),
            },
            None => wait.await,
        }
    }
}
