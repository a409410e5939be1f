//! Sleeps that a termination request can cut short.
//!
//! The sequencing loop only suspends inside [`Pacer::pause`], so that is where
//! it observes a [`Trigger`] fired by the signal watcher.

use std::{
    thread,
    time::{Duration, Instant},
};

use flume::{RecvTimeoutError, TryRecvError};

use crate::error::{Error, Result};

/// Create a connected trigger and pacer.
pub fn channel() -> (Trigger, Pacer) {
    let (tx, rx) = flume::bounded(1);
    (Trigger { tx }, Pacer { rx })
}

/// Asks the sequencing loop to stop at its next suspension boundary.
#[derive(Clone, Debug)]
pub struct Trigger {
    tx: flume::Sender<()>,
}

impl Trigger {
    pub fn fire(&self) {
        // A full channel already holds a pending request.
        let _ = self.tx.try_send(());
    }
}

#[derive(Debug)]
pub struct Pacer {
    rx: flume::Receiver<()>,
}

impl Pacer {
    /// A pacer nobody can interrupt.
    pub fn unattended() -> Self {
        channel().1
    }

    /// Fail with `Interrupted` if a stop was requested.
    pub fn check(&self) -> Result<()> {
        match self.rx.try_recv() {
            Ok(()) => Err(Error::Interrupted),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => Ok(()),
        }
    }

    /// Block for `duration` unless a stop is requested first.
    pub fn pause(&self, duration: Duration) -> Result<()> {
        let start = Instant::now();
        match self.rx.recv_timeout(duration) {
            Ok(()) => Err(Error::Interrupted),
            Err(RecvTimeoutError::Timeout) => Ok(()),
            Err(RecvTimeoutError::Disconnected) => {
                thread::sleep(duration.saturating_sub(start.elapsed()));
                Ok(())
            }
        }
    }
}
