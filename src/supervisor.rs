//! Runs a program with the relays guarded against the process going away.
//!
//! The relay channel is shared between the sequencing loop and a watcher
//! thread behind one mutex, so their transactions never interleave. On a
//! termination signal the watcher stops the loop at its next suspension
//! boundary, switches every relay off, closes the channel and hands control to
//! the exit hook. Status queries are answered without touching the relays.

use std::{
    sync::{Arc, Mutex},
    thread::{self, JoinHandle},
};

use tracing::{error, info, warn};

use crate::{
    boards::RelayChannel,
    config::{Compact, Timing},
    error::{Error, Result},
    i2c::I2cBus,
    pacer::{self, Trigger},
    program::{lock, Program},
    signals::Signal,
};

/// Called by the watcher after the relays are safe, with the raw signal number.
pub type ExitHook = Box<dyn FnOnce(libc::c_int) + Send>;

pub struct Supervisor<B: I2cBus> {
    relay: Arc<Mutex<RelayChannel<B>>>,
    timing: Timing,
}

impl<B: I2cBus + Send + 'static> Supervisor<B> {
    pub fn new(relay: RelayChannel<B>, timing: Timing) -> Self {
        Self {
            relay: Arc::new(Mutex::new(relay)),
            timing,
        }
    }

    /// Refuse to start if any relay is already energized.
    ///
    /// A nonzero mask means another run owns the board, or a previous one died
    /// without cleaning up. Either way nothing is written.
    pub fn preflight(&self) -> Result<()> {
        let mask = lock(&self.relay).get()?;
        if mask != 0 {
            return Err(Error::AlreadyActive { mask });
        }
        Ok(())
    }

    /// Run `program` to completion or until a termination signal arrives.
    ///
    /// The channel is closed on every path out of here. `Interrupted` means the
    /// watcher has already forced the relays off and called `on_terminate`.
    pub fn run(
        self,
        program: &Program,
        percent: u32,
        signals: flume::Receiver<Signal>,
        on_terminate: ExitHook,
    ) -> Result<()> {
        if let Err(e) = self.preflight() {
            lock(&self.relay).close();
            return Err(e);
        }

        let (trigger, pacer) = pacer::channel();
        let (stop_tx, stop_rx) = flume::bounded(1);
        let watcher = spawn_watcher(
            Arc::clone(&self.relay),
            signals,
            stop_rx,
            trigger,
            on_terminate,
        )?;

        info!(
            events = program.len(),
            "running {} ({} total)",
            program,
            Compact(program.total_duration(percent, &self.timing)),
        );
        let result = program.run(&self.relay, percent, &self.timing, &pacer);

        let _ = stop_tx.send(());
        let terminated = watcher.join().unwrap_or_else(|_| {
            error!("signal watcher panicked");
            false
        });
        lock(&self.relay).close();

        // A write racing the shutdown fails on the closed channel; report the
        // termination rather than that.
        if terminated {
            return Err(Error::Interrupted);
        }
        result
    }
}

enum Wake {
    Signal(Signal),
    SignalsGone,
    Stop,
}

fn spawn_watcher<B: I2cBus + Send + 'static>(
    relay: Arc<Mutex<RelayChannel<B>>>,
    signals: flume::Receiver<Signal>,
    stop: flume::Receiver<()>,
    trigger: Trigger,
    on_terminate: ExitHook,
) -> Result<JoinHandle<bool>> {
    thread::Builder::new()
        .name("relay-watch".into())
        .spawn(move || {
            let mut on_terminate = Some(on_terminate);
            loop {
                let wake = flume::Selector::new()
                    .recv(&signals, |s| s.map_or(Wake::SignalsGone, Wake::Signal))
                    .recv(&stop, |_| Wake::Stop)
                    .wait();

                match wake {
                    Wake::Signal(Signal::Query) => report(&relay),
                    Wake::Signal(signal @ Signal::Terminate(signo)) => {
                        info!("got signal {}", signal.name());
                        trigger.fire();
                        shut_down(&relay);
                        if let Some(hook) = on_terminate.take() {
                            hook(signo);
                        }
                        return true;
                    }
                    Wake::SignalsGone => {
                        warn!("signal listener went away, termination is no longer guarded");
                        return false;
                    }
                    Wake::Stop => return false,
                }
            }
        })
        .map_err(Error::Watcher)
}

fn report<B: I2cBus>(relay: &Mutex<RelayChannel<B>>) {
    info!("got signal {}", Signal::Query.name());
    match lock(relay).get() {
        Ok(mask) => info!(mask, "state={:#04x}", mask),
        Err(e) => warn!("can't read relay state: {}", e),
    }
}

/// Best effort: a failed write is reported, but the channel is closed anyway.
fn shut_down<B: I2cBus>(relay: &Mutex<RelayChannel<B>>) {
    let mut relay = lock(relay);
    if let Err(e) = relay.set(0) {
        error!("failed to switch relays off: {}", e);
    }
    relay.close();
}
