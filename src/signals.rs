//! Process signals, delivered as messages instead of async handlers.
//!
//! [`listen`] blocks the signals we care about and hands them to a dedicated
//! `sigwait` thread, which forwards each one over a channel. Nothing runs in
//! signal-handler context, and signals are handled one at a time.

use std::{io, mem, ptr, thread};

use tracing::{debug, warn};

/// Signals that stop the run and force every relay off.
pub const TERMINATION: [libc::c_int; 4] = [libc::SIGINT, libc::SIGTERM, libc::SIGHUP, libc::SIGQUIT];

/// Signal that reports the relay state without changing it.
pub const QUERY: libc::c_int = libc::SIGUSR1;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Signal {
    /// Stop now. Carries the raw signal number.
    Terminate(libc::c_int),
    /// Report the current relay state.
    Query,
}

impl Signal {
    /// `None` for signals outside the handled set.
    pub fn from_raw(signo: libc::c_int) -> Option<Self> {
        if signo == QUERY {
            Some(Signal::Query)
        } else if TERMINATION.contains(&signo) {
            Some(Signal::Terminate(signo))
        } else {
            None
        }
    }

    pub fn name(&self) -> &'static str {
        match *self {
            Signal::Query => "SIGUSR1",
            Signal::Terminate(libc::SIGINT) => "SIGINT",
            Signal::Terminate(libc::SIGTERM) => "SIGTERM",
            Signal::Terminate(libc::SIGHUP) => "SIGHUP",
            Signal::Terminate(libc::SIGQUIT) => "SIGQUIT",
            Signal::Terminate(_) => "signal",
        }
    }
}

/// Start forwarding signals.
///
/// Must be called before any other thread is spawned: the blocked mask is
/// inherited, and a thread that doesn't block the signals could still receive
/// them with the default (fatal) disposition.
pub fn listen() -> io::Result<flume::Receiver<Signal>> {
    let set = handled_set();

    // SAFETY: `set` is an initialized sigset_t and the old mask is not requested.
    let rc = unsafe { libc::pthread_sigmask(libc::SIG_BLOCK, &set, ptr::null_mut()) };
    if rc != 0 {
        return Err(io::Error::from_raw_os_error(rc));
    }

    let (tx, rx) = flume::unbounded();
    thread::Builder::new()
        .name("signals".into())
        .spawn(move || loop {
            let mut signo: libc::c_int = 0;
            // SAFETY: both pointers are valid for the duration of the call.
            let rc = unsafe { libc::sigwait(&set, &mut signo) };
            if rc != 0 {
                warn!("sigwait failed: {}", io::Error::from_raw_os_error(rc));
                return;
            }
            match Signal::from_raw(signo) {
                Some(signal) => {
                    if tx.send(signal).is_err() {
                        return;
                    }
                }
                None => debug!(signo, "ignoring signal"),
            }
        })?;

    Ok(rx)
}

fn handled_set() -> libc::sigset_t {
    // SAFETY: sigemptyset fully initializes the set before it is read.
    unsafe {
        let mut set: libc::sigset_t = mem::zeroed();
        libc::sigemptyset(&mut set);
        for signo in TERMINATION.iter().chain([QUERY].iter()) {
            libc::sigaddset(&mut set, *signo);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_signals() {
        assert_eq!(Signal::from_raw(libc::SIGUSR1), Some(Signal::Query));
        assert_eq!(Signal::from_raw(libc::SIGTERM), Some(Signal::Terminate(libc::SIGTERM)));
        assert_eq!(Signal::from_raw(libc::SIGINT).map(|s| s.name()), Some("SIGINT"));
        assert_eq!(Signal::from_raw(libc::SIGUSR2), None);
        assert_eq!(Signal::from_raw(libc::SIGURG), None);
    }

    #[test]
    fn handled_set_contains_exactly_our_signals() {
        let set = handled_set();
        let member = |signo| unsafe { libc::sigismember(&set, signo) == 1 };
        for signo in TERMINATION {
            assert!(member(signo));
        }
        assert!(member(QUERY));
        assert!(!member(libc::SIGUSR2));
        assert!(!member(libc::SIGCHLD));
    }
}
