//! In-memory relay board for tests and bench work without hardware.
//!
//! `LoopbackBus` behaves like the expander on the relay board: writes to the
//! set register latch the wire mask, and reads return it in the second byte.
//! Clones share state, so a test can hand one clone to a `RelayChannel` and
//! inspect the transaction log through another.

use std::{
    io,
    sync::{Arc, Mutex},
};

use crate::{
    boards::{GET_REGISTER, SET_REGISTER},
    i2c::I2cBus,
    wire,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transaction {
    SelectSlave(u16),
    Write(Vec<u8>),
    Read(usize),
}

#[derive(Debug, Default)]
struct State {
    slave: Option<u16>,
    wire: u8,
    log: Vec<Transaction>,
    refuse_slave_select: bool,
    short_transfers: bool,
    failing_writes: bool,
}

#[derive(Clone, Debug, Default)]
pub struct LoopbackBus {
    state: Arc<Mutex<State>>,
}

impl LoopbackBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// A board whose relays are already energized, e.g. by a run that was
    /// killed without cleaning up.
    pub fn with_relays(mask: u8) -> Self {
        let this = Self::new();
        this.state().wire = wire::to_wire(mask);
        this
    }

    /// Every transfer moves one byte less than asked.
    pub fn short_transfers(self) -> Self {
        self.state().short_transfers = true;
        self
    }

    pub fn refuse_slave_select(&self, refuse: bool) {
        self.state().refuse_slave_select = refuse;
    }

    /// Make every following write fail with an I/O error.
    pub fn fail_writes(&self, fail: bool) {
        self.state().failing_writes = fail;
    }

    pub fn slave(&self) -> Option<u16> {
        self.state().slave
    }

    /// Latched wire mask.
    pub fn wire(&self) -> u8 {
        self.state().wire
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        self.state().log.clone()
    }

    /// Logical masks of every relay write, in order.
    pub fn relay_writes(&self) -> Vec<u8> {
        self.state()
            .log
            .iter()
            .filter_map(|t| match t {
                Transaction::Write(buf) if buf.len() == 2 && buf[0] == SET_REGISTER => {
                    Some(wire::to_logical(buf[1]))
                }
                _ => None,
            })
            .collect()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }
}

impl I2cBus for LoopbackBus {
    fn set_slave_address(&mut self, address: u16) -> io::Result<()> {
        let mut state = self.state();
        state.log.push(Transaction::SelectSlave(address));
        if state.refuse_slave_select {
            state.slave = None;
            return Err(io::Error::new(io::ErrorKind::NotFound, "no device at address"));
        }
        state.slave = Some(address);
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state();
        state.log.push(Transaction::Write(buf.to_vec()));
        if state.failing_writes {
            return Err(io::Error::new(io::ErrorKind::Other, "bus error"));
        }
        if state.short_transfers {
            return Ok(buf.len().saturating_sub(1));
        }
        if let [SET_REGISTER, mask] = buf {
            state.wire = *mask;
        }
        Ok(buf.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state();
        state.log.push(Transaction::Read(buf.len()));
        let reply = [GET_REGISTER, state.wire];
        let n = buf.len().min(reply.len());
        buf[..n].copy_from_slice(&reply[..n]);
        if state.short_transfers {
            return Ok(n.saturating_sub(1));
        }
        Ok(n)
    }
}
