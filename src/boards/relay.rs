use std::path::Path;

use tracing::debug;

use crate::{
    error::{Error, Result},
    i2c::{I2cBus, I2cDevice},
    wire,
};

/// Slave address of board 1. Stacked boards count down from here.
pub const BASE_ADDRESS: u16 = 0x27;

/// Register written to drive the relays.
pub const SET_REGISTER: u8 = 0x01;
/// Register pointer written before reading back the relay state.
pub const GET_REGISTER: u8 = 0x00;

/// Highest board number on one bus.
pub const MAX_BOARD: u8 = 8;

/// Slave address answering for `board`.
pub const fn board_address(board: u8) -> u16 {
    BASE_ADDRESS - ((board.wrapping_sub(1) & 7) as u16)
}

/// One relay board on one bus.
///
/// Callers only ever see logical masks; the wire permutation is applied here.
/// A board number of 0 means no board is addressed, and every transaction
/// fails until [`select_board`](Self::select_board) succeeds.
#[derive(Debug)]
pub struct RelayChannel<B: I2cBus = I2cDevice> {
    bus: Option<B>,
    board: u8,
}

impl RelayChannel<I2cDevice> {
    /// Open `/dev/i2c-<bus>` and address `board` on it.
    pub fn open(bus: u32, board: u8) -> Result<Self> {
        Self::open_path(format!("/dev/i2c-{}", bus), board)
    }

    pub fn open_path(path: impl AsRef<Path>, board: u8) -> Result<Self> {
        let path = path.as_ref();
        check_board(board)?;

        // Opening the node also addresses the board.
        let device = I2cDevice::open(path, board_address(board))?;

        debug!(path = %path.display(), board, "opened i2c bus");
        Ok(Self {
            bus: Some(device),
            board,
        })
    }
}

impl<B: I2cBus> RelayChannel<B> {
    /// Wrap an already open bus and address `board` on it.
    ///
    /// If selection fails the bus is dropped, which releases the handle.
    pub fn with_bus(bus: B, board: u8) -> Result<Self> {
        check_board(board)?;

        let mut this = Self {
            bus: Some(bus),
            board: 0,
        };
        this.select_board(board)?;

        Ok(this)
    }

    /// Re-target the open handle at another board on the same stack.
    pub fn select_board(&mut self, board: u8) -> Result<()> {
        self.board = 0;
        check_board(board)?;

        let address = board_address(board);
        self.bus_mut()?
            .set_slave_address(address)
            .map_err(|source| Error::BoardSelect { address, source })?;

        self.board = board;
        Ok(())
    }

    /// Currently addressed board, or 0 if none.
    pub fn board(&self) -> u8 {
        self.board
    }

    pub fn is_open(&self) -> bool {
        self.bus.is_some()
    }

    /// Energize exactly the relays in the logical `mask`.
    pub fn set(&mut self, mask: u8) -> Result<()> {
        let buf = [SET_REGISTER, wire::to_wire(mask)];
        let n = self
            .addressed_bus()?
            .write(&buf)
            .map_err(|source| Error::Transport { op: "set", source })?;
        expect_len("set", n, buf.len())
    }

    /// Read back the logical mask of energized relays.
    pub fn get(&mut self) -> Result<u8> {
        let bus = self.addressed_bus()?;

        let n = bus
            .write(&[GET_REGISTER])
            .map_err(|source| Error::Transport { op: "get", source })?;
        expect_len("get", n, 1)?;

        let mut buf = [0u8; 2];
        let n = bus
            .read(&mut buf)
            .map_err(|source| Error::Transport { op: "get", source })?;
        expect_len("get", n, buf.len())?;

        Ok(wire::to_logical(buf[1]))
    }

    /// Release the bus handle. Later transactions fail with `ChannelClosed`.
    pub fn close(&mut self) {
        if self.bus.take().is_some() {
            debug!(board = self.board, "closed relay channel");
        }
        self.board = 0;
    }

    fn bus_mut(&mut self) -> Result<&mut B> {
        self.bus.as_mut().ok_or(Error::ChannelClosed)
    }

    fn addressed_bus(&mut self) -> Result<&mut B> {
        if self.bus.is_some() && self.board == 0 {
            return Err(Error::NoBoardSelected);
        }
        self.bus_mut()
    }
}

fn check_board(board: u8) -> Result<()> {
    if !(1..=MAX_BOARD).contains(&board) {
        return Err(Error::InvalidBoard(board));
    }
    Ok(())
}

fn expect_len(op: &'static str, done: usize, expected: usize) -> Result<()> {
    if done != expected {
        return Err(Error::PartialTransfer { op, done, expected });
    }
    Ok(())
}
