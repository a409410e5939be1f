//! Drive a stackable I2C relay board to water irrigation zones one at a time.
//!
//! The pieces, from the bus up:
//!
//! - [`wire`]: the board's logical-to-wire bit permutation
//! - [`i2c`]: raw transactions on a `/dev/i2c-N` node
//! - [`boards::RelayChannel`]: one board, speaking logical relay masks
//! - [`program`]: parsing, timing and sequential execution of zone events
//! - [`supervisor`]: preflight checks and signal-driven fail-safe shutdown

pub mod boards;
pub mod config;
pub mod error;
pub mod fakes;
pub mod i2c;
pub mod pacer;
pub mod program;
pub mod signals;
pub mod supervisor;
pub mod telemetry;
pub mod wire;

pub use boards::RelayChannel;
pub use config::{BusConfig, Timing};
pub use error::{Error, Result};
pub use program::{Event, Program};
pub use signals::Signal;
pub use supervisor::Supervisor;
