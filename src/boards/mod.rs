mod relay;

pub use relay::{board_address, RelayChannel, BASE_ADDRESS, GET_REGISTER, MAX_BOARD, SET_REGISTER};
