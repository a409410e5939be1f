//! Translation between logical relay masks and the board's wire masks.
//!
//! Bit `i` of a logical mask is zone `i + 1`. The relay board routes its eight
//! relays to the I/O expander pins out of order, so every mask that crosses the
//! bus has to be permuted. [`RELAY_TO_WIRE`] was worked out empirically by
//! driving one expander pin at a time and noting which relay clicked. It is
//! protocol data: do not try to derive it.

/// Number of relays on one board.
pub const RELAYS: u8 = 8;

/// Expander pin driving each relay, indexed by zone - 1.
pub const RELAY_TO_WIRE: [u8; 8] = [0, 2, 1, 3, 6, 4, 5, 7];

/// Relay index driven by each expander pin. Inverse of [`RELAY_TO_WIRE`].
pub const WIRE_TO_RELAY: [u8; 8] = invert(&RELAY_TO_WIRE);

const _: () = assert!(to_logical(to_wire(0b1010_0110)) == 0b1010_0110);
const _: () = assert!(to_wire(0b0000_0010) == 0b0000_0100);

const fn invert(table: &[u8; 8]) -> [u8; 8] {
    let mut inverse = [0; 8];
    let mut i = 0;
    while i < table.len() {
        inverse[table[i] as usize] = i as u8;
        i += 1;
    }
    inverse
}

const fn permute(mask: u8, table: &[u8; 8]) -> u8 {
    let mut out = 0;
    let mut i = 0;
    while i < table.len() {
        if mask & (1 << i) != 0 {
            out |= 1 << table[i];
        }
        i += 1;
    }
    out
}

/// Convert a logical relay mask into the mask written to the expander.
pub const fn to_wire(mask: u8) -> u8 {
    permute(mask, &RELAY_TO_WIRE)
}

/// Convert a mask read from the expander back into a logical relay mask.
pub const fn to_logical(wire: u8) -> u8 {
    permute(wire, &WIRE_TO_RELAY)
}

/// Logical mask energizing only `zone`. Zone 0 means no relay.
///
/// Zones above [`RELAYS`] have no relay and also map to 0; callers validate
/// zone numbers before they get here.
pub const fn zone_mask(zone: u8) -> u8 {
    if zone == 0 || zone > RELAYS {
        0
    } else {
        1 << (zone - 1)
    }
}
