//! Segment selection for TCA9548A bus multiplexers.
//!
//! A segment left selected would misroute the next, unrelated transaction, so every transaction to a board behind a
//! multiplexer goes through [`with_segment`], which deselects on every path out.

use super::{
    board::MuxSegment,
    error::{BusError, DecodeError},
};
use embedded_hal::i2c::I2c;

/// Number of multiplexers which fit the address range.
pub const CLUSTERS: u8 = 8;

/// Downstream buses per multiplexer.
pub const SLICES: u8 = 8;

/// Address of multiplexer cluster 0; cluster `n` answers at `BASE_ADDRESS + n`.
pub const BASE_ADDRESS: u8 = 0x70;

/// Address of the multiplexer for `cluster`.
pub fn address(cluster: u8) -> u8 {
    BASE_ADDRESS + cluster
}

/// Control byte enabling only `slice`.
pub fn select_byte(slice: u8) -> u8 {
    1 << slice
}

/// Writes the control byte that disconnects every segment of `cluster`.
///
/// Also serves as the reachability probe run during bring-up.
pub fn deselect<B>(bus: &mut B, cluster: u8) -> Result<(), BusError>
where
    B: I2c,
    B::Error: DecodeError,
{
    trace!("[i2c-mux] deselecting cluster {}", cluster);
    bus.write(address(cluster), &[0]).map_err(|e| {
        let error = e.decode();
        error!("[i2c-mux] deselecting cluster {} failed: {}", cluster, error.reason());
        error
    })
}

fn select<B>(bus: &mut B, segment: MuxSegment) -> Result<(), BusError>
where
    B: I2c,
    B::Error: DecodeError,
{
    trace!(
        "[i2c-mux] selecting cluster {} slice {}",
        segment.cluster, segment.slice
    );
    bus.write(address(segment.cluster), &[select_byte(segment.slice)])
        .map_err(|e| {
            let error = e.decode();
            error!(
                "[i2c-mux] selecting cluster {} slice {} failed: {}",
                segment.cluster,
                segment.slice,
                error.reason()
            );
            error
        })
}

/// Runs `op` with `segment` selected (or directly, for boards on the main bus), then deselects.
///
/// The segment is deselected even when selecting it or `op` failed. The first error wins. If the segment can't be
/// selected, `op` is not attempted at all.
pub fn with_segment<B, T>(
    bus: &mut B,
    segment: Option<MuxSegment>,
    op: impl FnOnce(&mut B) -> Result<T, B::Error>,
) -> Result<T, BusError>
where
    B: I2c,
    B::Error: DecodeError,
{
    let Some(segment) = segment else {
        return op(bus).map_err(|e| e.decode());
    };

    if let Err(error) = select(bus, segment) {
        let _ = deselect(bus, segment.cluster);
        return Err(error);
    }
    let result = op(bus).map_err(|e| e.decode());
    let deselected = deselect(bus, segment.cluster);
    match (result, deselected) {
        (Ok(value), Ok(())) => Ok(value),
        (Err(error), _) | (Ok(_), Err(error)) => Err(error),
    }
}
