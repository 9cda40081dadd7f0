use crate::{LookbackMode, PrimError, TempRegion, TempStorageLayout};
use core::sync::atomic::Ordering;
use cubeprim_common::{BinaryOp, Element};
use cubeprim_runtime::{CubeContext, CubeDim, CubeKernel, DeviceSlice, Handle};

const FLAG_INVALID: u32 = 0;
const FLAG_PARTIAL: u32 = 1;
const FLAG_PREFIX: u32 = 2;

/// Spins before yielding the worker while waiting on another tile.
const SPINS_BEFORE_YIELD: u32 = 64;

/// Status of a tile, as published to the tiles after it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TileStatus<T> {
    /// Nothing published yet.
    Invalid,
    /// Aggregate of the tile alone.
    Partial(T),
    /// Aggregate of the tile and of every tile before it in its segment.
    Prefix(T),
}

/// Regions of the look-back state in temporary storage.
#[derive(Debug)]
pub struct LookbackLayout<T> {
    counter: TempRegion<u64>,
    flags: TempRegion<u32>,
    partials: TempRegion<T>,
    prefixes: TempRegion<T>,
}

impl<T> Clone for LookbackLayout<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for LookbackLayout<T> {}

impl<T: Element> LookbackLayout<T> {
    /// Reserve the state of `num_tiles` tiles.
    pub fn push(layout: &mut TempStorageLayout, num_tiles: usize) -> Self {
        Self {
            counter: layout.push(1),
            flags: layout.push(num_tiles),
            partials: layout.push(num_tiles),
            prefixes: layout.push(num_tiles),
        }
    }

    /// View the state inside the temporary storage.
    pub fn bind(&self, storage: &Handle) -> Result<LookbackState<T>, PrimError> {
        Ok(LookbackState {
            counter: self.counter.bind(storage)?,
            flags: self.flags.bind(storage)?,
            partials: self.partials.bind(storage)?,
            prefixes: self.prefixes.bind(storage)?,
        })
    }
}

/// Cross-cube state of a single pass scan with decoupled look-back.
///
/// Every tile publishes its aggregate as soon as it knows it, then its prefix once it found the
/// aggregates of its predecessors. Values live in separate partial and prefix slots, each
/// written once before its flag is raised with release ordering, so a reader observing a flag
/// with acquire ordering always reads a complete value.
#[derive(Clone, Debug)]
pub struct LookbackState<T> {
    counter: DeviceSlice<u64>,
    flags: DeviceSlice<u32>,
    partials: DeviceSlice<T>,
    prefixes: DeviceSlice<T>,
}

impl<T: Element> LookbackState<T> {
    /// Number of tiles tracked.
    pub fn num_tiles(&self) -> usize {
        self.flags.len()
    }

    /// Claim the next tile id.
    ///
    /// Ids are handed out in the order cubes start, so a tile only ever waits on tiles whose
    /// cubes are already running.
    pub fn next_tile(&self) -> u64 {
        // SAFETY: the counter is only accessed atomically.
        unsafe { self.counter.atomic(0) }.fetch_add(1, Ordering::Relaxed)
    }

    /// Publish the status of `tile`.
    pub fn publish(&self, tile: usize, status: TileStatus<T>) {
        // SAFETY: every slot is written once by the tile owning it, before raising its flag.
        let flag = unsafe {
            match status {
                TileStatus::Invalid => FLAG_INVALID,
                TileStatus::Partial(value) => {
                    self.partials.write(tile, value);
                    FLAG_PARTIAL
                }
                TileStatus::Prefix(value) => {
                    self.prefixes.write(tile, value);
                    FLAG_PREFIX
                }
            }
        };

        // SAFETY: flags are only accessed atomically.
        unsafe { self.flags.atomic(tile) }.store(flag, Ordering::Release);
    }

    /// The status currently published by `tile`.
    pub fn status(&self, tile: usize) -> TileStatus<T> {
        // SAFETY: flags are only accessed atomically.
        let flag = unsafe { self.flags.atomic(tile) }.load(Ordering::Acquire);

        // SAFETY: the slot was written before its flag was raised and is never written again.
        unsafe {
            match flag {
                FLAG_PARTIAL => TileStatus::Partial(self.partials.read(tile)),
                FLAG_PREFIX => TileStatus::Prefix(self.prefixes.read(tile)),
                _ => TileStatus::Invalid,
            }
        }
    }

    /// Computes the exclusive prefix of `tile`, the combination of the tiles from `first_tile`
    /// to `tile - 1` in order.
    ///
    /// `first_tile` must be before `tile` and publish a prefix without looking back. Returns
    /// `None` if the launch is aborted while waiting.
    pub fn lookback<Op: BinaryOp<T>>(
        &self,
        tile: usize,
        first_tile: usize,
        mode: LookbackMode,
        op: &Op,
        cube: &CubeContext<'_>,
    ) -> Option<T> {
        match mode {
            LookbackMode::Decoupled => {
                self.decoupled_lookback(tile, first_tile, cube.plane_dim as usize, op, cube)
            }
            LookbackMode::Deterministic => {
                let mut spins = 0;
                loop {
                    match self.status(tile - 1) {
                        TileStatus::Prefix(prefix) => return Some(prefix),
                        _ if cube.is_aborted() => return None,
                        _ => backoff(&mut spins),
                    }
                }
            }
        }
    }

    /// Every unit of a plane looks at one predecessor, the plane combines the aggregates of its
    /// window and moves to the previous window until it finds a prefix.
    fn decoupled_lookback<Op: BinaryOp<T>>(
        &self,
        tile: usize,
        first_tile: usize,
        window: usize,
        op: &Op,
        cube: &CubeContext<'_>,
    ) -> Option<T> {
        let window = window.max(1);
        let mut aggregate: Option<T> = None;
        let mut cursor = tile;

        while cursor > first_tile {
            let low = cursor.saturating_sub(window).max(first_tile);

            for predecessor in (low..cursor).rev() {
                let mut spins = 0;
                let partial = loop {
                    match self.status(predecessor) {
                        TileStatus::Prefix(prefix) => return Some(combine(prefix, aggregate, op)),
                        TileStatus::Partial(partial) => break partial,
                        TileStatus::Invalid if cube.is_aborted() => return None,
                        TileStatus::Invalid => backoff(&mut spins),
                    }
                };
                aggregate = Some(combine(partial, aggregate, op));
            }

            cursor = low;
        }

        aggregate
    }
}

fn combine<T, Op: BinaryOp<T>>(earlier: T, later: Option<T>, op: &Op) -> T {
    match later {
        Some(later) => op.combine(earlier, later),
        None => earlier,
    }
}

fn backoff(spins: &mut u32) {
    if *spins < SPINS_BEFORE_YIELD {
        *spins += 1;
        core::hint::spin_loop();
    } else {
        std::thread::yield_now();
    }
}

/// Resets the counter and every flag of a [LookbackState].
#[derive(Clone)]
pub(crate) struct InitLookbackKernel<T> {
    state: LookbackState<T>,
    num_tiles: usize,
}

impl<T: Element> InitLookbackKernel<T> {
    pub(crate) const UNITS: u32 = 256;

    /// Only the first `num_tiles` tiles are reset.
    pub(crate) fn new(state: LookbackState<T>, num_tiles: usize) -> Self {
        Self { state, num_tiles }
    }
}

impl<T: Element> CubeKernel for InitLookbackKernel<T> {
    fn name(&self) -> &'static str {
        "init_lookback"
    }

    fn cube_dim(&self) -> CubeDim {
        CubeDim::new_1d(Self::UNITS)
    }

    fn execute(&self, cube: &mut CubeContext<'_>) {
        let cube_index = cube.cube_index() as usize;
        if cube_index == 0 {
            // SAFETY: the counter is only accessed atomically.
            unsafe { self.state.counter.atomic(0) }.store(0, Ordering::Relaxed);
        }

        let units = Self::UNITS as usize;
        let start = cube_index * units;
        for tile in start..(start + units).min(self.num_tiles) {
            // SAFETY: flags are only accessed atomically.
            unsafe { self.state.flags.atomic(tile) }.store(FLAG_INVALID, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cubeprim_common::Plus;
    use cubeprim_runtime::{ComputeClient, DeviceProperties};

    fn state(num_tiles: usize) -> LookbackState<i32> {
        let client = ComputeClient::new(DeviceProperties::default());
        let mut layout = TempStorageLayout::new();
        let lookback = LookbackLayout::<i32>::push(&mut layout, num_tiles);

        lookback.bind(&client.empty(layout.size())).unwrap()
    }

    #[test]
    fn published_statuses_are_visible() {
        let state = state(4);

        assert_eq!(state.status(1), TileStatus::Invalid);
        state.publish(1, TileStatus::Partial(3));
        assert_eq!(state.status(1), TileStatus::Partial(3));
        state.publish(1, TileStatus::Prefix(7));
        assert_eq!(state.status(1), TileStatus::Prefix(7));
    }

    #[test]
    fn tile_ids_are_claimed_in_order() {
        let state = state(2);

        assert_eq!(state.next_tile(), 0);
        assert_eq!(state.next_tile(), 1);
        assert_eq!(state.next_tile(), 2);
    }

    #[test]
    fn combine_keeps_order() {
        let op = |a: String, b: String| a + &b;

        assert_eq!(combine("ab".to_string(), Some("cd".to_string()), &op), "abcd");
        assert_eq!(combine("ab".to_string(), None, &op), "ab");
        assert_eq!(combine(1, Some(2), &Plus), 3);
    }
}
