use crate::PrimError;
use cubeprim_block::{BlockLayout, BlockScanAlgorithm};
use serde::{Deserialize, Serialize};

/// How a tile finds the prefix of the tiles before it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LookbackMode {
    /// Combine the published aggregates of the predecessors until a complete prefix is found.
    #[default]
    #[serde(rename = "decoupled")]
    Decoupled,
    /// Wait for the complete prefix of the previous tile, so values are always combined in the
    /// same grouping. Slower, but reproducible for non-associative operators such as floating
    /// point addition.
    #[serde(rename = "deterministic")]
    Deterministic,
}

fn check_tile(name: &str, units: u32, items_per_unit: u32) -> Result<(), PrimError> {
    if units == 0 || items_per_unit == 0 {
        return Err(PrimError::invalid(format!(
            "{name} needs at least one unit and one item per unit, got {units} units of {items_per_unit} items"
        )));
    }
    Ok(())
}

/// Tuning of the device scans.
#[derive(new, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Units per cube.
    pub units: u32,
    /// Items scanned by every unit.
    pub items_per_unit: u32,
    /// Block scan strategy.
    pub algorithm: BlockScanAlgorithm,
    /// Look-back strategy.
    pub lookback: LookbackMode,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::new(256, 4, BlockScanAlgorithm::WarpScan, LookbackMode::Decoupled)
    }
}

impl ScanConfig {
    /// Use another block scan strategy.
    pub fn with_algorithm(mut self, algorithm: BlockScanAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Use another look-back strategy.
    pub fn with_lookback(mut self, lookback: LookbackMode) -> Self {
        self.lookback = lookback;
        self
    }

    /// Number of items of a tile.
    pub fn tile_size(&self) -> usize {
        self.units as usize * self.items_per_unit as usize
    }

    pub(crate) fn layout(&self, plane_dim: u32) -> BlockLayout {
        BlockLayout::new(self.units, self.items_per_unit, plane_dim)
    }

    pub(crate) fn validate(&self) -> Result<(), PrimError> {
        check_tile("Scan", self.units, self.items_per_unit)
    }
}

/// Tuning of the device reductions.
#[derive(new, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReduceConfig {
    /// Units per cube.
    pub units: u32,
    /// Items reduced by every unit.
    pub items_per_unit: u32,
}

impl Default for ReduceConfig {
    fn default() -> Self {
        Self::new(256, 4)
    }
}

impl ReduceConfig {
    /// Number of items of a tile.
    pub fn tile_size(&self) -> usize {
        self.units as usize * self.items_per_unit as usize
    }

    pub(crate) fn layout(&self, plane_dim: u32) -> BlockLayout {
        BlockLayout::new(self.units, self.items_per_unit, plane_dim)
    }

    pub(crate) fn validate(&self) -> Result<(), PrimError> {
        check_tile("Reduce", self.units, self.items_per_unit)?;
        if self.tile_size() < 2 {
            return Err(PrimError::invalid(
                "Reduce tiles must hold at least two items to make progress",
            ));
        }
        Ok(())
    }
}

/// Tuning of the device merge sort.
#[derive(new, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSortConfig {
    /// Units per cube of the block sort kernel.
    pub sort_units: u32,
    /// Items sorted by every unit of the block sort kernel.
    pub sort_items_per_unit: u32,
    /// Units per cube of the merge kernel.
    pub merge_units: u32,
    /// Items merged by every unit of the merge kernel.
    pub merge_items_per_unit: u32,
    /// Units per cube of the partition kernel.
    pub partition_units: u32,
}

impl Default for MergeSortConfig {
    fn default() -> Self {
        Self::new(256, 4, 128, 4, 128)
    }
}

impl MergeSortConfig {
    /// Number of items sorted by a cube of the block sort kernel.
    pub fn sort_tile_size(&self) -> usize {
        self.sort_units as usize * self.sort_items_per_unit as usize
    }

    /// Number of items merged by a cube of the merge kernel.
    pub fn merge_tile_size(&self) -> usize {
        self.merge_units as usize * self.merge_items_per_unit as usize
    }

    pub(crate) fn sort_layout(&self, plane_dim: u32) -> BlockLayout {
        BlockLayout::new(self.sort_units, self.sort_items_per_unit, plane_dim)
    }

    pub(crate) fn merge_layout(&self, plane_dim: u32) -> BlockLayout {
        BlockLayout::new(self.merge_units, self.merge_items_per_unit, plane_dim)
    }

    pub(crate) fn validate(&self) -> Result<(), PrimError> {
        check_tile("Block sort", self.sort_units, self.sort_items_per_unit)?;
        check_tile("Merge", self.merge_units, self.merge_items_per_unit)?;
        if self.partition_units == 0 {
            return Err(PrimError::invalid("Partition needs at least one unit"));
        }
        if self.sort_tile_size() % self.merge_tile_size() != 0 {
            return Err(PrimError::invalid(format!(
                "The sort tile ({}) must be a multiple of the merge tile ({})",
                self.sort_tile_size(),
                self.merge_tile_size()
            )));
        }
        Ok(())
    }
}

/// Tuning of the segmented radix sort.
#[derive(new, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadixSortConfig {
    /// Units per cube.
    pub units: u32,
    /// Items ranked by every unit.
    pub items_per_unit: u32,
    /// Bits of a digit, from 1 to 8.
    pub radix_bits: u32,
}

impl Default for RadixSortConfig {
    fn default() -> Self {
        Self::new(256, 4, 8)
    }
}

impl RadixSortConfig {
    /// Number of items ranked at once by a cube.
    pub fn tile_size(&self) -> usize {
        self.units as usize * self.items_per_unit as usize
    }

    /// Number of distinct digits.
    pub fn radix_size(&self) -> usize {
        1 << self.radix_bits
    }

    pub(crate) fn layout(&self, plane_dim: u32) -> BlockLayout {
        BlockLayout::new(self.units, self.items_per_unit, plane_dim)
    }

    /// Layout used to scan the digit counts, every unit owning the same number of digits.
    pub(crate) fn digit_layout(&self, plane_dim: u32) -> BlockLayout {
        let units = (self.units as usize).min(self.radix_size()) as u32;
        let items = self.radix_size() as u32 / units;
        BlockLayout::new(units, items, plane_dim)
    }

    pub(crate) fn validate(&self) -> Result<(), PrimError> {
        check_tile("Radix sort", self.units, self.items_per_unit)?;
        if !(1..=8).contains(&self.radix_bits) {
            return Err(PrimError::invalid(format!(
                "Radix digits must have between 1 and 8 bits, got {}",
                self.radix_bits
            )));
        }
        let units = (self.units as usize).min(self.radix_size());
        if self.radix_size() % units != 0 {
            return Err(PrimError::invalid(format!(
                "The {} digits can't be split evenly over {} units",
                self.radix_size(),
                self.units
            )));
        }
        Ok(())
    }
}

/// Tuning of the searches.
#[derive(new, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Units per cube.
    pub units: u32,
    /// Positions or needles handled by every unit.
    pub items_per_unit: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self::new(256, 4)
    }
}

impl SearchConfig {
    /// Number of positions or needles handled by a cube.
    pub fn tile_size(&self) -> usize {
        self.units as usize * self.items_per_unit as usize
    }

    pub(crate) fn validate(&self) -> Result<(), PrimError> {
        check_tile("Search", self.units, self.items_per_unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_tile_must_be_multiple_of_merge_tile() {
        assert!(MergeSortConfig::default().validate().is_ok());

        let config = MergeSortConfig::new(64, 3, 32, 4, 64);
        assert!(matches!(
            config.validate(),
            Err(PrimError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn empty_tiles_are_rejected() {
        let config = ScanConfig::default();
        assert!(config.validate().is_ok());
        assert!(ScanConfig { units: 0, ..config }.validate().is_err());
        assert!(ReduceConfig::new(1, 1).validate().is_err());
        assert!(SearchConfig::new(32, 0).validate().is_err());
    }

    #[test]
    fn digit_layout_covers_every_digit() {
        let config = RadixSortConfig::new(64, 4, 8);
        let layout = config.digit_layout(32);

        assert_eq!(layout.tile_size(), 256);
        assert_eq!(layout.units, 64);
        assert!(config.validate().is_ok());

        let config = RadixSortConfig::new(256, 1, 4);
        assert_eq!(config.digit_layout(32).tile_size(), 16);
        assert!(RadixSortConfig::new(48, 1, 8).validate().is_err());
        assert!(RadixSortConfig::new(32, 1, 9).validate().is_err());
    }
}
