//! `Par3Context`: the single owner of mutable state for one
//! create/verify/repair operation, holding Galois tables, memory-budget
//! pools, and the File/Directory/Chunk/Slice/Block arena as plain,
//! independently droppable fields.

use serde::{Deserialize, Serialize};

use crate::galois::{GaloisField, GaloisWidth};
use crate::hash::RollingWindow;
use crate::model::Par3Graph;

/// Configuration for a create (encode) operation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateConfig {
    pub block_size: u64,
    pub recovery_block_count: u64,
    /// Bytes; caps the three memory pools below. `None` means unbounded.
    pub memory_limit: Option<u64>,
    /// Files and directories that will be protected.
    pub input_paths: Vec<std::path::PathBuf>,
    pub absolute_path: bool,
    pub follow_symlinks: bool,
}

impl Default for CreateConfig {
    fn default() -> Self {
        Self {
            block_size: 4096,
            recovery_block_count: 0,
            memory_limit: None,
            input_paths: Vec::new(),
            absolute_path: false,
            follow_symlinks: false,
        }
    }
}

/// Configuration for a verify/repair operation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerifyConfig {
    pub par_files: Vec<std::path::PathBuf>,
    /// Milliseconds; the slide-search abandonment budget. Default 100.
    pub search_limit_ms: u64,
    pub memory_limit: Option<u64>,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self { par_files: Vec::new(), search_limit_ms: 100, memory_limit: None }
    }
}

/// The three memory pools, tracked as simple byte counters so the streaming
/// encode/decode paths can decide when to fall back to cohorted passes
/// instead of holding everything resident.
#[derive(Clone, Debug, Default)]
pub struct MemoryBudget {
    pub limit: Option<u64>,
    pub working_buffer: u64,
    pub block_data_region: u64,
    pub recovery_residency: u64,
}

impl MemoryBudget {
    pub fn new(limit: Option<u64>) -> Self {
        Self { limit, ..Default::default() }
    }

    /// Whether `additional` more bytes of recovery-block residency fit under
    /// the limit, given what scanning/block-data already reserved.
    pub fn recovery_fits(&self, additional: u64) -> bool {
        match self.limit {
            None => true,
            Some(limit) => {
                self.working_buffer + self.block_data_region + self.recovery_residency + additional
                    <= limit
            }
        }
    }

    /// How many `region_size`-sized outputs fit resident at once: each pass
    /// fixes a cohort of `floor(limit / region_size)` outputs.
    pub fn cohort_size(&self, region_size: usize) -> usize {
        match self.limit {
            None => usize::MAX,
            Some(limit) => {
                let available = limit.saturating_sub(self.working_buffer + self.block_data_region);
                (available / region_size as u64).max(1) as usize
            }
        }
    }
}

/// The per-operation context: Galois tables, the (File,Directory,Chunk,Slice,
/// Block) arena, and the memory budget. Every field is an owned, independently
/// droppable collection, so teardown is safe after any amount of partial
/// construction.
pub struct Par3Context {
    pub galois: GaloisField,
    pub graph: Par3Graph,
    pub memory: MemoryBudget,
    pub input_set_id: u64,
    /// Built once at context construction: both exit tables are needed
    /// throughout a verify pass.
    pub block_window: RollingWindow,
    pub tail_window: RollingWindow,
}

impl Par3Context {
    pub fn new(block_size: u64, total_blocks: u64, memory_limit: Option<u64>) -> Self {
        let width = GaloisWidth::select(total_blocks);
        Self {
            galois: GaloisField::new(width),
            graph: Par3Graph::new(block_size),
            memory: MemoryBudget::new(memory_limit),
            input_set_id: 0,
            block_window: RollingWindow::new(block_size as usize),
            tail_window: RollingWindow::new(40),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_budget_cohort_size_respects_limit() {
        let mut budget = MemoryBudget::new(Some(10_000));
        budget.working_buffer = 1_000;
        budget.block_data_region = 1_000;
        assert_eq!(budget.cohort_size(1000), 8);
    }

    #[test]
    fn memory_budget_unbounded_without_limit() {
        let budget = MemoryBudget::new(None);
        assert_eq!(budget.cohort_size(1000), usize::MAX);
        assert!(budget.recovery_fits(u64::MAX));
    }

    #[test]
    fn context_selects_field_width_from_block_count() {
        let ctx = Par3Context::new(4096, 300, None);
        assert_eq!(ctx.galois.width(), GaloisWidth::Gf16);
        let ctx8 = Par3Context::new(4096, 100, None);
        assert_eq!(ctx8.galois.width(), GaloisWidth::Gf8);
    }
}
