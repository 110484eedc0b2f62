//! First-fit contiguous memory allocator with neighbor coalescing.
//!
//! The manager partitions `[0, total_memory)` into an ordered run of
//! half-open blocks. A single mutex guards the block list across allocate,
//! deallocate, and snapshot.
//!
//! # Invariants
//!
//! - Block spans are contiguous and gap-free: each block starts where the
//!   previous one ends, the first at 0, the last ending at `total_memory`.
//! - Two adjacent free blocks never coexist; deallocation coalesces with the
//!   previous free neighbor, then the next.
//!
//! Both are `debug_assert`ed after every mutation and property-tested.

use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// A half-open span `[start, end)` assigned to a process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySpan {
    pub start: u64,
    pub end: u64,
}

impl MemorySpan {
    #[inline]
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// First-fit allocation failed: no free block is large enough.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutOfMemory;

impl fmt::Display for OutOfMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("no free block large enough")
    }
}

impl std::error::Error for OutOfMemory {}

#[derive(Clone, Debug)]
struct MemoryBlock {
    start: u64,
    end: u64,
    owner: Option<String>,
}

impl MemoryBlock {
    #[inline]
    fn len(&self) -> u64 {
        self.end - self.start
    }

    #[inline]
    fn is_free(&self) -> bool {
        self.owner.is_none()
    }
}

/// One block in a serialized memory snapshot, low address first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotBlock {
    pub start: u64,
    pub end: u64,
    pub owner: Option<String>,
}

/// Point-in-time serializable view of the memory layout.
///
/// Produced by [`MemoryManager::snapshot`]; rendering and file emission are
/// the caller's concern.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    /// Global quantum number this snapshot is tagged with.
    pub quantum: u64,
    /// Display timestamp supplied by the caller.
    pub timestamp: String,
    pub total_memory: u64,
    /// Blocks from low to high address.
    pub blocks: Vec<SnapshotBlock>,
    /// Count of allocated blocks (processes in memory).
    pub allocated_count: usize,
    /// Total free bytes: external fragmentation.
    pub free_bytes: u64,
}

impl MemorySnapshot {
    /// Render the literal snapshot file layout: header, then blocks from
    /// high address to low between `----end----` and `----start----` fences.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(128 + self.blocks.len() * 32);
        out.push_str(&format!("Timestamp: {}\n", self.timestamp));
        out.push_str(&format!(
            "Number of processes in memory: {}\n",
            self.allocated_count
        ));
        out.push_str(&format!(
            "Total external fragmentation in KB: {}\n\n",
            self.free_bytes / 1024
        ));
        out.push_str(&format!(
            "----end---- = {} (max-overall-mem)\n\n",
            self.total_memory
        ));
        for block in self.blocks.iter().rev() {
            out.push_str(&format!("{}\n", block.end));
            if let Some(owner) = &block.owner {
                out.push_str(&format!("{owner}\n"));
            }
            out.push_str(&format!("{}\n\n", block.start));
        }
        out.push_str("----start---- = 0\n");
        out
    }
}

/// Mutex-guarded first-fit allocator over `[0, total_memory)`.
///
/// Every process requests the same `proc_memory` bytes; the size is fixed by
/// configuration, so `allocate` takes only the owner name.
#[derive(Debug)]
pub struct MemoryManager {
    total_memory: u64,
    proc_memory: u64,
    blocks: Mutex<Vec<MemoryBlock>>,
}

impl MemoryManager {
    /// Create a manager with one free block spanning the whole range.
    ///
    /// # Panics
    ///
    /// Panics if either size is 0 or `proc_memory > total_memory`.
    pub fn new(total_memory: u64, proc_memory: u64) -> Self {
        assert!(total_memory > 0, "total memory must be > 0");
        assert!(proc_memory > 0, "per-process memory must be > 0");
        assert!(
            proc_memory <= total_memory,
            "per-process memory ({proc_memory}) exceeds total ({total_memory})"
        );
        Self {
            total_memory,
            proc_memory,
            blocks: Mutex::new(vec![MemoryBlock {
                start: 0,
                end: total_memory,
                owner: None,
            }]),
        }
    }

    #[inline]
    pub fn total_memory(&self) -> u64 {
        self.total_memory
    }

    #[inline]
    pub fn proc_memory(&self) -> u64 {
        self.proc_memory
    }

    /// First-fit allocate `proc_memory` bytes to `owner`.
    ///
    /// Scans from the lowest address; the first free block that is large
    /// enough is split into the allocation and (if any) a free remainder
    /// directly after it.
    ///
    /// # Errors
    ///
    /// [`OutOfMemory`] when no free block is large enough.
    pub fn allocate(&self, owner: &str) -> Result<MemorySpan, OutOfMemory> {
        let mut blocks = self.blocks.lock().expect("memory mutex poisoned");
        let idx = blocks
            .iter()
            .position(|b| b.is_free() && b.len() >= self.proc_memory)
            .ok_or(OutOfMemory)?;

        let old_end = blocks[idx].end;
        let start = blocks[idx].start;
        let end = start + self.proc_memory;
        blocks[idx].end = end;
        blocks[idx].owner = Some(owner.to_string());
        if end < old_end {
            blocks.insert(
                idx + 1,
                MemoryBlock {
                    start: end,
                    end: old_end,
                    owner: None,
                },
            );
        }

        debug_assert!(check_partition(&blocks, self.total_memory));
        Ok(MemorySpan { start, end })
    }

    /// Free the block owned by `owner` and coalesce with free neighbors,
    /// previous first, then next. A name with no block is a no-op.
    pub fn deallocate(&self, owner: &str) {
        let mut blocks = self.blocks.lock().expect("memory mutex poisoned");
        let Some(mut idx) = blocks.iter().position(|b| b.owner.as_deref() == Some(owner)) else {
            return;
        };
        blocks[idx].owner = None;

        if idx > 0 && blocks[idx - 1].is_free() {
            blocks[idx - 1].end = blocks[idx].end;
            blocks.remove(idx);
            idx -= 1;
        }
        if idx + 1 < blocks.len() && blocks[idx + 1].is_free() {
            blocks[idx].end = blocks[idx + 1].end;
            blocks.remove(idx + 1);
        }

        debug_assert!(check_partition(&blocks, self.total_memory));
        debug_assert!(check_no_free_adjacency(&blocks));
    }

    /// Produce a serializable snapshot tagged with `quantum`.
    pub fn snapshot(&self, quantum: u64, timestamp: String) -> MemorySnapshot {
        let blocks = self.blocks.lock().expect("memory mutex poisoned");
        let views: Vec<SnapshotBlock> = blocks
            .iter()
            .map(|b| SnapshotBlock {
                start: b.start,
                end: b.end,
                owner: b.owner.clone(),
            })
            .collect();
        let allocated_count = views.iter().filter(|b| b.owner.is_some()).count();
        let free_bytes = views
            .iter()
            .filter(|b| b.owner.is_none())
            .map(|b| b.end - b.start)
            .sum();
        MemorySnapshot {
            quantum,
            timestamp,
            total_memory: self.total_memory,
            blocks: views,
            allocated_count,
            free_bytes,
        }
    }

    /// Sum of free bytes across all blocks.
    pub fn free_bytes(&self) -> u64 {
        let blocks = self.blocks.lock().expect("memory mutex poisoned");
        blocks.iter().filter(|b| b.is_free()).map(|b| b.len()).sum()
    }
}

fn check_partition(blocks: &[MemoryBlock], total: u64) -> bool {
    if blocks.is_empty() {
        return false;
    }
    let mut cursor = 0;
    for block in blocks {
        if block.start != cursor || block.end <= block.start {
            return false;
        }
        cursor = block.end;
    }
    cursor == total
}

fn check_no_free_adjacency(blocks: &[MemoryBlock]) -> bool {
    blocks
        .windows(2)
        .all(|w| !(w[0].is_free() && w[1].is_free()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn spans(mgr: &MemoryManager) -> Vec<(u64, u64, Option<String>)> {
        let snap = mgr.snapshot(0, String::new());
        snap.blocks
            .into_iter()
            .map(|b| (b.start, b.end, b.owner))
            .collect()
    }

    #[test]
    fn first_fit_packs_from_low_addresses() {
        let mgr = MemoryManager::new(100, 40);
        assert_eq!(mgr.allocate("p1").unwrap(), MemorySpan { start: 0, end: 40 });
        assert_eq!(mgr.allocate("p2").unwrap(), MemorySpan { start: 40, end: 80 });
        assert_eq!(mgr.allocate("p3"), Err(OutOfMemory));
    }

    #[test]
    fn freed_hole_is_reused_by_next_allocation() {
        // Memory-pressure shape: P3 waits for P1's block, which does not
        // coalesce because its neighbor is still allocated.
        let mgr = MemoryManager::new(100, 40);
        mgr.allocate("p1").unwrap();
        mgr.allocate("p2").unwrap();
        assert_eq!(mgr.allocate("p3"), Err(OutOfMemory));
        mgr.deallocate("p1");
        assert_eq!(mgr.allocate("p3").unwrap(), MemorySpan { start: 0, end: 40 });
    }

    #[test]
    fn deallocate_coalesces_both_neighbors() {
        let mgr = MemoryManager::new(120, 40);
        mgr.allocate("a").unwrap();
        mgr.allocate("b").unwrap();
        mgr.allocate("c").unwrap();
        mgr.deallocate("a");
        mgr.deallocate("c");
        // free | b | free
        assert_eq!(
            spans(&mgr),
            vec![
                (0, 40, None),
                (40, 80, Some("b".to_string())),
                (80, 120, None),
            ]
        );
        mgr.deallocate("b");
        // Fully coalesced back to a single free block.
        assert_eq!(spans(&mgr), vec![(0, 120, None)]);
    }

    #[test]
    fn deallocating_unknown_owner_is_a_noop() {
        let mgr = MemoryManager::new(100, 40);
        mgr.allocate("p1").unwrap();
        mgr.deallocate("ghost");
        assert_eq!(mgr.free_bytes(), 60);
    }

    #[test]
    fn fragmentation_snapshot_matches_layout() {
        // A(30), B(30), C(30) on 100 bytes, then free B: hole of 30 between
        // two allocations plus the 10-byte tail.
        let mgr = MemoryManager::new(100, 30);
        mgr.allocate("A").unwrap();
        mgr.allocate("B").unwrap();
        mgr.allocate("C").unwrap();
        mgr.deallocate("B");
        let snap = mgr.snapshot(7, "ts".to_string());
        assert_eq!(snap.allocated_count, 2);
        assert_eq!(snap.free_bytes, 40);
        assert_eq!(
            snap.blocks,
            vec![
                SnapshotBlock { start: 0, end: 30, owner: Some("A".to_string()) },
                SnapshotBlock { start: 30, end: 60, owner: None },
                SnapshotBlock { start: 60, end: 90, owner: Some("C".to_string()) },
                SnapshotBlock { start: 90, end: 100, owner: None },
            ]
        );
    }

    #[test]
    fn render_matches_literal_layout() {
        let mgr = MemoryManager::new(100, 30);
        mgr.allocate("A").unwrap();
        let snap = mgr.snapshot(3, "01/02/2026 03:04:05PM".to_string());
        let text = snap.render();
        let expected = "\
Timestamp: 01/02/2026 03:04:05PM
Number of processes in memory: 1
Total external fragmentation in KB: 0

----end---- = 100 (max-overall-mem)

100
30

30
A
0

----start---- = 0
";
        assert_eq!(text, expected);
    }

    #[test]
    fn render_reports_fragmentation_in_kb() {
        let mgr = MemoryManager::new(16384, 4096);
        mgr.allocate("p1").unwrap();
        let snap = mgr.snapshot(1, "ts".to_string());
        assert!(snap.render().contains("Total external fragmentation in KB: 12\n"));
    }

    #[derive(Clone, Debug)]
    enum Op {
        Alloc(u8),
        Free(u8),
    }

    proptest! {
        // Mass conservation and no-free-adjacency over arbitrary
        // alloc/dealloc interleavings.
        #[test]
        fn prop_partition_and_coalescing_hold(
            ops in prop::collection::vec(
                prop_oneof![
                    (0u8..12).prop_map(Op::Alloc),
                    (0u8..12).prop_map(Op::Free),
                ],
                1..64,
            )
        ) {
            let mgr = MemoryManager::new(256, 48);
            let mut live: Vec<u8> = Vec::new();
            for op in ops {
                match op {
                    Op::Alloc(id) => {
                        if !live.contains(&id) && mgr.allocate(&format!("p{id}")).is_ok() {
                            live.push(id);
                        }
                    }
                    Op::Free(id) => {
                        mgr.deallocate(&format!("p{id}"));
                        live.retain(|&x| x != id);
                    }
                }
                let snap = mgr.snapshot(0, String::new());
                // Blocks partition [0, total) with no gaps.
                let mut cursor = 0;
                for b in &snap.blocks {
                    prop_assert_eq!(b.start, cursor);
                    prop_assert!(b.end > b.start);
                    cursor = b.end;
                }
                prop_assert_eq!(cursor, 256);
                // No two adjacent free blocks.
                for w in snap.blocks.windows(2) {
                    prop_assert!(w[0].owner.is_some() || w[1].owner.is_some());
                }
                // Allocated bytes match the live set.
                let allocated: u64 = snap
                    .blocks
                    .iter()
                    .filter(|b| b.owner.is_some())
                    .map(|b| b.end - b.start)
                    .sum();
                prop_assert_eq!(allocated, live.len() as u64 * 48);
            }
        }
    }
}
