//                      Fixed-Region Slab Allocator
// ---------------------------------------------------------------------------
//
// Carves a single contiguous, pre-reserved byte region (typically a
// shared-memory segment mapped by multiple cooperating processes) into
// variable-sized allocations with low fragmentation and O(1)-ish
// allocation/free for small objects.
//
// Design:
// ------
// All allocator metadata lives inside the managed region itself, so a forked
// process that inherits the mapping at the same base address sees a fully
// initialized pool. The region is laid out as:
//
//   +----------+-------------+-------------+-------------+-----+----------+
//   | PoolHdr  | slots table | stats table | pages table | pad |  frames  |
//   +----------+-------------+-------------+-------------+-----+----------+
//
// Frames are page-sized, page-aligned slices of the data area. Every frame
// has one `PageDesc` in the pages table. A frame is, at any instant, either
// part of a free run, a partially used size-class page linked on its slot
// list, a fully used size-class page (off-list), or part of a multi-frame
// whole-page allocation.
//
// Size classes:
// ------------
// Requests up to half a page are rounded up to a power of two and served from
// per-class pages. Occupancy is tracked with bitmaps whose location depends on
// the object size relative to `exact_size` (the object size for which one
// machine word of bitmap exactly covers a frame):
//
//   - smaller -> SMALL: bitmap lives in-band at the start of the frame
//   - equal   -> EXACT: the descriptor's `slab` word is the bitmap
//   - larger  -> BIG:   bitmap in the high half of `slab`, shift in low bits
//
// Larger requests take whole runs of contiguous frames off the free-run list,
// with coalescing of adjacent runs when they are returned.
//
// Concurrency:
// -----------
// One spin mutex per pool, embedded in the in-region header, serializes all
// mutating operations. `SlabPool::lock` hands out a `LockedPool` guard whose
// methods are the caller-already-holds-the-lock variants.

#![cfg_attr(feature = "no_std", no_std)]

#[macro_use]
extern crate bitflags;

pub mod address;
pub mod bug;
pub mod config;
pub mod error;
pub mod page;
pub mod pool;

pub use address::{Address, RegionAddress};
pub use config::{PoolConfig, PoolFlags};
pub use error::{Error, Result};
pub use pool::{LockedPool, SlabPool, SlotStats, MAX_SLOT_COUNT};
