//! The slab pool: region initialization, the free-page manager and the
//! per-size-class allocation engine.
//!
//! A pool owns a contiguous byte region `[base, end)`. `init` places the
//! [`PoolHdr`] at `base`, followed by the slot sentinels (one doubly linked
//! list head per size class), the per-class counters, and one [`PageDesc`]
//! per data frame. The data area starts at the next page boundary after the
//! descriptor table; whatever the alignment padding swallows is subtracted
//! from the frame count.
//!
//! Whole frames are handed out by a first-fit scan of the free-run list.
//! A run longer than the request is split, with the remainder keeping the
//! run's list links. Freed runs are merged with both neighbors: the right
//! neighbor is found by indexing past the run, the left one through the tail
//! back-pointer its head left in the run's last descriptor.

use core::cmp::max;
use core::mem::{align_of, size_of};
use core::ops::Range;
use core::ptr::{self, addr_of_mut, null_mut, NonNull};

use log::{debug, error};
use spin::{Mutex, MutexGuard};

use crate::address::{Address, RegionAddress};
use crate::config::{PoolConfig, PoolFlags};
use crate::error::{Error, Result};
use crate::page::{
    unlink, PageDesc, PageType, BUSY, MAP_MASK, MAP_SHIFT, PAGE_BUSY, PAGE_FREE, PAGE_START,
    SHIFT_MASK, WORD_BITS,
};

/// Upper bound on the number of size classes any valid [`PoolConfig`] can
/// produce (`page_shift <= 16`, `min_shift >= 1`).
pub const MAX_SLOT_COUNT: usize = 16;

/// Per-size-class counters, kept in the in-region stats table.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SlotStats {
    /// Objects currently provisioned in this class's pages.
    pub total: usize,
    /// Objects currently handed out.
    pub used: usize,
    /// Lifetime allocation requests.
    pub reqs: usize,
    /// Lifetime allocation failures.
    pub fails: usize,
}

/// Allocator-global state, resident at the base of the managed region.
///
/// Everything the allocator touches lives behind `mutex`; the geometry
/// fields are written once by `init` and read-only afterwards.
#[repr(C)]
pub(crate) struct PoolHdr {
    mutex: Mutex<()>,

    min_size: usize,
    min_shift: u32,
    page_shift: u32,
    flags: PoolFlags,

    pages: *mut PageDesc,
    last: *mut PageDesc,
    free: PageDesc,

    stats: *mut SlotStats,
    pfree: usize,

    start: usize,
    end: usize,

    data: *mut u8,
}

impl PoolHdr {
    fn page_size(&self) -> usize {
        1 << self.page_shift
    }

    /// Largest request served from a size-class page.
    fn max_slab(&self) -> usize {
        self.page_size() / 2
    }

    /// Object size whose per-frame bitmap is exactly one machine word.
    fn exact_size(&self) -> usize {
        self.page_size() / WORD_BITS
    }

    fn exact_shift(&self) -> u32 {
        self.exact_size().ilog2()
    }

    fn slot_count(&self) -> usize {
        (self.page_shift - self.min_shift) as usize
    }
}

/// Handle to an initialized pool.
///
/// The handle itself holds no allocator state; it is a pointer to the
/// in-region [`PoolHdr`]. Any number of handles may target one pool, and
/// [`SlabPool::from_region`] mints one for every process sharing the
/// mapping.
pub struct SlabPool {
    hdr: NonNull<PoolHdr>,
}

unsafe impl Send for SlabPool {}
unsafe impl Sync for SlabPool {}

impl SlabPool {
    /// Initializes `region` as a slab pool and returns a handle to it.
    ///
    /// Lays out the pool header, the slot and stats tables and the page
    /// descriptor array at the front of the region, then hands the remaining
    /// page-aligned frames to the free-run list as one run.
    ///
    /// # Errors
    ///
    /// Fails if `config` is inconsistent, if `region.start` is not word
    /// aligned, or if the region cannot hold the metadata tables plus at
    /// least one page-aligned data frame.
    ///
    /// # Safety
    ///
    /// `region` must be valid for reads and writes, unused by anything else,
    /// and must stay mapped for the lifetime of the pool and every
    /// allocation made from it.
    pub unsafe fn init(region: Range<RegionAddress>, config: PoolConfig) -> Result<SlabPool> {
        config.validate()?;

        let base = region.start.as_raw_ptr();
        let end = region.end.as_raw_ptr();

        if !region.start.is_aligned(align_of::<PoolHdr>()) {
            return Err(Error::UnalignedRegion(base));
        }

        let too_small = Error::RegionTooSmall(end.saturating_sub(base));
        let n = config.slot_count();

        let pool = base as *mut PoolHdr;
        pool.write(PoolHdr {
            mutex: Mutex::new(()),
            min_size: config.min_size(),
            min_shift: config.min_shift,
            page_shift: config.page_shift,
            flags: config.flags,
            pages: null_mut(),
            last: null_mut(),
            free: PageDesc {
                slab: 0,
                next: null_mut(),
                prev: 0,
            },
            stats: null_mut(),
            pfree: 0,
            start: 0,
            end,
            data: null_mut(),
        });

        let slots = slots(pool);
        let mut p = slots as usize;
        let size = match end.checked_sub(p) {
            Some(size) => size,
            None => return Err(too_small),
        };

        junk(pool, p as *mut u8, size);

        // The slot and stats tables must fit before anything is written.
        let size = match size.checked_sub(n * (size_of::<PageDesc>() + size_of::<SlotStats>())) {
            Some(size) => size,
            None => return Err(too_small),
        };

        // Empty slot lists are sentinel self-loops; only `next` matters in
        // a list head.
        for i in 0..n {
            let slot = slots.add(i);
            (*slot).slab = 0;
            (*slot).next = slot;
            (*slot).prev = 0;
        }

        p += n * size_of::<PageDesc>();

        (*pool).stats = p as *mut SlotStats;
        p += n * size_of::<SlotStats>();

        ptr::write_bytes((*pool).stats, 0, n);

        let mut pages = size / (config.page_size() + size_of::<PageDesc>());
        if pages == 0 {
            return Err(too_small);
        }

        (*pool).pages = p as *mut PageDesc;
        ptr::write_bytes((*pool).pages, 0, pages);

        let page = (*pool).pages;
        let sentinel = free_sentinel(pool);

        (*sentinel).next = page;

        (*page).slab = pages;
        (*page).next = sentinel;
        (*page).prev = sentinel as usize;

        let start = RegionAddress::new(p + pages * size_of::<PageDesc>())
            .align_up(config.page_size());
        if start >= end {
            return Err(too_small);
        }

        // Alignment padding may have eaten into the last frames.
        let reachable = (end - start) >> config.page_shift;
        if reachable < pages {
            pages = reachable;
            (*page).slab = pages;
        }
        if pages == 0 {
            return Err(too_small);
        }

        (*pool).last = (*pool).pages.add(pages);
        (*pool).pfree = pages;
        (*pool).start = start;

        Ok(SlabPool {
            hdr: NonNull::new_unchecked(pool),
        })
    }

    /// Reattaches to a region that another process (or an earlier call to
    /// [`SlabPool::init`]) has already initialized.
    ///
    /// # Safety
    ///
    /// `base` must point at a live, initialized pool header, and the region
    /// must be mapped at the same base address as it was when initialized.
    pub unsafe fn from_region(base: RegionAddress) -> SlabPool {
        SlabPool {
            hdr: NonNull::new_unchecked(base.as_mut_ptr()),
        }
    }

    /// Acquires the pool mutex and returns the guard carrying the
    /// caller-holds-the-lock operations.
    pub fn lock(&self) -> LockedPool<'_> {
        let guard = unsafe { &(*self.hdr.as_ptr()).mutex }.lock();
        LockedPool {
            pool: self.hdr,
            _guard: guard,
        }
    }

    /// Allocates `size` bytes, taking the pool mutex for the duration.
    ///
    /// Requests up to half a page are rounded up to a power of two (at least
    /// the configured minimum size) and served from a size-class page;
    /// larger requests take whole contiguous frames.
    pub fn alloc(&self, size: usize) -> Result<NonNull<u8>> {
        self.lock().alloc(size)
    }

    /// Like [`SlabPool::alloc`], but zero-fills the allocation.
    pub fn calloc(&self, size: usize) -> Result<NonNull<u8>> {
        self.lock().calloc(size)
    }

    /// Returns `ptr` to the pool, taking the pool mutex for the duration.
    ///
    /// Corruption is diagnosed and reported without modifying allocator
    /// state.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by an allocation from this pool, and no
    /// reference into the allocation may outlive this call.
    pub unsafe fn free(&self, ptr: NonNull<u8>) -> Result<()> {
        self.lock().free(ptr)
    }

    /// Snapshot of the per-class counters.
    pub fn stats(&self) -> heapless::Vec<SlotStats, MAX_SLOT_COUNT> {
        self.lock().stats()
    }

    /// Number of frames currently on the free-run list.
    pub fn free_page_count(&self) -> usize {
        self.lock().free_page_count()
    }

    /// The embedder's root object slot in the pool header.
    pub fn data(&self) -> *mut u8 {
        self.lock().data()
    }

    pub fn set_data(&self, data: *mut u8) {
        self.lock().set_data(data)
    }

    pub fn page_size(&self) -> usize {
        unsafe { (*self.hdr.as_ptr()).page_size() }
    }

    pub fn min_size(&self) -> usize {
        unsafe { (*self.hdr.as_ptr()).min_size }
    }
}

/// The pool with its mutex held.
///
/// Dropping the guard releases the mutex. All methods here are the
/// counterparts of the [`SlabPool`] operations for callers that batch
/// several operations under one acquisition. No reentrancy: calling back
/// into the owning [`SlabPool`] while holding the guard deadlocks.
pub struct LockedPool<'a> {
    pool: NonNull<PoolHdr>,
    _guard: MutexGuard<'a, ()>,
}

impl LockedPool<'_> {
    pub fn alloc(&mut self, size: usize) -> Result<NonNull<u8>> {
        unsafe { alloc_locked(self.pool.as_ptr(), size) }
    }

    pub fn calloc(&mut self, size: usize) -> Result<NonNull<u8>> {
        let p = self.alloc(size)?;
        unsafe { ptr::write_bytes(p.as_ptr(), 0, size) };
        Ok(p)
    }

    /// # Safety
    ///
    /// Same contract as [`SlabPool::free`].
    pub unsafe fn free(&mut self, ptr: NonNull<u8>) -> Result<()> {
        free_locked(self.pool.as_ptr(), ptr.as_ptr() as usize)
    }

    pub fn stats(&self) -> heapless::Vec<SlotStats, MAX_SLOT_COUNT> {
        let pool = self.pool.as_ptr();
        let mut out = heapless::Vec::new();
        unsafe {
            for slot in 0..(*pool).slot_count() {
                out.push(*stat(pool, slot)).map_err(|_| ()).unwrap();
            }
        }
        out
    }

    pub fn free_page_count(&self) -> usize {
        unsafe { (*self.pool.as_ptr()).pfree }
    }

    pub fn data(&self) -> *mut u8 {
        unsafe { (*self.pool.as_ptr()).data }
    }

    pub fn set_data(&mut self, data: *mut u8) {
        unsafe { (*self.pool.as_ptr()).data = data }
    }
}

fn slots(pool: *mut PoolHdr) -> *mut PageDesc {
    // The slot sentinels sit immediately after the header.
    unsafe { pool.add(1) as *mut PageDesc }
}

unsafe fn free_sentinel(pool: *mut PoolHdr) -> *mut PageDesc {
    addr_of_mut!((*pool).free)
}

unsafe fn stat(pool: *mut PoolHdr, slot: usize) -> *mut SlotStats {
    (*pool).stats.add(slot)
}

/// Data frame backing a descriptor.
unsafe fn page_addr(pool: *mut PoolHdr, page: *mut PageDesc) -> usize {
    let idx = page.offset_from((*pool).pages) as usize;
    (*pool).start + (idx << (*pool).page_shift)
}

/// Descriptor of the frame containing `p`. Undefined outside `[start, end)`.
unsafe fn page_of(pool: *mut PoolHdr, p: usize) -> *mut PageDesc {
    (*pool).pages.add((p - (*pool).start) >> (*pool).page_shift)
}

unsafe fn junk(pool: *mut PoolHdr, p: *mut u8, len: usize) {
    if (*pool).flags.contains(PoolFlags::JUNK_FILL) {
        ptr::write_bytes(p, 0xA5, len);
    }
}

/// Object slots at the start of a SMALL frame consumed by its own bitmap.
fn small_reserved_slots(page_size: usize, shift: u32) -> usize {
    max(1, (page_size >> shift) / ((1usize << shift) * 8))
}

/// Bitmap words tracking one SMALL frame.
fn small_map_words(page_size: usize, shift: u32) -> usize {
    (page_size >> shift) / WORD_BITS
}

unsafe fn alloc_locked(pool: *mut PoolHdr, size: usize) -> Result<NonNull<u8>> {
    if size > (*pool).max_slab() {
        debug!("slab alloc: {size}");

        let mask = (*pool).page_size() - 1;
        let count = (size >> (*pool).page_shift) + usize::from(size & mask != 0);
        let page = alloc_pages(pool, count)?;

        return Ok(NonNull::new_unchecked(page_addr(pool, page) as *mut u8));
    }

    let (shift, slot) = if size > (*pool).min_size {
        let shift = usize::BITS - (size - 1).leading_zeros();
        (shift, (shift - (*pool).min_shift) as usize)
    } else {
        ((*pool).min_shift, 0)
    };

    (*stat(pool, slot)).reqs += 1;

    debug!("slab alloc: {size} slot: {slot}");

    let sentinel = slots(pool).add(slot);
    let page = (*sentinel).next;

    if (*page).next != page {
        if let Some(p) = alloc_from_partial(pool, page, shift, slot) {
            debug!("slab alloc: 0x{p:X}");
            return Ok(NonNull::new_unchecked(p as *mut u8));
        }

        // A page on a slot list must have a free object. Report, leave the
        // page where it is, and fall through to a fresh one.
        error!("slab alloc: page is busy");
    }

    if let Ok(page) = alloc_pages(pool, 1) {
        let p = init_class_page(pool, page, shift, slot);
        debug!("slab alloc: 0x{p:X}");
        return Ok(NonNull::new_unchecked(p as *mut u8));
    }

    (*stat(pool, slot)).fails += 1;
    Err(Error::NoMemory)
}

/// Takes one object from the partially used page at the head of slot
/// `slot`'s list, unlinking the page if that filled it. `None` means the
/// page had no free object, which is an inconsistency the caller reports.
unsafe fn alloc_from_partial(
    pool: *mut PoolHdr,
    page: *mut PageDesc,
    shift: u32,
    slot: usize,
) -> Option<usize> {
    let exact_shift = (*pool).exact_shift();
    let page_size = (*pool).page_size();

    if shift < exact_shift {
        let frame = page_addr(pool, page);
        let bitmap = frame as *mut usize;
        let map = small_map_words(page_size, shift);

        for n in 0..map {
            let word = bitmap.add(n);
            if *word == BUSY {
                continue;
            }

            let bit = (!*word).trailing_zeros() as usize;
            *word |= 1 << bit;

            (*stat(pool, slot)).used += 1;

            if *word == BUSY && (n + 1..map).all(|i| *bitmap.add(i) == BUSY) {
                unlink(page);
                (*page).next = null_mut();
                (*page).prev = PageType::Small.tag();
            }

            return Some(frame + ((n * WORD_BITS + bit) << shift));
        }

        None
    } else if shift == exact_shift {
        if (*page).slab == BUSY {
            return None;
        }

        let bit = (!(*page).slab).trailing_zeros() as usize;
        (*page).slab |= 1 << bit;

        if (*page).slab == BUSY {
            unlink(page);
            (*page).next = null_mut();
            (*page).prev = PageType::Exact.tag();
        }

        (*stat(pool, slot)).used += 1;

        Some(page_addr(pool, page) + (bit << shift))
    } else {
        let mask = ((1usize << (page_size >> shift)) - 1) << MAP_SHIFT;
        let avail = !(*page).slab & mask;
        if avail == 0 {
            return None;
        }

        let i = avail.trailing_zeros() - MAP_SHIFT;
        (*page).slab |= 1usize << (i + MAP_SHIFT);

        if (*page).slab & MAP_MASK == mask {
            unlink(page);
            (*page).next = null_mut();
            (*page).prev = PageType::Big.tag();
        }

        (*stat(pool, slot)).used += 1;

        Some(page_addr(pool, page) + ((i as usize) << shift))
    }
}

/// Turns a fresh frame into a class-`slot` page linked at the head of its
/// slot list, and allocates the first object from it.
unsafe fn init_class_page(pool: *mut PoolHdr, page: *mut PageDesc, shift: u32, slot: usize) -> usize {
    let sentinel = slots(pool).add(slot);
    let exact_shift = (*pool).exact_shift();
    let page_size = (*pool).page_size();

    let p = if shift < exact_shift {
        let frame = page_addr(pool, page);
        let bitmap = frame as *mut usize;
        let n = small_reserved_slots(page_size, shift);

        // `n` object slots hold the bitmap itself; the bit above them is
        // the first object, allocated here.
        bitmap.write((2usize << n) - 1);

        for i in 1..small_map_words(page_size, shift) {
            bitmap.add(i).write(0);
        }

        (*page).slab = shift as usize;
        (*page).next = sentinel;
        (*page).set_prev_link(sentinel, PageType::Small);
        (*sentinel).next = page;

        (*stat(pool, slot)).total += (page_size >> shift) - n;

        frame + (n << shift)
    } else if shift == exact_shift {
        (*page).slab = 1;
        (*page).next = sentinel;
        (*page).set_prev_link(sentinel, PageType::Exact);
        (*sentinel).next = page;

        (*stat(pool, slot)).total += WORD_BITS;

        page_addr(pool, page)
    } else {
        (*page).slab = (1usize << MAP_SHIFT) | shift as usize;
        (*page).next = sentinel;
        (*page).set_prev_link(sentinel, PageType::Big);
        (*sentinel).next = page;

        (*stat(pool, slot)).total += page_size >> shift;

        page_addr(pool, page)
    };

    (*stat(pool, slot)).used += 1;

    p
}

unsafe fn free_locked(pool: *mut PoolHdr, p: usize) -> Result<()> {
    debug!("slab free: 0x{p:X}");

    if p < (*pool).start || p >= (*pool).end {
        error!("slab free: pointer 0x{p:X} is outside of pool");
        return Err(Error::OutsidePool(p));
    }

    let page_size = (*pool).page_size();
    let page = page_of(pool, p);

    // Alignment slack can leave addressable bytes past the last frame.
    if page >= (*pool).last {
        error!("slab free: pointer 0x{p:X} is outside of pool");
        return Err(Error::OutsidePool(p));
    }

    let slab = (*page).slab;

    match (*page).page_type() {
        PageType::Small => {
            let shift = (slab & SHIFT_MASK) as u32;
            let size = 1usize << shift;

            if p & (size - 1) != 0 {
                return Err(wrong_chunk(p));
            }

            let obj = (p & (page_size - 1)) >> shift;
            let m = 1usize << (obj % WORD_BITS);
            let n = obj / WORD_BITS;
            let bitmap = (p & !(page_size - 1)) as *mut usize;

            if *bitmap.add(n) & m == 0 {
                return Err(chunk_already_free(p));
            }

            let slot = (shift - (*pool).min_shift) as usize;

            if (*page).next.is_null() {
                relink_partial(pool, page, slot, PageType::Small);
            }

            *bitmap.add(n) &= !m;

            let reserved = small_reserved_slots(page_size, shift);
            let empty = *bitmap & !((1usize << reserved) - 1) == 0
                && (1..small_map_words(page_size, shift)).all(|i| *bitmap.add(i) == 0);

            if empty {
                free_pages(pool, page, 1);
                (*stat(pool, slot)).total -= (page_size >> shift) - reserved;
            }

            finish_chunk_free(pool, slot, p, size);
            Ok(())
        }

        PageType::Exact => {
            let size = (*pool).exact_size();

            if p & (size - 1) != 0 {
                return Err(wrong_chunk(p));
            }

            let m = 1usize << ((p & (page_size - 1)) >> (*pool).exact_shift());

            if slab & m == 0 {
                return Err(chunk_already_free(p));
            }

            let slot = ((*pool).exact_shift() - (*pool).min_shift) as usize;

            if slab == BUSY {
                relink_partial(pool, page, slot, PageType::Exact);
            }

            (*page).slab &= !m;

            if (*page).slab == 0 {
                free_pages(pool, page, 1);
                (*stat(pool, slot)).total -= WORD_BITS;
            }

            finish_chunk_free(pool, slot, p, size);
            Ok(())
        }

        PageType::Big => {
            let shift = (slab & SHIFT_MASK) as u32;
            let size = 1usize << shift;

            if p & (size - 1) != 0 {
                return Err(wrong_chunk(p));
            }

            let m = 1usize << (((p & (page_size - 1)) >> shift) + MAP_SHIFT as usize);

            if slab & m == 0 {
                return Err(chunk_already_free(p));
            }

            let slot = (shift - (*pool).min_shift) as usize;

            if (*page).next.is_null() {
                relink_partial(pool, page, slot, PageType::Big);
            }

            (*page).slab &= !m;

            if (*page).slab & MAP_MASK == 0 {
                free_pages(pool, page, 1);
                (*stat(pool, slot)).total -= page_size >> shift;
            }

            finish_chunk_free(pool, slot, p, size);
            Ok(())
        }

        PageType::Page => {
            if p & (page_size - 1) != 0 {
                return Err(wrong_chunk(p));
            }

            if slab & PAGE_START == 0 {
                error!("slab free: page 0x{p:X} is already free");
                return Err(Error::PageAlreadyFree(p));
            }

            if slab == PAGE_BUSY {
                error!("slab free: pointer 0x{p:X} to wrong page");
                return Err(Error::WrongPage(p));
            }

            let count = slab & !PAGE_START;

            free_pages(pool, page, count);
            junk(pool, p as *mut u8, count << (*pool).page_shift);

            Ok(())
        }
    }
}

/// Puts a previously full page back at the head of its slot list.
unsafe fn relink_partial(pool: *mut PoolHdr, page: *mut PageDesc, slot: usize, ty: PageType) {
    let sentinel = slots(pool).add(slot);

    (*page).next = (*sentinel).next;
    (*sentinel).next = page;

    (*page).set_prev_link(sentinel, ty);
    (*(*page).next).set_prev_link(page, ty);
}

unsafe fn finish_chunk_free(pool: *mut PoolHdr, slot: usize, p: usize, size: usize) {
    (*stat(pool, slot)).used -= 1;
    junk(pool, p as *mut u8, size);
}

fn wrong_chunk(p: usize) -> Error {
    error!("slab free: pointer 0x{p:X} to wrong chunk");
    Error::WrongChunk(p)
}

fn chunk_already_free(p: usize) -> Error {
    error!("slab free: chunk 0x{p:X} is already free");
    Error::ChunkAlreadyFree(p)
}

/// First-fit allocation of `count` contiguous frames off the free-run list.
unsafe fn alloc_pages(pool: *mut PoolHdr, count: usize) -> Result<*mut PageDesc> {
    let sentinel = free_sentinel(pool);
    let mut page = (*sentinel).next;

    while page != sentinel {
        if (*page).slab >= count {
            if (*page).slab > count {
                // Split: the remainder keeps the run's list links, and the
                // run's last descriptor now backs-points at the new head.
                let tail = page.add(count);

                (*page.add((*page).slab - 1)).prev = tail as usize;

                (*tail).slab = (*page).slab - count;
                (*tail).next = (*page).next;
                (*tail).prev = (*page).prev;

                (*(*page).prev_link()).next = tail;
                (*(*page).next).prev = tail as usize;
            } else {
                unlink(page);
            }

            (*page).slab = count | PAGE_START;
            (*page).next = null_mut();
            (*page).prev = PageType::Page.tag();

            (*pool).pfree -= count;

            for i in 1..count {
                let interior = page.add(i);
                (*interior).slab = PAGE_BUSY;
                (*interior).next = null_mut();
                (*interior).prev = PageType::Page.tag();
            }

            return Ok(page);
        }

        page = (*page).next;
    }

    if (*pool).flags.contains(PoolFlags::LOG_NOMEM) {
        error!("slab alloc failed: no memory");
    }

    Err(Error::NoMemory)
}

/// Returns `count` frames starting at `page` to the free-run list, merging
/// with the neighboring runs on both sides.
unsafe fn free_pages(pool: *mut PoolHdr, page: *mut PageDesc, count: usize) {
    (*pool).pfree += count;

    (*page).slab = count;

    // Index of the run's last descriptor relative to its head; grows as
    // neighbors are absorbed.
    let mut tail = count - 1;
    if tail > 0 {
        ptr::write_bytes(page.add(1), 0, tail);
    }

    if !(*page).next.is_null() {
        unlink(page);
    }

    let mut page = page;

    let join = page.add((*page).slab);
    if join < (*pool).last && (*join).page_type() == PageType::Page && !(*join).next.is_null() {
        tail += (*join).slab;
        (*page).slab += (*join).slab;

        unlink(join);

        (*join).slab = PAGE_FREE;
        (*join).next = null_mut();
        (*join).prev = PageType::Page.tag();
    }

    if page > (*pool).pages {
        let mut join = page.sub(1);

        if (*join).page_type() == PageType::Page {
            // An interior cell of a longer run; its tail back-pointer leads
            // to the head.
            if (*join).slab == PAGE_FREE {
                join = (*join).prev_link();
            }

            if !(*join).next.is_null() {
                tail += (*join).slab;
                (*join).slab += (*page).slab;

                unlink(join);

                (*page).slab = PAGE_FREE;
                (*page).next = null_mut();
                (*page).prev = PageType::Page.tag();

                page = join;
            }
        }
    }

    if tail > 0 {
        (*page.add(tail)).prev = page as usize;
    }

    let sentinel = free_sentinel(pool);

    (*page).prev = sentinel as usize;
    (*page).next = (*sentinel).next;
    (*(*page).next).prev = page as usize;
    (*sentinel).next = page;
}
