//! In-memory guest for tests.
//!
//! [`MockMemory`] is a flat guest RAM starting at guest physical address 0. Guest virtual
//! addresses translate to guest physical addresses by subtracting a fixed offset, like a
//! direct map. Every mapping is counted so tests can check that scoped mappings are released
//! and that once-only pages are mapped once.
use crate::{
    probe::Probe,
    vm::{DomId, E820Entry, Gpa, Gva, Hva, VmOps},
    VmError,
};
use alloc::{boxed::Box, vec, vec::Vec};
use bytemuck::Pod;
use core::{
    cell::UnsafeCell,
    sync::atomic::{AtomicIsize, AtomicUsize, Ordering},
};

/// A domain with a fixed id and memory layout.
pub struct MockVm {
    domid: DomId,
    e820: Vec<E820Entry>,
}

impl MockVm {
    /// Create a domain `domid` with the layout `e820`.
    pub fn new(domid: DomId, e820: Vec<E820Entry>) -> Self {
        Self { domid, e820 }
    }
}

impl VmOps for MockVm {
    fn domid(&self) -> DomId {
        self.domid
    }

    fn e820(&self) -> &[E820Entry] {
        &self.e820
    }
}

/// Flat guest RAM.
pub struct MockMemory {
    ram: Box<[UnsafeCell<u8>]>,
    gva_offset: usize,
    maps: AtomicUsize,
    outstanding: AtomicIsize,
}

// SAFETY: guest memory is shared with the guest by nature; accesses go through raw pointers.
unsafe impl Sync for MockMemory {}

impl MockMemory {
    /// Create `size` bytes of zeroed guest RAM, with gva == gpa.
    pub fn new(size: usize) -> Self {
        Self {
            ram: (0..size).map(|_| UnsafeCell::new(0)).collect(),
            gva_offset: 0,
            maps: AtomicUsize::new(0),
            outstanding: AtomicIsize::new(0),
        }
    }

    /// Translate gva to gpa by subtracting `offset`.
    pub fn with_gva_offset(mut self, offset: usize) -> Self {
        self.gva_offset = offset;
        self
    }

    /// Number of successful mappings so far.
    pub fn maps(&self) -> usize {
        self.maps.load(Ordering::SeqCst)
    }

    /// Number of mappings that are not released.
    pub fn outstanding(&self) -> isize {
        self.outstanding.load(Ordering::SeqCst)
    }

    fn base(&self) -> *mut u8 {
        self.ram.as_ptr() as *mut u8
    }

    fn range(&self, gpa: usize, len: usize) -> Option<usize> {
        gpa.checked_add(len)
            .filter(|end| *end <= self.ram.len())
            .map(|_| gpa)
    }

    /// Copy bytes out of the guest RAM.
    ///
    /// Panics if the range is outside of the RAM.
    pub fn read_vec(&self, gpa: usize, len: usize) -> Vec<u8> {
        let start = self.range(gpa, len).expect("read outside of guest RAM");
        let mut v = vec![0; len];
        // SAFETY: the range is checked.
        unsafe { core::ptr::copy_nonoverlapping(self.base().add(start), v.as_mut_ptr(), len) };
        v
    }

    /// Copy bytes into the guest RAM.
    ///
    /// Panics if the range is outside of the RAM.
    pub fn write(&self, gpa: usize, bytes: &[u8]) {
        let start = self.range(gpa, bytes.len()).expect("write outside of guest RAM");
        // SAFETY: the range is checked.
        unsafe {
            core::ptr::copy_nonoverlapping(bytes.as_ptr(), self.base().add(start), bytes.len())
        };
    }

    /// Read a record out of the guest RAM.
    pub fn read_pod<T: Pod>(&self, gpa: usize) -> T {
        bytemuck::pod_read_unaligned(&self.read_vec(gpa, core::mem::size_of::<T>()))
    }

    /// Write a record into the guest RAM.
    pub fn write_pod<T: Pod>(&self, gpa: usize, value: &T) {
        self.write(gpa, bytemuck::bytes_of(value))
    }
}

unsafe impl Probe for MockMemory {
    fn map_gpa(&self, gpa: Gpa, len: usize) -> Result<Hva, VmError> {
        let start = self
            .range(gpa.into_usize(), len)
            .ok_or(VmError::GpaNotMapped(gpa, len))?;
        self.maps.fetch_add(1, Ordering::SeqCst);
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        Ok(Hva::new(self.base() as usize + start))
    }

    fn map_gva(&self, gva: Gva, len: usize) -> Result<Hva, VmError> {
        let gpa = gva
            .into_usize()
            .checked_sub(self.gva_offset)
            .and_then(Gpa::new)
            .ok_or(VmError::GvaNotMapped(gva, len))?;
        self.map_gpa(gpa, len)
            .map_err(|_| VmError::GvaNotMapped(gva, len))
    }

    fn unmap(&self, _hva: Hva, _len: usize) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}
