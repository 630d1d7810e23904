//! Guest memory accessor.
//!
//! A [`Probe`] translates guest addresses into host-accessible memory. On top of it, this
//! module builds the mapping discipline every handler follows:
//!
//! * [`GuestRef`] maps a single fixed-layout record and [`GuestSlice`] an array of them. Both
//!   are scoped: the mapping is released when the view is dropped, on every exit path.
//! * Records are plain old data ([`Pod`]). A record is read into a host copy once, validated on
//!   the copy, and written back explicitly. The guest can rewrite its memory at any time, so
//!   nothing is ever validated in place.
//! * [`MappedPage`] is the exception: a single page that stays mapped for the lifetime of the
//!   domain (e.g. the shared info page).
use crate::{
    vm::{Gpa, Gva, Hva, PAGE_SIZE},
    VmError,
};
use bytemuck::Pod;
use core::marker::PhantomData;

/// Traits to access the guest memory.
///
/// # Safety
/// A successful `map_gpa` or `map_gva` must return a host virtual address that is valid for
/// reads and writes of `len` bytes, without alignment guarantee, until the matching
/// [`Probe::unmap`] call. A mapping that is never unmapped must stay valid for the lifetime of
/// the domain.
pub unsafe trait Probe {
    /// Map `len` bytes of guest physical memory from `gpa`.
    fn map_gpa(&self, gpa: Gpa, len: usize) -> Result<Hva, VmError>;
    /// Map `len` bytes of guest virtual memory from `gva`.
    fn map_gva(&self, gva: Gva, len: usize) -> Result<Hva, VmError>;
    /// Release a mapping returned by `map_gpa` or `map_gva`.
    fn unmap(&self, _hva: Hva, _len: usize) {}
}

// SAFETY: every call is forwarded to the underlying probe.
unsafe impl<P: Probe + ?Sized> Probe for &P {
    fn map_gpa(&self, gpa: Gpa, len: usize) -> Result<Hva, VmError> {
        (**self).map_gpa(gpa, len)
    }

    fn map_gva(&self, gva: Gva, len: usize) -> Result<Hva, VmError> {
        (**self).map_gva(gva, len)
    }

    fn unmap(&self, hva: Hva, len: usize) {
        (**self).unmap(hva, len)
    }
}

/// The access falls outside of the mapped region.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct OutOfBounds;

/// Scoped view of a guest record of type `T`.
pub struct GuestRef<'p, T: Pod> {
    probe: &'p dyn Probe,
    hva: Hva,
    _t: PhantomData<T>,
}

impl<'p, T: Pod> GuestRef<'p, T> {
    /// Map the record at the guest physical address `gpa`.
    pub fn gpa(probe: &'p dyn Probe, gpa: Gpa) -> Result<Self, VmError> {
        let hva = probe.map_gpa(gpa, core::mem::size_of::<T>())?;
        Ok(Self {
            probe,
            hva,
            _t: PhantomData,
        })
    }

    /// Map the record at the guest virtual address `gva`.
    pub fn gva(probe: &'p dyn Probe, gva: Gva) -> Result<Self, VmError> {
        let hva = probe.map_gva(gva, core::mem::size_of::<T>())?;
        Ok(Self {
            probe,
            hva,
            _t: PhantomData,
        })
    }

    /// Take a snapshot of the record.
    #[inline]
    pub fn read(&self) -> T {
        // SAFETY: the probe guarantees size_of::<T>() readable bytes, and T is Pod.
        unsafe { core::ptr::read_unaligned(self.hva.as_mut_ptr::<T>()) }
    }

    /// Write back the record.
    #[inline]
    pub fn write(&mut self, value: &T) {
        // SAFETY: the probe guarantees size_of::<T>() writable bytes.
        unsafe { core::ptr::write_unaligned(self.hva.as_mut_ptr::<T>(), *value) }
    }
}

impl<T: Pod> Drop for GuestRef<'_, T> {
    fn drop(&mut self) {
        self.probe.unmap(self.hva, core::mem::size_of::<T>());
    }
}

/// Scoped view of a guest array of `T`.
pub struct GuestSlice<'p, T: Pod> {
    probe: &'p dyn Probe,
    hva: Hva,
    len: usize,
    _t: PhantomData<T>,
}

impl<'p, T: Pod> GuestSlice<'p, T> {
    /// Map `len` elements at the guest physical address `gpa`.
    pub fn gpa(probe: &'p dyn Probe, gpa: Gpa, len: usize) -> Result<Self, VmError> {
        let size = Self::size_of(len).ok_or(VmError::GpaNotMapped(gpa, usize::MAX))?;
        let hva = probe.map_gpa(gpa, size)?;
        Ok(Self {
            probe,
            hva,
            len,
            _t: PhantomData,
        })
    }

    /// Map `len` elements at the guest virtual address `gva`.
    pub fn gva(probe: &'p dyn Probe, gva: Gva, len: usize) -> Result<Self, VmError> {
        let size = Self::size_of(len).ok_or(VmError::GvaNotMapped(gva, usize::MAX))?;
        let hva = probe.map_gva(gva, size)?;
        Ok(Self {
            probe,
            hva,
            len,
            _t: PhantomData,
        })
    }

    #[inline]
    fn size_of(len: usize) -> Option<usize> {
        len.checked_mul(core::mem::size_of::<T>())
    }

    /// Write `src` to the elements from `idx`.
    pub fn write_at(&mut self, idx: usize, src: &[T]) -> Result<(), OutOfBounds> {
        match idx.checked_add(src.len()) {
            Some(end) if end <= self.len => {
                let bytes: &[u8] = bytemuck::cast_slice(src);
                // SAFETY: [idx, end) is in bounds of the mapped array.
                unsafe {
                    core::ptr::copy_nonoverlapping(
                        bytes.as_ptr(),
                        self.hva.as_mut_ptr::<T>().add(idx) as *mut u8,
                        bytes.len(),
                    );
                }
                Ok(())
            }
            _ => Err(OutOfBounds),
        }
    }
}

impl<T: Pod> Drop for GuestSlice<'_, T> {
    fn drop(&mut self) {
        self.probe.unmap(self.hva, self.len * core::mem::size_of::<T>());
    }
}

/// A guest page that stays mapped for the lifetime of the domain.
#[derive(Debug)]
pub struct MappedPage {
    gpa: Gpa,
    hva: Hva,
}

impl MappedPage {
    /// Map the page at `gpa`, which must be page-aligned.
    pub fn map(probe: &dyn Probe, gpa: Gpa) -> Result<Self, VmError> {
        if !gpa.is_page_aligned() {
            return Err(VmError::GpaNotMapped(gpa, PAGE_SIZE));
        }
        let hva = probe.map_gpa(gpa, PAGE_SIZE)?;
        Ok(Self { gpa, hva })
    }

    /// Guest physical address of this page.
    #[inline]
    pub fn gpa(&self) -> Gpa {
        self.gpa
    }

    /// Host virtual address of this page.
    #[inline]
    pub fn hva(&self) -> Hva {
        self.hva
    }

    /// Copy `buf.len()` bytes out of the page from `offset`.
    pub fn read_bytes(&self, offset: usize, buf: &mut [u8]) -> Result<(), OutOfBounds> {
        Self::check(offset, buf.len())?;
        // SAFETY: the range is inside of the page, which is never unmapped.
        unsafe {
            core::ptr::copy_nonoverlapping(
                self.hva.as_mut_ptr::<u8>().add(offset),
                buf.as_mut_ptr(),
                buf.len(),
            );
        }
        Ok(())
    }

    /// Copy `bytes` into the page at `offset`.
    pub fn write_bytes(&self, offset: usize, bytes: &[u8]) -> Result<(), OutOfBounds> {
        Self::check(offset, bytes.len())?;
        // SAFETY: the range is inside of the page, which is never unmapped.
        unsafe {
            core::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                self.hva.as_mut_ptr::<u8>().add(offset),
                bytes.len(),
            );
        }
        Ok(())
    }

    #[inline]
    fn check(offset: usize, len: usize) -> Result<(), OutOfBounds> {
        match offset.checked_add(len) {
            Some(end) if end <= PAGE_SIZE => Ok(()),
            _ => Err(OutOfBounds),
        }
    }
}
