//! Domain interface and guest address types.

/// Size of a guest page.
pub const PAGE_SIZE: usize = 0x1000;
/// Shift of a guest page frame number.
pub const PAGE_SHIFT: usize = 12;

/// Guest virtual address
#[repr(transparent)]
#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct Gva(usize);

impl Gva {
    /// Create a new virtual address with a canonical check.
    #[inline(always)]
    pub const fn new(addr: usize) -> Option<Self> {
        match addr & 0xffff_8000_0000_0000 {
            m if m == 0xffff_8000_0000_0000 || m == 0 => Some(Self(addr)),
            _ => None,
        }
    }

    /// Cast into usize.
    #[inline]
    pub const fn into_usize(self) -> usize {
        self.0
    }
}

/// Guest physical address
#[repr(transparent)]
#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct Gpa(usize);

impl Gpa {
    /// First address past the guest physical address space.
    pub const END: Self = Self(0xffff_0000_0000_0000);

    /// Create a new physical address with a check.
    #[inline]
    pub const fn new(addr: usize) -> Option<Self> {
        if addr < Self::END.0 {
            Some(Self(addr))
        } else {
            None
        }
    }

    /// Create the address of the guest page frame `gfn`.
    #[inline]
    pub const fn from_gfn(gfn: u64) -> Option<Self> {
        if gfn >= (1 << (48 - PAGE_SHIFT)) {
            return None;
        }
        Self::new((gfn as usize) << PAGE_SHIFT)
    }

    /// Guest page frame number of this address.
    #[inline]
    pub const fn gfn(self) -> u64 {
        (self.0 >> PAGE_SHIFT) as u64
    }

    /// Whether this address is aligned to a page.
    #[inline]
    pub const fn is_page_aligned(self) -> bool {
        self.0 & (PAGE_SIZE - 1) == 0
    }

    /// Cast into usize.
    #[inline]
    pub const fn into_usize(self) -> usize {
        self.0
    }
}

/// Host virtual address that backs a piece of guest memory.
#[repr(transparent)]
#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct Hva(usize);

impl Hva {
    /// Wrap a host virtual address.
    #[inline]
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// Cast into usize.
    #[inline]
    pub const fn into_usize(self) -> usize {
        self.0
    }

    #[inline]
    pub(crate) fn as_mut_ptr<T>(self) -> *mut T {
        self.0 as *mut T
    }
}

macro_rules! impl_fmt {
    ($t: ident) => {
        impl core::fmt::Debug for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, concat!(stringify!($t), "(0x{:x})"), self.0)
            }
        }
        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, concat!(stringify!($t), "(0x{:x})"), self.0)
            }
        }
    };
}

impl_fmt!(Gva);
impl_fmt!(Gpa);
impl_fmt!(Hva);

/// Domain identifier.
pub type DomId = u16;

/// Type of an E820 region.
pub mod e820_type {
    /// Usable RAM.
    pub const RAM: u32 = 1;
    /// Reserved.
    pub const RESERVED: u32 = 2;
    /// ACPI reclaimable.
    pub const ACPI: u32 = 3;
    /// ACPI NVS.
    pub const NVS: u32 = 4;
    /// Unusable.
    pub const UNUSABLE: u32 = 5;
}

/// A region of the guest physical memory layout.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct E820Entry {
    /// Start of the region.
    pub addr: u64,
    /// Size of the region in bytes.
    pub size: u64,
    /// Type of the region. See [`e820_type`].
    pub typ: u32,
}

impl E820Entry {
    /// Create a new E820 entry.
    pub const fn new(addr: u64, size: u64, typ: u32) -> Self {
        Self { addr, size, typ }
    }
}

/// The domain, as seen by its vcpus.
pub trait VmOps
where
    Self: Send + Sync,
{
    /// Identifier of this domain.
    fn domid(&self) -> DomId;
    /// The authoritative physical memory layout of this domain.
    ///
    /// The layout is fixed at domain creation.
    fn e820(&self) -> &[E820Entry];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_gva() {
        assert!(Gva::new(0xffff_8880_0000_1000).is_some());
        assert!(Gva::new(0x0000_7fff_ffff_f000).is_some());
        assert!(Gva::new(0x0000_8000_0000_0000).is_none());
    }

    #[test]
    fn gfn_conversion() {
        let gpa = Gpa::from_gfn(0xfeff).unwrap();
        assert_eq!(gpa.into_usize(), 0xfeff000);
        assert_eq!(gpa.gfn(), 0xfeff);
        assert!(gpa.is_page_aligned());
        assert!(Gpa::from_gfn(u64::MAX).is_none());
        assert!(!Gpa::new(0xfeff008).unwrap().is_page_aligned());
        assert!(Gpa::new(Gpa::END.into_usize()).is_none());
    }
}
