//! Xen public interface: hypercall numbers, sub-commands, and guest records.
//!
//! Layouts are the x86-64 layouts of the Xen public headers. Every record is [`Pod`], so a
//! host snapshot of guest memory is always a valid value.
use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Hypercalls served by this layer.
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u64)]
pub enum HypercallNr {
    /// `__HYPERVISOR_memory_op`
    MemoryOp = 12,
    /// `__HYPERVISOR_xen_version`
    XenVersion = 17,
    /// `__HYPERVISOR_event_channel_op`
    EventChannelOp = 32,
    /// `__HYPERVISOR_hvm_op`
    HvmOp = 34,
}

/// Number of slots of the hypercall page.
pub const HYPERCALL_SLOTS: usize = 55;
/// Size of one slot of the hypercall page.
pub const HYPERCALL_SLOT_SIZE: usize = 32;

/// Sub-commands of `memory_op`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u64)]
pub enum MemoryOp {
    /// `XENMEM_add_to_physmap`
    AddToPhysmap = 7,
    /// `XENMEM_memory_map`
    MemoryMap = 9,
}

/// Sub-commands of `xen_version`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u64)]
pub enum XenVersionOp {
    /// `XENVER_get_features`
    GetFeatures = 6,
}

/// Sub-commands of `hvm_op`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u64)]
pub enum HvmOp {
    /// `HVMOP_set_param`
    SetParam = 0,
    /// `HVMOP_get_param`
    GetParam = 1,
    /// `HVMOP_pagetable_dying`
    PagetableDying = 9,
}

/// Sub-commands of `event_channel_op`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u64)]
pub enum EventChannelOp {
    /// `EVTCHNOP_init_control`
    InitControl = 11,
}

/// HVM parameters.
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u32)]
pub enum HvmParam {
    /// `HVM_PARAM_CALLBACK_IRQ`
    CallbackIrq = 0,
    /// `HVM_PARAM_CONSOLE_PFN`
    ConsolePfn = 17,
    /// `HVM_PARAM_CONSOLE_EVTCHN`
    ConsoleEvtchn = 18,
}

/// Spaces of `XENMEM_add_to_physmap`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u32)]
pub enum MapSpace {
    /// `XENMAPSPACE_shared_info`
    SharedInfo = 0,
    /// `XENMAPSPACE_grant_table`
    GrantTable = 1,
    /// `XENMAPSPACE_gmfn`
    Gmfn = 2,
    /// `XENMAPSPACE_gmfn_range`
    GmfnRange = 3,
    /// `XENMAPSPACE_gmfn_foreign`
    GmfnForeign = 4,
    /// `XENMAPSPACE_dev_mmio`
    DevMmio = 5,
}

/// `DOMID_SELF`
pub const DOMID_SELF: u16 = 0x7FF0;

/// `XENFEAT_NR_SUBMAPS`
pub const XENFEAT_NR_SUBMAPS: u32 = 1;

/// Error numbers of the Xen ABI.
///
/// The result register holds the negated value.
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive)]
#[repr(i64)]
pub enum Errno {
    EFAULT = 14,
    EEXIST = 17,
    EINVAL = 22,
    ENOSYS = 38,
}

impl Errno {
    /// Value of the result register that reports this error.
    #[inline]
    pub fn as_ret(self) -> usize {
        (-i64::from(self)) as usize
    }
}

bitflags! {
    /// Feature submap 0 of `XENVER_get_features`.
    pub struct XenFeatures: u32 {
        const WRITABLE_PAGE_TABLES = 1 << 0;
        const WRITABLE_DESCRIPTOR_TABLES = 1 << 1;
        const AUTO_TRANSLATED_PHYSMAP = 1 << 2;
        const SUPERVISOR_MODE_KERNEL = 1 << 3;
        const PAE_PGDIR_ABOVE_4GB = 1 << 4;
        const MMU_PT_UPDATE_PRESERVE_AD = 1 << 5;
        const HIGHMEM_ASSIST = 1 << 6;
        const GNTTAB_MAP_AVAIL_BITS = 1 << 7;
        const HVM_CALLBACK_VECTOR = 1 << 8;
        const HVM_SAFE_PVCLOCK = 1 << 9;
        const HVM_PIRQS = 1 << 10;
        const DOM0 = 1 << 11;
        const GRANT_MAP_IDENTITY = 1 << 12;
        const MEMORY_OP_VNODE_SUPPORTED = 1 << 13;
        const ARM_SMCCC_SUPPORTED = 1 << 14;
        const LINUX_RSDP_UNRESTRICTED = 1 << 15;
    }
}

bitflags! {
    /// HVM features reported in eax of the fifth xen cpuid leaf.
    pub struct HvmCpuidFeatures: u32 {
        const APIC_ACCESS_VIRT = 1 << 0;
        const X2APIC_VIRT = 1 << 1;
        const IOMMU_MAPPINGS = 1 << 2;
        const VCPU_ID_PRESENT = 1 << 3;
        const DOMID_PRESENT = 1 << 4;
    }
}

/// "XenVMMXenVMM" in ebx, ecx, edx.
pub const XEN_CPUID_SIGNATURE: [u32; 3] = [0x566e6558, 0x65584d4d, 0x4d4d566e];

/// `struct xen_memory_map`
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(C)]
pub struct XenMemoryMap {
    /// On call the number of entries the buffer holds, on return the number written.
    pub nr_entries: u32,
    pub _pad: u32,
    /// Guest virtual address of an array of [`E820Entry`].
    pub buffer: u64,
}

/// `struct e820entry` as written to the guest.
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(C, packed)]
pub struct E820Entry {
    pub addr: u64,
    pub size: u64,
    pub typ: u32,
}

impl From<&hvcore::vm::E820Entry> for E820Entry {
    fn from(e: &hvcore::vm::E820Entry) -> Self {
        Self {
            addr: e.addr,
            size: e.size,
            typ: e.typ,
        }
    }
}

/// `struct xen_add_to_physmap`
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(C)]
pub struct XenAddToPhysmap {
    pub domid: u16,
    /// Number of pages for `XENMAPSPACE_gmfn_range`.
    pub size: u16,
    pub space: u32,
    pub idx: u64,
    /// Guest frame at which the page appears.
    pub gpfn: u64,
}

/// `struct xen_feature_info`
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(C)]
pub struct XenFeatureInfo {
    pub submap_idx: u32,
    pub submap: u32,
}

/// `struct xen_hvm_param`
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(C)]
pub struct XenHvmParam {
    pub domid: u16,
    pub _pad: u16,
    pub index: u32,
    pub value: u64,
}

/// `struct evtchn_init_control`
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(C)]
pub struct EvtchnInitControl {
    /// Guest frame of the control block.
    pub control_gfn: u64,
    /// Offset of the control block in the frame.
    pub offset: u32,
    pub vcpu: u32,
    /// Output: number of link bits.
    pub link_bits: u8,
    pub _pad: [u8; 7],
}

const CALLBACK_TYPE_SHIFT: u64 = 56;
const CALLBACK_TYPE_VECTOR: u64 = 2;

/// A validated `HVM_PARAM_CALLBACK_IRQ` value: deliver callbacks through a vector.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CallbackVia {
    vector: u8,
}

impl CallbackVia {
    /// The interrupt vector.
    #[inline]
    pub fn vector(&self) -> u8 {
        self.vector
    }
}

/// The value is not a vector callback, or its vector is reserved for exceptions.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct InvalidCallbackVia(pub u64);

impl TryFrom<u64> for CallbackVia {
    type Error = InvalidCallbackVia;

    fn try_from(via: u64) -> Result<Self, Self::Error> {
        if via >> CALLBACK_TYPE_SHIFT != CALLBACK_TYPE_VECTOR {
            return Err(InvalidCallbackVia(via));
        }
        match (via & 0xff) as u8 {
            vector @ 0x20..=0xff => Ok(Self { vector }),
            _ => Err(InvalidCallbackVia(via)),
        }
    }
}
