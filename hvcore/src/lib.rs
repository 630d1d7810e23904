//! Core abstractions of a hardware-assisted hypervisor, seen from the vmexit handlers.
//!
//! The paravirtual interfaces built on top of this crate never touch the VMX hardware themselves.
//! The trap plumbing (vmlaunch/vmresume, decoding the raw exit reason, reading the exit
//! instruction length) lives below this crate and hands every interesting vmexit to a
//! [`VmexitController`] together with two things:
//!
//! * a [`GenericVCpuState`], which exposes the general purpose registers of the trapped vcpu,
//!   its id, the domain that owns it, and [`GenericVCpuState::forward_rip`] to commit the
//!   emulated instruction;
//! * a [`Probe`], the guest memory accessor. Every guest-supplied address is translated through
//!   the probe and turned into a scoped host view ([`GuestRef`], [`GuestSlice`]) that lives for
//!   one emulated operation only.
//!
//! ## Controllers
//! Controllers are composed as tuples. `(a, b)` first asks `a`; when `a` answers
//! [`VmError::HandleVmexitFailed`], the same exit is passed to `b`. The unit controller `()`
//! terminates the chain and refuses everything.
//!
//! ```ignore
//! let mut controller = (cpuid_ctl, (msr_ctl, hypercall_ctl));
//! vcpu.handle_vmexit(raw_reason, instruction_len, &mut controller, &mut probe)?;
//! ```
//!
//! ## Guest memory
//! With EPT, a guest physical address ([`Gpa`]) has to be translated into a host virtual
//! address ([`Hva`]) before the hypervisor can read or write it, and a guest virtual address
//! ([`Gva`]) additionally walks the guest page table. Guest memory is writable by the guest
//! at any time, so records are always copied out into a host snapshot before they are
//! validated, and copied back explicitly.
//!
//! [`VmexitController`]: vmexits::VmexitController
//! [`GenericVCpuState`]: vcpu::GenericVCpuState
//! [`GenericVCpuState::forward_rip`]: vcpu::GenericVCpuState::forward_rip
//! [`Probe`]: probe::Probe
//! [`GuestRef`]: probe::GuestRef
//! [`GuestSlice`]: probe::GuestSlice
//! [`Gpa`]: vm::Gpa
//! [`Gva`]: vm::Gva
//! [`Hva`]: vm::Hva

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod probe;
pub mod vcpu;
pub mod vm;
pub mod vmcs;
pub mod vmexits;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use probe::Probe;

use alloc::boxed::Box;
use vm::{Gpa, Gva};
use vmcs::ExitReason;

/// Possible errors of the hypervisor core.
#[derive(Debug)]
pub enum VmError {
    /// The controller does not handle this exit.
    ///
    /// This is how a controller signals "not handled": the next controller in the chain gets
    /// the exit, and the last one gives it back to the trap plumbing.
    HandleVmexitFailed(ExitReason),
    /// `len` bytes from the guest physical address are not backed by guest memory.
    GpaNotMapped(Gpa, usize),
    /// `len` bytes from the guest virtual address are not translatable.
    GvaNotMapped(Gva, usize),
    /// The domain that owns the vcpu has been torn down.
    VmDestroyed,
    /// Controller-specific error.
    ControllerError(Box<dyn core::fmt::Debug + Send + Sync>),
}

impl core::fmt::Display for VmError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            VmError::HandleVmexitFailed(reason) => write!(f, "unhandled vmexit: {reason:?}"),
            VmError::GpaNotMapped(gpa, len) => write!(f, "{gpa} (+0x{len:x}) is not mapped"),
            VmError::GvaNotMapped(gva, len) => write!(f, "{gva} (+0x{len:x}) is not mapped"),
            VmError::VmDestroyed => write!(f, "vm is destroyed"),
            VmError::ControllerError(e) => write!(f, "controller error: {e:?}"),
        }
    }
}
