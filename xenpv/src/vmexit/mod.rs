//! Vmexit controllers of the Xen interface.
pub mod cpuid;
pub mod hypercall;
pub mod msr;
