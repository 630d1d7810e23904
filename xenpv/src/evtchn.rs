//! Event channel operations.
use crate::{
    abi::{EventChannelOp, EvtchnInitControl},
    domain::XenDomain,
    hypercall::{HcallError, HypercallArgs},
};
use alloc::sync::Arc;
use hvcore::{probe::GuestRef, Probe};

/// The event channel subsystem of a domain.
///
/// The subsystem owns the ports and their delivery. This layer only forwards guest requests
/// to it.
pub trait EventChannel
where
    Self: Send + Sync,
{
    /// Deliver upcalls through the interrupt `vector`.
    fn set_callback_via(&self, vector: u8);
    /// Bind the console event channel and return its port.
    fn bind_console(&self) -> u64;
    /// Register the control block described by `ctl`, filling its output fields.
    fn init_control(&self, ctl: &mut EvtchnInitControl);
}

impl<T: EventChannel + ?Sized> EventChannel for Arc<T> {
    fn set_callback_via(&self, vector: u8) {
        (**self).set_callback_via(vector)
    }

    fn bind_console(&self) -> u64 {
        (**self).bind_console()
    }

    fn init_control(&self, ctl: &mut EvtchnInitControl) {
        (**self).init_control(ctl)
    }
}

/// Handle `event_channel_op`.
pub(crate) fn event_channel_op(
    domain: &XenDomain,
    args: &HypercallArgs,
    p: &dyn Probe,
) -> Result<(), HcallError> {
    match EventChannelOp::try_from(args.cmd).map_err(|_| HcallError::NotHandled)? {
        EventChannelOp::InitControl => {
            let mut arg =
                GuestRef::<EvtchnInitControl>::gva(p, args.arg()?).map_err(HcallError::fault)?;
            let mut ctl = arg.read();
            domain.evtchn().init_control(&mut ctl);
            arg.write(&ctl);
            Ok(())
        }
    }
}
