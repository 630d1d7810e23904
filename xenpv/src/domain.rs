//! Domain-wide state of the Xen interface.
//!
//! A [`XenDomain`] is shared by the controllers of every vcpu of a domain. It owns the pages
//! that stay mapped once the guest installs them and the event channel subsystem.
use crate::{abi::CallbackVia, config::Config, evtchn::EventChannel};
use alloc::boxed::Box;
use hvcore::{probe::MappedPage, vm::Gpa, Probe, VmError};
use log::info;
use spin::{Mutex, Once};

/// Xen state of a domain.
pub struct XenDomain {
    config: Config,
    shared_info: Once<MappedPage>,
    console: Once<MappedPage>,
    callback_via: Mutex<Option<CallbackVia>>,
    evtchn: Box<dyn EventChannel>,
}

impl XenDomain {
    /// Create the Xen state of a domain with `evtchn` as its event channel subsystem.
    pub fn new(config: Config, evtchn: impl EventChannel + 'static) -> Self {
        Self {
            config,
            shared_info: Once::new(),
            console: Once::new(),
            callback_via: Mutex::new(None),
            evtchn: Box::new(evtchn),
        }
    }

    /// Configuration of this domain.
    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Event channel subsystem of this domain.
    #[inline]
    pub fn evtchn(&self) -> &dyn EventChannel {
        self.evtchn.as_ref()
    }

    /// Install the shared info page at `gpa`.
    ///
    /// Only the first successful call maps a page. Every later call returns that page, whatever
    /// its `gpa`, and the caller decides whether the request matches.
    pub fn install_shared_info(&self, p: &dyn Probe, gpa: Gpa) -> Result<&MappedPage, VmError> {
        self.shared_info.try_call_once(|| {
            let page = MappedPage::map(p, gpa)?;
            info!("xen: shared info installed at {gpa}");
            Ok(page)
        })
    }

    /// The shared info page, if installed.
    #[inline]
    pub fn shared_info(&self) -> Option<&MappedPage> {
        self.shared_info.get()
    }

    /// The console ring, mapped on the first call.
    pub fn console(&self, p: &dyn Probe) -> Result<&MappedPage, VmError> {
        self.console.try_call_once(|| {
            let page = MappedPage::map(p, self.config.console_gpa)?;
            info!("xen: console ring mapped at {}", self.config.console_gpa);
            Ok(page)
        })
    }

    /// Deliver the upcalls of this domain through `via`.
    pub fn set_callback_via(&self, via: CallbackVia) {
        let mut guard = self.callback_via.lock();
        self.evtchn.set_callback_via(via.vector());
        *guard = Some(via);
        info!("xen: callback vector {:#x}", via.vector());
    }

    /// The current callback.
    pub fn callback_via(&self) -> Option<CallbackVia> {
        *self.callback_via.lock()
    }
}
