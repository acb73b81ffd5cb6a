//! Devices as a composition of capability handlers.
//!
//! A [`Device`] is an id, a product type and a fixed, ordered list of
//! handlers. The list is set while building through the [`DeviceBuilder`]
//! and never changes afterwards. The order of the `add` calls is the order
//! in which the router asks the handlers.

pub mod module;
pub mod registry;

pub use module::{ModuleCommandHandler, OtaUpdate, MODULE_DEVICE_ID};
pub use registry::DeviceRegistry;

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::capability::{CapabilityHandler, DeviceHandle, EventLimits, HandledResult, Request};
use crate::queue::EventSender;

pub struct Device {
    id: String,
    product_type: String,
    handlers: Vec<Arc<dyn CapabilityHandler>>,
}

impl Device {
    pub fn builder(
        id: &str,
        product_type: &str,
        events: EventSender,
        limits: EventLimits,
    ) -> DeviceBuilder {
        DeviceBuilder {
            handle: DeviceHandle::new(id, events, limits),
            product_type: product_type.to_string(),
            handlers: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn product_type(&self) -> &str {
        &self.product_type
    }

    pub fn handlers(&self) -> &[Arc<dyn CapabilityHandler>] {
        &self.handlers
    }

    /// Capability names in composition order
    pub fn capabilities(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.capability()).collect()
    }

    /// First handler of type `T`, if any
    pub fn capability<T: CapabilityHandler>(&self) -> Option<Arc<T>> {
        self.handlers
            .iter()
            .find_map(|handler| handler.clone().as_any().downcast::<T>().ok())
    }

    pub fn supports<T: CapabilityHandler>(&self) -> bool {
        self.capability::<T>().is_some()
    }

    /// Asks the handlers in order. The first one to accept the request wins,
    /// even if its callback fails
    pub fn handle_request(&self, request: &Request<'_>) -> Option<HandledResult> {
        for handler in &self.handlers {
            let result = handler.try_handle(request);
            if result.handled {
                debug!(
                    "{} of {} handled {} (success: {})",
                    handler.capability(),
                    self.id,
                    request.action,
                    result.success
                );
                return Some(result);
            }
        }
        None
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("product_type", &self.product_type)
            .field("capabilities", &self.capabilities())
            .finish()
    }
}

/// Assembles a [`Device`] from capability handlers.
pub struct DeviceBuilder {
    handle: DeviceHandle,
    product_type: String,
    handlers: Vec<Arc<dyn CapabilityHandler>>,
}

impl DeviceBuilder {
    /// Appends a handler. `make` receives the device's [`DeviceHandle`]. The
    /// returned `Arc` is used to register callbacks and send events.
    ///
    /// Two handlers claiming the same action are a configuration error:
    /// only the one added first is ever asked.
    pub fn add<H, F>(&mut self, make: F) -> Arc<H>
    where
        H: CapabilityHandler,
        F: FnOnce(DeviceHandle) -> H,
    {
        let handler = Arc::new(make(self.handle.clone()));
        self.handlers.push(handler.clone());
        handler
    }

    pub fn handle(&self) -> &DeviceHandle {
        &self.handle
    }

    pub fn build(self) -> Arc<Device> {
        Arc::new(Device {
            id: self.handle.device_id().to_string(),
            product_type: self.product_type,
            handlers: self.handlers,
        })
    }
}
