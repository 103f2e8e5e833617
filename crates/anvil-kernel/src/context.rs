//! [`KernelContext`] – the state shared by every module.
//!
//! One context is built during bootstrap and handed by reference to every
//! `init` call and to every task resume.  It owns the [`ConfigStore`], the
//! published module exports, and an outbox of events that tasks want queued
//! on the host.  Everything runs on the scheduling thread, so plain `Rc`
//! handles are enough.

use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;

use anvil_types::Event;

use crate::config_store::ConfigStore;
use crate::module::ModuleInfo;

pub struct KernelContext {
    config: ConfigStore,
    modules: Vec<ModuleInfo>,
    interfaces: HashMap<String, Rc<dyn Any>>,
    outbox: Vec<Event>,
}

impl KernelContext {
    pub fn new(config: ConfigStore, modules: Vec<ModuleInfo>) -> Self {
        Self {
            config,
            modules,
            interfaces: HashMap::new(),
            outbox: Vec::new(),
        }
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ConfigStore {
        &mut self.config
    }

    /// Every loaded module in registration order.
    pub fn modules(&self) -> &[ModuleInfo] {
        &self.modules
    }

    /// Fetch the exports published by `module_id`, downcast to `T`.
    ///
    /// Returns `None` when the module published nothing, has not been
    /// initialized yet, or published a different type.
    pub fn interface<T: Any>(&self, module_id: &str) -> Option<Rc<T>> {
        self.interfaces.get(module_id)?.clone().downcast::<T>().ok()
    }

    pub fn has_interface(&self, module_id: &str) -> bool {
        self.interfaces.contains_key(module_id)
    }

    pub(crate) fn publish(&mut self, module_id: &str, exports: Rc<dyn Any>) {
        self.interfaces.insert(module_id.to_string(), exports);
    }

    /// Ask the host to deliver `event` in a later cycle.
    pub fn queue_event(&mut self, event: Event) {
        self.outbox.push(event);
    }

    pub(crate) fn drain_outbox(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.outbox)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn empty() -> KernelContext {
        KernelContext::new(ConfigStore::new(), Vec::new())
    }

    #[test]
    fn interface_downcasts_to_published_type() {
        let mut ctx = empty();
        ctx.publish("inventory", Rc::new(Cell::new(12u32)));

        let counter = ctx.interface::<Cell<u32>>("inventory").unwrap();
        counter.set(13);
        assert_eq!(ctx.interface::<Cell<u32>>("inventory").unwrap().get(), 13);
    }

    #[test]
    fn interface_with_wrong_type_is_none() {
        let mut ctx = empty();
        ctx.publish("inventory", Rc::new(5u8));
        assert!(ctx.has_interface("inventory"));
        assert!(ctx.interface::<String>("inventory").is_none());
        assert!(ctx.interface::<u8>("crafting").is_none());
    }

    #[test]
    fn outbox_drains_in_queue_order() {
        let mut ctx = empty();
        ctx.queue_event(Event::new("a"));
        ctx.queue_event(Event::new("b"));
        let drained: Vec<String> = ctx.drain_outbox().into_iter().map(|e| e.kind).collect();
        assert_eq!(drained, ["a", "b"]);
        assert!(ctx.drain_outbox().is_empty());
    }
}
