//! Shared, externally owned state containers.
//!
//! A [`Store`] outlives any single component: it is created by the
//! application, optionally registered in a [`StoreRegistry`] handed to the
//! renderer, and lives as long as its longest holder. Components subscribe
//! through `use_store`; the subscription is removed when the component
//! unmounts.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use crate::error::{panic_message, EffectError};
use crate::hash::HashMap;

type Listener<T> = Rc<dyn Fn(&T) -> Result<(), EffectError>>;

struct StoreInner<T> {
    value: RefCell<T>,
    listeners: RefCell<Vec<(u64, Listener<T>)>>,
    next_listener: Cell<u64>,
    name: Option<&'static str>,
}

/// Reference-counted observable value.
pub struct Store<T> {
    inner: Rc<StoreInner<T>>,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> Store<T> {
    pub fn new(value: T) -> Self {
        Self::build(value, None)
    }

    /// A store whose name shows up in listener failure logs.
    pub fn named(name: &'static str, value: T) -> Self {
        Self::build(value, Some(name))
    }

    fn build(value: T, name: Option<&'static str>) -> Self {
        Self {
            inner: Rc::new(StoreInner {
                value: RefCell::new(value),
                listeners: RefCell::new(Vec::new()),
                next_listener: Cell::new(1),
                name,
            }),
        }
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.inner.value.borrow().clone()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Replaces the value and notifies every listener synchronously.
    /// Listeners see the value read-only and must not write back to this store.
    pub fn set_state(&self, value: T) {
        *self.inner.value.borrow_mut() = value;
        self.notify();
    }

    /// Mutates the value in place, then notifies.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.inner.value.borrow_mut());
        self.notify();
    }

    /// Registers `listener`; dropping the returned [`Subscription`] removes it.
    pub fn subscribe(&self, listener: impl Fn(&T) -> Result<(), EffectError> + 'static) -> Subscription {
        let id = self.inner.next_listener.get();
        self.inner.next_listener.set(id + 1);
        self.inner.listeners.borrow_mut().push((id, Rc::new(listener)));
        let store: Weak<StoreInner<T>> = Rc::downgrade(&self.inner);
        Subscription {
            unsubscribe: Some(Box::new(move || {
                if let Some(store) = store.upgrade() {
                    store.listeners.borrow_mut().retain(|(existing, _)| *existing != id);
                }
            })),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    /// True if both handles point at the same store.
    pub fn ptr_eq(&self, other: &Store<T>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn identity(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }

    fn notify(&self) {
        // Listeners may subscribe or unsubscribe while being notified.
        let listeners: Vec<Listener<T>> = self
            .inner
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        let value = self.inner.value.borrow();
        for listener in listeners {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener(&value)))
                .unwrap_or_else(|payload| Err(EffectError::Panicked(panic_message(payload.as_ref()))));
            if let Err(err) = outcome {
                log::error!(
                    "store listener on {} failed: {err}",
                    self.inner.name.unwrap_or("<unnamed store>")
                );
            }
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.inner.name)
            .field("value", &self.inner.value.borrow())
            .field("listeners", &self.inner.listeners.borrow().len())
            .finish()
    }
}

/// Removes a store listener when dropped.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

/// Named stores passed explicitly to a renderer instead of living in globals.
#[derive(Clone, Default)]
pub struct StoreRegistry {
    stores: Rc<RefCell<HashMap<String, Rc<dyn Any>>>>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `store` under `name`, returning the store it replaced.
    pub fn register<T: 'static>(&self, name: impl Into<String>, store: Store<T>) -> Option<Rc<dyn Any>> {
        self.stores.borrow_mut().insert(name.into(), Rc::new(store))
    }

    /// Looks up a store by name. `None` if absent or of a different value type.
    pub fn get<T: 'static>(&self, name: &str) -> Option<Store<T>> {
        self.stores
            .borrow()
            .get(name)
            .and_then(|store| store.downcast_ref::<Store<T>>())
            .cloned()
    }

    pub fn get_or_insert_with<T: 'static>(&self, name: &str, init: impl FnOnce() -> T) -> Store<T> {
        if let Some(store) = self.get::<T>(name) {
            return store;
        }
        let store = Store::new(init());
        self.register(name, store.clone());
        store
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stores.borrow().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.stores.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.borrow().is_empty()
    }
}

impl fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stores = self.stores.borrow();
        let mut names: Vec<&String> = stores.keys().collect();
        names.sort();
        f.debug_struct("StoreRegistry").field("stores", &names).finish()
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
