use super::*;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[test]
fn set_state_notifies_listeners_with_the_new_value() {
    let store = Store::new(1);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let _subscription = store.subscribe({
        let seen = Rc::clone(&seen);
        move |value: &i32| {
            seen.borrow_mut().push(*value);
            Ok(())
        }
    });
    store.set_state(2);
    store.update(|value| *value += 10);
    assert_eq!(*seen.borrow(), vec![2, 12]);
    assert_eq!(store.get(), 12);
}

#[test]
fn dropping_the_subscription_unsubscribes() {
    let store = Store::new("a");
    let calls = Rc::new(Cell::new(0));
    let subscription = store.subscribe({
        let calls = Rc::clone(&calls);
        move |_: &&str| {
            calls.set(calls.get() + 1);
            Ok(())
        }
    });
    assert_eq!(store.listener_count(), 1);
    store.set_state("b");
    drop(subscription);
    store.set_state("c");
    assert_eq!(calls.get(), 1);
    assert_eq!(store.listener_count(), 0);
}

#[test]
fn failing_listeners_do_not_stop_the_others() {
    let store = Store::named("counter", 0);
    let reached = Rc::new(Cell::new(false));
    let _failing = store.subscribe(|_: &i32| Err(EffectError::failed("boom")));
    let _panicking = store.subscribe(|_: &i32| panic!("listener panic"));
    let _last = store.subscribe({
        let reached = Rc::clone(&reached);
        move |_: &i32| {
            reached.set(true);
            Ok(())
        }
    });
    store.set_state(1);
    assert!(reached.get());
}

#[test]
fn listener_may_unsubscribe_itself_while_notified() {
    let store = Store::new(0);
    let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
    let subscription = store.subscribe({
        let slot = Rc::clone(&slot);
        move |_: &i32| {
            slot.borrow_mut().take();
            Ok(())
        }
    });
    *slot.borrow_mut() = Some(subscription);
    store.set_state(1);
    assert_eq!(store.listener_count(), 0);
}

#[test]
fn unsubscribe_after_the_store_is_gone_is_harmless() {
    let store = Store::new(0);
    let subscription = store.subscribe(|_: &i32| Ok(()));
    drop(store);
    subscription.unsubscribe();
}

#[test]
fn registry_looks_up_by_name_and_type() {
    let registry = StoreRegistry::new();
    let theme = Store::new(String::from("dark"));
    assert!(registry.register("theme", theme.clone()).is_none());
    assert!(registry.contains("theme"));
    assert!(registry.get::<String>("theme").is_some_and(|found| found.ptr_eq(&theme)));
    assert!(registry.get::<i32>("theme").is_none());
    assert!(registry.get::<String>("missing").is_none());
    assert_eq!(registry.len(), 1);
}

#[test]
fn get_or_insert_with_creates_once() {
    let registry = StoreRegistry::new();
    let first = registry.get_or_insert_with("count", || 1);
    let second = registry.get_or_insert_with("count", || 2);
    assert!(first.ptr_eq(&second));
    assert_eq!(second.get(), 1);
    assert!(!registry.is_empty());
}

#[test]
fn registry_clones_share_storage() {
    let registry = StoreRegistry::new();
    let clone = registry.clone();
    clone.register("flag", Store::new(true));
    assert_eq!(registry.get::<bool>("flag").map(|store| store.get()), Some(true));
}
