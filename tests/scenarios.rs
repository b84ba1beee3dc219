use std::pin::{pin, Pin};

use value_observer::{Expired, Observer, ObserverCounted, Owner};

#[test]
fn observer_expires_with_its_owner() {
    let owner = Box::pin(Owner::new(42));
    let observer = owner.as_ref().observer();
    assert!(observer.valid());
    assert_eq!(observer.get(), Some(owner.as_ptr()));

    drop(owner);
    assert!(observer.expired());
    assert_eq!(observer.get(), None);
    assert_eq!(observer.try_get(), Err(Expired));
}

#[test]
fn use_count_matches_live_observers() {
    let owner = pin!(Owner::new("counted"));
    let direct: Vec<_> = (0..3).map(|_| owner.as_ref().observer()).collect();
    let copies: Vec<_> = direct.iter().map(Observer::clone).collect();

    assert_eq!(owner.use_count(), 6);
    for observer in direct.iter().chain(&copies) {
        assert_eq!(observer.use_count(), 6);
        assert_eq!(ObserverCounted::observer_count(observer), 6);
    }
}

#[test]
fn transfer_redirects_existing_observers() {
    let a = Box::pin(Owner::new(vec![1, 2, 3]));
    let observers: Vec<_> = (0..2).map(|_| a.as_ref().observer()).collect();

    let b = Box::pin(a.transfer());
    b.as_ref().attach();

    assert_eq!(b.use_count(), 2);
    assert_eq!(a.use_count(), 0);
    for observer in &observers {
        assert_eq!(observer.get(), Some(b.as_ptr()));
        assert_ne!(observer.get(), Some(a.as_ptr()));
    }

    // The old owner going away does not touch the registration it gave up.
    drop(a);
    assert!(observers.iter().all(Observer::valid));
    drop(b);
    assert!(observers.iter().all(Observer::expired));
}

#[test]
fn replace_moves_a_pinned_owner() {
    let mut a = Box::pin(Owner::new(String::from("first")));
    let observer = a.as_ref().observer();

    let b = Box::pin(a.as_mut().replace(String::from("second")));
    assert_eq!(a.get(), "second");
    assert!(!a.is_registered());
    assert!(observer.expired());
    assert_eq!(observer.use_count(), 1);

    b.as_ref().attach();
    assert_eq!(unsafe { observer.as_ref() }.map(String::as_str), Some("first"));
}

#[test]
fn release_on_released_or_default_observer_is_a_no_op() {
    let owner = pin!(Owner::new(0u8));
    let keep = owner.as_ref().observer();
    let mut released = keep.clone();
    released.release();
    released.release();

    let mut empty = Observer::<u8>::default();
    empty.release();

    assert_eq!(owner.use_count(), 1);
    assert!(released.expired());
    assert!(empty.expired());
    assert!(keep.valid());
}

#[test]
fn swap_keeps_counts() {
    let x = pin!(Owner::new(1));
    let y = pin!(Owner::new(2));
    let mut h1 = x.as_ref().observer();
    let mut h2 = y.as_ref().observer();

    h1.swap(&mut h2);
    assert_eq!(h1.get(), Some(y.as_ptr()));
    assert_eq!(h2.get(), Some(x.as_ptr()));
    assert_eq!(x.use_count(), 1);
    assert_eq!(y.use_count(), 1);
}

#[test]
fn observe_then_copy_then_drop_in_turn() {
    let owner = Box::pin(Owner::new(42));
    let h1 = Observer::observe(owner.as_ref());
    let h2 = h1.clone();
    assert_eq!(owner.use_count(), 2);

    drop(h1);
    assert_eq!(owner.use_count(), 1);
    assert!(h2.valid());
    assert_eq!(unsafe { h2.as_ref() }, Some(&42));

    drop(owner);
    assert!(h2.expired());
    assert_eq!(h2.get(), None);
}

#[test]
fn assigning_a_value_keeps_observers() {
    let mut owner = pin!(Owner::new(String::from("old")));
    let observer = owner.as_ref().observer();

    owner.as_mut().assign(String::from("new"));
    assert_eq!(owner.use_count(), 1);
    assert_eq!(unsafe { observer.as_ref() }.map(String::as_str), Some("new"));
}

#[test]
fn observers_of_a_stripped_owner_start_expired() {
    let a = pin!(Owner::new(3));
    let _b = a.transfer();

    let observer = Observer::from(a.as_ref());
    assert!(observer.expired());
    assert_eq!(observer.use_count(), 0);
}

fn observe_all<T>(owners: &[Pin<Box<Owner<T>>>]) -> Vec<Observer<T>> {
    owners.iter().map(|owner| owner.as_ref().observer()).collect()
}

#[test]
fn owners_are_independent() {
    let owners: Vec<_> = (0..4usize).map(|i| Box::pin(Owner::new(i))).collect();
    let observers = observe_all(&owners);

    for (owner, observer) in owners.iter().zip(&observers) {
        assert_eq!(owner.use_count(), 1);
        assert_eq!(observer.get(), Some(owner.as_ptr()));
        assert!(!observer.ptr_eq(&observers[(*owner.get() + 1) % 4]));
    }
}

#[test]
fn expired_displays_a_message() {
    assert_eq!(Expired.to_string(), "observed value has expired");
}
