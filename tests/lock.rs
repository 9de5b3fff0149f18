extern crate pretty_env_logger;
extern crate semlock;

use std::process;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use semlock::SemLock;

fn unique(name: &str) -> String {
    let _ = pretty_env_logger::try_init();
    format!("semlock-it:{}:{}", name, process::id())
}

#[test]
fn same_key_same_identifier() {
    let key = unique("same-id");
    let mut a = SemLock::new(key.as_str()).unwrap();
    let b = SemLock::new(key.as_str()).unwrap();
    assert_eq!(a.identifier(), b.identifier());
    assert_eq!(key, b.key());
    assert!(a.remove());
}

#[test]
fn empty_key_rejected() {
    let err = SemLock::builder().max_permits(3).open("").unwrap_err();
    assert!(err.is_invalid_parameter());
    assert!(!err.is_resource());
}

#[test]
fn second_holder_refused() {
    let key = unique("exclusive");
    let mut a = SemLock::new(key.as_str()).unwrap();
    let mut b = SemLock::new(key.as_str()).unwrap();

    assert!(a.acquire().unwrap());
    assert!(!b.acquire().unwrap());
    assert!(!b.acquire().unwrap());

    assert!(a.release().unwrap());
    assert!(b.acquire().unwrap());
    assert!(!a.acquire().unwrap());
    assert!(b.release().unwrap());

    assert!(a.remove());
}

#[test]
fn blocking_waits_for_release() {
    let key = unique("blocking");
    let mut a = SemLock::new(key.as_str()).unwrap();
    assert!(a.acquire().unwrap());

    let (tx, rx) = mpsc::channel();
    let mut b = SemLock::new(key.as_str()).unwrap();
    b.set_non_blocking(false);
    let waiter = thread::spawn(move || {
        let got = b.acquire().unwrap();
        tx.send(got).unwrap();
        assert!(b.release().unwrap());
    });

    thread::sleep(Duration::from_millis(200));
    assert!(rx.try_recv().is_err(), "acquired while still held");

    assert!(a.release().unwrap());
    assert_eq!(true, rx.recv_timeout(Duration::from_secs(10)).unwrap());
    waiter.join().unwrap();

    assert!(a.remove());
}

#[test]
fn release_after_remove_fails() {
    let key = unique("release-removed");
    let mut a = SemLock::new(key.as_str()).unwrap();
    assert!(a.remove());

    let err = a.release().unwrap_err();
    assert!(err.is_resource(), "{}", err);
}

#[test]
fn remove_twice() {
    let key = unique("remove-twice");
    let mut a = SemLock::new(key.as_str()).unwrap();
    assert!(a.remove());
    assert!(!a.remove());
}

#[test]
fn acquire_recreates_after_remove() {
    let key = unique("recreate");
    let mut a = SemLock::builder().max_permits(2).open(key.as_str()).unwrap();
    let mut b = SemLock::builder().max_permits(2).open(key.as_str()).unwrap();

    assert!(a.acquire().unwrap());
    assert!(a.acquire().unwrap());
    assert!(!b.acquire().unwrap());

    assert!(a.remove());

    // fresh semaphore, full permit count again
    assert!(a.acquire().unwrap());
    // b notices its handle is stale and joins the new one
    assert!(b.acquire().unwrap());
    assert!(!b.acquire().unwrap());

    assert!(b.remove());
}

#[test]
fn two_permits_three_holders() {
    let key = unique("job:42");
    let open = || {
        SemLock::builder()
            .max_permits(2)
            .auto_release(false)
            .open(key.as_str())
            .unwrap()
    };
    let mut a = open();
    let mut b = open();
    let mut c = open();

    assert!(a.acquire().unwrap());
    assert!(b.acquire().unwrap());
    assert!(c.is_non_blocking());
    assert!(!c.acquire().unwrap());

    assert!(a.release().unwrap());
    assert!(c.acquire().unwrap());

    assert!(a.remove());
}

// The colliding names are fixed, so two copies of this suite running at
// once on the same host will fight over this one set.
#[test]
fn colliding_keys_share_a_lock() {
    for key in &["plumless", "buckeroo"] {
        SemLock::new(*key).unwrap().remove();
    }

    let mut a = SemLock::builder().auto_release(true).open("plumless").unwrap();
    let mut b = SemLock::builder().auto_release(true).open("buckeroo").unwrap();
    assert_eq!(a.identifier(), b.identifier());

    assert!(a.acquire().unwrap());
    assert!(!b.acquire().unwrap());
}
