use tev::Error;
use tev::EventHandle;
use tev::Tev;
use tev::sys::SysClock;

use loom::thread;

use std::cell::Cell;
use std::cell::RefCell;

const fn parse_const_usize(s: &str) -> usize {
    let mut v = 0;
    let s = s.as_bytes();

    let mut i = 0;
    while i < s.len() {
        if s[i] >= b'0' && s[i] <= b'9' {
            v = v*10 + (s[i] - b'0') as usize;
        } else {
            panic!("invalid compile-time usize");
        }
        i += 1;
    }

    v
}

// Number of producer threads to test with
const LOOM_THREADS: usize = {
    match option_env!("TEV_LOOM_THREADS") {
        Some(threads) => parse_const_usize(threads),
        None          => 2,
    }
};

// Every event passes through a mutex and a condvar, which adds up to a lot
// of branches. This is the highest loom allows due to an internal u16.
//
// Note this is still overridable.
//
const LOOM_MAX_BRANCHES: usize = {
    match option_env!("LOOM_MAX_BRANCHES") {
        Some(max_branches) => parse_const_usize(max_branches),
        None               => 65535,
    }
};

fn loom_model() -> loom::model::Builder {
    let mut cfg = loom::model::Builder::new();
    cfg.max_branches = LOOM_MAX_BRANCHES;
    cfg
}


#[test]
fn test_loom_send() {
    loom_model().check(|| {
        SysClock::set_now(0);

        let me = Cell::new(None::<EventHandle>);
        let received = RefCell::new(vec![vec![]; LOOM_THREADS]);
        let remaining = Cell::new(LOOM_THREADS*2);
        let mut tev = Tev::new();

        let handle = tev.set_event_handler(|tev, data| {
            received.borrow_mut()[data[0] as usize].push(data[1]);
            remaining.set(remaining.get() - 1);
            if remaining.get() == 0 {
                tev.clear_event_handler(me.get().unwrap());
            }
        }).unwrap();
        me.set(Some(handle));

        let mut threads = vec![];
        for j in 0..LOOM_THREADS {
            let sender = tev.sender();
            threads.push(thread::spawn(move || {
                for i in 0..2 {
                    sender.send(handle, &[j as u8, i]).unwrap();
                }
            }));
        }

        // the loop sleeps on the semaphore until every event has arrived
        tev.run();

        for thread in threads.into_iter() {
            thread.join().unwrap();
        }

        for j in 0..LOOM_THREADS {
            assert_eq!(received.borrow()[j], vec![0, 1]);
        }
        assert_eq!(tev.pending_events(), 0);
    })
}

#[test]
fn test_loom_send_with_timeout() {
    loom_model().check(|| {
        SysClock::set_now(0);

        let me = Cell::new(None::<EventHandle>);
        let order = RefCell::new(vec![]);
        let mut tev = Tev::new();

        let handle = tev.set_event_handler(|tev, _| {
            order.borrow_mut().push("event");
            tev.clear_event_handler(me.get().unwrap());
        }).unwrap();
        me.set(Some(handle));

        let sender = tev.sender();
        let producer = thread::spawn(move || {
            sender.send(handle, b"x").unwrap();
        });

        // time doesn't pass under loom, so only an already-due timeout can
        // race the producer
        tev.set_timeout(0, |_| {
            order.borrow_mut().push("timeout");
        }).unwrap();
        tev.run();
        producer.join().unwrap();

        // whenever the event lands, due timers fire before anything is
        // delivered
        assert_eq!(*order.borrow(), vec!["timeout", "event"]);
        assert_eq!(tev.pending_events(), 0);
    })
}

#[test]
fn test_loom_send_while_dropping() {
    loom_model().check(|| {
        SysClock::set_now(0);

        let mut tev = Tev::new();
        let handle = tev.set_event_handler(|_, _| {}).unwrap();

        let sender = tev.sender();
        let producer = thread::spawn(move || {
            sender.send(handle, b"x")
        });

        drop(tev);

        // either we got in before the loop closed, or we're told it's gone
        match producer.join().unwrap() {
            Ok(()) | Err(Error::Closed) => {}
            Err(err) => panic!("unexpected {:?}", err),
        }
    })
}
