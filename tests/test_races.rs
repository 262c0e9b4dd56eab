use tev::EventHandle;
use tev::Tev;

use std::cell::Cell;
use std::cell::RefCell;
use std::sync::Arc;
use std::sync::Barrier;
use std::thread;

#[test]
fn test_races_many_producers() {
    const THREADS: usize = 16;
    const EVENTS: usize = 1000;

    let me = Cell::new(None::<EventHandle>);
    let received = RefCell::new(vec![vec![]; THREADS]);
    let remaining = Cell::new(THREADS*EVENTS);
    let mut tev = Tev::new();

    let handle = tev.set_event_handler(|tev, data| {
        let j = data[0] as usize;
        let i = u32::from_le_bytes(data[1..5].try_into().unwrap());
        received.borrow_mut()[j].push(i);

        remaining.set(remaining.get() - 1);
        if remaining.get() == 0 {
            tev.clear_event_handler(me.get().unwrap());
        }
    }).unwrap();
    me.set(Some(handle));

    let barrier = Arc::new(Barrier::new(THREADS));
    let mut threads = vec![];
    for j in 0..THREADS {
        let sender = tev.sender();
        let barrier = barrier.clone();
        threads.push(thread::spawn(move || {
            barrier.wait();
            let mut buffer = [0u8; 5];
            for i in 0..EVENTS as u32 {
                // reuse one buffer, each send takes its own copy
                buffer[0] = j as u8;
                buffer[1..5].copy_from_slice(&i.to_le_bytes());
                sender.send(handle, &buffer).unwrap();
            }
        }));
    }

    tev.run();
    for thread in threads.into_iter() {
        thread.join().unwrap();
    }

    // producers interleave arbitrarily, but each producer's events arrive
    // exactly once and in the order it sent them
    for j in 0..THREADS {
        assert_eq!(
            received.borrow()[j],
            (0..EVENTS as u32).collect::<Vec<_>>()
        );
    }
    assert_eq!(tev.pending_events(), 0);
    println!("usage: {:?}", tev.usage());
}

#[test]
fn test_races_producers_with_timeouts() {
    const THREADS: usize = 4;
    const EVENTS: usize = 100;

    let events = Cell::new(0);
    let ticks = Cell::new(0);
    let mut tev = Tev::new();

    let handle = tev.set_event_handler(|_, _| {
        events.set(events.get() + 1);
    }).unwrap();

    // a steady tick keeps firing while events pour in
    fn tick<'a>(tev: &mut Tev<'a>, ticks: &'a Cell<u32>, handle: EventHandle) {
        ticks.set(ticks.get() + 1);
        if ticks.get() < 20 {
            tev.set_timeout(5, move |tev| tick(tev, ticks, handle)).unwrap();
        } else {
            tev.clear_event_handler(handle);
        }
    }
    let ticks_ = &ticks;
    tev.set_timeout(5, move |tev| tick(tev, ticks_, handle)).unwrap();

    let mut threads = vec![];
    for _ in 0..THREADS {
        let sender = tev.sender();
        threads.push(thread::spawn(move || {
            for _ in 0..EVENTS {
                sender.send(handle, b"x").unwrap();
            }
        }));
    }
    for thread in threads.into_iter() {
        thread.join().unwrap();
    }

    tev.run();

    // everything was sent before the loop started, so everything is
    // delivered well before the ticks run out
    assert_eq!(ticks.get(), 20);
    assert_eq!(events.get(), THREADS*EVENTS);
}
