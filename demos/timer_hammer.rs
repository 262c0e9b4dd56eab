use tev::TimerHandle;
use tev::Tev;
use tev::utick;

use std::cell::Cell;
use std::cell::RefCell;
use std::cmp::max;

use rand;
use rand::Rng;
use rand::rngs::ThreadRng;
use structopt;
use structopt::StructOpt;


#[derive(Debug, StructOpt, Clone)]
#[structopt(rename_all="kebab")]
struct Opt {
    /// Width of rendering (excluding fields)
    #[structopt(short, long, default_value="48")]
    width: usize,

    /// Longest delay in milliseconds
    #[structopt(short, long, default_value="2000")]
    delay: u64,

    /// Timeouts to set per millisecond-ish
    #[structopt(short, long, default_value="10")]
    rate: usize,
}

struct Hammer {
    opt: Opt,
    rng: RefCell<ThreadRng>,
    // timeouts we might try to cancel, some of these have already fired
    outstanding: RefCell<Vec<TimerHandle>>,
    fired: Cell<u64>,
    late: Cell<u64>,
    cleared: Cell<u64>,
    pending_max: Cell<usize>,
}

fn main() {
    let opt = Opt::from_args();

    let hammer = Hammer {
        opt,
        rng: RefCell::new(rand::thread_rng()),
        outstanding: RefCell::new(vec![]),
        fired: Cell::new(0),
        late: Cell::new(0),
        cleared: Cell::new(0),
        pending_max: Cell::new(1),
    };
    let mut tev = Tev::new();

    // set a bunch of random timeouts, and cancel a bunch of random ones,
    // every timeout checks that it didn't fire early
    fn hammer_timers<'a>(tev: &mut Tev<'a>, hammer: &'a Hammer) {
        for _ in 0..hammer.opt.rate {
            let delay = hammer.rng.borrow_mut().gen_range(0..max(hammer.opt.delay, 1));
            let target = tev.now() + delay as utick;
            let handle = tev.set_timeout(delay, move |tev| {
                assert!(tev.now() >= target, "timeout fired early");
                hammer.fired.set(hammer.fired.get() + 1);
                if tev.now() > target + 10 {
                    hammer.late.set(hammer.late.get() + 1);
                }
            }).unwrap();

            let mut outstanding = hammer.outstanding.borrow_mut();
            outstanding.push(handle);
            if hammer.rng.borrow_mut().gen_ratio(1, 3) {
                let i = hammer.rng.borrow_mut().gen_range(0..outstanding.len());
                let handle = outstanding.swap_remove(i);
                if tev.clear_timeout(handle) {
                    hammer.cleared.set(hammer.cleared.get() + 1);
                }
            }
            if outstanding.len() > 4096 {
                outstanding.drain(..2048);
            }
        }

        tev.set_timeout(1, move |tev| hammer_timers(tev, hammer)).unwrap();
    }

    // and render something nice looking
    fn render<'a>(tev: &mut Tev<'a>, hammer: &'a Hammer) {
        let usage = tev.usage();
        if usage.timers > hammer.pending_max.get() {
            hammer.pending_max.set(usage.timers);
        }

        let width = hammer.opt.width;
        let pending_max = hammer.pending_max.get();

        print!("\x1b[K  t [");
        for _ in 0 .. (width-2)*usage.timers / pending_max {
            print!("'");
        }
        for _ in (width-2)*usage.timers / pending_max .. width-2 {
            print!(" ");
        }
        println!("]  pending: {}", usage.timers);
        println!("\x1b[K    capacity: {}", usage.timer_capacity);
        println!("\x1b[K    fired: {} ({} late)", hammer.fired.get(), hammer.late.get());
        println!("\x1b[K    cleared: {}", hammer.cleared.get());
        print!("\x1b[4F");

        tev.set_timeout(10, move |tev| render(tev, hammer)).unwrap();
    }

    println!();
    let hammer = &hammer;
    tev.set_timeout(0, move |tev| hammer_timers(tev, hammer)).unwrap();
    tev.set_timeout(0, move |tev| render(tev, hammer)).unwrap();

    // both keep rescheduling themselves, so this runs forever
    tev.run();
    unreachable!();
}
