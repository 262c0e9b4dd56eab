use tev::EventHandle;
use tev::Tev;

use std::cell::Cell;
use std::thread;
use std::time::Duration;

use rand;
use rand::Rng;
use structopt;
use structopt::StructOpt;


#[derive(Debug, StructOpt, Clone)]
#[structopt(rename_all="kebab")]
struct Opt {
    /// Width of rendering (excluding fields)
    #[structopt(short, long, default_value="48")]
    width: usize,

    /// Amount to scale delays
    #[structopt(short, long, default_value="1000000")]
    scale: u64,

    /// Number of producer threads
    #[structopt(short, long, default_value="100")]
    threads: usize,

    /// Number of event handlers
    #[structopt(long, default_value="8")]
    handlers: usize,
}

struct Stats {
    delivered: Cell<u64>,
    bytes: Cell<u64>,
    pending_max: Cell<usize>,
}

fn main() {
    let opt = Opt::from_args();

    let stats = Stats {
        delivered: Cell::new(0),
        bytes: Cell::new(0),
        pending_max: Cell::new(1),
    };
    let mut handles = vec![];
    let mut tev = Tev::new();

    // a handful of handlers, they just count what they get
    for _ in 0..opt.handlers {
        let stats = &stats;
        handles.push(tev.set_event_handler(move |_, data| {
            stats.delivered.set(stats.delivered.get() + 1);
            stats.bytes.set(stats.bytes.get() + data.len() as u64);
        }).unwrap());
    }

    // some busywork, n threads, each sending a random size to a random
    // handler after a random delay
    for _ in 0..opt.threads {
        let opt = opt.clone();
        let sender = tev.sender();
        let handles = handles.clone();
        thread::spawn(move || {
            let mut rng = rand::thread_rng();
            let mut buffer = vec![0u8; 8192];
            loop {
                thread::sleep(Duration::from_nanos(rng.gen_range(0..2000*opt.scale)));

                let size = rng.gen_range(0..buffer.len());
                rng.fill(&mut buffer[..size]);
                let handle = handles[rng.gen_range(0..handles.len())];
                if sender.send(handle, &buffer[..size]).is_err() {
                    // loop is gone, so are we
                    return;
                }
            }
        });
    }

    // and now, in the loop itself, lets render something nice looking
    fn render<'a>(tev: &mut Tev<'a>, opt: &'a Opt, stats: &'a Stats, handles: &'a [EventHandle]) {
        let usage = tev.usage();
        if usage.events > stats.pending_max.get() {
            stats.pending_max.set(usage.events);
        }

        let width = opt.width;
        let pending_max = stats.pending_max.get();

        print!("\x1b[K  q [");
        for _ in 0 .. (width-2)*usage.events / pending_max {
            print!("'");
        }
        for _ in (width-2)*usage.events / pending_max .. width-2 {
            print!(" ");
        }
        println!("]  pending: {}", usage.events);
        println!("\x1b[K    delivered: {}", stats.delivered.get());
        println!("\x1b[K    bytes: {}", stats.bytes.get());
        println!("\x1b[K    handlers: {}/{}", usage.handlers, handles.len());
        print!("\x1b[4F");

        tev.set_timeout(10, move |tev| render(tev, opt, stats, handles)).unwrap();
    }

    println!();
    let (opt, stats, handles) = (&opt, &stats, &handles[..]);
    tev.set_timeout(0, move |tev| render(tev, opt, stats, handles)).unwrap();

    // the handlers are never cleared, so this runs forever
    tev.run();
    unreachable!();
}
