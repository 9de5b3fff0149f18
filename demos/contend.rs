extern crate failure;
#[macro_use]
extern crate log;
extern crate num_cpus;
extern crate pretty_env_logger;
extern crate semlock;

use std::env;
use std::thread;
use std::time::Duration;

use failure::Error;
use semlock::SemLock;

const ROUNDS: usize = 3;

fn worker(id: usize, key: String, permits: u32) -> Result<(), Error> {
    let mut lock = SemLock::builder().max_permits(permits).open(key)?;
    lock.set_non_blocking(false);

    for round in 0..ROUNDS {
        lock.acquire()?;
        info!("worker {}: inside (round {})", id, round);
        thread::sleep(Duration::from_millis(50));
        lock.release()?;
    }

    Ok(())
}

fn main() -> Result<(), Error> {
    pretty_env_logger::formatted_builder()?
        .filter_level(log::LevelFilter::Info)
        .init();

    let key = env::args()
        .nth(1)
        .unwrap_or_else(|| "semlock-demo".to_string());
    let permits = 2;

    let mut lock = SemLock::builder().max_permits(permits).open(key.as_str())?;
    info!(
        "{:?} is ipc key {}, {} workers",
        lock.key(),
        lock.identifier(),
        num_cpus::get()
    );

    let workers: Vec<_> = (0..num_cpus::get())
        .map(|id| {
            let key = key.clone();
            thread::spawn(move || worker(id, key, permits))
        })
        .collect();

    for worker in workers {
        if let Err(e) = worker.join().expect("worker panicked") {
            error!("worker failed: {}", e);
        }
    }

    lock.remove();
    Ok(())
}
