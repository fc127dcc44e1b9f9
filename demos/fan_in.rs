use std::thread;
use std::time::Duration;

use promissory::{all, Completable, Thenable};

fn main() {
   let jobs: Vec<Completable<u64>> = (0..5).map(|_| Completable::new()).collect();
   let total = all(jobs.iter().map(Completable::promise)).then(|sizes| sizes.iter().sum::<u64>());

   let workers: Vec<_> = jobs
      .iter()
      .enumerate()
      .map(|(i, job)| {
         let job = job.clone();
         thread::spawn(move || {
            // Finish in reverse order; results still come back in input order
            thread::sleep(Duration::from_millis(10 * (5 - i as u64)));
            job.complete((i as u64 + 1) * 100);
         })
      })
      .collect();

   println!("Total: {}", total.get().unwrap());
   for worker in workers {
      worker.join().unwrap();
   }
}
