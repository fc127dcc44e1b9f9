use std::thread;
use std::time::Duration;

use promissory::{Cause, Completable, Promise, Thenable};

fn main() {
   let reading = Completable::<f64>::new();

   let fahrenheit = reading.then(|celsius| celsius * 9.0 / 5.0 + 32.0);
   let label = fahrenheit.then(|f| format!("{f:.1}°F"));
   let checked = reading.combine(|celsius| {
      if *celsius < -273.15 {
         Promise::rejected(Cause::msg("below absolute zero"))
      } else {
         Promise::completed(*celsius)
      }
   });
   checked.catch(|cause| println!("Sensor fault: {cause}"));

   let producer = reading.clone();
   thread::spawn(move || {
      // Simulate a slow sensor
      thread::sleep(Duration::from_millis(50));
      producer.complete(21.5);
   });

   println!("Reading: {}", label.get().unwrap());
   assert_eq!(checked.get().unwrap(), 21.5);
}
