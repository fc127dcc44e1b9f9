use std::time::Duration;

use promissory::{Completable, Thenable};

#[tokio::main]
async fn main() {
   let greeting = Completable::<String>::new();
   let shouted = greeting.then(|s| s.to_uppercase());

   let producer = greeting.clone();
   tokio::spawn(async move {
      tokio::time::sleep(Duration::from_millis(50)).await;
      producer.complete("hello, world".to_string());
   });

   println!("{}", shouted.get_async().await.unwrap());
}
