pub mod coordinator;
pub mod progressive;
pub mod retry;
pub mod semaphore;
pub mod types;
