pub mod error;
pub mod profile;
pub mod sched;
pub mod workload;

#[cfg(test)]
mod test;
