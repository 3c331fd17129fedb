//! Bounded fan-out/fan-in.
//!
//! A generator sends the items through a rendezvous channel to a fixed pool of
//! mapper threads, the mapped values go through a channel bounded by the pool size
//! to a single reducer, which writes the final value at most once.
//! Mappers and the reducer can cancel the whole run, the first cancel wins.

mod mapreduce;
mod options;

pub use mapreduce::*;
pub use options::*;
