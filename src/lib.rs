//! lmap - A thread-safe locking map
//!
//! `LockMap` is a `HashMap` guarded by a single reader/writer lock, with
//! an operation surface that goes well beyond a bare `RwLock<HashMap>`:
//! batched inserts, compute-on-miss, predicate removal, aggregation, and
//! iteration that is safe against reentrant callbacks.
//!
//! Any number of readers proceed in parallel, writers are serialised and
//! exclude readers, just like a mutex. Every operation takes `&self` and
//! does its own locking, so the map can be shared between threads
//! directly or in an `Arc`.
//!
//! The structure is deliberately simple. If your readers hold their view
//! open for a non-trivial amount of time, or your workload is very
//! read-heavy under write contention, a concurrently readable or
//! lock-free structure will serve you better. Where you want a shared
//! mutable map with short critical sections and a rich method surface,
//! this is the small, predictable option.
//!
//! Operations that run caller-supplied functions never hold the lock
//! while doing so, except for the explicitly documented zero-copy
//! traversals. The bulk operations snapshot the entries under the read
//! lock, release it, run your code, and re-apply the outcome under the
//! write lock. Your callbacks may therefore call back into the map, at
//! the cost of acting on a point-in-time view that concurrent writers
//! may have moved past.
//!
//! # Features
//! * `foldhash` - use the foldhash crate for the backing map's hasher
//! * `ahash` - use the cpu accelerated ahash crate instead
//! * `asynch` - a `tokio::sync::RwLock` backed variant in `lockmap::asynch`
//! * `serde` - `Serialize`/`Deserialize` for the map
//!
//! By default `foldhash` and `asynch` are enabled.

#![deny(warnings)]
#![warn(unused_extern_crates)]
#![warn(missing_docs)]

mod error;
pub mod lockmap;

pub use error::Error;
pub use lockmap::{Entry, LockMap, LockMapRaw};
