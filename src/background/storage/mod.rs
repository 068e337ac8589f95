//!  Storage is organized through [store::KeyValueStore].
//!  The basic idea is:
//!   - There is one JSON document with a handful of keys: `config`, `trackingData`, `archives`.
//!   - `trackingData` is partitioned by local calendar month, then by domain.
//!   - Finished months can be sealed into `archives`, which moves them out of `trackingData`.

pub mod archive;
pub mod config;
pub mod entities;
pub mod ledger;
pub mod store;
