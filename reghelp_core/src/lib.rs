extern crate byteorder;
extern crate chrono;
extern crate serde;

#[macro_use]
extern crate serde_derive;

#[macro_use]
extern crate lazy_static;

#[macro_use]
extern crate log;

pub mod error;
pub use error::{RegError, Result};

pub mod registry;
pub use registry::{MemoryRegistry, RegValue, Registry, RootKey};
#[cfg(windows)]
pub use registry::WinRegistry;

pub mod snapshot;
pub use snapshot::Snapshot;

pub mod utils;
pub use utils::sanitize;

pub mod mru;
pub use mru::{decode_mru, decode_mru_strict, MruEntry};

pub mod time;
pub use time::format_timestamp;

pub mod profile;
pub use profile::{list_user_sids, resolve_sid, resolve_username, AccountClass};
