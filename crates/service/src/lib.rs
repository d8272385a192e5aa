//! Service layer for the user save API.
//! - `storage`: where user saves live (filesystem, object store, memory).
//! - `token`: turning an opaque bearer token into a verified user id.
//!
//! Both are trait objects chosen once at startup; the HTTP layer never
//! inspects which implementation it was handed.

pub mod storage;
pub mod token;
