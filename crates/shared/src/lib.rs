//! Wire types shared by the user directory client and the relay.

pub mod domain;
pub mod error;
pub mod protocol;
