#[macro_use]
extern crate serde;

mod aggregate;
mod authority;
mod challenge;
mod election;
mod elgamal;
mod error;
mod panel;
mod serde_hex;
mod submission;
mod vote;
mod wire;
mod zkp;

pub use aggregate::*;
pub use authority::*;
pub use challenge::*;
pub use election::*;
pub use elgamal::*;
pub use error::*;
pub use panel::*;
pub use serde_hex::*;
pub use submission::*;
pub use vote::*;
pub use wire::*;
pub use zkp::*;
