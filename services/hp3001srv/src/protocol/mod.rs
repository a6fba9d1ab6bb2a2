//! HP3001 device protocol

pub mod constants;
pub mod frame;

pub use constants::*;
pub use frame::{build_response, decode_response, encode_request, PollResult, Reading};
