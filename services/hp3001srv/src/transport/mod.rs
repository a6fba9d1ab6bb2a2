//! Transport layer
//!
//! - `traits`: the byte-level capability the device session depends on
//! - `hid`: real USB HID backend (feature `usb-hid`)
//! - `mock`: scripted device for tests and dry runs

pub mod mock;
pub mod traits;

#[cfg(feature = "usb-hid")]
pub mod hid;

pub use mock::{MockReply, MockTransport};
pub use traits::{HidTransport, TransportStats};

#[cfg(feature = "usb-hid")]
pub use hid::UsbHidTransport;
