//! # RFCOMM TTY
//!
//! Virtual serial devices on top of RFCOMM data links.
//!
//! ## Components
//!
//! - **Driver**: administrative surface (create, release, list, info) and
//!   the entry point for attaching consumers
//! - **Registry**: id allocation and lookup, two-step release
//! - **Device**: one link bound to one numbered serial node, torn down when
//!   its last reference goes
//! - **DeviceBridge**: link callbacks routed into the device
//! - **TtyHandle**: an attached port; write path, modem lines, line settings
//! - **HangupReaper**: actor releasing devices whose link hung up unattached
//!
//! ## Example
//!
//! ```ignore
//! let driver = Driver::new(DriverConfig::default(), factory, nodes)?;
//! let id = driver.create(&Credentials::admin(), &DeviceRequest::new(src, dst, 1))?;
//! let port = driver.open(id, consumer, &CancelToken::new()).await?;
//! port.write(b"AT\r")?;
//! ```

#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::todo
)]

pub mod bridge;
pub mod config;
pub mod constants;
pub mod device;
pub mod driver;
pub mod flow;
pub mod port;
pub mod reaper;
pub mod registry;

pub use bridge::DeviceBridge;
pub use config::DriverConfig;
pub use device::Device;
pub use driver::Driver;
pub use port::TtyHandle;
pub use reaper::HangupReaper;
pub use registry::Registry;
