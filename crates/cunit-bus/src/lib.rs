//! cunit bus - device bus access for the control unit server
//!
//! The bus transport is owned by a single background task ([`spawn_bus`]);
//! callers hold a cloneable [`BusHandle`]. [`Driver`] wraps a handle and a
//! device address and exposes retrying parameter accessors.

pub mod bus;
pub mod driver;
pub mod simulated;
pub mod transport;

pub use bus::{spawn_bus, BusHandle};
pub use driver::{cmd, write_command, Driver, DriverError, ParamValue, Parameter};
pub use simulated::{RequestLog, SimulatedBus, SimulatedDevice};
pub use transport::{BusIo, StreamBus, TransportError, DEFAULT_TIMEOUT_MS};
