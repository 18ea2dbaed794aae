//! cunit core - shared types for the control unit server
//!
//! This crate provides the foundational types used across the workspace:
//! - Binary frame codec shared by the device bus and binary client answers
//! - Answers routed back to clients (binary frames or CRLF text)
//! - Device records as persisted and validated by the registry
//! - The device listing announced to presentation clients

pub mod answer;
pub mod device;
pub mod frame;
pub mod listing;

pub use answer::Answer;
pub use device::{DeviceInfo, DeviceKind, Udid};
pub use frame::{Frame, FrameError, HEADER_LEN, MAX_PAYLOAD_LEN};
pub use listing::{DeviceListing, ListingEntry};

/// Device bus address. The full `u8` range is addressable.
pub type Address = u8;
