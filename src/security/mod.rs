pub mod privilege;

pub use privilege::{PrivilegeGate, SenderAllowlist, StaticAllowlist};
