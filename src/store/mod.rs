pub mod home;

pub use home::{HomeAddressRecord, HomeAddressStore, StoreError};
