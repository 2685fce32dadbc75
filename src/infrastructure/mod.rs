//! Adapters behind the domain ports: stores, the payment-gateway double and
//! the vendor directory.

pub mod gateway;
pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod vendors;
