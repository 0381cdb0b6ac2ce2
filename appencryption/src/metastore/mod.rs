//! Metastore implementations for the application encryption library
//!
//! This module provides implementations for storing encrypted keys:
//!
//! - In-memory metastore for testing and development
//! - DynamoDB metastore for AWS integration (available through the plugins module)
//! - Generic key-value store abstraction for implementing custom backends
//! - Other metastore implementations can be added by implementing the Metastore trait
//!
//! Concrete relational/document-store drivers (SQL Server, MySQL, Postgres, Oracle,
//! ADO.NET) are out of scope here; `persistence::SqlMetastore` covers the SQL case
//! generically through a caller-supplied `SqlClient`.
//!
//! For AWS DynamoDB implementations, see the `plugins` module:
//! - AWS SDK v1: `plugins::aws_v1::metastore`
//! - AWS SDK v2: `plugins::aws_v2::metastore`
//!
//! For implementing custom key-value store based metastores, see:
//! - `kv_store` module: Generic key-value store traits
//! - `kv_adapter` module: Adapter to convert a key-value store to a Metastore

pub mod kv_adapter;
pub mod kv_store;
pub mod memory;

// Include tests only in test builds
#[cfg(test)]
mod kv_adapter_test;

pub use memory::InMemoryMetastore;

// Re-export key-value store traits and adapters
pub use kv_adapter::{
    // For backward compatibility
    KeyValueMetastore,
    KeyValueMetastoreForLocal,
    // New explicit Send/Local adapters
    KeyValueMetastoreForSend,
    StringKeyValueMetastore,
    StringKeyValueMetastoreForLocal,

    StringKeyValueMetastoreForSend,
};

// Re-export key-value store traits
pub use kv_store::{
    // Component types
    CompositeKey,

    // For backward compatibility
    KeyValueStore,
    KeyValueStoreLocal,
    // New explicit Send/Local traits
    KeyValueStoreSend,
    LocalKeyValueStore,
    LocalTtlKeyValueStore,
    // Type adapters
    SendKeyValueStoreAdapter,
    SendTtlKeyValueStoreAdapter,

    TtlKeyValueStore,
    TtlKeyValueStoreLocal,

    TtlKeyValueStoreSend,
};

// For backward compatibility, re-export the DynamoDB types from the preferred plugin
#[cfg(feature = "aws-v2-dynamodb")]
pub use crate::plugins::aws_v2::metastore::*;

#[cfg(feature = "aws-v1-dynamodb")]
#[cfg(not(feature = "aws-v2-dynamodb"))]
pub use crate::plugins::aws_v1::metastore::*;

