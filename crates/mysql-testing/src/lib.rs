//! # mysql-testing
//!
//! Test infrastructure for MySQL session development.
//!
//! This crate provides a mock MySQL server that speaks the command phase of
//! the protocol, so session behavior can be exercised without a database.
//!
//! ## Features
//!
//! - Mock server with scripted text, binary and multi-result responses
//! - Prepared statement support with per-connection statement ids
//! - Failure injection for cancellation and broken-connection paths
//! - Command recording for assertions
//! - Table fixtures
//!
//! ## Mock Server Example
//!
//! ```rust,ignore
//! use mysql_testing::fixtures::users_table;
//! use mysql_testing::mock_server::{MockMySqlServer, MockResponse};
//!
//! #[tokio::test]
//! async fn test_with_mock_server() {
//!     let users = users_table();
//!     let server = MockMySqlServer::builder()
//!         .with_response(users.select_all_sql(), users.response())
//!         .with_response("DELETE FROM users", MockResponse::affected(3))
//!         .build()
//!         .await
//!         .unwrap();
//!
//!     let stream = server.connect().await.unwrap();
//!     // Build a session over `stream`...
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod fixtures;
pub mod mock_server;

pub use fixtures::TableFixture;
pub use mock_server::{
    MockMySqlServer, MockResponse, MockServerBuilder, MockServerConfig, MockServerError,
    MockStatement, RecordedCommand,
};
