//! Test utilities shared by the workspace crates.
//!
//! Only available with the `testing` feature or during tests:
//!
//! ```toml
//! [dev-dependencies]
//! common = { path = "../common", features = ["testing"] }
//! ```
//!
//! ```rust,ignore
//! use common::testing::TestConfigBuilder;
//!
//! let dir = tempfile::tempdir()?;
//! let config = TestConfigBuilder::new().rooted_at(dir.path()).build();
//! ```

mod config_builder;

pub use config_builder::TestConfigBuilder;
