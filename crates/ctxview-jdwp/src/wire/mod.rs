//! JDWP packet framing and value codec shared by the TCP client and the test server.

pub mod codec;

pub use codec::{IdSizes, JdwpReader, JdwpWriter, Packet};

// The wire-protocol mock server is only needed for tests and downstream integration suites.
// Compile it for ctxview-jdwp's own unit tests unconditionally (via `cfg(test)`), while keeping
// it behind the `wire-test-support` feature for normal builds and for downstream crates.
#[cfg(any(test, feature = "wire-test-support"))]
pub mod mock;
