//! Wires the materializer, TOC façade, HTTP surface, CLI, and emulator
//! launch into the `xiso-serve` binary. Exposed as a library target too,
//! so `materializer`/`pipeline`/`http` logic is unit-testable without a
//! running server.

pub mod cli;
pub mod http;
pub mod launch;
pub mod materializer;
pub mod pipeline;
