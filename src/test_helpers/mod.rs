// Test Helpers Module - Simulated Server Estate
//
// In-memory implementations of the server traits, used by unit tests and the
// integration tests under tests/. Behavior is scripted per test through the
// builder and the connector handle.

pub mod simulated;

pub use simulated::{
    SimulatedBackupService, SimulatedCall, SimulatedConnector, SimulatedInstance,
    SimulationBuilder,
};
