// deskboot-core/src/lib.rs

// One module per bootstrap stage, plus the pipeline that runs them in order.
pub mod bootstrap;
pub mod host;
pub mod launcher;
pub mod packages;
pub mod preflight;
pub mod privilege;
pub mod report;
pub mod runtime;
pub mod source;
pub mod ui;

#[cfg(test)]
mod testing;

// Re-export key types for the CLI crate
pub use bootstrap::Bootstrapper;
pub use host::SystemHost;
pub use report::BootstrapReport;
