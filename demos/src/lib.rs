//! ScaleFormer tools
//!
//! Support code for the `scaleformer` command-line tool: backend selection,
//! JSON run configuration, logging setup and a printable stage schedule.
//!
//! ## Usage
//!
//! ```bash
//! # Print the stage schedule of the reference configuration
//! cargo run --bin scaleformer -- info
//!
//! # Build a model and run it on a zero image
//! cargo run --release --bin scaleformer -- forward --config run.json
//!
//! # Initialize weights and save them
//! cargo run --bin scaleformer -- init --output weights/scaleformer
//! ```

pub mod backend;
pub mod config;
pub mod logging;
pub mod summary;

pub use backend::{create_device, SelectedBackend, SelectedDevice, BACKEND_NAME};
pub use config::RunConfig;
pub use logging::init_logging;
pub use summary::{ModelSummary, StageSummary};
