//! Ingestion, reassembly, and waterfall rendering pipeline for a drone
//! detection workstation's spectral sensing device.
//!
//! Dataflow: a TCP socket feeds the [`reader`]'s framed-protocol
//! resynchronization and frame reassembly; complete [`frame::Frame`]s cross
//! the bounded drop-oldest [`queue`] to the [`processor`], which normalizes
//! them in batches and publishes rows, the latest spectrum, and stats into
//! the shared [`state::State`]; the [`renderer`] independently turns the
//! waterfall ring into an RGB image under the [`colormap`]. [`pipeline`]
//! wires the three workers together and owns their lifecycle; [`detector`]
//! is the (unimplemented) boundary the downstream detection model plugs into.

pub mod colormap;
pub mod config;
pub mod detector;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod processor;
pub mod protocol;
pub mod queue;
pub mod reader;
pub mod renderer;
pub mod state;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use pipeline::Pipeline;
pub use state::State;
