//! Request processing: configuration, the image pipeline, admission
//! control and URL routing.

pub mod admission;
pub mod config;
pub mod pipeline;
pub mod router;

pub use admission::{AdmissionGate, AdmissionLayer, AdmissionPermit, AdmissionService};
pub use config::ServerConfig;
pub use pipeline::{PipelineOutcome, RenditionSource, RequestPipeline};
pub use router::{RouteMatch, RouteTable};
