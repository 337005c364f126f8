//! `streetlink-linker`: street-name linkage engine.
//!
//! Pure engine crate: receives pre-loaded registry streets and map segments,
//! returns a segment → official id mapping with diagnostics.
//! No network or CLI dependencies; arbitration is reached through the
//! [`Arbiter`] trait.

pub mod adjacency;
pub mod config;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod load;
pub mod matcher;
pub mod merge;
pub mod model;
pub mod normalize;
pub mod resolver;
pub mod scorer;

pub use config::LinkConfig;
pub use engine::run;
pub use error::LinkError;
pub use model::{FinalMapping, LinkInput, LinkResult, MapSegment, Point, StreetRecord};
pub use resolver::{ArbiterResult, Arbiter, ArbitrationDecision, ArbitrationRequest, OfferedCandidate};
