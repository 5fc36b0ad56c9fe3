pub mod blast;
pub mod config;
pub mod enzymes;
pub mod error;
pub mod features;
pub mod fill;
pub mod graph;
pub mod io;
pub mod iupac_code;
pub mod junction;
pub mod matches;
pub mod node;
pub mod planner;
pub mod primer3;
pub mod primers;
pub mod search;
pub mod store;
pub mod target;
pub mod validate;

pub use config::AssemblyConfig;
pub use error::AssemblyError;
pub use gentle_assembly_protocol as protocol;
pub use planner::{Backbone, Planner};
