//! lab-domain: registros del LIMS que toca el motor de carriles
//! (experimentos, carriles, pools, librerías y enlaces pool↔carril), el
//! catálogo de workflows y el contrato transaccional de persistencia.
mod errors;
mod experiment;
mod lab_repository;
mod lane;
mod link;
mod pool;
mod workflow;

pub use errors::{InvariantReport, LabError, Result, Violation};
pub use experiment::{Experiment, ExperimentSnapshot, ExperimentStatus, MAX_EXPERIMENT_NAME_LEN};
pub use lab_repository::{InMemoryLabStore, InMemoryTx, LabStore, LabTx};
pub use lane::{Lane, LaneQc};
pub use link::LanePoolLink;
pub use pool::{validate_reads, Library, Pool};
pub use workflow::{FlowCellType, Workflow, WorkflowCatalog, WorkflowId};
