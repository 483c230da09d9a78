//! Crate `lane-engine`: motor de carriles y reparto de lecturas
//!
//! Mantiene coherentes los carriles de un experimento de secuenciación, los
//! pools cargados en ellos y los millones de lecturas asignados a cada
//! enlace pool↔carril, también cuando el experimento cambia de workflow.
//!
//! Diseño resumido:
//! - Todas las operaciones reciben un `&mut dyn LabTx`; el llamador decide
//!   el commit. `LaneService` ofrece la variante "una operación, una
//!   transacción".
//! - Reparto: un pool con `R` lecturas pedidas y `k` enlaces lleva `R / k`
//!   en cada enlace, recalculado siempre desde `R`.
//! - Tras un cambio de workflow se verifican los invariantes; si fallan se
//!   devuelve `LabError::InvariantViolation` y no debe hacerse commit.
//!
//! Ejemplo rápido:
//! ```rust
//! use lab_domain::{ExperimentStatus, InMemoryLabStore, WorkflowCatalog, WorkflowId};
//! use lane_engine::LaneService;
//! use std::sync::Arc;
//! let service = LaneService::new(Arc::new(InMemoryLabStore::new()), Arc::new(WorkflowCatalog::builtin()));
//! let (experiment, lanes) = service.create_experiment("FC1", WorkflowId(7), ExperimentStatus::Draft).unwrap();
//! assert_eq!(lanes.len(), 4);
//! service.change_workflow(experiment.id, WorkflowId(1)).unwrap();
//! ```
pub mod allocator;
pub mod binder;
pub mod invariants;
mod lookup;
pub mod provisioner;
pub mod reconciler;
pub mod report;
pub mod service;

pub use allocator::{attach_pool_to_lane, detach_pool_from_lane, redistribute, set_link_dilution,
                    set_pool_reads_requested};
pub use binder::{add_library, attach_pool, delete_pool, detach_pool};
pub use invariants::{check_experiment, snapshot, violations};
pub use provisioner::{create_experiment, delete_experiment, ensure_lanes, record_lane_qc, LaneChanges};
pub use reconciler::change_workflow;
pub use report::{lane_load_report, total_planned, LaneLoad};
pub use service::LaneService;
