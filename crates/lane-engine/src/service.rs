// Archivo: service.rs
// Propósito: implementar `LaneService`, una capa orquestadora que ejecuta
// cada operación del motor en su propia transacción (begin → operación →
// commit, rollback ante cualquier error). Pensada para ser invocada desde
// handlers HTTP o desde la CLI.
use crate::allocator;
use crate::binder;
use crate::invariants;
use crate::lookup::load_experiment;
use crate::provisioner::{self, LaneChanges};
use crate::reconciler;
use crate::report::{self, LaneLoad};
use lab_domain::{Experiment, ExperimentSnapshot, ExperimentStatus, LabStore, LabTx, Lane, LanePoolLink, LaneQc,
                 Library, Pool, Result, Violation, WorkflowCatalog, WorkflowId};
use std::sync::Arc;
use uuid::Uuid;

/// Servicio de alto nivel sobre el motor de carriles.
///
/// Quien necesite componer varias operaciones en una sola transacción debe
/// usar las funciones de los módulos con su propio `LabTx`.
pub struct LaneService {
    store: Arc<dyn LabStore>,
    catalog: Arc<WorkflowCatalog>,
}

impl LaneService {
    /// Crea el servicio inyectando el almacén y el catálogo de workflows.
    pub fn new(store: Arc<dyn LabStore>, catalog: Arc<WorkflowCatalog>) -> Self {
        Self { store, catalog }
    }

    pub fn catalog(&self) -> &WorkflowCatalog {
        &self.catalog
    }

    fn in_tx<T>(&self, op: &str, f: impl FnOnce(&mut dyn LabTx, &WorkflowCatalog) -> Result<T>) -> Result<T> {
        let mut tx = self.store.begin()?;
        match f(tx.as_mut(), self.catalog.as_ref()) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                log::warn!("{} abortada: {}", op, e);
                if let Err(rb) = tx.rollback() {
                    log::error!("{}: rollback fallido: {}", op, rb);
                }
                Err(e)
            }
        }
    }

    pub fn create_experiment(&self,
                             name: &str,
                             workflow_id: WorkflowId,
                             status: ExperimentStatus)
                             -> Result<(Experiment, Vec<Lane>)> {
        self.in_tx("create_experiment", |tx, catalog| {
                provisioner::create_experiment(tx, catalog, name, workflow_id, status)
            })
    }

    /// Ajusta los carriles al workflow registrado del experimento.
    pub fn ensure_lanes(&self, experiment_id: Uuid) -> Result<LaneChanges> {
        self.in_tx("ensure_lanes", |tx, catalog| {
                tx.lock_experiment(&experiment_id)?;
                let experiment = load_experiment(tx, &experiment_id)?;
                let workflow = catalog.get(experiment.workflow_id)?;
                provisioner::ensure_lanes(tx, &experiment, workflow)
            })
    }

    pub fn change_workflow(&self, experiment_id: Uuid, workflow_id: WorkflowId) -> Result<Experiment> {
        self.in_tx("change_workflow", |tx, catalog| {
                reconciler::change_workflow(tx, catalog, &experiment_id, workflow_id)
            })
    }

    pub fn delete_experiment(&self, experiment_id: Uuid) -> Result<()> {
        self.in_tx("delete_experiment", |tx, _| provisioner::delete_experiment(tx, &experiment_id))
    }

    pub fn record_lane_qc(&self, experiment_id: Uuid, lane_number: i32, qc: LaneQc) -> Result<Lane> {
        self.in_tx("record_lane_qc", |tx, _| provisioner::record_lane_qc(tx, &experiment_id, lane_number, qc))
    }

    pub fn create_pool(&self, name: &str, num_m_reads_requested: Option<f64>) -> Result<Pool> {
        self.in_tx("create_pool", |tx, _| {
                let pool = Pool::new(name, num_m_reads_requested)?;
                tx.insert_pool(&pool)?;
                Ok(pool)
            })
    }

    pub fn add_library(&self, pool_id: Uuid, name: &str) -> Result<Library> {
        self.in_tx("add_library", |tx, _| binder::add_library(tx, &pool_id, name))
    }

    pub fn attach_pool(&self, experiment_id: Uuid, pool_id: Uuid) -> Result<Pool> {
        self.in_tx("attach_pool", |tx, catalog| binder::attach_pool(tx, catalog, &experiment_id, &pool_id))
    }

    pub fn detach_pool(&self, experiment_id: Uuid, pool_id: Uuid) -> Result<Pool> {
        self.in_tx("detach_pool", |tx, _| binder::detach_pool(tx, &experiment_id, &pool_id))
    }

    pub fn delete_pool(&self, pool_id: Uuid) -> Result<()> {
        self.in_tx("delete_pool", |tx, _| binder::delete_pool(tx, &pool_id))
    }

    pub fn attach_pool_to_lane(&self, experiment_id: Uuid, pool_id: Uuid, lane_number: i32) -> Result<LanePoolLink> {
        self.in_tx("attach_pool_to_lane", |tx, _| {
                allocator::attach_pool_to_lane(tx, &experiment_id, &pool_id, lane_number)
            })
    }

    pub fn detach_pool_from_lane(&self, experiment_id: Uuid, pool_id: Uuid, lane_number: i32) -> Result<()> {
        self.in_tx("detach_pool_from_lane", |tx, _| {
                allocator::detach_pool_from_lane(tx, &experiment_id, &pool_id, lane_number)
            })
    }

    pub fn set_pool_reads_requested(&self, pool_id: Uuid, num_m_reads_requested: Option<f64>) -> Result<Pool> {
        self.in_tx("set_pool_reads_requested", |tx, _| {
                allocator::set_pool_reads_requested(tx, &pool_id, num_m_reads_requested)
            })
    }

    pub fn set_link_dilution(&self,
                             experiment_id: Uuid,
                             pool_id: Uuid,
                             lane_number: i32,
                             dilution_id: Option<Uuid>)
                             -> Result<LanePoolLink> {
        self.in_tx("set_link_dilution", |tx, _| {
                allocator::set_link_dilution(tx, &experiment_id, &pool_id, lane_number, dilution_id)
            })
    }

    /// Estado completo del experimento (carriles, pools y enlaces).
    pub fn snapshot(&self, experiment_id: Uuid) -> Result<ExperimentSnapshot> {
        self.in_tx("snapshot", |tx, _| {
                let experiment = load_experiment(tx, &experiment_id)?;
                invariants::snapshot(tx, &experiment)
            })
    }

    pub fn check_experiment(&self, experiment_id: Uuid) -> Result<Vec<Violation>> {
        self.in_tx("check_experiment", |tx, catalog| invariants::check_experiment(tx, catalog, &experiment_id))
    }

    pub fn lane_load_report(&self, experiment_id: Uuid) -> Result<Vec<LaneLoad>> {
        self.in_tx("lane_load_report", |tx, catalog| report::lane_load_report(tx, catalog, &experiment_id))
    }
}
