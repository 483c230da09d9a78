// Archivo: provisioner.rs
// Propósito: mantener el conjunto de carriles de un experimento alineado con
// el número de carriles de su workflow. Es el único módulo que crea o
// destruye carriles.
use crate::lookup::{load_experiment, load_lane};
use lab_domain::{Experiment, ExperimentStatus, LabTx, Lane, LaneQc, Result, Workflow, WorkflowCatalog, WorkflowId};
use std::collections::HashSet;
use uuid::Uuid;

/// Carriles creados y eliminados por `ensure_lanes`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaneChanges {
    pub created: Vec<Lane>,
    /// Carriles eliminados, del número más alto al más bajo.
    pub removed: Vec<Lane>,
}

impl LaneChanges {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.removed.is_empty()
    }
}

/// Crea un experimento y materializa de inmediato sus carriles
/// `1..=num_lanes`.
pub fn create_experiment(tx: &mut dyn LabTx,
                         catalog: &WorkflowCatalog,
                         name: &str,
                         workflow_id: WorkflowId,
                         status: ExperimentStatus)
                         -> Result<(Experiment, Vec<Lane>)> {
    let workflow = catalog.get(workflow_id)?;
    workflow.validate()?;
    let experiment = Experiment::new(name, workflow_id, status)?;
    tx.insert_experiment(&experiment)?;
    tx.lock_experiment(&experiment.id)?;
    let changes = ensure_lanes(tx, &experiment, workflow)?;
    log::info!("experimento '{}' ({}) creado con workflow '{}' y {} carriles",
               experiment.name,
               experiment.id,
               workflow.name,
               changes.created.len());
    Ok((experiment, changes.created))
}

/// Garantiza que el experimento tenga exactamente un carril por cada número
/// en `[1, workflow.num_lanes()]`.
///
/// Los carriles sobrantes se eliminan del más alto al más bajo, borrando
/// antes sus enlaces. Los carriles que sobreviven no se tocan, de modo que
/// sus mediciones de QC se conservan. No redistribuye lecturas.
pub fn ensure_lanes(tx: &mut dyn LabTx, experiment: &Experiment, workflow: &Workflow) -> Result<LaneChanges> {
    workflow.validate()?;
    let target = workflow.num_lanes();
    let current = tx.list_lanes(&experiment.id)?;

    let mut surplus: Vec<Lane> = current.iter().filter(|l| l.number > target).cloned().collect();
    surplus.sort_by(|a, b| b.number.cmp(&a.number));
    let mut removed = Vec::with_capacity(surplus.len());
    for lane in surplus {
        remove_lane(tx, &lane)?;
        removed.push(lane);
    }

    let present: HashSet<i32> = current.iter().map(|l| l.number).filter(|n| *n <= target).collect();
    let mut created = Vec::new();
    for number in 1..=target {
        if present.contains(&number) {
            continue;
        }
        let lane = Lane::new(experiment.id, number);
        tx.insert_lane(&lane)?;
        created.push(lane);
    }

    if !created.is_empty() || !removed.is_empty() {
        log::info!("experimento {}: {} -> {} carriles (creados {:?}, eliminados {:?})",
                   experiment.id,
                   current.len(),
                   target,
                   created.iter().map(|l| l.number).collect::<Vec<_>>(),
                   removed.iter().map(|l| l.number).collect::<Vec<_>>());
    }
    Ok(LaneChanges { created, removed })
}

/// Borrado en cascada explícito: enlaces del carril y después el carril.
fn remove_lane(tx: &mut dyn LabTx, lane: &Lane) -> Result<()> {
    let links = tx.list_experiment_links(&lane.experiment_id)?;
    for link in links.iter().filter(|l| l.lane_id == lane.id) {
        log::debug!("carril {}: eliminando enlace con pool {}", lane.number, link.pool_id);
        tx.delete_link(&link.lane_id, &link.pool_id)?;
    }
    tx.delete_lane(&lane.id)
}

/// Guarda las mediciones de QC de un carril.
pub fn record_lane_qc(tx: &mut dyn LabTx, experiment_id: &Uuid, lane_number: i32, qc: LaneQc) -> Result<Lane> {
    tx.lock_experiment(experiment_id)?;
    let experiment = load_experiment(tx, experiment_id)?;
    let mut lane = load_lane(tx, &experiment.id, lane_number)?;
    lane.qc = qc;
    tx.update_lane(&lane)?;
    Ok(lane)
}

/// Elimina un experimento con todo su subgrafo: enlaces, carriles y la
/// pertenencia de sus pools y librerías.
pub fn delete_experiment(tx: &mut dyn LabTx, experiment_id: &Uuid) -> Result<()> {
    tx.lock_experiment(experiment_id)?;
    let experiment = load_experiment(tx, experiment_id)?;
    for link in tx.list_experiment_links(&experiment.id)? {
        tx.delete_link(&link.lane_id, &link.pool_id)?;
    }
    let mut lanes = tx.list_lanes(&experiment.id)?;
    lanes.reverse();
    for lane in lanes {
        tx.delete_lane(&lane.id)?;
    }
    for mut pool in tx.list_experiment_pools(&experiment.id)? {
        for mut library in tx.list_pool_libraries(&pool.id)? {
            library.experiment_id = None;
            tx.update_library(&library)?;
        }
        pool.experiment_id = None;
        tx.update_pool(&pool)?;
    }
    tx.delete_experiment(&experiment.id)?;
    log::info!("experimento '{}' ({}) eliminado", experiment.name, experiment.id);
    Ok(())
}
