// Archivo: reconciler.rs
// Propósito: cambiar el workflow de un experimento que ya tiene carriles y
// pools, dejando carriles, enlaces y repartos de lecturas coherentes antes
// de devolver.
use crate::allocator::{link_pool_to_lane, redistribute};
use crate::invariants::{snapshot, violations};
use crate::lookup::load_experiment;
use crate::provisioner::ensure_lanes;
use lab_domain::{Experiment, InvariantReport, LabError, LabTx, Result, WorkflowCatalog, WorkflowId};
use uuid::Uuid;

/// Cambia el workflow del experimento.
///
/// Pasos, todos dentro de la transacción del llamador:
/// 1. mismo workflow: no hace nada;
/// 2. ajusta los carriles (`ensure_lanes`);
/// 3. guarda el nuevo `workflow_id`;
/// 4. con carriles combinados, completa los enlaces pool × carril que falten;
/// 5. reparte de nuevo las lecturas de cada pool con enlaces;
/// 6. verifica invariantes; si fallan devuelve `InvariantViolation` con el
///    estado previo y posterior, y el llamador debe hacer rollback.
pub fn change_workflow(tx: &mut dyn LabTx,
                       catalog: &WorkflowCatalog,
                       experiment_id: &Uuid,
                       new_workflow_id: WorkflowId)
                       -> Result<Experiment> {
    tx.lock_experiment(experiment_id)?;
    let mut experiment = load_experiment(tx, experiment_id)?;
    if experiment.workflow_id == new_workflow_id {
        log::debug!("experimento {}: workflow {} sin cambios", experiment.id, new_workflow_id);
        return Ok(experiment);
    }
    let workflow = catalog.get(new_workflow_id)?;
    workflow.validate()?;

    let before = snapshot(tx, &experiment)?;
    let old_workflow_id = experiment.workflow_id;
    let changes = ensure_lanes(tx, &experiment, workflow)?;

    experiment.workflow_id = new_workflow_id;
    tx.update_experiment(&experiment)?;

    let pools = tx.list_experiment_pools(&experiment.id)?;
    if workflow.combined_lanes {
        let lanes = tx.list_lanes(&experiment.id)?;
        for pool in &pools {
            for lane in &lanes {
                if tx.get_link(&lane.id, &pool.id)?.is_none() {
                    link_pool_to_lane(tx, &experiment, pool, lane)?;
                }
            }
        }
    }
    for pool in &pools {
        redistribute(tx, &experiment.id, pool)?;
    }

    let after = snapshot(tx, &experiment)?;
    let found = violations(&after, workflow);
    if !found.is_empty() {
        let report = InvariantReport { violations: found, before, after };
        log::error!("experimento {}: invariantes violados tras cambiar workflow {} -> {}: {}",
                    experiment.id,
                    old_workflow_id,
                    new_workflow_id,
                    serde_json::to_string(&report).unwrap_or_else(|e| format!("<sin serializar: {}>", e)));
        return Err(LabError::InvariantViolation(Box::new(report)));
    }

    log::info!("experimento '{}': workflow {} -> {} ('{}'), carriles {} -> {}",
               experiment.name,
               old_workflow_id,
               new_workflow_id,
               workflow.name,
               before.lanes.len(),
               after.lanes.len());
    log::debug!("experimento {}: {} carriles creados, {} eliminados, {} pools",
                experiment.id,
                changes.created.len(),
                changes.removed.len(),
                pools.len());
    Ok(experiment)
}
