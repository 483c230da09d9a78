// Archivo: invariants.rs
// Propósito: verificar los invariantes de carriles y lecturas de un
// experimento y fotografiar su estado para diagnóstico.
use crate::lookup::load_experiment;
use lab_domain::{Experiment, ExperimentSnapshot, LabTx, Result, Violation, Workflow, WorkflowCatalog};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

/// Tolerancia relativa al comparar repartos de lecturas.
const READS_TOLERANCE: f64 = 1e-9;

fn same_share(found: Option<f64>, expected: Option<f64>) -> bool {
    match (found, expected) {
        (None, None) => true,
        (Some(a), Some(b)) => (a - b).abs() <= READS_TOLERANCE * b.abs().max(1.0),
        _ => false,
    }
}

/// Lee el subgrafo completo del experimento.
pub fn snapshot(tx: &mut dyn LabTx, experiment: &Experiment) -> Result<ExperimentSnapshot> {
    Ok(ExperimentSnapshot { experiment: experiment.clone(),
                            lanes: tx.list_lanes(&experiment.id)?,
                            pools: tx.list_experiment_pools(&experiment.id)?,
                            links: tx.list_experiment_links(&experiment.id)? })
}

/// Comprueba los invariantes del experimento contra su workflow actual en
/// el catálogo. Devuelve la lista de violaciones (vacía si todo está bien).
pub fn check_experiment(tx: &mut dyn LabTx, catalog: &WorkflowCatalog, experiment_id: &Uuid) -> Result<Vec<Violation>> {
    let experiment = load_experiment(tx, experiment_id)?;
    let workflow = catalog.get(experiment.workflow_id)?;
    let state = snapshot(tx, &experiment)?;
    Ok(violations(&state, workflow))
}

/// Núcleo de la verificación, sobre un snapshot ya leído.
pub fn violations(state: &ExperimentSnapshot, workflow: &Workflow) -> Vec<Violation> {
    let mut out = Vec::new();
    let expected_lanes = usize::try_from(workflow.num_lanes()).unwrap_or(0);
    if state.lanes.len() != expected_lanes {
        out.push(Violation::LaneCount { expected: expected_lanes, found: state.lanes.len() });
    }
    let mut numbers: Vec<i32> = state.lanes.iter().map(|l| l.number).collect();
    numbers.sort_unstable();
    let expected_numbers: Vec<i32> = (1..=workflow.num_lanes()).collect();
    if numbers != expected_numbers {
        out.push(Violation::LaneNumbering { expected: expected_numbers, found: numbers });
    }

    let lane_ids: HashSet<Uuid> = state.lanes.iter().map(|l| l.id).collect();
    let pool_ids: HashSet<Uuid> = state.pools.iter().map(|p| p.id).collect();
    let mut per_pool: BTreeMap<Uuid, Vec<_>> = BTreeMap::new();
    for link in &state.links {
        if !lane_ids.contains(&link.lane_id) || !pool_ids.contains(&link.pool_id) {
            out.push(Violation::DanglingLink { pool_id: link.pool_id, lane_id: link.lane_id });
            continue;
        }
        per_pool.entry(link.pool_id).or_default().push(link);
    }

    for pool in &state.pools {
        let links = per_pool.get(&pool.id).map(Vec::as_slice).unwrap_or(&[]);
        let expected = pool.share_per_lane(links.len());
        for link in links {
            if !same_share(link.num_m_reads, expected) {
                out.push(Violation::ReadAccounting { pool_id: pool.id,
                                                     lane_number: link.lane_num,
                                                     expected,
                                                     found: link.num_m_reads });
            }
        }
        if workflow.combined_lanes && links.len() != state.lanes.len() {
            out.push(Violation::CombinedFanOut { pool_id: pool.id, expected: state.lanes.len(), found: links.len() });
        }
    }
    out
}
