// Archivo: report.rs
// Propósito: resumen de carga por carril (lecturas planificadas frente a la
// capacidad de la flow cell). Sólo informa; no impone límites.
use crate::lookup::load_experiment;
use lab_domain::{LabTx, Result, WorkflowCatalog};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaneLoad {
    pub lane_id: Uuid,
    pub lane_number: i32,
    pub num_pools: usize,
    /// Suma de las partes asignadas (los enlaces sin lecturas no cuentan).
    pub planned_m_reads: f64,
    pub capacity_m_reads: f64,
    pub over_capacity: bool,
    /// Molaridad vigente del carril en nM, si hay QC suficiente.
    pub molarity_nm: Option<f64>,
}

pub fn lane_load_report(tx: &mut dyn LabTx, catalog: &WorkflowCatalog, experiment_id: &Uuid) -> Result<Vec<LaneLoad>> {
    let experiment = load_experiment(tx, experiment_id)?;
    let workflow = catalog.get(experiment.workflow_id)?;
    let capacity = workflow.flow_cell_type.max_m_reads_per_lane;
    let links = tx.list_experiment_links(&experiment.id)?;
    let lanes = tx.list_lanes(&experiment.id)?;
    Ok(lanes.into_iter()
            .map(|lane| {
                let on_lane: Vec<_> = links.iter().filter(|l| l.lane_id == lane.id).collect();
                let planned: f64 = on_lane.iter().filter_map(|l| l.num_m_reads).sum();
                LaneLoad { lane_id: lane.id,
                           lane_number: lane.number,
                           num_pools: on_lane.len(),
                           planned_m_reads: planned,
                           capacity_m_reads: capacity,
                           over_capacity: planned > capacity,
                           molarity_nm: lane.qc.molarity() }
            })
            .collect())
}

/// Lecturas planificadas en todo el experimento.
pub fn total_planned(loads: &[LaneLoad]) -> f64 {
    loads.iter().map(|l| l.planned_m_reads).sum()
}
