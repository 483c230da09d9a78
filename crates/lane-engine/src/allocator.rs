// Archivo: allocator.rs
// Propósito: asociación muchos-a-muchos entre pools y carriles de un
// experimento y la política de reparto de lecturas.
//
// Invariante: tras cada operación, cada enlace de un pool con `R` lecturas
// pedidas y `k` enlaces en el experimento lleva `R / k` (o `None` si `R` es
// `None`). El reparto siempre se recalcula desde `R`, nunca desde una parte
// previa, así que no acumula deriva por divisiones repetidas.
use crate::binder::bind_pool;
use crate::lookup::{load_experiment, load_lane, load_pool, load_pool_locked};
use lab_domain::{validate_reads, Experiment, LabError, LabTx, Lane, LanePoolLink, Pool, Result};
use uuid::Uuid;

/// Carga `pool_id` en el carril `lane_number` del experimento y reparte de
/// nuevo las lecturas del pool entre todos sus carriles. Un pool sin
/// experimento queda asociado a este.
pub fn attach_pool_to_lane(tx: &mut dyn LabTx,
                           experiment_id: &Uuid,
                           pool_id: &Uuid,
                           lane_number: i32)
                           -> Result<LanePoolLink> {
    tx.lock_experiment(experiment_id)?;
    let experiment = load_experiment(tx, experiment_id)?;
    let lane = load_lane(tx, &experiment.id, lane_number)?;
    let mut pool = load_pool(tx, pool_id)?;
    if pool.experiment_id.is_none() {
        pool = bind_pool(tx, &experiment, pool)?;
    }
    link_pool_to_lane(tx, &experiment, &pool, &lane)
}

/// Inserta el enlace y actualiza los demás enlaces del pool en el mismo
/// paso. Supone el lock del experimento ya tomado.
pub(crate) fn link_pool_to_lane(tx: &mut dyn LabTx,
                                experiment: &Experiment,
                                pool: &Pool,
                                lane: &Lane)
                                -> Result<LanePoolLink> {
    if let Some(other) = pool.experiment_id.filter(|id| *id != experiment.id) {
        log::warn!("pool {} pertenece al experimento {}, no a {}", pool.id, other, experiment.id);
        return Err(LabError::Conflict(format!("Pool con id {} ya está asociado al experimento {}", pool.id, other)));
    }
    if tx.get_link(&lane.id, &pool.id)?.is_some() {
        return Err(LabError::Conflict(format!("Carril {} y pool {} ya están enlazados", lane.number, pool.id)));
    }

    let existing = tx.list_pool_links(&experiment.id, &pool.id)?;
    let share = pool.share_per_lane(existing.len() + 1);
    for mut other in existing {
        other.num_m_reads = share;
        tx.update_link(&other)?;
    }
    let link = LanePoolLink { lane_id: lane.id,
                              pool_id: pool.id,
                              experiment_id: experiment.id,
                              lane_num: lane.number,
                              num_m_reads: share,
                              dilution_id: None };
    tx.insert_link(&link)?;
    log::debug!("pool {} cargado en carril {} del experimento {} ({:?} M lecturas por carril)",
                pool.id,
                lane.number,
                experiment.id,
                share);
    Ok(link)
}

/// Quita `pool_id` del carril `lane_number` y reparte sus lecturas entre los
/// carriles que le quedan.
pub fn detach_pool_from_lane(tx: &mut dyn LabTx, experiment_id: &Uuid, pool_id: &Uuid, lane_number: i32) -> Result<()> {
    tx.lock_experiment(experiment_id)?;
    let experiment = load_experiment(tx, experiment_id)?;
    let lane = load_lane(tx, &experiment.id, lane_number)?;
    let pool = load_pool(tx, pool_id)?;
    if tx.get_link(&lane.id, &pool.id)?.is_none() {
        return Err(LabError::NotFound(format!("Carril {} y pool {} no están enlazados", lane.number, pool.id)));
    }
    tx.delete_link(&lane.id, &pool.id)?;
    let remaining = redistribute(tx, &experiment.id, &pool)?;
    log::debug!("pool {} retirado del carril {} del experimento {}; quedan {} carriles",
                pool.id,
                lane.number,
                experiment.id,
                remaining.len());
    Ok(())
}

/// Recalcula y persiste `num_m_reads` de todos los enlaces del pool en el
/// experimento. Sin enlaces no hay nada que actualizar. Devuelve los enlaces
/// resultantes ordenados por carril.
pub fn redistribute(tx: &mut dyn LabTx, experiment_id: &Uuid, pool: &Pool) -> Result<Vec<LanePoolLink>> {
    let mut links = tx.list_pool_links(experiment_id, &pool.id)?;
    let share = pool.share_per_lane(links.len());
    for link in links.iter_mut() {
        if link.num_m_reads != share {
            link.num_m_reads = share;
            tx.update_link(link)?;
        }
    }
    Ok(links)
}

/// Registra la dilución del pool cargada en un carril.
pub fn set_link_dilution(tx: &mut dyn LabTx,
                         experiment_id: &Uuid,
                         pool_id: &Uuid,
                         lane_number: i32,
                         dilution_id: Option<Uuid>)
                         -> Result<LanePoolLink> {
    tx.lock_experiment(experiment_id)?;
    let experiment = load_experiment(tx, experiment_id)?;
    let lane = load_lane(tx, &experiment.id, lane_number)?;
    let mut link = tx.get_link(&lane.id, pool_id)?.ok_or_else(|| {
                                                       LabError::NotFound(format!("Carril {} y pool {} no están enlazados",
                                                                                  lane_number, pool_id))
                                                   })?;
    link.dilution_id = dilution_id;
    tx.update_link(&link)?;
    Ok(link)
}

/// Cambia las lecturas pedidas de un pool y reparte de inmediato entre sus
/// carriles, si está asociado a un experimento.
pub fn set_pool_reads_requested(tx: &mut dyn LabTx, pool_id: &Uuid, num_m_reads_requested: Option<f64>) -> Result<Pool> {
    validate_reads(num_m_reads_requested)?;
    let mut pool = load_pool_locked(tx, pool_id)?;
    pool.num_m_reads_requested = num_m_reads_requested;
    tx.update_pool(&pool)?;
    if let Some(experiment_id) = pool.experiment_id {
        redistribute(tx, &experiment_id, &pool)?;
    }
    Ok(pool)
}
