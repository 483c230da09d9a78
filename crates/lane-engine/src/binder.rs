// Archivo: binder.rs
// Propósito: pertenencia pool ↔ experimento (distinta de la pertenencia a
// carriles) y su propagación a las librerías del pool.
use crate::allocator::link_pool_to_lane;
use crate::lookup::{load_experiment, load_pool, load_pool_locked};
use lab_domain::{Experiment, LabError, LabTx, Library, Pool, Result, WorkflowCatalog};
use uuid::Uuid;

/// Asocia un pool sin experimento al experimento dado. En workflows de
/// carriles combinados lo carga además en todos los carriles, en orden
/// ascendente.
pub fn attach_pool(tx: &mut dyn LabTx, catalog: &WorkflowCatalog, experiment_id: &Uuid, pool_id: &Uuid) -> Result<Pool> {
    tx.lock_experiment(experiment_id)?;
    let experiment = load_experiment(tx, experiment_id)?;
    let pool = load_pool(tx, pool_id)?;
    if let Some(current) = pool.experiment_id {
        return Err(LabError::Conflict(format!("Pool con id {} ya está asociado al experimento {}", pool.id, current)));
    }
    let workflow = catalog.get(experiment.workflow_id)?;
    let pool = bind_pool(tx, &experiment, pool)?;

    if workflow.combined_lanes {
        for lane in tx.list_lanes(&experiment.id)? {
            link_pool_to_lane(tx, &experiment, &pool, &lane)?;
        }
    }
    log::info!("pool '{}' ({}) asociado al experimento '{}'", pool.name, pool.id, experiment.name);
    Ok(pool)
}

/// Marca el pool y sus librerías como parte del experimento. No crea
/// enlaces.
pub(crate) fn bind_pool(tx: &mut dyn LabTx, experiment: &Experiment, mut pool: Pool) -> Result<Pool> {
    pool.experiment_id = Some(experiment.id);
    tx.update_pool(&pool)?;
    for mut library in tx.list_pool_libraries(&pool.id)? {
        library.experiment_id = Some(experiment.id);
        tx.update_library(&library)?;
    }
    Ok(pool)
}

/// Desasocia el pool del experimento: borra todos sus enlaces a carriles y
/// limpia el experimento de sus librerías.
pub fn detach_pool(tx: &mut dyn LabTx, experiment_id: &Uuid, pool_id: &Uuid) -> Result<Pool> {
    tx.lock_experiment(experiment_id)?;
    let experiment = load_experiment(tx, experiment_id)?;
    let mut pool = load_pool(tx, pool_id)?;
    if pool.experiment_id != Some(experiment.id) {
        return Err(LabError::Conflict(format!("Pool con id {} no está asociado al experimento {}",
                                              pool.id, experiment.id)));
    }

    for link in tx.list_pool_links(&experiment.id, &pool.id)? {
        tx.delete_link(&link.lane_id, &link.pool_id)?;
    }
    for mut library in tx.list_pool_libraries(&pool.id)? {
        library.experiment_id = None;
        tx.update_library(&library)?;
    }
    pool.experiment_id = None;
    tx.update_pool(&pool)?;
    log::info!("pool '{}' ({}) desasociado del experimento '{}'", pool.name, pool.id, experiment.name);
    Ok(pool)
}

/// Añade una librería a un pool. Si el pool ya está en un experimento, la
/// librería lo hereda.
pub fn add_library(tx: &mut dyn LabTx, pool_id: &Uuid, name: &str) -> Result<Library> {
    let pool = load_pool(tx, pool_id)?;
    if name.trim().is_empty() {
        return Err(LabError::Validation("El nombre de la librería no puede estar vacío".to_string()));
    }
    let mut library = Library::new(name, Some(pool.id));
    library.experiment_id = pool.experiment_id;
    tx.insert_library(&library)?;
    Ok(library)
}

/// Elimina un pool. Antes lo desasocia de su experimento y deja sus
/// librerías sin pool.
pub fn delete_pool(tx: &mut dyn LabTx, pool_id: &Uuid) -> Result<()> {
    let pool = load_pool_locked(tx, pool_id)?;
    if let Some(experiment_id) = pool.experiment_id {
        detach_pool(tx, &experiment_id, &pool.id)?;
    }
    for mut library in tx.list_pool_libraries(&pool.id)? {
        library.pool_id = None;
        library.experiment_id = None;
        tx.update_library(&library)?;
    }
    tx.delete_pool(&pool.id)?;
    log::info!("pool '{}' ({}) eliminado", pool.name, pool.id);
    Ok(())
}
