// Archivo: lookup.rs
// Propósito: cargas comunes que traducen "fila ausente" en `NotFound`.
use lab_domain::{Experiment, LabError, LabTx, Lane, Pool, Result};
use uuid::Uuid;

pub(crate) fn load_experiment(tx: &mut dyn LabTx, experiment_id: &Uuid) -> Result<Experiment> {
    tx.get_experiment(experiment_id)?
      .ok_or_else(|| LabError::NotFound(format!("Experimento con id {} no existe", experiment_id)))
}

pub(crate) fn load_lane(tx: &mut dyn LabTx, experiment_id: &Uuid, lane_number: i32) -> Result<Lane> {
    tx.get_lane_by_number(experiment_id, lane_number)?.ok_or_else(|| {
        LabError::NotFound(format!("Carril {} no existe en el experimento {}", lane_number, experiment_id))
    })
}

pub(crate) fn load_pool(tx: &mut dyn LabTx, pool_id: &Uuid) -> Result<Pool> {
    tx.get_pool(pool_id)?
      .ok_or_else(|| LabError::NotFound(format!("Pool con id {} no existe", pool_id)))
}

/// Carga el pool y toma el lock de su experimento, si tiene. Después del
/// lock lo relee: si otra transacción lo movió de experimento devuelve
/// `Conflict`.
pub(crate) fn load_pool_locked(tx: &mut dyn LabTx, pool_id: &Uuid) -> Result<Pool> {
    let pool = load_pool(tx, pool_id)?;
    let Some(experiment_id) = pool.experiment_id else {
        return Ok(pool);
    };
    tx.lock_experiment(&experiment_id)?;
    let current = load_pool(tx, pool_id)?;
    if current.experiment_id != Some(experiment_id) {
        log::warn!("pool {} cambió de experimento mientras se esperaba el lock de {}", pool_id, experiment_id);
        return Err(LabError::Conflict(format!("Pool con id {} cambió de experimento ({} -> {:?})",
                                              pool_id, experiment_id, current.experiment_id)));
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::{attach_pool_to_lane, set_pool_reads_requested};
    use crate::binder::delete_pool;
    use crate::provisioner::create_experiment;
    use lab_domain::{ExperimentStatus, InMemoryLabStore, LabStore, Lane, LanePoolLink, Library, WorkflowCatalog, WorkflowId};

    const S4_XP: WorkflowId = WorkflowId(8);

    /// Transacción que, al tomar el primer lock, mueve el pool a otro
    /// experimento como lo haría una transacción concurrente ya confirmada.
    struct MovedWhileWaiting<'a> {
        inner: Box<dyn LabTx + 'a>,
        pool_id: Uuid,
        move_to: Option<Uuid>,
    }

    impl LabTx for MovedWhileWaiting<'_> {
        fn lock_experiment(&mut self, experiment_id: &Uuid) -> Result<()> {
            self.inner.lock_experiment(experiment_id)?;
            if let Some(target) = self.move_to.take() {
                let mut pool = load_pool(self.inner.as_mut(), &self.pool_id)?;
                pool.experiment_id = Some(target);
                self.inner.update_pool(&pool)?;
            }
            Ok(())
        }
        fn get_experiment(&mut self, id: &Uuid) -> Result<Option<Experiment>> {
            self.inner.get_experiment(id)
        }
        fn insert_experiment(&mut self, experiment: &Experiment) -> Result<()> {
            self.inner.insert_experiment(experiment)
        }
        fn update_experiment(&mut self, experiment: &Experiment) -> Result<()> {
            self.inner.update_experiment(experiment)
        }
        fn delete_experiment(&mut self, id: &Uuid) -> Result<()> {
            self.inner.delete_experiment(id)
        }
        fn list_lanes(&mut self, experiment_id: &Uuid) -> Result<Vec<Lane>> {
            self.inner.list_lanes(experiment_id)
        }
        fn get_lane_by_number(&mut self, experiment_id: &Uuid, number: i32) -> Result<Option<Lane>> {
            self.inner.get_lane_by_number(experiment_id, number)
        }
        fn insert_lane(&mut self, lane: &Lane) -> Result<()> {
            self.inner.insert_lane(lane)
        }
        fn update_lane(&mut self, lane: &Lane) -> Result<()> {
            self.inner.update_lane(lane)
        }
        fn delete_lane(&mut self, lane_id: &Uuid) -> Result<()> {
            self.inner.delete_lane(lane_id)
        }
        fn get_pool(&mut self, id: &Uuid) -> Result<Option<Pool>> {
            self.inner.get_pool(id)
        }
        fn insert_pool(&mut self, pool: &Pool) -> Result<()> {
            self.inner.insert_pool(pool)
        }
        fn update_pool(&mut self, pool: &Pool) -> Result<()> {
            self.inner.update_pool(pool)
        }
        fn delete_pool(&mut self, id: &Uuid) -> Result<()> {
            self.inner.delete_pool(id)
        }
        fn list_experiment_pools(&mut self, experiment_id: &Uuid) -> Result<Vec<Pool>> {
            self.inner.list_experiment_pools(experiment_id)
        }
        fn get_library(&mut self, id: &Uuid) -> Result<Option<Library>> {
            self.inner.get_library(id)
        }
        fn insert_library(&mut self, library: &Library) -> Result<()> {
            self.inner.insert_library(library)
        }
        fn update_library(&mut self, library: &Library) -> Result<()> {
            self.inner.update_library(library)
        }
        fn list_pool_libraries(&mut self, pool_id: &Uuid) -> Result<Vec<Library>> {
            self.inner.list_pool_libraries(pool_id)
        }
        fn get_link(&mut self, lane_id: &Uuid, pool_id: &Uuid) -> Result<Option<LanePoolLink>> {
            self.inner.get_link(lane_id, pool_id)
        }
        fn insert_link(&mut self, link: &LanePoolLink) -> Result<()> {
            self.inner.insert_link(link)
        }
        fn update_link(&mut self, link: &LanePoolLink) -> Result<()> {
            self.inner.update_link(link)
        }
        fn delete_link(&mut self, lane_id: &Uuid, pool_id: &Uuid) -> Result<()> {
            self.inner.delete_link(lane_id, pool_id)
        }
        fn list_experiment_links(&mut self, experiment_id: &Uuid) -> Result<Vec<LanePoolLink>> {
            self.inner.list_experiment_links(experiment_id)
        }
        fn list_pool_links(&mut self, experiment_id: &Uuid, pool_id: &Uuid) -> Result<Vec<LanePoolLink>> {
            self.inner.list_pool_links(experiment_id, pool_id)
        }
        fn commit(self: Box<Self>) -> Result<()> {
            self.inner.commit()
        }
        fn rollback(self: Box<Self>) -> Result<()> {
            self.inner.rollback()
        }
    }

    #[test]
    fn pool_moved_before_the_lock_is_a_conflict() -> Result<()> {
        let catalog = WorkflowCatalog::builtin();
        let store = InMemoryLabStore::new();
        let mut tx = store.begin()?;
        let (e1, _) = create_experiment(tx.as_mut(), &catalog, "FC1", S4_XP, ExperimentStatus::Draft)?;
        let (e2, _) = create_experiment(tx.as_mut(), &catalog, "FC2", S4_XP, ExperimentStatus::Draft)?;
        let pool = Pool::new("P", Some(40.0))?;
        tx.insert_pool(&pool)?;
        attach_pool_to_lane(tx.as_mut(), &e1.id, &pool.id, 1)?;

        let mut racing = MovedWhileWaiting { inner: tx, pool_id: pool.id, move_to: Some(e2.id) };
        assert!(matches!(set_pool_reads_requested(&mut racing, &pool.id, Some(8.0)), Err(LabError::Conflict(_))));
        racing.move_to = Some(e1.id);
        assert!(matches!(delete_pool(&mut racing, &pool.id), Err(LabError::Conflict(_))));
        assert!(racing.get_pool(&pool.id)?.is_some());
        assert_eq!(racing.list_pool_links(&e1.id, &pool.id)?[0].num_m_reads, Some(40.0));
        Ok(())
    }

    #[test]
    fn unmoved_pool_is_returned_after_locking() -> Result<()> {
        let catalog = WorkflowCatalog::builtin();
        let store = InMemoryLabStore::new();
        let mut tx = store.begin()?;
        let (e, _) = create_experiment(tx.as_mut(), &catalog, "FC1", S4_XP, ExperimentStatus::Draft)?;
        let loose = Pool::new("suelto", None)?;
        tx.insert_pool(&loose)?;
        assert_eq!(load_pool_locked(tx.as_mut(), &loose.id)?, loose);

        let pool = Pool::new("P", Some(40.0))?;
        tx.insert_pool(&pool)?;
        attach_pool_to_lane(tx.as_mut(), &e.id, &pool.id, 2)?;
        assert_eq!(load_pool_locked(tx.as_mut(), &pool.id)?.experiment_id, Some(e.id));
        Ok(())
    }
}
