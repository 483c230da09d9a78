use crate::errors::{LabError, Result};
use crate::{Experiment, Lane, LanePoolLink, Library, Pool};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Unidad de trabajo sobre el almacén relacional.
///
/// Todas las operaciones del motor reciben un `&mut dyn LabTx`; el llamador
/// decide cuándo hacer `commit` o `rollback`. Descartar la transacción sin
/// `commit` equivale a `rollback`.
pub trait LabTx {
  /// Serializa el acceso al subgrafo de un experimento hasta el fin de la
  /// transacción.
  fn lock_experiment(&mut self, experiment_id: &Uuid) -> Result<()>;

  fn get_experiment(&mut self, id: &Uuid) -> Result<Option<Experiment>>;
  fn insert_experiment(&mut self, experiment: &Experiment) -> Result<()>;
  fn update_experiment(&mut self, experiment: &Experiment) -> Result<()>;
  /// Borra sólo la fila del experimento; el llamador borra antes sus
  /// dependientes.
  fn delete_experiment(&mut self, id: &Uuid) -> Result<()>;

  /// Carriles del experimento ordenados por número.
  fn list_lanes(&mut self, experiment_id: &Uuid) -> Result<Vec<Lane>>;
  fn get_lane_by_number(&mut self, experiment_id: &Uuid, number: i32) -> Result<Option<Lane>>;
  fn insert_lane(&mut self, lane: &Lane) -> Result<()>;
  fn update_lane(&mut self, lane: &Lane) -> Result<()>;
  fn delete_lane(&mut self, lane_id: &Uuid) -> Result<()>;

  fn get_pool(&mut self, id: &Uuid) -> Result<Option<Pool>>;
  fn insert_pool(&mut self, pool: &Pool) -> Result<()>;
  fn update_pool(&mut self, pool: &Pool) -> Result<()>;
  fn delete_pool(&mut self, id: &Uuid) -> Result<()>;
  /// Pools con `experiment_id` igual al dado, ordenados por nombre.
  fn list_experiment_pools(&mut self, experiment_id: &Uuid) -> Result<Vec<Pool>>;

  fn get_library(&mut self, id: &Uuid) -> Result<Option<Library>>;
  fn insert_library(&mut self, library: &Library) -> Result<()>;
  fn update_library(&mut self, library: &Library) -> Result<()>;
  fn list_pool_libraries(&mut self, pool_id: &Uuid) -> Result<Vec<Library>>;

  fn get_link(&mut self, lane_id: &Uuid, pool_id: &Uuid) -> Result<Option<LanePoolLink>>;
  fn insert_link(&mut self, link: &LanePoolLink) -> Result<()>;
  fn update_link(&mut self, link: &LanePoolLink) -> Result<()>;
  fn delete_link(&mut self, lane_id: &Uuid, pool_id: &Uuid) -> Result<()>;
  /// Enlaces de un experimento ordenados por (número de carril, pool).
  fn list_experiment_links(&mut self, experiment_id: &Uuid) -> Result<Vec<LanePoolLink>>;
  /// Enlaces de un pool dentro de un experimento, ordenados por carril.
  fn list_pool_links(&mut self, experiment_id: &Uuid, pool_id: &Uuid) -> Result<Vec<LanePoolLink>>;

  fn commit(self: Box<Self>) -> Result<()>;
  fn rollback(self: Box<Self>) -> Result<()>;
}

/// Almacén capaz de abrir transacciones.
pub trait LabStore: Send + Sync {
  fn begin(&self) -> Result<Box<dyn LabTx + '_>>;
}

#[derive(Debug, Clone, Default)]
struct LabState {
  experiments: HashMap<Uuid, Experiment>,
  lanes: HashMap<Uuid, Lane>,
  pools: HashMap<Uuid, Pool>,
  libraries: HashMap<Uuid, Library>,
  links: HashMap<(Uuid, Uuid), LanePoolLink>,
}

/// Implementación en memoria para tests y desarrollo.
///
/// Una transacción retiene el mutex del estado durante toda su vida y
/// trabaja sobre una copia que sustituye al estado compartido en `commit`.
#[derive(Debug, Default)]
pub struct InMemoryLabStore {
  state: Mutex<LabState>,
}

impl InMemoryLabStore {
  pub fn new() -> Self {
    Self { state: Mutex::new(LabState::default()) }
  }
}

impl LabStore for InMemoryLabStore {
  fn begin(&self) -> Result<Box<dyn LabTx + '_>> {
    let guard = self.state
                    .lock()
                    .map_err(|e| LabError::Storage(format!("Mutex 'state' poisoned: {}", e)))?;
    let working = guard.clone();
    Ok(Box::new(InMemoryTx { guard, working, locked: HashSet::new() }))
  }
}

pub struct InMemoryTx<'a> {
  guard: MutexGuard<'a, LabState>,
  working: LabState,
  locked: HashSet<Uuid>,
}

fn missing(what: &str, id: &Uuid) -> LabError {
  LabError::NotFound(format!("{} {} no existe", what, id))
}

impl LabTx for InMemoryTx<'_> {
  fn lock_experiment(&mut self, experiment_id: &Uuid) -> Result<()> {
    // El mutex ya serializa todo el almacén; sólo se registra el lock.
    self.locked.insert(*experiment_id);
    Ok(())
  }

  fn get_experiment(&mut self, id: &Uuid) -> Result<Option<Experiment>> {
    Ok(self.working.experiments.get(id).cloned())
  }

  fn insert_experiment(&mut self, experiment: &Experiment) -> Result<()> {
    if self.working.experiments.values().any(|e| e.name == experiment.name) {
      return Err(LabError::Conflict(format!("ya existe un experimento llamado '{}'", experiment.name)));
    }
    self.working.experiments.insert(experiment.id, experiment.clone());
    Ok(())
  }

  fn update_experiment(&mut self, experiment: &Experiment) -> Result<()> {
    let slot = self.working
                   .experiments
                   .get_mut(&experiment.id)
                   .ok_or_else(|| missing("experimento", &experiment.id))?;
    *slot = experiment.clone();
    Ok(())
  }

  fn delete_experiment(&mut self, id: &Uuid) -> Result<()> {
    self.working.experiments.remove(id).map(|_| ()).ok_or_else(|| missing("experimento", id))
  }

  fn list_lanes(&mut self, experiment_id: &Uuid) -> Result<Vec<Lane>> {
    let mut lanes: Vec<Lane> =
      self.working.lanes.values().filter(|l| &l.experiment_id == experiment_id).cloned().collect();
    lanes.sort_by_key(|l| l.number);
    Ok(lanes)
  }

  fn get_lane_by_number(&mut self, experiment_id: &Uuid, number: i32) -> Result<Option<Lane>> {
    Ok(self.working
           .lanes
           .values()
           .find(|l| &l.experiment_id == experiment_id && l.number == number)
           .cloned())
  }

  fn insert_lane(&mut self, lane: &Lane) -> Result<()> {
    if self.working.lanes.values().any(|l| l.experiment_id == lane.experiment_id && l.number == lane.number) {
      return Err(LabError::Conflict(format!("el carril {} ya existe en el experimento {}",
                                            lane.number, lane.experiment_id)));
    }
    self.working.lanes.insert(lane.id, lane.clone());
    Ok(())
  }

  fn update_lane(&mut self, lane: &Lane) -> Result<()> {
    let slot = self.working.lanes.get_mut(&lane.id).ok_or_else(|| missing("carril", &lane.id))?;
    *slot = lane.clone();
    Ok(())
  }

  fn delete_lane(&mut self, lane_id: &Uuid) -> Result<()> {
    if self.working.links.keys().any(|(l, _)| l == lane_id) {
      return Err(LabError::Storage(format!("el carril {} todavía tiene enlaces", lane_id)));
    }
    self.working.lanes.remove(lane_id).map(|_| ()).ok_or_else(|| missing("carril", lane_id))
  }

  fn get_pool(&mut self, id: &Uuid) -> Result<Option<Pool>> {
    Ok(self.working.pools.get(id).cloned())
  }

  fn insert_pool(&mut self, pool: &Pool) -> Result<()> {
    if self.working.pools.contains_key(&pool.id) {
      return Err(LabError::Conflict(format!("el pool {} ya existe", pool.id)));
    }
    self.working.pools.insert(pool.id, pool.clone());
    Ok(())
  }

  fn update_pool(&mut self, pool: &Pool) -> Result<()> {
    let slot = self.working.pools.get_mut(&pool.id).ok_or_else(|| missing("pool", &pool.id))?;
    *slot = pool.clone();
    Ok(())
  }

  fn delete_pool(&mut self, id: &Uuid) -> Result<()> {
    if self.working.links.keys().any(|(_, p)| p == id) {
      return Err(LabError::Storage(format!("el pool {} todavía tiene enlaces", id)));
    }
    self.working.pools.remove(id).map(|_| ()).ok_or_else(|| missing("pool", id))
  }

  fn list_experiment_pools(&mut self, experiment_id: &Uuid) -> Result<Vec<Pool>> {
    let mut pools: Vec<Pool> =
      self.working.pools.values().filter(|p| p.experiment_id.as_ref() == Some(experiment_id)).cloned().collect();
    pools.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    Ok(pools)
  }

  fn get_library(&mut self, id: &Uuid) -> Result<Option<Library>> {
    Ok(self.working.libraries.get(id).cloned())
  }

  fn insert_library(&mut self, library: &Library) -> Result<()> {
    if self.working.libraries.contains_key(&library.id) {
      return Err(LabError::Conflict(format!("la librería {} ya existe", library.id)));
    }
    self.working.libraries.insert(library.id, library.clone());
    Ok(())
  }

  fn update_library(&mut self, library: &Library) -> Result<()> {
    let slot = self.working.libraries.get_mut(&library.id).ok_or_else(|| missing("librería", &library.id))?;
    *slot = library.clone();
    Ok(())
  }

  fn list_pool_libraries(&mut self, pool_id: &Uuid) -> Result<Vec<Library>> {
    let mut libs: Vec<Library> =
      self.working.libraries.values().filter(|l| l.pool_id.as_ref() == Some(pool_id)).cloned().collect();
    libs.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    Ok(libs)
  }

  fn get_link(&mut self, lane_id: &Uuid, pool_id: &Uuid) -> Result<Option<LanePoolLink>> {
    Ok(self.working.links.get(&(*lane_id, *pool_id)).cloned())
  }

  fn insert_link(&mut self, link: &LanePoolLink) -> Result<()> {
    if self.working.links.contains_key(&link.key()) {
      return Err(LabError::Conflict(format!("carril {} y pool {} ya están enlazados", link.lane_id, link.pool_id)));
    }
    self.working.links.insert(link.key(), link.clone());
    Ok(())
  }

  fn update_link(&mut self, link: &LanePoolLink) -> Result<()> {
    let slot = self.working.links.get_mut(&link.key()).ok_or_else(|| {
                                                         LabError::NotFound(format!("enlace carril {} / pool {} no existe",
                                                                                    link.lane_id, link.pool_id))
                                                       })?;
    *slot = link.clone();
    Ok(())
  }

  fn delete_link(&mut self, lane_id: &Uuid, pool_id: &Uuid) -> Result<()> {
    self.working
        .links
        .remove(&(*lane_id, *pool_id))
        .map(|_| ())
        .ok_or_else(|| LabError::NotFound(format!("enlace carril {} / pool {} no existe", lane_id, pool_id)))
  }

  fn list_experiment_links(&mut self, experiment_id: &Uuid) -> Result<Vec<LanePoolLink>> {
    let mut links: Vec<LanePoolLink> =
      self.working.links.values().filter(|l| &l.experiment_id == experiment_id).cloned().collect();
    links.sort_by(|a, b| a.lane_num.cmp(&b.lane_num).then(a.pool_id.cmp(&b.pool_id)));
    Ok(links)
  }

  fn list_pool_links(&mut self, experiment_id: &Uuid, pool_id: &Uuid) -> Result<Vec<LanePoolLink>> {
    let mut links: Vec<LanePoolLink> = self.working
                                           .links
                                           .values()
                                           .filter(|l| &l.experiment_id == experiment_id && &l.pool_id == pool_id)
                                           .cloned()
                                           .collect();
    links.sort_by_key(|l| l.lane_num);
    Ok(links)
  }

  fn commit(self: Box<Self>) -> Result<()> {
    let InMemoryTx { mut guard, working, .. } = *self;
    *guard = working;
    Ok(())
  }

  fn rollback(self: Box<Self>) -> Result<()> {
    Ok(())
  }
}
