// link.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Asociación pool ↔ carril dentro de un experimento, con su parte de
/// lecturas. Clave compuesta `(lane_id, pool_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanePoolLink {
  pub lane_id: Uuid,
  pub pool_id: Uuid,
  pub experiment_id: Uuid,
  pub lane_num: i32,
  pub num_m_reads: Option<f64>,
  pub dilution_id: Option<Uuid>,
}

impl LanePoolLink {
  pub fn key(&self) -> (Uuid, Uuid) {
    (self.lane_id, self.pool_id)
  }
}
