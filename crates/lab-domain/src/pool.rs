// pool.rs
use crate::errors::{LabError, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Conjunto de librerías que se secuencian juntas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pool {
  pub id: Uuid,
  pub name: String,
  /// Millones de lecturas pedidas en total, repartidas entre sus carriles.
  pub num_m_reads_requested: Option<f64>,
  pub experiment_id: Option<Uuid>,
}

impl Pool {
  pub fn new(name: &str, num_m_reads_requested: Option<f64>) -> Result<Self> {
    if name.trim().is_empty() {
      return Err(LabError::Validation("El nombre del pool no puede estar vacío".to_string()));
    }
    validate_reads(num_m_reads_requested)?;
    Ok(Self { id: Uuid::new_v4(), name: name.trim().to_string(), num_m_reads_requested, experiment_id: None })
  }

  /// Lecturas que le tocan a cada uno de `num_links` enlaces. `None` si el
  /// pool no tiene lecturas pedidas o si no hay enlaces.
  pub fn share_per_lane(&self, num_links: usize) -> Option<f64> {
    if num_links == 0 {
      return None;
    }
    self.num_m_reads_requested.map(|r| r / num_links as f64)
  }
}

/// Las lecturas pedidas deben ser un número finito y no negativo.
pub fn validate_reads(reads: Option<f64>) -> Result<()> {
  match reads {
    Some(r) if !r.is_finite() || r < 0.0 => {
      Err(LabError::Validation(format!("número de lecturas inválido: {}", r)))
    }
    _ => Ok(()),
  }
}

/// Librería secuenciable. Hereda el experimento de su pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Library {
  pub id: Uuid,
  pub name: String,
  pub pool_id: Option<Uuid>,
  pub experiment_id: Option<Uuid>,
}

impl Library {
  pub fn new(name: &str, pool_id: Option<Uuid>) -> Self {
    Self { id: Uuid::new_v4(), name: name.trim().to_string(), pool_id, experiment_id: None }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn share_divides_full_request() {
    let p = Pool::new("P1", Some(100.0)).unwrap();
    assert_eq!(p.share_per_lane(2), Some(50.0));
    assert_eq!(p.share_per_lane(0), None);
    let none = Pool::new("P2", None).unwrap();
    assert_eq!(none.share_per_lane(3), None);
  }

  #[test]
  fn negative_or_nan_reads_are_rejected() {
    assert!(matches!(Pool::new("P", Some(-1.0)), Err(LabError::Validation(_))));
    assert!(matches!(Pool::new("P", Some(f64::NAN)), Err(LabError::Validation(_))));
    assert!(matches!(Pool::new("", Some(1.0)), Err(LabError::Validation(_))));
  }
}
