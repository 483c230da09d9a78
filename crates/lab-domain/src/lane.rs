// lane.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Peso molecular medio de un par de bases (g/mol) usado para convertir
/// concentración qubit a molaridad.
const BP_MOLECULAR_WEIGHT: f64 = 660.0;

/// Mediciones de QC de un carril. Todas son opcionales y sobreviven a un
/// cambio de workflow mientras el número de carril siga existiendo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LaneQc {
  pub phi_x: Option<f64>,
  pub avg_fragment_size: Option<i32>,
  pub original_qubit_concentration: Option<f64>,
  pub sequencing_qubit_concentration: Option<f64>,
  pub total_volume_ul: Option<f64>,
  pub library_volume_ul: Option<f64>,
  pub target_molarity: Option<f64>,
}

impl LaneQc {
  pub fn is_empty(&self) -> bool {
    *self == LaneQc::default()
  }

  fn molarity_for(&self, qubit: Option<f64>) -> Option<f64> {
    let qubit = qubit?;
    let size = self.avg_fragment_size?;
    if size <= 0 {
      return None;
    }
    Some(qubit / (f64::from(size) * BP_MOLECULAR_WEIGHT) * 1_000_000.0)
  }

  /// Molaridad (nM) de la medición original.
  pub fn original_molarity(&self) -> Option<f64> {
    self.molarity_for(self.original_qubit_concentration)
  }

  /// Molaridad (nM) de la medición previa a secuenciar.
  pub fn sequencing_molarity(&self) -> Option<f64> {
    self.molarity_for(self.sequencing_qubit_concentration)
  }

  /// Molaridad vigente: la de secuenciación si existe, si no la original.
  pub fn molarity(&self) -> Option<f64> {
    if self.sequencing_qubit_concentration.is_some() {
      self.sequencing_molarity()
    } else {
      self.original_molarity()
    }
  }

  pub fn is_qced(&self) -> bool {
    self.avg_fragment_size.is_some() && self.original_qubit_concentration.is_some()
  }
}

/// Carril físico de una flow cell. Pertenece en exclusiva a su experimento.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lane {
  pub id: Uuid,
  pub experiment_id: Uuid,
  pub number: i32,
  pub qc: LaneQc,
}

impl Lane {
  pub fn new(experiment_id: Uuid, number: i32) -> Self {
    Self { id: Uuid::new_v4(), experiment_id, number, qc: LaneQc::default() }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn sequencing_measurement_wins_over_original() {
    let qc = LaneQc { avg_fragment_size: Some(500),
                      original_qubit_concentration: Some(3.3),
                      sequencing_qubit_concentration: Some(1.65),
                      ..Default::default() };
    let original = qc.original_molarity().unwrap();
    let current = qc.molarity().unwrap();
    assert!((original - 10.0).abs() < 1e-9);
    assert!((current - 5.0).abs() < 1e-9);
    assert!(qc.is_qced());
  }

  #[test]
  fn molarity_needs_fragment_size() {
    let qc = LaneQc { original_qubit_concentration: Some(2.0), ..Default::default() };
    assert!(qc.molarity().is_none());
    assert!(!qc.is_qced());
    assert!(LaneQc::default().is_empty());
  }
}
