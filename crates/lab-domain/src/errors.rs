// errors.rs
use serde::Serialize;
use thiserror::Error;

use crate::ExperimentSnapshot;

/// Errores del motor de carriles.
///
/// Cada variante corresponde a un tipo de fallo que la capa web traduce a
/// una respuesta; el motor nunca reintenta por su cuenta.
#[derive(Debug, Error, Clone)]
pub enum LabError {
  /// Experimento, carril, pool o enlace inexistente.
  #[error("No encontrado: {0}")]
  NotFound(String),
  /// Enlace duplicado o precondición de pertenencia violada.
  #[error("Conflicto: {0}")]
  Conflict(String),
  /// Workflow desconocido para el catálogo o con `num_lanes < 1`.
  #[error("Workflow inválido: {0}")]
  InvalidWorkflow(String),
  /// Postcondición rota tras reconciliar un workflow. Indica un defecto del
  /// motor, nunca una petición inválida.
  #[error("Invariante violado: {0}")]
  InvariantViolation(Box<InvariantReport>),
  /// Error del almacenamiento subyacente (BD, pool de conexiones, mutex).
  #[error("Error de almacenamiento: {0}")]
  Storage(String),
  /// Datos de entrada mal formados (nombre vacío, lecturas negativas...).
  #[error("Error de validación: {0}")]
  Validation(String),
  #[error("Error de serialización: {0}")]
  Serialization(String),
}

impl From<serde_json::Error> for LabError {
  fn from(e: serde_json::Error) -> Self {
    Self::Serialization(e.to_string())
  }
}

/// Una violación concreta detectada por el verificador de invariantes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Violation {
  LaneCount { expected: usize, found: usize },
  LaneNumbering { expected: Vec<i32>, found: Vec<i32> },
  ReadAccounting { pool_id: uuid::Uuid, lane_number: i32, expected: Option<f64>, found: Option<f64> },
  CombinedFanOut { pool_id: uuid::Uuid, expected: usize, found: usize },
  DanglingLink { pool_id: uuid::Uuid, lane_id: uuid::Uuid },
}

/// Diagnóstico completo de una violación: qué falló y el estado del
/// experimento antes y después de la operación.
#[derive(Debug, Clone, Serialize)]
pub struct InvariantReport {
  pub violations: Vec<Violation>,
  pub before: ExperimentSnapshot,
  pub after: ExperimentSnapshot,
}

impl std::fmt::Display for InvariantReport {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "experimento {}: {} violación(es): {:?}", self.after.experiment.id, self.violations.len(), self.violations)
  }
}

/// Alias de resultado usado por las APIs del workspace.
pub type Result<T> = std::result::Result<T, LabError>;
