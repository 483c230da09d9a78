// experiment.rs
use crate::errors::{LabError, Result};
use crate::{Lane, LanePoolLink, Pool, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Longitud máxima del nombre de un experimento (columna `VARCHAR(16)`).
pub const MAX_EXPERIMENT_NAME_LEN: usize = 16;

/// Estado de un experimento. En la BD se guarda como entero pequeño y se
/// resuelve a este enum al leer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentStatus {
  Draft,
  Sequencing,
  Finished,
  Archived,
  Failed,
}

impl ExperimentStatus {
  pub fn id(self) -> i16 {
    match self {
      ExperimentStatus::Draft => 0,
      ExperimentStatus::Sequencing => 1,
      ExperimentStatus::Finished => 2,
      ExperimentStatus::Archived => 3,
      ExperimentStatus::Failed => 4,
    }
  }
}

impl TryFrom<i16> for ExperimentStatus {
  type Error = LabError;

  fn try_from(id: i16) -> Result<Self> {
    match id {
      0 => Ok(ExperimentStatus::Draft),
      1 => Ok(ExperimentStatus::Sequencing),
      2 => Ok(ExperimentStatus::Finished),
      3 => Ok(ExperimentStatus::Archived),
      4 => Ok(ExperimentStatus::Failed),
      other => Err(LabError::Storage(format!("status_id desconocido: {}", other))),
    }
  }
}

impl fmt::Display for ExperimentStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      ExperimentStatus::Draft => "Draft",
      ExperimentStatus::Sequencing => "Sequencing",
      ExperimentStatus::Finished => "Finished",
      ExperimentStatus::Archived => "Archived",
      ExperimentStatus::Failed => "Failed",
    };
    write!(f, "{}", s)
  }
}

/// Una corrida de secuenciación sobre una flow cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
  pub id: Uuid,
  pub name: String,
  pub workflow_id: WorkflowId,
  pub status: ExperimentStatus,
  pub created_at: DateTime<Utc>,
}

impl Experiment {
  pub fn new(name: &str, workflow_id: WorkflowId, status: ExperimentStatus) -> Result<Self> {
    let name = name.trim();
    if name.is_empty() {
      return Err(LabError::Validation("El nombre del experimento no puede estar vacío".to_string()));
    }
    if name.chars().count() > MAX_EXPERIMENT_NAME_LEN {
      return Err(LabError::Validation(format!("El nombre del experimento excede {} caracteres",
                                              MAX_EXPERIMENT_NAME_LEN)));
    }
    Ok(Self { id: Uuid::new_v4(), name: name.to_string(), workflow_id, status, created_at: Utc::now() })
  }
}

/// Foto completa del subgrafo de un experimento. Se usa para diagnosticar
/// violaciones de invariantes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentSnapshot {
  pub experiment: Experiment,
  pub lanes: Vec<Lane>,
  pub pools: Vec<Pool>,
  pub links: Vec<LanePoolLink>,
}
