// workflow.rs
//
// Catálogo de workflows de secuenciación. Es información de referencia que se
// carga una vez al arrancar y se comparte en modo sólo lectura.
use crate::errors::{LabError, Result};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Identificador de workflow tal como se guarda en la columna `workflow_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(pub i16);

impl fmt::Display for WorkflowId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Tipo de flow cell: número de carriles físicos y capacidad por carril
/// (millones de lecturas).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowCellType {
  pub name: String,
  pub num_lanes: i32,
  pub max_m_reads_per_lane: f64,
}

impl FlowCellType {
  fn new(name: &str, num_lanes: i32, max_m_reads_per_lane: f64) -> Self {
    Self { name: name.to_string(), num_lanes, max_m_reads_per_lane }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
  pub id: WorkflowId,
  pub name: String,
  pub flow_cell_type: FlowCellType,
  /// Si es `true` cada pool del experimento ocupa todos los carriles.
  pub combined_lanes: bool,
}

impl Workflow {
  pub fn num_lanes(&self) -> i32 {
    self.flow_cell_type.num_lanes
  }

  /// Un workflow sólo es utilizable si su flow cell tiene al menos un carril.
  pub fn validate(&self) -> Result<()> {
    if self.flow_cell_type.num_lanes < 1 {
      return Err(LabError::InvalidWorkflow(format!("workflow {} ('{}') declara {} carriles",
                                                   self.id, self.name, self.flow_cell_type.num_lanes)));
    }
    Ok(())
  }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
  workflows: Vec<Workflow>,
}

/// Catálogo inmutable `WorkflowId -> Workflow`, en el orden de declaración.
#[derive(Debug, Clone)]
pub struct WorkflowCatalog {
  workflows: IndexMap<WorkflowId, Workflow>,
}

static BUILTIN: Lazy<WorkflowCatalog> = Lazy::new(|| {
  let sp = FlowCellType::new("NovaSeq SP", 2, 400.0);
  let s1 = FlowCellType::new("NovaSeq S1", 2, 800.0);
  let s2 = FlowCellType::new("NovaSeq S2", 2, 2000.0);
  let s4 = FlowCellType::new("NovaSeq S4", 4, 2500.0);
  let x_1_5b = FlowCellType::new("NovaSeq X 1.5B", 2, 800.0);
  let x_10b = FlowCellType::new("NovaSeq X 10B", 8, 1250.0);
  let miseq_v3 = FlowCellType::new("MiSeq V3", 1, 25.0);
  let miseq_micro = FlowCellType::new("MiSeq V2 Micro", 1, 4.0);
  let miseq_nano = FlowCellType::new("MiSeq V2 Nano", 1, 1.0);
  let wf = |id: i16, name: &str, fc: &FlowCellType, combined_lanes: bool| Workflow { id: WorkflowId(id),
                                                                                     name: name.to_string(),
                                                                                     flow_cell_type: fc.clone(),
                                                                                     combined_lanes };
  let list = vec![wf(1, "NovaSeq SP Standard", &sp, true),
                  wf(2, "NovaSeq SP XP", &sp, false),
                  wf(3, "NovaSeq S1 Standard", &s1, true),
                  wf(4, "NovaSeq S1 XP", &s1, false),
                  wf(5, "NovaSeq S2 Standard", &s2, true),
                  wf(6, "NovaSeq S2 XP", &s2, false),
                  wf(7, "NovaSeq S4 Standard", &s4, true),
                  wf(8, "NovaSeq S4 XP", &s4, false),
                  wf(9, "NovaSeq X 1.5B", &x_1_5b, false),
                  wf(10, "NovaSeq X 10B", &x_10b, false),
                  wf(11, "MiSeq V3", &miseq_v3, true),
                  wf(12, "MiSeq V2 Micro", &miseq_micro, true),
                  wf(13, "MiSeq V2 Nano", &miseq_nano, true)];
  WorkflowCatalog { workflows: list.into_iter().map(|w| (w.id, w)).collect() }
});

impl WorkflowCatalog {
  /// Catálogo estándar de la plataforma.
  pub fn builtin() -> Self {
    BUILTIN.clone()
  }

  /// Construye un catálogo a partir de una lista; ids repetidos son un error.
  pub fn from_workflows<I>(workflows: I) -> Result<Self>
    where I: IntoIterator<Item = Workflow>
  {
    let mut map = IndexMap::new();
    for w in workflows {
      if w.flow_cell_type.num_lanes < 1 {
        log::warn!("workflow {} ('{}') sin carriles; será rechazado al usarse", w.id, w.name);
      }
      let id = w.id;
      if map.insert(id, w).is_some() {
        return Err(LabError::InvalidWorkflow(format!("id de workflow duplicado en el catálogo: {}", id)));
      }
    }
    Ok(Self { workflows: map })
  }

  /// Carga un catálogo JSON de la forma `{"workflows": [...]}`.
  pub fn from_json(raw: &str) -> Result<Self> {
    let file: CatalogFile = serde_json::from_str(raw)?;
    Self::from_workflows(file.workflows)
  }

  pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|e| {
                                              LabError::Storage(format!("no se pudo leer el catálogo {}: {}", path.display(), e))
                                            })?;
    let catalog = Self::from_json(&raw)?;
    log::info!("catálogo de workflows cargado desde {} ({} entradas)", path.display(), catalog.len());
    Ok(catalog)
  }

  /// Busca un workflow; un id desconocido es `InvalidWorkflow`.
  pub fn get(&self, id: WorkflowId) -> Result<&Workflow> {
    self.workflows
        .get(&id)
        .ok_or_else(|| LabError::InvalidWorkflow(format!("workflow {} no existe en el catálogo", id)))
  }

  pub fn iter(&self) -> impl Iterator<Item = &Workflow> {
    self.workflows.values()
  }

  pub fn len(&self) -> usize {
    self.workflows.len()
  }

  pub fn is_empty(&self) -> bool {
    self.workflows.is_empty()
  }
}

impl Default for WorkflowCatalog {
  fn default() -> Self {
    Self::builtin()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builtin_catalog_has_valid_workflows() {
    let catalog = WorkflowCatalog::builtin();
    assert!(!catalog.is_empty());
    for w in catalog.iter() {
      w.validate().expect("workflow integrado inválido");
    }
    let s4_xp = catalog.get(WorkflowId(8)).unwrap();
    assert_eq!(s4_xp.num_lanes(), 4);
    assert!(!s4_xp.combined_lanes);
  }

  #[test]
  fn unknown_workflow_is_invalid() {
    let catalog = WorkflowCatalog::builtin();
    match catalog.get(WorkflowId(999)) {
      Err(LabError::InvalidWorkflow(_)) => {}
      other => panic!("se esperaba InvalidWorkflow, se obtuvo {:?}", other),
    }
  }

  #[test]
  fn json_catalog_rejects_duplicate_ids() {
    let raw = r#"{"workflows": [
      {"id": 1, "name": "a", "combined_lanes": true,
       "flow_cell_type": {"name": "fc", "num_lanes": 2, "max_m_reads_per_lane": 10.0}},
      {"id": 1, "name": "b", "combined_lanes": false,
       "flow_cell_type": {"name": "fc", "num_lanes": 4, "max_m_reads_per_lane": 10.0}}
    ]}"#;
    assert!(matches!(WorkflowCatalog::from_json(raw), Err(LabError::InvalidWorkflow(_))));
  }

  #[test]
  fn json_catalog_keeps_declaration_order() {
    let raw = r#"{"workflows": [
      {"id": 7, "name": "siete", "combined_lanes": true,
       "flow_cell_type": {"name": "fc", "num_lanes": 1, "max_m_reads_per_lane": 1.0}},
      {"id": 3, "name": "tres", "combined_lanes": false,
       "flow_cell_type": {"name": "fc", "num_lanes": 0, "max_m_reads_per_lane": 1.0}}
    ]}"#;
    let catalog = WorkflowCatalog::from_json(raw).unwrap();
    let ids: Vec<i16> = catalog.iter().map(|w| w.id.0).collect();
    assert_eq!(ids, vec![7, 3]);
    assert!(matches!(catalog.get(WorkflowId(3)).unwrap().validate(), Err(LabError::InvalidWorkflow(_))));
  }

  #[test]
  fn malformed_json_is_serialization_error() {
    assert!(matches!(WorkflowCatalog::from_json("{"), Err(LabError::Serialization(_))));
  }
}
