// Configuración del binario a partir del entorno (y de `.env` si existe).
//
// SEQLANE_DB_URL / DATABASE_URL  URL de la base de datos. Sin ella se usa
//                                un almacén en memoria.
// SEQLANE_WORKFLOW_CATALOG       JSON con el catálogo de workflows. Sin él
//                                se usa el catálogo estándar.
// RUST_LOG                       filtro de logs (tracing-subscriber).
use lab_domain::{LabError, WorkflowCatalog};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("Catálogo de workflows inválido en {path}: {source}")]
  Catalog { path: String, source: LabError },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppConfig {
  pub database_url: Option<String>,
  pub catalog_path: Option<PathBuf>,
}

impl AppConfig {
  pub fn from_env() -> Self {
    dotenvy::dotenv().ok();
    let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
    AppConfig { database_url: non_empty("SEQLANE_DB_URL").or_else(|| non_empty("DATABASE_URL")),
                catalog_path: non_empty("SEQLANE_WORKFLOW_CATALOG").map(PathBuf::from) }
  }

  pub fn load_catalog(&self) -> Result<WorkflowCatalog, ConfigError> {
    match &self.catalog_path {
      Some(path) => WorkflowCatalog::from_path(path).map_err(|source| ConfigError::Catalog { path: path.display().to_string(),
                                                                                             source }),
      None => Ok(WorkflowCatalog::builtin()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn without_path_uses_builtin_catalog() {
    let catalog = AppConfig::default().load_catalog().unwrap();
    assert_eq!(catalog.len(), WorkflowCatalog::builtin().len());
  }

  #[test]
  fn catalog_file_is_loaded() {
    let path = std::env::temp_dir().join(format!("seqlane_catalog_{}.json", uuid::Uuid::new_v4()));
    let raw = r#"{"workflows":[{"id":42,"name":"Custom","combined_lanes":true,
                 "flow_cell_type":{"name":"FC","num_lanes":3,"max_m_reads_per_lane":10.0}}]}"#;
    std::fs::write(&path, raw).unwrap();
    let config = AppConfig { database_url: None, catalog_path: Some(path.clone()) };
    let catalog = config.load_catalog().unwrap();
    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog.get(lab_domain::WorkflowId(42)).unwrap().num_lanes(), 3);
    let _ = std::fs::remove_file(path);
  }

  #[test]
  fn missing_catalog_file_is_an_error() {
    let config = AppConfig { database_url: None, catalog_path: Some(PathBuf::from("/nonexistent/catalog.json")) };
    assert!(matches!(config.load_catalog(), Err(ConfigError::Catalog { .. })));
  }
}
