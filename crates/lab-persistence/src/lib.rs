//! Persistencia Diesel para el motor de carriles.
//! Expone el módulo `schema` y el almacén `DieselLabStore`, que implementa
//! `LabStore`/`LabTx` sobre SQLite (por defecto) o Postgres (feature `pg`).
//! La implementación detallada está en `lab_persistence.rs`.

mod lab_persistence;
pub mod schema;

#[cfg(not(feature = "pg"))]
pub use lab_persistence::new_sqlite_for_test;
pub use lab_persistence::{new_from_env, DieselLabStore, DieselTx, MIGRATIONS};
