use crate::schema::{experiments, lane_pool_links, lanes, libraries, pools};
use chrono::{TimeZone, Utc};
use diesel::connection::{AnsiTransactionManager, TransactionManager};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, PooledConnection};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use lab_domain::{Experiment, ExperimentStatus, LabError, LabStore, LabTx, Lane, LanePoolLink, LaneQc, Library, Pool,
                 Result, WorkflowId};
use std::sync::Arc;
use uuid::Uuid;
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");
#[cfg(feature = "pg")]
type DbConn = PgConnection;
#[cfg(not(feature = "pg"))]
type DbConn = SqliteConnection;
type DbPool = diesel::r2d2::Pool<ConnectionManager<DbConn>>;
/// Almacén Diesel que implementa `LabStore`. Cada transacción retiene una
/// conexión del pool hasta su `commit` o `rollback`.
pub struct DieselLabStore {
  pool: Arc<DbPool>,
}
impl DieselLabStore {
  pub fn new(database_url: &str) -> Result<Self> {
    let manager = ConnectionManager::<DbConn>::new(database_url);
    let pool = diesel::r2d2::Pool::builder().max_size(4)
                                            .build(manager)
                                            .map_err(|e| LabError::Storage(format!("no se pudo crear el pool de conexiones: {}", e)))?;
    let store = DieselLabStore { pool: Arc::new(pool) };
    let mut c = store.conn()?;
    #[cfg(not(feature = "pg"))]
    {
      let _ = diesel::sql_query("PRAGMA journal_mode = WAL;").execute(&mut c);
      let _ = diesel::sql_query("PRAGMA busy_timeout = 5000;").execute(&mut c);
    }
    c.run_pending_migrations(MIGRATIONS).map_err(|e| LabError::Storage(format!("migraciones: {}", e)))?;
    log::debug!("lab-persistence: migraciones aplicadas");
    Ok(store)
  }
  fn conn(&self) -> Result<PooledConnection<ConnectionManager<DbConn>>> {
    self.pool.get().map_err(|e| LabError::Storage(format!("pool: {}", e)))
  }
}
impl LabStore for DieselLabStore {
  fn begin(&self) -> Result<Box<dyn LabTx + '_>> {
    let mut conn = self.conn()?;
    open_transaction(&mut conn)?;
    Ok(Box::new(DieselTx { conn, finished: false }))
  }
}
// SQLite no tiene locks por fila: la transacción toma el lock de escritura
// desde el BEGIN y eso serializa también el acceso a cada experimento.
#[cfg(not(feature = "pg"))]
fn open_transaction(conn: &mut DbConn) -> Result<()> {
  use diesel::connection::SimpleConnection;
  map_db_err(conn.batch_execute("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;"))?;
  map_db_err(AnsiTransactionManager::begin_transaction_sql(conn, "BEGIN IMMEDIATE"))
}
#[cfg(feature = "pg")]
fn open_transaction(conn: &mut DbConn) -> Result<()> {
  map_db_err(AnsiTransactionManager::begin_transaction(conn))
}
#[cfg(not(feature = "pg"))]
fn advisory_lock(_conn: &mut DbConn, _experiment_id: &Uuid) -> Result<()> {
  Ok(())
}
#[cfg(feature = "pg")]
fn advisory_lock(conn: &mut DbConn, experiment_id: &Uuid) -> Result<()> {
  // Clave de 64 bits derivada del uuid; se libera al terminar la transacción.
  let key = experiment_id.as_u64_pair().0 as i64;
  map_db_err(diesel::sql_query("SELECT pg_advisory_xact_lock($1)").bind::<diesel::sql_types::BigInt, _>(key)
                                                                   .execute(conn))?;
  Ok(())
}
// Diesel row structs
#[derive(Debug, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = experiments)]
struct ExperimentRow {
  pub id: String,
  pub name: String,
  pub workflow_id: i16,
  pub status: i16,
  pub created_at_ts: i64,
}
#[derive(Debug, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = lanes, treat_none_as_null = true)]
struct LaneRow {
  pub id: String,
  pub experiment_id: String,
  pub number: i32,
  pub phi_x: Option<f64>,
  pub avg_fragment_size: Option<i32>,
  pub original_qubit_concentration: Option<f64>,
  pub sequencing_qubit_concentration: Option<f64>,
  pub total_volume_ul: Option<f64>,
  pub library_volume_ul: Option<f64>,
  pub target_molarity: Option<f64>,
}
#[derive(Debug, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = pools, treat_none_as_null = true)]
struct PoolRow {
  pub id: String,
  pub name: String,
  pub num_m_reads_requested: Option<f64>,
  pub experiment_id: Option<String>,
}
#[derive(Debug, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = libraries, treat_none_as_null = true)]
struct LibraryRow {
  pub id: String,
  pub name: String,
  pub pool_id: Option<String>,
  pub experiment_id: Option<String>,
}
#[derive(Debug, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = lane_pool_links, primary_key(lane_id, pool_id), treat_none_as_null = true)]
struct LinkRow {
  pub lane_id: String,
  pub pool_id: String,
  pub experiment_id: String,
  pub lane_num: i32,
  pub num_m_reads: Option<f64>,
  pub dilution_id: Option<String>,
}
fn db_err(e: DieselError) -> LabError {
  match e {
    DieselError::NotFound => LabError::NotFound("registro no encontrado".into()),
    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
      LabError::Conflict(format!("db: {}", info.message()))
    }
    other => LabError::Storage(format!("db: {}", other)),
  }
}
fn map_db_err<T>(res: std::result::Result<T, DieselError>) -> Result<T> {
  res.map_err(db_err)
}
fn parse_uuid(s: &str) -> Result<Uuid> {
  Uuid::parse_str(s).map_err(|e| LabError::Storage(format!("uuid inválido '{}': {}", s, e)))
}
fn parse_opt_uuid(s: Option<&str>) -> Result<Option<Uuid>> {
  s.map(parse_uuid).transpose()
}
fn expect_one(affected: usize, what: &str, id: &str) -> Result<()> {
  if affected == 0 {
    return Err(LabError::NotFound(format!("{} {} no existe", what, id)));
  }
  Ok(())
}
impl ExperimentRow {
  fn from_domain(e: &Experiment) -> Result<Self> {
    let created_at_ts =
      e.created_at
       .timestamp_nanos_opt()
       .ok_or_else(|| LabError::Validation(format!("fecha de creación fuera de rango: {}", e.created_at)))?;
    Ok(ExperimentRow { id: e.id.to_string(),
                       name: e.name.clone(),
                       workflow_id: e.workflow_id.0,
                       status: e.status.id(),
                       created_at_ts })
  }
  fn into_domain(self) -> Result<Experiment> {
    Ok(Experiment { id: parse_uuid(&self.id)?,
                    name: self.name,
                    workflow_id: WorkflowId(self.workflow_id),
                    status: ExperimentStatus::try_from(self.status)?,
                    created_at: Utc.timestamp_nanos(self.created_at_ts) })
  }
}
impl LaneRow {
  fn from_domain(l: &Lane) -> Self {
    LaneRow { id: l.id.to_string(),
              experiment_id: l.experiment_id.to_string(),
              number: l.number,
              phi_x: l.qc.phi_x,
              avg_fragment_size: l.qc.avg_fragment_size,
              original_qubit_concentration: l.qc.original_qubit_concentration,
              sequencing_qubit_concentration: l.qc.sequencing_qubit_concentration,
              total_volume_ul: l.qc.total_volume_ul,
              library_volume_ul: l.qc.library_volume_ul,
              target_molarity: l.qc.target_molarity }
  }
  fn into_domain(self) -> Result<Lane> {
    Ok(Lane { id: parse_uuid(&self.id)?,
              experiment_id: parse_uuid(&self.experiment_id)?,
              number: self.number,
              qc: LaneQc { phi_x: self.phi_x,
                           avg_fragment_size: self.avg_fragment_size,
                           original_qubit_concentration: self.original_qubit_concentration,
                           sequencing_qubit_concentration: self.sequencing_qubit_concentration,
                           total_volume_ul: self.total_volume_ul,
                           library_volume_ul: self.library_volume_ul,
                           target_molarity: self.target_molarity } })
  }
}
impl PoolRow {
  fn from_domain(p: &Pool) -> Self {
    PoolRow { id: p.id.to_string(),
              name: p.name.clone(),
              num_m_reads_requested: p.num_m_reads_requested,
              experiment_id: p.experiment_id.map(|u| u.to_string()) }
  }
  fn into_domain(self) -> Result<Pool> {
    Ok(Pool { id: parse_uuid(&self.id)?,
              name: self.name,
              num_m_reads_requested: self.num_m_reads_requested,
              experiment_id: parse_opt_uuid(self.experiment_id.as_deref())? })
  }
}
impl LibraryRow {
  fn from_domain(l: &Library) -> Self {
    LibraryRow { id: l.id.to_string(),
                 name: l.name.clone(),
                 pool_id: l.pool_id.map(|u| u.to_string()),
                 experiment_id: l.experiment_id.map(|u| u.to_string()) }
  }
  fn into_domain(self) -> Result<Library> {
    Ok(Library { id: parse_uuid(&self.id)?,
                 name: self.name,
                 pool_id: parse_opt_uuid(self.pool_id.as_deref())?,
                 experiment_id: parse_opt_uuid(self.experiment_id.as_deref())? })
  }
}
impl LinkRow {
  fn from_domain(l: &LanePoolLink) -> Self {
    LinkRow { lane_id: l.lane_id.to_string(),
              pool_id: l.pool_id.to_string(),
              experiment_id: l.experiment_id.to_string(),
              lane_num: l.lane_num,
              num_m_reads: l.num_m_reads,
              dilution_id: l.dilution_id.map(|u| u.to_string()) }
  }
  fn into_domain(self) -> Result<LanePoolLink> {
    Ok(LanePoolLink { lane_id: parse_uuid(&self.lane_id)?,
                      pool_id: parse_uuid(&self.pool_id)?,
                      experiment_id: parse_uuid(&self.experiment_id)?,
                      lane_num: self.lane_num,
                      num_m_reads: self.num_m_reads,
                      dilution_id: parse_opt_uuid(self.dilution_id.as_deref())? })
  }
}
/// Transacción abierta sobre una conexión del pool. Si se descarta sin
/// `commit` se hace rollback.
pub struct DieselTx {
  conn: PooledConnection<ConnectionManager<DbConn>>,
  finished: bool,
}
impl DieselTx {
  fn c(&mut self) -> &mut DbConn {
    &mut self.conn
  }
}
impl Drop for DieselTx {
  fn drop(&mut self) {
    if !self.finished {
      if let Err(e) = AnsiTransactionManager::rollback_transaction(self.c()) {
        log::error!("lab-persistence: rollback implícito fallido: {}", e);
      }
    }
  }
}
impl LabTx for DieselTx {
  fn lock_experiment(&mut self, experiment_id: &Uuid) -> Result<()> {
    advisory_lock(self.c(), experiment_id)
  }
  fn get_experiment(&mut self, id: &Uuid) -> Result<Option<Experiment>> {
    let row = map_db_err(experiments::table.filter(experiments::id.eq(id.to_string()))
                                           .first::<ExperimentRow>(self.c())
                                           .optional())?;
    row.map(ExperimentRow::into_domain).transpose()
  }
  fn insert_experiment(&mut self, experiment: &Experiment) -> Result<()> {
    let row = ExperimentRow::from_domain(experiment)?;
    map_db_err(diesel::insert_into(experiments::table).values(&row).execute(self.c()))?;
    Ok(())
  }
  fn update_experiment(&mut self, experiment: &Experiment) -> Result<()> {
    let row = ExperimentRow::from_domain(experiment)?;
    let n = map_db_err(diesel::update(experiments::table.filter(experiments::id.eq(&row.id))).set(&row)
                                                                                          .execute(self.c()))?;
    expect_one(n, "experimento", &row.id)
  }
  fn delete_experiment(&mut self, id: &Uuid) -> Result<()> {
    let id_s = id.to_string();
    let n = map_db_err(diesel::delete(experiments::table.filter(experiments::id.eq(&id_s))).execute(self.c()))?;
    expect_one(n, "experimento", &id_s)
  }
  fn list_lanes(&mut self, experiment_id: &Uuid) -> Result<Vec<Lane>> {
    let rows = map_db_err(lanes::table.filter(lanes::experiment_id.eq(experiment_id.to_string()))
                                      .order(lanes::number.asc())
                                      .load::<LaneRow>(self.c()))?;
    rows.into_iter().map(LaneRow::into_domain).collect()
  }
  fn get_lane_by_number(&mut self, experiment_id: &Uuid, number: i32) -> Result<Option<Lane>> {
    let row = map_db_err(lanes::table.filter(lanes::experiment_id.eq(experiment_id.to_string()))
                                     .filter(lanes::number.eq(number))
                                     .first::<LaneRow>(self.c())
                                     .optional())?;
    row.map(LaneRow::into_domain).transpose()
  }
  fn insert_lane(&mut self, lane: &Lane) -> Result<()> {
    let row = LaneRow::from_domain(lane);
    map_db_err(diesel::insert_into(lanes::table).values(&row).execute(self.c()))?;
    Ok(())
  }
  fn update_lane(&mut self, lane: &Lane) -> Result<()> {
    let row = LaneRow::from_domain(lane);
    let n = map_db_err(diesel::update(lanes::table.filter(lanes::id.eq(&row.id))).set(&row).execute(self.c()))?;
    expect_one(n, "carril", &row.id)
  }
  fn delete_lane(&mut self, lane_id: &Uuid) -> Result<()> {
    let id_s = lane_id.to_string();
    let n = map_db_err(diesel::delete(lanes::table.filter(lanes::id.eq(&id_s))).execute(self.c()))?;
    expect_one(n, "carril", &id_s)
  }
  fn get_pool(&mut self, id: &Uuid) -> Result<Option<Pool>> {
    let row = map_db_err(pools::table.filter(pools::id.eq(id.to_string())).first::<PoolRow>(self.c()).optional())?;
    row.map(PoolRow::into_domain).transpose()
  }
  fn insert_pool(&mut self, pool: &Pool) -> Result<()> {
    let row = PoolRow::from_domain(pool);
    map_db_err(diesel::insert_into(pools::table).values(&row).execute(self.c()))?;
    Ok(())
  }
  fn update_pool(&mut self, pool: &Pool) -> Result<()> {
    let row = PoolRow::from_domain(pool);
    let n = map_db_err(diesel::update(pools::table.filter(pools::id.eq(&row.id))).set(&row).execute(self.c()))?;
    expect_one(n, "pool", &row.id)
  }
  fn delete_pool(&mut self, id: &Uuid) -> Result<()> {
    let id_s = id.to_string();
    let n = map_db_err(diesel::delete(pools::table.filter(pools::id.eq(&id_s))).execute(self.c()))?;
    expect_one(n, "pool", &id_s)
  }
  fn list_experiment_pools(&mut self, experiment_id: &Uuid) -> Result<Vec<Pool>> {
    let rows = map_db_err(pools::table.filter(pools::experiment_id.eq(experiment_id.to_string()))
                                      .order((pools::name.asc(), pools::id.asc()))
                                      .load::<PoolRow>(self.c()))?;
    rows.into_iter().map(PoolRow::into_domain).collect()
  }
  fn get_library(&mut self, id: &Uuid) -> Result<Option<Library>> {
    let row = map_db_err(libraries::table.filter(libraries::id.eq(id.to_string()))
                                         .first::<LibraryRow>(self.c())
                                         .optional())?;
    row.map(LibraryRow::into_domain).transpose()
  }
  fn insert_library(&mut self, library: &Library) -> Result<()> {
    let row = LibraryRow::from_domain(library);
    map_db_err(diesel::insert_into(libraries::table).values(&row).execute(self.c()))?;
    Ok(())
  }
  fn update_library(&mut self, library: &Library) -> Result<()> {
    let row = LibraryRow::from_domain(library);
    let n =
      map_db_err(diesel::update(libraries::table.filter(libraries::id.eq(&row.id))).set(&row).execute(self.c()))?;
    expect_one(n, "librería", &row.id)
  }
  fn list_pool_libraries(&mut self, pool_id: &Uuid) -> Result<Vec<Library>> {
    let rows = map_db_err(libraries::table.filter(libraries::pool_id.eq(pool_id.to_string()))
                                          .order((libraries::name.asc(), libraries::id.asc()))
                                          .load::<LibraryRow>(self.c()))?;
    rows.into_iter().map(LibraryRow::into_domain).collect()
  }
  fn get_link(&mut self, lane_id: &Uuid, pool_id: &Uuid) -> Result<Option<LanePoolLink>> {
    let row = map_db_err(lane_pool_links::table.filter(lane_pool_links::lane_id.eq(lane_id.to_string()))
                                               .filter(lane_pool_links::pool_id.eq(pool_id.to_string()))
                                               .first::<LinkRow>(self.c())
                                               .optional())?;
    row.map(LinkRow::into_domain).transpose()
  }
  fn insert_link(&mut self, link: &LanePoolLink) -> Result<()> {
    let row = LinkRow::from_domain(link);
    map_db_err(diesel::insert_into(lane_pool_links::table).values(&row).execute(self.c()))?;
    Ok(())
  }
  fn update_link(&mut self, link: &LanePoolLink) -> Result<()> {
    let row = LinkRow::from_domain(link);
    let target = lane_pool_links::table.filter(lane_pool_links::lane_id.eq(&row.lane_id))
                                       .filter(lane_pool_links::pool_id.eq(&row.pool_id));
    let n = map_db_err(diesel::update(target).set(&row).execute(self.c()))?;
    expect_one(n, "enlace", &format!("{}/{}", row.lane_id, row.pool_id))
  }
  fn delete_link(&mut self, lane_id: &Uuid, pool_id: &Uuid) -> Result<()> {
    let (lane_s, pool_s) = (lane_id.to_string(), pool_id.to_string());
    let target = lane_pool_links::table.filter(lane_pool_links::lane_id.eq(&lane_s))
                                       .filter(lane_pool_links::pool_id.eq(&pool_s));
    let n = map_db_err(diesel::delete(target).execute(self.c()))?;
    expect_one(n, "enlace", &format!("{}/{}", lane_s, pool_s))
  }
  fn list_experiment_links(&mut self, experiment_id: &Uuid) -> Result<Vec<LanePoolLink>> {
    let rows = map_db_err(lane_pool_links::table.filter(lane_pool_links::experiment_id.eq(experiment_id.to_string()))
                                                .order((lane_pool_links::lane_num.asc(), lane_pool_links::pool_id.asc()))
                                                .load::<LinkRow>(self.c()))?;
    rows.into_iter().map(LinkRow::into_domain).collect()
  }
  fn list_pool_links(&mut self, experiment_id: &Uuid, pool_id: &Uuid) -> Result<Vec<LanePoolLink>> {
    let rows = map_db_err(lane_pool_links::table.filter(lane_pool_links::experiment_id.eq(experiment_id.to_string()))
                                                .filter(lane_pool_links::pool_id.eq(pool_id.to_string()))
                                                .order(lane_pool_links::lane_num.asc())
                                                .load::<LinkRow>(self.c()))?;
    rows.into_iter().map(LinkRow::into_domain).collect()
  }
  fn commit(mut self: Box<Self>) -> Result<()> {
    self.finished = true;
    map_db_err(AnsiTransactionManager::commit_transaction(self.c()))
  }
  fn rollback(mut self: Box<Self>) -> Result<()> {
    self.finished = true;
    map_db_err(AnsiTransactionManager::rollback_transaction(self.c()))
  }
}
/// Crear el almacén desde las variables de entorno (`SEQLANE_DB_URL`, con
/// `DATABASE_URL` como alternativa).
#[cfg(feature = "pg")]
pub fn new_from_env() -> Result<DieselLabStore> {
  dotenvy::dotenv().ok();
  let url = std::env::var("SEQLANE_DB_URL").or_else(|_| std::env::var("DATABASE_URL"))
                                           .map_err(|_| LabError::Storage("SEQLANE_DB_URL / DATABASE_URL not set".into()))?;
  let l = url.to_lowercase();
  if !(l.starts_with("postgres") || l.starts_with("postgresql://") || url.contains('@')) {
    return Err(LabError::Storage("lab-persistence: SEQLANE_DB_URL does not look like Postgres URL".into()));
  }
  DieselLabStore::new(&url)
}
#[cfg(not(feature = "pg"))]
pub fn new_from_env() -> Result<DieselLabStore> {
  dotenvy::dotenv().ok();
  let url = std::env::var("SEQLANE_DB_URL").or_else(|_| std::env::var("DATABASE_URL"))
                                           .map_err(|_| LabError::Storage("SEQLANE_DB_URL / DATABASE_URL not set".into()))?;
  let l = url.to_lowercase();
  if l.starts_with("postgres") {
    return Err(LabError::Storage("lab-persistence was compiled without 'pg' feature; enable the 'pg' feature to use \
                                  Postgres"
                                           .into()));
  }
  DieselLabStore::new(&url)
}
// Test helper: SQLite explícito sobre la ruta dada, sin pasar por el entorno.
#[cfg(not(feature = "pg"))]
pub fn new_sqlite_for_test(database_url: &str) -> Result<DieselLabStore> {
  DieselLabStore::new(database_url)
}
