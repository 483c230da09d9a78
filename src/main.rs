use std::error::Error;
use std::io::{self, Write};
use std::sync::Arc;
use lab_domain::{ExperimentStatus, InMemoryLabStore, LabStore, WorkflowId};
use lane_engine::{total_planned, LaneService};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod config;

/// Pequeño menú interactivo para planificar carriles de secuenciación usando
/// `LaneService` sobre el almacén configurado.
///
/// Opciones soportadas:
/// 1) Ver catálogo de workflows
/// 2) Crear experimento
/// 3) Ver experimento (carriles, enlaces y carga)
/// 4) Cambiar workflow de un experimento
/// 5) Crear pool
/// 6) Asociar pool a un experimento
/// 7) Cargar pool en un carril
/// 8) Retirar pool de un carril
/// 9) Desasociar pool de su experimento
/// 10) Verificar invariantes
/// 11) Salir
fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = config::AppConfig::from_env();
    let catalog = Arc::new(config.load_catalog()?);
    // Inicializar almacén (aplica migraciones embebidas si procede)
    let store: Arc<dyn LabStore> = match &config.database_url {
        Some(_) => Arc::new(lab_persistence::new_from_env()?),
        None => {
            tracing::warn!("SEQLANE_DB_URL no definida: usando almacén en memoria");
            Arc::new(InMemoryLabStore::new())
        }
    };
    tracing::info!("catálogo con {} workflows", catalog.len());
    let service = LaneService::new(store, catalog);

    loop {
        println!("\n== Seqlane menu ==");
        println!("1) Ver catálogo de workflows");
        println!("2) Crear experimento");
        println!("3) Ver experimento");
        println!("4) Cambiar workflow");
        println!("5) Crear pool");
        println!("6) Asociar pool a experimento");
        println!("7) Cargar pool en carril");
        println!("8) Retirar pool de carril");
        println!("9) Desasociar pool");
        println!("10) Verificar invariantes");
        println!("11) Salir");
        print!("Elige una opción: ");
        io::stdout().flush().ok();

        let mut choice = String::new();
        io::stdin().read_line(&mut choice)?;
        match choice.trim() {
            "1" => {
                println!("\nID  | CARRILES | COMBINADO | MAX M/CARRIL | NOMBRE");
                println!("-------------------------------------------------------------");
                for w in service.catalog().iter() {
                    println!(
                        "{:<3} | {:<8} | {:<9} | {:<12} | {}",
                        w.id,
                        w.num_lanes(),
                        w.combined_lanes,
                        w.flow_cell_type.max_m_reads_per_lane,
                        w.name
                    );
                }
            }
            "2" => {
                let name = prompt("Nombre del experimento: ")?;
                let Some(workflow_id) = prompt_workflow()? else { continue };
                let created =
                    service.create_experiment(name.trim(), workflow_id, ExperimentStatus::Draft);
                match created {
                    Ok((e, lanes)) => {
                        println!("Experimento creado: {} ({} carriles)", e.id, lanes.len())
                    }
                    Err(e) => eprintln!("Error creando experimento: {}", e),
                }
            }
            "3" => {
                let Some(id) = prompt_uuid("Experimento id (UUID): ")? else { continue };
                match service.snapshot(id) {
                    Ok(snap) => {
                        println!(
                            "\n{} | workflow {} | {}",
                            snap.experiment.name,
                            snap.experiment.workflow_id,
                            snap.experiment.status
                        );
                        for link in &snap.links {
                            let reads = link
                                .num_m_reads
                                .map(|r| format!("{:.2}", r))
                                .unwrap_or_else(|| "-".into());
                            println!(
                                "  carril {} <- pool {} ({} M lecturas)",
                                link.lane_num, link.pool_id, reads
                            );
                        }
                    }
                    Err(e) => {
                        eprintln!("Error leyendo experimento: {}", e);
                        continue;
                    }
                }
                match service.lane_load_report(id) {
                    Ok(loads) => {
                        for l in &loads {
                            let flag = if l.over_capacity { " (sobrecargado)" } else { "" };
                            println!(
                                "  carril {}: {} pools, {:.2}/{:.0} M{}",
                                l.lane_number,
                                l.num_pools,
                                l.planned_m_reads,
                                l.capacity_m_reads,
                                flag
                            );
                        }
                        println!("  total planificado: {:.2} M", total_planned(&loads));
                    }
                    Err(e) => eprintln!("Error calculando carga: {}", e),
                }
            }
            "4" => {
                let Some(id) = prompt_uuid("Experimento id (UUID): ")? else { continue };
                let Some(workflow_id) = prompt_workflow()? else { continue };
                match service.change_workflow(id, workflow_id) {
                    Ok(e) => {
                        println!("Experimento {} ahora usa el workflow {}", e.name, e.workflow_id)
                    }
                    Err(e) => eprintln!("Error cambiando workflow: {}", e),
                }
            }
            "5" => {
                let name = prompt("Nombre del pool: ")?;
                let reads_s = prompt("M lecturas pedidas (enter para ninguna): ")?;
                let reads = if reads_s.trim().is_empty() {
                    None
                } else {
                    match reads_s.trim().parse::<f64>() {
                        Ok(r) => Some(r),
                        Err(_) => {
                            eprintln!("Número inválido");
                            continue;
                        }
                    }
                };
                match service.create_pool(name.trim(), reads) {
                    Ok(p) => println!("Pool creado: {}", p.id),
                    Err(e) => eprintln!("Error creando pool: {}", e),
                }
            }
            "6" | "9" => {
                let Some(exp) = prompt_uuid("Experimento id (UUID): ")? else { continue };
                let Some(pool) = prompt_uuid("Pool id (UUID): ")? else { continue };
                let res = if choice.trim() == "6" {
                    service.attach_pool(exp, pool)
                } else {
                    service.detach_pool(exp, pool)
                };
                match res {
                    Ok(p) => println!("Pool {} -> experimento {:?}", p.id, p.experiment_id),
                    Err(e) => eprintln!("Error: {}", e),
                }
            }
            "7" | "8" => {
                let Some(exp) = prompt_uuid("Experimento id (UUID): ")? else { continue };
                let Some(pool) = prompt_uuid("Pool id (UUID): ")? else { continue };
                let lane: i32 = match prompt("Número de carril: ")?.trim().parse() {
                    Ok(n) => n,
                    Err(_) => {
                        eprintln!("Carril inválido");
                        continue;
                    }
                };
                let res = if choice.trim() == "7" {
                    service.attach_pool_to_lane(exp, pool, lane).map(|_| ())
                } else {
                    service.detach_pool_from_lane(exp, pool, lane)
                };
                match res {
                    Ok(()) => println!("Hecho"),
                    Err(e) => eprintln!("Error: {}", e),
                }
            }
            "10" => {
                let Some(id) = prompt_uuid("Experimento id (UUID): ")? else { continue };
                match service.check_experiment(id) {
                    Ok(v) if v.is_empty() => println!("Sin violaciones"),
                    Ok(v) => {
                        for violation in v {
                            println!("  {:?}", violation);
                        }
                    }
                    Err(e) => eprintln!("Error verificando: {}", e),
                }
            }
            "11" => {
                println!("Saliendo...");
                break;
            }
            other => {
                println!("Opción inválida: {}", other);
            }
        }
    }

    Ok(())
}

fn prompt(msg: &str) -> io::Result<String> {
    print!("{}", msg);
    io::stdout().flush()?;
    let mut s = String::new();
    io::stdin().read_line(&mut s)?;
    Ok(s)
}

fn prompt_uuid(msg: &str) -> io::Result<Option<Uuid>> {
    let s = prompt(msg)?;
    match Uuid::parse_str(s.trim()) {
        Ok(u) => Ok(Some(u)),
        Err(_) => {
            eprintln!("UUID inválido");
            Ok(None)
        }
    }
}

fn prompt_workflow() -> io::Result<Option<WorkflowId>> {
    let s = prompt("Workflow id: ")?;
    match s.trim().parse::<i16>() {
        Ok(n) => Ok(Some(WorkflowId(n))),
        Err(_) => {
            eprintln!("Workflow inválido");
            Ok(None)
        }
    }
}
