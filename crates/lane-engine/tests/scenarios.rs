use lab_domain::{ExperimentStatus, InMemoryLabStore, LabStore, LabTx, WorkflowCatalog, WorkflowId};
use lane_engine::LaneService;
use std::sync::Arc;

const SP_STANDARD: WorkflowId = WorkflowId(1);
const S4_STANDARD: WorkflowId = WorkflowId(7);
const S4_XP: WorkflowId = WorkflowId(8);

fn service() -> (Arc<InMemoryLabStore>, LaneService) {
  let store = Arc::new(InMemoryLabStore::new());
  let service = LaneService::new(store.clone(), Arc::new(WorkflowCatalog::builtin()));
  (store, service)
}

fn shares(service: &LaneService, experiment_id: uuid::Uuid) -> Vec<(i32, Option<f64>)> {
  service.snapshot(experiment_id)
         .expect("snapshot")
         .links
         .iter()
         .map(|l| (l.lane_num, l.num_m_reads))
         .collect()
}

#[test]
fn manual_lanes_split_reads_evenly() {
  let (_, service) = service();
  let (e, lanes) = service.create_experiment("FC-A", S4_XP, ExperimentStatus::Draft).expect("create");
  assert_eq!(lanes.len(), 4);
  let pool = service.create_pool("P", Some(100.0)).expect("pool");

  // Sin attach_pool previo: cargar el primer carril asocia el pool.
  service.attach_pool_to_lane(e.id, pool.id, 1).expect("lane 1");
  service.attach_pool_to_lane(e.id, pool.id, 2).expect("lane 2");
  assert_eq!(shares(&service, e.id), vec![(1, Some(50.0)), (2, Some(50.0))]);
  let snap = service.snapshot(e.id).expect("snapshot");
  assert_eq!(snap.pools.iter().map(|p| p.id).collect::<Vec<_>>(), vec![pool.id]);

  service.attach_pool_to_lane(e.id, pool.id, 3).expect("lane 3");
  let after = shares(&service, e.id);
  assert_eq!(after.len(), 3);
  for (_, reads) in &after {
    assert!((reads.unwrap() - 100.0 / 3.0).abs() < 1e-9);
  }
  let total: f64 = after.iter().filter_map(|(_, r)| *r).sum();
  assert!((total - 100.0).abs() < 1e-9);
}

#[test]
fn combined_workflow_fans_out_on_attach() {
  let (_, service) = service();
  let (e, _) = service.create_experiment("FC-B", SP_STANDARD, ExperimentStatus::Draft).expect("create");
  let pool = service.create_pool("P", Some(200.0)).expect("pool");
  service.attach_pool(e.id, pool.id).expect("attach pool");
  assert_eq!(shares(&service, e.id), vec![(1, Some(100.0)), (2, Some(100.0))]);
}

#[test]
fn growing_a_combined_workflow_completes_the_fan_out() {
  let (_, service) = service();
  let (e, lanes) = service.create_experiment("FC-C", SP_STANDARD, ExperimentStatus::Draft).expect("create");
  let pool = service.create_pool("P", Some(200.0)).expect("pool");
  service.attach_pool(e.id, pool.id).expect("attach pool");

  let changed = service.change_workflow(e.id, S4_STANDARD).expect("change workflow");
  assert_eq!(changed.workflow_id, S4_STANDARD);

  let snap = service.snapshot(e.id).expect("snapshot");
  assert_eq!(snap.lanes.iter().map(|l| l.number).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
  // los carriles 1 y 2 son los originales
  assert_eq!(snap.lanes[0].id, lanes[0].id);
  assert_eq!(snap.lanes[1].id, lanes[1].id);
  assert_eq!(shares(&service, e.id), (1..=4).map(|n| (n, Some(50.0))).collect::<Vec<_>>());
  assert!(service.check_experiment(e.id).expect("check").is_empty());
}

#[test]
fn detaching_a_pool_clears_links_and_libraries() {
  let (store, service) = service();
  let (e, _) = service.create_experiment("FC-D", S4_XP, ExperimentStatus::Draft).expect("create");
  let pool = service.create_pool("P", Some(90.0)).expect("pool");
  let lib_a = service.add_library(pool.id, "lib-a").expect("lib a");
  let lib_b = service.add_library(pool.id, "lib-b").expect("lib b");
  service.attach_pool(e.id, pool.id).expect("attach pool");
  for lane in 1..=4 {
    service.attach_pool_to_lane(e.id, pool.id, lane).expect("attach lane");
  }
  service.detach_pool_from_lane(e.id, pool.id, 4).expect("detach lane");
  assert_eq!(shares(&service, e.id), vec![(1, Some(30.0)), (2, Some(30.0)), (3, Some(30.0))]);

  let detached = service.detach_pool(e.id, pool.id).expect("detach pool");
  assert_eq!(detached.experiment_id, None);
  assert!(shares(&service, e.id).is_empty());

  let mut tx = store.begin().expect("begin");
  assert_eq!(tx.get_pool(&pool.id).unwrap().unwrap().experiment_id, None);
  for lib in [lib_a, lib_b] {
    let stored = tx.get_library(&lib.id).unwrap().unwrap();
    assert_eq!(stored.experiment_id, None);
    assert_eq!(stored.pool_id, Some(pool.id));
  }
}
