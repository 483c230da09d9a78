use lab_domain::{ExperimentStatus, InMemoryLabStore, LabError, LabStore, LabTx, LaneQc, WorkflowCatalog, WorkflowId};
use lane_engine::{attach_pool, change_workflow, create_experiment, violations, LaneService};
use std::sync::Arc;

const S4_STANDARD: WorkflowId = WorkflowId(7);
const S4_XP: WorkflowId = WorkflowId(8);
const NOVASEQ_X_10B: WorkflowId = WorkflowId(10);

fn qc(fragment: i32) -> LaneQc {
  LaneQc { phi_x: Some(1.0),
           avg_fragment_size: Some(fragment),
           original_qubit_concentration: Some(2.5),
           ..LaneQc::default() }
}

#[test]
fn every_workflow_change_lands_on_the_right_lane_count() {
  let catalog = WorkflowCatalog::builtin();
  let ids: Vec<WorkflowId> = catalog.iter().map(|w| w.id).collect();
  for from in &ids {
    for to in &ids {
      let store = InMemoryLabStore::new();
      let mut tx = store.begin().unwrap();
      let (e, _) = create_experiment(tx.as_mut(), &catalog, "FC", *from, ExperimentStatus::Draft).unwrap();
      for (name, reads) in [("P1", Some(100.0)), ("P2", Some(7.0)), ("P3", None)] {
        let pool = lab_domain::Pool::new(name, reads).unwrap();
        tx.insert_pool(&pool).unwrap();
        attach_pool(tx.as_mut(), &catalog, &e.id, &pool.id).unwrap();
        if !catalog.get(*from).unwrap().combined_lanes {
          lane_engine::attach_pool_to_lane(tx.as_mut(), &e.id, &pool.id, 1).unwrap();
        }
      }

      change_workflow(tx.as_mut(), &catalog, &e.id, *to).unwrap();
      let target = catalog.get(*to).unwrap();
      let e = tx.get_experiment(&e.id).unwrap().unwrap();
      let state = lane_engine::snapshot(tx.as_mut(), &e).unwrap();
      assert_eq!(state.lanes.len() as i32, target.num_lanes(), "{} -> {}", from, to);
      assert!(violations(&state, target).is_empty(), "{} -> {}", from, to);

      for pool in &state.pools {
        let links: Vec<_> = state.links.iter().filter(|l| l.pool_id == pool.id).collect();
        if target.combined_lanes {
          assert_eq!(links.len(), state.lanes.len());
        }
        if let (Some(requested), false) = (pool.num_m_reads_requested, links.is_empty()) {
          let total: f64 = links.iter().filter_map(|l| l.num_m_reads).sum();
          assert!((total - requested).abs() < 1e-9 * requested.max(1.0));
        }
      }
    }
  }
}

#[test]
fn same_workflow_is_a_no_op() {
  let catalog = Arc::new(WorkflowCatalog::builtin());
  let store = Arc::new(InMemoryLabStore::new());
  let service = LaneService::new(store, catalog);
  let (e, _) = service.create_experiment("FC", S4_STANDARD, ExperimentStatus::Draft).unwrap();
  let pool = service.create_pool("P", Some(10.0)).unwrap();
  service.attach_pool(e.id, pool.id).unwrap();
  let before = service.snapshot(e.id).unwrap();

  let same = service.change_workflow(e.id, S4_STANDARD).unwrap();
  assert_eq!(same, before.experiment);
  assert_eq!(service.snapshot(e.id).unwrap(), before);
}

#[test]
fn surviving_lanes_keep_their_qc() {
  let catalog = Arc::new(WorkflowCatalog::builtin());
  let service = LaneService::new(Arc::new(InMemoryLabStore::new()), catalog);
  let (e, original) = service.create_experiment("FC", NOVASEQ_X_10B, ExperimentStatus::Draft).unwrap();
  assert_eq!(original.len(), 8);
  for lane in 1..=8 {
    service.record_lane_qc(e.id, lane, qc(300 + lane)).unwrap();
  }

  service.change_workflow(e.id, S4_XP).unwrap();
  assert_eq!(service.snapshot(e.id).unwrap().lanes.len(), 4);
  service.change_workflow(e.id, NOVASEQ_X_10B).unwrap();

  let lanes = service.snapshot(e.id).unwrap().lanes;
  assert_eq!(lanes.len(), 8);
  for lane in &lanes[..4] {
    assert_eq!(lane.id, original[(lane.number - 1) as usize].id);
    assert_eq!(lane.qc, qc(300 + lane.number));
  }
  for lane in &lanes[4..] {
    assert_ne!(lane.id, original[(lane.number - 1) as usize].id);
    assert!(lane.qc.is_empty());
  }
}

#[test]
fn shrinking_drops_links_on_removed_lanes_and_rebalances() {
  let catalog = Arc::new(WorkflowCatalog::builtin());
  let service = LaneService::new(Arc::new(InMemoryLabStore::new()), catalog);
  let (e, _) = service.create_experiment("FC", NOVASEQ_X_10B, ExperimentStatus::Draft).unwrap();
  let pool = service.create_pool("P", Some(120.0)).unwrap();
  service.attach_pool(e.id, pool.id).unwrap();
  for lane in [2, 5, 6] {
    service.attach_pool_to_lane(e.id, pool.id, lane).unwrap();
  }

  service.change_workflow(e.id, S4_XP).unwrap();
  let links = service.snapshot(e.id).unwrap().links;
  assert_eq!(links.len(), 1);
  assert_eq!(links[0].lane_num, 2);
  assert_eq!(links[0].num_m_reads, Some(120.0));

  let loads = service.lane_load_report(e.id).unwrap();
  assert_eq!(loads.len(), 4);
  assert_eq!(lane_engine::total_planned(&loads), 120.0);
  assert!(loads.iter().all(|l| !l.over_capacity));
}

#[test]
fn failed_operation_leaves_no_partial_writes() {
  let catalog = Arc::new(WorkflowCatalog::builtin());
  let service = LaneService::new(Arc::new(InMemoryLabStore::new()), catalog);
  let (e, _) = service.create_experiment("FC", S4_XP, ExperimentStatus::Draft).unwrap();
  let before = service.snapshot(e.id).unwrap();

  assert!(matches!(service.change_workflow(e.id, WorkflowId(99)), Err(LabError::InvalidWorkflow(_))));
  assert!(matches!(service.change_workflow(uuid::Uuid::new_v4(), S4_STANDARD), Err(LabError::NotFound(_))));
  // nombre repetido: la segunda creación no deja carriles huérfanos
  assert!(matches!(service.create_experiment("FC", S4_XP, ExperimentStatus::Draft), Err(LabError::Conflict(_))));
  assert_eq!(service.snapshot(e.id).unwrap(), before);

  let (other, _) = service.create_experiment("FC2", S4_XP, ExperimentStatus::Draft).unwrap();
  let pool = service.create_pool("P", Some(10.0)).unwrap();
  service.attach_pool(other.id, pool.id).unwrap();
  assert!(matches!(service.attach_pool_to_lane(e.id, pool.id, 1), Err(LabError::Conflict(_))));
  assert_eq!(service.snapshot(e.id).unwrap(), before);
}

#[test]
fn same_workflow_is_a_no_op_even_when_retired_from_catalog() {
  let full = WorkflowCatalog::builtin();
  let store = InMemoryLabStore::new();
  let mut tx = store.begin().unwrap();
  let (e, _) = create_experiment(tx.as_mut(), &full, "FC", S4_XP, ExperimentStatus::Draft).unwrap();

  let reduced = WorkflowCatalog::from_workflows(full.iter().filter(|w| w.id != S4_XP).cloned()).unwrap();
  let same = change_workflow(tx.as_mut(), &reduced, &e.id, S4_XP).unwrap();
  assert_eq!(same, e);
  assert!(matches!(change_workflow(tx.as_mut(), &reduced, &e.id, WorkflowId(99)), Err(LabError::InvalidWorkflow(_))));
  change_workflow(tx.as_mut(), &reduced, &e.id, S4_STANDARD).unwrap();
  assert_eq!(tx.list_lanes(&e.id).unwrap().len(), 4);
}

#[test]
fn deleting_an_experiment_releases_its_pools() {
  let catalog = Arc::new(WorkflowCatalog::builtin());
  let service = LaneService::new(Arc::new(InMemoryLabStore::new()), catalog);
  let (e, _) = service.create_experiment("FC", S4_STANDARD, ExperimentStatus::Sequencing).unwrap();
  let pool = service.create_pool("P", Some(10.0)).unwrap();
  service.attach_pool(e.id, pool.id).unwrap();

  service.delete_experiment(e.id).unwrap();
  assert!(matches!(service.snapshot(e.id), Err(LabError::NotFound(_))));

  let (other, _) = service.create_experiment("FC2", S4_STANDARD, ExperimentStatus::Draft).unwrap();
  let reattached = service.attach_pool(other.id, pool.id).unwrap();
  assert_eq!(reattached.experiment_id, Some(other.id));
}
