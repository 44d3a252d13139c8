//! Property tests: any sequence of facade operations leaves a timeline that
//! satisfies every structural invariant, under both repair policies.

use chrono::{Duration, NaiveDate};
use orgline_core::{
  ErrorKind,
  config::RepairPolicy,
  context::{FixedClock, OperationContext},
  store::TemporalFacade,
  timeline::violations,
  version::{EntityKey, EntityKind, VersionPayload, VersionStatus},
};
use proptest::prelude::*;
use uuid::Uuid;

use crate::SqliteStore;

fn base() -> NaiveDate { NaiveDate::from_ymd_opt(2024, 5, 1).unwrap() }

// Day offsets span both sides of "today" so past, current and future
// versions all occur.
fn today() -> NaiveDate { day(75) }

fn day(offset: u16) -> NaiveDate { base() + Duration::days(i64::from(offset)) }

#[derive(Debug, Clone)]
enum Op {
  Insert(u16),
  Delete(usize),
  Move(usize, u16),
  Transition(bool, u16),
  Recompute,
}

fn op() -> impl Strategy<Value = Op> {
  prop_oneof![
    3 => (0u16..150).prop_map(Op::Insert),
    2 => any::<usize>().prop_map(Op::Delete),
    1 => (any::<usize>(), 0u16..150).prop_map(|(i, d)| Op::Move(i, d)),
    1 => (any::<bool>(), 0u16..150).prop_map(|(a, d)| Op::Transition(a, d)),
    1 => Just(Op::Recompute),
  ]
}

struct Outcome {
  violations: Vec<String>,
  /// Whether a final recompute left every row untouched.
  stable:     bool,
}

fn run(ops: Vec<Op>, policy: RepairPolicy) -> Outcome {
  let rt = tokio::runtime::Builder::new_current_thread()
    .enable_all()
    .build()
    .unwrap();

  rt.block_on(async move {
    let store = SqliteStore::open_in_memory()
      .await
      .unwrap()
      .with_clock(FixedClock::on(today()))
      .with_repair_policy(policy);
    let f = store.facade(EntityKind::Position);
    let key = EntityKey::new(Uuid::nil(), "P-1");
    let ctx = OperationContext::system;

    let seed = VersionPayload {
      name: Some("Analyst".into()),
      unit_type: Some("ROLE".into()),
      ..Default::default()
    };
    f.insert_version(key.clone(), day(0), seed, ctx()).await.unwrap();

    for op in ops {
      let live: Vec<Uuid> = f
        .get_timeline(key.clone(), false)
        .await
        .unwrap()
        .versions
        .iter()
        .map(|v| v.record_id)
        .collect();
      let pick = |i: usize| live[i % live.len()];

      let result = match op {
        Op::Insert(d) => f
          .insert_version(key.clone(), day(d), VersionPayload::default(), ctx())
          .await
          .map(drop),
        Op::Delete(i) if !live.is_empty() => {
          f.delete_version(key.clone(), pick(i), ctx()).await
        }
        Op::Move(i, d) if !live.is_empty() => f
          .update_effective_date(key.clone(), pick(i), day(d), ctx())
          .await
          .map(drop),
        Op::Transition(active, d) => {
          let target = if active {
            VersionStatus::Active
          } else {
            VersionStatus::Inactive
          };
          f.status_transition(key.clone(), target, day(d), ctx())
            .await
            .map(drop)
        }
        Op::Recompute => f.recompute_timeline(key.clone(), ctx()).await,
        _ => Ok(()),
      };
      if let Err(e) = result {
        assert_eq!(e.kind(), ErrorKind::Validation, "unexpected failure: {e}");
      }
    }

    let before = f.get_timeline(key.clone(), true).await.unwrap();
    f.recompute_timeline(key.clone(), ctx()).await.unwrap();
    let after = f.get_timeline(key, true).await.unwrap();

    Outcome {
      violations: violations(&before.versions, today()),
      stable:     before.versions == after.versions,
    }
  })
}

proptest! {
  #![proptest_config(ProptestConfig::with_cases(48))]

  #[test]
  fn recompute_policy_preserves_invariants(ops in prop::collection::vec(op(), 0..24)) {
    let out = run(ops, RepairPolicy::AlwaysRecompute);
    prop_assert!(out.violations.is_empty(), "{:?}", out.violations);
    prop_assert!(out.stable);
  }

  #[test]
  fn incremental_policy_preserves_invariants(ops in prop::collection::vec(op(), 0..24)) {
    let out = run(ops, RepairPolicy::Incremental);
    prop_assert!(out.violations.is_empty(), "{:?}", out.violations);
    prop_assert!(out.stable);
  }
}
