//! Integration tests for demand resolution and assignment.

use std::collections::BTreeMap;

use autocraft::{
    assign_to_worker, ActorContext, MemoryPool, MemoryWorker, ProductionRule, ResolutionJob,
    ResolvedTree, ResolverConfig, ResourceCatalog, ResourceKey, StaticCatalog,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const R: ResourceKey = ResourceKey::item(1);
const A: ResourceKey = ResourceKey::item(2);
const B: ResourceKey = ResourceKey::item(3);
const C: ResourceKey = ResourceKey::item(4);
const X: ResourceKey = ResourceKey::item(5);
const Y: ResourceKey = ResourceKey::item(6);
const WATER: ResourceKey = ResourceKey::item(7);
const BUCKET: ResourceKey = ResourceKey::item(8);

const PLAYER: ActorContext = ActorContext::new(42);

fn processing(id: u32, inputs: &[(ResourceKey, i64)], outputs: &[(ResourceKey, i64)]) -> ProductionRule {
    ProductionRule::processing(
        id,
        format!("Rule_{id}"),
        inputs.iter().map(|&(k, n)| k.amount(n)).collect(),
        outputs.iter().map(|&(k, n)| k.amount(n)).collect(),
    )
    .unwrap()
}

fn pool_of(contents: &[(ResourceKey, i64)]) -> MemoryPool {
    let mut pool = MemoryPool::new();
    for &(key, amount) in contents {
        pool.insert(key, amount);
    }
    pool
}

/// Checks that every resource consumed in the tree came from the pool, a
/// craft, a returned container or an emission, and that exactly the request
/// is left over for the caller.
fn assert_conserved(catalog: &StaticCatalog, job: &ResolutionJob<'_>, resolved: &ResolvedTree) {
    let tree = resolved.tree();
    let mut balance: BTreeMap<ResourceKey, i64> = BTreeMap::new();

    for (_, step) in tree.steps() {
        for out in step.rule().outputs() {
            *balance.entry(out.key).or_default() += out.amount * step.crafts();
        }
        for &(child, per_craft) in step.inputs() {
            let consumed = tree.node(child).target();
            *balance.entry(consumed).or_default() -= per_craft * step.crafts();
            if step.recycles_containers() {
                if let Some(empty) = catalog.container_remainder(&consumed) {
                    *balance.entry(empty).or_default() += per_craft * step.crafts();
                }
            }
        }
    }
    for (_, node) in tree.nodes() {
        *balance.entry(node.target()).or_default() += node.emitted();
    }
    for change in job.inventory().net_changes() {
        *balance.entry(change.key).or_default() -= change.amount;
    }
    *balance.entry(resolved.request().key).or_default() -= resolved.request().amount;

    for (key, left) in balance {
        assert_eq!(left, 0, "resource {key} is not conserved");
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_scenario_pool_then_batched_craft() {
    let mut catalog = StaticCatalog::new();
    catalog.add_rule(processing(1, &[(A, 2)], &[(R, 3)])).unwrap();
    let pool = pool_of(&[(R, 4), (A, 1_000_000)]);
    let config = ResolverConfig::default();

    let mut job = ResolutionJob::new(&catalog, &pool, config.clone()).unwrap();
    let resolved = job
        .request_resolution(R, 10, PLAYER)
        .unwrap()
        .into_resolved()
        .unwrap();

    let tree = resolved.tree();
    let step = tree.step(tree.node(tree.root()).steps()[0]);
    assert_eq!(step.crafts(), 2);
    assert_eq!(step.applications(), 1);

    let plan = resolved.plan(&config);
    assert!(plan.is_complete());
    assert_eq!(plan.from_pool, vec![R.amount(4), A.amount(4)]);
    assert_eq!(plan.producible, vec![R.amount(6)]);
    assert_eq!(job.inventory().net_changes(), vec![R.amount(-4), A.amount(-4)]);
    assert_conserved(&catalog, &job, &resolved);
}

#[test]
fn test_scenario_split_across_rules() {
    let mut catalog = StaticCatalog::new();
    catalog.add_rule(processing(1, &[(B, 1)], &[(R, 1)])).unwrap();
    catalog.add_rule(processing(2, &[(C, 1)], &[(R, 1)])).unwrap();
    let pool = pool_of(&[(B, 1), (C, 1_000_000)]);

    let mut job = ResolutionJob::new(&catalog, &pool, ResolverConfig::default()).unwrap();
    let resolved = job
        .request_resolution(R, 5, PLAYER)
        .unwrap()
        .into_resolved()
        .unwrap();

    let tree = resolved.tree();
    let crafts: Vec<(u32, i64)> = tree
        .node(tree.root())
        .steps()
        .iter()
        .map(|&s| (tree.step(s).rule().id, tree.step(s).crafts()))
        .collect();
    assert_eq!(crafts, vec![(1, 1), (2, 4)]);
    assert_eq!(job.inventory().open_branches(), 0);
    assert_conserved(&catalog, &job, &resolved);
}

#[test]
fn test_scenario_self_referential_rule_runs_one_craft_at_a_time() {
    let mut catalog = StaticCatalog::new();
    catalog.add_rule(processing(1, &[(X, 1), (Y, 1)], &[(X, 2)])).unwrap();
    let pool = pool_of(&[(Y, 1_000)]);

    let mut job = ResolutionJob::new(&catalog, &pool, ResolverConfig::default()).unwrap();
    let plan = job.simulate_resolution(X, 5, PLAYER).unwrap();

    let tree = job.tree().unwrap();
    let step = tree.step(tree.node(tree.root()).steps()[0]);
    assert!(step.limit_one_per_cycle());
    assert_eq!(step.crafts(), 3);
    assert_eq!(step.applications(), 3);

    // Each craft consumes one X nobody can make.
    assert_eq!(plan.missing, vec![X.amount(3)]);
    assert_eq!(plan.producible, vec![X.amount(6)]);
    assert_eq!(plan.from_pool, vec![Y.amount(3)]);

    // The real attempt falls short and reports the same plan.
    let shortage = job.request_resolution(X, 5, PLAYER).unwrap().into_shortage().unwrap();
    assert_eq!(shortage, plan);
}

#[test]
fn test_emittable_resource_is_never_crafted() {
    let mut catalog = StaticCatalog::new();
    catalog.add_rule(processing(1, &[(X, 1), (Y, 1)], &[(X, 2)])).unwrap();
    catalog.set_emittable(X);
    let pool = pool_of(&[(Y, 1_000)]);

    let mut job = ResolutionJob::new(&catalog, &pool, ResolverConfig::default()).unwrap();
    let resolved = job.request_resolution(X, 5, PLAYER).unwrap().into_resolved().unwrap();
    let root = resolved.tree().node(resolved.tree().root());
    assert!(root.steps().is_empty());
    assert_eq!(root.emitted(), 5);
    assert_conserved(&catalog, &job, &resolved);
}

// ============================================================================
// Failures and rollback
// ============================================================================

#[test]
fn test_failed_request_leaves_job_untouched() {
    let mut catalog = StaticCatalog::new();
    catalog.add_rule(processing(1, &[(A, 1), (B, 1)], &[(R, 1)])).unwrap();
    catalog.add_rule(processing(2, &[(C, 2)], &[(B, 1)])).unwrap();
    let pool = pool_of(&[(R, 1), (A, 10), (C, 5)]);

    let mut job = ResolutionJob::new(&catalog, &pool, ResolverConfig::default()).unwrap();
    let before = job.inventory().list();

    let plan = job.request_resolution(R, 5, PLAYER).unwrap().into_shortage().unwrap();
    assert_eq!(job.inventory().list(), before);
    assert_eq!(job.inventory().open_branches(), 0);
    assert_eq!(plan.missing, vec![C.amount(3)]);

    // A smaller request still fits afterwards.
    let resolved = job.request_resolution(R, 3, PLAYER).unwrap().into_resolved().unwrap();
    assert_conserved(&catalog, &job, &resolved);
}

#[test]
fn test_failed_candidate_reserves_nothing_from_pool() {
    let mut catalog = StaticCatalog::new();
    catalog.add_rule(processing(1, &[(A, 1), (B, 1)], &[(R, 1)])).unwrap();
    catalog.add_rule(processing(2, &[(C, 1)], &[(R, 1)])).unwrap();
    let mut pool = pool_of(&[(A, 1), (C, 10)]);
    let config = ResolverConfig::default();

    let mut job = ResolutionJob::new(&catalog, &pool, config.clone()).unwrap();
    let resolved = job.request_resolution(R, 1, PLAYER).unwrap().into_resolved().unwrap();
    assert_eq!(job.inventory().net_changes(), vec![C.amount(-1)]);
    assert_eq!(resolved.plan(&config).from_pool, vec![C.amount(1)]);
    assert_conserved(&catalog, &job, &resolved);

    let mut worker = MemoryWorker::new(resolved.bytes());
    let receipt = assign_to_worker(&resolved, &mut pool, &mut worker, &PLAYER).unwrap();
    assert_eq!(receipt.deposited, vec![C.amount(1)]);
    assert_eq!(pool.count(&A), 1);
    assert_eq!(pool.count(&C), 9);
}

#[test]
fn test_containers_are_returned_to_pool() {
    let mut catalog = StaticCatalog::new();
    catalog
        .add_rule(
            ProductionRule::crafting(
                1,
                "Clay".into(),
                vec![Some(WATER.amount(1)), Some(A.amount(1))],
                vec![B.amount(1)],
            )
            .unwrap(),
        )
        .unwrap();
    catalog.set_container(WATER, BUCKET);
    let pool = pool_of(&[(WATER, 2), (A, 2)]);

    let mut job = ResolutionJob::new(&catalog, &pool, ResolverConfig::default()).unwrap();
    let resolved = job.request_resolution(B, 2, PLAYER).unwrap().into_resolved().unwrap();

    let tree = resolved.tree();
    let step = tree.step(tree.node(tree.root()).steps()[0]);
    assert_eq!(step.crafts(), 2);
    assert_eq!(step.applications(), 2);
    assert_eq!(step.bytes(), 2);
    assert_eq!(
        job.inventory().net_changes(),
        vec![A.amount(-2), WATER.amount(-2), BUCKET.amount(2)]
    );
    assert_conserved(&catalog, &job, &resolved);
}

#[test]
fn test_resolve_then_assign_end_to_end() {
    let catalog = StaticCatalog::from_toml_str(
        r#"
        emittable = [{ item = 9 }]

        [[rules]]
        id = 1
        name = "Gear"
        inputs = [
            { slot = 1, item = 2, amount = 1 },
            { slot = 3, item = 2, amount = 1 },
            { slot = 4, item = 9, amount = 1 },
        ]
        outputs = [{ item = 1, amount = 1 }]

        [[rules]]
        id = 2
        name = "Ingot"
        kind = "processing"
        inputs = [{ item = 3, amount = 1 }]
        outputs = [{ item = 2, amount = 1 }]
        "#,
    )
    .unwrap();
    let mut pool = pool_of(&[(A, 2), (B, 10)]);
    let config = ResolverConfig::default();

    let mut job = ResolutionJob::new(&catalog, &pool, config.clone()).unwrap();
    let resolved = job.request_resolution(R, 4, PLAYER).unwrap().into_resolved().unwrap();
    assert_conserved(&catalog, &job, &resolved);

    let plan = resolved.plan(&config);
    assert_eq!(plan.from_pool, vec![A.amount(2), B.amount(6)]);

    let mut worker = MemoryWorker::new(resolved.bytes());
    let receipt = assign_to_worker(&resolved, &mut pool, &mut worker, &PLAYER).unwrap();
    assert_eq!(receipt.deposited, vec![A.amount(2), B.amount(6)]);
    assert_eq!(receipt.emit_credits, vec![ResourceKey::item(9).amount(4)]);
    assert_eq!(receipt.queued, vec![(1, 4), (2, 6)]);
    assert_eq!(pool.count(&A), 0);
    assert_eq!(pool.count(&B), 4);
}

#[test]
fn test_config_file_drives_tick_budget() {
    let config = ResolverConfig::from_toml_str("checkpoints_per_tick = 1").unwrap();
    let mut catalog = StaticCatalog::new();
    catalog.add_rule(processing(1, &[(A, 1)], &[(R, 1)])).unwrap();
    let pool = pool_of(&[(A, 5)]);

    let mut job = ResolutionJob::new(&catalog, &pool, config).unwrap();
    let mut task = job.start_resolution(R, 5, PLAYER);
    assert!(task.tick().is_none());
    assert!(task.tick().is_none());
    assert!(task.tick().unwrap().unwrap().is_success());
}

// ============================================================================
// Randomized properties
// ============================================================================

const ITEMS: u32 = 5;

fn random_catalog(rng: &mut ChaCha8Rng) -> StaticCatalog {
    let mut catalog = StaticCatalog::new();
    let mut next_id = 1;
    for item in 0..ITEMS {
        if rng.gen_bool(0.15) {
            catalog.set_emittable(ResourceKey::item(item));
            continue;
        }
        for _ in 0..rng.gen_range(0..=2) {
            let inputs: Vec<(ResourceKey, i64)> = (0..rng.gen_range(1..=2))
                .map(|_| (ResourceKey::item(rng.gen_range(0..ITEMS)), rng.gen_range(1..=2)))
                .collect();
            let rule = processing(next_id, &inputs, &[(ResourceKey::item(item), rng.gen_range(1..=3))]);
            catalog.add_rule(rule).unwrap();
            next_id += 1;
        }
    }
    catalog
}

fn random_pool(rng: &mut ChaCha8Rng) -> MemoryPool {
    let mut pool = MemoryPool::new();
    for item in 0..ITEMS {
        if rng.gen_bool(0.6) {
            pool.insert(ResourceKey::item(item), rng.gen_range(1..=20));
        }
    }
    pool
}

#[test]
fn test_random_catalogs_hold_invariants() {
    let mut rng = ChaCha8Rng::seed_from_u64(0x00C0_FFEE);
    let config = ResolverConfig::default();
    let mut successes = 0;

    for _ in 0..64 {
        let catalog = random_catalog(&mut rng);
        let pool = random_pool(&mut rng);
        let target = ResourceKey::item(rng.gen_range(0..ITEMS));
        let amount = rng.gen_range(1..=10);

        let mut job = ResolutionJob::new(&catalog, &pool, config.clone()).unwrap();

        let first = job.simulate_resolution(target, amount, PLAYER).unwrap();
        let second = job.simulate_resolution(target, amount, PLAYER).unwrap();
        assert_eq!(first, second);

        let tree = job.tree().unwrap();
        for (id, node) in tree.nodes() {
            for &step in node.steps() {
                for ancestor in tree.ancestors(id) {
                    assert!(!tree.step(step).rule().mentions(&tree.node(ancestor).target()));
                }
            }
        }

        let before = job.inventory().list();
        match job.request_resolution(target, amount, PLAYER).unwrap().into_resolved() {
            Some(resolved) => {
                successes += 1;
                assert_conserved(&catalog, &job, &resolved);

                let mut real = pool.clone();
                let mut worker = MemoryWorker::new(resolved.bytes());
                assign_to_worker(&resolved, &mut real, &mut worker, &PLAYER).unwrap();
            }
            None => {
                assert_eq!(job.inventory().list(), before);
                assert_eq!(job.inventory().open_branches(), 0);
            }
        }
    }
    assert!(successes > 0);
}
