// Benchmark comparing flattened and group-preserving audience evaluation.
use chrono::{Duration, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use reach::reach_gateway::store::demo_customers;
use reach::reach_rules::{
    translate, AudienceEvaluator, Combinator, Condition, CustomerProfile, Field, Operator,
    RuleGroup, TranslationMode,
};

fn customers(copies: usize) -> Vec<CustomerProfile> {
    let now = Utc::now();
    (0..copies)
        .flat_map(|batch| {
            demo_customers(now - Duration::days(batch as i64 % 30))
                .into_iter()
                .map(move |mut customer| {
                    customer.id = format!("{}-{batch}", customer.id);
                    customer
                })
        })
        .collect()
}

fn mixed_tree() -> RuleGroup {
    let loyal = RuleGroup::new("group-1", Combinator::And)
        .with(Condition::new("rule-1", Field::Spend, Operator::GreaterThan, "5000"))
        .with(Condition::new("rule-2", Field::Visits, Operator::GreaterThanOrEqual, "10"));
    let lapsed = RuleGroup::new("group-2", Combinator::And)
        .with(Condition::new("rule-3", Field::InactiveDays, Operator::GreaterThan, "90"))
        .with(Condition::new("rule-4", Field::PurchaseCount, Operator::LessThan, "3"));
    RuleGroup::root(Combinator::Or).with(loyal).with(lapsed)
}

fn audience_benchmarks(c: &mut Criterion) {
    let customers = customers(1_000);
    let tree = mixed_tree();
    let evaluator = AudienceEvaluator::default();

    c.bench_function("translate_preserve_groups", |b| {
        b.iter(|| translate(black_box(&tree), TranslationMode::PreserveGroups).expect("translate"));
    });

    let flat = translate(&tree, TranslationMode::Flatten).expect("flatten");
    c.bench_function("evaluate_flattened_12k", |b| {
        b.iter(|| evaluator.evaluate(black_box(&flat), black_box(&customers)));
    });

    let grouped = translate(&tree, TranslationMode::PreserveGroups).expect("preserve");
    c.bench_function("evaluate_preserved_groups_12k", |b| {
        b.iter(|| evaluator.evaluate(black_box(&grouped), black_box(&customers)));
    });

    c.bench_function("evaluate_tree_12k", |b| {
        b.iter(|| evaluator.evaluate_tree(black_box(&tree), black_box(&customers)));
    });
}

criterion_group!(benches, audience_benchmarks);
criterion_main!(benches);
