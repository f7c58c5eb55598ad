//! Latency of a full recommend + update cycle per policy.
//! Run with: cargo bench -p skillpath-bandit

use skillpath_bandit::{RecommendOutcome, SkillRecommender};
use skillpath_core::{BanditConfig, LearnerSignals, Policy, Role, SkillCatalog, SkillMeta};

fn build_catalog(skills: usize) -> SkillCatalog {
    let metas: Vec<SkillMeta> = (0..skills)
        .map(|i| {
            let mut meta = SkillMeta::new(
                format!("skill_{i:03}"),
                (i % 10) as f64 / 10.0,
                20.0 + (i % 7) as f64 * 15.0,
            );
            meta.market_demand = ((i * 3) % 10) as f64 / 10.0;
            meta
        })
        .collect();
    let role = Role {
        name: "generalist".to_string(),
        skills: metas.iter().map(|m| m.key.clone()).collect(),
    };
    SkillCatalog::new(metas, vec![role]).expect("valid bench catalog")
}

fn run(policy: Policy, skills: usize, iterations: u32) {
    let config = BanditConfig {
        policy,
        seed: Some(7),
        ..BanditConfig::default()
    };
    let engine = SkillRecommender::new(build_catalog(skills), config).expect("engine");
    let signals = LearnerSignals::with_learning_speed(0.6);

    let mut cycle = |i: u32| {
        if let Ok(RecommendOutcome::Recommended(rec)) = engine.recommend("generalist", &[], &signals) {
            let reward = ((i % 5) as f64) / 4.0;
            let _ = engine.update(&rec.skill, &signals, reward);
        }
    };

    // Warmup
    for i in 0..100 {
        cycle(i);
    }

    let start = std::time::Instant::now();
    for i in 0..iterations {
        cycle(i);
    }
    let elapsed = start.elapsed();

    println!("=== Recommend Benchmark ({}) ===", policy.as_str());
    println!("Candidates:  {}", skills);
    println!("Iterations:  {}", iterations);
    println!("Total time:  {:?}", elapsed);
    println!("Per cycle:   {:?}", elapsed / iterations);
    println!("Throughput:  {:.0} cycles/sec", iterations as f64 / elapsed.as_secs_f64());
}

fn main() {
    for policy in [Policy::Linucb, Policy::Thompson, Policy::Neural, Policy::Ensemble] {
        run(policy, 32, 2_000);
    }
}
