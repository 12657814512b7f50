mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use adlearn::adapters::sqlite::{
    SqliteExperimentRepository, SqliteLockRepository, SqliteSnapshotRepository,
};
use adlearn::domain::models::{
    AnalysisDecision, AssignmentDesign, CampaignObjective, Config, EvidenceGrade, Experiment,
    ExperimentAnalysis, ExperimentArm, ExperimentProtocol, ExperimentStatus, PrimaryMetric,
    Provenance,
};
use adlearn::domain::ports::{ExperimentRepository, LockRepository};
use adlearn::domain::DomainError;
use adlearn::services::{experiment_engine, ExperimentEngine};

use common::{elements, insert_creative, insert_snapshot, setup_pool};

type Engine =
    ExperimentEngine<SqliteExperimentRepository, SqliteSnapshotRepository, SqliteLockRepository>;

fn protocol() -> ExperimentProtocol {
    ExperimentProtocol {
        assignment: AssignmentDesign::Randomized,
        randomization_unit: "ad_set".to_string(),
        audience_overlap: false,
        budget_strategy: "even_split".to_string(),
        min_run_days: 7,
        max_run_days: 30,
        min_impressions_per_arm: 1000,
        held_constant: BTreeMap::new(),
    }
}

fn engine_with(
    pool: &sqlx::SqlitePool,
    config: Config,
) -> (Engine, Arc<SqliteExperimentRepository>) {
    let repo = Arc::new(SqliteExperimentRepository::new(pool.clone()));
    let engine = ExperimentEngine::new(
        repo.clone(),
        Arc::new(SqliteSnapshotRepository::new(pool.clone())),
        Arc::new(SqliteLockRepository::new(pool.clone())),
        config,
    );
    (engine, repo)
}

fn engine(pool: &sqlx::SqlitePool) -> (Engine, Arc<SqliteExperimentRepository>) {
    let mut config = Config::default();
    config.experiment.seed = 42;
    engine_with(pool, config)
}

/// Deploy both arms of a two-arm experiment onto platform ads and seed their
/// lifetime counts.
async fn seed_arm_counts(
    pool: &sqlx::SqlitePool,
    repo: &SqliteExperimentRepository,
    experiment_id: Uuid,
    control_clicks: i64,
    treatment_clicks: i64,
) -> Vec<ExperimentArm> {
    let brand_id = Uuid::new_v4();
    let arms = repo.list_arms(experiment_id).await.expect("list arms");
    assert_eq!(arms.len(), 2);
    let today = Utc::now().date_naive();

    for arm in &arms {
        let ad_id = format!("ad-{}", arm.arm_index);
        repo.bind_arm_platform(arm.id, Some("adset-1"), Some(&ad_id))
            .await
            .expect("bind arm");
        let clicks = if arm.is_control { control_clicks } else { treatment_clicks };
        let carrier = insert_creative(
            pool,
            brand_id,
            &elements(&[("hook_type", "urgency")]),
            Provenance::Native,
        )
        .await;
        insert_snapshot(
            pool,
            carrier,
            Some(&ad_id),
            CampaignObjective::Traffic,
            today,
            10_000,
            clicks,
            0,
            100.0,
            0.0,
        )
        .await;
    }
    repo.list_arms(experiment_id).await.expect("list arms")
}

#[tokio::test]
async fn test_create_requires_exactly_one_control() {
    let pool = setup_pool().await;
    let (engine, _) = engine(&pool);
    let brand_id = Uuid::new_v4();

    let two_controls = vec![("urgency".to_string(), true), ("curiosity_gap".to_string(), true)];
    let err = engine
        .create(brand_id, "Hook test", "", "hook_type", PrimaryMetric::Ctr, protocol(), &two_controls)
        .await
        .expect_err("two controls must be rejected");
    assert!(matches!(err, DomainError::ValidationFailed(_)));

    let one_arm = vec![("urgency".to_string(), true)];
    let err = engine
        .create(brand_id, "Hook test", "", "hook_type", PrimaryMetric::Ctr, protocol(), &one_arm)
        .await
        .expect_err("single arm must be rejected");
    assert!(matches!(err, DomainError::ValidationFailed(_)));
}

#[tokio::test]
async fn test_second_control_arm_rejected_at_store_level() {
    let pool = setup_pool().await;
    let repo = SqliteExperimentRepository::new(pool.clone());

    let experiment = Experiment::new(
        Uuid::new_v4(),
        "Hook test",
        "hook_type",
        PrimaryMetric::Ctr,
        protocol(),
    );
    repo.create(&experiment).await.expect("create");
    repo.add_arm(&ExperimentArm::new(experiment.id, 0, "urgency", true))
        .await
        .expect("first control");

    let err = repo
        .add_arm(&ExperimentArm::new(experiment.id, 1, "curiosity_gap", true))
        .await
        .expect_err("second control must be rejected");
    assert!(matches!(err, DomainError::DuplicateControlArm(_)));
}

#[tokio::test]
async fn test_collecting_below_impression_gate_and_idempotent_date() {
    let pool = setup_pool().await;
    let (engine, repo) = engine(&pool);

    let arms = vec![("urgency".to_string(), true), ("curiosity_gap".to_string(), false)];
    let experiment = engine
        .create(Uuid::new_v4(), "Hook test", "", "hook_type", PrimaryMetric::Ctr, protocol(), &arms)
        .await
        .expect("create");
    engine.start(experiment.id).await.expect("start");

    // No platform bindings yet: zero impressions on both arms.
    let date = Utc::now().date_naive();
    let analysis = engine
        .analyze(experiment.id, date)
        .await
        .expect("analyze")
        .expect("analysis produced");
    assert_eq!(analysis.decision, AnalysisDecision::Collecting);
    assert!(analysis.leading_arm_id.is_none());
    assert_eq!(analysis.evidence_grade, EvidenceGrade::Causal);

    let current = repo.get(experiment.id).await.expect("get").expect("exists");
    assert_eq!(current.status, ExperimentStatus::Running);

    // Same date again: already analyzed, nothing new.
    let again = engine.analyze(experiment.id, date).await.expect("analyze again");
    assert!(again.is_none());
    assert_eq!(repo.list_analyses(experiment.id).await.expect("list").len(), 1);
}

#[tokio::test]
async fn test_clear_winner_concludes_and_records_causal_effect() {
    let pool = setup_pool().await;
    let (engine, repo) = engine(&pool);

    let arms = vec![("urgency".to_string(), true), ("curiosity_gap".to_string(), false)];
    let experiment = engine
        .create(Uuid::new_v4(), "Hook test", "", "hook_type", PrimaryMetric::Ctr, protocol(), &arms)
        .await
        .expect("create");
    engine.start(experiment.id).await.expect("start");

    // 3% vs 8% CTR on 10k impressions each: unambiguous.
    let arms = seed_arm_counts(&pool, &repo, experiment.id, 300, 800).await;
    let treatment = arms.iter().find(|a| !a.is_control).expect("treatment arm");

    let date = Utc::now().date_naive() + Duration::days(7);
    let analysis = engine
        .analyze(experiment.id, date)
        .await
        .expect("analyze")
        .expect("analysis produced");
    assert_eq!(analysis.decision, AnalysisDecision::Winner);
    assert_eq!(analysis.leading_arm_id, Some(treatment.id));

    let concluded = repo.get(experiment.id).await.expect("get").expect("exists");
    assert_eq!(concluded.status, ExperimentStatus::Concluded);
    assert!(concluded.concluded_at.is_some());

    let effect = repo
        .get_causal_effect(experiment.id)
        .await
        .expect("get effect")
        .expect("effect recorded");
    assert_eq!(effect.element_name, "hook_type");
    assert_eq!(effect.winning_value, "curiosity_gap");
    assert_eq!(effect.control_value, "urgency");
    assert!(effect.absolute_effect > 0.0);
    assert!(effect.ci_lower > 0.0);
    assert_eq!(effect.evidence_grade, EvidenceGrade::Causal);
}

#[tokio::test]
async fn test_near_identical_arms_stop_for_futility_at_max_run_days() {
    let pool = setup_pool().await;
    let mut config = Config::default();
    config.experiment.seed = 42;
    // Anything under a 5-point absolute CTR difference is not worth shipping.
    config.experiment.meaningful_difference = 0.05;
    let (engine, repo) = engine_with(&pool, config);

    let mut protocol = protocol();
    protocol.max_run_days = 10;
    let arms = vec![("urgency".to_string(), true), ("curiosity_gap".to_string(), false)];
    let experiment = engine
        .create(Uuid::new_v4(), "Hook test", "", "hook_type", PrimaryMetric::Ctr, protocol, &arms)
        .await
        .expect("create");
    engine.start(experiment.id).await.expect("start");

    // 5.0% vs 5.1%: the plausible edge cannot reach 5 points.
    seed_arm_counts(&pool, &repo, experiment.id, 500, 510).await;

    // Past the minimum but short of the maximum run length, the experiment
    // keeps collecting rather than stopping early for futility.
    let today = Utc::now().date_naive();
    let early = engine
        .analyze(experiment.id, today + Duration::days(7))
        .await
        .expect("analyze early")
        .expect("analysis produced");
    assert_eq!(early.decision, AnalysisDecision::Leading);
    let running = repo.get(experiment.id).await.expect("get").expect("exists");
    assert_eq!(running.status, ExperimentStatus::Running);

    let analysis = engine
        .analyze(experiment.id, today + Duration::days(10))
        .await
        .expect("analyze at max")
        .expect("analysis produced");
    assert_eq!(analysis.decision, AnalysisDecision::Futility);

    let concluded = repo.get(experiment.id).await.expect("get").expect("exists");
    assert_eq!(concluded.status, ExperimentStatus::Concluded);
    // Futility never writes a causal effect.
    assert!(repo.get_causal_effect(experiment.id).await.expect("get").is_none());
}

#[tokio::test]
async fn test_first_analysis_inserts_with_no_prior_history() {
    let pool = setup_pool().await;
    let (engine, repo) = engine(&pool);

    let arms = vec![("urgency".to_string(), true), ("curiosity_gap".to_string(), false)];
    let experiment = engine
        .create(Uuid::new_v4(), "Hook test", "", "hook_type", PrimaryMetric::Ctr, protocol(), &arms)
        .await
        .expect("create");
    engine.start(experiment.id).await.expect("start");

    // Nothing analyzed yet for this experiment; the very first day must land.
    let analysis = engine
        .analyze(experiment.id, Utc::now().date_naive())
        .await
        .expect("first analysis")
        .expect("analysis produced");
    let stored = repo
        .latest_analysis(experiment.id)
        .await
        .expect("latest")
        .expect("stored");
    assert_eq!(stored.id, analysis.id);
}

#[tokio::test]
async fn test_failed_analysis_restores_running_state() {
    let pool = setup_pool().await;
    let (engine, repo) = engine(&pool);

    let arms = vec![("urgency".to_string(), true), ("curiosity_gap".to_string(), false)];
    let experiment = engine
        .create(Uuid::new_v4(), "Hook test", "", "hook_type", PrimaryMetric::Ctr, protocol(), &arms)
        .await
        .expect("create");
    engine.start(experiment.id).await.expect("start");

    // A future-dated row makes the upcoming insert fail mid-analysis.
    let date = Utc::now().date_naive();
    let future = ExperimentAnalysis {
        id: Uuid::new_v4(),
        experiment_id: experiment.id,
        analysis_date: date + Duration::days(2),
        arm_results: vec![],
        decision: AnalysisDecision::Collecting,
        leading_arm_id: None,
        evidence_grade: EvidenceGrade::Causal,
        created_at: Utc::now(),
    };
    assert!(repo.insert_analysis(&future).await.expect("seed future row"));

    let err = engine.analyze(experiment.id, date).await.expect_err("superseded insert");
    assert!(matches!(err, DomainError::AnalysisSuperseded { .. }));

    // The failure wrote nothing new and the experiment is not stranded.
    let current = repo.get(experiment.id).await.expect("get").expect("exists");
    assert_eq!(current.status, ExperimentStatus::Running);
    assert_eq!(repo.list_analyses(experiment.id).await.expect("list").len(), 1);
    engine
        .analyze(experiment.id, date + Duration::days(3))
        .await
        .expect("later analysis")
        .expect("analysis produced");
}

#[tokio::test]
async fn test_cancel_during_analysis_discards_the_result() {
    let pool = setup_pool().await;
    let (engine, repo) = engine(&pool);

    let arms = vec![("urgency".to_string(), true), ("curiosity_gap".to_string(), false)];
    let experiment = engine
        .create(Uuid::new_v4(), "Hook test", "", "hook_type", PrimaryMetric::Ctr, protocol(), &arms)
        .await
        .expect("create");
    engine.start(experiment.id).await.expect("start");
    engine.cancel(experiment.id).await.expect("cancel");

    // An in-flight result arriving after the cancel is dropped at the store.
    let late = ExperimentAnalysis {
        id: Uuid::new_v4(),
        experiment_id: experiment.id,
        analysis_date: Utc::now().date_naive(),
        arm_results: vec![],
        decision: AnalysisDecision::Collecting,
        leading_arm_id: None,
        evidence_grade: EvidenceGrade::Causal,
        created_at: Utc::now(),
    };
    assert!(!repo.insert_analysis(&late).await.expect("insert after cancel"));
    assert!(repo.list_analyses(experiment.id).await.expect("list").is_empty());
}

#[tokio::test]
async fn test_held_lock_blocks_analysis() {
    let pool = setup_pool().await;
    let (engine, _) = engine(&pool);
    let locks = SqliteLockRepository::new(pool.clone());
    let brand_id = Uuid::new_v4();

    let arms = vec![("urgency".to_string(), true), ("curiosity_gap".to_string(), false)];
    let experiment = engine
        .create(brand_id, "Hook test", "", "hook_type", PrimaryMetric::Ctr, protocol(), &arms)
        .await
        .expect("create");
    engine.start(experiment.id).await.expect("start");

    let lease = std::time::Duration::from_secs(3600);
    assert!(locks
        .try_acquire(brand_id, experiment_engine::JOB_TYPE, lease)
        .await
        .expect("hold lock"));
    let err = engine
        .analyze(experiment.id, Utc::now().date_naive())
        .await
        .expect_err("analyze under held lock");
    assert!(matches!(err, DomainError::LockUnavailable { .. }));

    locks.release(brand_id, experiment_engine::JOB_TYPE).await.expect("release");
    engine
        .analyze(experiment.id, Utc::now().date_naive())
        .await
        .expect("analyze after release")
        .expect("analysis produced");
}

#[tokio::test]
async fn test_analyses_are_append_only_and_date_ordered() {
    let pool = setup_pool().await;
    let repo = SqliteExperimentRepository::new(pool.clone());

    let experiment = Experiment::new(
        Uuid::new_v4(),
        "Hook test",
        "hook_type",
        PrimaryMetric::Ctr,
        protocol(),
    );
    repo.create(&experiment).await.expect("create");

    let date = Utc::now().date_naive();
    let analysis = |d| ExperimentAnalysis {
        id: Uuid::new_v4(),
        experiment_id: experiment.id,
        analysis_date: d,
        arm_results: vec![],
        decision: AnalysisDecision::Collecting,
        leading_arm_id: None,
        evidence_grade: EvidenceGrade::Causal,
        created_at: Utc::now(),
    };

    assert!(repo.insert_analysis(&analysis(date)).await.expect("first insert"));

    // Same day again and an out-of-order backfill are both rejected.
    let err = repo.insert_analysis(&analysis(date)).await.expect_err("same date");
    assert!(matches!(err, DomainError::AnalysisSuperseded { .. }));
    let err = repo
        .insert_analysis(&analysis(date - Duration::days(1)))
        .await
        .expect_err("earlier date");
    assert!(matches!(err, DomainError::AnalysisSuperseded { .. }));

    // The next day appends normally.
    repo.insert_analysis(&analysis(date + Duration::days(1))).await.expect("next day");
    assert_eq!(repo.list_analyses(experiment.id).await.expect("list").len(), 2);
}

#[tokio::test]
async fn test_cancel_is_terminal() {
    let pool = setup_pool().await;
    let (engine, repo) = engine(&pool);

    let arms = vec![("urgency".to_string(), true), ("curiosity_gap".to_string(), false)];
    let experiment = engine
        .create(Uuid::new_v4(), "Hook test", "", "hook_type", PrimaryMetric::Ctr, protocol(), &arms)
        .await
        .expect("create");
    engine.start(experiment.id).await.expect("start");
    engine.cancel(experiment.id).await.expect("cancel");

    let cancelled = repo.get(experiment.id).await.expect("get").expect("exists");
    assert_eq!(cancelled.status, ExperimentStatus::Cancelled);

    // A cancelled experiment is never analyzed.
    let err = engine
        .analyze(experiment.id, Utc::now().date_naive())
        .await
        .expect_err("analysis after cancel");
    assert!(matches!(err, DomainError::InvalidStateTransition { .. }));
}
