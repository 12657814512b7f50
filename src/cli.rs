//! Command-line interface: batch-job entry points over the learning core.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::adapters::sqlite::{
    all_embedded_migrations, create_pool, Migrator, PoolConfig, SqliteCalibrationRepository,
    SqliteCreativeRepository, SqliteExperimentRepository, SqliteInteractionRepository,
    SqliteLineageRepository, SqliteLockRepository, SqliteRewardRepository, SqliteScoreRepository,
    SqliteSnapshotRepository,
};
use crate::domain::models::{
    AssignmentDesign, Config, ExperimentProtocol, PrimaryMetric, ThresholdConfig,
};
use crate::domain::ports::CreativeRepository;
use crate::infrastructure::config::ConfigLoader;
use crate::services::{
    BanditSampler, CalibrationEngine, ExperimentEngine, InteractionAnalyzer, RewardCalculator,
    ScoreProcessor, WinnerEvolution,
};

#[derive(Parser)]
#[command(name = "adlearn", version, about = "Ad-creative learning core: rewards, scores, bandits, experiments")]
pub struct Cli {
    /// Load configuration from this file instead of .adlearn/
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the database path
    #[arg(long, global = true)]
    pub database: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Apply pending schema migrations
    Migrate,
    /// Compute rewards for newly matured creatives
    Rewards {
        /// Restrict to one brand; all brands when omitted
        #[arg(long)]
        brand: Option<Uuid>,
    },
    /// Fan unprocessed rewards out into score events
    Scores {
        #[arg(long)]
        brand: Option<Uuid>,
        /// Maximum rewards drained per brand
        #[arg(long, default_value_t = 500)]
        limit: usize,
    },
    /// Thompson-sample element values for a brand
    Bandit {
        #[arg(long)]
        brand: Uuid,
        /// Rank a single element dimension; all dimensions when omitted
        #[arg(long)]
        element: Option<String>,
    },
    /// Recompute pairwise element-interaction effects
    Interactions {
        #[arg(long)]
        brand: Option<Uuid>,
    },
    /// Experiment lifecycle and daily analysis
    Experiments {
        #[command(subcommand)]
        command: ExperimentCommands,
    },
    /// Evolve winners and mature lineage edges
    Evolve {
        #[arg(long)]
        brand: Option<Uuid>,
    },
    /// Propose a quality-threshold calibration for a brand
    Calibrate {
        #[arg(long)]
        brand: Uuid,
        /// Approval threshold currently in effect (0-10 scale)
        #[arg(long)]
        threshold: f64,
        /// Auto-reject hard checks currently in effect
        #[arg(long)]
        auto_reject_check: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum ExperimentCommands {
    /// Create an experiment with one control and one or more treatment arms
    Create {
        #[arg(long)]
        brand: Uuid,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        hypothesis: String,
        /// Element dimension being varied
        #[arg(long)]
        variable: String,
        /// ctr | conversion_rate
        #[arg(long, default_value = "ctr")]
        metric: String,
        /// Control arm element value
        #[arg(long)]
        control: String,
        /// Treatment arm element value (repeatable)
        #[arg(long = "treatment", required = true)]
        treatments: Vec<String>,
        /// randomized | pragmatic_split | observational
        #[arg(long, default_value = "randomized")]
        assignment: String,
        #[arg(long, default_value_t = 7)]
        min_days: u32,
        #[arg(long, default_value_t = 30)]
        max_days: u32,
        #[arg(long, default_value_t = 1000)]
        min_impressions: u64,
        /// Arm audiences may overlap (downgrades evidence to quasi)
        #[arg(long)]
        audience_overlap: bool,
    },
    /// Attach platform ad objects to an arm after deployment
    BindArm {
        arm: Uuid,
        #[arg(long)]
        ad_set_id: Option<String>,
        #[arg(long)]
        ad_id: Option<String>,
    },
    /// Move a ready experiment into Running
    Start { id: Uuid },
    /// Cancel a non-terminal experiment
    Cancel { id: Uuid },
    /// Run one analysis step for a specific experiment
    Analyze {
        id: Uuid,
        /// Analysis date (YYYY-MM-DD); today when omitted
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Analyze every running experiment for a date
    RunDaily {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Show an experiment and its latest analysis
    Show { id: Uuid },
}

struct App {
    pool: sqlx::SqlitePool,
    config: Config,
}

impl App {
    async fn bootstrap(cli: &Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load()?,
        };
        if let Some(database) = &cli.database {
            config.database.path = database.clone();
        }

        let pool_config = PoolConfig {
            max_connections: config.database.max_connections,
            ..PoolConfig::default()
        };
        let pool = create_pool(&config.database.path, Some(pool_config))
            .await
            .context("Failed to open database")?;

        Migrator::new(pool.clone())
            .run_embedded_migrations(all_embedded_migrations())
            .await
            .context("Failed to run migrations")?;

        Ok(Self { pool, config })
    }

    async fn brands(&self, brand: Option<Uuid>) -> Result<Vec<Uuid>> {
        match brand {
            Some(id) => Ok(vec![id]),
            None => {
                let repo = SqliteCreativeRepository::new(self.pool.clone());
                Ok(repo.list_brands().await?)
            }
        }
    }
}

pub async fn execute(cli: Cli) -> Result<()> {
    let app = App::bootstrap(&cli).await?;

    match cli.command {
        Commands::Migrate => {
            // Bootstrap already applied pending migrations.
            let version = Migrator::new(app.pool.clone()).get_current_version().await?;
            println!("schema at version {version}");
        }
        Commands::Rewards { brand } => {
            let calculator = RewardCalculator::new(
                Arc::new(SqliteCreativeRepository::new(app.pool.clone())),
                Arc::new(SqliteSnapshotRepository::new(app.pool.clone())),
                Arc::new(SqliteRewardRepository::new(app.pool.clone())),
                Arc::new(SqliteLockRepository::new(app.pool.clone())),
                app.config.clone(),
            );
            for brand_id in app.brands(brand).await? {
                let summary = calculator.run(brand_id).await?;
                println!(
                    "{brand_id}: {} created, {} immature, {} failed",
                    summary.created, summary.immature, summary.failed
                );
            }
        }
        Commands::Scores { brand, limit } => {
            let processor = ScoreProcessor::new(
                Arc::new(SqliteCreativeRepository::new(app.pool.clone())),
                Arc::new(SqliteRewardRepository::new(app.pool.clone())),
                Arc::new(SqliteScoreRepository::new(app.pool.clone())),
                Arc::new(SqliteLockRepository::new(app.pool.clone())),
                app.config.clone(),
            );
            for brand_id in app.brands(brand).await? {
                let summary = processor.run(brand_id, limit).await?;
                println!(
                    "{brand_id}: {} rewards, {} events, {} duplicates",
                    summary.rewards_processed, summary.events_recorded, summary.events_duplicate
                );
            }
        }
        Commands::Bandit { brand, element } => {
            let sampler = BanditSampler::new(
                Arc::new(SqliteScoreRepository::new(app.pool.clone())),
                Arc::new(SqliteSnapshotRepository::new(app.pool.clone())),
                app.config.clone(),
            );
            match element {
                Some(element) => {
                    for value in sampler.rank_dimension(brand, &element).await? {
                        println!(
                            "{element}={} sampled={:.4} posterior=Beta({:.1},{:.1}) obs={:.1}{}",
                            value.element_value,
                            value.sampled,
                            value.alpha,
                            value.beta,
                            value.observations,
                            if value.pooled { " (pooled)" } else { "" }
                        );
                    }
                }
                None => {
                    for (dimension, value) in sampler.select_all(brand).await? {
                        println!("{dimension} -> {} (sampled {:.4})", value.element_value, value.sampled);
                    }
                }
            }
        }
        Commands::Interactions { brand } => {
            let analyzer = InteractionAnalyzer::new(
                Arc::new(SqliteRewardRepository::new(app.pool.clone())),
                Arc::new(SqliteInteractionRepository::new(app.pool.clone())),
                Arc::new(SqliteLockRepository::new(app.pool.clone())),
                app.config.clone(),
            );
            for brand_id in app.brands(brand).await? {
                let summary = analyzer.run(brand_id).await?;
                println!(
                    "{brand_id}: {} pairs kept of {} examined, {} significant",
                    summary.pairs_kept, summary.pairs_examined, summary.significant
                );
            }
        }
        Commands::Experiments { command } => {
            execute_experiment(&app, command).await?;
        }
        Commands::Evolve { brand } => {
            let evolution = WinnerEvolution::new(
                Arc::new(SqliteCreativeRepository::new(app.pool.clone())),
                Arc::new(SqliteSnapshotRepository::new(app.pool.clone())),
                Arc::new(SqliteRewardRepository::new(app.pool.clone())),
                Arc::new(SqliteScoreRepository::new(app.pool.clone())),
                Arc::new(SqliteLineageRepository::new(app.pool.clone())),
                Arc::new(SqliteLockRepository::new(app.pool.clone())),
                app.config.clone(),
            );
            for brand_id in app.brands(brand).await? {
                let summary = evolution.run(brand_id).await?;
                println!(
                    "{brand_id}: {} requests, {} capped, {} matured",
                    summary.requests_submitted, summary.capped, summary.matured
                );
            }
        }
        Commands::Calibrate { brand, threshold, auto_reject_check } => {
            let engine = CalibrationEngine::new(
                Arc::new(SqliteCalibrationRepository::new(app.pool.clone())),
                Arc::new(SqliteLockRepository::new(app.pool.clone())),
                app.config.clone(),
            );
            let current =
                ThresholdConfig { approve_threshold: threshold, auto_reject_checks: auto_reject_check };
            let proposal = engine.run(brand, current).await?;
            match proposal.reason {
                Some(reason) => println!("{}: {reason}", proposal.status.as_str()),
                None => println!(
                    "{}: threshold {} -> {} (fp {:.3}, fn {:.3}, shift {:+.3})",
                    proposal.status.as_str(),
                    proposal.current.approve_threshold,
                    proposal.proposed.approve_threshold,
                    proposal.false_positive_rate,
                    proposal.false_negative_rate,
                    proposal.approval_rate_shift
                ),
            }
        }
    }
    Ok(())
}

async fn execute_experiment(app: &App, command: ExperimentCommands) -> Result<()> {
    let engine = ExperimentEngine::new(
        Arc::new(SqliteExperimentRepository::new(app.pool.clone())),
        Arc::new(SqliteSnapshotRepository::new(app.pool.clone())),
        Arc::new(SqliteLockRepository::new(app.pool.clone())),
        app.config.clone(),
    );

    match command {
        ExperimentCommands::Create {
            brand,
            name,
            hypothesis,
            variable,
            metric,
            control,
            treatments,
            assignment,
            min_days,
            max_days,
            min_impressions,
            audience_overlap,
        } => {
            let Some(metric) = PrimaryMetric::from_str(&metric) else {
                bail!("unknown metric: {metric}");
            };
            let assignment = match assignment.as_str() {
                "randomized" => AssignmentDesign::Randomized,
                "pragmatic_split" => AssignmentDesign::PragmaticSplit,
                "observational" => AssignmentDesign::Observational,
                other => bail!("unknown assignment design: {other}"),
            };
            let protocol = ExperimentProtocol {
                assignment,
                randomization_unit: "ad_set".to_string(),
                audience_overlap,
                budget_strategy: "even_split".to_string(),
                min_run_days: min_days,
                max_run_days: max_days,
                min_impressions_per_arm: min_impressions,
                held_constant: Default::default(),
            };

            let mut arms = vec![(control, true)];
            arms.extend(treatments.into_iter().map(|t| (t, false)));

            let experiment = engine
                .create(brand, &name, &hypothesis, &variable, metric, protocol, &arms)
                .await?;
            println!("created experiment {} ({})", experiment.id, experiment.status.as_str());
        }
        ExperimentCommands::BindArm { arm, ad_set_id, ad_id } => {
            let repo = SqliteExperimentRepository::new(app.pool.clone());
            use crate::domain::ports::ExperimentRepository as _;
            repo.bind_arm_platform(arm, ad_set_id.as_deref(), ad_id.as_deref()).await?;
            println!("arm {arm} bound");
        }
        ExperimentCommands::Start { id } => {
            let experiment = engine.start(id).await?;
            println!("experiment {} is {}", experiment.id, experiment.status.as_str());
        }
        ExperimentCommands::Cancel { id } => {
            let experiment = engine.cancel(id).await?;
            println!("experiment {} is {}", experiment.id, experiment.status.as_str());
        }
        ExperimentCommands::Analyze { id, date } => {
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            match engine.analyze(id, date).await? {
                Some(analysis) => println!(
                    "{date}: {} (leading arm: {})",
                    analysis.decision.as_str(),
                    analysis
                        .leading_arm_id
                        .map(|a| a.to_string())
                        .unwrap_or_else(|| "-".to_string())
                ),
                None => println!("{date}: already analyzed"),
            }
        }
        ExperimentCommands::RunDaily { date } => {
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            let analyses = engine.run_daily(date).await?;
            println!("{date}: {} experiments analyzed", analyses.len());
            for analysis in analyses {
                println!("  {} -> {}", analysis.experiment_id, analysis.decision.as_str());
            }
        }
        ExperimentCommands::Show { id } => {
            let repo = SqliteExperimentRepository::new(app.pool.clone());
            use crate::domain::ports::ExperimentRepository;
            let Some(experiment) = repo.get(id).await? else {
                bail!("experiment not found: {id}");
            };
            println!(
                "{} [{}] {} on {} ({})",
                experiment.id,
                experiment.status.as_str(),
                experiment.name,
                experiment.test_variable,
                experiment.primary_metric.as_str()
            );
            if let Some(analysis) = repo.latest_analysis(id).await? {
                println!(
                    "latest analysis {}: {} ({})",
                    analysis.analysis_date,
                    analysis.decision.as_str(),
                    analysis.evidence_grade.as_str()
                );
                for arm in analysis.arm_results {
                    println!(
                        "  {}{}: {}/{} p(best)={:.3}",
                        arm.variable_value,
                        if arm.is_control { " (control)" } else { "" },
                        arm.successes,
                        arm.impressions,
                        arm.probability_best
                    );
                }
            }
        }
    }
    Ok(())
}
