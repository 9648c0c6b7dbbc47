//! CLI interface for smart-curriculum
//!
//! Thin host over the curriculum engine: every subcommand maps to one
//! engine operation and prints the result. No curriculum logic lives here.

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;

use crate::config::Config;
use crate::engine::CurriculumEngine;
use crate::generate::{ContentGenerator, LlmGenerator};
use crate::store::RoadmapStore;
use crate::types::{LearnerProfile, NextUnit, QuizSubmission, UnitSession};

#[derive(Parser)]
#[command(name = "smart-curriculum")]
#[command(about = "Adaptive learning roadmaps with generated lessons, quizzes, and remediation", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage learners
    Learner {
        #[command(subcommand)]
        command: LearnerCommands,
    },
    /// Generate a fresh roadmap for a learner
    Plan {
        /// Learner id
        learner_id: i64,
    },
    /// Show a learner's roadmap
    Roadmap {
        /// Learner id
        learner_id: i64,
    },
    /// Get the learner's next unit of work (lesson + quiz)
    Next {
        /// Learner id
        learner_id: i64,
    },
    /// List a learner's units
    Units {
        /// Learner id
        learner_id: i64,
    },
    /// Show a unit with its lesson and quiz (generates content if missing)
    Show {
        /// Unit id
        unit_id: i64,
    },
    /// Grade a submitted quiz attempt
    Grade {
        /// Unit id
        unit_id: i64,
        /// Answers as JSON, e.g. '{"0": "Paris", "1": "B"}'
        answers: String,
    },
    /// Show completion progress
    Progress {
        /// Learner id
        learner_id: i64,
    },
    /// Delete all learning data for a learner (profile is kept)
    Reset {
        /// Learner id
        learner_id: i64,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Show or change configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
        /// Set model for a role (usage: --set-model role model_id)
        #[arg(long, value_names = &["role", "model"], num_args = 2)]
        set_model: Option<Vec<String>>,
    },
}

#[derive(Subcommand)]
enum LearnerCommands {
    /// Add a learner
    Add {
        /// Learner name
        name: String,
        #[arg(long)]
        strengths: Option<String>,
        #[arg(long)]
        weaknesses: Option<String>,
        #[arg(long)]
        interests: Option<String>,
        #[arg(long)]
        course: Option<String>,
        #[arg(long)]
        year: Option<String>,
    },
    /// List learners
    List,
}

/// Run the CLI
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show, set_model } => handle_config(show, set_model),
        command => {
            let engine = build_engine().await?;
            handle_command(&engine, command).await
        }
    }
}

async fn build_engine() -> Result<CurriculumEngine> {
    let config = Config::load()?;
    let store = Arc::new(RoadmapStore::open(&config.storage.database_path).await?);
    let generator: Arc<dyn ContentGenerator> = Arc::new(LlmGenerator::from_config(&config)?);
    Ok(CurriculumEngine::new(store, generator, &config))
}

async fn handle_command(engine: &CurriculumEngine, command: Commands) -> Result<()> {
    match command {
        Commands::Learner { command } => match command {
            LearnerCommands::Add {
                name,
                strengths,
                weaknesses,
                interests,
                course,
                year,
            } => {
                let learner = engine
                    .add_learner(&LearnerProfile {
                        name,
                        strengths,
                        weaknesses,
                        interests,
                        course,
                        year,
                    })
                    .await?;
                println!("Created learner {} ({})", learner.id, learner.name);
            }
            LearnerCommands::List => {
                let learners = engine.list_learners().await?;
                if learners.is_empty() {
                    println!("No learners yet. Add one with 'learner add <name>'.");
                }
                for learner in learners {
                    println!(
                        "{:>4}  {}  [{}]",
                        learner.id,
                        learner.name,
                        learner.course.as_deref().unwrap_or("-")
                    );
                }
            }
        },
        Commands::Plan { learner_id } => {
            println!("Planning roadmap (this calls the generator and can take a moment)...");
            let plan = engine.plan_roadmap(learner_id).await?;
            println!("\nTopic: {}", plan.topic);
            for node in &plan.nodes {
                println!("  {:>3}. {}", node.position, node.subtopic);
            }
        }
        Commands::Roadmap { learner_id } => {
            let nodes = engine.roadmap(learner_id).await?;
            if nodes.is_empty() {
                println!("No roadmap yet. Run 'plan {learner_id}' first.");
            }
            for node in nodes {
                let marker = match node.status {
                    crate::types::NodeStatus::Done => "✓",
                    crate::types::NodeStatus::Split => "⑂",
                    crate::types::NodeStatus::Pending => " ",
                };
                let indent = if node.parent_id.is_some() { "    " } else { "" };
                println!("{} {:>3}. {}{}", marker, node.position, indent, node.subtopic);
            }
        }
        Commands::Next { learner_id } => match engine.next_unit(learner_id).await? {
            NextUnit::Unit(session) => print_session(&session),
            NextUnit::Complete => println!("🎉 All roadmap units complete!"),
        },
        Commands::Units { learner_id } => {
            for unit in engine.units(learner_id).await? {
                println!(
                    "{:>4}  [{}] {} ({} min)",
                    unit.id,
                    unit.status,
                    unit.title,
                    unit.estimated_minutes
                );
            }
        }
        Commands::Show { unit_id } => {
            let session = engine.unit_detail(unit_id).await?;
            print_session(&session);
        }
        Commands::Grade { unit_id, answers } => {
            let submission = QuizSubmission::from_json(&answers)?;
            let report = engine.grade_attempt(unit_id, &submission).await?;
            for (i, result) in report.results.iter().enumerate() {
                let marker = if result.is_correct { "✓" } else { "✗" };
                println!(
                    "{} Q{}: {} (correct: {})",
                    marker,
                    i + 1,
                    result.submitted.as_deref().unwrap_or("-"),
                    result.correct_answer
                );
            }
            if report.passed {
                println!("\n✓ Quiz passed ({}%).", report.score_pct);
            } else {
                println!("\n✗ Quiz failed ({}%).", report.score_pct);
                if let Some(split) = &report.remediation {
                    println!(
                        "The topic was split into {} simpler parts; they are next in your roadmap.",
                        split.node_ids.len()
                    );
                }
            }
        }
        Commands::Progress { learner_id } => {
            let progress = engine.progress(learner_id).await?;
            println!(
                "{}/{} units complete ({}%)",
                progress.completed, progress.total, progress.percent
            );
        }
        Commands::Reset { learner_id, yes } => {
            if !yes {
                println!(
                    "This deletes ALL learning data for learner {learner_id}. Re-run with --yes to confirm."
                );
                return Ok(());
            }
            engine.reset(learner_id).await?;
            println!("Learner {learner_id} reset.");
        }
        Commands::Config { .. } => unreachable!("handled before engine construction"),
    }

    Ok(())
}

fn print_session(session: &UnitSession) {
    println!("Unit {}: {}", session.unit.id, session.unit.title);
    println!("Topic: {}", session.subtopic);
    println!("Estimated: {} min\n", session.unit.estimated_minutes);
    println!("{}\n", session.content.lesson_text);

    if !session.content.resources.is_empty() {
        println!("Resources:");
        for link in &session.content.resources {
            println!("  - {link}");
        }
    }
    if !session.content.videos.is_empty() {
        println!("Videos:");
        for link in &session.content.videos {
            println!("  - {link}");
        }
    }

    println!("\nQuiz ({} questions):", session.content.quiz.len());
    for (i, item) in session.content.quiz.iter().enumerate() {
        println!("  {}. [{}] {}", i, item.difficulty, item.question);
        for option in &item.options {
            println!("       - {option}");
        }
    }
    println!(
        "\nSubmit with: grade {} '{{\"0\": \"answer\", ...}}'",
        session.unit.id
    );
}

fn handle_config(show: bool, set_model: Option<Vec<String>>) -> Result<()> {
    let mut config = Config::load()?;

    if let Some(pair) = set_model {
        let (role, model) = (&pair[0], &pair[1]);
        if !config.models.set(role, model.clone()) {
            return Err(anyhow!(
                "unknown role '{role}' (available: {})",
                crate::config::ModelsConfig::roles().join(", ")
            ));
        }
        config.save()?;
        println!("Set {role} model to {model}");
        return Ok(());
    }

    if show {
        println!("Config file: {}", crate::config::config_path()?.display());
        println!("Database:    {}", config.storage.database_path.display());
        println!("Endpoint:    {}", config.generator.base_url);
        println!("Models:");
        println!("  study:   {}", config.models.study);
        println!("  quiz:    {}", config.models.quiz);
        println!("  planner: {}", config.models.planner);
        println!("Pass threshold: {}%", config.grading.pass_threshold);
        println!(
            "Quiz questions: {} (top-level) / {} (remediation)",
            config.quiz.unit_questions, config.quiz.remediation_questions
        );
    } else {
        println!("Use --show to display configuration or --set-model <role> <model> to change a model.");
    }

    Ok(())
}
