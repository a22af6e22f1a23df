use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use team_tasks::core::dag::{DagTransition, TreeLine};
use team_tasks::core::{parse_id_list, Stage, StageStatus};
use team_tasks::state::{Committed, ListEntry};
use team_tasks::workflow::debate::{Debate, RoundStatus};
use team_tasks::workflow::{LinearTransition, ModeDetail, Progress, StageBoard, StageUpdate};
use team_tasks::{
    ttlog, ttlog_error, Config, Error, FileStore, Mode, ModeState, Project, ProjectManager,
    ProjectStatus, Result,
};

const TASK_PREVIEW: usize = 60;
const OUTPUT_PREVIEW: usize = 80;

/// team-tasks - shared task state for multi-agent pipelines, DAGs and debates
#[derive(Parser, Debug)]
#[command(name = "team-tasks")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    TEAM_TASKS_DIR      Project directory (overrides config)\n    TEAM_TASKS_DEBUG=1  Enable debug logging (alternative to --debug)\n    TEAM_TASKS_LOG      Log level: error, warn, info, debug or trace")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.team-tasks/team-tasks.log)
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Project directory (overrides TEAM_TASKS_DIR and the config file)
    #[arg(long, value_name = "PATH")]
    pub dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Create a new project
    Init {
        /// Project id
        project: String,

        /// Execution mode: linear, dag or debate
        #[arg(short, long, default_value = "linear")]
        mode: String,

        /// Project goal (the debate question in debate mode)
        #[arg(short, long, default_value = "")]
        goal: String,

        /// Shared workspace path handed to every agent
        #[arg(short, long)]
        workspace: Option<String>,

        /// Comma-separated stage order (linear mode only)
        #[arg(short, long)]
        pipeline: Option<String>,

        /// Overwrite an existing project
        #[arg(short, long)]
        force: bool,
    },

    /// Add a stage to a dag project
    Add {
        project: String,
        stage: String,

        /// Agent to assign (defaults to the stage id)
        #[arg(short, long)]
        agent: Option<String>,

        /// Comma-separated dependency stage ids
        #[arg(short = 'd', long = "depends")]
        depends: Option<String>,

        /// Task description
        #[arg(long = "desc")]
        description: Option<String>,
    },

    /// Add dependencies to an existing dag stage
    Depend {
        project: String,
        stage: String,

        /// Comma-separated dependency stage ids
        depends: String,
    },

    /// Add a debater to a debate project
    AddDebater {
        project: String,
        agent_id: String,

        /// Debater role or perspective
        #[arg(short, long)]
        role: Option<String>,
    },

    /// Debate round actions
    Round {
        project: String,

        action: RoundAction,

        /// Debater id (collect only)
        agent_id: Option<String>,

        /// Response text (collect only)
        content: Option<String>,
    },

    /// Show project status
    Status {
        project: String,

        #[arg(short, long)]
        json: bool,
    },

    /// Set the task description of a stage
    Assign {
        project: String,
        stage: String,
        task: String,
    },

    /// Update a stage status (pending, in-progress, done, failed, skipped)
    Update {
        project: String,
        stage: String,
        status: String,
    },

    /// Show the current stage of a linear project
    Next {
        project: String,

        #[arg(short, long)]
        json: bool,
    },

    /// Show every dispatchable stage of a dag project
    Ready {
        project: String,

        #[arg(short, long)]
        json: bool,
    },

    /// Append a log entry to a stage
    Log {
        project: String,
        stage: String,
        message: String,
    },

    /// Set the output of a stage
    Result {
        project: String,
        stage: String,
        output: String,
    },

    /// Reset a stage (or every stage) to pending
    Reset {
        project: String,

        stage: Option<String>,

        #[arg(short, long)]
        all: bool,
    },

    /// Show the log history of a stage
    History { project: String, stage: String },

    /// Show the dependency tree of a dag project
    Graph { project: String },

    /// List all projects
    List {
        #[arg(short, long)]
        json: bool,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundAction {
    Start,
    Collect,
    CrossReview,
    Synthesize,
    Reopen,
}

fn main() {
    let cli = Cli::parse();

    team_tasks::log::init_with_debug(cli.debug);

    if let Err(e) = run(cli) {
        let kind = e.kind();
        ttlog_error!("{}", e);
        eprintln!("error[{}]: {}", kind, e);
        std::process::exit(kind.exit_code());
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let store = FileStore::from_config(&config, cli.dir.as_deref())?;
    let manager = ProjectManager::new(store);
    ttlog!("Command: {:?}", cli.command);

    match cli.command {
        Command::Init {
            project,
            mode,
            goal,
            workspace,
            pipeline,
            force,
        } => run_init(
            &manager,
            &config,
            &project,
            &mode,
            &goal,
            workspace.as_deref(),
            pipeline.as_deref(),
            force,
        ),
        Command::Add {
            project,
            stage,
            agent,
            depends,
            description,
        } => run_add(
            &manager,
            &project,
            &stage,
            agent.as_deref(),
            depends.as_deref(),
            description.as_deref(),
        ),
        Command::Depend {
            project,
            stage,
            depends,
        } => run_depend(&manager, &project, &stage, &depends),
        Command::AddDebater {
            project,
            agent_id,
            role,
        } => run_add_debater(&manager, &project, &agent_id, role.as_deref()),
        Command::Round {
            project,
            action,
            agent_id,
            content,
        } => run_round(&manager, &project, action, agent_id, content),
        Command::Status { project, json } => run_status(&manager, &project, json),
        Command::Assign {
            project,
            stage,
            task,
        } => {
            manager.mutate(&project, "assign", |p| p.assign(&stage, &task))?;
            println!("✅ Assigned task to {}", stage);
            Ok(())
        }
        Command::Update {
            project,
            stage,
            status,
        } => run_update(&manager, &project, &stage, &status),
        Command::Next { project, json } => run_next(&manager, &project, json),
        Command::Ready { project, json } => run_ready(&manager, &project, json),
        Command::Log {
            project,
            stage,
            message,
        } => {
            manager.mutate(&project, "log", |p| p.append_log(&stage, &message))?;
            println!("📝 Log added to {}", stage);
            Ok(())
        }
        Command::Result {
            project,
            stage,
            output,
        } => {
            manager.mutate(&project, "result", |p| p.record_result(&stage, &output))?;
            println!("✅ Result saved for {}", stage);
            Ok(())
        }
        Command::Reset {
            project,
            stage,
            all,
        } => run_reset(&manager, &project, stage.as_deref(), all),
        Command::History { project, stage } => run_history(&manager, &project, &stage),
        Command::Graph { project } => run_graph(&manager, &project),
        Command::List { json } => run_list(&manager, json),
    }
}

type Manager = ProjectManager<FileStore>;

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_init(
    manager: &Manager,
    config: &Config,
    id: &str,
    mode: &str,
    goal: &str,
    workspace: Option<&str>,
    pipeline: Option<&str>,
    force: bool,
) -> Result<()> {
    let mode: Mode = mode.parse()?;
    let pipeline = match pipeline {
        Some(raw) => parse_id_list(raw),
        None => config.effective_pipeline(),
    };
    let state = ModeState::for_mode(mode, &pipeline)?;
    let project = manager.create(Project::new(id, goal, workspace, state)?, force)?;
    print_json(&project)
}

fn run_add(
    manager: &Manager,
    project: &str,
    stage: &str,
    agent: Option<&str>,
    depends: Option<&str>,
    description: Option<&str>,
) -> Result<()> {
    let agent = agent.unwrap_or(stage);
    let deps = depends.map(parse_id_list).unwrap_or_default();
    manager.mutate(project, "add", |p| {
        p.add_stage(stage, agent, &deps, description)
    })?;

    let deps_str = if deps.is_empty() {
        String::new()
    } else {
        format!(" ← [{}]", deps.join(", "))
    };
    println!("✅ Added {} → {}{}", stage, agent, deps_str);
    Ok(())
}

fn run_depend(manager: &Manager, project: &str, stage: &str, depends: &str) -> Result<()> {
    let deps = parse_id_list(depends);
    if deps.is_empty() {
        return Err(Error::Validation(
            "name at least one dependency".to_string(),
        ));
    }
    let Committed { value: added, .. } =
        manager.mutate(project, "depend", |p| p.depend(stage, &deps))?;

    if added.is_empty() {
        println!("ℹ️  {} already depends on {}", stage, deps.join(", "));
    } else {
        println!("🔗 {} now depends on {}", stage, added.join(", "));
    }
    Ok(())
}

fn run_add_debater(
    manager: &Manager,
    project: &str,
    agent_id: &str,
    role: Option<&str>,
) -> Result<()> {
    manager.mutate(project, "add-debater", |p| p.add_debater(agent_id, role))?;
    let role_str = role.map(|r| format!(" ({})", r)).unwrap_or_default();
    println!("✅ Added debater '{}'{}", agent_id, role_str);
    Ok(())
}

fn run_round(
    manager: &Manager,
    project: &str,
    action: RoundAction,
    agent_id: Option<String>,
    content: Option<String>,
) -> Result<()> {
    match action {
        RoundAction::Start => {
            let committed = manager.mutate(project, "round start", |p| p.round_start())?;
            println!("🗣️  Debate Round 1 (initial) started\n");
            for prompt in &committed.value {
                println!("Agent: {} ({})", prompt.agent_id, prompt.role);
                println!("Question: {}", prompt.goal);
                println!("Task: {}\n", prompt.instruction);
            }
        }
        RoundAction::Collect => {
            let (Some(agent_id), Some(content)) = (agent_id, content) else {
                return Err(Error::Validation(
                    "usage: round <project> collect <agent-id> \"text\"".to_string(),
                ));
            };
            let outcome = manager
                .mutate(project, "round collect", |p| {
                    p.round_collect(&agent_id, &content)
                })?
                .value;
            if outcome.complete {
                println!(
                    "✅ Collected response from {}. Round {} ({}) is complete.",
                    outcome.agent_id, outcome.round, outcome.round_type
                );
                if let Some(next) = outcome.next {
                    println!("➡️  Next: round {} {}", project, next_action(next.as_str()));
                }
            } else {
                println!(
                    "✅ Collected response from {}. Waiting for: {}",
                    outcome.agent_id,
                    outcome.missing.join(", ")
                );
            }
        }
        RoundAction::CrossReview => {
            let prompts = manager
                .mutate(project, "round cross-review", |p| p.round_cross_review())?
                .value;
            println!("🔁 Cross-review prompts\n");
            for prompt in &prompts {
                println!("Agent: {} ({})", prompt.agent_id, prompt.role);
                println!("Your previous response: {}\n", prompt.own_response);
                println!("Other debaters' responses:");
                if prompt.peers.is_empty() {
                    println!("- (none)");
                }
                for peer in &prompt.peers {
                    println!("- {} ({}): {}", peer.agent_id, peer.role, peer.response);
                }
                println!("\nTask: {}\n", prompt.instruction);
            }
        }
        RoundAction::Synthesize => {
            let package = manager
                .mutate(project, "round synthesize", |p| p.round_synthesize())?
                .value;
            println!("🧾 Synthesis package for {}", project);
            if !package.goal.is_empty() {
                println!("Question: {}", package.goal);
            }
            for (title, round) in [("Initial positions", "initial"), ("Cross-reviews", "cross-review")] {
                println!("\n{}:", title);
                for entry in &package.debaters {
                    let text = entry
                        .responses
                        .get(round)
                        .map(String::as_str)
                        .unwrap_or("(missing)");
                    println!("- {} ({}): {}", entry.agent_id, entry.role, text);
                }
            }
            println!("\nTask: {}", package.instruction);
        }
        RoundAction::Reopen => {
            let outcome = manager
                .mutate(project, "round reopen", |p| p.round_reopen())?
                .value;
            println!(
                "🔄 Round {} ({}) reopened with {} response(s) kept",
                outcome.round, outcome.round_type, outcome.responses
            );
        }
    }
    Ok(())
}

/// Map a round type onto the `round` action that runs it.
fn next_action(round_type: &str) -> &str {
    match round_type {
        "synthesis" => "synthesize",
        other => other,
    }
}

fn run_status(manager: &Manager, id: &str, json: bool) -> Result<()> {
    let project = manager.read(id)?;
    if json {
        return print_json(&serde_json::json!({
            "summary": project.summary(),
            "project": project,
        }));
    }

    let summary = project.summary();
    println!("📋 Project: {}", project.id);
    if !project.goal.is_empty() {
        println!("🎯 Goal: {}", project.goal);
    }
    println!("📊 Status: {}  |  Mode: {}", project.status, summary.mode);
    if let Some(workspace) = &project.workspace {
        println!("🗂️  Workspace: {}", workspace);
    }

    match &project.state {
        ModeState::Linear(linear) => {
            let current = summary.detail.current_stage.as_deref().unwrap_or("N/A");
            println!("▶️  Current: {}\n", current);
            for stage in linear.pipeline().into_iter().filter_map(|id| linear.stage(id)) {
                println!("  {} {}: {}", status_icon(stage.status), stage.id, stage.status);
                print_stage_details(stage, "");
            }
        }
        ModeState::Dag(dag) => {
            println!();
            for stage in dag.stages() {
                let ready_mark = if summary.detail.ready.contains(&stage.id) {
                    " 🟢 READY"
                } else if summary.detail.blocked.contains(&stage.id) {
                    " ⛔ BLOCKED"
                } else {
                    ""
                };
                let deps = if stage.depends_on.is_empty() {
                    String::new()
                } else {
                    format!(" ← [{}]", stage.depends_on.join(", "))
                };
                println!(
                    "  {} {} ({}): {}{}{}",
                    status_icon(stage.status),
                    stage.id,
                    stage.agent,
                    stage.status,
                    ready_mark,
                    deps
                );
                print_stage_details(stage, "");
            }
            if !summary.detail.ready.is_empty() {
                println!("\n  🟢 Ready to dispatch: {}", summary.detail.ready.join(", "));
            }
        }
        ModeState::Debate(debate) => {
            print_debate(debate, &summary.detail);
            return Ok(());
        }
    }

    if summary.progress.total > 0 {
        println!("\n  Progress: {}", progress_bar(summary.progress));
    }
    Ok(())
}

fn print_stage_details(stage: &Stage, prefix: &str) {
    if !stage.description.is_empty() {
        println!(
            "{}     Task: {}",
            prefix,
            truncate_string(&stage.description, TASK_PREVIEW)
        );
    }
    if let Some(output) = stage.output() {
        println!(
            "{}     Output: {}",
            prefix,
            truncate_string(output, OUTPUT_PREVIEW)
        );
    }
}

fn print_debate(debate: &Debate, detail: &ModeDetail) {
    if let Some(phase) = detail.phase {
        println!("🧭 Phase: {}", phase);
    }
    println!();
    println!("  👥 Debaters: {}", debate.debaters().len());
    for debater in debate.debaters() {
        println!("  - {}: {}", debater.agent_id, debater.role_label());
    }

    if debate.rounds().is_empty() {
        println!("\n  🟡 No rounds started");
        return;
    }

    println!();
    for (i, round) in debate.rounds().iter().enumerate() {
        let status = match round.status {
            RoundStatus::Pending => "pending",
            RoundStatus::InProgress => "in-progress",
            RoundStatus::Done => "done",
        };
        println!(
            "  🔹 Round {}: {} [{}] ({}/{} responses)",
            i + 1,
            round.round_type,
            status,
            round.responses.len(),
            debate.debaters().len()
        );
        for (agent_id, response) in &round.responses {
            println!("     {}: {}", agent_id, truncate_string(response, OUTPUT_PREVIEW));
        }
    }
    if let Some(next) = detail.next_round {
        println!("\n  ➡️  Next: {}", next);
    }
}

fn run_update(manager: &Manager, project: &str, stage: &str, status: &str) -> Result<()> {
    let status: StageStatus = status.parse()?;
    let Committed {
        value: update,
        project,
    } = manager.mutate(project, "update", |p| p.update_stage(stage, status))?;

    let change = update.change();
    println!("✅ {}: {} → {}", change.stage, change.from, change.to);

    match &update {
        StageUpdate::Dag(DagTransition {
            newly_unblocked,
            ready,
            ..
        }) => {
            if !newly_unblocked.is_empty() {
                println!("🟢 Unblocked: {}", newly_unblocked.join(", "));
            }
            if project.status == ProjectStatus::Completed {
                println!("🎉 All tasks completed!");
            } else if change.to == StageStatus::Failed {
                if ready.is_empty() {
                    println!("❌ Pipeline blocked — no tasks can proceed");
                } else {
                    println!(
                        "⚠️  Failed, but these tasks can still run: {}",
                        ready.join(", ")
                    );
                }
            }
        }
        StageUpdate::Linear(LinearTransition { current_stage, .. }) => {
            match current_stage {
                None => println!("🎉 Pipeline completed!"),
                Some(current) if change.to == StageStatus::Done => {
                    println!("▶️  Next: {}", current)
                }
                Some(_) => {}
            }
        }
    }
    Ok(())
}

fn run_next(manager: &Manager, id: &str, json: bool) -> Result<()> {
    let project = manager.read(id)?;
    let next = project.next_stage()?;
    if json {
        return print_json(&next);
    }

    let Some(next) = next else {
        println!("🎉 Pipeline completed — no pending stages");
        return Ok(());
    };
    println!("▶️  Next stage: {}", next.stage);
    println!("   Agent: {}", next.agent);
    println!("   Status: {}", next.status);
    if let Some(workspace) = &next.workspace {
        println!("   Workspace: {}", workspace);
    }
    if !next.description.is_empty() {
        println!("   Task: {}", next.description);
    }
    if let Some(previous) = &next.previous {
        println!(
            "   Previous output ({}): {}",
            previous.stage,
            truncate_string(&previous.output, OUTPUT_PREVIEW)
        );
    }
    Ok(())
}

fn run_ready(manager: &Manager, id: &str, json: bool) -> Result<()> {
    let project = manager.read(id)?;
    let ready = project.ready()?;
    if json {
        return print_json(&ready);
    }

    if project.status == ProjectStatus::Completed {
        println!("🎉 All tasks completed — nothing to dispatch");
        return Ok(());
    }
    if ready.is_empty() {
        let in_progress = project.summary().detail.in_progress;
        if in_progress.is_empty() {
            println!("❌ No ready tasks (pipeline may be blocked)");
        } else {
            println!("⏳ No ready tasks — waiting for: {}", in_progress.join(", "));
        }
        return Ok(());
    }

    let plural = if ready.len() > 1 { "s" } else { "" };
    println!("🟢 Ready to dispatch ({} task{}):\n", ready.len(), plural);
    for stage in &ready {
        let deps = if stage.depends_on.is_empty() {
            String::new()
        } else {
            format!(" ← [{}]", stage.depends_on.join(", "))
        };
        println!("  📌 {} → agent: {}{}", stage.stage, stage.agent, deps);
        if let Some(workspace) = &stage.workspace {
            println!("     Workspace: {}", workspace);
        }
        if !stage.description.is_empty() {
            println!("     Task: {}", truncate_string(&stage.description, OUTPUT_PREVIEW));
        }
        if !stage.dependency_outputs.is_empty() {
            println!("     Dep outputs:");
            for dep in &stage.dependency_outputs {
                println!("       {}: {}", dep.stage, truncate_string(&dep.output, TASK_PREVIEW));
            }
        }
        println!();
    }
    Ok(())
}

fn run_reset(manager: &Manager, project: &str, stage: Option<&str>, all: bool) -> Result<()> {
    let changes = match (stage, all) {
        (_, true) => manager.mutate(project, "reset", |p| p.reset_all())?.value,
        (Some(stage), false) => {
            let update = manager.mutate(project, "reset", |p| p.reset_stage(stage))?.value;
            vec![update.change().clone()]
        }
        (None, false) => {
            return Err(Error::Validation(
                "specify a stage or use --all".to_string(),
            ))
        }
    };
    let ids: Vec<&str> = changes.iter().map(|c| c.stage.as_str()).collect();
    println!("🔄 Reset: {}", ids.join(", "));
    Ok(())
}

fn run_history(manager: &Manager, id: &str, stage: &str) -> Result<()> {
    let project = manager.read(id)?;
    let log = project.history(stage)?;
    if log.is_empty() {
        println!("No logs for {}", stage);
        return Ok(());
    }
    println!("📜 History for {}:", stage);
    for entry in log {
        println!("  [{}] {}", entry.time.to_rfc3339(), entry.event);
    }
    Ok(())
}

fn run_graph(manager: &Manager, id: &str) -> Result<()> {
    let project = manager.read(id)?;
    let tree = project.graph()?;
    println!("📋 {} — DAG Graph\n", project.id);
    for line in &tree {
        println!("{}", format_tree_line(line));
    }
    let progress = project.engine().progress();
    if progress.total > 0 {
        println!("\n  Progress: {}", progress_bar(progress));
    }
    Ok(())
}

fn run_list(manager: &Manager, json: bool) -> Result<()> {
    let entries = manager.list()?;
    if json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("No projects found.");
        return Ok(());
    }
    for entry in &entries {
        match entry {
            ListEntry::Project(summary) => println!(
                "  {} [{}] ({}/{}) mode={} {}",
                summary.id,
                summary.status,
                summary.progress.done,
                summary.progress.total,
                summary.mode,
                truncate_string(&summary.goal, 50)
            ),
            ListEntry::Unreadable { id, error } => {
                println!("  {} [error reading] {}", id, error)
            }
        }
    }
    Ok(())
}

fn status_icon(status: StageStatus) -> &'static str {
    match status {
        StageStatus::Pending => "⬜",
        StageStatus::InProgress => "🔄",
        StageStatus::Done => "✅",
        StageStatus::Failed => "❌",
        StageStatus::Skipped => "⏭️",
    }
}

fn progress_bar(progress: Progress) -> String {
    let done = progress.done.min(progress.total);
    format!(
        "[{}{}] {}/{}",
        "█".repeat(done),
        "░".repeat(progress.total - done),
        progress.done,
        progress.total
    )
}

fn format_tree_line(line: &TreeLine) -> String {
    let connector = if line.last { "└─" } else { "├─" };
    if line.repeated {
        format!(
            "{}{} {} {} (↑ see above)",
            line.indent,
            connector,
            status_icon(line.status),
            line.stage
        )
    } else {
        format!(
            "{}{} {} {} [{}]",
            line.indent,
            connector,
            status_icon(line.status),
            line.stage,
            line.agent
        )
    }
}

/// Truncate a string to a maximum number of characters, adding "..." if truncated.
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
