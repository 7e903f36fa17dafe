//! EvMan CLI - earned-value schedule engine.

mod source;
mod workspace;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use evman_calc::{DependencyHook, ListDefinition, TaskList};
use evman_core::{NodeId, TaskTree, Time};
use evman_deps::{DependencyResolver, DependencyUpdater, ResolverConfig};
use evman_merge::{MergeOptions, TaskListMerger};
use evman_storage::{JsonStore, ScheduleStore};
use source::RegistrySource;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use workspace::Workspace;

#[derive(Parser)]
#[command(name = "evman")]
#[command(about = "Earned-value schedule engine", long_about = None)]
struct Cli {
    /// Store directory
    #[arg(long, global = true, default_value = ".evman")]
    store: PathBuf,

    /// Recalculate as of this time (RFC 3339) instead of now
    #[arg(long, global = true)]
    at: Option<Time>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import task lists, snapshots and hierarchy from a workspace file
    Import {
        /// Workspace JSON file
        workspace: PathBuf,
    },
    /// List stored task lists and snapshots
    Lists,
    /// Recalculate a task list and show its metrics
    Recalc {
        /// Task list name
        list: String,
        /// Which text of each metric to show
        #[arg(long, value_enum, default_value = "medium")]
        format: RowFormat,
        /// Also print the task tree
        #[arg(long)]
        tree: bool,
    },
    /// Recalculate a task list and save it as a baseline snapshot
    Baseline {
        /// Task list name
        list: String,
        /// Snapshot name
        name: String,
        /// Make the snapshot the list's baseline
        #[arg(long)]
        attach: bool,
    },
    /// Merge the contributors of a task list into one tree
    Merge {
        /// Task list name
        list: String,
        /// Keep each contributor's leaf
        #[arg(long)]
        preserve_leaves: bool,
        /// Collapse single-child chains
        #[arg(long)]
        simplify: bool,
        /// Leave node types out
        #[arg(long)]
        no_node_types: bool,
    },
    /// Resolve the dependencies of a task list
    Deps {
        /// Task list name
        list: String,
        /// People who own the list
        #[arg(long)]
        owner: Vec<String>,
        /// Add collaboration edges
        #[arg(long)]
        collaborators: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RowFormat {
    Short,
    Medium,
    Full,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let now = cli.at.unwrap_or_else(Utc::now);

    let mut store = JsonStore::new(&cli.store)
        .await
        .with_context(|| format!("opening store at {}", cli.store.display()))?;

    match cli.command {
        Commands::Import { workspace } => {
            let count = Workspace::load(&workspace).await?.save_into(&mut store).await?;
            println!("Imported {count} task lists into {}", cli.store.display());
        }
        Commands::Lists => {
            let names = store.list_definitions().await?;
            println!("Task lists ({})", names.len());
            for name in names {
                let kind = match store.load_definition(&name).await? {
                    Some(ListDefinition::Rollup { .. }) => "rollup",
                    _ => "plain",
                };
                println!("  {name} | {kind}");
            }
            let snapshots = store.list_snapshots().await?;
            println!("Snapshots ({})", snapshots.len());
            for s in snapshots {
                println!("  {} | {} | {}", s.name, s.taken_at.format("%Y-%m-%d %H:%M"), s.id);
            }
        }
        Commands::Recalc { list, format, tree } => {
            let source = open_source(&store, now).await?;
            let mut task_list = open_list(&source, &list)?;
            task_list.recalc_at(now);
            print_metrics(&task_list, format);
            if tree {
                print_tree(task_list.tree(), task_list.tree().root(), 0);
            }
        }
        Commands::Baseline { list, name, attach } => {
            let source = open_source(&store, now).await?;
            let mut task_list = open_list(&source, &list)?;
            task_list.recalc_at(now);
            let snapshot = task_list.snapshot(name.as_str(), now);
            store.save_snapshot(&snapshot).await?;
            if attach {
                let mut definition = store
                    .load_definition(&list)
                    .await?
                    .with_context(|| format!("task list {list} disappeared"))?;
                match &mut definition {
                    ListDefinition::Plain { baseline, .. } | ListDefinition::Rollup { baseline, .. } => {
                        *baseline = Some(name.clone());
                    }
                }
                store.save_definition(&list, &definition).await?;
            }
            info!(task_list = %list, snapshot = %name, attach, "baseline saved");
            println!("Saved snapshot {name} ({})", snapshot.id);
        }
        Commands::Merge { list, preserve_leaves, simplify, no_node_types } => {
            let source = Arc::new(open_source(&store, now).await?);
            let mut task_list = open_list(&source, &list)?;
            task_list.recalc_at(now);
            let resolver = Arc::new(DependencyResolver::new(source, ResolverConfig::default()));
            let options = MergeOptions::new()
                .with_preserve_leaves(preserve_leaves)
                .with_simplify(simplify)
                .with_node_types(!no_node_types);
            let merged = TaskListMerger::new(options).with_resolver(resolver).merge(&task_list)?;
            print_tree(merged.tree(), merged.tree().root(), 0);
        }
        Commands::Deps { list, owner, collaborators } => {
            let source = Arc::new(open_source(&store, now).await?);
            let mut task_list = open_list(&source, &list)?;
            let resolver = Arc::new(DependencyResolver::new(source, ResolverConfig::default()));
            let updater: Arc<dyn DependencyHook> =
                Arc::new(DependencyUpdater::new(resolver).with_owner(owner).with_collaborators(collaborators));
            attach_hook(&mut task_list, &updater);
            task_list.recalc_at(now);
            print_dependencies(&task_list);
        }
    }

    Ok(())
}

async fn open_source(store: &JsonStore, now: Time) -> Result<RegistrySource> {
    let registry = store.load_registry().await.context("loading task lists")?;
    let hierarchy = store.load_hierarchy().await.context("loading hierarchy")?;
    Ok(RegistrySource::new(registry, hierarchy, now))
}

fn open_list(source: &RegistrySource, name: &str) -> Result<TaskList> {
    if !source.is_defined(name) {
        bail!("Unknown task list: {name}");
    }
    Ok(source.open_list(name))
}

/// Rollups resolve dependencies in each plain list below them.
fn attach_hook(list: &mut TaskList, hook: &Arc<dyn DependencyHook>) {
    if list.is_rollup() {
        for child in list.children_mut() {
            attach_hook(child, hook);
        }
    } else {
        list.set_dependency_hook(Some(Arc::clone(hook)));
    }
}

fn print_metrics(list: &TaskList, format: RowFormat) {
    println!("{}", list.name());
    for row in list.metrics().rows() {
        let text = match format {
            RowFormat::Short => &row.short,
            RowFormat::Medium => &row.medium,
            RowFormat::Full => &row.full,
        };
        println!("  {:<32} {text}", row.name);
    }
    let errors = list.metrics().errors();
    if !errors.is_empty() {
        println!("Problems ({})", errors.len());
        for (message, node) in errors {
            println!("  {node}: {message}");
        }
    }
}

fn print_tree(tree: &TaskTree, id: NodeId, depth: usize) {
    let node = &tree[id];
    let done = node.date_completed.map(|d| format!(" | done {d}")).unwrap_or_default();
    println!(
        "{:indent$}{} | plan {:.1}h | actual {:.1}h{done}",
        "",
        if node.name.is_empty() { "(root)" } else { node.name.as_str() },
        node.ev.plan_time / 60.0,
        node.ev.actual_time / 60.0,
        indent = depth * 2,
    );
    for c in tree.children(id) {
        print_tree(tree, *c, depth + 1);
    }
}

fn print_dependencies(list: &TaskList) {
    let tree = list.tree();
    for id in tree.pre_order(tree.root()) {
        let deps = &tree[id].dependencies;
        if deps.is_empty() {
            continue;
        }
        println!("{}", tree.full_name(id));
        for dep in deps {
            let status = &dep.status;
            let target = dep.display_name.as_deref().unwrap_or(&dep.task_id);
            let mut line = format!("  {:?} {target}", dep.kind);
            if status.unresolvable {
                line.push_str(" | unresolvable");
            }
            if let Some(who) = &status.assigned_to {
                line.push_str(&format!(" | {who}"));
            }
            line.push_str(&format!(" | {:.0}%", status.percent_complete * 100.0));
            if let Some(d) = status.projected_date {
                line.push_str(&format!(" | due {d}"));
            }
            if dep.is_misordered() {
                line.push_str(" | misordered");
            }
            println!("{line}");
        }
    }
}
