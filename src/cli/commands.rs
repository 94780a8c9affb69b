//! Command dispatch

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use clap::CommandFactory;
use colored::Colorize;
use generational_arena::Index;
use termtree::Tree;
use tracing::{debug, instrument};

use crate::application::services::{Outliner, OutlinerMode, OutlinerTree};
use crate::cli::args::{Cli, Commands, ConfigCommands, WorldArgs};
use crate::cli::error::{CliError, CliResult};
use crate::cli::output;
use crate::config::{global_config_path, local_config_path, Settings};
use crate::domain::{FolderPath, ItemId, ItemKind, ObjectInfo};
use crate::infrastructure::di::ServiceContainer;
use crate::infrastructure::fixture::WorldFixture;
use crate::infrastructure::memory::InMemoryWorld;
use crate::infrastructure::traits::{DomainAdapter, SocketChoice, SocketChooser};
use crate::infrastructure::InfraError;

pub fn execute(cli: &Cli) -> CliResult<()> {
    match &cli.command {
        Some(Commands::Tree { world }) => cmd_tree(cli, world),
        Some(Commands::Children { world, item }) => cmd_children(cli, world, item),
        Some(Commands::Validate { world, target, items }) => cmd_validate(cli, world, target, items),
        Some(Commands::Drop {
            world,
            target,
            items,
            socket,
        }) => cmd_drop(cli, world, target, items, socket.clone()),
        Some(Commands::Pin { world, items, unpin }) => cmd_pin(cli, world, items, *unpin),
        Some(Commands::Status { world }) => cmd_status(cli, world),
        Some(Commands::Config { command }) => cmd_config(cli, command),
        Some(Commands::Completion { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(*shell, &mut cmd, "outliner", &mut io::stdout());
            Ok(())
        }
        None => Err(CliError::Usage("no command given, see --help".to_string())),
    }
}

/// A loaded fixture with an outliner attached.
struct Session {
    world: Arc<InMemoryWorld>,
    outliner: Arc<Outliner>,
}

fn config_dir(cli: &Cli) -> CliResult<PathBuf> {
    match &cli.config_dir {
        Some(dir) => Ok(dir.clone()),
        None => Ok(std::env::current_dir().map_err(|e| InfraError::io("resolve current directory", e))?),
    }
}

fn load_settings(cli: &Cli) -> CliResult<Settings> {
    let dir = config_dir(cli)?;
    Ok(Settings::load(Some(&dir))?)
}

#[instrument(level = "debug", skip(cli))]
fn open(cli: &Cli, args: &WorldArgs) -> CliResult<Session> {
    let settings = load_settings(cli)?;
    let loaded = WorldFixture::load(&args.fixture)?.build()?;
    let world = loaded.world.clone();
    let container = ServiceContainer::new(settings, loaded);

    let mode = match &args.nested {
        Some(label) => OutlinerMode::NestedScope(
            world
                .find_object(label)
                .ok_or_else(|| CliError::InvalidArgs(format!("unknown nested scope '{label}'")))?,
        ),
        None => OutlinerMode::World,
    };
    let outliner = container.outliner(mode)?;

    for name in &args.enable {
        outliner.set_filter_active(name, true)?;
    }
    for name in &args.disable {
        outliner.set_filter_active(name, false)?;
    }
    if let Some(text) = &args.filter {
        outliner.set_text_filter(text)?;
    }
    // The fixture selected objects before the outliner subscribed.
    outliner.selection_sync().on_domain_selection_changed();
    let applied = outliner.sync();
    debug!(applied, "session ready");

    Ok(Session { world, outliner })
}

/// Resolve an item reference given on the command line.
fn resolve_item(session: &Session, reference: &str) -> CliResult<ItemId> {
    let unknown = || CliError::InvalidArgs(format!("unknown item '{reference}'"));

    if reference == "scope" {
        return match session.outliner.mode() {
            OutlinerMode::World => session.outliner.root_id().ok_or_else(unknown),
            OutlinerMode::NestedScope(handle) => Ok(ItemId::NestedScopeRoot(handle)),
        };
    }
    if let Some(path) = reference.strip_prefix("folder:") {
        return Ok(ItemId::Folder(session.outliner.folder_root(), FolderPath::new(path)));
    }
    if let Some(label) = reference.strip_prefix("unloaded:") {
        return session.world.find_unloaded(label).map(ItemId::Unloaded).ok_or_else(unknown);
    }
    if let Some(label) = reference.strip_prefix("nested:") {
        return session
            .world
            .find_object(label)
            .map(ItemId::NestedScopeRoot)
            .ok_or_else(unknown);
    }
    if let Some(handle) = session.world.find_object(reference) {
        return Ok(ItemId::Object(handle));
    }
    let (owner, sub) = reference.rsplit_once('/').ok_or_else(unknown)?;
    let owner = session.world.find_object(owner).ok_or_else(unknown)?;
    session
        .world
        .sub_objects(owner)
        .into_iter()
        .find(|&handle| session.world.sub_object(handle).map(|info| info.label == sub).unwrap_or(false))
        .map(ItemId::SubObject)
        .ok_or_else(unknown)
}

fn resolve_items(session: &Session, references: &[String]) -> CliResult<Vec<ItemId>> {
    references.iter().map(|reference| resolve_item(session, reference)).collect()
}

fn decorate(outliner: &Outliner, tree: &OutlinerTree, id: &ItemId) -> String {
    let Some(item) = tree.item(id) else {
        return id.to_string();
    };
    let mut label = if tree.is_filtered_out(id) {
        item.label.dimmed().to_string()
    } else {
        match item.kind() {
            ItemKind::Scope | ItemKind::NestedScopeRoot => item.label.cyan().bold().to_string(),
            ItemKind::Folder => format!("{}/", item.label).blue().bold().to_string(),
            ItemKind::SubObject => item.label.magenta().to_string(),
            ItemKind::Unloaded => format!("{} (unloaded)", item.label).dimmed().to_string(),
            ItemKind::Object => item.label.clone(),
        }
    };
    if !item.can_interact {
        label.push_str(&" [read-only]".dimmed().to_string());
    }
    if outliner.show_pinned_column() && outliner.is_pinned(id) {
        label.push_str(&" [pinned]".yellow().to_string());
    }
    label
}

fn render_node(outliner: &Outliner, tree: &OutlinerTree, idx: Index) -> Option<Tree<String>> {
    let node = tree.arena().get_node(idx)?;
    let mut children: Vec<Index> = node.children.clone();
    children.sort_by_key(|&child| {
        tree.arena()
            .get_node(child)
            .map(|n| (n.item.kind() != ItemKind::Folder, n.item.label.clone()))
    });
    let leaves: Vec<Tree<String>> = children
        .into_iter()
        .filter_map(|child| render_node(outliner, tree, child))
        .collect();
    Some(Tree::new(decorate(outliner, tree, &node.item.id)).with_leaves(leaves))
}

fn print_tree(outliner: &Outliner) {
    let tree = outliner.tree();
    if tree.is_empty() {
        output::warning("tree is empty");
        return;
    }
    for &root in tree.arena().roots() {
        if let Some(rendered) = render_node(outliner, &tree, root) {
            output::info(&rendered);
        }
    }
}

#[instrument(level = "debug", skip(cli))]
fn cmd_tree(cli: &Cli, args: &WorldArgs) -> CliResult<()> {
    let session = open(cli, args)?;
    print_tree(&session.outliner);
    Ok(())
}

#[instrument(level = "debug", skip(cli))]
fn cmd_children(cli: &Cli, args: &WorldArgs, reference: &str) -> CliResult<()> {
    let session = open(cli, args)?;
    let id = resolve_item(&session, reference)?;
    let children = session.outliner.children(&id);
    output::header(&format!("Children of {reference}"));
    if children.is_empty() {
        output::detail("(none)");
    }
    for child in children {
        output::detail(&format!("{:<12} {}", child.kind().to_string().dimmed(), child.label));
    }
    Ok(())
}

#[instrument(level = "debug", skip(cli))]
fn cmd_validate(cli: &Cli, args: &WorldArgs, target: &str, items: &[String]) -> CliResult<()> {
    let session = open(cli, args)?;
    let target = resolve_item(&session, target)?;
    let items = resolve_items(&session, items)?;
    let validation = session.outliner.validate_drop(&target, &items);
    let message = if validation.reason.is_empty() {
        validation.compatibility.to_string()
    } else {
        format!("{}: {}", validation.compatibility, validation.reason)
    };
    if validation.is_compatible() {
        output::success(&message);
    } else {
        output::failure(&message);
    }
    Ok(())
}

/// Socket chooser answering from the command line.
struct ArgSocketChooser {
    socket: Option<String>,
}

impl SocketChooser for ArgSocketChooser {
    fn choose_socket(&self, parent: &ObjectInfo, sockets: &[String]) -> SocketChoice {
        match &self.socket {
            None => SocketChoice::Default,
            Some(socket) if sockets.contains(socket) => SocketChoice::Socket(socket.clone()),
            Some(socket) => {
                output::warning(&format!(
                    "{} has no socket '{}' (available: {})",
                    parent.label,
                    socket,
                    sockets.join(", ")
                ));
                SocketChoice::Cancelled
            }
        }
    }
}

#[instrument(level = "debug", skip(cli))]
fn cmd_drop(cli: &Cli, args: &WorldArgs, target: &str, items: &[String], socket: Option<String>) -> CliResult<()> {
    let session = open(cli, args)?;
    let target = resolve_item(&session, target)?;
    let items = resolve_items(&session, items)?;

    let chooser = ArgSocketChooser { socket };
    let (validation, report) = session.outliner.perform_drop(&target, &items, &chooser);
    if !validation.is_compatible() {
        return Err(CliError::Usage(format!("drop rejected: {}", validation.reason)));
    }
    for error in &report.errors {
        output::warning(error);
    }
    if !report.applied {
        output::warning("nothing changed");
        return Ok(());
    }

    session.outliner.sync();
    output::action("Dropped", &validation.reason);
    print_tree(&session.outliner);
    Ok(())
}

#[instrument(level = "debug", skip(cli))]
fn cmd_pin(cli: &Cli, args: &WorldArgs, items: &[String], unpin: bool) -> CliResult<()> {
    let session = open(cli, args)?;
    let partitioned = session.world.scope().map(|scope| scope.partitioned).unwrap_or(false);
    if !partitioned {
        output::warning("world is not partitioned, pinning has no effect");
        return Ok(());
    }

    let items = resolve_items(&session, items)?;
    let changed = match (items.is_empty(), unpin) {
        (true, false) => session.outliner.pin_selected(),
        (true, true) => session.outliner.unpin_selected(),
        (false, false) => session.outliner.pin_items(&items),
        (false, true) => session.outliner.unpin_items(&items),
    };
    output::action(if unpin { "Unpinned" } else { "Pinned" }, &format!("{changed} items"));
    print_tree(&session.outliner);
    Ok(())
}

#[instrument(level = "debug", skip(cli))]
fn cmd_status(cli: &Cli, args: &WorldArgs) -> CliResult<()> {
    let session = open(cli, args)?;
    output::info(&session.outliner.status_text());
    Ok(())
}

#[instrument(level = "debug", skip(cli))]
fn cmd_config(cli: &Cli, command: &ConfigCommands) -> CliResult<()> {
    match command {
        ConfigCommands::Show => {
            let settings = load_settings(cli)?;
            output::info(&settings.to_toml()?);
        }
        ConfigCommands::Path => {
            let local = local_config_path(&config_dir(cli)?);
            match global_config_path() {
                Some(global) => print_config_path("global", &global),
                None => output::detail("global: (no config directory)"),
            }
            print_config_path("local", &local);
        }
        ConfigCommands::Init { global } => {
            let path = if *global {
                global_config_path()
                    .ok_or_else(|| CliError::Usage("cannot determine global config directory".to_string()))?
            } else {
                local_config_path(&config_dir(cli)?)
            };
            if path.exists() {
                return Err(CliError::Usage(format!("config already exists: {}", path.display())));
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| InfraError::io(format!("create {}", parent.display()), e))?;
            }
            std::fs::write(&path, Settings::template())
                .map_err(|e| InfraError::io(format!("write {}", path.display()), e))?;
            output::action("Created", &path.display());
        }
    }
    Ok(())
}

fn print_config_path(label: &str, path: &std::path::Path) {
    let state = if path.exists() {
        "exists".green()
    } else {
        "missing".dimmed()
    };
    output::detail(&format!("{label}: {} ({state})", path.display()));
}
