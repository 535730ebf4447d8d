use anyhow::{bail, Context, Result};
use bytesize::ByteSize;
use clap::{Parser, Subcommand, ValueEnum};
use codegrade_core::{
    export, match_trees, read_tree, CacheConfig, ContentCache, DiffNode, FileTreeDiff, NodeId,
    NodeRef, Snapshot, TreeView,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "codegrade", about = "Compare two revisions of a submission")]
struct Args {
    /// Log debug events to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct Trees {
    /// Student tree as JSON
    student: PathBuf,
    /// Teacher tree as JSON
    teacher: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the merged diff tree
    Diff {
        #[command(flatten)]
        trees: Trees,
        #[arg(long, value_enum, default_value_t = Format::Json)]
        format: Format,
    },
    /// Look up a node by id
    Search {
        #[command(flatten)]
        trees: Trees,
        #[arg(long, default_value = "diff")]
        view: TreeView,
        #[arg(long)]
        id: u64,
    },
    /// Print the first visible file of a view
    FirstFile {
        #[command(flatten)]
        trees: Trees,
        #[arg(long, default_value = "diff")]
        view: TreeView,
    },
    /// Fuzzy search file paths
    Find {
        pattern: String,
        #[command(flatten)]
        trees: Trees,
        #[arg(long, default_value = "diff")]
        view: TreeView,
    },
    /// Write the tree of a directory as JSON
    Scan {
        root: PathBuf,
        /// Output path, stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Compare two directories file by file
    Compare {
        student: PathBuf,
        teacher: PathBuf,
        #[arg(long, default_value = "64MiB")]
        cache_budget: ByteSize,
        /// Largest file kept in the cache, a quarter of the budget by default
        #[arg(long)]
        cache_ceiling: Option<ByteSize>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Json,
    Csv,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    match args.command {
        Command::Diff { trees, format } => {
            let diff = load_diff(&trees)?;
            match format {
                Format::Json => {
                    println!("{}", serde_json::to_string_pretty(&export::to_json(&diff))?)
                }
                Format::Csv => export::to_csv(&diff, std::io::stdout().lock())?,
            }
        }
        Command::Search { trees, view, id } => {
            let diff = load_diff(&trees)?;
            match diff.search(view, NodeId(id)) {
                Some(node) => print_node(&diff, node),
                None => bail!("no node with id {id} in the {view} view"),
            }
        }
        Command::FirstFile { trees, view } => {
            let diff = load_diff(&trees)?;
            match diff.first_file(view) {
                Some(node) => print_node(&diff, node),
                None => bail!("the {view} view has no visible files"),
            }
        }
        Command::Find {
            pattern,
            trees,
            view,
        } => {
            let diff = load_diff(&trees)?;
            for hit in diff.fuzzy_find(view, &pattern) {
                println!("{:>5}  {}", hit.score, hit.path);
            }
        }
        Command::Scan { root, output } => {
            let snap = Snapshot::scan(&root)?;
            let json = serde_json::to_string_pretty(&snap.tree)?;
            match output {
                Some(path) => std::fs::write(&path, json)
                    .with_context(|| format!("writing {}", path.display()))?,
                None => println!("{json}"),
            }
        }
        Command::Compare {
            student,
            teacher,
            cache_budget,
            cache_ceiling,
        } => {
            let mut config = CacheConfig::with_budget(cache_budget);
            if let Some(ceiling) = cache_ceiling {
                if ceiling > cache_budget {
                    bail!("cache ceiling {ceiling} exceeds the budget {cache_budget}");
                }
                config.item_ceiling = ceiling;
            }
            compare(&student, &teacher, config)?;
        }
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_diff(trees: &Trees) -> Result<FileTreeDiff> {
    let student = read_tree(&trees.student)?;
    let teacher = trees.teacher.as_ref().map(read_tree).transpose()?;
    Ok(match_trees(student, teacher))
}

fn print_node(diff: &FileTreeDiff, node: NodeRef<'_>) {
    let kind = if node.is_dir() { "dir" } else { "file" };
    let ids = match node {
        NodeRef::Student(n) | NodeRef::Teacher(n) => n.id().to_string(),
        NodeRef::Diff(DiffNode::File { ids: (s, t), .. }) => format!("{}:{}", opt(*s), opt(*t)),
        NodeRef::Diff(DiffNode::Directory { .. }) => "-".to_string(),
    };
    let revision = diff
        .revision_id(node)
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{} {} {} id={} revision={} changed={}",
        node.view(),
        kind,
        node.name(),
        ids,
        revision,
        diff.has_revision(node)
    );
}

fn opt(id: Option<NodeId>) -> String {
    id.map(|id| id.to_string()).unwrap_or_else(|| "null".to_string())
}

/// Match two checked-out directories, then settle every pair by content.
fn compare(student: &Path, teacher: &Path, config: CacheConfig) -> Result<()> {
    let student = Snapshot::scan(student)?;
    let teacher = Snapshot::scan(teacher)?;
    tracing::debug!(
        student = %student.root.display(),
        teacher = %teacher.root.display(),
        "comparing directories"
    );
    let cache: ContentCache<PathBuf> = ContentCache::new(config);
    let rows = compare_rows(&student, &teacher, &cache)?;

    for (status, path) in &rows {
        println!("{status:<13} {path}");
    }
    let count = |wanted: &str| rows.iter().filter(|(status, _)| *status == wanted).count();
    let stats = cache.stats();
    eprintln!(
        "{} files, {} identical, {} unreadable; cache {} of {} in {} entries, \
         {:.0}% hits, {} evicted",
        rows.len(),
        count("same"),
        count("unreadable"),
        ByteSize::b(cache.total_bytes()),
        cache.config().byte_budget,
        cache.len(),
        stats.hit_rate() * 100.0,
        stats.evictions,
    );
    Ok(())
}

/// One `(status, path)` row per diff leaf. A file that cannot be read is
/// reported as `unreadable` and the comparison moves on.
fn compare_rows(
    student: &Snapshot,
    teacher: &Snapshot,
    cache: &ContentCache<PathBuf>,
) -> Result<Vec<(&'static str, String)>> {
    let diff = match_trees(student.tree.clone(), Some(teacher.tree.clone()));
    let mut rows = Vec::new();
    for leaf in diff.leaves(TreeView::Diff) {
        let NodeRef::Diff(node) = leaf.node else {
            continue;
        };
        let status = match node.ids() {
            Some((Some(s), Some(t))) => {
                let (Some(sp), Some(tp)) = (student.path_of(s), teacher.path_of(t)) else {
                    bail!("snapshot lost the path of {}", leaf.path);
                };
                let a = cache.load(sp.to_path_buf(), |_| student.read(s));
                let b = cache.load(tp.to_path_buf(), |_| teacher.read(t));
                match (a, b) {
                    (Ok(a), Ok(b)) if a == b => "same",
                    (Ok(_), Ok(_)) => "modified",
                    (Err(e), _) | (_, Err(e)) => {
                        tracing::warn!(path = %leaf.path, error = %e, "cannot compare file");
                        "unreadable"
                    }
                }
            }
            Some((Some(_), None)) => "student-only",
            Some((None, Some(_))) => "teacher-only",
            _ => continue,
        };
        rows.push((status, leaf.path));
    }
    Ok(rows)
}
