use crate::cmd::{split_ids, Context};
use crate::output::{print_json, print_table};
use clap::Subcommand;
use storyforest_core::merge_request::{MergeRequestPatch, MergeRequestRoot, NewMergeRequest};
use storyforest_core::tree::StoryTreeNode;
use storyforest_core::types::MergeRequestStatus;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum MergeRequestSubcommand {
    /// Create a merge-request root
    Create {
        #[arg(required = true)]
        title: Vec<String>,
        /// Source branch
        #[arg(long)]
        branch: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        repository: Option<String>,
        #[arg(long)]
        base_branch: Option<String>,
        #[arg(long = "pr-url")]
        pull_request_url: Option<String>,
    },
    /// List merge-request roots
    List,
    /// Show one merge-request root
    Show { id: String },
    /// Edit fields; pass an empty string to clear an optional one
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        branch: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        repository: Option<String>,
        #[arg(long)]
        base_branch: Option<String>,
        #[arg(long = "pr-url")]
        pull_request_url: Option<String>,
    },
    /// Set status: draft, in-progress, ready-for-review, passed
    Status { id: String, status: String },
    /// Delete a root with all of its stories and tests
    Delete { id: String },
    /// Reorder root-level stories (comma-separated ids, every story once)
    Reorder { id: String, order: String },
    /// Show the nested story tree
    Tree { id: String },
}

pub fn run(ctx: &Context, subcmd: MergeRequestSubcommand) -> anyhow::Result<()> {
    match subcmd {
        MergeRequestSubcommand::Create {
            title,
            branch,
            description,
            repository,
            base_branch,
            pull_request_url,
        } => {
            let input = NewMergeRequest {
                title: title.join(" "),
                branch,
                description,
                repository,
                base_branch,
                pull_request_url,
            };
            create(ctx, input)
        }
        MergeRequestSubcommand::List => list(ctx),
        MergeRequestSubcommand::Show { id } => show(ctx, &id),
        MergeRequestSubcommand::Update {
            id,
            title,
            branch,
            description,
            repository,
            base_branch,
            pull_request_url,
        } => {
            let patch = MergeRequestPatch {
                title,
                branch,
                description,
                repository,
                base_branch,
                pull_request_url,
            };
            update(ctx, &id, patch)
        }
        MergeRequestSubcommand::Status { id, status } => set_status(ctx, &id, &status),
        MergeRequestSubcommand::Delete { id } => delete(ctx, &id),
        MergeRequestSubcommand::Reorder { id, order } => reorder(ctx, &id, &order),
        MergeRequestSubcommand::Tree { id } => tree(ctx, &id),
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn create(ctx: &Context, input: NewMergeRequest) -> anyhow::Result<()> {
    let mr = ctx.open_store()?.create_merge_request(input)?;
    if ctx.json {
        print_json(&mr)?;
    } else {
        println!("Created merge request [{}]: {}", mr.id, mr.title);
    }
    Ok(())
}

fn list(ctx: &Context) -> anyhow::Result<()> {
    let roots = ctx.open_store()?.list_merge_requests();
    if ctx.json {
        return print_json(&roots);
    }
    if roots.is_empty() {
        println!("No merge requests.");
        return Ok(());
    }
    let rows = roots
        .iter()
        .map(|mr| {
            vec![
                mr.id.clone(),
                mr.status.to_string(),
                mr.branch.clone(),
                mr.story_ids.len().to_string(),
                mr.title.clone(),
            ]
        })
        .collect();
    print_table(&["ID", "STATUS", "BRANCH", "STORIES", "TITLE"], rows);
    Ok(())
}

fn show(ctx: &Context, id: &str) -> anyhow::Result<()> {
    let mr = ctx.open_store()?.get_merge_request(id)?;
    if ctx.json {
        print_json(&mr)
    } else {
        print_detail(&mr);
        Ok(())
    }
}

fn update(ctx: &Context, id: &str, patch: MergeRequestPatch) -> anyhow::Result<()> {
    let mr = ctx.open_store()?.update_merge_request(id, patch)?;
    if ctx.json {
        print_json(&mr)
    } else {
        println!("Updated merge request [{}]", mr.id);
        Ok(())
    }
}

fn set_status(ctx: &Context, id: &str, status: &str) -> anyhow::Result<()> {
    let status: MergeRequestStatus = status.parse()?;
    let mr = ctx.open_store()?.set_merge_request_status(id, status)?;
    if ctx.json {
        print_json(&mr)
    } else {
        println!("Merge request [{}] is now {}", mr.id, mr.status);
        Ok(())
    }
}

fn delete(ctx: &Context, id: &str) -> anyhow::Result<()> {
    let summary = ctx.open_store()?.delete_merge_request(id)?;
    if ctx.json {
        print_json(&serde_json::json!({ "id": id, "deleted": summary }))
    } else {
        println!(
            "Deleted merge request [{id}] with {} stories and {} tests",
            summary.stories.len(),
            summary.tests.len()
        );
        Ok(())
    }
}

fn reorder(ctx: &Context, id: &str, order: &str) -> anyhow::Result<()> {
    let mr = ctx
        .open_store()?
        .reorder_root_stories(id, &split_ids(order))?;
    if ctx.json {
        print_json(&mr)
    } else {
        println!("Reordered root stories of [{}]", mr.id);
        Ok(())
    }
}

fn tree(ctx: &Context, id: &str) -> anyhow::Result<()> {
    let tree = ctx.open_store()?.tree(id)?;
    if ctx.json {
        return print_json(&tree);
    }
    println!("{} [{}]", tree.merge_request.title, tree.merge_request.id);
    for node in &tree.stories {
        print_node(node);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Text rendering
// ---------------------------------------------------------------------------

fn print_detail(mr: &MergeRequestRoot) {
    println!("{} [{}]", mr.title, mr.id);
    println!("  status:   {}", mr.status);
    println!("  branch:   {}", mr.branch);
    if let Some(base) = &mr.base_branch {
        println!("  base:     {base}");
    }
    if let Some(repo) = &mr.repository {
        println!("  repo:     {repo}");
    }
    if let Some(url) = &mr.pull_request_url {
        println!("  pr:       {url}");
    }
    println!("  stories:  {}", mr.story_ids.len());
    if let Some(description) = &mr.description {
        println!("\n{description}");
    }
}

fn print_node(node: &StoryTreeNode) {
    let story = &node.story;
    let marker = match &story.quality {
        Some(q) if !q.satisfied => format!(" ({} issues)", q.issues.len()),
        _ => String::new(),
    };
    println!(
        "{}- [{}] {} <{}> tests={}{marker}",
        "  ".repeat(story.depth as usize + 1),
        story.id,
        story.title,
        story.status,
        node.tests.len(),
    );
    for child in &node.children {
        print_node(child);
    }
}
