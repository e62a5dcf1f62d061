use crate::cmd::{split_ids, Context};
use crate::output::{print_issues, print_json, print_table};
use clap::Subcommand;
use std::collections::BTreeSet;
use storyforest_core::gate::StatusChangeOptions;
use storyforest_core::story::{NewStory, StoryNode, StoryPatch};
use storyforest_core::types::StoryStatus;
use storyforest_core::StoryError;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum StorySubcommand {
    /// Create a story under a merge request (root level) or a parent story
    Create {
        #[arg(required = true)]
        title: Vec<String>,
        /// Owning merge request
        #[arg(long)]
        mr: String,
        /// Parent story (omit for root level)
        #[arg(long)]
        parent: Option<String>,
        #[arg(long)]
        as_a: Option<String>,
        #[arg(long)]
        i_want: Option<String>,
        #[arg(long)]
        so_that: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        estimate: Option<f64>,
        #[arg(long)]
        assignee: Option<String>,
        /// Component tag (repeatable)
        #[arg(long = "component")]
        components: Vec<String>,
        /// Save despite quality warnings when quality.enforce_on_write is set
        #[arg(long)]
        accept_warnings: bool,
    },
    /// Show full details for a story
    Show { id: String },
    /// List stories of a merge request, parents before children
    List { mr: String },
    /// Edit narrative and planning fields
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        as_a: Option<String>,
        #[arg(long)]
        i_want: Option<String>,
        #[arg(long)]
        so_that: Option<String>,
        #[arg(long, conflicts_with = "clear_estimate")]
        estimate: Option<f64>,
        #[arg(long)]
        clear_estimate: bool,
        #[arg(long, conflicts_with = "clear_assignee")]
        assignee: Option<String>,
        #[arg(long)]
        clear_assignee: bool,
        /// Replace the component set (repeatable)
        #[arg(long = "component")]
        components: Option<Vec<String>>,
        /// Save despite quality warnings when quality.enforce_on_write is set
        #[arg(long)]
        accept_warnings: bool,
    },
    /// Move a story (and its subtree) under a new parent
    Move {
        id: String,
        /// New parent (omit for root level)
        #[arg(long)]
        parent: Option<String>,
        /// Position among the new siblings
        #[arg(long, default_value = "0")]
        index: usize,
    },
    /// Reorder a story's children (comma-separated ids, every child once)
    Reorder { parent: String, order: String },
    /// Delete a story with its subtree and tests
    Delete { id: String },
    /// Print the ancestor path from the root-level story down
    Path { id: String },
    /// Change status: backlog, draft, in-progress, ready-for-test, done
    Status {
        id: String,
        status: String,
        /// Reach done despite unresolved quality issues
        #[arg(long)]
        accept_warnings: bool,
    },
}

pub fn run(ctx: &Context, subcmd: StorySubcommand) -> anyhow::Result<()> {
    match subcmd {
        StorySubcommand::Create {
            title,
            mr,
            parent,
            as_a,
            i_want,
            so_that,
            description,
            estimate,
            assignee,
            components,
            accept_warnings,
        } => {
            let input = NewStory {
                merge_request_id: mr,
                parent_id: parent,
                title: title.join(" "),
                description,
                as_a: as_a.unwrap_or_default(),
                i_want: i_want.unwrap_or_default(),
                so_that: so_that.unwrap_or_default(),
                estimate,
                assignee,
                components: components.into_iter().collect(),
                accept_warnings,
                ..NewStory::default()
            };
            create(ctx, input)
        }
        StorySubcommand::Show { id } => show(ctx, &id),
        StorySubcommand::List { mr } => list(ctx, &mr),
        StorySubcommand::Update {
            id,
            title,
            description,
            as_a,
            i_want,
            so_that,
            estimate,
            clear_estimate,
            assignee,
            clear_assignee,
            components,
            accept_warnings,
        } => {
            let patch = StoryPatch {
                title,
                description,
                as_a,
                i_want,
                so_that,
                estimate: if clear_estimate { Some(None) } else { estimate.map(Some) },
                assignee: if clear_assignee { Some(None) } else { assignee.map(Some) },
                components: components.map(|c| c.into_iter().collect::<BTreeSet<_>>()),
                accept_warnings,
            };
            update(ctx, &id, patch)
        }
        StorySubcommand::Move { id, parent, index } => move_story(ctx, &id, parent.as_deref(), index),
        StorySubcommand::Reorder { parent, order } => reorder(ctx, &parent, &order),
        StorySubcommand::Delete { id } => delete(ctx, &id),
        StorySubcommand::Path { id } => path(ctx, &id),
        StorySubcommand::Status {
            id,
            status,
            accept_warnings,
        } => change_status(ctx, &id, &status, accept_warnings),
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn create(ctx: &Context, input: NewStory) -> anyhow::Result<()> {
    let story = ctx
        .open_store()?
        .create_story(input)
        .map_err(|e| report_warnings(ctx, e))?;
    if ctx.json {
        print_json(&story)
    } else {
        println!(
            "Created story [{}] at depth {}: {}",
            story.id, story.depth, story.title
        );
        Ok(())
    }
}

fn show(ctx: &Context, id: &str) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let story = store.get_story(id)?;
    if ctx.json {
        return print_json(&story);
    }
    let tests = store.list_tests(id)?;
    print_detail(&story);
    if !tests.is_empty() {
        println!("\nAcceptance tests:");
        for t in &tests {
            println!("  [{}] {} <{}>", t.id, t.title, t.status);
        }
    }
    Ok(())
}

fn list(ctx: &Context, mr: &str) -> anyhow::Result<()> {
    let stories = ctx.open_store()?.list_stories(mr)?;
    if ctx.json {
        return print_json(&stories);
    }
    if stories.is_empty() {
        println!("No stories.");
        return Ok(());
    }
    let rows = stories
        .iter()
        .map(|s| {
            vec![
                s.id.clone(),
                s.depth.to_string(),
                s.status.to_string(),
                s.estimate.map(|e| e.to_string()).unwrap_or_else(|| "-".into()),
                format!("{}{}", "  ".repeat(s.depth as usize), s.title),
            ]
        })
        .collect();
    print_table(&["ID", "DEPTH", "STATUS", "EST", "TITLE"], rows);
    Ok(())
}

fn update(ctx: &Context, id: &str, patch: StoryPatch) -> anyhow::Result<()> {
    let story = ctx
        .open_store()?
        .update_story(id, patch)
        .map_err(|e| report_warnings(ctx, e))?;
    if ctx.json {
        print_json(&story)
    } else {
        println!("Updated story [{}]", story.id);
        Ok(())
    }
}

fn move_story(ctx: &Context, id: &str, parent: Option<&str>, index: usize) -> anyhow::Result<()> {
    let story = ctx.open_store()?.move_story(id, parent, index)?;
    if ctx.json {
        print_json(&story)
    } else {
        println!(
            "Moved story [{}] under {} (depth {})",
            story.id,
            story.parent_id.as_deref().unwrap_or("root level"),
            story.depth
        );
        Ok(())
    }
}

fn reorder(ctx: &Context, parent: &str, order: &str) -> anyhow::Result<()> {
    let story = ctx
        .open_store()?
        .reorder_children(parent, &split_ids(order))?;
    if ctx.json {
        print_json(&story)
    } else {
        println!("Reordered children of [{}]", story.id);
        Ok(())
    }
}

fn delete(ctx: &Context, id: &str) -> anyhow::Result<()> {
    let summary = ctx.open_store()?.delete_story(id)?;
    if ctx.json {
        print_json(&serde_json::json!({ "id": id, "deleted": summary }))
    } else {
        println!(
            "Deleted {} stories and {} tests",
            summary.stories.len(),
            summary.tests.len()
        );
        Ok(())
    }
}

fn path(ctx: &Context, id: &str) -> anyhow::Result<()> {
    let path = ctx.open_store()?.story_path(id)?;
    if ctx.json {
        return print_json(&path);
    }
    let titles: Vec<String> = path
        .iter()
        .map(|s| format!("{} [{}]", s.title, s.id))
        .collect();
    println!("{}", titles.join(" > "));
    Ok(())
}

fn change_status(
    ctx: &Context,
    id: &str,
    status: &str,
    accept_warnings: bool,
) -> anyhow::Result<()> {
    let status: StoryStatus = status.parse()?;
    let options = StatusChangeOptions { accept_warnings };
    let story = match ctx.open_store()?.request_status_change(id, status, options) {
        Ok(story) => story,
        Err(e @ StoryError::QualityGateBlocked { .. }) => {
            if ctx.json {
                print_json(&serde_json::json!({ "blocked": true, "issues": e.issues() }))?;
            } else {
                println!("Cannot mark [{id}] {status}:");
                print_issues(e.issues());
            }
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    if ctx.json {
        return print_json(&story);
    }
    println!("Story [{}] is now {}", story.id, story.status);
    if let Some(stamp) = &story.warnings_accepted {
        println!("  accepted {} quality warning(s):", stamp.issues.len());
        print_issues(&stamp.issues);
    }
    Ok(())
}

/// Print the issues behind a refused write before the error propagates.
fn report_warnings(ctx: &Context, e: StoryError) -> StoryError {
    if let StoryError::QualityWarnings { issues, .. } = &e {
        if ctx.json {
            let _ = print_json(&serde_json::json!({ "blocked": true, "issues": issues }));
        } else {
            println!("Story not saved; rerun with --accept-warnings to keep it anyway:");
            print_issues(issues);
        }
    }
    e
}

// ---------------------------------------------------------------------------
// Text rendering
// ---------------------------------------------------------------------------

fn print_detail(story: &StoryNode) {
    println!("{} [{}]", story.title, story.id);
    println!("  merge request: {}", story.merge_request_id);
    println!(
        "  parent:        {}",
        story.parent_id.as_deref().unwrap_or("-")
    );
    println!("  depth:         {}", story.depth);
    println!("  status:        {}", story.status);
    if let Some(estimate) = story.estimate {
        println!("  estimate:      {estimate}");
    }
    if let Some(assignee) = &story.assignee {
        println!("  assignee:      {assignee}");
    }
    if !story.components.is_empty() {
        let components: Vec<&str> = story.components.iter().map(String::as_str).collect();
        println!("  components:    {}", components.join(", "));
    }
    println!("\n{}", story.narrative());
    if let Some(description) = &story.description {
        println!("\n{description}");
    }
    if let Some(finding) = &story.quality {
        if !finding.satisfied {
            println!("\nQuality issues:");
            print_issues(&finding.issues);
        }
    }
    if story.warnings_accepted.is_some() {
        println!("\n(done with quality warnings accepted)");
    }
}
